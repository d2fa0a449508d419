use super::class_file::{Attribute, Utf8ConstantIndex};
use super::{BinaryName, FieldType, MethodDescriptor, Name, UnqualifiedName, Visibility};
use std::cell::Cell;
use std::fmt;

/// Decoded type of a member
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberType {
    Field(FieldType<BinaryName>),
    Method(MethodDescriptor<BinaryName>),
}

/// Field or method of a class, either read from a class file or freshly added
///
/// Members live in an append-only arena owned by their class, so a `&MemberItem` handed out by a
/// lookup stays valid (and identical) for the rest of the run. Deleting a member only marks it.
pub struct MemberItem {
    class: BinaryName,
    name: UnqualifiedName,
    descriptor: String,
    member_type: MemberType,
    access_flags: u16,
    exceptions: Vec<BinaryName>,

    /// Raw attributes, with indices into the owning class' constant pool
    attributes: Vec<Attribute>,

    /// Name and descriptor indices in the owning class' constant pool (`None` for members of
    /// classes which never get written out)
    pool_indices: Option<(Utf8ConstantIndex, Utf8ConstantIndex)>,
    deleted: Cell<bool>,
}

impl MemberItem {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: String,
        member_type: MemberType,
        access_flags: u16,
        exceptions: Vec<BinaryName>,
        attributes: Vec<Attribute>,
        pool_indices: Option<(Utf8ConstantIndex, Utf8ConstantIndex)>,
    ) -> MemberItem {
        MemberItem {
            class,
            name,
            descriptor,
            member_type,
            access_flags,
            exceptions,
            attributes,
            pool_indices,
            deleted: Cell::new(false),
        }
    }

    /// Name of the class declaring the member
    pub fn class_name(&self) -> &BinaryName {
        &self.class
    }

    pub fn name(&self) -> &UnqualifiedName {
        &self.name
    }

    /// Raw descriptor string
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn member_type(&self) -> &MemberType {
        &self.member_type
    }

    pub fn is_method(&self) -> bool {
        matches!(self.member_type, MemberType::Method(_))
    }

    pub fn field_type(&self) -> Option<&FieldType<BinaryName>> {
        match &self.member_type {
            MemberType::Field(field_type) => Some(field_type),
            MemberType::Method(_) => None,
        }
    }

    pub fn method_descriptor(&self) -> Option<&MethodDescriptor<BinaryName>> {
        match &self.member_type {
            MemberType::Method(descriptor) => Some(descriptor),
            MemberType::Field(_) => None,
        }
    }

    /// Ordered argument types (empty for fields)
    pub fn argument_types(&self) -> &[FieldType<BinaryName>] {
        match &self.member_type {
            MemberType::Method(descriptor) => &descriptor.parameters,
            MemberType::Field(_) => &[],
        }
    }

    /// Type of the value the member produces (the field type, or the method return type)
    pub fn value_type(&self) -> Option<&FieldType<BinaryName>> {
        match &self.member_type {
            MemberType::Method(descriptor) => descriptor.return_type.as_ref(),
            MemberType::Field(field_type) => Some(field_type),
        }
    }

    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::from_bits(self.access_flags)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & 0x0008 != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.is_method() && self.access_flags & 0x0400 != 0
    }

    /// Checked exceptions declared by a method
    pub fn exceptions(&self) -> &[BinaryName] {
        &self.exceptions
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub(crate) fn pool_indices(&self) -> Option<(Utf8ConstantIndex, Utf8ConstantIndex)> {
        self.pool_indices
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }

    pub(crate) fn mark_deleted(&self) {
        self.deleted.set(true);
    }

    /// Does the member have the given name and descriptor?
    pub fn matches(&self, name: &str, descriptor: &str) -> bool {
        self.name.as_str() == name && self.descriptor == descriptor
    }
}

impl fmt::Debug for MemberItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)?;
        if self.is_deleted() {
            f.write_str(" (deleted)")?;
        }
        Ok(())
    }
}

impl fmt::Display for MemberItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_method() {
            write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
        } else {
            write!(f, "{}.{}:{}", self.class, self.name, self.descriptor)
        }
    }
}
