use super::class_file::{
    Attribute, AttributeLike, ClassConstantIndex, ClassFile, Code, Constant, ConstantIndex,
    ConstantsPool, Exceptions, Field, Method, Utf8ConstantIndex, Version,
};
use super::{
    BaseType, BinaryName, ClassAccessFlags, FieldAccessFlags, MemberItem, MemberType,
    MethodAccessFlags, Name, RenderDescriptor, SignatureCache, UnqualifiedName,
};
use elsa::FrozenVec;
use std::cell::{Cell, OnceCell, Ref, RefCell, RefMut};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Where a class came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassOrigin {
    /// Read from `path`, found under the search root `root`
    File { root: PathBuf, path: PathBuf },

    /// Declared by the built-in library tables
    Builtin,

    /// Stand-in for a primitive or array type
    Placeholder,

    /// Created during this run, to be written under `root`
    Synthetic { root: PathBuf },
}

/// One class, as seen by the weaver
///
/// Most of the state is behind `Cell`/`RefCell` so that classes can be modified through the
/// shared references handed out by the registry. Members go in append-only arenas.
pub struct ClassModel {
    name: BinaryName,
    version: Version,
    access_flags: ClassAccessFlags,
    superclass: Option<BinaryName>,
    interfaces: Vec<BinaryName>,
    origin: ClassOrigin,

    this_index: ClassConstantIndex,
    super_index: Option<ClassConstantIndex>,
    interface_indices: Vec<ClassConstantIndex>,
    constants: RefCell<ConstantsPool>,
    fields: FrozenVec<Box<MemberItem>>,
    methods: FrozenVec<Box<MemberItem>>,
    attributes: Vec<Attribute>,

    modifiable: Cell<bool>,
    modified: Cell<bool>,
    complete: Cell<bool>,
    hash: Cell<Option<u64>>,

    /// Names of this class, its ancestors, and every interface they implement
    pub(crate) instance_of: OnceCell<BTreeSet<String>>,
}

impl ClassModel {
    fn from_parts(
        name: BinaryName,
        version: Version,
        access_flags: ClassAccessFlags,
        superclass: Option<BinaryName>,
        interfaces: Vec<BinaryName>,
        origin: ClassOrigin,
        modifiable: bool,
    ) -> ClassModel {
        ClassModel {
            name,
            version,
            access_flags,
            superclass,
            interfaces,
            origin,
            this_index: ClassConstantIndex(ConstantIndex(0)),
            super_index: None,
            interface_indices: vec![],
            constants: RefCell::new(ConstantsPool::new()),
            fields: FrozenVec::new(),
            methods: FrozenVec::new(),
            attributes: vec![],
            modifiable: Cell::new(modifiable),
            modified: Cell::new(false),
            complete: Cell::new(false),
            hash: Cell::new(None),
            instance_of: OnceCell::new(),
        }
    }

    /// Build the model of a parsed class file
    ///
    /// Errors are messages about the malformed class file.
    pub(crate) fn from_class_file(
        class_file: ClassFile,
        origin: ClassOrigin,
        modifiable: bool,
        signatures: &SignatureCache,
    ) -> Result<ClassModel, String> {
        let constants = class_file.constants;
        let class_name = |index: ClassConstantIndex| -> Result<BinaryName, String> {
            let name = constants
                .class_name(index)
                .ok_or_else(|| format!("Invalid class constant {:?}", index))?;
            BinaryName::from_string(name.to_owned())
        };
        let utf8 = |index| -> Result<&str, String> {
            constants
                .utf8(index)
                .ok_or_else(|| format!("Invalid UTF-8 constant {:?}", index))
        };

        let name = class_name(class_file.this_class)?;
        let superclass = class_file.super_class.map(class_name).transpose()?;
        let interfaces = class_file
            .interfaces
            .iter()
            .map(|idx| class_name(*idx))
            .collect::<Result<Vec<_>, _>>()?;

        let mut model = ClassModel::from_parts(
            name.clone(),
            class_file.version,
            class_file.access_flags,
            superclass,
            interfaces,
            origin,
            modifiable,
        );
        model.this_index = class_file.this_class;
        model.super_index = class_file.super_class;
        model.interface_indices = class_file.interfaces;
        model.attributes = class_file.attributes;

        for field in class_file.fields {
            let field_name = UnqualifiedName::from_string(utf8(field.name_index)?.to_owned())?;
            let descriptor = utf8(field.descriptor_index)?;
            let field_type = signatures
                .field(descriptor)
                .map_err(|err| format!("Field {}: {}", field_name, err))?
                .clone();
            model.fields.push(Box::new(MemberItem::new(
                name.clone(),
                field_name,
                descriptor.to_owned(),
                MemberType::Field(field_type),
                field.access_flags.bits(),
                vec![],
                field.attributes,
                Some((field.name_index, field.descriptor_index)),
            )));
        }

        for method in class_file.methods {
            let method_name = utf8(method.name_index)?;
            let method_name = if method_name == "<init>" {
                UnqualifiedName::INIT
            } else if method_name == "<clinit>" {
                UnqualifiedName::CLINIT
            } else {
                UnqualifiedName::from_string(method_name.to_owned())?
            };
            let descriptor = utf8(method.descriptor_index)?;
            let method_type = signatures
                .method(descriptor)
                .map_err(|err| format!("Method {}: {}", method_name, err))?
                .clone();

            let mut exceptions = vec![];
            for attribute in &method.attributes {
                if constants.attribute_name(attribute) == Some(Exceptions::NAME) {
                    let Exceptions(indices) = attribute
                        .decode::<Exceptions>()
                        .map_err(|err| format!("Method {}: {}", method_name, err))?;
                    for index in indices {
                        exceptions.push(class_name(index)?);
                    }
                }
            }

            model.methods.push(Box::new(MemberItem::new(
                name.clone(),
                method_name,
                descriptor.to_owned(),
                MemberType::Method(method_type),
                method.access_flags.bits(),
                exceptions,
                method.attributes,
                Some((method.name_index, method.descriptor_index)),
            )));
        }

        model.constants = RefCell::new(constants);
        Ok(model)
    }

    /// Fresh empty class, created during the run
    pub(crate) fn synthetic(
        name: BinaryName,
        superclass: BinaryName,
        access_flags: ClassAccessFlags,
        version: Version,
        root: PathBuf,
    ) -> Result<ClassModel, super::Error> {
        let mut model = ClassModel::from_parts(
            name,
            version,
            access_flags,
            Some(superclass),
            vec![],
            ClassOrigin::Synthetic { root },
            true,
        );
        let mut constants = ConstantsPool::new();
        model.this_index = constants.get_class(model.name.as_str())?;
        if let Some(superclass) = &model.superclass {
            model.super_index = Some(constants.get_class(superclass.as_str())?);
        }
        model.constants = RefCell::new(constants);
        Ok(model)
    }

    /// Class declared by the built-in tables (never written out)
    pub(crate) fn builtin(
        name: BinaryName,
        superclass: Option<BinaryName>,
        interfaces: Vec<BinaryName>,
        access_flags: ClassAccessFlags,
    ) -> ClassModel {
        ClassModel::from_parts(
            name,
            Version::JAVA5,
            access_flags,
            superclass,
            interfaces,
            ClassOrigin::Builtin,
            false,
        )
    }

    /// Stand-in for a primitive type (eg. `int`) or array type (eg. `[Ljava/lang/String;`)
    pub(crate) fn placeholder(name: &str) -> ClassModel {
        let is_array = name.starts_with('[');
        let (superclass, interfaces) = if is_array {
            (
                Some(BinaryName::OBJECT),
                vec![BinaryName::CLONEABLE, BinaryName::SERIALIZABLE],
            )
        } else {
            (None, vec![])
        };
        ClassModel::from_parts(
            BinaryName::placeholder(name),
            Version::JAVA5,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL,
            superclass,
            interfaces,
            ClassOrigin::Placeholder,
            false,
        )
    }

    pub(crate) fn push_builtin_member(&self, member: MemberItem) {
        if member.is_method() {
            self.methods.push(Box::new(member));
        } else {
            self.fields.push(Box::new(member));
        }
    }

    pub fn name(&self) -> &BinaryName {
        &self.name
    }

    /// Name written the Java source way
    pub fn java_name(&self) -> String {
        self.name.java_name()
    }

    /// Type descriptor (eg. `Lcom/example/Order;`, `[I`, or `I`)
    pub fn descriptor(&self) -> String {
        let name = self.name.as_str();
        if name.starts_with('[') {
            name.to_owned()
        } else if let Some(base) = BaseType::from_keyword(name) {
            base.render()
        } else {
            self.name.render()
        }
    }

    pub fn package(&self) -> &str {
        self.name.package()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn access_flags(&self) -> ClassAccessFlags {
        self.access_flags
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::ABSTRACT)
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin == ClassOrigin::Placeholder
    }

    pub fn superclass_name(&self) -> Option<&BinaryName> {
        self.superclass.as_ref()
    }

    /// Names of the directly implemented interfaces
    pub fn interface_names(&self) -> &[BinaryName] {
        &self.interfaces
    }

    pub fn origin(&self) -> &ClassOrigin {
        &self.origin
    }

    /// Search path directory the class was found under (or will be written to)
    pub fn root(&self) -> Option<&Path> {
        match &self.origin {
            ClassOrigin::File { root, .. } | ClassOrigin::Synthetic { root } => Some(root),
            _ => None,
        }
    }

    /// Where the class file should be written
    pub fn output_path(&self) -> Option<PathBuf> {
        match &self.origin {
            ClassOrigin::File { path, .. } => Some(path.clone()),
            ClassOrigin::Synthetic { root } => {
                Some(root.join(format!("{}.class", self.name.as_str())))
            }
            _ => None,
        }
    }

    pub fn is_modifiable(&self) -> bool {
        self.modifiable.get()
    }

    pub(crate) fn set_modifiable(&self, modifiable: bool) {
        self.modifiable.set(modifiable);
    }

    pub fn is_modified(&self) -> bool {
        self.modified.get()
    }

    /// Record a change (invalidating the structural hash)
    pub(crate) fn touch(&self) {
        self.modified.set(true);
        self.complete.set(false);
        self.hash.set(None);
    }

    pub fn constants(&self) -> Ref<'_, ConstantsPool> {
        self.constants.borrow()
    }

    pub(crate) fn constants_mut(&self) -> RefMut<'_, ConstantsPool> {
        self.constants.borrow_mut()
    }

    /// Live (non-deleted) fields, in declaration order
    pub fn fields(&self) -> impl Iterator<Item = &MemberItem> + '_ {
        (0..self.fields.len())
            .filter_map(move |idx| self.fields.get(idx))
            .filter(|field| !field.is_deleted())
    }

    /// Live (non-deleted) methods, in declaration order
    pub fn methods(&self) -> impl Iterator<Item = &MemberItem> + '_ {
        (0..self.methods.len())
            .filter_map(move |idx| self.methods.get(idx))
            .filter(|method| !method.is_deleted())
    }

    /// Field declared directly in this class
    pub fn declared_field(&self, name: &str) -> Option<&MemberItem> {
        self.fields().find(|field| field.name().as_str() == name)
    }

    /// Method declared directly in this class
    pub fn declared_method(&self, name: &str, descriptor: &str) -> Option<&MemberItem> {
        self.methods().find(|method| method.matches(name, descriptor))
    }

    pub(crate) fn push_field(&self, field: MemberItem) -> &MemberItem {
        self.fields.push_get(Box::new(field))
    }

    pub(crate) fn push_method(&self, method: MemberItem) -> &MemberItem {
        self.methods.push_get(Box::new(method))
    }

    /// Decoded `Code` attribute of a method of this class
    pub fn code_of(&self, method: &MemberItem) -> Option<Code> {
        let constants = self.constants();
        method
            .attributes()
            .iter()
            .find(|attr| constants.attribute_name(attr) == Some(Code::NAME))
            .and_then(|attr| attr.decode::<Code>().ok())
    }

    pub fn is_complete(&self) -> bool {
        self.complete.get()
    }

    /// Finalize the class once all additions are done, computing the structural hash
    ///
    /// Calling this more than once is harmless. Any later modification undoes it.
    pub fn code_complete(&self) {
        if !self.complete.get() {
            let mut hasher = DefaultHasher::new();
            self.structure().hash(&mut hasher);
            self.hash.set(Some(hasher.finish()));
            self.complete.set(true);
        }
    }

    /// Hash of the structure of the class (only available after `code_complete`)
    pub fn structural_hash(&self) -> Option<u64> {
        self.hash.get()
    }

    /// Compare the structure of two completed classes, ignoring their names
    pub fn structurally_equal(&self, other: &ClassModel) -> bool {
        match (self.structural_hash(), other.structural_hash()) {
            (Some(hash1), Some(hash2)) if hash1 == hash2 => self.structure() == other.structure(),
            _ => false,
        }
    }

    fn structure(&self) -> Structure {
        let own_name = self.name.as_str();
        let own_descriptor = self.descriptor();
        let constants = self.constants();

        let code_attributes = |member: &MemberItem| -> Vec<Vec<u8>> {
            member
                .attributes()
                .iter()
                .filter(|attr| constants.attribute_name(attr) == Some(Code::NAME))
                .map(|attr| attr.info.clone())
                .collect()
        };

        let scalars = constants
            .iter()
            .filter_map(|(_, constant)| match constant {
                Constant::Integer(i) => Some(Scalar::Integer(*i)),
                Constant::Float(f) => Some(Scalar::Float(f.to_bits())),
                Constant::Long(l) => Some(Scalar::Long(*l)),
                Constant::Double(d) => Some(Scalar::Double(d.to_bits())),
                Constant::String(utf8) => constants
                    .utf8(*utf8)
                    .filter(|s| *s != own_name && *s != own_descriptor)
                    .map(|s| Scalar::String(s.to_owned())),
                _ => None,
            })
            .collect();

        Structure {
            package: self.package().to_owned(),
            superclass: self.superclass.as_ref().map(|s| s.as_str().to_owned()),
            interfaces: self.interfaces.iter().map(|i| i.as_str().to_owned()).collect(),
            access_flags: self.access_flags.bits(),
            fields: self
                .fields()
                .map(|field| {
                    (
                        field.name().as_str().to_owned(),
                        field.descriptor().to_owned(),
                        field.access_flags(),
                    )
                })
                .collect(),
            methods: self
                .methods()
                .map(|method| MethodStructure {
                    name: method.name().as_str().to_owned(),
                    descriptor: method.descriptor().to_owned(),
                    access_flags: method.access_flags(),
                    exceptions: method
                        .exceptions()
                        .iter()
                        .map(|e| e.as_str().to_owned())
                        .collect(),
                    code: code_attributes(method),
                })
                .collect(),
            scalars,
        }
    }

    /// Assemble the class file for writing
    pub fn to_class_file(&self) -> Result<ClassFile, super::Error> {
        let mut constants = self.constants().clone();
        let mut member_indices = |member: &MemberItem| -> Result<
            (Utf8ConstantIndex, Utf8ConstantIndex),
            super::Error,
        > {
            match member.pool_indices() {
                Some(indices) => Ok(indices),
                None => Ok((
                    constants.get_utf8(member.name().as_str())?,
                    constants.get_utf8(member.descriptor())?,
                )),
            }
        };

        let mut fields = vec![];
        for field in self.fields() {
            let (name_index, descriptor_index) = member_indices(field)?;
            fields.push(Field {
                access_flags: FieldAccessFlags::from_bits_truncate(field.access_flags()),
                name_index,
                descriptor_index,
                attributes: field.attributes().to_vec(),
            });
        }

        let mut methods = vec![];
        for method in self.methods() {
            let (name_index, descriptor_index) = member_indices(method)?;
            methods.push(Method {
                access_flags: MethodAccessFlags::from_bits_truncate(method.access_flags()),
                name_index,
                descriptor_index,
                attributes: method.attributes().to_vec(),
            });
        }

        Ok(ClassFile {
            version: self.version,
            constants,
            access_flags: self.access_flags,
            this_class: self.this_index,
            super_class: self.super_index,
            interfaces: self.interface_indices.clone(),
            fields,
            methods,
            attributes: self.attributes.clone(),
        })
    }
}

impl std::fmt::Debug for ClassModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassModel")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("origin", &self.origin)
            .field("modifiable", &self.is_modifiable())
            .field("modified", &self.is_modified())
            .finish()
    }
}

/// Everything the structural hash and equality look at
#[derive(Hash, PartialEq, Eq)]
struct Structure {
    package: String,
    superclass: Option<String>,
    interfaces: Vec<String>,
    access_flags: u16,
    fields: Vec<(String, String, u16)>,
    methods: Vec<MethodStructure>,
    scalars: Vec<Scalar>,
}

#[derive(Hash, PartialEq, Eq)]
struct MethodStructure {
    name: String,
    descriptor: String,
    access_flags: u16,
    exceptions: Vec<String>,
    code: Vec<Vec<u8>>,
}

#[derive(Hash, PartialEq, Eq)]
enum Scalar {
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    String(String),
}
