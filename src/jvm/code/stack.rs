use crate::jvm::{BaseType, BinaryName, ClassRegistry, Error, FieldType, Name, RefType, RenderDescriptor};
use crate::util::Width;

/// Type of an entry on the operand stack, as tracked while building a method
///
/// This is coarser than `FieldType`: the JVM keeps every `int`-like primitive as an `int` on the
/// stack, and `null` needs a type of its own since it fits any reference.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum StackType {
    Int,
    Long,
    Float,
    Double,
    Null,
    Reference(RefType<BinaryName>),
}

impl StackType {
    pub fn from_field_type(field_type: &FieldType<BinaryName>) -> StackType {
        match field_type {
            FieldType::Base(BaseType::Long) => StackType::Long,
            FieldType::Base(BaseType::Float) => StackType::Float,
            FieldType::Base(BaseType::Double) => StackType::Double,
            FieldType::Base(_) => StackType::Int,
            FieldType::Ref(ref_type) => StackType::Reference(ref_type.clone()),
        }
    }

    pub fn object(class: BinaryName) -> StackType {
        StackType::Reference(RefType::Object(class))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, StackType::Null | StackType::Reference(_))
    }

    /// Human readable form, for error messages and branch tracking
    pub fn describe(&self) -> String {
        match self {
            StackType::Int => String::from("int"),
            StackType::Long => String::from("long"),
            StackType::Float => String::from("float"),
            StackType::Double => String::from("double"),
            StackType::Null => String::from("null"),
            StackType::Reference(RefType::Object(class)) => class.as_str().to_owned(),
            StackType::Reference(array) => array.render(),
        }
    }
}

impl Width for StackType {
    fn width(&self) -> usize {
        match self {
            StackType::Long | StackType::Double => 2,
            _ => 1,
        }
    }
}

/// Render a whole stack, bottom first
pub fn describe_stack(stack: &[StackType]) -> String {
    let entries: Vec<String> = stack.iter().map(StackType::describe).collect();
    format!("[{}]", entries.join(", "))
}

/// Can the stack entry be consumed where a value of the expected type is needed?
pub fn fits(
    registry: &ClassRegistry,
    actual: &StackType,
    expected: &FieldType<BinaryName>,
) -> Result<bool, Error> {
    Ok(match (actual, expected) {
        (StackType::Int, FieldType::Base(base)) => base.is_int_category(),
        (StackType::Long, FieldType::Base(BaseType::Long)) => true,
        (StackType::Float, FieldType::Base(BaseType::Float)) => true,
        (StackType::Double, FieldType::Base(BaseType::Double)) => true,
        (StackType::Null, FieldType::Ref(_)) => true,
        (StackType::Reference(from), FieldType::Ref(to)) => {
            from == to || registry.is_ref_assignable(from, to)?
        }
        _ => false,
    })
}

/// Combine the types of two paths meeting at a branch target
///
/// The more general of the two types is kept. `None` means the types can't be merged.
pub fn merge(
    registry: &ClassRegistry,
    left: &StackType,
    right: &StackType,
) -> Result<Option<StackType>, Error> {
    Ok(match (left, right) {
        _ if left == right => Some(left.clone()),
        (StackType::Null, StackType::Reference(_)) => Some(right.clone()),
        (StackType::Reference(_), StackType::Null) => Some(left.clone()),
        (StackType::Reference(l), StackType::Reference(r)) => {
            if registry.is_ref_assignable(l, r)? {
                Some(right.clone())
            } else if registry.is_ref_assignable(r, l)? {
                Some(left.clone())
            } else {
                None
            }
        }
        _ => None,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn int_category_collapses() {
        for base in [BaseType::Boolean, BaseType::Byte, BaseType::Char, BaseType::Short] {
            assert_eq!(StackType::from_field_type(&FieldType::Base(base)), StackType::Int);
        }
        assert_eq!(StackType::from_field_type(&FieldType::long()), StackType::Long);
        assert_eq!(StackType::Double.width(), 2);
        assert_eq!(StackType::Null.width(), 1);
    }

    #[test]
    fn describe_entries() {
        let strings = StackType::from_field_type(&FieldType::array(FieldType::object(
            BinaryName::STRING,
        )));
        assert_eq!(
            describe_stack(&[StackType::Int, StackType::object(BinaryName::OBJECT), strings]),
            "[int, java/lang/Object, [Ljava/lang/String;]"
        );
    }
}
