use super::{BranchInstruction, FieldRef, Instruction, InvokeType, MethodRef, ValueKind};
use crate::jvm::{BinaryName, FieldType, MemberItem, UnqualifiedName};
use crate::util::Width;

/// Picks the right instruction for a type or member
///
/// Everything here is stateless: the point is to keep the opcode selection rules in one place,
/// out of the assembler.
pub struct InstructionEmitter;

impl InstructionEmitter {
    pub fn load(field_type: &FieldType<BinaryName>, slot: u16) -> Instruction {
        Instruction::Load(ValueKind::of(field_type), slot)
    }

    pub fn store(field_type: &FieldType<BinaryName>, slot: u16) -> Instruction {
        Instruction::Store(ValueKind::of(field_type), slot)
    }

    /// Typed return (or plain `return` for `void`)
    pub fn return_for(return_type: Option<&FieldType<BinaryName>>) -> BranchInstruction<()> {
        match return_type.map(ValueKind::of) {
            None => BranchInstruction::Return,
            Some(ValueKind::Int) => BranchInstruction::IReturn,
            Some(ValueKind::Long) => BranchInstruction::LReturn,
            Some(ValueKind::Float) => BranchInstruction::FReturn,
            Some(ValueKind::Double) => BranchInstruction::DReturn,
            Some(ValueKind::Reference) => BranchInstruction::AReturn,
        }
    }

    pub fn push_int(value: i32) -> Instruction {
        Instruction::IConst(value)
    }

    /// Read or write of a field (static-ness comes from the field's access flags)
    pub fn field_access(field: &MemberItem, write: bool) -> Instruction {
        let field_ref = FieldRef {
            class: field.class_name().clone(),
            name: field.name().clone(),
            descriptor: field.descriptor().to_owned(),
        };
        match (field.is_static(), write) {
            (true, false) => Instruction::GetStatic(field_ref),
            (true, true) => Instruction::PutStatic(field_ref),
            (false, false) => Instruction::GetField(field_ref),
            (false, true) => Instruction::PutField(field_ref),
        }
    }

    /// Call of a method, using whichever `invoke*` instruction its declaration calls for
    pub fn invoke(method: &MemberItem, owner_is_interface: bool) -> Instruction {
        let invoke_type = if method.is_static() {
            InvokeType::Static
        } else if *method.name() == UnqualifiedName::INIT || method.access_flags() & 0x0002 != 0 {
            InvokeType::Special
        } else if owner_is_interface {
            InvokeType::Interface
        } else {
            InvokeType::Virtual
        };
        Instruction::Invoke(
            invoke_type,
            MethodRef {
                class: method.class_name().clone(),
                name: method.name().clone(),
                descriptor: method.descriptor().to_owned(),
                is_interface: owner_is_interface,
            },
        )
    }

    /// Discard a value (a stack entry, or one of a given type)
    pub fn pop_for(value: &impl Width) -> Instruction {
        if value.width() == 2 {
            Instruction::Pop2
        } else {
            Instruction::Pop
        }
    }
}
