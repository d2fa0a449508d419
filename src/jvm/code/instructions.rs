//! AST of the JVM bytecode the weaver emits
//!
//! The representation is slightly different from the usual presentation, to make it convenient
//! to construct bytecode:
//!
//!   - the "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - families of instructions that only differ in operand type (eg. `iload`, `lload`, `aload`)
//!     get abstracted into one instruction with a kind field, and constant pushes pick the
//!     shortest encoding on their own
//!
//!   - members and classes are symbolic: they only turn into constant pool indices at encoding
//!

use crate::jvm::class_file::{Constant, ConstantPoolOverflow, ConstantsPool};
use crate::jvm::{BaseType, BinaryName, FieldType, Name, RefType, UnqualifiedName};
use std::ops::Not;

/// Non-branching JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConst(i32), // covers `iconst_<n>`, `bipush`, `sipush`, and `ldc` of an integer
    LConst(i64), // covers `lconst_<n>` and `ldc2_w` of a long
    FConst(f32),
    DConst(f64),
    Ldc(LoadableConstant), // covers both `ldc` and `ldc_w`
    Load(ValueKind, u16),  // covers `iload`, `iload_<n>`, and `wide iload`
    Store(ValueKind, u16),
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    ArrayLoad(ArrayKind),
    ArrayStore(ArrayKind),
    Pop,
    Pop2,
    Dup,
    DupX1,
    Swap,
    Arithmetic(NumericKind, ArithmeticOp),
    Neg(NumericKind),
    Shift(IntegralKind, ShiftType),
    Bitwise(IntegralKind, BitwiseOp),
    Convert(Conversion),
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),
    New(BinaryName),
    NewArray(BaseType),
    ANewArray(RefType<BinaryName>),
    ArrayLength,
    CheckCast(RefType<BinaryName>),
    InstanceOf(RefType<BinaryName>),
}

/// Constants `ldc` can push (numbers go through the `*Const` instructions instead)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadableConstant {
    String(String),
    Class(RefType<BinaryName>),
}

/// Symbolic reference to a field
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: String,
}

/// Symbolic reference to a method
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: String,
    pub is_interface: bool,
}

/// Kind of value in a local variable (also picks the typed return instruction)
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    pub fn of(field_type: &FieldType<BinaryName>) -> ValueKind {
        match field_type {
            FieldType::Base(BaseType::Long) => ValueKind::Long,
            FieldType::Base(BaseType::Float) => ValueKind::Float,
            FieldType::Base(BaseType::Double) => ValueKind::Double,
            FieldType::Base(_) => ValueKind::Int,
            FieldType::Ref(_) => ValueKind::Reference,
        }
    }
}

/// Kind of array element (`boolean` arrays share the `byte` instructions)
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Byte,
    Char,
    Short,
}

impl ArrayKind {
    pub fn of(element_type: &FieldType<BinaryName>) -> ArrayKind {
        match element_type {
            FieldType::Base(BaseType::Int) => ArrayKind::Int,
            FieldType::Base(BaseType::Long) => ArrayKind::Long,
            FieldType::Base(BaseType::Float) => ArrayKind::Float,
            FieldType::Base(BaseType::Double) => ArrayKind::Double,
            FieldType::Base(BaseType::Byte | BaseType::Boolean) => ArrayKind::Byte,
            FieldType::Base(BaseType::Char) => ArrayKind::Char,
            FieldType::Base(BaseType::Short) => ArrayKind::Short,
            FieldType::Ref(_) => ArrayKind::Reference,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum NumericKind {
    Int,
    Long,
    Float,
    Double,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum IntegralKind {
    Int,
    Long,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum BitwiseOp {
    And,
    Or,
    Xor,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Conversion {
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
}

impl Conversion {
    /// Input and output types of the conversion
    pub fn signature(self) -> (BaseType, BaseType) {
        use BaseType::*;
        match self {
            Conversion::I2L => (Int, Long),
            Conversion::I2F => (Int, Float),
            Conversion::I2D => (Int, Double),
            Conversion::L2I => (Long, Int),
            Conversion::L2F => (Long, Float),
            Conversion::L2D => (Long, Double),
            Conversion::F2I => (Float, Int),
            Conversion::F2L => (Float, Long),
            Conversion::F2D => (Float, Double),
            Conversion::D2I => (Double, Int),
            Conversion::D2L => (Double, Long),
            Conversion::D2F => (Double, Float),
            Conversion::I2B => (Int, Byte),
            Conversion::I2C => (Int, Char),
            Conversion::I2S => (Int, Short),
        }
    }
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Type of method to invoke
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}

fn push_u16(code: &mut Vec<u8>, value: u16) {
    code.extend_from_slice(&value.to_be_bytes());
}

/// `ldc` or `ldc_w`, depending on the index
fn encode_ldc(code: &mut Vec<u8>, index: u16) {
    match u8::try_from(index) {
        Ok(b) => code.extend_from_slice(&[0x12, b]),
        Err(_) => {
            code.push(0x13);
            push_u16(code, index);
        }
    }
}

/// The load/store instructions follow the same pattern:
///
///   - short form (0-3) have special bytes
///   - normal form (0-255) use `iload` plus a byte operand
///   - wide form (255-65535) use `wide iload` plus two byte operands
fn encode_load_or_store(code: &mut Vec<u8>, idx: u16, short_form_start: u8, normal_form: u8) {
    match u8::try_from(idx) {
        Ok(n @ 0..=3) => code.push(short_form_start + n),
        Ok(n) => code.extend_from_slice(&[normal_form, n]),
        Err(_) => {
            code.extend_from_slice(&[0xC4, normal_form]);
            push_u16(code, idx);
        }
    }
}

fn class_constant(
    pool: &mut ConstantsPool,
    ref_type: &RefType<BinaryName>,
) -> Result<u16, ConstantPoolOverflow> {
    Ok(pool.get_class(&ref_type.class_key())?.0 .0)
}

impl Instruction {
    /// Append the encoded instruction, interning whatever constants it refers to
    pub fn encode(
        &self,
        pool: &mut ConstantsPool,
        code: &mut Vec<u8>,
    ) -> Result<(), ConstantPoolOverflow> {
        match self {
            Instruction::Nop => code.push(0x00),
            Instruction::AConstNull => code.push(0x01),
            Instruction::IConst(value) => match *value {
                n @ -1..=5 => code.push((0x03 + n) as u8),
                n if i8::try_from(n).is_ok() => code.extend_from_slice(&[0x10, n as i8 as u8]),
                n if i16::try_from(n).is_ok() => {
                    code.push(0x11);
                    code.extend_from_slice(&(n as i16).to_be_bytes());
                }
                n => {
                    let index = pool.intern(Constant::Integer(n))?;
                    encode_ldc(code, index.0);
                }
            },
            Instruction::LConst(value) => match *value {
                0 => code.push(0x09),
                1 => code.push(0x0a),
                n => {
                    let index = pool.intern(Constant::Long(n))?;
                    code.push(0x14);
                    push_u16(code, index.0);
                }
            },
            Instruction::FConst(value) => {
                let value = *value;
                if value.to_bits() == 0f32.to_bits() {
                    code.push(0x0b);
                } else if value == 1.0 {
                    code.push(0x0c);
                } else if value == 2.0 {
                    code.push(0x0d);
                } else {
                    let index = pool.intern(Constant::Float(value))?;
                    encode_ldc(code, index.0);
                }
            }
            Instruction::DConst(value) => {
                let value = *value;
                if value.to_bits() == 0f64.to_bits() {
                    code.push(0x0e);
                } else if value == 1.0 {
                    code.push(0x0f);
                } else {
                    let index = pool.intern(Constant::Double(value))?;
                    code.push(0x14);
                    push_u16(code, index.0);
                }
            }
            Instruction::Ldc(LoadableConstant::String(string)) => {
                let index = pool.get_string(string)?;
                encode_ldc(code, index.0 .0);
            }
            Instruction::Ldc(LoadableConstant::Class(class)) => {
                let index = class_constant(pool, class)?;
                encode_ldc(code, index);
            }
            Instruction::Load(kind, idx) => {
                let (short_form, normal_form) = match kind {
                    ValueKind::Int => (0x1a, 0x15),
                    ValueKind::Long => (0x1e, 0x16),
                    ValueKind::Float => (0x22, 0x17),
                    ValueKind::Double => (0x26, 0x18),
                    ValueKind::Reference => (0x2a, 0x19),
                };
                encode_load_or_store(code, *idx, short_form, normal_form);
            }
            Instruction::Store(kind, idx) => {
                let (short_form, normal_form) = match kind {
                    ValueKind::Int => (0x3b, 0x36),
                    ValueKind::Long => (0x3f, 0x37),
                    ValueKind::Float => (0x43, 0x38),
                    ValueKind::Double => (0x47, 0x39),
                    ValueKind::Reference => (0x4b, 0x3a),
                };
                encode_load_or_store(code, *idx, short_form, normal_form);
            }
            Instruction::IInc(idx, diff) => match (u8::try_from(*idx), i8::try_from(*diff)) {
                (Ok(b), Ok(d)) => code.extend_from_slice(&[0x84, b, d as u8]),
                _ => {
                    code.extend_from_slice(&[0xc4, 0x84]);
                    push_u16(code, *idx);
                    code.extend_from_slice(&diff.to_be_bytes());
                }
            },
            Instruction::ArrayLoad(kind) => code.push(match kind {
                ArrayKind::Int => 0x2e,
                ArrayKind::Long => 0x2f,
                ArrayKind::Float => 0x30,
                ArrayKind::Double => 0x31,
                ArrayKind::Reference => 0x32,
                ArrayKind::Byte => 0x33,
                ArrayKind::Char => 0x34,
                ArrayKind::Short => 0x35,
            }),
            Instruction::ArrayStore(kind) => code.push(match kind {
                ArrayKind::Int => 0x4f,
                ArrayKind::Long => 0x50,
                ArrayKind::Float => 0x51,
                ArrayKind::Double => 0x52,
                ArrayKind::Reference => 0x53,
                ArrayKind::Byte => 0x54,
                ArrayKind::Char => 0x55,
                ArrayKind::Short => 0x56,
            }),
            Instruction::Pop => code.push(0x57),
            Instruction::Pop2 => code.push(0x58),
            Instruction::Dup => code.push(0x59),
            Instruction::DupX1 => code.push(0x5a),
            Instruction::Swap => code.push(0x5f),
            Instruction::Arithmetic(kind, op) => {
                let base = match op {
                    ArithmeticOp::Add => 0x60,
                    ArithmeticOp::Sub => 0x64,
                    ArithmeticOp::Mul => 0x68,
                    ArithmeticOp::Div => 0x6c,
                    ArithmeticOp::Rem => 0x70,
                };
                code.push(base + *kind as u8);
            }
            Instruction::Neg(kind) => code.push(0x74 + *kind as u8),
            Instruction::Shift(kind, shift) => {
                let base = match shift {
                    ShiftType::Left => 0x78,
                    ShiftType::ArithmeticRight => 0x7a,
                    ShiftType::LogicalRight => 0x7c,
                };
                code.push(base + *kind as u8);
            }
            Instruction::Bitwise(kind, op) => {
                let base = match op {
                    BitwiseOp::And => 0x7e,
                    BitwiseOp::Or => 0x80,
                    BitwiseOp::Xor => 0x82,
                };
                code.push(base + *kind as u8);
            }
            Instruction::Convert(conversion) => code.push(0x85 + *conversion as u8),
            Instruction::LCmp => code.push(0x94),
            Instruction::FCmp(CompareMode::L) => code.push(0x95),
            Instruction::FCmp(CompareMode::G) => code.push(0x96),
            Instruction::DCmp(CompareMode::L) => code.push(0x97),
            Instruction::DCmp(CompareMode::G) => code.push(0x98),
            Instruction::GetStatic(field)
            | Instruction::PutStatic(field)
            | Instruction::GetField(field)
            | Instruction::PutField(field) => {
                let opcode = match self {
                    Instruction::GetStatic(_) => 0xb2,
                    Instruction::PutStatic(_) => 0xb3,
                    Instruction::GetField(_) => 0xb4,
                    _ => 0xb5,
                };
                let index = pool.get_field_ref(
                    field.class.as_str(),
                    field.name.as_str(),
                    &field.descriptor,
                )?;
                code.push(opcode);
                push_u16(code, index.0 .0);
            }
            Instruction::Invoke(invoke_type, method) => {
                let index = pool.get_method_ref(
                    method.class.as_str(),
                    method.name.as_str(),
                    &method.descriptor,
                    method.is_interface,
                )?;
                match invoke_type {
                    InvokeType::Virtual => code.push(0xb6),
                    InvokeType::Special => code.push(0xb7),
                    InvokeType::Static => code.push(0xb8),
                    InvokeType::Interface => code.push(0xb9),
                }
                push_u16(code, index.0 .0);
                if *invoke_type == InvokeType::Interface {
                    code.extend_from_slice(&[interface_arg_count(&method.descriptor), 0]);
                }
            }
            Instruction::New(class) => {
                let index = pool.get_class(class.as_str())?;
                code.push(0xbb);
                push_u16(code, index.0 .0);
            }
            Instruction::NewArray(base_type) => {
                let atype: u8 = match base_type {
                    BaseType::Boolean => 4,
                    BaseType::Char => 5,
                    BaseType::Float => 6,
                    BaseType::Double => 7,
                    BaseType::Byte => 8,
                    BaseType::Short => 9,
                    BaseType::Int => 10,
                    BaseType::Long => 11,
                };
                code.extend_from_slice(&[0xbc, atype]);
            }
            Instruction::ANewArray(element) => {
                let index = class_constant(pool, element)?;
                code.push(0xbd);
                push_u16(code, index);
            }
            Instruction::ArrayLength => code.push(0xbe),
            Instruction::CheckCast(class) => {
                let index = class_constant(pool, class)?;
                code.push(0xc0);
                push_u16(code, index);
            }
            Instruction::InstanceOf(class) => {
                let index = class_constant(pool, class)?;
                code.push(0xc1);
                push_u16(code, index);
            }
        }
        Ok(())
    }
}

/// `count` operand of `invokeinterface`: argument slots, including `this`
fn interface_arg_count(descriptor: &str) -> u8 {
    use crate::jvm::{MethodDescriptor, ParseDescriptor};
    MethodDescriptor::<BinaryName>::parse(descriptor)
        .map(|parsed| parsed.parameter_length(true).min(255) as u8)
        .unwrap_or(1)
}

/// Branching JVM bytecode instruction, or one which ends a basic block
///
/// The type parameter abstracts over the representation of jump targets: while code is being
/// built they are symbolic, and shortly before the final serialization step they become signed
/// 16-bit offsets into the code array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchInstruction<Target> {
    If(OrdComparison, Target), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Target), // covers `if_icmpeq`, `if_icmpne`, ... `if_icmple`
    IfACmp(EqComparison, Target), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Target), // covers `ifnull`, `ifnonnull`
    Goto(Target),
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
}

impl<T> BranchInstruction<T> {
    pub fn target(&self) -> Option<&T> {
        match self {
            BranchInstruction::If(_, target)
            | BranchInstruction::IfICmp(_, target)
            | BranchInstruction::IfACmp(_, target)
            | BranchInstruction::IfNull(_, target)
            | BranchInstruction::Goto(target) => Some(target),
            _ => None,
        }
    }

    /// Can execution continue with the next instruction?
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            BranchInstruction::If(..)
                | BranchInstruction::IfICmp(..)
                | BranchInstruction::IfACmp(..)
                | BranchInstruction::IfNull(..)
        )
    }

    pub fn map_target<T2>(&self, map: impl FnOnce(&T) -> T2) -> BranchInstruction<T2> {
        use BranchInstruction::*;
        match self {
            If(op, target) => If(*op, map(target)),
            IfICmp(op, target) => IfICmp(*op, map(target)),
            IfACmp(op, target) => IfACmp(*op, map(target)),
            IfNull(op, target) => IfNull(*op, map(target)),
            Goto(target) => Goto(map(target)),
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
        }
    }

    /// Size of the encoded instruction
    pub fn encoded_len(&self) -> usize {
        if self.target().is_some() {
            3
        } else {
            1
        }
    }
}

impl BranchInstruction<i16> {
    pub fn encode(&self, code: &mut Vec<u8>) {
        let (opcode, offset): (u8, Option<i16>) = match self {
            BranchInstruction::If(comp, offset) => {
                let opcode = match comp {
                    OrdComparison::EQ => 0x99,
                    OrdComparison::NE => 0x9a,
                    OrdComparison::LT => 0x9b,
                    OrdComparison::GE => 0x9c,
                    OrdComparison::GT => 0x9d,
                    OrdComparison::LE => 0x9e,
                };
                (opcode, Some(*offset))
            }
            BranchInstruction::IfICmp(comp, offset) => {
                let opcode = match comp {
                    OrdComparison::EQ => 0x9f,
                    OrdComparison::NE => 0xa0,
                    OrdComparison::LT => 0xa1,
                    OrdComparison::GE => 0xa2,
                    OrdComparison::GT => 0xa3,
                    OrdComparison::LE => 0xa4,
                };
                (opcode, Some(*offset))
            }
            BranchInstruction::IfACmp(comp, offset) => {
                let opcode = match comp {
                    EqComparison::EQ => 0xa5,
                    EqComparison::NE => 0xa6,
                };
                (opcode, Some(*offset))
            }
            BranchInstruction::IfNull(comp, offset) => {
                let opcode = match comp {
                    EqComparison::EQ => 0xc6,
                    EqComparison::NE => 0xc7,
                };
                (opcode, Some(*offset))
            }
            BranchInstruction::Goto(offset) => (0xa7, Some(*offset)),
            BranchInstruction::IReturn => (0xac, None),
            BranchInstruction::LReturn => (0xad, None),
            BranchInstruction::FReturn => (0xae, None),
            BranchInstruction::DReturn => (0xaf, None),
            BranchInstruction::AReturn => (0xb0, None),
            BranchInstruction::Return => (0xb1, None),
            BranchInstruction::AThrow => (0xbf, None),
        };
        code.push(opcode);
        if let Some(offset) = offset {
            code.extend_from_slice(&offset.to_be_bytes());
        }
    }
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn encode(insn: Instruction) -> (Vec<u8>, ConstantsPool) {
        let mut pool = ConstantsPool::new();
        let mut code = vec![];
        insn.encode(&mut pool, &mut code).unwrap();
        (code, pool)
    }

    #[test]
    fn integer_pushes_pick_shortest_form() {
        assert_eq!(encode(Instruction::IConst(-1)).0, vec![0x02]);
        assert_eq!(encode(Instruction::IConst(5)).0, vec![0x08]);
        assert_eq!(encode(Instruction::IConst(-100)).0, vec![0x10, 0x9c]);
        assert_eq!(encode(Instruction::IConst(1000)).0, vec![0x11, 0x03, 0xe8]);

        let (code, pool) = encode(Instruction::IConst(100_000));
        assert_eq!(code, vec![0x12, 0x01]);
        assert_eq!(pool.get(crate::jvm::class_file::ConstantIndex(1)), Some(&Constant::Integer(100_000)));
    }

    #[test]
    fn load_store_forms() {
        assert_eq!(encode(Instruction::Load(ValueKind::Reference, 0)).0, vec![0x2a]);
        assert_eq!(encode(Instruction::Load(ValueKind::Int, 7)).0, vec![0x15, 7]);
        assert_eq!(
            encode(Instruction::Store(ValueKind::Long, 300)).0,
            vec![0xc4, 0x37, 0x01, 0x2c]
        );
        assert_eq!(encode(Instruction::IInc(2, -1)).0, vec![0x84, 2, 0xff]);
    }

    #[test]
    fn grouped_opcodes() {
        let op = |kind, op| encode(Instruction::Arithmetic(kind, op)).0[0];
        assert_eq!(op(NumericKind::Int, ArithmeticOp::Add), 0x60);
        assert_eq!(op(NumericKind::Double, ArithmeticOp::Rem), 0x73);
        assert_eq!(encode(Instruction::Neg(NumericKind::Long)).0, vec![0x75]);
        assert_eq!(
            encode(Instruction::Shift(IntegralKind::Long, ShiftType::LogicalRight)).0,
            vec![0x7d]
        );
        assert_eq!(
            encode(Instruction::Bitwise(IntegralKind::Int, BitwiseOp::Xor)).0,
            vec![0x82]
        );
        assert_eq!(encode(Instruction::Convert(Conversion::I2S)).0, vec![0x93]);
        assert_eq!(encode(Instruction::Convert(Conversion::L2F)).0, vec![0x89]);
    }

    #[test]
    fn interface_calls_carry_argument_count() {
        let method = MethodRef {
            class: BinaryName::LIST,
            name: UnqualifiedName::ADD,
            descriptor: String::from("(Ljava/lang/Object;)Z"),
            is_interface: true,
        };
        let (code, pool) = encode(Instruction::Invoke(InvokeType::Interface, method));
        assert_eq!(code.len(), 5);
        assert_eq!(code[0], 0xb9);
        assert_eq!(&code[3..], &[2, 0]);
        assert!(pool.len() > 1);
    }

    #[test]
    fn branch_encoding() {
        let mut code = vec![];
        BranchInstruction::IfNull(EqComparison::NE, -3i16).encode(&mut code);
        BranchInstruction::<i16>::AReturn.encode(&mut code);
        assert_eq!(code, vec![0xc7, 0xff, 0xfd, 0xb0]);
        assert_eq!(BranchInstruction::Goto(()).encoded_len(), 3);
        assert!(!BranchInstruction::Goto(()).falls_through());
    }
}
