//! Just enough bytecode decoding to check generated code hangs together
//!
//! This walks the code array, finding instruction boundaries, then checks every branch lands on
//! one of them and every constant pool operand is in range.

use crate::jvm::class_file::ConstantsPool;
use std::collections::BTreeSet;

/// What went wrong while walking a code array
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    UnknownOpcode { offset: usize, opcode: u8 },
    Truncated { offset: usize },
    BadBranch { offset: usize, target: i64 },
    BadConstant { offset: usize, index: u16 },
    FallsOffEnd,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnknownOpcode { offset, opcode } => {
                write!(f, "unknown opcode {:#04x} at {}", opcode, offset)
            }
            DecodeError::Truncated { offset } => write!(f, "truncated instruction at {}", offset),
            DecodeError::BadBranch { offset, target } => {
                write!(f, "branch at {} to {} is not an instruction boundary", offset, target)
            }
            DecodeError::BadConstant { offset, index } => {
                write!(f, "constant index {} at {} is out of range", index, offset)
            }
            DecodeError::FallsOffEnd => write!(f, "last instruction falls off the end"),
        }
    }
}

/// How to find the operands of an opcode
enum Layout {
    /// Fixed size instruction (size includes the opcode)
    Fixed(usize),

    /// Fixed size, with a constant pool index in the first two operand bytes
    Constant(usize),

    /// `ldc`: one byte constant pool index
    ConstantByte,

    /// Two byte branch offset
    Branch,

    /// Four byte branch offset
    WideBranch,

    TableSwitch,
    LookupSwitch,
    Wide,
}

fn layout(opcode: u8) -> Option<Layout> {
    use Layout::*;
    Some(match opcode {
        0x00..=0x0f => Fixed(1),
        0x10 => Fixed(2),
        0x11 => Fixed(3),
        0x12 => ConstantByte,
        0x13 | 0x14 => Constant(3),
        0x15..=0x19 => Fixed(2),
        0x1a..=0x35 => Fixed(1),
        0x36..=0x3a => Fixed(2),
        0x3b..=0x83 => Fixed(1),
        0x84 => Fixed(3),
        0x85..=0x98 => Fixed(1),
        0x99..=0xa8 => Branch,
        0xa9 => Fixed(2),
        0xaa => TableSwitch,
        0xab => LookupSwitch,
        0xac..=0xb1 => Fixed(1),
        0xb2..=0xb8 => Constant(3),
        0xb9 => Constant(5),
        0xba => Constant(5),
        0xbb => Constant(3),
        0xbc => Fixed(2),
        0xbd => Constant(3),
        0xbe | 0xbf => Fixed(1),
        0xc0 | 0xc1 => Constant(3),
        0xc2 | 0xc3 => Fixed(1),
        0xc4 => Wide,
        0xc5 => Constant(4),
        0xc6 | 0xc7 => Branch,
        0xc8 | 0xc9 => WideBranch,
        _ => return None,
    })
}

/// Opcodes after which execution never continues with the next instruction
fn ends_block(opcode: u8) -> bool {
    matches!(opcode, 0xa7 | 0xa9 | 0xaa | 0xab | 0xac..=0xb1 | 0xbf | 0xc8)
}

fn read_u16(code: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*code.get(at)?, *code.get(at + 1)?]))
}

fn read_i32(code: &[u8], at: usize) -> Option<i32> {
    Some(i32::from_be_bytes([
        *code.get(at)?,
        *code.get(at + 1)?,
        *code.get(at + 2)?,
        *code.get(at + 3)?,
    ]))
}

/// Check the structure of a code array against the constant pool it was encoded with
///
/// Returns the offsets of the instructions.
pub fn check_code(code: &[u8], constants: &ConstantsPool) -> Result<BTreeSet<usize>, DecodeError> {
    let mut boundaries = BTreeSet::new();
    let mut branches: Vec<(usize, i64)> = vec![];
    let mut offset = 0;
    let mut last_opcode = None;

    while offset < code.len() {
        let opcode = code[offset];
        let truncated = DecodeError::Truncated { offset };
        boundaries.insert(offset);
        last_opcode = Some(opcode);

        let check_constant = |index: u16| {
            if index == 0 || index >= constants.len() {
                Err(DecodeError::BadConstant { offset, index })
            } else {
                Ok(())
            }
        };

        let size = match layout(opcode).ok_or(DecodeError::UnknownOpcode { offset, opcode })? {
            Layout::Fixed(size) => size,
            Layout::Constant(size) => {
                check_constant(read_u16(code, offset + 1).ok_or(truncated)?)?;
                size
            }
            Layout::ConstantByte => {
                check_constant(*code.get(offset + 1).ok_or(truncated)? as u16)?;
                2
            }
            Layout::Branch => {
                let jump = read_u16(code, offset + 1).ok_or(truncated)? as i16;
                branches.push((offset, offset as i64 + jump as i64));
                3
            }
            Layout::WideBranch => {
                let jump = read_i32(code, offset + 1).ok_or(truncated)?;
                branches.push((offset, offset as i64 + jump as i64));
                5
            }
            Layout::TableSwitch | Layout::LookupSwitch => {
                let start = (offset + 4) & !3;
                let default = read_i32(code, start).ok_or(DecodeError::Truncated { offset })?;
                branches.push((offset, offset as i64 + default as i64));
                let (entries, entry_size, first) = if opcode == 0xaa {
                    let low = read_i32(code, start + 4).ok_or(DecodeError::Truncated { offset })?;
                    let high = read_i32(code, start + 8).ok_or(DecodeError::Truncated { offset })?;
                    ((high as i64 - low as i64 + 1).max(0) as usize, 4, start + 12)
                } else {
                    let pairs = read_i32(code, start + 4).ok_or(DecodeError::Truncated { offset })?;
                    (pairs.max(0) as usize, 8, start + 8)
                };
                for entry in 0..entries {
                    let at = first + entry * entry_size + entry_size - 4;
                    let jump = read_i32(code, at).ok_or(DecodeError::Truncated { offset })?;
                    branches.push((offset, offset as i64 + jump as i64));
                }
                first + entries * entry_size - offset
            }
            Layout::Wide => match code.get(offset + 1) {
                Some(0x84) => 6,
                Some(_) => 4,
                None => return Err(truncated),
            },
        };
        if offset + size > code.len() {
            return Err(DecodeError::Truncated { offset });
        }
        offset += size;
    }

    match last_opcode {
        Some(opcode) if ends_block(opcode) => (),
        _ => return Err(DecodeError::FallsOffEnd),
    }

    for (offset, target) in branches {
        if target < 0 || !boundaries.contains(&(target as usize)) {
            return Err(DecodeError::BadBranch { offset, target });
        }
    }
    Ok(boundaries)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn walks_simple_code() {
        let pool = ConstantsPool::new();
        // iconst_0; ifeq +4; iconst_1; ireturn
        let code = [0x03, 0x99, 0x00, 0x04, 0x04, 0xac];
        let boundaries = check_code(&code, &pool).unwrap();
        assert_eq!(boundaries.into_iter().collect::<Vec<_>>(), vec![0, 1, 4, 5]);
    }

    #[test]
    fn rejects_mid_instruction_branch() {
        let pool = ConstantsPool::new();
        // goto +2 lands inside its own operand
        let code = [0xa7, 0x00, 0x02, 0xb1];
        assert_eq!(
            check_code(&code, &pool),
            Err(DecodeError::BadBranch {
                offset: 0,
                target: 2
            })
        );
    }

    #[test]
    fn rejects_bad_constants_and_endings() {
        let pool = ConstantsPool::new();
        assert_eq!(
            check_code(&[0x12, 0x05, 0xb0], &pool),
            Err(DecodeError::BadConstant { offset: 0, index: 5 })
        );
        assert_eq!(check_code(&[0x03], &pool), Err(DecodeError::FallsOffEnd));
        assert_eq!(
            check_code(&[0xb6, 0x00], &pool),
            Err(DecodeError::Truncated { offset: 0 })
        );
    }
}
