//! Building method bodies
//!
//! `Instruction` and `BranchInstruction` are the symbolic bytecode, `InstructionEmitter` picks
//! instructions for types and members, and `MethodAssembler` puts them together while keeping
//! track of the operand stack.

mod assembler;
mod branch;
mod decode;
mod emitter;
mod instructions;
mod stack;

pub use assembler::*;
pub use branch::*;
pub use decode::*;
pub use emitter::*;
pub use instructions::*;
pub use stack::*;
