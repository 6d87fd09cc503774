//! Machine-code procedure representation.
//!
//! [`AsmProc`] holds a procedure as an instruction list with a label
//! map, and owns every transformation between instruction selection and
//! byte emission: peephole rewriting, absolute→zero-page promotion,
//! branch-range resolution, short-jump elision, pseudo-op expansion,
//! relocation, and linking.

pub mod op;
mod proc;

pub use op::{get_op, invert_branch, AddrMode, Op, OpFlags, OpName, Regs};
pub use proc::{is_return, mem_inst, o_peephole, AsmProc, Instr, LabelInfo};
