//! Ahead-of-time 6502 compiler backend.
//!
//! The middle and back end of a compiler targeting cartridge-based
//! 6502 consoles: an abstract-interpretation lattice over fixed-point
//! values, a carry-aware list scheduler for SSA blocks, a machine-code
//! procedure representation with peephole rewriting and branch-range
//! resolution, and the symbolic locator plus ROM layout model that
//! turns it all into bytes. The front end (lexer, parser, type
//! checker) and the final binary writer are separate collaborators;
//! this crate supplies the tables they drive and consumes the SSA they
//! produce.

#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod asm;
pub mod constraints;
pub mod context;
pub mod error;
pub mod fixed;
pub mod lex;
pub mod locator;
pub mod mapper;
pub mod rom;
pub mod schedule;
pub mod ssa;

pub mod prelude {
    //! The working set of backend types.

    pub use crate::asm::{
        get_op, invert_branch, AddrMode, AsmProc, Instr, Op, OpFlags, OpName,
    };
    pub use crate::constraints::{
        abstract_fn, narrow_fn, Bounds, Carry, Constraints, KnownBits,
    };
    pub use crate::context::{CompilerCtx, Options, Phase, TimeBudget};
    pub use crate::error::{CompileError, Error, RelocateError, Result, SourcePos};
    pub use crate::fixed::{Fixed, FixedUint, Scalar};
    pub use crate::lex::{LexTables, Token};
    pub use crate::locator::{FnId, IsSel, LocClass, Locator};
    pub use crate::mapper::{write_ines_header, Mapper, MapperKind, MapperParams, Mirroring};
    pub use crate::rom::{
        locate_rom_arrays, LinkCtx, RomAlloc, RomArrayPool, RomModel, RomProc, Romv, Span,
    };
    pub use crate::schedule::schedule_ir;
    pub use crate::ssa::{CfgId, Ir, SsaId, SsaOp, SsaValue};
}
