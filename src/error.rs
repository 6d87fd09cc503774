//! Backend error taxonomy.
//!
//! User-visible problems surface as [`CompileError`] values carrying a
//! source position and an optional note chain. Divergent compile-time
//! evaluation raises [`Error::OutOfTime`]. Branch displacement failures
//! are raised distinctly as [`RelocateError`] so callers can attach a
//! precise source context before giving up. Internal invariant
//! violations (a missing label at link time, a scheduler with no ready
//! node) are bugs and abort via `panic!`.

use crate::locator::Locator;
use thiserror::Error;

/// A handle into the source map owned by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourcePos {
    pub file: u16,
    pub offset: u32,
    pub len: u16,
}

/// One entry of a note chain attached to an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub pos: Option<SourcePos>,
    pub msg: String,
}

/// A user-visible compile error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{msg}")]
pub struct CompileError {
    pub pos: Option<SourcePos>,
    pub msg: String,
    pub notes: Vec<Note>,
}

impl CompileError {
    pub fn new(pos: impl Into<Option<SourcePos>>, msg: impl Into<String>) -> Self {
        CompileError { pos: pos.into(), msg: msg.into(), notes: Vec::new() }
    }

    /// Append a note to the chain, returning self for call chaining.
    pub fn with_note(mut self, pos: Option<SourcePos>, msg: impl Into<String>) -> Self {
        self.notes.push(Note { pos, msg: msg.into() });
        self
    }
}

/// A branch whose displacement fell outside the signed-byte range.
///
/// Carries both the symbolic target and the numeric distance; the caller
/// formats the final diagnostic once it knows the source position.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unable to relocate branch to {target}: destination outside valid range ({distance})")]
pub struct RelocateError {
    pub target: Locator,
    pub distance: i32,
    pub pos: Option<SourcePos>,
}

/// Any error the backend can report to its caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Compile-time evaluation exceeded the configured time limit.
    #[error("compile-time evaluation exceeded the time limit of {limit_ms} ms")]
    OutOfTime { limit_ms: u64, notes: Vec<Note> },

    #[error(transparent)]
    Relocate(#[from] RelocateError),

    /// An operand failed to resolve to a concrete byte at link time.
    #[error("unable to link {0}")]
    Link(Locator),
}

impl Error {
    /// Attach a backtrace note while unwinding; only meaningful for
    /// time-limit errors, all other kinds pass through unchanged.
    pub fn with_frame_note(mut self, pos: Option<SourcePos>, msg: impl Into<String>) -> Self {
        if let Error::OutOfTime { notes, .. } = &mut self {
            notes.push(Note { pos, msg: msg.into() });
        }
        self
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
