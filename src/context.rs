//! The per-compilation context.
//!
//! Everything that was once process-global lives here and is threaded
//! through explicitly: compiler options, the phase marker, and the ROM
//! array intern pool. The context is shared across worker threads
//! compiling functions in parallel; the pool is internally locked and
//! the phase only ever advances.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::locator::Locator;
use crate::mapper::MapperParams;
use crate::rom::{GroupId, RomArrayId, RomArrayPool, RomRule};

/// Compilation phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    Parse = 0,
    Compile,
    AllocRom,
    Link,
}

impl Phase {
    fn from_u8(v: u8) -> Phase {
        match v {
            0 => Phase::Parse,
            1 => Phase::Compile,
            2 => Phase::AllocRom,
            _ => Phase::Link,
        }
    }
}

/// Tunables handed down from the driver.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Wall-clock budget for compile-time evaluation, in milliseconds.
    /// Zero disables the limit.
    pub time_limit_ms: u64,
    pub mapper: MapperParams,
}

pub struct CompilerCtx {
    pub options: Options,
    phase: AtomicU8,
    rom_arrays: RomArrayPool,
}

impl CompilerCtx {
    pub fn new(options: Options) -> Self {
        CompilerCtx {
            options,
            phase: AtomicU8::new(Phase::Parse as u8),
            rom_arrays: RomArrayPool::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Move to the next phase. Phases never move backward.
    pub fn advance_phase(&self, to: Phase) {
        let prev = self.phase.swap(to as u8, Ordering::AcqRel);
        assert!(prev <= to as u8, "compilation phase moved backward");
    }

    /// Intern a ROM array. The pool is monotonic and frozen at the
    /// allocation phase boundary.
    pub fn intern_rom_array(
        &self,
        data: Vec<Locator>,
        align: bool,
        rule: RomRule,
        group: Option<GroupId>,
    ) -> RomArrayId {
        assert!(self.phase() <= Phase::AllocRom, "rom array interned after allocation");
        self.rom_arrays.make(data, align, rule, group)
    }

    pub fn rom_arrays(&self) -> &RomArrayPool {
        &self.rom_arrays
    }

    /// Consume the context, yielding the frozen array pool for layout.
    pub fn freeze_rom_arrays(self) -> RomArrayPool {
        self.rom_arrays
    }

    pub fn time_budget(&self) -> TimeBudget {
        TimeBudget::new(self.options.time_limit_ms)
    }
}

/// Wall-clock budget polled by compile-time evaluation to abort
/// divergent computation.
#[derive(Debug, Clone)]
pub struct TimeBudget {
    start: Instant,
    limit_ms: u64,
}

impl TimeBudget {
    pub fn new(limit_ms: u64) -> Self {
        TimeBudget { start: Instant::now(), limit_ms }
    }

    /// Check the budget; call this from evaluation loops.
    pub fn poll(&self) -> Result<()> {
        if self.limit_ms > 0 && self.start.elapsed().as_millis() as u64 > self.limit_ms {
            return Err(Error::OutOfTime { limit_ms: self.limit_ms, notes: Vec::new() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_monotonically() {
        let ctx = CompilerCtx::new(Options::default());
        assert_eq!(ctx.phase(), Phase::Parse);
        ctx.advance_phase(Phase::Compile);
        ctx.advance_phase(Phase::AllocRom);
        assert_eq!(ctx.phase(), Phase::AllocRom);
    }

    #[test]
    #[should_panic(expected = "phase moved backward")]
    fn phases_cannot_regress() {
        let ctx = CompilerCtx::new(Options::default());
        ctx.advance_phase(Phase::Link);
        ctx.advance_phase(Phase::Compile);
    }

    #[test]
    fn unlimited_budget_never_expires() {
        let budget = TimeBudget::new(0);
        assert!(budget.poll().is_ok());
    }

    #[test]
    fn exhausted_budget_errors() {
        let budget = TimeBudget::new(1);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let err = budget.poll().unwrap_err();
        assert!(matches!(err, Error::OutOfTime { limit_ms: 1, .. }));
        let err = err.with_frame_note(None, "while evaluating");
        let Error::OutOfTime { notes, .. } = err else { panic!() };
        assert_eq!(notes.len(), 1);
    }
}
