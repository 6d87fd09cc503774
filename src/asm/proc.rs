use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, trace};

use crate::asm::op::{get_op, invert_branch, AddrMode, Op, OpFlags, OpName};
use crate::error::{Error, RelocateError, Result, SourcePos};
use crate::locator::{linked_to_rom, IsSel, Locator, FnId, LocClass};
use crate::rom::LinkCtx;
use crate::ssa::SsaId;

/// One machine instruction, or assembler pseudo-instruction.
///
/// `alt` carries the high byte for wide constants and pointer pairs.
/// `ssa` back-references the node this instruction was selected from,
/// for diagnostics. `pos` indexes the owning procedure's
/// source-position table. `cost` is the selector's relative estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub op: Op,
    pub arg: Locator,
    pub alt: Locator,
    pub ssa: Option<SsaId>,
    pub pos: Option<u32>,
    pub cost: u16,
}

impl Instr {
    pub fn new(op: Op) -> Self {
        Instr { op, arg: Locator::NONE, alt: Locator::NONE, ssa: None, pos: None, cost: 0 }
    }

    pub fn with_arg(op: Op, arg: Locator) -> Self {
        Instr { arg, ..Instr::new(op) }
    }

    pub fn with_arg_alt(op: Op, arg: Locator, alt: Locator) -> Self {
        Instr { arg, alt, ..Instr::new(op) }
    }
}

/// Does this instruction leave the procedure for good?
pub fn is_return(inst: &Instr) -> bool {
    let flags = inst.op.flags();
    flags.contains(OpFlags::RETURN)
        || (flags.contains(OpFlags::JUMP)
            && !flags.contains(OpFlags::SWITCH)
            && !inst.arg.is_label())
}

/// Does this instruction touch memory through its operand?
pub fn mem_inst(inst: &Instr) -> bool {
    inst.op.addr_mode().touches_mem()
}

/// Where a label lives: its index in the instruction list and, once
/// offsets are built, its byte offset from the procedure start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LabelInfo {
    pub index: usize,
    pub offset: u32,
}

/// A procedure's instructions plus its label map.
///
/// The label map is keyed by the label locator's head form, so two
/// references into the same label at different offsets resolve to one
/// entry. Rebuilding the map from the list is idempotent; every branch
/// target resolves to exactly one entry.
#[derive(Debug, Clone, Default)]
pub struct AsmProc {
    pub fn_: Option<FnId>,
    pub entry_label: Locator,
    pub code: Vec<Instr>,
    labels: BTreeMap<Locator, LabelInfo>,
    positions: Vec<SourcePos>,
}

impl AsmProc {
    pub fn new(fn_: Option<FnId>, code: Vec<Instr>, entry_label: Locator) -> Self {
        let mut proc =
            AsmProc { fn_, entry_label, code, labels: BTreeMap::new(), positions: Vec::new() };
        proc.rebuild_label_map();
        proc
    }

    pub fn rebuild_label_map(&mut self) {
        self.labels.clear();
        for (i, inst) in self.code.iter().enumerate() {
            if inst.op == Op::AsmLabel {
                let prev = self
                    .labels
                    .insert(inst.arg.mem_head(), LabelInfo { index: i, offset: 0 });
                assert!(prev.is_none(), "duplicate label {}", inst.arg);
            }
        }
        assert!(
            self.entry_label.is_none() || self.labels.contains_key(&self.entry_label.mem_head()),
            "entry label missing from procedure"
        );
    }

    /// Fill in each label's byte offset from the current sizes.
    pub fn build_label_offsets(&mut self) {
        let mut offset = 0u32;
        let mut offsets: Vec<(Locator, u32)> = Vec::new();
        for inst in &self.code {
            if inst.op == Op::AsmLabel {
                offsets.push((inst.arg.mem_head(), offset));
            }
            offset += inst.op.size() as u32;
        }
        for (head, offset) in offsets {
            self.labels.get_mut(&head).expect("label map out of date").offset = offset;
        }
    }

    pub fn lookup_label(&self, label: Locator) -> Option<&LabelInfo> {
        self.labels.get(&label.mem_head())
    }

    fn get_label(&self, label: Locator) -> &LabelInfo {
        self.lookup_label(label)
            .unwrap_or_else(|| panic!("missing label during branch resolution: {label}"))
    }

    /// Emitted byte size of the whole procedure.
    pub fn size(&self) -> usize {
        self.code.iter().map(|inst| inst.op.size() as usize).sum()
    }

    /// Signed byte distance from instruction `ai` to instruction `bi`.
    pub fn bytes_between(&self, ai: usize, bi: usize) -> i32 {
        if bi < ai {
            return -self.bytes_between(bi, ai);
        }
        self.code[ai..bi].iter().map(|inst| inst.op.size() as i32).sum()
    }

    /// Append an instruction, registering labels as they arrive.
    pub fn push_inst(&mut self, inst: Instr) {
        if inst.op == Op::AsmLabel {
            let prev = self
                .labels
                .insert(inst.arg.mem_head(), LabelInfo { index: self.code.len(), offset: 0 });
            assert!(prev.is_none(), "duplicate label {}", inst.arg);
        }
        self.code.push(inst);
    }

    /// Register a source position, returning its table index.
    pub fn add_pos(&mut self, pos: SourcePos) -> u32 {
        self.positions.push(pos);
        self.positions.len() as u32 - 1
    }

    pub fn pos(&self, index: u32) -> SourcePos {
        self.positions[index as usize]
    }

    /// Concatenate `other`, re-registering its source positions and
    /// keeping label identity.
    pub fn append(&mut self, other: &AsmProc) {
        for inst in &other.code {
            let mut inst = *inst;
            if let Some(p) = inst.pos {
                inst.pos = Some(self.add_pos(other.pos(p)));
            }
            self.push_inst(inst);
        }
    }

    /// Lowest minor-label id not yet used in this procedure.
    pub fn next_label_id(&self) -> u32 {
        let mut next = 0;
        for inst in &self.code {
            if inst.op == Op::AsmLabel && inst.arg.lclass() == LocClass::MinorLabel {
                next = next.max(inst.arg.data() + 1);
            }
        }
        next
    }

    /// Index of the next emittable instruction after `i`, labels and
    /// pruned slots skipped.
    fn next_inst(&self, i: usize) -> Option<usize> {
        self.code[i + 1..]
            .iter()
            .position(|inst| inst.op.size() != 0)
            .map(|delta| i + 1 + delta)
    }

    /// The four-phase local optimization pipeline. Order matters.
    pub fn optimize(&mut self, initial: bool) {
        while o_peephole(&mut self.code) {}
        self.absolute_to_zp();
        self.optimize_short_jumps(!initial);
        self.convert_long_branch_ops();
    }

    /// The pipeline as run right after selection, before addresses are
    /// known: short jumps may be pruned but not replaced with skip
    /// opcodes, which would hardcode distances too early.
    pub fn initial_optimize(&mut self) {
        self.optimize(true);
    }

    /// Rewrite absolute addressing into zero-page addressing wherever
    /// the operand provably lives in the first page.
    pub fn absolute_to_zp(&mut self) {
        for inst in &mut self.code {
            // A nonzero high byte implies a true absolute address.
            if !inst.alt.is_none() && !inst.alt.eq_const(0) {
                continue;
            }
            if !matches!(inst.arg.is_(), IsSel::Deref | IsSel::Ptr) {
                continue;
            }
            if inst.arg.lclass() == LocClass::Addr && inst.arg.data() >= 0x100 {
                continue;
            }
            if !inst.arg.mem_zp_only() {
                continue;
            }

            let new_op = match inst.op.addr_mode() {
                AddrMode::Absolute => get_op(inst.op.name(), AddrMode::ZeroPage),
                // Indexing may step past the operand itself; only a
                // single-byte operand cannot cross out of the page.
                AddrMode::AbsoluteX if inst.arg.mem_size_is_byte() => {
                    get_op(inst.op.name(), AddrMode::ZeroPageX)
                }
                AddrMode::AbsoluteY if inst.arg.mem_size_is_byte() => {
                    get_op(inst.op.name(), AddrMode::ZeroPageY)
                }
                _ => None,
            };
            if let Some(new_op) = new_op {
                trace!(op = ?inst.op, "absolute operand promoted to zero page");
                inst.op = new_op;
            }
        }
    }

    /// Promote out-of-range relative branches to the long pseudo-mode
    /// and demote long branches that fit, until stable.
    pub fn convert_long_branch_ops(&mut self) {
        let mut progress = true;
        while progress {
            progress = false;

            for i in 0..self.code.len() {
                let inst = self.code[i];
                if !inst.op.is_branch() {
                    continue;
                }

                let label_i = self.get_label(inst.arg).index;
                let dist = self.bytes_between(i, label_i) - inst.op.size() as i32;

                if inst.op.is_relative_branch() {
                    if !(-128..=127).contains(&dist) {
                        self.code[i].op =
                            get_op(inst.op.name(), AddrMode::Long).expect("branch without long form");
                        progress = true;
                        debug!(branch = ?inst.op.name(), dist, "branch promoted to long form");
                    }
                } else if inst.op.is_long_branch() {
                    let new_op = get_op(inst.op.name(), AddrMode::Relative)
                        .expect("branch without relative form");
                    let size_diff = inst.op.size() as i32 - new_op.size() as i32;
                    // A backward branch gets closer as its own encoding
                    // shrinks; a forward one measures from past its own
                    // bytes either way.
                    let dist = if dist < 0 { dist + size_diff } else { dist };

                    if (-128..=127).contains(&dist) {
                        self.code[i].op = new_op;
                        progress = true;
                        debug_assert!((-128..=127).contains(
                            &(self.bytes_between(i, label_i) - new_op.size() as i32)
                        ));
                    }
                }
            }
        }
    }

    /// Remove jumps and branches over nothing. With `use_nops`, a jump
    /// over one or two bytes becomes a skip opcode instead; dangerous
    /// too early, as it hardcodes the distance.
    pub fn optimize_short_jumps(&mut self, use_nops: bool) {
        for i in 0..self.code.len() {
            let inst = self.code[i];
            let Some(next) = self.next_inst(i) else { continue };

            if inst.op == Op::JmpAbsolute {
                if !inst.arg.is_label() {
                    continue;
                }
                let label_i = self.get_label(inst.arg).index;
                let dist = self.bytes_between(next, label_i);

                if dist == 0 {
                    self.code[i].op = Op::AsmPruned;
                    self.code[i].arg = Locator::NONE;
                } else if use_nops && dist == 1 {
                    self.code[i].op = Op::SkbImplied;
                    self.code[i].arg = Locator::NONE;
                } else if use_nops && dist == 2 {
                    // The skipped bytes are fetched as an address; keep
                    // clear of the hardware register window.
                    let code = self.code[next].op.code();
                    if !(0x20..0x42).contains(&code) {
                        self.code[i].op = Op::IgnImplied;
                        self.code[i].arg = Locator::NONE;
                    }
                }
            } else if inst.op.flags().contains(OpFlags::BRANCH) {
                let label_i = self.get_label(inst.arg).index;
                let dist = self.bytes_between(next, label_i);

                if dist == 0 {
                    self.code[i].op = Op::AsmPruned;
                    self.code[i].arg = Locator::NONE;
                } else if dist == 2
                    && invert_branch(inst.op.name())
                        .and_then(|n| get_op(n, AddrMode::Relative))
                        == Some(self.code[next].op)
                {
                    // A branch over exactly the inverted branch that
                    // follows it: one of the two is useless.
                    if self.code[next].arg == inst.arg {
                        self.code[i].op = Op::AsmPruned;
                        self.code[i].arg = Locator::NONE;
                        self.code[next].op = Op::AsmPruned;
                        self.code[next].arg = Locator::NONE;
                    } else {
                        self.code[i] = self.code[next];
                        self.code[next].op = Op::AsmPruned;
                        self.code[next].arg = Locator::NONE;
                    }
                }
            }
        }
    }

    /// Resolve every operand against the ROM layout, then re-run the
    /// optimization pipeline on the concrete addresses.
    pub fn link(&mut self, ctx: &LinkCtx<'_>) {
        let pre_size = self.size();

        for inst in &mut self.code {
            inst.arg = inst.arg.link(ctx);
            inst.alt = inst.alt.link(ctx);
        }

        self.optimize(false);
        debug_assert!(self.size() <= pre_size);
    }

    /// Rewrite branch operands into relative displacements and rebase
    /// label references onto `from`, the procedure's resolved start.
    pub fn relocate(&mut self, from: Locator) -> Result<()> {
        let mut addr = linked_to_rom(from, true)?;

        for i in 0..self.code.len() {
            let inst = self.code[i];
            let arg = self.relocate1(i, &inst, inst.arg, addr, from)?;
            let alt = self.relocate1(i, &inst, inst.alt, addr, from)?;
            self.code[i].arg = arg;
            self.code[i].alt = alt;
            addr = addr.wrapping_add(inst.op.size() as u16);
        }
        Ok(())
    }

    fn relocate1(
        &self,
        i: usize,
        inst: &Instr,
        loc: Locator,
        addr: u16,
        from: Locator,
    ) -> Result<Locator> {
        let relative = inst.op.addr_mode() == AddrMode::Relative;

        let dist = if relative && loc.lclass() == LocClass::Addr {
            if !from.is_const() {
                return Err(Error::Link(from));
            }
            Some(linked_to_rom(loc, false)? as i32 - addr as i32 - inst.op.size() as i32)
        } else {
            if !loc.is_label() || loc.is_() == IsSel::Bank {
                return Ok(loc);
            }
            let Some(info) = self.lookup_label(loc) else {
                return Ok(loc);
            };
            if relative {
                Some(self.bytes_between(i, info.index) - inst.op.size() as i32 + loc.offset())
            } else {
                return Ok(from
                    .with_advance_offset(loc.offset() + self.bytes_between(0, info.index))
                    .with_is(loc.is_()));
            }
        };

        let dist = dist.expect("relative displacement");
        if !(-128..=127).contains(&dist) {
            return Err(RelocateError {
                target: loc,
                distance: dist,
                pos: inst.pos.map(|p| self.pos(p)),
            }
            .into());
        }
        Ok(Locator::const_byte(dist as i8 as u8))
    }

    /// Visit each instruction with pseudo-ops expanded into the real
    /// instruction sequences they stand for.
    pub fn for_each_inst(&self, mut f: impl FnMut(Instr)) {
        for &inst in &self.code {
            if inst.op.size() == 0 {
                continue;
            }

            match inst.op {
                Op::StoreCAbsolute => {
                    // Rebuild the carry in A, preserving P and A.
                    f(Instr::new(Op::PhpImplied));
                    f(Instr::new(Op::PhaImplied));
                    f(Instr::with_arg(Op::LdaImmediate, Locator::const_byte(0)));
                    f(Instr::new(Op::RolImplied));
                    f(Instr::with_arg(Op::StaAbsolute, inst.arg));
                    f(Instr::new(Op::PlaImplied));
                    f(Instr::new(Op::PlpImplied));
                }
                Op::StoreZAbsolute => {
                    // Pull P into A and mask out the zero flag.
                    f(Instr::new(Op::PhpImplied));
                    f(Instr::new(Op::PhaImplied));
                    f(Instr::new(Op::PhpImplied));
                    f(Instr::new(Op::PlaImplied));
                    f(Instr::with_arg(Op::AlrImmediate, Locator::const_byte(0b10)));
                    f(Instr::with_arg(Op::StaAbsolute, inst.arg));
                    f(Instr::new(Op::PlaImplied));
                    f(Instr::new(Op::PlpImplied));
                }
                Op::StoreNAbsolute => {
                    // Pull P into A and rotate the negative flag down.
                    f(Instr::new(Op::PhpImplied));
                    f(Instr::new(Op::PhaImplied));
                    f(Instr::new(Op::PhpImplied));
                    f(Instr::new(Op::PlaImplied));
                    f(Instr::with_arg(Op::AncImmediate, Locator::const_byte(0x80)));
                    f(Instr::new(Op::RolImplied));
                    f(Instr::with_arg(Op::StaAbsolute, inst.arg));
                    f(Instr::new(Op::PlaImplied));
                    f(Instr::new(Op::PlpImplied));
                }
                Op::BankedYJsrAbsolute | Op::BankedYJmpAbsolute => {
                    // Target address in A:X, bank in Y, through the
                    // runtime trampoline.
                    debug_assert!(inst.alt.is_none());
                    let (lo, hi) = absolute_locs(&inst);
                    f(Instr::with_arg(Op::LdaImmediate, lo));
                    f(Instr::with_arg(Op::LdxImmediate, hi));
                    let trampoline = if inst.op == Op::BankedYJsrAbsolute {
                        crate::locator::RuntimeRom::JsrYTrampoline
                    } else {
                        crate::locator::RuntimeRom::JmpYTrampoline
                    };
                    let jump = if inst.op == Op::BankedYJsrAbsolute {
                        Op::JsrAbsolute
                    } else {
                        Op::JmpAbsolute
                    };
                    f(Instr::with_arg(jump, Locator::runtime_rom(trampoline)));
                }
                Op::AsmXSwitchAbsolute => {
                    // Push hi then lo of the table entry, dispatch via RTS.
                    f(Instr::with_arg(Op::LdaAbsoluteX, inst.alt.with_is(IsSel::Deref)));
                    f(Instr::new(Op::PhaImplied));
                    f(Instr::with_arg(Op::LdaAbsoluteX, inst.arg.with_is(IsSel::Deref)));
                    f(Instr::new(Op::PhaImplied));
                    f(Instr::new(Op::RtsImplied));
                }
                Op::AsmYSwitchAbsolute => {
                    f(Instr::with_arg(Op::LdaAbsoluteY, inst.alt.with_is(IsSel::Deref)));
                    f(Instr::new(Op::PhaImplied));
                    f(Instr::with_arg(Op::LdaAbsoluteY, inst.arg.with_is(IsSel::Deref)));
                    f(Instr::new(Op::PhaImplied));
                    f(Instr::new(Op::RtsImplied));
                }
                _ => f(inst),
            }
        }
    }

    /// Yield every byte of the procedure as a locator: the opcode byte
    /// as a constant, then the operand bytes in addressing-mode order.
    pub fn for_each_locator(&self, mut f: impl FnMut(Locator)) {
        self.for_each_inst(|inst| {
            if inst.op == Op::AsmData {
                f(inst.arg);
                return;
            }

            assert!(
                !inst.op.flags().contains(OpFlags::FAKE),
                "unexpanded pseudo-op {:?} reached emission",
                inst.op
            );
            let op_byte = Locator::const_byte(inst.op.code());

            match inst.op.addr_mode() {
                AddrMode::Implied => f(op_byte),
                AddrMode::Immediate
                | AddrMode::Relative
                | AddrMode::ZeroPage
                | AddrMode::ZeroPageX
                | AddrMode::ZeroPageY
                | AddrMode::IndirectX
                | AddrMode::IndirectY => {
                    f(op_byte);
                    f(inst.arg);
                }
                AddrMode::Long => {
                    // Inverted branch over an absolute jump.
                    let inverted = get_op(
                        invert_branch(inst.op.name()).expect("long non-branch"),
                        AddrMode::Relative,
                    )
                    .expect("branch without relative form");
                    f(Locator::const_byte(inverted.code()));
                    f(Locator::const_byte(3));
                    f(Locator::const_byte(Op::JmpAbsolute.code()));
                    let (lo, hi) = absolute_locs(&inst);
                    f(lo);
                    f(hi);
                }
                AddrMode::Absolute
                | AddrMode::AbsoluteX
                | AddrMode::AbsoluteY
                | AddrMode::Indirect => {
                    f(op_byte);
                    let (lo, hi) = absolute_locs(&inst);
                    debug_assert!(!lo.is_none() && !hi.is_none());
                    f(lo);
                    f(hi);
                }
            }
        });
    }

    /// The procedure's bytes as raw locators, one per output byte.
    pub fn loc_vec(&self) -> Vec<Locator> {
        let mut ret = Vec::with_capacity(self.size());
        self.for_each_locator(|loc| ret.push(loc));
        ret
    }

    /// Emit final bytes, linking every operand.
    pub fn write_bytes(&self, out: &mut Vec<u8>, ctx: &LinkCtx<'_>) -> Result<()> {
        let mut failed: Option<Error> = None;

        self.for_each_locator(|loc| {
            if failed.is_some() {
                return;
            }
            let linked = loc.link(ctx);
            if !linked.is_const() {
                failed = Some(Error::Link(loc));
                return;
            }
            debug_assert_eq!(linked.offset(), 0);
            let byte = if linked.is_() == IsSel::PtrHi {
                (linked.data() >> 8) as u8
            } else {
                linked.data() as u8
            };
            out.push(byte);
        });

        match failed {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Human-readable listing for debugging.
    pub fn write_assembly(&self, w: &mut impl fmt::Write) -> fmt::Result {
        for (i, inst) in self.code.iter().enumerate() {
            for (label, info) in &self.labels {
                if info.index == i {
                    writeln!(w, "{label}:")?;
                }
            }
            if matches!(inst.op, Op::AsmPruned | Op::AsmLabel) {
                continue;
            }
            write!(w, "    {:?}", inst.op)?;
            if !inst.arg.is_none() {
                write!(w, " {}", inst.arg)?;
            }
            if !inst.alt.is_none() {
                write!(w, " hi: {}", inst.alt)?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}

/// The (lo, hi) byte pair of an absolute operand. A missing high byte
/// is derived from the pointer-high view of the low one, or zero for
/// non-pointer operands.
fn absolute_locs(inst: &Instr) -> (Locator, Locator) {
    let lo = inst.arg;
    let mut hi = inst.alt;

    if hi.is_none() {
        if matches!(lo.is_(), IsSel::Ptr | IsSel::Deref) {
            hi = lo.with_is(IsSel::PtrHi);
        } else {
            hi = Locator::const_byte(0);
        }
    }

    (lo, hi)
}

fn next_unpruned(code: &[Instr], from: usize) -> Option<usize> {
    code[from..].iter().position(|inst| inst.op != Op::AsmPruned).map(|d| from + d)
}

/// One pass of the peephole rewriter over a window of up to three
/// consecutive instructions. Returns whether anything changed; run to
/// fixpoint for the full effect.
pub fn o_peephole(code: &mut [Instr]) -> bool {
    let mut changed = false;

    let mut i = 0;
    while i < code.len() {
        if code[i].op == Op::AsmPruned {
            i += 1;
            continue;
        }
        let Some(bi) = next_unpruned(code, i + 1) else { break };
        let ci = next_unpruned(code, bi + 1);

        loop {
            let a = code[i];
            let b = code[bi];

            // Pull an immediate AND apart so ALR can form below.
            if a.op == Op::LdaImmediate
                && b.op.name() == OpName::And
                && b.op.addr_mode() != AddrMode::Immediate
                && a.alt.is_none()
                && b.alt.is_none()
            {
                if let Some(load) = get_op(OpName::Lda, b.op.addr_mode()) {
                    let imm = a.arg;
                    code[i].op = load;
                    code[i].arg = b.arg;
                    code[bi].op = Op::AndImmediate;
                    code[bi].arg = imm;
                    changed = true;
                    continue;
                }
            }

            // Combine a read-modify-write pair into its illegal fusion.
            let rmw = |code: &mut [Instr], second: OpName, replace: OpName| -> bool {
                let a = code[i];
                let b = code[bi];
                if Some(b.op) == get_op(second, a.op.addr_mode())
                    && a.arg == b.arg
                    && a.alt == b.alt
                {
                    if let Some(new_op) = get_op(replace, a.op.addr_mode()) {
                        code[i].op = new_op;
                        code[bi].op = Op::AsmPruned;
                        return true;
                    }
                }
                false
            };

            // Load, step, store becomes a memory step plus reload.
            let inxy = |code: &mut [Instr],
                        second: OpName,
                        store: OpName,
                        replace: OpName|
             -> bool {
                let Some(ci) = ci else { return false };
                let a = code[i];
                let b = code[bi];
                let c = code[ci];
                if b.op.name() == second
                    && c.op.name() == store
                    && a.op.addr_mode() == c.op.addr_mode()
                    && a.arg == c.arg
                    && a.alt == c.alt
                    && (a.arg.is_none() || a.arg.is_var_like())
                    && (a.alt.is_none() || a.alt.is_var_like())
                {
                    if let Some(new_op) = get_op(replace, a.op.addr_mode()) {
                        code[ci].op = a.op;
                        code[i].op = new_op;
                        code[bi].op = Op::AsmPruned;
                        return true;
                    }
                }
                false
            };

            // Two loads of one location: the second becomes a transfer.
            let transfer = |code: &mut [Instr], second: OpName, replace: Op| -> bool {
                let a = code[i];
                let b = code[bi];
                if b.op.name() == second
                    && a.op.addr_mode() == b.op.addr_mode()
                    && a.arg == b.arg
                    && a.alt == b.alt
                    && (a.arg.is_none() || a.arg.is_var_like())
                {
                    code[bi].op = replace;
                    code[bi].arg = Locator::NONE;
                    code[bi].alt = Locator::NONE;
                    return true;
                }
                false
            };

            // Store then load of one location: load becomes a transfer.
            let transfer2 = |code: &mut [Instr], second: OpName, replace: Op| -> bool {
                let a = code[i];
                let b = code[bi];
                if b.op.name() == second
                    && matches!(b.op.addr_mode(), AddrMode::ZeroPage | AddrMode::Absolute)
                    && a.arg == b.arg
                    && a.alt == b.alt
                    && (a.arg.is_none() || a.arg.is_var_like())
                {
                    code[bi].op = replace;
                    code[bi].arg = Locator::NONE;
                    code[bi].alt = Locator::NONE;
                    return true;
                }
                false
            };

            let lax = |code: &mut [Instr], second: OpName| -> bool {
                let a = code[i];
                let b = code[bi];
                let Some(replace) = get_op(OpName::Lax, a.op.addr_mode()) else {
                    return false;
                };
                if b.op.name() == second
                    && a.op.addr_mode() == b.op.addr_mode()
                    && a.arg == b.arg
                    && a.alt == b.alt
                {
                    code[i].op = replace;
                    code[bi].op = Op::AsmPruned;
                    return true;
                }
                false
            };

            let fired = match a.op.name() {
                OpName::Dec => rmw(code, OpName::Cmp, OpName::Dcp),
                OpName::Inc => rmw(code, OpName::Sbc, OpName::Isc),
                OpName::Rol => rmw(code, OpName::And, OpName::Rla),
                OpName::Ror => rmw(code, OpName::Adc, OpName::Rra),
                OpName::Asl => rmw(code, OpName::Ora, OpName::Slo),
                OpName::Lsr => rmw(code, OpName::Eor, OpName::Sre),
                OpName::And => {
                    if a.op == Op::AndImmediate && b.op == Op::LsrImplied {
                        code[i].op = Op::AlrImmediate;
                        code[bi].op = Op::AsmPruned;
                        true
                    } else {
                        false
                    }
                }
                OpName::Ldx => {
                    inxy(code, OpName::Inx, OpName::Stx, OpName::Inc)
                        || inxy(code, OpName::Dex, OpName::Stx, OpName::Dec)
                        || lax(code, OpName::Lda)
                }
                OpName::Ldy => {
                    inxy(code, OpName::Iny, OpName::Sty, OpName::Inc)
                        || inxy(code, OpName::Dey, OpName::Sty, OpName::Dec)
                        || transfer(code, OpName::Lda, Op::TyaImplied)
                }
                OpName::Lda => {
                    inxy(code, OpName::Asl, OpName::Sta, OpName::Asl)
                        || inxy(code, OpName::Lsr, OpName::Sta, OpName::Lsr)
                        || inxy(code, OpName::Rol, OpName::Sta, OpName::Rol)
                        || inxy(code, OpName::Ror, OpName::Sta, OpName::Ror)
                        || lax(code, OpName::Ldx)
                        || transfer(code, OpName::Ldy, Op::TayImplied)
                }
                OpName::Sta => {
                    transfer2(code, OpName::Ldx, Op::TaxImplied)
                        || transfer2(code, OpName::Ldy, Op::TayImplied)
                }
                OpName::Stx => transfer2(code, OpName::Lda, Op::TxaImplied),
                OpName::Sty => transfer2(code, OpName::Lda, Op::TyaImplied),
                OpName::Alr => {
                    if a.alt.is_none() && a.arg.eq_const(1) && b.op == Op::RolImplied {
                        code[i].op = Op::AncImmediate;
                        code[bi].op = Op::AsmPruned;
                        true
                    } else {
                        false
                    }
                }
                OpName::Rts | OpName::Jmp => {
                    // A return or jump straight into a label holding
                    // the same instruction: the first copy is dead.
                    if let Some(ci) = ci {
                        let c = code[ci];
                        if c.op == a.op && b.op == Op::AsmLabel && a.arg == c.arg && a.alt == c.alt
                        {
                            code[i].op = Op::AsmPruned;
                            code[i].arg = Locator::NONE;
                            code[i].alt = Locator::NONE;
                            true
                        } else {
                            false
                        }
                    } else {
                        false
                    }
                }
                _ => false,
            };

            if fired {
                changed = true;
                continue;
            }
            break;
        }

        i += 1;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::{RomModel, Romv};

    fn peephole_to_fixpoint(code: &mut Vec<Instr>) {
        while o_peephole(code) {}
    }

    fn ops(code: &[Instr]) -> Vec<Op> {
        code.iter().map(|inst| inst.op).collect()
    }

    fn link_ctx(rom: &RomModel) -> LinkCtx<'_> {
        LinkCtx { rom, romv: Romv::Mode, fn_: None, bank: None }
    }

    #[test]
    fn peephole_load_inc_store() {
        let mut code = vec![
            Instr::with_arg(Op::LdxZeroPage, Locator::addr(0x00)),
            Instr::new(Op::InxImplied),
            Instr::with_arg(Op::StxZeroPage, Locator::addr(0x00)),
        ];
        peephole_to_fixpoint(&mut code);
        assert_eq!(ops(&code), [Op::IncZeroPage, Op::AsmPruned, Op::LdxZeroPage]);
        assert_eq!(code[0].arg, Locator::addr(0x00));
        assert_eq!(code[2].arg, Locator::addr(0x00));
    }

    #[test]
    fn peephole_forms_alr() {
        let mut code = vec![
            Instr::with_arg(Op::LdaImmediate, Locator::const_byte(0x0F)),
            Instr::with_arg(Op::AndZeroPage, Locator::addr(0x10)),
            Instr::new(Op::LsrImplied),
        ];
        peephole_to_fixpoint(&mut code);
        assert_eq!(ops(&code), [Op::LdaZeroPage, Op::AlrImmediate, Op::AsmPruned]);
        assert_eq!(code[0].arg, Locator::addr(0x10));
        assert_eq!(code[1].arg, Locator::const_byte(0x0F));
    }

    #[test]
    fn peephole_forms_anc() {
        let mut code = vec![
            Instr::with_arg(Op::AlrImmediate, Locator::const_byte(1)),
            Instr::new(Op::RolImplied),
        ];
        peephole_to_fixpoint(&mut code);
        assert_eq!(ops(&code), [Op::AncImmediate, Op::AsmPruned]);
    }

    #[test]
    fn peephole_rmw_fusions() {
        let mut code = vec![
            Instr::with_arg(Op::DecZeroPage, Locator::addr(0x20)),
            Instr::with_arg(Op::CmpZeroPage, Locator::addr(0x20)),
        ];
        peephole_to_fixpoint(&mut code);
        assert_eq!(ops(&code), [Op::DcpZeroPage, Op::AsmPruned]);

        let mut code = vec![
            Instr::with_arg(Op::AslAbsolute, Locator::addr(0x0234)),
            Instr::with_arg(Op::OraAbsolute, Locator::addr(0x0234)),
        ];
        peephole_to_fixpoint(&mut code);
        assert_eq!(ops(&code), [Op::SloAbsolute, Op::AsmPruned]);
    }

    #[test]
    fn peephole_store_load_transfer() {
        let mut code = vec![
            Instr::with_arg(Op::StaZeroPage, Locator::addr(0x30)),
            Instr::with_arg(Op::LdxZeroPage, Locator::addr(0x30)),
        ];
        peephole_to_fixpoint(&mut code);
        assert_eq!(ops(&code), [Op::StaZeroPage, Op::TaxImplied]);
        assert!(code[1].arg.is_none());
    }

    #[test]
    fn peephole_forms_lax() {
        let mut code = vec![
            Instr::with_arg(Op::LdaZeroPage, Locator::addr(0x40)),
            Instr::with_arg(Op::LdxZeroPage, Locator::addr(0x40)),
        ];
        peephole_to_fixpoint(&mut code);
        assert_eq!(ops(&code), [Op::LaxZeroPage, Op::AsmPruned]);
    }

    #[test]
    fn peephole_drops_return_before_labeled_return() {
        let mut code = vec![
            Instr::new(Op::RtsImplied),
            Instr::with_arg(Op::AsmLabel, Locator::minor_label(0)),
            Instr::new(Op::RtsImplied),
        ];
        peephole_to_fixpoint(&mut code);
        assert_eq!(ops(&code), [Op::AsmPruned, Op::AsmLabel, Op::RtsImplied]);
    }

    #[test]
    fn peephole_is_idempotent() {
        let mut code = vec![
            Instr::with_arg(Op::LdaImmediate, Locator::const_byte(0x0F)),
            Instr::with_arg(Op::AndZeroPage, Locator::addr(0x10)),
            Instr::new(Op::LsrImplied),
            Instr::with_arg(Op::LdxZeroPage, Locator::addr(0x00)),
            Instr::new(Op::InxImplied),
            Instr::with_arg(Op::StxZeroPage, Locator::addr(0x00)),
            Instr::new(Op::RtsImplied),
        ];
        peephole_to_fixpoint(&mut code);
        let settled = code.clone();
        assert!(!o_peephole(&mut code));
        assert_eq!(code, settled);
    }

    #[test]
    fn hardware_registers_are_not_fused() {
        // $2002 is a hardware register; re-reading it is not free.
        let mut code = vec![
            Instr::with_arg(Op::StaAbsolute, Locator::addr(0x2002)),
            Instr::with_arg(Op::LdxAbsolute, Locator::addr(0x2002)),
        ];
        peephole_to_fixpoint(&mut code);
        assert_eq!(ops(&code), [Op::StaAbsolute, Op::LdxAbsolute]);
    }

    fn label(id: u32) -> Locator {
        Locator::minor_label(id)
    }

    #[test]
    fn long_branch_promotion() {
        let mut code = vec![Instr::with_arg(Op::BeqRelative, label(0))];
        code.extend(std::iter::repeat(Instr::new(Op::NopImplied)).take(200));
        code.push(Instr::with_arg(Op::AsmLabel, label(0)));
        let mut proc = AsmProc::new(None, code, Locator::NONE);

        proc.convert_long_branch_ops();
        assert_eq!(proc.code[0].op, Op::BeqLong);
        assert_eq!(proc.code[0].op.size(), 5);

        // The long form emits inverted-branch, +3, JMP, target pair.
        let locs = proc.loc_vec();
        assert_eq!(locs[0], Locator::const_byte(Op::BneRelative.code()));
        assert_eq!(locs[1], Locator::const_byte(3));
        assert_eq!(locs[2], Locator::const_byte(Op::JmpAbsolute.code()));
        assert_eq!(locs.len(), 5 + 200);
    }

    #[test]
    fn long_branch_demotion() {
        let code = vec![
            Instr::with_arg(Op::BeqLong, label(0)),
            Instr::new(Op::NopImplied),
            Instr::with_arg(Op::AsmLabel, label(0)),
        ];
        let mut proc = AsmProc::new(None, code, Locator::NONE);
        proc.convert_long_branch_ops();
        assert_eq!(proc.code[0].op, Op::BeqRelative);
    }

    #[test]
    fn branches_settle_in_range() {
        // Law: after conversion every branch is either relative and in
        // [-128, 127], or long.
        for filler in [10usize, 126, 127, 128, 200] {
            let mut code = vec![Instr::with_arg(Op::BneRelative, label(0))];
            code.extend(std::iter::repeat(Instr::new(Op::NopImplied)).take(filler));
            code.push(Instr::with_arg(Op::AsmLabel, label(0)));
            let mut proc = AsmProc::new(None, code, Locator::NONE);
            proc.convert_long_branch_ops();

            for (i, inst) in proc.code.iter().enumerate() {
                if !inst.op.is_branch() {
                    continue;
                }
                if inst.op.is_relative_branch() {
                    let target = proc.get_label(inst.arg).index;
                    let dist = proc.bytes_between(i, target) - inst.op.size() as i32;
                    assert!((-128..=127).contains(&dist));
                } else {
                    assert!(inst.op.is_long_branch());
                }
            }
        }
    }

    #[test]
    fn short_jump_elision() {
        // A jump to the very next instruction is dead.
        let code = vec![
            Instr::with_arg(Op::JmpAbsolute, label(0)),
            Instr::with_arg(Op::AsmLabel, label(0)),
            Instr::new(Op::NopImplied),
        ];
        let mut proc = AsmProc::new(None, code, Locator::NONE);
        proc.optimize_short_jumps(false);
        assert_eq!(proc.code[0].op, Op::AsmPruned);

        // Jumping over one byte becomes a skip-byte opcode.
        let code = vec![
            Instr::with_arg(Op::JmpAbsolute, label(0)),
            Instr::new(Op::InxImplied),
            Instr::with_arg(Op::AsmLabel, label(0)),
            Instr::new(Op::NopImplied),
        ];
        let mut proc = AsmProc::new(None, code, Locator::NONE);
        proc.optimize_short_jumps(true);
        assert_eq!(proc.code[0].op, Op::SkbImplied);

        // Two bytes becomes the wide skip, unless the skipped opcode
        // byte would address the hardware register window.
        let code = vec![
            Instr::with_arg(Op::JmpAbsolute, label(0)),
            Instr::with_arg(Op::LdaImmediate, Locator::const_byte(5)),
            Instr::with_arg(Op::AsmLabel, label(0)),
            Instr::new(Op::NopImplied),
        ];
        let mut proc = AsmProc::new(None, code, Locator::NONE);
        proc.optimize_short_jumps(true);
        assert_eq!(proc.code[0].op, Op::IgnImplied);

        let code = vec![
            Instr::with_arg(Op::JmpAbsolute, label(0)),
            Instr::with_arg(Op::JsrAbsolute, label(1)),
            Instr::with_arg(Op::AsmLabel, label(0)),
            Instr::with_arg(Op::AsmLabel, label(1)),
            Instr::new(Op::NopImplied),
        ];
        let mut proc = AsmProc::new(None, code, Locator::NONE);
        proc.optimize_short_jumps(true);
        assert_eq!(proc.code[0].op, Op::JmpAbsolute);
    }

    #[test]
    fn inverted_branch_pair_collapses() {
        let code = vec![
            Instr::with_arg(Op::BeqRelative, label(0)),
            Instr::with_arg(Op::BneRelative, label(1)),
            Instr::with_arg(Op::AsmLabel, label(0)),
            Instr::new(Op::NopImplied),
        ];
        let mut proc = AsmProc::new(None, code, Locator::NONE);
        proc.optimize_short_jumps(false);
        assert_eq!(proc.code[0].op, Op::BneRelative);
        assert_eq!(proc.code[0].arg, label(1));
        assert_eq!(proc.code[1].op, Op::AsmPruned);
    }

    #[test]
    fn label_map_rebuild_is_idempotent() {
        let code = vec![
            Instr::with_arg(Op::AsmLabel, label(0)),
            Instr::new(Op::NopImplied),
            Instr::with_arg(Op::AsmLabel, label(1)),
        ];
        let mut proc = AsmProc::new(None, code, Locator::NONE);
        let before: Vec<_> = [label(0), label(1)]
            .iter()
            .map(|&l| proc.lookup_label(l).copied().unwrap())
            .collect();
        proc.rebuild_label_map();
        let after: Vec<_> = [label(0), label(1)]
            .iter()
            .map(|&l| proc.lookup_label(l).copied().unwrap())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    #[should_panic(expected = "duplicate label")]
    fn duplicate_labels_are_rejected() {
        let mut proc = AsmProc::default();
        proc.push_inst(Instr::with_arg(Op::AsmLabel, label(7)));
        proc.push_inst(Instr::with_arg(Op::AsmLabel, label(7)));
    }

    #[test]
    fn append_renumbers_positions_and_keeps_labels() {
        let mut a = AsmProc::default();
        let pa = a.add_pos(SourcePos { file: 1, offset: 10, len: 2 });
        a.push_inst(Instr { pos: Some(pa), ..Instr::with_arg(Op::AsmLabel, label(0)) });
        a.push_inst(Instr::new(Op::NopImplied));

        let mut b = AsmProc::default();
        let pb = b.add_pos(SourcePos { file: 2, offset: 20, len: 4 });
        b.push_inst(Instr { pos: Some(pb), ..Instr::with_arg(Op::AsmLabel, label(1)) });
        b.push_inst(Instr::new(Op::RtsImplied));

        a.append(&b);
        assert_eq!(a.code.len(), 4);
        assert_eq!(a.lookup_label(label(0)).unwrap().index, 0);
        assert_eq!(a.lookup_label(label(1)).unwrap().index, 2);
        let moved = a.code[2].pos.unwrap();
        assert_eq!(a.pos(moved), SourcePos { file: 2, offset: 20, len: 4 });
    }

    #[test]
    fn relocate_computes_displacements() {
        let code = vec![
            Instr::with_arg(Op::AsmLabel, label(0)),
            Instr::new(Op::NopImplied),
            Instr::with_arg(Op::BneRelative, label(0)),
        ];
        let mut proc = AsmProc::new(None, code, Locator::NONE);
        proc.relocate(Locator::addr(0x8000)).unwrap();
        // Backward branch over one NOP plus itself.
        assert_eq!(proc.code[2].arg, Locator::const_byte(0xFD));
    }

    #[test]
    fn relocate_rejects_far_branches() {
        let mut code = vec![Instr::with_arg(Op::BeqRelative, label(0))];
        code.extend(std::iter::repeat(Instr::new(Op::NopImplied)).take(200));
        code.push(Instr::with_arg(Op::AsmLabel, label(0)));
        let mut proc = AsmProc::new(None, code, Locator::NONE);
        let err = proc.relocate(Locator::addr(0x8000)).unwrap_err();
        let Error::Relocate(err) = err else { panic!("wrong error kind: {err}") };
        assert_eq!(err.distance, 198);
    }

    #[test]
    fn write_bytes_matches_size() {
        let code = vec![
            Instr::with_arg(Op::LdaImmediate, Locator::const_byte(0x42)),
            Instr::with_arg(Op::StaAbsolute, Locator::addr(0x0300)),
            Instr::with_arg(Op::AsmLabel, label(0)),
            Instr::with_arg(Op::StoreCAbsolute, Locator::addr(0x0301)),
            Instr::new(Op::RtsImplied),
        ];
        let proc = AsmProc::new(None, code, Locator::NONE);
        let rom = RomModel::default();
        let mut bytes = Vec::new();
        proc.write_bytes(&mut bytes, &link_ctx(&rom)).unwrap();
        assert_eq!(bytes.len(), proc.size());
        assert_eq!(&bytes[..5], &[0xA9, 0x42, 0x8D, 0x00, 0x03]);
        // The flag store expands to its documented ten bytes.
        assert_eq!(&bytes[5..8], &[0x08, 0x48, 0xA9]);
    }

    #[test]
    fn unresolved_operands_fail_linking() {
        let code = vec![Instr::with_arg(Op::LdaAbsolute, Locator::gmember(
            crate::locator::GmemberId(3),
            0,
        ))];
        let proc = AsmProc::new(None, code, Locator::NONE);
        let rom = RomModel::default();
        let mut bytes = Vec::new();
        let err = proc.write_bytes(&mut bytes, &link_ctx(&rom)).unwrap_err();
        assert!(matches!(err, Error::Link(_)));
    }

    #[test]
    fn banked_jsr_expands_through_trampoline() {
        let code = vec![Instr::with_arg(Op::BankedYJsrAbsolute, Locator::addr(0x8123))];
        let proc = AsmProc::new(None, code, Locator::NONE);
        let mut expanded = Vec::new();
        proc.for_each_inst(|inst| expanded.push(inst));
        assert_eq!(
            ops(&expanded),
            [Op::LdaImmediate, Op::LdxImmediate, Op::JsrAbsolute]
        );
        assert_eq!(
            expanded[2].arg,
            Locator::runtime_rom(crate::locator::RuntimeRom::JsrYTrampoline)
        );
    }
}
