//! ROM data model and link-time layout.
//!
//! ROM contents come in two shapes: immutable byte arrays
//! ([`RomArray`], interned by content digest) and compiled procedures
//! ([`RomProc`]). Either is placed by an allocation of one of three
//! disjoint classes: *static* (a reserved fixed address), *many*
//! (replicated into a set of banks), or *once* (exactly one bank).
//! [`LinkCtx`] resolves symbolic locators against the final layout.

use std::collections::HashMap;
use std::sync::Mutex;

use sha3::{Digest, Sha3_256};
use tracing::debug;

use crate::asm::AsmProc;
use crate::locator::{
    linked_to_rom, FnId, GconstId, GmemberId, IsSel, LocClass, Locator, LtId, RuntimeRam,
    RuntimeRom, SwitchId,
};
use crate::ssa::{Ir, SsaOp, SsaValue};

/// ROM variants: distinct lowerings of one function or constant for
/// different calling contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum Romv {
    Mode = 0,
    Nmi,
    Irq,
}

pub const NUM_ROMV: usize = 3;

impl Romv {
    pub const ALL: [Romv; NUM_ROMV] = [Romv::Mode, Romv::Nmi, Romv::Irq];
}

/// A placed byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    pub addr: u16,
    pub size: u16,
}

impl Span {
    pub fn offset_by(self, offset: i32) -> Span {
        Span {
            addr: (self.addr as i32 + offset) as u16,
            size: (self.size as i32 - offset).max(0) as u16,
        }
    }

    pub fn end(self) -> u32 {
        self.addr as u32 + self.size as u32
    }
}

/// Placement constraints an array can acquire after interning. Rules
/// only ever intensify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RomRule {
    Normal = 0,
    /// Sample data: 64-byte aligned, within the sample window.
    Dpcm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RomArrayId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RomProcId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RomAllocId(pub u32);

/// A bank-placement partition for data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub u32);

/// An interned, immutable vector of byte locators.
#[derive(Debug)]
pub struct RomArray {
    data: Vec<Locator>,
    align: bool,
    rule: RomRule,
    /// Which group-data sets reference this array.
    used_in_group_data: u64,
    allocs: [Option<RomAllocId>; NUM_ROMV],
}

impl RomArray {
    pub fn data(&self) -> &[Locator] {
        &self.data
    }

    pub fn aligned(&self) -> bool {
        self.align
    }

    pub fn rule(&self) -> RomRule {
        self.rule
    }

    pub fn used_in_group_data(&self, group: GroupId) -> bool {
        self.used_in_group_data & (1 << group.0) != 0
    }

    pub fn for_each_locator(&self, mut f: impl FnMut(Locator)) {
        for &loc in &self.data {
            f(loc);
        }
    }

    pub fn set_alloc(&mut self, romv: Romv, alloc: RomAllocId) {
        self.allocs[romv as usize] = Some(alloc);
    }

    fn find_alloc(&self, romv: Romv) -> Option<RomAllocId> {
        self.allocs[romv as usize].or_else(|| self.allocs.iter().flatten().next().copied())
    }
}

#[derive(Default)]
struct RomArrayPoolInner {
    arrays: Vec<RomArray>,
    by_digest: HashMap<[u8; 32], Vec<RomArrayId>>,
}

/// The process-wide ROM array intern pool.
///
/// Guarded by a mutex so worker threads compiling functions in parallel
/// can contribute arrays. Arrays are unique by content; post-creation
/// mutation is restricted to monotonic upgrades.
#[derive(Default)]
pub struct RomArrayPool {
    inner: Mutex<RomArrayPoolInner>,
}

fn content_digest(data: &[Locator]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    for loc in data {
        hasher.update(loc.raw().to_le_bytes());
    }
    hasher.finalize().into()
}

impl RomArrayPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an array, returning the existing handle for equal
    /// content. Alignment, rule, and group markings are merged in.
    pub fn make(
        &self,
        mut data: Vec<Locator>,
        align: bool,
        rule: RomRule,
        group: Option<GroupId>,
    ) -> RomArrayId {
        // Byte views are irrelevant to the stored content.
        for loc in &mut data {
            *loc = loc.with_byteified(false);
        }

        let digest = content_digest(&data);
        let mut inner = self.inner.lock().expect("rom array pool poisoned");

        let existing = inner.by_digest.get(&digest).and_then(|candidates| {
            candidates.iter().copied().find(|id| inner.arrays[id.0 as usize].data == data)
        });
        let id = match existing {
            Some(id) => id,
            None => {
                let id = RomArrayId(inner.arrays.len() as u32);
                debug!(id = id.0, len = data.len(), "interned rom array");
                inner.arrays.push(RomArray {
                    data,
                    align: false,
                    rule: RomRule::Normal,
                    used_in_group_data: 0,
                    allocs: [None; NUM_ROMV],
                });
                inner.by_digest.entry(digest).or_default().push(id);
                id
            }
        };

        let array = &mut inner.arrays[id.0 as usize];
        array.align |= align;
        array.rule = array.rule.max(rule);
        if let Some(group) = group {
            debug_assert!(group.0 < 64);
            array.used_in_group_data |= 1 << group.0;
        }

        id
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("rom array pool poisoned").arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tear the pool down into the plain vector the layout model owns.
    /// Called once, at the allocation phase boundary.
    pub fn freeze(self) -> Vec<RomArray> {
        self.inner.into_inner().expect("rom array pool poisoned").arrays
    }
}

/// A compiled procedure destined for ROM.
#[derive(Debug)]
pub struct RomProc {
    proc: AsmProc,
    max_size: usize,
    allocs: [Option<RomAllocId>; NUM_ROMV],
}

impl RomProc {
    pub fn new(proc: AsmProc) -> Self {
        let max_size = proc.size();
        RomProc { proc, max_size, allocs: [None; NUM_ROMV] }
    }

    pub fn proc(&self) -> &AsmProc {
        &self.proc
    }

    pub fn proc_mut(&mut self) -> &mut AsmProc {
        &mut self.proc
    }

    /// Upper bound on the placed size; optimization only shrinks it.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn set_alloc(&mut self, romv: Romv, alloc: RomAllocId) {
        self.allocs[romv as usize] = Some(alloc);
    }

    pub fn find_alloc(&self, romv: Romv) -> Option<RomAllocId> {
        self.allocs[romv as usize].or_else(|| self.allocs.iter().flatten().next().copied())
    }

    pub fn for_each_locator(&self, mut f: impl FnMut(Locator)) {
        for inst in &self.proc.code {
            if !inst.arg.is_none() {
                f(inst.arg);
            }
            if !inst.alt.is_none() {
                f(inst.alt);
            }
        }
    }
}

/// One placement decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomAlloc {
    /// A reserved fixed address.
    Static { span: Span },
    /// Replicated into every bank of the set, same address in each.
    Many { in_banks: u64, span: Span },
    /// Exactly one bank.
    Once { bank: u8, span: Option<Span> },
}

impl RomAlloc {
    pub fn span(&self) -> Option<Span> {
        match *self {
            RomAlloc::Static { span } | RomAlloc::Many { span, .. } => Some(span),
            RomAlloc::Once { span, .. } => span,
        }
    }

    pub fn first_bank(&self) -> Option<u8> {
        match *self {
            RomAlloc::Static { .. } => Some(0),
            RomAlloc::Many { in_banks, .. } => {
                if in_banks == 0 {
                    None
                } else {
                    Some(in_banks.trailing_zeros() as u8)
                }
            }
            RomAlloc::Once { bank, span } => span.map(|_| bank),
        }
    }
}

/// A late-bound expression's lowered bytes, resolved on demand and
/// memoised per ROM variant. Resolution must not reference the value
/// being resolved; late-bound expressions are acyclic.
pub struct LtValue {
    is_ptr: bool,
    resolver: Box<dyn Fn(Romv) -> Vec<Locator> + Send + Sync>,
    cache: Mutex<[Option<Vec<Locator>>; NUM_ROMV]>,
}

impl LtValue {
    pub fn new(is_ptr: bool, resolver: impl Fn(Romv) -> Vec<Locator> + Send + Sync + 'static) -> Self {
        LtValue { is_ptr, resolver: Box::new(resolver), cache: Mutex::new(Default::default()) }
    }

    pub fn is_ptr(&self) -> bool {
        self.is_ptr
    }

    pub fn resolve(&self, romv: Romv) -> Vec<Locator> {
        let mut cache = self.cache.lock().expect("lt cache poisoned");
        cache[romv as usize].get_or_insert_with(|| (self.resolver)(romv)).clone()
    }
}

/// The frozen link-time layout: every table needed to turn a symbolic
/// locator into bytes.
#[derive(Default)]
pub struct RomModel {
    pub arrays: Vec<RomArray>,
    pub procs: Vec<RomProc>,
    pub allocs: Vec<RomAlloc>,
    fn_procs: HashMap<FnId, RomProcId>,
    gconst_arrays: HashMap<GconstId, RomArrayId>,
    gmember_spans: HashMap<(GmemberId, u8), Span>,
    lvar_spans: HashMap<(FnId, Romv, Locator), Span>,
    runtime_rom_spans: HashMap<(RuntimeRom, Romv), Span>,
    runtime_ram_spans: HashMap<(RuntimeRam, Romv), Span>,
    switch_tables: HashMap<SwitchId, (RomArrayId, RomArrayId)>,
    lt_values: Vec<LtValue>,
}

impl RomModel {
    pub fn new(arrays: Vec<RomArray>) -> Self {
        RomModel { arrays, ..Default::default() }
    }

    pub fn add_alloc(&mut self, alloc: RomAlloc) -> RomAllocId {
        self.allocs.push(alloc);
        RomAllocId(self.allocs.len() as u32 - 1)
    }

    pub fn add_proc(&mut self, fn_: Option<FnId>, proc: RomProc) -> RomProcId {
        self.procs.push(proc);
        let id = RomProcId(self.procs.len() as u32 - 1);
        if let Some(fn_) = fn_ {
            self.fn_procs.insert(fn_, id);
        }
        id
    }

    pub fn add_lt_value(&mut self, value: LtValue) -> LtId {
        self.lt_values.push(value);
        LtId(self.lt_values.len() as u16 - 1)
    }

    pub fn set_gconst_array(&mut self, gconst: GconstId, array: RomArrayId) {
        self.gconst_arrays.insert(gconst, array);
    }

    pub fn set_gmember_span(&mut self, gmember: GmemberId, atom: u8, span: Span) {
        self.gmember_spans.insert((gmember, atom), span);
    }

    pub fn set_lvar_span(&mut self, fn_: FnId, romv: Romv, head: Locator, span: Span) {
        debug_assert_eq!(head, head.mem_head());
        self.lvar_spans.insert((fn_, romv, head), span);
    }

    pub fn set_runtime_rom_span(&mut self, r: RuntimeRom, romv: Romv, span: Span) {
        self.runtime_rom_spans.insert((r, romv), span);
    }

    pub fn set_runtime_ram_span(&mut self, r: RuntimeRam, romv: Romv, span: Span) {
        self.runtime_ram_spans.insert((r, romv), span);
    }

    pub fn set_switch_table(&mut self, switch: SwitchId, lo: RomArrayId, hi: RomArrayId) {
        self.switch_tables.insert(switch, (lo, hi));
    }

    pub fn fn_proc(&self, fn_: FnId) -> Option<&RomProc> {
        self.fn_procs.get(&fn_).map(|id| &self.procs[id.0 as usize])
    }

    pub fn fn_proc_mut(&mut self, fn_: FnId) -> Option<&mut RomProc> {
        let id = *self.fn_procs.get(&fn_)?;
        Some(&mut self.procs[id.0 as usize])
    }

    pub fn array(&self, id: RomArrayId) -> &RomArray {
        &self.arrays[id.0 as usize]
    }

    pub fn alloc(&self, id: RomAllocId) -> &RomAlloc {
        &self.allocs[id.0 as usize]
    }

    fn lvar_span_with_fallback(&self, fn_: FnId, romv: Romv, head: Locator) -> Option<Span> {
        self.lvar_spans.get(&(fn_, romv, head)).copied().or_else(|| {
            Romv::ALL
                .iter()
                .find_map(|&alt| self.lvar_spans.get(&(fn_, alt, head)).copied())
        })
    }

    fn runtime_rom_span(&self, r: RuntimeRom, romv: Romv) -> Option<Span> {
        self.runtime_rom_spans.get(&(r, romv)).copied().or_else(|| {
            Romv::ALL.iter().find_map(|&alt| self.runtime_rom_spans.get(&(r, alt)).copied())
        })
    }

    fn runtime_ram_span(&self, r: RuntimeRam, romv: Romv) -> Option<Span> {
        self.runtime_ram_spans.get(&(r, romv)).copied().or_else(|| {
            Romv::ALL.iter().find_map(|&alt| self.runtime_ram_spans.get(&(r, alt)).copied())
        })
    }

    fn lt_value(&self, lt: LtId) -> &LtValue {
        &self.lt_values[lt.0 as usize]
    }
}

/// Everything the link pass needs to resolve one procedure's operands.
#[derive(Clone, Copy)]
pub struct LinkCtx<'a> {
    pub rom: &'a RomModel,
    pub romv: Romv,
    /// The function whose locals and labels are in scope.
    pub fn_: Option<FnId>,
    /// The bank the linked code is placed into, if decided.
    pub bank: Option<u8>,
}

impl<'a> LinkCtx<'a> {
    fn from_span(&self, loc: Locator, span: Option<Span>) -> Locator {
        let Some(span) = span else { return loc };
        if loc.is_() == IsSel::Bank {
            return loc;
        }
        let addr = span.addr as i32 + loc.offset();
        Locator::addr(addr as u16).with_is(loc.is_())
    }

    fn from_offset(
        &self,
        loc: Locator,
        alloc: Option<RomAllocId>,
        span_offset: i32,
    ) -> Locator {
        let Some(alloc) = alloc.map(|id| self.rom.alloc(id)) else { return loc };
        if loc.is_() == IsSel::Bank {
            return match alloc.first_bank() {
                Some(bank) => Locator::const_byte(bank),
                None => loc,
            };
        }
        self.from_span(loc, alloc.span().map(|s| s.offset_by(span_offset)))
    }

    /// Resolve `loc` to a concrete address or byte where the layout
    /// allows; unresolvable locators come back unchanged. A label that
    /// should exist but doesn't is a compiler bug.
    pub fn link_locator(&self, loc: Locator) -> Locator {
        match loc.lclass() {
            LocClass::NamedLabel => {
                let Some(fn_) = self.fn_ else { return loc };
                let Some(proc) = self.rom.fn_proc(fn_) else { return loc };
                match proc.proc().lookup_label(loc) {
                    Some(info) => {
                        self.from_offset(loc, proc.find_alloc(self.romv), info.offset as i32)
                    }
                    None => panic!("missing label during link: {loc}"),
                }
            }

            LocClass::Fn => {
                let fn_ = FnId(loc.data());
                let Some(proc) = self.rom.fn_proc(fn_) else { return loc };
                let entry = proc.proc().entry_label;
                let span_offset = if entry.is_none() {
                    0
                } else {
                    match proc.proc().lookup_label(entry) {
                        Some(info) => info.offset as i32,
                        None => panic!("missing entry label during link: {entry}"),
                    }
                };
                self.from_offset(loc, proc.find_alloc(self.romv), span_offset)
            }

            // Fold the offset away; linking is then idempotent.
            LocClass::Addr => Locator::addr((loc.data() as i64 + loc.offset() as i64) as u16)
                .with_is(loc.is_()),

            LocClass::Gmember => {
                let span = self
                    .rom
                    .gmember_spans
                    .get(&(GmemberId(loc.handle() as u16), loc.atom()))
                    .copied();
                self.from_span(loc, span)
            }

            LocClass::Ssa
            | LocClass::Phi
            | LocClass::MinorVar
            | LocClass::Arg
            | LocClass::Return => {
                let Some(fn_) = self.fn_ else { return loc };
                let span = self.rom.lvar_span_with_fallback(fn_, self.romv, loc.mem_head());
                self.from_span(loc, span)
            }

            LocClass::ThisBank => match self.bank {
                Some(bank) => Locator::const_byte(bank),
                None => loc,
            },

            LocClass::RuntimeRom => {
                if loc.is_() == IsSel::Bank {
                    return Locator::const_byte(0);
                }
                let r = match loc.data() {
                    0 => RuntimeRom::JsrYTrampoline,
                    1 => RuntimeRom::JmpYTrampoline,
                    _ => RuntimeRom::Reset,
                };
                self.from_span(loc, self.rom.runtime_rom_span(r, self.romv))
            }

            LocClass::RuntimeRam => {
                if loc.is_() == IsSel::Bank {
                    return Locator::const_byte(0);
                }
                let r = match loc.data() {
                    0 => RuntimeRam::PtrTemp,
                    _ => RuntimeRam::NmiReady,
                };
                self.from_span(loc, self.rom.runtime_ram_span(r, self.romv))
            }

            LocClass::RomArray => {
                let array = self.rom.array(RomArrayId(loc.data()));
                self.from_offset(loc, array.find_alloc(self.romv), 0)
            }

            LocClass::Gconst => {
                let Some(&array) = self.rom.gconst_arrays.get(&GconstId(loc.data())) else {
                    return loc;
                };
                self.from_offset(loc, self.rom.array(array).find_alloc(self.romv), 0)
            }

            LocClass::SwitchLoTable | LocClass::SwitchHiTable => {
                let Some(&(lo, hi)) = self.rom.switch_tables.get(&SwitchId(loc.data())) else {
                    return loc;
                };
                let table = if loc.lclass() == LocClass::SwitchLoTable { lo } else { hi };
                self.from_offset(loc, self.rom.array(table).find_alloc(self.romv), 0)
            }

            LocClass::LtExpr => {
                let lt = self.rom.lt_value(LtId(loc.handle() as u16));
                let bytes = lt.resolve(self.romv);
                let index = loc.atom() as usize;

                if !loc.byteified() && lt.is_ptr() && index + 1 < bytes.len() {
                    // Whole-pointer view: combine the two halves back
                    // into an address.
                    let lo = bytes[index].link(self);
                    let hi = bytes[index + 1].link(self);
                    match (linked_to_rom(lo, false), linked_to_rom(hi, false)) {
                        (Ok(lo), Ok(hi)) => {
                            let addr = lo as i32 + ((hi as i32) << 8) + loc.offset();
                            return Locator::addr(addr as u16);
                        }
                        _ => return loc,
                    }
                }

                assert!(index < bytes.len(), "late-bound byte index out of range: {loc}");
                bytes[index].link(self)
            }

            LocClass::None
            | LocClass::ConstByte
            | LocClass::CfgLabel
            | LocClass::MinorLabel => loc,
        }
    }
}

/// Replace every constant `InitArray` in the IR with an interned ROM
/// array locator. Leading and trailing uninitialized slots are trimmed
/// off, the replacement locator compensating with a negative offset.
pub fn locate_rom_arrays(ir: &mut Ir, pool: &RomArrayPool) {
    struct Candidate {
        id: crate::ssa::SsaId,
        data: Vec<Locator>,
        begin: usize,
    }

    let mut candidates: Vec<Candidate> = Vec::new();

    for cfg in ir.cfg_ids() {
        'node: for &id in ir.cfg_node(cfg).ssa() {
            let node = ir.node(id);
            if node.op != SsaOp::InitArray {
                continue;
            }

            let is_uninitialized = |v: SsaValue| {
                v.id().map_or(false, |h| ir.node(h).op == SsaOp::Uninitialized)
            };

            let inputs = node.inputs();
            for &input in inputs {
                if !input.is_const() && !is_uninitialized(input) {
                    continue 'node;
                }
            }

            let begin = inputs.iter().take_while(|&&v| is_uninitialized(v)).count();
            if begin == inputs.len() {
                continue;
            }
            let end = inputs.len()
                - inputs.iter().rev().take_while(|&&v| is_uninitialized(v)).count();

            let mut data = Vec::with_capacity(end - begin);
            for &input in &inputs[begin..end] {
                let loc = match input {
                    SsaValue::Loc(loc) => loc,
                    SsaValue::Num(n) => {
                        let whole = n.whole_part();
                        assert!(whole <= 0xFF, "array element out of byte range: {whole}");
                        Locator::const_byte(whole as u8)
                    }
                    SsaValue::Id(_) => Locator::const_byte(0),
                };
                data.push(loc);
            }

            candidates.push(Candidate { id, data, begin });
        }
    }

    for c in candidates {
        let array = pool.make(c.data, false, RomRule::Normal, Option::None);
        let loc = Locator::rom_array(array.0).with_advance_offset(-(c.begin as i32));
        ir.replace_with(c.id, SsaValue::Loc(loc));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{Fixed, Scalar};

    #[test]
    fn interning_dedupes_equal_content() {
        let pool = RomArrayPool::new();
        let v: Vec<Locator> = (0..4).map(Locator::const_byte).collect();
        let a = pool.make(v.clone(), false, RomRule::Normal, None);
        let b = pool.make(v.clone(), true, RomRule::Normal, Some(GroupId(3)));
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);

        let c = pool.make(vec![Locator::const_byte(9)], false, RomRule::Normal, None);
        assert_ne!(a, c);
        assert_eq!(pool.len(), 2);

        // Byteified views intern as the same content.
        let d = pool.make(
            v.iter().map(|l| l.with_byteified(true)).collect(),
            false,
            RomRule::Normal,
            None,
        );
        assert_eq!(a, d);

        let arrays = pool.freeze();
        assert!(arrays[a.0 as usize].aligned());
        assert!(arrays[a.0 as usize].used_in_group_data(GroupId(3)));
    }

    #[test]
    fn first_bank_per_alloc_class() {
        assert_eq!(RomAlloc::Static { span: Span { addr: 0, size: 1 } }.first_bank(), Some(0));
        assert_eq!(
            RomAlloc::Many { in_banks: 0b1100, span: Span { addr: 0, size: 1 } }.first_bank(),
            Some(2)
        );
        assert_eq!(RomAlloc::Many { in_banks: 0, span: Span { addr: 0, size: 1 } }.first_bank(), None);
        assert_eq!(
            RomAlloc::Once { bank: 5, span: Some(Span { addr: 0, size: 1 }) }.first_bank(),
            Some(5)
        );
        assert_eq!(RomAlloc::Once { bank: 5, span: None }.first_bank(), None);
    }

    #[test]
    fn locate_rom_arrays_trims_and_replaces() {
        let mut ir = Ir::new();
        let cfg = ir.push_cfg();
        let mask = Scalar::U8.mask();
        let uninit = ir.emplace(cfg, SsaOp::Uninitialized, mask, vec![]);
        let array = ir.emplace(
            cfg,
            SsaOp::InitArray,
            mask,
            vec![
                SsaValue::Id(uninit),
                SsaValue::Num(Fixed::whole(1)),
                SsaValue::Num(Fixed::whole(2)),
                SsaValue::Id(uninit),
            ],
        );
        let user = ir.emplace(cfg, SsaOp::Cast, mask, vec![SsaValue::Id(array)]);

        let pool = RomArrayPool::new();
        locate_rom_arrays(&mut ir, &pool);

        let SsaValue::Loc(loc) = ir.node(user).input(0) else {
            panic!("init array not replaced");
        };
        assert_eq!(loc.lclass(), LocClass::RomArray);
        assert_eq!(loc.offset(), -1);
        assert_eq!(ir.node(array).op, SsaOp::Pruned);

        let arrays = pool.freeze();
        assert_eq!(
            arrays[loc.data() as usize].data(),
            &[Locator::const_byte(1), Locator::const_byte(2)]
        );
    }

    #[test]
    fn non_constant_arrays_stay() {
        let mut ir = Ir::new();
        let cfg = ir.push_cfg();
        let mask = Scalar::U8.mask();
        let dynamic = ir.emplace(cfg, SsaOp::Copy, mask, vec![SsaValue::Num(Fixed::whole(1))]);
        let array = ir.emplace(
            cfg,
            SsaOp::InitArray,
            mask,
            vec![SsaValue::Id(dynamic), SsaValue::Num(Fixed::whole(2))],
        );
        let pool = RomArrayPool::new();
        locate_rom_arrays(&mut ir, &pool);
        assert_eq!(ir.node(array).op, SsaOp::InitArray);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn link_is_idempotent_on_resolved_locators() {
        let rom = RomModel::default();
        let ctx = LinkCtx { rom: &rom, romv: Romv::Mode, fn_: Option::None, bank: Option::None };

        let byte = Locator::const_byte(0x42);
        assert_eq!(byte.link(&ctx), byte);

        let addr = Locator::addr(0x8123);
        assert_eq!(addr.link(&ctx), addr);
        assert_eq!(addr.link(&ctx).link(&ctx), addr.link(&ctx));

        // An offset folds in exactly once.
        let offset = Locator::addr(0x8000).with_offset(5);
        assert_eq!(offset.link(&ctx), Locator::addr(0x8005));
        assert_eq!(offset.link(&ctx).link(&ctx), Locator::addr(0x8005));
    }

    #[test]
    fn rom_array_links_to_span_and_bank() {
        let pool = RomArrayPool::new();
        let id = pool.make(
            vec![Locator::const_byte(1), Locator::const_byte(2)],
            false,
            RomRule::Normal,
            None,
        );
        let mut rom = RomModel::new(pool.freeze());
        let alloc =
            rom.add_alloc(RomAlloc::Once { bank: 3, span: Some(Span { addr: 0x9000, size: 2 }) });
        rom.arrays[id.0 as usize].set_alloc(Romv::Mode, alloc);

        let ctx = LinkCtx { rom: &rom, romv: Romv::Mode, fn_: Option::None, bank: Option::None };
        let loc = Locator::rom_array(id.0);
        assert_eq!(loc.link(&ctx), Locator::addr(0x9000));
        assert_eq!(loc.with_advance_offset(1).link(&ctx), Locator::addr(0x9001));
        assert_eq!(loc.with_is(IsSel::Bank).link(&ctx), Locator::const_byte(3));
    }

    #[test]
    fn lt_values_memoise_per_variant() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut rom = RomModel::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let lt = rom.add_lt_value(LtValue::new(false, move |romv| {
            calls2.fetch_add(1, Ordering::SeqCst);
            vec![Locator::const_byte(romv as u8)]
        }));

        let ctx = LinkCtx { rom: &rom, romv: Romv::Nmi, fn_: Option::None, bank: Option::None };
        let loc = Locator::lt_expr(lt, 0);
        assert_eq!(loc.link(&ctx), Locator::const_byte(1));
        assert_eq!(loc.link(&ctx), Locator::const_byte(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
