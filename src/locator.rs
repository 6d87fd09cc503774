//! Symbolic operand locators.
//!
//! A [`Locator`] names exactly one addressable quantity — a variable, a
//! label, a constant, a ROM array slot, a pointer half, a bank index —
//! in a single packed word. The layout, low bit to high:
//!
//! ```text
//! bits  0..24   payload: a handle, immediate data, or {arg, member, atom}
//! bits 24..44   signed byte offset
//! bits 44..47   "is" selector
//! bit  47       byteified flag
//! bits 48..53   class tag
//! ```
//!
//! Locators are plain values: freely copied, never owning. The link
//! pass rewrites them into concrete `Addr`/`ConstByte` forms.

use crate::rom::LinkCtx;
use core::fmt;
use static_assertions::const_assert;

const PAYLOAD_BITS: u64 = 24;
const PAYLOAD_MASK: u64 = (1 << PAYLOAD_BITS) - 1;
const OFFSET_SHIFT: u64 = 24;
const OFFSET_BITS: u64 = 20;
const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;
const IS_SHIFT: u64 = 44;
const BYTEIFIED_SHIFT: u64 = 47;
const CLASS_SHIFT: u64 = 48;

const_assert!(CLASS_SHIFT + 5 <= 64);

/// Locator class tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum LocClass {
    None = 0,
    /// A member of a global variable.
    Gmember,
    /// A function's entry point.
    Fn,
    /// An argument slot of the function being linked.
    Arg,
    /// The return slot of the function being linked.
    Return,
    /// A label at the head of a basic block.
    CfgLabel,
    /// A compiler-allocated local label.
    MinorLabel,
    /// A user-named label.
    NamedLabel,
    ConstByte,
    Addr,
    SwitchLoTable,
    SwitchHiTable,
    /// Storage of an SSA value.
    Ssa,
    /// Storage of a phi web.
    Phi,
    /// Compiler-allocated scratch of the function being linked.
    MinorVar,
    RomArray,
    /// A named constant's data.
    Gconst,
    /// A late-bound expression, evaluated per ROM variant at link time.
    LtExpr,
    /// The bank this code was placed into.
    ThisBank,
    RuntimeRom,
    RuntimeRam,
}

/// What a locator denotes about its target: the stored value, the
/// address as data (whole or one half), the bank, or the dereference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IsSel {
    Deref = 0,
    Full,
    Ptr,
    PtrLo,
    PtrHi,
    Bank,
}

/// Handle to a function known to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FnId(pub u32);

/// Handle to one member of a global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GmemberId(pub u16);

/// Interned name of a user label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameId(pub u32);

/// Handle to a named constant's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GconstId(pub u32);

/// Handle to a late-bound expression value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LtId(pub u16);

/// Handle to a switch dispatch table pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwitchId(pub u32);

/// Runtime routines baked into every ROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum RuntimeRom {
    JsrYTrampoline = 0,
    JmpYTrampoline,
    Reset,
}

/// Runtime scratch locations, all zero-page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum RuntimeRam {
    PtrTemp = 0,
    NmiReady,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Locator(u64);

impl Default for Locator {
    fn default() -> Self {
        Locator::NONE
    }
}

impl Locator {
    pub const NONE: Locator = Locator(0);

    const fn new(class: LocClass, payload: u64) -> Self {
        Locator(((class as u64) << CLASS_SHIFT) | (payload & PAYLOAD_MASK))
    }

    pub const fn gmember(gmember: GmemberId, atom: u8) -> Self {
        Locator::new(LocClass::Gmember, ((gmember.0 as u64) << 8) | atom as u64)
    }

    pub const fn fn_entry(fn_: FnId) -> Self {
        Locator::new(LocClass::Fn, fn_.0 as u64)
    }

    pub const fn arg(arg: u8, member: u8, atom: u8) -> Self {
        Locator::new(LocClass::Arg, Self::pack_ama(arg, member, atom))
    }

    pub const fn ret(member: u8, atom: u8) -> Self {
        Locator::new(LocClass::Return, Self::pack_ama(0, member, atom))
    }

    pub const fn cfg_label(cfg: u32) -> Self {
        Locator::new(LocClass::CfgLabel, cfg as u64)
    }

    pub const fn minor_label(id: u32) -> Self {
        Locator::new(LocClass::MinorLabel, id as u64)
    }

    pub const fn named_label(name: NameId) -> Self {
        Locator::new(LocClass::NamedLabel, name.0 as u64)
    }

    pub const fn const_byte(value: u8) -> Self {
        Locator::new(LocClass::ConstByte, value as u64)
    }

    pub const fn addr(addr: u16) -> Self {
        Locator::new(LocClass::Addr, addr as u64)
    }

    pub const fn switch_lo_table(switch: SwitchId) -> Self {
        Locator::new(LocClass::SwitchLoTable, switch.0 as u64)
    }

    pub const fn switch_hi_table(switch: SwitchId) -> Self {
        Locator::new(LocClass::SwitchHiTable, switch.0 as u64)
    }

    pub const fn ssa(node: u32, atom: u8) -> Self {
        Locator::new(LocClass::Ssa, ((node as u64) << 8) | atom as u64)
    }

    pub const fn phi(node: u32, atom: u8) -> Self {
        Locator::new(LocClass::Phi, ((node as u64) << 8) | atom as u64)
    }

    pub const fn minor_var(index: u8, member: u8, atom: u8) -> Self {
        Locator::new(LocClass::MinorVar, Self::pack_ama(index, member, atom))
    }

    pub const fn rom_array(id: u32) -> Self {
        Locator::new(LocClass::RomArray, id as u64)
    }

    pub const fn gconst(id: GconstId) -> Self {
        Locator::new(LocClass::Gconst, id.0 as u64)
    }

    pub const fn lt_expr(lt: LtId, atom: u8) -> Self {
        Locator::new(LocClass::LtExpr, ((lt.0 as u64) << 8) | atom as u64)
    }

    pub const fn this_bank() -> Self {
        Locator::new(LocClass::ThisBank, 0)
    }

    pub const fn runtime_rom(r: RuntimeRom) -> Self {
        Locator::new(LocClass::RuntimeRom, r as u64)
    }

    pub const fn runtime_ram(r: RuntimeRam) -> Self {
        Locator::new(LocClass::RuntimeRam, r as u64)
    }

    const fn pack_ama(arg: u8, member: u8, atom: u8) -> u64 {
        ((arg as u64) << 16) | ((member as u64) << 8) | atom as u64
    }

    pub fn lclass(self) -> LocClass {
        use LocClass::*;
        match ((self.0 >> CLASS_SHIFT) & 0x1F) as u8 {
            0 => None,
            1 => Gmember,
            2 => Fn,
            3 => Arg,
            4 => Return,
            5 => CfgLabel,
            6 => MinorLabel,
            7 => NamedLabel,
            8 => ConstByte,
            9 => Addr,
            10 => SwitchLoTable,
            11 => SwitchHiTable,
            12 => Ssa,
            13 => Phi,
            14 => MinorVar,
            15 => RomArray,
            16 => Gconst,
            17 => LtExpr,
            18 => ThisBank,
            19 => RuntimeRom,
            20 => RuntimeRam,
            tag => unreachable!("corrupt locator class tag {tag}"),
        }
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Raw payload; immediate data for data-carrying classes.
    pub const fn data(self) -> u32 {
        (self.0 & PAYLOAD_MASK) as u32
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub fn offset(self) -> i32 {
        let field = ((self.0 >> OFFSET_SHIFT) & OFFSET_MASK) as u32;
        // Sign extend from 20 bits.
        ((field << 12) as i32) >> 12
    }

    pub fn with_offset(self, offset: i32) -> Self {
        let field = (offset as u32 as u64) & OFFSET_MASK;
        Locator((self.0 & !(OFFSET_MASK << OFFSET_SHIFT)) | (field << OFFSET_SHIFT))
    }

    pub fn with_advance_offset(self, delta: i32) -> Self {
        self.with_offset(self.offset() + delta)
    }

    pub fn is_(self) -> IsSel {
        match (self.0 >> IS_SHIFT) & 0b111 {
            0 => IsSel::Deref,
            1 => IsSel::Full,
            2 => IsSel::Ptr,
            3 => IsSel::PtrLo,
            4 => IsSel::PtrHi,
            _ => IsSel::Bank,
        }
    }

    pub const fn with_is(self, is: IsSel) -> Self {
        Locator((self.0 & !(0b111 << IS_SHIFT)) | ((is as u64) << IS_SHIFT))
    }

    pub const fn byteified(self) -> bool {
        self.0 & (1 << BYTEIFIED_SHIFT) != 0
    }

    pub const fn with_byteified(self, byteified: bool) -> Self {
        if byteified {
            Locator(self.0 | (1 << BYTEIFIED_SHIFT))
        } else {
            Locator(self.0 & !(1 << BYTEIFIED_SHIFT))
        }
    }

    /// Argument index of an `{arg, member, atom}` class.
    pub const fn arg_index(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    pub const fn member(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    pub const fn atom(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Handle part of a `(handle, atom)` class.
    pub const fn handle(self) -> u32 {
        ((self.0 & PAYLOAD_MASK) >> 8) as u32
    }

    /// Does the payload carry sub-field indices rather than one handle?
    pub fn has_atom(self) -> bool {
        matches!(
            self.lclass(),
            LocClass::Arg
                | LocClass::Return
                | LocClass::MinorVar
                | LocClass::Gmember
                | LocClass::Ssa
                | LocClass::Phi
                | LocClass::LtExpr
        )
    }

    /// The locator viewed as a whole memory region: offset and atom
    /// cleared, so two locators into the same region compare equal.
    pub fn mem_head(self) -> Self {
        let head = self.with_offset(0);
        if head.has_atom() {
            Locator(head.0 & !0xFF)
        } else {
            head
        }
    }

    pub fn eq_const(self, value: u8) -> bool {
        self.lclass() == LocClass::ConstByte && self.data() == value as u32
    }

    /// Single-byte views: byteified locators, bank and pointer-half
    /// selectors, and plain const bytes.
    pub fn mem_size_is_byte(self) -> bool {
        self.byteified()
            || matches!(self.is_(), IsSel::PtrLo | IsSel::PtrHi | IsSel::Bank)
            || self.lclass() == LocClass::ConstByte
    }

    /// Must this operand live in the zero page?
    pub fn mem_zp_only(self) -> bool {
        if !self.mem_zp_valid() {
            return false;
        }
        match self.lclass() {
            LocClass::Addr => self.addr_value() < 0x100,
            // Pointer slots are always allocated in the zero page so
            // (indirect),y addressing can reach them.
            LocClass::Ssa
            | LocClass::Phi
            | LocClass::MinorVar
            | LocClass::Arg
            | LocClass::Return
            | LocClass::Gmember => self.is_() == IsSel::Ptr,
            LocClass::RuntimeRam => true,
            _ => false,
        }
    }

    pub fn mem_zp_valid(self) -> bool {
        !(self.lclass() == LocClass::Addr && self.addr_value() >= 0x100)
    }

    fn addr_value(self) -> u32 {
        (self.data() as i64 + self.offset() as i64) as u32
    }

    pub fn is_const(self) -> bool {
        matches!(self.lclass(), LocClass::ConstByte | LocClass::Addr)
    }

    pub fn is_label(self) -> bool {
        matches!(self.lclass(), LocClass::CfgLabel | LocClass::MinorLabel | LocClass::NamedLabel)
    }

    /// Plain storage the peephole may freely re-read or fuse with a
    /// read-modify-write. Raw addresses qualify only inside the zero
    /// page, where no hardware register can hide.
    pub fn is_var_like(self) -> bool {
        match self.lclass() {
            LocClass::Ssa
            | LocClass::Phi
            | LocClass::MinorVar
            | LocClass::Arg
            | LocClass::Return
            | LocClass::Gmember => true,
            LocClass::Addr => self.addr_value() < 0x100,
            _ => false,
        }
    }

    /// Resolve this locator against the ROM layout. Unresolvable
    /// locators are returned unchanged; a missing label is a compiler
    /// bug and panics.
    pub fn link(self, ctx: &LinkCtx<'_>) -> Locator {
        ctx.link_locator(self)
    }
}

/// Read the final byte-or-address value out of a linked locator.
///
/// With `ignore_errors`, unresolvable locators read as zero; otherwise
/// they are a link error.
pub fn linked_to_rom(linked: Locator, ignore_errors: bool) -> crate::error::Result<u16> {
    if !linked.is_const() || linked.is_() == IsSel::Bank {
        if ignore_errors {
            return Ok(0);
        }
        return Err(crate::error::Error::Link(linked));
    }
    debug_assert_eq!(linked.offset(), 0);

    let mut data = linked.data() as u16;
    if linked.is_() == IsSel::PtrHi {
        data >>= 8;
    }
    Ok(data)
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lclass() {
            LocClass::None => return write!(f, "none"),
            LocClass::Gmember => write!(f, "gmember {} {}", self.handle(), self.atom())?,
            LocClass::Fn => write!(f, "fn {}", self.data())?,
            LocClass::Arg => {
                write!(f, "arg {} {} {}", self.arg_index(), self.member(), self.atom())?
            }
            LocClass::Return => write!(f, "ret {} {}", self.member(), self.atom())?,
            LocClass::CfgLabel => write!(f, "cfg label {}", self.data())?,
            LocClass::MinorLabel => write!(f, "minor label {}", self.data())?,
            LocClass::NamedLabel => write!(f, "named label {}", self.data())?,
            LocClass::ConstByte => write!(f, "const byte {:#04x}", self.data())?,
            LocClass::Addr => write!(f, "addr ${:04x}", self.data() as i64 + self.offset() as i64)?,
            LocClass::SwitchLoTable => write!(f, "switch_lo_table {}", self.data())?,
            LocClass::SwitchHiTable => write!(f, "switch_hi_table {}", self.data())?,
            LocClass::Ssa => write!(f, "ssa {} {}", self.handle(), self.atom())?,
            LocClass::Phi => write!(f, "phi {} {}", self.handle(), self.atom())?,
            LocClass::MinorVar => {
                write!(f, "minor var {} {} {}", self.arg_index(), self.member(), self.atom())?
            }
            LocClass::RomArray => write!(f, "rom_array {}", self.data())?,
            LocClass::Gconst => write!(f, "gconst {}", self.data())?,
            LocClass::LtExpr => write!(f, "lt_expr {} {}", self.handle(), self.atom())?,
            LocClass::ThisBank => write!(f, "this bank")?,
            LocClass::RuntimeRom => write!(f, "runtime_rom {}", self.data())?,
            LocClass::RuntimeRam => write!(f, "runtime_ram {}", self.data())?,
        }
        write!(
            f,
            " (offset:{} byteified:{} is:{:?})",
            self.offset(),
            self.byteified() as u8,
            self.is_()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use strum::IntoEnumIterator;

    #[test]
    fn class_tags_round_trip() {
        for class in LocClass::iter() {
            let loc = Locator::new(class, 0);
            assert_eq!(loc.lclass(), class);
        }
    }

    #[quickcheck]
    fn offset_round_trips(offset: i32) -> bool {
        let clamped = offset.clamp(-(1 << 19), (1 << 19) - 1);
        Locator::addr(0x1234).with_offset(clamped).offset() == clamped
    }

    #[test]
    fn fields_are_independent() {
        let loc = Locator::arg(3, 2, 1)
            .with_offset(-5)
            .with_is(IsSel::PtrHi)
            .with_byteified(true);
        assert_eq!(loc.lclass(), LocClass::Arg);
        assert_eq!(loc.arg_index(), 3);
        assert_eq!(loc.member(), 2);
        assert_eq!(loc.atom(), 1);
        assert_eq!(loc.offset(), -5);
        assert_eq!(loc.is_(), IsSel::PtrHi);
        assert!(loc.byteified());
    }

    #[test]
    fn mem_head_merges_regions() {
        let a = Locator::arg(1, 0, 0).with_offset(2);
        let b = Locator::arg(1, 0, 1).with_offset(7);
        assert_eq!(a.mem_head(), b.mem_head());
        assert_ne!(a.mem_head(), Locator::arg(2, 0, 0).mem_head());

        let label = Locator::minor_label(4).with_offset(3);
        assert_eq!(label.mem_head(), Locator::minor_label(4));
    }

    #[test]
    fn zp_knowledge() {
        assert!(Locator::addr(0x42).mem_zp_only());
        assert!(!Locator::addr(0x242).mem_zp_only());
        assert!(!Locator::addr(0x242).mem_zp_valid());
        assert!(Locator::ssa(9, 0).with_is(IsSel::Ptr).mem_zp_only());
        assert!(!Locator::ssa(9, 0).mem_zp_only());
    }

    #[test]
    fn byte_views() {
        assert!(Locator::const_byte(7).mem_size_is_byte());
        assert!(Locator::addr(0x300).with_is(IsSel::PtrHi).mem_size_is_byte());
        assert!(Locator::ssa(1, 0).with_byteified(true).mem_size_is_byte());
        assert!(!Locator::addr(0x300).mem_size_is_byte());
    }
}
