//! Abstract-interpretation lattice over fixed-point values.
//!
//! Every SSA value is tracked as a triple of an unsigned interval, a
//! known-bits mask pair, and a carry flag. The refining operation is
//! [`Constraints::intersect`], which may reach ⊤ (a contradiction, read
//! as "unreachable"); the widening operation is [`Constraints::union_`],
//! which tends toward ⊥ (nothing known inside the mask). Transfer
//! functions for each SSA opcode live in [`transfer`].

use crate::fixed::{FixedUint, FIXED_BITS, FIXED_SHIFT};
use core::fmt;

mod transfer;
pub use transfer::{
    abstract_fn, abstract_transfer, narrow_fn, narrow_transfer, AbstractFn, NarrowFn,
};

/// Inclusive interval over the unsigned 64-bit domain.
///
/// `min > max` encodes ⊤.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub min: FixedUint,
    pub max: FixedUint,
}

/// Bit-level knowledge: bit i is certainly zero if `known0` has bit i,
/// certainly one if `known1` does, unknown if neither, contradictory
/// (⊤) if both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KnownBits {
    pub known0: FixedUint,
    pub known1: FixedUint,
}

/// Carry-flag lattice. The encoding is chosen so that bitwise-or of two
/// values refines (toward [`Carry::Top`]) and bitwise-and widens
/// (toward [`Carry::Bottom`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Carry {
    Bottom = 0b00,
    Clear = 0b01,
    Set = 0b10,
    Top = 0b11,
}

impl Carry {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Carry::Bottom,
            0b01 => Carry::Clear,
            0b10 => Carry::Set,
            _ => Carry::Top,
        }
    }

    pub const fn intersect(self, other: Self) -> Self {
        Carry::from_bits(self as u8 | other as u8)
    }

    pub const fn union_(self, other: Self) -> Self {
        Carry::from_bits(self as u8 & other as u8)
    }

    pub const fn is_subset(self, of: Self) -> bool {
        self as u8 == of as u8 || matches!(of, Carry::Bottom)
    }

    pub const fn is_const(self) -> bool {
        matches!(self, Carry::Clear | Carry::Set)
    }
}

impl Bounds {
    pub const fn top() -> Self {
        Bounds { min: 1, max: 0 }
    }

    pub const fn bottom(mask: FixedUint) -> Self {
        Bounds { min: 0, max: mask }
    }

    pub const fn is_top(self) -> bool {
        self.min > self.max
    }

    /// Interval implied by a known-bits pair.
    pub const fn from_bits(bits: KnownBits) -> Self {
        if bits.is_top() {
            return Bounds::top();
        }
        Bounds { min: bits.known1, max: !bits.known0 }
    }

    /// Wrap an interval into the live bits of `mask`.
    pub fn apply_mask(self, mask: FixedUint) -> Self {
        if self.is_top() {
            return Bounds::top();
        }
        let mut b = self;
        if b.max > mask {
            let span = b.max - b.min;
            b.min &= mask;
            b.max = b.min.wrapping_add(span);
            if b.max > mask {
                b = Bounds::bottom(mask);
            }
        }
        debug_assert!(!b.is_top());
        b
    }

    pub fn intersect(self, other: Self) -> Self {
        Bounds { min: self.min.max(other.min), max: self.max.min(other.max) }
    }

    pub fn union_(self, other: Self) -> Self {
        if self.is_top() {
            return other;
        }
        if other.is_top() {
            return self;
        }
        Bounds { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    pub fn is_subset(self, big: Self) -> bool {
        if big.is_top() {
            return self.is_top();
        }
        if self.is_top() {
            return true;
        }
        self.min >= big.min && self.max <= big.max
    }
}

impl KnownBits {
    pub const fn top() -> Self {
        KnownBits { known0: !0, known1: !0 }
    }

    /// Nothing known inside `mask`; everything outside it is zero.
    pub const fn bottom(mask: FixedUint) -> Self {
        KnownBits { known0: !mask, known1: 0 }
    }

    pub const fn const_(value: FixedUint) -> Self {
        KnownBits { known0: !value, known1: value }
    }

    pub const fn known(self) -> FixedUint {
        self.known0 | self.known1
    }

    pub const fn is_top(self) -> bool {
        self.known0 & self.known1 != 0
    }

    /// All bits known and consistent.
    pub const fn is_const(self) -> bool {
        !self.is_top() && self.known() == !0
    }

    pub const fn bit_eq(self, other: Self) -> bool {
        self.known0 == other.known0 && self.known1 == other.known1
    }

    /// Bits implied by an interval: the common high prefix of min and
    /// max is known.
    pub fn from_bounds(bounds: Bounds) -> Self {
        if bounds.is_top() {
            return KnownBits::top();
        }
        let x = bounds.min ^ bounds.max;
        let mask = if x == 0 {
            !0
        } else {
            let run = FIXED_BITS - x.leading_zeros();
            if run >= FIXED_BITS {
                0
            } else {
                !((1u64 << run) - 1)
            }
        };
        debug_assert_eq!(x & mask, 0);
        let ret = KnownBits { known0: !bounds.min & mask, known1: bounds.min & mask };
        debug_assert!(!ret.is_top());
        ret
    }

    pub fn apply_mask(self, mask: FixedUint) -> Self {
        if self.is_top() {
            return KnownBits::top();
        }
        let ret = KnownBits { known0: self.known0 | !mask, known1: self.known1 & mask };
        debug_assert!(!ret.is_top());
        ret
    }

    pub const fn intersect(self, other: Self) -> Self {
        KnownBits { known0: self.known0 | other.known0, known1: self.known1 | other.known1 }
    }

    pub fn union_(self, other: Self) -> Self {
        if self.is_top() {
            return other;
        }
        if other.is_top() {
            return self;
        }
        KnownBits { known0: self.known0 & other.known0, known1: self.known1 & other.known1 }
    }

    pub fn is_subset(self, big: Self) -> bool {
        if big.is_top() {
            return self.is_top();
        }
        if self.is_top() {
            return true;
        }
        big.intersect(self).bit_eq(self) && self.union_(big).bit_eq(big)
    }
}

/// The per-value constraint triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constraints {
    pub bounds: Bounds,
    pub bits: KnownBits,
    pub carry: Carry,
}

impl Constraints {
    pub const fn top() -> Self {
        Constraints { bounds: Bounds::top(), bits: KnownBits::top(), carry: Carry::Top }
    }

    /// Unconstrained within `mask`.
    pub const fn bottom(mask: FixedUint) -> Self {
        Constraints {
            bounds: Bounds::bottom(mask),
            bits: KnownBits::bottom(mask),
            carry: Carry::Bottom,
        }
    }

    /// The constant whole number `n` (fixed-point shifted).
    pub const fn whole(n: u64, carry: Carry) -> Self {
        Constraints::exact(n << FIXED_SHIFT, carry)
    }

    /// The exact lane value `value`.
    pub const fn exact(value: FixedUint, carry: Carry) -> Self {
        Constraints {
            bounds: Bounds { min: value, max: value },
            bits: KnownBits::const_(value),
            carry,
        }
    }

    /// Either boolean, nothing else.
    pub const fn any_bool(carry: Carry) -> Self {
        Constraints {
            bounds: Bounds { min: 0, max: 1 << FIXED_SHIFT },
            bits: KnownBits::bottom(1 << FIXED_SHIFT),
            carry,
        }
    }

    pub const fn is_top(self) -> bool {
        self.bounds.is_top() || self.bits.is_top() || matches!(self.carry, Carry::Top)
    }

    /// True when the value component is a single concrete lane value.
    pub const fn is_const(self) -> bool {
        self.bits.is_const()
    }

    pub const fn const_value(self) -> FixedUint {
        self.bits.known1
    }

    pub fn apply_mask(self, mask: FixedUint) -> Self {
        Constraints {
            bounds: self.bounds.apply_mask(mask),
            bits: self.bits.apply_mask(mask),
            carry: self.carry,
        }
    }

    pub fn intersect(self, other: Self) -> Self {
        Constraints {
            bounds: self.bounds.intersect(other.bounds),
            bits: self.bits.intersect(other.bits),
            carry: self.carry.intersect(other.carry),
        }
    }

    pub fn union_(self, other: Self) -> Self {
        Constraints {
            bounds: self.bounds.union_(other.bounds),
            bits: self.bits.union_(other.bits),
            carry: self.carry.union_(other.carry),
        }
    }

    /// Field equality after collapsing both sides' ⊤ forms.
    pub fn normal_eq(self, other: Self) -> bool {
        if self.is_top() || other.is_top() {
            return self.is_top() == other.is_top();
        }
        self == other
    }

    pub fn is_subset(self, big: Self) -> bool {
        big.intersect(self).normal_eq(self) && self.union_(big).normal_eq(big)
    }

    pub fn is_normalized(self) -> bool {
        self == normalize(self)
    }
}

/// Narrow an interval using known bit parities.
///
/// If the bounds are [1, 5] and bit 0 is known zero, the interval
/// narrows to [2, 4]: each endpoint is bumped toward the middle until
/// every known bit agrees with its required value.
pub fn tighten_bounds(c: Constraints) -> Bounds {
    if c.bounds.is_top() || c.bits.is_top() {
        return c.bounds;
    }

    let known = c.bits.known();
    if known == 0 {
        return c.bounds;
    }

    let mut min = c.bounds.min;
    let mut max = !c.bounds.max;

    let bit_min = known.trailing_zeros() as u64;
    let bit_max = (FIXED_BITS - known.leading_zeros()) as u64;

    for i in bit_min..bit_max {
        let bit = (1u64 << i) & known;
        if (min ^ c.bits.known1) & bit != 0 {
            min = min.wrapping_add(bit);
            min &= !(bit.wrapping_sub(1)) | known;
        }
        if (max ^ c.bits.known0) & bit != 0 {
            max = max.wrapping_add(bit);
            max &= !(bit.wrapping_sub(1)) | known;
        }
    }

    Bounds { min, max: !max }
}

fn normalize_impl(mut c: Constraints) -> Constraints {
    c.bounds = c.bounds.intersect(Bounds::from_bits(c.bits));
    c.bits = c.bits.intersect(KnownBits::from_bounds(c.bounds));
    c.bounds = tighten_bounds(c);
    c.bits = c.bits.intersect(KnownBits::from_bounds(c.bounds));
    if c.is_top() {
        return Constraints::top();
    }
    c
}

/// Reach the shared fixpoint of bounds and bits.
///
/// Idempotent: a second application changes nothing.
pub fn normalize(c: Constraints) -> Constraints {
    let ret = normalize_impl(c);
    debug_assert_eq!(ret, normalize_impl(ret));
    ret
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.min, self.max)
    }
}

impl fmt::Display for KnownBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known = self.known();
        for i in (0..FIXED_BITS as u64).rev() {
            let bit = 1u64 << i;
            if known & bit != 0 {
                if self.known0 & self.known1 & bit != 0 {
                    write!(f, "T")?;
                } else if self.known0 & bit != 0 {
                    write!(f, "0")?;
                } else {
                    write!(f, "1")?;
                }
            } else {
                write!(f, "?")?;
            }
            if i > 0 && i % 8 == 0 {
                write!(f, " ")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Constraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ {}, {}, {:?} }}", self.bits, self.bounds, self.carry)?;
        if self.is_const() {
            write!(f, " (CONST)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    const TEST_MASK: FixedUint = 0xFF << FIXED_SHIFT;

    /// Random normalized, non-⊤ constraint inside an 8-bit mask.
    #[derive(Debug, Clone, Copy)]
    struct Arb(Constraints);

    impl Arbitrary for Arb {
        fn arbitrary(g: &mut Gen) -> Self {
            let a = u64::arbitrary(g) & 0xFF;
            let b = u64::arbitrary(g) & 0xFF;
            let (lo, hi) = (a.min(b), a.max(b));
            let unknown = u64::arbitrary(g) & 0xFF;
            let value = u64::arbitrary(g) & 0xFF;
            let bits = KnownBits {
                known0: ((!value & !unknown & 0xFF) << FIXED_SHIFT) | !TEST_MASK,
                known1: (value & !unknown & 0xFF) << FIXED_SHIFT,
            };
            let carry = Carry::from_bits(u8::arbitrary(g) & 0b01);
            let c = Constraints {
                bounds: Bounds { min: lo << FIXED_SHIFT, max: hi << FIXED_SHIFT },
                bits,
                carry,
            };
            let n = normalize(c.apply_mask(TEST_MASK));
            if n.is_top() {
                Arb(Constraints::bottom(TEST_MASK))
            } else {
                Arb(n)
            }
        }
    }

    #[quickcheck]
    fn normalize_is_idempotent(c: Arb) -> bool {
        let once = normalize(c.0);
        once == normalize(once)
    }

    #[quickcheck]
    fn intersect_refines_union_widens(a: Arb, b: Arb) -> bool {
        let (a, b) = (a.0, b.0);
        let met = a.intersect(b);
        let joined = a.union_(b);
        met.is_subset(a) && met.is_subset(b) && a.is_subset(joined) && b.is_subset(joined)
    }

    #[test]
    fn tighten_bounds_parity_walk() {
        // [1, 5] with bit 0 known zero narrows to [2, 4].
        let shift = FIXED_SHIFT;
        let c = Constraints {
            bounds: Bounds { min: 1 << shift, max: 5 << shift },
            bits: KnownBits { known0: 1 << shift | !TEST_MASK, known1: 0 },
            carry: Carry::Bottom,
        };
        let b = tighten_bounds(c);
        assert_eq!(b.min, 2 << shift);
        assert_eq!(b.max, 4 << shift);
    }

    #[test]
    fn carry_lattice_encoding() {
        assert_eq!(Carry::Clear.intersect(Carry::Set), Carry::Top);
        assert_eq!(Carry::Clear.union_(Carry::Set), Carry::Bottom);
        assert!(Carry::Clear.is_subset(Carry::Bottom));
        assert!(!Carry::Bottom.is_subset(Carry::Clear));
    }

    #[test]
    fn const_round_trip() {
        let c = Constraints::whole(7, Carry::Bottom).apply_mask(TEST_MASK);
        assert!(c.is_const());
        assert_eq!(c.const_value(), 7 << FIXED_SHIFT);
        assert_eq!(normalize(c), c);
    }

    #[test]
    fn top_collapses() {
        let contradiction = Constraints {
            bounds: Bounds { min: 5, max: 3 },
            bits: KnownBits::bottom(TEST_MASK),
            carry: Carry::Bottom,
        };
        assert_eq!(normalize(contradiction), Constraints::top());
    }
}
