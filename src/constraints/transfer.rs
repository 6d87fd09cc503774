//! Per-opcode transfer kernels of the constraint lattice.
//!
//! For each SSA opcode there are two pure functions: a forward
//! (`abstract`) transfer computing the result constraint from input
//! constraints, and a backward (`narrow`) transfer refining the inputs
//! given an expected result. Both are monotone and sound; neither
//! widens. Fixpoint iteration is the caller's business — these are
//! just the kernels.

use super::{normalize, Bounds, Carry, Constraints, KnownBits};
use crate::fixed::{FixedUint, FIXED_BITS, FIXED_SHIFT};
use crate::ssa::SsaOp;

pub type AbstractFn = fn(FixedUint, &[Constraints]) -> Constraints;
pub type NarrowFn = fn(FixedUint, Constraints, &mut [Constraints]);

/// Forward transfer kernel for `op`, if the lattice models it.
pub fn abstract_fn(op: SsaOp) -> Option<AbstractFn> {
    match op {
        SsaOp::Phi => Some(abstract_phi),
        SsaOp::ReadGlobal => Some(abstract_bottom),
        SsaOp::FnCall => Some(abstract_bottom),
        SsaOp::Uninitialized => Some(abstract_bottom),
        SsaOp::Cast => Some(abstract_cast),
        SsaOp::Copy => Some(abstract_copy),
        SsaOp::Add => Some(abstract_add),
        SsaOp::And => Some(abstract_and),
        SsaOp::Or => Some(abstract_or),
        SsaOp::Xor => Some(abstract_xor),
        SsaOp::Eq => Some(abstract_eq),
        SsaOp::NotEq => Some(abstract_not_eq),
        SsaOp::Lt => Some(abstract_lt),
        SsaOp::Lte => Some(abstract_lte),
        _ => None,
    }
}

/// Backward transfer kernel for `op`, if the lattice models it.
pub fn narrow_fn(op: SsaOp) -> Option<NarrowFn> {
    match op {
        SsaOp::Phi => Some(narrow_phi),
        SsaOp::Uninitialized => Some(narrow_nop),
        SsaOp::Cast | SsaOp::Copy => Some(narrow_passthrough),
        SsaOp::Add => Some(narrow_add),
        SsaOp::And => Some(narrow_and),
        SsaOp::Or => Some(narrow_or),
        SsaOp::Xor => Some(narrow_xor),
        SsaOp::Eq => Some(narrow_eq),
        SsaOp::NotEq => Some(narrow_not_eq),
        SsaOp::Lt => Some(narrow_lt),
        SsaOp::Lte => Some(narrow_lte),
        _ => None,
    }
}

/// Run the forward transfer and normalize the result.
///
/// Panics on opcodes the lattice does not model; that is an internal
/// error in the caller's fixpoint.
pub fn abstract_transfer(op: SsaOp, mask: FixedUint, inputs: &[Constraints]) -> Constraints {
    let f = abstract_fn(op).unwrap_or_else(|| panic!("no abstract transfer for {op:?}"));
    normalize(f(mask, inputs))
}

/// Run the backward transfer. Inputs are refined in place; the result
/// of refinement never enlarges any input, and every refined input is
/// normalized.
pub fn narrow_transfer(
    op: SsaOp,
    mask: FixedUint,
    result: Constraints,
    inputs: &mut [Constraints],
) {
    let f = narrow_fn(op).unwrap_or_else(|| panic!("no narrow transfer for {op:?}"));
    let originals: Vec<Constraints> = inputs.to_vec();
    f(mask, result, inputs);
    for (c, orig) in inputs.iter_mut().zip(originals) {
        *c = normalize(orig.intersect(*c));
    }
}

fn abstract_phi(_mask: FixedUint, c: &[Constraints]) -> Constraints {
    let mut ret = Constraints::top();
    for &input in c {
        ret = ret.union_(input);
    }
    ret
}

fn abstract_bottom(mask: FixedUint, _c: &[Constraints]) -> Constraints {
    Constraints::bottom(mask)
}

fn abstract_cast(mask: FixedUint, c: &[Constraints]) -> Constraints {
    debug_assert_eq!(c.len(), 1);
    c[0].apply_mask(mask)
}

fn abstract_copy(_mask: FixedUint, c: &[Constraints]) -> Constraints {
    debug_assert_eq!(c.len(), 1);
    c[0]
}

// Index layout of the trit-addition table: two bits each of carry-in,
// lhs known0, lhs known1, rhs known0, rhs known1, low to high. The
// output packs carry-out in bits 0-1, known0 in 2-3, known1 in 4-5.
static ADD_TABLE: [u8; 1024] = build_add_table();

// Possibility mask over {0, 1}: bit 0 = can be zero, bit 1 = can be one.
const fn trit_possibilities(known0: usize, known1: usize) -> u8 {
    match (known0, known1) {
        (1, 0) => 0b01,
        (0, 1) => 0b10,
        _ => 0b11,
    }
}

const fn carry_possibilities(carry: usize) -> u8 {
    match carry {
        0b01 => 0b01,
        0b10 => 0b10,
        _ => 0b11,
    }
}

const fn build_add_table() -> [u8; 1024] {
    let mut table = [0u8; 1024];
    let mut index = 0usize;
    while index < 1024 {
        let mut carry = carry_possibilities(index & 0b11);
        let mut out_known0 = 0u8;
        let mut out_known1 = 0u8;

        let mut bit = 0;
        while bit < 2 {
            let lhs = trit_possibilities((index >> (2 + bit)) & 1, (index >> (4 + bit)) & 1);
            let rhs = trit_possibilities((index >> (6 + bit)) & 1, (index >> (8 + bit)) & 1);

            let mut sum_poss = 0u8;
            let mut carry_poss = 0u8;
            let mut a = 0;
            while a < 2 {
                if lhs & (1 << a) != 0 {
                    let mut b = 0;
                    while b < 2 {
                        if rhs & (1 << b) != 0 {
                            let mut ci = 0;
                            while ci < 2 {
                                if carry & (1 << ci) != 0 {
                                    let s = a + b + ci;
                                    sum_poss |= 1 << (s & 1);
                                    carry_poss |= 1 << (s >> 1);
                                }
                                ci += 1;
                            }
                        }
                        b += 1;
                    }
                }
                a += 1;
            }

            if sum_poss == 0b01 {
                out_known0 |= 1 << bit;
            } else if sum_poss == 0b10 {
                out_known1 |= 1 << bit;
            }
            carry = carry_poss;
            bit += 1;
        }

        let carry_out = match carry {
            0b01 => 0b01u8,
            0b10 => 0b10,
            _ => 0b00,
        };
        table[index] = carry_out | (out_known0 << 2) | (out_known1 << 4);
        index += 1;
    }
    table
}

fn abstract_add(mask: FixedUint, c: &[Constraints]) -> Constraints {
    debug_assert_eq!(c.len(), 3);
    const C: usize = 0;
    const L: usize = 1;
    const R: usize = 2;

    if c[L].is_top() || c[R].is_top() || c[C].is_top() {
        return Constraints::top();
    }

    // Trit-wise ripple addition, two bit positions per table step. The
    // scan is bounded by the mask: the carry input enters at the mask's
    // lowest live bit and the carry output is read off its highest.
    // Low positions where both operands are known zero are skipped when
    // the incoming carry is known clear.
    let neg_mask = !(c[L].bits.known0 & c[R].bits.known0) & mask;
    let mask_lo = mask.trailing_zeros() & !1;
    let mask_top = (FIXED_BITS - mask.leading_zeros() + 1) & !1;
    let start_i = if neg_mask != 0 && c[C].carry == Carry::Clear {
        (neg_mask.trailing_zeros() & !1).max(mask_lo)
    } else {
        mask_lo
    };
    let end_i = {
        let high = if neg_mask != 0 {
            FIXED_BITS - neg_mask.leading_zeros()
        } else {
            FIXED_BITS
        };
        ((high + 2) & !1).min(mask_top)
    };

    let mut known0: FixedUint = (1u64 << start_i) - 1;
    let mut known1: FixedUint = 0;

    let mut lhs = c[L].bits;
    let mut rhs = c[R].bits;
    lhs.known0 >>= start_i;
    lhs.known1 >>= start_i;
    rhs.known0 >>= start_i;
    rhs.known1 >>= start_i;

    let mut j = c[C].carry as usize;
    let mut i = start_i;
    while i < end_i {
        j |= ((lhs.known0 & 0b11) as usize) << 2;
        j |= ((lhs.known1 & 0b11) as usize) << 4;
        j |= ((rhs.known0 & 0b11) as usize) << 6;
        j |= ((rhs.known1 & 0b11) as usize) << 8;

        j = ADD_TABLE[j] as usize;
        known0 |= (((j >> 2) & 0b11) as u64) << i;
        known1 |= (((j >> 4) & 0b11) as u64) << i;
        j &= 0b11;

        lhs.known0 >>= 2;
        lhs.known1 >>= 2;
        rhs.known0 >>= 2;
        rhs.known1 >>= 2;
        i += 2;
    }

    let carry = Carry::from_bits(j as u8);
    debug_assert_ne!(carry, Carry::Top);
    if i < FIXED_BITS {
        known0 |= !((1u64 << i) - 1);
    }

    let bits = KnownBits { known0, known1 }.apply_mask(mask);
    debug_assert!(!bits.is_top());

    // The carry input lands on the lowest live bit of the mask.
    let carry_lo = mask & mask.wrapping_neg();
    let (extra_min, extra_max) = match c[C].carry {
        Carry::Clear => (0, 0),
        Carry::Set => (carry_lo, carry_lo),
        _ => (0, carry_lo),
    };

    let max = c[L]
        .bounds
        .max
        .checked_add(c[R].bounds.max)
        .and_then(|m| m.checked_add(extra_max));
    let Some(max) = max else {
        // Overflowed the lane; fall back to the interval the known bits imply.
        let bounds = Bounds::from_bits(bits).apply_mask(mask);
        return normalize(Constraints { bounds, bits, carry });
    };
    let min = c[L].bounds.min + c[R].bounds.min + extra_min;
    let bounds = Bounds { min, max }.apply_mask(mask);

    // The interval constrains the bits right back.
    let bounds_bits = KnownBits::from_bounds(bounds).apply_mask(mask);
    let bits = KnownBits {
        known0: bits.known0 | bounds_bits.known0,
        known1: bits.known1 | bounds_bits.known1,
    };

    normalize(Constraints { bounds, bits, carry })
}

fn bitwise(
    mask: FixedUint,
    c: &[Constraints],
    combine: impl FnOnce(KnownBits, KnownBits) -> KnownBits,
) -> Constraints {
    debug_assert_eq!(c.len(), 2);
    if c[0].is_top() || c[1].is_top() {
        return Constraints::top();
    }
    let bits = combine(c[0].bits, c[1].bits).apply_mask(mask);
    let bounds = Bounds::from_bits(bits);
    debug_assert!(bounds.max <= mask);
    Constraints { bounds, bits, carry: Carry::Bottom }
}

fn abstract_and(mask: FixedUint, c: &[Constraints]) -> Constraints {
    bitwise(mask, c, |a, b| KnownBits {
        known0: a.known0 | b.known0,
        known1: a.known1 & b.known1,
    })
}

fn abstract_or(mask: FixedUint, c: &[Constraints]) -> Constraints {
    bitwise(mask, c, |a, b| KnownBits {
        known0: a.known0 & b.known0,
        known1: a.known1 | b.known1,
    })
}

fn abstract_xor(mask: FixedUint, c: &[Constraints]) -> Constraints {
    bitwise(mask, c, |a, b| {
        let known = a.known() & b.known();
        let x = a.known1 ^ b.known1;
        KnownBits { known0: !x & known, known1: x & known }
    })
}

fn abstract_eq(_mask: FixedUint, c: &[Constraints]) -> Constraints {
    debug_assert_eq!(c.len(), 2);
    if c[0].is_top() || c[1].is_top() {
        return Constraints::top();
    }
    if c[0].bits.known0 & c[1].bits.known1 != 0 {
        return Constraints::whole(0, Carry::Bottom);
    }
    if c[0].bits.known1 & c[1].bits.known0 != 0 {
        return Constraints::whole(0, Carry::Bottom);
    }
    if c[0].bounds.min > c[1].bounds.max || c[0].bounds.max < c[1].bounds.min {
        return Constraints::whole(0, Carry::Bottom);
    }
    if c[0].is_const() && c[1].is_const() && c[0].const_value() == c[1].const_value() {
        return Constraints::whole(1, Carry::Bottom);
    }
    Constraints::any_bool(Carry::Bottom)
}

fn abstract_not_eq(_mask: FixedUint, c: &[Constraints]) -> Constraints {
    debug_assert_eq!(c.len(), 2);
    if c[0].is_top() || c[1].is_top() {
        return Constraints::top();
    }
    if c[0].bits.known0 & c[1].bits.known1 != 0 {
        return Constraints::whole(1, Carry::Bottom);
    }
    if c[0].bits.known1 & c[1].bits.known0 != 0 {
        return Constraints::whole(1, Carry::Bottom);
    }
    if c[0].bounds.min > c[1].bounds.max || c[0].bounds.max < c[1].bounds.min {
        return Constraints::whole(1, Carry::Bottom);
    }
    if c[0].is_const() && c[1].is_const() && c[0].const_value() == c[1].const_value() {
        return Constraints::whole(0, Carry::Bottom);
    }
    Constraints::any_bool(Carry::Bottom)
}

fn abstract_lt(_mask: FixedUint, c: &[Constraints]) -> Constraints {
    debug_assert_eq!(c.len(), 2);
    if c[0].is_top() || c[1].is_top() {
        return Constraints::top();
    }
    if c[0].bounds.max < c[1].bounds.min {
        return Constraints::whole(1, Carry::Bottom);
    }
    if c[1].bounds.max <= c[0].bounds.min {
        return Constraints::whole(0, Carry::Bottom);
    }
    Constraints::any_bool(Carry::Bottom)
}

fn abstract_lte(_mask: FixedUint, c: &[Constraints]) -> Constraints {
    debug_assert_eq!(c.len(), 2);
    if c[0].is_top() || c[1].is_top() {
        return Constraints::top();
    }
    if c[0].bounds.max <= c[1].bounds.min {
        return Constraints::whole(1, Carry::Bottom);
    }
    if c[1].bounds.max < c[0].bounds.min {
        return Constraints::whole(0, Carry::Bottom);
    }
    Constraints::any_bool(Carry::Bottom)
}

fn narrow_phi(_mask: FixedUint, result: Constraints, c: &mut [Constraints]) {
    for input in c {
        *input = input.intersect(result);
    }
}

fn narrow_nop(_mask: FixedUint, _result: Constraints, _c: &mut [Constraints]) {}

fn narrow_passthrough(_mask: FixedUint, result: Constraints, c: &mut [Constraints]) {
    debug_assert_eq!(c.len(), 1);
    c[0] = c[0].intersect(result);
}

fn narrow_add(mask: FixedUint, result: Constraints, c: &mut [Constraints]) {
    debug_assert_eq!(c.len(), 3);
    if result.is_top() {
        return;
    }

    const C: usize = 0;
    const L: usize = 1;
    const R: usize = 2;

    // Solve bit equations of the form KNOWN ^ KNOWN ^ UNKNOWN = KNOWN.
    // Three terms because of carries.

    // Carries out of positions whose bit pair is known-equal:
    let mut carry0 = (c[L].bits.known0 & c[R].bits.known0) << 1;
    let mut carry1 = (c[L].bits.known1 & c[R].bits.known1) << 1;

    // The carry operand feeds the lowest live bit of the mask.
    let carry_i = mask & mask.wrapping_neg();

    // Infer the required carry when that bit is known on all three sides.
    if result.bits.known() & c[L].bits.known() & c[R].bits.known() & carry_i != 0 {
        if (result.bits.known1 ^ c[L].bits.known1 ^ c[R].bits.known1) & carry_i != 0 {
            c[C].carry = Carry::Set;
        } else {
            c[C].carry = Carry::Clear;
        }
    }

    match c[C].carry {
        Carry::Bottom => {}
        Carry::Clear => carry0 |= carry_i,
        Carry::Set => carry1 |= carry_i,
        Carry::Top => return,
    }

    let solvable = result.bits.known() & (carry0 | carry1);
    let lsolvable = c[R].bits.known() & solvable;
    let rsolvable = c[L].bits.known() & solvable;

    c[L].bits.known1 |= (carry1 ^ c[R].bits.known1 ^ result.bits.known1) & lsolvable;
    c[R].bits.known1 |= (carry1 ^ c[L].bits.known1 ^ result.bits.known1) & rsolvable;
    c[L].bits.known0 |= !c[L].bits.known1 & lsolvable;
    c[R].bits.known0 |= !c[R].bits.known1 & rsolvable;

    // Move the bounds in after refining the bits.
    c[L].bounds = c[L].bounds.intersect(Bounds::from_bits(c[L].bits));
    c[R].bounds = c[R].bounds.intersect(Bounds::from_bits(c[R].bits));

    let Some(max_sum) = c[L].bounds.max.checked_add(c[R].bounds.max) else {
        return;
    };

    let mut result = result;
    if max_sum > mask {
        // The add can wrap inside the mask; un-wrap the result interval
        // when the wrapped span still fits, otherwise give up.
        let min_sum = c[L].bounds.min + c[R].bounds.min;
        let span = max_sum - min_sum;
        let masked_min_sum = min_sum & mask;
        if masked_min_sum.checked_add(span).map_or(true, |v| v > mask) {
            return;
        }
        let masked_diff = min_sum - masked_min_sum;
        let (min, min_of) = result.bounds.min.overflowing_add(masked_diff);
        let (max, max_of) = result.bounds.max.overflowing_add(masked_diff);
        if min_of || max_of {
            return;
        }
        result.bounds = Bounds { min, max };
    }

    // A low result max lowers the operand maxes.
    c[L].bounds.max = c[L].bounds.max.min(result.bounds.max.wrapping_sub(c[R].bounds.min));
    c[R].bounds.max = c[R].bounds.max.min(result.bounds.max.wrapping_sub(c[L].bounds.min));

    // A high result min raises the operand mins.
    if result.bounds.min > c[R].bounds.max {
        c[L].bounds.min = c[L].bounds.min.max(result.bounds.min - c[R].bounds.max);
    }
    if result.bounds.min > c[L].bounds.max {
        c[R].bounds.min = c[R].bounds.min.max(result.bounds.min - c[L].bounds.max);
    }
}

fn narrow_and(_mask: FixedUint, result: Constraints, c: &mut [Constraints]) {
    debug_assert_eq!(c.len(), 2);
    if result.is_top() {
        return;
    }

    // A one in the output forces ones in both inputs.
    c[0].bits.known1 |= result.bits.known1;
    c[1].bits.known1 |= result.bits.known1;

    // A zero in the output alongside a known one forces the other side
    // to zero.
    c[0].bits.known0 |= result.bits.known0 & c[1].bits.known1;
    c[1].bits.known0 |= result.bits.known0 & c[0].bits.known1;
}

fn narrow_or(_mask: FixedUint, result: Constraints, c: &mut [Constraints]) {
    debug_assert_eq!(c.len(), 2);
    if result.is_top() {
        return;
    }

    c[0].bits.known0 |= result.bits.known0;
    c[1].bits.known0 |= result.bits.known0;

    c[0].bits.known1 |= result.bits.known1 & c[1].bits.known0;
    c[1].bits.known1 |= result.bits.known1 & c[0].bits.known0;
}

fn narrow_xor(_mask: FixedUint, result: Constraints, c: &mut [Constraints]) {
    debug_assert_eq!(c.len(), 2);
    if result.is_top() {
        return;
    }

    c[0].bits.known0 |= result.bits.known0 & c[1].bits.known0;
    c[1].bits.known0 |= result.bits.known0 & c[0].bits.known0;

    c[0].bits.known1 |= result.bits.known0 & c[1].bits.known1;
    c[1].bits.known1 |= result.bits.known0 & c[0].bits.known1;

    c[0].bits.known0 |= result.bits.known1 & c[1].bits.known1;
    c[1].bits.known0 |= result.bits.known1 & c[0].bits.known1;

    c[0].bits.known1 |= result.bits.known1 & c[1].bits.known0;
    c[1].bits.known1 |= result.bits.known1 & c[0].bits.known0;
}

fn narrow_eq_impl(result: Constraints, c: &mut [Constraints], eq: bool) {
    debug_assert_eq!(c.len(), 2);
    if !result.is_const() {
        return;
    }

    let whole = |b: bool| (b as u64) << FIXED_SHIFT;

    if result.const_value() == whole(!eq) {
        // Known unequal: a constant side shaves the other's endpoints.
        for i in 0..2 {
            if c[i].is_const() {
                let o = 1 - i;
                let value = c[i].const_value();
                if c[o].bounds.min == value {
                    c[o].bounds.min = c[o].bounds.min.wrapping_add(1);
                }
                if c[o].bounds.max == value {
                    c[o].bounds.max = c[o].bounds.max.wrapping_sub(1);
                }
            }
        }
    } else if result.const_value() == whole(eq) {
        let met = c[0].intersect(c[1]);
        c[0] = met;
        c[1] = met;
    }
}

fn narrow_eq(_mask: FixedUint, result: Constraints, c: &mut [Constraints]) {
    narrow_eq_impl(result, c, true);
}

fn narrow_not_eq(_mask: FixedUint, result: Constraints, c: &mut [Constraints]) {
    narrow_eq_impl(result, c, false);
}

fn narrow_lt(_mask: FixedUint, result: Constraints, c: &mut [Constraints]) {
    debug_assert_eq!(c.len(), 2);
    if !result.is_const() {
        return;
    }

    if result.const_value() == 0 {
        c[0].bounds.min = c[0].bounds.min.max(c[1].bounds.min);
        c[1].bounds.max = c[1].bounds.max.min(c[0].bounds.max);
    } else if result.const_value() == 1 << FIXED_SHIFT {
        c[0].bounds.max = c[0].bounds.max.min(c[1].bounds.max.wrapping_sub(1));
        c[1].bounds.min = c[1].bounds.min.max(c[0].bounds.min.wrapping_add(1));
    }
}

fn narrow_lte(_mask: FixedUint, result: Constraints, c: &mut [Constraints]) {
    debug_assert_eq!(c.len(), 2);
    if !result.is_const() {
        return;
    }

    if result.const_value() == 0 {
        c[0].bounds.min = c[0].bounds.min.max(c[1].bounds.min.wrapping_add(1));
        c[1].bounds.max = c[1].bounds.max.min(c[0].bounds.max.wrapping_sub(1));
    } else if result.const_value() == 1 << FIXED_SHIFT {
        c[0].bounds.max = c[0].bounds.max.min(c[1].bounds.max);
        c[1].bounds.min = c[1].bounds.min.max(c[0].bounds.min);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    const MASK: FixedUint = 0xFF;

    /// A normalized constraint over a raw 8-bit mask, for exhaustive
    /// concrete-member checks.
    #[derive(Debug, Clone, Copy)]
    struct Arb8(Constraints);

    impl Arbitrary for Arb8 {
        fn arbitrary(g: &mut Gen) -> Self {
            let a = u64::arbitrary(g) & MASK;
            let b = u64::arbitrary(g) & MASK;
            let unknown = u64::arbitrary(g) & MASK;
            let value = u64::arbitrary(g) & MASK;
            let carry = match u8::arbitrary(g) % 3 {
                0 => Carry::Bottom,
                1 => Carry::Clear,
                _ => Carry::Set,
            };
            let c = Constraints {
                bounds: Bounds { min: a.min(b), max: a.max(b) },
                bits: KnownBits {
                    known0: (!value & !unknown & MASK) | !MASK,
                    known1: value & !unknown & MASK,
                },
                carry,
            };
            let n = normalize(c);
            Arb8(if n.is_top() { Constraints::bottom(MASK) } else { n })
        }
    }

    fn members(c: Constraints) -> impl Iterator<Item = u64> {
        (0..=MASK).filter(move |&v| {
            v >= c.bounds.min
                && v <= c.bounds.max
                && v & c.bits.known0 == 0
                && !v & c.bits.known1 == 0
        })
    }

    fn carries(c: Carry) -> &'static [u64] {
        match c {
            Carry::Clear => &[0],
            Carry::Set => &[1],
            _ => &[0, 1],
        }
    }

    fn contains(c: Constraints, v: u64) -> bool {
        !c.is_top()
            && v >= c.bounds.min
            && v <= c.bounds.max
            && v & c.bits.known0 == 0
            && !v & c.bits.known1 == 0
    }

    #[quickcheck]
    fn add_abstract_dominates_concrete(l: Arb8, r: Arb8, carry_in: bool) -> bool {
        let carry = if carry_in { Carry::Set } else { Carry::Clear };
        let cin = Constraints { carry, ..Constraints::bottom(MASK) };
        let out = abstract_transfer(SsaOp::Add, MASK, &[cin, l.0, r.0]);
        members(l.0).all(|lv| {
            members(r.0).all(|rv| {
                let sum = (lv + rv + carry_in as u64) & MASK;
                let carry_out = (lv + rv + carry_in as u64) > MASK;
                contains(out, sum)
                    && carries(out.carry).contains(&(carry_out as u64))
            })
        })
    }

    #[quickcheck]
    fn bitwise_abstract_dominates_concrete(l: Arb8, r: Arb8) -> bool {
        [
            (SsaOp::And, (|a, b| a & b) as fn(u64, u64) -> u64),
            (SsaOp::Or, |a, b| a | b),
            (SsaOp::Xor, |a, b| a ^ b),
        ]
        .into_iter()
        .all(|(op, f)| {
            let out = abstract_transfer(op, MASK, &[l.0, r.0]);
            members(l.0).all(|lv| members(r.0).all(|rv| contains(out, f(lv, rv))))
        })
    }

    #[quickcheck]
    fn narrow_never_enlarges(l: Arb8, r: Arb8) -> bool {
        [SsaOp::And, SsaOp::Or, SsaOp::Xor, SsaOp::Eq, SsaOp::Lt].into_iter().all(|op| {
            let result = abstract_transfer(op, MASK, &[l.0, r.0]);
            let mut ins = [l.0, r.0];
            narrow_transfer(op, MASK, result, &mut ins);
            ins[0].is_subset(l.0) && ins[1].is_subset(r.0)
        })
    }

    #[quickcheck]
    fn narrow_add_never_enlarges(l: Arb8, r: Arb8) -> bool {
        let cin = Constraints::bottom(MASK);
        let result = abstract_transfer(SsaOp::Add, MASK, &[cin, l.0, r.0]);
        let mut ins = [cin, l.0, r.0];
        narrow_transfer(SsaOp::Add, MASK, result, &mut ins);
        ins[0].is_subset(cin) && ins[1].is_subset(l.0) && ins[2].is_subset(r.0)
    }

    #[test]
    fn add_scenario() {
        // carry clear, L in [0, 15] with the low nibble unknown, R = 3.
        let carry = Constraints { carry: Carry::Clear, ..Constraints::bottom(MASK) };
        let l = Constraints {
            bounds: Bounds { min: 0, max: 15 },
            bits: KnownBits { known0: !0x0F, known1: 0 },
            carry: Carry::Bottom,
        };
        let r = normalize(Constraints::exact(3, Carry::Bottom).apply_mask(MASK));

        let out = abstract_transfer(SsaOp::Add, MASK, &[carry, l, r]);
        assert_eq!(out.bounds, Bounds { min: 3, max: 18 });
        assert_eq!(out.carry, Carry::Clear);
        // Bits 5 and up are known zero, the low five bits are unknown.
        assert_eq!(out.bits.known() & 0x1F, 0);
        assert_eq!(out.bits.known0 & MASK, 0xE0);
        assert_eq!(out.bits.known1, 0);

        // Every concrete sum is inside the abstraction.
        for lv in 0..=15u64 {
            assert!(contains(out, lv + 3));
        }
    }

    #[test]
    fn add_constants_fold() {
        let carry = Constraints { carry: Carry::Clear, ..Constraints::bottom(MASK) };
        let l = normalize(Constraints::exact(0x41, Carry::Bottom).apply_mask(MASK));
        let r = normalize(Constraints::exact(0x01, Carry::Bottom).apply_mask(MASK));
        let out = abstract_transfer(SsaOp::Add, MASK, &[carry, l, r]);
        assert!(out.is_const());
        assert_eq!(out.const_value(), 0x42);
        assert_eq!(out.carry, Carry::Clear);
    }

    #[test]
    fn add_carry_out_detected() {
        let carry = Constraints { carry: Carry::Clear, ..Constraints::bottom(MASK) };
        let l = normalize(Constraints::exact(0xFF, Carry::Bottom).apply_mask(MASK));
        let r = normalize(Constraints::exact(0x02, Carry::Bottom).apply_mask(MASK));
        let out = abstract_transfer(SsaOp::Add, MASK, &[carry, l, r]);
        assert!(out.is_const());
        assert_eq!(out.const_value(), 0x01);
        assert_eq!(out.carry, Carry::Set);
    }

    #[test]
    fn eq_distinguishes() {
        let a = normalize(Constraints::exact(4, Carry::Bottom).apply_mask(MASK));
        let b = normalize(Constraints::exact(5, Carry::Bottom).apply_mask(MASK));
        let whole1 = 1u64 << FIXED_SHIFT;

        let ne = abstract_transfer(SsaOp::Eq, MASK, &[a, b]);
        assert!(ne.is_const());
        assert_eq!(ne.const_value(), 0);

        let eq = abstract_transfer(SsaOp::Eq, MASK, &[a, a]);
        assert!(eq.is_const());
        assert_eq!(eq.const_value(), whole1);

        let unk = abstract_transfer(SsaOp::Eq, MASK, &[Constraints::bottom(MASK), a]);
        assert!(!unk.is_const());
    }

    #[test]
    fn lt_uses_interval_endpoints() {
        let low = Constraints {
            bounds: Bounds { min: 0, max: 3 },
            bits: KnownBits::bottom(MASK),
            carry: Carry::Bottom,
        };
        let high = Constraints {
            bounds: Bounds { min: 4, max: 9 },
            bits: KnownBits::bottom(MASK),
            carry: Carry::Bottom,
        };
        let out = abstract_transfer(SsaOp::Lt, MASK, &[low, high]);
        assert_eq!(out.const_value(), 1 << FIXED_SHIFT);
        let out = abstract_transfer(SsaOp::Lt, MASK, &[high, low]);
        assert_eq!(out.const_value(), 0);
    }

    #[test]
    fn narrow_and_forces_ones() {
        let result = normalize(Constraints::exact(0xFF, Carry::Bottom).apply_mask(MASK));
        let mut ins = [Constraints::bottom(MASK), Constraints::bottom(MASK)];
        narrow_transfer(SsaOp::And, MASK, result, &mut ins);
        assert_eq!(ins[0].bits.known1, 0xFF);
        assert_eq!(ins[1].bits.known1, 0xFF);
    }

    #[test]
    fn narrow_lt_shaves_endpoints() {
        let whole1 = normalize(Constraints::whole(1, Carry::Bottom));
        let mut ins = [Constraints::bottom(MASK), Constraints::bottom(MASK)];
        narrow_transfer(SsaOp::Lt, MASK, whole1, &mut ins);
        assert_eq!(ins[0].bounds.max, 0xFE);
        assert_eq!(ins[1].bounds.min, 1);
    }

    #[test]
    fn phi_is_union() {
        let a = normalize(Constraints::exact(1, Carry::Bottom).apply_mask(MASK));
        let b = normalize(Constraints::exact(4, Carry::Bottom).apply_mask(MASK));
        let out = abstract_transfer(SsaOp::Phi, MASK, &[a, b]);
        assert_eq!(out.bounds, Bounds { min: 1, max: 4 });
        assert!(contains(out, 1) && contains(out, 4));
    }
}
