//! Indicator vectors, range checks and masked assertions.
//!
//! Data-dependent control flow is compiled into two shapes only:
//!  - guarded constraints `selector * (a - b) == 0`
//!  - guarded values `selector * x + (1 - selector) * y`
//!
//! Dynamic indexing is an inner product with a one-hot vector, and "every
//! position before `n`" is a prefix-sum of a one-hot vector over `n`.

use plonky2::field::extension::Extendable;
use plonky2::hash::hash_types::RichField;
use plonky2::iop::generator::{GeneratedValues, SimpleGenerator};
use plonky2::iop::target::{BoolTarget, Target};
use plonky2::iop::witness::{PartitionWitness, Witness, WitnessWrite};
use plonky2::plonk::circuit_builder::CircuitBuilder;
use plonky2::plonk::circuit_data::CommonCircuitData;
use plonky2::util::serialization::{Buffer, IoResult, Read, Write};

/// Number of bits needed for every value in `0..=max` (at least one).
pub fn bits_for(max: usize) -> usize {
    ((usize::BITS - max.leading_zeros()) as usize).max(1)
}

/// `eq[i] = (index == i)` for `i < len`; fails unless `index < len`.
pub fn one_hot<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    index: Target,
    len: usize,
) -> Vec<BoolTarget> {
    assert!(len > 0, "one-hot vector needs at least one position");
    let mut eq = Vec::with_capacity(len);
    for i in 0..len {
        let c = builder.constant(F::from_canonical_usize(i));
        eq.push(builder.is_equal(index, c));
    }
    let total = builder.add_many(eq.iter().map(|b| b.target));
    builder.assert_one(total);
    eq
}

/// `lt[i] = (i < v)` for `i < len`; fails unless `v <= len`.
pub fn less_than_vector<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    v: Target,
    len: usize,
) -> Vec<BoolTarget> {
    let eq = one_hot(builder, v, len + 1);
    let mut lt = vec![builder._false(); len];
    let mut acc = builder.zero();
    for i in (0..len).rev() {
        acc = builder.add(acc, eq[i + 1].target);
        lt[i] = BoolTarget::new_unsafe(acc);
    }
    lt
}

/// `gt[i] = (i > v)` for `i < len`; fails unless `v < len`.
pub fn greater_than_vector<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    v: Target,
    len: usize,
) -> Vec<BoolTarget> {
    let eq = one_hot(builder, v, len);
    prefix_after(builder, &eq)
}

/// Given a one-hot `eq`, returns `after[i] = 1` for positions strictly past the hot one.
pub fn prefix_after<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    eq: &[BoolTarget],
) -> Vec<BoolTarget> {
    let mut after = Vec::with_capacity(eq.len());
    let mut acc = builder.zero();
    for e in eq {
        after.push(BoolTarget::new_unsafe(acc));
        acc = builder.add(acc, e.target);
    }
    after
}

/// `a < b` for `a, b < 2^bits`; the caller owns the range of both inputs.
pub fn less_than<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    a: Target,
    b: Target,
    bits: usize,
) -> BoolTarget {
    assert!(bits < 63);
    // a + 2^bits - b has its top bit set exactly when a >= b
    let shifted = builder.add_const(a, F::from_canonical_u64(1u64 << bits));
    let diff = builder.sub(shifted, b);
    let diff_bits = builder.split_le(diff, bits + 1);
    builder.not(diff_bits[bits])
}

/// Constrains `a <= b`, both known to be far below the field order.
pub fn assert_le<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    a: Target,
    b: Target,
    bits: usize,
) {
    let slack = builder.sub(b, a);
    builder.range_check(slack, bits);
}

/// Constrains `a < b`, both known to be far below the field order.
pub fn assert_lt<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    a: Target,
    b: Target,
    bits: usize,
) {
    let slack = builder.sub(b, a);
    let slack = builder.add_const(slack, F::NEG_ONE);
    builder.range_check(slack, bits);
}

/// `enabled * (a - b) == 0`.
pub fn masked_assert_eq<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    enabled: BoolTarget,
    a: Target,
    b: Target,
) {
    let diff = builder.sub(a, b);
    let gated = builder.mul(diff, enabled.target);
    builder.assert_zero(gated);
}

/// `enabled * a == 0`.
pub fn masked_assert_zero<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    enabled: BoolTarget,
    a: Target,
) {
    let gated = builder.mul(a, enabled.target);
    builder.assert_zero(gated);
}

/// Inner product of `values` with a selector vector.
pub fn select_by_indicator<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    values: &[Target],
    selector: &[BoolTarget],
) -> Target {
    let mut acc = builder.zero();
    for (v, s) in values.iter().zip(selector) {
        acc = builder.mul_add(s.target, *v, acc);
    }
    acc
}

/// Zeroes every value whose mask bit is clear.
pub fn apply_mask<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    values: &[Target],
    mask: &[BoolTarget],
) -> Vec<Target> {
    values
        .iter()
        .zip(mask)
        .map(|(v, m)| builder.mul(*v, m.target))
        .collect()
}

/// True iff `x` equals one of the (distinct) byte constants.
pub fn is_one_of<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    x: Target,
    set: &[u8],
) -> BoolTarget {
    let mut hits = Vec::with_capacity(set.len());
    for &c in set {
        let c = builder.constant(F::from_canonical_u8(c));
        hits.push(builder.is_equal(x, c).target);
    }
    // distinct constants: at most one hit
    BoolTarget::new_unsafe(builder.add_many(hits))
}

/// Witnesses `x = divisor * q + r` with `r < divisor` and `q < 2^quotient_bits`.
pub fn div_rem_const<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    x: Target,
    divisor: u64,
    quotient_bits: usize,
) -> (Target, Target) {
    assert!(divisor > 1);
    let quotient = builder.add_virtual_target();
    let remainder = builder.add_virtual_target();
    builder.add_simple_generator(DivRemConstGenerator {
        dividend: x,
        quotient,
        remainder,
        divisor,
    });

    let recomposed = builder.mul_const_add(F::from_canonical_u64(divisor), quotient, remainder);
    builder.connect(recomposed, x);
    builder.range_check(quotient, quotient_bits);

    let rem_bits = bits_for((divisor - 1) as usize);
    builder.range_check(remainder, rem_bits);
    if !divisor.is_power_of_two() {
        let max = builder.constant(F::from_canonical_u64(divisor - 1));
        assert_le(builder, remainder, max, rem_bits);
    }
    (quotient, remainder)
}

/// Canonical little-endian bits of a Goldilocks element (64 bits, value < p).
pub fn split_u64_canonical<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    x: Target,
) -> Vec<BoolTarget> {
    let (lo, hi) = builder.split_low_high(x, 32, 64);
    // p = 2^64 - 2^32 + 1, so a high half of all ones forces a zero low half
    let hi_max = builder.constant(F::from_canonical_u64(u32::MAX as u64));
    let hi_is_max = builder.is_equal(hi, hi_max);
    masked_assert_zero(builder, hi_is_max, lo);

    let mut bits = builder.split_le(lo, 32);
    bits.extend(builder.split_le(hi, 32));
    bits
}

#[derive(Debug)]
pub struct DivRemConstGenerator {
    dividend: Target,
    quotient: Target,
    remainder: Target,
    divisor: u64,
}

impl<F: RichField + Extendable<D>, const D: usize> SimpleGenerator<F, D> for DivRemConstGenerator {
    fn id(&self) -> String {
        "DivRemConstGenerator".to_string()
    }

    fn dependencies(&self) -> Vec<Target> {
        vec![self.dividend]
    }

    fn run_once(
        &self,
        witness: &PartitionWitness<F>,
        out_buffer: &mut GeneratedValues<F>,
    ) -> anyhow::Result<()> {
        let x = witness.get_target(self.dividend).to_canonical_u64();
        out_buffer.set_target(self.quotient, F::from_canonical_u64(x / self.divisor))?;
        out_buffer.set_target(self.remainder, F::from_canonical_u64(x % self.divisor))
    }

    fn serialize(&self, dst: &mut Vec<u8>, _common_data: &CommonCircuitData<F, D>) -> IoResult<()> {
        dst.write_target(self.dividend)?;
        dst.write_target(self.quotient)?;
        dst.write_target(self.remainder)?;
        dst.write_usize(self.divisor as usize)
    }

    fn deserialize(src: &mut Buffer, _common_data: &CommonCircuitData<F, D>) -> IoResult<Self> {
        let dividend = src.read_target()?;
        let quotient = src.read_target()?;
        let remainder = src.read_target()?;
        let divisor = src.read_usize()? as u64;
        Ok(Self {
            dividend,
            quotient,
            remainder,
            divisor,
        })
    }
}
