//! Base64url decoding gadgets.
//!
//! Provides helpers to:
//!  - Classify an ASCII symbol into one of the five base64url classes
//!    (`A-Z`, `a-z`, `0-9`, `-`, `_`) and compute its 6-bit value
//!  - Decode a fixed-width window where every symbol must be valid
//!  - Decode a window whose first `len` symbols must be valid, masking the rest
//!  - Expand decoded sextets into a most-significant-first bit stream
//!
//! Padding (`=`) is not part of the alphabet: JWT segments are unpadded.

use plonky2::field::extension::Extendable;
use plonky2::hash::hash_types::RichField;
use plonky2::iop::target::{BoolTarget, Target};
use plonky2::plonk::circuit_builder::CircuitBuilder;

use crate::utils::indicators::{less_than_vector, masked_assert_eq};

/// Decoded symbol: `value` is 0 whenever `valid` is clear.
#[derive(Clone, Copy, Debug)]
pub struct B64Symbol {
    pub valid: BoolTarget,
    pub value: Target,
}

pub(crate) fn bits_msb_from_target<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    t: Target,
    nbits: usize,
) -> Vec<BoolTarget> {
    let mut bits = builder.split_le(t, nbits);
    bits.reverse();
    bits
}

/// `value > c`, reading `bits_msb` as an unsigned integer.
fn gt_const_from_bits<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    bits_msb: &[BoolTarget],
    c: u32,
) -> BoolTarget {
    let n = bits_msb.len();
    let mut eq_prefix = builder._true();
    let mut result = builder._false();
    for (k, b_k) in bits_msb.iter().enumerate() {
        let c_k = ((c >> (n - 1 - k)) & 1) == 1;
        if !c_k {
            let t = builder.and(eq_prefix, *b_k);
            result = builder.or(result, t);
        }
        let eq_bit = if c_k { *b_k } else { builder.not(*b_k) };
        eq_prefix = builder.and(eq_prefix, eq_bit);
    }
    result
}

fn in_const_range<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    bits_msb: &[BoolTarget],
    lo: u8,
    hi: u8,
) -> BoolTarget {
    let ge_lo = gt_const_from_bits(builder, bits_msb, lo as u32 - 1);
    let gt_hi = gt_const_from_bits(builder, bits_msb, hi as u32);
    let le_hi = builder.not(gt_hi);
    builder.and(ge_lo, le_hi)
}

/// Maps one ASCII symbol to its base64url value. Also constrains `ascii` to a byte.
pub fn b64url_symbol<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    ascii: Target,
) -> B64Symbol {
    let ascii_bits = bits_msb_from_target(builder, ascii, 8);
    let upper = in_const_range(builder, &ascii_bits, b'A', b'Z');
    let lower = in_const_range(builder, &ascii_bits, b'a', b'z');
    let digit = in_const_range(builder, &ascii_bits, b'0', b'9');
    let dash_c = builder.constant(F::from_canonical_u8(b'-'));
    let dash = builder.is_equal(ascii, dash_c);
    let underscore_c = builder.constant(F::from_canonical_u8(b'_'));
    let underscore = builder.is_equal(ascii, underscore_c);

    // classes are disjoint, so their indicators sum to a boolean
    let valid = builder.add_many([
        upper.target,
        lower.target,
        digit.target,
        dash.target,
        underscore.target,
    ]);

    let val_upper = builder.add_const(ascii, -F::from_canonical_u8(65));
    let val_lower = builder.add_const(ascii, -F::from_canonical_u8(71));
    let val_digit = builder.add_const(ascii, F::from_canonical_u8(4));

    let mut value = builder.mul(val_upper, upper.target);
    value = builder.mul_add(val_lower, lower.target, value);
    value = builder.mul_add(val_digit, digit.target, value);
    value = builder.mul_const_add(F::from_canonical_u8(62), dash.target, value);
    value = builder.mul_const_add(F::from_canonical_u8(63), underscore.target, value);

    B64Symbol {
        valid: BoolTarget::new_unsafe(valid),
        value,
    }
}

/// Decodes every symbol to a sextet, requiring all of them to be valid.
pub fn decode_b64url_strict<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    chars: &[Target],
) -> Vec<Target> {
    let mut out = Vec::with_capacity(chars.len());
    for c in chars {
        let sym = b64url_symbol(builder, *c);
        builder.assert_one(sym.valid.target);
        out.push(sym.value);
    }
    out
}

/// Decodes the first `len` symbols (which must be valid); later positions decode to 0.
pub fn decode_b64url_prefix<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    chars: &[Target],
    len: Target,
) -> Vec<Target> {
    let live = less_than_vector(builder, len, chars.len());
    let one = builder.one();
    let mut out = Vec::with_capacity(chars.len());
    for (c, in_range) in chars.iter().zip(live) {
        let sym = b64url_symbol(builder, *c);
        masked_assert_eq(builder, in_range, sym.valid.target, one);
        out.push(builder.mul(sym.value, in_range.target));
    }
    out
}

/// Concatenated 6-bit groups, most significant bit first.
pub fn sextets_to_bits_msb<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    sextets: &[Target],
) -> Vec<BoolTarget> {
    let mut bits = Vec::with_capacity(6 * sextets.len());
    for s in sextets {
        bits.extend(bits_msb_from_target(builder, *s, 6));
    }
    bits
}

/// Byte formed by `bits_msb[start .. start + 8]`; bits past the end read as zero.
pub fn byte_from_bits_msb<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    bits_msb: &[BoolTarget],
    start: usize,
) -> Target {
    let mut acc = builder.zero();
    for k in 0..8 {
        let bit = match bits_msb.get(start + k) {
            Some(b) => *b,
            None => builder._false(),
        };
        acc = builder.mul_const_add(F::TWO, acc, bit.target);
    }
    acc
}
