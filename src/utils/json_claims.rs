//! Extended JSON claims and the checks applied to their names and values.
//!
//! An extended claim is one `"name": value` member of the token payload
//! followed by its terminator, `,` or `}`, e.g. `"sub":"1234",`. Surrounding
//! whitespace is allowed in the three gaps: before the colon, after it, and
//! before the terminator.

use plonky2::field::extension::Extendable;
use plonky2::hash::hash_types::{HashOutTarget, RichField};
use plonky2::iop::target::{BoolTarget, Target};
use plonky2::plonk::circuit_builder::CircuitBuilder;

use crate::utils::base64_decode::{decode_b64url_strict, sextets_to_bits_msb};
use crate::utils::indicators::{
    assert_le, assert_lt, bits_for, is_one_of, less_than_vector, masked_assert_eq,
    masked_assert_zero, select_by_indicator, split_u64_canonical,
};
use crate::utils::slicing::{slice, slice_from_start};

pub const JSON_WHITESPACE: &[u8] = b" \t\r\n";

/// Nonce digest bits that are disclosed in the token.
pub const NONCE_BITS: usize = 160;
/// Base64url length of a 160-bit nonce.
pub const NONCE_B64_LEN: usize = 27;

/// Capacities for the name and raw value of one extended claim.
#[derive(Clone, Copy, Debug)]
pub struct ClaimShape {
    /// Quoted name, including both quotes.
    pub max_name_len: usize,
    /// Raw value, including quotes when it is a string.
    pub max_value_len: usize,
    pub max_whitespace_len: usize,
}

/// Private positions inside an extended claim.
#[derive(Clone, Copy, Debug)]
pub struct ClaimLayout {
    pub length: Target,
    pub name_length: Target,
    pub colon_index: Target,
    pub value_index: Target,
    pub value_length: Target,
}

#[derive(Clone, Debug)]
pub struct ParsedClaim {
    /// Quoted name, zero-padded.
    pub name: Vec<Target>,
    /// Raw value, zero-padded.
    pub value: Vec<Target>,
}

/// Parses an extended claim, zero-padded to capacity, into its name and value.
pub fn parse_extended_claim<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    claim: &[Target],
    layout: &ClaimLayout,
    shape: &ClaimShape,
) -> ParsedClaim {
    let cap = claim.len();
    let bits = bits_for(cap);
    let ws = F::from_canonical_usize(shape.max_whitespace_len);

    let live = less_than_vector(builder, layout.length, cap);
    let last = builder.add_const(layout.length, F::NEG_ONE);
    builder.range_check(last, bits);
    for (c, in_range) in claim.iter().zip(&live) {
        let dead = builder.not(*in_range);
        masked_assert_zero(builder, dead, *c);
    }

    // name_length <= colon_index < value_index <= value_end < length
    let value_end = builder.add(layout.value_index, layout.value_length);
    assert_le(builder, layout.name_length, layout.colon_index, bits);
    assert_lt(builder, layout.colon_index, layout.value_index, bits);
    assert_lt(builder, value_end, layout.length, bits);

    // each whitespace gap is bounded
    let name_gap_end = builder.add_const(layout.name_length, ws);
    assert_le(builder, layout.colon_index, name_gap_end, bits);
    let after_colon = builder.add_const(layout.colon_index, F::ONE);
    let value_gap_end = builder.add_const(after_colon, ws);
    assert_le(builder, layout.value_index, value_gap_end, bits);
    let tail_gap_end = builder.add_const(value_end, ws);
    assert_le(builder, last, tail_gap_end, bits);

    let before_name_end = less_than_vector(builder, layout.name_length, cap);
    let before_colon = less_than_vector(builder, layout.colon_index, cap);
    let through_colon = less_than_vector(builder, after_colon, cap);
    let before_value = less_than_vector(builder, layout.value_index, cap);
    let before_value_end = less_than_vector(builder, value_end, cap);

    // one-hots recovered from adjacent thresholds
    let mut at_colon = Vec::with_capacity(cap);
    let mut at_last = Vec::with_capacity(cap);
    for i in 0..cap {
        at_colon.push(BoolTarget::new_unsafe(
            builder.sub(through_colon[i].target, before_colon[i].target),
        ));
        let next_live = match live.get(i + 1) {
            Some(l) => l.target,
            None => builder.zero(),
        };
        at_last.push(BoolTarget::new_unsafe(builder.sub(live[i].target, next_live)));
    }

    let colon = select_by_indicator(builder, claim, &at_colon);
    let colon_expected = builder.constant(F::from_canonical_u8(b':'));
    builder.connect(colon, colon_expected);

    let terminator = select_by_indicator(builder, claim, &at_last);
    let close_brace = builder.add_const(terminator, -F::from_canonical_u8(b'}'));
    let comma = builder.add_const(terminator, -F::from_canonical_u8(b','));
    let either = builder.mul(close_brace, comma);
    builder.assert_zero(either);

    let one = builder.one();
    for i in 0..cap {
        let name_gap = builder.sub(before_colon[i].target, before_name_end[i].target);
        let value_gap = builder.sub(before_value[i].target, through_colon[i].target);
        let tail_gap = builder.sub(live[i].target, before_value_end[i].target);
        let tail_gap = builder.sub(tail_gap, at_last[i].target);
        let gap = builder.add_many([name_gap, value_gap, tail_gap]);
        let is_ws = is_one_of(builder, claim[i], JSON_WHITESPACE);
        masked_assert_eq(builder, BoolTarget::new_unsafe(gap), is_ws.target, one);
    }

    let name_minus_one = builder.add_const(layout.name_length, F::NEG_ONE);
    builder.range_check(name_minus_one, bits_for(shape.max_name_len));
    let name = slice_from_start(builder, claim, layout.name_length, shape.max_name_len);
    let value = slice(
        builder,
        claim,
        layout.value_index,
        layout.value_length,
        shape.max_value_len,
    );
    ParsedClaim { name, value }
}

/// Removes the surrounding quotes of a zero-padded JSON string of `length` bytes.
///
/// The output has two fewer positions than the input; empty strings are allowed.
pub fn strip_quotes<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    quoted: &[Target],
    length: Target,
) -> (Vec<Target>, Target) {
    let cap = quoted.len();
    assert!(cap >= 2);
    let quote = builder.constant(F::from_canonical_u8(b'"'));
    builder.connect(quoted[0], quote);

    let inner_len = builder.add_const(length, -F::TWO);
    let live = less_than_vector(builder, length, cap);
    let mut at_last = Vec::with_capacity(cap);
    for i in 0..cap {
        let next = match live.get(i + 1) {
            Some(l) => l.target,
            None => builder.zero(),
        };
        at_last.push(BoolTarget::new_unsafe(builder.sub(live[i].target, next)));
    }
    let closing = select_by_indicator(builder, quoted, &at_last);
    builder.connect(closing, quote);

    let inner = slice_from_start(builder, &quoted[1..], inner_len, cap - 2);
    (inner, inner_len)
}

/// Zero-padded `values` equal `literal`.
pub fn assert_const_string<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    values: &[Target],
    literal: &[u8],
) {
    assert!(literal.len() <= values.len());
    for (i, v) in values.iter().enumerate() {
        let expected = builder.constant(F::from_canonical_u8(literal.get(i).copied().unwrap_or(0)));
        builder.connect(*v, expected);
    }
}

/// True iff zero-padded `values` equal `literal`.
pub fn eq_const_string<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    values: &[Target],
    literal: &[u8],
) -> BoolTarget {
    if literal.len() > values.len() {
        return builder._false();
    }
    let mut acc = builder._true();
    for (i, v) in values.iter().enumerate() {
        let expected = builder.constant(F::from_canonical_u8(literal.get(i).copied().unwrap_or(0)));
        let eq = builder.is_equal(*v, expected);
        acc = builder.and(acc, eq);
    }
    acc
}

/// The low 160 bits of the integer `Σ e_i * 2^(64 i)`, most significant first.
pub fn nonce_bits_msb<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    digest: HashOutTarget,
) -> Vec<BoolTarget> {
    let mut bits = Vec::with_capacity(256);
    for e in digest.elements {
        bits.extend(split_u64_canonical(builder, e));
    }
    bits.truncate(NONCE_BITS);
    bits.reverse();
    bits
}

/// The nonce claim value is the quoted base64url encoding of `expected_bits`.
pub fn check_nonce<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    expected_bits: &[BoolTarget],
    value: &[Target],
    value_length: Target,
) {
    assert_eq!(expected_bits.len(), NONCE_BITS);
    assert!(value.len() >= NONCE_B64_LEN + 2);
    let quoted_len = builder.constant(F::from_canonical_usize(NONCE_B64_LEN + 2));
    builder.connect(value_length, quoted_len);
    let quote = builder.constant(F::from_canonical_u8(b'"'));
    builder.connect(value[0], quote);
    builder.connect(value[NONCE_B64_LEN + 1], quote);

    let sextets = decode_b64url_strict(builder, &value[1..=NONCE_B64_LEN]);
    let bits = sextets_to_bits_msb(builder, &sextets);
    for (got, want) in bits.iter().zip(expected_bits) {
        builder.connect(got.target, want.target);
    }
    for spare in &bits[NONCE_BITS..] {
        builder.assert_zero(spare.target);
    }
}

/// When the key claim is `email`, the token must also say the address is verified.
pub fn check_email_verified<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    kc_name: &[Target],
    ev_name: &[Target],
    ev_value: &[Target],
) {
    const EV_NAME: &[u8] = b"email_verified";
    assert!(ev_name.len() >= EV_NAME.len());
    let is_email = eq_const_string(builder, kc_name, b"email");

    for (i, c) in ev_name.iter().enumerate() {
        let expected = builder.constant(F::from_canonical_u8(EV_NAME.get(i).copied().unwrap_or(0)));
        masked_assert_eq(builder, is_email, *c, expected);
    }

    let bare = eq_const_string(builder, ev_value, b"true");
    let quoted = eq_const_string(builder, ev_value, b"\"true\"");
    let accepted = builder.or(bare, quoted);
    let one = builder.one();
    masked_assert_eq(builder, is_email, accepted.target, one);
}
