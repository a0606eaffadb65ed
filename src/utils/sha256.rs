//! SHA-256 over a fixed-capacity, already padded message whose live prefix is
//! a private number of 64-byte blocks.
//!
//! Every block position is compressed unconditionally and the digest is
//! picked out of the chained states with a one-hot vector over the last block
//! index, so the constraint shape does not depend on the message length.
//! Two companion checks pin down the buffer around the live blocks:
//! [`assert_zero_after_blocks`] and [`verify_sha2_padding`].

use plonky2::field::extension::Extendable;
use plonky2::hash::hash_types::RichField;
use plonky2::iop::target::{BoolTarget, Target};
use plonky2::plonk::circuit_builder::CircuitBuilder;

use crate::utils::indicators::{
    less_than_vector, masked_assert_zero, one_hot, prefix_after, select_by_indicator,
};
use crate::utils::slicing::shifted_select;

pub const BLOCK_BYTES: usize = 64;

#[rustfmt::skip]
const K: [u32; 64] = [
    0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5, 0x3956c25b, 0x59f111f1, 0x923f82a4, 0xab1c5ed5,
    0xd807aa98, 0x12835b01, 0x243185be, 0x550c7dc3, 0x72be5d74, 0x80deb1fe, 0x9bdc06a7, 0xc19bf174,
    0xe49b69c1, 0xefbe4786, 0x0fc19dc6, 0x240ca1cc, 0x2de92c6f, 0x4a7484aa, 0x5cb0a9dc, 0x76f988da,
    0x983e5152, 0xa831c66d, 0xb00327c8, 0xbf597fc7, 0xc6e00bf3, 0xd5a79147, 0x06ca6351, 0x14292967,
    0x27b70a85, 0x2e1b2138, 0x4d2c6dfc, 0x53380d13, 0x650a7354, 0x766a0abb, 0x81c2c92e, 0x92722c85,
    0xa2bfe8a1, 0xa81a664b, 0xc24b8b70, 0xc76c51a3, 0xd192e819, 0xd6990624, 0xf40e3585, 0x106aa070,
    0x19a4c116, 0x1e376c08, 0x2748774c, 0x34b0bcb5, 0x391c0cb3, 0x4ed8aa4a, 0x5b9cca4f, 0x682e6ff3,
    0x748f82ee, 0x78a5636f, 0x84c87814, 0x8cc70208, 0x90befffa, 0xa4506ceb, 0xbef9a3f7, 0xc67178f2,
];

const IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

/// 32-bit word held both as little-endian bits and as its packed value.
#[derive(Clone, Debug)]
struct Word {
    bits: Vec<BoolTarget>,
    value: Target,
}

impl Word {
    fn from_bits<F: RichField + Extendable<D>, const D: usize>(
        builder: &mut CircuitBuilder<F, D>,
        bits: Vec<BoolTarget>,
    ) -> Self {
        let value = builder.le_sum(bits.iter());
        Self { bits, value }
    }

    fn constant<F: RichField + Extendable<D>, const D: usize>(
        builder: &mut CircuitBuilder<F, D>,
        c: u32,
    ) -> Self {
        let bits = (0..32).map(|i| builder.constant_bool((c >> i) & 1 == 1)).collect();
        let value = builder.constant(F::from_canonical_u32(c));
        Self { bits, value }
    }

    fn rotr(&self, n: usize) -> Vec<BoolTarget> {
        (0..32).map(|i| self.bits[(i + n) % 32]).collect()
    }

    fn shr<F: RichField + Extendable<D>, const D: usize>(
        &self,
        builder: &mut CircuitBuilder<F, D>,
        n: usize,
    ) -> Vec<BoolTarget> {
        (0..32)
            .map(|i| if i + n < 32 { self.bits[i + n] } else { builder._false() })
            .collect()
    }
}

fn xor<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    a: BoolTarget,
    b: BoolTarget,
) -> BoolTarget {
    // a + b - 2ab
    let sum = builder.add(a.target, b.target);
    BoolTarget::new_unsafe(builder.arithmetic(-F::TWO, F::ONE, a.target, b.target, sum))
}

fn xor3_words<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    x: &[BoolTarget],
    y: &[BoolTarget],
    z: &[BoolTarget],
) -> Word {
    let mut bits = Vec::with_capacity(32);
    for i in 0..32 {
        let t = xor(builder, x[i], y[i]);
        bits.push(xor(builder, t, z[i]));
    }
    Word::from_bits(builder, bits)
}

fn big_sigma0<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    a: &Word,
) -> Word {
    xor3_words(builder, &a.rotr(2), &a.rotr(13), &a.rotr(22))
}

fn big_sigma1<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    e: &Word,
) -> Word {
    xor3_words(builder, &e.rotr(6), &e.rotr(11), &e.rotr(25))
}

fn small_sigma0<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    w: &Word,
) -> Word {
    let shifted = w.shr(builder, 3);
    xor3_words(builder, &w.rotr(7), &w.rotr(18), &shifted)
}

fn small_sigma1<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    w: &Word,
) -> Word {
    let shifted = w.shr(builder, 10);
    xor3_words(builder, &w.rotr(17), &w.rotr(19), &shifted)
}

fn ch<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    e: &Word,
    f: &Word,
    g: &Word,
) -> Word {
    let bits = (0..32)
        .map(|i| BoolTarget::new_unsafe(builder.select(e.bits[i], f.bits[i].target, g.bits[i].target)))
        .collect();
    Word::from_bits(builder, bits)
}

fn maj<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    a: &Word,
    b: &Word,
    c: &Word,
) -> Word {
    let mut bits = Vec::with_capacity(32);
    for i in 0..32 {
        // ab + c (a xor b)
        let ab = builder.mul(a.bits[i].target, b.bits[i].target);
        let sum = builder.add(a.bits[i].target, b.bits[i].target);
        let a_xor_b = builder.mul_const_add(-F::TWO, ab, sum);
        bits.push(BoolTarget::new_unsafe(builder.mul_add(c.bits[i].target, a_xor_b, ab)));
    }
    Word::from_bits(builder, bits)
}

/// Sum of words modulo 2^32.
fn add_words<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    terms: &[Target],
) -> Word {
    let sum = builder.add_many(terms);
    let carry_bits = (usize::BITS - (terms.len() - 1).leading_zeros()) as usize;
    let mut bits = builder.split_le(sum, 32 + carry_bits);
    bits.truncate(32);
    Word::from_bits(builder, bits)
}

fn compress<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    state: &[Word],
    block: Vec<Word>,
) -> Vec<Word> {
    let mut w = block;
    for t in 16..64 {
        let s0 = small_sigma0(builder, &w[t - 15]);
        let s1 = small_sigma1(builder, &w[t - 2]);
        let next = add_words(builder, &[s1.value, w[t - 7].value, s0.value, w[t - 16].value]);
        w.push(next);
    }

    let mut v: Vec<Word> = state.to_vec();
    for (t, k) in K.iter().enumerate() {
        let s1 = big_sigma1(builder, &v[4]);
        let choice = ch(builder, &v[4], &v[5], &v[6]);
        let k = builder.constant(F::from_canonical_u32(*k));
        let t1 = [v[7].value, s1.value, choice.value, k, w[t].value];

        let s0 = big_sigma0(builder, &v[0]);
        let majority = maj(builder, &v[0], &v[1], &v[2]);

        let mut e_terms = t1.to_vec();
        e_terms.push(v[3].value);
        let new_e = add_words(builder, &e_terms);
        let mut a_terms = t1.to_vec();
        a_terms.extend([s0.value, majority.value]);
        let new_a = add_words(builder, &a_terms);

        v.rotate_right(1);
        v[0] = new_a;
        v[4] = new_e;
    }

    state
        .iter()
        .zip(&v)
        .map(|(s, x)| add_words(builder, &[s.value, x.value]))
        .collect()
}

/// Big-endian 32-bit message words of one 64-byte block.
fn block_words<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    byte_bits: &[Vec<BoolTarget>],
) -> Vec<Word> {
    byte_bits
        .chunks(4)
        .map(|be| {
            let bits: Vec<BoolTarget> = be.iter().rev().flatten().copied().collect();
            Word::from_bits(builder, bits)
        })
        .collect()
}

/// Output of [`sha256_variable`].
#[derive(Clone, Debug)]
pub struct Sha256VarOutput {
    /// Digest as eight big-endian 32-bit words.
    pub digest: [Target; 8],
    /// One-hot vector of the last live block.
    pub last_block: Vec<BoolTarget>,
}

/// Hashes `bytes[.. 64 * num_blocks]`, where `1 <= num_blocks <= bytes.len() / 64`.
///
/// The caller must range check `bytes`; each entry is split into 8 bits here
/// so an out-of-range entry makes the relation unsatisfiable anyway.
pub fn sha256_variable<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    bytes: &[Target],
    num_blocks: Target,
) -> Sha256VarOutput {
    assert!(!bytes.is_empty() && bytes.len() % BLOCK_BYTES == 0);
    let max_blocks = bytes.len() / BLOCK_BYTES;
    let byte_bits: Vec<Vec<BoolTarget>> = bytes.iter().map(|b| builder.split_le(*b, 8)).collect();

    let mut state: Vec<Word> = IV.iter().map(|c| Word::constant(builder, *c)).collect();
    let mut states = Vec::with_capacity(max_blocks);
    for block in byte_bits.chunks(BLOCK_BYTES) {
        let words = block_words(builder, block);
        state = compress(builder, &state, words);
        states.push(state.iter().map(|w| w.value).collect::<Vec<_>>());
    }

    let last = builder.add_const(num_blocks, F::NEG_ONE);
    let last_block = one_hot(builder, last, max_blocks);
    let mut digest = [builder.zero(); 8];
    for (i, d) in digest.iter_mut().enumerate() {
        let column: Vec<Target> = states.iter().map(|s| s[i]).collect();
        *d = select_by_indicator(builder, &column, &last_block);
    }
    Sha256VarOutput { digest, last_block }
}

/// Every byte after the last live block is zero.
pub fn assert_zero_after_blocks<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    bytes: &[Target],
    last_block: &[BoolTarget],
) {
    let beyond = prefix_after(builder, last_block);
    for (block, dead) in bytes.chunks(BLOCK_BYTES).zip(beyond) {
        for byte in block {
            masked_assert_zero(builder, dead, *byte);
        }
    }
}

/// Checks the SHA-2 padding of a message of `unpadded_len` bytes inside the
/// first `num_blocks` blocks of `bytes`: the `0x80` marker, the zero run, the
/// 64-bit big-endian bit length, and that no more than one block of padding
/// was used.
pub fn verify_sha2_padding<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    bytes: &[Target],
    num_blocks: Target,
    unpadded_len: Target,
) {
    let cap = bytes.len();
    let padded_len = builder.mul_const(F::from_canonical_usize(BLOCK_BYTES), num_blocks);

    // 9 <= padded_len - unpadded_len <= 72
    let padding = builder.sub(padded_len, unpadded_len);
    let slack = builder.add_const(padding, -F::from_canonical_u64(9));
    builder.range_check(slack, 6);

    let at_end = one_hot(builder, unpadded_len, cap);
    let marker = select_by_indicator(builder, bytes, &at_end);
    let marker_expected = builder.constant(F::from_canonical_u64(0x80));
    builder.connect(marker, marker_expected);

    let len_field_start = builder.add_const(padded_len, -F::from_canonical_u64(8));
    let before_len_field = less_than_vector(builder, len_field_start, cap);
    let after_end = prefix_after(builder, &at_end);
    for ((byte, after), before) in bytes.iter().zip(after_end).zip(before_len_field) {
        let in_run = builder.and(after, before);
        masked_assert_zero(builder, in_run, *byte);
    }

    // bit length fits in 32 bits; the upper half of the field is zero
    let bit_len = builder.mul_const(F::from_canonical_u64(8), unpadded_len);
    let bit_len_bits = builder.split_le(bit_len, 32);
    let zero = builder.zero();
    let mut expected = vec![zero; 4];
    for k in (0..4).rev() {
        expected.push(builder.le_sum(bit_len_bits[8 * k..8 * k + 8].iter()));
    }
    let at_len_field = one_hot(builder, len_field_start, cap);
    let actual = shifted_select(builder, bytes, &at_len_field, 8);
    for (a, e) in actual.iter().zip(expected) {
        builder.connect(*a, e);
    }
}
