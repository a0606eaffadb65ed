//! Packing utilities and field-collapsing hashes.
//!
//! Byte strings and limb vectors are collapsed to a single Poseidon digest:
//! the segments are concatenated big-endian into one bit string, padded with
//! zeros at the most significant end to a multiple of 63 bits, cut into
//! 63-bit field words, and the words are hashed with [`hash_chained`].

use anyhow::{ensure, Result};
use plonky2::field::extension::Extendable;
use plonky2::hash::hash_types::{HashOutTarget, RichField};
use plonky2::hash::poseidon::PoseidonHash;
use plonky2::iop::target::{BoolTarget, Target};
use plonky2::plonk::circuit_builder::CircuitBuilder;

/// Bits per packed word; keeps every word below the Goldilocks modulus.
pub const PACK_WORD_BITS: usize = 63;
/// Inputs absorbed by one Poseidon permutation.
pub const POSEIDON_RATE: usize = 8;
/// Largest input accepted by [`hash_chained`].
pub const MAX_HASH_INPUTS: usize = 64;

/// Number of 63-bit words produced for `total_bits` bits.
pub fn packed_len(total_bits: usize) -> usize {
    total_bits.div_ceil(PACK_WORD_BITS)
}

fn pack_63_msb<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    bits_msb: &[BoolTarget],
) -> Target {
    debug_assert!(bits_msb.len() <= PACK_WORD_BITS);
    builder.le_sum(bits_msb.iter().rev())
}

/// Packs `segments` (each `segment_bits` wide, most significant first) into 63-bit words.
pub fn pack_segments_be<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    segments: &[Target],
    segment_bits: usize,
) -> Vec<Target> {
    let total = segments.len() * segment_bits;
    let pad = packed_len(total) * PACK_WORD_BITS - total;
    let mut bits_msb: Vec<BoolTarget> = (0..pad).map(|_| builder._false()).collect();
    for s in segments {
        let mut bits = builder.split_le(*s, segment_bits);
        bits.reverse();
        bits_msb.extend(bits);
    }
    bits_msb
        .chunks(PACK_WORD_BITS)
        .map(|chunk| pack_63_msb(builder, chunk))
        .collect()
}

/// Poseidon over up to 64 field elements: rate-sized chunks are hashed
/// directly and the chunk digests are combined pairwise until one remains.
pub fn hash_chained<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    inputs: &[Target],
) -> Result<HashOutTarget> {
    ensure!(!inputs.is_empty(), "cannot hash an empty input");
    ensure!(
        inputs.len() <= MAX_HASH_INPUTS,
        "{} hash inputs exceed the supported maximum of {}",
        inputs.len(),
        MAX_HASH_INPUTS
    );
    let mut layer: Vec<HashOutTarget> = inputs
        .chunks(POSEIDON_RATE)
        .map(|chunk| builder.hash_n_to_hash_no_pad::<PoseidonHash>(chunk.to_vec()))
        .collect();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        for pair in layer.chunks(2) {
            if let [left, right] = pair {
                let mut both = left.elements.to_vec();
                both.extend_from_slice(&right.elements);
                next.push(builder.hash_n_to_hash_no_pad::<PoseidonHash>(both));
            } else {
                next.push(pair[0]);
            }
        }
        layer = next;
    }
    Ok(layer[0])
}

/// Collapses limb or word segments to one digest.
pub fn hash_segments_to_field<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    segments: &[Target],
    segment_bits: usize,
) -> Result<HashOutTarget> {
    let words = pack_segments_be(builder, segments, segment_bits);
    hash_chained(builder, &words)
}

/// Collapses a zero-padded byte string to one digest.
pub fn hash_bytes_to_field<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    bytes: &[Target],
) -> Result<HashOutTarget> {
    hash_segments_to_field(builder, bytes, 8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::native;
    use crate::utils::testing::{is_satisfiable, new_builder, Cfg, F};
    use plonky2::field::types::Field;
    use plonky2::iop::witness::{PartialWitness, WitnessWrite};

    #[test]
    fn packing_counts() {
        assert_eq!(packed_len(8 * 248), 32);
        assert_eq!(packed_len(2048), 33);
        assert_eq!(packed_len(63), 1);
    }

    #[test]
    fn chained_hash_rejects_oversized_input() {
        let mut builder = new_builder();
        let inputs = builder.add_virtual_targets(MAX_HASH_INPUTS + 1);
        assert!(hash_chained(&mut builder, &inputs).is_err());
        assert!(hash_chained(&mut builder, &[]).is_err());
    }

    #[test]
    fn circuit_hashes_match_native() -> anyhow::Result<()> {
        let text = b"https://accounts.example.com";
        let cap = 40;
        let mut builder = new_builder();
        let bytes = builder.add_virtual_targets(cap);
        let digest = hash_bytes_to_field(&mut builder, &bytes)?;
        let expected = builder.add_virtual_hash();
        builder.connect_hashes(digest, expected);

        let long = builder.add_virtual_targets(26);
        let long_digest = hash_chained(&mut builder, &long)?;
        let long_expected = builder.add_virtual_hash();
        builder.connect_hashes(long_digest, long_expected);
        let data = builder.build::<Cfg>();

        let long_values: Vec<F> = (0..26u64).map(|i| F::from_canonical_u64(i * 1_000_003)).collect();
        let mut pw = PartialWitness::<F>::new();
        for (i, t) in bytes.iter().enumerate() {
            pw.set_target(*t, F::from_canonical_u8(text.get(i).copied().unwrap_or(0)))?;
        }
        pw.set_hash_target(expected, native::hash_bytes_to_field(text, cap)?)?;
        for (t, v) in long.iter().zip(&long_values) {
            pw.set_target(*t, *v)?;
        }
        pw.set_hash_target(long_expected, native::hash_chained(&long_values)?)?;
        assert!(is_satisfiable(&data, pw));
        Ok(())
    }
}
