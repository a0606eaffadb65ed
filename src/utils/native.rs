//! Off-circuit computation of the hashes the relation exposes.
//!
//! Every function here reproduces its in-circuit counterpart bit for bit, so
//! a prover can assign the public input and a verifier can recompute it from
//! the disclosed values alone.

use anyhow::{ensure, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use num_bigint::BigUint;
use plonky2::field::types::{Field, PrimeField64};
use plonky2::hash::hash_types::HashOut;
use plonky2::hash::poseidon::PoseidonHash;
use plonky2::plonk::config::{GenericConfig, Hasher, PoseidonGoldilocksConfig};

use crate::types::input::{ZkLoginParams, ZkLoginWitness};
use crate::utils::bigint::biguint_to_limbs;
use crate::utils::bit_packing::{packed_len, MAX_HASH_INPUTS, PACK_WORD_BITS, POSEIDON_RATE};
use crate::utils::json_claims::{NONCE_B64_LEN, NONCE_BITS};
use crate::utils::parsing::{bytes_be_to_u32_limbs_le, hex_to_bigint, hex_to_bytes_fixed};

const D: usize = 2;
type Cfg = PoseidonGoldilocksConfig;
type F = <Cfg as GenericConfig<D>>::F;

/// Bytes in the ephemeral public key.
pub const EPH_PK_BYTES: usize = 32;
/// Bytes in the nonce randomness and in the salt.
pub const SECRET_BYTES: usize = 16;

/// Native twin of `bit_packing::pack_segments_be`.
pub fn pack_segments_be(segments: &[u64], segment_bits: usize) -> Vec<F> {
    let total = segments.len() * segment_bits;
    let pad = packed_len(total) * PACK_WORD_BITS - total;
    let mut bits_msb = vec![false; pad];
    for s in segments {
        bits_msb.extend((0..segment_bits).rev().map(|i| (s >> i) & 1 == 1));
    }
    bits_msb
        .chunks(PACK_WORD_BITS)
        .map(|chunk| {
            let word = chunk.iter().fold(0u64, |acc, b| (acc << 1) | *b as u64);
            F::from_canonical_u64(word)
        })
        .collect()
}

/// Native twin of `bit_packing::hash_chained`.
pub fn hash_chained(inputs: &[F]) -> Result<HashOut<F>> {
    ensure!(!inputs.is_empty(), "cannot hash an empty input");
    ensure!(
        inputs.len() <= MAX_HASH_INPUTS,
        "{} hash inputs exceed the supported maximum of {}",
        inputs.len(),
        MAX_HASH_INPUTS
    );
    let mut layer: Vec<HashOut<F>> = inputs
        .chunks(POSEIDON_RATE)
        .map(|chunk| PoseidonHash::hash_no_pad(chunk))
        .collect();
    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => {
                    let mut both = left.elements.to_vec();
                    both.extend_from_slice(&right.elements);
                    PoseidonHash::hash_no_pad(&both)
                }
                _ => pair[0],
            })
            .collect();
    }
    Ok(layer[0])
}

pub fn hash_segments_to_field(segments: &[u64], segment_bits: usize) -> Result<HashOut<F>> {
    hash_chained(&pack_segments_be(segments, segment_bits))
}

/// Hash of `bytes` zero-padded to `capacity`.
pub fn hash_bytes_to_field(bytes: &[u8], capacity: usize) -> Result<HashOut<F>> {
    ensure!(
        bytes.len() <= capacity,
        "{} bytes exceed the capacity of {capacity}",
        bytes.len()
    );
    let mut segments: Vec<u64> = bytes.iter().map(|b| *b as u64).collect();
    segments.resize(capacity, 0);
    hash_segments_to_field(&segments, 8)
}

fn limbs_to_field(limbs: &[u32]) -> Vec<F> {
    limbs.iter().map(|l| F::from_canonical_u32(*l)).collect()
}

/// `Poseidon(eph_pk[0..8] || max_epoch || randomness[0..4])`.
pub fn nonce_digest(eph_pk: &[u32], max_epoch: u32, randomness: &[u32]) -> Result<HashOut<F>> {
    ensure!(eph_pk.len() == 8, "ephemeral key must be 8 limbs");
    ensure!(randomness.len() == 4, "randomness must be 4 limbs");
    let mut inputs = limbs_to_field(eph_pk);
    inputs.push(F::from_canonical_u32(max_epoch));
    inputs.extend(limbs_to_field(randomness));
    Ok(PoseidonHash::hash_no_pad(&inputs))
}

/// Base64url nonce: the low 160 bits of the digest, big-endian, unpadded.
pub fn nonce_b64(eph_pk: &[u32], max_epoch: u32, randomness: &[u32]) -> Result<String> {
    let digest = nonce_digest(eph_pk, max_epoch, randomness)?;
    let digits: Vec<u32> = digest
        .elements
        .iter()
        .flat_map(|e| {
            let v = e.to_canonical_u64();
            [v as u32, (v >> 32) as u32]
        })
        .collect();
    let value = BigUint::from_slice(&digits);
    let low = value & ((BigUint::from(1u8) << NONCE_BITS) - 1u8);
    let mut bytes = low.to_bytes_be();
    let width = NONCE_BITS / 8;
    let mut padded = vec![0u8; width - bytes.len()];
    padded.append(&mut bytes);
    let encoded = URL_SAFE_NO_PAD.encode(&padded);
    ensure!(encoded.len() == NONCE_B64_LEN, "nonce encoded to {} characters", encoded.len());
    Ok(encoded)
}

/// `Poseidon*(kc_name_F || kc_value_F || aud_F || Poseidon*(salt))`.
pub fn address_seed(
    kc_name: &[u8],
    kc_value: &[u8],
    aud_value: &[u8],
    salt: &[u32],
    params: &ZkLoginParams,
) -> Result<HashOut<F>> {
    ensure!(salt.len() == 4, "salt must be 4 limbs");
    let salt_hash = hash_chained(&limbs_to_field(salt))?;
    let mut inputs = Vec::with_capacity(16);
    inputs.extend(hash_bytes_to_field(kc_name, params.max_kc_name_len)?.elements);
    inputs.extend(hash_bytes_to_field(kc_value, params.max_kc_value_len)?.elements);
    inputs.extend(hash_bytes_to_field(aud_value, params.max_aud_value_len)?.elements);
    inputs.extend(salt_hash.elements);
    hash_chained(&inputs)
}

/// Hash of the RSA modulus limbs, most significant limb first.
pub fn modulus_hash(modulus: &BigUint, params: &ZkLoginParams) -> Result<HashOut<F>> {
    let mut limbs = biguint_to_limbs(modulus, &params.bigint)?;
    limbs.reverse();
    hash_segments_to_field(&limbs, params.bigint.limb_bits)
}

/// Parsed secret and key material of a witness, as 32-bit limbs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WitnessLimbs {
    pub eph_public_key: Vec<u32>,
    pub jwt_randomness: Vec<u32>,
    pub salt: Vec<u32>,
}

impl WitnessLimbs {
    pub fn from_witness(witness: &ZkLoginWitness) -> Result<Self> {
        Ok(Self {
            eph_public_key: bytes_be_to_u32_limbs_le(&hex_to_bytes_fixed(
                &witness.eph_public_key,
                EPH_PK_BYTES,
            )?),
            jwt_randomness: bytes_be_to_u32_limbs_le(&hex_to_bytes_fixed(
                &witness.jwt_randomness,
                SECRET_BYTES,
            )?),
            salt: bytes_be_to_u32_limbs_le(&hex_to_bytes_fixed(&witness.salt, SECRET_BYTES)?),
        })
    }
}

pub fn address_seed_of(witness: &ZkLoginWitness, params: &ZkLoginParams) -> Result<HashOut<F>> {
    let limbs = WitnessLimbs::from_witness(witness)?;
    address_seed(
        witness.kc.name_unquoted()?,
        witness.kc.value_unquoted()?,
        witness.aud.value_unquoted()?,
        &limbs.salt,
        params,
    )
}

/// The single public input:
/// `Poseidon*(eph_pk[8] || seed[4] || max_epoch || iss_F[4] || iss_index_mod_4 || header_F[4] || modulus_F[4])`.
pub fn all_inputs_hash(witness: &ZkLoginWitness, params: &ZkLoginParams) -> Result<HashOut<F>> {
    let limbs = WitnessLimbs::from_witness(witness)?;
    let seed = address_seed_of(witness, params)?;
    let iss = hash_bytes_to_field(witness.iss_b64()?, params.max_ext_iss_b64_len)?;
    let header = hash_bytes_to_field(witness.header()?, params.max_header_len)?;
    let modulus = modulus_hash(&hex_to_bigint(&witness.modulus)?, params)?;

    let mut inputs = limbs_to_field(&limbs.eph_public_key);
    inputs.extend(seed.elements);
    inputs.push(F::from_canonical_u32(witness.max_epoch));
    inputs.extend(iss.elements);
    inputs.push(F::from_canonical_usize(witness.iss_index_mod_4()?));
    inputs.extend(header.elements);
    inputs.extend(modulus.elements);
    hash_chained(&inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_most_significant_first() {
        // 72 bits padded to 126: the first word holds the top 9 input bits
        let bytes: Vec<u64> = (1..=9).collect();
        let words = pack_segments_be(&bytes, 8);
        assert_eq!(words.len(), 2);
        let all: u128 = bytes.iter().fold(0u128, |acc, b| (acc << 8) | *b as u128);
        assert_eq!(words[0], F::from_canonical_u64((all >> 63) as u64));
        assert_eq!(words[1], F::from_canonical_u64(all as u64 & ((1u64 << 63) - 1)));
    }

    #[test]
    fn chaining_matches_plain_poseidon_within_rate() -> Result<()> {
        let inputs: Vec<F> = (0..8u64).map(F::from_canonical_u64).collect();
        assert_eq!(hash_chained(&inputs)?, PoseidonHash::hash_no_pad(&inputs));
        assert!(hash_chained(&[]).is_err());
        assert!(hash_chained(&vec![F::ONE; MAX_HASH_INPUTS + 1]).is_err());
        Ok(())
    }

    #[test]
    fn padding_to_capacity_changes_the_hash() -> Result<()> {
        let a = hash_bytes_to_field(b"test-aud", 16)?;
        let b = hash_bytes_to_field(b"test-aud", 24)?;
        assert_ne!(a, b);
        assert!(hash_bytes_to_field(b"too long", 4).is_err());
        Ok(())
    }

    #[test]
    fn nonce_is_27_url_safe_characters() -> Result<()> {
        let pk: Vec<u32> = (0..8).map(|i| 0x0101_0101 * i).collect();
        let nonce = nonce_b64(&pk, 10, &[1, 2, 3, 4])?;
        assert_eq!(nonce.len(), NONCE_B64_LEN);
        assert!(nonce
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_'));
        // the last character carries four data bits and two zero bits
        let decoded = URL_SAFE_NO_PAD.decode(&nonce)?;
        assert_eq!(decoded.len(), NONCE_BITS / 8);
        assert_ne!(nonce, nonce_b64(&pk, 11, &[1, 2, 3, 4])?);
        Ok(())
    }
}
