//! Parsing and conversion utilities for witness data.

use anyhow::{anyhow, ensure, Result};
use num_bigint::BigUint;
use plonky2::field::types::Field;
use plonky2::iop::target::Target;
use plonky2::iop::witness::{PartialWitness, WitnessWrite};
use plonky2::plonk::config::{GenericConfig, PoseidonGoldilocksConfig};

use crate::utils::bigint::{biguint_to_limbs, BigIntParams, BigUintLimbs};

const D: usize = 2;
type Cfg = PoseidonGoldilocksConfig;
type F = <Cfg as GenericConfig<D>>::F;

/// Convert hex string (with or without 0x prefix) to BigUint
pub fn hex_to_bigint(hex_str: &str) -> Result<BigUint> {
    let hex_clean = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    BigUint::parse_bytes(hex_clean.as_bytes(), 16)
        .ok_or_else(|| anyhow!("invalid hex string {hex_str:?}"))
}

/// Decode a hex string that must hold exactly `len` bytes.
pub fn hex_to_bytes_fixed(hex_str: &str, len: usize) -> Result<Vec<u8>> {
    let hex_clean = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(hex_clean)?;
    ensure!(
        bytes.len() == len,
        "expected {len} bytes of hex, got {}",
        bytes.len()
    );
    Ok(bytes)
}

/// Big-endian bytes to little-endian 32-bit limbs; the length must be a multiple of 4.
pub fn bytes_be_to_u32_limbs_le(bytes: &[u8]) -> Vec<u32> {
    debug_assert!(bytes.len() % 4 == 0);
    bytes
        .rchunks(4)
        .map(|w| w.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
        .collect()
}

/// Assign `bytes` to `targets`, zero-padding the tail.
pub fn set_bytes(pw: &mut PartialWitness<F>, targets: &[Target], bytes: &[u8]) -> Result<()> {
    ensure!(
        bytes.len() <= targets.len(),
        "{} bytes exceed the capacity of {}",
        bytes.len(),
        targets.len()
    );
    for (i, t) in targets.iter().enumerate() {
        pw.set_target(*t, F::from_canonical_u8(bytes.get(i).copied().unwrap_or(0)))?;
    }
    Ok(())
}

pub fn set_u32_limbs(pw: &mut PartialWitness<F>, targets: &[Target], limbs: &[u32]) -> Result<()> {
    ensure!(
        limbs.len() == targets.len(),
        "expected {} limbs, got {}",
        targets.len(),
        limbs.len()
    );
    for (t, l) in targets.iter().zip(limbs) {
        pw.set_target(*t, F::from_canonical_u32(*l))?;
    }
    Ok(())
}

pub fn set_usize(pw: &mut PartialWitness<F>, target: Target, value: usize) -> Result<()> {
    pw.set_target(target, F::from_canonical_usize(value))?;
    Ok(())
}

/// Helper to set a big integer as limb targets
pub fn set_biguint_target(
    pw: &mut PartialWitness<F>,
    target: &BigUintLimbs,
    value: &BigUint,
    params: &BigIntParams,
) -> Result<()> {
    for (t, limb) in target.limbs.iter().zip(biguint_to_limbs(value, params)?) {
        pw.set_target(*t, F::from_canonical_u64(limb))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_helpers() -> Result<()> {
        assert_eq!(hex_to_bigint("0x0100")?, BigUint::from(256u32));
        assert!(hex_to_bigint("zz").is_err());
        assert_eq!(hex_to_bytes_fixed("0xdeadbeef", 4)?, vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(hex_to_bytes_fixed("deadbeef", 5).is_err());
        Ok(())
    }

    #[test]
    fn limbs_are_little_endian() {
        let bytes = [0x00, 0x00, 0x00, 0x01, 0xaa, 0xbb, 0xcc, 0xdd];
        assert_eq!(bytes_be_to_u32_limbs_le(&bytes), vec![0xaabb_ccdd, 1]);
    }
}
