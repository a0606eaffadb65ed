//! RSASSA-PKCS1-v1_5 verification with SHA-256 and public exponent 65537.

use anyhow::{ensure, Result};
use plonky2::field::extension::Extendable;
use plonky2::hash::hash_types::RichField;
use plonky2::iop::target::Target;
use plonky2::plonk::circuit_builder::CircuitBuilder;

use crate::utils::bigint::{assert_biguint_lt, BigIntParams, BigUintLimbs, ModMulContext};

/// DER prefix of a SHA-256 `DigestInfo`.
pub const SHA256_DIGEST_INFO: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01,
    0x05, 0x00, 0x04, 0x20,
];

/// Encoded message `00 01 FF..FF 00 DigestInfo digest`, big-endian, with the
/// digest bytes left as zero.
pub fn pkcs1v15_sha256_template(em_len: usize) -> Result<Vec<u8>> {
    let t_len = SHA256_DIGEST_INFO.len() + 32;
    ensure!(
        em_len >= t_len + 11,
        "modulus of {em_len} bytes is too short for a SHA-256 signature"
    );
    let mut em = vec![0xffu8; em_len];
    em[0] = 0x00;
    em[1] = 0x01;
    em[em_len - t_len - 1] = 0x00;
    em[em_len - t_len..em_len - 32].copy_from_slice(&SHA256_DIGEST_INFO);
    em[em_len - 32..].fill(0);
    Ok(em)
}

pub fn validate_rsa_params(params: &BigIntParams) -> Result<()> {
    params.validate()?;
    pkcs1v15_sha256_template(params.total_bits() / 8).map(|_| ())
}

/// Constrains `signature^65537 mod modulus` to be the PKCS#1 v1.5 encoding of
/// `digest` (eight big-endian 32-bit words).
pub fn verify_rsa_65537_sha256<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    ctx: &ModMulContext<F>,
    signature: &BigUintLimbs,
    modulus: &BigUintLimbs,
    digest: &[Target; 8],
) -> Result<()> {
    let params = *ctx.params();
    validate_rsa_params(&params)?;
    let limb_bits = params.limb_bits;
    let limb_bytes = limb_bits / 8;
    let em_len = params.total_bits() / 8;

    assert_biguint_lt(builder, signature, modulus, limb_bits);
    let em = ctx.pow_65537(builder, signature, modulus);
    assert_biguint_lt(builder, &em, modulus, limb_bits);

    // digest as one little-endian bit string, word 7 lowest
    let mut digest_bits = Vec::with_capacity(256);
    for word in digest.iter().rev() {
        digest_bits.extend(builder.split_le(*word, 32));
    }
    let digest_limbs = 256 / limb_bits;
    for (limb, bits) in em.limbs.iter().zip(digest_bits.chunks(limb_bits)) {
        let packed = builder.le_sum(bits.iter());
        builder.connect(*limb, packed);
    }

    let template = pkcs1v15_sha256_template(em_len)?;
    for (i, limb) in em.limbs.iter().enumerate().skip(digest_limbs) {
        let mut value = 0u64;
        for byte in (0..limb_bytes).rev() {
            let be_pos = em_len - 1 - (i * limb_bytes + byte);
            value = (value << 8) | template[be_pos] as u64;
        }
        let expected = builder.constant(F::from_canonical_u64(value));
        builder.connect(*limb, expected);
    }
    Ok(())
}
