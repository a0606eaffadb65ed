//! Token fixtures: builds, pads and signs a token the way an identity
//! provider and a witness preparer would.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

use zk_login::utils::bigint::BigIntParams;
use zk_login::utils::native::nonce_b64;
use zk_login::utils::parsing::{bytes_be_to_u32_limbs_le, hex_to_bytes_fixed};
use zk_login::utils::rsa::pkcs1v15_sha256_template;
use zk_login::{ExtendedClaimWitness, ZkLoginParams, ZkLoginWitness};

pub const N_512: &str = "b16520be91d9b2c6503502f4827ba663c19cabda2eb457a0103add4b2996619100f274e12557691c40ec4a8760bfd893359fd54e729c39017990be1ff991726f";
pub const D_512: &str = "967a8b793cada7ba1405b3f907caae0d870a48b92ecf2a598c0af2f73452ed7532dd8f35e68adde289c1db70feb092d686d3086a5112443d96dafa73f030c0e1";

pub const N_2048: &str = "c880881b1a0f80ac0e8362d3bfee99336dbda7bdace0770deb5d7360d2ce90d8f88d0e4f2bbe1e52c32e3e9fdf4e2fe4520decd60634a0d6b8c1961bb5b20d4adbb668855e18ce191a19df7d36acc769deb942dc0ee5647797de6b0332535ec1faa0a2ce92b38b036993c47d66044f03effa93dbe4f6c5d84dbe3bc748c849b29eee820b30f933805b3bfb3709aa1c5604aa1ffe5bb3705d933fd28d675f45fb404b0701521c540360e513da9cb0105c4cad327b42549898bcd598aee7614540ada69831e1bde56ea170d032b9140d8ed1b072cb03389ae7dd75df905fa0a7e343eb17237599a3f54e1d3d7236be4f9fd731c22cfcef7974caf0f021c6f86817";
pub const D_2048: &str = "ae1a4e159a8f939fd40a6aaa8ca3570cbd624e61f9d800096a337f98b7f4fefa28f9f34ef420e69bdf382cd10e4b0a732c7d4306a5e4d5351ec19ae2fce75b7b8145e784c7acaa6a49abe5d108c50773fb1ecbdbe26376d6125de476a62096cbc221f2bd85cdba0c8084fbbe17f3edd8f16d992efca6fc2d5374b8dbd76b73f1c734b367c6d67d7ff62342f0ae8a6486b142753f3d911de7511411ce0cba655f2f40a9b1343a0865560d0640945f763dc7b77f947c9b25fbe8ed2906b06e861f2b944217cfb13b7073213c955641eba715df90079e3012350dfe5ca3c5b169d5d5d8b8aedbea684d0b4a75813cc63ef6e220b015b798ab5f457600fbc70b87c1";

pub const EPH_PUBLIC_KEY: &str = "1f8b3c6de2a94e7015c4b8a3d9e6f27104a5c3b8e1d29f6a7b0c4e8d3f5a1b92";
pub const JWT_RANDOMNESS: &str = "5d2e9a4c71b83f06e4a91c7d2b58f3e0";
pub const SALT: &str = "a3c7e1f9042b6d8e51f3a9c0b7d2e4f6";
pub const MAX_EPOCH: u32 = 10;

/// Capacities small enough for a test to prove in seconds.
pub fn small_params() -> ZkLoginParams {
    ZkLoginParams {
        max_header_len: 48,
        max_padded_unsigned_jwt_len: 384,
        max_ext_kc_len: 40,
        max_kc_name_len: 16,
        max_kc_value_len: 24,
        max_ext_nonce_len: 44,
        max_ext_ev_len: 32,
        max_ev_name_len: 16,
        max_ev_value_len: 8,
        max_ext_aud_len: 40,
        max_aud_value_len: 24,
        max_ext_iss_b64_len: 64,
        max_whitespace_len: 2,
        bigint: BigIntParams {
            limb_bits: 16,
            num_limbs: 32,
        },
    }
}

pub fn expected_nonce() -> Result<String> {
    let pk = bytes_be_to_u32_limbs_le(&hex_to_bytes_fixed(EPH_PUBLIC_KEY, 32)?);
    let r = bytes_be_to_u32_limbs_le(&hex_to_bytes_fixed(JWT_RANDOMNESS, 16)?);
    nonce_b64(&pk, MAX_EPOCH, &r)
}

/// A token payload as an ordered list of members with raw JSON values.
#[derive(Clone, Debug)]
pub struct TokenBuilder {
    pub header: String,
    pub members: Vec<(String, String)>,
    pub key_claim: String,
    /// Whitespace placed around the colon and before each terminator.
    pub separator: String,
    pub modulus: String,
    pub private_exponent: String,
}

impl TokenBuilder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            header: r#"{"alg":"RS256"}"#.to_string(),
            members: vec![
                ("iss".into(), r#""https://accounts.example.com""#.into()),
                ("sub".into(), r#""12345""#.into()),
                ("aud".into(), r#""test-aud""#.into()),
                ("nonce".into(), format!("\"{}\"", expected_nonce()?)),
                ("email_verified".into(), "true".into()),
            ],
            key_claim: "sub".into(),
            separator: String::new(),
            modulus: N_512.into(),
            private_exponent: D_512.into(),
        })
    }

    pub fn with_member(mut self, name: &str, value: &str) -> Self {
        match self.members.iter_mut().find(|(n, _)| n == name) {
            Some(member) => member.1 = value.to_string(),
            None => self.members.push((name.to_string(), value.to_string())),
        }
        self
    }

    pub fn build(&self, params: &ZkLoginParams) -> Result<ZkLoginWitness> {
        let sep = &self.separator;
        let mut payload = String::from("{");
        // (name, byte offset in payload, excerpt)
        let mut excerpts = Vec::new();
        for (i, (name, value)) in self.members.iter().enumerate() {
            let terminator = if i + 1 == self.members.len() { '}' } else { ',' };
            let text = format!("\"{name}\"{sep}:{sep}{value}{sep}{terminator}");
            excerpts.push((name.clone(), payload.len(), text.clone(), value.len()));
            payload.push_str(&text);
        }

        let header_b64 = URL_SAFE_NO_PAD.encode(&self.header);
        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload);
        let payload_start_index = header_b64.len() + 1;
        let unsigned = format!("{header_b64}.{payload_b64}").into_bytes();

        let mut padded = unsigned.clone();
        padded.push(0x80);
        while padded.len() % 64 != 56 {
            padded.push(0);
        }
        padded.extend_from_slice(&(8 * unsigned.len() as u64).to_be_bytes());
        let num_sha2_blocks = padded.len() / 64;

        let n = hex(&self.modulus)?;
        let d = hex(&self.private_exponent)?;
        let mut em = pkcs1v15_sha256_template(params.bigint.total_bits() / 8)?;
        let len = em.len();
        em[len - 32..].copy_from_slice(&Sha256::digest(&unsigned));
        let signature = BigUint::from_bytes_be(&em).modpow(&d, &n);

        let claim = |name: &str| -> Result<ExtendedClaimWitness> {
            let (member, offset, text, value_len) = excerpts
                .iter()
                .find(|(n, ..)| n == name)
                .ok_or_else(|| anyhow!("payload has no {name} member"))?;
            let (index_b64, length_b64) = b64_window(*offset, text.len());
            let name_length = member.len() + 2;
            let colon_index = name_length + sep.len();
            Ok(ExtendedClaimWitness {
                ext_claim: text.clone(),
                index_b64: payload_start_index + index_b64,
                length_b64,
                name_length,
                colon_index,
                value_index: colon_index + 1 + sep.len(),
                value_length: *value_len,
            })
        };
        let iss = claim("iss")?;

        Ok(ZkLoginWitness {
            padded_unsigned_jwt: padded,
            payload_start_index,
            payload_len: payload_b64.len(),
            num_sha2_blocks,
            signature: signature.to_str_radix(16),
            modulus: self.modulus.clone(),
            eph_public_key: EPH_PUBLIC_KEY.into(),
            max_epoch: MAX_EPOCH,
            jwt_randomness: JWT_RANDOMNESS.into(),
            salt: SALT.into(),
            iss_index_b64: iss.index_b64,
            iss_length_b64: iss.length_b64,
            kc: claim(&self.key_claim)?,
            nonce: claim("nonce")?,
            ev: claim("email_verified")?,
            aud: claim("aud")?,
        })
    }
}

/// Base64 window `(start, len)` covering payload bytes `offset .. offset + len`.
pub fn b64_window(offset: usize, len: usize) -> (usize, usize) {
    let start = 4 * offset / 3;
    let end = (8 * (offset + len)).div_ceil(6);
    (start, end - start)
}

fn hex(s: &str) -> Result<BigUint> {
    BigUint::parse_bytes(s.as_bytes(), 16).ok_or_else(|| anyhow!("bad hex"))
}
