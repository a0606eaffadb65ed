//! Input data structures and configuration types for the zk-login relation.
//!
//! This module defines:
//! - Circuit capacities (`ZkLoginParams`), fixed when the circuit is built
//! - The witness file produced by the token parser (`ZkLoginWitness`)
//! - Positional data for one extended JSON claim (`ExtendedClaimWitness`)

use anyhow::{anyhow, ensure, Result};
use serde::{Deserialize, Serialize};

use crate::utils::b64_substring::max_b64_len_for;
use crate::utils::bigint::BigIntParams;
use crate::utils::json_claims::NONCE_B64_LEN;
use crate::utils::rsa::validate_rsa_params;
use crate::utils::sha256::BLOCK_BYTES;

/// Capacities of every fixed-size buffer in the relation.
///
/// Name and value capacities count the content without its JSON quotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZkLoginParams {
    pub max_header_len: usize,
    pub max_padded_unsigned_jwt_len: usize,
    pub max_ext_kc_len: usize,
    pub max_kc_name_len: usize,
    pub max_kc_value_len: usize,
    pub max_ext_nonce_len: usize,
    pub max_ext_ev_len: usize,
    pub max_ev_name_len: usize,
    pub max_ev_value_len: usize,
    pub max_ext_aud_len: usize,
    pub max_aud_value_len: usize,
    pub max_ext_iss_b64_len: usize,
    pub max_whitespace_len: usize,
    pub bigint: BigIntParams,
}

impl Default for ZkLoginParams {
    fn default() -> Self {
        Self {
            max_header_len: 248,
            max_padded_unsigned_jwt_len: 64 * 25,
            max_ext_kc_len: 126,
            max_kc_name_len: 10,
            max_kc_value_len: 105,
            max_ext_nonce_len: 44,
            max_ext_ev_len: 53,
            max_ev_name_len: 14,
            max_ev_value_len: 20,
            max_ext_aud_len: 160,
            max_aud_value_len: 145,
            max_ext_iss_b64_len: 224,
            max_whitespace_len: 2,
            bigint: BigIntParams::RSA_2048,
        }
    }
}

impl ZkLoginParams {
    pub fn max_sha2_blocks(&self) -> usize {
        self.max_padded_unsigned_jwt_len / BLOCK_BYTES
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_padded_unsigned_jwt_len > 0
                && self.max_padded_unsigned_jwt_len % BLOCK_BYTES == 0,
            "padded token capacity {} must be a positive multiple of {}",
            self.max_padded_unsigned_jwt_len,
            BLOCK_BYTES
        );
        ensure!(
            self.max_header_len > 0 && self.max_header_len < self.max_padded_unsigned_jwt_len,
            "header capacity {} must be below the token capacity",
            self.max_header_len
        );
        ensure!(
            self.max_ext_nonce_len >= NONCE_B64_LEN + 2 + "\"nonce\":".len() + 1,
            "nonce claim capacity {} cannot hold a 27-character nonce",
            self.max_ext_nonce_len
        );
        ensure!(
            self.max_ev_name_len >= "email_verified".len(),
            "email_verified name capacity {} is too small",
            self.max_ev_name_len
        );
        ensure!(
            self.max_ev_value_len + 2 >= "\"true\"".len(),
            "email_verified value capacity {} is too small",
            self.max_ev_value_len
        );
        ensure!(
            self.max_kc_name_len >= "email".len(),
            "key claim name capacity {} is too small",
            self.max_kc_name_len
        );
        for (what, ext, name, value) in [
            ("key claim", self.max_ext_kc_len, self.max_kc_name_len, self.max_kc_value_len),
            ("nonce", self.max_ext_nonce_len, "nonce".len(), NONCE_B64_LEN),
            ("email_verified", self.max_ext_ev_len, self.max_ev_name_len, self.max_ev_value_len),
            ("aud", self.max_ext_aud_len, "aud".len(), self.max_aud_value_len),
        ] {
            // quoted name and value must each fit in the excerpt
            ensure!(
                name + 2 <= ext && value + 2 <= ext,
                "{what} excerpt capacity {ext} cannot hold its name and value"
            );
        }
        for (what, ext) in [
            ("key claim", self.max_ext_kc_len),
            ("nonce", self.max_ext_nonce_len),
            ("email_verified", self.max_ext_ev_len),
            ("aud", self.max_ext_aud_len),
        ] {
            ensure!(
                max_b64_len_for(ext) <= self.max_padded_unsigned_jwt_len,
                "{what} excerpt capacity {ext} does not fit in the token"
            );
        }
        ensure!(
            self.max_ext_iss_b64_len > 0
                && self.max_ext_iss_b64_len <= self.max_padded_unsigned_jwt_len,
            "issuer window capacity {} is out of range",
            self.max_ext_iss_b64_len
        );
        validate_rsa_params(&self.bigint)
    }
}

/// Positions of one `"name":value` member inside its excerpt, plus where the
/// excerpt's base64 window sits in the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedClaimWitness {
    /// The member followed by its `,` or `}` terminator.
    pub ext_claim: String,
    pub index_b64: usize,
    pub length_b64: usize,
    /// Length of the quoted name.
    pub name_length: usize,
    pub colon_index: usize,
    pub value_index: usize,
    /// Length of the raw value, quotes included for strings.
    pub value_length: usize,
}

impl ExtendedClaimWitness {
    pub fn name(&self) -> Result<&[u8]> {
        self.ext_claim
            .as_bytes()
            .get(..self.name_length)
            .ok_or_else(|| anyhow!("name length {} overruns {:?}", self.name_length, self.ext_claim))
    }

    pub fn value(&self) -> Result<&[u8]> {
        self.ext_claim
            .as_bytes()
            .get(self.value_index..self.value_index + self.value_length)
            .ok_or_else(|| anyhow!("value range overruns {:?}", self.ext_claim))
    }

    /// Name with its quotes removed.
    pub fn name_unquoted(&self) -> Result<&[u8]> {
        unquote(self.name()?)
    }

    /// Value with its quotes removed; fails for non-string values.
    pub fn value_unquoted(&self) -> Result<&[u8]> {
        unquote(self.value()?)
    }

    pub fn validate(&self, capacity: usize) -> Result<()> {
        let len = self.ext_claim.len();
        ensure!(len <= capacity, "claim excerpt of {len} bytes exceeds capacity {capacity}");
        ensure!(
            self.name_length <= self.colon_index
                && self.colon_index < self.value_index
                && self.value_index + self.value_length < len,
            "claim positions are out of order for {:?}",
            self.ext_claim
        );
        Ok(())
    }
}

fn unquote(s: &[u8]) -> Result<&[u8]> {
    ensure!(
        s.len() >= 2 && s[0] == b'"' && s[s.len() - 1] == b'"',
        "expected a quoted JSON string"
    );
    Ok(&s[1..s.len() - 1])
}

/// Everything the prover supplies for one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZkLoginWitness {
    /// `header '.' payload` with SHA-256 padding.
    pub padded_unsigned_jwt: Vec<u8>,
    pub payload_start_index: usize,
    pub payload_len: usize,
    pub num_sha2_blocks: usize,
    /// Big-endian hex.
    pub signature: String,
    /// Big-endian hex.
    pub modulus: String,
    /// 32 bytes, hex.
    pub eph_public_key: String,
    pub max_epoch: u32,
    /// 16 bytes, hex.
    pub jwt_randomness: String,
    /// 16 bytes, hex.
    pub salt: String,
    pub iss_index_b64: usize,
    pub iss_length_b64: usize,
    pub kc: ExtendedClaimWitness,
    pub nonce: ExtendedClaimWitness,
    pub ev: ExtendedClaimWitness,
    pub aud: ExtendedClaimWitness,
}

impl ZkLoginWitness {
    pub fn header(&self) -> Result<&[u8]> {
        self.padded_unsigned_jwt
            .get(..self.payload_start_index.saturating_sub(1))
            .ok_or_else(|| anyhow!("payload start {} is past the token", self.payload_start_index))
    }

    pub fn iss_b64(&self) -> Result<&[u8]> {
        self.padded_unsigned_jwt
            .get(self.iss_index_b64..self.iss_index_b64 + self.iss_length_b64)
            .ok_or_else(|| anyhow!("issuer window is past the token"))
    }

    /// Alignment class of the issuer window relative to the payload.
    pub fn iss_index_mod_4(&self) -> Result<usize> {
        self.iss_index_b64
            .checked_sub(self.payload_start_index)
            .map(|rel| rel % 4)
            .ok_or_else(|| anyhow!("issuer window starts before the payload"))
    }

    /// Shape checks that would otherwise surface as opaque witness conflicts.
    pub fn validate(&self, params: &ZkLoginParams) -> Result<()> {
        let buf = self.padded_unsigned_jwt.len();
        ensure!(
            buf <= params.max_padded_unsigned_jwt_len,
            "padded token of {buf} bytes exceeds capacity {}",
            params.max_padded_unsigned_jwt_len
        );
        ensure!(
            self.num_sha2_blocks >= 1 && self.num_sha2_blocks * BLOCK_BYTES <= buf,
            "{} SHA-256 blocks do not fit in the {buf}-byte token",
            self.num_sha2_blocks
        );
        ensure!(
            self.payload_start_index >= 2 && self.payload_start_index - 1 <= params.max_header_len,
            "payload start {} is out of range",
            self.payload_start_index
        );
        ensure!(
            self.iss_index_b64 >= self.payload_start_index
                && self.iss_length_b64 >= 1
                && self.iss_length_b64 <= params.max_ext_iss_b64_len
                && self.iss_index_b64 + self.iss_length_b64
                    <= self.payload_start_index + self.payload_len,
            "issuer window is outside the payload"
        );
        self.kc.validate(params.max_ext_kc_len)?;
        self.nonce.validate(params.max_ext_nonce_len)?;
        self.ev.validate(params.max_ext_ev_len)?;
        self.aud.validate(params.max_ext_aud_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_consistent() {
        let params = ZkLoginParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.max_sha2_blocks(), 25);
    }

    #[test]
    fn rejects_unaligned_token_capacity() {
        let params = ZkLoginParams {
            max_padded_unsigned_jwt_len: 1000,
            ..ZkLoginParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn params_load_from_partial_json() -> Result<()> {
        let params: ZkLoginParams =
            serde_json::from_str(r#"{"max_padded_unsigned_jwt_len": 512, "max_header_len": 64}"#)?;
        assert_eq!(params.max_padded_unsigned_jwt_len, 512);
        assert_eq!(params.bigint, BigIntParams::RSA_2048);
        Ok(())
    }

    #[test]
    fn claim_accessors() -> Result<()> {
        let claim = ExtendedClaimWitness {
            ext_claim: r#""sub": "12345","#.to_string(),
            index_b64: 0,
            length_b64: 0,
            name_length: 5,
            colon_index: 5,
            value_index: 7,
            value_length: 7,
        };
        assert_eq!(claim.name_unquoted()?, b"sub");
        assert_eq!(claim.value_unquoted()?, b"12345");
        assert!(claim.validate(20).is_ok());
        assert!(claim.validate(10).is_err());
        Ok(())
    }
}
