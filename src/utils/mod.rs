//! Constraint gadgets and helpers for the zk-login relation.

pub mod b64_substring;
pub mod base64_decode;
pub mod bigint;
pub mod bit_packing;
pub mod circuit_stats;
pub mod indicators;
pub mod json_claims;
pub mod native;
pub mod parsing;
pub mod rsa;
pub mod sha256;
pub mod slicing;

#[cfg(test)]
pub(crate) mod testing;
