//! Plonky2 relation proving that a prover holds an RSA-signed OpenID token
//! whose key claim, audience and nonce are bound to an ephemeral key, without
//! revealing the token.

pub mod circuits;
pub mod commands;
pub mod types;
pub mod utils;

pub use circuits::zk_login::{build_zk_login_circuit, ZkLoginCircuit, ZkLoginTargets};
pub use types::input::{ExtendedClaimWitness, ZkLoginParams, ZkLoginWitness};
