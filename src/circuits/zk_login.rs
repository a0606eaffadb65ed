//! The zk-login relation.
//!
//! The circuit proves knowledge of an RSA-signed token `header.payload` such that:
//! - the header hashes to the disclosed header commitment
//! - SHA-256 of the padded token is signed under the disclosed modulus
//! - the payload carries a key claim, an audience, a nonce bound to the
//!   ephemeral key, and, for e-mail key claims, `email_verified: true`
//! - the address seed is the hash of the key claim, audience and salt
//!
//! Its only public input is the chained Poseidon hash of everything disclosed.

use anyhow::Result;
use log::debug;
use plonky2::field::types::Field;
use plonky2::hash::hash_types::HashOutTarget;
use plonky2::hash::poseidon::PoseidonHash;
use plonky2::iop::target::Target;
use plonky2::iop::witness::{PartialWitness, WitnessWrite};
use plonky2::plonk::circuit_builder::CircuitBuilder;
use plonky2::plonk::circuit_data::{CircuitConfig, CircuitData};
use plonky2::plonk::config::{GenericConfig, PoseidonGoldilocksConfig};
use plonky2::plonk::proof::ProofWithPublicInputs;

use crate::types::input::{ExtendedClaimWitness, ZkLoginParams, ZkLoginWitness};
use crate::utils::b64_substring::{assert_ascii_substring_of_b64, b64_alignment_class};
use crate::utils::bigint::{add_virtual_biguint, BigUintLimbs, ModMulContext};
use crate::utils::bit_packing::{hash_bytes_to_field, hash_chained, hash_segments_to_field};
use crate::utils::indicators::{assert_le, bits_for, one_hot, select_by_indicator};
use crate::utils::json_claims::{
    assert_const_string, check_email_verified, check_nonce, nonce_bits_msb,
    parse_extended_claim, strip_quotes, ClaimLayout, ClaimShape, ParsedClaim, NONCE_B64_LEN,
};
use crate::utils::native::{self, WitnessLimbs};
use crate::utils::parsing::{hex_to_bigint, set_biguint_target, set_bytes, set_u32_limbs, set_usize};
use crate::utils::rsa::verify_rsa_65537_sha256;
use crate::utils::sha256::{assert_zero_after_blocks, sha256_variable, verify_sha2_padding};
use crate::utils::slicing::{slice_from_start, slice_grouped};

const D: usize = 2;
type Cfg = PoseidonGoldilocksConfig;
type F = <Cfg as GenericConfig<D>>::F;

/// Private inputs describing one extended claim.
#[derive(Clone, Debug)]
pub struct ExtendedClaimTargets {
    pub ext_claim: Vec<Target>,
    pub index_b64: Target,
    pub length_b64: Target,
    pub layout: ClaimLayout,
}

impl ExtendedClaimTargets {
    fn new(builder: &mut CircuitBuilder<F, D>, capacity: usize) -> Self {
        Self {
            ext_claim: builder.add_virtual_targets(capacity),
            index_b64: builder.add_virtual_target(),
            length_b64: builder.add_virtual_target(),
            layout: ClaimLayout {
                length: builder.add_virtual_target(),
                name_length: builder.add_virtual_target(),
                colon_index: builder.add_virtual_target(),
                value_index: builder.add_virtual_target(),
                value_length: builder.add_virtual_target(),
            },
        }
    }

    fn set(&self, pw: &mut PartialWitness<F>, claim: &ExtendedClaimWitness) -> Result<()> {
        set_bytes(pw, &self.ext_claim, claim.ext_claim.as_bytes())?;
        set_usize(pw, self.index_b64, claim.index_b64)?;
        set_usize(pw, self.length_b64, claim.length_b64)?;
        set_usize(pw, self.layout.length, claim.ext_claim.len())?;
        set_usize(pw, self.layout.name_length, claim.name_length)?;
        set_usize(pw, self.layout.colon_index, claim.colon_index)?;
        set_usize(pw, self.layout.value_index, claim.value_index)?;
        set_usize(pw, self.layout.value_length, claim.value_length)?;
        Ok(())
    }
}

/// Targets for the zk-login circuit.
#[derive(Clone, Debug)]
pub struct ZkLoginTargets {
    pub padded_unsigned_jwt: Vec<Target>,
    pub payload_start_index: Target,
    pub payload_len: Target,
    pub num_sha2_blocks: Target,
    pub signature: BigUintLimbs,
    pub modulus: BigUintLimbs,
    /// Eight little-endian 32-bit limbs.
    pub eph_public_key: Vec<Target>,
    pub max_epoch: Target,
    /// Four little-endian 32-bit limbs.
    pub jwt_randomness: Vec<Target>,
    /// Four little-endian 32-bit limbs.
    pub salt: Vec<Target>,
    pub iss_index_b64: Target,
    pub iss_length_b64: Target,
    pub kc: ExtendedClaimTargets,
    pub nonce: ExtendedClaimTargets,
    pub ev: ExtendedClaimTargets,
    pub aud: ExtendedClaimTargets,
    /// Public input.
    pub all_inputs_hash: HashOutTarget,
}

pub struct ZkLoginCircuit {
    pub data: CircuitData<F, Cfg, D>,
    pub targets: ZkLoginTargets,
    pub params: ZkLoginParams,
}

fn new_u32_limbs(builder: &mut CircuitBuilder<F, D>, n: usize) -> Vec<Target> {
    let limbs = builder.add_virtual_targets(n);
    for l in &limbs {
        builder.range_check(*l, 32);
    }
    limbs
}

/// Locates the claim inside the payload's base64 and parses it.
fn locate_and_parse(
    builder: &mut CircuitBuilder<F, D>,
    token: &[Target],
    payload_start: Target,
    payload_end: Target,
    claim: &ExtendedClaimTargets,
    shape: &ClaimShape,
) -> ParsedClaim {
    assert_ascii_substring_of_b64(
        builder,
        token,
        claim.index_b64,
        claim.length_b64,
        payload_start,
        &claim.ext_claim,
        claim.layout.length,
    );
    let window_end = builder.add(claim.index_b64, claim.length_b64);
    assert_le(builder, window_end, payload_end, bits_for(token.len()));
    parse_extended_claim(builder, &claim.ext_claim, &claim.layout, shape)
}

/// Build the zk-login circuit for the given capacities.
pub fn build_zk_login_circuit(params: &ZkLoginParams) -> Result<ZkLoginCircuit> {
    params.validate()?;
    let mut config = CircuitConfig::standard_recursion_config();
    config.zero_knowledge = true;
    debug!("Zero-knowledge active? {}", config.zero_knowledge);
    let mut builder = CircuitBuilder::<F, D>::new(config);
    let token_cap = params.max_padded_unsigned_jwt_len;
    let index_bits = bits_for(token_cap);

    // Public input: hash of every disclosed value
    let all_inputs_hash = builder.add_virtual_hash();
    builder.register_public_inputs(&all_inputs_hash.elements);

    // Private inputs
    let padded_unsigned_jwt = builder.add_virtual_targets(token_cap);
    for b in &padded_unsigned_jwt {
        builder.range_check(*b, 8);
    }
    let payload_start_index = builder.add_virtual_target();
    let payload_len = builder.add_virtual_target();
    let num_sha2_blocks = builder.add_virtual_target();
    builder.range_check(payload_start_index, index_bits);
    builder.range_check(payload_len, index_bits);

    let signature = add_virtual_biguint(&mut builder, &params.bigint);
    let modulus = add_virtual_biguint(&mut builder, &params.bigint);

    let eph_public_key = new_u32_limbs(&mut builder, 8);
    let max_epoch = builder.add_virtual_target();
    builder.range_check(max_epoch, 32);
    let jwt_randomness = new_u32_limbs(&mut builder, 4);
    let salt = new_u32_limbs(&mut builder, 4);

    let iss_index_b64 = builder.add_virtual_target();
    let iss_length_b64 = builder.add_virtual_target();

    let kc = ExtendedClaimTargets::new(&mut builder, params.max_ext_kc_len);
    let nonce = ExtendedClaimTargets::new(&mut builder, params.max_ext_nonce_len);
    let ev = ExtendedClaimTargets::new(&mut builder, params.max_ext_ev_len);
    let aud = ExtendedClaimTargets::new(&mut builder, params.max_ext_aud_len);
    debug!("inputs: {} gates", builder.num_gates());

    // === Header: padded[0 .. payload_start - 1], followed by '.' ===
    let header_len = builder.add_const(payload_start_index, F::NEG_ONE);
    let header = slice_from_start(
        &mut builder,
        &padded_unsigned_jwt,
        header_len,
        params.max_header_len,
    );
    let at_dot = one_hot(&mut builder, header_len, token_cap);
    let dot = select_by_indicator(&mut builder, &padded_unsigned_jwt, &at_dot);
    let dot_expected = builder.constant(F::from_canonical_u8(b'.'));
    builder.connect(dot, dot_expected);
    let header_f = hash_bytes_to_field(&mut builder, &header)?;
    debug!("header: {} gates", builder.num_gates());

    // === SHA-256 over the live blocks, with padding checks ===
    let sha = sha256_variable(&mut builder, &padded_unsigned_jwt, num_sha2_blocks);
    assert_zero_after_blocks(&mut builder, &padded_unsigned_jwt, &sha.last_block);
    let payload_end = builder.add(payload_start_index, payload_len);
    verify_sha2_padding(&mut builder, &padded_unsigned_jwt, num_sha2_blocks, payload_end);
    debug!("sha256: {} gates", builder.num_gates());

    // === RSA signature over the digest ===
    let ctx = ModMulContext::<F>::new(params.bigint)?;
    verify_rsa_65537_sha256(&mut builder, &ctx, &signature, &modulus, &sha.digest)?;
    debug!("rsa: {} gates", builder.num_gates());

    // === Claims ===
    let ws = params.max_whitespace_len;
    let kc_parsed = locate_and_parse(
        &mut builder,
        &padded_unsigned_jwt,
        payload_start_index,
        payload_end,
        &kc,
        &ClaimShape {
            max_name_len: params.max_kc_name_len + 2,
            max_value_len: params.max_kc_value_len + 2,
            max_whitespace_len: ws,
        },
    );
    let (kc_name, _) = strip_quotes(&mut builder, &kc_parsed.name, kc.layout.name_length);
    let (kc_value, _) = strip_quotes(&mut builder, &kc_parsed.value, kc.layout.value_length);

    let nonce_parsed = locate_and_parse(
        &mut builder,
        &padded_unsigned_jwt,
        payload_start_index,
        payload_end,
        &nonce,
        &ClaimShape {
            max_name_len: "\"nonce\"".len(),
            max_value_len: NONCE_B64_LEN + 2,
            max_whitespace_len: ws,
        },
    );
    assert_const_string(&mut builder, &nonce_parsed.name, b"\"nonce\"");

    let ev_parsed = locate_and_parse(
        &mut builder,
        &padded_unsigned_jwt,
        payload_start_index,
        payload_end,
        &ev,
        &ClaimShape {
            max_name_len: params.max_ev_name_len + 2,
            max_value_len: params.max_ev_value_len + 2,
            max_whitespace_len: ws,
        },
    );
    let (ev_name, _) = strip_quotes(&mut builder, &ev_parsed.name, ev.layout.name_length);
    check_email_verified(&mut builder, &kc_name, &ev_name, &ev_parsed.value);

    let aud_parsed = locate_and_parse(
        &mut builder,
        &padded_unsigned_jwt,
        payload_start_index,
        payload_end,
        &aud,
        &ClaimShape {
            max_name_len: "\"aud\"".len(),
            max_value_len: params.max_aud_value_len + 2,
            max_whitespace_len: ws,
        },
    );
    assert_const_string(&mut builder, &aud_parsed.name, b"\"aud\"");
    let (aud_value, _) = strip_quotes(&mut builder, &aud_parsed.value, aud.layout.value_length);
    debug!("claims: {} gates", builder.num_gates());

    // === Nonce = Poseidon(eph_pk || max_epoch || randomness), low 160 bits ===
    let mut nonce_inputs = eph_public_key.clone();
    nonce_inputs.push(max_epoch);
    nonce_inputs.extend(&jwt_randomness);
    let nonce_digest = builder.hash_n_to_hash_no_pad::<PoseidonHash>(nonce_inputs);
    let nonce_bits = nonce_bits_msb(&mut builder, nonce_digest);
    check_nonce(
        &mut builder,
        &nonce_bits,
        &nonce_parsed.value,
        nonce.layout.value_length,
    );

    // === Address seed ===
    let salt_hash = hash_chained(&mut builder, &salt)?;
    let kc_name_f = hash_bytes_to_field(&mut builder, &kc_name)?;
    let kc_value_f = hash_bytes_to_field(&mut builder, &kc_value)?;
    let aud_value_f = hash_bytes_to_field(&mut builder, &aud_value)?;
    let seed_inputs: Vec<Target> = [kc_name_f, kc_value_f, aud_value_f, salt_hash]
        .iter()
        .flat_map(|h| h.elements)
        .collect();
    let address_seed = hash_chained(&mut builder, &seed_inputs)?;

    // === Issuer window, disclosed as raw base64 ===
    let iss_b64 = slice_grouped(
        &mut builder,
        &padded_unsigned_jwt,
        iss_index_b64,
        iss_length_b64,
        params.max_ext_iss_b64_len,
    );
    let iss_index_mod_4 =
        b64_alignment_class(&mut builder, iss_index_b64, payload_start_index, token_cap);
    let iss_end = builder.add(iss_index_b64, iss_length_b64);
    assert_le(&mut builder, iss_end, payload_end, index_bits);
    let iss_f = hash_bytes_to_field(&mut builder, &iss_b64)?;

    // === Disclosure hash ===
    let modulus_be: Vec<Target> = modulus.limbs.iter().rev().copied().collect();
    let modulus_f = hash_segments_to_field(&mut builder, &modulus_be, params.bigint.limb_bits)?;
    let mut disclosed = eph_public_key.clone();
    disclosed.extend(address_seed.elements);
    disclosed.push(max_epoch);
    disclosed.extend(iss_f.elements);
    disclosed.push(iss_index_mod_4);
    disclosed.extend(header_f.elements);
    disclosed.extend(modulus_f.elements);
    let computed = hash_chained(&mut builder, &disclosed)?;
    builder.connect_hashes(computed, all_inputs_hash);
    debug!("total: {} gates", builder.num_gates());

    let data = builder.build::<Cfg>();
    Ok(ZkLoginCircuit {
        data,
        targets: ZkLoginTargets {
            padded_unsigned_jwt,
            payload_start_index,
            payload_len,
            num_sha2_blocks,
            signature,
            modulus,
            eph_public_key,
            max_epoch,
            jwt_randomness,
            salt,
            iss_index_b64,
            iss_length_b64,
            kc,
            nonce,
            ev,
            aud,
            all_inputs_hash,
        },
        params: params.clone(),
    })
}

impl ZkLoginCircuit {
    /// Assign every private input and the public disclosure hash.
    pub fn set_witness(&self, witness: &ZkLoginWitness) -> Result<PartialWitness<F>> {
        witness.validate(&self.params)?;
        let t = &self.targets;
        let limbs = WitnessLimbs::from_witness(witness)?;
        let mut pw = PartialWitness::<F>::new();

        set_bytes(&mut pw, &t.padded_unsigned_jwt, &witness.padded_unsigned_jwt)?;
        set_usize(&mut pw, t.payload_start_index, witness.payload_start_index)?;
        set_usize(&mut pw, t.payload_len, witness.payload_len)?;
        set_usize(&mut pw, t.num_sha2_blocks, witness.num_sha2_blocks)?;

        let signature = hex_to_bigint(&witness.signature)?;
        let modulus = hex_to_bigint(&witness.modulus)?;
        set_biguint_target(&mut pw, &t.signature, &signature, &self.params.bigint)?;
        set_biguint_target(&mut pw, &t.modulus, &modulus, &self.params.bigint)?;

        set_u32_limbs(&mut pw, &t.eph_public_key, &limbs.eph_public_key)?;
        pw.set_target(t.max_epoch, F::from_canonical_u32(witness.max_epoch))?;
        set_u32_limbs(&mut pw, &t.jwt_randomness, &limbs.jwt_randomness)?;
        set_u32_limbs(&mut pw, &t.salt, &limbs.salt)?;

        set_usize(&mut pw, t.iss_index_b64, witness.iss_index_b64)?;
        set_usize(&mut pw, t.iss_length_b64, witness.iss_length_b64)?;

        t.kc.set(&mut pw, &witness.kc)?;
        t.nonce.set(&mut pw, &witness.nonce)?;
        t.ev.set(&mut pw, &witness.ev)?;
        t.aud.set(&mut pw, &witness.aud)?;

        let all_inputs = native::all_inputs_hash(witness, &self.params)?;
        pw.set_hash_target(t.all_inputs_hash, all_inputs)?;
        Ok(pw)
    }

    pub fn prove(&self, witness: &ZkLoginWitness) -> Result<ProofWithPublicInputs<F, Cfg, D>> {
        let pw = self.set_witness(witness)?;
        self.data.prove(pw)
    }
}
