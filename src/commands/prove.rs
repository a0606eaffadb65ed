//! Proof generation command.

use anyhow::{ensure, Result};
use log::Level;
use plonky2::field::types::PrimeField64;
use plonky2::plonk::prover::prove;
use plonky2::util::timing::TimingTree;
use serde::Serialize;
use std::{fs, path::Path, time::Instant};

use crate::circuits::zk_login::ZkLoginCircuit;
use crate::types::input::ZkLoginWitness;
use crate::utils::native;

/// Disclosed values written next to the proof.
#[derive(Serialize)]
pub struct PublicInputsFile {
    pub all_inputs_hash: Vec<u64>,
    pub address_seed: Vec<u64>,
}

pub fn load_witness(input_file: &str) -> Result<ZkLoginWitness> {
    println!("Loading witness data from: {}", input_file);
    let input_data = fs::read_to_string(input_file)?;
    Ok(serde_json::from_str(&input_data)?)
}

/// Generate, verify and save a zk-login proof
pub fn generate_zk_login_proof(
    circuit: &ZkLoginCircuit,
    input_file: &str,
    build_dir: &Path,
) -> Result<()> {
    let witness = load_witness(input_file)?;
    let start = Instant::now();

    let pw = circuit.set_witness(&witness)?;
    let expected = native::all_inputs_hash(&witness, &circuit.params)?;
    let seed = native::address_seed_of(&witness, &circuit.params)?;
    println!("Witness assignment time: {:?}", start.elapsed());

    println!("Generating zk-login proof...");
    let mut timing = TimingTree::new("zk_login_proof", Level::Info);
    let proof = prove(&circuit.data.prover_only, &circuit.data.common, pw, &mut timing)?;
    println!("Proof timing breakdown:");
    timing.print();
    println!("Proof size: {} bytes", proof.to_bytes().len());
    ensure!(
        proof.public_inputs == expected.elements,
        "proof public inputs do not match the disclosed values"
    );

    println!("Verifying proof...");
    let verify_start = Instant::now();
    circuit.data.verify(proof.clone())?;
    println!("Proof verification time: {:?}", verify_start.elapsed());

    println!("Serializing and saving proof...");
    let proof_data = bincode::serialize(&proof)?;
    fs::write(build_dir.join("proof.bin"), &proof_data)?;
    println!("Proof saved: {} bytes", proof_data.len());

    let public = PublicInputsFile {
        all_inputs_hash: expected.elements.iter().map(|e| e.to_canonical_u64()).collect(),
        address_seed: seed.elements.iter().map(|e| e.to_canonical_u64()).collect(),
    };
    fs::write(
        build_dir.join("public_inputs.json"),
        serde_json::to_string_pretty(&public)?,
    )?;
    println!("Public inputs saved to: {}", build_dir.join("public_inputs.json").display());

    println!("zk-login total time: {:?}", start.elapsed());
    Ok(())
}
