//! Circuit statistics and performance monitoring utilities.

use plonky2::plonk::circuit_data::CommonCircuitData;
use plonky2::plonk::config::{GenericConfig, PoseidonGoldilocksConfig};

const D: usize = 2;
type Cfg = PoseidonGoldilocksConfig;
type F = <Cfg as GenericConfig<D>>::F;

/// Print circuit size, gate mix and public input count
pub fn print_circuit_stats(name: &str, common: &CommonCircuitData<F, D>) {
    let rows = common.degree();
    let constraints_per_row: usize = common
        .gates
        .iter()
        .map(|gate| gate.0.num_constraints())
        .max()
        .unwrap_or(0);

    println!("{} circuit statistics:", name);
    println!("  Rows: {} (2^{})", rows, common.degree_bits());
    println!("  Max constraints per row: {}", constraints_per_row);
    println!("  Quotient degree factor: {}", common.quotient_degree_factor);
    println!("  Public inputs: {}", common.num_public_inputs);
    println!("  Constants: {}", common.num_constants);
    println!("  Gate types: {}", common.gates.len());
    for gate in &common.gates {
        println!("    {}", gate.0.id());
    }
}
