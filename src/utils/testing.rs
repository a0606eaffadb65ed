//! Shared helpers for gadget tests.

use std::panic::{catch_unwind, AssertUnwindSafe};

use plonky2::iop::witness::PartialWitness;
use plonky2::plonk::circuit_builder::CircuitBuilder;
use plonky2::plonk::circuit_data::{CircuitConfig, CircuitData};
use plonky2::plonk::config::{GenericConfig, PoseidonGoldilocksConfig};

pub const D: usize = 2;
pub type Cfg = PoseidonGoldilocksConfig;
pub type F = <Cfg as GenericConfig<D>>::F;

pub fn new_builder() -> CircuitBuilder<F, D> {
    CircuitBuilder::<F, D>::new(CircuitConfig::standard_recursion_config())
}

/// True when a proof for `pw` can be generated and verified.
///
/// Unsatisfied copy constraints surface as witness generation errors (or
/// panics, depending on where the conflict is found); unsatisfied gate
/// constraints surface as a proof that does not verify. All of them count as
/// "not satisfiable" here.
pub fn is_satisfiable(data: &CircuitData<F, Cfg, D>, pw: PartialWitness<F>) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        data.prove(pw).and_then(|proof| data.verify(proof))
    }))
    .map(|res| res.is_ok())
    .unwrap_or(false)
}
