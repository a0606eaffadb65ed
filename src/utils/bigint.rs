//! Limb-decomposed big integers and modular multiplication.
//!
//! A k-limb integer is read as a polynomial of degree k-1 in the limb radix.
//! Products are formed by evaluating both operands at the 2k-1 points
//! `0, 1, ..., 2k-2`, which determines the product polynomial uniquely.
//! Quotient and remainder are witnessed; the pointwise difference
//! `a*b - m*q - r` is mapped back to coefficients through a fixed inverse
//! Vandermonde matrix, and those coefficients are shown to carry to zero in
//! the limb radix.

use anyhow::{ensure, Result};
use num_bigint::BigUint;
use num_traits::Zero;
use plonky2::field::extension::Extendable;
use plonky2::field::types::{Field, PrimeField64};
use plonky2::hash::hash_types::RichField;
use plonky2::iop::generator::{GeneratedValues, SimpleGenerator};
use plonky2::iop::target::{BoolTarget, Target};
use plonky2::iop::witness::{PartitionWitness, Witness, WitnessWrite};
use plonky2::plonk::circuit_builder::CircuitBuilder;
use plonky2::plonk::circuit_data::CommonCircuitData;
use plonky2::util::serialization::{Buffer, IoResult, Read, Write};
use serde::{Deserialize, Serialize};

use crate::utils::indicators::less_than;

/// Limb layout of the big integers in the relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BigIntParams {
    pub limb_bits: usize,
    pub num_limbs: usize,
}

impl BigIntParams {
    pub const RSA_2048: Self = Self {
        limb_bits: 16,
        num_limbs: 128,
    };

    pub fn total_bits(&self) -> usize {
        self.limb_bits * self.num_limbs
    }

    pub fn num_points(&self) -> usize {
        2 * self.num_limbs - 1
    }

    /// Bound on the bit length of a product-difference coefficient.
    pub fn coeff_bits(&self) -> usize {
        2 * self.limb_bits + ceil_log2(self.num_limbs) + 2
    }

    /// Width of the signed carries, before the offset that makes them non-negative.
    pub fn carry_bits(&self) -> usize {
        self.coeff_bits() + 1 - self.limb_bits
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.limb_bits > 0 && self.limb_bits % 8 == 0 && 256 % self.limb_bits == 0,
            "limb width {} must be a multiple of 8 dividing 256",
            self.limb_bits
        );
        ensure!(self.num_limbs >= 2, "need at least two limbs");
        // coefficients must stay far from the field order
        ensure!(
            self.coeff_bits() + 1 < 63,
            "limb layout {}x{} overflows the field",
            self.num_limbs,
            self.limb_bits
        );
        Ok(())
    }
}

fn ceil_log2(n: usize) -> usize {
    (usize::BITS - (n.max(1) - 1).leading_zeros()) as usize
}

/// Little-endian limbs, each range checked to `limb_bits`.
#[derive(Clone, Debug)]
pub struct BigUintLimbs {
    pub limbs: Vec<Target>,
}

pub fn add_virtual_biguint<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    params: &BigIntParams,
) -> BigUintLimbs {
    let limbs = builder.add_virtual_targets(params.num_limbs);
    for limb in &limbs {
        builder.range_check(*limb, params.limb_bits);
    }
    BigUintLimbs { limbs }
}

/// Limbs together with their evaluations at the multiplication points.
#[derive(Clone, Debug)]
pub struct EvaluatedBigUint {
    pub value: BigUintLimbs,
    evals: Vec<Target>,
}

/// Precomputed data for modular multiplication under one limb layout.
pub struct ModMulContext<F: Field> {
    params: BigIntParams,
    /// `interpolation[i][x]`: weight of the evaluation at point `x` in coefficient `i`.
    interpolation: Vec<Vec<F>>,
}

impl<F: RichField> ModMulContext<F> {
    pub fn new(params: BigIntParams) -> Result<Self> {
        params.validate()?;
        let interpolation = inverse_vandermonde(params.num_points());
        Ok(Self {
            params,
            interpolation,
        })
    }

    pub fn params(&self) -> &BigIntParams {
        &self.params
    }

    pub fn evaluate<const D: usize>(
        &self,
        builder: &mut CircuitBuilder<F, D>,
        value: &BigUintLimbs,
    ) -> EvaluatedBigUint
    where
        F: Extendable<D>,
    {
        let evals = (0..self.params.num_points())
            .map(|x| horner(builder, &value.limbs, x as u64))
            .collect();
        EvaluatedBigUint {
            value: value.clone(),
            evals,
        }
    }

    /// `a * b mod m`, with the remainder range checked limb by limb.
    ///
    /// The remainder is only guaranteed to be congruent; callers that need it
    /// reduced must compare it against the modulus.
    pub fn mul_mod<const D: usize>(
        &self,
        builder: &mut CircuitBuilder<F, D>,
        a: &EvaluatedBigUint,
        b: &EvaluatedBigUint,
        modulus: &EvaluatedBigUint,
    ) -> EvaluatedBigUint
    where
        F: Extendable<D>,
    {
        let quotient = add_virtual_biguint(builder, &self.params);
        let remainder = add_virtual_biguint(builder, &self.params);
        builder.add_simple_generator(ModMulGenerator {
            a: a.value.limbs.clone(),
            b: b.value.limbs.clone(),
            modulus: modulus.value.limbs.clone(),
            quotient: quotient.limbs.clone(),
            remainder: remainder.limbs.clone(),
            limb_bits: self.params.limb_bits,
        });
        let quotient = self.evaluate(builder, &quotient);
        let remainder = self.evaluate(builder, &remainder);

        let residual: Vec<Target> = (0..self.params.num_points())
            .map(|x| {
                let ab = builder.mul(a.evals[x], b.evals[x]);
                let ab_minus_r = builder.sub(ab, remainder.evals[x]);
                builder.arithmetic(
                    F::NEG_ONE,
                    F::ONE,
                    modulus.evals[x],
                    quotient.evals[x],
                    ab_minus_r,
                )
            })
            .collect();

        let coeffs: Vec<Target> = self
            .interpolation
            .iter()
            .map(|row| {
                let mut acc = builder.zero();
                for (w, r) in row.iter().zip(&residual) {
                    acc = builder.mul_const_add(*w, *r, acc);
                }
                acc
            })
            .collect();
        assert_carries_to_zero(builder, &coeffs, &self.params);

        remainder
    }

    /// `base^65537 mod m` as sixteen squarings and one multiplication.
    pub fn pow_65537<const D: usize>(
        &self,
        builder: &mut CircuitBuilder<F, D>,
        base: &BigUintLimbs,
        modulus: &BigUintLimbs,
    ) -> BigUintLimbs
    where
        F: Extendable<D>,
    {
        let modulus = self.evaluate(builder, modulus);
        let base = self.evaluate(builder, base);
        let mut acc = base.clone();
        for _ in 0..16 {
            acc = self.mul_mod(builder, &acc, &acc, &modulus);
        }
        self.mul_mod(builder, &acc, &base, &modulus).value
    }
}

fn horner<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    limbs: &[Target],
    x: u64,
) -> Target {
    if x == 0 {
        return limbs[0];
    }
    let point = F::from_canonical_u64(x);
    let mut acc = limbs[limbs.len() - 1];
    for limb in limbs.iter().rev().skip(1) {
        acc = builder.mul_const_add(point, acc, *limb);
    }
    acc
}

/// Coefficients-from-evaluations matrix for the points `0..n`.
fn inverse_vandermonde<F: Field>(n: usize) -> Vec<Vec<F>> {
    // P(X) = prod_m (X - m), low coefficient first
    let mut full = vec![F::ONE];
    for m in 0..n {
        let root = F::from_canonical_usize(m);
        let mut next = vec![F::ZERO; full.len() + 1];
        for (i, c) in full.iter().enumerate() {
            next[i + 1] += *c;
            next[i] -= root * *c;
        }
        full = next;
    }

    let mut matrix = vec![vec![F::ZERO; n]; n];
    for j in 0..n {
        let root = F::from_canonical_usize(j);
        // P(X) / (X - j)
        let mut basis = vec![F::ZERO; n];
        let mut carry = F::ZERO;
        for i in (0..n).rev() {
            carry = full[i + 1] + carry * root;
            basis[i] = carry;
        }
        let mut denom = F::ZERO;
        for c in basis.iter().rev() {
            denom = denom * root + *c;
        }
        let inv = denom.inverse();
        for (i, c) in basis.iter().enumerate() {
            matrix[i][j] = *c * inv;
        }
    }
    matrix
}

/// Proves `Σ coeffs[i] * 2^(limb_bits * i) == 0` with signed coefficients of
/// at most `coeff_bits` bits.
fn assert_carries_to_zero<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    coeffs: &[Target],
    params: &BigIntParams,
) {
    let carries = builder.add_virtual_targets(coeffs.len() - 1);
    builder.add_simple_generator(CarryGenerator {
        coeffs: coeffs.to_vec(),
        carries: carries.clone(),
        limb_bits: params.limb_bits,
    });

    let radix = F::from_canonical_u64(1 << params.limb_bits);
    let carry_bits = params.carry_bits();
    let offset = F::from_canonical_u64(1 << carry_bits);
    let mut prev: Option<Target> = None;
    for (coeff, carry) in coeffs.iter().zip(&carries) {
        let lhs = match prev {
            Some(p) => builder.add(*coeff, p),
            None => *coeff,
        };
        let rhs = builder.mul_const(radix, *carry);
        builder.connect(lhs, rhs);
        let shifted = builder.add_const(*carry, offset);
        builder.range_check(shifted, carry_bits + 1);
        prev = Some(*carry);
    }
    let last = coeffs[coeffs.len() - 1];
    let last = match prev {
        Some(p) => builder.add(last, p),
        None => last,
    };
    builder.assert_zero(last);
}

/// `a < b` for equal-width limb vectors.
pub fn assert_biguint_lt<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    a: &BigUintLimbs,
    b: &BigUintLimbs,
    limb_bits: usize,
) {
    assert_eq!(a.limbs.len(), b.limbs.len());
    let mut acc = builder._false();
    for (x, y) in a.limbs.iter().zip(&b.limbs) {
        let lt = less_than(builder, *x, *y, limb_bits);
        let eq = builder.is_equal(*x, *y);
        // a more significant limb decides unless it is equal
        acc = BoolTarget::new_unsafe(builder.mul_add(eq.target, acc.target, lt.target));
    }
    builder.assert_one(acc.target);
}

pub fn biguint_from_limbs<F: PrimeField64>(limbs: &[F], limb_bits: usize) -> BigUint {
    limbs.iter().rev().fold(BigUint::zero(), |acc, limb| {
        (acc << limb_bits) + BigUint::from(limb.to_canonical_u64())
    })
}

/// Little-endian limbs of `value`; fails if it does not fit in `num_limbs`.
pub fn biguint_to_limbs(value: &BigUint, params: &BigIntParams) -> Result<Vec<u64>> {
    ensure!(
        value.bits() as usize <= params.total_bits(),
        "value of {} bits does not fit in {} limbs of {} bits",
        value.bits(),
        params.num_limbs,
        params.limb_bits
    );
    let mask = (BigUint::from(1u8) << params.limb_bits) - 1u8;
    Ok((0..params.num_limbs)
        .map(|i| {
            let limb = (value >> (params.limb_bits * i)) & &mask;
            limb.iter_u64_digits().next().unwrap_or(0)
        })
        .collect())
}

fn field_from_i128<F: Field>(v: i128) -> F {
    if v >= 0 {
        F::from_canonical_u64(v as u64)
    } else {
        -F::from_canonical_u64(v.unsigned_abs() as u64)
    }
}

fn i128_from_field<F: PrimeField64>(v: F) -> i128 {
    let u = v.to_canonical_u64();
    if u > F::ORDER / 2 {
        -((F::ORDER - u) as i128)
    } else {
        u as i128
    }
}

#[derive(Debug)]
struct ModMulGenerator {
    a: Vec<Target>,
    b: Vec<Target>,
    modulus: Vec<Target>,
    quotient: Vec<Target>,
    remainder: Vec<Target>,
    limb_bits: usize,
}

impl ModMulGenerator {
    fn read_limbs<F: PrimeField64>(&self, witness: &PartitionWitness<F>, limbs: &[Target]) -> BigUint {
        let values: Vec<F> = limbs.iter().map(|t| witness.get_target(*t)).collect();
        biguint_from_limbs(&values, self.limb_bits)
    }

    fn write_limbs<F: PrimeField64>(
        &self,
        out_buffer: &mut GeneratedValues<F>,
        targets: &[Target],
        value: &BigUint,
    ) -> anyhow::Result<()> {
        let params = BigIntParams {
            limb_bits: self.limb_bits,
            num_limbs: targets.len(),
        };
        let limbs = biguint_to_limbs(value, &params)?;
        for (t, v) in targets.iter().zip(limbs) {
            out_buffer.set_target(*t, F::from_canonical_u64(v))?;
        }
        Ok(())
    }
}

impl<F: RichField + Extendable<D>, const D: usize> SimpleGenerator<F, D> for ModMulGenerator {
    fn id(&self) -> String {
        "ModMulGenerator".to_string()
    }

    fn dependencies(&self) -> Vec<Target> {
        self.a
            .iter()
            .chain(&self.b)
            .chain(&self.modulus)
            .copied()
            .collect()
    }

    fn run_once(
        &self,
        witness: &PartitionWitness<F>,
        out_buffer: &mut GeneratedValues<F>,
    ) -> anyhow::Result<()> {
        let a = self.read_limbs(witness, &self.a);
        let b = self.read_limbs(witness, &self.b);
        let modulus = self.read_limbs(witness, &self.modulus);
        ensure!(!modulus.is_zero(), "modulus is zero");

        let product = a * b;
        let quotient = &product / &modulus;
        let remainder = &product % &modulus;
        self.write_limbs(out_buffer, &self.quotient, &quotient)?;
        self.write_limbs(out_buffer, &self.remainder, &remainder)
    }

    fn serialize(&self, dst: &mut Vec<u8>, _common_data: &CommonCircuitData<F, D>) -> IoResult<()> {
        dst.write_target_vec(&self.a)?;
        dst.write_target_vec(&self.b)?;
        dst.write_target_vec(&self.modulus)?;
        dst.write_target_vec(&self.quotient)?;
        dst.write_target_vec(&self.remainder)?;
        dst.write_usize(self.limb_bits)
    }

    fn deserialize(src: &mut Buffer, _common_data: &CommonCircuitData<F, D>) -> IoResult<Self> {
        Ok(Self {
            a: src.read_target_vec()?,
            b: src.read_target_vec()?,
            modulus: src.read_target_vec()?,
            quotient: src.read_target_vec()?,
            remainder: src.read_target_vec()?,
            limb_bits: src.read_usize()?,
        })
    }
}

#[derive(Debug)]
struct CarryGenerator {
    coeffs: Vec<Target>,
    carries: Vec<Target>,
    limb_bits: usize,
}

impl<F: RichField + Extendable<D>, const D: usize> SimpleGenerator<F, D> for CarryGenerator {
    fn id(&self) -> String {
        "CarryGenerator".to_string()
    }

    fn dependencies(&self) -> Vec<Target> {
        self.coeffs.clone()
    }

    fn run_once(
        &self,
        witness: &PartitionWitness<F>,
        out_buffer: &mut GeneratedValues<F>,
    ) -> anyhow::Result<()> {
        let mut carry: i128 = 0;
        for (coeff, target) in self.coeffs.iter().zip(&self.carries) {
            let total = i128_from_field(witness.get_target(*coeff)) + carry;
            carry = total >> self.limb_bits;
            out_buffer.set_target(*target, field_from_i128::<F>(carry))?;
        }
        Ok(())
    }

    fn serialize(&self, dst: &mut Vec<u8>, _common_data: &CommonCircuitData<F, D>) -> IoResult<()> {
        dst.write_target_vec(&self.coeffs)?;
        dst.write_target_vec(&self.carries)?;
        dst.write_usize(self.limb_bits)
    }

    fn deserialize(src: &mut Buffer, _common_data: &CommonCircuitData<F, D>) -> IoResult<Self> {
        Ok(Self {
            coeffs: src.read_target_vec()?,
            carries: src.read_target_vec()?,
            limb_bits: src.read_usize()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::{is_satisfiable, new_builder, Cfg, F};
    use plonky2::iop::witness::PartialWitness;

    const SMALL: BigIntParams = BigIntParams {
        limb_bits: 16,
        num_limbs: 8,
    };

    #[test]
    fn interpolation_inverts_evaluation() {
        let n = 9;
        let matrix = inverse_vandermonde::<F>(n);
        let coeffs: Vec<F> = (0..n as u64).map(|i| F::from_canonical_u64(i * i + 3)).collect();
        let evals: Vec<F> = (0..n as u64)
            .map(|x| {
                let x = F::from_canonical_u64(x);
                coeffs.iter().rev().fold(F::ZERO, |acc, c| acc * x + *c)
            })
            .collect();
        for (i, row) in matrix.iter().enumerate() {
            let back = row.iter().zip(&evals).fold(F::ZERO, |acc, (w, e)| acc + *w * *e);
            assert_eq!(back, coeffs[i]);
        }
    }

    #[test]
    fn params_layout() {
        assert_eq!(BigIntParams::RSA_2048.total_bits(), 2048);
        assert_eq!(BigIntParams::RSA_2048.coeff_bits(), 41);
        assert_eq!(BigIntParams::RSA_2048.carry_bits(), 26);
        assert!(BigIntParams::RSA_2048.validate().is_ok());
        assert!(BigIntParams { limb_bits: 12, num_limbs: 8 }.validate().is_err());
        assert!(BigIntParams { limb_bits: 32, num_limbs: 64 }.validate().is_err());
    }

    #[test]
    fn limb_conversion() -> Result<()> {
        let value = BigUint::parse_bytes(b"0123456789abcdef0011", 16).ok_or_else(|| anyhow::anyhow!("hex"))?;
        let limbs = biguint_to_limbs(&value, &SMALL)?;
        assert_eq!(limbs[0], 0x0011);
        assert_eq!(limbs[1], 0xcdef);
        let fields: Vec<F> = limbs.iter().map(|l| F::from_canonical_u64(*l)).collect();
        assert_eq!(biguint_from_limbs(&fields, 16), value);

        let too_big = BigUint::from(1u8) << 128;
        assert!(biguint_to_limbs(&too_big, &SMALL).is_err());
        Ok(())
    }

    #[test]
    fn mul_mod_matches_product_for_distinct_operands() -> Result<()> {
        let hex = |s: &str| {
            BigUint::parse_bytes(s.as_bytes(), 16).ok_or_else(|| anyhow::anyhow!("hex"))
        };
        let modulus = hex("d3c2b1a0f9e8d7c6b5a4938271605f4b")?;
        let pairs = [
            (hex("7e1d5c9b3a2f4e6d8c0b1a2938475665")?, hex("1234")?),
            (hex("c0ffee00deadbeef0123456789abcdef")?, hex("a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5")?),
            (&modulus - 1u8, &modulus - 1u8),
            (BigUint::zero(), hex("5f4b")?),
            (hex("1")?, hex("ffffffffffffffffffffffffffff")?),
        ];

        let ctx = ModMulContext::<F>::new(SMALL)?;
        let mut builder = new_builder();
        let a_t = add_virtual_biguint(&mut builder, &SMALL);
        let b_t = add_virtual_biguint(&mut builder, &SMALL);
        let m_t = add_virtual_biguint(&mut builder, &SMALL);
        let a_e = ctx.evaluate(&mut builder, &a_t);
        let b_e = ctx.evaluate(&mut builder, &b_t);
        let m_e = ctx.evaluate(&mut builder, &m_t);
        let r = ctx.mul_mod(&mut builder, &a_e, &b_e, &m_e);
        let claimed_t = add_virtual_biguint(&mut builder, &SMALL);
        for (o, c) in r.value.limbs.iter().zip(&claimed_t.limbs) {
            builder.connect(*o, *c);
        }
        let data = builder.build::<Cfg>();

        let assign = |a: &BigUint, b: &BigUint, claimed: &BigUint| -> Result<PartialWitness<F>> {
            let mut pw = PartialWitness::new();
            for (targets, value) in [(&a_t, a), (&b_t, b), (&m_t, &modulus), (&claimed_t, claimed)] {
                for (t, v) in targets.limbs.iter().zip(biguint_to_limbs(value, &SMALL)?) {
                    pw.set_target(*t, F::from_canonical_u64(v))?;
                }
            }
            Ok(pw)
        };
        for (a, b) in &pairs {
            let expected = (a * b) % &modulus;
            assert!(is_satisfiable(&data, assign(a, b, &expected)?), "{a:x} * {b:x}");
        }

        let (a, b) = &pairs[1];
        let expected = (a * b) % &modulus;
        assert!(!is_satisfiable(&data, assign(a, b, &(&expected + 1u8))?));
        Ok(())
    }

    #[test]
    fn pow_65537_matches_modpow() -> Result<()> {
        let modulus = BigUint::parse_bytes(b"d3c2b1a0f9e8d7c6b5a4938271605f4b", 16)
            .ok_or_else(|| anyhow::anyhow!("hex"))?;
        let base = BigUint::parse_bytes(b"7e1d5c9b3a2f4e6d8c0b1a2938475665", 16)
            .ok_or_else(|| anyhow::anyhow!("hex"))?;
        let expected = base.modpow(&BigUint::from(65537u32), &modulus);

        let ctx = ModMulContext::<F>::new(SMALL)?;
        let mut builder = new_builder();
        let base_t = add_virtual_biguint(&mut builder, &SMALL);
        let modulus_t = add_virtual_biguint(&mut builder, &SMALL);
        let out = ctx.pow_65537(&mut builder, &base_t, &modulus_t);
        assert_biguint_lt(&mut builder, &out, &modulus_t, SMALL.limb_bits);
        let expected_t = add_virtual_biguint(&mut builder, &SMALL);
        for (o, e) in out.limbs.iter().zip(&expected_t.limbs) {
            builder.connect(*o, *e);
        }
        let data = builder.build::<Cfg>();

        let assign = |claimed: &BigUint| -> Result<PartialWitness<F>> {
            let mut pw = PartialWitness::new();
            for (targets, value) in [
                (&base_t, &base),
                (&modulus_t, &modulus),
                (&expected_t, claimed),
            ] {
                for (t, v) in targets.limbs.iter().zip(biguint_to_limbs(value, &SMALL)?) {
                    pw.set_target(*t, F::from_canonical_u64(v))?;
                }
            }
            Ok(pw)
        };
        assert!(is_satisfiable(&data, assign(&expected)?));
        assert!(!is_satisfiable(&data, assign(&(&expected + 1u8))?));
        Ok(())
    }
}
