//! Variable-offset windows over fixed-capacity byte buffers.
//!
//! A slice of `length` bytes starting at a private `index` is assembled as a
//! set of shifted inner products against the one-hot vector of `index`, then
//! masked so positions at or past `length` read as zero. The grouped variant
//! first packs the input into 7-byte words, which shrinks the one-hot vector
//! and the inner products by the group size for long inputs.

use plonky2::field::extension::Extendable;
use plonky2::hash::hash_types::RichField;
use plonky2::iop::target::{BoolTarget, Target};
use plonky2::plonk::circuit_builder::CircuitBuilder;

use crate::utils::indicators::{apply_mask, bits_for, div_rem_const, less_than_vector, one_hot};

/// Bytes per packed group; 56 bits stay below the field's 63 usable bits.
pub const GROUP_BYTES: usize = 7;

/// `out[i] = Σ_j selector[j] * values[j + i]` for `i < out_len`.
pub(crate) fn shifted_select<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    values: &[Target],
    selector: &[BoolTarget],
    out_len: usize,
) -> Vec<Target> {
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let mut acc = builder.zero();
        for (j, s) in selector.iter().enumerate() {
            if let Some(v) = values.get(j + i) {
                acc = builder.mul_add(s.target, *v, acc);
            }
        }
        out.push(acc);
    }
    out
}

/// Enforces `1 <= length <= out_len` and `index + length <= in_len`, and
/// returns the `i < length` mask over the output positions.
fn constrain_window<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    in_len: usize,
    index: Target,
    length: Target,
    out_len: usize,
) -> Vec<BoolTarget> {
    let length_minus_one = builder.add_const(length, F::NEG_ONE);
    builder.range_check(length_minus_one, bits_for(out_len));

    let end = builder.add(index, length);
    let cap = builder.constant(F::from_canonical_usize(in_len));
    let slack = builder.sub(cap, end);
    builder.range_check(slack, bits_for(in_len));

    less_than_vector(builder, length, out_len)
}

/// `input[index .. index + length]`, zero-padded to `out_len`.
pub fn slice<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    input: &[Target],
    index: Target,
    length: Target,
    out_len: usize,
) -> Vec<Target> {
    assert!(out_len > 0 && out_len <= input.len());
    let mask = constrain_window(builder, input.len(), index, length, out_len);
    let eq = one_hot(builder, index, input.len());
    let window = shifted_select(builder, input, &eq, out_len);
    apply_mask(builder, &window, &mask)
}

/// Same result as [`slice`] for inputs whose entries are bytes.
pub fn slice_grouped<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    input: &[Target],
    index: Target,
    length: Target,
    out_len: usize,
) -> Vec<Target> {
    assert!(out_len > 0 && out_len <= input.len());
    let mask = constrain_window(builder, input.len(), index, length, out_len);

    // little-endian bytes inside each group
    let radix = F::from_canonical_u64(256);
    let mut groups = Vec::with_capacity(input.len().div_ceil(GROUP_BYTES));
    for chunk in input.chunks(GROUP_BYTES) {
        let mut acc = builder.zero();
        for byte in chunk.iter().rev() {
            acc = builder.mul_const_add(radix, acc, *byte);
        }
        groups.push(acc);
    }

    let (group_index, offset) = div_rem_const(
        builder,
        index,
        GROUP_BYTES as u64,
        bits_for(groups.len()),
    );
    let eq_group = one_hot(builder, group_index, groups.len());
    let groups_out = out_len.div_ceil(GROUP_BYTES) + 1;
    let group_window = shifted_select(builder, &groups, &eq_group, groups_out);

    let mut bytes = Vec::with_capacity(groups_out * GROUP_BYTES);
    for group in group_window {
        let bits = builder.split_le(group, 8 * GROUP_BYTES);
        for byte_bits in bits.chunks(8) {
            bytes.push(builder.le_sum(byte_bits.iter()));
        }
    }

    let eq_offset = one_hot(builder, offset, GROUP_BYTES);
    let window = shifted_select(builder, &bytes, &eq_offset, out_len);
    apply_mask(builder, &window, &mask)
}

/// `input[0 .. length]`, zero-padded to `out_len`; `length` may be zero.
pub fn slice_from_start<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    input: &[Target],
    length: Target,
    out_len: usize,
) -> Vec<Target> {
    assert!(out_len <= input.len());
    let mask = less_than_vector(builder, length, out_len);
    apply_mask(builder, &input[..out_len], &mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plonky2::field::types::Field;
    use crate::utils::testing::{is_satisfiable, new_builder, Cfg, D, F};
    use plonky2::iop::witness::{PartialWitness, WitnessWrite};
    use plonky2::plonk::circuit_data::CircuitData;

    struct SliceHarness {
        data: CircuitData<F, Cfg, D>,
        input: Vec<Target>,
        index: Target,
        length: Target,
        expected: Vec<Target>,
    }

    fn harness(grouped: bool, in_len: usize, out_len: usize) -> SliceHarness {
        let mut builder = new_builder();
        let input = builder.add_virtual_targets(in_len);
        for t in &input {
            builder.range_check(*t, 8);
        }
        let index = builder.add_virtual_target();
        let length = builder.add_virtual_target();
        let out = if grouped {
            slice_grouped(&mut builder, &input, index, length, out_len)
        } else {
            slice(&mut builder, &input, index, length, out_len)
        };
        let expected = builder.add_virtual_targets(out_len);
        for (o, e) in out.iter().zip(&expected) {
            builder.connect(*o, *e);
        }
        SliceHarness {
            data: builder.build::<Cfg>(),
            input,
            index,
            length,
            expected,
        }
    }

    fn witness(
        h: &SliceHarness,
        bytes: &[u8],
        index: usize,
        length: usize,
        claimed: &[u8],
    ) -> anyhow::Result<PartialWitness<F>> {
        let mut pw = PartialWitness::new();
        for (t, b) in h.input.iter().zip(bytes) {
            pw.set_target(*t, F::from_canonical_u8(*b))?;
        }
        pw.set_target(h.index, F::from_canonical_usize(index))?;
        pw.set_target(h.length, F::from_canonical_usize(length))?;
        for (i, t) in h.expected.iter().enumerate() {
            let v = claimed.get(i).copied().unwrap_or(0);
            pw.set_target(*t, F::from_canonical_u8(v))?;
        }
        Ok(pw)
    }

    #[test]
    fn naive_and_grouped_slices_agree() -> anyhow::Result<()> {
        let bytes: Vec<u8> = (0..40u8).map(|i| i.wrapping_mul(37).wrapping_add(11)).collect();
        for grouped in [false, true] {
            let h = harness(grouped, bytes.len(), 12);
            for (index, length) in [(0, 1), (5, 12), (13, 7), (28, 12), (39, 1)] {
                let want = &bytes[index..index + length];
                let pw = witness(&h, &bytes, index, length, want)?;
                assert!(is_satisfiable(&h.data, pw), "grouped={grouped} index={index} length={length}");
            }
        }
        Ok(())
    }

    #[test]
    fn slice_rejects_out_of_bounds_and_wrong_bytes() -> anyhow::Result<()> {
        let bytes: Vec<u8> = (0..40u8).collect();
        let h = harness(true, bytes.len(), 12);

        // window runs past the end of the input
        let pw = witness(&h, &bytes, 30, 12, &bytes[30..40])?;
        assert!(!is_satisfiable(&h.data, pw));

        // zero-length slices are not allowed
        let pw = witness(&h, &bytes, 3, 0, &[])?;
        assert!(!is_satisfiable(&h.data, pw));

        // claimed content shifted by one
        let pw = witness(&h, &bytes, 8, 5, &bytes[9..14])?;
        assert!(!is_satisfiable(&h.data, pw));
        Ok(())
    }
}
