//! Cross-encoding substring check: an ASCII excerpt is shown to be what a
//! window of a base64url string decodes to.
//!
//! Base64 packs 3 bytes into 4 symbols, so a window that starts at symbol
//! `j` of an encoded segment starts `6 * j mod 8` bits into a byte boundary.
//! Relative to the segment start that offset is 0, 2 or 4 bits for
//! `j mod 4 = 0, 1, 2`; `j mod 4 = 3` never begins a byte and is rejected.

use plonky2::field::extension::Extendable;
use plonky2::hash::hash_types::RichField;
use plonky2::iop::target::Target;
use plonky2::plonk::circuit_builder::CircuitBuilder;

use crate::utils::base64_decode::{byte_from_bits_msb, decode_b64url_prefix, sextets_to_bits_msb};
use crate::utils::indicators::{
    bits_for, div_rem_const, less_than_vector, masked_assert_eq, one_hot,
};
use crate::utils::slicing::slice_grouped;

/// Encoded symbols needed to cover `ascii_len` bytes at any of the three alignments.
pub fn max_b64_len_for(ascii_len: usize) -> usize {
    (8 * ascii_len + 4).div_ceil(6)
}

/// `(b64_index - segment_start) mod 4`; also enforces `b64_index >= segment_start`.
pub fn b64_alignment_class<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    b64_index: Target,
    segment_start: Target,
    capacity: usize,
) -> Target {
    let rel = builder.sub(b64_index, segment_start);
    let (_, rem) = div_rem_const(builder, rel, 4, bits_for(capacity));
    rem
}

/// Asserts that the first `ascii_len` bytes of `ascii` equal the decoding of
/// `b64[b64_index .. b64_index + b64_len]`, and that the window covers them.
///
/// Returns the alignment class of the window within its segment.
#[allow(clippy::too_many_arguments)]
pub fn assert_ascii_substring_of_b64<F: RichField + Extendable<D>, const D: usize>(
    builder: &mut CircuitBuilder<F, D>,
    b64: &[Target],
    b64_index: Target,
    b64_len: Target,
    segment_start: Target,
    ascii: &[Target],
    ascii_len: Target,
) -> Target {
    let max_b64 = max_b64_len_for(ascii.len()).min(b64.len());
    let window = slice_grouped(builder, b64, b64_index, b64_len, max_b64);
    let sextets = decode_b64url_prefix(builder, &window, b64_len);
    let bits = sextets_to_bits_msb(builder, &sextets);

    let class = b64_alignment_class(builder, b64_index, segment_start, b64.len());
    let class_eq = one_hot(builder, class, 3);

    let live = less_than_vector(builder, ascii_len, ascii.len());
    for (i, (byte, in_range)) in ascii.iter().zip(live).enumerate() {
        let mut decoded = builder.zero();
        for (c, sel) in class_eq.iter().enumerate() {
            let candidate = byte_from_bits_msb(builder, &bits, 8 * i + 2 * c);
            decoded = builder.mul_add(sel.target, candidate, decoded);
        }
        masked_assert_eq(builder, in_range, *byte, decoded);
    }

    // 6 * b64_len >= 2 * class + 8 * ascii_len
    let available = builder.mul_const(F::from_canonical_u64(6), b64_len);
    let used = builder.mul_const(F::from_canonical_u64(8), ascii_len);
    let used = builder.mul_const_add(F::TWO, class, used);
    let slack = builder.sub(available, used);
    builder.range_check(slack, bits_for(6 * max_b64));

    class
}

#[cfg(test)]
mod tests {
    use super::*;
    use plonky2::field::types::Field;
    use crate::utils::testing::{is_satisfiable, new_builder, Cfg, D, F};
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use plonky2::iop::witness::{PartialWitness, WitnessWrite};
    use plonky2::plonk::circuit_data::CircuitData;

    const PAYLOAD: &[u8] = br#"{"iss":"https://accounts.example.com","sub":"110169484474386276334","aud":"client-1"}"#;

    struct Harness {
        data: CircuitData<F, Cfg, D>,
        b64: Vec<Target>,
        b64_index: Target,
        b64_len: Target,
        ascii: Vec<Target>,
        ascii_len: Target,
    }

    fn harness(b64_cap: usize, ascii_cap: usize) -> Harness {
        let mut builder = new_builder();
        let b64 = builder.add_virtual_targets(b64_cap);
        for t in &b64 {
            builder.range_check(*t, 8);
        }
        let b64_index = builder.add_virtual_target();
        let b64_len = builder.add_virtual_target();
        let ascii = builder.add_virtual_targets(ascii_cap);
        let ascii_len = builder.add_virtual_target();
        let start = builder.zero();
        assert_ascii_substring_of_b64(
            &mut builder,
            &b64,
            b64_index,
            b64_len,
            start,
            &ascii,
            ascii_len,
        );
        Harness {
            data: builder.build::<Cfg>(),
            b64,
            b64_index,
            b64_len,
            ascii,
            ascii_len,
        }
    }

    /// Window of the encoding that covers `PAYLOAD[start..start + len]`.
    fn window(start: usize, len: usize) -> (usize, usize) {
        let j0 = 4 * start / 3;
        let j1 = (8 * (start + len)).div_ceil(6);
        (j0, j1 - j0)
    }

    fn witness(
        h: &Harness,
        encoded: &[u8],
        (j, n): (usize, usize),
        excerpt: &[u8],
    ) -> anyhow::Result<PartialWitness<F>> {
        let mut pw = PartialWitness::new();
        for (i, t) in h.b64.iter().enumerate() {
            pw.set_target(*t, F::from_canonical_u8(encoded.get(i).copied().unwrap_or(0)))?;
        }
        pw.set_target(h.b64_index, F::from_canonical_usize(j))?;
        pw.set_target(h.b64_len, F::from_canonical_usize(n))?;
        for (i, t) in h.ascii.iter().enumerate() {
            pw.set_target(*t, F::from_canonical_u8(excerpt.get(i).copied().unwrap_or(0)))?;
        }
        pw.set_target(h.ascii_len, F::from_canonical_usize(excerpt.len()))?;
        Ok(pw)
    }

    #[test]
    fn excerpts_at_every_alignment() -> anyhow::Result<()> {
        let encoded = URL_SAFE_NO_PAD.encode(PAYLOAD);
        let h = harness(encoded.len(), 24);
        // byte offsets 0, 1, 2 land on each of the three classes
        for (start, len) in [(0, 7), (1, 6), (2, 24), (39, 23), (65, 19)] {
            let excerpt = &PAYLOAD[start..start + len];
            let pw = witness(&h, encoded.as_bytes(), window(start, len), excerpt)?;
            assert!(is_satisfiable(&h.data, pw), "start={start} len={len}");
        }
        Ok(())
    }

    #[test]
    fn rejects_misaligned_or_short_windows() -> anyhow::Result<()> {
        let encoded = URL_SAFE_NO_PAD.encode(PAYLOAD);
        let h = harness(encoded.len(), 24);
        let excerpt = &PAYLOAD[39..62];

        let (j, n) = window(39, 23);
        let pw = witness(&h, encoded.as_bytes(), (j + 1, n), excerpt)?;
        assert!(!is_satisfiable(&h.data, pw));

        let pw = witness(&h, encoded.as_bytes(), (j, n - 2), excerpt)?;
        assert!(!is_satisfiable(&h.data, pw));

        let mut tampered = excerpt.to_vec();
        tampered[4] ^= 0x20;
        let pw = witness(&h, encoded.as_bytes(), (j, n), &tampered)?;
        assert!(!is_satisfiable(&h.data, pw));
        Ok(())
    }
}
