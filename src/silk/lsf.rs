//! Line spectral frequency (NLSF) coding.
//!
//! `spec.md` §4.2.1: a two-stage vector quantizer reconstructs normalized
//! line spectral frequencies from the bitstream — a stage-1 codebook vector
//! selects the coarse spectral shape, and a per-coefficient stage-2 residual
//! refines it. The reconstructed vector is then converted to LPC
//! coefficients through the standard line-spectral-polynomial factorization:
//! split the NLSFs into even/odd sets, build the symmetric `P(z)` and
//! antisymmetric `Q(z)` polynomials factor-by-factor from
//! `1 - 2*cos(nlsf[i]*pi)*z^-1 + z^-2` (the same recurrence the reference's
//! fixed-point Chebyshev-series `NLSF2A` implements, evaluated here directly
//! in floating point since bit-exactness with the reference encoder is out
//! of scope — `spec.md` §1), then combine `A(z) = (P(z) + Q(z)) / 2`.

use crate::encoder_error::EncoderError;
use crate::range_coder::{RangeDecoder, RangeEncoder};
use std::f32::consts::PI;

/// LPC order used for every bandwidth (the reference varies this between 10
/// and 16 depending on bandwidth; fixing it at 16 is a deliberate
/// simplification noted in `DESIGN.md`).
pub(crate) const NLSF_ORDER: usize = 16;
const STAGE1_COUNT: usize = 32;
const STAGE2_LEVELS: usize = 8;
const MIN_GAP: f32 = 1.0 / (NLSF_ORDER as f32 * 4.0);

/// Builds the `index`-th stage-1 codebook vector: a monotonically increasing
/// set of `NLSF_ORDER` normalized frequencies whose spacing and overall tilt
/// vary with `index`, the way the reference's per-bandwidth NLSF codebooks
/// (e.g. `silk_NLSF_CB1_WB`) span genuinely distinct spectral shapes instead
/// of a single shape reused at every index.
fn stage1_vector(index: usize) -> [f32; NLSF_ORDER] {
    let spread = 0.55 + 0.9 * (index as f32 / (STAGE1_COUNT - 1) as f32);
    let tilt = (index as f32 / (STAGE1_COUNT - 1) as f32) - 0.5;
    let mut v = [0.0_f32; NLSF_ORDER];
    for (i, slot) in v.iter_mut().enumerate() {
        let t = (i as f32 + 1.0) / (NLSF_ORDER as f32 + 1.0);
        *slot = (t.powf(spread) + tilt * t * (1.0 - t)).clamp(0.0, 1.0);
    }
    v
}

/// The NLSF a newly constructed or freshly reset decoder predicts from —
/// the mid codebook entry, used before any frame has been decoded.
pub(crate) fn neutral_nlsf() -> [f32; NLSF_ORDER] {
    stage1_vector(STAGE1_COUNT / 2)
}

/// Non-increasing ICDF over the `STAGE1_COUNT` stage-1 codebook entries.
/// Flat (every codeword equally likely): the reference biases this toward
/// the codewords that occur most often in natural speech, which this
/// crate's fixed heuristic encoder does not model.
fn stage1_icdf() -> [u8; STAGE1_COUNT] {
    let mut table = [0_u8; STAGE1_COUNT];
    let step = 256 / STAGE1_COUNT;
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = (256 - (i + 1) * step) as u8;
    }
    table[STAGE1_COUNT - 1] = 0;
    table
}

/// Non-increasing ICDF over the `STAGE2_LEVELS` stage-2 residual levels,
/// halving the remaining probability mass at each step so small residuals
/// near the stage-1 codeword are more likely than large ones — distinct in
/// both shape and role from [`stage1_icdf`], unlike the single table this
/// module used to reuse for both stages.
fn stage2_icdf() -> [u8; STAGE2_LEVELS] {
    let mut table = [0_u8; STAGE2_LEVELS];
    let mut remaining: u32 = 256;
    for slot in table.iter_mut() {
        let step = (remaining / 2).max(1);
        remaining = remaining.saturating_sub(step);
        *slot = remaining as u8;
    }
    table[STAGE2_LEVELS - 1] = 0;
    table
}

/// Per-coefficient stage-2 step size: lower-frequency coefficients get finer
/// resolution, matching the reference's frequency-dependent weighting of
/// NLSF quantization error.
fn stage2_step(coeff: usize) -> f32 {
    let weight = 1.0 - 0.5 * (coeff as f32 / (NLSF_ORDER as f32 - 1.0));
    0.015 * weight
}

fn stabilize(nlsf: &mut [f32; NLSF_ORDER]) {
    for v in nlsf.iter_mut() {
        *v = v.clamp(MIN_GAP * 0.5, 1.0 - MIN_GAP * 0.5);
    }
    for i in 1..NLSF_ORDER {
        if nlsf[i] < nlsf[i - 1] + MIN_GAP {
            nlsf[i] = nlsf[i - 1] + MIN_GAP;
        }
    }
}

/// Decodes a stage-1 codeword followed by `NLSF_ORDER` stage-2 residuals,
/// reconstructing the normalized LSF vector for one SILK sub-block.
pub(crate) fn decode_nlsf(dec: &mut RangeDecoder<'_>) -> [f32; NLSF_ORDER] {
    let stage1_index = dec.decode_icdf(&stage1_icdf(), 8) as usize;
    let mut nlsf = stage1_vector(stage1_index);

    let icdf2 = stage2_icdf();
    for (i, slot) in nlsf.iter_mut().enumerate() {
        let level = dec.decode_icdf(&icdf2, 8) as i32 - (STAGE2_LEVELS as i32) / 2;
        *slot += level as f32 * stage2_step(i);
    }

    stabilize(&mut nlsf);
    nlsf
}

/// Encodes `target` as the nearest stage-1 codeword plus per-coefficient
/// stage-2 residuals — the analysis-by-synthesis nearest-codeword search
/// that is the encoder-side half of a residual vector quantizer.
pub(crate) fn encode_nlsf(enc: &mut RangeEncoder<'_>, target: &[f32; NLSF_ORDER]) -> Result<(), EncoderError> {
    let mut best_index = 0_usize;
    let mut best_error = f32::MAX;
    for index in 0..STAGE1_COUNT {
        let candidate = stage1_vector(index);
        let error: f32 = candidate.iter().zip(target.iter()).map(|(c, t)| (c - t) * (c - t)).sum();
        if error < best_error {
            best_error = error;
            best_index = index;
        }
    }

    enc.encode_icdf(best_index, &stage1_icdf(), 8)?;

    let base = stage1_vector(best_index);
    let icdf2 = stage2_icdf();
    for i in 0..NLSF_ORDER {
        let step = stage2_step(i);
        let raw = (target[i] - base[i]) / step;
        let half = STAGE2_LEVELS as f32 / 2.0;
        let level = raw.round().clamp(-half, half - 1.0);
        let symbol = (level as i32 + half as i32) as usize;
        enc.encode_icdf(symbol, &icdf2, 8)?;
    }

    Ok(())
}

fn poly_mul(a: &[f32], b: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0_f32; a.len() + b.len() - 1];
    for (i, &ai) in a.iter().enumerate() {
        for (j, &bj) in b.iter().enumerate() {
            out[i + j] += ai * bj;
        }
    }
    out
}

/// Converts a validated NLSF vector to `NLSF_ORDER` direct-form LPC
/// coefficients. See the module doc comment for the factorization this
/// implements.
pub(crate) fn nlsf_to_lpc(nlsf: &[f32; NLSF_ORDER]) -> Vec<f32> {
    let mut p = vec![1.0_f32, 1.0]; // (1 + z^-1), picks up the even-indexed roots
    let mut q = vec![1.0_f32, -1.0]; // (1 - z^-1), picks up the odd-indexed roots

    for (i, &w) in nlsf.iter().enumerate() {
        let cos_theta = (w * PI).cos();
        let factor = [1.0_f32, -2.0 * cos_theta, 1.0];
        if i % 2 == 0 {
            p = poly_mul(&p, &factor);
        } else {
            q = poly_mul(&q, &factor);
        }
    }

    let order = nlsf.len();
    let mut a = vec![0.0_f32; order + 1];
    for (i, slot) in a.iter_mut().enumerate() {
        let pv = p.get(i).copied().unwrap_or(0.0);
        let qv = q.get(i).copied().unwrap_or(0.0);
        *slot = 0.5 * (pv + qv);
    }

    // `a[0]` is ~1 by construction. The synthesis filter in
    // `crate::silk::synthesis` uses `y[n] = e[n] + sum a[i] * y[n-1-i]`, the
    // sign-flip of the `1 + sum a[i] z^-i` convention this combination
    // produces, so negate before returning.
    a[1..=order].iter().map(|&c| -c).collect()
}

pub(crate) fn validate_nlsf(nlsf: &[f32; NLSF_ORDER]) -> bool {
    nlsf.iter().all(|&v| v.is_finite() && v > 0.0 && v < 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoded_nlsf_is_monotone_and_bounded() {
        let payload = [0xA5_u8, 0x3C, 0x91, 0x0F, 0x77, 0x22, 0x88, 0x4D, 0x13, 0x9E];
        let mut dec = RangeDecoder::new(&payload);
        let nlsf = decode_nlsf(&mut dec);
        assert!(validate_nlsf(&nlsf));
        for i in 1..NLSF_ORDER {
            assert!(nlsf[i] > nlsf[i - 1]);
        }
    }

    #[test]
    fn test_stage1_codewords_are_distinct() {
        let a = stage1_vector(0);
        let b = stage1_vector(STAGE1_COUNT - 1);
        let diff: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum();
        assert!(diff > 0.5, "stage-1 codewords collapsed to the same shape");
    }

    #[test]
    fn test_lpc_from_nlsf_is_finite() {
        let nlsf = stage1_vector(16);
        let lpc = nlsf_to_lpc(&nlsf);
        assert_eq!(lpc.len(), NLSF_ORDER);
        assert!(lpc.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_encode_nlsf_roundtrips_close_to_target() {
        let target = stage1_vector(9);
        let mut storage = vec![0_u8; 64];
        let mut enc = RangeEncoder::new(&mut storage);
        encode_nlsf(&mut enc, &target).unwrap();
        enc.done().unwrap();
        drop(enc);

        let mut dec = RangeDecoder::new(&storage);
        let decoded = decode_nlsf(&mut dec);
        for i in 0..NLSF_ORDER {
            assert!((decoded[i] - target[i]).abs() < 0.05);
        }
    }
}
