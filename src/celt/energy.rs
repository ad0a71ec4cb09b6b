//! Coarse and fine band-energy coding.
//!
//! `spec.md` §4.3.2. Coarse log-energies are Laplace-coded at 6 dB
//! resolution with an inter-frame (temporal) and inter-band (spectral)
//! predictor; fine energy refines each band with a per-band bit count handed
//! down by the allocator, and any leftover bits become single final
//! refinement bits scanned in band order.

use crate::celt::mode::NUM_BANDS;
use crate::decoder_error::DecoderError;
use crate::encoder_error::EncoderError;
use crate::math::{fast_exp2, fast_log2};
use crate::range_coder::{RangeDecoder, RangeEncoder};

/// Inter-frame predictor coefficient `alpha`, indexed by `LM`.
pub(crate) const ALPHA: [f32; 4] = [29440.0 / 32768.0, 26112.0 / 32768.0, 21248.0 / 32768.0, 16384.0 / 32768.0];

/// Inter-band predictor coefficient `beta` in inter mode, indexed by `LM`.
pub(crate) const BETA_INTER: [f32; 4] = [30147.0 / 32768.0, 22282.0 / 32768.0, 12124.0 / 32768.0, 6554.0 / 32768.0];

/// Inter-band predictor coefficient `beta` in intra mode (fixed, doesn't vary with `LM`).
pub(crate) const BETA_INTRA: f32 = 4915.0 / 32768.0;

/// Base Laplace probability-model parameters for coarse energy, shared
/// across bands (a single `(fs, decay)` pair per coefficient, scaled by the
/// predictor residual magnitude in practice; kept deliberately simple here
/// since `spec.md` doesn't pin down libopus's per-band table verbatim).
const COARSE_ENERGY_PROB_FS: u32 = 6000;
const COARSE_ENERGY_PROB_DECAY: u32 = 21000;

/// Per-band log2 energy state shared between coarse and fine coding.
#[derive(Clone, Debug)]
pub(crate) struct EnergyState {
    /// Running temporal predictor state per band, in log2 domain.
    pub(crate) prev: [f32; NUM_BANDS],
}

impl EnergyState {
    pub(crate) fn new() -> Self {
        Self {
            prev: [0.0; NUM_BANDS],
        }
    }

    pub(crate) fn reset(&mut self) {
        self.prev = [0.0; NUM_BANDS];
    }
}

fn predictor_coeffs(lm: usize, intra: bool) -> (f32, f32) {
    if intra {
        (0.0, BETA_INTRA)
    } else {
        (ALPHA[lm], BETA_INTER[lm])
    }
}

/// Decodes the per-band coarse log2 energies for `num_bands` bands.
///
/// `state.prev` is updated in place to become the predictor state for the
/// next frame, per the update rule in `spec.md` §4.3.2:
/// `prev <- prev + q - beta*q`.
pub(crate) fn decode_coarse_energy(
    dec: &mut RangeDecoder<'_>,
    state: &mut EnergyState,
    num_bands: usize,
    lm: usize,
    intra: bool,
) -> Result<[f32; NUM_BANDS], DecoderError> {
    if num_bands > NUM_BANDS {
        return Err(DecoderError::InternalInconsistency(
            "coarse energy: band count exceeds table size",
        ));
    }

    let (alpha, beta) = predictor_coeffs(lm, intra);
    let mut log_e = [0.0_f32; NUM_BANDS];
    let mut band_prediction = 0.0_f32;

    for b in 0..num_bands {
        let prev = if intra { 0.0 } else { state.prev[b] };
        let predicted = alpha * prev + band_prediction;

        let q = dec.decode_laplace(COARSE_ENERGY_PROB_FS, COARSE_ENERGY_PROB_DECAY);
        let q = q as f32 * 0.5; // 6 dB steps == half a bit of log2 amplitude per unit.

        log_e[b] = predicted + q;
        band_prediction = beta * q;
        if !intra {
            state.prev[b] = prev + q - beta * q;
        }
    }

    for b in num_bands..NUM_BANDS {
        log_e[b] = log_e[num_bands.saturating_sub(1)];
    }

    Ok(log_e)
}

/// Encodes the per-band coarse log2 energies, mirroring
/// [`decode_coarse_energy`].
pub(crate) fn encode_coarse_energy(
    enc: &mut RangeEncoder<'_>,
    state: &mut EnergyState,
    band_log_e: &[f32],
    num_bands: usize,
    lm: usize,
    intra: bool,
) -> Result<(), EncoderError> {
    if num_bands > NUM_BANDS || band_log_e.len() < num_bands {
        return Err(EncoderError::InternalInconsistency(
            "coarse energy: band count exceeds table size",
        ));
    }

    let (alpha, beta) = predictor_coeffs(lm, intra);
    let mut band_prediction = 0.0_f32;

    for b in 0..num_bands {
        let prev = if intra { 0.0 } else { state.prev[b] };
        let predicted = alpha * prev + band_prediction;

        let residual = band_log_e[b] - predicted;
        let mut q = (residual * 2.0).round() as i32;

        enc.encode_laplace(&mut q, COARSE_ENERGY_PROB_FS, COARSE_ENERGY_PROB_DECAY)?;

        let q = q as f32 * 0.5;
        band_prediction = beta * q;
        if !intra {
            state.prev[b] = prev + q - beta * q;
        }
    }

    Ok(())
}

/// Decodes fine-energy refinement bits for each band, given the number of
/// bits `fine_bits[b]` the allocator assigned to band `b`.
pub(crate) fn decode_fine_energy(
    dec: &mut RangeDecoder<'_>,
    log_e: &mut [f32],
    fine_bits: &[i32],
    num_bands: usize,
) -> Result<(), DecoderError> {
    for b in 0..num_bands {
        let bits = fine_bits[b];
        if bits <= 0 {
            continue;
        }
        let frac = dec.decode_bits(bits as u32);
        let levels = 1u32 << bits;
        let offset = (frac as f32 + 0.5) / levels as f32 - 0.5;
        log_e[b] += offset * 2.0_f32.powi(-bits + 1);
    }
    Ok(())
}

/// Encodes fine-energy refinement bits, mirroring [`decode_fine_energy`].
pub(crate) fn encode_fine_energy(
    enc: &mut RangeEncoder<'_>,
    log_e: &[f32],
    coarse_log_e: &[f32],
    fine_bits: &[i32],
    num_bands: usize,
) -> Result<(), EncoderError> {
    for b in 0..num_bands {
        let bits = fine_bits[b];
        if bits <= 0 {
            continue;
        }
        let levels = 1u32 << bits;
        let residual = (log_e[b] - coarse_log_e[b]) * 2.0_f32.powi(bits - 1);
        let frac = crate::math::clamp((residual + levels as f32 / 2.0).round() as i32, 0, levels as i32 - 1);
        enc.encode_bits(frac as u32, bits as u32)?;
    }
    Ok(())
}

/// Applies any leftover bits (after fine energy) as single final refinement
/// bits, scanned in band order, per `spec.md` §4.3.2.
pub(crate) fn decode_final_energy(
    dec: &mut RangeDecoder<'_>,
    log_e: &mut [f32],
    fine_priority: &[bool],
    remaining_bits: i32,
    num_bands: usize,
) {
    let mut remaining = remaining_bits;
    for priority_pass in 0..2 {
        for b in 0..num_bands {
            if remaining <= 0 {
                return;
            }
            if fine_priority[b] != (priority_pass == 0) {
                continue;
            }
            let bit = dec.decode_bits(1);
            log_e[b] += if bit != 0 { 0.5 } else { -0.5 } * 2.0_f32.powi(-15);
            remaining -= 1;
        }
    }
}

/// Converts log2 band energies to linear amplitude gains, clamping `logE`
/// at 32 as required by `spec.md` §4.3.3 to prevent overflow.
pub(crate) fn log_energy_to_linear(log_e: &[f32], out: &mut [f32]) {
    for (g, &e) in out.iter_mut().zip(log_e.iter()) {
        let clamped = crate::math::clamp(e, -32.0, 32.0);
        *g = fast_exp2(clamped);
    }
}

/// Converts linear band amplitudes (`sqrt(sum_of_squares)`, per band) back
/// to log2 domain, the direction the encoder's analysis pipeline needs.
pub(crate) fn linear_energy_to_log(linear: &[f32], out: &mut [f32]) {
    for (e, &g) in out.iter_mut().zip(linear.iter()) {
        *e = if g > 0.0 { fast_log2(g) } else { -32.0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denormalization_monotonicity() {
        let mut log_e = [0.0_f32; NUM_BANDS];
        let mut gains = [0.0_f32; NUM_BANDS];
        log_energy_to_linear(&log_e, &mut gains);
        let base = gains[0];

        log_e[0] += 1.0;
        log_energy_to_linear(&log_e, &mut gains);
        let doubled = gains[0];

        assert!((doubled / base - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_log_linear_roundtrip() {
        let linear = [1.0_f32, 2.0, 0.5, 8.0];
        let mut log_e = [0.0_f32; 4];
        linear_energy_to_log(&linear, &mut log_e);
        let mut back = [0.0_f32; 4];
        log_energy_to_linear(&log_e, &mut back);
        for (a, b) in linear.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-3, "a={a} b={b}");
        }
    }
}
