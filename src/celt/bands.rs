//! Band normalization and denormalization.
//!
//! `spec.md` §4.3.3. Denormalization multiplies a unit-L2-norm PVQ shape by
//! the band's linear amplitude. The encoder direction must use the
//! **original** linear amplitude (`sqrt(sum_of_squares)` of the raw MDCT
//! coefficients), never the amplitude reconstructed from the quantized log
//! energy — round-tripping through log2 there is the historical bug noted
//! in `spec.md` §9.2.

use crate::celt::mode::band_bin;

/// Normalizes each band of `coeffs` (length `frame_size`) to unit L2 norm in
/// place, writing the pre-normalization linear amplitude of each band into
/// `band_amplitude`.
pub(crate) fn normalize_bands(coeffs: &mut [f32], band_amplitude: &mut [f32], num_bands: usize, lm: usize) {
    for b in 0..num_bands {
        let lo = band_bin(b, lm);
        let hi = band_bin(b + 1, lm).min(coeffs.len());
        if hi <= lo {
            band_amplitude[b] = 0.0;
            continue;
        }

        let sum_sq: f32 = coeffs[lo..hi].iter().map(|x| x * x).sum();
        let amp = sum_sq.sqrt();
        band_amplitude[b] = amp;

        if amp > 0.0 {
            let inv = 1.0 / amp;
            for x in &mut coeffs[lo..hi] {
                *x *= inv;
            }
        }
    }
}

/// Denormalizes each band of `shape` (unit-L2-norm PVQ vectors, one per
/// band) back to the time-frequency grid using the decoded linear gain
/// `gain[b] = 2^logE[b]`, writing the result into `coeffs` (length
/// `frame_size`). Bins above the last coded band boundary are left at zero.
pub(crate) fn denormalize_bands(shape: &[f32], gain: &[f32], coeffs: &mut [f32], num_bands: usize, lm: usize) {
    for x in coeffs.iter_mut() {
        *x = 0.0;
    }

    for b in 0..num_bands {
        let lo = band_bin(b, lm);
        let hi = band_bin(b + 1, lm).min(coeffs.len());
        if hi <= lo {
            continue;
        }
        for (dst, src) in coeffs[lo..hi].iter_mut().zip(shape[lo..hi].iter()) {
            *dst = src * gain[b];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celt::mode::{eff_bands, lm_for_frame_size};

    #[test]
    fn test_normalize_denormalize_roundtrip() {
        let lm = lm_for_frame_size(120).unwrap();
        let num_bands = eff_bands(lm);
        let mut coeffs: Vec<f32> = (0..120).map(|i| ((i as f32) * 0.1).sin() * 3.0).collect();
        let original = coeffs.clone();

        let mut amp = vec![0.0_f32; num_bands];
        normalize_bands(&mut coeffs, &mut amp, num_bands, lm);

        for b in 0..num_bands {
            let lo = band_bin(b, lm);
            let hi = band_bin(b + 1, lm).min(coeffs.len());
            if hi <= lo || amp[b] == 0.0 {
                continue;
            }
            let norm: f32 = coeffs[lo..hi].iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "band {b}: norm={norm}");
        }

        let mut back = vec![0.0_f32; 120];
        denormalize_bands(&coeffs, &amp, &mut back, num_bands, lm);

        let last_bin = band_bin(num_bands, lm).min(120);
        for i in 0..last_bin {
            assert!((back[i] - original[i]).abs() < 1e-3, "i={i}");
        }
    }
}
