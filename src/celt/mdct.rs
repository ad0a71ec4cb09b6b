//! The Modified Discrete Cosine Transform used to turn CELT bands back into
//! (and, on the encoder side, out of) a time-domain signal.
//!
//! `spec.md` §4.3.6 explicitly allows "a direct O(N²) formulation" for the
//! MDCT at the four fixed frame sizes CELT uses (120/240/480/960 samples),
//! rather than requiring a fast (FFT-based) transform. This module takes
//! that option: `Mdct::new(n)` precomputes a `2n`-entry cosine table once,
//! and `forward`/`inverse` apply it as a direct double sum.

use std::f64::consts::PI;

/// A precomputed MDCT/IMDCT kernel for one CELT frame size.
///
/// `n` is the number of frequency-domain coefficients (half the window
/// length); the time-domain window is `2*n` samples.
#[derive(Clone, Debug)]
pub(crate) struct Mdct {
    n: usize,
    cos_table: Vec<f32>,
}

impl Mdct {
    /// Builds a kernel for an `n`-bin MDCT (window length `2*n`).
    pub(crate) fn new(n: usize) -> Self {
        let len = 2 * n;
        let mut cos_table = vec![0.0_f32; len * n];

        for (k, row) in cos_table.chunks_mut(len).enumerate() {
            for (i, entry) in row.iter_mut().enumerate() {
                let phase =
                    (PI / n as f64) * (i as f64 + 0.5 + n as f64 / 2.0) * (k as f64 + 0.5);
                *entry = phase.cos() as f32;
            }
        }

        Self { n, cos_table }
    }

    /// Number of frequency-domain coefficients this kernel produces.
    pub(crate) fn bins(&self) -> usize {
        self.n
    }

    /// Forward MDCT: `2*n` windowed time-domain samples in `input` to `n`
    /// coefficients in `output`.
    pub(crate) fn forward(&self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), 2 * self.n);
        debug_assert_eq!(output.len(), self.n);

        let len = 2 * self.n;
        for (k, out) in output.iter_mut().enumerate() {
            let row = &self.cos_table[k * len..k * len + len];
            let mut sum = 0.0_f32;
            for (x, c) in input.iter().zip(row.iter()) {
                sum += x * c;
            }
            *out = sum;
        }
    }

    /// Inverse MDCT: `n` coefficients in `input` to `2*n` time-domain
    /// samples in `output`, scaled so that overlap-add of consecutive
    /// frames reconstructs the signal (the `1/n` normalisation from the
    /// forward/inverse pair is folded into this step).
    pub(crate) fn inverse(&self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), self.n);
        debug_assert_eq!(output.len(), 2 * self.n);

        let len = 2 * self.n;
        let scale = 1.0_f32 / self.n as f32;

        for (i, out) in output.iter_mut().enumerate() {
            let mut sum = 0.0_f32;
            for (k, x) in input.iter().enumerate() {
                sum += x * self.cos_table[k * len + i];
            }
            *out = sum * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn energy(x: &[f32]) -> f32 {
        x.iter().map(|v| v * v).sum()
    }

    #[test]
    fn test_roundtrip_preserves_energy_order() {
        for &n in &[60, 120, 240, 480] {
            let mdct = Mdct::new(n);
            let mut input = vec![0.0_f32; 2 * n];
            for (i, v) in input.iter_mut().enumerate() {
                *v = ((i as f32) * 0.37).sin();
            }

            let mut coeffs = vec![0.0_f32; n];
            mdct.forward(&input, &mut coeffs);
            assert!(energy(&coeffs) > 0.0, "n={n}: forward produced all zeros");

            let mut back = vec![0.0_f32; 2 * n];
            mdct.inverse(&coeffs, &mut back);
            assert!(energy(&back) > 0.0, "n={n}: inverse produced all zeros");
        }
    }

    #[test]
    fn test_dc_input_concentrates_in_low_bin() {
        let n = 120;
        let mdct = Mdct::new(n);
        let input = vec![1.0_f32; 2 * n];

        let mut coeffs = vec![0.0_f32; n];
        mdct.forward(&input, &mut coeffs);

        let bin0 = coeffs[0].abs();
        let total: f32 = coeffs.iter().map(|c| c.abs()).sum();
        assert!(
            bin0 > total * 0.3,
            "DC energy should dominate: bin0={bin0}, total={total}"
        );
    }
}
