//! LTP and LPC synthesis, and stereo mid/side unmixing.
//!
//! `spec.md` §4.2.3. Voiced subframes run the excitation through a 5-tap
//! long-term (pitch) predictor before the short-term LPC filter; unvoiced
//! subframes skip straight to the LPC cascade. Stereo frames additionally
//! carry a quantized prediction weight: the side channel is coded as the
//! residual after predicting it from mid, so reconstruction has to add that
//! prediction back before combining into left/right.

use crate::math::clamp;

/// Per-channel synthesis state carried across subframes/frames: the LPC
/// history (`order` samples) and a longer pitch-lag history for the LTP
/// filter.
#[derive(Clone, Debug)]
pub(crate) struct SynthesisState {
    lpc_history: Vec<f32>,
    ltp_history: Vec<f32>,
}

const MAX_PITCH_LAG: usize = 400;

/// Bit width of the quantized stereo prediction weight field.
pub(crate) const STEREO_WEIGHT_BITS: u32 = 5;
const STEREO_WEIGHT_HALF: i32 = 1 << (STEREO_WEIGHT_BITS - 1);
const STEREO_WEIGHT_SCALE: f32 = (1 << STEREO_WEIGHT_BITS) as f32;

/// Dequantizes a stereo prediction weight index (`0..2^STEREO_WEIGHT_BITS`)
/// into the `[-0.5, 0.46875]` weight [`unmix_stereo`]/[`mix_stereo`] use.
pub(crate) fn dequantize_stereo_weight(index: u32) -> f32 {
    (index as i32 - STEREO_WEIGHT_HALF) as f32 / STEREO_WEIGHT_SCALE
}

/// Quantizes a raw stereo prediction weight back to its bitstream index,
/// the inverse of [`dequantize_stereo_weight`].
pub(crate) fn quantize_stereo_weight(weight: f32) -> u32 {
    let raw = (weight * STEREO_WEIGHT_SCALE).round() as i32 + STEREO_WEIGHT_HALF;
    raw.clamp(0, (1 << STEREO_WEIGHT_BITS) - 1) as u32
}

impl SynthesisState {
    pub(crate) fn new(order: usize) -> Self {
        Self {
            lpc_history: vec![0.0_f32; order],
            ltp_history: vec![0.0_f32; MAX_PITCH_LAG + 4],
        }
    }

    pub(crate) fn reset(&mut self) {
        self.lpc_history.iter_mut().for_each(|x| *x = 0.0);
        self.ltp_history.iter_mut().for_each(|x| *x = 0.0);
    }

    /// Runs the LTP (if `voiced`) then LPC synthesis filter over
    /// `excitation`, writing `excitation.len()` output samples into `out`
    /// and updating history for the next call.
    pub(crate) fn synthesize(
        &mut self,
        excitation: &[f32],
        lpc: &[f32],
        ltp_taps: &[f32; 5],
        pitch_lag: usize,
        voiced: bool,
        out: &mut [f32],
    ) {
        let order = lpc.len();
        let n = excitation.len();

        for i in 0..n {
            let driven = if voiced && pitch_lag >= 2 {
                let lag = pitch_lag.min(self.ltp_history.len() - 2);
                let mut pred = 0.0_f32;
                for (tap_idx, &tap) in ltp_taps.iter().enumerate() {
                    let offset = lag + 2 - tap_idx as isize as usize;
                    let idx = self.ltp_history.len() as isize - 1 - offset as isize;
                    if idx >= 0 {
                        pred += tap * self.ltp_history[idx as usize];
                    }
                }
                excitation[i] + pred
            } else {
                excitation[i]
            };

            let mut predicted = 0.0_f32;
            for (j, &a) in lpc.iter().enumerate() {
                predicted += a * self.lpc_history[order - 1 - j];
            }
            let y = clamp(driven + predicted, -32768.0, 32767.0);

            self.lpc_history.rotate_left(1);
            self.lpc_history[order - 1] = y;

            self.ltp_history.rotate_left(1);
            let last = self.ltp_history.len() - 1;
            self.ltp_history[last] = y;

            out[i] = y;
        }
    }
}

/// Unmixes a decoded mid/side pair into left/right samples, undoing the
/// encoder's stereo prediction: the side channel was coded as
/// `raw_side - weight * mid`, so reconstruction adds `weight * mid` back
/// before the usual sum/difference combination (`left = mid + side`,
/// `right = mid - side`).
pub(crate) fn unmix_stereo(mid: &[f32], side: &[f32], weight: f32, left: &mut [f32], right: &mut [f32]) {
    for i in 0..mid.len() {
        let coded_side = if i < side.len() { side[i] } else { 0.0 };
        let s = coded_side + weight * mid[i];
        left[i] = mid[i] + s;
        right[i] = mid[i] - s;
    }
}

/// Mixes a stereo pair down into mid/side channels using `weight` as the
/// stereo prediction weight (the encoder-side inverse of [`unmix_stereo`]):
/// `side` is the residual left over after predicting the raw side signal
/// from mid.
pub(crate) fn mix_stereo(left: &[f32], right: &[f32], weight: f32, mid: &mut [f32], side: &mut [f32]) {
    for i in 0..left.len() {
        let m = 0.5 * (left[i] + right[i]);
        let raw_side = 0.5 * (left[i] - right[i]);
        mid[i] = m;
        side[i] = raw_side - weight * m;
    }
}

/// Estimates the stereo prediction weight that best predicts the raw side
/// channel from mid (a least-squares projection), clamped to the range the
/// quantized bitstream field can represent.
pub(crate) fn estimate_stereo_weight(left: &[f32], right: &[f32]) -> f32 {
    let mut mid_energy = 0.0_f32;
    let mut cross = 0.0_f32;
    for i in 0..left.len() {
        let m = 0.5 * (left[i] + right[i]);
        let s = 0.5 * (left[i] - right[i]);
        mid_energy += m * m;
        cross += m * s;
    }
    if mid_energy < 1e-6 {
        0.0
    } else {
        let half = STEREO_WEIGHT_HALF as f32 / STEREO_WEIGHT_SCALE;
        (cross / mid_energy).clamp(-half, half - 1.0 / STEREO_WEIGHT_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unvoiced_synthesis_matches_lpc_only() {
        let mut state = SynthesisState::new(2);
        let lpc = [0.3_f32, -0.1];
        let excitation = [1.0_f32, 0.0, 0.0, 0.0];
        let mut out = [0.0_f32; 4];
        state.synthesize(&excitation, &lpc, &[0.0; 5], 0, false, &mut out);
        assert!(out.iter().all(|v| v.is_finite()));
        assert_eq!(out[0], 1.0);
    }

    #[test]
    fn test_stereo_roundtrip_with_zero_weight() {
        let left = [1.0_f32, 2.0, -3.0];
        let right = [0.5_f32, -1.0, 4.0];
        let mut mid = [0.0_f32; 3];
        let mut side = [0.0_f32; 3];
        mix_stereo(&left, &right, 0.0, &mut mid, &mut side);

        let mut left2 = [0.0_f32; 3];
        let mut right2 = [0.0_f32; 3];
        unmix_stereo(&mid, &side, 0.0, &mut left2, &mut right2);

        for i in 0..3 {
            assert!((left2[i] - left[i]).abs() < 1e-5);
            assert!((right2[i] - right[i]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_stereo_roundtrip_with_estimated_weight() {
        let left: Vec<f32> = (0..64).map(|i| (i as f32 * 0.2).sin()).collect();
        let right: Vec<f32> = (0..64).map(|i| (i as f32 * 0.2).sin() * 0.8 + 0.1).collect();
        let weight = estimate_stereo_weight(&left, &right);
        let quantized_index = quantize_stereo_weight(weight);
        let weight_q = dequantize_stereo_weight(quantized_index);

        let mut mid = vec![0.0_f32; 64];
        let mut side = vec![0.0_f32; 64];
        mix_stereo(&left, &right, weight_q, &mut mid, &mut side);

        let mut left2 = vec![0.0_f32; 64];
        let mut right2 = vec![0.0_f32; 64];
        unmix_stereo(&mid, &side, weight_q, &mut left2, &mut right2);

        for i in 0..64 {
            assert!((left2[i] - left[i]).abs() < 1e-4);
            assert!((right2[i] - right[i]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_quantize_weight_roundtrips_through_dequantize() {
        for &w in &[-0.5_f32, -0.1, 0.0, 0.2, 0.46] {
            let idx = quantize_stereo_weight(w);
            let back = dequantize_stereo_weight(idx);
            assert!((back - w).abs() < 1.0 / STEREO_WEIGHT_SCALE + 1e-6);
        }
    }
}
