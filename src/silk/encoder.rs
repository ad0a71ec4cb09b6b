//! Implements the Silk encoder.
//!
//! Mirrors [`crate::silk::decoder::SilkDecoder`]'s per-frame decode order
//! (stereo prediction weight, then per sub-block NLSF/signal-type/
//! quant-offset, then per-subframe voicing/pitch-lag/gain/LTP/excitation)
//! so a packet this encoder writes is decodable by that decoder, including
//! its LBRR redundant-frame support. Per `spec.md` §1's bit-exact-encoder
//! and psychoacoustic-tuning-parity Non-goals, mode and parameter decisions
//! here are fixed heuristics, not a full reference-grade search.

use crate::encoder_error::EncoderError;
use crate::range_coder::RangeEncoder;
use crate::silk::analysis::{analyze_lpc, find_pitch_lag};
use crate::silk::excitation::encode_excitation;
use crate::silk::frame_plan;
use crate::silk::lsf::{encode_nlsf, NLSF_ORDER};
use crate::silk::synthesis::{estimate_stereo_weight, mix_stereo, quantize_stereo_weight, STEREO_WEIGHT_BITS};
use crate::{Channels, SamplingRate};

const MIN_PITCH_LAG: usize = 32;
const MAX_PITCH_LAG: usize = 400;
const GAIN_STEP: f32 = 1.0 / 64.0;
const MAX_GAIN_INDEX: i32 = 63;
const GAIN_DELTA_BITS: u32 = 5;
const GAIN_DELTA_HALF: i32 = 1 << (GAIN_DELTA_BITS - 1);
const LSF_INTERP_BITS: u32 = 3;

/// The Silk encoder.
#[derive(Clone, Debug)]
pub(crate) struct SilkEncoder {
    sampling_rate: SamplingRate,
    channels: Channels,
    fec_enabled: bool,
    pending_redundant: Option<Vec<f32>>,
    prev_gain_index: Vec<i32>,
}

impl SilkEncoder {
    pub(crate) fn new(sampling_rate: SamplingRate, channels: Channels) -> Result<Self, EncoderError> {
        let channel_count = (channels as usize).max(1);
        Ok(Self {
            sampling_rate,
            channels,
            fec_enabled: false,
            pending_redundant: None,
            prev_gain_index: vec![0; channel_count],
        })
    }

    pub(crate) fn reset(&mut self) -> Result<(), EncoderError> {
        self.pending_redundant = None;
        self.prev_gain_index.iter_mut().for_each(|g| *g = 0);
        Ok(())
    }

    /// Enables or disables in-band forward error correction: when enabled,
    /// every encoded frame's LBRR flag is set and carries a redundant copy
    /// of the *previous* frame, so a decoder can recover a lost frame by
    /// asking for FEC on the packet that follows it.
    pub(crate) fn set_fec_enabled(&mut self, enabled: bool) {
        self.fec_enabled = enabled;
        if !enabled {
            self.pending_redundant = None;
        }
    }

    fn encode_channel(&mut self, enc: &mut RangeEncoder<'_>, ch: usize, samples: &[f32]) -> Result<(), EncoderError> {
        let frame_size = samples.len();
        let (num_subblocks, subframes_per_subblock) = frame_plan(self.sampling_rate, frame_size);
        let total_subframes = (num_subblocks * subframes_per_subblock).max(1);
        let samples_per_subframe = frame_size / total_subframes;
        let samples_per_subblock = samples_per_subframe * subframes_per_subblock;

        let mut gain_index = self.prev_gain_index[ch];
        let mut offset = 0_usize;

        for subblock in 0..num_subblocks {
            let subblock_samples = &samples[offset..offset + samples_per_subblock];

            let reflection = analyze_lpc(subblock_samples, NLSF_ORDER);
            let mut target_nlsf = [0.0_f32; NLSF_ORDER];
            for (slot, &k) in target_nlsf.iter_mut().zip(reflection.iter()) {
                let bounded = k.clamp(-0.999, 0.999);
                *slot = (bounded.acos() / std::f32::consts::PI).clamp(1e-3, 1.0 - 1e-3);
            }
            encode_nlsf(enc, &target_nlsf)?;

            if subblock == 0 && num_subblocks > 1 {
                // This encoder always signals "fully use the new NLSF" for
                // the first sub-block rather than searching for the
                // interpolation weight that best matches the previous
                // sub-block's spectrum.
                enc.encode_bits((1 << LSF_INTERP_BITS) - 1, LSF_INTERP_BITS)?;
            }

            let max_lag = MAX_PITCH_LAG.min(subblock_samples.len().saturating_sub(1));
            let pitch_lag = if max_lag > MIN_PITCH_LAG {
                find_pitch_lag(subblock_samples, MIN_PITCH_LAG, max_lag)
            } else {
                None
            };
            let voiced_subblock = pitch_lag.is_some();
            let signal_type: u32 = if voiced_subblock { 2 } else { 1 };
            enc.encode_uint(signal_type, 3)?;
            enc.encode_bit_logp(0, 1)?; // quantization offset: fixed neutral value

            for local_sf in 0..subframes_per_subblock {
                let start = local_sf * samples_per_subframe;
                let sf_samples = &subblock_samples[start..start + samples_per_subframe];

                if signal_type == 2 {
                    enc.encode_bit_logp(u32::from(voiced_subblock), 1)?;
                }
                let voiced = signal_type == 2 && voiced_subblock;
                if voiced {
                    let lag = pitch_lag.unwrap();
                    enc.encode_uint((lag - 2) as u32, MAX_PITCH_LAG as u32 + 1)?;
                }

                let peak = sf_samples.iter().fold(0.0_f32, |m, &v| m.max(v.abs()));
                let target_gain = (peak / 64.0).clamp(GAIN_STEP, 1.0);
                let target_index = (target_gain / GAIN_STEP).round().clamp(0.0, MAX_GAIN_INDEX as f32) as i32;
                let delta = (target_index - gain_index).clamp(-GAIN_DELTA_HALF, GAIN_DELTA_HALF - 1);
                enc.encode_bits((delta + GAIN_DELTA_HALF) as u32, GAIN_DELTA_BITS)?;
                gain_index = (gain_index + delta).clamp(0, MAX_GAIN_INDEX);
                let gain = (gain_index as f32 * GAIN_STEP).max(GAIN_STEP);

                if voiced {
                    for _ in 0..5 {
                        enc.encode_bits(16, 5)?; // neutral LTP taps: this encoder does not search them.
                    }
                }

                let residual: Vec<i32> = sf_samples.iter().map(|&s| (s / gain).round() as i32).collect();
                encode_excitation(enc, &residual, gain_index as u32)?;
            }

            offset += samples_per_subblock;
        }

        self.prev_gain_index[ch] = gain_index;
        Ok(())
    }

    fn encode_payload(&mut self, enc: &mut RangeEncoder<'_>, pcm_in: &[f32], frame_size: usize) -> Result<(), EncoderError> {
        let channel_count = self.channels as usize;

        if channel_count == 2 {
            let mut left = vec![0.0_f32; frame_size];
            let mut right = vec![0.0_f32; frame_size];
            for i in 0..frame_size {
                left[i] = pcm_in[i * 2];
                right[i] = pcm_in[i * 2 + 1];
            }
            let weight = estimate_stereo_weight(&left, &right);
            let weight_q_index = quantize_stereo_weight(weight);
            enc.encode_bits(weight_q_index, STEREO_WEIGHT_BITS)?;

            let mut mid = vec![0.0_f32; frame_size];
            let mut side = vec![0.0_f32; frame_size];
            mix_stereo(&left, &right, weight, &mut mid, &mut side);
            self.encode_channel(enc, 0, &mid)?;
            self.encode_channel(enc, 1, &side)?;
        } else {
            let mono = &pcm_in[..frame_size];
            self.encode_channel(enc, 0, mono)?;
        }

        Ok(())
    }

    /// Encodes one SILK frame of `frame_size` samples per channel from
    /// `pcm_in` (interleaved). When FEC is enabled ([`Self::set_fec_enabled`])
    /// this always signals the LBRR flag and embeds the *previous* call's
    /// frame as the redundant copy, mirroring
    /// [`crate::silk::decoder::SilkDecoder::decode`]'s frame header order.
    pub(crate) fn encode(
        &mut self,
        enc: &mut RangeEncoder<'_>,
        pcm_in: &[f32],
        frame_size: usize,
    ) -> Result<(), EncoderError> {
        let channel_count = self.channels as usize;
        if pcm_in.len() < frame_size * channel_count {
            return Err(EncoderError::InternalInconsistency(
                "silk encoder: input buffer shorter than frame size",
            ));
        }

        enc.encode_bit_logp(1, 1)?; // voice-activity flag: always active

        let redundant = self.pending_redundant.take();
        enc.encode_bit_logp(u32::from(redundant.is_some()), 1)?;
        if let Some(previous) = redundant {
            self.encode_payload(enc, &previous, frame_size)?;
        }

        self.encode_payload(enc, pcm_in, frame_size)?;

        if self.fec_enabled {
            self.pending_redundant = Some(pcm_in[..frame_size * channel_count].to_vec());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_coder::RangeEncoder;

    #[test]
    fn test_encode_silence_produces_bytes() {
        let samples = vec![0.0_f32; 160];
        let mut storage = vec![0_u8; 512];
        let mut enc = RangeEncoder::new(&mut storage);
        let mut silk_enc = SilkEncoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        silk_enc.encode(&mut enc, &samples, 160).unwrap();
        enc.done().unwrap();
        assert!(enc.range_bytes() > 0);
    }

    #[test]
    fn test_encode_stereo_does_not_panic() {
        let samples: Vec<f32> = (0..320).map(|i| (i as f32 * 0.05).sin() * 1000.0).collect();
        let mut storage = vec![0_u8; 1024];
        let mut enc = RangeEncoder::new(&mut storage);
        let mut silk_enc = SilkEncoder::new(SamplingRate::Hz48000, Channels::Stereo).unwrap();
        silk_enc.encode(&mut enc, &samples, 160).unwrap();
        enc.done().unwrap();
        assert!(enc.range_bytes() > 0);
    }

    #[test]
    fn test_fec_enabled_carries_previous_frame_as_redundant_copy() {
        let frame_a = vec![100.0_f32; 160];
        let frame_b = vec![-50.0_f32; 160];
        let mut storage = vec![0_u8; 2048];
        let mut enc = RangeEncoder::new(&mut storage);
        let mut silk_enc = SilkEncoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        silk_enc.set_fec_enabled(true);

        silk_enc.encode(&mut enc, &frame_a, 160).unwrap();
        assert!(silk_enc.pending_redundant.is_some());
        silk_enc.encode(&mut enc, &frame_b, 160).unwrap();
        enc.done().unwrap();
        assert!(enc.range_bytes() > 0);
    }
}
