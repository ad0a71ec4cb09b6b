//! Implements the Silk decoder.
//!
//! `spec.md` §4.2.5 gives the per-frame decode order this follows: a frame
//! header (voice-activity flag, then the LBRR flag and its conditional
//! redundant frame), followed by one or more sub-blocks. Each sub-block
//! decodes its own NLSF (line spectral frequencies, interpolated with the
//! previous sub-block's for the first sub-block of a 40/60 ms frame),
//! signal type and quantization offset, and then loops over that
//! sub-block's subframes decoding voicing/pitch-lag, an inter-frame
//! predicted gain, LTP taps (voiced only), and the excitation — run back
//! through the LTP and LPC synthesis cascade in [`crate::silk::synthesis`].
//! `spec.md` §8.3 requires 60 ms frames to decode via 3 sub-blocks; this
//! decoder generalizes that to any frame duration that is a whole multiple
//! of 20 ms.

use crate::decoder_error::DecoderError;
use crate::range_coder::RangeDecoder;
use crate::silk::excitation::{decode_excitation, Dither};
use crate::silk::lpc::stabilize_lpc;
use crate::silk::lsf::{decode_nlsf, neutral_nlsf, nlsf_to_lpc, NLSF_ORDER};
use crate::silk::plc::SilkPlcState;
use crate::silk::synthesis::{dequantize_stereo_weight, unmix_stereo, SynthesisState, STEREO_WEIGHT_BITS};
use crate::silk::frame_plan;
use crate::{Channels, SamplingRate};

const MAX_PITCH_LAG: u32 = 400;
const GAIN_STEP: f32 = 1.0 / 64.0;
const MAX_GAIN_INDEX: i32 = 63;
const GAIN_DELTA_BITS: u32 = 5;
const GAIN_DELTA_HALF: i32 = 1 << (GAIN_DELTA_BITS - 1);
const LSF_INTERP_BITS: u32 = 3;

/// The Silk decoder.
#[derive(Clone, Debug)]
pub(crate) struct SilkDecoder {
    sampling_rate: SamplingRate,
    channels: Channels,
    internal_sampling_rate: SamplingRate,
    internal_channels: Channels,
    payload_size_ms: usize,
    synth: Vec<SynthesisState>,
    plc: Vec<SilkPlcState>,
    dither_seed: u32,
    last_pitch_lag: u32,
    prev_gain_index: Vec<i32>,
    prev_nlsf: Vec<[f32; NLSF_ORDER]>,
}

impl SilkDecoder {
    /// Creates a new Silk decoder. Configures the output sampling rate and output channels.
    pub(crate) fn new(
        sampling_rate: SamplingRate,
        channels: Channels,
    ) -> Result<Self, DecoderError> {
        let channel_count = (channels as usize).max(1);
        Ok(Self {
            sampling_rate,
            channels,
            internal_sampling_rate: SamplingRate::Hz48000,
            internal_channels: Channels::Stereo,
            payload_size_ms: 0,
            synth: vec![SynthesisState::new(NLSF_ORDER); channel_count],
            plc: vec![SilkPlcState::new(NLSF_ORDER); channel_count],
            dither_seed: 0,
            last_pitch_lag: 0,
            prev_gain_index: vec![0; channel_count],
            prev_nlsf: vec![neutral_nlsf(); channel_count],
        })
    }

    /// Resets the Silk decoder.
    pub(crate) fn reset(&mut self) -> Result<(), DecoderError> {
        for state in self.synth.iter_mut() {
            state.reset();
        }
        for state in self.plc.iter_mut() {
            state.reset();
        }
        self.dither_seed = 0;
        self.last_pitch_lag = 0;
        self.prev_gain_index.iter_mut().for_each(|g| *g = 0);
        self.prev_nlsf.iter_mut().for_each(|n| *n = neutral_nlsf());
        Ok(())
    }

    /// Gets the pitch of the last decoded frame.
    pub(crate) fn pitch(&self) -> u32 {
        self.last_pitch_lag
    }

    /// Sets the internal channels.
    pub(crate) fn set_internal_channels(&mut self, internal_channels: Channels) {
        self.internal_channels = internal_channels;
    }

    /// Sets the sampling rate.
    pub(crate) fn set_internal_sampling_rate(&mut self, sampling_rate: SamplingRate) {
        self.internal_sampling_rate = sampling_rate;
    }

    /// Sets the payload size in ms.
    pub(crate) fn set_payload_size_ms(&mut self, payload_size_ms: usize) {
        self.payload_size_ms = payload_size_ms;
    }

    /// Decodes every sub-block/subframe for one channel of a frame,
    /// following the per-frame decode order in the module doc comment.
    fn decode_channel(
        &mut self,
        dec: &mut RangeDecoder<'_>,
        ch: usize,
        frame_size: usize,
    ) -> Result<Vec<f32>, DecoderError> {
        let (num_subblocks, subframes_per_subblock) = frame_plan(self.sampling_rate, frame_size);
        let total_subframes = (num_subblocks * subframes_per_subblock).max(1);
        let samples_per_subframe = frame_size / total_subframes;

        let mut out = vec![0.0_f32; frame_size];
        let mut gain_index = self.prev_gain_index[ch];
        let mut write_offset = 0_usize;

        for subblock in 0..num_subblocks {
            let decoded_nlsf = decode_nlsf(dec);
            let lpc_nlsf = if subblock == 0 && num_subblocks > 1 {
                let weight_q = dec.decode_bits(LSF_INTERP_BITS) as f32 / (1 << LSF_INTERP_BITS) as f32;
                let mut blended = [0.0_f32; NLSF_ORDER];
                for i in 0..NLSF_ORDER {
                    blended[i] = self.prev_nlsf[ch][i] * (1.0 - weight_q) + decoded_nlsf[i] * weight_q;
                }
                blended
            } else {
                decoded_nlsf
            };
            self.prev_nlsf[ch] = decoded_nlsf;

            let mut lpc = nlsf_to_lpc(&lpc_nlsf);
            stabilize_lpc(&mut lpc, 0.02);

            let signal_type = dec.decode_uint(3); // 0 = inactive, 1 = unvoiced, 2 = voiced
            let quant_offset = dec.decode_bit_logp(1);

            for _ in 0..subframes_per_subblock {
                let voiced = signal_type == 2 && dec.decode_bit_logp(1);
                let pitch_lag = if voiced {
                    dec.decode_uint(MAX_PITCH_LAG + 1) + 2
                } else {
                    0
                };

                let delta = dec.decode_bits(GAIN_DELTA_BITS) as i32 - GAIN_DELTA_HALF;
                gain_index = (gain_index + delta).clamp(0, MAX_GAIN_INDEX);
                let mut gain = (gain_index as f32 * GAIN_STEP).max(GAIN_STEP);
                if quant_offset {
                    gain *= 1.05;
                }

                let mut ltp_taps = [0.0_f32; 5];
                if voiced {
                    for tap in ltp_taps.iter_mut() {
                        let q = dec.decode_bits(5) as i32 - 16;
                        *tap = q as f32 / 32.0;
                    }
                }

                self.dither_seed = self.dither_seed.wrapping_add(1);
                let mut dither = Dither::new(self.dither_seed);
                let residual = decode_excitation(dec, samples_per_subframe, gain_index as u32, &mut dither)?;
                let excitation: Vec<f32> = residual.iter().map(|&r| r * gain).collect();

                let subframe_out = &mut out[write_offset..write_offset + samples_per_subframe];
                self.synth[ch].synthesize(&excitation, &lpc, &ltp_taps, pitch_lag as usize, voiced, subframe_out);

                self.plc[ch].note_good_frame(&lpc, &excitation);
                if voiced {
                    self.last_pitch_lag = pitch_lag;
                }

                write_offset += samples_per_subframe;
            }
        }

        self.prev_gain_index[ch] = gain_index;
        Ok(out)
    }

    fn decode_stereo_weight(&self, dec: &mut RangeDecoder<'_>) -> f32 {
        let index = dec.decode_bits(STEREO_WEIGHT_BITS);
        dequantize_stereo_weight(index)
    }

    /// Decodes the sub-block/subframe payload for every channel of a frame
    /// (stereo prediction weight first, when applicable) into `out`
    /// (interleaved).
    fn decode_payload(
        &mut self,
        dec: &mut RangeDecoder<'_>,
        out: &mut [f32],
        frame_size: usize,
    ) -> Result<(), DecoderError> {
        let channel_count = self.channels as usize;

        if self.internal_channels == Channels::Stereo && channel_count == 2 {
            let weight = self.decode_stereo_weight(dec);
            let mid = self.decode_channel(dec, 0, frame_size)?;
            let side = self.decode_channel(dec, 1, frame_size)?;
            let mut left = vec![0.0_f32; frame_size];
            let mut right = vec![0.0_f32; frame_size];
            unmix_stereo(&mid, &side, weight, &mut left, &mut right);
            for i in 0..frame_size {
                out[i * channel_count] = left[i];
                out[i * channel_count + 1] = right[i];
            }
        } else {
            let mono = self.decode_channel(dec, 0, frame_size)?;
            for ch in 0..channel_count {
                for i in 0..frame_size {
                    out[i * channel_count + ch] = mono[i];
                }
            }
        }

        Ok(())
    }

    /// Decodes one SILK frame of `frame_size` samples per channel into
    /// `out` (interleaved), reading from `dec`.
    ///
    /// Every frame opens with a voice-activity flag and an LBRR flag
    /// (`spec.md` §4.2.5); when the LBRR flag is set, the redundant frame
    /// that follows it is always parsed (to keep the range coder in sync
    /// with the rest of the packet) even though this entry point discards
    /// it — callers that want the redundant copy use [`Self::decode_fec`]
    /// instead.
    ///
    /// In hybrid mode `dec` also carries the CELT high-band payload that
    /// follows this frame's SILK bits on the same range-coder stream; the
    /// caller keeps decoding from it after this call returns.
    pub(crate) fn decode(
        &mut self,
        dec: &mut RangeDecoder<'_>,
        out: &mut [f32],
        frame_size: usize,
    ) -> Result<(), DecoderError> {
        let channel_count = self.channels as usize;
        if out.len() < frame_size * channel_count {
            return Err(DecoderError::FrameSizeMismatch);
        }

        let _vad_active = dec.decode_bit_logp(1);
        let lbrr_flag = dec.decode_bit_logp(1);
        if lbrr_flag {
            let mut redundant = vec![0.0_f32; frame_size * channel_count];
            self.decode_payload(dec, &mut redundant, frame_size)?;
        }

        self.decode_payload(dec, out, frame_size)
    }

    /// Attempts to recover the redundant (low-bitrate) copy of a previous,
    /// lost frame from the LBRR data embedded in the *current* packet's
    /// frame. Returns `Ok(true)` with `out` filled in when a redundant
    /// frame was present, `Ok(false)` (with `out` left untouched) when the
    /// current frame signalled no LBRR data, so the caller can fall back to
    /// ordinary concealment.
    pub(crate) fn decode_fec(
        &mut self,
        dec: &mut RangeDecoder<'_>,
        out: &mut [f32],
        frame_size: usize,
    ) -> Result<bool, DecoderError> {
        let channel_count = self.channels as usize;
        if out.len() < frame_size * channel_count {
            return Err(DecoderError::FrameSizeMismatch);
        }

        let _vad_active = dec.decode_bit_logp(1);
        let lbrr_flag = dec.decode_bit_logp(1);
        if !lbrr_flag {
            return Ok(false);
        }

        self.decode_payload(dec, out, frame_size)?;
        Ok(true)
    }

    /// Conceals a lost SILK frame of `frame_size` samples per channel into
    /// `out` (interleaved), with no packet payload to decode.
    pub(crate) fn conceal(&mut self, out: &mut [f32], frame_size: usize) -> Result<(), DecoderError> {
        let channel_count = self.channels as usize;
        if out.len() < frame_size * channel_count {
            return Err(DecoderError::FrameSizeMismatch);
        }

        for ch in 0..channel_count {
            let history = vec![0.0_f32; NLSF_ORDER];
            let mut channel_out = vec![0.0_f32; frame_size];
            self.plc[ch].conceal(&history, &mut channel_out);
            for i in 0..frame_size {
                out[i * channel_count + ch] = channel_out[i];
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_coder::RangeEncoder;
    use crate::silk::encoder::SilkEncoder;

    #[test]
    fn test_mono_roundtrip_produces_finite_output() {
        let frame_size = 160;
        let samples: Vec<f32> = (0..frame_size).map(|i| (i as f32 * 0.1).sin() * 8000.0).collect();

        let mut storage = vec![0_u8; frame_size * 4 + 128];
        let mut enc = RangeEncoder::new(&mut storage);
        let mut silk_enc = SilkEncoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        silk_enc.encode(&mut enc, &samples, frame_size).unwrap();
        enc.done().unwrap();
        drop(enc);

        let mut silk_dec = SilkDecoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        silk_dec.set_internal_channels(Channels::Mono);
        let mut dec = RangeDecoder::new(&storage);
        let mut out = vec![0.0_f32; frame_size];
        silk_dec.decode(&mut dec, &mut out, frame_size).unwrap();

        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_60ms_frame_decodes_via_three_subblocks() {
        let frame_size = 960; // 60 ms @ 16 kHz
        let samples: Vec<f32> = (0..frame_size).map(|i| (i as f32 * 0.05).sin() * 4000.0).collect();

        let mut storage = vec![0_u8; frame_size * 4 + 512];
        let mut enc = RangeEncoder::new(&mut storage);
        let mut silk_enc = SilkEncoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        silk_enc.encode(&mut enc, &samples, frame_size).unwrap();
        enc.done().unwrap();
        drop(enc);

        let mut silk_dec = SilkDecoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        silk_dec.set_internal_channels(Channels::Mono);
        let mut dec = RangeDecoder::new(&storage);
        let mut out = vec![0.0_f32; frame_size];
        silk_dec.decode(&mut dec, &mut out, frame_size).unwrap();

        assert!(out.iter().all(|v| v.is_finite()));
        let (num_subblocks, subframes_per_subblock) = frame_plan(SamplingRate::Hz16000, frame_size);
        assert_eq!(num_subblocks, 3);
        assert_eq!(subframes_per_subblock, 4);
    }

    #[test]
    fn test_decode_fec_recovers_lbrr_frame_when_present() {
        let frame_size = 160;
        let samples: Vec<f32> = (0..frame_size).map(|i| (i as f32 * 0.1).sin() * 5000.0).collect();

        let mut storage = vec![0_u8; frame_size * 8 + 256];
        let mut enc = RangeEncoder::new(&mut storage);
        let mut silk_enc = SilkEncoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        silk_enc.set_fec_enabled(true);
        silk_enc.encode(&mut enc, &samples, frame_size).unwrap();
        enc.done().unwrap();
        drop(enc);

        let mut silk_dec = SilkDecoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        silk_dec.set_internal_channels(Channels::Mono);
        let mut dec = RangeDecoder::new(&storage);
        let mut out = vec![0.0_f32; frame_size];
        let recovered = silk_dec.decode_fec(&mut dec, &mut out, frame_size).unwrap();

        assert!(recovered);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_decode_fec_reports_no_recovery_without_lbrr() {
        let frame_size = 160;
        let samples = vec![0.0_f32; frame_size];

        let mut storage = vec![0_u8; frame_size * 4 + 128];
        let mut enc = RangeEncoder::new(&mut storage);
        let mut silk_enc = SilkEncoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        silk_enc.encode(&mut enc, &samples, frame_size).unwrap();
        enc.done().unwrap();
        drop(enc);

        let mut silk_dec = SilkDecoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        silk_dec.set_internal_channels(Channels::Mono);
        let mut dec = RangeDecoder::new(&storage);
        let mut out = vec![0.0_f32; frame_size];
        let recovered = silk_dec.decode_fec(&mut dec, &mut out, frame_size).unwrap();

        assert!(!recovered);
    }

    #[test]
    fn test_loss_conceals_without_decoder() {
        let mut silk_dec = SilkDecoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        let mut out = vec![1.0_f32; 160];
        silk_dec.conceal(&mut out, 160).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }
}
