//! Glues the SILK and CELT coders together for hybrid-mode frames.
//!
//! `spec.md` §4.4: a hybrid frame carries SILK-coded content for the band
//! below 8 kHz followed, on the very same range-coder stream, by a CELT
//! frame carrying the band above it. Both halves are decoded (or encoded)
//! against one shared [`RangeDecoder`]/[`RangeEncoder`] in that order. SILK's
//! own algorithmic delay runs roughly 2.7 ms behind CELT's, so before the two
//! time-domain outputs are summed the SILK side is pushed through a
//! [`HybridDelayLine`] to re-align them; without it the low and high bands
//! would beat against each other out of phase.
//!
//! This crate's CELT coder always codes from band 0 rather than skipping
//! the bands SILK already covers (the reference encoder starts CELT at
//! band 17 in hybrid mode); summing two full-band signals instead of a
//! genuinely split spectrum is a documented simplification (`DESIGN.md`).
//! `HybridDelayLine` compensates the *output-side* skew between the two
//! coders; it does not perform the sample-rate conversion a real SILK
//! decoder would need to bring its internal rate up to 48 kHz, nor does the
//! encoder apply the matching lookahead compensation on its side — both
//! gaps are recorded in `DESIGN.md`.

use std::collections::VecDeque;

#[cfg(feature = "decoder")]
use crate::celt::CeltDecoder;
#[cfg(feature = "encoder")]
use crate::celt::CeltEncoder;
#[cfg(feature = "decoder")]
use crate::decoder_error::DecoderError;
#[cfg(feature = "encoder")]
use crate::encoder_error::EncoderError;
#[cfg(feature = "decoder")]
use crate::range_coder::RangeDecoder;
#[cfg(feature = "encoder")]
use crate::range_coder::RangeEncoder;
#[cfg(feature = "decoder")]
use crate::silk::SilkDecoder;
#[cfg(feature = "encoder")]
use crate::silk::SilkEncoder;
use crate::SamplingRate;

/// SILK's algorithmic delay relative to CELT, in tenths of a millisecond
/// (2.7 ms, `spec.md` §4.4).
const DELAY_TENTHS_MS: usize = 27;

/// A fixed per-channel delay line that holds the SILK (low-band) signal back
/// by [`DELAY_TENTHS_MS`] so it lines up with CELT's (high-band) output
/// before the two are summed. State carries across frames, since the skew is
/// constant but larger than a single frame's worth of samples at short frame
/// sizes.
#[derive(Clone, Debug)]
pub(crate) struct HybridDelayLine {
    channels: usize,
    history: Vec<VecDeque<f32>>,
}

impl HybridDelayLine {
    pub(crate) fn new(sampling_rate: SamplingRate, channels: usize) -> Self {
        let channels = channels.max(1);
        let delay_samples = ((sampling_rate as usize) * DELAY_TENTHS_MS / 10_000).max(1);
        let history = (0..channels).map(|_| VecDeque::from(vec![0.0_f32; delay_samples])).collect();
        Self { channels, history }
    }

    pub(crate) fn reset(&mut self) {
        for queue in &mut self.history {
            queue.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    /// Shifts `signal` (interleaved, `frame_size * channels` samples) back
    /// by this line's delay, in place, carrying the tail into the next call.
    pub(crate) fn apply(&mut self, signal: &mut [f32], frame_size: usize) {
        for ch in 0..self.channels {
            let queue = &mut self.history[ch];
            for i in 0..frame_size {
                let idx = i * self.channels + ch;
                queue.push_back(signal[idx]);
                signal[idx] = queue.pop_front().unwrap_or(0.0);
            }
        }
    }
}

/// Decodes one hybrid frame: SILK low band, then CELT high band, the low
/// band re-aligned through `delay` before the two are summed into `out`
/// (interleaved, length `frame_size * channels`).
#[cfg(feature = "decoder")]
pub(crate) fn decode_hybrid_frame(
    silk_dec: &mut SilkDecoder,
    celt_dec: &mut CeltDecoder,
    delay: &mut HybridDelayLine,
    dec: &mut RangeDecoder<'_>,
    out: &mut [f32],
    frame_size: usize,
    channels: usize,
    budget_eighths: i32,
) -> Result<(), DecoderError> {
    let mut low = vec![0.0_f32; frame_size * channels];
    silk_dec.decode(dec, &mut low, frame_size)?;
    delay.apply(&mut low, frame_size);

    let mut high = vec![0.0_f32; frame_size * channels];
    celt_dec.decode(dec, &mut high, frame_size, budget_eighths)?;

    for (o, (l, h)) in out.iter_mut().zip(low.iter().zip(high.iter())) {
        *o = l + h;
    }
    Ok(())
}

/// Conceals one lost hybrid frame by concealing each half independently,
/// still passing the SILK half through `delay` so state stays aligned with
/// [`decode_hybrid_frame`] once real packets resume.
#[cfg(feature = "decoder")]
pub(crate) fn conceal_hybrid_frame(
    silk_dec: &mut SilkDecoder,
    celt_dec: &mut CeltDecoder,
    delay: &mut HybridDelayLine,
    out: &mut [f32],
    frame_size: usize,
    channels: usize,
) -> Result<(), DecoderError> {
    let mut low = vec![0.0_f32; frame_size * channels];
    silk_dec.conceal(&mut low, frame_size)?;
    delay.apply(&mut low, frame_size);

    let mut high = vec![0.0_f32; frame_size * channels];
    celt_dec.conceal(&mut high, frame_size)?;

    for (o, (l, h)) in out.iter_mut().zip(low.iter().zip(high.iter())) {
        *o = l + h;
    }
    Ok(())
}

/// Encodes one hybrid frame: SILK low band, then CELT high band, both
/// driven from the same `pcm_in`. Unlike the decode side, this does not
/// apply any matching lookahead compensation (`DESIGN.md`).
#[cfg(feature = "encoder")]
pub(crate) fn encode_hybrid_frame(
    silk_enc: &mut SilkEncoder,
    celt_enc: &mut CeltEncoder,
    enc: &mut RangeEncoder<'_>,
    pcm_in: &[f32],
    frame_size: usize,
    budget_eighths: i32,
) -> Result<(), EncoderError> {
    silk_enc.encode(enc, pcm_in, frame_size)?;
    celt_enc.encode(enc, pcm_in, frame_size, budget_eighths)?;
    Ok(())
}

#[cfg(all(test, feature = "decoder", feature = "encoder"))]
mod tests {
    use super::*;
    use crate::range_coder::RangeEncoder;
    use crate::{Channels, SamplingRate};

    #[test]
    fn test_decode_hybrid_frame_sums_both_halves() {
        let frame_size = 480;
        let channels = 1;
        let mut storage = vec![0_u8; frame_size * 4 + 256];
        let mut enc = RangeEncoder::new(&mut storage);

        let samples = vec![0.0_f32; frame_size];
        let mut silk_enc = SilkEncoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        silk_enc.encode(&mut enc, &samples, frame_size).unwrap();
        let mut celt_enc = CeltEncoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        celt_enc.encode(&mut enc, &samples, frame_size, 100_000).unwrap();
        enc.done().unwrap();
        drop(enc);

        let mut silk_dec = SilkDecoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        silk_dec.set_internal_channels(Channels::Mono);
        let mut celt_dec = CeltDecoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let mut delay = HybridDelayLine::new(SamplingRate::Hz48000, channels);
        let mut dec = RangeDecoder::new(&storage);
        let mut out = vec![0.0_f32; frame_size * channels];
        decode_hybrid_frame(
            &mut silk_dec,
            &mut celt_dec,
            &mut delay,
            &mut dec,
            &mut out,
            frame_size,
            channels,
            100_000,
        )
        .unwrap();

        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_conceal_hybrid_frame_is_silent_with_no_history() {
        let frame_size = 160;
        let channels = 1;
        let mut silk_dec = SilkDecoder::new(SamplingRate::Hz16000, Channels::Mono).unwrap();
        let mut celt_dec = CeltDecoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let mut delay = HybridDelayLine::new(SamplingRate::Hz48000, channels);
        let mut out = vec![1.0_f32; frame_size * channels];
        conceal_hybrid_frame(&mut silk_dec, &mut celt_dec, &mut delay, &mut out, frame_size, channels).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_delay_line_eventually_passes_signal_through_unchanged() {
        let mut delay = HybridDelayLine::new(SamplingRate::Hz48000, 1);
        let delay_samples = delay.history[0].len();
        let mut block = vec![1.0_f32; delay_samples];
        delay.apply(&mut block, delay_samples);
        assert!(block.iter().all(|&v| v == 0.0), "first block must read out the zero-filled primer");

        let mut next = vec![1.0_f32; delay_samples];
        delay.apply(&mut next, delay_samples);
        assert!(next.iter().all(|&v| v == 1.0), "second block must read out the first block's signal");
    }
}
