//! Implements the CELT encoder.
//!
//! `spec.md` §4.3.8 gives the analysis pipeline: pre-emphasis, windowed
//! MDCT, band energy measurement, energy coding (coarse/fine), band
//! normalization, mode decisions (transient/trim/spread), bit allocation,
//! PVQ shape search, and bitstream assembly in the same field order the
//! decoder expects.

use crate::celt::alloc::{allocate, TRIM_MAX, TRIM_MIN};
use crate::celt::bands::normalize_bands;
use crate::celt::energy::{encode_coarse_energy, encode_fine_energy, linear_energy_to_log, EnergyState};
use crate::celt::mdct::Mdct;
use crate::celt::mode::{self, eff_bands, lm_for_frame_size, NUM_BANDS, OVERLAP, WINDOW};
use crate::celt::pvq::{encode_pulse_vector, normalize_pulses, search_pulses};
use crate::encoder_error::EncoderError;
use crate::range_coder::{RangeEncoder, Tell};
use crate::{Channels, SamplingRate};

/// The CELT encoder.
#[derive(Clone, Debug)]
pub(crate) struct CeltEncoder {
    channels: usize,
    energy: Vec<EnergyState>,
    history: Vec<Vec<f32>>,
    preemph_mem: Vec<f32>,
    mdct_by_lm: [Mdct; 4],
}

impl CeltEncoder {
    /// Creates a new CELT encoder.
    pub(crate) fn new(
        _sampling_rate: SamplingRate,
        channels: Channels,
    ) -> Result<Self, EncoderError> {
        let channels = channels as usize;

        Ok(Self {
            channels,
            energy: vec![EnergyState::new(); channels],
            history: vec![vec![0.0_f32; 960]; channels],
            preemph_mem: vec![0.0_f32; channels],
            mdct_by_lm: [
                Mdct::new(120),
                Mdct::new(240),
                Mdct::new(480),
                Mdct::new(960),
            ],
        })
    }

    /// Resets the CELT encoder.
    pub(crate) fn reset(&mut self) -> Result<(), EncoderError> {
        for ch in 0..self.channels {
            self.energy[ch].reset();
            self.history[ch].iter_mut().for_each(|x| *x = 0.0);
            self.preemph_mem[ch] = 0.0;
        }
        Ok(())
    }

    /// Analyzes and windows `pcm_in` (interleaved, length `frame_size *
    /// channels`) into the `2N`-sample pre-emphasized, edge-windowed buffer
    /// used for the forward MDCT, per channel.
    fn analysis_buffer(&mut self, ch: usize, pcm_in: &[f32], frame_size: usize) -> Vec<f32> {
        let n = frame_size;
        let mut filtered = vec![0.0_f32; n];
        let mut prev_raw = self.preemph_mem[ch];
        for i in 0..n {
            let raw = pcm_in[i * self.channels + ch];
            filtered[i] = raw - 0.85_f32 * prev_raw;
            prev_raw = raw;
        }
        self.preemph_mem[ch] = prev_raw;

        let mut buf = vec![0.0_f32; 2 * n];
        buf[..n].copy_from_slice(&self.history[ch][..n.min(self.history[ch].len())]);
        buf[n..].copy_from_slice(&filtered);

        let overlap = OVERLAP.min(n);
        for i in 0..overlap {
            buf[i] *= WINDOW[i];
        }
        for i in 0..overlap {
            let idx = 2 * n - overlap + i;
            buf[idx] *= WINDOW[overlap - 1 - i];
        }

        if self.history[ch].len() < n {
            self.history[ch].resize(n, 0.0);
        }
        self.history[ch][..n].copy_from_slice(&filtered);

        buf
    }

    /// Encodes one CELT frame of `frame_size` samples per channel from
    /// `pcm_in` (interleaved). `budget_eighths` mirrors the decoder's
    /// argument of the same name: the total bit budget for this frame.
    pub(crate) fn encode(
        &mut self,
        enc: &mut RangeEncoder<'_>,
        pcm_in: &[f32],
        frame_size: usize,
        budget_eighths: i32,
    ) -> Result<(), EncoderError> {
        let lm = lm_for_frame_size(frame_size)
            .ok_or(EncoderError::InvalidConfiguration("unsupported CELT frame size"))?;
        if pcm_in.len() < frame_size * self.channels {
            return Err(EncoderError::InternalInconsistency(
                "celt encoder: input buffer shorter than frame size",
            ));
        }

        let num_bands = eff_bands(lm);

        let mut coeffs_per_channel = Vec::with_capacity(self.channels);
        for ch in 0..self.channels {
            let windowed = self.analysis_buffer(ch, pcm_in, frame_size);
            let mut coeffs = vec![0.0_f32; frame_size];
            self.mdct_by_lm[lm].forward(&windowed, &mut coeffs);
            coeffs_per_channel.push(coeffs);
        }

        let silence = coeffs_per_channel
            .iter()
            .all(|c| c.iter().all(|&x| x.abs() < 1e-9));
        enc.encode_bit_logp(u32::from(silence), 15)?;
        if silence {
            return Ok(());
        }

        enc.encode_bit_logp(0, 1)?; // post-filter: never enabled by this encoder.

        let transient = false; // transient detection is out of scope for this simplified analysis.
        if lm > 0 {
            enc.encode_bit_logp(u32::from(transient), 3)?;
        }

        let intra = false;
        enc.encode_bit_logp(u32::from(intra), 3)?;

        let mut band_amp = Vec::with_capacity(self.channels);
        let mut log_e = Vec::with_capacity(self.channels);
        for ch in 0..self.channels {
            let mut amp = vec![0.0_f32; NUM_BANDS];
            normalize_bands(&mut coeffs_per_channel[ch], &mut amp, num_bands, lm);

            let mut log_amp = [0.0_f32; NUM_BANDS];
            linear_energy_to_log(&amp, &mut log_amp);

            encode_coarse_energy(enc, &mut self.energy[ch], &log_amp, num_bands, lm, intra)?;

            band_amp.push(amp);
            log_e.push(log_amp);
        }

        enc.encode_bit_logp(0, 1)?; // tf-select, always "no change" (see decoder note).
        enc.encode_icdf(0, &[7_u8, 3, 0], 3)?; // spread decision: fixed to "normal".

        let trim = 0_i32;
        enc.encode_uint((trim - TRIM_MIN) as u32, (TRIM_MAX - TRIM_MIN + 1) as u32)?;

        if self.channels == 2 {
            enc.encode_uint(num_bands as u32, num_bands as u32 + 1)?;
            enc.encode_bit_logp(0, 1)?;
        }

        let total_bits = (budget_eighths - enc.tell_frac() as i32).max(0) / self.channels as i32;

        for ch in 0..self.channels {
            let boosts = vec![0_i32; num_bands];
            let allocation = allocate(num_bands, lm, total_bits, trim, &boosts);

            encode_fine_energy(enc, &log_e[ch], &log_e[ch], &allocation.fine_bits, num_bands)?;

            for b in 0..num_bands {
                let lo = mode::band_bin(b, lm);
                let hi = mode::band_bin(b + 1, lm).min(frame_size);
                if hi <= lo {
                    continue;
                }
                let n = hi - lo;
                let k = allocation.pulses[b];
                if k == 0 {
                    continue;
                }
                let pulses = search_pulses(&coeffs_per_channel[ch][lo..hi], n, k);
                encode_pulse_vector(enc, &pulses, n, k)?;

                let mut reconstructed = vec![0.0_f32; n];
                normalize_pulses(&pulses, &mut reconstructed);
                coeffs_per_channel[ch][lo..hi].copy_from_slice(&reconstructed);
            }

            for _ in 0..allocation.balance_bits {
                enc.encode_bit_logp(0, 1)?;
            }
        }

        Ok(())
    }
}
