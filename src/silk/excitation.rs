//! Excitation (residual) signal coding.
//!
//! `spec.md` §4.2.2: the prediction residual is coded as a sequence of
//! pulses using shell/pulse coding — each subframe is split into 16-sample
//! shell blocks, each block carries a decoded pulse count, the count is then
//! distributed across the block's 16 positions by recursively halving it
//! (the "shell" in shell coding — same name, same halving idea as the
//! reference's `silk_shell_decoder`, generated split probabilities here
//! rather than the reference's exact binomial tables), and finally every
//! nonzero position gets a separate sign bit. A linear-congruential
//! generator supplies the small amount of dither noise that keeps
//! near-silent regions from sounding mechanically quantized.

use crate::decoder_error::DecoderError;
use crate::encoder_error::EncoderError;
use crate::range_coder::{RangeDecoder, RangeEncoder};

const SHELL_BLOCK_SIZE: usize = 16;
const RATE_LEVELS: usize = 8;
const MAX_DIRECT_PULSES: u32 = 15;
const PULSE_SYMS: usize = 17; // 0..=15 direct counts, 16 = escape

/// LCG dither generator, matching the reference's `lcg_seed` update
/// constants (`spec.md` §4.2.2).
pub(crate) struct Dither {
    seed: u32,
}

impl Dither {
    pub(crate) fn new(seed: u32) -> Self {
        Self { seed }
    }

    pub(crate) fn next(&mut self) -> f32 {
        self.seed = self.seed.wrapping_mul(196_314_165).wrapping_add(907_633_515);
        (self.seed >> 16) as f32 / 65536.0 - 0.5
    }
}

/// Maps a subframe gain index to one of `RATE_LEVELS` pulse-count rate
/// buckets, the way the reference selects its pulse-count table per
/// quantized gain.
fn rate_level_for_gain(gain_q: u32) -> usize {
    ((gain_q as usize) * RATE_LEVELS / 64).min(RATE_LEVELS - 1)
}

/// Non-increasing ICDF over a shell block's pulse count: `0..=MAX_DIRECT_PULSES`
/// directly, plus an escape symbol for counts above that range. Higher rate
/// levels decay faster (fewer large counts expected), mirroring the way the
/// reference's per-rate-level pulse-count tables get more peaked as the
/// quantization step shrinks.
fn pulse_count_icdf(rate_level: usize) -> [u8; PULSE_SYMS] {
    let mut table = [0_u8; PULSE_SYMS];
    let mut remaining: u32 = 256;
    let shrink = 40 + (rate_level as u32) * 8;
    for slot in table.iter_mut() {
        let step = ((remaining * shrink) / 256).max(1);
        remaining = remaining.saturating_sub(step);
        *slot = remaining as u8;
    }
    table[PULSE_SYMS - 1] = 0;
    table
}

fn decode_pulse_count(dec: &mut RangeDecoder<'_>, rate_level: usize) -> u32 {
    let symbol = dec.decode_icdf(&pulse_count_icdf(rate_level), 8) as u32;
    if symbol <= MAX_DIRECT_PULSES {
        symbol
    } else {
        let extra = dec.decode_bits(8);
        MAX_DIRECT_PULSES + 1 + extra
    }
}

fn encode_pulse_count(enc: &mut RangeEncoder<'_>, rate_level: usize, count: u32) -> Result<(), EncoderError> {
    let icdf = pulse_count_icdf(rate_level);
    if count <= MAX_DIRECT_PULSES {
        enc.encode_icdf(count as usize, &icdf, 8)?;
    } else {
        enc.encode_icdf((MAX_DIRECT_PULSES + 1) as usize, &icdf, 8)?;
        let extra = (count - MAX_DIRECT_PULSES - 1).min(255);
        enc.encode_bits(extra, 8)?;
    }
    Ok(())
}

/// Flat ICDF over splitting `total` pulses into a left half and a right
/// half (`total + 1` possible outcomes). The reference weights this toward
/// an even split with a binomial table per `total`; this crate uses a flat
/// distribution instead (documented simplification, `DESIGN.md`).
fn split_icdf(total: u32) -> Vec<u8> {
    let n = total as usize + 1;
    let mut table = vec![0_u8; n];
    let mut remaining: u32 = 256;
    let step = (256 / n as u32).max(1);
    for slot in table.iter_mut() {
        remaining = remaining.saturating_sub(step);
        *slot = remaining as u8;
    }
    table[n - 1] = 0;
    table
}

/// Recursively distributes `total` pulses across `out` (length `block_size`)
/// by halving: decode how many of `total` land in the left half, then
/// recurse on each half with its own sub-total. Bottoms out when a half
/// shrinks to one position (it gets whatever is left) or the remaining
/// total is zero (every remaining position is silent, no bits to read).
fn decode_shell(dec: &mut RangeDecoder<'_>, total: u32, out: &mut [u32]) {
    let block_size = out.len();
    if block_size == 1 {
        out[0] = total;
        return;
    }
    if total == 0 {
        out.iter_mut().for_each(|slot| *slot = 0);
        return;
    }
    let half = block_size / 2;
    let left_count = dec.decode_icdf(&split_icdf(total), 8) as u32;
    let right_count = total - left_count;
    decode_shell(dec, left_count, &mut out[..half]);
    decode_shell(dec, right_count, &mut out[half..]);
}

/// Inverse of [`decode_shell`]: encodes the left/right split at each halving
/// step, checking the same two base cases in the same order so the
/// decoder's bit consumption always matches the encoder's bit production.
fn encode_shell(enc: &mut RangeEncoder<'_>, values: &[u32]) -> Result<(), EncoderError> {
    let block_size = values.len();
    if block_size == 1 {
        return Ok(());
    }
    let total: u32 = values.iter().sum();
    if total == 0 {
        return Ok(());
    }
    let half = block_size / 2;
    let left_total: u32 = values[..half].iter().sum();
    enc.encode_icdf(left_total as usize, &split_icdf(total), 8)?;
    encode_shell(enc, &values[..half])?;
    encode_shell(enc, &values[half..])?;
    Ok(())
}

/// Decodes `n` excitation samples for one subframe: shell/pulse-coded
/// magnitudes in 16-sample blocks, each nonzero magnitude followed (after
/// every block has been read, in sample order) by a sign bit, summed with a
/// small dither-noise floor.
pub(crate) fn decode_excitation(
    dec: &mut RangeDecoder<'_>,
    n: usize,
    gain_q: u32,
    dither: &mut Dither,
) -> Result<Vec<f32>, DecoderError> {
    let rate_level = rate_level_for_gain(gain_q);
    let mut magnitudes = vec![0_u32; n];

    let mut offset = 0;
    while offset < n {
        let block_len = SHELL_BLOCK_SIZE.min(n - offset);
        let count = decode_pulse_count(dec, rate_level);
        decode_shell(dec, count, &mut magnitudes[offset..offset + block_len]);
        offset += block_len;
    }

    let mut out = vec![0.0_f32; n];
    for (i, slot) in out.iter_mut().enumerate() {
        let magnitude = magnitudes[i];
        let signed = if magnitude == 0 {
            0.0
        } else if dec.decode_bit_logp(1) {
            magnitude as f32
        } else {
            -(magnitude as f32)
        };
        *slot = signed + dither.next() * 0.25;
    }
    Ok(out)
}

/// Encodes `residual` (already-quantized integer pulse magnitudes with sign)
/// as the inverse of [`decode_excitation`]'s shell/pulse coding.
pub(crate) fn encode_excitation(enc: &mut RangeEncoder<'_>, residual: &[i32], gain_q: u32) -> Result<(), EncoderError> {
    let n = residual.len();
    let rate_level = rate_level_for_gain(gain_q);
    let magnitudes: Vec<u32> = residual.iter().map(|&v| v.unsigned_abs()).collect();

    let mut offset = 0;
    while offset < n {
        let block_len = SHELL_BLOCK_SIZE.min(n - offset);
        let block = &magnitudes[offset..offset + block_len];
        let count: u32 = block.iter().sum();
        encode_pulse_count(enc, rate_level, count)?;
        encode_shell(enc, block)?;
        offset += block_len;
    }

    for &value in residual {
        if value != 0 {
            enc.encode_bit_logp(u32::from(value > 0), 1)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dither_is_bounded() {
        let mut dither = Dither::new(1);
        for _ in 0..1000 {
            let v = dither.next();
            assert!((-0.5..0.5).contains(&v));
        }
    }

    #[test]
    fn test_excitation_roundtrip_single_block() {
        let residual = [0_i32, 1, -1, 3, -2, 0, 5, 0, -4, 2, 0, 0, 1, -1, 0, 6];
        let mut storage = vec![0_u8; 256];
        let mut enc = RangeEncoder::new(&mut storage);
        encode_excitation(&mut enc, &residual, 20).unwrap();
        enc.done().unwrap();
        drop(enc);

        let mut dec = RangeDecoder::new(&storage);
        let mut dither = Dither::new(0);
        let decoded = decode_excitation(&mut dec, residual.len(), 20, &mut dither).unwrap();
        for (d, &r) in decoded.iter().zip(residual.iter()) {
            assert!((d - r as f32).abs() < 1.0);
        }
    }

    #[test]
    fn test_excitation_roundtrip_partial_tail_block() {
        let residual = [2_i32, -2, 0, 1, 0, 0, 3, -1, 0, 0, 1, 1, 0, 2, -3, 0, 1, -1, 0, 4];
        let mut storage = vec![0_u8; 256];
        let mut enc = RangeEncoder::new(&mut storage);
        encode_excitation(&mut enc, &residual, 5).unwrap();
        enc.done().unwrap();
        drop(enc);

        let mut dec = RangeDecoder::new(&storage);
        let mut dither = Dither::new(3);
        let decoded = decode_excitation(&mut dec, residual.len(), 5, &mut dither).unwrap();
        for (d, &r) in decoded.iter().zip(residual.iter()) {
            assert!((d - r as f32).abs() < 1.0);
        }
    }

    #[test]
    fn test_all_silent_block_consumes_no_shell_bits() {
        let residual = [0_i32; 16];
        let mut storage = vec![0_u8; 64];
        let mut enc = RangeEncoder::new(&mut storage);
        encode_excitation(&mut enc, &residual, 0).unwrap();
        enc.done().unwrap();
        drop(enc);

        let mut dec = RangeDecoder::new(&storage);
        let mut dither = Dither::new(0);
        let decoded = decode_excitation(&mut dec, residual.len(), 0, &mut dither).unwrap();
        for v in decoded {
            assert!(v.abs() < 0.25);
        }
    }
}
