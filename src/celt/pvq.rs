//! Pyramid vector quantization (PVQ) using combinatorial
//! Cauchy-Wantanabe-Reimer-Smith (CWRS) indexing.
//!
//! `spec.md` §4.3.5. A length-`n` vector with exactly `k` unit pulses (each
//! position holding a signed integer count, magnitudes summing to `k`) is
//! uniquely identified by an integer in `[0, v(n, k))`, range-coded
//! uniformly. `v(n, k)` is the number of such vectors — the "pyramid
//! volume".

use crate::decoder_error::DecoderError;
use crate::encoder_error::EncoderError;
use crate::range_coder::{RangeDecoder, RangeEncoder};

/// Computes `v(n, k)`, the number of length-`n` integer vectors whose
/// entries' absolute values sum to `k` (the pyramid volume / CWRS table
/// entry), via the standard recurrence
/// `v(n, k) = v(n-1, k) + v(n, k-1) + v(n-1, k-1)`, with `v(n, 0) = 1` and
/// `v(1, k) = 2` for `k > 0` (the single dimension is `+k` or `-k`).
pub(crate) fn pyramid_volume(n: usize, k: usize) -> u64 {
    if n == 0 {
        return if k == 0 { 1 } else { 0 };
    }
    if k == 0 {
        return 1;
    }
    if n == 1 {
        return 2;
    }

    // row[k] = v(row_n, k) for the current row, built bottom-up in n.
    let mut row = vec![0u64; k + 1];
    row[0] = 1;
    for kk in 1..=k {
        row[kk] = 2;
    }

    for _ in 2..=n {
        let mut next = vec![0u64; k + 1];
        next[0] = 1;
        for kk in 1..=k {
            next[kk] = row[kk] + next[kk - 1] + row[kk - 1];
        }
        row = next;
    }

    row[k]
}

/// Encodes a pulse vector (length `n`, exactly `k` pulses distributed
/// across `positions`/`signs`) as a CWRS index and writes it with a
/// uniform range-coder symbol.
///
/// Positions are visited left to right. At each position the remaining
/// index space is partitioned into contiguous buckets, in this order: the
/// "no pulse here" bucket (width `v(rest, remaining_k)`), then for each
/// magnitude `m` from 1 up to `remaining_k`, a positive-sign bucket and a
/// negative-sign bucket (each of width `v(rest, remaining_k - m)`). Because
/// every bucket's width equals the total index space of the corresponding
/// sub-problem (the same partitioning one level down), the contribution of
/// each position is simply additive.
pub(crate) fn encode_pulse_vector(
    enc: &mut RangeEncoder<'_>,
    pulses: &[i32],
    n: usize,
    k: usize,
) -> Result<(), EncoderError> {
    if pulses.len() != n {
        return Err(EncoderError::InternalInconsistency(
            "pvq: pulse vector length mismatch",
        ));
    }
    if k == 0 {
        return Ok(());
    }

    let total = pyramid_volume(n, k);
    if total > u32::MAX as u64 {
        return Err(EncoderError::InternalInconsistency(
            "pvq: pyramid volume exceeds range coder symbol width",
        ));
    }

    let mut index: u64 = 0;
    let mut remaining_k = k;

    for i in 0..n {
        let rest = n - i - 1;
        let value = pulses[i];

        if value == 0 {
            continue;
        }

        let m = value.unsigned_abs() as usize;
        if m > remaining_k {
            return Err(EncoderError::InternalInconsistency(
                "pvq: pulse vector magnitude exceeds remaining budget",
            ));
        }

        index += pyramid_volume(rest, remaining_k);
        for j in 1..m {
            index += 2 * pyramid_volume(rest, remaining_k - j);
        }
        if value < 0 {
            index += pyramid_volume(rest, remaining_k - m);
        }

        remaining_k -= m;
    }

    enc.encode_uint(index as u32, total as u32)
}

/// Decodes a CWRS index back into a length-`n`, `k`-pulse integer vector.
/// See [`encode_pulse_vector`] for the bucket layout this inverts.
pub(crate) fn decode_pulse_vector(
    dec: &mut RangeDecoder<'_>,
    n: usize,
    k: usize,
) -> Result<Vec<i32>, DecoderError> {
    let mut pulses = vec![0_i32; n];
    if k == 0 {
        return Ok(pulses);
    }

    let total = pyramid_volume(n, k);
    if total > u32::MAX as u64 {
        return Err(DecoderError::InternalInconsistency(
            "pvq: pyramid volume exceeds range coder symbol width",
        ));
    }

    let mut index = dec.decode_uint(total as u32) as u64;
    let mut remaining_k = k;

    for i in 0..n {
        let rest = n - i - 1;

        let zero_width = pyramid_volume(rest, remaining_k);
        if index < zero_width {
            continue;
        }
        index -= zero_width;

        let mut found = false;
        for m in 1..=remaining_k {
            let bucket = pyramid_volume(rest, remaining_k - m);

            if index < bucket {
                pulses[i] = m as i32;
                remaining_k -= m;
                found = true;
                break;
            }
            index -= bucket;

            if index < bucket {
                pulses[i] = -(m as i32);
                remaining_k -= m;
                found = true;
                break;
            }
            index -= bucket;
        }

        if !found {
            return Err(DecoderError::InternalInconsistency(
                "pvq: CWRS index out of range",
            ));
        }
    }

    Ok(pulses)
}

/// L2-normalizes an integer pulse vector into a unit-norm `f32` shape.
pub(crate) fn normalize_pulses(pulses: &[i32], out: &mut [f32]) {
    let norm: f32 = pulses.iter().map(|&p| (p * p) as f32).sum::<f32>().sqrt();
    if norm > 0.0 {
        let inv = 1.0 / norm;
        for (o, &p) in out.iter_mut().zip(pulses.iter()) {
            *o = p as f32 * inv;
        }
    } else {
        for o in out.iter_mut() {
            *o = 0.0;
        }
    }
}

/// Greedy pulse search: given a unit-norm target shape, finds the `k`-pulse
/// integer vector maximizing correlation with the target (the encoder side
/// of PVQ shape coding, `spec.md` §4.3.5).
pub(crate) fn search_pulses(target: &[f32], n: usize, k: usize) -> Vec<i32> {
    let mut pulses = vec![0_i32; n];
    let mut residual: Vec<f32> = target[..n].to_vec();

    for _ in 0..k {
        let mut best_i = 0;
        let mut best_gain = f32::MIN;
        let mut best_sign = 1_i32;

        for (i, &r) in residual.iter().enumerate() {
            let sign = if r < 0.0 { -1.0 } else { 1.0 };
            let gain = r * sign;
            if gain > best_gain {
                best_gain = gain;
                best_i = i;
                best_sign = if sign < 0.0 { -1 } else { 1 };
            }
        }

        pulses[best_i] += best_sign;
        residual[best_i] -= best_sign as f32;
    }

    pulses
}
