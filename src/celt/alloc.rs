//! Per-band bit allocation.
//!
//! `spec.md` §4.3.4. Given the total bit budget remaining after the header
//! fields, splits it across bands into PVQ shape bits (from which the
//! pulse count `k` is derived via [`bits_to_pulses`]) and fine-energy bits,
//! using a fixed per-band weight table interpolated by a trim value and
//! adjusted by band boosts.

use crate::celt::mode::NUM_BANDS;
use crate::celt::pvq::pyramid_volume;

/// Base per-band allocation weight (in eighth-bits, `spec.md`'s `BITRES`
/// unit), roughly modeling the reference's higher weighting of
/// perceptually important low/mid bands.
const BASE_WEIGHT: [u32; NUM_BANDS] = [
    24, 24, 24, 24, 24, 24, 24, 24, 22, 22, 20, 20, 18, 18, 16, 16, 14, 12, 10, 8, 6,
];

/// Trim values range `[-2, 2]` (`spec.md` §4.3.4); each unit tilts
/// allocation toward low (negative trim) or high (positive trim) bands.
pub(crate) const TRIM_MIN: i32 = -2;
pub(crate) const TRIM_MAX: i32 = 2;

/// Number of fine-energy bits per band, reserved before PVQ bits are
/// handed out (matches the decode order in `spec.md` §4.3.7: fine energy
/// consumes its allocation, then PVQ shape coding uses what's left).
const FINE_ENERGY_BITS_PER_BAND: i32 = 1;

/// The result of a bit-allocation pass: per-band PVQ pulse counts and
/// fine-energy bit counts, plus leftover "final" energy bits.
pub(crate) struct Allocation {
    pub(crate) pulses: Vec<usize>,
    pub(crate) fine_bits: Vec<i32>,
    pub(crate) balance_bits: i32,
}

/// Computes the per-band allocation for `num_bands` bands at the given
/// `lm`, a `total_bits` budget (in eighth-bits, i.e. `spec.md`'s
/// `BITRES`-scaled unit matching `Tell::tell_frac`), a `trim` value in
/// `[TRIM_MIN, TRIM_MAX]`, and optional per-band boosts (range-coded
/// dynamic allocation, already decoded into eighth-bits by the caller).
pub(crate) fn allocate(
    num_bands: usize,
    lm: usize,
    total_bits: i32,
    trim: i32,
    boosts: &[i32],
) -> Allocation {
    let num_bands = num_bands.min(NUM_BANDS);
    let mut weights = vec![0_i64; num_bands];

    for b in 0..num_bands {
        let tilt = (b as i32 - num_bands as i32 / 2) * trim;
        let w = BASE_WEIGHT[b] as i64 + tilt as i64;
        weights[b] = w.max(1);
        if b < boosts.len() {
            weights[b] += boosts[b] as i64;
        }
    }

    let weight_sum: i64 = weights.iter().sum();

    let mut fine_bits = vec![0_i32; num_bands];
    let mut remaining = total_bits as i64;
    for b in 0..num_bands {
        fine_bits[b] = FINE_ENERGY_BITS_PER_BAND;
        remaining -= i64::from(FINE_ENERGY_BITS_PER_BAND) * 8; // eighth-bit units
    }
    remaining = remaining.max(0);

    let mut pulses = vec![0_usize; num_bands];
    for b in 0..num_bands {
        let band_bits = if weight_sum > 0 {
            (remaining * weights[b] / weight_sum) as i32
        } else {
            0
        };
        let n = crate::celt::mode::band_bin(b + 1, lm) - crate::celt::mode::band_bin(b, lm);
        pulses[b] = bits_to_pulses(n, band_bits);
    }

    let spent: i64 = pulses
        .iter()
        .enumerate()
        .map(|(b, &k)| {
            let n = crate::celt::mode::band_bin(b + 1, lm) - crate::celt::mode::band_bin(b, lm);
            pulses_to_bits(n, k)
        })
        .sum();

    let balance_bits = (remaining - spent).max(0) as i32;

    Allocation {
        pulses,
        fine_bits,
        balance_bits,
    }
}

/// Converts a bit budget (in eighth-bits) for a band of `n` coefficients
/// into the largest pulse count `k` whose PVQ index fits, via a binary
/// search on `log2(pyramid_volume(n, k))`. Monotone non-decreasing in
/// `bits`, per `spec.md` §4.3.4.
pub(crate) fn bits_to_pulses(n: usize, bits: i32) -> usize {
    if n == 0 || bits <= 0 {
        return 0;
    }

    let target_eighth_bits = bits as i64;
    let mut lo = 0_usize;
    let mut hi = 1_usize;

    while pulses_to_bits(n, hi) <= target_eighth_bits && hi < 1 << 20 {
        lo = hi;
        hi *= 2;
    }

    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if pulses_to_bits(n, mid) <= target_eighth_bits {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    lo
}

/// Eighth-bits required to code a `k`-pulse, length-`n` PVQ index
/// (`ceil(log2(pyramid_volume(n,k))) * 8`).
fn pulses_to_bits(n: usize, k: usize) -> i64 {
    if k == 0 {
        return 0;
    }
    let volume = pyramid_volume(n, k).max(1);
    let bits = 64 - (volume - 1).leading_zeros();
    i64::from(bits) * 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_to_pulses_monotone() {
        let n = 8;
        let mut prev = 0;
        for bits in (0..2000).step_by(8) {
            let k = bits_to_pulses(n, bits);
            assert!(k >= prev, "bits={bits}: k={k} < prev={prev}");
            prev = k;
        }
    }

    #[test]
    fn test_allocate_budget_not_exceeded() {
        let lm = 2;
        let num_bands = crate::celt::mode::eff_bands(lm);
        let total_bits = 4000;
        let boosts = vec![0; num_bands];
        let alloc = allocate(num_bands, lm, total_bits, 0, &boosts);

        let spent: i64 = alloc
            .pulses
            .iter()
            .enumerate()
            .map(|(b, &k)| {
                let n = crate::celt::mode::band_bin(b + 1, lm) - crate::celt::mode::band_bin(b, lm);
                pulses_to_bits(n, k)
            })
            .sum::<i64>()
            + alloc.fine_bits.iter().map(|&f| i64::from(f) * 8).sum::<i64>();

        assert!(spent <= total_bits as i64, "spent={spent} > total={total_bits}");
    }
}
