//! Static tables describing the fixed CELT "mode": Bark-scale band
//! boundaries, the Vorbis overlap window and the per-`LM` band counts.
//!
//! `spec.md` §4.3.1.

/// Number of Bark-scale bands used by CELT.
pub(crate) const NUM_BANDS: usize = 21;

/// Band boundaries in MDCT bins at `LM == 0` (120-sample frames). Bins for
/// any other frame size are `EBANDS[i] << LM`. This is the canonical 21-band
/// split used throughout the Opus reference (bands follow roughly the Bark
/// scale, compressed below 1 kHz and stretched above 8 kHz).
pub(crate) const EBANDS: [u16; NUM_BANDS + 1] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 12, 14, 16, 20, 24, 28, 34, 40, 48, 60, 78, 100,
];

/// Number of bands that are actually coded at each `LM` (log2(frame_size /
/// 120)) — higher bands collapse below the minimum-3-bin PVQ rule at short
/// frame sizes. `spec.md` §4.3.1.
pub(crate) const EFFECTIVE_BANDS: [usize; 4] = [13, 17, 19, 21];

/// The Vorbis overlap window used for MDCT overlap-add, satisfying
/// `w[i]^2 + w[overlap-1-i]^2 == 1`. `spec.md` §4.3.6 / §8.1.
pub(crate) const OVERLAP: usize = 120;

pub(crate) const WINDOW: [f32; OVERLAP] = [
    6.7286966e-05,
    0.00060551348,
    0.001681597,
    0.0032947962,
    0.0054439943,
    0.0081276923,
    0.011344001,
    0.015090633,
    0.019364886,
    0.024163635,
    0.029483315,
    0.035319905,
    0.041668911,
    0.048525347,
    0.055883718,
    0.063737999,
    0.072081616,
    0.080907428,
    0.090207705,
    0.099974111,
    0.11019769,
    0.12086883,
    0.13197729,
    0.14351214,
    0.15546177,
    0.16781389,
    0.1805555,
    0.1936729,
    0.20715171,
    0.22097682,
    0.23513243,
    0.24960208,
    0.2643686,
    0.27941419,
    0.2947204,
    0.31026818,
    0.32603788,
    0.34200931,
    0.35816177,
    0.37447407,
    0.39092462,
    0.40749142,
    0.42415215,
    0.44088423,
    0.45766484,
    0.47447104,
    0.49127978,
    0.50806798,
    0.52481261,
    0.54149077,
    0.55807973,
    0.57455701,
    0.59090049,
    0.60708841,
    0.62309951,
    0.63891306,
    0.65450896,
    0.66986776,
    0.68497077,
    0.6998001,
    0.71433873,
    0.72857055,
    0.74248043,
    0.75605425,
    0.76927895,
    0.78214257,
    0.7946343,
    0.80674445,
    0.81846456,
    0.82978733,
    0.84070669,
    0.85121779,
    0.86131698,
    0.87100183,
    0.88027111,
    0.88912479,
    0.89756398,
    0.90559094,
    0.91320904,
    0.9204227,
    0.92723738,
    0.93365955,
    0.93969656,
    0.94535671,
    0.95064907,
    0.95558353,
    0.96017067,
    0.96442171,
    0.96834849,
    0.97196334,
    0.97527906,
    0.97830883,
    0.98106616,
    0.9835648,
    0.98581869,
    0.98784191,
    0.98964856,
    0.99125274,
    0.99266849,
    0.99390969,
    0.99499004,
    0.99592297,
    0.99672162,
    0.99739874,
    0.99796667,
    0.99843728,
    0.99882195,
    0.99913147,
    0.99937606,
    0.99956527,
    0.99970802,
    0.99981248,
    0.99988613,
    0.99993565,
    0.99996697,
    0.99998518,
    0.99999457,
    0.99999859,
    0.99999982,
    1.0,
];

/// `LM = log2(frame_size / 120)`, one of `{0, 1, 2, 3}` for frame sizes
/// `{120, 240, 480, 960}`.
#[inline]
pub(crate) fn lm_for_frame_size(frame_size: usize) -> Option<usize> {
    match frame_size {
        120 => Some(0),
        240 => Some(1),
        480 => Some(2),
        960 => Some(3),
        _ => None,
    }
}

/// Band boundary (in MDCT bins) for band `band` at the given `LM`.
#[inline]
pub(crate) fn band_bin(band: usize, lm: usize) -> usize {
    (EBANDS[band] as usize) << lm
}

/// Number of coded bands for the given `LM`.
#[inline]
pub(crate) fn eff_bands(lm: usize) -> usize {
    EFFECTIVE_BANDS[lm]
}
