//! Linear prediction coefficient utilities.
//!
//! `spec.md` §4.2.1 requires the decoded LPC filter to be bandwidth-expanded
//! (gain-limited) so the synthesis filter stays stable even though the NLSF
//! quantizer and the polynomial conversion in [`crate::silk::lsf`] do not by
//! themselves guarantee a contractive filter.

/// Shrinks each LPC coefficient by a per-tap factor `gamma^i`, pulling the
/// filter's poles toward the origin until the sum of tap magnitudes is below
/// `1.0 - margin` — the classic "bandwidth expansion" stabilization the
/// reference applies after every NLSF-to-LPC conversion.
pub(crate) fn stabilize_lpc(a: &mut [f32], margin: f32) {
    let original = a.to_vec();
    let mut gamma = 1.0_f32;
    for _ in 0..10 {
        let sum: f32 = a.iter().map(|v| v.abs()).sum();
        if sum <= 1.0 - margin {
            return;
        }
        gamma *= 0.97;
        for (i, v) in a.iter_mut().enumerate() {
            *v = original[i] * gamma.powi(i as i32 + 1);
        }
    }
}
