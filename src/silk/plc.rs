//! Packet-loss concealment for SILK.
//!
//! `spec.md` §4.2.6: on a lost frame, extrapolate the last voiced excitation
//! through the most recent LPC filter with a decaying gain, rather than
//! emitting silence. Each successive lost frame decays further.

const FADE_PER_FRAME: f32 = 0.8;
const MIN_GAIN: f32 = 0.05;

#[derive(Clone, Debug)]
pub(crate) struct SilkPlcState {
    last_lpc: Vec<f32>,
    last_excitation: Vec<f32>,
    gain: f32,
    lost_count: u32,
}

impl SilkPlcState {
    pub(crate) fn new(order: usize) -> Self {
        Self {
            last_lpc: vec![0.0_f32; order],
            last_excitation: Vec::new(),
            gain: 0.0,
            lost_count: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.last_lpc.iter_mut().for_each(|x| *x = 0.0);
        self.last_excitation.clear();
        self.gain = 0.0;
        self.lost_count = 0;
    }

    pub(crate) fn note_good_frame(&mut self, lpc: &[f32], excitation: &[f32]) {
        self.last_lpc = lpc.to_vec();
        self.last_excitation = excitation.to_vec();
        self.gain = 1.0;
        self.lost_count = 0;
    }

    /// Fills `out` with a decaying extrapolation of the last good frame's
    /// excitation run back through its LPC filter.
    pub(crate) fn conceal(&mut self, history: &[f32], out: &mut [f32]) {
        self.lost_count += 1;
        self.gain = (self.gain * FADE_PER_FRAME).max(0.0);
        if self.gain < MIN_GAIN || self.last_excitation.is_empty() {
            out.iter_mut().for_each(|x| *x = 0.0);
            return;
        }

        let order = self.last_lpc.len();
        let mut hist: Vec<f32> = if history.len() >= order {
            history[history.len() - order..].to_vec()
        } else {
            let mut h = vec![0.0_f32; order - history.len()];
            h.extend_from_slice(history);
            h
        };

        for (i, slot) in out.iter_mut().enumerate() {
            let driven = self.last_excitation[i % self.last_excitation.len()] * self.gain;
            let mut predicted = 0.0_f32;
            for (j, &a) in self.last_lpc.iter().enumerate() {
                predicted += a * hist[order - 1 - j];
            }
            let y = driven + predicted;
            hist.rotate_left(1);
            hist[order - 1] = y;
            *slot = y;
        }
    }
}
