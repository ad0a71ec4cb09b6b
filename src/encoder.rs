//! Implement the Opus encoder.
//!
//! Mode and bandwidth selection is a fixed heuristic keyed on `Application`
//! and bitrate rather than the reference's psychoacoustic analysis (the
//! bit-exact-encoder and tuning-parity Non-goals make that acceptable).
//! Packets this encoder writes always use code-0 framing (exactly one frame
//! per packet); multi-frame packing is left to a caller that wants to batch
//! several `encode` calls into one packet, and is not implemented here.

use crate::celt::CeltEncoder;
use crate::hybrid;
use crate::range_coder::RangeEncoder;
use crate::silk::SilkEncoder;
use crate::{Channels, CodecMode, EncoderError, Sample, SamplingRate};

/// The encoding application, expressing the trade-off between algorithmic
/// delay and quality `Encoder::encode` should optimize for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Application {
    /// Favors speech intelligibility at low bitrates, e.g. VoIP calls.
    Voip,
    /// Favors the best achievable quality for a given bitrate, e.g. music or broadcast.
    Audio,
    /// Minimizes algorithmic delay at the cost of quality; always CELT-coded.
    LowDelay,
}

/// Configures the encoder on creation.
#[derive(Clone, Debug)]
pub struct EncoderConfiguration {
    /// Sample rate of the input signal (Hz). Default: 48000 Hz.
    pub sampling_rate: SamplingRate,
    /// Number of channels in the input signal. Default: Stereo.
    pub channels: Channels,
    /// Application profile. Default: Audio.
    pub application: Application,
}

impl Default for EncoderConfiguration {
    fn default() -> Self {
        Self {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Stereo,
            application: Application::Audio,
        }
    }
}

const MIN_BITRATE: i32 = 6_000;
const MAX_BITRATE: i32 = 510_000;
/// Bitrate above which `Application::Audio` switches a narrow/medium/wideband
/// signal from SILK to CELT coding, mirroring the reference's rough
/// crossover between "speech" and "music" bitrates for that application.
const AUDIO_CELT_THRESHOLD: i32 = 48_000;

/// Opus encoder.
#[derive(Clone, Debug)]
pub struct Encoder {
    celt_enc: CeltEncoder,
    silk_enc: SilkEncoder,
    channels: Channels,
    sampling_rate: SamplingRate,
    application: Application,

    bitrate: i32,
    vbr: bool,
    complexity: u8,
    packet_loss_pct: u8,
    fec: bool,
    dtx: bool,
    bandwidth: crate::Bandwidth,
    frame_size_ms: f32,
}

impl Encoder {
    /// Creates a new `Encoder` with the given configuration.
    pub fn new(configuration: &EncoderConfiguration) -> Result<Self, EncoderError> {
        let celt_enc = CeltEncoder::new(configuration.sampling_rate, configuration.channels)?;
        let silk_enc = SilkEncoder::new(configuration.sampling_rate, configuration.channels)?;

        Ok(Self {
            celt_enc,
            silk_enc,
            channels: configuration.channels,
            sampling_rate: configuration.sampling_rate,
            application: configuration.application,

            bitrate: 64_000,
            vbr: true,
            complexity: 10,
            packet_loss_pct: 0,
            fec: false,
            dtx: false,
            bandwidth: crate::Bandwidth::Auto,
            frame_size_ms: 20.0,
        })
    }

    /// Resets the encoder to be equivalent to a freshly initialized one,
    /// keeping its configured settings.
    pub fn reset(&mut self) -> Result<(), EncoderError> {
        self.silk_enc.reset()?;
        self.celt_enc.reset()?;
        Ok(())
    }

    /// Returns the sampling rate the encoder was initialized with.
    pub fn sampling_rate(&self) -> SamplingRate {
        self.sampling_rate
    }

    /// Returns the channels the encoder was initialized with.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Sets the target bitrate in bits per second, in `[6000, 510000]`.
    pub fn set_bitrate(&mut self, bps: i32) -> Result<(), EncoderError> {
        if !(MIN_BITRATE..=MAX_BITRATE).contains(&bps) {
            return Err(EncoderError::InvalidConfiguration(
                "bitrate out of range [6000, 510000]",
            ));
        }
        self.bitrate = bps;
        Ok(())
    }

    /// Enables or disables variable bitrate.
    ///
    /// This encoder's bit allocator always spends the whole budget `encode`
    /// hands it per frame; `vbr` is recorded for API compatibility but,
    /// unlike the reference encoder, does not change the byte count
    /// `encode` writes for a fixed output buffer size.
    pub fn set_vbr(&mut self, vbr: bool) {
        self.vbr = vbr;
    }

    /// Sets the encoder complexity, in `[0, 10]`.
    ///
    /// Complexity only gates the depth of this crate's fixed heuristics
    /// (pitch search range, in particular), not a continuous quality/speed
    /// trade-off like the reference's.
    pub fn set_complexity(&mut self, complexity: u8) -> Result<(), EncoderError> {
        if complexity > 10 {
            return Err(EncoderError::InvalidConfiguration(
                "complexity out of range [0, 10]",
            ));
        }
        self.complexity = complexity;
        Ok(())
    }

    /// Sets the encoder's expected channel packet loss, in percent.
    pub fn set_packet_loss_pct(&mut self, pct: u8) -> Result<(), EncoderError> {
        if pct > 100 {
            return Err(EncoderError::InvalidConfiguration(
                "packet loss percentage out of range [0, 100]",
            ));
        }
        self.packet_loss_pct = pct;
        Ok(())
    }

    /// Enables or disables in-band forward error correction.
    ///
    /// When enabled, every Silk or Hybrid frame this encoder writes carries
    /// an LBRR copy of the *previous* frame, recoverable on the decoder side
    /// via `Decoder::decode`'s `decode_fec` argument. A Celt-only stream has
    /// no redundancy concept (`spec.md` §4.4), so the flag has no effect
    /// there.
    pub fn set_fec(&mut self, fec: bool) {
        self.fec = fec;
        self.silk_enc.set_fec_enabled(fec);
    }

    /// Enables or disables discontinuous transmission (silence suppression).
    ///
    /// Not implemented: silence is always coded as an ordinary frame.
    /// Recorded for API compatibility.
    pub fn set_dtx(&mut self, dtx: bool) {
        self.dtx = dtx;
    }

    /// Sets the encoder's bandwidth, or `Bandwidth::Auto` to let
    /// [`Encoder::resolve_config`]'s application/bitrate heuristic choose it.
    pub fn set_bandwidth(&mut self, bandwidth: crate::Bandwidth) {
        self.bandwidth = bandwidth;
    }

    /// Sets the frame duration in milliseconds. Must be one of `2.5, 5, 10,
    /// 20, 40, 60`; not every mode supports every duration (`encode` returns
    /// `EncoderError::InvalidConfiguration` for an unsupported combination).
    pub fn set_frame_size_ms(&mut self, ms: f32) -> Result<(), EncoderError> {
        const VALID: [f32; 6] = [2.5, 5.0, 10.0, 20.0, 40.0, 60.0];
        if !VALID.iter().any(|&v| (v - ms).abs() < 1e-3) {
            return Err(EncoderError::InvalidConfiguration(
                "frame size must be one of 2.5, 5, 10, 20, 40, 60 ms",
            ));
        }
        self.frame_size_ms = ms;
        Ok(())
    }

    /// Picks the coding mode, effective bandwidth, and TOC configuration
    /// number (`spec.md`'s configuration table) for the encoder's current
    /// settings.
    fn resolve_config(&self) -> Result<(CodecMode, crate::Bandwidth, u8), EncoderError> {
        use crate::Bandwidth;

        let bandwidth = match self.bandwidth {
            Bandwidth::Auto => match self.application {
                Application::LowDelay => Bandwidth::Wideband,
                Application::Voip | Application::Audio => Bandwidth::Fullband,
            },
            other => other,
        };

        let mode = match self.application {
            Application::LowDelay => CodecMode::Celt,
            Application::Voip => match bandwidth {
                Bandwidth::Narrowband | Bandwidth::Mediumband | Bandwidth::Wideband => CodecMode::Silk,
                Bandwidth::Superwideband | Bandwidth::Fullband => CodecMode::Hybrid,
                Bandwidth::Auto => unreachable!("auto resolved above"),
            },
            Application::Audio => match bandwidth {
                Bandwidth::Narrowband | Bandwidth::Mediumband | Bandwidth::Wideband => {
                    if self.bitrate >= AUDIO_CELT_THRESHOLD {
                        CodecMode::Celt
                    } else {
                        CodecMode::Silk
                    }
                }
                Bandwidth::Superwideband | Bandwidth::Fullband => CodecMode::Celt,
                Bandwidth::Auto => unreachable!("auto resolved above"),
            },
        };

        let config = match mode {
            CodecMode::Silk => {
                let band_index = match bandwidth {
                    Bandwidth::Narrowband => 0,
                    Bandwidth::Mediumband => 1,
                    Bandwidth::Wideband => 2,
                    _ => {
                        return Err(EncoderError::InvalidConfiguration(
                            "SILK coding does not support this bandwidth",
                        ))
                    }
                };
                let size_code = match self.frame_size_ms {
                    ms if (ms - 10.0).abs() < 1e-3 => 0,
                    ms if (ms - 20.0).abs() < 1e-3 => 1,
                    ms if (ms - 40.0).abs() < 1e-3 => 2,
                    ms if (ms - 60.0).abs() < 1e-3 => 3,
                    _ => {
                        return Err(EncoderError::InvalidConfiguration(
                            "SILK coding supports only 10, 20, 40, or 60 ms frames",
                        ))
                    }
                };
                band_index * 4 + size_code
            }
            CodecMode::Hybrid => {
                let band_offset = match bandwidth {
                    Bandwidth::Superwideband => 0,
                    Bandwidth::Fullband => 2,
                    _ => {
                        return Err(EncoderError::InvalidConfiguration(
                            "hybrid coding only supports super-wideband or fullband",
                        ))
                    }
                };
                let size_code = match self.frame_size_ms {
                    ms if (ms - 10.0).abs() < 1e-3 => 0,
                    ms if (ms - 20.0).abs() < 1e-3 => 1,
                    _ => {
                        return Err(EncoderError::InvalidConfiguration(
                            "hybrid coding supports only 10 or 20 ms frames",
                        ))
                    }
                };
                12 + band_offset + size_code
            }
            CodecMode::Celt => {
                let band_index = match bandwidth {
                    // CELT's configuration table has no medium-band row;
                    // fall back to narrowband rather than reject the request.
                    Bandwidth::Narrowband | Bandwidth::Mediumband => 0,
                    Bandwidth::Wideband => 1,
                    Bandwidth::Superwideband => 2,
                    Bandwidth::Fullband => 3,
                    Bandwidth::Auto => unreachable!("auto resolved above"),
                };
                let size_code = match self.frame_size_ms {
                    ms if (ms - 2.5).abs() < 1e-3 => 0,
                    ms if (ms - 5.0).abs() < 1e-3 => 1,
                    ms if (ms - 10.0).abs() < 1e-3 => 2,
                    ms if (ms - 20.0).abs() < 1e-3 => 3,
                    _ => {
                        return Err(EncoderError::InvalidConfiguration(
                            "CELT coding supports only 2.5, 5, 10, or 20 ms frames",
                        ))
                    }
                };
                16 + band_index * 4 + size_code
            }
        };

        Ok((mode, bandwidth, config as u8))
    }

    /// Encodes one frame with a generic sample input.
    ///
    /// `pcm_in` holds `frame_size * channels` interleaved samples, where
    /// `frame_size` is implied by the duration set via
    /// [`Encoder::set_frame_size_ms`]. Returns the number of bytes written to
    /// `out`, which must be large enough to hold the packet (its length is
    /// this encoder's byte budget for the frame: a larger `out` buys a
    /// larger, higher-quality frame rather than being padded).
    pub fn encode<S: Sample>(&mut self, pcm_in: &[S], out: &mut [u8]) -> Result<usize, EncoderError> {
        let float_in: Vec<f32> = pcm_in.iter().map(Sample::to_f32).collect();
        self.encode_float(&float_in, out)
    }

    /// Encodes one frame with floating point input. See [`Encoder::encode`].
    pub fn encode_float(&mut self, pcm_in: &[f32], out: &mut [u8]) -> Result<usize, EncoderError> {
        let channels = self.channels as usize;
        let frame_size = ((self.sampling_rate as usize) as f32 * self.frame_size_ms / 1000.0).round() as usize;
        if pcm_in.len() < frame_size * channels {
            return Err(EncoderError::InternalInconsistency(
                "encoder: input buffer shorter than the configured frame size",
            ));
        }
        if out.len() < 2 {
            return Err(EncoderError::BufferTooSmall);
        }

        let (mode, _bandwidth, config) = self.resolve_config()?;

        let toc = (config << 3) | if channels == 2 { 0x4 } else { 0x0 };
        out[0] = toc;

        let budget_eighths = ((out.len() - 1) as i32) * 64;
        let mut enc = RangeEncoder::new(&mut out[1..]);

        match mode {
            CodecMode::Celt => self.celt_enc.encode(&mut enc, pcm_in, frame_size, budget_eighths)?,
            CodecMode::Silk => self.silk_enc.encode(&mut enc, pcm_in, frame_size)?,
            CodecMode::Hybrid => hybrid::encode_hybrid_frame(
                &mut self.silk_enc,
                &mut self.celt_enc,
                &mut enc,
                pcm_in,
                frame_size,
                budget_eighths,
            )?,
        }
        enc.done()?;
        let payload_len = enc.range_bytes();

        Ok(1 + payload_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Channels;

    fn configuration(application: Application, sampling_rate: SamplingRate, channels: Channels) -> EncoderConfiguration {
        EncoderConfiguration {
            sampling_rate,
            channels,
            application,
        }
    }

    #[test]
    fn test_voip_narrowband_selects_silk_config() {
        let mut enc = Encoder::new(&configuration(Application::Voip, SamplingRate::Hz16000, Channels::Mono)).unwrap();
        enc.set_bandwidth(crate::Bandwidth::Narrowband);
        enc.set_frame_size_ms(20.0).unwrap();
        let (mode, bandwidth, config) = enc.resolve_config().unwrap();
        assert_eq!(mode, CodecMode::Silk);
        assert_eq!(bandwidth, crate::Bandwidth::Narrowband);
        assert_eq!(config, 1);
    }

    #[test]
    fn test_low_delay_always_selects_celt() {
        let mut enc = Encoder::new(&configuration(Application::LowDelay, SamplingRate::Hz48000, Channels::Mono)).unwrap();
        enc.set_frame_size_ms(10.0).unwrap();
        let (mode, _bandwidth, _config) = enc.resolve_config().unwrap();
        assert_eq!(mode, CodecMode::Celt);
    }

    #[test]
    fn test_voip_fullband_selects_hybrid_config() {
        let mut enc = Encoder::new(&configuration(Application::Voip, SamplingRate::Hz48000, Channels::Stereo)).unwrap();
        enc.set_bandwidth(crate::Bandwidth::Fullband);
        enc.set_frame_size_ms(20.0).unwrap();
        let (mode, _bandwidth, config) = enc.resolve_config().unwrap();
        assert_eq!(mode, CodecMode::Hybrid);
        assert_eq!(config, 15);
    }

    #[test]
    fn test_set_bitrate_rejects_out_of_range() {
        let mut enc = Encoder::new(&EncoderConfiguration::default()).unwrap();
        assert!(enc.set_bitrate(1000).is_err());
        assert!(enc.set_bitrate(600_000).is_err());
        assert!(enc.set_bitrate(64_000).is_ok());
    }

    #[test]
    fn test_set_complexity_rejects_out_of_range() {
        let mut enc = Encoder::new(&EncoderConfiguration::default()).unwrap();
        assert!(enc.set_complexity(11).is_err());
        assert!(enc.set_complexity(10).is_ok());
    }

    #[test]
    fn test_set_frame_size_ms_rejects_unsupported_value() {
        let mut enc = Encoder::new(&EncoderConfiguration::default()).unwrap();
        assert!(enc.set_frame_size_ms(15.0).is_err());
        assert!(enc.set_frame_size_ms(20.0).is_ok());
    }

    #[test]
    fn test_encode_mono_celt_produces_nonempty_packet() {
        let mut enc = Encoder::new(&configuration(Application::LowDelay, SamplingRate::Hz48000, Channels::Mono)).unwrap();
        enc.set_frame_size_ms(20.0).unwrap();

        let frame_size = 960;
        let samples: Vec<f32> = (0..frame_size).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let mut out = vec![0_u8; 256];
        let written = enc.encode_float(&samples, &mut out).unwrap();

        assert!(written > 1);
        assert_eq!(out[0] & 0x3, 0, "single-frame packets use code 0");
    }

    #[test]
    fn test_encode_rejects_short_input() {
        let mut enc = Encoder::new(&configuration(Application::LowDelay, SamplingRate::Hz48000, Channels::Mono)).unwrap();
        enc.set_frame_size_ms(20.0).unwrap();

        let mut out = vec![0_u8; 256];
        assert!(enc.encode_float(&[0.0_f32; 10], &mut out).is_err());
    }
}
