//! Implement the Opus decoder.

use crate::celt::CeltDecoder;
use crate::hybrid::{self, HybridDelayLine};
use crate::range_coder::{RangeDecoder, Tell};
use crate::silk::SilkDecoder;
use crate::{
    parse_packet, pcm_soft_clip, query_packet_bandwidth, query_packet_channel_count, query_packet_codec_mode,
    query_packet_samples_per_frame, Bandwidth, Channels, CodecMode, DecoderError, Sample, SamplingRate,
};

/// Configures the decoder on creation.
///
/// Internally Opus stores data at 48000 Hz, so that should be the default
/// value for the sampling rate. However, the decoder can efficiently decode
/// to buffers at 8, 12, 16, and 24 kHz so if for some reason the caller cannot
/// use data at the full sample rate, or knows the compressed data doesn't
/// use the full frequency range, it can request decoding at a reduced
/// rate. Likewise, the decoder is capable of filling in either mono or
/// interleaved stereo pcm buffers, at the caller's request.
#[derive(Clone, Debug)]
pub struct DecoderConfiguration {
    /// Sample rate to decode at (Hz). Default: 48000 kHz.
    pub sampling_rate: SamplingRate,
    /// Number of channels to decode. Default: Stereo.
    pub channels: Channels,
    /// Scales the decoded output by a factor specified in Q8 dB units. Default: 0.
    pub gain: i16,
}

impl Default for DecoderConfiguration {
    fn default() -> Self {
        Self {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Stereo,
            gain: 0,
        }
    }
}

/// Opus decoder.
///
/// Opus is a stateful codec with overlapping blocks and as a result Opus
/// packets are not coded independently of each other. Packets must be
/// passed into the decoder serially and in the correct order for a correct
/// decode. Lost packets can be replaced with loss concealment by calling
/// the decoder with `None` for the missing packet.
#[derive(Clone, Debug)]
pub struct Decoder {
    celt_dec: CeltDecoder,
    silk_dec: SilkDecoder,
    hybrid_delay: HybridDelayLine,
    channels: Channels,
    sampling_rate: SamplingRate,
    decode_gain: i16,

    stream_channels: Channels,
    bandwidth: Bandwidth,
    mode: Option<CodecMode>,
    prev_mode: Option<CodecMode>,
    frame_size: usize,
    prev_redundancy: Option<usize>,
    last_packet_duration: Option<u32>,
    softclip_mem: Vec<f32>,

    final_range: u32,
}

impl Decoder {
    /// Creates a new `Decoder` with the given configuration.
    pub fn new(configuration: &DecoderConfiguration) -> Result<Self, DecoderError> {
        let celt_dec = CeltDecoder::new(configuration.sampling_rate, configuration.channels)?;
        let silk_dec = SilkDecoder::new(configuration.sampling_rate, configuration.channels)?;
        let hybrid_delay = HybridDelayLine::new(configuration.sampling_rate, configuration.channels as usize);

        Ok(Self {
            celt_dec,
            silk_dec,
            hybrid_delay,
            sampling_rate: configuration.sampling_rate,
            channels: configuration.channels,
            decode_gain: configuration.gain,
            stream_channels: configuration.channels,
            bandwidth: Bandwidth::Auto,
            mode: None,
            prev_mode: None,
            frame_size: configuration.sampling_rate as usize / 400,
            prev_redundancy: None,
            last_packet_duration: None,
            softclip_mem: vec![0.0_f32; configuration.channels as usize],

            final_range: 0,
        })
    }

    /// Resets the Decoder to be equivalent to a freshly initialized decoder.
    ///
    /// This should be called when switching streams in order to prevent
    /// the back to back decoding from giving different results from
    /// one at a time decoding.
    pub fn reset(&mut self) -> Result<(), DecoderError> {
        self.silk_dec.reset()?;
        self.celt_dec.reset()?;
        self.hybrid_delay.reset();

        self.stream_channels = self.channels;
        self.bandwidth = Bandwidth::Auto;
        self.mode = None;
        self.prev_mode = None;
        self.frame_size = self.sampling_rate as usize / 400;
        self.prev_redundancy = None;
        self.last_packet_duration = None;
        self.softclip_mem.iter_mut().for_each(|x| *x = 0.0);

        Ok(())
    }

    /// Returns the sampling rate the decoder was initialized with.
    pub fn sampling_rate(&self) -> SamplingRate {
        self.sampling_rate
    }

    /// Returns the channels the decoder was initialized with.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Returns the amount to scale PCM signal by in Q8 dB units.
    pub fn gain(&self) -> i16 {
        self.decode_gain
    }

    /// Returns the decoder's last bandpass.
    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    /// Returns the pitch of the last decoded frame, measured in samples at 48 kHz
    pub fn pitch(&self) -> Option<u32> {
        if let Some(prev_mode) = self.prev_mode {
            match prev_mode {
                CodecMode::Celt => Some(self.celt_dec.pitch()),
                CodecMode::Silk | CodecMode::Hybrid => Some(self.silk_dec.pitch()),
            }
        } else {
            None
        }
    }

    /// Returns the duration (in samples) of the last packet successfully decoded or concealed.
    pub fn last_packet_duration(&self) -> Option<u32> {
        self.last_packet_duration
    }

    /// Returns the final state of the codec's entropy coder.
    ///
    /// This is used for testing purposes, the encoder and decoder state
    /// should be identical after coding a payload assuming no data
    /// corruption or software bugs).
    pub fn final_range(&mut self) -> u32 {
        self.final_range
    }

    /// Decode an Opus packet with a generic sample output.
    ///
    /// Returns number of decoded samples.
    ///
    /// Caller needs to make sure that the samples buffer has enough space to fit
    /// all samples inside the packet. Call `query_packet_sample_count()` to query
    /// the number of samples inside a packet and resize the buffer if needed.
    ///
    /// The internal format is `f32`. Use `decode_float()` to access it directly.
    ///
    /// # Arguments
    /// * `packet`     - Input payload. Use a `None` to indicate packet loss.
    /// * `samples`    - Output signal encoded as PCM samples (interleaved if 2 channels).
    ///                  Length must be at least `frame_size` * `channels`.
    /// * `frame_size` - Number of samples per channel of available space in a PCM.
    ///                  `frame_size` must be a multiple of 2.5 ms (400 for 48kHz).
    ///                  In the case of PLC (packet==`None`) or FEC (decode_fec=`true`), then
    ///                  `frame_size` needs to be exactly the duration of audio that is missing,
    ///                  otherwise the decoder will not be in the optimal state to decode
    ///                  the next incoming packet.
    /// * `decode_fec` - Request that any in-band forward error correction data be decoded.
    ///                  If no such data is available, the frame is decoded as if it were lost.
    ///
    pub fn decode<S: Sample>(
        &mut self,
        packet: Option<&[u8]>,
        samples: &mut [S],
        frame_size: usize,
        decode_fec: bool,
    ) -> Result<u32, DecoderError> {
        let mut float_out = vec![0.0_f32; frame_size * self.channels as usize];
        let decoded = self.decode_float(packet, &mut float_out, frame_size, decode_fec)?;
        let sample_count = decoded as usize * self.channels as usize;
        for (dst, &src) in samples.iter_mut().zip(float_out[..sample_count].iter()) {
            *dst = S::from_f32(src);
        }
        Ok(decoded)
    }

    /// Decode an Opus packet with floating point output.
    ///
    /// Returns number of decoded samples.
    ///
    /// Caller needs to make sure that the samples buffer has enough space to fit
    /// all samples inside the packet. Call `query_packet_sample_count()` to query
    /// the number of samples inside a packet and resize the buffer if needed.
    ///
    /// # Arguments
    /// * `packet`     - Input payload. Use a `None` to indicate packet loss.
    /// * `samples`    - Output signal encoded as PCM samples (interleaved if 2 channels).
    ///                  Length is frame_size * channels.
    /// * `frame_size` - Number of samples per channel of available space in a PCM.
    ///                  `frame_size` must be a multiple of 2.5 ms (400 for 48kHz).
    ///                  In the case of PLC (packet==`None`) or FEC (decode_fec=`true`), then
    ///                  `frame_size` needs to be exactly the duration of audio that is missing,
    ///                  otherwise the decoder will not be in the optimal state to decode
    ///                  the next incoming packet.
    /// * `decode_fec` - Request that any in-band forward error correction data be decoded.
    ///                  If no such data is available, the frame is decoded as if it were lost.
    ///
    pub fn decode_float(
        &mut self,
        packet: Option<&[u8]>,
        samples: &mut [f32],
        frame_size: usize,
        decode_fec: bool,
    ) -> Result<u32, DecoderError> {
        let (decoded, _packet_offset) = self.decode_native(packet, samples, frame_size, decode_fec, false, true)?;
        Ok(decoded)
    }

    /// Returns the samples decoded and the packet_offset (used for multiple streams).
    fn decode_native(
        &mut self,
        packet: Option<&[u8]>,
        samples: &mut [f32],
        frame_size: usize,
        decode_fec: bool,
        self_delimited: bool,
        soft_clip: bool,
    ) -> Result<(u32, usize), DecoderError> {
        let channels = self.channels as usize;

        let packet = match packet {
            None => {
                self.conceal(samples, frame_size)?;
                self.last_packet_duration = Some(frame_size as u32);
                return Ok((frame_size as u32, 0));
            }
            Some(p) => p,
        };

        if packet.is_empty() {
            for x in samples.iter_mut().take(frame_size * channels) {
                *x = 0.0;
            }
            self.last_packet_duration = Some(frame_size as u32);
            return Ok((frame_size as u32, 0));
        }

        let packet_channels = query_packet_channel_count(packet);
        if packet_channels != self.channels {
            return Err(DecoderError::InvalidConfiguration(
                "packet channel count does not match the configured decoder channel count",
            ));
        }

        let mode = query_packet_codec_mode(packet);
        let bandwidth = query_packet_bandwidth(packet);
        let samples_per_frame = query_packet_samples_per_frame(packet, self.sampling_rate);

        let mut frame_offsets = [0_usize; 48];
        let mut frame_sizes = [0_usize; 48];
        let mut payload_offset = 0_usize;
        let mut packet_offset = 0_usize;
        let count = parse_packet(
            packet,
            self_delimited,
            Some(&mut frame_offsets),
            &mut frame_sizes,
            Some(&mut payload_offset),
            Some(&mut packet_offset),
        )?;

        let total_samples = count * samples_per_frame;
        if samples.len() < total_samples * channels || frame_size < total_samples {
            return Err(DecoderError::FrameSizeMismatch);
        }

        if decode_fec {
            // Forward error correction carries a low-bitrate copy of the
            // *previous* frame embedded in this packet's LBRR data. CELT
            // has no redundancy concept, so only Silk and the Silk half of
            // a Hybrid frame can ever recover anything this way; a Celt
            // frame, or a Silk/Hybrid frame whose LBRR flag turns out to be
            // unset, degrades to ordinary concealment.
            let frame_bytes = &packet[frame_offsets[0]..frame_offsets[0] + frame_sizes[0]];
            let mut dec = RangeDecoder::new(frame_bytes);
            let out = &mut samples[..total_samples * channels];

            let recovered = match mode {
                CodecMode::Celt => false,
                CodecMode::Silk => self.silk_dec.decode_fec(&mut dec, &mut *out, total_samples)?,
                CodecMode::Hybrid => {
                    let mut low = vec![0.0_f32; total_samples * channels];
                    let got = self.silk_dec.decode_fec(&mut dec, &mut low, total_samples)?;
                    if got {
                        self.hybrid_delay.apply(&mut low, total_samples);
                        out.copy_from_slice(&low);
                    }
                    got
                }
            };

            if !recovered {
                self.conceal(&mut *out, total_samples)?;
            }
            self.last_packet_duration = Some(total_samples as u32);
            return Ok((total_samples as u32, packet_offset));
        }

        self.silk_dec.set_internal_channels(packet_channels);

        for i in 0..count {
            let frame_bytes = &packet[frame_offsets[i]..frame_offsets[i] + frame_sizes[i]];
            let mut dec = RangeDecoder::new(frame_bytes);
            let budget_eighths = (frame_sizes[i] as i32) * 8 * 8;
            let out = &mut samples[i * samples_per_frame * channels..(i + 1) * samples_per_frame * channels];

            match mode {
                CodecMode::Celt => self.celt_dec.decode(&mut dec, out, samples_per_frame, budget_eighths)?,
                CodecMode::Silk => self.silk_dec.decode(&mut dec, out, samples_per_frame)?,
                CodecMode::Hybrid => hybrid::decode_hybrid_frame(
                    &mut self.silk_dec,
                    &mut self.celt_dec,
                    &mut self.hybrid_delay,
                    &mut dec,
                    out,
                    samples_per_frame,
                    channels,
                    budget_eighths,
                )?,
            }

            self.final_range = dec.range();
        }

        self.stream_channels = packet_channels;
        self.bandwidth = bandwidth;
        self.mode = Some(mode);
        self.prev_mode = Some(mode);
        self.frame_size = samples_per_frame;
        self.last_packet_duration = Some(total_samples as u32);

        if soft_clip {
            pcm_soft_clip(&mut samples[..total_samples * channels], channels, &mut self.softclip_mem);
        }

        Ok((total_samples as u32, packet_offset))
    }

    /// Conceals one lost or missing frame of `frame_size` samples per
    /// channel into `samples` (interleaved), dispatching on the mode of
    /// the last successfully decoded frame.
    fn conceal(&mut self, samples: &mut [f32], frame_size: usize) -> Result<(), DecoderError> {
        let channels = self.channels as usize;
        if samples.len() < frame_size * channels {
            return Err(DecoderError::FrameSizeMismatch);
        }

        match self.prev_mode {
            Some(CodecMode::Celt) => self.celt_dec.conceal(samples, frame_size),
            Some(CodecMode::Silk) => self.silk_dec.conceal(samples, frame_size),
            Some(CodecMode::Hybrid) => hybrid::conceal_hybrid_frame(
                &mut self.silk_dec,
                &mut self.celt_dec,
                &mut self.hybrid_delay,
                samples,
                frame_size,
                channels,
            ),
            None => {
                for x in samples.iter_mut().take(frame_size * channels) {
                    *x = 0.0;
                }
                Ok(())
            }
        }
    }
}
