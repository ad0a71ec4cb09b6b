//! End-to-end encode/decode scenarios, adapted from the concrete scenarios
//! in the specification this crate implements.
//!
//! The encoder in this crate is a functional, non-bit-exact implementation
//! (mode and parameter selection are fixed heuristics, not the reference's
//! psychoacoustic search), so these tests check structural correctness
//! (packet/sample counts, finite output, PLC behavior) rather than exact
//! fidelity metrics like SNR against a reference decoder.

use opus_core::{
    Application, Channels, CodecMode, Decoder, DecoderConfiguration, Encoder, EncoderConfiguration,
    SamplingRate,
};

fn sine_wave(frame_size: usize, channels: usize, freq_hz: [f32; 2], sample_rate: f32, amplitude: f32) -> Vec<f32> {
    let mut out = vec![0.0_f32; frame_size * channels];
    for i in 0..frame_size {
        let t = i as f32 / sample_rate;
        for ch in 0..channels {
            out[i * channels + ch] = amplitude * (2.0 * std::f32::consts::PI * freq_hz[ch] * t).sin();
        }
    }
    out
}

#[test]
fn mono_wideband_speech_roundtrip_is_finite_and_nonsilent() {
    let config = EncoderConfiguration {
        sampling_rate: SamplingRate::Hz48000,
        channels: Channels::Mono,
        application: Application::Voip,
    };
    let mut enc = Encoder::new(&config).unwrap();
    enc.set_bandwidth(opus_core::Bandwidth::Wideband);
    enc.set_frame_size_ms(20.0).unwrap();
    enc.set_bitrate(24_000).unwrap();

    let frame_size = 960; // 20 ms @ 48 kHz
    let pcm = sine_wave(frame_size, 1, [440.0, 0.0], 48_000.0, 0.5);

    let mut packet = vec![0_u8; 512];
    let written = enc.encode_float(&pcm, &mut packet).unwrap();
    assert!(written > 1, "encoder produced an empty packet");

    let dec_config = DecoderConfiguration {
        sampling_rate: SamplingRate::Hz48000,
        channels: Channels::Mono,
        gain: 0,
    };
    let mut dec = Decoder::new(&dec_config).unwrap();

    let mut out = vec![0.0_f32; frame_size];
    let decoded = dec
        .decode_float(Some(&packet[..written]), &mut out, frame_size, false)
        .unwrap();
    assert_eq!(decoded as usize, frame_size);
    assert!(out.iter().all(|x| x.is_finite()));
    assert!(out.iter().any(|&x| x.abs() > 1e-4), "decoded frame looks silent");
}

#[test]
fn stereo_fullband_celt_only_roundtrip_produces_expected_packet_count() {
    let config = EncoderConfiguration {
        sampling_rate: SamplingRate::Hz48000,
        channels: Channels::Stereo,
        application: Application::Audio,
    };
    let mut enc = Encoder::new(&config).unwrap();
    enc.set_bandwidth(opus_core::Bandwidth::Fullband);
    enc.set_frame_size_ms(20.0).unwrap();
    enc.set_bitrate(96_000).unwrap();

    let frame_size = 960; // 20 ms @ 48 kHz
    let total_ms = 100;
    let num_frames = total_ms / 20;

    let mut packets = Vec::new();
    for _ in 0..num_frames {
        let pcm = sine_wave(frame_size, 2, [440.0, 880.0], 48_000.0, 0.4);
        let mut packet = vec![0_u8; 512];
        let written = enc.encode_float(&pcm, &mut packet).unwrap();
        packet.truncate(written);
        packets.push(packet);
    }
    assert_eq!(packets.len(), 5);

    for packet in &packets {
        assert_eq!(opus_core::query_packet_codec_mode(packet), CodecMode::Celt);
        assert_eq!(opus_core::query_packet_channel_count(packet), Channels::Stereo);
    }

    let dec_config = DecoderConfiguration {
        sampling_rate: SamplingRate::Hz48000,
        channels: Channels::Stereo,
        gain: 0,
    };
    let mut dec = Decoder::new(&dec_config).unwrap();
    for packet in &packets {
        let mut out = vec![0.0_f32; frame_size * 2];
        let decoded = dec.decode_float(Some(packet), &mut out, frame_size, false).unwrap();
        assert_eq!(decoded as usize, frame_size);
        assert!(out.iter().all(|x| x.is_finite()));
    }
}

#[test]
fn hybrid_superwideband_roundtrip_selects_hybrid_mode() {
    let config = EncoderConfiguration {
        sampling_rate: SamplingRate::Hz48000,
        channels: Channels::Mono,
        application: Application::Voip,
    };
    let mut enc = Encoder::new(&config).unwrap();
    enc.set_bandwidth(opus_core::Bandwidth::Superwideband);
    enc.set_frame_size_ms(20.0).unwrap();
    enc.set_bitrate(32_000).unwrap();

    let frame_size = 960;
    let pcm = sine_wave(frame_size, 1, [1000.0, 0.0], 48_000.0, 0.3);

    let mut packet = vec![0_u8; 512];
    let written = enc.encode_float(&pcm, &mut packet).unwrap();
    let packet = &packet[..written];

    assert_eq!(opus_core::query_packet_codec_mode(packet), CodecMode::Hybrid);
    assert_eq!(opus_core::query_packet_bandwidth(packet), opus_core::Bandwidth::Superwideband);

    let dec_config = DecoderConfiguration {
        sampling_rate: SamplingRate::Hz48000,
        channels: Channels::Mono,
        gain: 0,
    };
    let mut dec = Decoder::new(&dec_config).unwrap();
    let mut out = vec![0.0_f32; frame_size];
    let decoded = dec.decode_float(Some(packet), &mut out, frame_size, false).unwrap();
    assert_eq!(decoded as usize, frame_size);
    assert!(out.iter().all(|x| x.is_finite()));
}

#[test]
fn packet_loss_triggers_plc_and_preserves_sample_count() {
    let config = EncoderConfiguration {
        sampling_rate: SamplingRate::Hz48000,
        channels: Channels::Mono,
        application: Application::LowDelay,
    };
    let mut enc = Encoder::new(&config).unwrap();
    enc.set_frame_size_ms(20.0).unwrap();

    let frame_size = 960;
    let pcm = sine_wave(frame_size, 1, [220.0, 0.0], 48_000.0, 0.5);

    let mut packet_a = vec![0_u8; 512];
    let written_a = enc.encode_float(&pcm, &mut packet_a).unwrap();
    packet_a.truncate(written_a);

    let mut packet_b = vec![0_u8; 512];
    let written_b = enc.encode_float(&pcm, &mut packet_b).unwrap();
    packet_b.truncate(written_b);

    let dec_config = DecoderConfiguration {
        sampling_rate: SamplingRate::Hz48000,
        channels: Channels::Mono,
        gain: 0,
    };
    let mut dec = Decoder::new(&dec_config).unwrap();

    let mut out_a = vec![0.0_f32; frame_size];
    let decoded_a = dec.decode_float(Some(&packet_a), &mut out_a, frame_size, false).unwrap();

    let mut out_lost = vec![0.0_f32; frame_size];
    let decoded_lost = dec.decode_float(None, &mut out_lost, frame_size, false).unwrap();

    let mut out_b = vec![0.0_f32; frame_size];
    let decoded_b = dec.decode_float(Some(&packet_b), &mut out_b, frame_size, false).unwrap();

    assert_eq!(decoded_a as usize, frame_size);
    assert_eq!(decoded_lost as usize, frame_size);
    assert_eq!(decoded_b as usize, frame_size);
    assert!(out_a.iter().all(|x| x.is_finite()));
    assert!(out_lost.iter().all(|x| x.is_finite()));
    assert!(out_b.iter().all(|x| x.is_finite()));
}

#[test]
fn mono_output_can_be_requested_from_a_mono_packet_at_reduced_sampling_rate() {
    let config = EncoderConfiguration {
        sampling_rate: SamplingRate::Hz48000,
        channels: Channels::Mono,
        application: Application::Voip,
    };
    let mut enc = Encoder::new(&config).unwrap();
    enc.set_bandwidth(opus_core::Bandwidth::Narrowband);
    enc.set_frame_size_ms(20.0).unwrap();

    let frame_size = 960;
    let pcm = sine_wave(frame_size, 1, [300.0, 0.0], 48_000.0, 0.5);
    let mut packet = vec![0_u8; 512];
    let written = enc.encode_float(&pcm, &mut packet).unwrap();
    let packet = &packet[..written];

    let sample_count = opus_core::query_packet_sample_count(packet, SamplingRate::Hz48000).unwrap();
    assert_eq!(sample_count, frame_size);
}
