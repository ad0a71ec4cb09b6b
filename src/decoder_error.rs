//! Decoder errors.

/// Errors thrown by the decoder, per the error taxonomy in `spec.md` §7.
#[derive(Debug)]
pub enum DecoderError {
    /// Construction with a bad sample rate, channel count or application.
    InvalidConfiguration(&'static str),
    /// Framing read past the end of a packet, or too few bytes remained
    /// for a declared frame length.
    PacketTooShort,
    /// TOC inconsistency, zero frame count, duration over 120 ms, or a
    /// code-1 packet with an odd payload length.
    InvalidPacket(&'static str),
    /// The caller's output buffer is smaller than the decoded frame.
    FrameSizeMismatch,
    /// The caller's buffer is too small to hold the requested output.
    BufferTooSmall,
    /// The range coder could not normalize; the packet is corrupt.
    RangeOverflow,
    /// A table index went out of range, or a non-finite value appeared in
    /// synthesis. Should not occur in a well-tested build; surfaced rather
    /// than silently producing partial PCM.
    InternalInconsistency(&'static str),
}

impl std::fmt::Display for DecoderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecoderError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            DecoderError::PacketTooShort => write!(f, "packet too short"),
            DecoderError::InvalidPacket(message) => write!(f, "invalid packet: {}", message),
            DecoderError::FrameSizeMismatch => write!(f, "output buffer smaller than decoded frame"),
            DecoderError::BufferTooSmall => write!(f, "output buffer is too small"),
            DecoderError::RangeOverflow => write!(f, "range coder overflow (corrupt packet)"),
            DecoderError::InternalInconsistency(message) => {
                write!(f, "internal inconsistency: {}", message)
            }
        }
    }
}

impl std::error::Error for DecoderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
