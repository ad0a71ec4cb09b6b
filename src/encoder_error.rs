//! Encoder errors.

/// Errors thrown by the encoder, per the error taxonomy in `spec.md` §7.
#[derive(Debug)]
pub enum EncoderError {
    /// Construction or a setter call with an out-of-range value (bitrate,
    /// complexity, sample rate, channel count, application).
    InvalidConfiguration(&'static str),
    /// The caller's output buffer cannot hold the encoded packet.
    BufferTooSmall,
    /// A table index went out of range, or a non-finite value appeared in
    /// analysis. Should not occur in a well-tested build.
    InternalInconsistency(&'static str),
}

impl std::fmt::Display for EncoderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncoderError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            EncoderError::BufferTooSmall => write!(f, "output buffer is too small"),
            EncoderError::InternalInconsistency(message) => {
                write!(f, "internal inconsistency: {}", message)
            }
        }
    }
}

impl std::error::Error for EncoderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
