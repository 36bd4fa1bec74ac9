//! Load-time error class (spec "load errors").

use core::fmt;

/// Error returned by the `.xm` and `libxm` loaders.
///
/// Runtime playback never surfaces an error: invalid effect parameters
/// are clamped or ignored, matching FT2 behavior. Only load can fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// Main header magic did not match `"Extended Module: "`.
    BadMagic,
    /// Buffer ended before a header or block could be fully read.
    Truncated,
    /// XM version below 0x0104, or a `libxm` ABI version mismatch.
    UnsupportedVersion,
    /// `num_channels` outside 1..=255 (XM) or implementation channel cap.
    TooManyChannels,
    /// `num_patterns`, `num_instruments`, or `num_samples` outside range.
    TooManyEntities,
    /// Envelope point count, sustain point, or loop points out of range.
    BadEnvelope,
    /// Sample length, loop bounds, or format byte failed validation.
    BadSample,
    /// `libxm` magic or endianness byte did not match this build.
    BadLibxmHeader,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            LoadError::BadMagic => "bad magic bytes",
            LoadError::Truncated => "unexpected end of data",
            LoadError::UnsupportedVersion => "unsupported format version",
            LoadError::TooManyChannels => "channel count out of range",
            LoadError::TooManyEntities => "pattern/instrument/sample count out of range",
            LoadError::BadEnvelope => "invalid envelope",
            LoadError::BadSample => "invalid sample",
            LoadError::BadLibxmHeader => "libxm header mismatch",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LoadError {}
