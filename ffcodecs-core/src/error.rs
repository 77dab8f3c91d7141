//! # Decoder Errors
//!
//! Everything that can go wrong between the host and the native codec engine.
//!
//! Malformed packets are deliberately absent: a bad access unit is reported
//! through [`DecodeStatus`](crate::buffer::DecodeStatus) on the buffer it
//! affected, never as an error.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoderError {
    /// Native library missing or failed to load.
    #[error("Native codec library unavailable: {0}")]
    Unavailable(String),

    /// Native initialize returned a null context.
    #[error("Decoder initialization failed: {0}")]
    Initialization(String),

    /// No native codec is mapped to this MIME type.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Unrecoverable decode failure. The instance must be released.
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Native reset returned a null context.
    #[error("Decoder reset failed: {0}")]
    Reset(String),

    /// Render requested for a buffer not in surface output mode.
    #[error("Invalid output mode: {0}")]
    InvalidMode(String),

    /// Native render-to-surface failed.
    #[error("Render failed: {0}")]
    Render(String),

    /// Operation attempted on a released decoder.
    #[error("Decoder has been released")]
    Released,

    /// Symbol resolution or other loader failure.
    #[error("Library error: {0}")]
    Library(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DecoderError {
    /// Returns `true` if the decoder that produced this error cannot be reused.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DecoderError::Decode(_) | DecoderError::Reset(_) | DecoderError::Released
        )
    }

    /// Returns `true` for programmer errors that are raised synchronously and
    /// leave the decoder untouched.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            DecoderError::InvalidMode(_) | DecoderError::UnsupportedFormat(_) | DecoderError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DecoderError>;
