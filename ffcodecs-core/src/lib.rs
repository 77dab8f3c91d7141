//! # ffcodecs Core
//!
//! Buffered audio and video decoders on top of a native FFmpeg codec engine.
//!
//! The native library is loaded at runtime. When it is missing, the
//! [`CodecRegistry`] reports every format as unsupported and decoder
//! construction fails with [`DecoderError::Unavailable`].

// ============================================================================
// Foundation
// ============================================================================
pub mod error;
pub mod config;
pub mod format;
pub mod mime;

// ============================================================================
// Native Boundary
// ============================================================================
pub mod native;
pub mod ffi;
pub mod registry;

// ============================================================================
// Decoding
// ============================================================================
pub mod buffer;
pub mod engine;
pub mod audio;
pub mod video;

#[cfg(test)]
mod testing;

pub use audio::{AudioDecoder, AudioOutputFormat, PcmEncoding};
pub use buffer::{AudioOutputBuffer, DecodeStatus, InputBuffer, OutputBuffer, OutputMode, SurfaceHandle, VideoOutputBuffer};
pub use config::{AudioDecoderConfig, LibraryConfig, VideoDecoderConfig};
pub use engine::{BufferedDecoder, DecodeHandler, DecoderState, DecoderStats};
pub use error::{DecoderError, Result};
pub use format::Format;
pub use native::{CodecEngine, RawContext};
pub use registry::{configure_global, resolve_codec_name, CodecDescriptor, CodecRegistry};
pub use video::VideoDecoder;
