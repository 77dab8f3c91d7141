//! # Native Codec Boundary
//!
//! The contract between the decode adapters and the native codec engine.
//!
//! A decoder context on the native side is an opaque integer token
//! ([`RawContext`], 0 means null). Adapters never hold raw tokens directly:
//! they own a [`NativeContext`], which releases the context exactly once
//! when dropped and is consumed by [`NativeContext::reset`].
//!
//! ```text
//! ┌──────────────┐   CodecEngine    ┌────────────────┐
//! │ AudioHandler │────────────────► │ DynamicEngine  │──► libffcodecs
//! │ VideoHandler │                  │ (or a mock)    │
//! └──────────────┘                  └────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use crate::buffer::{OutputMode, SurfaceHandle, VideoOutputBuffer};
use crate::error::{DecoderError, Result};

// ============================================================================
// Return Codes
// ============================================================================

pub const SUCCESS: i32 = 0;
/// Malformed input or, for video receive, a frame that must not be shown.
pub const ERROR_INVALID_DATA: i32 = -1;
pub const ERROR_OTHER: i32 = -2;
/// Video send only: the decoder wants its output drained before more input.
pub const ERROR_READ_FRAME: i32 = -3;

/// Value reported for lengths the native library never provided.
pub const LENGTH_UNSET: i32 = -1;

/// Three-way reading of a native return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOutcome {
    /// Non-negative result, e.g. bytes written.
    Success(u32),
    InvalidData,
    Fatal,
}

pub fn classify(code: i32) -> NativeOutcome {
    match code {
        c if c >= 0 => NativeOutcome::Success(c as u32),
        ERROR_INVALID_DATA => NativeOutcome::InvalidData,
        _ => NativeOutcome::Fatal,
    }
}

// ============================================================================
// Engine Trait
// ============================================================================

/// Opaque native decoder context token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawContext(pub u64);

impl RawContext {
    pub const NULL: RawContext = RawContext(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Container hints passed through to the native audio initializer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioTuning {
    pub output_float: bool,
    /// 0 when the container did not declare one.
    pub sample_rate: u32,
    pub channel_count: u32,
}

/// Output storage the native audio decoder writes into. The native side may
/// ask for more room mid-call; existing contents survive the growth.
pub trait GrowableOutput {
    fn buffer(&mut self) -> &mut [u8];
    fn grow(&mut self, required_size: usize) -> &mut [u8];
}

/// The native codec engine. One instance serves every decoder in the
/// process; per-decoder state lives behind the context tokens it hands out.
pub trait CodecEngine: Send + Sync {
    fn version(&self) -> String;
    fn input_padding_size(&self) -> i32;
    fn has_decoder(&self, codec_name: &str) -> bool;

    fn audio_initialize(&self, codec_name: &str, extra_data: Option<&[u8]>, tuning: &AudioTuning) -> RawContext;
    /// Returns bytes written, 0, [`ERROR_INVALID_DATA`] or [`ERROR_OTHER`].
    fn audio_decode(&self, ctx: RawContext, input: &[u8], output: &mut dyn GrowableOutput) -> i32;
    fn audio_channel_count(&self, ctx: RawContext) -> i32;
    fn audio_sample_rate(&self, ctx: RawContext) -> i32;
    /// May return a different token, or null on failure.
    fn audio_reset(&self, ctx: RawContext, extra_data: Option<&[u8]>) -> RawContext;
    fn audio_release(&self, ctx: RawContext);

    fn video_initialize(&self, codec_name: &str, extra_data: Option<&[u8]>, threads: u32) -> RawContext;
    fn video_send_packet(&self, ctx: RawContext, input: &[u8], time_us: i64) -> i32;
    fn video_receive_frame(
        &self,
        ctx: RawContext,
        mode: OutputMode,
        output: &mut VideoOutputBuffer,
        decode_only: bool,
    ) -> i32;
    fn video_reset(&self, ctx: RawContext, extra_data: Option<&[u8]>) -> RawContext;
    fn video_release(&self, ctx: RawContext);
    fn video_render_frame(&self, ctx: RawContext, surface: SurfaceHandle, output: &VideoOutputBuffer) -> i32;
}

// ============================================================================
// Owned Context
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Audio,
    Video,
}

/// Move-only owner of a live native context.
pub struct NativeContext {
    engine: Arc<dyn CodecEngine>,
    raw: RawContext,
    kind: ContextKind,
}

impl NativeContext {
    /// Takes ownership of `raw`. Fails on a null token.
    pub fn new(engine: Arc<dyn CodecEngine>, raw: RawContext, kind: ContextKind) -> Result<Self> {
        if raw.is_null() {
            return Err(DecoderError::Initialization(format!(
                "native {:?} initialize returned a null context",
                kind
            )));
        }
        Ok(Self { engine, raw, kind })
    }

    pub fn raw(&self) -> RawContext {
        self.raw
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn engine(&self) -> &dyn CodecEngine {
        self.engine.as_ref()
    }

    /// Resets the native context, consuming this handle. The native side owns
    /// the old token from here on, whether or not it hands back a new one.
    pub fn reset(mut self, extra_data: Option<&[u8]>) -> Result<Self> {
        let kind = self.kind;
        // A null token is never released on drop.
        let old = std::mem::replace(&mut self.raw, RawContext::NULL);
        let fresh = match kind {
            ContextKind::Audio => self.engine.audio_reset(old, extra_data),
            ContextKind::Video => self.engine.video_reset(old, extra_data),
        };
        if fresh.is_null() {
            tracing::error!("Native {:?} reset returned a null context", kind);
            return Err(DecoderError::Reset("error resetting native context".into()));
        }
        Ok(Self {
            engine: self.engine.clone(),
            raw: fresh,
            kind,
        })
    }
}

impl Drop for NativeContext {
    fn drop(&mut self) {
        if self.raw.is_null() {
            return;
        }
        match self.kind {
            ContextKind::Audio => self.engine.audio_release(self.raw),
            ContextKind::Video => self.engine.video_release(self.raw),
        }
    }
}

impl fmt::Debug for NativeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeContext")
            .field("raw", &self.raw)
            .field("kind", &self.kind)
            .finish()
    }
}
