//! # Video Decoder
//!
//! Two-phase decoding through the native engine: every input packet is sent,
//! then one frame receive is attempted. The native decoder may hold several
//! packets before it emits a frame (B-frame reordering), so a call that
//! produces no picture is normal.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::buffer::{DecodeStatus, InputBuffer, OutputMode, SurfaceHandle, VideoOutputBuffer};
use crate::config::VideoDecoderConfig;
use crate::engine::{BufferedDecoder, DecodeHandler, DecoderState, DecoderStats};
use crate::error::{DecoderError, Result};
use crate::format::Format;
use crate::mime;
use crate::native::{classify, CodecEngine, ContextKind, NativeContext, NativeOutcome, ERROR_READ_FRAME};
use crate::registry::{resolve_codec_name, CodecRegistry};

/// Builds native extradata for `mime_type`. H.264 wants SPS and PPS back to
/// back; HEVC takes its single record as is.
pub fn build_extra_data(mime_type: &str, records: &[Vec<u8>]) -> Result<Option<Vec<u8>>> {
    if records.is_empty() {
        return Ok(None);
    }
    match mime_type {
        mime::VIDEO_H264 => {
            let [sps, pps, ..] = records else {
                return Err(DecoderError::Initialization("h264 needs SPS and PPS records".into()));
            };
            let mut extra = Vec::with_capacity(sps.len() + pps.len());
            extra.extend_from_slice(sps);
            extra.extend_from_slice(pps);
            Ok(Some(extra))
        }
        mime::VIDEO_H265 => Ok(Some(records[0].clone())),
        _ => Ok(None),
    }
}

// ============================================================================
// Handler
// ============================================================================

pub struct VideoHandler {
    context: Option<NativeContext>,
    codec_name: &'static str,
    output_mode: Arc<AtomicI32>,
}

impl VideoHandler {
    pub fn new(engine: Arc<dyn CodecEngine>, format: &Format, threads: u32, output_mode: OutputMode) -> Result<Self> {
        let mime_type = format
            .mime_type()
            .ok_or_else(|| DecoderError::UnsupportedFormat("missing sample MIME type".into()))?;
        let codec_name =
            resolve_codec_name(mime_type).ok_or_else(|| DecoderError::UnsupportedFormat(mime_type.to_string()))?;
        let extra_data = build_extra_data(mime_type, &format.initialization_data)?;

        let raw = engine.video_initialize(codec_name, extra_data.as_deref(), threads);
        let context = NativeContext::new(engine, raw, ContextKind::Video)?;
        tracing::info!("Video decoder initialized: {} ({} threads)", codec_name, threads);

        Ok(Self {
            context: Some(context),
            codec_name,
            output_mode: Arc::new(AtomicI32::new(output_mode.as_raw())),
        })
    }

    pub fn codec_name(&self) -> &'static str {
        self.codec_name
    }

    fn output_mode(&self) -> OutputMode {
        OutputMode::from_raw(self.output_mode.load(Ordering::Relaxed))
    }

    /// Blits a decoded frame to `surface`. Worker thread only.
    fn render(&self, output: &VideoOutputBuffer, surface: SurfaceHandle) -> Result<()> {
        let context = self.context.as_ref().ok_or(DecoderError::Released)?;
        let result = context
            .engine()
            .video_render_frame(context.raw(), surface, output);
        if classify(result) == NativeOutcome::Fatal {
            tracing::error!("Native render failed with code {}", result);
            return Err(DecoderError::Render(format!("buffer render error (code {})", result)));
        }
        Ok(())
    }
}

impl DecodeHandler for VideoHandler {
    type Output = VideoOutputBuffer;

    fn create_output_buffer(&mut self) -> VideoOutputBuffer {
        VideoOutputBuffer::new()
    }

    fn decode(&mut self, input: &InputBuffer, output: &mut VideoOutputBuffer) -> Result<DecodeStatus> {
        let context = self.context.as_ref().ok_or(DecoderError::Released)?;
        let engine = context.engine();
        let mode = self.output_mode();
        output.init(input.time_us, mode);

        let sent = engine.video_send_packet(context.raw(), input.payload(), input.time_us);
        if sent == ERROR_READ_FRAME {
            tracing::debug!("Decoder wants output drained, time_us={}", input.time_us);
        } else {
            match classify(sent) {
                NativeOutcome::InvalidData => return Ok(DecodeStatus::DecodeOnly),
                NativeOutcome::Fatal => {
                    tracing::error!("Native send_packet failed with code {}", sent);
                    return Err(DecoderError::Decode(format!("error sending {} packet (code {})", self.codec_name, sent)));
                }
                NativeOutcome::Success(_) => {}
            }
        }

        // Drain even for decode-only input: an earlier frame may be ready.
        let received = engine.video_receive_frame(context.raw(), mode, output, input.decode_only);
        let status = match classify(received) {
            NativeOutcome::Fatal => {
                tracing::error!("Native receive_frame failed with code {}", received);
                return Err(DecoderError::Decode(format!("error receiving {} frame (code {})", self.codec_name, received)));
            }
            NativeOutcome::InvalidData => DecodeStatus::DecodeOnly,
            NativeOutcome::Success(_) if input.decode_only => DecodeStatus::DecodeOnly,
            NativeOutcome::Success(_) => DecodeStatus::Decoded,
        };

        if !input.decode_only {
            output.format = input.format.clone();
        }
        Ok(status)
    }

    fn reset(&mut self) -> Result<()> {
        let context = self.context.take().ok_or(DecoderError::Released)?;
        self.context = Some(context.reset(None)?);
        Ok(())
    }

    fn release(&mut self) {
        self.context.take();
    }
}

// ============================================================================
// Decoder
// ============================================================================

pub struct VideoDecoder {
    decoder: BufferedDecoder<VideoHandler>,
    output_mode: Arc<AtomicI32>,
    codec_name: &'static str,
}

impl VideoDecoder {
    pub fn new(registry: &CodecRegistry, format: &Format, config: &VideoDecoderConfig) -> Result<Self> {
        let engine = registry.engine()?;
        let handler = VideoHandler::new(engine, format, config.threads, config.output_mode)?;
        let output_mode = handler.output_mode.clone();
        let codec_name = handler.codec_name;
        let decoder = BufferedDecoder::new(
            registry.decoder_name(codec_name),
            config.num_input_buffers,
            config.num_output_buffers,
            config.input_buffer_size(format),
            registry.input_padding_len(),
            handler,
        )?;
        Ok(Self {
            decoder,
            output_mode,
            codec_name,
        })
    }

    pub fn name(&self) -> &str {
        self.decoder.name()
    }

    pub fn codec_name(&self) -> &'static str {
        self.codec_name
    }

    /// Applies to frames decoded after this call.
    pub fn set_output_mode(&self, mode: OutputMode) {
        self.output_mode.store(mode.as_raw(), Ordering::Relaxed);
    }

    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from_raw(self.output_mode.load(Ordering::Relaxed))
    }

    /// Renders `output` to `surface` on the decode thread, then returns the
    /// buffer to the pool. Only valid for buffers decoded in
    /// [`OutputMode::SurfaceYuv`].
    pub fn render_to_surface(&self, output: VideoOutputBuffer, surface: SurfaceHandle) -> Result<()> {
        if output.mode != OutputMode::SurfaceYuv {
            let mode = output.mode;
            self.decoder.release_output_buffer(output);
            return Err(DecoderError::InvalidMode(format!(
                "render requires SurfaceYuv output, buffer is {:?}",
                mode
            )));
        }
        let (output, result) = self.decoder.run_on_worker(move |handler| {
            let result = handler.render(&output, surface);
            (output, result)
        })?;
        self.decoder.release_output_buffer(output);
        result
    }

    pub fn state(&self) -> DecoderState {
        self.decoder.state()
    }

    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    pub fn dequeue_input_buffer(&self) -> Result<Option<InputBuffer>> {
        self.decoder.dequeue_input_buffer()
    }

    pub fn acquire_input_buffer(&self) -> Result<InputBuffer> {
        self.decoder.acquire_input_buffer()
    }

    pub fn queue_input_buffer(&self, input: InputBuffer) -> Result<()> {
        self.decoder.queue_input_buffer(input)
    }

    pub fn dequeue_output_buffer(&self) -> Result<Option<VideoOutputBuffer>> {
        self.decoder.dequeue_output_buffer()
    }

    pub fn release_output_buffer(&self, output: VideoOutputBuffer) {
        self.decoder.release_output_buffer(output)
    }

    pub fn flush(&self) -> Result<()> {
        self.decoder.flush()
    }

    pub fn release(&self) {
        self.decoder.release()
    }
}
