//! # Audio Decoder
//!
//! Decodes compressed audio to interleaved PCM through the native engine.
//!
//! - Builds codec extradata from container initialization records
//! - Lets the native side grow output buffers mid-decode
//! - Resolves the output format (channels, sample rate) once, on the first
//!   successful decode

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::buffer::{AudioOutputBuffer, DecodeStatus, InputBuffer};
use crate::config::AudioDecoderConfig;
use crate::engine::{BufferedDecoder, DecodeHandler, DecoderState, DecoderStats};
use crate::error::{DecoderError, Result};
use crate::format::Format;
use crate::mime;
use crate::native::{classify, AudioTuning, CodecEngine, ContextKind, GrowableOutput, NativeContext, NativeOutcome};
use crate::registry::{resolve_codec_name, CodecRegistry};

pub const INITIAL_OUTPUT_BUFFER_SIZE_16BIT: usize = 65535;
pub const INITIAL_OUTPUT_BUFFER_SIZE_32BIT: usize = INITIAL_OUTPUT_BUFFER_SIZE_16BIT * 2;

const ALAC_ATOM_TYPE: &[u8; 4] = b"alac";
const ALAC_ATOM_HEADER_SIZE: usize = 12;

// ============================================================================
// Output Format
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcmEncoding {
    Pcm16Bit,
    PcmFloat,
}

impl PcmEncoding {
    fn initial_output_buffer_size(&self) -> usize {
        match self {
            Self::Pcm16Bit => INITIAL_OUTPUT_BUFFER_SIZE_16BIT,
            Self::PcmFloat => INITIAL_OUTPUT_BUFFER_SIZE_32BIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioOutputFormat {
    pub channel_count: u32,
    pub sample_rate: u32,
    pub encoding: PcmEncoding,
}

// ============================================================================
// Extradata
// ============================================================================

/// Builds native extradata for `mime_type` from container initialization
/// records. `None` when the codec needs none or no records exist.
pub fn build_extra_data(mime_type: &str, records: &[Vec<u8>]) -> Result<Option<Vec<u8>>> {
    let Some(first) = records.first() else {
        return Ok(None);
    };
    match mime_type {
        mime::AUDIO_AAC | mime::AUDIO_OPUS => Ok(Some(first.clone())),
        // The native shim strips the block-align/bit-rate prefix itself.
        m if mime::is_wma(m) => Ok(Some(first.clone())),
        mime::AUDIO_ALAC => Ok(Some(alac_atom(first))),
        mime::AUDIO_VORBIS => {
            let Some(second) = records.get(1) else {
                return Err(DecoderError::Initialization(
                    "vorbis needs identification and setup headers".into(),
                ));
            };
            vorbis_header_pair(first, second).map(Some)
        }
        _ => Ok(None),
    }
}

/// Wraps an ALAC magic cookie in an `alac` atom.
pub fn alac_atom(magic_cookie: &[u8]) -> Vec<u8> {
    let length = ALAC_ATOM_HEADER_SIZE + magic_cookie.len();
    let mut atom = Vec::with_capacity(length);
    atom.extend_from_slice(&(length as u32).to_be_bytes());
    atom.extend_from_slice(ALAC_ATOM_TYPE);
    atom.extend_from_slice(&[0; 4]); // version + flags
    atom.extend_from_slice(magic_cookie);
    atom
}

/// Packs two Vorbis headers as `len0 | header0 | 0 0 | len1 | header1` with
/// 16-bit big-endian lengths.
pub fn vorbis_header_pair(header0: &[u8], header1: &[u8]) -> Result<Vec<u8>> {
    let len0 = u16::try_from(header0.len())
        .map_err(|_| DecoderError::Initialization(format!("vorbis header too large: {}", header0.len())))?;
    let len1 = u16::try_from(header1.len())
        .map_err(|_| DecoderError::Initialization(format!("vorbis header too large: {}", header1.len())))?;
    let mut extra = Vec::with_capacity(header0.len() + header1.len() + 6);
    extra.extend_from_slice(&len0.to_be_bytes());
    extra.extend_from_slice(header0);
    extra.extend_from_slice(&[0, 0]);
    extra.extend_from_slice(&len1.to_be_bytes());
    extra.extend_from_slice(header1);
    Ok(extra)
}

/// Sample rate stored in the tail of an ALAC atom. Older native ALAC
/// decoders report 0 until told.
fn alac_sample_rate(extra_data: Option<&[u8]>) -> Option<u32> {
    let extra = extra_data?;
    let tail: [u8; 4] = extra.get(extra.len().checked_sub(4)?..)?.try_into().ok()?;
    Some(u32::from_be_bytes(tail))
}

// ============================================================================
// Handler
// ============================================================================

/// State the host reads while the worker decodes.
#[derive(Debug)]
struct AudioShared {
    output_format: OnceLock<AudioOutputFormat>,
    output_buffer_size: AtomicUsize,
}

/// Routes native grow requests to the output buffer and records the new
/// size as the default for later decodes.
struct GrowingOutput<'a> {
    buffer: &'a mut AudioOutputBuffer,
    size_hint: &'a AtomicUsize,
}

impl GrowableOutput for GrowingOutput<'_> {
    fn buffer(&mut self) -> &mut [u8] {
        self.buffer.data_mut()
    }

    fn grow(&mut self, required_size: usize) -> &mut [u8] {
        tracing::debug!("Growing audio output buffer to {} bytes", required_size);
        self.size_hint.fetch_max(required_size, Ordering::Relaxed);
        self.buffer.grow(required_size)
    }
}

pub struct AudioHandler {
    context: Option<NativeContext>,
    codec_name: &'static str,
    extra_data: Option<Vec<u8>>,
    encoding: PcmEncoding,
    shared: Arc<AudioShared>,
}

impl AudioHandler {
    pub fn new(engine: Arc<dyn CodecEngine>, format: &Format, output_float: bool) -> Result<Self> {
        let mime_type = format
            .mime_type()
            .ok_or_else(|| DecoderError::UnsupportedFormat("missing sample MIME type".into()))?;
        let codec_name =
            resolve_codec_name(mime_type).ok_or_else(|| DecoderError::UnsupportedFormat(mime_type.to_string()))?;
        let extra_data = build_extra_data(mime_type, &format.initialization_data)?;
        let encoding = if output_float {
            PcmEncoding::PcmFloat
        } else {
            PcmEncoding::Pcm16Bit
        };

        let tuning = AudioTuning {
            output_float,
            sample_rate: format.sample_rate.unwrap_or(0),
            channel_count: format.channel_count.unwrap_or(0),
        };
        let raw = engine.audio_initialize(codec_name, extra_data.as_deref(), &tuning);
        let context = NativeContext::new(engine, raw, ContextKind::Audio)?;
        tracing::info!("Audio decoder initialized: {} ({:?})", codec_name, encoding);

        Ok(Self {
            context: Some(context),
            codec_name,
            extra_data,
            encoding,
            shared: Arc::new(AudioShared {
                output_format: OnceLock::new(),
                output_buffer_size: AtomicUsize::new(encoding.initial_output_buffer_size()),
            }),
        })
    }

    pub fn codec_name(&self) -> &'static str {
        self.codec_name
    }

    pub fn extra_data(&self) -> Option<&[u8]> {
        self.extra_data.as_deref()
    }

    fn resolve_output_format(&self, context: &NativeContext) {
        if self.shared.output_format.get().is_some() {
            return;
        }
        let engine = context.engine();
        let channel_count = engine.audio_channel_count(context.raw()).max(0) as u32;
        let mut sample_rate = engine.audio_sample_rate(context.raw()).max(0) as u32;
        if sample_rate == 0 && self.codec_name == "alac" {
            if let Some(rate) = alac_sample_rate(self.extra_data.as_deref()) {
                tracing::debug!("Native ALAC decoder reported no sample rate, using {} from extradata", rate);
                sample_rate = rate;
            }
        }
        let _ = self.shared.output_format.set(AudioOutputFormat {
            channel_count,
            sample_rate,
            encoding: self.encoding,
        });
    }
}

impl DecodeHandler for AudioHandler {
    type Output = AudioOutputBuffer;

    fn create_output_buffer(&mut self) -> AudioOutputBuffer {
        AudioOutputBuffer::new()
    }

    fn decode(&mut self, input: &InputBuffer, output: &mut AudioOutputBuffer) -> Result<DecodeStatus> {
        let context = self.context.as_ref().ok_or(DecoderError::Released)?;
        let size = self.shared.output_buffer_size.load(Ordering::Relaxed);
        output.init(input.time_us, size);

        let result = {
            let mut sink = GrowingOutput {
                buffer: output,
                size_hint: &self.shared.output_buffer_size,
            };
            context.engine().audio_decode(context.raw(), input.payload(), &mut sink)
        };

        match classify(result) {
            NativeOutcome::Fatal => {
                tracing::error!("Native audio decode failed with code {}", result);
                Err(DecoderError::Decode(format!("error decoding {} (code {})", self.codec_name, result)))
            }
            NativeOutcome::InvalidData => {
                tracing::debug!("Dropping invalid {} packet at {}us", self.codec_name, input.time_us);
                Ok(DecodeStatus::Skipped)
            }
            NativeOutcome::Success(0) => Ok(DecodeStatus::Skipped),
            NativeOutcome::Success(written) => {
                self.resolve_output_format(context);
                output.set_len(written as usize);
                if input.decode_only {
                    return Ok(DecodeStatus::DecodeOnly);
                }
                Ok(DecodeStatus::Decoded)
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        let context = self.context.take().ok_or(DecoderError::Released)?;
        self.context = Some(context.reset(self.extra_data.as_deref())?);
        Ok(())
    }

    fn release(&mut self) {
        self.context.take();
    }
}

// ============================================================================
// Decoder
// ============================================================================

pub struct AudioDecoder {
    decoder: BufferedDecoder<AudioHandler>,
    shared: Arc<AudioShared>,
    codec_name: &'static str,
    encoding: PcmEncoding,
}

impl AudioDecoder {
    pub fn new(registry: &CodecRegistry, format: &Format, config: &AudioDecoderConfig) -> Result<Self> {
        let engine = registry.engine()?;
        let handler = AudioHandler::new(engine, format, config.output_float)?;
        let shared = handler.shared.clone();
        let codec_name = handler.codec_name;
        let encoding = handler.encoding;
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
            shared,
            codec_name,
            encoding,
        })
    }

    pub fn name(&self) -> &str {
        self.decoder.name()
    }

    pub fn codec_name(&self) -> &'static str {
        self.codec_name
    }

    pub fn encoding(&self) -> PcmEncoding {
        self.encoding
    }

    /// `None` until the first successful decode.
    pub fn output_format(&self) -> Option<AudioOutputFormat> {
        self.shared.output_format.get().copied()
    }

    pub fn channel_count(&self) -> Option<u32> {
        self.output_format().map(|f| f.channel_count)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.output_format().map(|f| f.sample_rate)
    }

    /// Current output buffer size hint. Only ever grows.
    pub fn output_buffer_size(&self) -> usize {
        self.shared.output_buffer_size.load(Ordering::Relaxed)
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

    pub fn dequeue_output_buffer(&self) -> Result<Option<AudioOutputBuffer>> {
        self.decoder.dequeue_output_buffer()
    }

    pub fn release_output_buffer(&self, output: AudioOutputBuffer) {
        self.decoder.release_output_buffer(output)
    }

    pub fn flush(&self) -> Result<()> {
        self.decoder.flush()
    }

    pub fn release(&self) {
        self.decoder.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::OutputBuffer;
    use crate::native::{RawContext, ERROR_INVALID_DATA, ERROR_OTHER};
    use crate::testing::{AudioStep, MockEngine};
    use std::time::{Duration, Instant};

    fn handler(engine: &Arc<MockEngine>, format: &Format) -> AudioHandler {
        AudioHandler::new(engine.clone(), format, false).unwrap()
    }

    fn input(time_us: i64, payload: &[u8]) -> InputBuffer {
        let mut input = InputBuffer::new(16, 0);
        input.time_us = time_us;
        input.set_payload(payload);
        input
    }

    #[test]
    fn test_alac_atom() {
        let cookie = [1u8, 2, 3, 4, 5];
        let atom = alac_atom(&cookie);
        assert_eq!(atom.len(), 12 + cookie.len());
        assert_eq!(&atom[0..4], &17u32.to_be_bytes());
        assert_eq!(&atom[4..8], b"alac");
        assert_eq!(&atom[8..12], &[0, 0, 0, 0]);
        assert_eq!(&atom[12..], &cookie);
    }

    #[test]
    fn test_vorbis_header_pair() {
        let h0 = vec![0xAB; 30];
        let h1 = vec![0xCD; 300];
        let extra = vorbis_header_pair(&h0, &h1).unwrap();
        assert_eq!(extra.len(), h0.len() + h1.len() + 6);
        assert_eq!(&extra[0..2], &30u16.to_be_bytes());
        assert_eq!(&extra[2..32], &h0[..]);
        assert_eq!(&extra[32..34], &[0, 0]);
        assert_eq!(&extra[34..36], &300u16.to_be_bytes());
        assert_eq!(&extra[36..], &h1[..]);
    }

    #[test]
    fn test_extra_data_per_codec() {
        let records = vec![vec![9, 8, 7], vec![6, 5]];
        assert_eq!(build_extra_data(mime::AUDIO_AAC, &records).unwrap(), Some(vec![9, 8, 7]));
        assert_eq!(build_extra_data(mime::AUDIO_OPUS, &records).unwrap(), Some(vec![9, 8, 7]));
        assert_eq!(build_extra_data(mime::AUDIO_X_MS_WMAPRO, &records).unwrap(), Some(vec![9, 8, 7]));
        assert_eq!(build_extra_data(mime::AUDIO_MPEG, &records).unwrap(), None);
        assert_eq!(build_extra_data(mime::AUDIO_FLAC, &records).unwrap(), None);
        assert_eq!(build_extra_data(mime::AUDIO_AAC, &[]).unwrap(), None);
        assert_eq!(build_extra_data(mime::AUDIO_ALAC, &records).unwrap().unwrap().len(), 15);
    }

    #[test]
    fn test_vorbis_needs_two_records() {
        let err = build_extra_data(mime::AUDIO_VORBIS, &[vec![1]]).unwrap_err();
        assert!(matches!(err, DecoderError::Initialization(_)));
    }

    #[test]
    fn test_alac_sample_rate_tail() {
        let atom = alac_atom(&[0, 0, 0, 0, 0x00, 0x00, 0xBB, 0x80]);
        assert_eq!(alac_sample_rate(Some(&atom)), Some(48_000));
        assert_eq!(alac_sample_rate(Some(&[1, 2])), None);
        assert_eq!(alac_sample_rate(None), None);
    }

    #[test]
    fn test_initialize_passes_tuning() {
        let engine = Arc::new(MockEngine::new());
        let format = Format::new(mime::AUDIO_X_MS_WMAV2)
            .with_audio(32_000, 2)
            .with_initialization_data(vec![vec![1, 2, 3, 4, 5, 6, 7]]);
        let handler = AudioHandler::new(engine.clone(), &format, true).unwrap();
        assert_eq!(handler.codec_name(), "wmav2");
        let recorded = engine.recorded();
        assert_eq!(recorded.codec_names, vec!["wmav2".to_string()]);
        assert_eq!(recorded.init_extra, vec![Some(vec![1, 2, 3, 4, 5, 6, 7])]);
        assert_eq!(
            recorded.tunings,
            vec![AudioTuning {
                output_float: true,
                sample_rate: 32_000,
                channel_count: 2
            }]
        );
    }

    #[test]
    fn test_null_context_fails_initialization() {
        let engine = Arc::new(MockEngine::new());
        engine.script().init_result = Some(RawContext::NULL);
        let err = AudioHandler::new(engine, &Format::new(mime::AUDIO_AAC), false).err().unwrap();
        assert!(matches!(err, DecoderError::Initialization(_)));
    }

    #[test]
    fn test_unmapped_mime_is_unsupported() {
        let engine = Arc::new(MockEngine::new());
        let err = AudioHandler::new(engine.clone(), &Format::new("audio/x-unknown"), false).err().unwrap();
        assert!(matches!(err, DecoderError::UnsupportedFormat(_)));
        assert_eq!(engine.counters().audio_initialize, 0);
    }

    #[test]
    fn test_success_resolves_format_once() {
        let engine = Arc::new(MockEngine::new());
        engine.script().sample_rate = 48_000;
        let mut handler = handler(&engine, &Format::new(mime::AUDIO_AAC).with_audio(48_000, 2));
        let mut output = AudioOutputBuffer::new();

        let status = handler.decode(&input(100, &[1, 2, 3, 4]), &mut output).unwrap();
        assert_eq!(status, DecodeStatus::Decoded);
        assert_eq!(output.payload(), &[1, 2, 3, 4]);
        assert_eq!(output.time_us(), 100);
        handler.decode(&input(200, &[5, 6]), &mut output).unwrap();

        let format = handler.shared.output_format.get().copied().unwrap();
        assert_eq!(format.channel_count, 2);
        assert_eq!(format.sample_rate, 48_000);
        assert_eq!(format.encoding, PcmEncoding::Pcm16Bit);
        assert_eq!(engine.counters().audio_sample_rate, 1);
        assert_eq!(engine.counters().audio_channel_count, 1);
    }

    #[test]
    fn test_empty_and_invalid_results_are_skipped() {
        let engine = Arc::new(MockEngine::new());
        engine.script().audio_steps.extend([AudioStep::Code(0), AudioStep::Code(ERROR_INVALID_DATA)]);
        let mut handler = handler(&engine, &Format::new(mime::AUDIO_MPEG));
        let mut output = AudioOutputBuffer::new();
        assert_eq!(handler.decode(&input(0, &[1]), &mut output).unwrap(), DecodeStatus::Skipped);
        assert_eq!(handler.decode(&input(1, &[1]), &mut output).unwrap(), DecodeStatus::Skipped);
        assert!(handler.shared.output_format.get().is_none());
    }

    #[test]
    fn test_native_error_is_fatal() {
        let engine = Arc::new(MockEngine::new());
        engine.script().audio_steps.push_back(AudioStep::Code(ERROR_OTHER));
        let mut handler = handler(&engine, &Format::new(mime::AUDIO_AC3));
        let mut output = AudioOutputBuffer::new();
        let err = handler.decode(&input(0, &[1]), &mut output).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_growth_is_remembered() {
        let engine = Arc::new(MockEngine::new());
        engine.script().audio_steps.extend([AudioStep::Write(100_000), AudioStep::Write(10)]);
        let mut handler = handler(&engine, &Format::new(mime::AUDIO_TRUEHD));
        let mut first = AudioOutputBuffer::new();
        let mut second = AudioOutputBuffer::new();

        handler.decode(&input(0, &[7]), &mut first).unwrap();
        assert_eq!(first.capacity(), 100_000);
        assert_eq!(first.payload().len(), 100_000);
        handler.decode(&input(1, &[7]), &mut second).unwrap();
        assert_eq!(second.capacity(), 100_000);

        let capacities = engine.recorded().decode_capacities;
        assert_eq!(capacities, vec![INITIAL_OUTPUT_BUFFER_SIZE_16BIT, 100_000]);
    }

    #[test]
    fn test_float_output_doubles_initial_size() {
        let engine = Arc::new(MockEngine::new());
        let mut handler = AudioHandler::new(engine.clone(), &Format::new(mime::AUDIO_OPUS), true).unwrap();
        let mut output = AudioOutputBuffer::new();
        handler.decode(&input(0, &[1]), &mut output).unwrap();
        assert_eq!(output.capacity(), INITIAL_OUTPUT_BUFFER_SIZE_32BIT);
    }

    #[test]
    fn test_alac_sample_rate_fallback() {
        let engine = Arc::new(MockEngine::new());
        engine.script().sample_rate = 0;
        let cookie = vec![0, 0, 0x10, 0x00, 0x00, 0x01, 0x58, 0x88];
        let format = Format::new(mime::AUDIO_ALAC).with_initialization_data(vec![cookie]);
        let mut handler = handler(&engine, &format);
        let mut output = AudioOutputBuffer::new();
        handler.decode(&input(0, &[1, 2]), &mut output).unwrap();
        assert_eq!(handler.shared.output_format.get().unwrap().sample_rate, 88_200);
    }

    #[test]
    fn test_zero_rate_kept_for_other_codecs() {
        let engine = Arc::new(MockEngine::new());
        engine.script().sample_rate = 0;
        let format = Format::new(mime::AUDIO_AAC).with_initialization_data(vec![vec![0, 0, 0xBB, 0x80]]);
        let mut handler = handler(&engine, &format);
        let mut output = AudioOutputBuffer::new();
        handler.decode(&input(0, &[1]), &mut output).unwrap();
        assert_eq!(handler.shared.output_format.get().unwrap().sample_rate, 0);
    }

    #[test]
    fn test_reset_reuses_extradata() {
        let engine = Arc::new(MockEngine::new());
        let format = Format::new(mime::AUDIO_AAC).with_initialization_data(vec![vec![0x12, 0x10]]);
        let mut handler = handler(&engine, &format);
        handler.reset().unwrap();
        assert_eq!(engine.recorded().reset_extra, vec![Some(vec![0x12, 0x10])]);
        handler.release();
        handler.release();
        assert_eq!(engine.counters().audio_release, 1);
    }

    #[test]
    fn test_failed_reset() {
        let engine = Arc::new(MockEngine::new());
        let mut handler = handler(&engine, &Format::new(mime::AUDIO_TRUEHD));
        engine.script().reset_result = Some(RawContext::NULL);
        assert!(matches!(handler.reset(), Err(DecoderError::Reset(_))));
        let mut output = AudioOutputBuffer::new();
        assert!(matches!(handler.decode(&input(0, &[1]), &mut output), Err(DecoderError::Released)));
    }

    fn next_output(decoder: &AudioDecoder) -> AudioOutputBuffer {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(output) = decoder.dequeue_output_buffer().unwrap() {
                return output;
            }
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_decoder_end_to_end() {
        let engine = Arc::new(MockEngine::new());
        let registry = CodecRegistry::with_engine(engine.clone());
        let format = Format::new(mime::AUDIO_FLAC).with_audio(44_100, 2);
        let decoder = AudioDecoder::new(&registry, &format, &AudioDecoderConfig::default()).unwrap();
        assert_eq!(decoder.name(), "ffmpeg6.0-flac");
        assert_eq!(decoder.output_format(), None);

        let mut packet = decoder.acquire_input_buffer().unwrap();
        assert_eq!(packet.padding(), 64);
        packet.time_us = 1_000;
        packet.set_payload(&[3, 1, 4, 1, 5]);
        decoder.queue_input_buffer(packet).unwrap();

        let output = next_output(&decoder);
        assert_eq!(output.payload(), &[3, 1, 4, 1, 5]);
        assert_eq!(decoder.sample_rate(), Some(44_100));
        assert_eq!(decoder.channel_count(), Some(2));
        decoder.release_output_buffer(output);

        decoder.flush().unwrap();
        assert_eq!(engine.counters().audio_reset, 1);
        assert_eq!(decoder.state(), DecoderState::Ready);

        decoder.release();
        decoder.release();
        assert_eq!(engine.counters().audio_release, 1);
    }

    #[test]
    fn test_decoder_requires_library() {
        let registry = CodecRegistry::with_loader(|| Err(DecoderError::Unavailable("missing".into())));
        let err = AudioDecoder::new(&registry, &Format::new(mime::AUDIO_AAC), &AudioDecoderConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, DecoderError::Unavailable(_)));
    }

    #[test]
    fn test_decoder_skips_empty_result() {
        let engine = Arc::new(MockEngine::new());
        engine.script().audio_steps.push_back(AudioStep::Code(0));
        let registry = CodecRegistry::with_engine(engine.clone());
        let decoder = AudioDecoder::new(&registry, &Format::new(mime::AUDIO_MPEG), &AudioDecoderConfig::default()).unwrap();

        let mut packet = decoder.acquire_input_buffer().unwrap();
        packet.time_us = 0;
        packet.set_payload(&[0xFF, 0xFB]);
        decoder.queue_input_buffer(packet).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while decoder.stats().skipped < 1 {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(decoder.dequeue_output_buffer().unwrap().is_none());
        assert_eq!(decoder.state(), DecoderState::Ready);
        assert_eq!(decoder.stats().skipped, 1);
        assert_eq!(decoder.output_format(), None);

        let mut packet = decoder.acquire_input_buffer().unwrap();
        packet.time_us = 26_122;
        packet.set_payload(&[0xFF, 0xFB, 0x90]);
        decoder.queue_input_buffer(packet).unwrap();
        let output = next_output(&decoder);
        assert_eq!(output.time_us(), 26_122);
        assert_eq!(output.header().skipped_output_buffer_count, 1);
    }
}
