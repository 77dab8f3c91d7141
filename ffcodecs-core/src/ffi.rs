// Dynamic native codec engine
//
// Loads the ffcodecs shim (a thin C wrapper over libavcodec) at runtime.
// No compile-time FFmpeg dependency: if the shared library is missing the
// registry simply reports the engine as unavailable.
//
// C ABI:
//   const char* ffcodecs_version(void)
//   int32_t     ffcodecs_input_padding_size(void)
//   int32_t     ffcodecs_has_decoder(const char* codec)
//   uint64_t    ffcodecs_audio_initialize(codec, extra, extra_len, output_float, sample_rate, channels)
//   int32_t     ffcodecs_audio_decode(ctx, in, in_len, out, out_len, grow, user_data)
//   int32_t     ffcodecs_audio_channel_count(ctx) / ffcodecs_audio_sample_rate(ctx)
//   uint64_t    ffcodecs_audio_reset(ctx, extra, extra_len)
//   void        ffcodecs_audio_release(ctx)
//   uint64_t    ffcodecs_video_initialize(codec, extra, extra_len, threads)
//   int32_t     ffcodecs_video_send_packet(ctx, in, in_len, time_us)
//   int32_t     ffcodecs_video_receive_frame(ctx, decode_only, FfVideoFrame* frame)
//   uint64_t    ffcodecs_video_reset(ctx, extra, extra_len)
//   void        ffcodecs_video_release(ctx)
//   int32_t     ffcodecs_video_render_frame(ctx, surface, const FfVideoFrame* frame, width, height)

use std::ffi::{c_char, c_void, CStr, CString};
use std::path::Path;
use std::ptr;

use crate::buffer::{OutputBuffer, OutputMode, SurfaceHandle, VideoOutputBuffer, PLANE_U, PLANE_V, PLANE_Y};
use crate::config::LibraryConfig;
use crate::error::{DecoderError, Result};
use crate::native::{AudioTuning, CodecEngine, GrowableOutput, RawContext, ERROR_OTHER, SUCCESS};

// ============================================================================
// C Types
// ============================================================================

/// Frame descriptor filled by `ffcodecs_video_receive_frame`. Plane pointers
/// stay valid until the next call on the same context.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfVideoFrame {
    pub pts: i64,
    pub width: i32,
    pub height: i32,
    pub planes: [*const u8; 3],
    pub strides: [i32; 3],
}

impl Default for FfVideoFrame {
    fn default() -> Self {
        Self {
            pts: 0,
            width: 0,
            height: 0,
            planes: [ptr::null(); 3],
            strides: [0; 3],
        }
    }
}

/// Called by the native decoder when the output buffer is too small.
/// Returns the new base pointer and writes the new capacity.
type GrowFn = unsafe extern "C" fn(user_data: *mut c_void, required_size: i32, new_capacity: *mut i32) -> *mut u8;

type VersionFn = unsafe extern "C" fn() -> *const c_char;
type PaddingFn = unsafe extern "C" fn() -> i32;
type HasDecoderFn = unsafe extern "C" fn(*const c_char) -> i32;
type AudioInitializeFn = unsafe extern "C" fn(*const c_char, *const u8, i32, i32, i32, i32) -> u64;
type AudioDecodeFn = unsafe extern "C" fn(u64, *const u8, i32, *mut u8, i32, GrowFn, *mut c_void) -> i32;
type ContextQueryFn = unsafe extern "C" fn(u64) -> i32;
type ResetFn = unsafe extern "C" fn(u64, *const u8, i32) -> u64;
type ReleaseFn = unsafe extern "C" fn(u64);
type VideoInitializeFn = unsafe extern "C" fn(*const c_char, *const u8, i32, i32) -> u64;
type SendPacketFn = unsafe extern "C" fn(u64, *const u8, i32, i64) -> i32;
type ReceiveFrameFn = unsafe extern "C" fn(u64, i32, *mut FfVideoFrame) -> i32;
type RenderFrameFn = unsafe extern "C" fn(u64, u64, *const FfVideoFrame, i32, i32) -> i32;

// ============================================================================
// Loaded Library
// ============================================================================

pub struct DynamicEngine {
    _lib: libloading::Library,

    version: VersionFn,
    input_padding_size: PaddingFn,
    has_decoder: HasDecoderFn,
    audio_initialize: AudioInitializeFn,
    audio_decode: AudioDecodeFn,
    audio_channel_count: ContextQueryFn,
    audio_sample_rate: ContextQueryFn,
    audio_reset: ResetFn,
    audio_release: ReleaseFn,
    video_initialize: VideoInitializeFn,
    video_send_packet: SendPacketFn,
    video_receive_frame: ReceiveFrameFn,
    video_reset: ResetFn,
    video_release: ReleaseFn,
    video_render_frame: RenderFrameFn,
}

// Function pointers into a library that lives as long as the engine.
unsafe impl Send for DynamicEngine {}
unsafe impl Sync for DynamicEngine {}

unsafe fn symbol<T: Copy>(lib: &libloading::Library, name: &[u8]) -> Result<T> {
    match lib.get::<T>(name) {
        Ok(sym) => Ok(*sym),
        Err(e) => {
            let printable = String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name));
            Err(DecoderError::Library(format!("missing symbol {}: {}", printable, e)))
        }
    }
}

impl DynamicEngine {
    /// Tries each configured path in order and keeps the first that loads.
    pub fn load(config: &LibraryConfig) -> Result<Self> {
        let mut failures = Vec::new();
        for path in &config.library_paths {
            match Self::open(path) {
                Ok(engine) => return Ok(engine),
                Err(e) => {
                    tracing::warn!("Failed to load native codec library {}: {}", path.display(), e);
                    failures.push(format!("{}: {}", path.display(), e));
                }
            }
        }
        if failures.is_empty() {
            return Err(DecoderError::Unavailable("no library paths configured".into()));
        }
        Err(DecoderError::Unavailable(failures.join("; ")))
    }

    pub fn open(path: &Path) -> Result<Self> {
        unsafe {
            let lib = libloading::Library::new(path).map_err(|e| DecoderError::Unavailable(e.to_string()))?;

            let version: VersionFn = symbol(&lib, b"ffcodecs_version\0")?;
            let input_padding_size: PaddingFn = symbol(&lib, b"ffcodecs_input_padding_size\0")?;
            let has_decoder: HasDecoderFn = symbol(&lib, b"ffcodecs_has_decoder\0")?;
            let audio_initialize: AudioInitializeFn = symbol(&lib, b"ffcodecs_audio_initialize\0")?;
            let audio_decode: AudioDecodeFn = symbol(&lib, b"ffcodecs_audio_decode\0")?;
            let audio_channel_count: ContextQueryFn = symbol(&lib, b"ffcodecs_audio_channel_count\0")?;
            let audio_sample_rate: ContextQueryFn = symbol(&lib, b"ffcodecs_audio_sample_rate\0")?;
            let audio_reset: ResetFn = symbol(&lib, b"ffcodecs_audio_reset\0")?;
            let audio_release: ReleaseFn = symbol(&lib, b"ffcodecs_audio_release\0")?;
            let video_initialize: VideoInitializeFn = symbol(&lib, b"ffcodecs_video_initialize\0")?;
            let video_send_packet: SendPacketFn = symbol(&lib, b"ffcodecs_video_send_packet\0")?;
            let video_receive_frame: ReceiveFrameFn = symbol(&lib, b"ffcodecs_video_receive_frame\0")?;
            let video_reset: ResetFn = symbol(&lib, b"ffcodecs_video_reset\0")?;
            let video_release: ReleaseFn = symbol(&lib, b"ffcodecs_video_release\0")?;
            let video_render_frame: RenderFrameFn = symbol(&lib, b"ffcodecs_video_render_frame\0")?;

            tracing::info!("Native codec library loaded from {}", path.display());

            Ok(Self {
                _lib: lib,
                version,
                input_padding_size,
                has_decoder,
                audio_initialize,
                audio_decode,
                audio_channel_count,
                audio_sample_rate,
                audio_reset,
                audio_release,
                video_initialize,
                video_send_packet,
                video_receive_frame,
                video_reset,
                video_release,
                video_render_frame,
            })
        }
    }
}

fn extra_parts(extra_data: Option<&[u8]>) -> (*const u8, i32) {
    match extra_data {
        Some(extra) => (extra.as_ptr(), len_i32(extra.len())),
        None => (ptr::null(), 0),
    }
}

fn len_i32(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

unsafe extern "C" fn grow_output(user_data: *mut c_void, required_size: i32, new_capacity: *mut i32) -> *mut u8 {
    if user_data.is_null() || required_size < 0 {
        return ptr::null_mut();
    }
    let output = &mut *(user_data as *mut &mut dyn GrowableOutput);
    let buf = output.grow(required_size as usize);
    if !new_capacity.is_null() {
        *new_capacity = len_i32(buf.len());
    }
    buf.as_mut_ptr()
}

/// Copies a native frame into `output`. Returns a native status code.
fn copy_frame(frame: &FfVideoFrame, mode: OutputMode, output: &mut VideoOutputBuffer) -> i32 {
    output.init(frame.pts, mode);
    if frame.width <= 0 || frame.height <= 0 || frame.strides[PLANE_Y] <= 0 || frame.strides[PLANE_U] <= 0 {
        return ERROR_OTHER;
    }
    let (width, height) = (frame.width as u32, frame.height as u32);
    if !output.init_for_yuv_frame(width, height, frame.strides[PLANE_Y] as u32, frame.strides[PLANE_U] as u32) {
        return ERROR_OTHER;
    }
    for plane in [PLANE_Y, PLANE_U, PLANE_V] {
        let src = frame.planes[plane];
        if src.is_null() {
            return ERROR_OTHER;
        }
        let dst = output.plane_mut(plane);
        // SAFETY: the native side guarantees stride * rows bytes per plane.
        let src = unsafe { std::slice::from_raw_parts(src, dst.len()) };
        dst.copy_from_slice(src);
    }
    SUCCESS
}

impl CodecEngine for DynamicEngine {
    fn version(&self) -> String {
        unsafe {
            let raw = (self.version)();
            if raw.is_null() {
                return String::new();
            }
            CStr::from_ptr(raw).to_string_lossy().into_owned()
        }
    }

    fn input_padding_size(&self) -> i32 {
        unsafe { (self.input_padding_size)() }
    }

    fn has_decoder(&self, codec_name: &str) -> bool {
        let Ok(name) = CString::new(codec_name) else {
            return false;
        };
        unsafe { (self.has_decoder)(name.as_ptr()) != 0 }
    }

    fn audio_initialize(&self, codec_name: &str, extra_data: Option<&[u8]>, tuning: &AudioTuning) -> RawContext {
        let Ok(name) = CString::new(codec_name) else {
            return RawContext::NULL;
        };
        let (extra, extra_len) = extra_parts(extra_data);
        let raw = unsafe {
            (self.audio_initialize)(
                name.as_ptr(),
                extra,
                extra_len,
                tuning.output_float as i32,
                tuning.sample_rate as i32,
                tuning.channel_count as i32,
            )
        };
        RawContext(raw)
    }

    fn audio_decode(&self, ctx: RawContext, input: &[u8], output: &mut dyn GrowableOutput) -> i32 {
        let (out_ptr, out_len) = {
            let buf = output.buffer();
            (buf.as_mut_ptr(), len_i32(buf.len()))
        };
        let mut user: &mut dyn GrowableOutput = output;
        unsafe {
            (self.audio_decode)(
                ctx.0,
                input.as_ptr(),
                len_i32(input.len()),
                out_ptr,
                out_len,
                grow_output,
                &mut user as *mut &mut dyn GrowableOutput as *mut c_void,
            )
        }
    }

    fn audio_channel_count(&self, ctx: RawContext) -> i32 {
        unsafe { (self.audio_channel_count)(ctx.0) }
    }

    fn audio_sample_rate(&self, ctx: RawContext) -> i32 {
        unsafe { (self.audio_sample_rate)(ctx.0) }
    }

    fn audio_reset(&self, ctx: RawContext, extra_data: Option<&[u8]>) -> RawContext {
        let (extra, extra_len) = extra_parts(extra_data);
        RawContext(unsafe { (self.audio_reset)(ctx.0, extra, extra_len) })
    }

    fn audio_release(&self, ctx: RawContext) {
        unsafe { (self.audio_release)(ctx.0) }
    }

    fn video_initialize(&self, codec_name: &str, extra_data: Option<&[u8]>, threads: u32) -> RawContext {
        let Ok(name) = CString::new(codec_name) else {
            return RawContext::NULL;
        };
        let (extra, extra_len) = extra_parts(extra_data);
        let threads = i32::try_from(threads).unwrap_or(i32::MAX);
        RawContext(unsafe { (self.video_initialize)(name.as_ptr(), extra, extra_len, threads) })
    }

    fn video_send_packet(&self, ctx: RawContext, input: &[u8], time_us: i64) -> i32 {
        unsafe { (self.video_send_packet)(ctx.0, input.as_ptr(), len_i32(input.len()), time_us) }
    }

    fn video_receive_frame(
        &self,
        ctx: RawContext,
        mode: OutputMode,
        output: &mut VideoOutputBuffer,
        decode_only: bool,
    ) -> i32 {
        let mut frame = FfVideoFrame::default();
        let result = unsafe { (self.video_receive_frame)(ctx.0, decode_only as i32, &mut frame) };
        if result != SUCCESS {
            return result;
        }
        copy_frame(&frame, mode, output)
    }

    fn video_reset(&self, ctx: RawContext, extra_data: Option<&[u8]>) -> RawContext {
        let (extra, extra_len) = extra_parts(extra_data);
        RawContext(unsafe { (self.video_reset)(ctx.0, extra, extra_len) })
    }

    fn video_release(&self, ctx: RawContext) {
        unsafe { (self.video_release)(ctx.0) }
    }

    fn video_render_frame(&self, ctx: RawContext, surface: SurfaceHandle, output: &VideoOutputBuffer) -> i32 {
        let strides = output.strides();
        let frame = FfVideoFrame {
            pts: output.time_us(),
            width: output.width as i32,
            height: output.height as i32,
            planes: [
                output.plane(PLANE_Y).as_ptr(),
                output.plane(PLANE_U).as_ptr(),
                output.plane(PLANE_V).as_ptr(),
            ],
            strides: [strides[0] as i32, strides[1] as i32, strides[2] as i32],
        };
        unsafe { (self.video_render_frame)(ctx.0, surface.0, &frame, frame.width, frame.height) }
    }
}
