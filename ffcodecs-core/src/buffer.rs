//! # Decoder Buffers
//!
//! Input and output buffers exchanged between the host and a
//! [`BufferedDecoder`](crate::engine::BufferedDecoder).
//!
//! Buffers are pooled: the host takes a free input buffer, fills it and
//! queues it; the worker hands back output buffers which the host returns to
//! the pool once it is done with them. Allocations are kept across reuse.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::format::Format;

// ============================================================================
// Decode Status
// ============================================================================

/// Outcome of decoding one input buffer into one output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// The output buffer holds data the host should consume.
    Decoded,
    /// Nothing was produced for this call (empty result or malformed packet).
    Skipped,
    /// The unit was fed for reference only and must not be presented.
    DecodeOnly,
}

impl DecodeStatus {
    pub fn is_deliverable(&self) -> bool {
        matches!(self, DecodeStatus::Decoded)
    }
}

// ============================================================================
// Input Buffer
// ============================================================================

/// A compressed access unit on its way to the native decoder.
#[derive(Debug)]
pub struct InputBuffer {
    /// Presentation time stamp in microseconds.
    pub time_us: i64,
    /// Feed for reference, never present.
    pub decode_only: bool,
    pub end_of_stream: bool,
    /// Format in effect for this unit, if the host attached one.
    pub format: Option<Arc<Format>>,
    data: Vec<u8>,
    len: usize,
    padding: usize,
    // Flush generation this buffer was handed out in.
    pub(crate) generation: u64,
}

impl InputBuffer {
    /// Allocates `initial_size` payload bytes plus `padding` zeroed bytes
    /// the native side may read past the end of the payload.
    pub fn new(initial_size: usize, padding: usize) -> Self {
        Self {
            time_us: 0,
            decode_only: false,
            end_of_stream: false,
            format: None,
            data: vec![0u8; initial_size + padding],
            len: 0,
            padding,
            generation: 0,
        }
    }

    /// Copies `payload` in, growing the allocation if needed. Padding after
    /// the payload is zeroed.
    pub fn set_payload(&mut self, payload: &[u8]) {
        self.ensure_space(payload.len());
        self.data[..payload.len()].copy_from_slice(payload);
        let end = payload.len() + self.padding;
        self.data[payload.len()..end].fill(0);
        self.len = payload.len();
    }

    /// Makes room for a payload of `size` bytes.
    pub fn ensure_space(&mut self, size: usize) {
        let required = size + self.padding;
        if self.data.len() < required {
            self.data.resize(required, 0);
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn capacity(&self) -> usize {
        self.data.len() - self.padding
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Marks this buffer as the end of the stream. It carries no payload.
    pub fn set_end_of_stream(&mut self) {
        self.end_of_stream = true;
        self.len = 0;
    }

    pub fn clear(&mut self) {
        self.time_us = 0;
        self.decode_only = false;
        self.end_of_stream = false;
        self.format = None;
        self.len = 0;
    }
}

// ============================================================================
// Output Buffers
// ============================================================================

/// State every output buffer carries, independent of media type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputHeader {
    pub time_us: i64,
    pub end_of_stream: bool,
    /// Outputs recycled without delivery since the previous delivered buffer.
    pub skipped_output_buffer_count: u32,
}

/// Pooled output buffer type produced by a decode handler.
pub trait OutputBuffer: Send + 'static {
    fn header(&self) -> &OutputHeader;
    fn header_mut(&mut self) -> &mut OutputHeader;
    /// Resets per-use state, keeping allocations.
    fn clear(&mut self);

    fn time_us(&self) -> i64 {
        self.header().time_us
    }

    fn is_end_of_stream(&self) -> bool {
        self.header().end_of_stream
    }
}

/// Decoded PCM.
#[derive(Debug, Default)]
pub struct AudioOutputBuffer {
    header: OutputHeader,
    data: Vec<u8>,
    len: usize,
}

impl AudioOutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepares the buffer for a decode at `time_us` with at least `size`
    /// bytes of room. Capacity never shrinks.
    pub fn init(&mut self, time_us: i64, size: usize) -> &mut [u8] {
        self.header.time_us = time_us;
        self.len = 0;
        if self.data.len() < size {
            self.data.resize(size, 0);
        }
        &mut self.data
    }

    /// Reallocates to exactly `required_size` bytes, keeping existing
    /// contents. Requests smaller than the current capacity are ignored.
    pub fn grow(&mut self, required_size: usize) -> &mut [u8] {
        if self.data.len() < required_size {
            self.data.resize(required_size, 0);
        }
        &mut self.data
    }

    /// The whole allocation, for the native side to write into.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }

    /// The decoded bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl OutputBuffer for AudioOutputBuffer {
    fn header(&self) -> &OutputHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut OutputHeader {
        &mut self.header
    }

    fn clear(&mut self) {
        self.header = OutputHeader::default();
        self.len = 0;
    }
}

/// How decoded video frames leave the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputMode {
    /// Frames are decoded but not exposed.
    #[default]
    None,
    /// YUV planes are exposed to the host.
    Yuv,
    /// YUV planes are blitted to a surface via the native layer.
    SurfaceYuv,
}

impl OutputMode {
    pub fn as_raw(&self) -> i32 {
        match self {
            Self::None => -1,
            Self::Yuv => 0,
            Self::SurfaceYuv => 1,
        }
    }

    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Yuv,
            1 => Self::SurfaceYuv,
            _ => Self::None,
        }
    }
}

/// Opaque host drawing target handed through to the native renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

pub const PLANE_Y: usize = 0;
pub const PLANE_U: usize = 1;
pub const PLANE_V: usize = 2;

/// A decoded picture in planar YUV 4:2:0. The buffer is the frame reference:
/// it stays valid until the host releases it back to the decoder.
#[derive(Debug, Default)]
pub struct VideoOutputBuffer {
    header: OutputHeader,
    pub mode: OutputMode,
    pub width: u32,
    pub height: u32,
    /// Format of the input that produced this frame. Never set for
    /// decode-only output.
    pub format: Option<Arc<Format>>,
    data: Vec<u8>,
    strides: [u32; 3],
}

impl VideoOutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self, time_us: i64, mode: OutputMode) {
        self.header.time_us = time_us;
        self.mode = mode;
    }

    /// Sizes the plane storage for a `width` x `height` frame with the given
    /// luma and chroma strides. Returns `false` on nonsensical geometry.
    pub fn init_for_yuv_frame(&mut self, width: u32, height: u32, y_stride: u32, uv_stride: u32) -> bool {
        if width == 0 || height == 0 || y_stride < width || uv_stride < width.div_ceil(2) {
            return false;
        }
        self.width = width;
        self.height = height;
        self.strides = [y_stride, uv_stride, uv_stride];
        let uv_height = height.div_ceil(2) as usize;
        let y_len = y_stride as usize * height as usize;
        let uv_len = uv_stride as usize * uv_height;
        self.data.resize(y_len + 2 * uv_len, 0);
        true
    }

    pub fn strides(&self) -> [u32; 3] {
        self.strides
    }

    fn plane_range(&self, plane: usize) -> std::ops::Range<usize> {
        let y_len = self.strides[PLANE_Y] as usize * self.height as usize;
        let uv_len = self.strides[PLANE_U] as usize * self.height.div_ceil(2) as usize;
        match plane {
            PLANE_Y => 0..y_len,
            PLANE_U => y_len..y_len + uv_len,
            _ => y_len + uv_len..y_len + 2 * uv_len,
        }
    }

    pub fn plane(&self, plane: usize) -> &[u8] {
        let range = self.plane_range(plane);
        &self.data[range]
    }

    pub fn plane_mut(&mut self, plane: usize) -> &mut [u8] {
        let range = self.plane_range(plane);
        &mut self.data[range]
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl OutputBuffer for VideoOutputBuffer {
    fn header(&self) -> &OutputHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut OutputHeader {
        &mut self.header
    }

    fn clear(&mut self) {
        self.header = OutputHeader::default();
        self.format = None;
        self.width = 0;
        self.height = 0;
    }
}
