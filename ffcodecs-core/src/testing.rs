// Scripted in-process codec engine for unit tests.
//
// Return codes and native side effects are queued per call; anything not
// scripted falls back to a well-behaved default (echo audio, one frame per
// video packet).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::buffer::{OutputMode, SurfaceHandle, VideoOutputBuffer};
use crate::native::{AudioTuning, CodecEngine, GrowableOutput, RawContext, ERROR_INVALID_DATA, SUCCESS};

/// One scripted audio decode call.
#[derive(Debug, Clone)]
pub enum AudioStep {
    /// Write this many bytes, growing the output first if needed.
    Write(usize),
    /// Return the code without touching the output.
    Code(i32),
}

#[derive(Debug)]
pub struct Script {
    pub init_result: Option<RawContext>,
    pub reset_result: Option<RawContext>,
    pub audio_steps: VecDeque<AudioStep>,
    pub channel_count: i32,
    pub sample_rate: i32,
    pub send_codes: VecDeque<i32>,
    pub receive_codes: VecDeque<i32>,
    pub render_code: i32,
    pub frame_size: (u32, u32),
}

impl Default for Script {
    fn default() -> Self {
        Self {
            init_result: None,
            reset_result: None,
            audio_steps: VecDeque::new(),
            channel_count: 2,
            sample_rate: 44_100,
            send_codes: VecDeque::new(),
            receive_codes: VecDeque::new(),
            render_code: SUCCESS,
            frame_size: (4, 2),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub version: usize,
    pub input_padding_size: usize,
    pub has_decoder: usize,
    pub audio_initialize: usize,
    pub audio_decode: usize,
    pub audio_channel_count: usize,
    pub audio_sample_rate: usize,
    pub audio_reset: usize,
    pub audio_release: usize,
    pub video_initialize: usize,
    pub video_send_packet: usize,
    pub video_receive_frame: usize,
    pub video_reset: usize,
    pub video_release: usize,
    pub video_render_frame: usize,
}

/// Arguments the engine was called with, in call order.
#[derive(Debug, Clone, Default)]
pub struct Recorded {
    pub codec_names: Vec<String>,
    pub init_extra: Vec<Option<Vec<u8>>>,
    pub tunings: Vec<AudioTuning>,
    pub threads: Vec<u32>,
    pub reset_extra: Vec<Option<Vec<u8>>>,
    pub decode_capacities: Vec<usize>,
    pub send_times: Vec<i64>,
    pub receive_decode_only: Vec<bool>,
    pub receive_modes: Vec<OutputMode>,
    pub rendered: Vec<(SurfaceHandle, u32, u32)>,
    pub released: Vec<RawContext>,
}

pub struct MockEngine {
    decoders: Option<Vec<String>>,
    next_token: AtomicU64,
    script: Mutex<Script>,
    counters: Mutex<Counters>,
    recorded: Mutex<Recorded>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            decoders: None,
            next_token: AtomicU64::new(1),
            script: Mutex::new(Script::default()),
            counters: Mutex::new(Counters::default()),
            recorded: Mutex::new(Recorded::default()),
        }
    }

    /// Restricts `has_decoder` to the given names. By default every name
    /// is supported.
    pub fn with_decoders(mut self, names: &[&str]) -> Self {
        self.decoders = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock()
    }

    pub fn counters(&self) -> Counters {
        *self.counters.lock()
    }

    pub fn recorded(&self) -> Recorded {
        self.recorded.lock().clone()
    }

    pub fn released_contexts(&self) -> Vec<RawContext> {
        self.recorded.lock().released.clone()
    }

    fn next_context(&self) -> RawContext {
        RawContext(self.next_token.fetch_add(1, Ordering::SeqCst))
    }

    fn count(&self, f: impl FnOnce(&mut Counters)) {
        f(&mut self.counters.lock());
    }
}

impl CodecEngine for MockEngine {
    fn version(&self) -> String {
        self.count(|c| c.version += 1);
        "6.0".into()
    }

    fn input_padding_size(&self) -> i32 {
        self.count(|c| c.input_padding_size += 1);
        64
    }

    fn has_decoder(&self, codec_name: &str) -> bool {
        self.count(|c| c.has_decoder += 1);
        match &self.decoders {
            Some(names) => names.iter().any(|n| n == codec_name),
            None => true,
        }
    }

    fn audio_initialize(&self, codec_name: &str, extra_data: Option<&[u8]>, tuning: &AudioTuning) -> RawContext {
        self.count(|c| c.audio_initialize += 1);
        {
            let mut recorded = self.recorded.lock();
            recorded.codec_names.push(codec_name.to_string());
            recorded.init_extra.push(extra_data.map(|e| e.to_vec()));
            recorded.tunings.push(*tuning);
        }
        let scripted = self.script.lock().init_result;
        scripted.unwrap_or_else(|| self.next_context())
    }

    fn audio_decode(&self, _ctx: RawContext, input: &[u8], output: &mut dyn GrowableOutput) -> i32 {
        self.count(|c| c.audio_decode += 1);
        let capacity = output.buffer().len();
        self.recorded.lock().decode_capacities.push(capacity);
        let step = self.script.lock().audio_steps.pop_front();
        let written = match step {
            Some(AudioStep::Code(code)) => return code,
            Some(AudioStep::Write(len)) => len,
            None => input.len(),
        };
        let buf = if written > capacity {
            output.grow(written)
        } else {
            output.buffer()
        };
        for (i, byte) in buf[..written].iter_mut().enumerate() {
            *byte = input.get(i % input.len().max(1)).copied().unwrap_or(0);
        }
        written as i32
    }

    fn audio_channel_count(&self, _ctx: RawContext) -> i32 {
        self.count(|c| c.audio_channel_count += 1);
        self.script.lock().channel_count
    }

    fn audio_sample_rate(&self, _ctx: RawContext) -> i32 {
        self.count(|c| c.audio_sample_rate += 1);
        self.script.lock().sample_rate
    }

    fn audio_reset(&self, _ctx: RawContext, extra_data: Option<&[u8]>) -> RawContext {
        self.count(|c| c.audio_reset += 1);
        self.recorded.lock().reset_extra.push(extra_data.map(|e| e.to_vec()));
        let scripted = self.script.lock().reset_result;
        scripted.unwrap_or_else(|| self.next_context())
    }

    fn audio_release(&self, ctx: RawContext) {
        self.count(|c| c.audio_release += 1);
        self.recorded.lock().released.push(ctx);
    }

    fn video_initialize(&self, codec_name: &str, extra_data: Option<&[u8]>, threads: u32) -> RawContext {
        self.count(|c| c.video_initialize += 1);
        {
            let mut recorded = self.recorded.lock();
            recorded.codec_names.push(codec_name.to_string());
            recorded.init_extra.push(extra_data.map(|e| e.to_vec()));
            recorded.threads.push(threads);
        }
        let scripted = self.script.lock().init_result;
        scripted.unwrap_or_else(|| self.next_context())
    }

    fn video_send_packet(&self, _ctx: RawContext, _input: &[u8], time_us: i64) -> i32 {
        self.count(|c| c.video_send_packet += 1);
        self.recorded.lock().send_times.push(time_us);
        self.script.lock().send_codes.pop_front().unwrap_or(SUCCESS)
    }

    fn video_receive_frame(
        &self,
        _ctx: RawContext,
        mode: OutputMode,
        output: &mut VideoOutputBuffer,
        decode_only: bool,
    ) -> i32 {
        self.count(|c| c.video_receive_frame += 1);
        let last_time = {
            let mut recorded = self.recorded.lock();
            recorded.receive_decode_only.push(decode_only);
            recorded.receive_modes.push(mode);
            recorded.send_times.last().copied().unwrap_or(0)
        };
        let (scripted, (width, height)) = {
            let mut script = self.script.lock();
            (script.receive_codes.pop_front(), script.frame_size)
        };
        if let Some(code) = scripted {
            if code != SUCCESS {
                return code;
            }
        } else if decode_only {
            return ERROR_INVALID_DATA;
        }
        output.init(last_time, mode);
        output.init_for_yuv_frame(width, height, width, width.div_ceil(2));
        SUCCESS
    }

    fn video_reset(&self, _ctx: RawContext, extra_data: Option<&[u8]>) -> RawContext {
        self.count(|c| c.video_reset += 1);
        self.recorded.lock().reset_extra.push(extra_data.map(|e| e.to_vec()));
        let scripted = self.script.lock().reset_result;
        scripted.unwrap_or_else(|| self.next_context())
    }

    fn video_release(&self, ctx: RawContext) {
        self.count(|c| c.video_release += 1);
        self.recorded.lock().released.push(ctx);
    }

    fn video_render_frame(&self, _ctx: RawContext, surface: SurfaceHandle, output: &VideoOutputBuffer) -> i32 {
        self.count(|c| c.video_render_frame += 1);
        self.recorded.lock().rendered.push((surface, output.width, output.height));
        self.script.lock().render_code
    }
}
