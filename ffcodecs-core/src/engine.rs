//! # Buffered Decoder Engine
//!
//! Runs a decode handler on a dedicated worker thread, exchanging pooled
//! input and output buffers with the host.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐ queue_input  ┌─────────────────┐ decode  ┌───────────────┐
//! │   Host   │─────────────►│ BufferedDecoder │────────►│ DecodeHandler │
//! │  Thread  │◄─────────────│  (pools+queues) │◄────────│ (worker only) │
//! └──────────┘ dequeue_out  └─────────────────┘         └───────────────┘
//! ```
//!
//! The handler, and through it the native context, is only ever touched on
//! the worker thread. The host reaches it through [`BufferedDecoder::run_on_worker`].

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::buffer::{DecodeStatus, InputBuffer, OutputBuffer};
use crate::error::{DecoderError, Result};

// ============================================================================
// Handler Seam
// ============================================================================

/// Codec-specific half of a decoder. Everything except
/// [`create_output_buffer`](DecodeHandler::create_output_buffer) runs on the
/// worker thread.
pub trait DecodeHandler: Send + 'static {
    type Output: OutputBuffer;

    fn create_output_buffer(&mut self) -> Self::Output;

    /// Decodes one access unit. `Err` is fatal for the decoder instance.
    fn decode(&mut self, input: &InputBuffer, output: &mut Self::Output) -> Result<DecodeStatus>;

    /// Brings the native context back to a clean state after a flush.
    fn reset(&mut self) -> Result<()>;

    /// Frees native resources. Called once, as the worker's final act.
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Created,
    Ready,
    Resetting,
    Released,
}

#[derive(Debug, Clone, Default)]
pub struct DecoderStats {
    pub decoded: u64,
    pub skipped: u64,
    pub flushes: u64,
    pub queued_inputs: usize,
    pub queued_outputs: usize,
    pub available_inputs: usize,
}

// ============================================================================
// Shared State
// ============================================================================

type Task<H> = Box<dyn FnOnce(&mut H) + Send>;

struct Queues<H: DecodeHandler> {
    available_inputs: Vec<InputBuffer>,
    queued_inputs: VecDeque<InputBuffer>,
    available_outputs: Vec<H::Output>,
    queued_outputs: VecDeque<H::Output>,
    tasks: VecDeque<Task<H>>,
    state: DecoderState,
    error: Option<DecoderError>,
    flush_generation: u64,
    reset_pending: bool,
    reset_done_generation: u64,
    skipped_output_buffer_count: u32,
    stop: bool,
}

impl<H: DecodeHandler> Queues<H> {
    fn check(&self) -> Result<()> {
        if self.state == DecoderState::Released {
            return Err(DecoderError::Released);
        }
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn has_work(&self) -> bool {
        self.stop
            || self.reset_pending
            || !self.tasks.is_empty()
            || (self.error.is_none() && !self.queued_inputs.is_empty() && !self.available_outputs.is_empty())
    }

    fn recycle_input(&mut self, mut input: InputBuffer) {
        input.clear();
        self.available_inputs.push(input);
    }

    fn recycle_output(&mut self, mut output: H::Output) {
        output.clear();
        self.available_outputs.push(output);
    }
}

struct Shared<H: DecodeHandler> {
    queues: Mutex<Queues<H>>,
    /// Worker waits here for inputs, tasks, resets and stop.
    work_available: Condvar,
    /// Host waits here for free inputs and reset completion.
    host_wakeup: Condvar,
    decoded: AtomicU64,
    skipped: AtomicU64,
    flushes: AtomicU64,
}

// ============================================================================
// Buffered Decoder
// ============================================================================

pub struct BufferedDecoder<H: DecodeHandler> {
    name: String,
    shared: Arc<Shared<H>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<H: DecodeHandler> BufferedDecoder<H> {
    /// Allocates both pools and starts the worker thread.
    pub fn new(
        name: impl Into<String>,
        num_input_buffers: usize,
        num_output_buffers: usize,
        initial_input_size: usize,
        padding: usize,
        mut handler: H,
    ) -> Result<Self> {
        let name = name.into();
        let available_inputs = (0..num_input_buffers)
            .map(|_| InputBuffer::new(initial_input_size, padding))
            .collect();
        let available_outputs = (0..num_output_buffers)
            .map(|_| handler.create_output_buffer())
            .collect();

        let shared = Arc::new(Shared {
            queues: Mutex::new(Queues {
                available_inputs,
                queued_inputs: VecDeque::new(),
                available_outputs,
                queued_outputs: VecDeque::new(),
                tasks: VecDeque::new(),
                state: DecoderState::Created,
                error: None,
                flush_generation: 0,
                reset_pending: false,
                reset_done_generation: 0,
                skipped_output_buffer_count: 0,
                stop: false,
            }),
            work_available: Condvar::new(),
            host_wakeup: Condvar::new(),
            decoded: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(format!("{}-decode", name))
            .spawn(move || run_worker(worker_shared, handler))
            .map_err(|e| DecoderError::Initialization(format!("failed to start decode thread: {}", e)))?;
        shared.queues.lock().state = DecoderState::Ready;

        tracing::debug!(
            "Decoder {} started with {} inputs / {} outputs",
            name,
            num_input_buffers,
            num_output_buffers
        );

        Ok(Self {
            name,
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DecoderState {
        self.shared.queues.lock().state
    }

    /// Takes a free input buffer, or `None` if all are in flight.
    pub fn dequeue_input_buffer(&self) -> Result<Option<InputBuffer>> {
        let mut queues = self.shared.queues.lock();
        queues.check()?;
        let generation = queues.flush_generation;
        Ok(queues.available_inputs.pop().map(|mut input| {
            input.clear();
            input.generation = generation;
            input
        }))
    }

    /// Like [`dequeue_input_buffer`](Self::dequeue_input_buffer) but blocks
    /// until an input buffer frees up.
    pub fn acquire_input_buffer(&self) -> Result<InputBuffer> {
        let mut queues = self.shared.queues.lock();
        loop {
            queues.check()?;
            if let Some(mut input) = queues.available_inputs.pop() {
                input.clear();
                input.generation = queues.flush_generation;
                return Ok(input);
            }
            self.shared.host_wakeup.wait(&mut queues);
        }
    }

    /// Hands a filled input buffer to the worker. Buffers taken before the
    /// last flush are returned to the pool undecoded.
    pub fn queue_input_buffer(&self, input: InputBuffer) -> Result<()> {
        let mut queues = self.shared.queues.lock();
        queues.check()?;
        if input.generation != queues.flush_generation {
            queues.recycle_input(input);
            self.shared.host_wakeup.notify_all();
            return Ok(());
        }
        queues.queued_inputs.push_back(input);
        self.shared.work_available.notify_one();
        Ok(())
    }

    /// Next decoded output in submission order, or `None` if none is ready.
    pub fn dequeue_output_buffer(&self) -> Result<Option<H::Output>> {
        let mut queues = self.shared.queues.lock();
        queues.check()?;
        Ok(queues.queued_outputs.pop_front())
    }

    /// Returns an output buffer to the pool.
    pub fn release_output_buffer(&self, output: H::Output) {
        let mut queues = self.shared.queues.lock();
        if queues.state == DecoderState::Released {
            return;
        }
        queues.recycle_output(output);
        self.shared.work_available.notify_one();
    }

    /// Discards all queued work and resets the handler. Blocks until the
    /// worker has completed the reset.
    pub fn flush(&self) -> Result<()> {
        let mut queues = self.shared.queues.lock();
        queues.check()?;

        while let Some(input) = queues.queued_inputs.pop_front() {
            queues.recycle_input(input);
        }
        while let Some(output) = queues.queued_outputs.pop_front() {
            queues.recycle_output(output);
        }
        queues.skipped_output_buffer_count = 0;
        queues.flush_generation += 1;
        let generation = queues.flush_generation;
        queues.state = DecoderState::Resetting;
        queues.reset_pending = true;
        self.shared.flushes.fetch_add(1, Ordering::Relaxed);
        self.shared.work_available.notify_one();
        self.shared.host_wakeup.notify_all();

        while queues.reset_done_generation < generation && queues.error.is_none() && !queues.stop {
            self.shared.host_wakeup.wait(&mut queues);
        }
        queues.check()?;
        queues.state = DecoderState::Ready;
        Ok(())
    }

    /// Runs `f` against the handler on the worker thread, between decodes,
    /// and returns its result.
    pub fn run_on_worker<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut H) -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        {
            let mut queues = self.shared.queues.lock();
            queues.check()?;
            queues.tasks.push_back(Box::new(move |handler: &mut H| {
                let _ = tx.send(f(handler));
            }));
            self.shared.work_available.notify_one();
        }
        rx.recv().map_err(|_| DecoderError::Released)
    }

    /// Stops the worker, which releases the handler, and joins it.
    /// Safe to call more than once.
    pub fn release(&self) {
        {
            let mut queues = self.shared.queues.lock();
            queues.state = DecoderState::Released;
            queues.stop = true;
            self.shared.work_available.notify_all();
            self.shared.host_wakeup.notify_all();
        }
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("Decoder {} worker panicked", self.name);
            }
            tracing::debug!("Decoder {} released", self.name);
        }
    }

    pub fn stats(&self) -> DecoderStats {
        let queues = self.shared.queues.lock();
        DecoderStats {
            decoded: self.shared.decoded.load(Ordering::Relaxed),
            skipped: self.shared.skipped.load(Ordering::Relaxed),
            flushes: self.shared.flushes.load(Ordering::Relaxed),
            queued_inputs: queues.queued_inputs.len(),
            queued_outputs: queues.queued_outputs.len(),
            available_inputs: queues.available_inputs.len(),
        }
    }
}

impl<H: DecodeHandler> Drop for BufferedDecoder<H> {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Runs a handler call, turning a panic into a fatal decode error.
fn guarded<R>(what: &str, f: impl FnOnce() -> Result<R>) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        tracing::error!("Decode handler panicked during {}", what);
        Err(DecoderError::Decode("unexpected decode error".into()))
    })
}

fn run_worker<H: DecodeHandler>(shared: Arc<Shared<H>>, mut handler: H) {
    loop {
        let mut queues = shared.queues.lock();
        while !queues.has_work() {
            shared.work_available.wait(&mut queues);
        }
        if queues.stop {
            break;
        }

        if queues.reset_pending {
            queues.reset_pending = false;
            let generation = queues.flush_generation;
            drop(queues);
            let result = guarded("reset", || handler.reset());
            let mut queues = shared.queues.lock();
            if let Err(e) = result {
                tracing::error!("Decoder reset failed: {}", e);
                queues.error = Some(e);
            }
            queues.reset_done_generation = queues.reset_done_generation.max(generation);
            shared.host_wakeup.notify_all();
            continue;
        }

        if let Some(task) = queues.tasks.pop_front() {
            drop(queues);
            let result = guarded("task", || {
                task(&mut handler);
                Ok(())
            });
            if let Err(e) = result {
                let mut queues = shared.queues.lock();
                queues.error = Some(e);
                shared.host_wakeup.notify_all();
            }
            continue;
        }

        if queues.error.is_some() || queues.available_outputs.is_empty() {
            continue;
        }
        let Some(input) = queues.queued_inputs.pop_front() else {
            continue;
        };
        let Some(mut output) = queues.available_outputs.pop() else {
            continue;
        };
        let generation = queues.flush_generation;
        drop(queues);

        output.clear();
        let result = if input.end_of_stream {
            let header = output.header_mut();
            header.time_us = input.time_us;
            header.end_of_stream = true;
            Ok(DecodeStatus::Decoded)
        } else {
            guarded("decode", || handler.decode(&input, &mut output))
        };

        let mut queues = shared.queues.lock();
        let stale = generation != queues.flush_generation;
        match result {
            Err(e) => {
                // Fatal even if a flush raced the decode.
                tracing::error!("Unexpected decode error: {}", e);
                queues.error = Some(e);
                queues.recycle_output(output);
            }
            Ok(_) if stale => {
                // Flushed while decoding; the output belongs to discarded media.
                queues.recycle_output(output);
            }
            Ok(status) if status.is_deliverable() => {
                output.header_mut().skipped_output_buffer_count =
                    std::mem::take(&mut queues.skipped_output_buffer_count);
                queues.queued_outputs.push_back(output);
                shared.decoded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {
                queues.skipped_output_buffer_count += 1;
                queues.recycle_output(output);
                shared.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
        queues.recycle_input(input);
        shared.host_wakeup.notify_all();
    }

    handler.release();

    let mut queues = shared.queues.lock();
    queues.tasks.clear();
    queues.available_inputs.clear();
    queues.queued_inputs.clear();
    queues.available_outputs.clear();
    queues.queued_outputs.clear();
}
