//! Native audio output using rodio
//!
//! The rodio output stream is not `Send`, so each engine owns a dedicated
//! thread that opens the stream and the sink, hands the sink back, and keeps
//! the stream alive until the engine is dropped. An engine can start paused to
//! mirror a suspended browser context.

use super::{AudioBackend, AudioBuffer, AudioEngine, EngineState, ResumeCallback};
use crate::{GateError, Result};
use parking_lot::Mutex;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Backend opening the default output device
#[derive(Debug, Clone, Copy)]
pub struct RodioBackend {
    sample_rate: u32,
    start_suspended: bool,
}

impl RodioBackend {
    /// Create a backend whose engines start suspended
    pub fn new(sample_rate: u32) -> Self {
        RodioBackend {
            sample_rate,
            start_suspended: true,
        }
    }

    /// Engines start producing output immediately
    pub fn start_running(mut self) -> Self {
        self.start_suspended = false;
        self
    }
}

impl Default for RodioBackend {
    fn default() -> Self {
        Self::new(super::DEFAULT_SAMPLE_RATE)
    }
}

/// Thread holding the output stream
struct StreamThread {
    /// Dropping this sender lets the thread exit and close the stream
    shutdown: Option<mpsc::SyncSender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Open the default device and a sink on it
    ///
    /// If either step fails the thread exits before returning the error.
    fn open() -> Result<(Self, Sink)> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::sync_channel::<()>(0);

        let thread = std::thread::Builder::new()
            .name("mystery-gate-audio".into())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("Failed to create audio stream: {}", e)));
                        return;
                    }
                };
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("Failed to create audio sink: {}", e)));
                        return;
                    }
                };
                if ready_tx.send(Ok(sink)).is_err() {
                    return;
                }
                // Blocks until the engine drops its sender
                let _ = shutdown_rx.recv();
            })?;

        let opened = ready_rx
            .recv()
            .map_err(|_| GateError::AudioUnavailable("audio thread exited".into()))
            .and_then(|result| result.map_err(GateError::AudioUnavailable));

        let mut stream_thread = StreamThread {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        };
        match opened {
            Ok(sink) => Ok((stream_thread, sink)),
            Err(err) => {
                stream_thread.close();
                Err(err)
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.thread
            .as_ref()
            .map_or(false, |thread| !thread.is_finished())
    }

    fn close(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.close();
    }
}

impl AudioBackend for RodioBackend {
    fn create_engine(&self) -> Result<Arc<dyn AudioEngine>> {
        let (stream_thread, sink) = StreamThread::open()?;

        if self.start_suspended {
            sink.pause();
        }

        let engine = RodioEngine {
            sink: Mutex::new(sink),
            sample_rate: self.sample_rate,
            stream_thread: Mutex::new(stream_thread),
        };
        Ok(Arc::new(engine) as Arc<dyn AudioEngine>)
    }

    fn name(&self) -> &'static str {
        "rodio"
    }
}

/// Engine backed by a rodio sink
///
/// Dropping the engine stops playback and closes the output stream.
pub struct RodioEngine {
    sink: Mutex<Sink>,
    sample_rate: u32,
    stream_thread: Mutex<StreamThread>,
}

impl RodioEngine {
    fn stream_is_open(&self) -> bool {
        self.stream_thread.lock().is_alive()
    }
}

impl AudioEngine for RodioEngine {
    fn state(&self) -> EngineState {
        if !self.stream_is_open() {
            EngineState::Closed
        } else if self.sink.lock().is_paused() {
            EngineState::Suspended
        } else {
            EngineState::Running
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn resume(&self, on_done: ResumeCallback) {
        self.sink.lock().play();
        on_done(Ok(()));
    }

    fn play_buffer(&self, buffer: &AudioBuffer) -> Result<()> {
        if buffer.channels() == 0 {
            return Err(GateError::PlaybackFailed("buffer has no channels".into()));
        }
        let source = SamplesBuffer::new(
            buffer.channels(),
            buffer.sample_rate(),
            buffer.samples().to_vec(),
        );
        self.sink.lock().append(source);
        Ok(())
    }
}

impl Drop for RodioEngine {
    fn drop(&mut self) {
        self.sink.lock().pause();
        self.stream_thread.lock().close();
    }
}
