use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use tracing::debug;

use super::Worker;
use super::protocol::{Request, RequestId, RequestKind, Response, ResponseBody, SurfaceSize};
use crate::config::ConfigPatch;
use crate::error::{ScanError, ScanResult};
use crate::models::{DetectionResult, Frame};
use crate::mrz::MrzResult;
use crate::pipeline::FrameOutcome;
use crate::stats::PerformanceSnapshot;

const CHANNEL_CAPACITY: usize = 4;
/// Default per-request deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Caller side of a worker running on its own thread.
///
/// Frames are moved into the request, so the caller gives up the buffer.
pub struct WorkerHandle {
    tx: Sender<Request>,
    rx: Receiver<Response>,
    next_id: AtomicU64,
    timeout: Duration,
    thread: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Start `worker` on a new thread
    pub fn spawn(worker: Worker) -> ScanResult<Self> {
        let (tx, worker_rx) = bounded(CHANNEL_CAPACITY);
        // Unbounded so the worker never blocks on responses nobody reads
        let (worker_tx, rx) = unbounded();
        let thread = thread::Builder::new()
            .name("qr-live-worker".into())
            .spawn(move || worker.run(worker_rx, worker_tx))?;
        Ok(Self {
            tx,
            rx,
            next_id: AtomicU64::new(1),
            timeout: DEFAULT_TIMEOUT,
            thread: Some(thread),
        })
    }

    /// Change the per-request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Send `kind` and wait for its correlated response.
    ///
    /// Responses to earlier requests that timed out are discarded.
    pub fn request(&self, kind: RequestKind) -> ScanResult<Response> {
        let id = self.next_id();
        self.tx
            .send(Request::new(id.clone(), kind))
            .map_err(|_| ScanError::WorkerClosed)?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(response) if response.id == id => return Ok(response),
                Ok(stale) => debug!(id = %stale.id, expected = %id, "discarding late response"),
                Err(RecvTimeoutError::Timeout) => return Err(ScanError::Timeout(self.timeout)),
                Err(RecvTimeoutError::Disconnected) => return Err(ScanError::WorkerClosed),
            }
        }
    }

    fn call(&self, kind: RequestKind) -> ScanResult<ResponseBody> {
        self.request(kind)?.outcome
    }

    fn unexpected(body: ResponseBody) -> ScanError {
        ScanError::Protocol(format!("unexpected response body {body:?}"))
    }

    /// Load the decode primitive; returns whether it was already loaded
    pub fn init(&self, config: Option<ConfigPatch>) -> ScanResult<bool> {
        match self.call(RequestKind::Init { config })? {
            ResponseBody::Initialized {
                already_initialized,
            } => Ok(already_initialized),
            other => Err(Self::unexpected(other)),
        }
    }

    pub fn update_config(&self, config: ConfigPatch, surface: Option<(u32, u32)>) -> ScanResult<()> {
        let surface = surface.map(|(width, height)| SurfaceSize { width, height });
        match self.call(RequestKind::UpdateConfig { config, surface })? {
            ResponseBody::ConfigUpdated { .. } => Ok(()),
            other => Err(Self::unexpected(other)),
        }
    }

    pub fn process_frame(&self, frame: Frame) -> ScanResult<FrameOutcome> {
        match self.call(RequestKind::ProcessFrame { frame })? {
            ResponseBody::Frame(outcome) => Ok(outcome),
            other => Err(Self::unexpected(other)),
        }
    }

    pub fn decode(&self, frame: Frame) -> ScanResult<Vec<DetectionResult>> {
        match self.call(RequestKind::Decode { frame })? {
            ResponseBody::Decoded(results) => Ok(results),
            other => Err(Self::unexpected(other)),
        }
    }

    pub fn stats(&self) -> ScanResult<PerformanceSnapshot> {
        match self.call(RequestKind::GetPerformanceStats)? {
            ResponseBody::Stats(snapshot) => Ok(snapshot),
            other => Err(Self::unexpected(other)),
        }
    }

    pub fn reset_stats(&self) -> ScanResult<()> {
        self.call(RequestKind::ResetPerformanceStats).map(|_| ())
    }

    pub fn clear_buffer(&self) -> ScanResult<()> {
        self.call(RequestKind::ClearBuffer).map(|_| ())
    }

    pub fn parse_mrz(&self, text: impl Into<String>) -> ScanResult<MrzResult> {
        match self.call(RequestKind::ParseMrz { text: text.into() })? {
            ResponseBody::Mrz(mrz) => Ok(mrz),
            other => Err(Self::unexpected(other)),
        }
    }

    /// Drop the worker's state and wait for its thread to exit
    pub fn terminate(mut self) -> ScanResult<()> {
        let result = self.call(RequestKind::Terminate).map(|_| ());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        result
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let id = self.next_id();
            let _ = self.tx.send(Request::new(id, RequestKind::Terminate));
            let _ = thread.join();
        }
    }
}
