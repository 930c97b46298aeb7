//! Background worker lifecycle
//!
//! Every training worker runs as one tokio task driven by a [`WorkerControl`]:
//!
//! **States:** `Created → Started → Running → Stopping → Stopped`
//!
//! **Suspension points:**
//! - [`WorkerControl::wait`]: idle wait with timeout, woken early by a bump or by stop
//! - [`WorkerControl::pause`]: cooperative throttle, interruptible only by stop
//!
//! Stop is a child of the process-wide [`CancellationToken`], so cancelling
//! the service token stops every worker. The advisory [`BusyFlag`] is the only
//! state shared between workers.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum WorkerState {
    Created = 0,
    Started = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Created,
            1 => WorkerState::Started,
            2 => WorkerState::Running,
            3 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

/// Why an idle wait returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Another component signalled that there may be new work
    Bumped,
    TimedOut,
    /// Stop was requested; the worker should leave its loop
    Stopped,
}

/// Sleep/wake and stop control for one worker
///
/// Never used for data protection: all data consistency comes from the
/// store and the watermark stamps.
#[derive(Debug)]
pub struct WorkerControl {
    name: &'static str,
    state: AtomicU8,
    cancel: CancellationToken,
    /// Holds at most one pending wake-up
    bump: Notify,
    paused: AtomicBool,
}

impl WorkerControl {
    /// Create a control whose stop signal follows `shutdown`
    pub fn new(name: &'static str, shutdown: &CancellationToken) -> Self {
        Self {
            name,
            state: AtomicU8::new(WorkerState::Created as u8),
            cancel: shutdown.child_token(),
            bump: Notify::new(),
            paused: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Stop has been requested (directly or via the process-wide token)
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wake the worker early if it is idling; remembered if it is busy
    pub fn bump(&self) {
        debug!(worker = self.name, "Bump");
        self.bump.notify_one();
    }

    /// Idle wait: returns on bump, timeout or stop, whichever comes first
    pub async fn wait(&self, timeout: Duration) -> WakeReason {
        if self.is_stopped() {
            return WakeReason::Stopped;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => WakeReason::Stopped,
            _ = self.bump.notified() => WakeReason::Bumped,
            _ = tokio::time::sleep(timeout) => WakeReason::TimedOut,
        }
    }

    /// Advertise "paused" and sleep for `duration`
    ///
    /// Bumps do not cut the pause short; stop does. Returns `false` if the
    /// pause ended because of stop.
    pub async fn pause(&self, duration: Duration) -> bool {
        if self.is_stopped() {
            return false;
        }

        self.paused.store(true, Ordering::Release);
        let completed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        };
        self.paused.store(false, Ordering::Release);
        completed
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Request stop and wake the worker so it notices promptly
    pub fn stop(&self) {
        if self.state() < WorkerState::Stopping {
            self.set_state(WorkerState::Stopping);
        }
        self.cancel.cancel();
        self.bump.notify_one();
    }
}

/// A long-running background worker
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    fn control(&self) -> &WorkerControl;

    /// Main loop; returns once stop has been requested
    async fn run(&self);
}

/// Spawn a worker's main loop as a tokio task
///
/// Returns immediately; the worker runs in the background until stopped.
pub fn spawn_worker<W: Worker>(worker: Arc<W>) -> JoinHandle<()> {
    worker.control().set_state(WorkerState::Started);
    tokio::spawn(async move {
        let control = worker.control();
        if !control.is_stopped() {
            control.set_state(WorkerState::Running);
            info!(worker = control.name(), "Worker started");
            worker.run().await;
        }
        control.set_state(WorkerState::Stopped);
        info!(worker = control.name(), "Worker stopped");
    })
}

/// Advisory flag raised while the fingerprint calculator is scanning
///
/// Model builders read it to avoid starting a sweep against a corpus that is
/// being fingerprinted. Races are harmless: every model is watermark-stamped.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Raise the flag until the returned guard is dropped
    pub fn enter(&self) -> BusyGuard {
        self.0.store(true, Ordering::Release);
        BusyGuard(Arc::clone(&self.0))
    }
}

/// Clears the busy flag on drop (including on early return)
#[derive(Debug)]
pub struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
