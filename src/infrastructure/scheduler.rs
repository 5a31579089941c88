//! Tokio-backed report timers
//!
//! One task per armed bearer sleeps for the requested delay and then pushes
//! the bearer index onto a channel. The host drains the channel and feeds
//! each index back into the engine's timer entry point, keeping firings in
//! the same serialization domain as every other engine call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::application::ports::Scheduler;

struct TimerEntry {
    task: JoinHandle<()>,
    fired: Arc<AtomicBool>,
}

/// Per-bearer one-shot timers on a tokio runtime.
pub struct TokioScheduler {
    handle: Handle,
    tx: mpsc::UnboundedSender<u8>,
    timers: HashMap<u8, TimerEntry>,
}

impl TokioScheduler {
    /// Create the scheduler and the channel carrying fired bearer indexes.
    pub fn new(handle: Handle) -> (Self, mpsc::UnboundedReceiver<u8>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            handle,
            tx,
            timers: HashMap::new(),
        };
        (scheduler, rx)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, bearer_index: u8, delay: Duration) {
        if let Some(entry) = self.timers.remove(&bearer_index) {
            entry.task.abort();
        }

        trace!(bearer_index, ?delay, "Arming report timer");
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let tx = self.tx.clone();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            flag.store(true, Ordering::SeqCst);
            // The receiver going away just means the host is shutting down.
            let _ = tx.send(bearer_index);
        });

        self.timers.insert(bearer_index, TimerEntry { task, fired });
    }

    fn cancel(&mut self, bearer_index: u8) -> bool {
        match self.timers.remove(&bearer_index) {
            Some(entry) => {
                let fired = entry.fired.load(Ordering::SeqCst);
                entry.task.abort();
                !fired
            }
            None => false,
        }
    }

    fn is_armed(&self, bearer_index: u8) -> bool {
        self.timers
            .get(&bearer_index)
            .is_some_and(|entry| !entry.fired.load(Ordering::SeqCst))
    }
}
