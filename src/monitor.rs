//! Re-runs route extraction whenever the version store changes.

use crate::analysis::ComplexityAnalyzer;
use crate::bridge::CompilerServiceBridge;
use crate::model::{FileEvent, ResourceNode};
use crate::routes::{RouteExtraction, RouteTreeExtractor};
use serde::Serialize;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const STOP_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MonitorEvent {
    AnalysisStarted,
    AnalysisCompleted {
        root: Option<ResourceNode>,
        warnings: Vec<String>,
    },
}

type Subscribers = Arc<Mutex<Vec<Sender<MonitorEvent>>>>;

/// Debounced route analysis driven by store events.
///
/// The first pass runs as soon as the monitor starts. After that, any burst of store
/// events inside one debounce window produces exactly one pass.
pub struct RoutesMonitor {
    latest: Arc<Mutex<Option<RouteExtraction>>>,
    subscribers: Subscribers,
    stop: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RoutesMonitor {
    pub fn start(bridge: Arc<dyn CompilerServiceBridge>, debounce: Duration) -> Self {
        let events = bridge.host().store().subscribe();
        let latest = Arc::new(Mutex::new(None));
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, stop_rx) = mpsc::channel();
        let worker = Worker {
            bridge,
            debounce,
            latest: Arc::clone(&latest),
            subscribers: Arc::clone(&subscribers),
        };
        let thread = thread::spawn(move || worker.run(events, stop_rx));
        Self {
            latest,
            subscribers,
            stop: stop_tx,
            thread: Some(thread),
        }
    }

    pub fn subscribe(&self) -> Receiver<MonitorEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Result of the most recent completed pass.
    pub fn latest(&self) -> Option<RouteExtraction> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RoutesMonitor {
    fn drop(&mut self) {
        let _ = self.stop.send(());
    }
}

struct Worker {
    bridge: Arc<dyn CompilerServiceBridge>,
    debounce: Duration,
    latest: Arc<Mutex<Option<RouteExtraction>>>,
    subscribers: Subscribers,
}

impl Worker {
    fn run(self, events: Receiver<FileEvent>, stop: Receiver<()>) {
        let mut due: Option<Instant> = Some(Instant::now());
        loop {
            match stop.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => {}
            }
            if let Some(deadline) = due {
                if Instant::now() >= deadline {
                    due = None;
                    self.analyze();
                    continue;
                }
            }
            let wait = due
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(STOP_POLL)
                .min(STOP_POLL);
            match events.recv_timeout(wait) {
                Ok(event) => {
                    debug!(path = %event.path().display(), "store changed");
                    due = Some(Instant::now() + self.debounce);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    fn analyze(&self) {
        self.broadcast(MonitorEvent::AnalysisStarted);
        let extraction = RouteTreeExtractor::new(self.bridge.as_ref()).extract();
        let root = ComplexityAnalyzer::new(&extraction.graph).dominant().cloned();
        info!(
            routers = extraction.graph.len(),
            root = root.as_ref().map(|node| node.id.as_str()),
            "route analysis completed"
        );
        let warnings = extraction.warnings.clone();
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(extraction);
        self.broadcast(MonitorEvent::AnalysisCompleted { root, warnings });
    }

    fn broadcast(&self, event: MonitorEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
