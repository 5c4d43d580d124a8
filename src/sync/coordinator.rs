//! Coordinator - single consumer between the stores and the control sink
//!
//! Owns the wake gate, the attribute store and the pending input queue, and
//! runs the consumer thread. Each wake runs one [`CoordinatorLoop::cycle`]:
//!
//! ```text
//! Grounded ──flying=true──► Flying ──flying=false──► Grounded
//!                             │
//!                  target changed ──► reset stale commands, full flush
//!                  otherwise      ──► flush dirty attributes
//! ```
//!
//! The target subscription is created and dropped on the consumer thread,
//! never on the thread that delivered the flight notification.

use crate::sync::attribute_store::{AttributeStore, Vocabulary};
use crate::sync::error::SyncError;
use crate::sync::pending_input::PendingInputQueue;
use crate::sync::sink::{TargetHandle, TargetSource};
use crate::sync::wake_gate::WakeGate;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// The consumer's view of the world, only ever touched by the consumer
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorState<T> {
    pub flying: bool,
    pub target: Option<T>,
    /// Number of full resyncs performed so far
    pub full_syncs: u64,
}

impl<T> Default for CoordinatorState<T> {
    fn default() -> Self {
        Self {
            flying: false,
            target: None,
            full_syncs: 0,
        }
    }
}

/// Body of the consumer thread
///
/// [`run`](Self::run) loops forever; tests drive [`cycle`](Self::cycle) directly.
pub struct CoordinatorLoop<T: TargetHandle, S: TargetSource<T>> {
    gate: Arc<WakeGate>,
    store: Arc<AttributeStore>,
    pending: Arc<PendingInputQueue<T>>,
    source: S,
    subscription: Option<S::Subscription>,
    state: CoordinatorState<T>,
    need_full: bool,
}

impl<T: TargetHandle, S: TargetSource<T>> CoordinatorLoop<T, S> {
    pub fn new(
        gate: Arc<WakeGate>,
        store: Arc<AttributeStore>,
        pending: Arc<PendingInputQueue<T>>,
        source: S,
    ) -> Self {
        Self {
            gate,
            store,
            pending,
            source,
            subscription: None,
            state: CoordinatorState::default(),
            need_full: false,
        }
    }

    pub fn state(&self) -> &CoordinatorState<T> {
        &self.state
    }

    pub fn subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Sleeps on the gate and runs a cycle per wake, forever
    pub fn run(mut self) {
        info!("Coordinator loop started");

        loop {
            self.gate.sleep();
            self.cycle();
        }
    }

    /// Re-evaluates all pending state once and flushes if a target is active
    pub fn cycle(&mut self) {
        debug!("Checking for flight status change");
        let flying = self.pending.lock().take_flying();

        if let Some(flying) = flying {
            if flying != self.state.flying {
                self.state.flying = flying;

                if flying {
                    self.start_flight();
                } else {
                    self.end_flight();
                }
            }
        }

        // A failed subscription is retried on every wake while flying
        if self.state.flying && self.subscription.is_none() {
            self.subscribe_targets();
        }

        if self.state.flying {
            debug!("Checking for target change");
            let target = self.pending.lock().take_target();

            if let Some(target) = target {
                if target != self.state.target {
                    self.change_target(target);
                }
            }
        }

        if let Some(target) = &self.state.target {
            let sink = match target.control_sink() {
                Ok(sink) => sink,
                Err(e) => {
                    // need_full survives, the resync happens on a later wake
                    warn!("Could not reach controls of {:?}: {}", target, e);
                    return;
                }
            };

            let report = if self.need_full {
                self.state.full_syncs += 1;
                info!(
                    "Full resync #{} against {:?}",
                    self.state.full_syncs, target
                );
                self.store.flush(&sink, true)
            } else {
                self.store.flush(&sink, false)
            };
            self.need_full = false;

            if report.failed > 0 {
                warn!(
                    "Flush finished with {} failure(s), {} applied",
                    report.failed, report.applied
                );
            } else {
                debug!("Flush applied {:?}", report);
            }
        }
    }

    fn start_flight(&mut self) {
        info!("Flight started");
        self.subscribe_targets();
    }

    fn end_flight(&mut self) {
        info!("Flight ended");

        if self.state.target.take().is_some() {
            self.store.reset_commands();
        }
        self.need_full = false;
        self.subscription = None;
    }

    fn subscribe_targets(&mut self) {
        match self.source.subscribe(self.pending.clone()) {
            Ok(subscription) => {
                debug!("Subscribed to target notifications");
                self.subscription = Some(subscription);
            }
            Err(e) => {
                warn!("Could not subscribe to target notifications: {}", e);
            }
        }
    }

    fn change_target(&mut self, target: Option<T>) {
        match &target {
            Some(target) => info!("New target: {:?}", target),
            None => info!("Target is gone"),
        }

        // Commands raised against the previous target must not reach the next one.
        // Commands raised while there was no target at all are kept.
        if self.state.target.is_some() {
            self.store.reset_commands();
        }

        self.state.target = target;
        self.need_full = true;
    }
}

/// Handle to the running coordinator
///
/// The consumer thread has no exit path, it ends with the process.
pub struct Coordinator<T: TargetHandle> {
    store: Arc<AttributeStore>,
    pending: Arc<PendingInputQueue<T>>,
    _thread: JoinHandle<()>,
}

impl<T: TargetHandle> Coordinator<T> {
    /// Builds the stores and starts the consumer thread
    pub fn spawn<S: TargetSource<T>>(vocabulary: &Vocabulary, source: S) -> Result<Self, SyncError> {
        info!(
            "Starting coordinator with attributes {:?} and commands {:?}",
            vocabulary.attributes, vocabulary.commands
        );

        let gate = Arc::new(WakeGate::new());
        let store = Arc::new(AttributeStore::new(vocabulary, gate.clone()));
        let pending = Arc::new(PendingInputQueue::new(gate.clone()));

        let consumer = CoordinatorLoop::new(gate, store.clone(), pending.clone(), source);

        let thread = thread::Builder::new()
            .name("coordinator".to_string())
            .spawn(move || consumer.run())
            .map_err(|e| {
                error!("Failed to spawn coordinator thread: {}", e);
                SyncError::ThreadSpawn(e)
            })?;

        Ok(Self {
            store,
            pending,
            _thread: thread,
        })
    }

    /// Store the input layer writes into
    pub fn store(&self) -> Arc<AttributeStore> {
        self.store.clone()
    }

    /// Queue the notification layer writes into
    pub fn pending(&self) -> Arc<PendingInputQueue<T>> {
        self.pending.clone()
    }
}
