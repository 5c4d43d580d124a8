//! Synchronization core between control inputs and the remote control sink
//!
//! Implements a single-consumer pipeline that turns bursts of input and remote
//! notifications into coalesced sink mutations:
//!
//! 1. [`wake_gate`] - Monitor primitive the consumer sleeps on
//! 2. [`attribute_store`] - Dirty-flag store for attribute values and one-shot commands
//! 3. [`pending_input`] - Coordination inputs (flight state, active target)
//! 4. [`coordinator`] - Consumer thread and flight state machine
//!
//! # Architecture
//!
//! ```text
//! Device thread ──set/command──► AttributeStore ──┐
//!                                                 ├─wake─► WakeGate ──► Coordinator ──► ControlSink
//! MQTT thread ────enqueue──────► PendingInput ────┘                     (consumer)
//! ```
//!
//! Producers never touch the sink. Only the coordinator thread reads dirty
//! flags and talks to the remote side.

pub mod attribute_store;
pub mod coordinator;
pub mod error;
pub mod pending_input;
pub mod sink;
pub mod wake_gate;

pub use attribute_store::{AttributeSlot, AttributeStore, FlushReport, Vocabulary};
pub use coordinator::{Coordinator, CoordinatorLoop, CoordinatorState};
pub use error::SyncError;
pub use pending_input::{InputSlot, PendingInput, PendingInputQueue};
pub use sink::{ControlSink, ControlValue, SinkError, TargetHandle, TargetSource};
pub use wake_gate::WakeGate;
