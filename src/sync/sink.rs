//! Boundary contracts towards the remote side
//!
//! The coordinator only knows these traits. The MQTT adaptor in
//! [`crate::mqtt`] implements them for the real program, tests use recording
//! fakes.

use crate::sync::pending_input::PendingInputQueue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Value written into a sink attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Bool(bool),
    Float(f32),
    Text(String),
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlValue::Bool(value) => write!(f, "{}", value),
            ControlValue::Float(value) => write!(f, "{}", value),
            ControlValue::Text(value) => write!(f, "{}", value),
        }
    }
}

impl From<bool> for ControlValue {
    fn from(value: bool) -> Self {
        ControlValue::Bool(value)
    }
}

impl From<f32> for ControlValue {
    fn from(value: f32) -> Self {
        ControlValue::Float(value)
    }
}

impl From<f64> for ControlValue {
    fn from(value: f64) -> Self {
        ControlValue::Float(value as f32)
    }
}

impl From<&str> for ControlValue {
    fn from(value: &str) -> Self {
        ControlValue::Text(value.to_string())
    }
}

/// Failures reported by the remote side
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink rejected a single attribute write or command
    #[error("Sink rejected {name}: {reason}")]
    ApplicationFailure { name: String, reason: String },

    /// The sink for a target could not be obtained
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    /// Target notifications could not be subscribed to
    #[error("Subscription failed: {0}")]
    SubscriptionFailure(String),
}

/// Object whose attributes and commands are the real control outputs
///
/// Every call may fail individually; the caller logs and moves on.
#[cfg_attr(test, mockall::automock)]
pub trait ControlSink {
    /// Writes a single named attribute
    fn set_attribute(&self, name: &str, value: &ControlValue) -> Result<(), SinkError>;

    /// Invokes a named zero-argument command
    fn invoke(&self, command: &str) -> Result<(), SinkError>;
}

/// Identity of the thing currently being controlled
///
/// Two handles compare equal when they address the same remote object, a
/// change in identity triggers a full resync.
pub trait TargetHandle: Clone + PartialEq + fmt::Debug + Send + 'static {
    type Sink: ControlSink;

    /// Resolves the control sink of this target
    fn control_sink(&self) -> Result<Self::Sink, SinkError>;
}

/// Remote client able to deliver target-identity notifications
///
/// `subscribe` is only ever called from the coordinator thread. The returned
/// subscription stays alive while flying and is dropped on landing; dropping
/// it must not block.
pub trait TargetSource<T: TargetHandle>: Send + 'static {
    type Subscription: Send + 'static;

    /// Starts routing target notifications into `pending`
    fn subscribe(
        &mut self,
        pending: Arc<PendingInputQueue<T>>,
    ) -> Result<Self::Subscription, SinkError>;
}
