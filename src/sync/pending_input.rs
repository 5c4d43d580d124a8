//! Coordination inputs written by remote notification callbacks
//!
//! Holds the latest flight state and active target reported by the remote
//! side. Callbacks only overwrite and wake; the coordinator drains the slots
//! under the queue lock.

use crate::sync::error::SyncError;
use crate::sync::wake_gate::WakeGate;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// The slots the queue holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSlot {
    Flying,
    Target,
}

impl InputSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputSlot::Flying => "flying",
            InputSlot::Target => "target",
        }
    }
}

impl fmt::Display for InputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputSlot {
    type Err = SyncError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "flying" => Ok(InputSlot::Flying),
            "target" => Ok(InputSlot::Target),
            _ => Err(SyncError::UnknownSlot(name.to_string())),
        }
    }
}

/// A value addressed to one of the slots
#[derive(Debug, Clone, PartialEq)]
pub enum PendingInput<T> {
    Flying(bool),
    Target(Option<T>),
}

impl<T> PendingInput<T> {
    pub fn slot(&self) -> InputSlot {
        match self {
            PendingInput::Flying(_) => InputSlot::Flying,
            PendingInput::Target(_) => InputSlot::Target,
        }
    }
}

#[derive(Debug, Default)]
struct PendingSlot<V> {
    value: V,
    dirty: bool,
}

impl<V: Clone> PendingSlot<V> {
    fn store(&mut self, value: V) {
        self.value = value;
        self.dirty = true;
    }

    fn take(&mut self) -> Option<V> {
        if !self.dirty {
            return None;
        }

        self.dirty = false;
        Some(self.value.clone())
    }
}

#[derive(Debug)]
struct PendingSlots<T> {
    flying: PendingSlot<bool>,
    target: PendingSlot<Option<T>>,
}

#[derive(Debug)]
pub struct PendingInputQueue<T> {
    slots: Mutex<PendingSlots<T>>,
    gate: Arc<WakeGate>,
}

impl<T: Clone + fmt::Debug> PendingInputQueue<T> {
    pub fn new(gate: Arc<WakeGate>) -> Self {
        Self {
            slots: Mutex::new(PendingSlots {
                flying: PendingSlot::default(),
                target: PendingSlot {
                    value: None,
                    dirty: false,
                },
            }),
            gate,
        }
    }

    /// Overwrites the slot addressed by `input` and wakes the consumer
    pub fn enqueue(&self, input: PendingInput<T>) {
        debug!("Enqueue {:?}", input);

        {
            let mut slots = self.slots.lock();
            match input {
                PendingInput::Flying(flying) => slots.flying.store(flying),
                PendingInput::Target(target) => slots.target.store(target),
            }
        }

        self.gate.wake();
    }

    /// Convenience for notification callbacks reporting the flight state
    pub fn enqueue_flying(&self, flying: bool) {
        self.enqueue(PendingInput::Flying(flying));
    }

    /// Convenience for notification callbacks reporting the active target
    pub fn enqueue_target(&self, target: Option<T>) {
        self.enqueue(PendingInput::Target(target));
    }

    /// Locks the queue for draining, reserved for the coordinator thread
    pub fn lock(&self) -> PendingGuard<'_, T> {
        PendingGuard {
            slots: self.slots.lock(),
        }
    }
}

/// Exclusive access to the slots while the coordinator drains them
pub struct PendingGuard<'a, T> {
    slots: MutexGuard<'a, PendingSlots<T>>,
}

impl<T: Clone> PendingGuard<'_, T> {
    /// Returns the slot value and clears its dirty flag, if it was dirty
    pub fn try_consume(&mut self, slot: InputSlot) -> Option<PendingInput<T>> {
        match slot {
            InputSlot::Flying => self.take_flying().map(PendingInput::Flying),
            InputSlot::Target => self.take_target().map(PendingInput::Target),
        }
    }

    pub fn take_flying(&mut self) -> Option<bool> {
        self.slots.flying.take()
    }

    pub fn take_target(&mut self) -> Option<Option<T>> {
        self.slots.target.take()
    }
}
