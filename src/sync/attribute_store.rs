//! Dirty-flag store between input producers and the control sink
//!
//! Producers overwrite values at any rate; the coordinator flushes whatever
//! changed since the last flush. Repeated writes to one attribute between two
//! flushes collapse into a single sink call carrying the latest value.

use crate::sync::error::SyncError;
use crate::sync::sink::{ControlSink, ControlValue};
use crate::sync::wake_gate::WakeGate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Names the store accepts, fixed for the lifetime of the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub attributes: Vec<String>,
    pub commands: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            attributes: [
                "brakes", "gear", "pitch", "roll", "sas", "sas_mode", "throttle", "yaw",
            ]
            .iter()
            .map(|name| name.to_string())
            .collect(),
            commands: vec!["activate_next_stage".to_string()],
        }
    }
}

impl Vocabulary {
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|known| known == name)
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.iter().any(|known| known == name)
    }
}

/// State of a single attribute
///
/// `value` stays `None` until the first write, an undefined slot is never
/// flushed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSlot {
    pub value: Option<ControlValue>,
    pub dirty: bool,
}

impl AttributeSlot {
    pub fn defined(&self) -> bool {
        self.value.is_some()
    }
}

/// Outcome of one flush, mostly for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub applied: usize,
    pub failed: usize,
    pub commands: usize,
}

#[derive(Debug)]
struct StoreInner {
    // Vocabulary order, flushes walk it front to back
    attributes: Vec<(String, AttributeSlot)>,
    commands: Vec<(String, bool)>,
}

impl StoreInner {
    fn attribute_mut(&mut self, name: &str) -> Option<&mut AttributeSlot> {
        self.attributes
            .iter_mut()
            .find(|(known, _)| known == name)
            .map(|(_, slot)| slot)
    }

    fn command_mut(&mut self, name: &str) -> Option<&mut bool> {
        self.commands
            .iter_mut()
            .find(|(known, _)| known == name)
            .map(|(_, raised)| raised)
    }
}

#[derive(Debug)]
pub struct AttributeStore {
    inner: Mutex<StoreInner>,
    gate: Arc<WakeGate>,
}

impl AttributeStore {
    pub fn new(vocabulary: &Vocabulary, gate: Arc<WakeGate>) -> Self {
        debug!(
            "Creating attribute store with {} attributes and {} commands",
            vocabulary.attributes.len(),
            vocabulary.commands.len()
        );

        let inner = StoreInner {
            attributes: vocabulary
                .attributes
                .iter()
                .map(|name| (name.clone(), AttributeSlot::default()))
                .collect(),
            commands: vocabulary
                .commands
                .iter()
                .map(|name| (name.clone(), false))
                .collect(),
        };

        Self {
            inner: Mutex::new(inner),
            gate,
        }
    }

    /// Stores a new value for `name` and wakes the consumer
    pub fn set(&self, name: &str, value: impl Into<ControlValue>) -> Result<(), SyncError> {
        let value = value.into();
        debug!("Store setting {} = {}", name, value);

        {
            let mut inner = self.inner.lock();
            let slot = inner
                .attribute_mut(name)
                .ok_or_else(|| SyncError::UnknownAttribute(name.to_string()))?;

            slot.value = Some(value);
            slot.dirty = true;
        }

        self.gate.wake();
        Ok(())
    }

    /// Raises the one-shot command `name` and wakes the consumer
    pub fn command(&self, name: &str) -> Result<(), SyncError> {
        debug!("Store queueing command {}", name);

        {
            let mut inner = self.inner.lock();
            let raised = inner
                .command_mut(name)
                .ok_or_else(|| SyncError::UnknownCommand(name.to_string()))?;

            *raised = true;
        }

        self.gate.wake();
        Ok(())
    }

    /// Drops every raised command without invoking it
    pub fn reset_commands(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.commands.iter().filter(|(_, raised)| *raised).count();

        for (_, raised) in inner.commands.iter_mut() {
            *raised = false;
        }

        if dropped > 0 {
            info!("Discarded {} stale command(s)", dropped);
        }
    }

    /// Applies pending attribute values and commands to `sink`
    ///
    /// With `full` every defined attribute is written, otherwise only dirty
    /// ones. Dirty flags are cleared under the lock, the sink is called after
    /// it is released. A refused value stays clean until it is written again.
    pub fn flush(&self, sink: &dyn ControlSink, full: bool) -> FlushReport {
        let (writes, commands) = {
            let mut inner = self.inner.lock();

            let writes: Vec<(String, ControlValue)> = inner
                .attributes
                .iter_mut()
                .filter(|(_, slot)| slot.defined() && (slot.dirty || full))
                .filter_map(|(name, slot)| {
                    slot.dirty = false;
                    slot.value.clone().map(|value| (name.clone(), value))
                })
                .collect();

            let commands: Vec<String> = inner
                .commands
                .iter_mut()
                .filter(|(_, raised)| *raised)
                .map(|(name, raised)| {
                    *raised = false;
                    name.clone()
                })
                .collect();

            (writes, commands)
        };

        let mut report = FlushReport::default();

        for (name, value) in writes {
            match sink.set_attribute(&name, &value) {
                Ok(()) => {
                    debug!("Updated sink with {} = {}", name, value);
                    report.applied += 1;
                }
                Err(e) => {
                    warn!("Could not set control attribute {}: {}", name, e);
                    report.failed += 1;
                }
            }
        }

        for name in commands {
            match sink.invoke(&name) {
                Ok(()) => {
                    info!("Invoked command {}", name);
                    report.commands += 1;
                }
                Err(e) => {
                    warn!("Could not invoke command {}: {}", name, e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Copy of the slot for `name`, if it is part of the vocabulary
    pub fn slot(&self, name: &str) -> Option<AttributeSlot> {
        let mut inner = self.inner.lock();
        inner.attribute_mut(name).map(|slot| slot.clone())
    }

    pub fn command_raised(&self, name: &str) -> bool {
        let mut inner = self.inner.lock();
        inner.command_mut(name).is_some_and(|raised| *raised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::sink::{MockControlSink, SinkError};
    use mockall::Sequence;
    use std::time::Duration;

    fn store() -> (AttributeStore, Arc<WakeGate>) {
        let gate = Arc::new(WakeGate::new());
        (AttributeStore::new(&Vocabulary::default(), gate.clone()), gate)
    }

    #[test]
    fn repeated_sets_collapse_into_latest_value() {
        let (store, _) = store();
        store.set("throttle", 0.42).unwrap();
        store.set("throttle", 0.9).unwrap();

        let mut sink = MockControlSink::new();
        sink.expect_set_attribute()
            .withf(|name, value| name == "throttle" && *value == ControlValue::Float(0.9))
            .times(1)
            .returning(|_, _| Ok(()));

        let report = store.flush(&sink, false);
        assert_eq!(report.applied, 1);
    }

    #[test]
    fn undefined_attributes_are_skipped_even_on_full_flush() {
        let (store, _) = store();
        store.set("gear", true).unwrap();

        let mut sink = MockControlSink::new();
        sink.expect_set_attribute()
            .withf(|name, _| name == "gear")
            .times(1)
            .returning(|_, _| Ok(()));

        store.flush(&sink, true);
        assert!(!store.slot("throttle").unwrap().defined());
    }

    #[test]
    fn full_flush_rewrites_clean_attributes_once() {
        let (store, _) = store();
        store.set("brakes", false).unwrap();
        store.set("pitch", -0.25).unwrap();

        let mut first = MockControlSink::new();
        first.expect_set_attribute().times(2).returning(|_, _| Ok(()));
        store.flush(&first, false);

        // Nothing is dirty any more, a partial flush is a no-op
        let idle = MockControlSink::new();
        assert_eq!(store.flush(&idle, false), FlushReport::default());

        let mut seq = Sequence::new();
        let mut resync = MockControlSink::new();
        resync
            .expect_set_attribute()
            .withf(|name, value| name == "brakes" && *value == ControlValue::Bool(false))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        resync
            .expect_set_attribute()
            .withf(|name, value| name == "pitch" && *value == ControlValue::Float(-0.25))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        assert_eq!(store.flush(&resync, true).applied, 2);
    }

    #[test]
    fn partial_flush_only_writes_dirty_attributes() {
        let (store, _) = store();
        store.set("roll", 0.1).unwrap();
        store.set("yaw", 0.2).unwrap();

        let mut sink = MockControlSink::new();
        sink.expect_set_attribute().times(2).returning(|_, _| Ok(()));
        store.flush(&sink, false);

        store.set("yaw", 0.3).unwrap();
        let mut sink = MockControlSink::new();
        sink.expect_set_attribute()
            .withf(|name, value| name == "yaw" && *value == ControlValue::Float(0.3))
            .times(1)
            .returning(|_, _| Ok(()));
        store.flush(&sink, false);

        assert!(!store.slot("roll").unwrap().dirty);
        assert!(!store.slot("yaw").unwrap().dirty);
    }

    #[test]
    fn failed_attribute_does_not_block_the_rest() {
        let (store, _) = store();
        store.set("gear", true).unwrap();
        store.set("sas", true).unwrap();

        let mut sink = MockControlSink::new();
        sink.expect_set_attribute()
            .withf(|name, _| name == "gear")
            .times(1)
            .returning(|name, _| {
                Err(SinkError::ApplicationFailure {
                    name: name.to_string(),
                    reason: "vessel has no landing gear".to_string(),
                })
            });
        sink.expect_set_attribute()
            .withf(|name, _| name == "sas")
            .times(1)
            .returning(|_, _| Ok(()));

        let report = store.flush(&sink, false);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 1);

        // The rejected value is not retried on the next cycle
        assert!(!store.slot("gear").unwrap().dirty);
        let idle = MockControlSink::new();
        store.flush(&idle, false);
    }

    #[test]
    fn command_raised_many_times_runs_once() {
        let (store, _) = store();
        store.command("activate_next_stage").unwrap();
        store.command("activate_next_stage").unwrap();

        let mut sink = MockControlSink::new();
        sink.expect_invoke()
            .withf(|name| name == "activate_next_stage")
            .times(1)
            .returning(|_| Ok(()));

        assert_eq!(store.flush(&sink, false).commands, 1);
        assert!(!store.command_raised("activate_next_stage"));

        let idle = MockControlSink::new();
        store.flush(&idle, false);
    }

    #[test]
    fn reset_commands_discards_without_invoking() {
        let (store, _) = store();
        store.command("activate_next_stage").unwrap();
        store.reset_commands();

        let idle = MockControlSink::new();
        assert_eq!(store.flush(&idle, true), FlushReport::default());
    }

    #[test]
    fn unknown_names_are_rejected() {
        let (store, _) = store();

        assert!(matches!(
            store.set("warp", 1.0),
            Err(SyncError::UnknownAttribute(name)) if name == "warp"
        ));
        assert!(matches!(
            store.command("abort"),
            Err(SyncError::UnknownCommand(name)) if name == "abort"
        ));
    }

    #[test]
    fn writes_wake_the_consumer() {
        let (store, gate) = store();
        assert!(!gate.sleep_for(Duration::from_millis(5)));

        store.set("throttle", 1.0).unwrap();
        assert!(gate.sleep_for(Duration::from_millis(5)));

        store.command("activate_next_stage").unwrap();
        assert!(gate.sleep_for(Duration::from_millis(5)));
    }

    #[test]
    fn rejected_write_does_not_wake_the_consumer() {
        let (store, gate) = store();
        let _ = store.set("warp", 1.0);
        assert!(!gate.sleep_for(Duration::from_millis(5)));
    }
}
