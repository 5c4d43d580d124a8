use parking_lot::{Condvar, Mutex};
use std::time::Duration;
use tracing::debug;

/// Monitor the consumer thread sleeps on between cycles
///
/// Edge-triggered: each `sleep` needs a `wake` that happened after the
/// previous `sleep` returned. Wakes arriving while the consumer is busy are
/// coalesced into a single pass, the latch is a boolean and not a counter.
#[derive(Debug)]
pub struct WakeGate {
    sleeping: Mutex<bool>,
    signal: Condvar,
}

impl Default for WakeGate {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeGate {
    pub fn new() -> Self {
        Self {
            sleeping: Mutex::new(true),
            signal: Condvar::new(),
        }
    }

    /// Blocks until `wake` is called, then re-arms the latch
    pub fn sleep(&self) {
        let mut sleeping = self.sleeping.lock();

        while *sleeping {
            debug!("Consumer dozing");
            self.signal.wait(&mut sleeping);
        }

        *sleeping = true;
    }

    /// Like `sleep` but gives up after `timeout`
    ///
    /// Returns `true` when a wake was consumed.
    pub fn sleep_for(&self, timeout: Duration) -> bool {
        let mut sleeping = self.sleeping.lock();

        while *sleeping {
            if self.signal.wait_for(&mut sleeping, timeout).timed_out() {
                // A wake may have landed right at the deadline
                if *sleeping {
                    return false;
                }
            }
        }

        *sleeping = true;
        true
    }

    /// Releases the sleeper; never blocks beyond the short latch lock
    pub fn wake(&self) {
        *self.sleeping.lock() = false;
        self.signal.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wake_before_sleep_lets_one_pass_through() {
        let gate = WakeGate::new();
        gate.wake();

        assert!(gate.sleep_for(Duration::from_millis(10)));
        assert!(!gate.sleep_for(Duration::from_millis(10)));
    }

    #[test]
    fn repeated_wakes_coalesce_into_one_pass() {
        let gate = WakeGate::new();
        gate.wake();
        gate.wake();
        gate.wake();

        assert!(gate.sleep_for(Duration::from_millis(10)));
        assert!(!gate.sleep_for(Duration::from_millis(10)));
    }

    #[test]
    fn sleep_times_out_without_wake() {
        let gate = WakeGate::new();
        assert!(!gate.sleep_for(Duration::from_millis(5)));
    }

    #[test]
    fn wake_from_another_thread_releases_sleeper() {
        let gate = Arc::new(WakeGate::new());
        let sleeper_gate = gate.clone();

        let sleeper = thread::spawn(move || {
            sleeper_gate.sleep();
            true
        });

        thread::sleep(Duration::from_millis(20));
        gate.wake();

        assert!(sleeper.join().unwrap());
    }
}
