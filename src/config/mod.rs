//! The two live-reloadable scheduler tunables from §6.3: `schedulerDelay`
//! (how long the scheduler loop sleeps between dispatch passes when there is
//! nothing to wake it) and `startBuffer` (how long a newly-`Running` job is
//! held back before clients are actually told to start, giving stragglers a
//! chance to finish reserving).
//!
//! Narrowed from `rust-srec`'s `config::events::ConfigEventBroadcaster`
//! (which fans a whole family of config changes out to many subscribers) to
//! a single `tokio::sync::watch` channel, since the scheduler core is this
//! crate's only subscriber.

use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

/// Lower bound on `schedulerDelay` (§6.3: "seconds, >= 1").
const MIN_SCHEDULER_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerTunables {
    pub scheduler_delay: Duration,
    pub start_buffer: Duration,
}

impl Default for SchedulerTunables {
    fn default() -> Self {
        Self {
            scheduler_delay: Duration::from_millis(500),
            start_buffer: Duration::from_secs(2),
        }
    }
}

/// `schedulerDelay` below the floor would spin the dispatch loop with no
/// backoff; §6.3 requires such a value to fall back to the default rather
/// than being applied.
fn validated_scheduler_delay(delay: Duration) -> Duration {
    if delay < MIN_SCHEDULER_DELAY {
        warn!(
            requested_ms = delay.as_millis() as u64,
            falling_back_to_ms = SchedulerTunables::default().scheduler_delay.as_millis() as u64,
            "schedulerDelay below the 1 second floor, falling back to default"
        );
        SchedulerTunables::default().scheduler_delay
    } else {
        delay
    }
}

/// `startBuffer` (seconds, >= 0) has no invalid `Duration` values — kept as a
/// named seam so the two §6.3 tunables are validated symmetrically.
fn validated_start_buffer(buffer: Duration) -> Duration {
    buffer
}

#[derive(Clone)]
pub struct ConfigSubscriber {
    rx: watch::Receiver<SchedulerTunables>,
}

impl ConfigSubscriber {
    pub fn get(&self) -> SchedulerTunables {
        *self.rx.borrow()
    }

    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}

pub struct ConfigHandle {
    tx: watch::Sender<SchedulerTunables>,
}

impl ConfigHandle {
    pub fn new(initial: SchedulerTunables) -> (Self, ConfigSubscriber) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, ConfigSubscriber { rx })
    }

    pub fn subscribe(&self) -> ConfigSubscriber {
        ConfigSubscriber { rx: self.tx.subscribe() }
    }

    pub fn update(&self, tunables: SchedulerTunables) {
        self.tx.send_replace(SchedulerTunables {
            scheduler_delay: validated_scheduler_delay(tunables.scheduler_delay),
            start_buffer: validated_start_buffer(tunables.start_buffer),
        });
    }

    pub fn set_scheduler_delay(&self, delay: Duration) {
        let delay = validated_scheduler_delay(delay);
        self.tx.send_modify(|t| t.scheduler_delay = delay);
    }

    pub fn set_start_buffer(&self, buffer: Duration) {
        let buffer = validated_start_buffer(buffer);
        self.tx.send_modify(|t| t.start_buffer = buffer);
    }

    pub fn current(&self) -> SchedulerTunables {
        *self.tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_observes_update() {
        let (handle, mut sub) = ConfigHandle::new(SchedulerTunables::default());
        handle.set_scheduler_delay(Duration::from_secs(1));
        sub.changed().await.unwrap();
        assert_eq!(sub.get().scheduler_delay, Duration::from_secs(1));
    }

    #[test]
    fn scheduler_delay_below_floor_falls_back_to_default() {
        let (handle, _sub) = ConfigHandle::new(SchedulerTunables::default());
        handle.set_scheduler_delay(Duration::from_millis(10));
        assert_eq!(handle.current().scheduler_delay, SchedulerTunables::default().scheduler_delay);
    }

    #[test]
    fn update_validates_both_fields_together() {
        let (handle, _sub) = ConfigHandle::new(SchedulerTunables::default());
        handle.update(SchedulerTunables {
            scheduler_delay: Duration::ZERO,
            start_buffer: Duration::from_secs(9),
        });
        let current = handle.current();
        assert_eq!(current.scheduler_delay, SchedulerTunables::default().scheduler_delay);
        assert_eq!(current.start_buffer, Duration::from_secs(9));
    }
}
