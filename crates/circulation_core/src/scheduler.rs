//! Reconciliation pass scheduling for one viewer process.
//!
//! # Responsibility
//! - Fire passes on a recurring timer and on an external change signal.
//! - Stop cleanly when the session is cancelled.
//!
//! # Invariants
//! - Passes run on the caller's task one at a time and never overlap.
//! - Timer and signal passes are not coalesced: a signal mid-interval costs
//!   one extra full pass. Several signals raised during one pass collapse
//!   into a single follow-up pass.
//! - Cancellation never interrupts a running pass; the loop exits at the
//!   next await point.
//! - The first timer tick is immediate, acting as the startup pass.

use log::{debug, info, warn};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

/// What started a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    ExternalChange,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::ExternalChange => "external_change",
        }
    }
}

/// Hook another component calls when the shared store changed underneath.
#[derive(Debug, Clone, Default)]
pub struct ChangeSignal {
    notify: Arc<Notify>,
}

impl ChangeSignal {
    /// Requests one extra pass. Signals fired before the pass runs coalesce.
    pub fn fire(&self) {
        self.notify.notify_one();
    }

    async fn fired(&self) {
        self.notify.notified().await;
    }
}

/// Cancels the scheduler and any watcher bound to it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Idempotent; later calls are no-ops.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Pass counts returned when a scheduler stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub timer_passes: u64,
    pub change_passes: u64,
}

/// Timer plus change-signal driver for reconciliation passes.
pub struct PollingScheduler {
    poll_interval: Duration,
    signal: ChangeSignal,
    cancel: CancelHandle,
}

impl PollingScheduler {
    /// The first timer pass fires immediately, then every `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            poll_interval,
            signal: ChangeSignal::default(),
            cancel: CancelHandle { tx: Arc::new(tx) },
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn change_signal(&self) -> ChangeSignal {
        self.signal.clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Runs `on_pass` for every trigger until cancelled.
    pub async fn run<F>(&self, mut on_pass: F) -> SchedulerStats
    where
        F: FnMut(Trigger),
    {
        let mut stats = SchedulerStats::default();
        let mut cancelled = self.cancel.subscribe();
        if *cancelled.borrow_and_update() {
            return stats;
        }

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "event=scheduler_start module=scheduler status=ok interval_ms={}",
            self.poll_interval.as_millis()
        );

        loop {
            let trigger = tokio::select! {
                biased;
                changed = cancelled.changed() => {
                    if changed.is_err() || *cancelled.borrow() {
                        break;
                    }
                    continue;
                }
                _ = self.signal.fired() => Trigger::ExternalChange,
                _ = ticker.tick() => Trigger::Timer,
            };

            match trigger {
                Trigger::Timer => stats.timer_passes += 1,
                Trigger::ExternalChange => stats.change_passes += 1,
            }
            debug!(
                "event=pass_start module=scheduler status=ok trigger={}",
                trigger.as_str()
            );
            on_pass(trigger);
        }

        info!(
            "event=scheduler_stop module=scheduler status=ok timer_passes={} change_passes={}",
            stats.timer_passes, stats.change_passes
        );
        stats
    }
}

/// Reads `version` every `check_interval` and fires `signal` whenever it
/// moves. Returns the number of signals fired once `cancel` is triggered.
///
/// Failed checks are logged and skipped; the next successful check becomes
/// the new baseline without firing.
pub async fn watch_external_changes<F, E>(
    mut version: F,
    signal: ChangeSignal,
    check_interval: Duration,
    cancel: CancelHandle,
) -> u64
where
    F: FnMut() -> Result<u64, E>,
    E: Display,
{
    let mut cancelled = cancel.subscribe();
    if *cancelled.borrow_and_update() {
        return 0;
    }

    let check = |version: &mut F| match version() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("event=change_check module=scheduler status=error error={err}");
            None
        }
    };

    let mut baseline = check(&mut version);
    let mut ticker = interval_at(Instant::now() + check_interval, check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut fired = 0;

    loop {
        tokio::select! {
            biased;
            changed = cancelled.changed() => {
                if changed.is_err() || *cancelled.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let current = check(&mut version);
                if let (Some(before), Some(now)) = (baseline, current) {
                    if before != now {
                        debug!("event=external_change module=scheduler status=ok");
                        signal.fire();
                        fired += 1;
                    }
                }
                if current.is_some() {
                    baseline = current;
                }
            }
        }
    }
    fired
}
