//! One-second rest countdown driver.
//!
//! A [`RestTimer`] owns a spawned ticking task and aborts it when dropped,
//! so every way out of the rest phase (countdown reaching zero, skip,
//! navigation, a replaced timer) releases it. Ticks carry the generation
//! of the timer that produced them; ticks from a cancelled timer that were
//! already queued are rejected by [`RestClock::accept`].

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// One elapsed rest second
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerTick {
    pub generation: u64,
}

/// Handle to a running countdown task
#[derive(Debug)]
pub struct RestTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

impl RestTimer {
    /// Spawn a task sending a tick every `period`, first tick after one period
    pub fn start(tx: mpsc::UnboundedSender<TimerTick>, period: Duration, generation: u64) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                if tx.send(TimerTick { generation }).is_err() {
                    break;
                }
            }
        });

        Self { generation, handle }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for RestTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Holds at most one [`RestTimer`] at a time
#[derive(Debug)]
pub struct RestClock {
    tx: mpsc::UnboundedSender<TimerTick>,
    period: Duration,
    generation: u64,
    active: Option<RestTimer>,
}

impl RestClock {
    /// A clock ticking once per second
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerTick>) {
        Self::with_period(Duration::from_secs(1))
    }

    pub fn with_period(period: Duration) -> (Self, mpsc::UnboundedReceiver<TimerTick>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                period,
                generation: 0,
                active: None,
            },
            rx,
        )
    }

    /// Start a fresh countdown, replacing any running one
    pub fn restart(&mut self) {
        self.generation += 1;
        // Assigning drops the previous timer, which aborts its task
        self.active = Some(RestTimer::start(self.tx.clone(), self.period, self.generation));
        tracing::debug!("Rest timer armed (generation {})", self.generation);
    }

    /// Stop the running countdown, if any
    pub fn cancel(&mut self) {
        if let Some(timer) = self.active.take() {
            tracing::debug!("Rest timer cancelled (generation {})", timer.generation());
        }
    }

    pub fn is_armed(&self) -> bool {
        self.active.is_some()
    }

    /// Whether a tick came from the currently armed timer
    pub fn accept(&self, tick: TimerTick) -> bool {
        self.active
            .as_ref()
            .is_some_and(|timer| timer.generation() == tick.generation)
    }
}
