//! Periodic heartbeat timer owned by a single replication agent.
//!
//! The owning [`HeartbeatTimer`] controls the schedule (reset, pause, stop)
//! while the background loop consumes ticks through a [`HeartbeatTicker`].
//! Both sides share one `watch` channel, so every control change wakes the
//! ticker and the next deadline is always recomputed from fresh state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
struct TimerState {
    phase: SchedulerState,
    deadline: Instant,
}

/// Interval shared between an agent and its timer.
///
/// Read on every re-arm, so a change applies from the next cycle on.
pub type SharedInterval = Arc<RwLock<Duration>>;

#[derive(Debug)]
pub struct HeartbeatTimer {
    interval: SharedInterval,
    state: Arc<watch::Sender<TimerState>>,
}

impl HeartbeatTimer {
    /// Creates a running timer whose first tick fires one interval from now.
    pub fn new(interval: SharedInterval) -> Self {
        let deadline = Instant::now() + *interval.read();
        let (tx, _rx) = watch::channel(TimerState {
            phase: SchedulerState::Running,
            deadline,
        });
        Self {
            interval,
            state: Arc::new(tx),
        }
    }

    /// Restarts the countdown and resumes a paused timer.
    pub fn reset(&self) {
        let interval = *self.interval.read();
        self.state.send_if_modified(|s| {
            if s.phase == SchedulerState::Stopped {
                return false;
            }
            s.phase = SchedulerState::Running;
            s.deadline = Instant::now() + interval;
            true
        });
    }

    /// Postpones the next tick by a full interval.
    ///
    /// Unlike [`reset`](Self::reset) this never resumes a paused timer.
    pub fn postpone(&self) {
        let interval = *self.interval.read();
        self.state.send_if_modified(|s| {
            if s.phase != SchedulerState::Running {
                return false;
            }
            s.deadline = Instant::now() + interval;
            true
        });
    }

    pub fn pause(&self) {
        self.state.send_if_modified(|s| {
            if s.phase != SchedulerState::Running {
                return false;
            }
            s.phase = SchedulerState::Paused;
            true
        });
    }

    /// Terminal: the ticker yields `None` from now on.
    pub fn stop(&self) {
        self.state.send_if_modified(|s| {
            if s.phase == SchedulerState::Stopped {
                return false;
            }
            s.phase = SchedulerState::Stopped;
            true
        });
    }

    pub fn state(&self) -> SchedulerState {
        self.state.borrow().phase
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    pub fn interval(&self) -> Duration {
        *self.interval.read()
    }

    pub fn next_deadline(&self) -> Instant {
        self.state.borrow().deadline
    }

    pub fn ticker(&self) -> HeartbeatTicker {
        HeartbeatTicker {
            interval: self.interval.clone(),
            state: self.state.clone(),
            rx: self.state.subscribe(),
        }
    }
}

impl Drop for HeartbeatTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Receiving side of a [`HeartbeatTimer`].
#[derive(Debug)]
pub struct HeartbeatTicker {
    interval: SharedInterval,
    state: Arc<watch::Sender<TimerState>>,
    rx: watch::Receiver<TimerState>,
}

impl HeartbeatTicker {
    /// Waits for the next tick.
    ///
    /// Returns `None` once the timer is stopped. While paused this waits
    /// without firing.
    pub async fn tick(&mut self) -> Option<Instant> {
        loop {
            let current = *self.rx.borrow_and_update();
            match current.phase {
                SchedulerState::Stopped => return None,
                SchedulerState::Paused => {
                    if self.rx.changed().await.is_err() {
                        return None;
                    }
                }
                SchedulerState::Running => {
                    tokio::select! {
                        biased;
                        changed = self.rx.changed() => {
                            if changed.is_err() {
                                return None;
                            }
                        }
                        _ = sleep_until(current.deadline) => {
                            self.rearm(current.deadline);
                            trace!("heartbeat tick");
                            return Some(Instant::now());
                        }
                    }
                }
            }
        }
    }

    // Schedule the following period unless someone moved the deadline
    // while we were firing.
    fn rearm(
        &self,
        fired: Instant,
    ) {
        let interval = *self.interval.read();
        self.state.send_if_modified(|s| {
            if s.phase != SchedulerState::Running || s.deadline != fired {
                return false;
            }
            s.deadline = Instant::now() + interval;
            true
        });
    }
}
