//! Debounce and trigger state machine.
//!
//! The machine performs no I/O and owns no timer. Callers feed it discrete
//! events (a ready change, a timer tick, a finished invocation) together with
//! the current instant, and it answers with what should happen next. The watch
//! session drives it from a single task; tests drive it with hand-made instants.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

use crate::filter::ExtensionFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    /// The quiet-period timer is running.
    Armed,
    /// A sync invocation is in flight.
    Running,
}

/// "A quiet-period timer is running and will fire unless re-armed."
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTrigger {
    pub last_detected_path: Option<PathBuf>,
    pub armed_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    pub sync_in_flight: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Started a fresh quiet period.
    Armed,
    /// Restarted the quiet period and replaced the candidate path.
    Rearmed,
    /// Extension is not on the allow-list.
    Filtered,
    /// A sync is running; the event is dropped without replay.
    IgnoredInFlight,
    /// The session has been stopped.
    Stopped,
}

/// Issued exactly once per quiet period that runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireAction {
    /// Most recent path seen while armed, kept for logging only.
    pub candidate: Option<PathBuf>,
}

#[derive(Debug)]
pub struct DebounceTrigger {
    filter: ExtensionFilter,
    quiet_period: Duration,
    pending: PendingTrigger,
    run: RunState,
    stopped: bool,
}

impl DebounceTrigger {
    pub fn new(filter: ExtensionFilter, quiet_period: Duration) -> Self {
        Self {
            filter,
            quiet_period,
            pending: PendingTrigger::default(),
            run: RunState::default(),
            stopped: false,
        }
    }

    pub fn state(&self) -> TriggerState {
        if self.run.sync_in_flight {
            TriggerState::Running
        } else if self.pending.armed_at.is_some() {
            TriggerState::Armed
        } else {
            TriggerState::Idle
        }
    }

    pub fn pending(&self) -> &PendingTrigger {
        &self.pending
    }

    pub fn run_state(&self) -> RunState {
        self.run
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Cheap pre-check run before the readiness probe is spent on a path.
    pub fn accepts(&self, path: &Path) -> bool {
        self.filter.matches(path)
    }

    /// Feeds a change whose file has already passed the readiness probe.
    pub fn on_change(&mut self, path: PathBuf, now: Instant) -> ChangeOutcome {
        if self.stopped {
            return ChangeOutcome::Stopped;
        }
        if !self.filter.matches(&path) {
            return ChangeOutcome::Filtered;
        }
        if self.run.sync_in_flight {
            return ChangeOutcome::IgnoredInFlight;
        }

        let was_armed = self.pending.armed_at.is_some();
        self.pending.last_detected_path = Some(path);
        self.pending.armed_at = Some(now);

        if was_armed {
            ChangeOutcome::Rearmed
        } else {
            ChangeOutcome::Armed
        }
    }

    /// When the current quiet period runs out, if one is running.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.armed_at.map(|at| at + self.quiet_period)
    }

    /// Fires if armed and the deadline has passed. Firing marks the sync as
    /// in flight; the caller must issue exactly one invocation in response.
    pub fn on_timer_fire(&mut self, now: Instant) -> Option<FireAction> {
        if self.stopped || self.run.sync_in_flight {
            return None;
        }

        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }

        let candidate = self.pending.last_detected_path.take();
        self.pending.armed_at = None;
        self.run.sync_in_flight = true;

        Some(FireAction { candidate })
    }

    /// Called once the invocation finishes, whatever its result.
    pub fn on_invocation_done(&mut self) {
        self.run.sync_in_flight = false;
    }

    /// Cancels a pending quiet period. An invocation already in flight is
    /// left alone and still has to report back through `on_invocation_done`.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.pending = PendingTrigger::default();
    }
}
