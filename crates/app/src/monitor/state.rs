//! Shared occupancy state and the pipeline run-state machine.
//!
//! `OccupancyState` is the only data shared between the producer loop
//! (writer) and the status routes (readers); both fields live under one
//! lock so a snapshot can never pair a count from one update with the
//! alarm flag of another.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Mutex,
};

use serde::Serialize;

/// Consistent count/alarm pair as observed at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub(crate) struct Occupancy {
    pub(crate) count: usize,
    pub(crate) alarm: bool,
}

pub(crate) struct OccupancyState {
    threshold: usize,
    inner: Mutex<Occupancy>,
}

impl OccupancyState {
    pub(crate) fn new(threshold: usize) -> Self {
        Self {
            threshold,
            inner: Mutex::new(Occupancy::default()),
        }
    }

    /// Set the count and recompute the alarm flag in one atomic step.
    pub(crate) fn update(&self, count: usize) -> Occupancy {
        let next = Occupancy {
            count,
            alarm: count > self.threshold,
        };
        *self.lock() = next;
        next
    }

    pub(crate) fn snapshot(&self) -> Occupancy {
        *self.lock()
    }

    /// Back to `{0, false}` so stale counts are never served after stop.
    pub(crate) fn reset(&self) {
        *self.lock() = Occupancy::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Occupancy> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RunState {
    Idle,
    Running,
    Stopping,
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;

/// Atomic Idle → Running → Stopping → Idle lifecycle.
///
/// `Stopping` is transient: the producer loop observes it, releases the
/// device, and settles back to `Idle`.
pub(crate) struct PipelineRunState(AtomicU8);

impl PipelineRunState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(IDLE))
    }

    pub(crate) fn current(&self) -> RunState {
        match self.0.load(Ordering::SeqCst) {
            RUNNING => RunState::Running,
            STOPPING => RunState::Stopping,
            _ => RunState::Idle,
        }
    }

    /// Claim the Idle → Running transition; only one caller can win, so a
    /// second concurrent start cannot open a second device handle.
    pub(crate) fn try_begin(&self) -> Result<(), RunState> {
        match self
            .0
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Ok(()),
            Err(RUNNING) => Err(RunState::Running),
            Err(_) => Err(RunState::Stopping),
        }
    }

    /// Request Running → Stopping; returns false when there is nothing to
    /// stop, making concurrent stops harmless.
    pub(crate) fn request_stop(&self) -> bool {
        self.0
            .compare_exchange(RUNNING, STOPPING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn settle_idle(&self) {
        self.0.store(IDLE, Ordering::SeqCst);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst) == RUNNING
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn alarm_tracks_threshold() {
        let state = OccupancyState::new(2);
        for (count, alarm) in [(0, false), (2, false), (3, true), (100, true)] {
            let snapshot = state.update(count);
            assert_eq!(snapshot, Occupancy { count, alarm });
            assert_eq!(state.snapshot(), snapshot);
        }
    }

    #[test]
    fn reset_clears_count_and_alarm() {
        let state = OccupancyState::new(2);
        state.update(5);
        state.reset();
        assert_eq!(
            state.snapshot(),
            Occupancy {
                count: 0,
                alarm: false
            }
        );
    }

    #[test]
    fn snapshots_are_never_torn_under_concurrent_updates() {
        let state = Arc::new(OccupancyState::new(2));
        let writer_state = state.clone();
        let writer = thread::spawn(move || {
            for i in 0..20_000usize {
                writer_state.update(i % 6);
            }
        });

        for _ in 0..20_000 {
            let snapshot = state.snapshot();
            assert_eq!(snapshot.alarm, snapshot.count > 2);
        }
        writer.join().expect("writer thread panicked");
    }

    #[test]
    fn run_state_transitions() {
        let run = PipelineRunState::new();
        assert_eq!(run.current(), RunState::Idle);
        assert!(!run.request_stop());

        run.try_begin().expect("idle pipeline should start");
        assert_eq!(run.current(), RunState::Running);
        assert_eq!(run.try_begin(), Err(RunState::Running));

        assert!(run.request_stop());
        assert_eq!(run.current(), RunState::Stopping);
        assert_eq!(run.try_begin(), Err(RunState::Stopping));
        assert!(!run.request_stop());

        run.settle_idle();
        assert_eq!(run.current(), RunState::Idle);
    }
}
