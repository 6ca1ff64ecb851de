use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::time::NORMAL_TIME_SCALE;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub tps: f32,
    /// Scaled simulation seconds advanced per wall-clock second.
    pub sim_rate: f32,
    /// Ticks in the interval that ran below normal time scale.
    pub slowed_ticks: u32,
}

#[derive(Clone, Debug, Default)]
pub struct MetricsHandle {
    snapshot: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        *self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    ticks: u32,
    slowed_ticks: u32,
    scaled_sim_seconds: f64,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self::starting_at(Instant::now(), interval)
    }

    pub(crate) fn starting_at(interval_start: Instant, interval: Duration) -> Self {
        Self {
            interval_start,
            interval,
            ticks: 0,
            slowed_ticks: 0,
            scaled_sim_seconds: 0.0,
        }
    }

    pub(crate) fn record_tick(&mut self, fixed_dt_seconds: f32, time_scale: f32) {
        self.ticks = self.ticks.saturating_add(1);
        if time_scale < NORMAL_TIME_SCALE {
            self.slowed_ticks = self.slowed_ticks.saturating_add(1);
        }
        self.scaled_sim_seconds += f64::from(fixed_dt_seconds * time_scale);
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f64().max(f64::EPSILON);
        let snapshot = LoopMetricsSnapshot {
            tps: (f64::from(self.ticks) / elapsed_seconds) as f32,
            sim_rate: (self.scaled_sim_seconds / elapsed_seconds) as f32,
            slowed_ticks: self.slowed_ticks,
        };

        self.interval_start = now;
        self.ticks = 0;
        self.slowed_ticks = 0;
        self.scaled_sim_seconds = 0.0;

        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn snapshot_reports_slow_motion_sim_rate() {
        let base = Instant::now();
        let mut accumulator = MetricsAccumulator::starting_at(base, Duration::from_secs(1));

        for _ in 0..4 {
            accumulator.record_tick(0.25, 0.3);
        }

        let snapshot = accumulator
            .maybe_snapshot(base + Duration::from_secs(1))
            .expect("snapshot should be emitted");

        assert!((snapshot.tps - 4.0).abs() < 0.05);
        assert!((snapshot.sim_rate - 0.3).abs() < 0.01);
        assert_eq!(snapshot.slowed_ticks, 4);
    }

    #[test]
    fn snapshot_resets_interval_counters() {
        let base = Instant::now();
        let mut accumulator = MetricsAccumulator::starting_at(base, Duration::from_secs(1));
        accumulator.record_tick(0.5, 0.0);
        accumulator.record_tick(0.5, NORMAL_TIME_SCALE);

        assert!(accumulator
            .maybe_snapshot(base + Duration::from_millis(500))
            .is_none());
        let first = accumulator
            .maybe_snapshot(base + Duration::from_secs(1))
            .expect("first snapshot");
        assert_eq!(first.slowed_ticks, 1);

        let second = accumulator
            .maybe_snapshot(base + Duration::from_secs(2))
            .expect("second snapshot");
        assert_eq!(second, LoopMetricsSnapshot::default());
    }

    #[test]
    fn handle_recovers_from_poisoned_lock() {
        let handle = MetricsHandle::default();
        let lock = Arc::clone(&handle.snapshot);
        let _ = thread::spawn(move || {
            let _guard = lock.write().expect("write guard");
            panic!("poison metrics lock");
        })
        .join();

        let expected = LoopMetricsSnapshot {
            tps: 30.0,
            sim_rate: 0.3,
            slowed_ticks: 12,
        };
        handle.publish(expected);

        assert_eq!(handle.snapshot(), expected);
    }
}
