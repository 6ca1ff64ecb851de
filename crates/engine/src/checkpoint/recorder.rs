use std::collections::VecDeque;

use glam::{Quat, Vec3};
use tracing::trace;

use crate::app::{Pose, World};

use super::CheckpointTargets;

pub const DEFAULT_MAX_SAMPLES: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub position: Vec3,
    pub orientation: Quat,
    pub viewpoint_position: Vec3,
    pub viewpoint_orientation: Quat,
    pub timestamp: f64,
}

impl MotionSample {
    pub fn player_pose(&self) -> Pose {
        Pose::new(self.position, self.orientation)
    }

    pub fn viewpoint_pose(&self) -> Pose {
        Pose::new(self.viewpoint_position, self.viewpoint_orientation)
    }
}

/// Fixed-capacity FIFO of recent player motion.
#[derive(Debug)]
pub struct MotionRecorder {
    samples: VecDeque<MotionSample>,
    max_samples: usize,
}

impl Default for MotionRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SAMPLES)
    }
}

impl MotionRecorder {
    pub fn new(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Records one sample of the player and viewpoint. Paused while a restore
    /// is in flight; a missing player makes the tick a no-op.
    pub fn tick(
        &mut self,
        world: &World,
        targets: &CheckpointTargets,
        timestamp: f64,
        restore_in_flight: bool,
    ) -> bool {
        if restore_in_flight {
            return false;
        }
        let Some(player) = targets.player.and_then(|id| world.pose_of(id)) else {
            trace!("motion_sample_skipped_missing_player");
            return false;
        };
        let viewpoint = targets
            .viewpoint
            .and_then(|id| world.pose_of(id))
            .unwrap_or(Pose::IDENTITY);

        self.push(MotionSample {
            position: player.position,
            orientation: player.orientation,
            viewpoint_position: viewpoint.position,
            viewpoint_orientation: viewpoint.orientation,
            timestamp,
        });
        true
    }

    pub fn push(&mut self, sample: MotionSample) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_samples
    }

    /// Samples oldest first.
    pub fn samples(&self) -> impl DoubleEndedIterator<Item = &MotionSample> + ExactSizeIterator {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&MotionSample> {
        self.samples.back()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn playback(&self, timing: PlaybackTiming) -> RewindPlayback {
        RewindPlayback::new(self.samples.iter().rev().copied().collect(), timing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackTiming {
    pub sample_rate_hz: f32,
    pub rewind_speed: f32,
    pub effect_duration_seconds: f32,
}

impl PlaybackTiming {
    /// Real seconds each sample stays on screen during the rewind.
    pub fn sample_interval_seconds(&self) -> f32 {
        1.0 / (self.sample_rate_hz * self.rewind_speed)
    }

    /// Number of samples that fit before the effect time reaches the
    /// configured duration.
    pub fn sample_budget(&self) -> usize {
        let exact = f64::from(self.effect_duration_seconds)
            * f64::from(self.sample_rate_hz)
            * f64::from(self.rewind_speed);
        if !exact.is_finite() || exact <= 0.0 {
            return 0;
        }
        let rounded = exact.round();
        if (exact - rounded).abs() < 1e-6 {
            rounded as usize
        } else {
            exact.ceil() as usize
        }
    }
}

const DUE_EPSILON: f64 = 1e-4;

/// Cursor over a recorder snapshot, most recent sample first.
#[derive(Debug, Clone)]
pub struct RewindPlayback {
    samples: Vec<MotionSample>,
    playable: usize,
    cursor: usize,
    elapsed_seconds: f64,
    interval_seconds: f64,
}

impl RewindPlayback {
    fn new(samples: Vec<MotionSample>, timing: PlaybackTiming) -> Self {
        let playable = samples.len().min(timing.sample_budget());
        Self {
            samples,
            playable,
            cursor: 0,
            elapsed_seconds: 0.0,
            interval_seconds: f64::from(timing.sample_interval_seconds()),
        }
    }

    pub fn playable_len(&self) -> usize {
        self.playable
    }

    pub fn applied(&self) -> usize {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.playable
    }

    /// Returns the samples due by now, then moves the effect clock forward by
    /// `real_dt_seconds`. The first call always yields the most recent sample.
    pub fn advance(&mut self, real_dt_seconds: f32) -> &[MotionSample] {
        let start = self.cursor;
        if self.is_finished() {
            return &[];
        }
        let due = if self.interval_seconds > 0.0 {
            (self.elapsed_seconds / self.interval_seconds + DUE_EPSILON).floor() as usize + 1
        } else {
            self.playable
        };
        self.cursor = due.min(self.playable).max(start);
        self.elapsed_seconds += f64::from(real_dt_seconds.max(0.0));
        &self.samples[start..self.cursor]
    }
}
