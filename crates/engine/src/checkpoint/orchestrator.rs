use std::mem;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::app::{NpcState, TickTime, TimeScaleLease, World};

use super::baseline::{BaselineStore, CaptureError, LevelBaseline};
use super::broadcast::{ResetBroadcast, ResetRoster};
use super::inventory::InventoryAccess;
use super::progress::LevelProgress;
use super::recorder::{MotionRecorder, MotionSample, PlaybackTiming, RewindPlayback};
use super::CheckpointTargets;

pub const RESTORE_TIME_SCALE_HOLDER: &str = "restore";

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewindConfig {
    pub max_samples: usize,
    pub sample_rate_hz: f32,
    pub rewind_effect_duration_seconds: f32,
    pub rewind_speed: f32,
    pub slow_motion_scale: f32,
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            max_samples: 150,
            sample_rate_hz: 30.0,
            rewind_effect_duration_seconds: 3.0,
            rewind_speed: 2.0,
            slow_motion_scale: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RewindConfigError {
    #[error("rewind.{field} must be finite and greater than zero, got {value}")]
    NotPositive { field: &'static str, value: f32 },
    #[error("rewind.{field} must be finite and not negative, got {value}")]
    Negative { field: &'static str, value: f32 },
    #[error("rewind.max_samples must be at least 1")]
    EmptyHistory,
}

impl RewindConfig {
    pub fn validate(&self) -> Result<(), RewindConfigError> {
        if self.max_samples == 0 {
            return Err(RewindConfigError::EmptyHistory);
        }
        for (field, value) in [
            ("sample_rate_hz", self.sample_rate_hz),
            ("rewind_speed", self.rewind_speed),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(RewindConfigError::NotPositive { field, value });
            }
        }
        for (field, value) in [
            ("rewind_effect_duration_seconds", self.rewind_effect_duration_seconds),
            ("slow_motion_scale", self.slow_motion_scale),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RewindConfigError::Negative { field, value });
            }
        }
        Ok(())
    }

    pub fn playback_timing(&self) -> PlaybackTiming {
        PlaybackTiming {
            sample_rate_hz: self.sample_rate_hz,
            rewind_speed: self.rewind_speed,
            effect_duration_seconds: self.rewind_effect_duration_seconds,
        }
    }
}

#[derive(Debug)]
enum RestorePhase {
    Idle,
    Rewinding {
        playback: RewindPlayback,
        lease: TimeScaleLease,
        missing_reported: bool,
    },
    Restoring {
        lease: TimeScaleLease,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhaseKind {
    Idle,
    Rewinding,
    Restoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecaptureOutcome {
    Captured { generation: u64 },
    Deferred,
}

/// Everything a restore touches besides the orchestrator's own state.
pub struct RestoreContext<'a> {
    pub world: &'a mut World,
    pub inventory: &'a mut dyn InventoryAccess,
    pub roster: &'a mut dyn ResetRoster,
    pub progress: &'a LevelProgress,
}

#[derive(Debug, Default)]
struct RestoreReport {
    npcs_restored: usize,
    npcs_reverted: usize,
    items_reset: usize,
    items_kept_collected: usize,
    missing_entities: usize,
}

/// Owns the motion history, the level baseline and the reset subscribers, and
/// runs the death-to-restore sequence one tick at a time.
#[derive(Debug)]
pub struct RestoreOrchestrator {
    config: RewindConfig,
    targets: CheckpointTargets,
    recorder: MotionRecorder,
    baselines: BaselineStore,
    broadcast: ResetBroadcast,
    phase: RestorePhase,
    recapture_pending: bool,
    restores_completed: u64,
}

impl RestoreOrchestrator {
    pub fn new(config: RewindConfig, targets: CheckpointTargets) -> Self {
        Self {
            recorder: MotionRecorder::new(config.max_samples),
            config,
            targets,
            baselines: BaselineStore::default(),
            broadcast: ResetBroadcast::default(),
            phase: RestorePhase::Idle,
            recapture_pending: false,
            restores_completed: 0,
        }
    }

    pub fn config(&self) -> &RewindConfig {
        &self.config
    }

    pub fn targets(&self) -> &CheckpointTargets {
        &self.targets
    }

    pub fn set_targets(&mut self, targets: CheckpointTargets) {
        self.targets = targets;
    }

    pub fn phase(&self) -> RestorePhaseKind {
        match self.phase {
            RestorePhase::Idle => RestorePhaseKind::Idle,
            RestorePhase::Rewinding { .. } => RestorePhaseKind::Rewinding,
            RestorePhase::Restoring { .. } => RestorePhaseKind::Restoring,
        }
    }

    pub fn is_restore_in_flight(&self) -> bool {
        !matches!(self.phase, RestorePhase::Idle)
    }

    pub fn restores_completed(&self) -> u64 {
        self.restores_completed
    }

    pub fn recorder(&self) -> &MotionRecorder {
        &self.recorder
    }

    pub fn baselines(&self) -> &BaselineStore {
        &self.baselines
    }

    pub fn broadcast_mut(&mut self) -> &mut ResetBroadcast {
        &mut self.broadcast
    }

    pub fn record_motion(&mut self, world: &World, timestamp: f64) -> bool {
        let in_flight = self.is_restore_in_flight();
        self.recorder.tick(world, &self.targets, timestamp, in_flight)
    }

    /// Starts a restore. Returns false when one is already running; the extra
    /// death is dropped.
    pub fn on_player_death(&mut self, world: &mut World) -> bool {
        if self.is_restore_in_flight() {
            debug!(phase = ?self.phase(), "player_death_ignored_restore_in_flight");
            return false;
        }

        let time_scale = world.clock_mut().time_scale_mut();
        let lease = time_scale.preempt(RESTORE_TIME_SCALE_HOLDER);
        if let Err(error) = time_scale.set(&lease, self.config.slow_motion_scale) {
            warn!(%error, "restore_slow_motion_rejected");
        }

        let playback = self.recorder.playback(self.config.playback_timing());
        info!(
            tick = world.clock().tick(),
            buffered_samples = self.recorder.len(),
            playable_samples = playback.playable_len(),
            slow_motion_scale = self.config.slow_motion_scale,
            "restore_started"
        );
        self.phase = RestorePhase::Rewinding {
            playback,
            lease,
            missing_reported: false,
        };
        true
    }

    /// Re-captures the baseline, or queues the capture until the running
    /// restore has finished.
    pub fn update_level_state(
        &mut self,
        world: &World,
        progress: &LevelProgress,
        inventory: &dyn InventoryAccess,
    ) -> Result<RecaptureOutcome, CaptureError> {
        if self.is_restore_in_flight() {
            self.recapture_pending = true;
            info!(phase = ?self.phase(), "baseline_recapture_deferred");
            return Ok(RecaptureOutcome::Deferred);
        }
        self.recapture(world, progress, inventory)
    }

    pub fn tick(&mut self, ctx: &mut RestoreContext<'_>, time: TickTime) -> RestorePhaseKind {
        match &mut self.phase {
            RestorePhase::Idle => {}
            RestorePhase::Rewinding {
                playback,
                missing_reported,
                ..
            } => {
                for sample in playback.advance(time.unscaled_dt_seconds) {
                    if !apply_sample(ctx.world, &self.targets, sample) && !*missing_reported {
                        *missing_reported = true;
                        warn!(
                            player = ?self.targets.player,
                            viewpoint = ?self.targets.viewpoint,
                            "rewind_target_missing"
                        );
                    }
                }
                if playback.is_finished() {
                    let applied = playback.applied();
                    if let RestorePhase::Rewinding { lease, .. } =
                        mem::replace(&mut self.phase, RestorePhase::Idle)
                    {
                        debug!(applied, "rewind_finished");
                        self.phase = RestorePhase::Restoring { lease };
                    }
                }
            }
            RestorePhase::Restoring { .. } => {
                if let RestorePhase::Restoring { lease } =
                    mem::replace(&mut self.phase, RestorePhase::Idle)
                {
                    self.restore(ctx, lease);
                }
            }
        }
        self.phase()
    }

    fn restore(&mut self, ctx: &mut RestoreContext<'_>, lease: TimeScaleLease) {
        let preserved = self
            .baselines
            .current()
            .map(|baseline| baseline.preserved_inventory().to_vec())
            .unwrap_or_default();

        let mut report = RestoreReport::default();
        match self.baselines.current() {
            Some(baseline) => {
                restore_player(ctx.world, &self.targets, baseline, &mut report);
                restore_npcs(ctx.world, baseline, &mut report);
                reset_items(ctx.world, baseline, &mut report);
            }
            None => warn!("restore_without_baseline"),
        }

        ctx.inventory.clear_all_items();
        ctx.inventory.restore_items(&preserved);

        let notified = self.broadcast.fire(ctx.roster, ctx.world);
        self.recorder.clear();

        if let Err(error) = ctx.world.clock_mut().time_scale_mut().release(lease) {
            debug!(%error, "restore_lease_already_revoked");
        }
        self.restores_completed = self.restores_completed.saturating_add(1);
        info!(
            restores_completed = self.restores_completed,
            npcs_restored = report.npcs_restored,
            npcs_reverted = report.npcs_reverted,
            items_reset = report.items_reset,
            items_kept_collected = report.items_kept_collected,
            missing_entities = report.missing_entities,
            preserved_count = preserved.len(),
            subscribers_notified = notified,
            "restore_completed"
        );

        if mem::take(&mut self.recapture_pending) {
            if let Err(error) = self.recapture(ctx.world, ctx.progress, &*ctx.inventory) {
                warn!(%error, "deferred_baseline_capture_failed");
            }
        }
    }

    fn recapture(
        &mut self,
        world: &World,
        progress: &LevelProgress,
        inventory: &dyn InventoryAccess,
    ) -> Result<RecaptureOutcome, CaptureError> {
        let tick = world.clock().tick();
        match self
            .baselines
            .capture(world, &self.targets, progress, inventory, tick)
        {
            Ok(_) => Ok(RecaptureOutcome::Captured {
                generation: self.baselines.generation(),
            }),
            Err(error) => {
                warn!(%error, generation = self.baselines.generation(), "baseline_capture_failed");
                Err(error)
            }
        }
    }
}

/// Returns false if the player or the viewpoint no longer resolves.
fn apply_sample(world: &mut World, targets: &CheckpointTargets, sample: &MotionSample) -> bool {
    let player = targets
        .player
        .is_some_and(|id| world.set_pose(id, sample.player_pose()));
    let viewpoint = targets
        .viewpoint
        .is_some_and(|id| world.set_pose(id, sample.viewpoint_pose()));
    player && viewpoint
}

fn restore_player(
    world: &mut World,
    targets: &CheckpointTargets,
    baseline: &LevelBaseline,
    report: &mut RestoreReport,
) {
    match targets.player.and_then(|id| world.find_entity_mut(id)) {
        Some(player) => {
            if let Some(pose) = baseline.player_pose() {
                player.pose = pose;
            }
            if let Some(health) = player.health.as_mut() {
                health.reset();
            }
        }
        None => {
            report.missing_entities += 1;
            warn!("restore_player_missing");
        }
    }
    if let (Some(id), Some(pose)) = (targets.viewpoint, baseline.viewpoint_pose()) {
        if !world.set_pose(id, pose) {
            report.missing_entities += 1;
            warn!("restore_viewpoint_missing");
        }
    }
}

fn restore_npcs(world: &mut World, baseline: &LevelBaseline, report: &mut RestoreReport) {
    for npc_baseline in baseline.npc_baselines() {
        let Some(entity) = world.find_entity_mut(npc_baseline.entity) else {
            report.missing_entities += 1;
            debug!(entity = ?npc_baseline.entity, "restore_npc_skipped_missing");
            continue;
        };
        entity.pose = npc_baseline.pose;
        report.npcs_restored += 1;
        // Only a baseline of `Npc` is enforced; other baseline states leave
        // the live state alone.
        if npc_baseline.logical_state == NpcState::Npc {
            if let Some(npc) = entity.npc.as_mut() {
                if npc.revert_to_npc() {
                    report.npcs_reverted += 1;
                }
            }
        }
    }
}

fn reset_items(world: &mut World, baseline: &LevelBaseline, report: &mut RestoreReport) {
    for item_baseline in baseline.item_baselines() {
        let Some(entity) = world.find_entity_mut(item_baseline.entity) else {
            report.missing_entities += 1;
            debug!(entity = ?item_baseline.entity, "restore_item_skipped_missing");
            continue;
        };
        if item_baseline.earned {
            report.items_kept_collected += 1;
            continue;
        }
        if !entity.reset_item() {
            continue;
        }
        // A pickup still lying around at capture time goes back to where the
        // baseline saw it; one already collected falls back to its own cache.
        if !item_baseline.was_collected {
            entity.pose = item_baseline.pose;
            entity.active = item_baseline.was_active;
        }
        report.items_reset += 1;
    }

    // Sweep for pickups the baseline never saw. None of them can be earned.
    for entity in world.entities_mut() {
        if entity.pickup.is_none() {
            continue;
        }
        if baseline
            .item_baselines()
            .iter()
            .any(|item_baseline| item_baseline.entity == entity.id)
        {
            continue;
        }
        if entity.reset_item() {
            report.items_reset += 1;
        }
    }
}
