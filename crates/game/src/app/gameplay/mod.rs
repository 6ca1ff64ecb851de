use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use engine::{
    preserved_item_count, CheckpointTargets, EntityId, EntityKind, InventoryAccess, ItemId,
    LevelCompletion, LevelProgress, LevelRecord, NpcState, Pose, ResetAware, ResetRoster,
    RestoreContext, RestoreOrchestrator, RestorePhaseKind, RewindConfig, Scene, SceneCommand,
    TickTime, TimeScale, TimeScaleError, TimeScaleLease, World,
};
use glam::{Quat, Vec3};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

const DEFAULT_MAX_HEALTH: u32 = 3;
const PLAYER_WALK_SPEED: f32 = 4.0;
const MOVE_ARRIVAL_THRESHOLD: f32 = 0.05;
const PICKUP_RADIUS: f32 = 0.75;
const TELEPORT_MAX_DISTANCE: f32 = 10.0;
const TELEPORT_COOLDOWN_SECONDS: f32 = 2.0;
const TELEPORT_SLOWDOWN_FACTOR: f32 = 0.2;
const TELEPORT_DECISION_SECONDS: f32 = 3.0;
const TELEPORT_PREVIEW_HOLDER: &str = "teleport_preview";
const PAUSE_MENU_HOLDER: &str = "pause_menu";

include!("types.rs");
include!("systems.rs");
include!("scene_state.rs");
include!("scene_impl.rs");
include!("util.rs");

pub(crate) fn build_scene(level_path: &Path) -> Result<Box<dyn Scene>, LevelConfigError> {
    let definition = LevelDefinition::load(level_path)?;
    info!(
        path = %level_path.display(),
        level = %definition.name,
        levels = definition.levels.len(),
        pickups = definition.pickups.len(),
        "level_definition_loaded"
    );
    Ok(Box::new(GameplayScene::new(definition)))
}
