//! Level checkpoints: motion history, baselines, and the death-to-restore
//! sequence.

mod baseline;
mod broadcast;
mod inventory;
mod orchestrator;
mod progress;
mod recorder;

use crate::app::EntityId;

pub use baseline::{
    BaselineBuilder, BaselineStore, CaptureError, ItemBaseline, LevelBaseline, NpcBaseline,
};
pub use broadcast::{ResetAware, ResetBroadcast, ResetRoster};
pub use inventory::{InventoryAccess, ItemId};
pub use orchestrator::{
    RecaptureOutcome, RestoreContext, RestoreOrchestrator, RestorePhaseKind, RewindConfig,
    RewindConfigError, RESTORE_TIME_SCALE_HOLDER,
};
pub use progress::{
    compute_preserved_items, preserved_item_count, LevelCompletion, LevelProgress, LevelRecord,
};
pub use recorder::{
    MotionRecorder, MotionSample, PlaybackTiming, RewindPlayback, DEFAULT_MAX_SAMPLES,
};

/// The entities whose motion is recorded and rewound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointTargets {
    pub player: Option<EntityId>,
    pub viewpoint: Option<EntityId>,
}

impl CheckpointTargets {
    pub fn new(player: Option<EntityId>, viewpoint: Option<EntityId>) -> Self {
        Self { player, viewpoint }
    }
}
