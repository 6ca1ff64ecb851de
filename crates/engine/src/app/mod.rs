mod loop_runner;
mod metrics;
mod scene;
mod time;
mod world;

pub use loop_runner::{run_app, run_app_with_metrics, LoopConfig, LoopExit, RunSummary};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use scene::{Scene, SceneCommand};
pub use time::{SimClock, TickTime, TimeScale, TimeScaleError, TimeScaleLease, NORMAL_TIME_SCALE};
pub use world::{
    Entity, EntityId, EntityKind, Health, NpcComponent, NpcState, PickupComponent, Pose, World,
};
