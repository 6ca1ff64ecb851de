fn default_viewpoint_offset() -> Vec3 {
    Vec3::new(0.0, 3.0, -5.0)
}

fn default_max_health() -> u32 {
    DEFAULT_MAX_HEALTH
}

fn default_pursuer_move_speed() -> f32 {
    3.5
}

fn default_pursuer_stopping_distance() -> f32 {
    1.0
}

fn default_pursuer_pause_seconds() -> f32 {
    2.0
}

fn default_teleport_delay_seconds() -> f32 {
    0.5
}

fn default_ring_radius() -> f32 {
    2.0
}

fn default_spawn_count() -> u32 {
    1
}

fn default_delay_between_spawns_seconds() -> f32 {
    0.3
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct LevelDefinition {
    name: String,
    player_spawn: Vec3,
    #[serde(default = "default_viewpoint_offset")]
    viewpoint_offset: Vec3,
    #[serde(default = "default_max_health")]
    max_health: u32,
    levels: Vec<LevelDef>,
    #[serde(default)]
    pickups: Vec<PickupDef>,
    #[serde(default)]
    npcs: Vec<NpcDef>,
    #[serde(default)]
    pursuers: Vec<PursuerDef>,
    #[serde(default)]
    teleporters: Vec<TeleporterDef>,
    #[serde(default)]
    spawn_triggers: Vec<SpawnTriggerDef>,
    #[serde(default)]
    rewind: RewindConfig,
    #[serde(default)]
    script: Vec<ScriptStep>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct LevelDef {
    name: String,
    items_required: usize,
    #[serde(default)]
    boss_position: Option<Vec3>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct PickupDef {
    item: String,
    position: Vec3,
    level: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct NpcDef {
    name: String,
    position: Vec3,
    #[serde(default)]
    state: NpcState,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct PursuerDef {
    name: String,
    position: Vec3,
    #[serde(default = "default_pursuer_move_speed")]
    move_speed: f32,
    #[serde(default = "default_pursuer_stopping_distance")]
    stopping_distance: f32,
    #[serde(default = "default_pursuer_pause_seconds")]
    pause_seconds: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct TeleporterDef {
    name: String,
    position: Vec3,
    #[serde(default = "default_teleport_delay_seconds")]
    teleport_delay_seconds: f32,
    #[serde(default = "default_ring_radius")]
    ring_radius: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpawnTriggerDef {
    item: String,
    #[serde(default = "default_spawn_count")]
    count: u32,
    spawn_point: Vec3,
    #[serde(default = "default_delay_between_spawns_seconds")]
    delay_between_spawns_seconds: f32,
}

/// One step of the scripted demo run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ScriptStep {
    WalkTo { position: Vec3 },
    Wait { seconds: f32 },
    Damage { amount: u32 },
    PreviewTeleport { target: Vec3 },
    ConfirmTeleport,
    CancelTeleport,
    TogglePause,
    Quit,
}

#[derive(Debug, Error)]
pub(crate) enum LevelConfigError {
    #[error("failed to read level file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse level json at {at}: {source}")]
    Parse {
        at: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("validation failed at {at}: {message}")]
    Invalid { at: String, message: String },
}

type LevelConfigResult<T> = Result<T, LevelConfigError>;

impl LevelDefinition {
    fn load(path: &Path) -> LevelConfigResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| LevelConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let definition = Self::parse_json(&raw)?;
        definition.validate()?;
        Ok(definition)
    }

    fn parse_json(raw: &str) -> LevelConfigResult<Self> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize::<_, LevelDefinition>(&mut deserializer).map_err(|error| {
            let path = error.path().to_string();
            let at = if path.is_empty() { ".".to_string() } else { path };
            LevelConfigError::Parse {
                at,
                source: error.into_inner(),
            }
        })
    }

    fn validation_err(at: impl Into<String>, message: impl Into<String>) -> LevelConfigError {
        LevelConfigError::Invalid {
            at: at.into(),
            message: message.into(),
        }
    }

    fn expected_actual(at: impl Into<String>, expected: impl Display, actual: impl Display) -> LevelConfigError {
        Self::validation_err(at, format!("expected {expected}, got {actual}"))
    }

    fn require_non_empty(at: impl Into<String>, value: &str) -> LevelConfigResult<()> {
        if value.trim().is_empty() {
            return Err(Self::validation_err(at, "must not be empty"));
        }
        Ok(())
    }

    fn require_finite(at: impl Into<String>, value: Vec3) -> LevelConfigResult<()> {
        if !value.is_finite() {
            return Err(Self::expected_actual(at, "finite vector", value));
        }
        Ok(())
    }

    fn require_non_negative(at: impl Into<String>, value: f32) -> LevelConfigResult<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(Self::expected_actual(at, "finite non-negative number", value));
        }
        Ok(())
    }

    fn require_positive(at: impl Into<String>, value: f32) -> LevelConfigResult<()> {
        if !value.is_finite() || value <= 0.0 {
            return Err(Self::expected_actual(at, "finite positive number", value));
        }
        Ok(())
    }

    fn validate(&self) -> LevelConfigResult<()> {
        Self::require_non_empty("name", &self.name)?;
        Self::require_finite("player_spawn", self.player_spawn)?;
        Self::require_finite("viewpoint_offset", self.viewpoint_offset)?;
        if self.max_health == 0 {
            return Err(Self::expected_actual("max_health", "at least 1", self.max_health));
        }
        if self.levels.is_empty() {
            return Err(Self::validation_err("levels", "at least one level is required"));
        }
        for (index, level) in self.levels.iter().enumerate() {
            Self::require_non_empty(format!("levels[{index}].name"), &level.name)?;
            if let Some(boss_position) = level.boss_position {
                Self::require_finite(format!("levels[{index}].boss_position"), boss_position)?;
            }
        }
        for (index, pickup) in self.pickups.iter().enumerate() {
            Self::require_non_empty(format!("pickups[{index}].item"), &pickup.item)?;
            Self::require_finite(format!("pickups[{index}].position"), pickup.position)?;
            if pickup.level >= self.levels.len() {
                return Err(Self::expected_actual(
                    format!("pickups[{index}].level"),
                    format!("level index below {}", self.levels.len()),
                    pickup.level,
                ));
            }
        }
        for (index, npc) in self.npcs.iter().enumerate() {
            Self::require_non_empty(format!("npcs[{index}].name"), &npc.name)?;
            Self::require_finite(format!("npcs[{index}].position"), npc.position)?;
        }
        for (index, pursuer) in self.pursuers.iter().enumerate() {
            Self::require_non_empty(format!("pursuers[{index}].name"), &pursuer.name)?;
            Self::require_finite(format!("pursuers[{index}].position"), pursuer.position)?;
            Self::require_positive(format!("pursuers[{index}].move_speed"), pursuer.move_speed)?;
            Self::require_non_negative(
                format!("pursuers[{index}].stopping_distance"),
                pursuer.stopping_distance,
            )?;
            Self::require_non_negative(
                format!("pursuers[{index}].pause_seconds"),
                pursuer.pause_seconds,
            )?;
        }
        for (index, teleporter) in self.teleporters.iter().enumerate() {
            Self::require_non_empty(format!("teleporters[{index}].name"), &teleporter.name)?;
            Self::require_finite(format!("teleporters[{index}].position"), teleporter.position)?;
            Self::require_non_negative(
                format!("teleporters[{index}].teleport_delay_seconds"),
                teleporter.teleport_delay_seconds,
            )?;
            Self::require_positive(
                format!("teleporters[{index}].ring_radius"),
                teleporter.ring_radius,
            )?;
        }
        for (index, trigger) in self.spawn_triggers.iter().enumerate() {
            Self::require_non_empty(format!("spawn_triggers[{index}].item"), &trigger.item)?;
            if trigger.count == 0 {
                return Err(Self::expected_actual(
                    format!("spawn_triggers[{index}].count"),
                    "at least 1",
                    trigger.count,
                ));
            }
            Self::require_finite(format!("spawn_triggers[{index}].spawn_point"), trigger.spawn_point)?;
            Self::require_non_negative(
                format!("spawn_triggers[{index}].delay_between_spawns_seconds"),
                trigger.delay_between_spawns_seconds,
            )?;
        }
        self.rewind
            .validate()
            .map_err(|error| Self::validation_err("rewind", error.to_string()))?;
        for (index, step) in self.script.iter().enumerate() {
            match step {
                ScriptStep::WalkTo { position } => {
                    Self::require_finite(format!("script[{index}].position"), *position)?
                }
                ScriptStep::PreviewTeleport { target } => {
                    Self::require_finite(format!("script[{index}].target"), *target)?
                }
                ScriptStep::Wait { seconds } => {
                    Self::require_non_negative(format!("script[{index}].seconds"), *seconds)?
                }
                ScriptStep::Damage { .. }
                | ScriptStep::ConfirmTeleport
                | ScriptStep::CancelTeleport
                | ScriptStep::TogglePause
                | ScriptStep::Quit => {}
            }
        }
        Ok(())
    }
}

/// Ordered item list with a per-tick queue of newly collected items.
#[derive(Debug, Default)]
struct Inventory {
    items: Vec<ItemId>,
    added_this_tick: Vec<ItemId>,
}

impl Inventory {
    fn add_item(&mut self, item: ItemId) {
        self.items.push(item.clone());
        self.added_this_tick.push(item);
    }

    fn take_added(&mut self) -> Vec<ItemId> {
        std::mem::take(&mut self.added_this_tick)
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl InventoryAccess for Inventory {
    fn items(&self) -> &[ItemId] {
        &self.items
    }

    fn clear_all_items(&mut self) {
        self.items.clear();
        self.added_this_tick.clear();
    }

    fn restore_items(&mut self, items: &[ItemId]) {
        self.items.extend_from_slice(items);
    }
}

/// Follows the player, freezing for a while whenever an item is picked up.
#[derive(Debug, Clone)]
struct PursuitAgent {
    entity: EntityId,
    initial_pose: Pose,
    move_speed: f32,
    stopping_distance: f32,
    pause_seconds: f32,
    pause_remaining: f32,
    following: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingTeleport {
    remaining_seconds: f32,
    anchor: Vec3,
}

/// Reappears near the player shortly after each player teleport.
#[derive(Debug, Clone)]
struct TeleportingAgent {
    entity: EntityId,
    initial_pose: Pose,
    slot: usize,
    delay_seconds: f32,
    ring_radius: f32,
    pending: Option<PendingTeleport>,
    relocations: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingWave {
    remaining: u32,
    countdown_seconds: f32,
    level_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpawnedEnemy {
    entity: EntityId,
    level_index: usize,
}

/// Spawns enemies when its trigger item is collected.
#[derive(Debug, Clone)]
struct SpawnTracker {
    entity: EntityId,
    trigger_item: ItemId,
    count: u32,
    spawn_point: Vec3,
    delay_between_spawns_seconds: f32,
    pending: Option<PendingWave>,
    spawned: Vec<SpawnedEnemy>,
    total_spawned: u32,
}

#[derive(Debug, Clone)]
enum Agent {
    Pursuer(PursuitAgent),
    Teleporter(TeleportingAgent),
    Spawner(SpawnTracker),
}

/// Reset handlers keyed by the entity that owns them.
#[derive(Debug, Default)]
struct AgentRoster {
    agents: BTreeMap<EntityId, Agent>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TeleportEvent {
    from: Vec3,
    to: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreviewOutcome {
    Started,
    Deferred { holder: &'static str },
    OnCooldown,
    OutOfRange,
    AlreadyPreviewing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreviewCancel {
    Revoked,
    DecisionTimeout,
    Requested,
}

#[derive(Debug)]
struct ActivePreview {
    lease: TimeScaleLease,
    target: Vec3,
    decision_remaining_seconds: f32,
}

/// Slow-motion aim-and-confirm teleport.
#[derive(Debug, Default)]
struct TeleportPreview {
    active: Option<ActivePreview>,
    cooldown_remaining_seconds: f32,
    teleports: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PauseOutcome {
    Paused,
    Resumed,
    Deferred { holder: &'static str },
}

#[derive(Debug, Default)]
struct PauseMenu {
    lease: Option<TimeScaleLease>,
}
