#[derive(Debug, Default)]
struct DirectorState {
    cursor: usize,
    wait_remaining_seconds: Option<f32>,
}

struct GameplayScene {
    definition: LevelDefinition,
    player_id: Option<EntityId>,
    viewpoint_id: Option<EntityId>,
    inventory: Inventory,
    progress: LevelProgress,
    orchestrator: RestoreOrchestrator,
    agents: AgentRoster,
    pickup_levels: Vec<(EntityId, usize)>,
    preview: TeleportPreview,
    pause_menu: PauseMenu,
    director: DirectorState,
    teleports_this_tick: Vec<TeleportEvent>,
    last_tick_order: Vec<GameplaySystemId>,
    deaths: u32,
}

impl GameplayScene {
    fn new(definition: LevelDefinition) -> Self {
        let orchestrator = RestoreOrchestrator::new(definition.rewind, CheckpointTargets::default());
        Self {
            definition,
            player_id: None,
            viewpoint_id: None,
            inventory: Inventory::default(),
            progress: LevelProgress::default(),
            orchestrator,
            agents: AgentRoster::default(),
            pickup_levels: Vec::new(),
            preview: TeleportPreview::default(),
            pause_menu: PauseMenu::default(),
            director: DirectorState::default(),
            teleports_this_tick: Vec::new(),
            last_tick_order: Vec::new(),
            deaths: 0,
        }
    }

    fn reset_runtime_state(&mut self) {
        self.player_id = None;
        self.viewpoint_id = None;
        self.inventory = Inventory::default();
        self.orchestrator = RestoreOrchestrator::new(self.definition.rewind, CheckpointTargets::default());
        self.agents = AgentRoster::default();
        self.pickup_levels.clear();
        self.preview = TeleportPreview::default();
        self.pause_menu = PauseMenu::default();
        self.director = DirectorState::default();
        self.teleports_this_tick.clear();
        self.last_tick_order.clear();
        self.deaths = 0;
    }

    fn spawn_level(&mut self, world: &mut World) {
        let spawn_pose = Pose::at(self.definition.player_spawn);
        let player = world.spawn_player("player", spawn_pose, self.definition.max_health);
        let viewpoint = world.spawn(
            "viewpoint",
            EntityKind::Viewpoint,
            viewpoint_pose_for(spawn_pose, self.definition.viewpoint_offset),
        );
        self.player_id = Some(player);
        self.viewpoint_id = Some(viewpoint);

        let levels = self
            .definition
            .levels
            .iter()
            .map(|level| LevelRecord {
                boss: level.boss_position.map(|position| {
                    world.spawn(format!("{}_boss", level.name), EntityKind::Boss, Pose::at(position))
                }),
                ..LevelRecord::new(level.name.clone(), level.items_required)
            })
            .collect();
        self.progress = LevelProgress::new(levels);

        for pickup in &self.definition.pickups {
            let name = format!("pickup_{}", pickup.item);
            let item = ItemId::new(pickup.item.clone());
            let pose = Pose::at(pickup.position);
            let entity = if pickup.level > self.progress.current_level_index {
                world.spawn_dormant_pickup(name, item, pose)
            } else {
                world.spawn_pickup(name, item, pose)
            };
            self.pickup_levels.push((entity, pickup.level));
        }
        for npc in &self.definition.npcs {
            world.spawn_npc(npc.name.clone(), Pose::at(npc.position), npc.state);
        }
        for pursuer in &self.definition.pursuers {
            let entity = world.spawn(pursuer.name.clone(), EntityKind::Agent, Pose::at(pursuer.position));
            self.agents
                .insert(entity, Agent::Pursuer(PursuitAgent::from_def(entity, pursuer)));
        }
        for (slot, teleporter) in self.definition.teleporters.iter().enumerate() {
            let entity = world.spawn(
                teleporter.name.clone(),
                EntityKind::Agent,
                Pose::at(teleporter.position),
            );
            self.agents.insert(
                entity,
                Agent::Teleporter(TeleportingAgent::from_def(entity, slot, teleporter)),
            );
        }
        for trigger in &self.definition.spawn_triggers {
            let entity = world.spawn(
                format!("spawner_{}", trigger.item),
                EntityKind::Marker,
                Pose::at(trigger.spawn_point),
            );
            self.agents
                .insert(entity, Agent::Spawner(SpawnTracker::from_def(entity, trigger)));
        }

        let broadcast = self.orchestrator.broadcast_mut();
        for entity in self.agents.agents.keys() {
            broadcast.subscribe(*entity);
        }
        self.orchestrator
            .set_targets(CheckpointTargets::new(Some(player), Some(viewpoint)));
    }

    fn checkpoint_level_state(&mut self, world: &World) {
        match self
            .orchestrator
            .update_level_state(world, &self.progress, &self.inventory)
        {
            Ok(outcome) => debug!(?outcome, "level_state_updated"),
            Err(error) => warn!(error = %error, "level_checkpoint_failed"),
        }
    }

    fn player_pose(&self, world: &World) -> Option<Pose> {
        self.player_id.and_then(|id| world.pose_of(id))
    }

    fn walk_player_toward(&mut self, world: &mut World, target: Vec3, dt_seconds: f32) -> bool {
        let Some(player) = self.player_id.and_then(|id| world.find_entity_mut(id)) else {
            return true;
        };
        let heading = target - player.pose.position;
        if heading.length_squared() > f32::EPSILON {
            player.pose.orientation = Quat::from_rotation_y(heading.x.atan2(heading.z));
        }
        let (next, arrived) = step_toward(
            player.pose.position,
            target,
            PLAYER_WALK_SPEED * dt_seconds,
            0.0,
        );
        player.pose.position = next;
        arrived
    }

    fn damage_player(&mut self, world: &mut World, amount: u32) {
        let Some(health) = self
            .player_id
            .and_then(|id| world.find_entity_mut(id))
            .and_then(|player| player.health.as_mut())
        else {
            warn!(amount, "damage_without_player");
            return;
        };
        let depleted = health.take_damage(amount);
        info!(amount, remaining = health.current, "player_damaged");
        if !depleted {
            return;
        }
        self.deaths = self.deaths.saturating_add(1);
        if self.orchestrator.on_player_death(world) {
            info!(deaths = self.deaths, "player_died");
        }
    }

    fn collect_nearby_pickups(&mut self, world: &mut World) {
        let Some(player) = self.player_pose(world) else {
            return;
        };
        let mut collected = Vec::new();
        for entity in world.entities_mut() {
            if !entity.active || entity.pickup.is_none() {
                continue;
            }
            if entity.pose.position.distance(player.position) > PICKUP_RADIUS {
                continue;
            }
            if let Some(item) = entity.collect_item() {
                collected.push(item);
            }
        }
        for item in collected {
            self.inventory.add_item(item.clone());
            info!(
                item = %item,
                inventory_count = self.inventory.len(),
                level_index = self.progress.current_level_index,
                "item_collected"
            );
        }
    }

    fn run_agents(&mut self, world: &mut World, dt_seconds: f32) {
        let items_added = self.inventory.take_added();
        let teleports = std::mem::take(&mut self.teleports_this_tick);
        let player_position = self.player_pose(world).map(|pose| pose.position);
        self.agents.update(
            world,
            dt_seconds,
            &items_added,
            &teleports,
            self.progress.current_level_index,
            player_position,
        );
    }

    /// Completes the current level once enough items were collected on it
    /// and its boss is still standing, then takes a new checkpoint.
    fn check_level_progress(&mut self, world: &mut World) {
        let preserved = preserved_item_count(&self.progress);
        let Some(level) = self.progress.current_level() else {
            return;
        };
        let Some(boss) = level.boss else {
            return;
        };
        if level.boss_defeated {
            return;
        }
        let collected_on_level = self.inventory.len().saturating_sub(preserved);
        if collected_on_level < level.items_required {
            return;
        }

        world.despawn(boss);
        let level_name = level.name.clone();
        match self.progress.complete_current_level() {
            Some(LevelCompletion::Advanced { from, to }) => {
                info!(level = %level_name, from, to, "level_completed");
                self.reveal_level_pickups(world, to);
            }
            Some(LevelCompletion::FinalLevelCleared { index }) => {
                info!(level = %level_name, index, "all_levels_completed")
            }
            None => return,
        }
        self.checkpoint_level_state(world);
    }

    fn reveal_level_pickups(&self, world: &mut World, level_index: usize) {
        let mut revealed = 0;
        for (entity, level) in &self.pickup_levels {
            if *level != level_index {
                continue;
            }
            if world
                .find_entity_mut(*entity)
                .is_some_and(|pickup| pickup.reveal_item())
            {
                revealed += 1;
            }
        }
        debug!(level_index, revealed, "level_pickups_revealed");
    }

    fn follow_player_with_viewpoint(&self, world: &mut World) {
        let (Some(player), Some(viewpoint)) = (self.player_pose(world), self.viewpoint_id) else {
            return;
        };
        world.set_pose(viewpoint, viewpoint_pose_for(player, self.definition.viewpoint_offset));
    }

    fn run_director(&mut self, time: TickTime, world: &mut World) -> SceneCommand {
        let Some(step) = self.definition.script.get(self.director.cursor).cloned() else {
            return SceneCommand::None;
        };
        let finished = match step {
            ScriptStep::WalkTo { position } => {
                self.walk_player_toward(world, position, time.dt_seconds)
            }
            ScriptStep::Wait { seconds } => {
                let remaining = self.director.wait_remaining_seconds.get_or_insert(seconds);
                *remaining -= time.unscaled_dt_seconds;
                if *remaining <= 0.0 {
                    self.director.wait_remaining_seconds = None;
                    true
                } else {
                    false
                }
            }
            ScriptStep::Damage { amount } => {
                self.damage_player(world, amount);
                true
            }
            ScriptStep::PreviewTeleport { target } => {
                let origin = self.player_pose(world).map_or(target, |pose| pose.position);
                let outcome = self
                    .preview
                    .begin(world.clock_mut().time_scale_mut(), origin, target);
                debug!(?outcome, "director_teleport_preview");
                true
            }
            ScriptStep::ConfirmTeleport => {
                if let Some(player) = self.player_id {
                    if let Some(event) = self.preview.confirm(world, player) {
                        self.teleports_this_tick.push(event);
                    }
                }
                true
            }
            ScriptStep::CancelTeleport => {
                self.preview.cancel(world.clock_mut().time_scale_mut());
                true
            }
            ScriptStep::TogglePause => {
                let outcome = self.pause_menu.toggle(world.clock_mut().time_scale_mut());
                debug!(?outcome, "director_toggle_pause");
                true
            }
            ScriptStep::Quit => {
                info!(step = self.director.cursor, "director_script_finished");
                return SceneCommand::Quit;
            }
        };
        if finished {
            self.director.cursor += 1;
        }
        SceneCommand::None
    }

    fn run_gameplay_systems(&mut self, time: TickTime, world: &mut World) -> SceneCommand {
        self.last_tick_order.clear();
        let mut command = SceneCommand::None;
        for system_id in GAMEPLAY_SYSTEM_ORDER {
            self.last_tick_order.push(system_id);
            match system_id {
                GameplaySystemId::Director => command = self.run_director(time, world),
                GameplaySystemId::Pickups => self.collect_nearby_pickups(world),
                GameplaySystemId::Agents => self.run_agents(world, time.dt_seconds),
                GameplaySystemId::LevelProgress => self.check_level_progress(world),
                GameplaySystemId::Viewpoint => self.follow_player_with_viewpoint(world),
                GameplaySystemId::MotionRecording => {
                    self.orchestrator.record_motion(world, time.time_seconds);
                }
            }
            if command == SceneCommand::Quit || self.orchestrator.is_restore_in_flight() {
                break;
            }
        }
        command
    }

    fn run_restore(&mut self, time: TickTime, world: &mut World) {
        let mut ctx = RestoreContext {
            world,
            inventory: &mut self.inventory,
            roster: &mut self.agents,
            progress: &self.progress,
        };
        if self.orchestrator.tick(&mut ctx, time) == RestorePhaseKind::Idle {
            info!(
                restores_completed = self.orchestrator.restores_completed(),
                inventory_count = self.inventory.len(),
                level_index = self.progress.current_level_index,
                "player_respawned"
            );
        }
    }
}
