#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GameplaySystemId {
    Director,
    Pickups,
    Agents,
    LevelProgress,
    Viewpoint,
    MotionRecording,
}

impl GameplaySystemId {
    #[cfg(test)]
    fn name(self) -> &'static str {
        match self {
            Self::Director => "Director",
            Self::Pickups => "Pickups",
            Self::Agents => "Agents",
            Self::LevelProgress => "LevelProgress",
            Self::Viewpoint => "Viewpoint",
            Self::MotionRecording => "MotionRecording",
        }
    }
}

const GAMEPLAY_SYSTEM_ORDER: [GameplaySystemId; 6] = [
    GameplaySystemId::Director,
    GameplaySystemId::Pickups,
    GameplaySystemId::Agents,
    GameplaySystemId::LevelProgress,
    GameplaySystemId::Viewpoint,
    GameplaySystemId::MotionRecording,
];

impl PursuitAgent {
    fn from_def(entity: EntityId, def: &PursuerDef) -> Self {
        Self {
            entity,
            initial_pose: Pose::at(def.position),
            move_speed: def.move_speed,
            stopping_distance: def.stopping_distance,
            pause_seconds: def.pause_seconds,
            pause_remaining: 0.0,
            following: true,
        }
    }

    fn is_paused(&self) -> bool {
        self.pause_remaining > 0.0
    }

    fn on_item_added(&mut self) {
        self.pause_remaining = self.pause_seconds;
        debug!(entity = ?self.entity, pause_seconds = self.pause_seconds, "pursuer_paused_by_item");
    }

    fn update(&mut self, world: &mut World, player_position: Option<Vec3>, dt_seconds: f32) {
        if self.is_paused() {
            self.pause_remaining = (self.pause_remaining - dt_seconds).max(0.0);
            return;
        }
        if !self.following {
            return;
        }
        let Some(target) = player_position else {
            return;
        };
        let Some(entity) = world.find_entity_mut(self.entity) else {
            return;
        };
        if entity.pose.position.distance(target) <= self.stopping_distance {
            return;
        }
        let (next, _) = step_toward(
            entity.pose.position,
            target,
            self.move_speed * dt_seconds,
            self.stopping_distance,
        );
        entity.pose.position = next;
    }
}

impl ResetAware for PursuitAgent {
    fn on_level_reset(&mut self, world: &mut World) {
        self.pause_remaining = 0.0;
        self.following = true;
        world.set_pose(self.entity, self.initial_pose);
    }
}

impl TeleportingAgent {
    fn from_def(entity: EntityId, slot: usize, def: &TeleporterDef) -> Self {
        Self {
            entity,
            initial_pose: Pose::at(def.position),
            slot,
            delay_seconds: def.teleport_delay_seconds,
            ring_radius: def.ring_radius,
            pending: None,
            relocations: 0,
        }
    }

    fn on_player_teleported(&mut self, event: TeleportEvent) {
        debug!(entity = ?self.entity, from = ?event.from, to = ?event.to, "teleporter_following");
        self.pending = Some(PendingTeleport {
            remaining_seconds: self.delay_seconds,
            anchor: event.to,
        });
    }

    fn update(&mut self, world: &mut World, dt_seconds: f32) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        pending.remaining_seconds -= dt_seconds;
        if pending.remaining_seconds > 0.0 {
            return;
        }
        let anchor = pending.anchor;
        self.pending = None;
        let destination = ring_position(anchor, self.ring_radius, self.slot, self.relocations);
        if world.set_pose(self.entity, Pose::at(destination)) {
            self.relocations = self.relocations.saturating_add(1);
            debug!(entity = ?self.entity, ?destination, "teleporter_relocated");
        }
    }
}

impl ResetAware for TeleportingAgent {
    fn on_level_reset(&mut self, world: &mut World) {
        self.pending = None;
        self.relocations = 0;
        world.set_pose(self.entity, self.initial_pose);
    }
}

impl SpawnTracker {
    fn from_def(entity: EntityId, def: &SpawnTriggerDef) -> Self {
        Self {
            entity,
            trigger_item: ItemId::new(def.item.clone()),
            count: def.count,
            spawn_point: def.spawn_point,
            delay_between_spawns_seconds: def.delay_between_spawns_seconds,
            pending: None,
            spawned: Vec::new(),
            total_spawned: 0,
        }
    }

    fn on_item_added(&mut self, item: &ItemId, level_index: usize) {
        if *item != self.trigger_item {
            return;
        }
        self.pending = Some(PendingWave {
            remaining: self.count,
            countdown_seconds: 0.0,
            level_index,
        });
    }

    fn update(&mut self, world: &mut World, dt_seconds: f32, current_level_index: usize) {
        self.spawned.retain(|enemy| {
            if enemy.level_index < current_level_index {
                world.despawn(enemy.entity);
                false
            } else {
                world.contains(enemy.entity)
            }
        });

        let Some(wave) = self.pending.as_mut() else {
            return;
        };
        wave.countdown_seconds -= dt_seconds;
        while wave.remaining > 0 && wave.countdown_seconds <= 0.0 {
            let name = format!("enemy_{}", self.total_spawned);
            let entity = world.spawn(name, EntityKind::Agent, Pose::at(self.spawn_point));
            self.spawned.push(SpawnedEnemy {
                entity,
                level_index: wave.level_index,
            });
            self.total_spawned = self.total_spawned.saturating_add(1);
            wave.remaining -= 1;
            wave.countdown_seconds += self.delay_between_spawns_seconds;
            info!(
                spawner = ?self.entity,
                trigger = %self.trigger_item,
                level_index = wave.level_index,
                total_spawned = self.total_spawned,
                "enemy_spawned"
            );
        }
        if wave.remaining == 0 {
            self.pending = None;
        }
    }
}

impl ResetAware for SpawnTracker {
    fn on_level_reset(&mut self, world: &mut World) {
        self.pending = None;
        for enemy in self.spawned.drain(..) {
            world.despawn(enemy.entity);
        }
        self.total_spawned = 0;
    }
}

impl ResetAware for Agent {
    fn on_level_reset(&mut self, world: &mut World) {
        match self {
            Self::Pursuer(agent) => agent.on_level_reset(world),
            Self::Teleporter(agent) => agent.on_level_reset(world),
            Self::Spawner(tracker) => tracker.on_level_reset(world),
        }
    }
}

impl ResetRoster for AgentRoster {
    fn resolve(&mut self, entity: EntityId) -> Option<&mut dyn ResetAware> {
        self.agents
            .get_mut(&entity)
            .map(|agent| agent as &mut dyn ResetAware)
    }
}

impl AgentRoster {
    fn insert(&mut self, entity: EntityId, agent: Agent) {
        self.agents.insert(entity, agent);
    }

    fn len(&self) -> usize {
        self.agents.len()
    }

    fn update(
        &mut self,
        world: &mut World,
        dt_seconds: f32,
        items_added: &[ItemId],
        teleports: &[TeleportEvent],
        current_level_index: usize,
        player_position: Option<Vec3>,
    ) {
        for agent in self.agents.values_mut() {
            match agent {
                Agent::Pursuer(pursuer) => {
                    if !items_added.is_empty() {
                        pursuer.on_item_added();
                    }
                    pursuer.update(world, player_position, dt_seconds);
                }
                Agent::Teleporter(teleporter) => {
                    if let Some(event) = teleports.last() {
                        teleporter.on_player_teleported(*event);
                    }
                    teleporter.update(world, dt_seconds);
                }
                Agent::Spawner(tracker) => {
                    for item in items_added {
                        tracker.on_item_added(item, current_level_index);
                    }
                    tracker.update(world, dt_seconds, current_level_index);
                }
            }
        }
    }
}

impl TeleportPreview {
    #[cfg(test)]
    fn is_previewing(&self) -> bool {
        self.active.is_some()
    }

    fn begin(&mut self, time_scale: &mut TimeScale, origin: Vec3, target: Vec3) -> PreviewOutcome {
        if self.active.is_some() {
            return PreviewOutcome::AlreadyPreviewing;
        }
        if self.cooldown_remaining_seconds > 0.0 {
            return PreviewOutcome::OnCooldown;
        }
        if origin.distance(target) > TELEPORT_MAX_DISTANCE {
            return PreviewOutcome::OutOfRange;
        }
        let lease = match time_scale.try_acquire(TELEPORT_PREVIEW_HOLDER) {
            Ok(lease) => lease,
            Err(TimeScaleError::Held { holder }) => {
                debug!(holder, "teleport_preview_deferred");
                return PreviewOutcome::Deferred { holder };
            }
            Err(error) => {
                warn!(%error, "teleport_preview_failed");
                return PreviewOutcome::Deferred {
                    holder: TELEPORT_PREVIEW_HOLDER,
                };
            }
        };
        if let Err(error) = time_scale.set(&lease, TELEPORT_SLOWDOWN_FACTOR) {
            warn!(%error, "teleport_preview_slowdown_rejected");
        }
        self.active = Some(ActivePreview {
            lease,
            target,
            decision_remaining_seconds: TELEPORT_DECISION_SECONDS,
        });
        info!(?target, "teleport_preview_started");
        PreviewOutcome::Started
    }

    /// Advances cooldown and decision timers on unscaled time. Cancels the
    /// preview if its lease was taken away.
    fn tick(&mut self, time_scale: &mut TimeScale, unscaled_dt_seconds: f32) -> Option<PreviewCancel> {
        self.cooldown_remaining_seconds = (self.cooldown_remaining_seconds - unscaled_dt_seconds).max(0.0);
        let active = self.active.as_mut()?;
        if !time_scale.is_current(&active.lease) {
            self.active = None;
            info!(reason = "revoked", "teleport_preview_cancelled");
            return Some(PreviewCancel::Revoked);
        }
        active.decision_remaining_seconds -= unscaled_dt_seconds;
        if active.decision_remaining_seconds <= 0.0 {
            self.cancel(time_scale);
            return Some(PreviewCancel::DecisionTimeout);
        }
        None
    }

    fn cancel(&mut self, time_scale: &mut TimeScale) -> Option<PreviewCancel> {
        let active = self.active.take()?;
        if let Err(error) = time_scale.release(active.lease) {
            debug!(%error, "teleport_preview_lease_stale");
        }
        info!("teleport_preview_cancelled");
        Some(PreviewCancel::Requested)
    }

    fn confirm(&mut self, world: &mut World, player: EntityId) -> Option<TeleportEvent> {
        let active = self.active.take()?;
        let time_scale = world.clock_mut().time_scale_mut();
        if !time_scale.is_current(&active.lease) {
            info!(reason = "revoked", "teleport_preview_cancelled");
            return None;
        }
        if let Err(error) = time_scale.release(active.lease) {
            debug!(%error, "teleport_preview_lease_stale");
        }
        let from = world.pose_of(player)?.position;
        world.set_pose(player, Pose::at(active.target));
        self.cooldown_remaining_seconds = TELEPORT_COOLDOWN_SECONDS;
        self.teleports = self.teleports.saturating_add(1);
        info!(?from, to = ?active.target, teleports = self.teleports, "player_teleported");
        Some(TeleportEvent {
            from,
            to: active.target,
        })
    }
}

impl PauseMenu {
    #[cfg(test)]
    fn is_paused(&self) -> bool {
        self.lease.is_some()
    }

    /// Drops a lease someone else has preempted.
    fn refresh(&mut self, time_scale: &TimeScale) {
        if self
            .lease
            .as_ref()
            .is_some_and(|lease| !time_scale.is_current(lease))
        {
            self.lease = None;
            info!("pause_menu_closed_by_preemption");
        }
    }

    fn toggle(&mut self, time_scale: &mut TimeScale) -> PauseOutcome {
        if let Some(lease) = self.lease.take() {
            if let Err(error) = time_scale.release(lease) {
                debug!(%error, "pause_menu_lease_stale");
            }
            info!("game_resumed");
            return PauseOutcome::Resumed;
        }
        match time_scale.try_acquire(PAUSE_MENU_HOLDER) {
            Ok(lease) => {
                if let Err(error) = time_scale.set(&lease, 0.0) {
                    warn!(%error, "pause_scale_rejected");
                }
                self.lease = Some(lease);
                info!("game_paused");
                PauseOutcome::Paused
            }
            Err(TimeScaleError::Held { holder }) => {
                debug!(holder, "pause_menu_deferred");
                PauseOutcome::Deferred { holder }
            }
            Err(error) => {
                warn!(%error, "pause_menu_failed");
                PauseOutcome::Deferred {
                    holder: PAUSE_MENU_HOLDER,
                }
            }
        }
    }
}
