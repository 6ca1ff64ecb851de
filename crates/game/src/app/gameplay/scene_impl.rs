impl Scene for GameplayScene {
    fn load(&mut self, world: &mut World) {
        self.reset_runtime_state();
        self.spawn_level(world);
        self.checkpoint_level_state(world);
        info!(
            level = %self.definition.name,
            entity_count = world.entity_count(),
            levels = self.progress.levels.len(),
            reset_subscribers = self.agents.len(),
            script_steps = self.definition.script.len(),
            "scene_loaded"
        );
    }

    fn update(&mut self, time: TickTime, world: &mut World) -> SceneCommand {
        self.pause_menu.refresh(world.clock().time_scale());
        if let Some(reason) = self
            .preview
            .tick(world.clock_mut().time_scale_mut(), time.unscaled_dt_seconds)
        {
            debug!(?reason, "teleport_preview_ended");
        }

        if self.orchestrator.is_restore_in_flight() {
            self.run_restore(time, world);
            return SceneCommand::None;
        }
        self.run_gameplay_systems(time, world)
    }

    fn unload(&mut self, world: &mut World) {
        info!(
            level = %self.definition.name,
            restores_completed = self.orchestrator.restores_completed(),
            deaths = self.deaths,
            inventory_count = self.inventory.len(),
            entity_count = world.entity_count(),
            "scene_unloaded"
        );
    }

    fn debug_title(&self, _world: &World) -> Option<String> {
        let level = self
            .progress
            .current_level()
            .map_or("-", |level| level.name.as_str());
        Some(format!(
            "{} | level {} | items {} | restores {}",
            self.definition.name,
            level,
            self.inventory.len(),
            self.orchestrator.restores_completed()
        ))
    }
}
