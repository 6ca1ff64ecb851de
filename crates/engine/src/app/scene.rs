use tracing::info;

use super::time::TickTime;
use super::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    HardReset,
    Quit,
}

pub trait Scene {
    fn load(&mut self, world: &mut World);
    fn update(&mut self, time: TickTime, world: &mut World) -> SceneCommand;
    fn unload(&mut self, world: &mut World);
    fn debug_title(&self, _world: &World) -> Option<String> {
        None
    }
}

pub(crate) struct SceneRunner {
    scene: Box<dyn Scene>,
    world: World,
    is_loaded: bool,
}

impl SceneRunner {
    pub(crate) fn new(scene: Box<dyn Scene>) -> Self {
        Self {
            scene,
            world: World::default(),
            is_loaded: false,
        }
    }

    pub(crate) fn load(&mut self) {
        if self.is_loaded {
            return;
        }
        self.scene.load(&mut self.world);
        self.world.apply_pending();
        self.is_loaded = true;
    }

    pub(crate) fn step(&mut self, fixed_dt_seconds: f32) -> SceneCommand {
        let time = self.world.clock_mut().advance(fixed_dt_seconds);
        let command = self.scene.update(time, &mut self.world);
        self.world.apply_pending();
        command
    }

    pub(crate) fn hard_reset(&mut self) {
        if self.is_loaded {
            self.scene.unload(&mut self.world);
        }
        self.world.clear();
        self.scene.load(&mut self.world);
        self.world.apply_pending();
        self.is_loaded = true;
        info!(entity_count = self.world.entity_count(), "scene_hard_reset");
    }

    pub(crate) fn shutdown(&mut self) {
        if self.is_loaded {
            self.scene.unload(&mut self.world);
            self.world.clear();
            self.is_loaded = false;
        }
    }

    pub(crate) fn world(&self) -> &World {
        &self.world
    }

    pub(crate) fn debug_title(&self) -> Option<String> {
        self.scene.debug_title(&self.world)
    }
}
