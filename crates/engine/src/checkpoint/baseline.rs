use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::app::{Entity, EntityId, NpcState, Pose, World};

use super::inventory::{InventoryAccess, ItemId};
use super::progress::{compute_preserved_items, LevelProgress};
use super::CheckpointTargets;

#[derive(Debug, Clone, PartialEq)]
pub struct NpcBaseline {
    pub entity: EntityId,
    pub pose: Pose,
    pub logical_state: NpcState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemBaseline {
    pub entity: EntityId,
    pub item: ItemId,
    pub pose: Pose,
    pub was_active: bool,
    pub was_collected: bool,
    /// Collected pickup whose item is part of the preserved inventory. Set
    /// on commit; restores leave these pickups collected.
    pub earned: bool,
}

/// Known-good level state. Only `BaselineStore` can build or replace one.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelBaseline {
    player_pose: Option<Pose>,
    viewpoint_pose: Option<Pose>,
    npc_baselines: Vec<NpcBaseline>,
    item_baselines: Vec<ItemBaseline>,
    preserved_inventory: Vec<ItemId>,
    level_index: usize,
    captured_at_tick: u64,
}

impl LevelBaseline {
    pub fn player_pose(&self) -> Option<Pose> {
        self.player_pose
    }

    pub fn viewpoint_pose(&self) -> Option<Pose> {
        self.viewpoint_pose
    }

    pub fn npc_baselines(&self) -> &[NpcBaseline] {
        &self.npc_baselines
    }

    pub fn item_baselines(&self) -> &[ItemBaseline] {
        &self.item_baselines
    }

    pub fn preserved_inventory(&self) -> &[ItemId] {
        &self.preserved_inventory
    }

    pub fn level_index(&self) -> usize {
        self.level_index
    }

    pub fn captured_at_tick(&self) -> u64 {
        self.captured_at_tick
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    #[error("{role} pose of entity '{name}' is not finite")]
    NonFinitePose { role: &'static str, name: String },
}

#[derive(Debug, Default)]
pub struct BaselineStore {
    current: Option<LevelBaseline>,
    generation: u64,
}

impl BaselineStore {
    pub fn current(&self) -> Option<&LevelBaseline> {
        self.current.as_ref()
    }

    /// Number of baselines committed so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn builder(&mut self, level_index: usize, captured_at_tick: u64) -> BaselineBuilder<'_> {
        BaselineBuilder {
            store: self,
            baseline: LevelBaseline {
                player_pose: None,
                viewpoint_pose: None,
                npc_baselines: Vec::new(),
                item_baselines: Vec::new(),
                preserved_inventory: Vec::new(),
                level_index,
                captured_at_tick,
            },
        }
    }

    /// Walks every NPC and pickup (inactive ones included) and replaces the
    /// current baseline. On error the previous baseline is left untouched.
    pub fn capture(
        &mut self,
        world: &World,
        targets: &CheckpointTargets,
        progress: &LevelProgress,
        inventory: &dyn InventoryAccess,
        tick: u64,
    ) -> Result<&LevelBaseline, CaptureError> {
        let mut builder = self.builder(progress.current_level_index, tick);

        match targets.player.and_then(|id| world.find_entity(id)) {
            Some(player) => builder.player(player)?,
            None => debug!("baseline_player_missing"),
        }
        if let Some(viewpoint) = targets.viewpoint.and_then(|id| world.find_entity(id)) {
            builder.viewpoint(viewpoint)?;
        }
        for entity in world.entities() {
            if entity.npc.is_some() {
                builder.add_npc(entity)?;
            }
            if entity.pickup.is_some() {
                builder.add_item(entity)?;
            }
        }
        builder.preserve(compute_preserved_items(progress, inventory));

        Ok(builder.commit())
    }
}

/// Staging area for a baseline. Nothing reaches the store until `commit`;
/// dropping the builder discards the partial capture.
#[derive(Debug)]
pub struct BaselineBuilder<'a> {
    store: &'a mut BaselineStore,
    baseline: LevelBaseline,
}

impl<'a> BaselineBuilder<'a> {
    pub fn player(&mut self, entity: &Entity) -> Result<(), CaptureError> {
        self.baseline.player_pose = Some(checked_pose("player", entity)?);
        Ok(())
    }

    pub fn viewpoint(&mut self, entity: &Entity) -> Result<(), CaptureError> {
        self.baseline.viewpoint_pose = Some(checked_pose("viewpoint", entity)?);
        Ok(())
    }

    /// Ignores entities without an NPC component.
    pub fn add_npc(&mut self, entity: &Entity) -> Result<(), CaptureError> {
        let Some(npc) = entity.npc else {
            return Ok(());
        };
        let pose = checked_pose("npc", entity)?;
        self.baseline.npc_baselines.push(NpcBaseline {
            entity: entity.id,
            pose,
            logical_state: npc.state,
        });
        Ok(())
    }

    /// Ignores entities without a pickup component.
    pub fn add_item(&mut self, entity: &Entity) -> Result<(), CaptureError> {
        let Some(pickup) = entity.pickup.as_ref() else {
            return Ok(());
        };
        let pose = checked_pose("pickup", entity)?;
        self.baseline.item_baselines.push(ItemBaseline {
            entity: entity.id,
            item: pickup.item.clone(),
            pose,
            was_active: entity.active,
            was_collected: pickup.picked_up,
            earned: false,
        });
        Ok(())
    }

    pub fn preserve(&mut self, items: Vec<ItemId>) {
        self.baseline.preserved_inventory = items;
    }

    pub fn commit(self) -> &'a LevelBaseline {
        let Self { store, mut baseline } = self;
        let earned = claim_earned_pickups(&mut baseline);
        store.generation = store.generation.saturating_add(1);
        info!(
            generation = store.generation,
            level_index = baseline.level_index,
            tick = baseline.captured_at_tick,
            npc_count = baseline.npc_baselines.len(),
            item_count = baseline.item_baselines.len(),
            preserved_count = baseline.preserved_inventory.len(),
            earned_pickups = earned,
            "baseline_captured"
        );
        store.current.insert(baseline)
    }
}

/// Matches each preserved item to one collected pickup carrying it, so two
/// pickups sharing an item id only shield as many entities as were earned.
fn claim_earned_pickups(baseline: &mut LevelBaseline) -> usize {
    let mut unclaimed: HashMap<&ItemId, usize> = HashMap::new();
    for item in &baseline.preserved_inventory {
        *unclaimed.entry(item).or_default() += 1;
    }
    let mut claimed = 0;
    for item_baseline in &mut baseline.item_baselines {
        item_baseline.earned = false;
        if !item_baseline.was_collected {
            continue;
        }
        if let Some(remaining) = unclaimed.get_mut(&item_baseline.item) {
            if *remaining > 0 {
                *remaining -= 1;
                item_baseline.earned = true;
                claimed += 1;
            }
        }
    }
    claimed
}

fn checked_pose(role: &'static str, entity: &Entity) -> Result<Pose, CaptureError> {
    if entity.pose.is_finite() {
        Ok(entity.pose)
    } else {
        Err(CaptureError::NonFinitePose {
            role,
            name: entity.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::app::EntityKind;
    use crate::checkpoint::inventory::testing::VecInventory;
    use crate::checkpoint::progress::LevelRecord;

    struct Level {
        world: World,
        targets: CheckpointTargets,
        relic: EntityId,
        gem: EntityId,
        guide: EntityId,
    }

    fn level() -> Level {
        let mut world = World::default();
        let player = world.spawn_player("player", Pose::at(Vec3::new(0.0, 0.0, 1.0)), 3);
        let camera = world.spawn("camera", EntityKind::Viewpoint, Pose::at(Vec3::new(0.0, 3.0, -4.0)));
        let relic = world.spawn_pickup("relic", ItemId::new("relic"), Pose::at(Vec3::X));
        let gem = world.spawn_pickup("gem", ItemId::new("gem"), Pose::at(Vec3::Z));
        let guide = world.spawn_npc("guide", Pose::at(Vec3::Y), NpcState::Enemy);
        world.find_entity_mut(gem).expect("gem").collect_item();
        Level {
            world,
            targets: CheckpointTargets::new(Some(player), Some(camera)),
            relic,
            gem,
            guide,
        }
    }

    fn two_levels(completed: bool) -> LevelProgress {
        let mut progress = LevelProgress::new(vec![
            LevelRecord::new("first", 1),
            LevelRecord::new("second", 1),
        ]);
        if completed {
            progress.complete_current_level();
        }
        progress
    }

    #[test]
    fn capture_records_every_npc_and_pickup_including_inactive() {
        let level = level();
        let mut store = BaselineStore::default();

        let baseline = store
            .capture(
                &level.world,
                &level.targets,
                &two_levels(false),
                &VecInventory::default(),
                7,
            )
            .expect("capture");

        assert_eq!(baseline.player_pose(), Some(Pose::at(Vec3::new(0.0, 0.0, 1.0))));
        assert_eq!(baseline.viewpoint_pose(), Some(Pose::at(Vec3::new(0.0, 3.0, -4.0))));
        assert_eq!(baseline.captured_at_tick(), 7);
        assert_eq!(baseline.npc_baselines().len(), 1);
        assert_eq!(baseline.npc_baselines()[0].entity, level.guide);
        assert_eq!(baseline.npc_baselines()[0].logical_state, NpcState::Enemy);

        let gem = baseline
            .item_baselines()
            .iter()
            .find(|item| item.entity == level.gem)
            .expect("inactive pickup captured");
        assert!(!gem.was_active);
        assert!(gem.was_collected);
        let relic = baseline
            .item_baselines()
            .iter()
            .find(|item| item.entity == level.relic)
            .expect("relic captured");
        assert!(relic.was_active);
        assert!(!relic.was_collected);
    }

    #[test]
    fn capture_preserves_items_of_completed_levels() {
        let level = level();
        let mut store = BaselineStore::default();
        let inventory = VecInventory::with_items(&["gem", "relic"]);

        let baseline = store
            .capture(&level.world, &level.targets, &two_levels(true), &inventory, 0)
            .expect("capture");

        assert_eq!(baseline.level_index(), 1);
        assert_eq!(baseline.preserved_inventory(), &[ItemId::new("gem")]);
    }

    #[test]
    fn twin_pickups_only_earn_as_many_as_preserved() {
        let mut level = level();
        let twin = level
            .world
            .spawn_pickup("gem_twin", ItemId::new("gem"), Pose::at(Vec3::NEG_Z));
        level.world.find_entity_mut(twin).expect("twin").collect_item();
        let inventory = VecInventory::with_items(&["gem", "gem"]);
        let mut store = BaselineStore::default();

        let baseline = store
            .capture(&level.world, &level.targets, &two_levels(true), &inventory, 0)
            .expect("capture");

        assert_eq!(baseline.preserved_inventory(), &[ItemId::new("gem")]);
        let earned: Vec<EntityId> = baseline
            .item_baselines()
            .iter()
            .filter(|item| item.earned)
            .map(|item| item.entity)
            .collect();
        assert_eq!(earned.len(), 1);
        assert!(earned[0] == level.gem || earned[0] == twin);
    }

    #[test]
    fn uncollected_pickup_is_never_earned() {
        let level = level();
        let inventory = VecInventory::with_items(&["relic"]);
        let mut store = BaselineStore::default();

        let baseline = store
            .capture(&level.world, &level.targets, &two_levels(true), &inventory, 0)
            .expect("capture");

        assert_eq!(baseline.preserved_inventory(), &[ItemId::new("relic")]);
        assert!(baseline.item_baselines().iter().all(|item| !item.earned));
    }

    struct NewestFirstInventory(VecInventory);

    impl InventoryAccess for NewestFirstInventory {
        fn items(&self) -> &[ItemId] {
            self.0.items()
        }

        fn items_to_preserve(&self, count: usize) -> Vec<ItemId> {
            self.0.items.iter().rev().take(count).cloned().collect()
        }

        fn clear_all_items(&mut self) {
            self.0.clear_all_items();
        }

        fn restore_items(&mut self, items: &[ItemId]) {
            self.0.restore_items(items);
        }
    }

    #[test]
    fn capture_takes_preserved_items_from_calculator() {
        let level = level();
        let progress = two_levels(true);
        let inventory = NewestFirstInventory(VecInventory::with_items(&["gem", "relic"]));
        let mut store = BaselineStore::default();

        let baseline = store
            .capture(&level.world, &level.targets, &progress, &inventory, 0)
            .expect("capture");

        assert_eq!(
            baseline.preserved_inventory(),
            compute_preserved_items(&progress, &inventory).as_slice()
        );
        assert_eq!(baseline.preserved_inventory(), &[ItemId::new("relic")]);
    }

    #[test]
    fn failed_capture_keeps_previous_baseline() {
        let mut level = level();
        let mut store = BaselineStore::default();
        let progress = two_levels(false);
        let inventory = VecInventory::default();
        let first = store
            .capture(&level.world, &level.targets, &progress, &inventory, 1)
            .expect("first capture")
            .clone();

        level
            .world
            .set_pose(level.relic, Pose::at(Vec3::new(f32::NAN, 0.0, 0.0)));
        let error = store
            .capture(&level.world, &level.targets, &progress, &inventory, 2)
            .unwrap_err();

        assert_eq!(
            error,
            CaptureError::NonFinitePose {
                role: "pickup",
                name: "relic".to_owned()
            }
        );
        assert_eq!(store.current(), Some(&first));
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn dropped_builder_leaves_store_unchanged() {
        let level = level();
        let mut store = BaselineStore::default();
        store
            .capture(&level.world, &level.targets, &two_levels(false), &VecInventory::default(), 1)
            .expect("capture");
        let before = store.current().cloned();

        {
            let mut builder = store.builder(5, 99);
            let guide = level.world.find_entity(level.guide).expect("guide");
            builder.add_npc(guide).expect("npc");
        }

        assert_eq!(store.current().cloned(), before);
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn commit_replaces_baseline_wholesale() {
        let level = level();
        let mut store = BaselineStore::default();
        store
            .capture(&level.world, &level.targets, &two_levels(false), &VecInventory::default(), 1)
            .expect("capture");

        let replaced = store.builder(1, 40).commit();

        assert!(replaced.npc_baselines().is_empty());
        assert!(replaced.item_baselines().is_empty());
        assert_eq!(replaced.player_pose(), None);
        assert_eq!(store.generation(), 2);
    }

    #[test]
    fn missing_player_is_not_a_capture_error() {
        let level = level();
        let mut store = BaselineStore::default();

        let baseline = store
            .capture(
                &level.world,
                &CheckpointTargets::default(),
                &two_levels(false),
                &VecInventory::default(),
                0,
            )
            .expect("capture");

        assert_eq!(baseline.player_pose(), None);
        assert_eq!(baseline.item_baselines().len(), 2);
    }
}
