use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use super::time::SimClock;
use crate::checkpoint::ItemId;

new_key_type! {
    /// Generation-checked entity handle. A handle to a despawned entity never
    /// resolves again, even after its slot is reused.
    pub struct EntityId;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.orientation.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Player,
    Viewpoint,
    Npc,
    Pickup,
    Agent,
    Boss,
    Marker,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpcState {
    #[default]
    Npc,
    Enemy,
    PostDefeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NpcComponent {
    pub state: NpcState,
}

impl NpcComponent {
    /// Forces the NPC back to `NpcState::Npc`. Returns whether anything changed.
    pub fn revert_to_npc(&mut self) -> bool {
        if self.state == NpcState::Npc {
            return false;
        }
        self.state = NpcState::Npc;
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PickupComponent {
    pub item: ItemId,
    pub picked_up: bool,
    original_pose: Pose,
    original_active: bool,
}

impl PickupComponent {
    pub fn original_pose(&self) -> Pose {
        self.original_pose
    }

    pub fn original_active(&self) -> bool {
        self.original_active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub current: u32,
    pub max: u32,
}

impl Health {
    pub fn full(max: u32) -> Self {
        Self { current: max, max }
    }

    pub fn take_damage(&mut self, amount: u32) -> bool {
        self.current = self.current.saturating_sub(amount);
        self.is_depleted()
    }

    pub fn is_depleted(&self) -> bool {
        self.current == 0
    }

    pub fn reset(&mut self) {
        self.current = self.max;
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub pose: Pose,
    pub active: bool,
    pub npc: Option<NpcComponent>,
    pub pickup: Option<PickupComponent>,
    pub health: Option<Health>,
}

impl Entity {
    /// Puts a pickup back where it started: cached pose, uncollected, original
    /// active flag. No-op for entities without a pickup component.
    pub fn reset_item(&mut self) -> bool {
        let Some(pickup) = self.pickup.as_mut() else {
            return false;
        };
        pickup.picked_up = false;
        self.pose = pickup.original_pose;
        self.active = pickup.original_active;
        true
    }

    /// Shows a hidden pickup that has not been collected yet.
    pub fn reveal_item(&mut self) -> bool {
        let Some(pickup) = self.pickup.as_ref() else {
            return false;
        };
        if pickup.picked_up || self.active {
            return false;
        }
        self.active = true;
        true
    }

    /// Marks an active, uncollected pickup as collected and hides it.
    pub fn collect_item(&mut self) -> Option<ItemId> {
        if !self.active {
            return None;
        }
        let pickup = self.pickup.as_mut()?;
        if pickup.picked_up {
            return None;
        }
        pickup.picked_up = true;
        self.active = false;
        Some(pickup.item.clone())
    }
}

#[derive(Debug, Default)]
pub struct World {
    entities: SlotMap<EntityId, Entity>,
    pending_despawns: Vec<EntityId>,
    clock: SimClock,
}

impl World {
    pub fn spawn(&mut self, name: impl Into<String>, kind: EntityKind, pose: Pose) -> EntityId {
        let name = name.into();
        self.entities.insert_with_key(|id| Entity {
            id,
            name,
            kind,
            pose,
            active: true,
            npc: None,
            pickup: None,
            health: None,
        })
    }

    pub fn spawn_player(&mut self, name: impl Into<String>, pose: Pose, max_health: u32) -> EntityId {
        let id = self.spawn(name, EntityKind::Player, pose);
        self.entities[id].health = Some(Health::full(max_health));
        id
    }

    pub fn spawn_npc(&mut self, name: impl Into<String>, pose: Pose, state: NpcState) -> EntityId {
        let id = self.spawn(name, EntityKind::Npc, pose);
        self.entities[id].npc = Some(NpcComponent { state });
        id
    }

    /// Spawns an active pickup. The pickup caches its spawn pose as its own
    /// reset target.
    pub fn spawn_pickup(&mut self, name: impl Into<String>, item: ItemId, pose: Pose) -> EntityId {
        let id = self.spawn(name, EntityKind::Pickup, pose);
        self.entities[id].pickup = Some(PickupComponent {
            item,
            picked_up: false,
            original_pose: pose,
            original_active: true,
        });
        id
    }

    /// Spawns a hidden pickup. Its own reset target is hidden too, so only a
    /// baseline that saw it revealed brings it back visible.
    pub fn spawn_dormant_pickup(
        &mut self,
        name: impl Into<String>,
        item: ItemId,
        pose: Pose,
    ) -> EntityId {
        let id = self.spawn_pickup(name, item, pose);
        let entity = &mut self.entities[id];
        entity.active = false;
        if let Some(pickup) = entity.pickup.as_mut() {
            pickup.original_active = false;
        }
        id
    }

    /// Queues a despawn; the entity keeps resolving until `apply_pending`.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if !self.entities.contains_key(id) {
            return false;
        }
        self.pending_despawns.push(id);
        true
    }

    pub fn apply_pending(&mut self) {
        for id in self.pending_despawns.drain(..) {
            self.entities.remove(id);
        }
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.pending_despawns.clear();
        self.clock = SimClock::default();
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn find_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn find_entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    pub fn ids_of_kind(&self, kind: EntityKind) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|entity| entity.kind == kind)
            .map(|entity| entity.id)
            .collect()
    }

    pub fn npc_ids(&self) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|entity| entity.npc.is_some())
            .map(|entity| entity.id)
            .collect()
    }

    /// Every pickup, active or not.
    pub fn pickup_ids(&self) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|entity| entity.pickup.is_some())
            .map(|entity| entity.id)
            .collect()
    }

    pub fn pose_of(&self, id: EntityId) -> Option<Pose> {
        self.entities.get(id).map(|entity| entity.pose)
    }

    pub fn set_pose(&mut self, id: EntityId, pose: Pose) -> bool {
        match self.entities.get_mut(id) {
            Some(entity) => {
                entity.pose = pose;
                true
            }
            None => false,
        }
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut SimClock {
        &mut self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> ItemId {
        ItemId::new(id)
    }

    #[test]
    fn despawned_handle_never_resolves_after_slot_reuse() {
        let mut world = World::default();
        let first = world.spawn("first", EntityKind::Marker, Pose::IDENTITY);
        assert!(world.despawn(first));
        world.apply_pending();

        let second = world.spawn("second", EntityKind::Marker, Pose::IDENTITY);

        assert!(world.find_entity(first).is_none());
        assert_eq!(world.find_entity(second).expect("second").name, "second");
        assert_ne!(first, second);
    }

    #[test]
    fn despawn_is_deferred_until_apply_pending() {
        let mut world = World::default();
        let id = world.spawn("npc", EntityKind::Marker, Pose::IDENTITY);

        assert!(world.despawn(id));
        assert!(world.contains(id));
        world.apply_pending();
        assert!(!world.contains(id));
        assert!(!world.despawn(id));
    }

    #[test]
    fn collect_then_reset_restores_pickup_cache() {
        let mut world = World::default();
        let spawn_pose = Pose::at(Vec3::new(3.0, 0.0, 1.0));
        let id = world.spawn_pickup("relic", item("relic"), spawn_pose);
        let pickup = world.find_entity_mut(id).expect("pickup");

        assert_eq!(pickup.collect_item(), Some(item("relic")));
        assert_eq!(pickup.collect_item(), None);
        pickup.pose = Pose::at(Vec3::new(9.0, 9.0, 9.0));

        assert!(pickup.reset_item());
        assert!(pickup.active);
        assert_eq!(pickup.pose, spawn_pose);
        assert!(!pickup.pickup.as_ref().expect("component").picked_up);
    }

    #[test]
    fn dormant_pickup_reveals_once_and_resets_hidden() {
        let mut world = World::default();
        let id = world.spawn_dormant_pickup("relic", item("relic"), Pose::IDENTITY);
        let pickup = world.find_entity_mut(id).expect("pickup");

        assert!(!pickup.active);
        assert_eq!(pickup.collect_item(), None);
        assert!(pickup.reveal_item());
        assert!(!pickup.reveal_item());
        assert_eq!(pickup.collect_item(), Some(item("relic")));
        assert!(!pickup.reveal_item());

        assert!(pickup.reset_item());
        assert!(!pickup.active);
        assert!(!pickup.pickup.as_ref().expect("component").original_active());
    }

    #[test]
    fn reset_item_ignores_non_pickups() {
        let mut world = World::default();
        let id = world.spawn_npc("guide", Pose::IDENTITY, NpcState::Npc);

        assert!(!world.find_entity_mut(id).expect("npc").reset_item());
    }

    #[test]
    fn revert_to_npc_only_reports_real_changes() {
        let mut npc = NpcComponent {
            state: NpcState::Enemy,
        };
        assert!(npc.revert_to_npc());
        assert!(!npc.revert_to_npc());
        assert_eq!(npc.state, NpcState::Npc);
    }

    #[test]
    fn health_damage_saturates_and_resets() {
        let mut health = Health::full(3);
        assert!(!health.take_damage(2));
        assert!(health.take_damage(5));
        assert_eq!(health.current, 0);
        health.reset();
        assert_eq!(health.current, 3);
    }

    #[test]
    fn pickup_ids_include_inactive_pickups() {
        let mut world = World::default();
        let active = world.spawn_pickup("a", item("a"), Pose::IDENTITY);
        let hidden = world.spawn_pickup("b", item("b"), Pose::IDENTITY);
        world.find_entity_mut(hidden).expect("b").collect_item();
        world.spawn("marker", EntityKind::Marker, Pose::IDENTITY);

        let ids = world.pickup_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&active));
        assert!(ids.contains(&hidden));
    }
}
