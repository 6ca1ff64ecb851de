use tracing::{debug, warn};

use crate::app::{EntityId, World};

/// A component that returns to its initial state when the level resets.
///
/// Handlers must be idempotent: stop any local task in flight, go back to the
/// cached initial pose and clear local flags.
pub trait ResetAware {
    fn on_level_reset(&mut self, world: &mut World);
}

/// Looks up the reset handler owned by an entity.
pub trait ResetRoster {
    fn resolve(&mut self, entity: EntityId) -> Option<&mut dyn ResetAware>;
}

#[derive(Debug, Default)]
pub struct ResetBroadcast {
    subscribers: Vec<EntityId>,
}

impl ResetBroadcast {
    pub fn subscribe(&mut self, entity: EntityId) -> bool {
        if self.subscribers.contains(&entity) {
            return false;
        }
        self.subscribers.push(entity);
        true
    }

    pub fn unsubscribe(&mut self, entity: EntityId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| *subscriber != entity);
        self.subscribers.len() != before
    }

    pub fn is_subscribed(&self, entity: EntityId) -> bool {
        self.subscribers.contains(&entity)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Notifies every live subscriber once and returns how many were notified.
    /// Subscribers whose entity or handler is gone are dropped from the list.
    pub fn fire(&mut self, roster: &mut dyn ResetRoster, world: &mut World) -> usize {
        let mut notified = 0usize;
        let mut live = Vec::with_capacity(self.subscribers.len());
        for entity in self.subscribers.drain(..) {
            if !world.contains(entity) {
                warn!(?entity, "reset_subscriber_pruned");
                continue;
            }
            match roster.resolve(entity) {
                Some(handler) => {
                    handler.on_level_reset(world);
                    notified += 1;
                    live.push(entity);
                }
                None => warn!(?entity, "reset_subscriber_pruned"),
            }
        }
        self.subscribers = live;
        debug!(notified, "reset_broadcast_fired");
        notified
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CountingRoster;
    use super::*;
    use crate::app::{EntityKind, Pose};

    #[test]
    fn subscribe_is_idempotent() {
        let mut world = World::default();
        let agent = world.spawn("agent", EntityKind::Agent, Pose::IDENTITY);
        let mut broadcast = ResetBroadcast::default();

        assert!(broadcast.subscribe(agent));
        assert!(!broadcast.subscribe(agent));
        assert_eq!(broadcast.len(), 1);
        assert!(broadcast.unsubscribe(agent));
        assert!(!broadcast.unsubscribe(agent));
        assert!(broadcast.is_empty());
    }

    #[test]
    fn fire_notifies_each_subscriber_once() {
        let mut world = World::default();
        let first = world.spawn("first", EntityKind::Agent, Pose::IDENTITY);
        let second = world.spawn("second", EntityKind::Agent, Pose::IDENTITY);
        let mut roster = CountingRoster::default();
        roster.register(first);
        roster.register(second);
        let mut broadcast = ResetBroadcast::default();
        broadcast.subscribe(first);
        broadcast.subscribe(second);

        assert_eq!(broadcast.fire(&mut roster, &mut world), 2);
        assert_eq!(roster.resets(first), 1);
        assert_eq!(roster.resets(second), 1);
    }

    #[test]
    fn destroyed_subscribers_are_pruned_without_notification() {
        let mut world = World::default();
        let doomed = world.spawn("doomed", EntityKind::Agent, Pose::IDENTITY);
        let orphan = world.spawn("orphan", EntityKind::Agent, Pose::IDENTITY);
        let mut roster = CountingRoster::default();
        roster.register(doomed);
        let mut broadcast = ResetBroadcast::default();
        broadcast.subscribe(doomed);
        broadcast.subscribe(orphan);

        world.despawn(doomed);
        world.apply_pending();

        assert_eq!(broadcast.fire(&mut roster, &mut world), 0);
        assert_eq!(roster.resets(doomed), 0);
        assert!(broadcast.is_empty());
    }
}
