use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an item definition. Inventories hold identifiers, never
/// references to pickup entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the checkpoint core needs from the player's inventory.
pub trait InventoryAccess {
    /// Items in collection order.
    fn items(&self) -> &[ItemId];

    /// The first `count` collected items, in collection order.
    fn items_to_preserve(&self, count: usize) -> Vec<ItemId> {
        self.items().iter().take(count).cloned().collect()
    }

    fn clear_all_items(&mut self);

    /// Appends `items` in order. Restores call this right after
    /// `clear_all_items`, making it an authoritative overwrite.
    fn restore_items(&mut self, items: &[ItemId]);
}
