use crate::app::EntityId;

use super::inventory::{InventoryAccess, ItemId};

#[derive(Debug, Clone, PartialEq)]
pub struct LevelRecord {
    pub name: String,
    pub items_required: usize,
    pub boss: Option<EntityId>,
    pub boss_defeated: bool,
}

impl LevelRecord {
    pub fn new(name: impl Into<String>, items_required: usize) -> Self {
        Self {
            name: name.into(),
            items_required,
            boss: None,
            boss_defeated: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelProgress {
    pub levels: Vec<LevelRecord>,
    pub current_level_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelCompletion {
    Advanced { from: usize, to: usize },
    FinalLevelCleared { index: usize },
}

impl LevelProgress {
    pub fn new(levels: Vec<LevelRecord>) -> Self {
        Self {
            levels,
            current_level_index: 0,
        }
    }

    pub fn current_level(&self) -> Option<&LevelRecord> {
        self.levels.get(self.current_level_index)
    }

    /// Marks the current level's objective defeated and moves to the next
    /// level. The last level stays current once cleared.
    pub fn complete_current_level(&mut self) -> Option<LevelCompletion> {
        let from = self.current_level_index;
        let level = self.levels.get_mut(from)?;
        if level.boss_defeated {
            return None;
        }
        level.boss_defeated = true;
        if from + 1 < self.levels.len() {
            self.current_level_index = from + 1;
            Some(LevelCompletion::Advanced { from, to: from + 1 })
        } else {
            Some(LevelCompletion::FinalLevelCleared { index: from })
        }
    }
}

/// Items permanently earned: the sum of `items_required` over every level
/// before the current one whose objective is defeated.
pub fn preserved_item_count(progress: &LevelProgress) -> usize {
    progress
        .levels
        .iter()
        .take(progress.current_level_index)
        .filter(|level| level.boss_defeated)
        .map(|level| level.items_required)
        .sum()
}

/// First-collected-first-preserved: asks the inventory for its leading
/// `preserved_item_count` items. Baseline captures take their preserved
/// inventory from here.
pub fn compute_preserved_items(
    progress: &LevelProgress,
    inventory: &dyn InventoryAccess,
) -> Vec<ItemId> {
    inventory.items_to_preserve(preserved_item_count(progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::inventory::testing::VecInventory;

    fn items(ids: &[&str]) -> Vec<ItemId> {
        ids.iter().map(|id| ItemId::new(*id)).collect()
    }

    fn stocked(ids: &[&str]) -> VecInventory {
        VecInventory::with_items(ids)
    }

    fn progress(required: &[usize], defeated: usize, current: usize) -> LevelProgress {
        let levels = required
            .iter()
            .enumerate()
            .map(|(index, required)| LevelRecord {
                boss_defeated: index < defeated,
                ..LevelRecord::new(format!("level_{index}"), *required)
            })
            .collect();
        LevelProgress {
            levels,
            current_level_index: current,
        }
    }

    #[test]
    fn nothing_preserved_without_completed_levels() {
        let inventory = stocked(&["a", "b"]);

        assert!(compute_preserved_items(&progress(&[1, 1], 0, 0), &inventory).is_empty());
        assert!(compute_preserved_items(&LevelProgress::default(), &inventory).is_empty());
    }

    #[test]
    fn completed_levels_preserve_front_of_inventory() {
        let inventory = stocked(&["a", "b", "c", "d"]);

        let preserved = compute_preserved_items(&progress(&[1, 2, 1], 2, 2), &inventory);

        assert_eq!(preserved, items(&["a", "b", "c"]));
    }

    #[test]
    fn current_level_defeat_flag_is_not_counted() {
        let inventory = stocked(&["a", "b"]);
        let mut state = progress(&[1, 1], 0, 0);
        state.levels[0].boss_defeated = true;

        assert_eq!(preserved_item_count(&state), 0);
        assert!(compute_preserved_items(&state, &inventory).is_empty());
    }

    #[test]
    fn preserved_count_is_clamped_to_inventory() {
        let inventory = stocked(&["a"]);

        assert_eq!(
            compute_preserved_items(&progress(&[3], 1, 1), &inventory),
            items(&["a"])
        );
    }

    #[test]
    fn preservation_is_monotonic_in_completed_levels() {
        let inventory = stocked(&["a", "b", "c", "d", "e", "f"]);
        let required = [2, 1, 0, 2, 1];

        let mut previous = 0;
        for completed in 0..=required.len() {
            let state = progress(&required, completed, completed.min(required.len()));
            let preserved = compute_preserved_items(&state, &inventory);
            assert!(preserved.len() >= previous, "completed={completed}");
            assert_eq!(&inventory.items[..preserved.len()], preserved.as_slice());
            previous = preserved.len();
        }
    }

    #[test]
    fn preservation_is_deterministic() {
        let inventory = stocked(&["x", "y", "z"]);
        let state = progress(&[1, 1, 1], 2, 2);

        assert_eq!(
            compute_preserved_items(&state, &inventory),
            compute_preserved_items(&state, &inventory)
        );
    }

    #[test]
    fn complete_current_level_advances_until_last() {
        let mut state = progress(&[1, 1], 0, 0);

        assert_eq!(
            state.complete_current_level(),
            Some(LevelCompletion::Advanced { from: 0, to: 1 })
        );
        assert_eq!(
            state.complete_current_level(),
            Some(LevelCompletion::FinalLevelCleared { index: 1 })
        );
        assert_eq!(state.complete_current_level(), None);
        assert_eq!(state.current_level_index, 1);
    }
}
