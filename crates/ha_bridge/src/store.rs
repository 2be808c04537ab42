use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::state::EntityState;
use crate::state::EntityStates;

/// In-memory map of entity id to last known state.
///
/// Entries are only ever added or overwritten; a snapshot refresh merges into
/// the existing map and never evicts entities missing from the response.
#[derive(Debug, Default)]
pub(crate) struct EntityStore {
    entries: Mutex<HashMap<String, EntityState>>,
}

impl EntityStore {
    /// Lock the underlying map.
    ///
    /// The dispatcher holds this guard while it swaps an entry and captures the
    /// observer list, which orders changes against replay-on-subscribe.
    pub fn lock(&self) -> MutexGuard<'_, HashMap<String, EntityState>> {
        // No code panics while holding the guard, recover the map if it ever does
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.lock().get(entity_id).cloned()
    }

    /// Merge a fetched snapshot: overwrite existing keys, add new ones.
    pub fn merge(&self, states: &EntityStates) {
        let mut entries = self.lock();
        for (entity_id, state) in states {
            entries.insert(entity_id.clone(), state.clone());
        }
    }

    /// Entity ids sorted alphabetically, optionally limited to one domain.
    pub fn ids(&self, domain: Option<&str>) -> Vec<String> {
        let entries = self.lock();
        let mut ids: Vec<String> = entries
            .keys()
            .filter(|id| match domain {
                Some(domain) => id
                    .split_once('.')
                    .is_some_and(|(entity_domain, _)| entity_domain == domain),
                None => true,
            })
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Copy of the map ordered by entity id, used to replay current state.
pub(crate) fn sorted_entries(entries: &HashMap<String, EntityState>) -> Vec<(String, EntityState)> {
    let mut sorted: Vec<(String, EntityState)> = entries
        .iter()
        .map(|(id, state)| (id.clone(), state.clone()))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(value: &str) -> EntityState {
        EntityState {
            state: value.to_string(),
            attributes: HashMap::new(),
            last_updated: "2024-02-02T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_merge_keeps_entities_missing_from_refresh() {
        let store = EntityStore::default();

        let mut first = EntityStates::new();
        first.insert("light.living_room".to_string(), state("on"));
        first.insert("switch.kitchen".to_string(), state("off"));
        store.merge(&first);

        let mut second = EntityStates::new();
        second.insert("light.living_room".to_string(), state("off"));
        store.merge(&second);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("light.living_room").unwrap().state, "off");
        assert_eq!(store.get("switch.kitchen").unwrap().state, "off");
    }

    #[test]
    fn test_get_missing_entity() {
        let store = EntityStore::default();
        assert_eq!(store.get("missing.entity"), None);
    }

    #[test]
    fn test_ids_filtered_by_domain() {
        let store = EntityStore::default();
        let mut states = EntityStates::new();
        states.insert("light.porch".to_string(), state("on"));
        states.insert("light.attic".to_string(), state("off"));
        states.insert("lightning.sensor".to_string(), state("0"));
        store.merge(&states);

        assert_eq!(store.ids(Some("light")), vec!["light.attic", "light.porch"]);
        assert_eq!(store.ids(None).len(), 3);
    }
}
