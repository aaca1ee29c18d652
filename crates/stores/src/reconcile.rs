//! Identity-keyed cache shared by every domain store.
//!
//! Incoming snapshots replace whatever is cached under the same identifier,
//! in full and without comparing timestamps: the last write wins. List views
//! only hold identifiers, so a pushed snapshot updates every view that
//! already lists it without changing membership.

use std::collections::HashMap;

use parking_lot::RwLock;
use taskboard_api::Entity;

/// Scope of a list-returning query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewKey {
    OpenTasks,
    MyTasks,
    TaskClaims(String),
    TaskChats(String),
    TaskEscrow(String),
    ChatMessages(String),
}

struct CacheState<T> {
    entities: HashMap<String, T>,
    views: HashMap<ViewKey, Vec<String>>,
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self {
            entities: HashMap::new(),
            views: HashMap::new(),
        }
    }
}

pub struct EntityCache<T> {
    state: RwLock<CacheState<T>>,
}

impl<T> Default for EntityCache<T> {
    fn default() -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
        }
    }
}

impl<T: Entity> EntityCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot stored under `entity.id()`. Returns the previous one.
    pub fn upsert(&self, entity: T) -> Option<T> {
        self.state
            .write()
            .entities
            .insert(entity.id().to_string(), entity)
    }

    /// Replace the whole membership of `key` with `entities`, upserting each.
    pub fn replace_view(&self, key: ViewKey, entities: &[T]) {
        let mut state = self.state.write();
        let ids = entities.iter().map(|entity| entity.id().to_string()).collect();
        for entity in entities {
            state.entities.insert(entity.id().to_string(), entity.clone());
        }
        state.views.insert(key, ids);
    }

    /// Upsert `entity` and add it to the end of `key` unless already listed.
    pub fn append_to_view(&self, key: ViewKey, entity: T) {
        let mut state = self.state.write();
        let id = entity.id().to_string();
        state.entities.insert(id.clone(), entity);
        let ids = state.views.entry(key).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Upsert `entities` and append the ones `key` does not list yet, keeping
    /// existing membership.
    pub fn merge_into_view(&self, key: ViewKey, entities: &[T]) {
        let mut state = self.state.write();
        for entity in entities {
            state.entities.insert(entity.id().to_string(), entity.clone());
        }
        let ids = state.views.entry(key).or_default();
        for entity in entities {
            if !ids.iter().any(|listed| listed == entity.id()) {
                ids.push(entity.id().to_string());
            }
        }
    }

    pub fn view_len(&self, key: &ViewKey) -> usize {
        self.state.read().views.get(key).map_or(0, Vec::len)
    }

    /// Current snapshots for `key`, in the order the backend returned them.
    pub fn view(&self, key: &ViewKey) -> Vec<T> {
        let state = self.state.read();
        state
            .views
            .get(key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.entities.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_view(&self, key: &ViewKey) -> bool {
        self.state.read().views.contains_key(key)
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.state.read().entities.get(id).cloned()
    }

    /// Drop the entity and every view reference to it.
    pub fn remove(&self, id: &str) -> Option<T> {
        let mut state = self.state.write();
        let removed = state.entities.remove(id);
        for ids in state.views.values_mut() {
            ids.retain(|listed| listed != id);
        }
        removed
    }

    /// Drop the view and every entity it listed.
    pub fn remove_view(&self, key: &ViewKey) -> Vec<T> {
        let mut state = self.state.write();
        let Some(ids) = state.views.remove(key) else {
            return Vec::new();
        };
        let removed: Vec<T> = ids
            .iter()
            .filter_map(|id| state.entities.remove(id))
            .collect();
        for listed in state.views.values_mut() {
            listed.retain(|id| !ids.contains(id));
        }
        removed
    }

    pub fn snapshot(&self) -> HashMap<String, T> {
        self.state.read().entities.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
