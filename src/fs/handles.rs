use std::collections::HashMap;

use crate::fs::tree::is_same_or_descendant;

/// Mapping from node id to an opaque storage handle.
///
/// Only ever replaced wholesale by a rebuild, or pruned by subtree after a
/// delete; entries are never re-keyed in place.
#[derive(Debug, Clone)]
pub struct HandleCache<H> {
    handles: HashMap<String, H>,
}

impl<H> Default for HandleCache<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> HandleCache<H> {
    pub fn new() -> Self {
        Self {
            handles: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: impl Into<String>, handle: H) {
        self.handles.insert(id.into(), handle);
    }

    pub fn get(&self, id: &str) -> Option<&H> {
        self.handles.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    /// Drop the entry for `id` and every entry under it. Returns how many
    /// handles were dropped.
    pub fn remove_subtree(&mut self, id: &str) -> usize {
        let before = self.handles.len();
        self.handles
            .retain(|key, _| !is_same_or_descendant(key, id));
        before - self.handles.len()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// All cached ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.handles.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
