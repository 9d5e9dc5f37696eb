//! # Sticky cache: latest sticky post per key, for one scope.
//!
//! At most one entry per key; a newer sticky post always overwrites.

use std::collections::HashMap;

use crate::events::{Envelope, TypeKey};

#[derive(Default, Debug)]
pub(crate) struct StickyCache {
    entries: HashMap<TypeKey, Envelope>,
}

impl StickyCache {
    pub(crate) fn put(&mut self, envelope: Envelope) {
        self.entries.insert(envelope.key.clone(), envelope);
    }

    pub(crate) fn get(&self, key: &TypeKey) -> Option<&Envelope> {
        self.entries.get(key)
    }

    /// Removes the entry only if it is still the post with sequence `seq`.
    pub(crate) fn remove_own(&mut self, key: &TypeKey, seq: u64) -> bool {
        match self.entries.get(key) {
            Some(env) if env.seq == seq => self.entries.remove(key).is_some(),
            _ => false,
        }
    }

    /// Removes the entry regardless of who posted it.
    pub(crate) fn clear(&mut self, key: &TypeKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub(crate) fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
