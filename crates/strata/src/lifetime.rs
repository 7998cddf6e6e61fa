//! # Object lifetimes
//!
//! Objects reference each other only through strong [Arc]s pointing *down* the dependency chain (a bind group keeps its layout
//! and the bound views alive, a view keeps its buffer or texture alive). The opposite direction, which bind groups use a
//! resource, is never stored as a strong reference. It lives in a [DependentIndex] of [Weak] references keyed by the
//! resource's [ObjectId], so dropping the last user handle of a bind group actually frees it.

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use ahash::AHashMap;
use smallvec::SmallVec;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

///Process wide unique identity of a frontend object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) fn next() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

///Relation index from a resource to the objects depending on it. Only holds weak references.
pub struct DependentIndex<T> {
    map: AHashMap<ObjectId, SmallVec<[Weak<T>; 2]>>,
}

impl<T> Default for DependentIndex<T> {
    fn default() -> Self {
        DependentIndex {
            map: AHashMap::default(),
        }
    }
}

impl<T> DependentIndex<T> {
    pub fn insert(&mut self, resource: ObjectId, dependent: &Arc<T>) {
        let entry = self.map.entry(resource).or_default();
        //prune while we are at it
        entry.retain(|w| w.strong_count() > 0);
        entry.push(Arc::downgrade(dependent));
    }

    ///Returns all still alive dependents of `resource`. Dead entries are removed.
    pub fn dependents(&mut self, resource: ObjectId) -> Vec<Arc<T>> {
        let Some(entry) = self.map.get_mut(&resource) else {
            return Vec::new();
        };

        let alive = entry.iter().filter_map(Weak::upgrade).collect::<Vec<_>>();
        entry.retain(|w| w.strong_count() > 0);
        if entry.is_empty() {
            self.map.remove(&resource);
        }
        alive
    }

    ///Removes every entry that does not point to a living object anymore.
    pub fn prune(&mut self) {
        self.map.retain(|_, entry| {
            entry.retain(|w| w.strong_count() > 0);
            !entry.is_empty()
        });
    }

    ///Number of resources that currently have at least one (possibly dead) dependent recorded.
    pub fn tracked_resources(&self) -> usize {
        self.map.len()
    }
}
