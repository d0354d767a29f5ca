use parking_lot::RwLock;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

type LockMap = HashMap<String, Arc<RwLock<()>>>;

/// Named reader/writer locks, created on first use.
///
/// The store keys these by database name and by `database/collection`.
/// An entry lives only as long as some [`NamedLock`] handle refers to it.
#[derive(Clone, Default)]
pub struct LockRegistry {
    locks: Arc<RwLock<LockMap>>,
}

/// A handle on one registry lock. Dropping the last handle for a name
/// removes the name from the registry.
pub struct NamedLock {
    registry: LockRegistry,
    name: String,
    lock: Arc<RwLock<()>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        LockRegistry::default()
    }

    /// Get the lock for `name`, creating it if needed.
    pub fn get(&self, name: &str) -> NamedLock {
        let existing = self.locks.read().get(name).cloned();
        let lock = match existing {
            Some(lock) => lock,
            None => self
                .locks
                .write()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(())))
                .clone(),
        };
        NamedLock {
            registry: self.clone(),
            name: name.to_string(),
            lock,
        }
    }

    /// Locks for several names, ordered by name so that callers taking more
    /// than one always acquire them in the same order.
    pub fn get_ordered(&self, names: &[&str]) -> Vec<NamedLock> {
        let mut sorted: Vec<&str> = names.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.into_iter().map(|n| self.get(n)).collect()
    }

    /// Number of names currently tracked.
    pub fn len(&self) -> usize {
        self.locks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.read().is_empty()
    }
}

impl Deref for NamedLock {
    type Target = RwLock<()>;

    fn deref(&self) -> &RwLock<()> {
        &self.lock
    }
}

impl Drop for NamedLock {
    fn drop(&mut self) {
        // Handles are cloned only under the map lock, so a count of two
        // (the map and this handle) cannot rise while we hold it.
        let mut map = self.registry.locks.write();
        let ours = map
            .get(&self.name)
            .map_or(false, |l| Arc::ptr_eq(l, &self.lock));
        if ours && Arc::strong_count(&self.lock) == 2 {
            map.remove(&self.name);
        }
    }
}
