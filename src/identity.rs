#![forbid(unsafe_code)]
//! Identity map: at most one live in-memory instance per `(type, row id)`.
//!
//! The map is an explicit object shared by the sessions that use it. A lookup
//! may always miss, whatever the policy behind it: callers reload from storage
//! in that case.

use crate::{
    data::RowId,
    object::Entity,
    record::{Record, Slot},
};
use std::{
    any::Any,
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

////////////////////////////////////////////////////////////////////////////////

type AnySlot = Arc<dyn Any + Send + Sync>;

/// `"<type path>#<row id>"`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(type_name: &str, id: RowId) -> Self {
        CacheKey(format!("{}#{}", type_name, id))
    }

    pub fn of<T: Entity>(id: RowId) -> Self {
        Self::new(T::schema().type_name, id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Storage strategy behind an [`IdentityMap`].
pub trait CachePolicy: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<AnySlot>;
    /// Overwrites whatever is stored under `key`.
    fn put(&self, key: CacheKey, slot: &AnySlot);
    fn invalidate(&self, key: &CacheKey);
    fn clear(&self);
    /// Number of entries, including ones whose instance is already gone.
    fn len(&self) -> usize;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds weak references only; reclaimed instances read as misses.
#[derive(Default)]
pub struct WeakPolicy {
    entries: Mutex<HashMap<CacheKey, Weak<dyn Any + Send + Sync>>>,
}

impl CachePolicy for WeakPolicy {
    fn get(&self, key: &CacheKey) -> Option<AnySlot> {
        lock(&self.entries).get(key).and_then(Weak::upgrade)
    }

    fn put(&self, key: CacheKey, slot: &AnySlot) {
        lock(&self.entries).insert(key, Arc::downgrade(slot));
    }

    fn invalidate(&self, key: &CacheKey) {
        lock(&self.entries).remove(key);
    }

    fn clear(&self) {
        lock(&self.entries).clear();
    }

    fn len(&self) -> usize {
        lock(&self.entries).len()
    }
}

/// Keeps up to `capacity` instances alive, evicting the oldest insertion first.
///
/// Once an entry is evicted, a later load creates a second instance even if the
/// evicted one is still referenced elsewhere.
pub struct BoundedPolicy {
    capacity: usize,
    state: Mutex<BoundedState>,
}

#[derive(Default)]
struct BoundedState {
    entries: HashMap<CacheKey, AnySlot>,
    order: VecDeque<CacheKey>,
}

impl BoundedPolicy {
    pub fn new(capacity: usize) -> Self {
        BoundedPolicy {
            capacity,
            state: Mutex::new(BoundedState::default()),
        }
    }
}

impl CachePolicy for BoundedPolicy {
    fn get(&self, key: &CacheKey) -> Option<AnySlot> {
        lock(&self.state).entries.get(key).cloned()
    }

    fn put(&self, key: CacheKey, slot: &AnySlot) {
        if self.capacity == 0 {
            return;
        }
        let mut state = lock(&self.state);
        if state.entries.insert(key.clone(), slot.clone()).is_some() {
            state.order.retain(|k| *k != key);
        }
        state.order.push_back(key);
        while state.entries.len() > self.capacity {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn invalidate(&self, key: &CacheKey) {
        let mut state = lock(&self.state);
        if state.entries.remove(key).is_some() {
            state.order.retain(|k| k != key);
        }
    }

    fn clear(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.order.clear();
    }

    fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Typed front of a [`CachePolicy`].
pub struct IdentityMap {
    policy: Box<dyn CachePolicy>,
}

impl Default for IdentityMap {
    fn default() -> Self {
        IdentityMap::new(WeakPolicy::default())
    }
}

impl IdentityMap {
    pub fn new(policy: impl CachePolicy + 'static) -> Self {
        IdentityMap {
            policy: Box::new(policy),
        }
    }

    pub fn bounded(capacity: usize) -> Self {
        IdentityMap::new(BoundedPolicy::new(capacity))
    }

    pub fn get<T: Entity>(&self, id: RowId) -> Option<Record<T>> {
        let key = CacheKey::of::<T>(id);
        let hit = self
            .policy
            .get(&key)
            .and_then(|slot| slot.downcast::<Slot<T>>().ok())
            .map(Record::from_slot);
        log::trace!("identity map {}: {}", if hit.is_some() { "hit" } else { "miss" }, key);
        hit
    }

    /// Registers `record` under its current id. Unpersisted records are ignored.
    pub fn put<T: Entity>(&self, record: &Record<T>) {
        let id = record.id();
        if !id.is_assigned() {
            return;
        }
        let slot: AnySlot = record.slot().clone();
        self.policy.put(CacheKey::of::<T>(id), &slot);
    }

    pub fn invalidate<T: Entity>(&self, id: RowId) {
        self.policy.invalidate(&CacheKey::of::<T>(id));
    }

    pub fn clear(&self) {
        self.policy.clear();
    }

    pub fn len(&self) -> usize {
        self.policy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityMap")
            .field("len", &self.len())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: u32) -> AnySlot {
        Arc::new(n)
    }

    #[test]
    fn keys_do_not_collide() {
        assert_ne!(
            CacheKey::new("a::B", RowId(12)),
            CacheKey::new("a::B1", RowId(2))
        );
        assert_eq!(CacheKey::new("a::B", RowId(12)).as_str(), "a::B#12");
    }

    #[test]
    fn weak_policy_misses_after_drop() {
        let policy = WeakPolicy::default();
        let key = CacheKey::new("t", RowId(1));
        let live = slot(7);
        policy.put(key.clone(), &live);
        assert!(policy.get(&key).is_some());

        drop(live);
        assert!(policy.get(&key).is_none());
        // stale entries are not swept
        assert_eq!(policy.len(), 1);
    }

    #[test]
    fn put_overwrites() {
        let policy = WeakPolicy::default();
        let key = CacheKey::new("t", RowId(1));
        let first = slot(1);
        let second = slot(2);
        policy.put(key.clone(), &first);
        policy.put(key.clone(), &second);

        let got = policy.get(&key).unwrap();
        assert!(Arc::ptr_eq(&got, &second));
    }

    #[test]
    fn bounded_policy_evicts_oldest() {
        let policy = BoundedPolicy::new(2);
        for id in 1..=3 {
            policy.put(CacheKey::new("t", RowId(id)), &slot(id as u32));
        }
        assert_eq!(policy.len(), 2);
        assert!(policy.get(&CacheKey::new("t", RowId(1))).is_none());
        assert!(policy.get(&CacheKey::new("t", RowId(3))).is_some());

        policy.invalidate(&CacheKey::new("t", RowId(3)));
        assert!(policy.get(&CacheKey::new("t", RowId(3))).is_none());
    }
}
