//! # Handle Registry
//!
//! Append-only table from handle to object, one per kind of object. Handles
//! come from a monotonically increasing counter and are never reused: once a
//! handle is removed it stays dead, so a stale handle held by the host can
//! only ever produce `InvalidHandle`, never a different object.
//!
//! Uses DashMap so that independent handles do not contend on one lock. A
//! shard lock is only held for the duration of the map operation itself;
//! lookups hand out an `Arc` clone so callers never hold a guard while calling
//! back into the host.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;

use dashmap::DashMap;

use crate::error::Error;
use crate::error::Result;
use crate::handle::Handle;
use crate::handle::Kind;

/// First handle value issued by every registry. Zero and negative values are
/// left free for the boundary to use as "no handle" sentinels.
pub const FIRST_HANDLE: i32 = 1;

/// Concurrent handle table for objects of one kind.
pub struct Registry<H: Handle, T: ?Sized> {
    entries: DashMap<H, Arc<T>>,
    next: AtomicI32,
    _kind: PhantomData<H>,
}

impl<H: Handle, T: ?Sized> Registry<H, T> {
    /// Creates an empty registry whose first handle is [`FIRST_HANDLE`].
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next: AtomicI32::new(FIRST_HANDLE),
            _kind: PhantomData,
        }
    }

    /// The kind of object this registry stores.
    pub fn kind(&self) -> Kind {
        H::KIND
    }

    /// Allocates the next handle without storing anything under it.
    ///
    /// Used when the object needs to know its own handle before it exists,
    /// e.g. an event adapter that must be handed to the engine at creation
    /// time. If creation then fails, the handle is simply never filled; it is
    /// not returned to the pool.
    ///
    /// # Panics
    ///
    /// Panics when the 32-bit counter is exhausted. There is no way to keep
    /// the no-reuse guarantee past that point.
    pub fn reserve(&self) -> H {
        let raw = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .unwrap_or_else(|_| panic!("{} handle space exhausted", H::KIND));
        H::from_raw(raw)
    }

    /// Stores `value` under a freshly allocated handle and returns the handle.
    pub fn insert(&self, value: Arc<T>) -> H {
        let handle = self.reserve();
        self.entries.insert(handle, value);
        handle
    }

    /// Stores `value` under a handle previously returned by [`reserve`](Self::reserve).
    pub(crate) fn fill(&self, handle: H, value: Arc<T>) {
        debug_assert!(handle.raw() < self.next.load(Ordering::SeqCst));
        self.entries.insert(handle, value);
    }

    /// Looks up a handle.
    pub fn get(&self, handle: H) -> Result<Arc<T>> {
        self.entries
            .get(&handle)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::invalid(handle))
    }

    /// Removes a handle and returns the object it named.
    ///
    /// Existing `Arc` clones stay valid; only the name is retired.
    pub fn remove(&self, handle: H) -> Result<Arc<T>> {
        self.entries
            .remove(&handle)
            .map(|(_, value)| value)
            .ok_or_else(|| Error::invalid(handle))
    }

    /// Returns true if `handle` was issued by this registry and later removed,
    /// or reserved and never filled.
    pub fn is_retired(&self, handle: H) -> bool {
        let raw = handle.raw();
        raw >= FIRST_HANDLE && raw < self.next.load(Ordering::SeqCst) && !self.entries.contains_key(&handle)
    }

    /// Handles currently live, in ascending order.
    pub fn handles(&self) -> Vec<H> {
        let mut handles: Vec<H> = self.entries.iter().map(|entry| *entry.key()).collect();
        handles.sort_by_key(|h| h.raw());
        handles
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H: Handle, T: ?Sized> Default for Registry<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::handle::ClientId;
    use crate::handle::NetworkId;

    #[test]
    fn test_handles_start_at_one_and_increase() {
        let reg: Registry<NetworkId, String> = Registry::new();
        let a = reg.insert(Arc::new("a".into()));
        let b = reg.insert(Arc::new("b".into()));
        let c = reg.insert(Arc::new("c".into()));

        assert_eq!(a, NetworkId(1));
        assert_eq!(b, NetworkId(2));
        assert_eq!(c, NetworkId(3));
        assert_eq!(*reg.get(b).unwrap(), "b");
    }

    #[test]
    fn test_get_after_remove_is_invalid() {
        let reg: Registry<ClientId, u32> = Registry::new();
        let a = reg.insert(Arc::new(10));
        let removed = reg.remove(a).unwrap();
        assert_eq!(*removed, 10);

        // A new insert must not alias the removed handle.
        let b = reg.insert(Arc::new(20));
        assert_ne!(a, b);

        match reg.get(a) {
            Err(Error::InvalidHandle { kind, handle }) => {
                assert_eq!(kind, Kind::MessageClient);
                assert_eq!(handle, a.0);
            }
            other => panic!("Expected InvalidHandle, got {:?}", other.map(|v| *v)),
        }
        assert!(reg.is_retired(a));
        assert!(!reg.is_retired(b));
        assert!(reg.remove(a).is_err());
    }

    #[test]
    fn test_unknown_handles_are_invalid() {
        let reg: Registry<ClientId, u32> = Registry::new();
        assert!(reg.get(ClientId(0)).is_err());
        assert!(reg.get(ClientId(-1)).is_err());
        assert!(reg.get(ClientId(42)).is_err());
        assert!(!reg.is_retired(ClientId(42)));
    }

    #[test]
    fn test_reserve_then_fill() {
        let reg: Registry<ClientId, &'static str> = Registry::new();
        let id = reg.reserve();
        assert!(reg.get(id).is_err());
        assert!(reg.is_retired(id));

        reg.fill(id, Arc::new("late"));
        assert_eq!(*reg.get(id).unwrap(), "late");

        let next = reg.insert(Arc::new("next"));
        assert!(next > id);
    }

    #[test]
    fn test_concurrent_inserts_are_distinct_and_increasing() {
        let reg: Registry<ClientId, usize> = Registry::new();
        let per_thread = 125;

        let batches: Vec<Vec<ClientId>> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|t| {
                    let reg = &reg;
                    s.spawn(move || {
                        (0..per_thread)
                            .map(|i| reg.insert(Arc::new(t * per_thread + i)))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        // Each thread observes strictly increasing handles.
        for batch in &batches {
            assert!(batch.windows(2).all(|w| w[0] < w[1]));
        }

        let all: HashSet<ClientId> = batches.into_iter().flatten().collect();
        assert_eq!(all.len(), 1000);
        assert_eq!(reg.len(), 1000);
        assert_eq!(reg.handles().first(), Some(&ClientId(1)));
        assert_eq!(reg.handles().last(), Some(&ClientId(1000)));
    }

    #[test]
    fn test_exhaustion_panics() {
        let reg: Registry<ClientId, u8> = Registry::new();
        reg.next.store(i32::MAX, Ordering::SeqCst);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| reg.insert(Arc::new(1))));
        assert!(result.is_err());
    }
}
