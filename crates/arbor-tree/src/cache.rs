use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use arbor_types::NodeHandle;

/// A decoded node held by a [`NodeCache`].
pub type CachedNode = Arc<dyn Any + Send + Sync>;

/// Memoizes decoded nodes by handle.
///
/// Entries are keyed by location and content hash together, so a handle
/// naming the right export with the wrong hash never hits. Readers insert
/// only after a successful, verified decode, and treat an entry of the
/// wrong type as a miss.
pub trait NodeCache: Send + Sync {
    fn get(&self, handle: &NodeHandle) -> Option<CachedNode>;
    fn insert(&self, handle: NodeHandle, node: CachedNode);
}

/// Bounded least-recently-used [`NodeCache`].
pub struct LruNodeCache {
    inner: Mutex<LruCache<NodeHandle, CachedNode>>,
}

impl LruNodeCache {
    /// Create a cache holding at most `capacity` nodes (at least one).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().expect("lock poisoned").cap().get()
    }
}

impl NodeCache for LruNodeCache {
    fn get(&self, handle: &NodeHandle) -> Option<CachedNode> {
        self.inner.lock().expect("lock poisoned").get(handle).cloned()
    }

    fn insert(&self, handle: NodeHandle, node: CachedNode) {
        self.inner.lock().expect("lock poisoned").put(handle, node);
    }
}

impl std::fmt::Debug for LruNodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruNodeCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
