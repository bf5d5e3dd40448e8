//! Registry of live upload sessions and the ID pool backing it.
//!
//! Both structures are plain `std` mutex maps: every operation is a short
//! lookup or insert, nothing is held across an await point, and callers on
//! the websocket path hit them once per connection.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

// ---

use crate::session::UploadSession;
use inflow_domain::{InflowError, Result};

// ---------------------------------------------------------------------------
// IdPool
// ---------------------------------------------------------------------------

/// Allocator for upload IDs, guaranteeing no two live sessions share one.
///
/// IDs are random UUIDs, so the retry loop in [`IdPool::new_id`] is all but
/// theoretical — but the pool is what makes the guarantee, not the entropy.
#[derive(Debug, Default)]
pub struct IdPool {
    live: Mutex<HashSet<String>>,
}

// ---

impl IdPool {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    // ---

    /// Allocate a fresh ID. The ID stays reserved until [`IdPool::release`].
    pub fn new_id(&self) -> String {
        let mut live = self.live.lock().expect("id pool lock poisoned");
        loop {
            let id = Uuid::new_v4().to_string();
            if live.insert(id.clone()) {
                return id;
            }
        }
    }

    // ---

    /// Return an ID to the pool. Releasing an ID that was never allocated
    /// (or already released) is an error.
    pub fn release(&self, id: &str) -> Result<()> {
        let mut live = self.live.lock().expect("id pool lock poisoned");
        if live.remove(id) {
            Ok(())
        } else {
            Err(InflowError::IdNotAllocated(id.to_string()))
        }
    }

    // ---

    pub fn len(&self) -> usize {
        self.live.lock().expect("id pool lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// UploadRegistry
// ---------------------------------------------------------------------------

/// All currently-known upload sessions, keyed by ID.
///
/// Insertion is two-phase: [`UploadRegistry::allocate_id`] reserves the ID,
/// the caller constructs the session around it, then
/// [`UploadRegistry::insert`] makes it visible to connection handlers.
/// [`UploadRegistry::remove`] is idempotent so that cleanup racing with an
/// admin cancel never trips over itself.
#[derive(Default)]
pub struct UploadRegistry {
    pool: IdPool,
    uploads: Mutex<HashMap<String, Arc<UploadSession>>>,
}

// ---

impl UploadRegistry {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    // ---

    /// Reserve an ID for a session about to be constructed.
    pub fn allocate_id(&self) -> String {
        self.pool.new_id()
    }

    // ---

    /// Make a constructed session visible under its (already allocated) ID.
    pub fn insert(&self, session: Arc<UploadSession>) {
        let mut uploads = self.uploads.lock().expect("registry lock poisoned");
        uploads.insert(session.id().to_string(), session);
        tracing::debug!(live = uploads.len(), "session registered");
    }

    // ---

    pub fn get(&self, id: &str) -> Option<Arc<UploadSession>> {
        self.uploads
            .lock()
            .expect("registry lock poisoned")
            .get(id)
            .cloned()
    }

    // ---

    /// Drop a session and release its ID. A second remove for the same ID
    /// is a no-op.
    pub fn remove(&self, id: &str) {
        let mut uploads = self.uploads.lock().expect("registry lock poisoned");
        if uploads.remove(id).is_some() {
            let _ = self.pool.release(id);
            tracing::debug!(%id, live = uploads.len(), "session unregistered");
        }
    }

    // ---

    pub fn len(&self) -> usize {
        self.uploads.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    // ---

    #[test]
    fn ids_are_unique_under_contention() {
        let pool = Arc::new(IdPool::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                (0..100).map(|_| pool.new_id()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id handed out");
            }
        }
        assert_eq!(pool.len(), 800);
    }

    // ---

    #[test]
    fn release_unknown_id_is_an_error() {
        let pool = IdPool::new();
        let id = pool.new_id();

        assert!(pool.release(&id).is_ok());
        assert!(matches!(
            pool.release(&id),
            Err(InflowError::IdNotAllocated(_))
        ));
        assert!(pool.release("never-allocated").is_err());
        assert!(pool.is_empty());
    }

    // ---

    #[test]
    fn registry_remove_is_idempotent() {
        let registry = UploadRegistry::new();
        let id = registry.allocate_id();

        // No session was inserted, so remove finds nothing — and must not
        // release the still-reserved ID either.
        registry.remove(&id);
        assert!(pool_has(&registry, &id));

        registry.remove(&id);
        assert!(registry.is_empty());
    }

    fn pool_has(registry: &UploadRegistry, id: &str) -> bool {
        registry
            .pool
            .live
            .lock()
            .unwrap()
            .contains(id)
    }
}
