// Keygate — Updates observer
//
// A process registers at most one observer for externally caused slot
// content changes. Registration is an ownership transfer: installing a new
// observer atomically returns the previous one. Callbacks run on the
// session's dispatch thread, asynchronously with respect to every caller
// thread.

use std::sync::{Arc, Mutex};

use crate::model::SlotNumber;

/// Callback contract for slot update notifications.
///
/// Invoked on the dispatch thread; implementations must not assume they run
/// on the thread that registered them, and must not block the dispatch loop
/// for long.
pub trait UpdatesObserver: Send {
    fn on_slot_updated(&self, slot: SlotNumber);
}

/// The process-wide observer registration slot, shared between the provider
/// proxy (which replaces it) and the transport dispatch loop (which fires
/// it).
#[derive(Clone, Default)]
pub struct ObserverCell {
    inner: Arc<Mutex<Option<Box<dyn UpdatesObserver>>>>,
}

impl std::fmt::Debug for ObserverCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverCell")
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl ObserverCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `next` (or none) and hand back whatever was registered
    /// before. Ownership moves; the previous observer is never shared.
    pub fn replace(
        &self,
        next: Option<Box<dyn UpdatesObserver>>,
    ) -> Option<Box<dyn UpdatesObserver>> {
        let mut guard = self.inner.lock().expect("observer cell poisoned");
        std::mem::replace(&mut *guard, next)
    }

    pub fn is_registered(&self) -> bool {
        self.inner.lock().expect("observer cell poisoned").is_some()
    }

    /// Fire the registered observer, if any. The lock is held across the
    /// callback so a concurrent `replace` cannot free the observer mid-call.
    pub fn notify(&self, slot: SlotNumber) {
        let guard = self.inner.lock().expect("observer cell poisoned");
        if let Some(observer) = guard.as_ref() {
            observer.on_slot_updated(slot);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
