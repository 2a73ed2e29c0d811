//! Registry of in-flight retry sequences, keyed by [`RequestId`].
//!
//! Every call to the transport registers its request for the lifetime of the retry sequence and
//! receives a [`Registration`] guard. [`CancellationRegistry::cancel`] removes the entry and fires
//! its token, which wakes a sequence that is waiting between attempts. Dropping the guard removes
//! the entry without firing it.
//!
//! The mutex is held only while the map is touched; never across an attempt or a wait.

use http::Request;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::warn;
use uuid::Uuid;

/// Identity of a logical request across all of its attempts.
///
/// Attach one to the request's extensions to be able to cancel it later; requests without one
/// get a fresh id that nobody else knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Random (v4) id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Id carried by `req`, inserting a new one if absent.
    pub fn get_or_insert<B>(req: &mut Request<B>) -> Self {
        if let Some(id) = Self::of(req) {
            return id;
        }
        let id = Self::new();
        req.extensions_mut().insert(id);
        id
    }

    /// Id carried by `req`, if any.
    pub fn of<B>(req: &Request<B>) -> Option<Self> {
        req.extensions().get::<Self>().copied()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RequestId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug)]
struct Entry {
    generation: u64,
    token: CancellationToken,
}

/// Thread-safe table from request id to cancellation signal.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    entries: Mutex<HashMap<RequestId, Entry>>,
    generations: AtomicU64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<RequestId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `id` and return the guard owning its cancellation signal.
    ///
    /// If `id` is already in flight the new registration replaces it; the older sequence can no
    /// longer be cancelled through the registry.
    pub fn register(self: &Arc<Self>, id: RequestId) -> Registration {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self.entries().insert(id, Entry { generation, token: token.clone() });
        if previous.is_some() {
            warn!(target: "retrans::registry", request_id = %id, "request id already in flight; last registration wins");
        }
        Registration { registry: Arc::clone(self), id, generation, token }
    }

    /// Fire and remove the signal for `id`. Returns `false` if nothing was registered.
    ///
    /// The signal is only observed between attempts; it never reaches the executor.
    pub fn cancel(&self, id: &RequestId) -> bool {
        let entry = self.entries().remove(id);
        match entry {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `id` without firing it. Returns `false` if nothing was registered.
    pub fn unregister(&self, id: &RequestId) -> bool {
        self.entries().remove(id).is_some()
    }

    /// True if `id` is currently registered.
    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries().contains_key(id)
    }

    /// Number of registered sequences.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn release(&self, id: &RequestId, generation: u64) {
        let mut entries = self.entries();
        if entries.get(id).is_some_and(|e| e.generation == generation) {
            entries.remove(id);
        }
    }
}

/// Guard for one registered sequence; unregisters on drop.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<CancellationRegistry>,
    id: RequestId,
    generation: u64,
    token: CancellationToken,
}

impl Registration {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Resolves once the registry cancels this sequence.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.release(&self.id, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct SharedWriter(Arc<StdMutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for SharedWriter {
        type Writer = SharedGuard;
        fn make_writer(&'a self) -> Self::Writer {
            SharedGuard(self.0.clone())
        }
    }

    struct SharedGuard(Arc<StdMutex<Vec<u8>>>);
    impl std::io::Write for SharedGuard {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn cancel_fires_and_removes() {
        let registry = Arc::new(CancellationRegistry::new());
        let id = RequestId::new();
        let registration = registry.register(id);
        assert!(registry.contains(&id));

        assert!(registry.cancel(&id));
        assert!(registration.is_cancelled());
        assert!(registry.is_empty());
        assert!(!registry.cancel(&id), "second cancel is a no-op");
    }

    #[test]
    fn drop_unregisters_without_firing() {
        let registry = Arc::new(CancellationRegistry::new());
        let id = RequestId::new();
        let registration = registry.register(id);
        let token = registration.token.clone();
        drop(registration);

        assert!(registry.is_empty());
        assert!(!token.is_cancelled());
        assert!(!registry.cancel(&id));
    }

    #[test]
    fn unregister_then_cancel_has_no_effect() {
        let registry = Arc::new(CancellationRegistry::new());
        let id = RequestId::new();
        let registration = registry.register(id);

        assert!(registry.unregister(&id));
        assert!(!registry.cancel(&id));
        assert!(!registration.is_cancelled());
        drop(registration);
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_guard_does_not_remove_newer_registration() {
        let registry = Arc::new(CancellationRegistry::new());
        let id = RequestId::new();
        let first = registry.register(id);
        let second = registry.register(id);

        drop(first);
        assert!(registry.contains(&id));
        assert!(registry.cancel(&id));
        assert!(second.is_cancelled());
    }

    #[test]
    fn concurrent_cancel_and_unregister_fire_at_most_once() {
        for _ in 0..64 {
            let registry = Arc::new(CancellationRegistry::new());
            let id = RequestId::new();
            let registration = registry.register(id);

            let canceller = {
                let registry = registry.clone();
                std::thread::spawn(move || registry.cancel(&id))
            };
            let unregisterer = {
                let registry = registry.clone();
                std::thread::spawn(move || registry.unregister(&id))
            };
            let cancelled = canceller.join().unwrap();
            let unregistered = unregisterer.join().unwrap();

            assert!(cancelled ^ unregistered, "exactly one side wins the race");
            assert_eq!(registration.is_cancelled(), cancelled);
            assert!(registry.is_empty());
        }
    }

    #[test]
    fn request_id_round_trips_through_extensions() {
        let mut req = Request::get("http://localhost/").body(()).unwrap();
        assert!(RequestId::of(&req).is_none());
        let id = RequestId::get_or_insert(&mut req);
        assert_eq!(RequestId::of(&req), Some(id));
        assert_eq!(RequestId::get_or_insert(&mut req), id);
    }

    #[test]
    fn duplicate_registration_warns() {
        let buffer = Arc::new(StdMutex::new(Vec::new()));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
            .with_target(true)
            .without_time()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let registry = Arc::new(CancellationRegistry::new());
        let id = RequestId::new();
        let _first = registry.register(id);
        let _second = registry.register(id);

        let logs = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("last registration wins"));
        assert!(logs.contains("retrans::registry"));
    }
}
