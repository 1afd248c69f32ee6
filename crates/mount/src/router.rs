use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU64, AtomicUsize, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::source::SourceSink;

/// How a newly admitted connection identifies itself (spec.md §3, §4.5).
/// `Unknown` is never produced by the router itself; it exists for
/// completeness of the type, matching the original's four-variant
/// `client_types` table (spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Listener,
    PullingClient,
    Unknown,
}

/// Why admission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    /// No source is registered under the requested path. Per spec.md
    /// §4.5, this is not an error on the wire — the caller responds with
    /// the sourcetable instead of a 404.
    NoSuchMount,
    /// The global or per-source listener cap would be exceeded.
    ServerFull,
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchMount => write!(f, "no such mount"),
            Self::ServerFull => write!(f, "server full"),
        }
    }
}

impl std::error::Error for AdmissionError {}

/// A client record, created on admission (spec.md §3).
///
/// `virgin` transitions `-1 -> 1` exactly when the greeting has been sent;
/// a source's advertised `num_clients` only counts clients whose `virgin`
/// has reached `1` (spec.md invariant 1). `offset`/`bytes`/`errors` are
/// bookkeeping for the (out of scope) broadcast engine to update; the
/// router itself never touches them after admission.
pub struct Client {
    pub cid: u64,
    pub kind: ClientKind,
    pub mountpoint: String,
    pub user: Option<String>,
    alive: AtomicBool,
    virgin: AtomicI8,
    pub offset: AtomicUsize,
    pub bytes: AtomicU64,
    pub errors: AtomicU64,
    released: AtomicBool,
}

impl Client {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// True once the greeting has been sent and this client counts toward
    /// its source's `num_clients`.
    pub fn is_attached(&self) -> bool {
        self.virgin.load(Ordering::Acquire) == 1
    }
}

struct SourceEntry {
    num_clients: AtomicUsize,
    sink: Arc<dyn SourceSink>,
}

/// C5: the admission router.
///
/// Lock model is the simplified one spec.md §9's design notes explicitly
/// sanction: a single routing lock serializes mount lookup, per-source cap
/// check, and both counter increments as one critical section (closing the
/// narrow race the original's split double/source/misc locking left open —
/// see DESIGN.md), plus `AtomicUsize` for the monotonic counters so
/// unrelated readers (statistics) don't need the lock at all.
pub struct Router {
    routing: Mutex<AHashMap<String, SourceEntry>>,
    cid_seq: AtomicU64,
    num_clients: AtomicUsize,
    max_clients: usize,
    max_clients_per_source: usize,
}

impl Router {
    pub fn new(max_clients: usize, max_clients_per_source: usize) -> Self {
        Self {
            routing: Mutex::new(AHashMap::new()),
            cid_seq: AtomicU64::new(0),
            num_clients: AtomicUsize::new(0),
            max_clients,
            max_clients_per_source,
        }
    }

    /// Register a live source under its mountpoint. Replaces any previous
    /// registration for the same path.
    pub fn register_source(&self, sink: Arc<dyn SourceSink>) {
        let mountpoint = sink.mountpoint().to_string();
        let mut routing = self.routing.lock();
        routing.insert(mountpoint, SourceEntry { num_clients: AtomicUsize::new(0), sink });
    }

    pub fn remove_source(&self, mountpoint: &str) {
        self.routing.lock().remove(mountpoint);
    }

    /// True if some live source is registered at exactly this path
    /// (spec.md §4.5: "exact case-sensitive match on the whole path; no
    /// prefix, glob, or trailing-slash normalization").
    pub fn has_mount(&self, path: &str) -> bool {
        self.routing.lock().contains_key(path)
    }

    pub fn num_clients(&self) -> usize {
        self.num_clients.load(Ordering::Acquire)
    }

    /// LOOKUP -> CAPS -> ATTACHED, spec.md §4.5. Exact-path match only.
    ///
    /// On success the client is registered, both counters are incremented,
    /// the greeting is considered sent (`virgin` is set to `1`), and the
    /// source's `attach` hook is invoked before the lock is released, so a
    /// concurrent admission on the same source never observes a torn
    /// count.
    pub fn admit(&self, path: &str, kind: ClientKind, user: Option<String>) -> Result<Arc<Client>, AdmissionError> {
        let routing = self.routing.lock();
        let entry = routing.get(path).ok_or(AdmissionError::NoSuchMount)?;

        let current_total = self.num_clients.load(Ordering::Acquire);
        let current_source = entry.num_clients.load(Ordering::Acquire);

        if current_total >= self.max_clients || current_source >= self.max_clients_per_source {
            return Err(AdmissionError::ServerFull);
        }

        entry.num_clients.fetch_add(1, Ordering::AcqRel);
        self.num_clients.fetch_add(1, Ordering::AcqRel);

        let client = Arc::new(Client {
            cid: self.cid_seq.fetch_add(1, Ordering::Relaxed),
            kind,
            mountpoint: path.to_string(),
            user,
            alive: AtomicBool::new(true),
            virgin: AtomicI8::new(1),
            offset: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            released: AtomicBool::new(false),
        });

        entry.sink.attach(client.clone());

        Ok(client)
    }

    /// Release a client's slot exactly once, regardless of how many times
    /// this is called (spec.md §5: "decrementing the global and per-source
    /// counters exactly once" even on a terminal I/O error mid-teardown).
    pub fn release(&self, client: &Client) {
        if client.released.swap(true, Ordering::AcqRel) {
            return;
        }

        client.mark_dead();

        let routing = self.routing.lock();
        if let Some(entry) = routing.get(&client.mountpoint) {
            entry.num_clients.fetch_sub(1, Ordering::AcqRel);
        }

        self.num_clients.fetch_sub(1, Ordering::AcqRel);
    }
}
