use std::sync::Arc;

use crate::router::Client;

/// The contract a live source must satisfy for the router to hand it a new
/// listener (spec.md §3, "Source handle"). The ring-buffer broadcast engine
/// that actually copies bytes from the source to attached listeners is an
/// external collaborator and out of scope here (spec.md §1); this trait is
/// only the seam the router calls through.
pub trait SourceSink: Send + Sync {
    /// The mountpoint path this source is registered under.
    fn mountpoint(&self) -> &str;

    /// Start streaming this source's bytes to a newly admitted, already
    /// greeted client. Called once per admission, after the router has
    /// already accounted for the client in its counters.
    fn attach(&self, client: Arc<Client>);
}
