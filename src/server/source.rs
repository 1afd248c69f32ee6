use std::sync::Arc;

use mount::{Client, SourceSink};

/// Stands in for the ring-buffer broadcast engine (spec.md §1: "the
/// ring-buffer broadcast engine that copies bytes from a source to its
/// attached listeners" is an external collaborator, out of scope here).
///
/// Registered once per mountpoint named in the sourcetable so the router
/// has something to admit against; it records the attachment and nothing
/// else. A real deployment replaces this with whatever ingests bytes from
/// the base station and fans them out.
pub struct PlaceholderSource {
    mountpoint: String,
}

impl PlaceholderSource {
    pub fn new(mountpoint: String) -> Self {
        Self { mountpoint }
    }
}

impl SourceSink for PlaceholderSource {
    fn mountpoint(&self) -> &str {
        &self.mountpoint
    }

    fn attach(&self, client: Arc<Client>) {
        log::debug!("attached cid={} to placeholder source {}", client.cid, self.mountpoint);
    }
}
