use std::net::SocketAddr;
use std::sync::Arc;

use handshake::ParseError;
use mount::{AdmissionError, Denial};

use crate::statistics::Statistics;

/// Groups the logging + metrics side effects of each admission outcome in
/// one place (spec.md §7's Error Handling Design table), so the connection
/// handler itself stays a plain state machine.
#[derive(Clone)]
pub struct Observer {
    statistics: Arc<Statistics>,
}

impl Observer {
    pub fn new(statistics: Arc<Statistics>) -> Self {
        Self { statistics }
    }

    pub fn malformed_request(&self, peer: SocketAddr, error: &ParseError) {
        log::debug!("malformed request from {peer}: {error}");
        self.statistics.bad_request();
    }

    pub fn denied(&self, peer: SocketAddr, path: &str, reason: &Denial) {
        log::info!("denied {peer} on {path}: {reason}");
        self.statistics.connection_rejected();
    }

    pub fn admission_rejected(&self, peer: SocketAddr, path: &str, reason: &AdmissionError) {
        match reason {
            // Not an error on the wire (spec.md §7): the caller falls back
            // to the sourcetable instead of a 404, so this isn't a rejected
            // connection.
            AdmissionError::NoSuchMount => log::debug!("{peer} requested unknown mount {path}"),
            AdmissionError::ServerFull => {
                log::warn!("{peer} rejected from {path}: server full");
                self.statistics.connection_rejected();
            }
        }
    }

    pub fn admitted(&self, peer: SocketAddr, path: &str, user: Option<&str>) {
        log::info!("admitted {peer} on {path} as {}", user.unwrap_or("<anonymous>"));
        self.statistics.client_admitted();
    }

    pub fn released(&self, peer: SocketAddr, path: &str) {
        log::debug!("released {peer} from {path}");
        self.statistics.client_released();
    }

    pub fn auth_file_unreadable(&self, error: &std::io::Error) {
        log::warn!("mount authentication file unreadable, retaining previous ACLs: {error}");
    }

    pub fn auth_file_reloaded(&self, user_count: usize) {
        log::info!("mount authentication file reloaded, {user_count} users known");
    }
}
