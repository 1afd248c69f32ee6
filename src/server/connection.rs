use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Result};
use handshake::{response, Request};
use mount::{authorize, html_response, is_browser, ntrip_response, ClientKind, RenderContext};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::Shared;

/// Handshake buffers larger than this are rejected outright rather than
/// grown without bound; no well-formed NTRIP request needs anywhere close
/// to it.
const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Releases an admitted client's slot exactly once when dropped, however
/// the connection's scope is left (clean disconnect, a failed write, or a
/// panic unwind). `Router::release` is itself idempotent, but tying it to
/// `Drop` here is what makes teardown unconditional: spec.md §5 requires a
/// write error mid-greeting to still decrement the global and per-source
/// counters exactly once, not leak them past an early `?` return.
struct AdmissionGuard {
    shared: Arc<Shared>,
    client: Arc<mount::Client>,
    peer: SocketAddr,
    path: String,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.shared.router.release(&self.client);
        self.shared.observer.released(self.peer, &self.path);
    }
}

/// Drive one connection through the admission state machine (spec.md §4.5):
/// `INIT -> PARSED -> AUTHZED -> {SOURCETABLE | LOOKUP -> {CAPS -> ATTACHED
/// | REJECTED}}`.
pub async fn handle(mut socket: TcpStream, peer: SocketAddr, shared: Arc<Shared>) -> Result<()> {
    let buffer = match read_request(&mut socket).await? {
        Some(buffer) => buffer,
        None => return Ok(()),
    };

    let mut request = match Request::parse(&buffer) {
        Ok(request) => request,
        Err(error) => {
            shared.observer.malformed_request(peer, &error);
            return Ok(());
        }
    };

    if let Err(denial) = authorize(&shared.acl, &mut request) {
        shared.observer.denied(peer, &request.path, &denial);
        socket.write_all(response::unauthorized(&request.path).as_bytes()).await?;
        return Ok(());
    }

    if request.path.is_empty() || request.path == "/" {
        return serve_sourcetable(&mut socket, &request, &shared).await;
    }

    if !response::is_ntrip_client(request.headers.get("user-agent")) {
        socket.write_all(response::not_ntrip_client(&request.path).as_bytes()).await?;
        return Ok(());
    }

    let kind = match request.headers.get("referer") {
        Some("RELAY") => ClientKind::PullingClient,
        _ => ClientKind::Listener,
    };

    let client = match shared.router.admit(&request.path, kind, request.user.clone()) {
        Ok(client) => client,
        Err(error) => {
            shared.observer.admission_rejected(peer, &request.path, &error);

            let body = match error {
                mount::AdmissionError::NoSuchMount => {
                    return serve_sourcetable(&mut socket, &request, &shared).await;
                }
                mount::AdmissionError::ServerFull => response::server_full(),
            };

            socket.write_all(body.as_bytes()).await?;
            return Ok(());
        }
    };

    shared.observer.admitted(peer, &request.path, client.user.as_deref());
    let _guard = AdmissionGuard {
        shared: shared.clone(),
        client: client.clone(),
        peer,
        path: request.path.clone(),
    };

    socket.write_all(response::GREETING.as_bytes()).await?;

    // The broadcast engine that streams source bytes to this listener is an
    // external collaborator (spec.md §1); here we just hold the connection
    // open until the peer disconnects. The admission slot is released by
    // `_guard`'s drop, whether we reach here or return early above.
    let mut sink = [0u8; 256];
    loop {
        match socket.read(&mut sink).await {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }

    Ok(())
}

async fn serve_sourcetable(socket: &mut TcpStream, request: &Request, shared: &Shared) -> Result<()> {
    let browser = is_browser(request.headers.get("user-agent"));

    let body = shared.sourcetable.with_current(|table| {
        if browser {
            let ctx = RenderContext {
                server_name: &shared.config.server.server_name,
                port: request.port,
                version: &shared.config.server.version,
                ntrip_version: &shared.config.server.ntrip_version,
                now: &httpdate_now(),
            };
            html_response(table, &ctx)
        } else {
            ntrip_response(table, &format!("NTRIP {}/{}", shared.config.server.server_name, shared.config.server.version))
        }
    });

    socket.write_all(body.as_bytes()).await?;
    Ok(())
}

/// Read a handshake off `socket` up to and including its terminating blank
/// line, or up to `MAX_REQUEST_BYTES`. Returns `None` on a clean EOF before
/// any bytes arrive.
async fn read_request(socket: &mut TcpStream) -> Result<Option<Vec<u8>>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 512];

    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(if buffer.is_empty() { None } else { Some(buffer) });
        }

        buffer.extend_from_slice(&chunk[..n]);

        if buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.windows(2).any(|w| w == b"\n\n") {
            return Ok(Some(buffer));
        }

        if buffer.len() > MAX_REQUEST_BYTES {
            bail!("request exceeds {MAX_REQUEST_BYTES} bytes");
        }
    }
}

/// A minimal, dependency-free timestamp for the HTML sourcetable header
/// (spec.md §4.6's "current time"); this caster doesn't otherwise need
/// calendar-aware formatting, so no date/time crate is pulled in just for
/// this one field.
fn httpdate_now() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    format!("{secs} (unix time)")
}
