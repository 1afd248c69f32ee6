//! Small, allocation-light builders for the fixed-shape wire responses the
//! caster can send. The sourcetable body itself (which needs the parsed
//! sourcetable file) is rendered by `ntrip-caster-mount`; this module only
//! knows the handshake-adjacent framing.

/// Sent immediately before the opaque source byte stream begins.
pub const GREETING: &str = "ICY 200 OK\r\n\r\n";

/// `401 Unauthorized` with a `WWW-Authenticate` realm derived from the
/// requested path, per spec.md's "Auth failure" wire contract.
pub fn unauthorized(path: &str) -> String {
    format!(
        "HTTP/1.0 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"{path}\"\r\n\r\n"
    )
}

/// Plain-text capacity-exceeded notice, sent instead of attaching the
/// listener, followed by connection close.
pub fn server_full() -> String {
    "Server Full\r\n".to_string()
}

/// `401` sent when a non-sourcetable request's `User-Agent` doesn't start
/// with `ntrip` (case-insensitive), matching the original's observable
/// `strncasecmp(user_agent, "ntrip", 5)` check.
pub fn not_ntrip_client(path: &str) -> String {
    format!(
        "HTTP/1.0 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"{path}\"\r\n\r\nNo NTRIP client\r\n"
    )
}

/// True when `user_agent` starts with `ntrip`, case-insensitively.
pub fn is_ntrip_client(user_agent: Option<&str>) -> bool {
    match user_agent.and_then(|agent| agent.get(..5)) {
        Some(prefix) => prefix.eq_ignore_ascii_case("ntrip"),
        None => false,
    }
}
