//! End-to-end admission scenarios wiring a parsed handshake through
//! authorization and the router, the way a connection handler does.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use handshake::Request;
use mount::{authorize, AclStore, AdmissionError, ClientKind, Denial, Router, SourceSink};

struct FakeSource {
    path: String,
    attached: AtomicUsize,
}

impl SourceSink for FakeSource {
    fn mountpoint(&self) -> &str {
        &self.path
    }

    fn attach(&self, _client: Arc<mount::Client>) {
        self.attached.fetch_add(1, Ordering::Relaxed);
    }
}

fn acl_file(contents: &str) -> (AclStore, tempfile::NamedTempFile) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();

    let store = AclStore::new();
    store.reload_from_file(file.path()).unwrap();
    (store, file)
}

#[test]
fn public_mount_with_no_credentials_is_admitted() {
    let (store, _file) = acl_file("");
    let router = Router::new(10, 10);
    router.register_source(Arc::new(FakeSource { path: "/PUBLIC".into(), attached: AtomicUsize::new(0) }));

    let mut req = Request::parse(b"GET /PUBLIC HTTP/1.0\r\n\r\n").unwrap();
    authorize(&store, &mut req).unwrap();

    let client = router.admit(&req.path, ClientKind::Listener, req.user.clone()).unwrap();
    assert!(client.is_attached());
    assert_eq!(client.user, None);
}

#[test]
fn protected_mount_with_correct_credentials_is_admitted() {
    let (store, _file) = acl_file("/MOUNT1:alice:secret\n");
    let router = Router::new(10, 10);
    router.register_source(Arc::new(FakeSource { path: "/MOUNT1".into(), attached: AtomicUsize::new(0) }));

    let mut req = Request::parse(
        b"GET /MOUNT1 HTTP/1.0\r\nAuthorization: Basic YWxpY2U6c2VjcmV0\r\n\r\n",
    )
    .unwrap();
    authorize(&store, &mut req).unwrap();

    let client = router.admit(&req.path, ClientKind::Listener, req.user.clone()).unwrap();
    assert_eq!(client.user.as_deref(), Some("alice"));
}

#[test]
fn protected_mount_with_wrong_password_is_rejected_before_admission() {
    let (store, _file) = acl_file("/MOUNT1:alice:secret\n");
    let router = Router::new(10, 10);
    router.register_source(Arc::new(FakeSource { path: "/MOUNT1".into(), attached: AtomicUsize::new(0) }));

    // base64("alice:wrong") = YWxpY2U6d3Jvbmc=
    let mut req = Request::parse(
        b"GET /MOUNT1 HTTP/1.0\r\nAuthorization: Basic YWxpY2U6d3Jvbmc=\r\n\r\n",
    )
    .unwrap();

    assert_eq!(authorize(&store, &mut req), Err(Denial::BadCredentials));
    // denial happens before the router is ever consulted.
    assert_eq!(router.num_clients(), 0);
}

#[test]
fn root_path_with_no_registered_source_yields_no_such_mount() {
    let (store, _file) = acl_file("");
    let router = Router::new(10, 10);

    let mut req = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();
    authorize(&store, &mut req).unwrap();

    assert_eq!(
        router.admit(&req.path, ClientKind::Listener, req.user).unwrap_err(),
        AdmissionError::NoSuchMount
    );
}

#[test]
fn browser_user_agent_on_root_path_is_detected_for_sourcetable_rendering() {
    let req = Request::parse(b"GET / HTTP/1.0\r\nUser-Agent: Mozilla/5.0\r\n\r\n").unwrap();
    assert!(mount::is_browser(req.headers.get("user-agent")));
}

#[test]
fn server_full_rejects_admission_once_global_cap_reached() {
    let (store, _file) = acl_file("");
    let router = Router::new(1, 10);
    router.register_source(Arc::new(FakeSource { path: "/A".into(), attached: AtomicUsize::new(0) }));
    router.register_source(Arc::new(FakeSource { path: "/B".into(), attached: AtomicUsize::new(0) }));

    let mut first = Request::parse(b"GET /A HTTP/1.0\r\n\r\n").unwrap();
    authorize(&store, &mut first).unwrap();
    router.admit(&first.path, ClientKind::Listener, first.user).unwrap();

    let mut second = Request::parse(b"GET /B HTTP/1.0\r\n\r\n").unwrap();
    authorize(&store, &mut second).unwrap();
    assert_eq!(
        router.admit(&second.path, ClientKind::Listener, second.user).unwrap_err(),
        AdmissionError::ServerFull
    );
}
