use std::fmt;

use handshake::Request;

use crate::acl::AclStore;

/// Why `authorize` refused a request. Carries no payload beyond the reason
/// — the caller already holds the `Request` that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    MissingCredentials,
    BadCredentials,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredentials => write!(f, "missing credentials"),
            Self::BadCredentials => write!(f, "bad credentials"),
        }
    }
}

impl std::error::Error for Denial {}

/// C4: decide whether `request` may proceed, consulting `store` under the
/// authentication lock for the whole lookup (spec.md §4.4).
///
/// A mountpoint with no ACL entry is public and always authorized. A
/// protected mountpoint requires credentials whose name is present in the
/// ACL and whose password matches byte-for-byte; on success `request.user`
/// is filled in.
pub fn authorize(store: &AclStore, request: &mut Request) -> Result<(), Denial> {
    let path = request.path.clone();
    let credentials = request.credentials.clone();

    let user = store.with_mounts(|mounts| match mounts.get(&path) {
        None => Ok(None),
        Some(acl) => {
            let credentials = credentials.ok_or(Denial::MissingCredentials)?;

            match acl.users.get(&credentials.name) {
                Some(user) if user.password == credentials.password => {
                    Ok(Some(user.name.clone()))
                }
                _ => Err(Denial::BadCredentials),
            }
        }
    })?;

    request.user = user;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use handshake::Credentials;
    use std::io::Write;

    fn store_with(contents: &str) -> AclStore {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();

        let store = AclStore::new();
        store.reload_from_file(file.path()).unwrap();
        store
    }

    fn request(path: &str, credentials: Option<Credentials>) -> Request {
        let line = format!("GET {path} HTTP/1.0\r\n\r\n");
        let mut req = Request::parse(line.as_bytes()).unwrap();
        req.credentials = credentials;
        req
    }

    #[test]
    fn public_mount_without_acl_is_authorized() {
        let store = AclStore::new();
        let mut req = request("/PUBLIC", None);

        assert!(authorize(&store, &mut req).is_ok());
        assert_eq!(req.user, None);
    }

    #[test]
    fn protected_mount_correct_credentials_is_authorized() {
        let store = store_with("/MOUNT1:alice:secret\n");
        let mut req = request(
            "/MOUNT1",
            Some(Credentials { name: "alice".into(), password: "secret".into() }),
        );

        authorize(&store, &mut req).unwrap();
        assert_eq!(req.user.as_deref(), Some("alice"));
    }

    #[test]
    fn protected_mount_wrong_password_is_denied() {
        let store = store_with("/MOUNT1:alice:secret\n");
        let mut req = request(
            "/MOUNT1",
            Some(Credentials { name: "alice".into(), password: "wrong".into() }),
        );

        assert_eq!(authorize(&store, &mut req), Err(Denial::BadCredentials));
    }

    #[test]
    fn protected_mount_missing_credentials_is_denied() {
        let store = store_with("/MOUNT1:alice:secret\n");
        let mut req = request("/MOUNT1", None);

        assert_eq!(authorize(&store, &mut req), Err(Denial::MissingCredentials));
    }

    #[test]
    fn unknown_user_on_protected_mount_is_denied() {
        let store = store_with("/MOUNT1:alice:secret\n");
        let mut req = request(
            "/MOUNT1",
            Some(Credentials { name: "mallory".into(), password: "whatever".into() }),
        );

        assert_eq!(authorize(&store, &mut req), Err(Denial::BadCredentials));
    }
}
