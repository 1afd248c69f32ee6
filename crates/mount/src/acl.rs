use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::user::User;

/// `(path, users)` — an ordered set of users permitted on one mountpoint.
/// Uniqueness key: `path`. The `users` sub-map shares `Arc<User>` with the
/// global user store rather than owning copies.
#[derive(Debug, Clone, Default)]
pub struct MountAcl {
    pub path: String,
    pub users: BTreeMap<String, Arc<User>>,
}

struct Tables {
    users: BTreeMap<String, Arc<User>>,
    mounts: BTreeMap<String, MountAcl>,
    last_rehash: SystemTime,
}

/// The mount-point authentication database (spec.md C2 + C3 combined).
///
/// Both the user store and the mount ACL store are guarded by a single
/// coarse lock (spec.md §4.4's rationale: reads dominate heavily over the
/// rare reload, so a plain mutex beats a reader-writer lock in practice).
/// A reload replaces both trees in one critical section, so no reader ever
/// observes a half-rebuilt tree (spec.md invariant 4).
pub struct AclStore {
    tables: Mutex<Tables>,
}

impl Default for AclStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AclStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables {
                users: BTreeMap::new(),
                mounts: BTreeMap::new(),
                last_rehash: SystemTime::UNIX_EPOCH,
            }),
        }
    }

    /// Run `f` with the current mount table, holding the authentication
    /// lock for the entire call. This is the primitive the authenticator
    /// (C4) builds on: per spec.md §4.4, the lock must be held across the
    /// whole mount + credential lookup, not released between the two.
    pub fn with_mounts<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&BTreeMap<String, MountAcl>) -> R,
    {
        let tables = self.tables.lock();
        f(&tables.mounts)
    }

    /// Unconditionally reparse `path` and swap in the fresh tables.
    ///
    /// The file is read and parsed entirely before the lock is taken, so a
    /// read failure never disturbs the previously installed tree (spec.md
    /// §7's `AuthFileUnreadable` recovery: "retain previous ACLs").
    pub fn reload_from_file(&self, path: &Path) -> io::Result<()> {
        let text = fs::read_to_string(path)?;
        let (users, mounts) = parse_mount_file(&text);

        let mut tables = self.tables.lock();
        tables.users = users;
        tables.mounts = mounts;
        tables.last_rehash = SystemTime::now();

        Ok(())
    }

    /// Reload only if the file's mtime is newer than the last successful
    /// rehash (spec.md §9 open question (b)). Returns whether a reload
    /// happened.
    pub fn rehash_if_stale(&self, path: &Path) -> io::Result<bool> {
        let mtime = fs::metadata(path)?.modified()?;

        let is_stale = {
            let tables = self.tables.lock();
            mtime > tables.last_rehash
        };

        if is_stale {
            self.reload_from_file(path)?;
        }

        Ok(is_stale)
    }

    /// Number of distinct users currently known, for diagnostics/tests.
    pub fn user_count(&self) -> usize {
        self.tables.lock().users.len()
    }
}

/// Parse the mount authentication file grammar (spec.md §6):
///
/// ```text
/// /<mountpoint>:<user1>:<pw1>,<user2>:<pw2>,...
/// ```
///
/// Blank lines and lines not starting with `/` are ignored. A user name
/// already known from an earlier line in the file is reused by reference
/// rather than redefined (spec.md §3: "Uniqueness key: name... stored
/// once"); a duplicate mountpoint path replaces the earlier definition and
/// logs a warning.
fn parse_mount_file(text: &str) -> (BTreeMap<String, Arc<User>>, BTreeMap<String, MountAcl>) {
    let mut users: BTreeMap<String, Arc<User>> = BTreeMap::new();
    let mut mounts: BTreeMap<String, MountAcl> = BTreeMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || !line.starts_with('/') {
            continue;
        }

        let Some((mount_name, rest)) = line[1..].split_once(':') else {
            log::warn!("syntax error in mount authentication file, line: {line:?}");
            continue;
        };

        let path = format!("/{}", mount_name.trim());
        let mut mount_users: BTreeMap<String, Arc<User>> = BTreeMap::new();

        for pair in rest.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }

            let Some((name, password)) = pair.split_once(':') else {
                log::warn!("syntax error in user entry {pair:?} on mount {path}");
                continue;
            };

            let name = name.trim().to_string();
            let password = password.trim().to_string();

            let user = users
                .entry(name.clone())
                .or_insert_with(|| Arc::new(User::new(name.clone(), password)))
                .clone();

            mount_users.insert(user.name.clone(), user);
        }

        if mounts.contains_key(&path) {
            log::warn!("duplicate mount record {path}, using latter");
        }

        mounts.insert(path.clone(), MountAcl { path, users: mount_users });
    }

    (users, mounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn parses_single_mount_single_user() {
        let (users, mounts) = parse_mount_file("/MOUNT1:alice:secret\n");

        assert_eq!(users.len(), 1);
        assert_eq!(mounts.len(), 1);

        let mount = &mounts["/MOUNT1"];
        assert_eq!(mount.users["alice"].password, "secret");
    }

    #[test]
    fn shares_user_across_mounts() {
        let (users, mounts) =
            parse_mount_file("/MOUNT1:alice:secret\n/MOUNT2:alice:secret,bob:hunter2\n");

        assert_eq!(users.len(), 2);
        assert!(Arc::ptr_eq(&mounts["/MOUNT1"].users["alice"], &mounts["/MOUNT2"].users["alice"]));
    }

    #[test]
    fn blank_and_non_slash_lines_are_ignored() {
        let (users, mounts) = parse_mount_file("\n# comment\nnot-a-mount\n/MOUNT1:alice:secret\n");

        assert_eq!(users.len(), 1);
        assert_eq!(mounts.len(), 1);
    }

    #[test]
    fn duplicate_mount_path_keeps_latter() {
        let (_, mounts) =
            parse_mount_file("/MOUNT1:alice:secret\n/MOUNT1:bob:hunter2\n");

        assert_eq!(mounts.len(), 1);
        assert!(!mounts["/MOUNT1"].users.contains_key("alice"));
        assert!(mounts["/MOUNT1"].users.contains_key("bob"));
    }

    #[test]
    fn reload_swaps_tables_atomically_from_callers_perspective() {
        let file = write_file("/MOUNT1:alice:secret\n");
        let store = AclStore::new();
        store.reload_from_file(file.path()).unwrap();

        store.with_mounts(|mounts| {
            assert!(mounts.contains_key("/MOUNT1"));
        });

        let file2 = write_file("/MOUNT2:bob:hunter2\n");
        store.reload_from_file(file2.path()).unwrap();

        store.with_mounts(|mounts| {
            assert!(!mounts.contains_key("/MOUNT1"));
            assert!(mounts.contains_key("/MOUNT2"));
        });
    }

    #[test]
    fn unreadable_file_preserves_previous_tree() {
        let file = write_file("/MOUNT1:alice:secret\n");
        let store = AclStore::new();
        store.reload_from_file(file.path()).unwrap();

        let missing = file.path().with_extension("missing");
        assert!(store.reload_from_file(&missing).is_err());

        store.with_mounts(|mounts| {
            assert!(mounts.contains_key("/MOUNT1"));
        });
    }
}
