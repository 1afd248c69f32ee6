/// A single `(name, password)` credential pair. Uniqueness key: `name`.
///
/// Owned by the user store; mount ACLs hold `Arc<User>` references into the
/// same store rather than copies, so a user belonging to several mounts is
/// stored exactly once (spec.md §3, "User record").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub password: String,
}

impl User {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }
}
