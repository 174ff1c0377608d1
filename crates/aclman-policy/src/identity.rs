// identity.rs - User and group name lookups.

use std::collections::HashMap;

use crate::error::PolicyError;

/// Resolves identities named by policy files.
pub trait IdentityResolver: Send + Sync {
    /// Name of the primary group of `user`, or `UnknownIdentity`.
    fn primary_group(&self, user: &str) -> Result<String, PolicyError>;

    /// The name `user` is reported under when read back from an object.
    /// Numeric uids map to their account name where one exists.
    fn canonical_user(&self, user: &str) -> Result<String, PolicyError> {
        Ok(user.to_string())
    }

    /// Same as `canonical_user`, for groups.
    fn canonical_group(&self, group: &str) -> Result<String, PolicyError> {
        Ok(group.to_string())
    }
}

/// Fixed user table, for tests and offline evaluation.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentities {
    primary_groups: HashMap<String, String>,
    users_by_uid: HashMap<u32, String>,
    groups_by_gid: HashMap<u32, String>,
}

impl StaticIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>, primary_group: impl Into<String>) -> Self {
        self.primary_groups.insert(user.into(), primary_group.into());
        self
    }

    pub fn with_uid(mut self, uid: u32, user: impl Into<String>) -> Self {
        self.users_by_uid.insert(uid, user.into());
        self
    }

    pub fn with_gid(mut self, gid: u32, group: impl Into<String>) -> Self {
        self.groups_by_gid.insert(gid, group.into());
        self
    }
}

/// Numeric names found in `table` become the mapped name; anything else is
/// kept as written.
fn by_number(table: &HashMap<u32, String>, name: &str) -> String {
    name.parse()
        .ok()
        .and_then(|id| table.get(&id).cloned())
        .unwrap_or_else(|| name.to_string())
}

impl IdentityResolver for StaticIdentities {
    fn primary_group(&self, user: &str) -> Result<String, PolicyError> {
        self.primary_groups
            .get(user)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownIdentity {
                name: user.to_string(),
            })
    }

    fn canonical_user(&self, user: &str) -> Result<String, PolicyError> {
        Ok(by_number(&self.users_by_uid, user))
    }

    fn canonical_group(&self, group: &str) -> Result<String, PolicyError> {
        Ok(by_number(&self.groups_by_gid, group))
    }
}
