use murmur_types::UserId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Storage partition for one authenticated user.
///
/// Derived from a hash of the user id so raw identities never appear in
/// the database file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Namespace for a user: `u_` followed by 16 hex chars of SHA-256.
    pub fn for_user(user: &UserId) -> Self {
        let digest = Sha256::digest(user.as_str().as_bytes());
        Self(format!("u_{}", &hex::encode(digest)[..16]))
    }

    /// Namespace used before anyone signs in.
    pub fn anonymous() -> Self {
        Self("anon".to_string())
    }

    /// Returns the namespace string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
