//! Key layout for users, claims, and identifier sequences.

use crate::domain::UserId;

use super::ClaimKind;

/// Default namespace placed in front of every key.
pub const DEFAULT_KEY_PREFIX: &str = "user-registry";

/// Builds store keys under a common namespace.
///
/// # Examples
/// ```
/// use user_registry::domain::UserId;
/// use user_registry::outbound::persistence::{ClaimKind, KeySpace};
///
/// let keys = KeySpace::new("app");
/// assert_eq!(keys.user(UserId::new(3)), "app:user:3");
/// assert_eq!(
///     keys.claim(ClaimKind::Email, "ada@example.test"),
///     "app:claim:email:ada@example.test"
/// );
/// assert_eq!(KeySpace::new("").user(UserId::new(3)), "user:3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Key space rooted at `prefix`. An empty prefix yields bare keys.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Namespace in use.
    pub fn prefix(&self) -> &str {
        self.prefix.as_str()
    }

    /// Key of the user record for `id`.
    pub fn user(&self, id: UserId) -> String {
        self.scoped(&format!("user:{id}"))
    }

    /// Key of the claim marker for an already normalised value.
    pub fn claim(&self, kind: ClaimKind, normalized: &str) -> String {
        self.scoped(&format!("claim:{}:{normalized}", kind.segment()))
    }

    /// Common prefix of every claim of `kind`.
    pub fn claims(&self, kind: ClaimKind) -> String {
        self.scoped(&format!("claim:{}:", kind.segment()))
    }

    /// Key of the user identifier sequence.
    pub fn user_sequence(&self) -> String {
        self.scoped("seq:user")
    }

    fn scoped(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{}:{key}", self.prefix)
        }
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}
