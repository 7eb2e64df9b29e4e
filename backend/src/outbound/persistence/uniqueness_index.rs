//! Case-insensitive uniqueness index over email addresses and screen names.
//!
//! Each claimed value is a first-class store record keyed by the normalised
//! value and holding the owner's identifier. Reads answer availability
//! questions; writes are never issued directly but queued on an
//! [`AtomicBatch`] together with a precondition, so that the check that
//! justified a claim is re-validated inside the same atomic unit that
//! writes it.

use std::fmt;
use std::sync::Arc;

use crate::domain::UserId;
use crate::domain::ports::{AtomicBatch, KeyValueStore, StoreError};

use super::KeySpace;
use super::models::{ClaimRecord, decode, encode};

/// Uniqueness dimension of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimKind {
    /// Email address.
    Email,
    /// Screen name.
    ScreenName,
}

impl ClaimKind {
    /// Key segment naming this dimension.
    pub const fn segment(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::ScreenName => "screen_name",
        }
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Canonical form used as a claim key.
///
/// # Examples
/// ```
/// use user_registry::outbound::persistence::normalize;
///
/// assert_eq!(normalize("FOO@X.test"), "foo@x.test");
/// ```
pub fn normalize(value: &str) -> String {
    value.to_lowercase()
}

/// Claim lookups and claim/release primitives for both dimensions.
pub struct UniquenessIndex<S: ?Sized> {
    store: Arc<S>,
    keys: KeySpace,
}

impl<S: ?Sized> Clone for UniquenessIndex<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keys: self.keys.clone(),
        }
    }
}

impl<S> UniquenessIndex<S>
where
    S: KeyValueStore + ?Sized,
{
    /// Index over `store` using the given key layout.
    pub fn new(store: Arc<S>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Store key of the claim for `value`.
    pub fn claim_key(&self, kind: ClaimKind, value: &str) -> String {
        self.keys.claim(kind, &normalize(value))
    }

    /// Current owner of `value`, if it is claimed.
    ///
    /// # Errors
    ///
    /// Propagates store failures and undecodable claim records.
    pub async fn owner(&self, kind: ClaimKind, value: &str) -> Result<Option<UserId>, StoreError> {
        let key = self.claim_key(kind, value);
        match self.store.get(&key).await? {
            Some(bytes) => Ok(Some(decode::<ClaimRecord>(&bytes)?.owner_id)),
            None => Ok(None),
        }
    }

    /// True when `value` is unclaimed or claimed by `excluded`.
    ///
    /// # Errors
    ///
    /// Propagates store failures and undecodable claim records.
    pub async fn is_available(
        &self,
        kind: ClaimKind,
        value: &str,
        excluded: Option<UserId>,
    ) -> Result<bool, StoreError> {
        Ok(match self.owner(kind, value).await? {
            None => true,
            Some(owner) => Some(owner) == excluded,
        })
    }

    /// [`Self::is_available`] for an email address.
    ///
    /// # Errors
    ///
    /// Propagates store failures and undecodable claim records.
    pub async fn is_email_available(
        &self,
        email: &str,
        excluded: Option<UserId>,
    ) -> Result<bool, StoreError> {
        self.is_available(ClaimKind::Email, email, excluded).await
    }

    /// [`Self::is_available`] for a screen name.
    ///
    /// # Errors
    ///
    /// Propagates store failures and undecodable claim records.
    pub async fn is_screen_name_available(
        &self,
        screen_name: &str,
        excluded: Option<UserId>,
    ) -> Result<bool, StoreError> {
        self.is_available(ClaimKind::ScreenName, screen_name, excluded)
            .await
    }

    /// Queue a claim of `value` for `owner`.
    ///
    /// The batch only commits if nobody holds the claim at commit time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the claim record cannot be
    /// encoded.
    pub fn claim(
        &self,
        batch: &mut AtomicBatch,
        kind: ClaimKind,
        value: &str,
        owner: UserId,
    ) -> Result<(), StoreError> {
        let key = self.claim_key(kind, value);
        let record = encode(&ClaimRecord { owner_id: owner })?;
        batch.require_absent(key.clone()).put(key, record);
        Ok(())
    }

    /// Queue release of `value` held by `owner`.
    ///
    /// The batch only commits if `owner` still holds the claim at commit
    /// time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the claim record cannot be
    /// encoded.
    pub fn release(
        &self,
        batch: &mut AtomicBatch,
        kind: ClaimKind,
        value: &str,
        owner: UserId,
    ) -> Result<(), StoreError> {
        let key = self.claim_key(kind, value);
        let record = encode(&ClaimRecord { owner_id: owner })?;
        batch.require_equals(key.clone(), record).delete(key);
        Ok(())
    }
}
