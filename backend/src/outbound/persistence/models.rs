//! Stored record formats.
//!
//! These types are implementation details of the persistence layer and never
//! leave it. Records are JSON so that any key-value backend can hold them and
//! so that byte-for-byte comparison in batch preconditions is stable for a
//! given record.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::ports::StoreError;
use crate::domain::{User, UserId};

/// Stored form of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub screen_name: String,
    pub age: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserRecord {
    fn from(user: &User) -> Self {
        Self {
            id: user.id(),
            email: user.email().to_owned(),
            screen_name: user.screen_name().to_owned(),
            age: user.age(),
            created_at: user.created_at(),
            updated_at: user.updated_at(),
        }
    }
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        let UserRecord {
            id,
            email,
            screen_name,
            age,
            created_at,
            updated_at,
        } = record;
        User::new(id, email, screen_name, age, created_at, updated_at)
    }
}

/// Stored form of a claim marker: only the owning identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClaimRecord {
    pub owner_id: UserId,
}

pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(record).map_err(|err| StoreError::serialization(err.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|err| StoreError::serialization(err.to_string()))
}
