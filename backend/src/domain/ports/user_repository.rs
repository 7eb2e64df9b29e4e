//! Port abstraction for user persistence and its error taxonomy.
//!
//! Implementations keep each user and its email and screen-name claims
//! consistent: every operation either commits all affected records together
//! or leaves all of them untouched.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{NewUser, RequestContext, User, UserId, UserValidationError};

use super::StoreError;

/// Failures surfaced by [`UserRepository`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserRepositoryError {
    /// Input fields do not meet the format rules; nothing was written.
    #[error("user validation failed: {0}")]
    ValidationFailed(#[from] UserValidationError),
    /// The email is already claimed by another user.
    #[error("email address is already taken")]
    EmailCannotTake,
    /// The screen name is already claimed by another user.
    #[error("screen name is already taken")]
    ScreenNameCannotTake,
    /// No live user has the requested identifier.
    #[error("no user exists with id {id}")]
    NoSuchEntity { id: UserId },
    /// The store could not complete the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// User persistence with case-insensitive unique email and screen name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Store a new user and claim its email and screen name.
    async fn create(
        &self,
        ctx: &RequestContext,
        user: NewUser,
    ) -> Result<User, UserRepositoryError>;

    /// Fetch a live user.
    async fn get_by_id(&self, ctx: &RequestContext, id: UserId)
    -> Result<User, UserRepositoryError>;

    /// Persist new field values for an existing user, moving claims for any
    /// changed email or screen name.
    async fn update(&self, ctx: &RequestContext, user: &User) -> Result<User, UserRepositoryError>;

    /// Remove a user together with both of its claims.
    async fn delete(&self, ctx: &RequestContext, user: &User) -> Result<(), UserRepositoryError>;

    /// Create the fixed fixture users through the regular create path.
    async fn create_fixture(&self, ctx: &RequestContext) -> Result<Vec<User>, UserRepositoryError>;
}
