//! Key-value backed `UserRepository` implementation.
//!
//! Every write is a single [`AtomicBatch`]: the user record plus the claim
//! markers it touches, each guarded by a precondition that re-checks at
//! commit time what the availability lookups saw beforehand. A writer that
//! loses a race therefore fails deterministically and nothing it queued is
//! applied.

use std::sync::Arc;

use async_trait::async_trait;
use mockable::Clock;
use tracing::{debug, info};

use crate::domain::fixtures::fixture_users;
use crate::domain::ports::{
    AtomicBatch, KeyValueStore, StoreError, UserRepository, UserRepositoryError,
};
use crate::domain::{NewUser, RequestContext, User, UserId};

use super::models::{UserRecord, decode, encode};
use super::{ClaimKind, KeySpace, UniquenessIndex, normalize};

/// `UserRepository` over any [`KeyValueStore`].
pub struct KvUserRepository<S: ?Sized> {
    store: Arc<S>,
    index: UniquenessIndex<S>,
    keys: KeySpace,
    clock: Arc<dyn Clock>,
}

impl<S: ?Sized> Clone for KvUserRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            index: self.index.clone(),
            keys: self.keys.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

/// Claim keys a batch newly takes, used to name the losing dimension when a
/// commit is rejected.
#[derive(Debug, Default)]
struct NewClaims {
    email: Option<String>,
    screen_name: Option<String>,
}

impl NewClaims {
    fn into_error(self, error: StoreError) -> UserRepositoryError {
        if let StoreError::PreconditionFailed { key } = &error {
            if self.email.as_deref() == Some(key.as_str()) {
                return UserRepositoryError::EmailCannotTake;
            }
            if self.screen_name.as_deref() == Some(key.as_str()) {
                return UserRepositoryError::ScreenNameCannotTake;
            }
        }
        UserRepositoryError::Store(error)
    }
}

impl<S> KvUserRepository<S>
where
    S: KeyValueStore + ?Sized,
{
    /// Repository using the default key namespace.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self::with_key_space(store, KeySpace::default(), clock)
    }

    /// Repository using an explicit key namespace.
    pub fn with_key_space(store: Arc<S>, keys: KeySpace, clock: Arc<dyn Clock>) -> Self {
        let index = UniquenessIndex::new(Arc::clone(&store), keys.clone());
        Self {
            store,
            index,
            keys,
            clock,
        }
    }

    /// Claim lookups over the same store and namespace.
    pub fn index(&self) -> &UniquenessIndex<S> {
        &self.index
    }

    /// Key layout in use.
    pub fn key_space(&self) -> &KeySpace {
        &self.keys
    }

    /// Stored bytes and decoded user for `id`.
    async fn load(
        &self,
        ctx: &RequestContext,
        id: UserId,
    ) -> Result<(Vec<u8>, User), UserRepositoryError> {
        let key = self.keys.user(id);
        let bytes = ctx
            .run("get_user", self.store.get(&key))
            .await?
            .ok_or(UserRepositoryError::NoSuchEntity { id })?;
        let user = User::from(decode::<UserRecord>(&bytes)?);
        Ok((bytes, user))
    }

    async fn ensure_available(
        &self,
        ctx: &RequestContext,
        kind: ClaimKind,
        value: &str,
        excluded: Option<UserId>,
    ) -> Result<(), UserRepositoryError> {
        let available = ctx
            .run("check_claim", self.index.is_available(kind, value, excluded))
            .await?;
        if available {
            return Ok(());
        }
        debug!(trace_id = %ctx.trace_id(), claim = %kind, "claim held by another user");
        Err(match kind {
            ClaimKind::Email => UserRepositoryError::EmailCannotTake,
            ClaimKind::ScreenName => UserRepositoryError::ScreenNameCannotTake,
        })
    }

    async fn commit(
        &self,
        ctx: &RequestContext,
        batch: AtomicBatch,
        claims: NewClaims,
    ) -> Result<(), UserRepositoryError> {
        ctx.run("commit", self.store.commit(batch))
            .await
            .map_err(|err| {
                debug!(trace_id = %ctx.trace_id(), error = %err, "user batch rejected");
                claims.into_error(err)
            })
    }
}

#[async_trait]
impl<S> UserRepository for KvUserRepository<S>
where
    S: KeyValueStore + ?Sized,
{
    async fn create(
        &self,
        ctx: &RequestContext,
        user: NewUser,
    ) -> Result<User, UserRepositoryError> {
        user.validate()?;
        self.ensure_available(ctx, ClaimKind::Email, user.email(), None)
            .await?;
        self.ensure_available(ctx, ClaimKind::ScreenName, user.screen_name(), None)
            .await?;

        let sequence = self.keys.user_sequence();
        let id = UserId::new(ctx.run("next_id", self.store.next_id(&sequence)).await?);
        let created = user.into_user(id, self.clock.utc());
        let user_key = self.keys.user(id);

        let mut batch = AtomicBatch::new();
        batch
            .require_absent(user_key.clone())
            .put(user_key, encode(&UserRecord::from(&created))?);
        self.index
            .claim(&mut batch, ClaimKind::Email, created.email(), id)?;
        self.index
            .claim(&mut batch, ClaimKind::ScreenName, created.screen_name(), id)?;
        let claims = NewClaims {
            email: Some(self.index.claim_key(ClaimKind::Email, created.email())),
            screen_name: Some(
                self.index
                    .claim_key(ClaimKind::ScreenName, created.screen_name()),
            ),
        };

        self.commit(ctx, batch, claims).await?;
        info!(trace_id = %ctx.trace_id(), user_id = %id, "user created");
        Ok(created)
    }

    async fn get_by_id(
        &self,
        ctx: &RequestContext,
        id: UserId,
    ) -> Result<User, UserRepositoryError> {
        let (_, user) = self.load(ctx, id).await?;
        Ok(user)
    }

    async fn update(&self, ctx: &RequestContext, user: &User) -> Result<User, UserRepositoryError> {
        user.validate()?;
        let id = user.id();
        let (stored_bytes, stored) = self.load(ctx, id).await?;

        let email_moved = normalize(stored.email()) != normalize(user.email());
        let screen_name_moved =
            normalize(stored.screen_name()) != normalize(user.screen_name());
        if email_moved {
            self.ensure_available(ctx, ClaimKind::Email, user.email(), Some(id))
                .await?;
        }
        if screen_name_moved {
            self.ensure_available(ctx, ClaimKind::ScreenName, user.screen_name(), Some(id))
                .await?;
        }

        let updated = user.revised(stored.created_at(), self.clock.utc());
        let user_key = self.keys.user(id);
        let mut batch = AtomicBatch::new();
        batch
            .require_equals(user_key.clone(), stored_bytes)
            .put(user_key, encode(&UserRecord::from(&updated))?);

        let mut claims = NewClaims::default();
        if email_moved {
            self.index
                .release(&mut batch, ClaimKind::Email, stored.email(), id)?;
            self.index
                .claim(&mut batch, ClaimKind::Email, updated.email(), id)?;
            claims.email = Some(self.index.claim_key(ClaimKind::Email, updated.email()));
        }
        if screen_name_moved {
            self.index
                .release(&mut batch, ClaimKind::ScreenName, stored.screen_name(), id)?;
            self.index
                .claim(&mut batch, ClaimKind::ScreenName, updated.screen_name(), id)?;
            claims.screen_name = Some(
                self.index
                    .claim_key(ClaimKind::ScreenName, updated.screen_name()),
            );
        }

        self.commit(ctx, batch, claims).await?;
        info!(
            trace_id = %ctx.trace_id(),
            user_id = %id,
            email_moved,
            screen_name_moved,
            "user updated"
        );
        Ok(updated)
    }

    async fn delete(&self, ctx: &RequestContext, user: &User) -> Result<(), UserRepositoryError> {
        let id = user.id();
        let (stored_bytes, stored) = self.load(ctx, id).await?;

        let user_key = self.keys.user(id);
        let mut batch = AtomicBatch::new();
        batch
            .require_equals(user_key.clone(), stored_bytes)
            .delete(user_key);
        self.index
            .release(&mut batch, ClaimKind::Email, stored.email(), id)?;
        self.index
            .release(&mut batch, ClaimKind::ScreenName, stored.screen_name(), id)?;

        self.commit(ctx, batch, NewClaims::default()).await?;
        info!(trace_id = %ctx.trace_id(), user_id = %id, "user deleted");
        Ok(())
    }

    async fn create_fixture(&self, ctx: &RequestContext) -> Result<Vec<User>, UserRepositoryError> {
        let mut created = Vec::new();
        for user in fixture_users() {
            created.push(self.create(ctx, user).await?);
        }
        info!(trace_id = %ctx.trace_id(), count = created.len(), "fixture users created");
        Ok(created)
    }
}

#[cfg(test)]
mod tests;
