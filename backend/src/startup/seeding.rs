//! Startup wiring: store selection, repository construction, and fixture
//! seeding.

use std::sync::Arc;

use mockable::Clock;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::ports::{KeyValueStore, StoreError, UserRepository, UserRepositoryError};
use crate::domain::{RequestContext, User};
use crate::outbound::kv::{MemoryStore, RedisPool, RedisPoolConfig, RedisStore};
use crate::outbound::persistence::{KeySpace, KvUserRepository};

use super::config::RegistrySettings;

/// Errors returned while preparing the registry at startup.
#[derive(Debug, Error)]
pub enum StartupSeedingError {
    /// The configured store could not be reached.
    #[error("store connection failed: {0}")]
    Store(#[from] StoreError),
    /// Fixture creation failed.
    #[error("fixture seeding failed: {0}")]
    Seeding(#[from] UserRepositoryError),
}

/// Open the store the settings select.
///
/// # Errors
///
/// Returns [`StartupSeedingError::Store`] if the Redis pool cannot be built.
pub async fn connect_store(
    settings: &RegistrySettings,
) -> Result<Arc<dyn KeyValueStore>, StartupSeedingError> {
    let Some(url) = settings.redis_url() else {
        warn!("USER_REGISTRY_REDIS_URL is not set; using the in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    };
    let pool = RedisPool::new(RedisPoolConfig::new(url)).await?;
    info!(key_prefix = settings.key_prefix(), "connected to redis store");
    Ok(Arc::new(RedisStore::new(pool)))
}

/// Repository over `store` using the configured key prefix.
pub fn build_repository(
    settings: &RegistrySettings,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
) -> KvUserRepository<dyn KeyValueStore> {
    KvUserRepository::with_key_space(store, KeySpace::new(settings.key_prefix()), clock)
}

/// Fresh request context carrying the configured deadline.
pub fn request_context(settings: &RegistrySettings) -> RequestContext {
    let ctx = RequestContext::background();
    match settings.operation_timeout() {
        Some(timeout) => ctx.with_timeout(timeout),
        None => ctx,
    }
}

/// Create the fixture users on startup when enabled.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use mockable::DefaultClock;
/// use user_registry::startup::{
///     RegistrySettings, build_repository, connect_store, request_context,
///     seed_fixtures_on_startup,
/// };
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = RegistrySettings {
///     redis_url: None,
///     key_prefix: None,
///     operation_timeout_ms: None,
///     seed_fixtures: false,
/// };
/// let store = connect_store(&settings).await?;
/// let repository = build_repository(&settings, store, Arc::new(DefaultClock));
/// let ctx = request_context(&settings);
/// let seeded = seed_fixtures_on_startup(&settings, &repository, &ctx).await?;
/// assert!(seeded.is_none());
/// # Ok(())
/// # }
/// ```
pub async fn seed_fixtures_on_startup<R>(
    settings: &RegistrySettings,
    repository: &R,
    ctx: &RequestContext,
) -> Result<Option<Vec<User>>, StartupSeedingError>
where
    R: UserRepository + ?Sized,
{
    if !settings.seed_fixtures {
        info!(reason = "disabled", "fixture seeding skipped");
        return Ok(None);
    }

    let users = repository.create_fixture(ctx).await?;
    info!(
        trace_id = %ctx.trace_id(),
        user_count = users.len(),
        "fixture seeding applied"
    );
    Ok(Some(users))
}
