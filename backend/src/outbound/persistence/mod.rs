//! User persistence over a key-value store.
//!
//! # Architecture
//!
//! - **Claims as records**: uniqueness of email and screen name is kept by
//!   one marker record per normalised value (`uniqueness_index.rs`), not by
//!   any store-specific constraint.
//! - **One batch per operation**: the repository (`kv_user_repository.rs`)
//!   queues the user record and every claim it touches on a single
//!   `AtomicBatch`, with preconditions that re-validate availability at
//!   commit time.
//! - **Internal records**: stored formats (`models.rs`) never leave this
//!   module.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use mockable::DefaultClock;
//! use user_registry::domain::ports::UserRepository;
//! use user_registry::domain::{NewUser, RequestContext};
//! use user_registry::outbound::kv::MemoryStore;
//! use user_registry::outbound::persistence::KvUserRepository;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let repo = KvUserRepository::new(Arc::new(MemoryStore::new()), Arc::new(DefaultClock));
//! let ctx = RequestContext::background();
//! let user = repo
//!     .create(&ctx, NewUser::new("ada@example.test", "ada", 36))
//!     .await
//!     .unwrap();
//! assert_eq!(repo.get_by_id(&ctx, user.id()).await.unwrap(), user);
//! # });
//! ```

mod key_space;
mod kv_user_repository;
mod models;
mod uniqueness_index;

pub use key_space::{DEFAULT_KEY_PREFIX, KeySpace};
pub use kv_user_repository::KvUserRepository;
pub use uniqueness_index::{ClaimKind, UniquenessIndex, normalize};
