//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod key_value_store;
mod user_repository;

#[cfg(test)]
pub use key_value_store::MockKeyValueStore;
pub use key_value_store::{AtomicBatch, KeyValueStore, Mutation, Precondition, StoreError};
#[cfg(test)]
pub use user_repository::MockUserRepository;
pub use user_repository::{UserRepository, UserRepositoryError};
