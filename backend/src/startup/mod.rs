//! Startup wiring for store selection and fixture seeding.

mod config;
mod seeding;

pub use config::RegistrySettings;
pub use seeding::{
    StartupSeedingError, build_repository, connect_store, request_context,
    seed_fixtures_on_startup,
};
