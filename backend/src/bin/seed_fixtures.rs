//! Bootstrap binary: connects the configured store and seeds the fixture
//! users when `USER_REGISTRY_SEED_FIXTURES` is enabled.

use std::env;
use std::sync::Arc;

use color_eyre::eyre::{Context, Report, Result, eyre};
use mockable::DefaultClock;
use ortho_config::OrthoConfig;
use tokio::runtime::Builder;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use user_registry::startup::{
    RegistrySettings, build_repository, connect_store, request_context, seed_fixtures_on_startup,
};

fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = RegistrySettings::load_from_iter(env::args_os())
        .map_err(|err| eyre!("failed to load registry settings: {err}"))?;

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("failed to build seeding runtime")?;

    runtime.block_on(async move {
        let store = connect_store(&settings)
            .await
            .wrap_err("failed to open the key-value store")?;
        let repository = build_repository(&settings, store, Arc::new(DefaultClock));
        let ctx = request_context(&settings);
        match seed_fixtures_on_startup(&settings, &repository, &ctx)
            .await
            .wrap_err("fixture seeding failed")?
        {
            Some(users) => {
                for user in &users {
                    info!(trace_id = %ctx.trace_id(), user_id = %user.id(), "fixture user ready");
                }
            }
            None => info!("nothing to seed"),
        }
        Ok::<(), Report>(())
    })
}
