use std::net::TcpListener;

use actix_web::web;
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dogpics::config::Config;
use dogpics::core::db::init_demo_data;
use dogpics::core::store::Store;
use dogpics::{run, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    let store = Store::connect(&config.db_url).await?;

    if config.seed_demo_data {
        init_demo_data(&store).await?;
    }

    let address = config.address();
    let listener = TcpListener::bind(&address).with_context(|| format!("failed to bind {}", address))?;
    info!("Serving on port {}", config.port);

    let state = web::Data::new(AppState::new(store.clone(), config));
    run(listener, state)?.await?;

    store.close();
    Ok(())
}
