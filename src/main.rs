mod api;
mod app;
mod catalog;
mod config;
mod db;
mod feedback;
mod metrics;
mod models;
mod selector;
mod srs;
mod weakness;

use std::sync::Arc;

use api::ApiState;
use app::App;
use config::Config;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real environment variables still apply.
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    let bind_addr = config.bind_addr.clone();
    let app = App::new(config).await?;

    let state = ApiState {
        app: Arc::new(Mutex::new(app)),
    };
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log::info!("listening on {}", bind_addr);

    axum::serve(listener, api::app_router(state)).await?;

    Ok(())
}
