use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use keygate_api::app::{self, services};
use keygate_api::config::AppConfig;

const REFRESH_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    keygate_observability::init();

    let config = AppConfig::from_env()?;

    let stores = match (&config.database_url, config.use_persistent_stores) {
        (Some(url), true) => services::Stores::postgres(url).await?,
        _ => {
            tracing::info!("using in-memory stores");
            services::Stores::in_memory()
        }
    };

    let services = Arc::new(services::build_services(&config, stores).await?);
    services::spawn_refresh_token_sweeper(services.clone(), REFRESH_SWEEP_INTERVAL);

    let app = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
