mod alerts;
mod api;
mod cache;
mod config;
mod context;
mod error;
mod gateway;
mod middleware;
mod models;
mod provider;
mod ratelimit;
mod store;
#[cfg(test)]
mod testing;

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    config::GatewayConfig, gateway::WeatherGateway, middleware::Pipeline,
    provider::openweather::OpenWeatherProvider,
};

const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,reqwest=warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = GatewayConfig::from_env().context("failed to build gateway config")?;
    let bind_addr = cfg.bind_addr;

    let store = store::connect(&cfg.store).await;
    let provider =
        OpenWeatherProvider::new(&cfg.provider).context("failed to build weather provider client")?;

    let gateway = Arc::new(WeatherGateway::new(
        Arc::new(provider),
        store.clone(),
        cfg.cache,
        cfg.alerts,
    ));
    let pipeline = Arc::new(Pipeline::from_config(&cfg, store.clone()));
    let app = api::router(gateway, pipeline);

    let listener = TcpListener::bind(bind_addr)
        .await
        .context("failed to bind listener")?;

    tracing::info!(
        addr = %bind_addr,
        store = store.name(),
        rate_limit = cfg.rate_limit.enabled,
        "weather gateway listening"
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server error")?;

    tracing::info!("weather gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received; draining connections");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()))
        })
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
