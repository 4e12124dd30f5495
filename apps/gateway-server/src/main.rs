use insights_gateway_server::{api::app_router, build_state, config::Config, spawn_store_sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    insights_runtime::init_tracing("gateway");
    let state = build_state(&config)?;
    spawn_store_sweeper(state.clone(), config.sweep_interval);
    let router = app_router(state, &config)?;
    tracing::info!("Gateway listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
