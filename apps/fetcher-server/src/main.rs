use insights_fetcher_server::{api::app_router, build_state, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    insights_runtime::init_tracing("fetcher");
    let state = build_state(&config);
    let router = app_router(state, &config);
    tracing::info!("Fetcher listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
