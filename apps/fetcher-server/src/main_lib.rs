use std::sync::Arc;

use insights_fetcher::FetcherService;

use crate::config::Config;

pub struct AppState {
    pub service: FetcherService,
}

pub fn build_state(config: &Config) -> Arc<AppState> {
    tracing::info!(
        "Upstream {} (allowed hosts: {})",
        config.base_url,
        config.allowed_hosts.join(", ")
    );
    build_state_with_service(FetcherService::with_defaults(
        config.upstream(),
        config.url_guard(),
    ))
}

pub fn build_state_with_service(service: FetcherService) -> Arc<AppState> {
    Arc::new(AppState { service })
}
