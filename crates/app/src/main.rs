mod auth;
mod category;
mod comment;
mod error;
mod extract;
mod goal;
mod habit;
mod management;
mod place;
mod problem;
mod router;
#[cfg(test)]
mod test_support;
mod telemetry;
mod topic;

use std::net::SocketAddr;

use tracing::{info, warn};

use greencity_core::token::{TokenStore, ACCESS_TOKEN_KEY};
use greencity_storage::Database;
use greencity_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "storage", url = %config.database_url, "database ready");

    let tokens = TokenStore::new();
    match &config.management_access_token {
        Some(token) => tokens.put(ACCESS_TOKEN_KEY, token.clone()),
        None => warn!(
            stage = "management",
            "MANAGEMENT_ACCESS_TOKEN is not set; management requests will be refused"
        ),
    }

    let state = router::AppState::new(metrics, database, tokens, &config.jwt_secret);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
