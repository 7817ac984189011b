mod app;
mod auth;
mod error;
mod routes;

use std::net::SocketAddr;

use anyhow::Result as AnyResult;
use chrono::Duration;
use tally_platform::{
    ServiceConfig, TokenSigner, connect_database, run_migrations, verify_schema,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::app::AppState;

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "tally_gateway=info,tower_http=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url, config.max_connections).await?;
    if config.run_migrations {
        run_migrations(&pool).await?;
    }
    verify_schema(&pool).await?;

    let signer = TokenSigner::new(
        config.token_secret.as_bytes(),
        Duration::hours(config.token_ttl_hours),
    );
    let router = app::router(AppState::new(pool, signer));

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
