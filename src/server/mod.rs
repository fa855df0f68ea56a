/// HTTP admin API
/// Serves the same backup actions as the CLI, behind a bearer token

pub mod auth;
pub mod handlers;
pub mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::core::{BackupManager, ScriptGateway};
use crate::utils::WEB_TOKEN_VAR;

/// Shared by every request
pub struct AppState {
    pub manager: BackupManager,
    pub scripts: ScriptGateway,
    pub token: String,
}

pub async fn run(
    manager: BackupManager,
    scripts: ScriptGateway,
    token: Option<String>,
    host: String,
    port: u16,
    enable_cors: bool,
) -> anyhow::Result<()> {
    let token = match token {
        Some(token) => token,
        None => {
            let token = auth::generate_token();
            warn!("{} not set, generated a token for this session", WEB_TOKEN_VAR);
            println!("⚠️  {} not set!", WEB_TOKEN_VAR);
            println!("    Using a generated token for this session: {}", token);
            println!("    To persist, add it to your .env: {}={}", WEB_TOKEN_VAR, token);
            println!();
            token
        }
    };

    let state = Arc::new(AppState {
        manager,
        scripts,
        token,
    });
    let app = create_router(state, enable_cors);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    println!("🚀 store-admin API");
    println!("   🔌 API:  http://{}/api", addr);
    println!("   🔒 Auth: Bearer token required (except /api/health)");
    println!();
    println!("📚 API Endpoints:");
    println!("   GET    /api/health                      - Health check");
    println!("   GET    /api/backups                     - List backups");
    println!("   POST   /api/backups                     - Create a backup");
    println!("   POST   /api/backups/:filename/restore   - Restore a backup");
    println!("   DELETE /api/backups/:filename           - Delete a backup");
    println!("   GET    /api/backups/:filename/download  - Download a backup");
    println!("   GET    /api/scripts                     - List maintenance scripts");
    println!("   POST   /api/scripts/:name               - Run a maintenance script");
    println!();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Admin API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down admin API");
        })
        .await?;

    Ok(())
}
