//! Session-isolated streaming HTTP service (spec §4.9/§6), the Rust
//! counterpart to the original's `chatterlang_serve.py`.

pub mod config;
pub mod form;
pub mod routes;
pub mod session;
pub mod sse;

use crate::server::config::{ServerArgs, ServerConfig};
use crate::server::form::FormConfig;
use crate::server::routes::{router, AppState};
use crate::server::session::{SessionStore, PASS_THROUGH_SCRIPT};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

const TTL_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Load the server-level script template from `--script`, falling back to
/// `--script-source`, falling back to the default pass-through processor
/// (spec §4.9).
fn load_script_source(args: &ServerArgs) -> anyhow::Result<String> {
    if let Some(path) = &args.script {
        return Ok(std::fs::read_to_string(path)?);
    }
    if let Some(source) = &args.script_source {
        return Ok(source.clone());
    }
    Ok(PASS_THROUGH_SCRIPT.to_string())
}

pub async fn serve(args: ServerArgs) -> anyhow::Result<()> {
    let script_source = load_script_source(&args)?;
    let config = ServerConfig::from_env();
    let ttl = Duration::from_secs(config.session_ttl_seconds);

    let state = Arc::new(AppState {
        sessions: SessionStore::new(script_source, ttl),
        config,
        form_config: FormConfig::default(),
        port: args.port,
    });

    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TTL_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sweep_state.sessions.expire_stale();
        }
    });

    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!(port = args.port, "chatterlang session server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
