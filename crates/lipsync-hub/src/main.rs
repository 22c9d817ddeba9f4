// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `lipsync-hub` daemon: serves the command hub on a Unix socket.

use anyhow::{Context, Result};
use clap::Parser;
use lipsync_app_core::config::ConfigService;
use lipsync_config_fs::FsConfigStore;
use lipsync_hub::{bind_exclusive, serve, Hub, HubPrefs, HUB_PREFS_KEY};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Lip-sync command hub.
#[derive(Debug, Parser)]
#[command(name = "lipsync-hub", version, about)]
struct Args {
    /// Socket path (overrides the saved preference).
    #[arg(long)]
    socket: Option<PathBuf>,
    /// Packets buffered per client before it is detached.
    #[arg(long)]
    outbox_capacity: Option<usize>,
}

fn load_prefs() -> HubPrefs {
    let config = match FsConfigStore::new() {
        Ok(store) => ConfigService::new(store),
        Err(err) => {
            warn!(%err, "config directory unavailable; using defaults");
            return HubPrefs::default();
        }
    };
    let (prefs, err) = config.load_or_default::<HubPrefs>(HUB_PREFS_KEY);
    if let Some(err) = err {
        warn!(%err, "could not load hub prefs; using defaults");
    }
    prefs
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let prefs = load_prefs();
    let socket_path = args
        .socket
        .unwrap_or_else(|| PathBuf::from(&prefs.socket_path));
    let capacity = args.outbox_capacity.unwrap_or(prefs.outbox_capacity);

    let listener = bind_exclusive(&socket_path)
        .await
        .with_context(|| format!("binding {}", socket_path.display()))?;
    let hub = Arc::new(Hub::new());

    let outcome = tokio::select! {
        res = serve(listener, Arc::clone(&hub), capacity) => res.context("accept loop failed"),
        res = tokio::signal::ctrl_c() => {
            info!("shutting down");
            res.context("waiting for ctrl-c")
        }
    };

    if let Err(err) = std::fs::remove_file(&socket_path) {
        warn!(%err, path = %socket_path.display(), "could not remove socket");
    }
    outcome
}
