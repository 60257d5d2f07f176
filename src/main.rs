//! # gqlws
//!
//! graphql-ws subscription server binary: loads settings, installs logging and
//! metrics, and serves the demo ticker engine until Ctrl-C.

#![deny(unsafe_code)]

mod ticker;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use gqlws_server::{
    Config, ConnectError, ConnectHook, ConnectionContext, FnConnectHook, GqlWsServer,
};
use gqlws_settings::GqlWsSettings;
use serde_json::{Map, Value, json};

use crate::ticker::Ticker;

/// graphql-ws subscription server.
#[derive(Parser, Debug)]
#[command(name = "gqlws", about = "graphql-ws subscription server")]
struct Cli {
    /// Settings file (default: `$GQLWS_SETTINGS` or `./gqlws.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, `0` for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level filter, e.g. `debug` or `gqlws_server=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Require `connection_init` to carry this `authToken`.
    #[arg(long)]
    auth_token: Option<String>,
}

impl Cli {
    /// Layer command-line flags over loaded settings.
    fn apply(&self, settings: &mut GqlWsSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

/// Build the endpoint configuration for the demo server.
fn build_config(settings: &GqlWsSettings, auth_token: Option<String>) -> Config {
    let config = Config::from_settings(settings).with_subscriber(Ticker);
    match auth_token {
        Some(expected) => config.with_on_connect(auth_hook(expected)),
        None => config,
    }
}

/// Bootstrap hook accepting only `connection_init` payloads whose
/// `authToken` equals `expected`.
fn auth_hook(expected: String) -> impl ConnectHook {
    FnConnectHook(
        move |ctx: ConnectionContext, payload: Map<String, Value>| {
            let authorized =
                payload.get("authToken").and_then(Value::as_str) == Some(expected.as_str());
            async move {
                if authorized {
                    Ok(ctx.with_value("authenticated", json!(true)))
                } else {
                    Err(ConnectError::new("invalid authToken"))
                }
            }
        },
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(gqlws_settings::settings_path);
    let mut settings = gqlws_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    gqlws_server::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let config = build_config(&settings, args.auth_token.clone());
    let mut server = GqlWsServer::new(&settings, config);
    match gqlws_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics disabled"),
    }

    let (addr, handle) = server.listen().await.context("Failed to start server")?;
    tracing::info!(
        url = %format!("ws://{addr}{}", settings.server.path),
        "accepting graphql-ws connections"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(
            vec![handle],
            Some(Duration::from_secs(settings.server.shutdown_timeout_secs)),
        )
        .await;
    Ok(())
}
