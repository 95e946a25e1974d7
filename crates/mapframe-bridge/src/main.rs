//! MapFrame bridge: entry point.
//!
//! This binary runs the cross-origin bridge behind a WebSocket listener.
//! Hosting pages connect, present their origin in the handshake, and then
//! exchange the same JSON messages they would exchange with a framed bridge
//! over `postMessage`.  The mapping application is simulated by a fixture
//! loaded from TOML, which makes the binary useful for integration testing
//! of hosting pages.
//!
//! # Usage
//!
//! ```text
//! mapframe-bridge [OPTIONS]
//!
//! Options:
//!   --ws-port     <PORT>   WebSocket listener port [default: 24810]
//!   --ws-bind     <ADDR>   Listener bind address [default: 127.0.0.1]
//!   --config      <PATH>   Bridge config (.json object or .toml settings)
//!   --self-origin <ORIGIN> The bridge's own origin, always allowed
//!   --fixture     <PATH>   Simulated mapping application (TOML)
//!   --debug                Force debug mode on
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                | Default     | Description                  |
//! |-------------------------|-------------|------------------------------|
//! | `MAPFRAME_WS_PORT`      | `24810`     | WebSocket listener port      |
//! | `MAPFRAME_WS_BIND`      | `127.0.0.1` | Listener bind address        |
//! | `MAPFRAME_CONFIG`       | (none)      | Config file path             |
//! | `MAPFRAME_SELF_ORIGIN`  | (none)      | Bridge's own origin          |
//! | `MAPFRAME_FIXTURE`      | (none)      | Fixture file path            |
//! | `MAPFRAME_DEBUG`        | `false`     | Force debug mode             |
//!
//! `RUST_LOG` always wins over the debug flag when choosing the log level.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mapframe_bridge::application::Bridge;
use mapframe_bridge::domain::Clock;
use mapframe_bridge::infrastructure::clock::SystemClock;
use mapframe_bridge::infrastructure::config_file::{self, ConfigFile};
use mapframe_bridge::infrastructure::fixture::{FixtureHost, FixtureSpec};
use mapframe_bridge::infrastructure::hub::SessionHub;
use mapframe_bridge::infrastructure::ws_server::handshake_limit;
use mapframe_bridge::infrastructure::{run_bridge, run_server};
use mapframe_core::BridgeConfig;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Cross-origin bridge between a hosting page and an embedded mapping
/// application.
#[derive(Debug, Parser)]
#[command(
    name = "mapframe-bridge",
    about = "Cross-origin message bridge for embedded mapping applications",
    version
)]
struct Cli {
    /// TCP port for the WebSocket server to listen on.
    #[arg(long, default_value_t = 24810, env = "MAPFRAME_WS_PORT")]
    ws_port: u16,

    /// IP address to bind the WebSocket server to.
    ///
    /// Use `0.0.0.0` to accept hosting pages from other machines.
    #[arg(long, default_value = "127.0.0.1", env = "MAPFRAME_WS_BIND")]
    ws_bind: String,

    /// Bridge configuration file.
    ///
    /// A `.json` file is read as the injected configuration object; any other
    /// extension is read as TOML plugin settings.
    #[arg(long, env = "MAPFRAME_CONFIG")]
    config: Option<PathBuf>,

    /// The bridge's own origin.  Always first in the allow-list when the
    /// configuration comes from TOML settings or is absent.
    #[arg(long, env = "MAPFRAME_SELF_ORIGIN")]
    self_origin: Option<String>,

    /// TOML description of the simulated mapping application.
    #[arg(long, env = "MAPFRAME_FIXTURE")]
    fixture: Option<PathBuf>,

    /// Turns debug mode on regardless of the configuration file.
    #[arg(long, env = "MAPFRAME_DEBUG")]
    debug: bool,
}

impl Cli {
    /// Builds the WebSocket bind address from `--ws-bind` and `--ws-port`.
    ///
    /// # Errors
    ///
    /// Returns an error if `--ws-bind` is not a valid IP address.
    fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.ws_bind, self.ws_port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid WebSocket bind address: '{}:{}'",
                    self.ws_bind, self.ws_port
                )
            })
    }

    /// Loads the bridge configuration the CLI points at.
    ///
    /// # Errors
    ///
    /// Returns an error if `--config` names a file that cannot be read or
    /// parsed.
    fn bridge_config(&self) -> anyhow::Result<BridgeConfig> {
        let self_origin = self.self_origin.as_deref();
        let mut config = match &self.config {
            Some(path) => config_file::load(path, self_origin)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ConfigFile::default().into_bridge_config(self_origin),
        };
        if self.debug {
            config.debug = true;
        }
        Ok(config)
    }

    /// Loads the simulated mapping application.
    fn fixture(&self, clock: Arc<dyn Clock>) -> anyhow::Result<FixtureHost> {
        match &self.fixture {
            Some(path) => FixtureHost::load(path, clock)
                .with_context(|| format!("failed to load fixture {}", path.display())),
            None => Ok(FixtureHost::new(FixtureSpec::default(), clock)),
        }
    }
}

/// Log filter used when `RUST_LOG` is not set.
fn default_filter(debug: bool) -> EnvFilter {
    EnvFilter::new(if debug { "debug" } else { "info" })
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the bridge configuration is loaded.
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` overrides the level
///    implied by the debug flag.
/// 3. A Ctrl+C handler is spawned that clears the shared `running` flag.
/// 4. The bridge task starts discovery against the fixture.
/// 5. [`run_server`] accepts hosting-page connections until shutdown.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.bridge_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.debug)),
        )
        .init();

    let bind_addr = cli.bind_addr()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let host = Arc::new(cli.fixture(Arc::clone(&clock))?);

    info!(
        "mapframe bridge v{} starting: ws={bind_addr}, {} allowed origin(s), debug={}",
        config.version,
        config.allowed_origins.len(),
        config.debug
    );

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Bridge task and server loop ────────────────────────────────────────────
    let hub = Arc::new(SessionHub::new());
    let handshake_timeout = handshake_limit(config.timeout_ms);
    let bridge = Bridge::new(config, host, hub.clone(), clock);
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let bridge_task = tokio::spawn(run_bridge(bridge, inbound_rx, Arc::clone(&running)));

    let served = run_server(
        bind_addr,
        handshake_timeout,
        hub,
        inbound_tx,
        Arc::clone(&running),
    )
    .await;

    running.store(false, Ordering::Relaxed);
    bridge_task.await.context("bridge task panicked")?;
    served?;

    info!("mapframe bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_produce_correct_ws_port() {
        // Arrange: parse with no arguments (all defaults apply)
        let cli = Cli::parse_from(["mapframe-bridge"]);

        // Assert
        assert_eq!(cli.ws_port, 24810);
        assert_eq!(cli.ws_bind, "127.0.0.1");
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_ws_port_override() {
        let cli = Cli::parse_from(["mapframe-bridge", "--ws-port", "9999"]);
        assert_eq!(cli.bind_addr().unwrap().port(), 9999);
    }

    #[test]
    fn test_bind_addr_invalid_returns_error() {
        let cli = Cli::parse_from(["mapframe-bridge", "--ws-bind", "not.an.ip"]);
        assert!(cli.bind_addr().is_err());
    }

    #[test]
    fn test_bridge_config_without_file_allows_self_origin() {
        // Arrange
        let cli = Cli::parse_from([
            "mapframe-bridge",
            "--self-origin",
            "https://maps.example.com",
        ]);

        // Act
        let config = cli.bridge_config().unwrap();

        // Assert
        assert_eq!(config.allowed_origins, vec!["https://maps.example.com"]);
        assert!(!config.debug);
    }

    #[test]
    fn test_debug_flag_forces_debug_mode() {
        let cli = Cli::parse_from(["mapframe-bridge", "--debug"]);
        assert!(cli.bridge_config().unwrap().debug);
    }

    #[test]
    fn test_missing_config_file_returns_error() {
        let cli = Cli::parse_from(["mapframe-bridge", "--config", "/nonexistent/mapframe.toml"]);
        assert!(cli.bridge_config().is_err());
    }

    #[test]
    fn test_missing_fixture_file_returns_error() {
        let cli = Cli::parse_from(["mapframe-bridge", "--fixture", "/nonexistent/fixture.toml"]);
        assert!(cli.fixture(Arc::new(SystemClock)).is_err());
    }

    #[test]
    fn test_default_fixture_is_used_without_path() {
        let cli = Cli::parse_from(["mapframe-bridge"]);
        assert!(cli.fixture(Arc::new(SystemClock)).is_ok());
    }
}
