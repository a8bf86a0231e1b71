//! DeskRelay broker server: entry point.
//!
//! This binary runs the rendezvous and signaling broker behind a WebSocket
//! listener.  Hosts connect, announce themselves with `host-ready` and receive
//! a six digit pairing code; clients pair by code or by stored credential;
//! the broker then relays the peer-to-peer negotiation between the two.
//!
//! # Usage
//!
//! ```text
//! deskrelay-server [OPTIONS]
//!
//! Options:
//!   --config     <PATH>   TOML config file [default: deskrelay.toml]
//!   --bind       <IP>     Override server.bind_address
//!   --port       <PORT>   Override server.port
//!   --data-dir   <DIR>    Override storage.data_dir
//!   --durability <LEVEL>  Override storage.durability (strict | best-effort)
//!   --log-level  <LEVEL>  Override logging.level
//! ```
//!
//! # Environment variable overrides
//!
//! Every option can also be set through the environment.  CLI args take
//! precedence when both are present, and both take precedence over the file.
//!
//! | Variable               | Overrides             |
//! |------------------------|-----------------------|
//! | `DESKRELAY_CONFIG`     | config file path      |
//! | `DESKRELAY_BIND`       | `server.bind_address` |
//! | `DESKRELAY_PORT`       | `server.port`         |
//! | `DESKRELAY_DATA_DIR`   | `storage.data_dir`    |
//! | `DESKRELAY_DURABILITY` | `storage.durability`  |
//! | `DESKRELAY_LOG_LEVEL`  | `logging.level`       |
//!
//! `RUST_LOG`, when set, replaces the configured log level entirely.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use deskrelay_broker::application::reaper::spawn_reaper;
use deskrelay_broker::{build_broker, load_config, BrokerConfig, Durability};
use deskrelay_server::domain::ServerConfig;
use deskrelay_server::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// DeskRelay rendezvous and signaling broker.
///
/// The `#[derive(Parser)]` macro from `clap` generates the argument parser
/// automatically from the struct fields and their `#[arg(...)]` attributes.
#[derive(Debug, Parser)]
#[command(
    name = "deskrelay-server",
    about = "Pairing codes and signaling relay for remote-desktop sessions",
    version
)]
struct Cli {
    /// Path of the TOML config file.  A missing file means all defaults.
    #[arg(long, default_value = "deskrelay.toml", env = "DESKRELAY_CONFIG")]
    config: PathBuf,

    /// IP address to bind the WebSocket listener to.
    #[arg(long, env = "DESKRELAY_BIND")]
    bind: Option<String>,

    /// TCP port for the WebSocket listener.
    #[arg(long, env = "DESKRELAY_PORT")]
    port: Option<u16>,

    /// Directory holding the credential store and legacy trust table.
    #[arg(long, env = "DESKRELAY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// What a failed credential write means for the request that caused it.
    #[arg(long, value_enum, env = "DESKRELAY_DURABILITY")]
    durability: Option<DurabilityArg>,

    /// Default log filter (`RUST_LOG` still wins).
    #[arg(long, env = "DESKRELAY_LOG_LEVEL")]
    log_level: Option<String>,
}

/// Command-line spelling of [`Durability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DurabilityArg {
    Strict,
    BestEffort,
}

impl From<DurabilityArg> for Durability {
    fn from(arg: DurabilityArg) -> Self {
        match arg {
            DurabilityArg::Strict => Durability::Strict,
            DurabilityArg::BestEffort => Durability::BestEffort,
        }
    }
}

impl Cli {
    /// Writes every option that was given over the matching config field.
    fn apply(self, config: &mut BrokerConfig) {
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = self.data_dir {
            config.storage.data_dir = dir;
        }
        if let Some(durability) = self.durability {
            config.storage.durability = durability.into();
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the config file is loaded; options given
///    on the command line (or through `DESKRELAY_*`) override the file.
/// 2. `tracing_subscriber` is initialised with the configured level.
/// 3. The broker is built, opening (or creating) its two store files.
/// 4. The mapping reaper is spawned.
/// 5. A Ctrl+C handler is spawned; it clears a shared `AtomicBool`.
/// 6. [`run_server`] accepts connections until that flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone();
    let mut config = load_config(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    cli.apply(&mut config);

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let server_config = ServerConfig::from_section(&config.server)?;
    info!(
        "DeskRelay broker starting: listen={}, data={}",
        server_config.listen_addr,
        config.storage.data_dir.display()
    );

    let broker = build_broker(&config).await?;
    let reaper = spawn_reaper(
        Arc::clone(&broker),
        config.reaper.interval(),
        config.reaper.mapping_ttl(),
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
                error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    let result = run_server(server_config, Arc::clone(&broker), running).await;
    reaper.abort();

    let stats = broker.stats().await;
    info!("DeskRelay broker stopped ({stats:?})");
    result
}

// ── Tests ─────────────────────────────────────────────────────────────────────
