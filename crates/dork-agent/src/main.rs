//! # dork-agent
//!
//! dork daemon binary — wires the Relay, Mesh, Pulse, and Session
//! subsystems together and starts the HTTP+SSE server, or runs the
//! `config` subcommand tree against the layered settings store.

#![deny(unsafe_code)]

mod backend;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dork_db::ConnectionConfig;
use dork_mesh::MeshService;
use dork_pulse::{PulseStore, Scheduler};
use dork_relay::RelayCore;
use dork_server::shutdown::ShutdownCoordinator;
use dork_server::{AppState, DorkServer, ServerConfig};
use dork_session::SessionManager;
use dork_settings::SettingsStore;
use std::time::Instant;

use backend::UnimplementedBackend;

/// The dork daemon.
#[derive(Parser, Debug)]
#[command(name = "dork-agent", about = "dork orchestration daemon")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8787")]
    port: u16,

    /// Override `$DORK_HOME` (defaults to `~/.dork`).
    #[arg(long)]
    dork_home: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Top-level subcommands. Bare invocation (no subcommand) starts the server.
#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect or modify the layered settings store.
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommand>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print a single resolved key.
    Get {
        /// Dotted key, e.g. `server.port`.
        key: String,
    },
    /// Set a key in `config.json`.
    Set {
        /// Dotted key.
        key: String,
        /// Raw value, coerced against the key's declared type.
        value: String,
    },
    /// Print every schema key, resolved.
    List,
    /// Clear a key (or the whole file if omitted).
    Reset {
        /// Dotted key to clear. Omit to delete `config.json` entirely.
        key: Option<String>,
    },
    /// Open `config.json` in `$EDITOR`.
    Edit,
    /// Print the resolved `config.json` path.
    Path,
    /// Check every currently-set key against the schema.
    Validate,
}

fn dork_home(cli: &Cli) -> PathBuf {
    cli.dork_home.clone().unwrap_or_else(SettingsStore::resolve_home)
}

/// Runs the `config` subcommand tree. Returns the process exit code.
fn run_config(store: &SettingsStore, command: Option<ConfigCommand>) -> i32 {
    match command {
        None => {
            match store.list() {
                Ok(values) => {
                    for resolved in values {
                        let origin = match resolved.origin {
                            dork_settings::Origin::Default => "(default)",
                            dork_settings::Origin::Config => "(config)",
                            dork_settings::Origin::Env => "(env)",
                        };
                        println!("{} = {} {origin}", resolved.key, resolved.value);
                    }
                    0
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    1
                }
            }
        }
        Some(ConfigCommand::Get { key }) => match store.get(&key) {
            Ok(resolved) => {
                println!("{}", resolved.value);
                0
            }
            Err(e) => {
                eprintln!("error: {e}");
                1
            }
        },
        Some(ConfigCommand::Set { key, value }) => {
            let parsed = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            match store.set(&key, parsed) {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("error: {e}");
                    1
                }
            }
        }
        Some(ConfigCommand::List) => run_config(store, None),
        Some(ConfigCommand::Reset { key }) => match store.reset(key.as_deref()) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("error: {e}");
                1
            }
        },
        Some(ConfigCommand::Edit) => {
            let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_owned());
            let status = std::process::Command::new(editor).arg(store.path()).status();
            match status {
                Ok(status) if status.success() => 0,
                Ok(_) => 1,
                Err(e) => {
                    eprintln!("error: failed to launch editor: {e}");
                    1
                }
            }
        }
        Some(ConfigCommand::Path) => {
            println!("{}", store.path().display());
            0
        }
        Some(ConfigCommand::Validate) => match store.validate() {
            Ok(errors) if errors.is_empty() => 0,
            Ok(errors) => {
                for error in errors {
                    eprintln!("{}: {}", error.key, error.message);
                }
                1
            }
            Err(e) => {
                eprintln!("error: {e}");
                1
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let home = dork_home(&cli);

    if let Some(Command::Config { command }) = cli.command {
        let store = SettingsStore::new(home);
        std::process::exit(run_config(&store, command));
    }

    std::fs::create_dir_all(&home).with_context(|| format!("failed to create {}", home.display()))?;
    let settings = SettingsStore::new(&home);
    let log_level = settings.get("log.level").map(|r| r.value.as_str().unwrap_or("info").to_owned()).unwrap_or_else(|_| "info".to_owned());

    let db_path = home.join("dork.db");
    let log_conn = rusqlite::Connection::open(&db_path).context("failed to open logging db connection")?;
    log_conn
        .execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
        .context("failed to set logging connection pragmas")?;
    let log_handle = dork_core::logging::init_subscriber_with_sqlite(&log_level, log_conn);

    let pool = dork_db::new_file(db_path.to_str().context("db path is not valid UTF-8")?, &ConnectionConfig::default())
        .context("failed to open database pool")?;

    let mesh = Arc::new(MeshService::new(pool.clone()).context("failed to initialize mesh registry")?);
    let mailboxes_root = home.join("mailboxes");
    let relay = Arc::new(
        RelayCore::new(mailboxes_root.to_str().context("mailboxes path is not valid UTF-8")?, pool.clone())
            .context("failed to initialize relay core")?,
    );
    let pulse_store = Arc::new(PulseStore::new(pool.clone()).context("failed to initialize pulse store")?);

    let sessions = Arc::new(SessionManager::new(Arc::new(UnimplementedBackend), home.as_path()));
    let scheduler = Arc::new(Scheduler::new(pulse_store.clone(), sessions.clone()));
    scheduler.start().await.context("failed to start scheduler")?;

    let metrics_handle = Arc::new(
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .context("failed to install prometheus recorder")?,
    );

    let state = AppState {
        sessions,
        mesh,
        relay,
        pulse_store,
        scheduler,
        db_pool: pool,
        boundary_root: home.clone(),
        shutdown: Arc::new(ShutdownCoordinator::new()),
        start_time: Instant::now(),
        metrics_handle,
    };

    let server = DorkServer::new(ServerConfig { host: cli.host, port: cli.port }, state);
    let (addr, handle) = server.listen().await.context("failed to bind server")?;
    tracing::info!(%addr, "dork-agent listening");

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    server.state().shutdown.graceful_shutdown(vec![handle], None).await;

    log_handle.flush();
    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["dork-agent"]);
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, 8787);
        assert!(cli.command.is_none());
    }

    #[test]
    fn config_get_parses() {
        let cli = Cli::parse_from(["dork-agent", "config", "get", "server.port"]);
        assert!(matches!(cli.command, Some(Command::Config { command: Some(ConfigCommand::Get { key }) }) if key == "server.port"));
    }

    #[test]
    fn config_set_parses() {
        let cli = Cli::parse_from(["dork-agent", "config", "set", "server.port", "9090"]);
        assert!(matches!(cli.command, Some(Command::Config { command: Some(ConfigCommand::Set { key, value }) }) if key == "server.port" && value == "9090"));
    }

    #[test]
    fn bare_config_parses_with_no_subcommand() {
        let cli = Cli::parse_from(["dork-agent", "config"]);
        assert!(matches!(cli.command, Some(Command::Config { command: None })));
    }

    #[test]
    fn run_config_list_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        assert_eq!(run_config(&store, None), 0);
    }

    #[test]
    fn run_config_get_unknown_key_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        assert_eq!(run_config(&store, Some(ConfigCommand::Get { key: "nope.nope".to_owned() })), 1);
    }

    #[test]
    fn run_config_set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        assert_eq!(
            run_config(&store, Some(ConfigCommand::Set { key: "server.port".to_owned(), value: "9090".to_owned() })),
            0
        );
        let resolved = store.get("server.port").unwrap();
        assert_eq!(resolved.value, serde_json::Value::from(9090));
    }

    #[test]
    fn run_config_validate_exits_zero_when_clean() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        assert_eq!(run_config(&store, Some(ConfigCommand::Validate)), 0);
    }
}
