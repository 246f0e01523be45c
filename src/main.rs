mod config;
mod context;
mod editor;
mod exec_log;
mod project;
mod runner;
mod session;

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::exec_log::ExecutionLog;
use crate::project::store::ProjectStore;
use crate::runner::sandbox::{PythonProcessEngine, PythonSandbox};
use crate::runner::ExecutionRouter;
use crate::session::{Reply, Session};

fn print_help() {
    println!(
        "\
vertex v{}

A sandboxed multi-file code playground with isolated Python execution.

USAGE:
    vertex [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: config/vertex.toml]

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG          Log level filter for tracing
                      (e.g. debug, vertex=debug,warn)
    VERTEX_USER_ID    Acting user id, when referenced from the config
    VERTEX_USER_ROLE  Acting user role (student/staff/admin), likewise

EXAMPLES:
    vertex                          # uses config/vertex.toml
    vertex /etc/vertex/config.toml  # custom config path
    RUST_LOG=debug vertex           # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --help / --version before anything else
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("vertex v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {}
        }
    }

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vertex=info")),
        )
        .init();

    println!(
        r#"
  __     __         _
  \ \   / /__ _ __ | |_ _____  __
   \ \ / / _ \ '__|| __/ _ \ \/ /
    \ V /  __/ |   | ||  __/>  <
     \_/ \___|_|    \__\___/_/\_\  v{}
"#,
        env!("CARGO_PKG_VERSION")
    );

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/vertex.toml".to_string());

    let config = if std::path::Path::new(&config_path).exists() {
        info!("Loading configuration from {config_path}");
        Config::load(&config_path)?
    } else {
        warn!("No configuration at {config_path}, using defaults");
        Config::default()
    };

    let ctx = config.user_context();
    info!("User: {} ({})", ctx.id, ctx.role.label());
    info!("Storage: {}", config.storage.path.display());
    info!(
        "Sandbox: {} (timeout {}ms)",
        config.sandbox.python_bin, config.sandbox.timeout_ms
    );

    let store = Arc::new(ProjectStore::open(&config.storage.path)?);
    let engine = Arc::new(PythonProcessEngine::new(&config.sandbox.python_bin));
    let sandbox = PythonSandbox::new(engine, config.sandbox.timeout());
    let log = ExecutionLog::open(store.base_path().join("exec_log.json"));
    let router = ExecutionRouter::new(sandbox, log);
    let mut session = Session::new(ctx, store, router, &config)?;

    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => match session.handle_line(&line).await {
                        Reply::Text(text) => println!("{text}"),
                        Reply::Silent => {}
                        Reply::Quit => break,
                    },
                    // stdin closed
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, exiting");
                break;
            }
        }
    }

    Ok(())
}
