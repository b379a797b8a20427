use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use log::info;
use tokio::net::TcpListener;

use cordo::api::{AppState, create_router};
use cordo::config::CoordinatorConfig;
use cordo::db::Database;

const APP_NAME: &str = "cordo";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common)?;

    match cli.command {
        Command::Serve(cmd) => serve_main(cli.common, cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "cordo - control plane for AI-agent and deterministic-task runs.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the coordinator HTTP server
    Serve(ServeCommand),
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// HTTP bind address (overrides config)
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,
    /// Session store directory (overrides config)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// Blueprint root directory (overrides config)
    #[arg(long, value_name = "DIR")]
    blueprint_root: Option<PathBuf>,
}

fn init_logging(opts: &CommonOpts) -> Result<()> {
    let level = if opts.trace {
        "trace"
    } else if opts.debug || opts.verbose >= 2 {
        "debug"
    } else if opts.quiet {
        "error"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("{APP_NAME}={level},tower_http={level},info")));

    if opts.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    Ok(())
}

#[tokio::main]
async fn serve_main(common: CommonOpts, cmd: ServeCommand) -> Result<()> {
    let mut config = CoordinatorConfig::load(common.config.as_deref())?;

    // CLI flags win over file and environment.
    if let Some(listen) = cmd.listen {
        config.server.listen = listen;
    }
    if let Some(data_dir) = cmd.data_dir {
        config.store.data_dir = data_dir;
    }
    if let Some(root) = cmd.blueprint_root {
        config.blueprints.root = root;
    }

    let db = Database::open(&config.database_path()).await?;
    let state = AppState::initialize(&db, &config);
    let router = create_router(state);

    let listener = TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    info!(
        "cordo listening on {} (blueprints: {}, store: {})",
        config.server.listen,
        config.blueprints.root.display(),
        config.store.data_dir.display()
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        log::warn!("failed to install ctrl-c handler; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
