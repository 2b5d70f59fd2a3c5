//! sqlite-tui binary entry point
//!
//! Local (standalone) mode: run a command against a database path or a
//! configured catalog, with the invoking user granted administrator rights.
//! Server deployments embed the library behind their transport; the
//! transport itself is not part of this crate.
//!
//! All command output goes to stdout; logs and errors go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sqlite_tui::cli::{CommandContext, Handler};
use sqlite_tui::config::Config;
use sqlite_tui::engine::Manager;
use sqlite_tui::history::Store;
use sqlite_tui::session::SessionRegistry;
use sqlite_tui::User;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Database studio for SQLite
#[derive(Parser)]
#[command(name = "sqlite-tui")]
#[command(about = "Database studio for SQLite")]
#[command(version)]
struct Cli {
    /// Run against a config file instead of a plain path (enables the
    /// history store and access rules)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file, directory, or glob to open (omit with --config)
    #[arg(value_name = "PATH", required_unless_present = "config")]
    path: Option<String>,

    /// Command to run, followed by its arguments
    #[arg(value_name = "COMMAND", trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => Config::load(path).context("failed to load config")?,
        None => Config::for_local_path(cli.path.clone().unwrap_or_default()),
    };

    // The history store is only meaningful with a real config; plain-path
    // runs are throwaway inspections.
    let history = match &cli.config {
        Some(_) => Some(Arc::new(
            Store::open(&config.data_dir).context("failed to open history store")?,
        )),
        None => None,
    };

    let mut manager = Manager::new(&config);
    manager.start().context("failed to start database manager")?;
    let manager = Arc::new(manager);

    let registry = Arc::new(SessionRegistry::new(history.clone(), manager.locks()));

    let mut handler =
        Handler::new(Arc::clone(&manager), history, Some(Arc::clone(&registry)), VERSION);
    if let Some(config_path) = cli.config.clone() {
        let reload_manager = Arc::clone(&manager);
        handler = handler.with_reload_hook(move || {
            let fresh = Config::load(&config_path)?;
            reload_manager.update_resolver(fresh.build_resolver());
            reload_manager.update_sources(fresh.databases.clone());
            Ok(())
        });
    }

    // Local mode always runs as an administrator.
    let session = registry.create(User::local_admin(), None);

    let exit_code = {
        let mut stdout = std::io::stdout();
        let mut stderr = std::io::stderr();

        // With --config there is no database-path positional; the leading
        // free word is already the command.
        let mut args = cli.command.clone();
        if cli.config.is_some() {
            if let Some(word) = cli.path.clone() {
                args.insert(0, word);
            }
        }

        if args.is_empty() {
            let mut ctx = CommandContext::new(
                session.user.clone(),
                Some(session.id.clone()),
                Vec::new(),
                &mut stdout,
                &mut stderr,
            );
            handler.handle("help", &mut ctx);
            ctx.exit_code()
        } else {
            let command = args.remove(0);
            let mut ctx = CommandContext::new(
                session.user.clone(),
                Some(session.id.clone()),
                args,
                &mut stdout,
                &mut stderr,
            );
            handler.handle(&command, &mut ctx);
            ctx.exit_code()
        }
    };

    registry.end(&session.id);

    Ok(ExitCode::from(u8::try_from(exit_code).unwrap_or(1)))
}
