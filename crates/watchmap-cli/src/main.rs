use clap::{ArgAction, Parser, Subcommand};
use commands::{clear, import, rollup, state, sync};
use std::path::PathBuf;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "watchmap")]
#[command(about = "Watchmap - Map media-server library items onto your watchable catalog")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    /// Write logs to this file (rotated daily) instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one mapping pass over the enabled integrations
    #[command(long_about = "Page through every movie and show library of each enabled integration, match discovered items onto catalog watchables, and persist the mapping status with diagnostics. Traversal resumes where the previous run stopped.")]
    Sync {
        /// Only run these integrations (repeatable)
        #[arg(long = "integration", value_name = "NAME")]
        integrations: Vec<String>,

        /// Catalog directory (defaults to the data directory)
        #[arg(long, value_name = "PATH")]
        catalog: Option<PathBuf>,

        /// Use bootstrap budgets even after bootstrap has completed
        #[arg(long, action = ArgAction::SetTrue)]
        force_bootstrap: bool,

        /// Use this config file instead of the default location
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Merge a watchable inventory (JSON) into the catalog
    Import {
        /// Inventory file produced by content sync
        #[arg(long, value_name = "FILE")]
        from: PathBuf,

        /// Catalog directory (defaults to the data directory)
        #[arg(long, value_name = "PATH")]
        catalog: Option<PathBuf>,
    },
    /// Show persisted traversal state
    State {
        /// Only show these integrations (repeatable)
        #[arg(long = "integration", value_name = "NAME")]
        integrations: Vec<String>,
    },
    /// Print rollup diagnostics for a show's episodes
    Rollup {
        /// Catalog id of the show
        #[arg(long, value_name = "ID")]
        show_id: i64,

        /// Child ids listed per status
        #[arg(long, default_value_t = watchmap_core::DEFAULT_ROLLUP_SAMPLE_LIMIT)]
        sample_limit: usize,

        /// Catalog directory (defaults to the data directory)
        #[arg(long, value_name = "PATH")]
        catalog: Option<PathBuf>,
    },
    /// Reset persisted state
    #[command(long_about = "Reset traversal state (library cursors and the bootstrap marker). The next sync starts every library from the beginning using bootstrap budgets.")]
    Clear {
        /// Clear traversal state
        #[arg(long, action = ArgAction::SetTrue)]
        state: bool,

        /// Only clear these integrations (repeatable)
        #[arg(long = "integration", value_name = "NAME")]
        integrations: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    logging::init_logging(cli.verbose, cli.quiet, cli.log_file.clone())
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Sync {
            integrations,
            catalog,
            force_bootstrap,
            config,
        } => sync::run_sync(integrations, catalog, force_bootstrap, config.as_deref(), &output).await,
        Commands::Import { from, catalog } => import::run_import(&from, catalog, &output).await,
        Commands::State { integrations } => state::run_state(integrations, &output).await,
        Commands::Rollup {
            show_id,
            sample_limit,
            catalog,
        } => rollup::run_rollup(show_id, sample_limit, catalog, &output).await,
        Commands::Clear { state, integrations } => clear::run_clear(state, integrations, &output).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_flag_belongs_to_sync() {
        let cli = Cli::try_parse_from(["watchmap", "sync", "--config", "/etc/watchmap.toml"]).unwrap();
        match cli.command {
            Commands::Sync { config, .. } => assert_eq!(config, Some(PathBuf::from("/etc/watchmap.toml"))),
            _ => panic!("expected sync"),
        }

        assert!(Cli::try_parse_from(["watchmap", "state", "--config", "/etc/watchmap.toml"]).is_err());
        assert!(Cli::try_parse_from(["watchmap", "--config", "/etc/watchmap.toml", "sync"]).is_err());
    }
}
