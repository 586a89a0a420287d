use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use ovpnctl::{
    commands,
    config::Config,
    logging,
    paths::Paths,
    ui::{ColorMode, Ui},
};

#[derive(Parser)]
#[command(name = "ovpnctl")]
#[command(about = "Personal OpenVPN connection manager - tmux/screen sessions, fuzzy profile matching, hooks")]
#[command(version)]
struct Cli {
    /// Use a different config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors: always, auto, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the profile matching QUERY
    Connect {
        /// Profile to connect to: an id like "pln/essdlc", an alias, or a
        /// close-enough guess
        query: String,

        /// Kill conflicting sessions without asking
        #[arg(short, long)]
        force: bool,
    },

    /// Disconnect a profile, or every tracked connection
    Disconnect {
        /// Profile to disconnect; omit to disconnect everything
        query: Option<String>,
    },

    /// Show tracked connections and whether they are still alive
    Status,

    /// List the profiles in the config
    List,

    /// Run diagnostics on the ovpnctl setup
    Doctor,

    /// Write a commented starter config
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Load the config and bring up logging, for the commands that need both.
fn setup(paths: &Paths, verbose: bool) -> Result<Config> {
    paths.ensure_dirs()?;
    let config = commands::load_config(paths)?;
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_deref().unwrap_or("info")
    };
    let log_file = config
        .logging
        .file
        .clone()
        .unwrap_or_else(|| paths.log_file.clone());
    logging::init(level, Some(&log_file))?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut paths = Paths::new()?;
    if let Some(config) = cli.config {
        paths.config_file = config;
    }
    let ui = Ui::new(cli.color, cli.no_color);

    match cli.command {
        Commands::Connect { query, force } => {
            let config = setup(&paths, cli.verbose)?;
            commands::connect(&config, &paths, &query, force, &ui)
        }
        Commands::Disconnect { query } => {
            let config = setup(&paths, cli.verbose)?;
            commands::disconnect(&config, &paths, query.as_deref(), &ui)
        }
        Commands::Status => {
            let config = setup(&paths, cli.verbose)?;
            commands::status(&config, &paths, &ui)
        }
        Commands::List => {
            let config = setup(&paths, cli.verbose)?;
            commands::list(&config, &paths, &ui)
        }
        Commands::Doctor => {
            // Doctor must run even when the config is broken, so it skips the
            // configured level and log file.
            logging::init(if cli.verbose { "debug" } else { "info" }, None)?;
            commands::doctor(&paths, &ui)
        }
        Commands::Init { force } => commands::init(&paths, force, &ui),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "ovpnctl", &mut std::io::stdout());
            Ok(())
        }
    }
}
