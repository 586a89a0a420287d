//! High-level command orchestration for the CLI.
//!
//! This module contains the handler functions for each CLI command
//! (`connect`, `status`, etc.). It serves as the coordination layer,
//! interacting with:
//! - `crate::resolve` for turning free-form queries into profiles.
//! - `crate::session` for the connect/disconnect lifecycle.
//! - `crate::status` for cross-checking the state file against reality.
//! - `crate::ui` for user interaction (output, prompts).
//!
//! Each function here corresponds to a subcommand in `main.rs`. Errors cross
//! into `anyhow` at this layer so every failure reaches the user with an
//! actionable message, usually with a `Hint:` line.

use anstyle::AnsiColor;
use anyhow::{Context, Result, bail};
use comfy_table::Cell;
use std::io::IsTerminal;
use tracing::debug;

use crate::config::{self, Config, MatcherConfig, Profile};
use crate::doctor::run_doctor;
use crate::error::Error;
use crate::mux::{self, Multiplexer};
use crate::paths::Paths;
use crate::resolve::Resolver;
use crate::session;
use crate::state::LockedState;
use crate::status::{self, SessionState};
use crate::ui::Ui;

/// Load the config file, translating a missing file into setup guidance.
pub fn load_config(paths: &Paths) -> Result<Config> {
    match Config::load(&paths.config_file) {
        Ok(config) => Ok(config),
        Err(Error::ConfigNotFound(path)) => bail!(
            "No config file at {}.\nHint: Run 'ovpnctl init' to create a starter config.",
            path.display()
        ),
        Err(e) => Err(e.into()),
    }
}

/// Resolve `query` against the profile catalog, turning resolution failures
/// into actionable CLI errors.
fn resolve_query<'a>(
    profiles: &'a [Profile],
    matcher: &MatcherConfig,
    query: &str,
) -> Result<&'a Profile> {
    match Resolver::new(profiles, matcher).resolve(query) {
        Ok(profile) => Ok(profile),
        Err(Error::NoMatch { query, suggestions }) if !suggestions.is_empty() => {
            bail!(
                "No profile matches '{}'.\nDid you mean: {}?",
                query,
                suggestions.join(", ")
            );
        }
        Err(Error::NoMatch { query, .. }) => {
            bail!(
                "No profile matches '{}'.\nHint: Use 'ovpnctl list' to see available profiles.",
                query
            );
        }
        Err(Error::AmbiguousMatch { query, candidates }) => {
            bail!(
                "'{}' matches multiple profiles: {}\nHint: Be more specific, e.g. include the location.",
                query,
                candidates.join(", ")
            );
        }
        Err(e) => Err(e.into()),
    }
}

/// Connect to the profile matching `query`.
pub fn connect(config: &Config, paths: &Paths, query: &str, force: bool, ui: &Ui) -> Result<()> {
    paths.ensure_dirs()?;

    let profiles = config.profiles();
    let profile = resolve_query(&profiles, &config.matcher, query)?;
    let mux = mux::for_backend(config.session.backend);

    match connect_once(config, paths, mux.as_ref(), profile, force, ui) {
        Ok(()) => Ok(()),
        Err(err @ (Error::AlreadyConnected(_) | Error::LocationBusy { .. })) if !force => {
            if !std::io::stdin().is_terminal() {
                return Err(err.into());
            }
            ui.warn(err.to_string());
            let confirm = inquire::Confirm::new("Kill the existing session(s) and reconnect?")
                .with_default(false)
                .with_help_message("This disconnects whatever is holding the session first")
                .prompt()
                .context("Confirmation cancelled")?;
            if !confirm {
                ui.warn("Reconnect cancelled.");
                return Ok(());
            }
            connect_once(config, paths, mux.as_ref(), profile, true, ui)?;
            Ok(())
        }
        Err(Error::BackendMismatch { profile, record, configured }) => bail!(
            "'{}' is tracked under {}, but the configured backend is {}.\nHint: Set [session] backend = \"{}\" to manage it, or clean it up by hand.",
            profile,
            record,
            configured,
            record
        ),
        Err(e) => Err(e.into()),
    }
}

/// One connect attempt behind a spinner. Failure paths clear the spinner and
/// hand the typed error back so `connect` can decide what to do with it.
fn connect_once(
    config: &Config,
    paths: &Paths,
    mux: &dyn Multiplexer,
    profile: &Profile,
    force: bool,
    ui: &Ui,
) -> Result<(), Error> {
    let spinner = ui.spinner(format!("Connecting to '{}'...", profile.id));
    match session::connect(config, &paths.state_file, mux, profile, force) {
        Ok(()) => {
            ui.spinner_finish_ok(&spinner, format!("Connected to '{}'", profile.id));
            Ok(())
        }
        Err(e) => {
            spinner.finish_and_clear();
            Err(e)
        }
    }
}

/// Disconnect from the profile matching `query`, or from everything when no
/// query is given.
pub fn disconnect(config: &Config, paths: &Paths, query: Option<&str>, ui: &Ui) -> Result<()> {
    paths.ensure_dirs()?;
    let mux = mux::for_backend(config.session.backend);

    let Some(query) = query else {
        let disconnected = session::disconnect_all(config, &paths.state_file, mux.as_ref())?;
        if disconnected.is_empty() {
            ui.warn("No active VPN connections.");
        } else {
            for profile in &disconnected {
                ui.ok(format!("Disconnected from '{}'", profile));
            }
        }
        return Ok(());
    };

    let profiles = config.profiles();
    let profile = resolve_query(&profiles, &config.matcher, query)?;

    let spinner = ui.spinner(format!("Disconnecting from '{}'...", profile.id));
    match session::disconnect(config, &paths.state_file, mux.as_ref(), profile) {
        Ok(()) => {
            ui.spinner_finish_ok(&spinner, format!("Disconnected from '{}'", profile.id));
            Ok(())
        }
        Err(Error::NotConnected(id)) => {
            spinner.finish_and_clear();
            bail!(
                "Not connected to '{}'.\nHint: Use 'ovpnctl status' to see active connections.",
                id
            );
        }
        Err(Error::BackendMismatch { profile, record, configured }) => {
            spinner.finish_and_clear();
            bail!(
                "'{}' is tracked under {}, but the configured backend is {}.\nHint: Set [session] backend = \"{}\" to manage it, or clean it up by hand.",
                profile,
                record,
                configured,
                record
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            Err(e.into())
        }
    }
}

/// Show tracked connections and their liveness.
pub fn status(config: &Config, paths: &Paths, ui: &Ui) -> Result<()> {
    paths.ensure_dirs()?;
    let mux = mux::for_backend(config.session.backend);

    // Prune records whose sessions died behind our back, then render from the
    // cleaned snapshot.
    let mut locked = LockedState::lock(&paths.state_file)?;
    let dropped = status::reconcile(&mut locked, mux.as_ref())?;
    let snapshot = locked.state().clone();
    drop(locked);

    for rec in &dropped {
        ui.warn(format!(
            "Dropped stale record for '{}' (session '{}' is gone)",
            rec.profile, rec.session
        ));
    }

    if snapshot.sessions.is_empty() {
        ui.println("No active VPN connections.");
        return Ok(());
    }

    let rows: Vec<(String, SessionState)> =
        status::statuses(&snapshot, mux.as_ref()).collect();

    let mut table = ui.table();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("Profile"),
        ui.header_cell("Session"),
        ui.header_cell("Since"),
        ui.header_cell("State"),
    ]);

    for (profile, state) in &rows {
        match state {
            SessionState::Connected { session, since } => {
                table.add_row(vec![
                    Cell::new(ui.icon_ok()),
                    Cell::new(profile),
                    Cell::new(session),
                    Cell::new(since.format("%Y-%m-%d %H:%M:%S").to_string()),
                    ui.colored_cell(state.label(), AnsiColor::Green),
                ]);
            }
            SessionState::Stale { session } => {
                table.add_row(vec![
                    Cell::new(ui.icon_warn()),
                    Cell::new(profile),
                    Cell::new(session),
                    Cell::new("-"),
                    ui.colored_cell(state.label(), AnsiColor::Yellow),
                ]);
            }
            SessionState::Unknown { session, backend } => {
                table.add_row(vec![
                    Cell::new(ui.icon_warn()),
                    Cell::new(profile),
                    Cell::new(session),
                    Cell::new("-"),
                    ui.colored_cell(format!("{} ({backend})", state.label()), AnsiColor::Yellow),
                ]);
            }
        }
    }

    ui.section("Connections");
    ui.println(table.to_string());

    let live = rows.iter().filter(|(_, state)| state.is_connected()).count();
    ui.newline();
    ui.info(format!("{} tracked connection(s), {} live", rows.len(), live));

    if rows
        .iter()
        .any(|(_, state)| matches!(state, SessionState::Unknown { .. }))
    {
        ui.warn(
            "Sessions marked 'unknown' were started under another multiplexer; \
             switch [session] backend back to manage them.",
        );
    }

    // Last output lines from each live session, straight from the multiplexer.
    for (profile, state) in &rows {
        if let SessionState::Connected { session, .. } = state {
            match mux.capture_tail(session, 3) {
                Ok(lines) if !lines.is_empty() => {
                    ui.newline();
                    ui.println(ui.bold(profile));
                    for line in lines {
                        ui.println(format!("  {}", ui.dim(line)));
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(session = %session, error = %e, "could not capture session output");
                }
            }
        }
    }

    Ok(())
}

/// List every profile in the config.
pub fn list(config: &Config, paths: &Paths, ui: &Ui) -> Result<()> {
    let profiles = config.profiles();

    if profiles.is_empty() {
        ui.warn("No profiles configured.");
        ui.newline();
        ui.println("Add locations and networks to:");
        ui.println(format!("  {}", ui.bold(paths.config_file.display().to_string())));
        return Ok(());
    }

    let mut table = ui.simple_table();
    table.set_header(vec![
        ui.header_cell("Profile"),
        ui.header_cell("Aliases"),
        ui.header_cell("Description"),
    ]);

    for profile in &profiles {
        let aliases = if profile.aliases.is_empty() {
            String::from("-")
        } else {
            profile.aliases.join(", ")
        };
        let description = if profile.description.is_empty() {
            String::from("-")
        } else {
            profile.description.clone()
        };
        table.add_row(vec![
            Cell::new(&profile.id),
            Cell::new(aliases),
            Cell::new(description),
        ]);
    }

    ui.section("Profiles");
    ui.println(table.to_string());
    ui.newline();
    ui.info(format!("{} profile(s) configured", profiles.len()));

    Ok(())
}

/// Write a commented starter config.
pub fn init(paths: &Paths, force: bool, ui: &Ui) -> Result<()> {
    paths.ensure_dirs()?;

    if paths.config_file.exists() && !force {
        bail!(
            "Config file already exists at {}.\nHint: Use --force to overwrite it with the starter template.",
            paths.config_file.display()
        );
    }

    std::fs::write(&paths.config_file, config::TEMPLATE)
        .with_context(|| format!("Failed to write {}", paths.config_file.display()))?;

    ui.ok(format!("Wrote starter config to {}", paths.config_file.display()));
    ui.newline();
    ui.println("Next steps:");
    ui.println("  1. Set base_dir and describe your locations in the config");
    ui.println(format!("  2. Check the setup: {}", ui.bold("ovpnctl doctor")));
    ui.println(format!("  3. Connect: {}", ui.bold("ovpnctl connect <profile>")));

    Ok(())
}

/// Run diagnostics
pub fn doctor(paths: &Paths, ui: &Ui) -> Result<()> {
    run_doctor(paths, ui);
    Ok(())
}
