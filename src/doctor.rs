//! Diagnostic tool for ovpnctl.
//!
//! This module implements the `ovpnctl doctor` command, which checks the
//! system for common issues:
//! - Presence and validity of the config file.
//! - Existence of the OpenVPN config files it points at.
//! - Required binaries on PATH.
//! - State file health and tracked-session liveness.
//!
//! It reports issues to the user with a pass/fail/warn status.

use anstyle::AnsiColor;
use std::env;
use std::path::PathBuf;

use crate::config::Config;
use crate::mux::{self, Backend};
use crate::paths::Paths;
use crate::state::State;
use crate::ui::Ui;

/// Run the doctor diagnostics
pub fn run_doctor(paths: &Paths, ui: &Ui) {
    ui.section("ovpnctl Doctor");
    ui.newline();

    // 1. Check config
    check_step(ui, "Config", || {
        if !paths.app_dir.exists() {
            ui.println(format!(
                "  {} App directory missing: {} (run 'ovpnctl init')",
                ui.icon_warn(),
                paths.app_dir.display()
            ));
            return true;
        }
        ui.println(format!(
            "  {} App directory exists: {}",
            ui.icon_ok(),
            paths.app_dir.display()
        ));

        if !paths.config_file.exists() {
            ui.println(format!(
                "  {} Config file missing: {} (run 'ovpnctl init')",
                ui.icon_warn(),
                paths.config_file.display()
            ));
            return true;
        }

        match Config::load(&paths.config_file) {
            Ok(config) => {
                ui.println(format!(
                    "  {} Config parses: {}",
                    ui.icon_ok(),
                    paths.config_file.display()
                ));
                ui.println(format!(
                    "  {} {} profile(s) configured",
                    ui.icon_info(),
                    config.profiles().len()
                ));
                true
            }
            Err(e) => {
                ui.println(format!("  {} Config broken: {}", ui.icon_err(), e));
                false
            }
        }
    });

    // 2. Check the OpenVPN config files the profiles point at
    check_step(ui, "OpenVPN Files", || {
        let Ok(config) = Config::load(&paths.config_file) else {
            ui.println(format!("  {} Config not readable, skipping", ui.icon_info()));
            return true;
        };

        if !config.base_dir.exists() {
            ui.println(format!(
                "  {} base_dir missing: {}",
                ui.icon_err(),
                config.base_dir.display()
            ));
            return false;
        }
        ui.println(format!(
            "  {} base_dir exists: {}",
            ui.icon_ok(),
            config.base_dir.display()
        ));

        let profiles = config.profiles();
        if profiles.is_empty() {
            ui.println(format!("  {} No profiles configured", ui.icon_warn()));
            return true;
        }

        let mut all_valid = true;
        for profile in &profiles {
            if profile.file.exists() {
                ui.println(format!("    {} {}", ui.icon_ok(), profile.id));
            } else {
                ui.println(format!(
                    "    {} {} (file missing: {})",
                    ui.icon_err(),
                    profile.id,
                    profile.file.display()
                ));
                all_valid = false;
            }
        }
        all_valid
    });

    // 3. Check binaries
    check_step(ui, "Binaries", || {
        let (binary, backend, use_sudo) = match Config::load(&paths.config_file) {
            Ok(config) => (
                config.openvpn.binary.clone(),
                config.session.backend,
                config.openvpn.use_sudo,
            ),
            Err(_) => ("openvpn".to_string(), Backend::Tmux, false),
        };

        let mut ok = true;
        match find_in_path(&binary) {
            Some(path) => ui.println(format!(
                "  {} {} found: {}",
                ui.icon_ok(),
                binary,
                path.display()
            )),
            None => {
                ui.println(format!("  {} {} not found in PATH", ui.icon_err(), binary));
                ok = false;
            }
        }

        match find_in_path(backend.binary()) {
            Some(path) => ui.println(format!(
                "  {} {} found: {}",
                ui.icon_ok(),
                backend,
                path.display()
            )),
            None => {
                ui.println(format!("  {} {} not found in PATH", ui.icon_err(), backend));
                ok = false;
            }
        }

        if use_sudo {
            match find_in_path("sudo") {
                Some(_) => ui.println(format!("  {} sudo found", ui.icon_ok())),
                None => ui.println(format!(
                    "  {} use_sudo is set but sudo is not in PATH",
                    ui.icon_warn()
                )),
            }
        }
        ok
    });

    // 4. Check state
    check_step(ui, "State File", || {
        if !paths.state_file.exists() {
            ui.println(format!(
                "  {} State file missing (fresh install?)",
                ui.icon_warn()
            ));
            return true;
        }

        match State::read(&paths.state_file) {
            Ok(state) => {
                ui.println(format!("  {} State file readable", ui.icon_ok()));
                if state.sessions.is_empty() {
                    ui.println(format!("  {} No tracked connections", ui.icon_info()));
                    return true;
                }

                let backend = Config::load(&paths.config_file)
                    .map(|c| c.session.backend)
                    .unwrap_or(Backend::Tmux);
                let mux = mux::for_backend(backend);

                for rec in state.sessions.values() {
                    if rec.backend != backend {
                        ui.println(format!(
                            "    {} {} tracked under {} (configured backend is {})",
                            ui.icon_warn(),
                            rec.profile,
                            rec.backend,
                            backend
                        ));
                        continue;
                    }
                    match mux.has_session(&rec.session) {
                        Ok(true) => ui.println(format!(
                            "    {} {} ({})",
                            ui.icon_ok(),
                            rec.profile,
                            rec.session
                        )),
                        Ok(false) => ui.println(format!(
                            "    {} {} tracked but session '{}' is gone (run 'ovpnctl status' to prune)",
                            ui.icon_warn(),
                            rec.profile,
                            rec.session
                        )),
                        Err(e) => ui.println(format!(
                            "    {} {}: liveness probe failed: {}",
                            ui.icon_warn(),
                            rec.profile,
                            e
                        )),
                    }
                }
                true
            }
            Err(e) => {
                ui.println(format!("  {} State file corrupt: {}", ui.icon_err(), e));
                false
            }
        }
    });
}

fn check_step<F>(ui: &Ui, name: &str, check_fn: F)
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name)));
    if !check_fn() {
        ui.println(ui.colored("  Issues detected!", AnsiColor::Red));
    }
    ui.newline();
}

/// Look for `bin` in every PATH entry.
fn find_in_path(bin: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.is_file())
}
