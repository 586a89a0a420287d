//! Configuration handling for ovpnctl.
//!
//! The config file nests locations and their networks; [`Config::profiles`]
//! flattens that tree into the catalog of [`Profile`] values everything else
//! works with. Loading fails fast: an unreadable file, bad TOML, or an entry
//! that breaks a structural rule is an error, not a warning.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hooks::{Hook, HookPhase};
use crate::mux::Backend;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the per-location OpenVPN config trees; also the
    /// working directory of spawned VPN processes.
    pub base_dir: PathBuf,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub openvpn: OpenVpnConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub locations: BTreeMap<String, Location>,
    #[serde(default)]
    pub hooks: Hooks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub backend: Backend,
    /// `{profile}` expands to the sanitized profile id.
    pub name_template: String,
    /// Seconds to wait after spawning before post-connect hooks run.
    pub startup_delay: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Tmux,
            name_template: "vpn-{profile}".to_string(),
            startup_delay: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenVpnConfig {
    pub binary: String,
    pub use_sudo: bool,
}

impl Default for OpenVpnConfig {
    fn default() -> Self {
        Self {
            binary: "openvpn".to_string(),
            use_sudo: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum similarity (0-100) for a fuzzy match to count.
    pub threshold: u8,
    pub max_suggestions: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: 60,
            max_suggestions: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    /// Also append log lines to this file when set.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub description: String,
    /// Subdirectory of `base_dir` holding this location's .ovpn files.
    pub directory: String,
    /// Allow more than one live connection to this location at once.
    #[serde(default)]
    pub allow_simultaneous: bool,
    #[serde(default)]
    pub networks: BTreeMap<String, Network>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    /// OpenVPN config file name inside the location directory.
    pub file: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Hooks {
    pub pre_connect: Vec<Hook>,
    pub post_connect: Vec<Hook>,
    pub pre_disconnect: Vec<Hook>,
    pub post_disconnect: Vec<Hook>,
}

impl Hooks {
    /// The hook set for one lifecycle phase.
    pub fn set(&self, phase: HookPhase) -> &[Hook] {
        match phase {
            HookPhase::PreConnect => &self.pre_connect,
            HookPhase::PostConnect => &self.post_connect,
            HookPhase::PreDisconnect => &self.pre_disconnect,
            HookPhase::PostDisconnect => &self.post_disconnect,
        }
    }
}

/// One connectable VPN endpoint, flattened out of the location/network tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// `"{location}/{network}"`, e.g. `"pln/essdlc"`.
    pub id: String,
    pub location: String,
    pub network: String,
    /// Absolute path to the OpenVPN config file.
    pub file: PathBuf,
    pub description: String,
    pub aliases: Vec<String>,
    pub allow_simultaneous: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigNotFound(path.to_path_buf())
            } else {
                Error::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.base_dir.is_absolute() {
            return Err(Error::ConfigInvalid(format!(
                "base_dir must be an absolute path, got '{}'",
                self.base_dir.display()
            )));
        }
        if !self.session.name_template.contains("{profile}") {
            return Err(Error::ConfigInvalid(format!(
                "session.name_template must contain '{{profile}}', got '{}'",
                self.session.name_template
            )));
        }
        if self.matcher.threshold > 100 {
            return Err(Error::ConfigInvalid(format!(
                "matcher.threshold must be 0-100, got {}",
                self.matcher.threshold
            )));
        }

        // Every name a query can hit exactly must point at one profile.
        let mut seen: BTreeMap<String, String> = BTreeMap::new();
        for (loc_name, loc) in &self.locations {
            // Quoted TOML keys can smuggle in anything; '/' would make the
            // profile id ambiguous when split back apart.
            if loc_name.is_empty() || loc_name.contains('/') {
                return Err(Error::ConfigInvalid(format!(
                    "location name '{loc_name}' must be non-empty and must not contain '/'"
                )));
            }
            for (net_name, net) in &loc.networks {
                if net_name.is_empty() || net_name.contains('/') {
                    return Err(Error::ConfigInvalid(format!(
                        "network name '{net_name}' must be non-empty and must not contain '/'"
                    )));
                }
                let id = format!("{loc_name}/{net_name}");
                if net.file.trim().is_empty() {
                    return Err(Error::ConfigInvalid(format!("profile '{id}' has an empty file")));
                }
                if let Some(other) = seen.insert(id.clone(), id.clone()) {
                    return Err(Error::ConfigInvalid(format!(
                        "name '{id}' is claimed by both '{other}' and '{id}'"
                    )));
                }
                for alias in &net.aliases {
                    if alias.trim().is_empty() {
                        return Err(Error::ConfigInvalid(format!(
                            "profile '{id}' has an empty alias"
                        )));
                    }
                    if let Some(other) = seen.insert(alias.clone(), id.clone()) {
                        if other != id {
                            return Err(Error::ConfigInvalid(format!(
                                "alias '{alias}' is claimed by both '{other}' and '{id}'"
                            )));
                        }
                    }
                }
            }
        }

        for phase in [
            HookPhase::PreConnect,
            HookPhase::PostConnect,
            HookPhase::PreDisconnect,
            HookPhase::PostDisconnect,
        ] {
            for hook in self.hooks.set(phase) {
                if hook.name.trim().is_empty() || hook.command.trim().is_empty() {
                    return Err(Error::ConfigInvalid(format!(
                        "{phase} hooks need a name and a command"
                    )));
                }
                if hook.timeout == 0 {
                    return Err(Error::ConfigInvalid(format!(
                        "hook '{}' has a zero timeout",
                        hook.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Flatten the location tree into the profile catalog, sorted by id.
    pub fn profiles(&self) -> Vec<Profile> {
        let mut profiles = Vec::new();
        for (loc_name, loc) in &self.locations {
            let dir = self.base_dir.join(&loc.directory);
            for (net_name, net) in &loc.networks {
                profiles.push(Profile {
                    id: format!("{loc_name}/{net_name}"),
                    location: loc_name.clone(),
                    network: net_name.clone(),
                    file: dir.join(&net.file),
                    description: net.description.clone(),
                    aliases: net.aliases.clone(),
                    allow_simultaneous: loc.allow_simultaneous,
                });
            }
        }
        profiles
    }

    /// Look a profile up by exact id.
    pub fn profile(&self, id: &str) -> Option<Profile> {
        self.profiles().into_iter().find(|p| p.id == id)
    }
}

/// Starter config written by `ovpnctl init`.
pub const TEMPLATE: &str = r#"# ovpnctl configuration
#
# base_dir holds one subdirectory per location, each containing the
# OpenVPN config files named under [locations.<name>.networks].

base_dir = "/home/me/ovpn"

[session]
# backend = "tmux"            # or "screen"
# name_template = "vpn-{profile}"
# startup_delay = 10          # seconds before post-connect hooks run

[openvpn]
# binary = "openvpn"
# use_sudo = true

[matcher]
# threshold = 60              # minimum fuzzy match score (0-100)
# max_suggestions = 3

[logging]
# level = "info"
# file = "/home/me/.ovpnctl/ovpnctl.log"

# [locations.pln]
# description = "Planet Lab"
# directory = "pln"
# allow_simultaneous = false
#
# [locations.pln.networks.essdlc]
# file = "essdlc.ovpn"
# description = "ESS DLC network"
# aliases = ["ess"]

# [[hooks.pre_connect]]
# name = "dns-backup"
# command = "cp /etc/resolv.conf /tmp/resolv.conf.bak"
# required = true
# timeout = 30
"#;
