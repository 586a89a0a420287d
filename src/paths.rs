use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::PathBuf;

/// All computed paths used by ovpnctl
#[derive(Debug, Clone)]
pub struct Paths {
    /// ~/.ovpnctl
    pub app_dir: PathBuf,
    /// ~/.ovpnctl/config.toml
    pub config_file: PathBuf,
    /// ~/.ovpnctl/state.json
    pub state_file: PathBuf,
    /// ~/.ovpnctl/ovpnctl.log
    pub log_file: PathBuf,
}

impl Paths {
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;
        let home = base_dirs.home_dir();

        let app_dir = home.join(".ovpnctl");
        let config_file = app_dir.join("config.toml");
        let state_file = app_dir.join("state.json");
        let log_file = app_dir.join("ovpnctl.log");

        Ok(Self {
            app_dir,
            config_file,
            state_file,
            log_file,
        })
    }

    /// Ensure the application directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.app_dir)
            .with_context(|| format!("Failed to create app directory: {:?}", self.app_dir))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_hang_off_app_dir() {
        let paths = Paths::new().unwrap();
        assert!(paths.config_file.starts_with(&paths.app_dir));
        assert!(paths.state_file.starts_with(&paths.app_dir));
        assert!(paths.log_file.starts_with(&paths.app_dir));
        assert!(paths.config_file.ends_with(".ovpnctl/config.toml"));
    }
}
