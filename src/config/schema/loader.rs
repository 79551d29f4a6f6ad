use super::Config;
use anyhow::{Context, Result};
use directories::UserDirs;
use std::fs;
use std::path::Path;

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let taskwarden_dir = home.join(".taskwarden");
        let config_path = taskwarden_dir.join("config.toml");

        if !taskwarden_dir.exists() {
            fs::create_dir_all(&taskwarden_dir)
                .context("Failed to create .taskwarden directory")?;
        }

        let mut config = if config_path.exists() {
            Self::read(&config_path)?
        } else {
            let config = Self {
                config_path: config_path.clone(),
                ..Self::default()
            };
            config.save()?;
            config
        };
        config.config_path = config_path;
        config.workspace_dir = taskwarden_dir.join("workspace");
        config.finish()
    }

    /// Load from an explicit file; the workspace sits next to it.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::read(path)?
        } else {
            Self::default()
        };
        config.config_path = path.to_path_buf();
        config.workspace_dir = path
            .parent()
            .map_or_else(|| Path::new(".").to_path_buf(), Path::to_path_buf)
            .join("workspace");
        config.finish()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents).context("Failed to parse config file")
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_env_overrides();
        self.validate()?;
        fs::create_dir_all(&self.workspace_dir).context("Failed to create workspace directory")?;
        Ok(self)
    }
}
