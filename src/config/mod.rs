use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::DebugLevel;

/// Registry configuration, usually read from `~/.discon-wrapper/config.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Number of connection slots (`N`); valid connection ids are `0..N`
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Load every controller from a private copy so connections sharing a
    /// library file do not share its static state
    #[serde(default = "default_true")]
    pub isolate_instances: bool,

    /// Directory for private library copies (system temp dir when unset)
    #[serde(default)]
    pub copy_dir: Option<PathBuf>,

    /// Serialize library open/close across all connections, for platform
    /// loaders that are not reentrant
    #[serde(default)]
    pub serialize_loader: bool,

    /// 0 = warnings and errors, 1 = basic info, 2 = verbose with payloads
    #[serde(default)]
    pub debug_level: DebugLevel,
}

// Default value functions
fn default_max_connections() -> usize {
    8192
}

fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            isolate_instances: true,
            copy_dir: None,
            serialize_loader: false,
            debug_level: DebugLevel::default(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        let config: RegistryConfig =
            serde_yaml::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = serde_yaml::to_string(self).context("Failed to serialize config")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        fs::write(path.as_ref(), contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get default configuration path
    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;

        Ok(home.join(".discon-wrapper").join("config.yaml"))
    }

    /// Reject settings no registry can work with
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            bail!("max_connections must be at least 1");
        }
        if i32::try_from(self.max_connections).is_err() {
            bail!(
                "max_connections {} does not fit a connection id",
                self.max_connections
            );
        }
        if let Some(dir) = &self.copy_dir {
            if !dir.is_dir() {
                bail!("copy_dir {} is not a directory", dir.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.max_connections, 8192);
        assert!(config.isolate_instances);
        assert!(!config.serialize_loader);
        assert_eq!(config.debug_level, DebugLevel::Disabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let yaml = r#"
max_connections: 16
isolate_instances: false
debug_level: 2
"#;
        let config: RegistryConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_connections, 16);
        assert!(!config.isolate_instances);
        assert_eq!(config.debug_level, DebugLevel::Verbose);
        assert_eq!(config.copy_dir, None);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: RegistryConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, RegistryConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = RegistryConfig {
            max_connections: 4,
            copy_dir: Some(dir.path().to_path_buf()),
            serialize_loader: true,
            ..RegistryConfig::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = RegistryConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        std::fs::write(&path, "max_connections: 0\n").unwrap();
        assert!(RegistryConfig::load_from_file(&path).is_err());

        std::fs::write(&path, "copy_dir: /definitely/not/here\n").unwrap();
        assert!(RegistryConfig::load_from_file(&path).is_err());

        std::fs::write(&path, "debug_level: 7\n").unwrap();
        assert!(RegistryConfig::load_from_file(&path).is_err());

        assert!(RegistryConfig::load_from_file(dir.path().join("missing.yaml")).is_err());
    }
}
