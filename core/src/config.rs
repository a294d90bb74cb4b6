//! Configuration management (config.toml)
//!
//! Handles loading, saving, and providing defaults for engine settings.
//! Settings are stored in TOML format in the platform-specific config directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration.
///
/// Contains all user-configurable settings organized into sections.
/// Serialized to/from TOML format for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProxyConfig {
    /// Asset roots and cache policy
    #[serde(default)]
    pub paths: PathsConfig,
    /// Metadata applied to proxies that do not declare their own
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// Asset locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// User-writable data area. Compiled caches are only written below it.
    /// Defaults to the platform data directory.
    #[serde(default = "data_dir")]
    pub user_data_dir: Option<PathBuf>,
    /// Read-only asset roots shipped with the application
    #[serde(default)]
    pub sys_data_dirs: Vec<PathBuf>,
    /// Whether to write compiled caches after a text parse (default: true)
    #[serde(default = "default_true")]
    pub write_cache: bool,
}

/// Fallback metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// License applied to assets without a license comment (default: AGPL3)
    #[serde(default = "default_license")]
    pub license: String,
    /// Author applied to assets without an author comment
    #[serde(default)]
    pub author: String,
    /// Homepage applied to assets without a homepage comment
    #[serde(default)]
    pub homepage: String,
    /// Base mesh version tag (default: hm08)
    #[serde(default = "default_basemesh")]
    pub basemesh: String,
}

fn default_true() -> bool {
    true
}
fn default_license() -> String {
    "AGPL3".to_string()
}
fn default_basemesh() -> String {
    "hm08".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            user_data_dir: data_dir(),
            sys_data_dirs: Vec::new(),
            write_cache: default_true(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            license: default_license(),
            author: String::new(),
            homepage: String::new(),
            basemesh: default_basemesh(),
        }
    }
}

impl ProxyConfig {
    /// Directories that compiled paths may be jailed under.
    pub fn jail_limits(&self) -> Vec<PathBuf> {
        self.paths
            .user_data_dir
            .iter()
            .chain(self.paths.sys_data_dirs.iter())
            .cloned()
            .collect()
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Windows: `%APPDATA%\mhproxy\config`
/// On macOS: `~/Library/Application Support/org.mhproxy.mhproxy`
/// On Linux: `~/.config/mhproxy`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "mhproxy", "mhproxy")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Returns the platform-specific data directory (the user-writable asset area).
///
/// Returns `None` if the home directory cannot be determined.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "mhproxy", "mhproxy")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Loads the configuration from disk.
///
/// Reads `config.toml` from the platform's configuration directory.
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> ProxyConfig {
    config_dir()
        .and_then(|dir| std::fs::read_to_string(dir.join("config.toml")).ok())
        .and_then(|content| toml::from_str(&content).ok())
        .unwrap_or_default()
}

/// Saves the configuration to disk.
///
/// Writes `config.toml` to the platform's configuration directory.
/// Creates the directory if it doesn't exist.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file
/// cannot be written.
pub fn save(config: &ProxyConfig) -> std::io::Result<()> {
    if let Some(dir) = config_dir() {
        std::fs::create_dir_all(&dir)?;
        let content = toml::to_string_pretty(config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(dir.join("config.toml"), content)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert!(config.paths.write_cache);
        assert!(config.paths.sys_data_dirs.is_empty());
        assert_eq!(config.defaults.license, "AGPL3");
        assert_eq!(config.defaults.basemesh, "hm08");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
            [paths]
            user_data_dir = "/tmp/mh"
            write_cache = false
        "#;
        let config: ProxyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.paths.user_data_dir, Some(PathBuf::from("/tmp/mh")));
        assert!(!config.paths.write_cache);
        assert_eq!(config.defaults.basemesh, "hm08");
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let mut config = ProxyConfig::default();
        config.paths.sys_data_dirs.push(PathBuf::from("/usr/share/mhproxy"));
        config.defaults.author = "someone".to_string();

        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: ProxyConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_jail_limits_include_all_roots() {
        let mut config = ProxyConfig::default();
        config.paths.user_data_dir = Some(PathBuf::from("/home/u/data"));
        config.paths.sys_data_dirs = vec![PathBuf::from("/usr/share/mh")];
        assert_eq!(
            config.jail_limits(),
            vec![PathBuf::from("/home/u/data"), PathBuf::from("/usr/share/mh")]
        );
    }
}
