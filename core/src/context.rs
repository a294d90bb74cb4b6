//! Explicit engine context.
//!
//! Everything the parser, codec and loader need from the surrounding
//! application is passed in through a [`ProxyContext`] instead of living in
//! process-wide state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};

/// Trait for providing the user-writable data directory.
///
/// Compiled proxies are only written below this directory; assets found in
/// read-only system locations are always recompiled in memory.
pub trait DataDirProvider: Send + Sync {
    /// Returns the data directory path, or `None` if there is none.
    fn data_dir(&self) -> Option<PathBuf>;
}

/// Data directory taken from [`ProxyConfig::paths`].
#[derive(Debug, Clone)]
pub struct ConfigDataDir(pub Option<PathBuf>);

impl DataDirProvider for ConfigDataDir {
    fn data_dir(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}

/// A material definition as far as proxies are concerned: a name, where it
/// came from, and its raw properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Material {
    pub name: String,
    pub file: Option<PathBuf>,
    pub properties: BTreeMap<String, String>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Material subsystem hook.
pub trait MaterialLoader: Send + Sync {
    fn load_material(&self, path: &Path) -> Result<Material>;
}

/// Reads `.mhmat` files as `key value` lines.
///
/// Only stores what it reads; interpreting shaders and textures is the
/// material subsystem's job.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMaterialLoader;

impl MaterialLoader for FileMaterialLoader {
    fn load_material(&self, path: &Path) -> Result<Material> {
        let text = std::fs::read_to_string(path).map_err(|e| ProxyError::io(path, e))?;

        let mut material = Material {
            file: Some(path.to_path_buf()),
            ..Default::default()
        };
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((k, v)) => (k, v.trim()),
                None => (line, ""),
            };
            if key == "name" {
                material.name = value.to_string();
            } else {
                material
                    .properties
                    .insert(key.to_string(), value.to_string());
            }
        }
        Ok(material)
    }
}

/// Bundle of configuration and collaborator hooks shared by one application.
pub struct ProxyContext {
    pub config: ProxyConfig,
    pub data_dir: Box<dyn DataDirProvider>,
    pub materials: Box<dyn MaterialLoader>,
}

impl ProxyContext {
    pub fn new(config: ProxyConfig) -> Self {
        let data_dir = ConfigDataDir(config.paths.user_data_dir.clone());
        Self {
            config,
            data_dir: Box::new(data_dir),
            materials: Box::new(FileMaterialLoader),
        }
    }

    pub fn with_data_dir(mut self, provider: impl DataDirProvider + 'static) -> Self {
        self.data_dir = Box::new(provider);
        self
    }

    pub fn with_material_loader(mut self, loader: impl MaterialLoader + 'static) -> Self {
        self.materials = Box::new(loader);
        self
    }

    /// Whether `path` lies in the user-writable data area.
    pub fn is_user_path(&self, path: &Path) -> bool {
        let Some(root) = self.data_dir.data_dir() else {
            return false;
        };
        let root = mhproxy_shared::paths::normalize(&std::path::absolute(&root).unwrap_or(root));
        let path = mhproxy_shared::paths::normalize(
            &std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
        );
        path.starts_with(root)
    }

    /// Search folders for asset lookups, after the proxy's own folder.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.data_dir
            .data_dir()
            .into_iter()
            .chain(self.config.paths.sys_data_dirs.iter().cloned())
            .collect()
    }

    /// Roots under which compiled paths may be stored relatively.
    pub fn jail_limits(&self) -> Vec<PathBuf> {
        let mut limits = self.config.jail_limits();
        if let Some(dir) = self.data_dir.data_dir() {
            if !limits.contains(&dir) {
                limits.push(dir);
            }
        }
        limits
    }
}

impl Default for ProxyContext {
    fn default() -> Self {
        Self::new(crate::config::load())
    }
}

impl std::fmt::Debug for ProxyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyContext")
            .field("config", &self.config)
            .field("data_dir", &self.data_dir.data_dir())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_material_loader_reads_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cotton.mhmat");
        std::fs::write(
            &path,
            "# comment\nname Cotton\ndiffuseColor 0.8 0.8 0.8\n\nshininess 0.1\n",
        )
        .unwrap();

        let material = FileMaterialLoader.load_material(&path).unwrap();
        assert_eq!(material.name, "Cotton");
        assert_eq!(material.file.as_deref(), Some(path.as_path()));
        assert_eq!(material.properties["diffuseColor"], "0.8 0.8 0.8");
        assert_eq!(material.properties["shininess"], "0.1");
    }

    #[test]
    fn test_missing_material_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileMaterialLoader
            .load_material(&dir.path().join("none.mhmat"))
            .unwrap_err();
        assert!(matches!(err, ProxyError::FileNotFound(_)));
    }

    #[test]
    fn test_is_user_path() {
        let dir = tempfile::tempdir().unwrap();
        let context = ProxyContext::new(ProxyConfig::default())
            .with_data_dir(ConfigDataDir(Some(dir.path().to_path_buf())));

        assert!(context.is_user_path(&dir.path().join("clothes/a.mhpxy")));
        assert!(!context.is_user_path(Path::new("/usr/share/other/a.mhpxy")));
    }

    #[test]
    fn test_no_data_dir_means_nothing_is_writable() {
        let context =
            ProxyContext::new(ProxyConfig::default()).with_data_dir(ConfigDataDir(None));
        assert!(!context.is_user_path(Path::new("/tmp/a.mhpxy")));
    }
}
