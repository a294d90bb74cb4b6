//! Proxy file format specification.
//!
//! This module defines the `ProxyFormat` struct which serves as the single source of truth
//! for all proxy-related file constants (extensions, magic bytes, container version).
//!
//! # Example
//!
//! ```
//! use mhproxy_shared::{PROXY_FORMAT, ProxyType};
//! use std::path::Path;
//!
//! assert_eq!(PROXY_FORMAT.binary_ext, "mhpxy");
//! assert_eq!(PROXY_FORMAT.magic, b"MHPX");
//!
//! let cache = PROXY_FORMAT.binary_path(Path::new("clothes/shirt.mhclo"));
//! assert_eq!(cache, Path::new("clothes/shirt.mhpxy"));
//! assert_eq!(PROXY_FORMAT.text_ext(ProxyType::Proxymeshes), "proxy");
//! ```

use std::path::{Path, PathBuf};

use crate::ProxyType;

/// File format specification for proxy assets.
#[derive(Debug, Clone, Copy)]
pub struct ProxyFormat {
    /// Compiled (binary cache) extension without dot
    pub binary_ext: &'static str,

    /// Magic bytes at start of a compiled proxy (4 bytes)
    pub magic: &'static [u8; 4],

    /// Container version, bumped only for incompatible layout changes.
    /// New optional keys do not require a bump.
    pub version: u32,

    /// Text source extension for base-mesh proxies (`Proxymeshes`)
    pub proxy_ext: &'static str,

    /// Text source extension for every other proxy type
    pub clothes_ext: &'static str,

    /// Default suffix for `obj_file`
    pub obj_ext: &'static str,

    /// Default suffix for `material`
    pub material_ext: &'static str,

    /// Default suffix for `vertexboneweights_file`
    pub weights_ext: &'static str,

    /// Default suffix for `uvLayer`
    pub uv_ext: &'static str,
}

impl ProxyFormat {
    /// Create a new proxy format specification.
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        binary_ext: &'static str,
        magic: &'static [u8; 4],
        version: u32,
        proxy_ext: &'static str,
        clothes_ext: &'static str,
        obj_ext: &'static str,
        material_ext: &'static str,
        weights_ext: &'static str,
        uv_ext: &'static str,
    ) -> Self {
        Self {
            binary_ext,
            magic,
            version,
            proxy_ext,
            clothes_ext,
            obj_ext,
            material_ext,
            weights_ext,
            uv_ext,
        }
    }

    /// Text source extension for a proxy type.
    pub fn text_ext(&self, proxy_type: ProxyType) -> &'static str {
        match proxy_type {
            ProxyType::Proxymeshes => self.proxy_ext,
            _ => self.clothes_ext,
        }
    }

    /// Canonical compiled path: same stem, binary extension.
    pub fn binary_path(&self, path: &Path) -> PathBuf {
        path.with_extension(self.binary_ext)
    }

    /// Canonical text source path: same stem, type-dependent extension.
    pub fn text_path(&self, path: &Path, proxy_type: ProxyType) -> PathBuf {
        path.with_extension(self.text_ext(proxy_type))
    }

    /// Whether the path names a compiled proxy (by extension, case-insensitive).
    pub fn is_binary_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(self.binary_ext))
    }
}

/// mhproxy format specification.
///
/// - Compiled extension: `.mhpxy`
/// - Magic bytes: `MHPX`
/// - Text extensions: `.proxy` (base-mesh proxies), `.mhclo` (everything else)
pub const PROXY_FORMAT: ProxyFormat = ProxyFormat::new(
    "mhpxy", b"MHPX", 2, "proxy", "mhclo", "obj", "mhmat", "jsonw", "mhuv",
);
