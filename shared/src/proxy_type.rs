//! Proxy kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of mesh a proxy describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProxyType {
    /// Alternate topology for the body itself
    Proxymeshes,
    Clothes,
    Hair,
    Eyes,
    Eyebrows,
    Eyelashes,
    Teeth,
    Tongue,
    /// Mapping used only to convert between base meshes; has no mesh of its own
    Converter,
}

/// Raised when a proxy type name is not one of the known kinds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown proxy type {0:?}")]
pub struct UnknownProxyType(pub String);

impl ProxyType {
    /// Every proxy type that is loaded as a mesh.
    pub const ALL: [ProxyType; 8] = [
        ProxyType::Proxymeshes,
        ProxyType::Clothes,
        ProxyType::Hair,
        ProxyType::Eyes,
        ProxyType::Eyebrows,
        ProxyType::Eyelashes,
        ProxyType::Teeth,
        ProxyType::Tongue,
    ];

    /// Types of which a human carries at most one.
    pub const SIMPLE: [ProxyType; 6] = [
        ProxyType::Hair,
        ProxyType::Eyes,
        ProxyType::Eyebrows,
        ProxyType::Eyelashes,
        ProxyType::Teeth,
        ProxyType::Tongue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Proxymeshes => "Proxymeshes",
            ProxyType::Clothes => "Clothes",
            ProxyType::Hair => "Hair",
            ProxyType::Eyes => "Eyes",
            ProxyType::Eyebrows => "Eyebrows",
            ProxyType::Eyelashes => "Eyelashes",
            ProxyType::Teeth => "Teeth",
            ProxyType::Tongue => "Tongue",
            ProxyType::Converter => "Converter",
        }
    }

    pub fn is_simple(&self) -> bool {
        Self::SIMPLE.contains(self)
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyType {
    type Err = UnknownProxyType;

    /// Case-insensitive; lowercase names are common in asset folders.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .chain(std::iter::once(&ProxyType::Converter))
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| UnknownProxyType(s.to_string()))
    }
}
