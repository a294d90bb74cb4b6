//! Error taxonomy for proxy loading, compiling and fitting.
//!
//! Only [`ProxyError::UnknownProxyType`] is meant to reach an interactive
//! caller. Everything else is caught at the loader boundary, logged, and
//! turned into a fallback (text re-parse) or a "no proxy" result.

use std::path::PathBuf;

use crate::formats::archive::ArchiveError;

/// Errors produced by the proxy engine.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Source or cache file does not exist
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Reading or writing a file failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unknown keyword or wrong token count on a source line
    #[error("{}:{line}: malformed `{keyword}`: {reason}", path.display())]
    MalformedDirective {
        path: PathBuf,
        line: usize,
        keyword: String,
        reason: String,
    },

    /// Compiled cache is older than its text source
    #[error("compiled proxy out of date: {}", .0.display())]
    CacheStale(PathBuf),

    /// Compiled cache could not be decoded
    #[error("corrupt compiled proxy: {0}")]
    CacheCorrupt(String),

    /// Compiled cache could not be written
    #[error("unable to write compiled proxy {}: {source}", path.display())]
    CacheWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No seed mesh exists for this kind of proxy
    #[error("unknown proxy type {0}")]
    UnknownProxyType(String),

    /// The mapping references a base vertex the supplied mesh does not have
    #[error("mapping references base vertex {index} but the base mesh has {count} vertices")]
    BaseIndexOutOfRange { index: usize, count: usize },

    /// Caller-owned output buffer does not match the proxy vertex count
    #[error("output buffer holds {found} vertices, proxy has {expected}")]
    OutputLengthMismatch { expected: usize, found: usize },

    /// Vertex bone weight file is not valid
    #[error("invalid vertex bone weights file {}: {reason}", path.display())]
    WeightsFile { path: PathBuf, reason: String },
}

impl ProxyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            ProxyError::FileNotFound(path)
        } else {
            ProxyError::Io { path, source }
        }
    }

    /// Whether the loader may recover by recompiling from text.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ProxyError::UnknownProxyType(_))
    }
}

impl From<ArchiveError> for ProxyError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::Io(source) => ProxyError::Io {
                path: PathBuf::new(),
                source,
            },
            other => ProxyError::CacheCorrupt(other.to_string()),
        }
    }
}

impl From<mhproxy_shared::UnknownProxyType> for ProxyError {
    fn from(e: mhproxy_shared::UnknownProxyType) -> Self {
        ProxyError::UnknownProxyType(e.0)
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_io_maps_to_file_not_found() {
        let err = ProxyError::io(
            "missing.mhclo",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, ProxyError::FileNotFound(_)));
    }

    #[test]
    fn test_archive_errors_become_cache_corrupt() {
        let err: ProxyError = ArchiveError::BadMagic.into();
        assert!(matches!(err, ProxyError::CacheCorrupt(_)));
    }

    #[test]
    fn test_only_unknown_type_is_fatal() {
        assert!(!ProxyError::UnknownProxyType("Hats".into()).is_recoverable());
        assert!(ProxyError::CacheStale(PathBuf::from("a.mhpxy")).is_recoverable());
    }
}
