//! Proxy loading: compiled cache first, text source as the fallback.
//!
//! Given any path naming a proxy, the compiled path (`.mhpxy`) and the text
//! source path (`.mhclo` or `.proxy` depending on type) are derived from its
//! stem. The compiled file is used when it exists and is not older than the
//! text source. Otherwise, or when decoding fails for any reason, the text is
//! parsed and, if the compiled path lies in the user data directory, a fresh
//! compiled file is written.
//!
//! Nothing here returns an error to the caller: failures are logged and
//! reported as `None`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use mhproxy_shared::{PROXY_FORMAT, ProxyType};
use tracing::{debug, error, info, warn};

use crate::context::ProxyContext;
use crate::error::{ProxyError, Result};
use crate::formats::ProxyMetadata;
use crate::formats::binary::{load_binary_proxy, peek_binary_metadata, save_binary_proxy};
use crate::formats::text::{parse_proxy_file, peek_text_metadata};
use crate::record::{BaseMesh, ProxyRecord};

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// `Err(CacheStale)` when `text` exists and was modified after `binary`.
fn check_fresh(binary: &Path, text: &Path) -> Result<()> {
    match (modified(text), modified(binary)) {
        (Some(text_time), Some(binary_time)) if text_time > binary_time => {
            Err(ProxyError::CacheStale(binary.to_path_buf()))
        }
        _ => Ok(()),
    }
}

/// Loads proxies for one base mesh.
pub struct ProxyLoader<'a> {
    ctx: &'a ProxyContext,
    base_vertex_count: usize,
}

impl<'a> ProxyLoader<'a> {
    pub fn new(ctx: &'a ProxyContext, base_vertex_count: usize) -> Self {
        Self {
            ctx,
            base_vertex_count,
        }
    }

    /// Load the proxy named by `path`, or `None` if neither representation
    /// can be read.
    pub fn load(&self, path: &Path, proxy_type: ProxyType) -> Option<ProxyRecord> {
        let binary = PROXY_FORMAT.binary_path(path);
        let text = PROXY_FORMAT.text_path(path, proxy_type);

        match self.load_compiled(&binary, &text, proxy_type) {
            Ok(record) => return Some(record),
            Err(ProxyError::FileNotFound(_)) => {
                debug!("no compiled proxy at {}", binary.display());
            }
            Err(e @ ProxyError::CacheStale(_)) => info!("{e}, recompiling"),
            Err(e) => warn!(
                "problem loading compiled proxy {}, trying text source: {e}",
                binary.display()
            ),
        }

        let record = match parse_proxy_file(&text, proxy_type, self.base_vertex_count, self.ctx) {
            Ok(record) => record,
            Err(e) => {
                error!("unable to load proxy {}: {e}", text.display());
                return None;
            }
        };

        if self.ctx.config.paths.write_cache && self.ctx.is_user_path(&binary) {
            self.write_cache(&record, &binary);
        }
        Some(record)
    }

    fn load_compiled(&self, binary: &Path, text: &Path, proxy_type: ProxyType) -> Result<ProxyRecord> {
        if !binary.is_file() {
            return Err(ProxyError::FileNotFound(binary.to_path_buf()));
        }
        check_fresh(binary, text)?;
        load_binary_proxy(binary, proxy_type, self.base_vertex_count, self.ctx)
    }

    fn write_cache(&self, record: &ProxyRecord, binary: &Path) {
        if let Err(e) = save_binary_proxy(record, binary, self.ctx) {
            warn!("{e}");
            if binary.is_file() {
                if let Err(e) = std::fs::remove_file(binary) {
                    warn!("unable to remove partial {}: {e}", binary.display());
                }
            }
        }
    }
}

/// Load the proxy named by `path`, fitted to `human`.
pub fn load_proxy(
    ctx: &ProxyContext,
    human: &dyn BaseMesh,
    path: &Path,
    proxy_type: ProxyType,
) -> Option<ProxyRecord> {
    ProxyLoader::new(ctx, human.vertex_count()).load(path, proxy_type)
}

fn sibling_text_source(path: &Path, proxy_type: Option<ProxyType>) -> PathBuf {
    if let Some(proxy_type) = proxy_type {
        return PROXY_FORMAT.text_path(path, proxy_type);
    }
    [PROXY_FORMAT.clothes_ext, PROXY_FORMAT.proxy_ext]
        .iter()
        .map(|ext| path.with_extension(ext))
        .find(|p| p.is_file())
        .unwrap_or_else(|| path.with_extension(PROXY_FORMAT.clothes_ext))
}

/// Read uuid and tags without loading geometry.
///
/// For a compiled path, the text source is used instead when the compiled
/// file is out of date (only checked when `proxy_type` is known) or cannot be
/// read.
pub fn peek_metadata(path: &Path, proxy_type: Option<ProxyType>) -> Result<ProxyMetadata> {
    if !PROXY_FORMAT.is_binary_path(path) {
        return peek_text_metadata(path);
    }

    let text = sibling_text_source(path, proxy_type);
    let compiled = match proxy_type {
        Some(_) => check_fresh(path, &text).and_then(|()| peek_binary_metadata(path)),
        None => peek_binary_metadata(path),
    };
    match compiled {
        Ok(meta) => Ok(meta),
        Err(e) => {
            warn!("problem reading metadata from compiled proxy, trying text source: {e}");
            peek_text_metadata(&text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_check_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("a.mhclo");
        let binary = dir.path().join("a.mhpxy");
        std::fs::write(&text, "").unwrap();
        std::fs::write(&binary, "").unwrap();

        let now = SystemTime::now();
        let set = |p: &Path, t: SystemTime| {
            std::fs::File::options()
                .write(true)
                .open(p)
                .unwrap()
                .set_modified(t)
                .unwrap()
        };
        set(&binary, now - Duration::from_secs(60));
        set(&text, now);
        assert!(matches!(check_fresh(&binary, &text), Err(ProxyError::CacheStale(_))));

        set(&binary, now + Duration::from_secs(60));
        assert!(check_fresh(&binary, &text).is_ok());

        // No text source at all
        assert!(check_fresh(&binary, &dir.path().join("b.mhclo")).is_ok());
    }

    #[test]
    fn test_sibling_text_source() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("body.mhpxy");
        assert_eq!(
            sibling_text_source(&binary, Some(ProxyType::Proxymeshes)),
            dir.path().join("body.proxy")
        );
        std::fs::write(dir.path().join("body.proxy"), "").unwrap();
        assert_eq!(sibling_text_source(&binary, None), dir.path().join("body.proxy"));
    }
}
