//! On-disk proxy representations.
//!
//! - [`text`] - the authored line-oriented source
//! - [`archive`] - the typed-array container used for compiled proxies
//! - [`binary`] - mapping between a [`ProxyRecord`](crate::ProxyRecord) and
//!   the container

use std::collections::BTreeSet;

pub mod archive;
pub mod binary;
pub mod text;

/// The cheap-to-read part of a proxy, used to browse asset libraries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyMetadata {
    pub uuid: Option<String>,
    pub tags: BTreeSet<String>,
}
