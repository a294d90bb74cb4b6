//! mhproxy core - proxy mesh fitting engine
//!
//! A proxy is a secondary mesh (clothing, hair, eyes, an alternate body
//! topology) whose vertices are defined in terms of a base human mesh. This
//! crate loads proxies from their text source or a compiled cache, fits them
//! to the current shape of the base mesh, and carries skinning weights over
//! from the base mesh.
//!
//! # Architecture
//!
//! - [`ProxyRecord`] - a loaded proxy and its skin weight cache
//! - [`MappingTable`] - per-vertex barycentric mapping onto the base mesh
//! - [`TransformMatrix`] - landmark-based offset correction
//! - [`formats`] - text parser, compiled container and codec
//! - [`loader`] - cache-or-source loading with write-back
//! - [`ProxyContext`] - configuration and collaborator hooks

pub mod config;
pub mod context;
pub mod error;
pub mod formats;
pub mod license;
pub mod loader;
pub mod mapping;
pub mod record;
pub mod tmatrix;
pub mod weights;

pub use config::ProxyConfig;
pub use context::{DataDirProvider, FileMaterialLoader, Material, MaterialLoader, ProxyContext};
pub use error::{ProxyError, Result};
pub use formats::ProxyMetadata;
pub use license::AssetLicense;
pub use loader::{ProxyLoader, load_proxy, peek_metadata};
pub use mapping::{MappingTable, ReferenceVertex};
pub use record::{BaseMesh, MeshId, ProxyMesh, ProxyRecord};
pub use tmatrix::TransformMatrix;
pub use weights::{Skeleton, SkeletonId, VertexBoneWeights, VertexGroup};

pub use mhproxy_shared::{PROXY_FORMAT, ProxyType};
