//! The in-memory proxy: metadata, mapping, offset correction and the
//! per-proxy skin weight cache.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Instant, SystemTime};

use glam::Vec3;
use mhproxy_shared::{ProxyType, paths};
use tracing::{debug, warn};

use crate::context::{Material, ProxyContext};
use crate::error::{ProxyError, Result};
use crate::license::AssetLicense;
use crate::mapping::MappingTable;
use crate::tmatrix::TransformMatrix;
use crate::weights::{Skeleton, SkeletonId, VertexBoneWeights, remap_through_mapping};

/// Version tag written when a source does not declare one.
pub const DEFAULT_VERSION: u32 = 110;

/// Render/mask priority used when a source does not declare one.
pub const DEFAULT_Z_DEPTH: i32 = 50;

/// Opaque handle to a mesh owned by the scene layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u64);

/// The live human mesh proxies are fitted to.
pub trait BaseMesh {
    fn vertex_count(&self) -> usize;

    /// Current (posed) vertex positions.
    fn coords(&self) -> &[Vec3];

    /// Rest pose vertex positions.
    fn rest_coords(&self) -> &[Vec3] {
        self.coords()
    }

    fn base_skeleton(&self) -> Option<&dyn Skeleton>;

    /// Seed mesh of the attached proxy object with this uuid, if attached.
    fn attached_seed_mesh(&self, _uuid: &str) -> Option<MeshId> {
        None
    }

    /// Seed mesh of the active topology proxy, if any.
    fn proxy_seed_mesh(&self) -> Option<MeshId> {
        None
    }
}

/// Mesh that receives fitted proxy coordinates.
pub trait ProxyMesh {
    fn change_coords(&mut self, coords: &[Vec3]);
    fn calc_normals(&mut self);
}

#[derive(Debug)]
struct CachedWeights {
    skeleton: Option<SkeletonId>,
    weights: Arc<VertexBoneWeights>,
}

/// A loaded proxy.
#[derive(Debug)]
pub struct ProxyRecord {
    pub name: String,
    pub uuid: Option<String>,
    pub description: String,
    pub license: AssetLicense,
    pub tags: BTreeSet<String>,
    pub proxy_type: ProxyType,

    /// Text source path.
    pub file: PathBuf,
    /// Modification time of the file this record was read from.
    pub mtime: Option<SystemTime>,

    pub basemesh: String,
    pub version: u32,
    pub z_depth: i32,
    pub max_pole: u32,
    pub special_poses: BTreeMap<String, String>,
    pub uv_layers: BTreeMap<u32, PathBuf>,

    pub mapping: MappingTable,
    pub transform: TransformMatrix,
    /// One flag per base-mesh vertex; `true` hides the vertex.
    pub delete_verts: Vec<bool>,
    /// Named `weights` blocks of the text source.
    pub weight_lists: BTreeMap<String, Vec<(u32, f32)>>,

    pub obj_file: Option<PathBuf>,
    pub material_file: Option<PathBuf>,
    pub material: Material,
    pub vertex_bone_weights_file: Option<PathBuf>,
    pub vertex_bone_weights: Option<VertexBoneWeights>,

    weight_cache: Mutex<Option<CachedWeights>>,
    remap_count: AtomicUsize,
}

impl ProxyRecord {
    /// Empty record for `file`, with defaults taken from the context.
    pub fn new(
        file: impl Into<PathBuf>,
        proxy_type: ProxyType,
        base_vertex_count: usize,
        ctx: &ProxyContext,
    ) -> Self {
        let file = file.into();
        let name = default_name(&file);
        Self {
            material: Material::new(name.clone()),
            name,
            uuid: None,
            description: String::new(),
            license: AssetLicense {
                author: ctx.config.defaults.author.clone(),
                license: ctx.config.defaults.license.clone(),
                homepage: ctx.config.defaults.homepage.clone(),
                copyright: String::new(),
            },
            tags: BTreeSet::new(),
            proxy_type,
            file,
            mtime: None,
            basemesh: ctx.config.defaults.basemesh.clone(),
            version: DEFAULT_VERSION,
            z_depth: -1,
            max_pole: 0,
            special_poses: BTreeMap::new(),
            uv_layers: BTreeMap::new(),
            mapping: MappingTable::default(),
            transform: TransformMatrix::new(),
            delete_verts: vec![false; base_vertex_count],
            weight_lists: BTreeMap::new(),
            obj_file: None,
            material_file: None,
            vertex_bone_weights_file: None,
            vertex_bone_weights: None,
            weight_cache: Mutex::new(None),
            remap_count: AtomicUsize::new(0),
        }
    }

    /// Folder of the text source; relative asset paths resolve against it.
    pub fn folder(&self) -> &Path {
        self.file.parent().unwrap_or(Path::new(""))
    }

    /// The uuid, or the name when the proxy has none.
    pub fn uuid(&self) -> &str {
        self.uuid.as_deref().unwrap_or(&self.name)
    }

    pub fn has_custom_vertex_weights(&self) -> bool {
        self.vertex_bone_weights.is_some()
    }

    pub fn vertex_count(&self) -> usize {
        self.mapping.len()
    }

    /// Proxy coordinates fitted to the human, posed or at rest.
    pub fn coords(&self, human: &dyn BaseMesh, fit_to_posed: bool) -> Result<Vec<Vec3>> {
        let coords = if fit_to_posed {
            human.coords()
        } else {
            human.rest_coords()
        };
        self.mapping.evaluate(coords, &self.transform)
    }

    /// Refit `mesh` to the human and recompute its normals.
    pub fn update(
        &self,
        mesh: &mut dyn ProxyMesh,
        human: &dyn BaseMesh,
        fit_to_posed: bool,
    ) -> Result<()> {
        let coords = self.coords(human, fit_to_posed)?;
        mesh.change_coords(&coords);
        mesh.calc_normals();
        Ok(())
    }

    /// Base-mesh visibility mask carried over to proxy vertices.
    pub fn transfer_vertex_mask(&self, mask: &[bool]) -> Vec<bool> {
        self.mapping.transfer_vertex_mask(mask)
    }

    /// The mesh this proxy is drawn from.
    pub fn seed_mesh(&self, human: &dyn BaseMesh) -> Result<Option<MeshId>> {
        if let Some(mesh) = human.attached_seed_mesh(self.uuid()) {
            return Ok(Some(mesh));
        }
        match self.proxy_type {
            ProxyType::Proxymeshes => Ok(human.proxy_seed_mesh()),
            ProxyType::Converter => Ok(None),
            other => Err(ProxyError::UnknownProxyType(other.to_string())),
        }
    }

    /// Skin weights for the proxy's vertices.
    ///
    /// Proxies with their own weights file return those, remapped onto
    /// `skeleton` (or the human's base skeleton). Otherwise `human_weights`
    /// are pushed through the reverse mapping, reusing the previous result
    /// when `allow_cache` is set and `skeleton` is the one it was computed
    /// for. Calling without `allow_cache` clears the cache.
    pub fn vertex_weights(
        &self,
        human_weights: &VertexBoneWeights,
        skeleton: Option<&dyn Skeleton>,
        allow_cache: bool,
        human: &dyn BaseMesh,
    ) -> Arc<VertexBoneWeights> {
        if let Some(explicit) = &self.vertex_bone_weights {
            return match skeleton.or_else(|| human.base_skeleton()) {
                Some(skel) => Arc::new(skel.remap_vertex_weights(explicit, true)),
                None => {
                    warn!(proxy = %self.name, "no skeleton to remap custom vertex weights onto");
                    Arc::new(explicit.clone())
                }
            };
        }

        let skeleton_id = skeleton.map(|s| s.id());
        let mut cache = self
            .weight_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if allow_cache {
            if let Some(cached) = cache.as_ref() {
                if skeleton_id.is_some() && cached.skeleton == skeleton_id {
                    return Arc::clone(&cached.weights);
                }
                debug!(proxy = %self.name, "skeleton changed, recomputing weights");
            }
        }

        let start = Instant::now();
        let weights = Arc::new(
            human_weights.create(remap_through_mapping(&human_weights.data, &self.mapping)),
        );
        self.remap_count.fetch_add(1, Ordering::Relaxed);

        *cache = allow_cache.then(|| CachedWeights {
            skeleton: skeleton_id,
            weights: Arc::clone(&weights),
        });
        debug!(
            proxy = %self.name,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "remapped vertex weights"
        );
        weights
    }

    /// How many times weights were remapped through the mapping.
    pub fn weight_remap_count(&self) -> usize {
        self.remap_count.load(Ordering::Relaxed)
    }

    /// Drop any cached skin weights.
    pub fn clear_weight_cache(&self) {
        *self
            .weight_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Proxy name derived from a file stem: first letter upper-case, the rest
/// lower-case, spaces replaced by underscores.
pub fn default_name(file: &Path) -> String {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let mut chars = stem.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    };
    capitalized.replace(' ', "_")
}

/// Locate an asset named in a proxy source or cache.
///
/// `file` is looked up under `folder`, then each context search path, trying
/// `alternates` extensions first. `suffix` is appended when `file` has no
/// extension.
pub fn resolve_asset(
    folder: &Path,
    file: &str,
    suffix: &str,
    alternates: &[&str],
    ctx: &ProxyContext,
) -> PathBuf {
    let name = paths::file_name_with_suffix(Path::new(""), file, suffix);
    let search = ctx.search_paths();
    let dirs: Vec<&Path> = std::iter::once(folder)
        .chain(search.iter().map(PathBuf::as_path))
        .collect();
    paths::find_file_with_alternates(&name, &dirs, alternates)
}
