//! Skinning weights and their remapping onto proxy vertices.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, Result};
use crate::license::AssetLicense;
use crate::mapping::MappingTable;

/// Product weights at or below this value are dropped by the remapper.
pub const WEIGHT_THRESHOLD: f32 = 1e-4;

/// Vertex indices and weights for one bone, as parallel lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexGroup {
    pub indices: Vec<u32>,
    pub weights: Vec<f32>,
}

impl VertexGroup {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn push(&mut self, index: u32, weight: f32) {
        self.indices.push(index);
        self.weights.push(weight);
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.weights.iter().copied())
    }
}

impl FromIterator<(u32, f32)> for VertexGroup {
    fn from_iter<I: IntoIterator<Item = (u32, f32)>>(iter: I) -> Self {
        let (indices, weights) = iter.into_iter().unzip();
        Self { indices, weights }
    }
}

/// Per-bone vertex weights, plus the metadata of the file they came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexBoneWeights {
    pub name: String,
    pub version: u32,
    pub license: AssetLicense,
    pub data: BTreeMap<String, VertexGroup>,
}

/// On-disk layout of a `.jsonw` file.
#[derive(Debug, Deserialize, Serialize)]
struct WeightsFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: u32,
    #[serde(default)]
    license: AssetLicense,
    weights: BTreeMap<String, Vec<(u32, f32)>>,
}

impl VertexBoneWeights {
    /// Parse a vertex bone weights JSON document.
    pub fn from_json(path: &Path, text: &str) -> Result<Self> {
        let file: WeightsFile =
            serde_json::from_str(text).map_err(|e| ProxyError::WeightsFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            name: file.name,
            version: file.version,
            license: file.license,
            data: file
                .weights
                .into_iter()
                .map(|(bone, pairs)| (bone, pairs.into_iter().collect()))
                .collect(),
        })
    }

    /// Load a `.jsonw` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ProxyError::io(path, e))?;
        Self::from_json(path, &text)
    }

    /// New weights with the same metadata but different data.
    pub fn create(&self, data: BTreeMap<String, VertexGroup>) -> Self {
        Self {
            name: self.name.clone(),
            version: self.version,
            license: self.license.clone(),
            data,
        }
    }

    /// Serialize in the `.jsonw` layout.
    pub fn to_json(&self) -> Result<String> {
        let file = WeightsFile {
            name: self.name.clone(),
            version: self.version,
            license: self.license.clone(),
            weights: self
                .data
                .iter()
                .map(|(bone, group)| (bone.clone(), group.iter().collect()))
                .collect(),
        };
        serde_json::to_string_pretty(&file).map_err(|e| ProxyError::WeightsFile {
            path: Default::default(),
            reason: e.to_string(),
        })
    }
}

/// Opaque identity of a skeleton, compared to validate the weight cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SkeletonId(pub u64);

/// The part of a rig the proxy needs.
pub trait Skeleton: Send + Sync {
    fn id(&self) -> SkeletonId;

    /// Translate weights authored against the reference skeleton onto this
    /// skeleton's bones.
    fn remap_vertex_weights(
        &self,
        weights: &VertexBoneWeights,
        force_remap: bool,
    ) -> VertexBoneWeights;
}

/// Push base-mesh bone weights through the reverse mapping.
///
/// Every (base vertex, weight) pair of a bone contributes `(proxy vertex,
/// mapping weight × weight)` for each proxy vertex depending on it, when that
/// product exceeds [`WEIGHT_THRESHOLD`]. Bones left with no entries are
/// omitted. Contributions to the same proxy vertex are not merged.
pub fn remap_through_mapping(
    base: &BTreeMap<String, VertexGroup>,
    mapping: &MappingTable,
) -> BTreeMap<String, VertexGroup> {
    let mut remapped = BTreeMap::new();
    for (bone, group) in base {
        let mut out = VertexGroup::default();
        for (vertex, weight) in group.iter() {
            for &(proxy_vertex, mapping_weight) in mapping.reverse(vertex) {
                let product = mapping_weight * weight;
                if product > WEIGHT_THRESHOLD {
                    out.push(proxy_vertex, product);
                }
            }
        }
        if !out.is_empty() {
            remapped.insert(bone.clone(), out);
        }
    }
    remapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappingTableBuilder, ReferenceVertex};
    use glam::Vec3;

    fn mapping() -> MappingTable {
        let mut builder = MappingTableBuilder::new();
        builder.push(ReferenceVertex::exact(0));
        builder.push(ReferenceVertex {
            verts: [0, 1, 2],
            weights: [0.5, 0.25, 0.25],
            offset: Vec3::ZERO,
        });
        builder.finish()
    }

    fn group(pairs: &[(u32, f32)]) -> VertexGroup {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_remap_distributes_over_reverse_index() {
        let base = BTreeMap::from([("spine".to_string(), group(&[(0, 1.0), (1, 0.5)]))]);
        let out = remap_through_mapping(&base, &mapping());
        assert_eq!(out["spine"], group(&[(0, 1.0), (1, 0.5), (1, 0.125)]));
    }

    #[test]
    fn test_threshold_is_strict() {
        // 0.5 * 2e-4 == 1e-4 exactly, 0.25 * 2e-4 is below
        let base = BTreeMap::from([
            ("at".to_string(), group(&[(0, 2e-4)])),
            ("below".to_string(), group(&[(1, 2e-4)])),
            ("above".to_string(), group(&[(0, 3e-4)])),
        ]);
        let out = remap_through_mapping(&base, &mapping());
        assert!(!out.contains_key("below"));
        assert_eq!(out["at"], group(&[(0, 2e-4)]));
        assert_eq!(out["above"].len(), 2);
    }

    #[test]
    fn test_bones_without_output_are_omitted() {
        let base = BTreeMap::from([("hand".to_string(), group(&[(7, 1.0)]))]);
        assert!(remap_through_mapping(&base, &mapping()).is_empty());
    }

    #[test]
    fn test_weights_json_parse() {
        let json = r#"{
            "name": "test",
            "version": 110,
            "license": {"author": "me", "license": "CC0"},
            "weights": {"root": [[0, 0.5], [3, 1.0]], "head": []}
        }"#;
        let w = VertexBoneWeights::from_json(Path::new("t.jsonw"), json).unwrap();
        assert_eq!(w.name, "test");
        assert_eq!(w.version, 110);
        assert_eq!(w.license.author, "me");
        assert_eq!(w.data["root"], group(&[(0, 0.5), (3, 1.0)]));
        assert!(w.data["head"].is_empty());

        let again = VertexBoneWeights::from_json(Path::new("t.jsonw"), &w.to_json().unwrap()).unwrap();
        assert_eq!(again, w);
    }

    #[test]
    fn test_weights_json_invalid() {
        let err = VertexBoneWeights::from_json(Path::new("bad.jsonw"), "{\"weights\": 3}").unwrap_err();
        assert!(matches!(err, ProxyError::WeightsFile { .. }));
    }

    #[test]
    fn test_create_keeps_metadata() {
        let w = VertexBoneWeights {
            name: "n".into(),
            version: 3,
            ..Default::default()
        };
        let data = BTreeMap::from([("b".to_string(), group(&[(1, 1.0)]))]);
        let created = w.create(data.clone());
        assert_eq!(created.name, "n");
        assert_eq!(created.version, 3);
        assert_eq!(created.data, data);
    }
}
