//! Barycentric proxy-to-base mapping and the coordinate evaluator.
//!
//! Every proxy vertex is described by up to three base-mesh vertices, their
//! weights, and an offset that is corrected by the proxy's
//! [`TransformMatrix`]. The table is stored as dense parallel arrays so that
//! evaluation is a single gather-multiply-accumulate pass over all proxy
//! vertices.
//!
//! The reverse index (base vertex → proxy vertices that depend on it) is
//! derived from the forward arrays and is never persisted.

use glam::{Mat3, Vec3};
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::error::{ProxyError, Result};
use crate::tmatrix::TransformMatrix;

/// One proxy vertex described in terms of the base mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceVertex {
    pub verts: [u32; 3],
    pub weights: [f32; 3],
    pub offset: Vec3,
}

impl ReferenceVertex {
    /// Follows a single base vertex exactly. Slots 1 and 2 are zero-filled.
    pub fn exact(vert: u32) -> Self {
        Self {
            verts: [vert, 0, 0],
            weights: [1.0, 0.0, 0.0],
            offset: Vec3::ZERO,
        }
    }

    pub fn is_exact_fit(&self) -> bool {
        self.weights[1] == 0.0 && self.weights[2] == 0.0
    }
}

/// Proxy vertices (with their mapping weight) that depend on one base vertex.
pub type ReverseEntries = SmallVec<[(u32, f32); 4]>;

/// Reverse index: base vertex → (proxy vertex, weight), positive weights only.
pub type ReverseIndex = HashMap<u32, ReverseEntries>;

fn add_reverse(reverse: &mut ReverseIndex, base: u32, proxy: u32, weight: f32) {
    if weight > 0.0 {
        reverse.entry(base).or_default().push((proxy, weight));
    }
}

fn highest_referenced(verts: &[u32; 3], weights: &[f32; 3]) -> Option<u32> {
    (0..3).filter(|&k| weights[k] != 0.0).map(|k| verts[k]).max()
}

/// Accumulates reference vertices and the reverse index while parsing.
#[derive(Debug, Default)]
pub struct MappingTableBuilder {
    ref_verts: Vec<[u32; 3]>,
    weights: Vec<[f32; 3]>,
    offsets: Vec<Vec3>,
    reverse: ReverseIndex,
    max_base_index: Option<u32>,
}

impl MappingTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ref_verts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ref_verts.is_empty()
    }

    pub fn push(&mut self, vertex: ReferenceVertex) {
        let proxy = self.ref_verts.len() as u32;
        for k in 0..3 {
            add_reverse(&mut self.reverse, vertex.verts[k], proxy, vertex.weights[k]);
        }
        self.max_base_index = self
            .max_base_index
            .max(highest_referenced(&vertex.verts, &vertex.weights));
        self.ref_verts.push(vertex.verts);
        self.weights.push(vertex.weights);
        self.offsets.push(vertex.offset);
    }

    /// Freeze into a fixed-size table.
    pub fn finish(self) -> MappingTable {
        MappingTable {
            ref_verts: self.ref_verts,
            weights: self.weights,
            offsets: self.offsets,
            reverse: self.reverse,
            max_base_index: self.max_base_index,
        }
    }
}

/// Dense mapping of proxy vertices onto the base mesh.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    ref_verts: Vec<[u32; 3]>,
    weights: Vec<[f32; 3]>,
    offsets: Vec<Vec3>,
    reverse: ReverseIndex,
    max_base_index: Option<u32>,
}

impl PartialEq for MappingTable {
    fn eq(&self, other: &Self) -> bool {
        // The reverse index is a function of the forward arrays.
        self.ref_verts == other.ref_verts
            && self.weights == other.weights
            && self.offsets == other.offsets
    }
}

impl MappingTable {
    /// Build from forward arrays, reconstructing the reverse index.
    ///
    /// All three arrays must have the same length.
    pub fn from_arrays(
        ref_verts: Vec<[u32; 3]>,
        weights: Vec<[f32; 3]>,
        offsets: Vec<Vec3>,
    ) -> Result<Self> {
        if ref_verts.len() != weights.len() || ref_verts.len() != offsets.len() {
            return Err(ProxyError::CacheCorrupt(format!(
                "mapping arrays disagree in length ({} refs, {} weights, {} offsets)",
                ref_verts.len(),
                weights.len(),
                offsets.len()
            )));
        }
        let mut builder = MappingTableBuilder {
            ref_verts: Vec::with_capacity(ref_verts.len()),
            weights: Vec::with_capacity(ref_verts.len()),
            offsets: Vec::with_capacity(ref_verts.len()),
            ..Default::default()
        };
        for ((verts, weights), offset) in ref_verts.into_iter().zip(weights).zip(offsets) {
            builder.push(ReferenceVertex {
                verts,
                weights,
                offset,
            });
        }
        Ok(builder.finish())
    }

    pub fn len(&self) -> usize {
        self.ref_verts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ref_verts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ReferenceVertex> {
        Some(ReferenceVertex {
            verts: *self.ref_verts.get(index)?,
            weights: self.weights[index],
            offset: self.offsets[index],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = ReferenceVertex> + '_ {
        self.ref_verts
            .iter()
            .zip(&self.weights)
            .zip(&self.offsets)
            .map(|((verts, weights), offset)| ReferenceVertex {
                verts: *verts,
                weights: *weights,
                offset: *offset,
            })
    }

    pub fn ref_verts(&self) -> &[[u32; 3]] {
        &self.ref_verts
    }

    pub fn weights(&self) -> &[[f32; 3]] {
        &self.weights
    }

    pub fn offsets(&self) -> &[Vec3] {
        &self.offsets
    }

    /// Proxy vertices depending on `base_vertex`, with their mapping weight.
    pub fn reverse(&self, base_vertex: u32) -> &[(u32, f32)] {
        self.reverse
            .get(&base_vertex)
            .map(|entries| entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn reverse_index(&self) -> &ReverseIndex {
        &self.reverse
    }

    /// Whether every proxy vertex follows a single base vertex.
    pub fn is_exact_fit_only(&self) -> bool {
        self.weights.iter().all(|w| w[1] == 0.0 && w[2] == 0.0)
    }

    /// Highest base vertex index that contributes to any proxy vertex.
    pub fn max_base_index(&self) -> Option<u32> {
        self.max_base_index
    }

    fn check_base(&self, coords: &[Vec3]) -> Result<()> {
        match self.max_base_index {
            Some(index) if index as usize >= coords.len() => Err(ProxyError::BaseIndexOutOfRange {
                index: index as usize,
                count: coords.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Proxy coordinates for the given base coordinates.
    pub fn evaluate(&self, coords: &[Vec3], transform: &TransformMatrix) -> Result<Vec<Vec3>> {
        let mut out = vec![Vec3::ZERO; self.len()];
        self.evaluate_into(coords, transform, &mut out)?;
        Ok(out)
    }

    /// Like [`evaluate`](Self::evaluate), writing into a caller-owned buffer.
    /// The buffer must hold exactly `len()` elements.
    pub fn evaluate_into(
        &self,
        coords: &[Vec3],
        transform: &TransformMatrix,
        out: &mut [Vec3],
    ) -> Result<()> {
        if out.len() != self.len() {
            return Err(ProxyError::OutputLengthMismatch {
                expected: self.len(),
                found: out.len(),
            });
        }
        self.check_base(coords)?;
        let matrix = transform.matrix(coords);
        self.accumulate(coords, matrix, out);
        Ok(())
    }

    fn accumulate(&self, coords: &[Vec3], matrix: Mat3, out: &mut [Vec3]) {
        let rows = self.ref_verts.iter().zip(&self.weights).zip(&self.offsets);
        for (dst, ((verts, weights), offset)) in out.iter_mut().zip(rows) {
            // Zero-weight slots are never dereferenced: exact-fit placeholders
            // may point anywhere.
            let mut p = Vec3::ZERO;
            for k in 0..3 {
                if weights[k] != 0.0 {
                    p += coords[verts[k] as usize] * weights[k];
                }
            }
            *dst = p + matrix * *offset;
        }
    }

    /// Transfer a per-base-vertex visibility mask onto the proxy.
    ///
    /// Exact-fit vertices copy their base vertex; others stay visible only if
    /// at least two of their three reference vertices are visible. Indices
    /// outside the mask count as hidden.
    pub fn transfer_vertex_mask(&self, mask: &[bool]) -> Vec<bool> {
        let visible = |v: u32| mask.get(v as usize).copied().unwrap_or(false);
        self.ref_verts
            .iter()
            .zip(&self.weights)
            .map(|(verts, weights)| {
                if weights[1] == 0.0 && weights[2] == 0.0 {
                    visible(verts[0])
                } else {
                    verts.iter().filter(|&&v| visible(v)).count() >= 2
                }
            })
            .collect()
    }
}
