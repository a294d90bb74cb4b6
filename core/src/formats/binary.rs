//! Compiled proxy codec: [`ProxyRecord`] to and from an [`Archive`].
//!
//! Strings are stored as UTF-8 byte arrays. String lists are packed into one
//! byte array (`<key>_str`) plus the byte offset of each string
//! (`<key>_idx`). Asset paths are stored relative to the compiled file's
//! directory and resolved against it again when loading.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use glam::Vec3;
use mhproxy_shared::{PROXY_FORMAT, ProxyType, fs, paths};
use tracing::{debug, warn};

use super::ProxyMetadata;
use super::archive::{self, Archive, ArchiveError, ArchiveReader, ArchiveWriter};
use crate::context::ProxyContext;
use crate::error::{ProxyError, Result};
use crate::license::AssetLicense;
use crate::mapping::MappingTable;
use crate::record::{DEFAULT_VERSION, DEFAULT_Z_DEPTH, ProxyRecord, resolve_asset};
use crate::tmatrix::{AxisEntries, ScaleEntry, ShearEntry, TransformMatrix};
use crate::weights::VertexBoneWeights;

/// Keys written to the first section of the container, ahead of geometry.
const HEADER_KEYS: [&str; 5] = ["name", "uuid", "description", "tags_str", "tags_idx"];

fn corrupt(msg: impl Into<String>) -> ProxyError {
    ProxyError::CacheCorrupt(msg.into())
}

/// Pack strings into one byte buffer plus start offsets.
pub fn pack_string_list<S: AsRef<str>>(strings: impl IntoIterator<Item = S>) -> (Vec<u8>, Vec<u32>) {
    let mut bytes = Vec::new();
    let mut index = Vec::new();
    for s in strings {
        index.push(bytes.len() as u32);
        bytes.extend_from_slice(s.as_ref().as_bytes());
    }
    (bytes, index)
}

/// Inverse of [`pack_string_list`]. The last string runs to the end.
pub fn unpack_string_list(bytes: &[u8], index: &[u32]) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(index.len());
    for (i, &start) in index.iter().enumerate() {
        let end = index.get(i + 1).map_or(bytes.len(), |&e| e as usize);
        let slice = bytes
            .get(start as usize..end)
            .ok_or_else(|| corrupt(format!("string list offset {start}..{end} out of bounds")))?;
        let s = std::str::from_utf8(slice).map_err(|e| corrupt(e.to_string()))?;
        out.push(s.to_string());
    }
    Ok(out)
}

fn insert_string_list<S: AsRef<str>>(
    archive: &mut Archive,
    key: &str,
    strings: impl IntoIterator<Item = S>,
) {
    let (bytes, index) = pack_string_list(strings);
    archive.insert(format!("{key}_str"), bytes);
    archive.insert(format!("{key}_idx"), index);
}

fn string_list(archive: &Archive, key: &str) -> Result<Vec<String>> {
    let bytes = archive.opt_u8s(&format!("{key}_str"))?;
    let index = archive.opt_u32s(&format!("{key}_idx"))?;
    match (bytes, index) {
        (Some(bytes), Some(index)) => unpack_string_list(bytes, index),
        _ => Ok(Vec::new()),
    }
}

/// Store `path` relative to `folder`, or by file name alone when it lies
/// outside every allowed root.
fn stored_path(path: &Path, folder: &Path, jail_limits: &[PathBuf]) -> String {
    paths::jailed_path(path, folder, jail_limits).unwrap_or_else(|| {
        warn!(
            "{} is outside the asset roots, storing file name only",
            path.display()
        );
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    })
}

fn pack_scales(entries: &AxisEntries<ScaleEntry>) -> (Vec<f32>, Vec<u32>) {
    let mut scales = Vec::with_capacity(3);
    let mut idx = Vec::with_capacity(6);
    for entry in entries {
        match entry {
            Some(e) => {
                scales.push(e.denominator);
                idx.extend([e.vert_a, e.vert_b]);
            }
            None => {
                scales.push(f32::NAN);
                idx.extend([0, 0]);
            }
        }
    }
    (scales, idx)
}

fn pack_shears(entries: &AxisEntries<ShearEntry>) -> (Vec<f32>, Vec<u32>) {
    let mut shears = Vec::with_capacity(6);
    let mut idx = Vec::with_capacity(6);
    for entry in entries {
        match entry {
            Some(e) => {
                shears.extend(e.source);
                idx.extend([e.vert_a, e.vert_b]);
            }
            None => {
                shears.extend([f32::NAN; 2]);
                idx.extend([0, 0]);
            }
        }
    }
    (shears, idx)
}

fn unpack_scales(scales: &[f32], idx: &[u32]) -> AxisEntries<ScaleEntry> {
    let mut entries = [None; 3];
    for (axis, entry) in entries.iter_mut().enumerate().take(scales.len().min(idx.len() / 2)) {
        let denominator = scales[axis];
        if !denominator.is_nan() {
            *entry = Some(ScaleEntry {
                vert_a: idx[axis * 2],
                vert_b: idx[axis * 2 + 1],
                denominator,
            });
        }
    }
    entries
}

fn unpack_shears(shears: &[f32], idx: &[u32]) -> AxisEntries<ShearEntry> {
    let mut entries = [None; 3];
    for (axis, entry) in entries.iter_mut().enumerate().take((shears.len() / 2).min(idx.len() / 2)) {
        let source = [shears[axis * 2], shears[axis * 2 + 1]];
        if !source[0].is_nan() && !source[1].is_nan() {
            *entry = Some(ShearEntry {
                vert_a: idx[axis * 2],
                vert_b: idx[axis * 2 + 1],
                source,
            });
        }
    }
    entries
}

const SHEAR_KEYS: [&str; 3] = ["tmat_shear", "tmat_lshear", "tmat_rshear"];

fn encode_transform(archive: &mut Archive, transform: &TransformMatrix) {
    if let Some(scale) = &transform.scale {
        let (scales, idx) = pack_scales(scale);
        archive.insert("tmat_scale", scales);
        archive.insert("tmat_scale_idx", idx);
    }
    let tables = [&transform.shear, &transform.left_shear, &transform.right_shear];
    for (key, table) in SHEAR_KEYS.iter().zip(tables) {
        if let Some(table) = table {
            let (shears, idx) = pack_shears(table);
            archive.insert(*key, shears);
            archive.insert(format!("{key}_idx"), idx);
        }
    }
}

fn decode_transform(archive: &Archive) -> Result<TransformMatrix> {
    let mut transform = TransformMatrix::new();
    if let (Some(scales), Some(idx)) =
        (archive.opt_f32s("tmat_scale")?, archive.opt_u32s("tmat_scale_idx")?)
    {
        transform.scale = Some(unpack_scales(scales, idx));
    }
    let mut tables = [None; 3];
    for (key, table) in SHEAR_KEYS.iter().zip(tables.iter_mut()) {
        if let (Some(shears), Some(idx)) =
            (archive.opt_f32s(key)?, archive.opt_u32s(&format!("{key}_idx"))?)
        {
            *table = Some(unpack_shears(shears, idx));
        }
    }
    let [shear, left_shear, right_shear] = tables;
    transform.shear = shear;
    transform.left_shear = left_shear;
    transform.right_shear = right_shear;
    Ok(transform)
}

fn encode_mapping(archive: &mut Archive, mapping: &MappingTable) {
    let has_offsets = mapping.offsets().iter().any(|o| *o != Vec3::ZERO);
    if mapping.is_exact_fit_only() {
        archive.insert("num_refverts", vec![1i32]);
        archive.insert(
            "ref_vIdxs",
            mapping.ref_verts().iter().map(|v| v[0]).collect::<Vec<u32>>(),
        );
        archive.insert(
            "weights",
            mapping.weights().iter().map(|w| w[0]).collect::<Vec<f32>>(),
        );
    } else {
        archive.insert("num_refverts", vec![3i32]);
        archive.insert("ref_vIdxs", mapping.ref_verts().as_flattened().to_vec());
        archive.insert("weights", mapping.weights().as_flattened().to_vec());
    }
    if has_offsets || !mapping.is_exact_fit_only() {
        archive.insert(
            "offsets",
            mapping
                .offsets()
                .iter()
                .flat_map(|o| o.to_array())
                .collect::<Vec<f32>>(),
        );
    }
}

fn decode_mapping(archive: &Archive) -> Result<MappingTable> {
    let num_refverts = archive.i32_scalar("num_refverts")?;
    let ref_verts = archive.u32s("ref_vIdxs")?;
    let weights = archive.f32s("weights")?;
    let offsets = archive.opt_f32s("offsets")?;

    let (ref_verts, weights): (Vec<[u32; 3]>, Vec<[f32; 3]>) = match num_refverts {
        1 => {
            if ref_verts.len() != weights.len() {
                return Err(corrupt("single-reference arrays disagree in length"));
            }
            (
                ref_verts.iter().map(|&v| [v, 0, 0]).collect(),
                weights.iter().map(|&w| [w, 0.0, 0.0]).collect(),
            )
        }
        3 => {
            if ref_verts.len() % 3 != 0 || weights.len() % 3 != 0 {
                return Err(corrupt("reference arrays are not a multiple of 3"));
            }
            (
                ref_verts.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
                weights.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
            )
        }
        n => return Err(corrupt(format!("unsupported num_refverts {n}"))),
    };

    let offsets = match offsets {
        Some(flat) if flat.len() % 3 != 0 => {
            return Err(corrupt("offsets are not a multiple of 3"));
        }
        Some(flat) => flat.chunks_exact(3).map(Vec3::from_slice).collect(),
        None => vec![Vec3::ZERO; ref_verts.len()],
    };

    MappingTable::from_arrays(ref_verts, weights, offsets)
}

/// Build the archive for `record`, to be written at `target`.
pub fn encode(record: &ProxyRecord, target: &Path, ctx: &ProxyContext) -> Archive {
    let folder = target.parent().unwrap_or(Path::new(""));
    let jail = ctx.jail_limits();
    let stored = |path: &Path| stored_path(path, folder, &jail);

    let mut archive = Archive::new();
    archive.insert("name", record.name.as_str());
    archive.insert("uuid", record.uuid.as_deref().unwrap_or(""));
    archive.insert("description", record.description.as_str());
    archive.insert("basemesh", record.basemesh.as_str());
    archive.insert("version", vec![record.version as i32]);
    insert_string_list(&mut archive, "tags", &record.tags);
    insert_string_list(&mut archive, "lic", record.license.to_string_list());
    insert_string_list(
        &mut archive,
        "uvLayers",
        record.uv_layers.values().map(|p| stored(p.as_path())),
    );
    insert_string_list(
        &mut archive,
        "special_pose",
        record
            .special_poses
            .iter()
            .flat_map(|(kind, pose)| [kind.as_str(), pose.as_str()]),
    );
    archive.insert(
        "obj_file",
        record.obj_file.as_deref().map(&stored).unwrap_or_default().as_str(),
    );

    if let Some(file) = &record.material_file {
        archive.insert("material_file", stored(file).as_str());
    }
    if let Some(file) = &record.vertex_bone_weights_file {
        archive.insert("vertexBoneWeights_file", stored(file).as_str());
    }
    if record.delete_verts.iter().any(|&d| d) {
        archive.insert("deleteVerts", record.delete_verts.clone());
    }
    if record.z_depth != -1 {
        archive.insert("z_depth", vec![record.z_depth]);
    }
    if record.max_pole != 0 {
        archive.insert("max_pole", vec![record.max_pole]);
    }

    encode_transform(&mut archive, &record.transform);
    encode_mapping(&mut archive, &record.mapping);
    archive
}

/// Rebuild a record from a decoded archive read from `path`.
pub fn decode(
    archive: &Archive,
    path: &Path,
    proxy_type: ProxyType,
    base_vertex_count: usize,
    ctx: &ProxyContext,
) -> Result<ProxyRecord> {
    let folder = path.parent().unwrap_or(Path::new("")).to_path_buf();
    let mut record = ProxyRecord::new(
        PROXY_FORMAT.text_path(path, proxy_type),
        proxy_type,
        base_vertex_count,
        ctx,
    );

    record.name = archive.str("name")?.to_string();
    record.uuid = archive
        .opt_str("uuid")?
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    if let Some(description) = archive.opt_str("description")? {
        record.description = description.to_string();
    }
    if let Some(basemesh) = archive.opt_str("basemesh")? {
        record.basemesh = basemesh.to_string();
    }
    record.version = match archive.opt_i32s("version")? {
        Some(v) => v.first().map_or(DEFAULT_VERSION, |&v| v as u32),
        None => DEFAULT_VERSION,
    };
    if archive.contains("lic_str") && archive.contains("lic_idx") {
        record.license = AssetLicense::from_string_list(&string_list(archive, "lic")?);
    }
    record.tags = string_list(archive, "tags")?.into_iter().collect::<BTreeSet<_>>();
    for pair in string_list(archive, "special_pose")?.chunks_exact(2) {
        record.special_poses.insert(pair[0].clone(), pair[1].clone());
    }
    record.uv_layers = string_list(archive, "uvLayers")?
        .iter()
        .enumerate()
        .map(|(i, p)| (i as u32, paths::resolve_relative(&folder, p)))
        .collect::<BTreeMap<_, _>>();

    if let Some(z) = archive.opt_i32s("z_depth")? {
        record.z_depth = z.first().copied().unwrap_or(-1);
    }
    if record.z_depth == -1 {
        warn!(
            "compiled proxy {} does not specify a z depth, using {DEFAULT_Z_DEPTH}",
            path.display()
        );
        record.z_depth = DEFAULT_Z_DEPTH;
    }
    if let Some(pole) = archive.opt_u32s("max_pole")? {
        record.max_pole = pole.first().copied().unwrap_or(0);
    }

    record.mapping = decode_mapping(archive)?;
    if let Some(max) = record.mapping.max_base_index() {
        if max as usize >= base_vertex_count {
            return Err(corrupt(format!(
                "references base vertex {max} but the base mesh has {base_vertex_count}"
            )));
        }
    }
    record.transform = decode_transform(archive)?;

    if let Some(mask) = archive.opt_bools("deleteVerts")? {
        if mask.len() != base_vertex_count {
            return Err(corrupt(format!(
                "delete mask covers {} vertices, base mesh has {base_vertex_count}",
                mask.len()
            )));
        }
        record.delete_verts = mask.to_vec();
    }

    if let Some(obj) = archive.opt_str("obj_file")?.filter(|s| !s.is_empty()) {
        record.obj_file = Some(resolve_asset(&folder, obj, PROXY_FORMAT.obj_ext, &["npz", "obj"], ctx));
    }
    if let Some(file) = archive.opt_str("material_file")?.filter(|s| !s.is_empty()) {
        let file = resolve_asset(&folder, file, PROXY_FORMAT.material_ext, &[], ctx);
        match ctx.materials.load_material(&file) {
            Ok(material) => record.material = material,
            Err(e) => warn!("proxy {}: unable to load material: {e}", path.display()),
        }
        record.material_file = Some(file);
    }
    if let Some(file) = archive.opt_str("vertexBoneWeights_file")?.filter(|s| !s.is_empty()) {
        let file = resolve_asset(&folder, file, PROXY_FORMAT.weights_ext, &[], ctx);
        match VertexBoneWeights::from_file(&file) {
            Ok(weights) => record.vertex_bone_weights = Some(weights),
            Err(e) => warn!("proxy {}: {e}", path.display()),
        }
        record.vertex_bone_weights_file = Some(file);
    }

    Ok(record)
}

/// Compile `record` to `path`.
///
/// The file's modification time is set to now afterwards so it is never
/// older than the source it was compiled from.
pub fn save_binary_proxy(record: &ProxyRecord, path: &Path, ctx: &ProxyContext) -> Result<()> {
    let write_failure = |source: std::io::Error| ProxyError::CacheWriteFailure {
        path: path.to_path_buf(),
        source,
    };
    let mut body = encode(record, path, ctx);
    let header = body.split_off_keys(&HEADER_KEYS);
    let mut bytes = Vec::new();
    ArchiveWriter::new(&mut bytes)
        .write_sections(&[&header, &body])
        .map_err(|e| match e {
            ArchiveError::Io(source) => write_failure(source),
            other => write_failure(std::io::Error::other(other.to_string())),
        })?;
    std::fs::write(path, &bytes).map_err(write_failure)?;
    std::fs::File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(SystemTime::now()))
        .map_err(write_failure)?;
    debug!(path = %path.display(), bytes = bytes.len(), "wrote compiled proxy");
    Ok(())
}

/// Load a compiled proxy.
pub fn load_binary_proxy(
    path: &Path,
    proxy_type: ProxyType,
    base_vertex_count: usize,
    ctx: &ProxyContext,
) -> Result<ProxyRecord> {
    debug!(path = %path.display(), "loading compiled proxy");
    let bytes = fs::read_capped(path, fs::MAX_CACHE_BYTES).map_err(|e| ProxyError::io(path, e))?;
    let archive = archive::from_bytes(&bytes)?;
    let mut record = decode(&archive, path, proxy_type, base_vertex_count, ctx)?;
    record.mtime = std::fs::metadata(path).and_then(|m| m.modified()).ok();
    Ok(record)
}

/// Read uuid and tags from a compiled proxy.
///
/// Only the header section is read; the geometry section is never loaded.
pub fn peek_binary_metadata(path: &Path) -> Result<ProxyMetadata> {
    let file = File::open(path).map_err(|e| ProxyError::io(path, e))?;
    let archive = ArchiveReader::new(BufReader::new(file)).read_first_section()?;
    Ok(ProxyMetadata {
        uuid: archive
            .opt_str("uuid")?
            .filter(|u| !u.is_empty())
            .map(str::to_string),
        tags: string_list(&archive, "tags")?.into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::formats::text::parse_proxy_str;

    fn ctx() -> ProxyContext {
        let mut config = ProxyConfig::default();
        config.paths.user_data_dir = None;
        ProxyContext::new(config)
    }

    const SOURCE: &str = "\
name Sweater
uuid 0f6b-11
description knitted
tag Top
tag winter
license CC0
author: Someone
z_depth 40
max_pole 5
special_pose foot flat
special_pose hand fist
x_scale 0 1 2.0
l_shear_z 1 2 0.5 1.5
uvLayer 1 sweater_uv
obj_file sweater.obj
delete_verts
1 - 3
verts
4
0 1 2 0.2 0.3 0.5 0.01 0 -0.02
";

    fn roundtrip(text: &str, base_verts: usize) -> (ProxyRecord, ProxyRecord) {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("sweater.mhclo");
        let ctx = ctx();
        let record = parse_proxy_str(text, &src, ProxyType::Clothes, base_verts, &ctx);
        let target = PROXY_FORMAT.binary_path(&src);
        save_binary_proxy(&record, &target, &ctx).unwrap();
        let back = load_binary_proxy(&target, ProxyType::Clothes, base_verts, &ctx).unwrap();
        (record, back)
    }

    #[test]
    fn test_string_list_packing() {
        let (bytes, idx) = pack_string_list(["ab", "", "cde"]);
        assert_eq!(bytes, b"abcde");
        assert_eq!(idx, vec![0, 2, 2]);
        assert_eq!(unpack_string_list(&bytes, &idx).unwrap(), vec!["ab", "", "cde"]);
        assert!(unpack_string_list(b"ab", &[0, 5]).is_err());
    }

    #[test]
    fn test_roundtrip_full_record() {
        let (record, back) = roundtrip(SOURCE, 10);
        assert_eq!(back.name, record.name);
        assert_eq!(back.uuid, record.uuid);
        assert_eq!(back.description, record.description);
        assert_eq!(back.tags, record.tags);
        assert_eq!(back.license, record.license);
        assert_eq!(back.z_depth, 40);
        assert_eq!(back.max_pole, 10);
        assert_eq!(back.special_poses, record.special_poses);
        assert_eq!(back.mapping, record.mapping);
        assert_eq!(back.transform, record.transform);
        assert_eq!(back.delete_verts, record.delete_verts);
        assert_eq!(back.version, record.version);
        assert_eq!(back.basemesh, record.basemesh);
        assert_eq!(back.obj_file, record.obj_file);
        assert_eq!(back.uv_layers.len(), 1);
        assert_eq!(back.uv_layers[&0], record.uv_layers[&1]);
        assert_eq!(back.mapping.reverse(0), record.mapping.reverse(0));
    }

    #[test]
    fn test_exact_fit_uses_single_column() {
        let ctx = ctx();
        let record = parse_proxy_str(
            "verts\n3\n1\n",
            Path::new("/x/a.mhclo"),
            ProxyType::Clothes,
            5,
            &ctx,
        );
        let archive = encode(&record, Path::new("/x/a.mhpxy"), &ctx);
        assert_eq!(archive.i32_scalar("num_refverts").unwrap(), 1);
        assert_eq!(archive.u32s("ref_vIdxs").unwrap(), &[3, 1]);
        assert!(!archive.contains("offsets"));
        assert!(!archive.contains("deleteVerts"));
        assert!(!archive.contains("material_file"));

        let back = decode(&archive, Path::new("/x/a.mhpxy"), ProxyType::Clothes, 5, &ctx).unwrap();
        assert_eq!(back.mapping, record.mapping);
        assert_eq!(back.mapping.ref_verts(), &[[3, 0, 0], [1, 0, 0]]);
        assert_eq!(back.mapping.weights()[0], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_triple_layout() {
        let (record, back) = roundtrip("verts\n1 2 3 0.5 0.5 0\n", 5);
        assert_eq!(back.mapping, record.mapping);
        let ctx = ctx();
        let archive = encode(&record, Path::new("/x/a.mhpxy"), &ctx);
        assert_eq!(archive.i32_scalar("num_refverts").unwrap(), 3);
        assert_eq!(archive.u32s("ref_vIdxs").unwrap().len(), 3);
    }

    #[test]
    fn test_missing_transform_axes_are_nan() {
        let mut archive = Archive::new();
        encode_transform(&mut archive, &{
            let mut t = TransformMatrix::new();
            t.set_scale(1, ScaleEntry { vert_a: 4, vert_b: 5, denominator: 2.0 });
            t
        });
        let scales = archive.f32s("tmat_scale").unwrap();
        assert!(scales[0].is_nan() && scales[2].is_nan());
        assert_eq!(scales[1], 2.0);
        assert_eq!(archive.u32s("tmat_scale_idx").unwrap(), &[0, 0, 4, 5, 0, 0]);
        assert!(!archive.contains("tmat_shear"));

        let t = decode_transform(&archive).unwrap();
        let scale = t.scale.unwrap();
        assert!(scale[0].is_none() && scale[2].is_none());
        assert!(t.shear.is_none() && t.left_shear.is_none() && t.right_shear.is_none());
    }

    #[test]
    fn test_decode_defaults_optional_keys() {
        let mut archive = Archive::new();
        archive.insert("name", "Old");
        archive.insert("num_refverts", vec![1i32]);
        archive.insert("ref_vIdxs", vec![0u32]);
        archive.insert("weights", vec![1.0f32]);

        let back = decode(&archive, Path::new("/x/old.mhpxy"), ProxyType::Eyes, 2, &ctx()).unwrap();
        assert_eq!(back.name, "Old");
        assert_eq!(back.uuid(), "Old");
        assert_eq!(back.version, DEFAULT_VERSION);
        assert_eq!(back.z_depth, DEFAULT_Z_DEPTH);
        assert_eq!(back.delete_verts, vec![false, false]);
        assert!(back.tags.is_empty());
        assert!(back.obj_file.is_none());
        assert_eq!(back.file, Path::new("/x/old.mhclo"));
    }

    #[test]
    fn test_decode_rejects_inconsistent_data() {
        let mut archive = Archive::new();
        archive.insert("name", "Bad");
        archive.insert("num_refverts", vec![3i32]);
        archive.insert("ref_vIdxs", vec![0u32, 1]);
        archive.insert("weights", vec![1.0f32, 0.0]);
        assert!(decode(&archive, Path::new("/x/b.mhpxy"), ProxyType::Eyes, 2, &ctx()).is_err());

        let mut archive = Archive::new();
        archive.insert("name", "Bad");
        archive.insert("num_refverts", vec![1i32]);
        archive.insert("ref_vIdxs", vec![9u32]);
        archive.insert("weights", vec![1.0f32]);
        let err = decode(&archive, Path::new("/x/b.mhpxy"), ProxyType::Eyes, 2, &ctx()).unwrap_err();
        assert!(matches!(err, ProxyError::CacheCorrupt(_)));

        let mut archive = Archive::new();
        archive.insert("name", "Bad");
        archive.insert("num_refverts", vec![1i32]);
        archive.insert("ref_vIdxs", vec![0u32]);
        archive.insert("weights", vec![1.0f32]);
        archive.insert("deleteVerts", vec![true]);
        let err = decode(&archive, Path::new("/x/b.mhpxy"), ProxyType::Eyes, 2, &ctx()).unwrap_err();
        assert!(matches!(err, ProxyError::CacheCorrupt(_)));
    }

    #[test]
    fn test_missing_required_key() {
        let archive = Archive::new();
        let err = decode(&archive, Path::new("/x/c.mhpxy"), ProxyType::Eyes, 2, &ctx()).unwrap_err();
        assert!(matches!(err, ProxyError::CacheCorrupt(_)));
    }

    #[test]
    fn test_paths_stored_relative() {
        let ctx = ctx();
        let mut record = ProxyRecord::new("/assets/hair/bob.mhclo", ProxyType::Hair, 0, &ctx);
        record.obj_file = Some(PathBuf::from("/assets/hair/meshes/bob.obj"));
        record.material_file = Some(PathBuf::from("/assets/hair/bob.mhmat"));
        let archive = encode(&record, Path::new("/assets/hair/bob.mhpxy"), &ctx);
        assert_eq!(archive.str("obj_file").unwrap(), "meshes/bob.obj");
        assert_eq!(archive.str("material_file").unwrap(), "bob.mhmat");
    }

    #[test]
    fn test_peek_binary() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx();
        let src = dir.path().join("p.mhclo");
        let record = parse_proxy_str("uuid u-1\ntag A\ntag b\n", &src, ProxyType::Clothes, 0, &ctx);
        let target = PROXY_FORMAT.binary_path(&src);
        save_binary_proxy(&record, &target, &ctx).unwrap();

        let meta = peek_binary_metadata(&target).unwrap();
        assert_eq!(meta.uuid.as_deref(), Some("u-1"));
        assert_eq!(meta.tags, BTreeSet::from(["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_peek_reads_header_section_only() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx();
        let src = dir.path().join("q.mhclo");
        let record = parse_proxy_str(
            "uuid u-2\ntag Hat\ndelete_verts\n1\nverts\n0 1 2 0.5 0.5 0\n",
            &src,
            ProxyType::Clothes,
            3,
            &ctx,
        );
        let target = PROXY_FORMAT.binary_path(&src);
        save_binary_proxy(&record, &target, &ctx).unwrap();

        let mut bytes = std::fs::read(&target).unwrap();
        let mut cursor = std::io::Cursor::new(bytes.as_slice());
        let header = ArchiveReader::new(&mut cursor).read_first_section().unwrap();
        let header_end = cursor.position() as usize;
        assert!(header.contains("uuid") && header.contains("tags_str"));
        for key in ["ref_vIdxs", "weights", "offsets", "deleteVerts", "num_refverts"] {
            assert!(!header.contains(key), "{key} in header section");
        }

        // Geometry section destroyed: peek still works, a full load does not
        for b in &mut bytes[header_end + 4..] {
            *b = 0xAB;
        }
        std::fs::write(&target, &bytes).unwrap();
        let meta = peek_binary_metadata(&target).unwrap();
        assert_eq!(meta.uuid.as_deref(), Some("u-2"));
        assert_eq!(meta.tags, BTreeSet::from(["hat".to_string()]));
        assert!(load_binary_proxy(&target, ProxyType::Clothes, 3, &ctx).is_err());
    }
}
