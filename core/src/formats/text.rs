//! Line-oriented text proxy sources (`.mhclo`, `.proxy`).
//!
//! Each line is split on whitespace. The first token is matched against the
//! directive keywords; lines that are not directives belong to the block
//! opened by the last `verts`, `weights` or `delete_verts` directive. Blank
//! lines do not close a block.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use glam::Vec3;
use mhproxy_shared::{PROXY_FORMAT, ProxyType, fs};
use tracing::{debug, warn};

use super::ProxyMetadata;
use crate::context::{Material, ProxyContext};
use crate::error::{ProxyError, Result};
use crate::mapping::{MappingTableBuilder, ReferenceVertex};
use crate::record::{DEFAULT_Z_DEPTH, ProxyRecord, resolve_asset};
use crate::tmatrix::{ScaleEntry, ShearEntry, ShearSide};
use crate::weights::VertexBoneWeights;

/// Initial `max_pole` when a source does not set one. Doubled after parsing
/// like any declared value.
pub const DEFAULT_MAX_POLE: u32 = 8;

/// Keywords accepted for compatibility and otherwise ignored.
const DEPRECATED_KEYWORDS: &[&str] = &[
    "backface_culling",
    "transparent",
    "shapekey",
    "subsurf",
    "shrinkwrap",
    "solidify",
    "objfile_layer",
    "uvtex_layer",
    "use_projection",
    "mask_uv_layer",
    "texture_uv_layer",
    "delete",
    "vertexgroup_file",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    None,
    RefVerts,
    Weights,
    DeleteVerts,
}

/// Parse a text proxy from disk.
pub fn parse_proxy_file(
    path: &Path,
    proxy_type: ProxyType,
    base_vertex_count: usize,
    ctx: &ProxyContext,
) -> Result<ProxyRecord> {
    let bytes = fs::read_capped(path, fs::MAX_SOURCE_BYTES).map_err(|e| ProxyError::io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);
    let mut record = parse_proxy_str(&text, path, proxy_type, base_vertex_count, ctx);
    record.mtime = std::fs::metadata(path).and_then(|m| m.modified()).ok();
    Ok(record)
}

/// Parse text proxy source already in memory. `path` names the source for
/// relative asset lookups and messages.
///
/// Bad lines are logged and skipped, so parsing itself cannot fail.
pub fn parse_proxy_str(
    text: &str,
    path: &Path,
    proxy_type: ProxyType,
    base_vertex_count: usize,
    ctx: &ProxyContext,
) -> ProxyRecord {
    let mut parser = Parser::new(path, proxy_type, base_vertex_count, ctx);
    for (idx, line) in text.lines().enumerate() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        if let Err(err) = parser.line(line, &words) {
            warn!("{}", ProxyError::MalformedDirective {
                path: path.to_path_buf(),
                line: idx + 1,
                keyword: words[0].to_string(),
                reason: err,
            });
        }
    }
    parser.finish()
}

struct Parser<'a> {
    path: &'a Path,
    folder: PathBuf,
    ctx: &'a ProxyContext,
    record: ProxyRecord,
    mapping: MappingTableBuilder,
    block: Block,
    weights_name: Option<String>,
    /// Last index of a `delete_verts` block; kept across lines so a range can
    /// start on the previous line.
    last_deleted: Option<usize>,
}

type LineResult = std::result::Result<(), String>;

fn arg<T: FromStr>(words: &[&str], i: usize) -> std::result::Result<T, String> {
    let token = words
        .get(i)
        .ok_or_else(|| format!("expected at least {} arguments", i))?;
    token
        .parse()
        .map_err(|_| format!("cannot parse `{token}`"))
}

fn rest(words: &[&str]) -> String {
    words[1..].join(" ")
}

fn axis_of(keyword: &str) -> usize {
    match keyword {
        "x_scale" | "shear_x" | "l_shear_x" | "r_shear_x" => 0,
        "y_scale" | "shear_y" | "l_shear_y" | "r_shear_y" => 1,
        _ => 2,
    }
}

impl<'a> Parser<'a> {
    fn new(
        path: &'a Path,
        proxy_type: ProxyType,
        base_vertex_count: usize,
        ctx: &'a ProxyContext,
    ) -> Self {
        let mut record = ProxyRecord::new(path, proxy_type, base_vertex_count, ctx);
        record.max_pole = DEFAULT_MAX_POLE;
        Self {
            path,
            folder: record.folder().to_path_buf(),
            ctx,
            record,
            mapping: MappingTableBuilder::new(),
            block: Block::None,
            weights_name: None,
            last_deleted: None,
        }
    }

    fn line(&mut self, line: &str, words: &[&str]) -> LineResult {
        let key = words[0];
        if key.starts_with('#') {
            self.record.license.update_from_comment(line);
            return Ok(());
        }

        match key {
            "name" => self.record.name = rest(words),
            "uuid" => {
                let uuid = rest(words);
                self.record.uuid = (!uuid.is_empty()).then_some(uuid);
            }
            "description" => self.record.description = rest(words),
            "author" | "license" | "homepage" | "author:" | "license:" => {
                self.record.license.update_from_comment(line)
            }
            "tag" => {
                self.record.tags.insert(rest(words).to_lowercase());
            }
            "version" => self.record.version = arg(words, 1)?,
            "z_depth" => self.record.z_depth = arg(words, 1)?,
            "max_pole" => self.record.max_pole = arg(words, 1)?,
            "special_pose" => {
                let pose_type: String = arg(words, 1)?;
                let pose: String = arg(words, 2)?;
                self.record.special_poses.insert(pose_type, pose);
            }

            "verts" => self.block = Block::RefVerts,
            "weights" => {
                let name: String = arg(words, 1)?;
                self.record.weight_lists.insert(name.clone(), Vec::new());
                self.weights_name = Some(name);
                self.block = Block::Weights;
            }
            "delete_verts" => self.block = Block::DeleteVerts,

            "obj_file" => {
                let file: String = arg(words, 1)?;
                self.record.obj_file = Some(self.asset(&file, PROXY_FORMAT.obj_ext, &["npz", "obj"]));
            }
            "material" => {
                let file: String = arg(words, 1)?;
                let path = self.asset(&file, PROXY_FORMAT.material_ext, &[]);
                self.load_material(&path);
                self.record.material_file = Some(path);
            }
            "vertexboneweights_file" => {
                let file: String = arg(words, 1)?;
                let path = self.asset(&file, PROXY_FORMAT.weights_ext, &[]);
                match VertexBoneWeights::from_file(&path) {
                    Ok(weights) => self.record.vertex_bone_weights = Some(weights),
                    Err(e) => warn!("proxy {}: {e}", self.path.display()),
                }
                self.record.vertex_bone_weights_file = Some(path);
            }
            "uvLayer" => {
                let (layer, file): (u32, String) = if words.len() > 2 {
                    (arg(words, 1)?, arg(words, 2)?)
                } else {
                    (0, arg(words, 1)?)
                };
                let path = mhproxy_shared::paths::file_name_with_suffix(
                    &self.folder,
                    &file,
                    PROXY_FORMAT.uv_ext,
                );
                self.record.uv_layers.insert(layer, path);
            }

            "x_scale" | "y_scale" | "z_scale" => {
                let entry = ScaleEntry {
                    vert_a: arg(words, 1)?,
                    vert_b: arg(words, 2)?,
                    denominator: arg(words, 3)?,
                };
                self.record.transform.set_scale(axis_of(key), entry);
            }
            "shear_x" | "shear_y" | "shear_z" => self.shear(words, ShearSide::Plain)?,
            "l_shear_x" | "l_shear_y" | "l_shear_z" => self.shear(words, ShearSide::Left)?,
            "r_shear_x" | "r_shear_y" | "r_shear_z" => self.shear(words, ShearSide::Right)?,

            "basemesh" => self.record.basemesh = arg(words, 1)?,

            _ if DEPRECATED_KEYWORDS.contains(&key) => {
                warn!(
                    "deprecated keyword `{key}` in proxy file {}, please remove",
                    self.path.display()
                );
            }

            _ => match self.block {
                Block::RefVerts => self.ref_vert(words)?,
                Block::Weights => self.weight(words)?,
                Block::DeleteVerts => self.delete_verts(words)?,
                Block::None => return Err("unknown keyword".to_string()),
            },
        }
        Ok(())
    }

    fn asset(&self, file: &str, suffix: &str, alternates: &[&str]) -> PathBuf {
        resolve_asset(&self.folder, file, suffix, alternates, self.ctx)
    }

    fn load_material(&mut self, path: &Path) {
        match self.ctx.materials.load_material(path) {
            Ok(material) => self.record.material = material,
            Err(e) => {
                warn!("proxy {}: unable to load material: {e}", self.path.display());
                self.record.material = Material::new(self.record.name.clone());
            }
        }
    }

    fn shear(&mut self, words: &[&str], side: ShearSide) -> LineResult {
        let entry = ShearEntry {
            vert_a: arg(words, 1)?,
            vert_b: arg(words, 2)?,
            source: [arg(words, 3)?, arg(words, 4)?],
        };
        self.record.transform.set_shear(axis_of(words[0]), side, entry);
        Ok(())
    }

    fn ref_vert(&mut self, words: &[&str]) -> LineResult {
        let vertex = match words.len() {
            1 => ReferenceVertex::exact(arg(words, 0)?),
            6..=9 => {
                let offset = if words.len() > 6 {
                    Vec3::new(arg(words, 6)?, arg(words, 7)?, arg(words, 8)?)
                } else {
                    Vec3::ZERO
                };
                ReferenceVertex {
                    verts: [arg(words, 0)?, arg(words, 1)?, arg(words, 2)?],
                    weights: [arg(words, 3)?, arg(words, 4)?, arg(words, 5)?],
                    offset,
                }
            }
            n => return Err(format!("reference vertex needs 1 or 6 to 9 values, got {n}")),
        };
        self.mapping.push(vertex);
        Ok(())
    }

    fn weight(&mut self, words: &[&str]) -> LineResult {
        let pair = (arg(words, 0)?, arg(words, 1)?);
        if let Some(list) = self
            .weights_name
            .as_ref()
            .and_then(|name| self.record.weight_lists.get_mut(name))
        {
            list.push(pair);
        }
        Ok(())
    }

    fn delete_verts(&mut self, words: &[&str]) -> LineResult {
        let count = self.record.delete_verts.len();
        let mut range = false;
        for token in words {
            if *token == "-" {
                range = true;
                continue;
            }
            let index: usize = token
                .parse()
                .map_err(|_| format!("cannot parse `{token}`"))?;
            let start = match (range, self.last_deleted) {
                (true, Some(previous)) => previous,
                _ => index,
            };
            if index >= count {
                warn!(
                    "proxy {}: deleted vertex {index} outside base mesh of {count} vertices",
                    self.path.display()
                );
            }
            // A descending range marks nothing
            for flag in self
                .record
                .delete_verts
                .iter_mut()
                .take(index.saturating_add(1))
                .skip(start)
            {
                *flag = true;
            }
            range = false;
            self.last_deleted = Some(index);
        }
        Ok(())
    }

    fn finish(mut self) -> ProxyRecord {
        if self.record.z_depth == -1 {
            warn!(
                "proxy file {} does not specify a z depth, using {DEFAULT_Z_DEPTH}",
                self.path.display()
            );
            self.record.z_depth = DEFAULT_Z_DEPTH;
        }
        // Neighbor planes are computed against twice the pole limit
        self.record.max_pole = self.record.max_pole.saturating_mul(2);
        self.record.mapping = self.mapping.finish();
        debug!(
            path = %self.path.display(),
            verts = self.record.mapping.len(),
            "parsed text proxy"
        );
        self.record
    }
}

/// Read uuid and tags from a text proxy, stopping at the vertex block.
pub fn peek_text_metadata(path: &Path) -> Result<ProxyMetadata> {
    let file = File::open(path).map_err(|e| ProxyError::io(path, e))?;
    let mut meta = ProxyMetadata::default();
    for line in BufReader::new(file).split(b'\n') {
        let line = line.map_err(|e| ProxyError::io(path, e))?;
        let line = String::from_utf8_lossy(&line);
        let mut words = line.split_whitespace();
        match words.next() {
            Some("uuid") => meta.uuid = words.next().map(str::to_string),
            Some("tag") => {
                meta.tags.insert(words.collect::<Vec<_>>().join(" ").to_lowercase());
            }
            Some("verts") => break,
            _ => {}
        }
    }
    Ok(meta)
}
