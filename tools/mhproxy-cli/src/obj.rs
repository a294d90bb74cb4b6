//! Minimal OBJ vertex I/O
//!
//! Only `v` lines matter here: the base mesh is read for its positions and
//! fitted proxies are written back as positions only.

use anyhow::{Context, Result, bail};
use glam::Vec3;
use mhproxy_shared::fs::{MAX_SOURCE_BYTES, read_file_with_limit};
use std::io::Write;
use std::path::Path;

/// Read vertex positions from an OBJ file, in file order.
pub fn read_positions(input: &Path) -> Result<Vec<Vec3>> {
    let bytes = read_file_with_limit(input, MAX_SOURCE_BYTES)?;
    let text = String::from_utf8_lossy(&bytes);
    let positions = parse_positions(&text)
        .with_context(|| format!("Failed to parse OBJ: {}", input.display()))?;
    if positions.is_empty() {
        bail!("No vertices found in OBJ file {}", input.display());
    }
    Ok(positions)
}

fn parse_positions(text: &str) -> Result<Vec<Vec3>> {
    let mut positions = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts[0] != "v" {
            continue;
        }
        if parts.len() < 4 {
            bail!("line {}: vertex needs 3 coordinates", line_no + 1);
        }
        let mut co = [0.0f32; 3];
        for (dst, token) in co.iter_mut().zip(&parts[1..4]) {
            *dst = token
                .parse()
                .with_context(|| format!("line {}: bad coordinate `{token}`", line_no + 1))?;
        }
        positions.push(Vec3::from_array(co));
    }
    Ok(positions)
}

/// Write positions as OBJ `v` lines.
pub fn write_positions<W: Write>(writer: &mut W, name: &str, positions: &[Vec3]) -> Result<()> {
    writeln!(writer, "# {} vertices", positions.len())?;
    writeln!(writer, "o {name}")?;
    for p in positions {
        writeln!(writer, "v {:.6} {:.6} {:.6}", p.x, p.y, p.z)?;
    }
    Ok(())
}
