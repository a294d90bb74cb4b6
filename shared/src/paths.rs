//! Asset path helpers.
//!
//! Compiled proxies never store absolute paths from the machine that built
//! them. Paths are "jailed": written relative to the artifact's own folder
//! (and only when they live under an allowed root), then re-resolved against
//! the artifact's location at load time.

use std::path::{Component, Path, PathBuf};

/// Join `file` onto `folder`, appending `.suffix` when `file` has no extension.
pub fn file_name_with_suffix(folder: &Path, file: &str, suffix: &str) -> PathBuf {
    let path = folder.join(file);
    if Path::new(file).extension().is_some() {
        return path;
    }
    let mut joined = path.into_os_string();
    joined.push(".");
    joined.push(suffix.trim_start_matches('.'));
    PathBuf::from(joined)
}

/// Resolve `.` and `..` lexically, without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn absolute_normalized(path: &Path) -> PathBuf {
    normalize(&std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()))
}

/// Path of `path` relative to `relative_to`, using `/` separators.
///
/// Returns `None` when `path` lies outside both `relative_to` and every
/// directory in `jail_limits`.
pub fn jailed_path(path: &Path, relative_to: &Path, jail_limits: &[PathBuf]) -> Option<String> {
    let path = absolute_normalized(path);
    let base = absolute_normalized(relative_to);

    let inside = path.starts_with(&base)
        || jail_limits
            .iter()
            .any(|limit| path.starts_with(absolute_normalized(limit)));
    if !inside {
        return None;
    }

    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    parts.extend(std::iter::repeat_n("..".to_string(), base_parts.len() - common));
    parts.extend(
        path_parts[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    Some(parts.join("/"))
}

/// Re-resolve a stored (jailed) path against the folder it was stored relative to.
pub fn resolve_relative(folder: &Path, stored: &str) -> PathBuf {
    let stored = Path::new(stored);
    if stored.is_absolute() {
        return stored.to_path_buf();
    }
    normalize(&folder.join(stored))
}

/// Locate `filename`, trying each search path before the name as given.
///
/// Falls back to `filename` joined onto the first search path when nothing
/// exists, so callers always receive a usable path for error messages.
pub fn find_file(filename: &Path, search_paths: &[&Path]) -> PathBuf {
    if filename.is_absolute() {
        return filename.to_path_buf();
    }
    for dir in search_paths {
        let candidate = dir.join(filename);
        if candidate.is_file() {
            return candidate;
        }
    }
    if filename.is_file() {
        return filename.to_path_buf();
    }
    search_paths
        .first()
        .map(|dir| dir.join(filename))
        .unwrap_or_else(|| filename.to_path_buf())
}

/// Like [`find_file`], but first searches for files with alternate extensions.
///
/// When an alternate is found, the returned path is the alternate's location
/// with the original extension restored (the loader then picks whichever
/// representation it prefers).
pub fn find_file_with_alternates(
    filename: &Path,
    search_paths: &[&Path],
    alt_exts: &[&str],
) -> PathBuf {
    for ext in alt_exts {
        let candidate = find_file(
            &filename.with_extension(ext.trim_start_matches('.')),
            search_paths,
        );
        if candidate.is_file() {
            return match filename.extension() {
                Some(original) => candidate.with_extension(original),
                None => candidate.with_extension(""),
            };
        }
    }
    find_file(filename, search_paths)
}
