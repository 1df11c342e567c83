//! Maps request paths onto the served tree.
//!
//! Resolution happens in two steps: the request path is first normalised
//! lexically (a `..` that would climb above the root is rejected, never
//! clamped), then the joined path is canonicalised so symlinks pointing out
//! of the root are caught as well.

use std::{
    fs::Metadata,
    path::{Component, Path, PathBuf},
    time::SystemTime,
};
use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// Stat snapshot taken when the path was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsInfo {
    pub size: u64,
    pub modified: SystemTime,
    /// Unix `st_mode` (type and permission bits).
    pub mode: u32,
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl FsInfo {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            mode: mode_bits(metadata),
            is_dir: metadata.is_dir(),
            is_symlink: metadata.file_type().is_symlink(),
        }
    }
}

#[cfg(unix)]
fn mode_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn mode_bits(metadata: &Metadata) -> u32 {
    // Synthesise something close to what a Unix stat would report.
    let kind = if metadata.is_dir() { 0o040000 } else { 0o100000 };
    let perm = if metadata.permissions().readonly() { 0o444 } else { 0o644 };
    let exec = if metadata.is_dir() { 0o111 } else { 0 };
    kind | perm | exec
}

/// A validated location inside the served root.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub fs_path: PathBuf,
    pub info: FsInfo,
}

/// Normalises a (percent-encoded) request path into root-relative components.
///
/// Returns `InvalidPath` when a `..` segment would leave the root.
pub fn normalize(request_path: &str) -> Result<PathBuf> {
    let decoded = urlencoding::decode(request_path)
        .map_err(|_| AppError::InvalidPath(request_path.to_string()))?;
    if decoded.contains('\0') {
        return Err(AppError::InvalidPath(request_path.to_string()));
    }

    let mut clean = PathBuf::new();
    for component in Path::new(&*decoded).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    warn!("Path escapes root: {}", request_path);
                    return Err(AppError::InvalidPath(request_path.to_string()));
                }
            }
            Component::Prefix(_) => {
                return Err(AppError::InvalidPath(request_path.to_string()));
            }
        }
    }
    Ok(clean)
}

/// Resolves `request_path` beneath `root` (which must already be canonical)
/// and stats the result.
pub fn resolve(root: &Path, request_path: &str) -> Result<Resolved> {
    let relative = normalize(request_path)?;
    let joined = root.join(&relative);

    let canonical = joined
        .canonicalize()
        .map_err(|e| AppError::from_io(&joined, e))?;
    if !canonical.starts_with(root) {
        warn!(
            "Path traversal attempt: '{}' resolved to '{}' which is outside root '{}'",
            request_path,
            canonical.display(),
            root.display()
        );
        return Err(AppError::InvalidPath(request_path.to_string()));
    }

    let metadata = std::fs::metadata(&canonical).map_err(|e| AppError::from_io(&canonical, e))?;
    debug!("Resolved {} -> {}", request_path, canonical.display());
    Ok(Resolved {
        info: FsInfo::from_metadata(&metadata),
        fs_path: canonical,
    })
}

/// Root-relative form of `fs_path`, always starting with `/` and using `/`
/// separators, so the client never sees where the root lives.
pub fn relative_path(root: &Path, fs_path: &Path) -> String {
    let rel = fs_path.strip_prefix(root).unwrap_or(Path::new(""));
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}", parts.join("/"))
}
