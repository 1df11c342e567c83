//! Directory listings and breadcrumbs.

use std::{cmp::Ordering, fs, io, path::Path, time::SystemTime};
use tracing::warn;

use crate::config::App;
use crate::error::{AppError, Result};
use crate::resolver::{relative_path, FsInfo};
use crate::views::DirectoryListView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
    pub mode: u32,
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreadCrumb {
    pub label: String,
    /// Cumulative root-relative path up to and including this segment.
    pub path: String,
}

/// Directories before files, then by name.
///
/// Names are compared byte-wise, i.e. case-sensitively (`B` sorts before
/// `a`), regardless of whether the underlying filesystem folds case.
pub fn entry_order(a_is_dir: bool, a_name: &[u8], b_is_dir: bool, b_name: &[u8]) -> Ordering {
    b_is_dir.cmp(&a_is_dir).then_with(|| a_name.cmp(b_name))
}

pub fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by(|a, b| entry_order(a.is_dir, a.name.as_bytes(), b.is_dir, b.name.as_bytes()));
}

/// Reads every entry of `dir`. An entry that disappears between the directory
/// read and its stat is left out; any other failure fails the whole listing.
pub fn read_entries(dir: &Path) -> Result<Vec<DirectoryEntry>> {
    let reader = fs::read_dir(dir).map_err(|e| AppError::read(dir, e))?;
    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|e| AppError::read(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(entry) = stat_entry(&entry.path(), name)? {
            entries.push(entry);
        }
    }
    sort_entries(&mut entries);
    Ok(entries)
}

/// Stats one listed entry without following symlinks. `Ok(None)` means it
/// was removed after the directory was read.
fn stat_entry(path: &Path, name: String) -> Result<Option<DirectoryEntry>> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("Entry vanished while listing: {}", path.display());
            return Ok(None);
        }
        Err(e) => return Err(AppError::read(path, e)),
    };
    let info = FsInfo::from_metadata(&metadata);
    Ok(Some(DirectoryEntry {
        name,
        size: info.size,
        modified: info.modified,
        mode: info.mode,
        is_dir: info.is_dir,
    }))
}

/// One crumb per segment of `rel_path`, root first.
pub fn make_bread_crumbs(rel_path: &str) -> Vec<BreadCrumb> {
    let mut crumbs = vec![BreadCrumb {
        label: "/".to_string(),
        path: "/".to_string(),
    }];
    let mut cumulative = String::new();
    for segment in rel_path.split('/').filter(|s| !s.is_empty()) {
        cumulative.push('/');
        cumulative.push_str(segment);
        crumbs.push(BreadCrumb {
            label: segment.to_string(),
            path: cumulative.clone(),
        });
    }
    crumbs
}

/// Builds the listing view for the directory at `fs_path`.
pub fn list_directory(app: &App, fs_path: &Path, base_info: &FsInfo) -> Result<DirectoryListView> {
    let entries = read_entries(fs_path)?;
    let path = relative_path(&app.root_path, fs_path);
    let machine = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(DirectoryListView {
        machine,
        bread_crumbs: make_bread_crumbs(&path),
        path,
        base_info: base_info.clone(),
        entries,
    })
}
