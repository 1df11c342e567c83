//! Fault-tolerant recursive walk shared by the CSV export and the archiver.

use std::path::Path;
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::listing::entry_order;

/// Depth-first, pre-order walk of `root` (included as the first item).
///
/// Entries that can't be read are logged and skipped; the iterator never
/// ends early because of them. Symlinks are reported, not followed. Within
/// a directory, entries come in listing order.
pub fn walk_tree(root: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| {
            entry_order(
                a.file_type().is_dir(),
                a.file_name().as_encoded_bytes(),
                b.file_type().is_dir(),
                b.file_name().as_encoded_bytes(),
            )
        })
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(
                    "Skipping unreadable entry {}: {}",
                    e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                    e
                );
                None
            }
        })
}
