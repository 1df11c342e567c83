//! Recursive CSV export of a directory tree.

use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::resolver::FsInfo;
use crate::walk::walk_tree;

pub const CSV_HEADER: [&str; 4] = ["Path", "Modified", "Size", "Mode"];

/// Walks `dir` and returns one CSV row per visited node, the directory
/// itself first. Nodes whose metadata can't be read are skipped.
pub fn export_csv(dir: &Path) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER).map_err(csv_error)?;

    let mut rows = 0usize;
    for entry in walk_tree(dir) {
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        let info = FsInfo::from_metadata(&metadata);
        let path = entry.path().to_string_lossy();
        let modified = format_modified(&info);
        let size = info.size.to_string();
        let mode = mode_string(info.mode, info.is_dir, info.is_symlink);
        writer
            .write_record([&*path, modified.as_str(), size.as_str(), mode.as_str()])
            .map_err(csv_error)?;
        rows += 1;
    }

    debug!("CSV export of {} wrote {} rows", dir.display(), rows);
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("csv flush failed: {}", e)))
}

fn csv_error(err: csv::Error) -> AppError {
    AppError::Internal(format!("csv write failed: {}", err))
}

/// `YYYY-MM-DD HH:MM:SS +ZZZZ ZONE`, always in UTC.
fn format_modified(info: &FsInfo) -> String {
    let datetime: DateTime<Utc> = info.modified.into();
    datetime.format("%Y-%m-%d %H:%M:%S %z %Z").to_string()
}

/// Unix `ls`-style permission string, e.g. `drwxr-xr-x`.
pub fn mode_string(mode: u32, is_dir: bool, is_symlink: bool) -> String {
    let mut out = String::with_capacity(10);
    out.push(if is_dir {
        'd'
    } else if is_symlink {
        'L'
    } else {
        '-'
    });
    const BITS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    for (bit, c) in BITS {
        out.push(if mode & bit != 0 { c } else { '-' });
    }
    out
}
