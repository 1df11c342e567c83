use serde::Deserialize;

use crate::error::{AppError, Result};

/// Output representation negotiated for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    List,
    Csv,
    Raw,
    ForceDownload,
    Archive,
}

#[derive(Deserialize, Debug, Default)]
pub struct FormatQuery {
    pub format: Option<String>,
}

/// Picks the representation for a resource from its kind and the `format` hint.
///
/// Hints that don't apply to the resource kind are errors rather than being
/// silently ignored.
pub fn negotiate(is_dir: bool, hint: Option<&str>) -> Result<Format> {
    let hint = hint.map(str::trim).filter(|h| !h.is_empty());
    let format = match (is_dir, hint) {
        (true, None) => Format::List,
        (true, Some(h)) => match h.to_ascii_lowercase().as_str() {
            "list" | "html" => Format::List,
            "csv" => Format::Csv,
            "zip" | "archive" => Format::Archive,
            _ => return Err(AppError::UnsupportedFormat(h.to_string())),
        },
        (false, None) => Format::Raw,
        (false, Some(h)) => match h.to_ascii_lowercase().as_str() {
            "raw" => Format::Raw,
            "download" => Format::ForceDownload,
            _ => return Err(AppError::UnsupportedFormat(h.to_string())),
        },
    };
    Ok(format)
}
