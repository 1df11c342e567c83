//! On-demand zip archives of a directory.
//!
//! The archive is written completely to a private temp file before anything
//! is sent. The temp file is owned by an [`ArchiveArtifact`]; dropping the
//! artifact (or the response stream that took it over) deletes the file,
//! whether the build failed, the response finished or the client went away.

use bytes::Bytes;
use futures_util::Stream;
use std::{
    fs::File,
    io::{self, BufWriter, Read, Seek, Write},
    path::{Component, Path},
    pin::Pin,
    task::{Context, Poll},
};
use tempfile::{Builder, TempPath};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::error::{AppError, Result};
use crate::walk::walk_tree;

const COPY_BUF: usize = 64 * 1024;

/// A finished zip file on disk, removed when dropped.
#[derive(Debug)]
pub struct ArchiveArtifact {
    path: TempPath,
    file_name: String,
    size: u64,
}

impl ArchiveArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Download name: the source directory's base name plus `.zip`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Opens the artifact for streaming. The returned stream owns the
    /// artifact, so the file lives exactly as long as the response body.
    pub async fn into_stream(self) -> Result<ArtifactStream> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| AppError::ArchiveBuildFailure(format!("reopen artifact: {}", e)))?;
        Ok(ArtifactStream {
            inner: ReaderStream::new(file),
            _artifact: self,
        })
    }
}

pub struct ArtifactStream {
    inner: ReaderStream<tokio::fs::File>,
    _artifact: ArchiveArtifact,
}

impl Stream for ArtifactStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

fn build_failure(context: &str, err: impl std::fmt::Display) -> AppError {
    AppError::ArchiveBuildFailure(format!("{}: {}", context, err))
}

fn entry_options(metadata: &std::fs::Metadata) -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(permissions(metadata))
        .large_file(metadata.len() > u32::MAX as u64)
}

/// Zip entry name for `path` relative to `base`, `/`-separated.
fn entry_name(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(unix)]
fn permissions(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permissions(metadata: &std::fs::Metadata) -> u32 {
    if metadata.is_dir() {
        0o755
    } else {
        0o644
    }
}

/// Packages every regular file and directory under `source` into a fresh
/// temp file in `temp_dir` (or the OS temp dir).
///
/// Entries that can't be read are skipped; only failures that affect the
/// artifact as a whole (creating or writing the temp file) are errors.
pub fn build_archive(source: &Path, temp_dir: Option<&Path>) -> Result<ArchiveArtifact> {
    build_archive_with(source, temp_dir, BufWriter::new)
}

/// [`build_archive`] with the writer over the temp file supplied by `wrap`.
fn build_archive_with<W, F>(source: &Path, temp_dir: Option<&Path>, wrap: F) -> Result<ArchiveArtifact>
where
    W: Write + Seek,
    F: FnOnce(File) -> W,
{
    let mut builder = Builder::new();
    builder.prefix("dirserve-").suffix(".zip");
    let named = match temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| build_failure("create temp file", e))?;
    // From here on `path` removes the file on every early return.
    let (file, path) = named.into_parts();

    let mut zip = ZipWriter::new(wrap(file));
    let mut files = 0usize;
    let mut skipped = 0usize;

    for entry in walk_tree(source).filter(|e| e.depth() > 0) {
        let Some(name) = entry_name(source, entry.path()) else {
            continue;
        };
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            debug!("Not archiving symlink {}", entry.path().display());
            continue;
        }

        if file_type.is_dir() {
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping {}: {}", entry.path().display(), e);
                    skipped += 1;
                    continue;
                }
            };
            zip.add_directory(name, entry_options(&metadata))
                .map_err(|e| build_failure("add directory", e))?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let opened = File::open(entry.path()).and_then(|f| {
            let metadata = f.metadata()?;
            Ok((f, metadata))
        });
        let (mut src, metadata) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", entry.path().display(), e);
                skipped += 1;
                continue;
            }
        };
        zip.start_file(name, entry_options(&metadata))
            .map_err(|e| build_failure("start entry", e))?;
        copy_entry(&mut src, &mut zip, entry.path())?;
        files += 1;
    }

    let mut writer = zip.finish().map_err(|e| build_failure("finish archive", e))?;
    writer.flush().map_err(|e| build_failure("flush archive", e))?;
    drop(writer);

    let size = std::fs::metadata(&path)
        .map_err(|e| build_failure("stat artifact", e))?
        .len();
    let file_name = format!(
        "{}.zip",
        source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string())
    );
    info!(
        "Built archive {} for {} ({} files, {} skipped, {} bytes)",
        path.display(),
        source.display(),
        files,
        skipped,
        size
    );

    Ok(ArchiveArtifact {
        path,
        file_name,
        size,
    })
}

/// Copies one file into the open zip entry. A read failure truncates the
/// entry and is logged; a write failure aborts the archive.
fn copy_entry<W: Write + Seek>(src: &mut File, zip: &mut ZipWriter<W>, path: &Path) -> Result<()> {
    let mut buf = vec![0u8; COPY_BUF];
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Read of {} failed mid-archive, entry truncated: {}", path.display(), e);
                return Ok(());
            }
        };
        zip.write_all(&buf[..n])
            .map_err(|e| build_failure("write entry", e))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::BTreeMap, fs};
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("photos");
        fs::create_dir_all(src.join("2023/summer")).unwrap();
        fs::create_dir_all(src.join("empty")).unwrap();
        fs::write(src.join("index.txt"), "index").unwrap();
        fs::write(src.join("2023/summer/beach.jpg"), vec![7u8; 4096]).unwrap();
        dir
    }

    fn unpack(path: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut out = BTreeMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            out.insert(entry.name().to_string(), data);
        }
        out
    }

    #[test]
    fn archive_reproduces_tree() {
        let dir = fixture();
        let scratch = TempDir::new().unwrap();
        let artifact = build_archive(&dir.path().join("photos"), Some(scratch.path())).unwrap();

        assert_eq!(artifact.file_name(), "photos.zip");
        assert!(artifact.path().starts_with(scratch.path()));
        assert!(artifact.size() > 0);

        let entries = unpack(artifact.path());
        assert_eq!(entries["index.txt"], b"index");
        assert_eq!(entries["2023/summer/beach.jpg"], vec![7u8; 4096]);
        assert!(entries.contains_key("2023/"));
        assert!(entries.contains_key("2023/summer/"));
        assert!(entries.contains_key("empty/"));
        assert!(!entries.keys().any(|k| k.starts_with("photos")));
    }

    #[test]
    fn dropping_artifact_removes_file() {
        let dir = fixture();
        let artifact = build_archive(&dir.path().join("photos"), None).unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn concurrent_builds_get_distinct_files() {
        let dir = fixture();
        let src = dir.path().join("photos");
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let src = src.clone();
                std::thread::spawn(move || build_archive(&src, None).unwrap())
            })
            .collect();
        let artifacts: Vec<ArchiveArtifact> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let mut paths: Vec<_> = artifacts.iter().map(|a| a.path().to_path_buf()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 4);
    }

    #[test]
    fn missing_temp_dir_is_build_failure() {
        let dir = fixture();
        let err = build_archive(&dir.path().join("photos"), Some(&dir.path().join("nope"))).unwrap_err();
        assert!(matches!(err, AppError::ArchiveBuildFailure(_)));
    }

    /// Passes writes through to the temp file, calling `tap` with the byte
    /// count so far before each one.
    struct Tapped<F> {
        inner: File,
        written: u64,
        tap: F,
    }

    impl<F: FnMut(u64) -> io::Result<()>> Write for Tapped<F> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            (self.tap)(self.written)?;
            let n = self.inner.write(buf)?;
            self.written += n as u64;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl<F> Seek for Tapped<F> {
        fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn failed_write_removes_partial_artifact() {
        let dir = fixture();
        let scratch = TempDir::new().unwrap();
        let scratch_path = scratch.path().to_path_buf();

        let err = build_archive_with(&dir.path().join("photos"), Some(scratch.path()), |file| Tapped {
            inner: file,
            written: 0,
            tap: |written: u64| -> io::Result<()> {
                if written == 0 {
                    return Ok(());
                }
                // The half-written artifact is on disk when the write fails.
                assert_eq!(fs::read_dir(&scratch_path).unwrap().count(), 1);
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            },
        })
        .unwrap_err();

        assert!(matches!(err, AppError::ArchiveBuildFailure(_)));
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn unopenable_file_is_skipped_and_rest_archived() {
        let dir = fixture();
        let src = dir.path().join("photos");
        let index = src.join("index.txt");

        // Directories come first, so the walk has already listed index.txt
        // when the first entry is written. Removing it then makes its open fail.
        let artifact = build_archive_with(&src, None, |file| Tapped {
            inner: file,
            written: 0,
            tap: |_: u64| -> io::Result<()> {
                if index.exists() {
                    fs::remove_file(&index)?;
                }
                Ok(())
            },
        })
        .unwrap();

        let entries = unpack(artifact.path());
        assert!(!entries.contains_key("index.txt"));
        assert_eq!(entries["2023/summer/beach.jpg"], vec![7u8; 4096]);
        assert!(entries.contains_key("2023/"));
        assert!(entries.contains_key("empty/"));
    }

    #[cfg(unix)]
    #[test]
    fn special_files_are_left_out() {
        let dir = fixture();
        let src = dir.path().join("photos");
        let status = std::process::Command::new("mkfifo")
            .arg(src.join("pipe"))
            .status();
        if !matches!(status, Ok(s) if s.success()) {
            return;
        }
        let artifact = build_archive(&src, None).unwrap();
        let entries = unpack(artifact.path());
        assert!(!entries.contains_key("pipe"));
        assert_eq!(entries["index.txt"], b"index");
        assert_eq!(entries["2023/summer/beach.jpg"], vec![7u8; 4096]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_left_out() {
        let dir = fixture();
        let src = dir.path().join("photos");
        std::os::unix::fs::symlink("/etc/hostname", src.join("link")).unwrap();
        let artifact = build_archive(&src, None).unwrap();
        assert!(!unpack(artifact.path()).contains_key("link"));
    }

    #[tokio::test]
    async fn stream_owns_artifact() {
        use futures_util::StreamExt;

        let dir = fixture();
        let artifact = build_archive(&dir.path().join("photos"), None).unwrap();
        let path = artifact.path().to_path_buf();
        let size = artifact.size();

        let mut stream = artifact.into_stream().await.unwrap();
        let mut total = 0u64;
        while let Some(chunk) = stream.next().await {
            total += chunk.unwrap().len() as u64;
        }
        assert_eq!(total, size);
        assert!(path.exists());
        drop(stream);
        assert!(!path.exists());
    }
}
