//! Local file scanning for upload.
//!
//! Expands command-line paths into upload files. Directories are walked
//! recursively; each file remembers the directory it was found in,
//! relative to the scanned root and normalized to forward slashes.

use std::path::{Path, PathBuf};

use ledger_protocol::DEFAULT_CONTENT_TYPE;

use crate::error::UploadError;
use crate::types::UploadFile;

/// A file found by [`scan_paths`].
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Directory relative to the scanned argument, `""` for top-level files.
    pub relative_dir: String,
    pub file: UploadFile,
}

/// Expands `paths` into upload files.
///
/// A file argument yields itself with an empty `relative_dir`. A directory
/// argument yields every file below it, with `relative_dir` starting at the
/// directory's own name so the tree is recreated under the destination.
/// Entries are returned in name order.
pub async fn scan_paths(paths: &[PathBuf]) -> Result<Vec<ScannedFile>, UploadError> {
    let mut found = Vec::new();
    for path in paths {
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.is_dir() {
            let base = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let root = path.clone();
            let walked = tokio::task::spawn_blocking(move || {
                let mut walked = Vec::new();
                walk_dir(&root, &base, &mut walked).map(|()| walked)
            })
            .await
            .map_err(std::io::Error::other)??;
            found.extend(walked);
        } else {
            found.push((String::new(), path.clone()));
        }
    }

    let mut scanned = Vec::with_capacity(found.len());
    for (relative_dir, path) in found {
        let file = UploadFile::from_path(&path).await?;
        scanned.push(ScannedFile { relative_dir, file });
    }
    Ok(scanned)
}

/// Recursive blocking directory walk; run off the async workers.
fn walk_dir(
    current: &Path,
    relative: &str,
    found: &mut Vec<(String, PathBuf)>,
) -> Result<(), UploadError> {
    let mut entries = std::fs::read_dir(current)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            walk_dir(&path, &join_destination(relative, &name), found)?;
        } else if metadata.is_file() {
            found.push((relative.to_string(), path));
        }
    }
    Ok(())
}

/// Joins a remote base directory and a relative subdirectory with `/`.
pub fn join_destination(base: &str, relative: &str) -> String {
    let base = base.trim_end_matches('/');
    let relative = relative.replace('\\', "/");
    let relative = relative.trim_matches('/');
    match (base.is_empty(), relative.is_empty()) {
        (_, true) => base.to_string(),
        (true, false) => relative.to_string(),
        (false, false) => format!("{base}/{relative}"),
    }
}

/// Guesses a MIME type from the file extension.
pub fn detect_content_type(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("txt" | "log") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("tar") => "application/x-tar",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("album");
        fs::create_dir_all(root.join("raw").join("day1")).unwrap();
        fs::write(root.join("cover.jpg"), b"JPEG").unwrap();
        fs::write(root.join("notes.txt"), b"NOTES").unwrap();
        fs::write(root.join("raw").join("day1").join("img.png"), b"PNG_DATA").unwrap();
        dir
    }

    #[tokio::test]
    async fn scan_directory_keeps_structure() {
        let dir = create_test_tree();
        let scanned = scan_paths(&[dir.path().join("album")]).await.unwrap();

        let found: Vec<(&str, &str)> = scanned
            .iter()
            .map(|s| (s.relative_dir.as_str(), s.file.name.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("album", "cover.jpg"),
                ("album", "notes.txt"),
                ("album/raw/day1", "img.png"),
            ]
        );
        assert_eq!(scanned[2].file.size(), 8);
        assert_eq!(scanned[2].file.content_type, "image/png");
    }

    #[tokio::test]
    async fn scan_single_file() {
        let dir = create_test_tree();
        let path = dir.path().join("album").join("notes.txt");
        let scanned = scan_paths(&[path]).await.unwrap();

        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].relative_dir, "");
        assert_eq!(scanned[0].file.content_type, "text/plain");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn scan_several_directories() {
        let dir = create_test_tree();
        let extra = dir.path().join("extra");
        fs::create_dir_all(&extra).unwrap();
        fs::write(extra.join("z.txt"), b"Z").unwrap();

        let scanned = scan_paths(&[extra, dir.path().join("album").join("raw")])
            .await
            .unwrap();

        let found: Vec<(&str, &str)> = scanned
            .iter()
            .map(|s| (s.relative_dir.as_str(), s.file.name.as_str()))
            .collect();
        assert_eq!(found, vec![("extra", "z.txt"), ("raw/day1", "img.png")]);
    }

    #[tokio::test]
    async fn scan_empty_dir() {
        let dir = TempDir::new().unwrap();
        let scanned = scan_paths(&[dir.path().to_path_buf()]).await.unwrap();
        assert!(scanned.is_empty());
    }

    #[tokio::test]
    async fn scan_nonexistent_path() {
        let missing = PathBuf::from("/nonexistent/path/that/does/not/exist");
        let result = scan_paths(&[missing]).await;
        assert!(matches!(result, Err(UploadError::Io(_))));
    }

    #[test]
    fn join_destination_cases() {
        assert_eq!(join_destination("", ""), "");
        assert_eq!(join_destination("docs", ""), "docs");
        assert_eq!(join_destination("", "album"), "album");
        assert_eq!(join_destination("docs/", "album/raw"), "docs/album/raw");
        assert_eq!(join_destination("docs", "album\\raw"), "docs/album/raw");
    }

    #[test]
    fn content_type_by_extension() {
        assert_eq!(detect_content_type("a/b/photo.PNG"), "image/png");
        assert_eq!(detect_content_type("report.pdf"), "application/pdf");
        assert_eq!(detect_content_type("clip.MP4"), "video/mp4");
        assert_eq!(detect_content_type("archive.tar.gz"), "application/gzip");
        assert_eq!(detect_content_type("Makefile"), DEFAULT_CONTENT_TYPE);
        assert_eq!(detect_content_type("data.unknownext"), DEFAULT_CONTENT_TYPE);
    }
}
