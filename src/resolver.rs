//! Output filename derivation and collision-free reservation
//!
//! Names come from the URL's last path segment. Reservation is a
//! create-exclusive loop: `name`, then `stem (1).ext`, `stem (2).ext`, ...
//! until the filesystem accepts a new file. The open handle travels with the
//! reservation, so two workers can never write to the same path.

use chrono::Utc;
use reqwest::Url;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tracing::debug;

/// Upper bound on numbered suffixes tried before giving up
const MAX_SUFFIX: u32 = 10_000;

/// A freshly created, exclusively owned output file
#[derive(Debug)]
pub struct ReservedFile {
    pub path: PathBuf,
    pub file: File,
}

impl ReservedFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Last path segment of `url`, or `download_<millis>` when there is none.
pub fn derive_name(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_owned))
        })
        .map(|segment| {
            urlencoding::decode(&segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or(segment)
        })
        .and_then(sanitize)
        .unwrap_or_else(synthetic_name)
}

fn sanitize(segment: String) -> Option<String> {
    let cleaned: String = segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn synthetic_name() -> String {
    format!("download_{}", Utc::now().timestamp_millis())
}

/// Split into stem and extension. The extension keeps its dot and is only
/// recognised when the dot is not the first character (`.bashrc` has none).
pub fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// `n == 0` is the plain name
pub fn numbered_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    let (stem, ext) = split_name(name);
    format!("{} ({}){}", stem, n, ext)
}

/// Reserve a unique output file for `url` inside `dir`.
pub async fn resolve(url: &str, dir: &Path) -> std::io::Result<ReservedFile> {
    reserve_name(&derive_name(url), dir).await
}

async fn reserve_name(name: &str, dir: &Path) -> std::io::Result<ReservedFile> {
    for n in 0..=MAX_SUFFIX {
        let path = dir.join(numbered_name(name, n));
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => {
                debug!(path = %path.display(), "Reserved output file");
                return Ok(ReservedFile { path, file });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!(
            "no free name for '{}' in {} after {} attempts",
            name,
            dir.display(),
            MAX_SUFFIX
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_derive_name_from_last_segment() {
        assert_eq!(derive_name("https://example.com/docs/report.pdf"), "report.pdf");
        assert_eq!(
            derive_name("https://example.com/a/b/archive.tar.gz?token=1#frag"),
            "archive.tar.gz"
        );
        assert_eq!(derive_name("https://example.com/my%20file.txt"), "my file.txt");
    }

    #[test]
    fn test_derive_name_synthetic_fallback() {
        for url in ["https://example.com/", "https://example.com", "not a url", "https://x.io/dir/"] {
            let name = derive_name(url);
            assert!(!name.is_empty());
            assert!(name.starts_with("download_"), "{url} -> {name}");
        }
    }

    #[test]
    fn test_derive_name_never_escapes_dir() {
        assert!(derive_name("https://example.com/a/%2e%2e").starts_with("download_"));
        assert_eq!(derive_name("https://example.com/x%2Fy.bin"), "x_y.bin");
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("report.pdf"), ("report", ".pdf"));
        assert_eq!(split_name("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_name(".bashrc"), (".bashrc", ""));
        assert_eq!(split_name("README"), ("README", ""));
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("report.pdf", 0), "report.pdf");
        assert_eq!(numbered_name("report.pdf", 3), "report (3).pdf");
        assert_eq!(numbered_name(".bashrc", 1), ".bashrc (1)");
    }

    #[tokio::test]
    async fn test_resolve_collisions_bump_suffix() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"existing").unwrap();

        let first = resolve("https://example.com/files/report.pdf", dir.path())
            .await
            .unwrap();
        assert_eq!(first.file_name(), "report (1).pdf");

        let second = resolve("https://example.com/files/report.pdf", dir.path())
            .await
            .unwrap();
        assert_eq!(second.file_name(), "report (2).pdf");

        assert_eq!(std::fs::read(dir.path().join("report.pdf")).unwrap(), b"existing");
    }

    #[tokio::test]
    async fn test_resolve_concurrent_same_url_gets_distinct_paths() {
        let dir = TempDir::new().unwrap();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let path = dir.path().to_path_buf();
            handles.push(tokio::spawn(async move {
                resolve("https://example.com/data.csv", &path).await.unwrap().path
            }));
        }

        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap());
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);
    }

    #[tokio::test]
    async fn test_resolve_missing_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = resolve("https://example.com/a.bin", &missing).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
