//! Saving decrypted files received from peers

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Strip any directory part a peer put in the filename
pub fn sanitize_filename(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        "received.bin".to_string()
    } else {
        name.to_string()
    }
}

/// Path to save `filename` under `dir`; an existing file gets a timestamp suffix
pub fn unique_path(dir: &Path, filename: &str) -> PathBuf {
    let name = sanitize_filename(filename);
    let candidate = dir.join(&name);
    if !candidate.exists() {
        return candidate;
    }

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let path = Path::new(&name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("received");
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => dir.join(format!("{}_{}.{}", stem, stamp, ext)),
        None => dir.join(format!("{}_{}", stem, stamp)),
    }
}

/// Write `data` into `dir`, creating it if needed, and return the final path
pub async fn save(dir: &Path, filename: &str, data: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating download directory {}", dir.display()))?;
    let path = unique_path(dir, filename);
    tokio::fs::write(&path, data)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("/tmp/report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename(".."), "received.bin");
        assert_eq!(sanitize_filename(""), "received.bin");
    }

    #[tokio::test]
    async fn test_save_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let first = save(dir.path(), "notes.txt", b"one").await.unwrap();
        let second = save(dir.path(), "notes.txt", b"two").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
        assert!(second.file_name().unwrap().to_str().unwrap().starts_with("notes_"));
    }

    #[tokio::test]
    async fn test_save_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let path = save(&nested, "x.bin", &[1, 2, 3]).await.unwrap();
        assert_eq!(path, nested.join("x.bin"));
    }
}
