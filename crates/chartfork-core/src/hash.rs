//! Deterministic SHA-256 content hashing for files and directory trees

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::Result;

/// Hex-encoded SHA-256 of a file's content
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hex-encoded SHA-256 of a byte slice
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash of a directory's full recursive file content
///
/// Computed over the sorted `(relative path, file hash)` pairs, so it does
/// not depend on walk order or timestamps. Empty directories do not
/// contribute.
pub fn hash_dir(dir: &Path) -> Result<String> {
    let mut hasher = Sha256::new();

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(hash_file(entry.path())?.as_bytes());
        hasher.update(b"\n");
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_bytes_known_value() {
        assert_eq!(
            hash_bytes(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"hello"));
    }

    #[test]
    fn test_hash_dir_ignores_location_and_detects_changes() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        for root in [&a, &b] {
            std::fs::create_dir_all(root.join("templates")).unwrap();
            std::fs::write(root.join("Chart.yaml"), "name: x\n").unwrap();
            std::fs::write(root.join("templates/cm.yaml"), "kind: ConfigMap\n").unwrap();
        }
        assert_eq!(hash_dir(&a).unwrap(), hash_dir(&b).unwrap());

        std::fs::write(b.join("templates/cm.yaml"), "kind: Secret\n").unwrap();
        assert_ne!(hash_dir(&a).unwrap(), hash_dir(&b).unwrap());
    }

    #[test]
    fn test_hash_dir_includes_paths() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(a.join("one"), "same").unwrap();
        std::fs::write(b.join("two"), "same").unwrap();

        assert_ne!(hash_dir(&a).unwrap(), hash_dir(&b).unwrap());
    }
}
