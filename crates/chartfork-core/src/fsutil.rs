//! Filesystem helpers shared by the change-set protocol, the pullers and
//! the packager

use std::path::Path;

use walkdir::WalkDir;

use crate::error::Result;

/// Recursively copy `src` into `dest`, creating `dest` if needed
///
/// Existing files in `dest` are overwritten; files only present in `dest`
/// are left alone.
pub fn copy_dir(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;

    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// Move a directory, falling back to copy + delete across filesystems
pub fn move_dir(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    remove_path(dest)?;

    if std::fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    copy_dir(src, dest)?;
    std::fs::remove_dir_all(src)?;
    Ok(())
}

/// Remove a file or directory; a missing path is not an error
pub fn remove_path(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path)?,
        Ok(_) => std::fs::remove_file(path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Remove empty directories from `path` upwards, stopping at `stop`
pub fn remove_empty_parents(path: &Path, stop: &Path) -> Result<()> {
    let mut current = path.parent();

    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        if !is_empty_dir(dir)? {
            break;
        }
        std::fs::remove_dir(dir)?;
        current = dir.parent();
    }

    Ok(())
}

/// Whether `path` is an existing directory without entries
pub fn is_empty_dir(path: &Path) -> Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    Ok(std::fs::read_dir(path)?.next().is_none())
}

/// Whether `path` is missing or an empty directory
pub fn is_missing_or_empty(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    is_empty_dir(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_dir_nested() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(src.join("a/b")).unwrap();
        std::fs::write(src.join("a/b/file.txt"), "hello").unwrap();
        std::fs::write(src.join("top.txt"), "top").unwrap();

        let dest = temp.path().join("dest");
        copy_dir(&src, &dest).unwrap();

        assert_eq!(
            std::fs::read_to_string(dest.join("a/b/file.txt")).unwrap(),
            "hello"
        );
        assert_eq!(std::fs::read_to_string(dest.join("top.txt")).unwrap(), "top");
    }

    #[test]
    fn test_move_dir_replaces_destination() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dest = temp.path().join("dest");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(src.join("new.txt"), "new").unwrap();
        std::fs::write(dest.join("stale.txt"), "stale").unwrap();

        move_dir(&src, &dest).unwrap();

        assert!(!src.exists());
        assert!(dest.join("new.txt").exists());
        assert!(!dest.join("stale.txt").exists());
    }

    #[test]
    fn test_remove_empty_parents_stops_at_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        std::fs::create_dir_all(root.join("a/b/c")).unwrap();
        std::fs::write(root.join("a/keep.txt"), "").unwrap();

        let file = root.join("a/b/c/gone.txt");
        std::fs::write(&file, "").unwrap();
        std::fs::remove_file(&file).unwrap();
        remove_empty_parents(&file, &root).unwrap();

        assert!(!root.join("a/b").exists());
        assert!(root.join("a").exists());
        assert!(root.exists());
    }

    #[test]
    fn test_remove_path_missing_is_ok() {
        let temp = TempDir::new().unwrap();
        remove_path(&temp.path().join("nope")).unwrap();
    }
}
