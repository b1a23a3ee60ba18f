//! Chart packaging and `.tgz` extraction
//!
//! Archives are reproducible: entries are sorted, prefixed with the chart
//! name like `helm package` does, and carry a zero mtime and fixed mode.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::{Archive, Builder, Header};
use walkdir::WalkDir;

use crate::chart::{self, LoadedChart};
use crate::error::{CoreError, Result};
use crate::fsutil;

/// Where [`package_chart`] writes its output
#[derive(Debug, Clone)]
pub struct PackageOptions {
    /// Path of the `.tgz` to write
    pub archive_path: PathBuf,
    /// Directory receiving the unarchived copy
    pub unarchived_dir: PathBuf,
    /// Refuse to write over an existing archive or non-empty directory
    pub prevent_overwrite: bool,
}

/// Result of packaging a chart
#[derive(Debug, Clone)]
pub struct PackagedChart {
    pub name: String,
    pub version: String,
    pub archive_path: PathBuf,
    pub unarchived_dir: PathBuf,
}

/// Package the chart at `src` as `version`
///
/// The source directory is left untouched; the version is only rewritten
/// in the unarchived copy, which is also what ends up in the archive.
pub fn package_chart(src: &Path, version: &str, options: &PackageOptions) -> Result<PackagedChart> {
    let chart = LoadedChart::load(src)?;

    if options.prevent_overwrite {
        if options.archive_path.exists() {
            return Err(CoreError::DestinationExists {
                path: options.archive_path.display().to_string(),
            });
        }
        if !fsutil::is_missing_or_empty(&options.unarchived_dir)? {
            return Err(CoreError::DestinationExists {
                path: options.unarchived_dir.display().to_string(),
            });
        }
    }

    fsutil::remove_path(&options.unarchived_dir)?;
    fsutil::copy_dir(src, &options.unarchived_dir)?;
    chart::set_version(&options.unarchived_dir, version)?;

    create_archive(&options.unarchived_dir, chart.name(), &options.archive_path)?;

    tracing::debug!(
        "packaged {}-{} into {}",
        chart.name(),
        version,
        options.archive_path.display()
    );

    Ok(PackagedChart {
        name: chart.name().to_string(),
        version: version.to_string(),
        archive_path: options.archive_path.clone(),
        unarchived_dir: options.unarchived_dir.clone(),
    })
}

/// Write every file under `dir` into a gzipped tarball, prefixed with `prefix/`
pub fn create_archive(dir: &Path, prefix: &str, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

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
        let content = std::fs::read(entry.path())?;
        add_bytes_to_archive(&mut builder, &format!("{}/{}", prefix, relative), &content)?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

fn add_bytes_to_archive<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &str,
    content: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();

    builder.append_data(&mut header, archive_path, content)?;
    Ok(())
}

/// Extract a `.tgz` file into `dest`
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    unpack(GzDecoder::new(file), dest)
}

/// Extract an in-memory `.tgz` into `dest`
pub fn extract_bytes(data: &[u8], dest: &Path) -> Result<()> {
    unpack(GzDecoder::new(data), dest)
}

fn unpack<R: Read>(reader: R, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let mut archive = Archive::new(reader);
    archive.unpack(dest)?;
    Ok(())
}

/// List the entry paths of a `.tgz`, in archive order
pub fn list_archive(archive_path: &Path) -> Result<Vec<String>> {
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut paths = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        paths.push(entry.path()?.to_string_lossy().to_string());
    }
    Ok(paths)
}
