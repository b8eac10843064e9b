use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use itertools::Itertools;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::codec;
use crate::compress;
use crate::errors::{PackageError, Result};
use crate::hash::sha256_hex;
use crate::package::{
    ManifestFileEntry, MultiManifest, Package, PackageType,
};
use crate::payload::encode_b64;
use crate::settings::Settings;

pub const BUNDLE_NAME: &str = "bundle";

/// A file selected for a multi package together with the path it will be
/// recreated at, relative to the destination folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub relative_path: String,
}

pub fn new_package_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn build_single<P: AsRef<Path>>(
    path: P,
    settings: &Settings,
) -> Result<Package> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PackageError::MissingSource(path.to_path_buf()));
    }

    let raw = fs::read(path)?;
    let sha256 = sha256_hex(&raw);
    let original_size = raw.len() as u64;
    let (compression, stored) =
        compress::pack(raw, settings.enable_compression)?;

    log::debug!(
        "packed {} ({} -> {} bytes, {})",
        path.display(),
        original_size,
        stored.len(),
        compression
    );

    Ok(Package {
        package_type: PackageType::Single,
        package_id: new_package_id(),
        timestamp: Utc::now(),
        compression,
        sha256,
        original_size,
        stored_size: stored.len() as u64,
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        part_index: 1,
        part_total: 1,
        payload_b64: encode_b64(&stored),
        manifest: None,
    })
}

pub fn encode_single<P: AsRef<Path>>(
    path: P,
    settings: &Settings,
) -> Result<String> {
    let package = build_single(path, settings)?;
    Ok(codec::serialize(&package, settings.base64_line_width))
}

/// Expand files and directories into the flat, ordered list of files a
/// multi package will contain.
///
/// Directories are walked recursively in file-name order. Paths are made
/// relative to the input they were found under; a file given directly is
/// relative to its own parent, i.e. just its name.
pub fn expand_sources<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SourceFile>> {
    let mut sources = Vec::new();

    for root in paths {
        let root = root.as_ref();
        if root.is_file() {
            let name = root.file_name().ok_or_else(|| {
                PackageError::MissingSource(root.to_path_buf())
            })?;
            sources.push(SourceFile {
                path: root.to_path_buf(),
                relative_path: name.to_string_lossy().into_owned(),
            });
        } else if root.is_dir() {
            for entry in WalkDir::new(root).sort_by_file_name() {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = pathdiff::diff_paths(entry.path(), root)
                    .ok_or_else(|| {
                        PackageError::MissingSource(entry.path().to_path_buf())
                    })?;
                sources.push(SourceFile {
                    path: entry.path().to_path_buf(),
                    relative_path: to_slash_path(&relative),
                });
            }
        } else {
            return Err(PackageError::MissingSource(root.to_path_buf()));
        }
    }

    log::debug!(
        "expanded {} input(s) to {} file(s)",
        paths.len(),
        sources.len()
    );
    Ok(sources)
}

pub fn build_multi<P: AsRef<Path>>(
    paths: &[P],
    settings: &Settings,
) -> Result<Package> {
    let sources = expand_sources(paths)?;

    let mut stream = Vec::new();
    let mut entries = Vec::with_capacity(sources.len());
    for source in &sources {
        let bytes = fs::read(&source.path)?;
        entries.push(ManifestFileEntry {
            relative_path: source.relative_path.clone(),
            size: bytes.len() as u64,
            sha256: sha256_hex(&bytes),
        });
        stream.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
        stream.extend_from_slice(&bytes);
    }

    let sha256 = sha256_hex(&stream);
    let original_size = stream.len() as u64;
    let (compression, stored) =
        compress::pack(stream, settings.enable_compression)?;
    let manifest = MultiManifest::new(entries);

    log::info!(
        "bundled {} file(s): {} -> {} bytes ({})",
        manifest.files.len(),
        original_size,
        stored.len(),
        compression
    );

    Ok(Package {
        package_type: PackageType::Multi,
        package_id: new_package_id(),
        timestamp: Utc::now(),
        compression,
        sha256,
        original_size,
        stored_size: stored.len() as u64,
        name: Some(BUNDLE_NAME.to_owned()),
        part_index: 1,
        part_total: 1,
        payload_b64: encode_b64(&stored),
        manifest: Some(manifest.to_json()?),
    })
}

pub fn encode_multi<P: AsRef<Path>>(
    paths: &[P],
    settings: &Settings,
) -> Result<String> {
    let package = build_multi(paths, settings)?;
    Ok(codec::serialize(&package, settings.base64_line_width))
}

/// A single regular file becomes a `single` package; anything else
/// (several inputs, or a directory) becomes a `multi` bundle.
pub fn build_paths<P: AsRef<Path>>(
    paths: &[P],
    settings: &Settings,
) -> Result<Package> {
    match paths {
        [] => Err(PackageError::InvalidSetting {
            name: "paths",
            reason: "at least one file or folder is required".to_owned(),
        }),
        [only] if only.as_ref().is_file() => build_single(only, settings),
        _ => build_multi(paths, settings),
    }
}

pub fn encode_paths<P: AsRef<Path>>(
    paths: &[P],
    settings: &Settings,
) -> Result<String> {
    let package = build_paths(paths, settings)?;
    Ok(codec::serialize(&package, settings.base64_line_width))
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .join("/")
}
