//! The operations a front end drives: copying paths into package text,
//! pasting package text into a folder, and assembling chunked packages.
//!
//! Clipboard access stays with the caller; everything here takes and
//! returns plain text.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use crate::assembly::{AssemblyStore, PartStore};
use crate::codec;
use crate::errors::Result;
use crate::materialize::{Materializer, OverwriteDecider};
use crate::package::{AssemblyStatus, PackageType, PasteResult};
use crate::packager;
use crate::settings::Settings;
use crate::splitter;

pub type Decider<'a> = Option<Box<dyn OverwriteDecider + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    /// Id shared by every text in `chunks`.
    pub package_id: String,
    /// One complete package, or the chunk packages of an oversized one
    /// in part order.
    pub chunks: Vec<String>,
}

impl CopyOutcome {
    pub fn is_split(&self) -> bool {
        self.chunks.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasteOutcome {
    Materialized(PasteResult),
    PartStored(AssemblyStatus),
}

pub fn copy<P: AsRef<Path>>(
    paths: &[P],
    settings: &Settings,
) -> Result<CopyOutcome> {
    settings.validate()?;
    let package = packager::build_paths(paths, settings)?;
    let text = codec::serialize(&package, settings.base64_line_width);
    let chunks = splitter::split(
        &text,
        settings.chunk_size_bytes,
        settings.base64_line_width,
    )?;

    // chunks carry an id of their own
    let package_id = match chunks.as_slice() {
        [_, _, ..] => codec::parse(&chunks[0])?.package_id,
        _ => package.package_id,
    };

    log::info!(
        "copied {} path(s) as {} in {} part(s)",
        paths.len(),
        package_id,
        chunks.len()
    );
    Ok(CopyOutcome { package_id, chunks })
}

/// Materialize a complete package, or file a chunk away in `store`.
///
/// A stored chunk is never assembled implicitly; once the returned status
/// is complete the caller runs [`assemble`].
pub fn paste<'a, S: PartStore>(
    text: &str,
    destination: &Path,
    settings: &Settings,
    store: &AssemblyStore<S>,
    decider: Decider<'a>,
) -> Result<PasteOutcome> {
    let package = codec::parse(text)?;
    log::debug!("pasting {}", package.describe());

    if package.package_type == PackageType::Chunk {
        let status = store.store_part(&package)?;
        log::info!(
            "stored part {}/{} of {}",
            package.part_index,
            package.part_total,
            status
        );
        return Ok(PasteOutcome::PartStored(status));
    }

    let result = Materializer::new(destination, settings.overwrite_behavior)
        .with_boxed_decider(decider)
        .materialize(&package)?;
    log::info!("{}", result.message);
    Ok(PasteOutcome::Materialized(result))
}

/// Reassemble `package_id` from `store` and materialize it. Stored parts
/// are left in place.
pub fn assemble<'a, S: PartStore>(
    package_id: &str,
    destination: &Path,
    settings: &Settings,
    store: &AssemblyStore<S>,
    decider: Decider<'a>,
) -> Result<PasteResult> {
    let text = store.try_assemble(package_id)?;
    let package = codec::parse(&text)?;
    let mut result = Materializer::new(destination, settings.overwrite_behavior)
        .with_boxed_decider(decider)
        .materialize(&package)?;
    result.message = format!("Assembled {}. {}", package_id, result.message);
    log::info!("{}", result.message);
    Ok(result)
}

/// Folder keeping a copy of every package text produced by [`copy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbox {
    root: PathBuf,
}

impl Outbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn persist(&self, outcome: &CopyOutcome) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.root)?;
        let stem = format!(
            "package-{}-{}",
            Utc::now().format("%Y%m%d-%H%M%S"),
            Uuid::new_v4().simple()
        );

        let mut written = Vec::with_capacity(outcome.chunks.len());
        for (index, text) in outcome.chunks.iter().enumerate() {
            let name = if outcome.is_split() {
                format!("{}-part-{:04}.txt", stem, index + 1)
            } else {
                format!("{}.txt", stem)
            };
            let path = self.root.join(name);
            fs::write(&path, text)?;
            written.push(path);
        }
        log::debug!(
            "saved {} file(s) to {}",
            written.len(),
            self.root.display()
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::MemoryPartStore;
    use crate::errors::PackageError;
    use crate::settings::OverwriteBehavior;
    use tempdir::TempDir;

    fn settings(chunk_size_bytes: usize) -> Settings {
        Settings {
            chunk_size_bytes,
            enable_compression: false,
            base64_line_width: 76,
            overwrite_behavior: OverwriteBehavior::RenameWithSuffix,
        }
    }

    #[test]
    fn copy_and_paste_single_file() {
        let dir = TempDir::new("workflow").unwrap();
        let source = dir.path().join("hello.txt");
        fs::write(&source, b"hello world").unwrap();

        let outcome = copy(&[&source], &settings(1 << 20)).unwrap();
        assert!(!outcome.is_split());
        assert_eq!(
            codec::parse(&outcome.chunks[0]).unwrap().package_id,
            outcome.package_id
        );

        let store = AssemblyStore::new(MemoryPartStore::new());
        let dest = dir.path().join("dest");
        match paste(&outcome.chunks[0], &dest, &settings(1 << 20), &store, None)
            .unwrap()
        {
            PasteOutcome::Materialized(result) => {
                assert_eq!(result.created_paths, vec![dest.join("hello.txt")]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(fs::read(dest.join("hello.txt")).unwrap(), b"hello world");
    }

    #[test]
    fn split_copy_is_stored_then_assembled() {
        let dir = TempDir::new("workflow").unwrap();
        let source = dir.path().join("big.txt");
        fs::write(&source, "line of text\n".repeat(200)).unwrap();

        let settings = settings(512);
        let outcome = copy(&[&source], &settings).unwrap();
        assert!(outcome.is_split());

        let store = AssemblyStore::new(MemoryPartStore::new());
        let dest = dir.path().join("dest");
        let total = outcome.chunks.len();
        for (i, chunk) in outcome.chunks.iter().rev().enumerate() {
            match paste(chunk, &dest, &settings, &store, None).unwrap() {
                PasteOutcome::PartStored(status) => {
                    assert_eq!(status.package_id, outcome.package_id);
                    assert_eq!(status.received, i + 1);
                    assert_eq!(status.total as usize, total);
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert!(!dest.exists());

        let result =
            assemble(&outcome.package_id, &dest, &settings, &store, None)
                .unwrap();
        assert_eq!(
            fs::read(dest.join("big.txt")).unwrap(),
            fs::read(&source).unwrap()
        );
        assert!(result.message.starts_with("Assembled "));
        // parts stay until cleared
        assert!(store.status(&outcome.package_id).unwrap().is_complete());
    }

    #[test]
    fn assemble_before_all_parts_arrive() {
        let dir = TempDir::new("workflow").unwrap();
        let source = dir.path().join("big.txt");
        fs::write(&source, "x".repeat(4000)).unwrap();

        let settings = settings(1000);
        let outcome = copy(&[&source], &settings).unwrap();
        let store = AssemblyStore::new(MemoryPartStore::new());
        paste(&outcome.chunks[0], dir.path(), &settings, &store, None).unwrap();

        let err =
            assemble(&outcome.package_id, dir.path(), &settings, &store, None)
                .unwrap_err();
        assert!(matches!(err, PackageError::Incomplete { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn prompt_decider_is_forwarded() {
        let dir = TempDir::new("workflow").unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, b"fresh").unwrap();
        let dest = dir.path().join("dest");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("a.txt"), b"stale").unwrap();

        let mut settings = settings(1 << 20);
        settings.overwrite_behavior = OverwriteBehavior::Prompt;
        let outcome = copy(&[&source], &settings).unwrap();
        let store = AssemblyStore::new(MemoryPartStore::new());
        paste(
            &outcome.chunks[0],
            &dest,
            &settings,
            &store,
            Some(Box::new(|_: &Path| true)),
        )
        .unwrap();
        assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"fresh");
    }

    #[test]
    fn outbox_names_parts() {
        let dir = TempDir::new("workflow").unwrap();
        let outbox = Outbox::new(dir.path().join("Packages"));

        let single = CopyOutcome {
            package_id: "id".to_owned(),
            chunks: vec!["one".to_owned()],
        };
        let written = outbox.persist(&single).unwrap();
        let name =
            written[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("package-"));
        assert!(name.ends_with(".txt"));
        assert!(!name.contains("-part-"));

        let split = CopyOutcome {
            package_id: "id".to_owned(),
            chunks: vec!["one".to_owned(), "two".to_owned()],
        };
        let written = outbox.persist(&split).unwrap();
        assert!(written[0].to_string_lossy().ends_with("-part-0001.txt"));
        assert!(written[1].to_string_lossy().ends_with("-part-0002.txt"));
        assert_eq!(fs::read_to_string(&written[1]).unwrap(), "two");
    }
}
