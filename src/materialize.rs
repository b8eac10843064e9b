use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use canonical_path::CanonicalPathBuf;

use crate::errors::{IntegrityLayer, PackageError, Result};
use crate::hash::{digest_matches, sha256_hex};
use crate::package::{MultiManifest, Package, PackageType, PasteResult};
use crate::payload::decode_payload;
use crate::settings::OverwriteBehavior;

pub const FALLBACK_FILE_NAME: &str = "output.bin";

/// Decides whether an existing file may be overwritten when the
/// behavior is [`OverwriteBehavior::Prompt`]. Returning `false` makes the
/// materializer pick a `name (N).ext` sibling instead.
pub trait OverwriteDecider {
    fn should_overwrite(&mut self, path: &Path) -> bool;
}

impl<F> OverwriteDecider for F
where
    F: FnMut(&Path) -> bool,
{
    fn should_overwrite(&mut self, path: &Path) -> bool {
        self(path)
    }
}

/// Writes decoded packages into a destination folder.
pub struct Materializer<'a> {
    destination: PathBuf,
    behavior: OverwriteBehavior,
    decider: Option<Box<dyn OverwriteDecider + 'a>>,
}

impl<'a> Materializer<'a> {
    pub fn new(
        destination: impl Into<PathBuf>,
        behavior: OverwriteBehavior,
    ) -> Self {
        Self {
            destination: destination.into(),
            behavior,
            decider: None,
        }
    }

    pub fn with_decider(mut self, decider: impl OverwriteDecider + 'a) -> Self {
        self.decider = Some(Box::new(decider));
        self
    }

    pub fn with_boxed_decider(
        mut self,
        decider: Option<Box<dyn OverwriteDecider + 'a>>,
    ) -> Self {
        self.decider = decider;
        self
    }

    /// Verify `package` and write its content.
    ///
    /// Everything is checked before the first byte is written: payload
    /// hash and size, and for bundles every manifest entry's length, hash
    /// and destination path. A failure in that phase leaves the
    /// destination untouched.
    pub fn materialize(&mut self, package: &Package) -> Result<PasteResult> {
        let content = decode_payload(package)?;

        match package.package_type {
            PackageType::Single => {
                let name = package
                    .name
                    .as_deref()
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or(FALLBACK_FILE_NAME);
                let root = self.prepare_root()?;
                let target = resolve_inside(&root, name)?;
                let path = self.write(&target, &content)?;
                Ok(PasteResult {
                    message: format!("Created file: {}", path.display()),
                    created_paths: vec![path],
                })
            }
            PackageType::Multi => {
                let manifest = package
                    .manifest
                    .as_deref()
                    .filter(|m| !m.trim().is_empty())
                    .ok_or(PackageError::MissingManifest)?;
                let manifest = MultiManifest::from_json(manifest)?;
                let root = self.prepare_root()?;
                let planned = plan_bundle(&root, &manifest, &content)?;

                let mut created = Vec::with_capacity(planned.len());
                for (target, bytes) in planned {
                    created.push(self.write(&target, bytes)?);
                }
                Ok(PasteResult {
                    message: format!("Created {} file(s).", created.len()),
                    created_paths: created,
                })
            }
            PackageType::Chunk => {
                Err(PackageError::UnsupportedType(package.package_type))
            }
        }
    }

    fn prepare_root(&self) -> Result<CanonicalPathBuf> {
        fs::create_dir_all(&self.destination)?;
        Ok(CanonicalPathBuf::canonicalize(&self.destination)?)
    }

    fn write(&mut self, target: &Path, bytes: &[u8]) -> Result<PathBuf> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let path = self.resolve_conflict(target);
        fs::write(&path, bytes)?;
        log::info!("created {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    fn resolve_conflict(&mut self, target: &Path) -> PathBuf {
        if !occupied(target) {
            return target.to_path_buf();
        }
        match self.behavior {
            OverwriteBehavior::Overwrite => target.to_path_buf(),
            OverwriteBehavior::RenameWithSuffix => next_available(target),
            OverwriteBehavior::Prompt => {
                let overwrite = self
                    .decider
                    .as_mut()
                    .map(|decider| decider.should_overwrite(target))
                    .unwrap_or(false);
                if overwrite {
                    target.to_path_buf()
                } else {
                    next_available(target)
                }
            }
        }
    }
}

/// Split the decoded bundle stream along the manifest and check every
/// record, returning the destination of each file with its bytes.
fn plan_bundle<'c>(
    root: &CanonicalPathBuf,
    manifest: &MultiManifest,
    content: &'c [u8],
) -> Result<Vec<(PathBuf, &'c [u8])>> {
    let mut planned = Vec::with_capacity(manifest.files.len());
    let mut rest = content;

    for entry in &manifest.files {
        let mismatch = |expected: String, actual: String| {
            PackageError::Integrity {
                layer: IntegrityLayer::Payload,
                subject: entry.relative_path.clone(),
                expected,
                actual,
            }
        };

        if rest.len() < 8 {
            return Err(mismatch(
                "8-byte length prefix".to_owned(),
                format!("{} bytes left", rest.len()),
            ));
        }
        let (prefix, tail) = rest.split_at(8);
        let mut length = [0u8; 8];
        length.copy_from_slice(prefix);
        let length = u64::from_le_bytes(length);

        if length != entry.size {
            return Err(mismatch(
                format!("{} bytes", entry.size),
                format!("{} bytes", length),
            ));
        }
        if length > tail.len() as u64 {
            return Err(mismatch(
                format!("{} bytes", length),
                format!("{} bytes left", tail.len()),
            ));
        }
        let (bytes, tail) = tail.split_at(length as usize);

        let actual = sha256_hex(bytes);
        if !digest_matches(&entry.sha256, &actual) {
            return Err(mismatch(entry.sha256.clone(), actual));
        }

        let target = resolve_inside(root, &entry.relative_path)?;
        planned.push((target, bytes));
        rest = tail;
    }

    if !rest.is_empty() {
        return Err(PackageError::Integrity {
            layer: IntegrityLayer::Payload,
            subject: "manifest".to_owned(),
            expected: format!("{} bytes", content.len() - rest.len()),
            actual: format!("{} bytes", content.len()),
        });
    }

    Ok(planned)
}

/// Cheap textual screening of a destination-relative path.
pub fn validate_relative_path(relative: &str) -> Result<()> {
    let normalized = relative.replace('\\', "/");
    let has_drive = normalized
        .as_bytes()
        .get(1)
        .map_or(false, |&b| b == b':');
    let unsafe_path = normalized.is_empty()
        || normalized.starts_with('/')
        || has_drive
        || Path::new(&normalized).is_absolute()
        || normalized == ".."
        || normalized.starts_with("../")
        || normalized.ends_with("/..")
        || normalized.contains("/../");

    if unsafe_path {
        log::warn!("rejected unsafe path {:?}", relative);
        return Err(PackageError::UnsafePath(relative.to_owned()));
    }
    Ok(())
}

/// Join `relative` to `root` and make sure the result stays strictly
/// inside `root`.
///
/// The longest existing prefix of the joined path is canonicalized, which
/// resolves symlinks that could point elsewhere; the remaining components
/// are applied lexically. A symlink counts as existing even when its
/// target does not, and such a dangling link is rejected.
pub fn resolve_inside(
    root: &CanonicalPathBuf,
    relative: &str,
) -> Result<PathBuf> {
    validate_relative_path(relative)?;
    let reject = || PackageError::UnsafePath(relative.to_owned());

    let normalized = relative.replace('\\', "/");
    let joined = root.as_path().join(&normalized);

    let mut existing = joined.as_path();
    let mut pending = Vec::new();
    while !occupied(existing) {
        let name = existing.file_name().ok_or_else(reject)?;
        pending.push(name.to_os_string());
        existing = existing.parent().ok_or_else(reject)?;
    }

    let mut resolved = match CanonicalPathBuf::canonicalize(existing) {
        Ok(path) => path.into_path_buf(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!(
                "{:?} goes through dangling link {}",
                relative,
                existing.display()
            );
            return Err(reject());
        }
        Err(e) => return Err(e.into()),
    };
    for component in pending.iter().rev() {
        match Path::new(component).components().next() {
            Some(Component::Normal(part)) => resolved.push(part),
            Some(Component::CurDir) => {}
            _ => return Err(reject()),
        }
    }

    if resolved == root.as_path() || !resolved.starts_with(root.as_path()) {
        log::warn!(
            "{:?} resolves to {}, outside of {}",
            relative,
            resolved.display(),
            root.as_path().display()
        );
        return Err(reject());
    }
    Ok(resolved)
}

/// Whether anything, including a dangling symlink, sits at `path`.
fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// `name.ext` -> the first free `name (N).ext`, N counting from 1.
pub fn next_available(path: &Path) -> PathBuf {
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|counter| {
            dir.join(format!("{} ({}){}", stem, counter, extension))
        })
        .find(|candidate| !occupied(candidate))
        .unwrap_or_else(|| path.to_path_buf())
}
