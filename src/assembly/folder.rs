use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Result as IoResult, Write};
use std::path::{Path, PathBuf};

use crate::errors::{PackageError, Result};

use super::PartStore;

const PART_PREFIX: &str = "part-";
const PART_SUFFIX: &str = ".txt";
const META_FILE: &str = "meta.txt";
const TMP_PREFIX: &str = ".tmp-";

/// Temporary file living next to its final destination, removed on drop
/// unless it has been persisted.
struct TmpFile {
    file: File,
    path: PathBuf,
    persisted: bool,
}

impl TmpFile {
    fn create_in(dir: impl AsRef<Path>) -> IoResult<Self> {
        let filename: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(10)
            .collect();
        let path = dir
            .as_ref()
            .join(format!("{}{}", TMP_PREFIX, filename));
        let file = File::create(&path)?;
        Ok(Self {
            file,
            path,
            persisted: false,
        })
    }

    /// Flush to disk and move over `target` in one rename.
    fn persist(mut self, target: &Path) -> IoResult<()> {
        self.file.sync_data()?;
        fs::rename(&self.path, target)?;
        self.persisted = true;
        Ok(())
    }
}

impl Write for TmpFile {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.file.flush()
    }
}

impl Drop for TmpFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Parts kept as plain files, one folder per package id:
///
/// ```text
/// <root>/<package_id>/meta.txt        part total
/// <root>/<package_id>/part-0001.txt   serialized chunk package
/// ```
///
/// Every record is written to a temporary file and renamed into place, so
/// a reader never sees a half-written part. Different parts of one package
/// are separate files and need no further coordination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderPartStore {
    label: String,
    root: PathBuf,
}

impl FolderPartStore {
    pub fn new(
        label: impl Into<String>,
        root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let label = label.into();
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            PackageError::Storage(label.clone(), e.to_string())
        })?;
        Ok(Self { label, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_dir(&self, package_id: &str) -> PathBuf {
        self.root.join(package_id)
    }

    fn part_path(&self, package_id: &str, part_index: u32) -> PathBuf {
        self.package_dir(package_id)
            .join(part_file_name(part_index))
    }

    fn write_atomic(&self, target: &Path, content: &[u8]) -> Result<()> {
        let dir = target.parent().ok_or_else(|| {
            PackageError::Storage(
                self.label.clone(),
                format!("{} has no parent folder", target.display()),
            )
        })?;
        fs::create_dir_all(dir)?;
        let mut tmp = TmpFile::create_in(dir)?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.persist(target)?;
        log::trace!("{} wrote {}", self.label, target.display());
        Ok(())
    }
}

fn part_file_name(part_index: u32) -> String {
    format!("{}{:04}{}", PART_PREFIX, part_index, PART_SUFFIX)
}

fn parse_part_file_name(name: &str) -> Option<u32> {
    name.strip_prefix(PART_PREFIX)?
        .strip_suffix(PART_SUFFIX)?
        .parse()
        .ok()
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl PartStore for FolderPartStore {
    fn put_part(
        &self,
        package_id: &str,
        part_index: u32,
        text: &str,
    ) -> Result<()> {
        self.write_atomic(
            &self.part_path(package_id, part_index),
            text.as_bytes(),
        )
    }

    fn get_part(
        &self,
        package_id: &str,
        part_index: u32,
    ) -> Result<Option<String>> {
        read_optional(&self.part_path(package_id, part_index))
    }

    fn part_indices(&self, package_id: &str) -> Result<BTreeSet<u32>> {
        let dir = self.package_dir(package_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(BTreeSet::new())
            }
            Err(e) => return Err(e.into()),
        };

        let mut indices = BTreeSet::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(index) = entry
                .file_name()
                .to_str()
                .and_then(parse_part_file_name)
            {
                indices.insert(index);
            }
        }
        Ok(indices)
    }

    fn put_total(&self, package_id: &str, part_total: u32) -> Result<()> {
        self.write_atomic(
            &self.package_dir(package_id).join(META_FILE),
            part_total.to_string().as_bytes(),
        )
    }

    fn get_total(&self, package_id: &str) -> Result<Option<u32>> {
        let path = self.package_dir(package_id).join(META_FILE);
        match read_optional(&path)? {
            Some(content) => {
                content.trim().parse().map(Some).map_err(|_| {
                    PackageError::Storage(
                        self.label.clone(),
                        format!("corrupted part total in {}", path.display()),
                    )
                })
            }
            None => Ok(None),
        }
    }

    fn package_ids(&self) -> Result<BTreeSet<String>> {
        let mut ids = BTreeSet::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.insert(name.to_owned());
            }
        }
        Ok(ids)
    }

    fn remove_package(&self, package_id: &str) -> Result<()> {
        match fs::remove_dir_all(self.package_dir(package_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(PackageError::Storage(self.label.clone(), e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn part_names_round_trip() {
        assert_eq!(part_file_name(7), "part-0007.txt");
        assert_eq!(part_file_name(12345), "part-12345.txt");
        assert_eq!(parse_part_file_name("part-0007.txt"), Some(7));
        assert_eq!(parse_part_file_name("meta.txt"), None);
        assert_eq!(parse_part_file_name("part-x.txt"), None);
    }

    #[test]
    fn writes_leave_no_temporary_files() {
        let dir = TempDir::new("folder_store").unwrap();
        let store = FolderPartStore::new("test", dir.path()).unwrap();
        store.put_total("abc", 2).unwrap();
        store.put_part("abc", 1, "first").unwrap();
        store.put_part("abc", 1, "first again").unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path().join("abc"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["meta.txt", "part-0001.txt"]);
        assert_eq!(
            store.get_part("abc", 1).unwrap().as_deref(),
            Some("first again")
        );
    }

    #[test]
    fn unknown_package_is_empty() {
        let dir = TempDir::new("folder_store").unwrap();
        let store = FolderPartStore::new("test", dir.path()).unwrap();
        assert!(store.part_indices("nope").unwrap().is_empty());
        assert_eq!(store.get_total("nope").unwrap(), None);
        assert_eq!(store.get_part("nope", 1).unwrap(), None);
        store.remove_package("nope").unwrap();
    }

    #[test]
    fn stray_files_are_ignored() {
        let dir = TempDir::new("folder_store").unwrap();
        let store = FolderPartStore::new("test", dir.path()).unwrap();
        store.put_part("abc", 3, "third").unwrap();
        fs::write(dir.path().join("abc").join(".tmp-leftover"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        assert_eq!(
            store.part_indices("abc").unwrap().into_iter().collect::<Vec<_>>(),
            vec![3]
        );
        assert_eq!(
            store.package_ids().unwrap().into_iter().collect::<Vec<_>>(),
            vec!["abc".to_owned()]
        );
    }

    #[test]
    fn corrupted_total_is_a_storage_error() {
        let dir = TempDir::new("folder_store").unwrap();
        let store = FolderPartStore::new("test", dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("abc")).unwrap();
        fs::write(dir.path().join("abc").join(META_FILE), b"many").unwrap();
        assert!(matches!(
            store.get_total("abc"),
            Err(PackageError::Storage(..))
        ));
    }
}
