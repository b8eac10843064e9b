mod folder;
mod memory;

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::codec::{self, DEFAULT_LINE_WIDTH};
use crate::errors::{PackageError, Result};
use crate::package::{AssemblyStatus, Package, PackageType};
use crate::payload::decode_payload;

pub use folder::FolderPartStore;
pub use memory::MemoryPartStore;

const MAX_PACKAGE_ID_LEN: usize = 128;

/// Durable keyed storage for received chunks.
///
/// Parts are keyed by `(package_id, part_index)` and the part total is kept
/// in a side table keyed by `package_id`. Implementations only need each
/// single `put_*` to replace its record atomically; nothing spans several
/// records.
pub trait PartStore {
    fn put_part(
        &self,
        package_id: &str,
        part_index: u32,
        text: &str,
    ) -> Result<()>;

    fn get_part(
        &self,
        package_id: &str,
        part_index: u32,
    ) -> Result<Option<String>>;

    /// Indices of all parts currently stored for `package_id`.
    fn part_indices(&self, package_id: &str) -> Result<BTreeSet<u32>>;

    fn put_total(&self, package_id: &str, part_total: u32) -> Result<()>;

    fn get_total(&self, package_id: &str) -> Result<Option<u32>>;

    fn package_ids(&self) -> Result<BTreeSet<String>>;

    /// Delete every part and the total of `package_id`. Removing an
    /// unknown id is not an error.
    fn remove_package(&self, package_id: &str) -> Result<()>;
}

/// Collects chunk packages, possibly over many separate runs, until a
/// package can be reassembled.
///
/// No state is kept in memory between calls: every query is answered from
/// whatever the underlying [`PartStore`] holds at that moment.
pub struct AssemblyStore<S> {
    store: S,
}

impl AssemblyStore<FolderPartStore> {
    /// Open (or create) a folder-backed store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(FolderPartStore::new("parts-cache", root)?))
    }
}

impl<S: PartStore> AssemblyStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Persist one chunk and report the updated progress of its package.
    ///
    /// The chunk's own hash is checked first, so a part corrupted in
    /// transit is never stored. The first part total recorded for an id is
    /// authoritative; a chunk claiming a different total is rejected.
    pub fn store_part(&self, chunk: &Package) -> Result<AssemblyStatus> {
        if chunk.package_type != PackageType::Chunk {
            return Err(PackageError::UnsupportedType(chunk.package_type));
        }
        validate_package_id(&chunk.package_id)?;
        if chunk.part_index == 0 || chunk.part_index > chunk.part_total {
            return Err(PackageError::invalid(
                "part_index",
                format!("{}/{}", chunk.part_index, chunk.part_total),
            ));
        }
        decode_payload(chunk)?;

        let package_id = chunk.package_id.as_str();
        match self.store.get_total(package_id)? {
            Some(recorded) if recorded != chunk.part_total => {
                log::warn!(
                    "rejecting {}: {} parts already recorded",
                    chunk.describe(),
                    recorded
                );
                return Err(PackageError::PartTotalMismatch {
                    package_id: package_id.to_owned(),
                    recorded,
                    received: chunk.part_total,
                });
            }
            Some(_) => {}
            None => self.store.put_total(package_id, chunk.part_total)?,
        }

        self.store.put_part(
            package_id,
            chunk.part_index,
            &codec::serialize(chunk, DEFAULT_LINE_WIDTH),
        )?;

        let status = self.status(package_id)?;
        log::info!(
            "stored {}, received {}/{}",
            chunk.describe(),
            status.received,
            status.total
        );
        Ok(status)
    }

    /// `(received, total)` for `package_id`; `(0, 0)` when nothing is known.
    pub fn status(&self, package_id: &str) -> Result<AssemblyStatus> {
        validate_package_id(package_id)?;
        let (indices, total) = self.snapshot(package_id)?;
        Ok(AssemblyStatus {
            package_id: package_id.to_owned(),
            received: indices.len(),
            total,
        })
    }

    /// Rebuild the serialized package text that was split.
    ///
    /// Fails with [`PackageError::Incomplete`] until every index in
    /// `1..=total` is present. Stored parts are left in place; use
    /// [`AssemblyStore::clear`] once the result has been consumed.
    pub fn try_assemble(&self, package_id: &str) -> Result<String> {
        validate_package_id(package_id)?;
        let (indices, total) = self.snapshot(package_id)?;
        let incomplete = || PackageError::Incomplete {
            package_id: package_id.to_owned(),
            received: indices.len(),
            total,
        };

        let complete = total > 0
            && indices.len() == total as usize
            && (1..=total).all(|index| indices.contains(&index));
        if !complete {
            log::debug!(
                "{} not ready: {}/{} parts",
                package_id,
                indices.len(),
                total
            );
            return Err(incomplete());
        }

        let mut bytes = Vec::new();
        for index in 1..=total {
            let text = self
                .store
                .get_part(package_id, index)?
                .ok_or_else(incomplete)?;
            let part = codec::parse(&text)?;
            if part.package_id != package_id || part.part_index != index {
                return Err(PackageError::Storage(
                    package_id.to_owned(),
                    format!("slot {} holds {}", index, part.describe()),
                ));
            }
            bytes.extend(decode_payload(&part)?);
        }

        let text = String::from_utf8(bytes)
            .map_err(|e| PackageError::invalid("payload", e.to_string()))?;
        log::info!(
            "assembled {} parts of {} ({} bytes)",
            total,
            package_id,
            text.len()
        );
        Ok(text)
    }

    /// Progress of every package with at least one stored part, ordered
    /// by package id.
    pub fn list_status(&self) -> Result<Vec<AssemblyStatus>> {
        let mut statuses = Vec::new();
        for package_id in self.store.package_ids()? {
            let (indices, total) = self.snapshot(&package_id)?;
            if indices.is_empty() {
                continue;
            }
            statuses.push(AssemblyStatus {
                package_id,
                received: indices.len(),
                total,
            });
        }
        Ok(statuses)
    }

    pub fn clear(&self, package_id: &str) -> Result<()> {
        validate_package_id(package_id)?;
        self.store.remove_package(package_id)?;
        log::info!("cleared stored parts of {}", package_id);
        Ok(())
    }

    pub fn clear_all(&self) -> Result<()> {
        let ids = self.store.package_ids()?;
        for package_id in &ids {
            self.store.remove_package(package_id)?;
        }
        log::info!("cleared stored parts of {} package(s)", ids.len());
        Ok(())
    }

    fn snapshot(&self, package_id: &str) -> Result<(BTreeSet<u32>, u32)> {
        let indices = self.store.part_indices(package_id)?;
        let total = self.store.get_total(package_id)?.unwrap_or(0);
        Ok((indices, total))
    }
}

/// Package ids come from pasted text and end up as storage keys (folder
/// names for [`FolderPartStore`]), so only a conservative alphabet is
/// accepted.
pub fn validate_package_id(package_id: &str) -> Result<()> {
    let valid = !package_id.is_empty()
        && package_id.len() <= MAX_PACKAGE_ID_LEN
        && package_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PackageError::invalid("package_id", package_id))
    }
}
