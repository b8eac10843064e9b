use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::{PackageError, Result};

use super::PartStore;

#[derive(Debug, Default)]
struct Entry {
    total: Option<u32>,
    parts: BTreeMap<u32, String>,
}

/// In-process [`PartStore`], for tests and for callers that keep a
/// long-running process around instead of a cache folder.
#[derive(Debug, Default)]
pub struct MemoryPartStore {
    packages: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryPartStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Entry>>> {
        self.packages.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Entry>>> {
        self.packages.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> PackageError {
    PackageError::Storage("memory".to_owned(), "lock poisoned".to_owned())
}

impl PartStore for MemoryPartStore {
    fn put_part(
        &self,
        package_id: &str,
        part_index: u32,
        text: &str,
    ) -> Result<()> {
        self.write()?
            .entry(package_id.to_owned())
            .or_default()
            .parts
            .insert(part_index, text.to_owned());
        Ok(())
    }

    fn get_part(
        &self,
        package_id: &str,
        part_index: u32,
    ) -> Result<Option<String>> {
        Ok(self
            .read()?
            .get(package_id)
            .and_then(|entry| entry.parts.get(&part_index).cloned()))
    }

    fn part_indices(&self, package_id: &str) -> Result<BTreeSet<u32>> {
        Ok(self
            .read()?
            .get(package_id)
            .map(|entry| entry.parts.keys().copied().collect())
            .unwrap_or_default())
    }

    fn put_total(&self, package_id: &str, part_total: u32) -> Result<()> {
        self.write()?
            .entry(package_id.to_owned())
            .or_default()
            .total = Some(part_total);
        Ok(())
    }

    fn get_total(&self, package_id: &str) -> Result<Option<u32>> {
        Ok(self.read()?.get(package_id).and_then(|entry| entry.total))
    }

    fn package_ids(&self) -> Result<BTreeSet<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    fn remove_package(&self, package_id: &str) -> Result<()> {
        self.write()?.remove(package_id);
        Ok(())
    }
}
