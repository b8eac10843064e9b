use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_LINE_WIDTH;
use crate::errors::{PackageError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
pub const MIN_LINE_WIDTH: usize = 16;

pub const APP_FOLDER: &str = "SpecialCopyPaste";
pub const SETTINGS_FILE: &str = "settings.json";
pub const PARTS_CACHE_FOLDER: &str = "PartsCache";
pub const PACKAGES_FOLDER: &str = "Packages";

/// What to do when a materialized file would land on an existing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverwriteBehavior {
    Prompt,
    RenameWithSuffix,
    Overwrite,
}

impl Default for OverwriteBehavior {
    fn default() -> Self {
        OverwriteBehavior::RenameWithSuffix
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "ChunkSizeBytes")]
    pub chunk_size_bytes: usize,
    #[serde(alias = "EnableCompression")]
    pub enable_compression: bool,
    #[serde(alias = "Base64LineWidth")]
    pub base64_line_width: usize,
    #[serde(alias = "OverwriteBehavior")]
    pub overwrite_behavior: OverwriteBehavior,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            enable_compression: true,
            base64_line_width: DEFAULT_LINE_WIDTH,
            overwrite_behavior: OverwriteBehavior::default(),
        }
    }
}

impl Settings {
    /// Read settings from `path`, falling back to defaults when the file
    /// does not exist yet.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let reader = BufReader::new(fs::File::open(path)?);
        let settings: Settings =
            serde_json::from_reader(reader).map_err(|e| {
                PackageError::Storage(path.display().to_string(), e.to_string())
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(fs::File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| {
            PackageError::Storage(path.display().to_string(), e.to_string())
        })?;
        writer.flush()?;
        log::info!("settings written to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_bytes == 0 {
            return Err(PackageError::InvalidSetting {
                name: "chunk_size_bytes",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.base64_line_width < MIN_LINE_WIDTH {
            return Err(PackageError::InvalidSetting {
                name: "base64_line_width",
                reason: format!("must be at least {}", MIN_LINE_WIDTH),
            });
        }
        Ok(())
    }
}

/// Per-user locations used by the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<local data dir>/SpecialCopyPaste`, or a folder in the working
    /// directory on platforms without one.
    pub fn discover() -> Self {
        let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join(APP_FOLDER))
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    pub fn parts_cache(&self) -> PathBuf {
        self.root.join(PARTS_CACHE_FOLDER)
    }

    pub fn packages(&self) -> PathBuf {
        self.root.join(PACKAGES_FOLDER)
    }
}
