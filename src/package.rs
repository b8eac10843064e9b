use std::fmt::{self, Display};
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{PackageError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageType {
    Single,
    Multi,
    Chunk,
}

impl Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PackageType::Single => "single",
            PackageType::Multi => "multi",
            PackageType::Chunk => "chunk",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for PackageType {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(PackageType::Single),
            "multi" => Ok(PackageType::Multi),
            "chunk" => Ok(PackageType::Chunk),
            _ => Err(PackageError::invalid("type", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    None,
    Gzip,
}

impl Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
        }
    }
}

impl FromStr for Compression {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            _ => Err(PackageError::invalid("compress", s)),
        }
    }
}

/// One package as it travels over a text channel.
///
/// `sha256` is computed over different data depending on the type: the
/// uncompressed content for `single`/`multi`, the raw segment bytes for
/// `chunk`. The payload is kept in its base64 form; see
/// [`crate::decode_payload`] for the verified bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub package_type: PackageType,
    pub package_id: String,
    pub timestamp: DateTime<Utc>,
    pub compression: Compression,
    pub sha256: String,
    pub original_size: u64,
    pub stored_size: u64,
    pub name: Option<String>,
    pub part_index: u32,
    pub part_total: u32,
    pub payload_b64: String,
    /// Manifest JSON, present for `multi` packages only.
    pub manifest: Option<String>,
}

impl Package {
    pub fn is_chunk(&self) -> bool {
        self.package_type == PackageType::Chunk
    }

    /// Label used in log lines and error messages.
    pub fn describe(&self) -> String {
        match self.package_type {
            PackageType::Chunk => format!(
                "chunk {}/{} of {}",
                self.part_index, self.part_total, self.package_id
            ),
            _ => format!("{} package {}", self.package_type, self.package_id),
        }
    }
}

pub const MANIFEST_VERSION: u32 = 1;

fn manifest_version() -> u32 {
    MANIFEST_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFileEntry {
    #[serde(alias = "RelativePath")]
    pub relative_path: String,
    #[serde(alias = "Size")]
    pub size: u64,
    #[serde(alias = "Sha256")]
    pub sha256: String,
}

/// Ordered description of the files inside a multi package.
///
/// The order of `files` is the order of the length-prefixed records in the
/// decoded payload; the byte stream itself carries no names or delimiters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiManifest {
    #[serde(default = "manifest_version")]
    pub version: u32,
    #[serde(alias = "Files")]
    pub files: Vec<ManifestFileEntry>,
}

impl MultiManifest {
    pub fn new(files: Vec<ManifestFileEntry>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            files,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: MultiManifest = serde_json::from_str(json)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(PackageError::InvalidManifest(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }
}

/// Reassembly progress of one chunked package, always derived from what
/// the store currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyStatus {
    pub package_id: String,
    pub received: usize,
    pub total: u32,
}

impl AssemblyStatus {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.received == self.total as usize
    }
}

impl Display for AssemblyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}/{}", self.package_id, self.received, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteResult {
    pub created_paths: Vec<PathBuf>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("single", PackageType::Single)]
    #[case("MULTI", PackageType::Multi)]
    #[case("chunk", PackageType::Chunk)]
    fn package_type_parses(#[case] raw: &str, #[case] expected: PackageType) {
        assert_eq!(raw.parse::<PackageType>().unwrap(), expected);
    }

    #[test]
    fn unknown_package_type_is_rejected() {
        let err = "bundle".parse::<PackageType>().unwrap_err();
        assert!(matches!(
            err,
            PackageError::InvalidField { field: "type", .. }
        ));
    }

    #[test]
    fn manifest_schema_is_explicit() {
        let manifest = MultiManifest::new(vec![ManifestFileEntry {
            relative_path: "a/b.txt".to_owned(),
            size: 3,
            sha256: "00".to_owned(),
        }]);
        assert_eq!(
            manifest.to_json().unwrap(),
            r#"{"version":1,"files":[{"relative_path":"a/b.txt","size":3,"sha256":"00"}]}"#
        );
    }

    #[test]
    fn manifest_accepts_legacy_keys() {
        let legacy = r#"{"Files":[{"RelativePath":"x.bin","Size":7,"Sha256":"ff"}]}"#;
        let manifest = MultiManifest::from_json(legacy).unwrap();
        assert_eq!(manifest.version, MANIFEST_VERSION);
        assert_eq!(manifest.files[0].relative_path, "x.bin");
        assert_eq!(manifest.files[0].size, 7);
    }

    #[test]
    fn manifest_rejects_unknown_version() {
        let json = r#"{"version":9,"files":[]}"#;
        assert!(matches!(
            MultiManifest::from_json(json),
            Err(PackageError::InvalidManifest(_))
        ));
    }

    #[test]
    fn status_completion() {
        let mut status = AssemblyStatus {
            package_id: "p".to_owned(),
            received: 0,
            total: 0,
        };
        assert!(!status.is_complete());
        status.total = 2;
        status.received = 2;
        assert!(status.is_complete());
        assert_eq!(status.to_string(), "p: 2/2");
    }
}
