use std::fmt;
use std::path::PathBuf;
use std::str::Utf8Error;

use thiserror::Error;

use crate::package::PackageType;

pub type Result<T> = std::result::Result<T, PackageError>;

/// Which layer an integrity check was performed on.
///
/// `Transport` covers the bytes of a single chunk as they travelled,
/// `Payload` covers the decompressed content the package describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityLayer {
    Transport,
    Payload,
}

impl fmt::Display for IntegrityLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityLayer::Transport => write!(f, "transport"),
            IntegrityLayer::Payload => write!(f, "payload"),
        }
    }
}

/// Coarse classification of [`PackageError`], for callers that only need
/// to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Integrity,
    PathSafety,
    IncompleteAssembly,
    UnsupportedType,
    Storage,
    Io,
}

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("no valid package markers")]
    MissingMarkers,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for field {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("multi package has no manifest")]
    MissingManifest,
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error(
        "{layer} integrity check failed for {subject}: \
         expected {expected}, got {actual}"
    )]
    Integrity {
        layer: IntegrityLayer,
        subject: String,
        expected: String,
        actual: String,
    },
    #[error("refused to write outside destination folder: {0}")]
    UnsafePath(String),
    #[error("package {package_id} is incomplete: {received}/{total} parts")]
    Incomplete {
        package_id: String,
        received: usize,
        total: u32,
    },
    #[error("unsupported package type for this operation: {0}")]
    UnsupportedType(PackageType),
    #[error(
        "package {package_id} was recorded with {recorded} parts, \
         chunk claims {received}"
    )]
    PartTotalMismatch {
        package_id: String,
        recorded: u32,
        received: u32,
    },
    #[error("source path does not exist: {}", .0.display())]
    MissingSource(PathBuf),
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
    #[error("Storage error: {0} {1}")]
    Storage(String, String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PackageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackageError::MissingMarkers
            | PackageError::MissingField(_)
            | PackageError::InvalidField { .. }
            | PackageError::MissingManifest
            | PackageError::InvalidManifest(_)
            | PackageError::PartTotalMismatch { .. }
            | PackageError::InvalidSetting { .. } => ErrorKind::Format,
            PackageError::Integrity { .. } => ErrorKind::Integrity,
            PackageError::UnsafePath(_) => ErrorKind::PathSafety,
            PackageError::Incomplete { .. } => ErrorKind::IncompleteAssembly,
            PackageError::UnsupportedType(_) => ErrorKind::UnsupportedType,
            PackageError::Storage(..) | PackageError::Other(_) => {
                ErrorKind::Storage
            }
            PackageError::MissingSource(_) | PackageError::Io(_) => {
                ErrorKind::Io
            }
        }
    }

    /// Only an incomplete assembly is worth retrying later with the same
    /// input; everything else reproduces deterministically.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::IncompleteAssembly
    }

    pub(crate) fn invalid(
        field: &'static str,
        value: impl Into<String>,
    ) -> Self {
        PackageError::InvalidField {
            field,
            value: value.into(),
        }
    }
}

impl From<Utf8Error> for PackageError {
    fn from(e: Utf8Error) -> Self {
        Self::invalid("payload", e.to_string())
    }
}

impl From<walkdir::Error> for PackageError {
    fn from(e: walkdir::Error) -> Self {
        Self::Io(e.into())
    }
}

impl From<serde_json::Error> for PackageError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidManifest(e.to_string())
    }
}
