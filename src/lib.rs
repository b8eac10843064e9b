//! Carry files and folder trees over text-only channels.
//!
//! Content is packed into an ASCII "package" (see [`codec`]) that can be
//! pasted anywhere plain text goes and later written back bit-exactly.
//! Oversized packages are split into chunks that are reassembled through
//! an [`AssemblyStore`] once every part has arrived.

pub mod assembly;
pub mod codec;
pub mod compress;
pub mod errors;
pub mod hash;
pub mod materialize;
pub mod package;
pub mod packager;
pub mod payload;
pub mod settings;
pub mod splitter;
pub mod workflow;

pub use assembly::{
    validate_package_id, AssemblyStore, FolderPartStore, MemoryPartStore,
    PartStore,
};
pub use errors::{ErrorKind, IntegrityLayer, PackageError, Result};
pub use materialize::{Materializer, OverwriteDecider};
pub use package::{
    AssemblyStatus, Compression, ManifestFileEntry, MultiManifest, Package,
    PackageType, PasteResult,
};
pub use payload::decode_payload;
pub use settings::{AppPaths, OverwriteBehavior, Settings};
pub use workflow::{assemble, copy, paste, CopyOutcome, Outbox, PasteOutcome};
