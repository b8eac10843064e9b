use base64::{engine::general_purpose, Engine};

use crate::compress;
use crate::errors::{IntegrityLayer, PackageError, Result};
use crate::hash::{digest_matches, sha256_hex};
use crate::package::{Compression, Package, PackageType};

pub fn encode_b64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decode and verify the payload of `package`.
///
/// For a chunk the hash covers the raw segment bytes and nothing else is
/// checked: its size and content are only meaningful once every part has
/// been reassembled. For `single` and `multi` the payload is decompressed
/// first and both the hash and `original_size` must match the result.
pub fn decode_payload(package: &Package) -> Result<Vec<u8>> {
    let stored = general_purpose::STANDARD
        .decode(package.payload_b64.as_bytes())
        .map_err(|e| PackageError::Integrity {
            layer: IntegrityLayer::Transport,
            subject: package.describe(),
            expected: "valid base64 payload".to_owned(),
            actual: e.to_string(),
        })?;

    if package.package_type == PackageType::Chunk {
        let actual = sha256_hex(&stored);
        if !digest_matches(&package.sha256, &actual) {
            return Err(PackageError::Integrity {
                layer: IntegrityLayer::Transport,
                subject: package.describe(),
                expected: package.sha256.clone(),
                actual,
            });
        }
        return Ok(stored);
    }

    let content = match package.compression {
        Compression::None => stored,
        Compression::Gzip => {
            compress::gunzip(&stored, package.original_size).map_err(|e| {
                PackageError::Integrity {
                    layer: IntegrityLayer::Payload,
                    subject: package.describe(),
                    expected: "valid gzip stream".to_owned(),
                    actual: e.to_string(),
                }
            })?
        }
    };

    // gzip output is capped one byte past the declared size, so an
    // oversized stream shows up here as `original_size + 1`
    if content.len() as u64 != package.original_size {
        return Err(PackageError::Integrity {
            layer: IntegrityLayer::Payload,
            subject: package.describe(),
            expected: format!("{} bytes", package.original_size),
            actual: format!("{} bytes", content.len()),
        });
    }

    let actual = sha256_hex(&content);
    if !digest_matches(&package.sha256, &actual) {
        return Err(PackageError::Integrity {
            layer: IntegrityLayer::Payload,
            subject: package.describe(),
            expected: package.sha256.clone(),
            actual,
        });
    }

    Ok(content)
}
