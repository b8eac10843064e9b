use chrono::Utc;

use crate::codec;
use crate::errors::{PackageError, Result};
use crate::hash::sha256_hex;
use crate::package::{Compression, Package, PackageType};
use crate::packager::new_package_id;
use crate::payload::encode_b64;

pub const CHUNK_NAME: &str = "chunk";

/// Split an already serialized package into chunk packages of at most
/// `max_chunk_bytes` bytes of the original text each.
///
/// Text that already fits is returned as-is, unwrapped. Segments are cut
/// on raw UTF-8 bytes, so a segment may end inside a multi-byte character;
/// only the reassembled whole has to be valid text.
pub fn split(
    text: &str,
    max_chunk_bytes: usize,
    line_width: usize,
) -> Result<Vec<String>> {
    if max_chunk_bytes == 0 {
        return Err(PackageError::InvalidSetting {
            name: "chunk_size_bytes",
            reason: "must be greater than zero".to_owned(),
        });
    }

    let bytes = text.as_bytes();
    if bytes.len() <= max_chunk_bytes {
        return Ok(vec![text.to_owned()]);
    }

    let package_id = new_package_id();
    let part_total = part_count(bytes.len(), max_chunk_bytes)?;
    log::info!(
        "splitting {} bytes into {} chunks of {} as {}",
        bytes.len(),
        part_total,
        max_chunk_bytes,
        package_id
    );

    let chunks = bytes
        .chunks(max_chunk_bytes)
        .zip(1..)
        .map(|(segment, part_index)| {
            let chunk = Package {
                package_type: PackageType::Chunk,
                package_id: package_id.clone(),
                timestamp: Utc::now(),
                compression: Compression::None,
                sha256: sha256_hex(segment),
                original_size: segment.len() as u64,
                stored_size: segment.len() as u64,
                name: Some(CHUNK_NAME.to_owned()),
                part_index,
                part_total,
                payload_b64: encode_b64(segment),
                manifest: None,
            };
            codec::serialize(&chunk, line_width)
        })
        .collect();

    Ok(chunks)
}

fn part_count(len: usize, max_chunk_bytes: usize) -> Result<u32> {
    u32::try_from(len.div_ceil(max_chunk_bytes)).map_err(|_| {
        PackageError::InvalidSetting {
            name: "chunk_size_bytes",
            reason: format!(
                "{} bytes would need more than {} chunks",
                len,
                u32::MAX
            ),
        }
    })
}
