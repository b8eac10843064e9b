use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::package::Compression;

pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(data.len() / 2),
        flate2::Compression::best(),
    );
    encoder.write_all(data)?;
    encoder.finish()
}

/// Inflate `data`, stopping after `limit + 1` bytes of output.
///
/// A stream that inflates past `limit` comes back one byte too long
/// instead of being inflated completely, so the caller's size check
/// rejects it without allocating the whole thing.
pub fn gunzip(data: &[u8], limit: u64) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len().saturating_mul(2));
    GzDecoder::new(data)
        .take(limit.saturating_add(1))
        .read_to_end(&mut out)?;
    Ok(out)
}

/// Pick the stored form of `raw`.
///
/// The gzip form is only used when it is strictly smaller than the input,
/// so incompressible data never grows.
pub fn pack(
    raw: Vec<u8>,
    enabled: bool,
) -> std::io::Result<(Compression, Vec<u8>)> {
    if !enabled {
        return Ok((Compression::None, raw));
    }

    let compressed = gzip(&raw)?;
    if compressed.len() < raw.len() {
        log::debug!(
            "gzip reduced payload from {} to {} bytes",
            raw.len(),
            compressed.len()
        );
        Ok((Compression::Gzip, compressed))
    } else {
        log::debug!(
            "gzip would not shrink {} bytes, storing uncompressed",
            raw.len()
        );
        Ok((Compression::None, raw))
    }
}
