//! Huellas MD5 y SHA-256 calculadas por bloques.

use crate::error::SourceResult;
use crate::metadata::MetadataMap;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashSummary {
    pub md5: String,
    pub sha256: String,
}

/// Recorre el archivo una sola vez alimentando ambos digestos.
pub fn file_hashes(path: &Path, chunk_size: usize) -> std::io::Result<HashSummary> {
    let mut file = File::open(path)?;
    let mut md5 = Md5::new();
    let mut sha256 = Sha256::new();
    let mut buffer = vec![0_u8; chunk_size.max(1)];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        md5.update(&buffer[..bytes_read]);
        sha256.update(&buffer[..bytes_read]);
    }

    Ok(HashSummary {
        md5: format!("{:x}", md5.finalize()),
        sha256: format!("{:x}", sha256.finalize()),
    })
}

/// Claves `md5_hash`/`sha256_hash`, o `hash_note` si el archivo supera el techo.
pub fn extract(path: &Path, size_limit: u64, chunk_size: usize) -> SourceResult {
    let mut map = MetadataMap::new();
    let size = std::fs::metadata(path)?.len();
    if size > size_limit {
        map.insert(
            "hash_note",
            format!("File too large ({size} bytes), skipping hash calculation"),
        );
        return Ok(map);
    }

    let summary = file_hashes(path, chunk_size)?;
    map.insert("md5_hash", summary.md5);
    map.insert("sha256_hash", summary.sha256);
    Ok(map)
}
