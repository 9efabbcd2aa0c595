//! Backend genérico: atributos del sistema de archivos, huellas, firma y tipo inferido.

use super::source::{Source, absorb, basic_info};
use super::{hashing, signature};
use crate::config::ExtractOptions;
use crate::error::{SourceError, SourceResult};
use crate::formatting::{format_optional_time, size_in_kb};
use crate::metadata::MetadataMap;
use std::fs;
use std::path::Path;

pub fn extract(path: &Path, options: &ExtractOptions) -> MetadataMap {
    let mut map = basic_info(path);
    absorb(&mut map, Source::Stat, stat(path));
    if options.include_hash {
        absorb(
            &mut map,
            Source::Hash,
            hashing::extract(path, options.hash_size_limit, options.hash_chunk_size),
        );
    }
    absorb(
        &mut map,
        Source::Header,
        signature::extract(path, options.header_size),
    );
    absorb(&mut map, Source::Infer, sniff(path));
    map
}

fn stat(path: &Path) -> SourceResult {
    let metadata = fs::metadata(path)?;
    let mut map = MetadataMap::new();

    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    map.insert("file_extension", extension);
    map.insert("file_size_kb", size_in_kb(metadata.len()));
    map.insert("creation_time", format_optional_time(metadata.created().ok()));
    map.insert(
        "modification_time",
        format_optional_time(metadata.modified().ok()),
    );
    map.insert("access_time", format_optional_time(metadata.accessed().ok()));
    map.insert("is_read_only", metadata.permissions().readonly());

    #[cfg(unix)]
    {
        use super::permissions::{format_unix_permissions, group_name, owner_name};
        use std::os::unix::fs::PermissionsExt;

        map.insert(
            "permissions",
            format_unix_permissions(metadata.permissions().mode()),
        );
        map.insert_some("owner", owner_name(&metadata));
        map.insert_some("group", group_name(&metadata));
    }

    Ok(map)
}

fn sniff(path: &Path) -> SourceResult {
    let kind = infer::get_from_path(path)?
        .ok_or_else(|| SourceError::Unsupported("no known content signature".to_string()))?;
    let mut map = MetadataMap::new();
    map.insert("detected_mime", kind.mime_type());
    map.insert("detected_extension", kind.extension());
    Ok(map)
}
