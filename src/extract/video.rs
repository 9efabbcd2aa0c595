//! Backend de video: `ffprobe` cuando está instalado y el lector nativo de contenedores.

use super::source::{Source, absorb, basic_info};
use super::{container, ffprobe};
use crate::config::ExtractOptions;
use crate::metadata::MetadataMap;
use std::path::Path;

pub fn extract(path: &Path, ffprobe_binary: Option<&Path>, options: &ExtractOptions) -> MetadataMap {
    let mut map = basic_info(path);
    absorb(
        &mut map,
        Source::Ffprobe,
        ffprobe::extract(ffprobe_binary, path, options.tool_timeout, options.list_limit),
    );
    absorb(
        &mut map,
        Source::Container,
        container::extract(path, options.list_limit),
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataValue;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_tool_is_a_note_not_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("clip.webm");
        fs::write(&path, b"\x1A\x45\xDF\xA3\x84\x42\x82\x81\x77")?;

        let map = extract(&path, None, &ExtractOptions::default());
        assert_eq!(
            map.get("ffprobe_note").and_then(MetadataValue::as_text),
            Some("ffprobe not found (install FFmpeg for detailed media metadata)")
        );
        assert!(!map.contains_key("ffprobe_error"));
        assert!(map.contains_key("file_size_bytes"));
        assert!(map.contains_key("container_format"));
        Ok(())
    }
}
