//! Lectura de la cabecera binaria y tabla ordenada de firmas conocidas.

use crate::error::SourceResult;
use crate::metadata::MetadataMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Gana la primera entrada cuyo prefijo coincide.
const MAGIC_TABLE: &[(&[u8], &str)] = &[
    (b"\xFF\xD8\xFF", "JPEG image"),
    (b"\x89PNG", "PNG image"),
    (b"GIF8", "GIF image"),
    (b"%PDF", "PDF document"),
    (b"PK\x03\x04", "ZIP archive"),
    (b"\x1F\x8B", "GZIP compressed"),
    (b"Rar!", "RAR archive"),
    (b"7z\xBC\xAF", "7-Zip archive"),
    (b"ID3", "MP3 audio"),
    (b"\x00\x00\x00\x18ftypmp42", "MP4 video"),
];

pub fn identify(header: &[u8]) -> Option<&'static str> {
    MAGIC_TABLE
        .iter()
        .find(|(magic, _)| header.starts_with(magic))
        .map(|(_, name)| *name)
}

pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&byte| {
            if (32..=126).contains(&byte) {
                char::from(byte)
            } else {
                '.'
            }
        })
        .collect()
}

fn read_header(path: &Path, size: usize) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(size);
    File::open(path)?
        .take(size as u64)
        .read_to_end(&mut header)?;
    Ok(header)
}

pub fn extract(path: &Path, size: usize) -> SourceResult {
    let header = read_header(path, size)?;
    let mut map = MetadataMap::new();
    map.insert("file_header_hex", hex(&header));
    map.insert("file_header_ascii", ascii(&header));
    map.insert_some("identified_format", identify(&header));
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataValue;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn first_matching_signature_wins() {
        assert_eq!(identify(b"PK\x03\x04rest"), Some("ZIP archive"));
        assert_eq!(identify(b"\x89PNG\r\n\x1a\n"), Some("PNG image"));
        assert_eq!(identify(b"\x00\x00\x00\x18ftypmp42\x00"), Some("MP4 video"));
        assert_eq!(identify(b"\x1F\x8B\x08\x00"), Some("GZIP compressed"));
        assert_eq!(identify(b"\xFF\xD8\xFF\xE0"), Some("JPEG image"));
        assert_eq!(identify(b"ID3\x04\x00"), Some("MP3 audio"));
        assert_eq!(identify(b"\x00\x00\x00\x20ftypisom"), None);
        assert_eq!(identify(b""), None);
    }

    #[test]
    fn header_renders_hex_and_printable_ascii() {
        assert_eq!(hex(&[0x50, 0x4B, 0x03, 0x04]), "50 4b 03 04");
        assert_eq!(ascii(&[0x50, 0x4B, 0x03, 0x04, 0x7F, b' ']), "PK... ");
    }

    #[test]
    fn unknown_header_has_no_identified_format() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("blob.bin");
        fs::write(&path, b"just some bytes that go past sixteen")?;

        let map = extract(&path, 16)?;
        assert_eq!(
            map.get("file_header_ascii").and_then(MetadataValue::as_text),
            Some("just some bytes ")
        );
        assert!(!map.contains_key("identified_format"));
        Ok(())
    }
}
