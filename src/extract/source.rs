//! Identidad de cada fuente de extracción y reglas comunes para plegar sus resultados.

use crate::error::SourceResult;
use crate::formatting::size_in_mb;
use crate::metadata::{MetadataMap, MetadataValue};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// Fuente independiente cuyo fallo se reporta bajo su propio prefijo.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum Source {
    File,
    Image,
    Exif,
    Png,
    Audio,
    Native,
    Ffprobe,
    Container,
    Pdf,
    Docx,
    Txt,
    Csv,
    Zip,
    Tar,
    Gzip,
    SevenZip,
    Stat,
    Hash,
    Header,
    Infer,
}

impl Source {
    /// Prefijo usado en las claves `<prefijo>_error` y `<prefijo>_note`.
    pub fn key(self) -> &'static str {
        match self {
            Source::File => "file",
            Source::Image => "image",
            Source::Exif => "exif",
            Source::Png => "png",
            Source::Audio => "audio",
            Source::Native => "native",
            Source::Ffprobe => "ffprobe",
            Source::Container => "container",
            Source::Pdf => "pdf",
            Source::Docx => "docx",
            Source::Txt => "txt",
            Source::Csv => "csv",
            Source::Zip => "zip",
            Source::Tar => "tar",
            Source::Gzip => "gzip",
            Source::SevenZip => "7z",
            Source::Stat => "stat",
            Source::Hash => "hash",
            Source::Header => "header",
            Source::Infer => "infer",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Incorpora el resultado de una fuente al agregado sin interrumpir a las demás.
pub fn absorb(map: &mut MetadataMap, source: Source, result: SourceResult) {
    match result {
        Ok(found) => {
            tracing::debug!(source = %source, fields = found.len(), "fuente completada");
            map.merge(found);
        }
        Err(error) if error.is_note() => {
            tracing::debug!(source = %source, %error, "fuente no disponible");
            map.insert(format!("{}_note", source.key()), error.to_string());
        }
        Err(error) => {
            tracing::warn!(source = %source, %error, "fallo absorbido");
            map.insert(format!("{}_error", source.key()), error.to_string());
        }
    }
}

/// Atributos comunes a todas las categorías: nombre y tamaño.
pub fn basic_info(path: &Path) -> MetadataMap {
    let mut map = MetadataMap::new();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    map.insert("file_name", name);

    match fs::metadata(path) {
        Ok(metadata) => {
            map.insert("file_size_bytes", metadata.len());
            map.insert("file_size_mb", size_in_mb(metadata.len()));
        }
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "no se pudo leer el tamaño");
            map.insert(format!("{}_error", Source::File.key()), error.to_string());
        }
    }

    map
}

/// Inserta una lista acotada y, si se recortó, la nota `<clave>_note`.
pub fn push_bounded_list<T>(
    map: &mut MetadataMap,
    key: &str,
    items: Vec<T>,
    limit: usize,
    noun: &str,
) where
    T: Into<MetadataValue>,
{
    let total = items.len();
    let kept: Vec<MetadataValue> = items.into_iter().take(limit).map(Into::into).collect();
    map.insert(key, kept);
    if total > limit {
        map.insert(
            format!("{key}_note"),
            format!("... and {} more {noun}", total - limit),
        );
    }
}

/// Texto de la nota de truncado para enumeraciones que no se guardan como lista.
pub fn truncation_note(total: usize, limit: usize, noun: &str) -> Option<String> {
    (total > limit).then(|| format!("... and {} more {noun}", total - limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use std::time::Duration;

    #[test]
    fn errors_and_notes_use_distinct_keys() {
        let mut map = MetadataMap::new();
        absorb(
            &mut map,
            Source::Ffprobe,
            Err(SourceError::ToolMissing("ffprobe".into())),
        );
        absorb(
            &mut map,
            Source::Container,
            Err(SourceError::Timeout(Duration::from_secs(30))),
        );

        assert!(map.contains_key("ffprobe_note"));
        assert!(!map.contains_key("ffprobe_error"));
        assert_eq!(
            map.get("container_error").and_then(MetadataValue::as_text),
            Some("timed out after 30s")
        );
    }

    #[test]
    fn bounded_list_reports_remainder() {
        let mut map = MetadataMap::new();
        let items: Vec<String> = (0..120).map(|i| format!("file{i}.txt")).collect();
        push_bounded_list(&mut map, "file_list", items, 50, "files");

        let list = map.get("file_list").and_then(MetadataValue::as_list);
        assert_eq!(list.map(<[MetadataValue]>::len), Some(50));
        assert_eq!(
            map.get("file_list_note").and_then(MetadataValue::as_text),
            Some("... and 70 more files")
        );
    }

    #[test]
    fn bounded_list_without_overflow_has_no_note() {
        let mut map = MetadataMap::new();
        push_bounded_list(&mut map, "file_list", vec!["a", "b"], 50, "files");
        assert!(!map.contains_key("file_list_note"));
    }

    #[test]
    fn missing_file_keeps_name_and_reports_error() {
        let map = basic_info(Path::new("/no/such/dir/clip.mov"));
        assert_eq!(
            map.get("file_name").and_then(MetadataValue::as_text),
            Some("clip.mov")
        );
        assert!(map.contains_key("file_error"));
        assert!(!map.contains_key("file_size_bytes"));
    }
}
