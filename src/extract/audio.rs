//! Backend de audio: propiedades y etiquetas vía `lofty`, más el lector nativo.

use super::native;
use super::source::{Source, absorb, basic_info, truncation_note};
use crate::config::ExtractOptions;
use crate::error::{SourceError, SourceResult};
use crate::formatting::round2;
use crate::metadata::{MetadataMap, MetadataValue};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, ItemValue};
use std::collections::BTreeMap;
use std::path::Path;

pub fn extract(path: &Path, options: &ExtractOptions) -> MetadataMap {
    let mut map = basic_info(path);
    absorb(&mut map, Source::Audio, properties_and_tags(path, options.list_limit));
    absorb(&mut map, Source::Native, native::extract(path, options.list_limit));
    map
}

fn properties_and_tags(path: &Path, limit: usize) -> SourceResult {
    let tagged_file = Probe::open(path)
        .map_err(SourceError::parse)?
        .guess_file_type()?
        .read()
        .map_err(|error| match error.kind() {
            lofty::error::ErrorKind::UnknownFormat => {
                SourceError::Unsupported("unrecognized audio format".to_string())
            }
            _ => SourceError::parse(error),
        })?;

    let mut map = MetadataMap::new();
    let properties = tagged_file.properties();
    map.insert(
        "duration_seconds",
        round2(properties.duration().as_secs_f64()),
    );
    // lofty informa kbps; se expone en bits por segundo
    map.insert_some(
        "bitrate",
        properties
            .audio_bitrate()
            .map(|kbps| u64::from(kbps) * 1000),
    );
    map.insert_some("sample_rate", properties.sample_rate());
    map.insert_some("channels", properties.channels());
    map.insert_some("audio_bit_depth", properties.bit_depth());
    map.insert_some("audio_overall_bitrate_kbps", properties.overall_bitrate());
    map.insert("audio_file_type", format!("{:?}", tagged_file.file_type()));

    // Varios valores para la misma clave se agrupan en una lista.
    let mut grouped: BTreeMap<String, Vec<MetadataValue>> = BTreeMap::new();
    for tag in tagged_file.tags() {
        for item in tag.items() {
            let Some(value) = item_value(item.value()) else {
                continue;
            };
            grouped.entry(item_key(item.key())).or_default().push(value);
        }
        if tag.picture_count() > 0 {
            map.insert("audio_picture_count", tag.picture_count());
        }
    }

    let total = grouped.len();
    for (key, mut values) in grouped.into_iter().take(limit) {
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            MetadataValue::List(values)
        };
        map.insert(format!("tag_{key}"), value);
    }
    if let Some(note) = truncation_note(total, limit, "tags") {
        map.insert("tags_note", note);
    }

    Ok(map)
}

fn item_key(key: &ItemKey) -> String {
    match key {
        ItemKey::Unknown(raw) => raw.clone(),
        other => format!("{other:?}"),
    }
}

fn item_value(value: &ItemValue) -> Option<MetadataValue> {
    match value {
        ItemValue::Text(text) | ItemValue::Locator(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| MetadataValue::from(text))
        }
        ItemValue::Binary(bytes) => Some(MetadataValue::Bytes(bytes.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn silent_wav(seconds: u32) -> Vec<u8> {
        let sample_rate = 8_000_u32;
        let byte_rate = sample_rate * 2;
        let data_len = byte_rate * seconds;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&2_u16.to_le_bytes());
        bytes.extend_from_slice(&16_u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(bytes.len() + data_len as usize, 0);
        bytes
    }

    #[test]
    fn wav_properties_from_both_sources() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("tone.wav");
        fs::write(&path, silent_wav(1))?;

        let map = extract(&path, &ExtractOptions::default());
        let int = |key: &str| map.get(key).and_then(MetadataValue::as_integer);
        assert_eq!(int("sample_rate"), Some(8_000));
        assert_eq!(int("channels"), Some(1));
        assert_eq!(int("native_sample_rate"), Some(8_000));
        assert_eq!(
            map.get("duration_seconds").and_then(MetadataValue::as_float),
            Some(1.0)
        );
        assert!(map.contains_key("file_size_mb"));
        Ok(())
    }

    #[test]
    fn garbage_keeps_basic_info_and_reports_sources() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("noise.bin");
        fs::write(&path, [0x13_u8; 64])?;

        let map = extract(&path, &ExtractOptions::default());
        assert!(map.contains_key("file_name"));
        assert!(map.contains_key("file_size_bytes"));
        assert!(map.contains_key("audio_note") || map.contains_key("audio_error"));
        assert!(map.contains_key("native_note"));
        Ok(())
    }

    #[test]
    fn unknown_item_keys_keep_their_raw_name() {
        assert_eq!(item_key(&ItemKey::Unknown("MOOD".to_string())), "MOOD");
        assert_eq!(item_key(&ItemKey::TrackTitle), "TrackTitle");
    }
}
