//! Lector nativo de contenedores de video: cajas ISO-BMFF (MP4/MOV) y Matroska/WebM.

use super::binary::{
    be_u16, be_u32, be_u64, child_boxes, ebml_children, ebml_float, ebml_string, ebml_uint,
    read_box_header, read_box_payload, read_up_to,
};
use super::source::push_bounded_list;
use crate::error::{SourceError, SourceResult};
use crate::formatting::round2;
use crate::metadata::MetadataMap;
use chrono::{Duration, NaiveDate};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

const MOOV_LIMIT: u64 = 8 * 1024 * 1024;
const MATROSKA_LIMIT: u64 = 8 * 1024 * 1024;

const EBML_HEADER: u32 = 0x1A45_DFA3;
const SEGMENT: u32 = 0x1853_8067;
const SEGMENT_INFO: u32 = 0x1549_A966;
const TRACKS: u32 = 0x1654_AE6B;
const TRACK_ENTRY: u32 = 0xAE;

pub fn extract(path: &Path, limit: usize) -> SourceResult {
    let mut file = File::open(path)?;
    let head = read_up_to(&mut file, 12)?;
    file.seek(SeekFrom::Start(0))?;

    if head.get(4..8) == Some(&b"ftyp"[..]) {
        read_mp4(file, limit)
    } else if head.starts_with(&EBML_HEADER.to_be_bytes()) {
        read_matroska(file, limit)
    } else {
        Err(SourceError::Unsupported(
            "not an MP4/QuickTime or Matroska container".to_string(),
        ))
    }
}

// === MP4/MOV ===

#[derive(Default)]
struct MovieHeader {
    creation: Option<u64>,
    modification: Option<u64>,
    timescale: Option<u32>,
    duration: Option<u64>,
}

fn read_mp4(file: File, limit: usize) -> SourceResult {
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut map = MetadataMap::new();
    map.insert("container_format", "MP4/QuickTime");

    let mut mdat_seen = false;
    let mut moov_first = None;
    let mut tracks = Vec::new();

    // Cada vuelta avanza al menos los 8 bytes de la cabecera.
    let mut offset = 0_u64;
    while offset < file_len {
        reader.seek(SeekFrom::Start(offset))?;
        let Some(header) = read_box_header(&mut reader) else {
            break;
        };
        let payload_start = reader.stream_position()?;
        let end = match header.payload_size {
            Some(size) => payload_start.checked_add(size),
            None => Some(file_len),
        };
        let Some(end) = end.filter(|&end| end <= file_len) else {
            let kind = ascii4(&header.kind);
            tracing::debug!(offset, kind = %kind, "caja fuera de los límites del archivo");
            map.insert(
                "container_warning",
                format!("box `{kind}` at offset {offset} extends past the end of the file"),
            );
            break;
        };

        if header.is(b"ftyp") {
            let payload = read_box_payload(&mut reader, &header, 4096)?;
            if payload.len() >= 8 {
                map.insert("container_major_brand", ascii4(&payload[0..4]));
                map.insert_some("container_minor_version", be_u32(&payload, 4));
                let brands: Vec<String> = payload[8..].chunks_exact(4).map(ascii4).collect();
                if !brands.is_empty() {
                    map.insert("container_brands", brands);
                }
            }
        } else if header.is(b"moov") {
            if moov_first.is_none() {
                moov_first = Some(!mdat_seen);
            }
            let payload = read_box_payload(&mut reader, &header, MOOV_LIMIT)?;
            let movie = read_moov(&payload, &mut tracks);
            if let (Some(duration), Some(timescale)) = (movie.duration, movie.timescale)
                && timescale > 0
            {
                map.insert(
                    "container_duration_seconds",
                    round2(duration as f64 / f64::from(timescale)),
                );
            }
            map.insert_some("container_timescale", movie.timescale);
            map.insert_some("container_creation_time", movie.creation.map(mp4_time));
            map.insert_some(
                "container_modification_time",
                movie.modification.map(mp4_time),
            );
        } else if header.is(b"mdat") {
            mdat_seen = true;
        }
        offset = end;
    }

    map.insert_some("container_fast_start", moov_first);
    map.insert("container_track_count", tracks.len());
    if !tracks.is_empty() {
        push_bounded_list(&mut map, "container_tracks", tracks, limit, "tracks");
    }
    Ok(map)
}

fn ascii4(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()
}

fn read_moov(data: &[u8], tracks: &mut Vec<String>) -> MovieHeader {
    let mut movie = MovieHeader::default();
    for (header, payload) in child_boxes(data) {
        if header.is(b"mvhd") {
            movie = read_mvhd(payload);
        } else if header.is(b"trak")
            && let Some(track) = describe_trak(payload)
        {
            tracks.push(track);
        }
    }
    movie
}

fn read_mvhd(payload: &[u8]) -> MovieHeader {
    match payload.first() {
        Some(1) => MovieHeader {
            creation: be_u64(payload, 4),
            modification: be_u64(payload, 12),
            timescale: be_u32(payload, 20),
            duration: be_u64(payload, 24),
        },
        Some(0) => MovieHeader {
            creation: be_u32(payload, 4).map(u64::from),
            modification: be_u32(payload, 8).map(u64::from),
            timescale: be_u32(payload, 12),
            duration: be_u32(payload, 16).map(u64::from),
        },
        _ => MovieHeader::default(),
    }
}

/// Resumen de una pista: `type:vide | codec:avc1 | dur:12.50s | size:1920x1080`.
fn describe_trak(data: &[u8]) -> Option<String> {
    let mut parts = Vec::new();
    let mut dimensions = None;

    for (header, payload) in child_boxes(data) {
        if header.is(b"tkhd") {
            let (width_at, height_at) = if payload.first() == Some(&1) { (88, 92) } else { (76, 80) };
            let width = be_u32(payload, width_at).map(|value| value >> 16).unwrap_or(0);
            let height = be_u32(payload, height_at).map(|value| value >> 16).unwrap_or(0);
            if width > 0 && height > 0 {
                dimensions = Some(format!("size:{width}x{height}"));
            }
        } else if header.is(b"mdia") {
            describe_mdia(payload, &mut parts);
        }
    }

    parts.extend(dimensions);
    (!parts.is_empty()).then(|| parts.join(" | "))
}

fn describe_mdia(data: &[u8], parts: &mut Vec<String>) {
    for (header, payload) in child_boxes(data) {
        if header.is(b"hdlr") {
            if let Some(handler) = payload.get(8..12) {
                parts.insert(0, format!("type:{}", ascii4(handler)));
            }
        } else if header.is(b"mdhd") {
            let (scale, duration) = match payload.first() {
                Some(1) => (be_u32(payload, 20), be_u64(payload, 24)),
                _ => (be_u32(payload, 12), be_u32(payload, 16).map(u64::from)),
            };
            if let (Some(scale), Some(duration)) = (scale, duration)
                && scale > 0
            {
                parts.push(format!("dur:{:.2}s", duration as f64 / f64::from(scale)));
            }
        } else if header.is(b"minf") {
            let sample_table = child_boxes(payload)
                .into_iter()
                .find(|(header, _)| header.is(b"stbl"))
                .map(|(_, stbl)| stbl);
            if let Some(stbl) = sample_table {
                describe_stsd(stbl, parts);
            }
        }
    }
}

fn describe_stsd(stbl: &[u8], parts: &mut Vec<String>) {
    let Some((_, stsd)) = child_boxes(stbl)
        .into_iter()
        .find(|(header, _)| header.is(b"stsd"))
    else {
        return;
    };
    // versión+flags (4), número de entradas (4), tamaño de entrada (4), formato (4)
    let Some(codec) = stsd.get(12..16) else {
        return;
    };
    let codec = ascii4(codec);
    let is_audio = matches!(codec.as_str(), "mp4a" | "ac-3" | "ec-3" | "alac" | "Opus" | "fLaC");
    parts.push(format!("codec:{codec}"));
    if is_audio
        && let (Some(channels), Some(rate)) = (be_u16(stsd, 32), be_u32(stsd, 40))
    {
        parts.push(format!("audio:{channels}ch {}Hz", rate >> 16));
    }
}

/// Segundos desde 1904-01-01, la época de QuickTime.
fn mp4_time(seconds: u64) -> String {
    let epoch = NaiveDate::from_ymd_opt(1904, 1, 1).and_then(|date| date.and_hms_opt(0, 0, 0));
    match (epoch, i64::try_from(seconds)) {
        (Some(epoch), Ok(seconds)) => Duration::try_seconds(seconds)
            .and_then(|offset| epoch.checked_add_signed(offset))
            .map(|moment| moment.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| seconds.to_string()),
        _ => seconds.to_string(),
    }
}

// === Matroska/WebM ===

fn read_matroska(mut file: File, limit: usize) -> SourceResult {
    let data = read_up_to(&mut file, MATROSKA_LIMIT)?;
    let mut map = MetadataMap::new();
    map.insert("container_format", "Matroska");

    for (id, body) in ebml_children(&data) {
        match id {
            EBML_HEADER => read_ebml_header(body, &mut map),
            SEGMENT => read_segment(body, &mut map, limit),
            _ => {}
        }
    }
    Ok(map)
}

fn read_ebml_header(data: &[u8], map: &mut MetadataMap) {
    for (id, body) in ebml_children(data) {
        match id {
            0x4286 => {
                map.insert("container_ebml_version", ebml_uint(body));
            }
            0x4282 => {
                let doc_type = ebml_string(body);
                if doc_type == "webm" {
                    map.insert("container_format", "WebM");
                }
                map.insert("container_doc_type", doc_type);
            }
            0x4287 => {
                map.insert("container_doc_type_version", ebml_uint(body));
            }
            _ => {}
        }
    }
}

fn read_segment(data: &[u8], map: &mut MetadataMap, limit: usize) {
    for (id, body) in ebml_children(data) {
        match id {
            SEGMENT_INFO => read_segment_info(body, map),
            TRACKS => {
                let tracks: Vec<String> = ebml_children(body)
                    .into_iter()
                    .filter(|(id, _)| *id == TRACK_ENTRY)
                    .enumerate()
                    .map(|(index, (_, entry))| {
                        describe_track_entry(entry).unwrap_or_else(|| format!("track {}", index + 1))
                    })
                    .collect();
                map.insert("container_track_count", tracks.len());
                if !tracks.is_empty() {
                    push_bounded_list(map, "container_tracks", tracks, limit, "tracks");
                }
            }
            _ => {}
        }
    }
}

fn read_segment_info(data: &[u8], map: &mut MetadataMap) {
    let mut timecode_scale = 1_000_000_u64;
    let mut raw_duration = None;

    for (id, body) in ebml_children(data) {
        match id {
            0x2AD7B1 => timecode_scale = ebml_uint(body),
            0x4489 => raw_duration = ebml_float(body),
            0x4D80 => map.insert_text("container_muxing_app", ebml_string(body)),
            0x5741 => map.insert_text("container_writing_app", ebml_string(body)),
            0x7BA9 => map.insert_text("container_title", ebml_string(body)),
            0x4461 => {
                // nanosegundos desde 2001-01-01T00:00:00 UTC
                let nanos = i64::from_be_bytes(body.try_into().unwrap_or([0; 8]));
                if let Some(moment) = NaiveDate::from_ymd_opt(2001, 1, 1)
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .and_then(|epoch| epoch.checked_add_signed(Duration::nanoseconds(nanos)))
                {
                    map.insert(
                        "container_date_utc",
                        moment.format("%Y-%m-%d %H:%M:%S").to_string(),
                    );
                }
            }
            _ => {}
        }
    }

    map.insert("container_timecode_scale", timecode_scale);
    if let Some(duration) = raw_duration {
        let seconds = duration * timecode_scale as f64 / 1e9;
        map.insert("container_duration_seconds", round2(seconds));
    }
}

fn describe_track_entry(data: &[u8]) -> Option<String> {
    let mut parts = Vec::new();
    for (id, body) in ebml_children(data) {
        let part = match id {
            0xD7 => format!("id:{}", ebml_uint(body)),
            0x83 => format!(
                "type:{}",
                match ebml_uint(body) {
                    1 => "video",
                    2 => "audio",
                    3 => "complex",
                    16 => "logo",
                    17 => "subtitle",
                    18 => "buttons",
                    32 => "control",
                    _ => "other",
                }
            ),
            0x86 => format!("codec:{}", ebml_string(body)),
            0x258688 => format!("codec_name:{}", ebml_string(body)),
            0x22B59C => format!("lang:{}", ebml_string(body)),
            0x536E => format!("name:{}", ebml_string(body)),
            0xE0 => match video_size(body) {
                Some(size) => size,
                None => continue,
            },
            _ => continue,
        };
        parts.push(part);
    }
    (!parts.is_empty()).then(|| parts.join(" | "))
}

fn video_size(data: &[u8]) -> Option<String> {
    let mut width = None;
    let mut height = None;
    for (id, body) in ebml_children(data) {
        match id {
            0xB0 => width = Some(ebml_uint(body)),
            0xBA => height = Some(ebml_uint(body)),
            _ => {}
        }
    }
    Some(format!("size:{}x{}", width?, height?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataValue;
    use std::fs;
    use tempfile::tempdir;

    fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut bytes = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(kind);
        bytes.extend_from_slice(payload);
        bytes
    }

    fn ebml(id: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut bytes = id.to_vec();
        bytes.push(0x80 | payload.len() as u8);
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn mp4_brands_duration_and_fast_start() -> Result<(), Box<dyn std::error::Error>> {
        let mut ftyp = b"isom".to_vec();
        ftyp.extend_from_slice(&512_u32.to_be_bytes());
        ftyp.extend_from_slice(b"isomiso2mp41");

        let mut mvhd = vec![0_u8; 4];
        mvhd.extend_from_slice(&0_u32.to_be_bytes());
        mvhd.extend_from_slice(&0_u32.to_be_bytes());
        mvhd.extend_from_slice(&1000_u32.to_be_bytes());
        mvhd.extend_from_slice(&12_500_u32.to_be_bytes());
        mvhd.resize(100, 0);

        let mut file = mp4_box(b"ftyp", &ftyp);
        file.extend(mp4_box(b"moov", &mp4_box(b"mvhd", &mvhd)));
        file.extend(mp4_box(b"mdat", &[0_u8; 32]));

        let dir = tempdir()?;
        let path = dir.path().join("clip.mp4");
        fs::write(&path, file)?;

        let map = extract(&path, 50)?;
        assert_eq!(
            map.get("container_major_brand").and_then(MetadataValue::as_text),
            Some("isom")
        );
        assert_eq!(
            map.get("container_duration_seconds").and_then(MetadataValue::as_float),
            Some(12.5)
        );
        assert_eq!(
            map.get("container_fast_start"),
            Some(&MetadataValue::Bool(true))
        );
        assert_eq!(
            map.get("container_creation_time").and_then(MetadataValue::as_text),
            Some("1904-01-01 00:00:00")
        );
        Ok(())
    }

    #[test]
    fn matroska_segment_info_is_read() -> Result<(), Box<dyn std::error::Error>> {
        let header = ebml(&[0x1A, 0x45, 0xDF, 0xA3], &ebml(&[0x42, 0x82], b"matroska"));

        let mut info = ebml(&[0x2A, 0xD7, 0xB1], &[0x0F, 0x42, 0x40]);
        info.extend(ebml(&[0x44, 0x89], &2500.0_f64.to_be_bytes()));
        info.extend(ebml(&[0x4D, 0x80], b"libebml"));
        let mut segment_body = ebml(&[0x15, 0x49, 0xA9, 0x66], &info);

        let mut track = ebml(&[0xD7], &[1]);
        track.extend(ebml(&[0x83], &[1]));
        track.extend(ebml(&[0x86], b"V_VP9"));
        segment_body.extend(ebml(&[0x16, 0x54, 0xAE, 0x6B], &ebml(&[0xAE], &track)));

        // Segmento con tamaño desconocido, como en las grabaciones en vivo.
        let mut file = header;
        file.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        file.extend(segment_body);

        let dir = tempdir()?;
        let path = dir.path().join("clip.mkv");
        fs::write(&path, file)?;

        let map = extract(&path, 50)?;
        let text = |key: &str| map.get(key).and_then(MetadataValue::as_text);
        assert_eq!(text("container_doc_type"), Some("matroska"));
        assert_eq!(text("container_muxing_app"), Some("libebml"));
        assert_eq!(
            map.get("container_duration_seconds").and_then(MetadataValue::as_float),
            Some(2.5)
        );
        let tracks = map.get("container_tracks").and_then(MetadataValue::as_list);
        assert_eq!(
            tracks.and_then(|list| list.first()).and_then(MetadataValue::as_text),
            Some("id:1 | type:video | codec:V_VP9")
        );
        Ok(())
    }

    #[test]
    fn other_content_is_unsupported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("clip.avi");
        fs::write(&path, b"RIFF\0\0\0\0AVI LIST")?;
        assert!(matches!(extract(&path, 50), Err(SourceError::Unsupported(_))));
        Ok(())
    }

    /// Ejecuta la extracción en otro hilo para que un bucle infinito falle el test.
    fn extract_within(path: &Path, seconds: u64) -> Result<MetadataMap, Box<dyn std::error::Error>> {
        let (sender, receiver) = std::sync::mpsc::channel();
        let path = path.to_path_buf();
        std::thread::spawn(move || {
            let _ = sender.send(extract(&path, 50));
        });
        Ok(receiver.recv_timeout(std::time::Duration::from_secs(seconds))??)
    }

    #[test]
    fn extended_size_overflow_ends_the_walk() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = mp4_box(b"ftyp", b"isom\0\0\0\0");
        file.extend(mp4_box(b"free", &[]));
        file.extend_from_slice(&1_u32.to_be_bytes());
        file.extend_from_slice(b"junk");
        file.extend_from_slice(&0xFFFF_FFFF_FFFF_FFF8_u64.to_be_bytes());
        assert_eq!(file.len(), 40);

        let dir = tempdir()?;
        let path = dir.path().join("crafted.mp4");
        fs::write(&path, file)?;

        let map = extract_within(&path, 5)?;
        assert_eq!(
            map.get("container_major_brand").and_then(MetadataValue::as_text),
            Some("isom")
        );
        assert_eq!(
            map.get("container_warning").and_then(MetadataValue::as_text),
            Some("box `junk` at offset 24 extends past the end of the file")
        );
        Ok(())
    }

    #[test]
    fn truncated_and_undersized_boxes_keep_partial_results() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;

        // mdat declara 1000 bytes pero el archivo termina antes.
        let mut truncated = mp4_box(b"ftyp", b"mp42\0\0\0\0");
        truncated.extend_from_slice(&1000_u32.to_be_bytes());
        truncated.extend_from_slice(b"mdat");
        truncated.extend_from_slice(&[0_u8; 10]);
        let path = dir.path().join("partial.mp4");
        fs::write(&path, truncated)?;
        let map = extract_within(&path, 5)?;
        assert_eq!(
            map.get("container_major_brand").and_then(MetadataValue::as_text),
            Some("mp42")
        );
        assert!(map.contains_key("container_warning"));

        // Tamaño menor que la propia cabecera: no hay caja válida que recorrer.
        let mut undersized = mp4_box(b"ftyp", b"isom\0\0\0\0");
        undersized.extend_from_slice(&4_u32.to_be_bytes());
        undersized.extend_from_slice(b"free");
        undersized.extend_from_slice(&[0xAB; 24]);
        let path = dir.path().join("undersized.mp4");
        fs::write(&path, undersized)?;
        let map = extract_within(&path, 5)?;
        assert_eq!(
            map.get("container_track_count").and_then(MetadataValue::as_integer),
            Some(0)
        );
        assert!(!map.contains_key("container_warning"));
        Ok(())
    }

    #[test]
    fn oversized_moov_children_are_clipped() -> Result<(), Box<dyn std::error::Error>> {
        // trak declara 4 GiB dentro de un moov de pocos bytes.
        let mut trak = 0xFFFF_FFFF_u32.to_be_bytes().to_vec();
        trak.extend_from_slice(b"trak");
        trak.extend_from_slice(&[0_u8; 12]);
        let mut file = mp4_box(b"ftyp", b"isom\0\0\0\0");
        file.extend(mp4_box(b"moov", &trak));

        let dir = tempdir()?;
        let path = dir.path().join("clipped.mp4");
        fs::write(&path, file)?;

        let map = extract_within(&path, 5)?;
        assert_eq!(map.get("container_fast_start"), Some(&MetadataValue::Bool(true)));
        assert_eq!(
            map.get("container_track_count").and_then(MetadataValue::as_integer),
            Some(0)
        );
        Ok(())
    }

    #[test]
    fn matroska_sizes_past_the_end_are_clipped() -> Result<(), Box<dyn std::error::Error>> {
        let header = ebml(&[0x1A, 0x45, 0xDF, 0xA3], &ebml(&[0x42, 0x82], b"webm"));

        // Segment e Info declaran tamaños mayores que el propio archivo.
        let mut file = header;
        file.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x00]);
        file.extend_from_slice(&[0x15, 0x49, 0xA9, 0x66, 0x01, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xF0]);
        file.extend(ebml(&[0x4D, 0x80], b"mux"));
        file.extend_from_slice(&[0x00, 0x00, 0x00]);

        let dir = tempdir()?;
        let path = dir.path().join("broken.webm");
        fs::write(&path, file)?;

        let map = extract_within(&path, 5)?;
        assert_eq!(
            map.get("container_format").and_then(MetadataValue::as_text),
            Some("WebM")
        );
        assert_eq!(
            map.get("container_muxing_app").and_then(MetadataValue::as_text),
            Some("mux")
        );
        Ok(())
    }
}
