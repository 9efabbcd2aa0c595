//! Lector nativo de cabeceras de audio: ID3v2 + trama MPEG, WAV, FLAC y Ogg.
//!
//! Complementa a `lofty` con datos crudos del contenedor (versión de ID3, capa MPEG,
//! fragmentos RIFF, MD5 de FLAC…). Todas las claves llevan el prefijo `native_`.

use super::binary::{
    find_bytes, fixed_ascii, le_u16, le_u32, le_u64, read_up_to, synchsafe, take_le_u32,
};
use super::source::truncation_note;
use crate::error::{SourceError, SourceResult};
use crate::formatting::round2;
use crate::metadata::MetadataMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Bytes inspeccionados al buscar la primera trama MPEG y la cabecera Xing.
const MPEG_SCAN_BYTES: u64 = 64 * 1024;
const OGG_WINDOW: u64 = 64 * 1024;
const CHUNK_PAYLOAD_LIMIT: usize = 4096;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum AudioKind {
    Mpeg,
    Wav,
    Flac,
    Ogg,
}

fn sniff(header: &[u8], path: &Path) -> Option<AudioKind> {
    if header.starts_with(b"ID3") || (header.len() >= 2 && header[0] == 0xFF && header[1] & 0xE0 == 0xE0)
    {
        return Some(AudioKind::Mpeg);
    }
    if header.starts_with(b"RIFF") && header.get(8..12) == Some(&b"WAVE"[..]) {
        return Some(AudioKind::Wav);
    }
    if header.starts_with(b"fLaC") {
        return Some(AudioKind::Flac);
    }
    if header.starts_with(b"OggS") {
        return Some(AudioKind::Ogg);
    }
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    (extension == "mp3").then_some(AudioKind::Mpeg)
}

pub fn extract(path: &Path, limit: usize) -> SourceResult {
    let mut file = File::open(path)?;
    let header = read_up_to(&mut file, 12)?;
    file.seek(SeekFrom::Start(0))?;

    let kind = sniff(&header, path)
        .ok_or_else(|| SourceError::Unsupported("no native audio header recognized".to_string()))?;

    let mut map = MetadataMap::new();
    match kind {
        AudioKind::Mpeg => {
            map.insert("native_format", "MP3");
            read_mpeg(&mut file, &mut map)?;
        }
        AudioKind::Wav => {
            map.insert("native_format", "WAV");
            read_wav(&mut file, &mut map)?;
        }
        AudioKind::Flac => {
            map.insert("native_format", "FLAC");
            read_flac(&mut file, &mut map, limit)?;
        }
        AudioKind::Ogg => {
            map.insert("native_format", "OGG");
            read_ogg(&mut file, &mut map, limit)?;
        }
    }
    Ok(map)
}

// === MP3 ===

fn read_mpeg(file: &mut File, map: &mut MetadataMap) -> SourceResult<()> {
    let file_size = file.metadata()?.len();
    let head = read_up_to(file, 10)?;

    let audio_offset = if head.starts_with(b"ID3") && head.len() == 10 {
        let major = head[3];
        map.insert("native_id3_version", format!("v2.{}.{}", major, head[4]));
        let size = synchsafe(&head[6..10]) as usize;
        let tag = read_up_to(file, size as u64)?;
        read_id3_frames(&tag, major, map);
        10 + size as u64
    } else {
        0
    };

    file.seek(SeekFrom::Start(audio_offset))?;
    let window = read_up_to(file, MPEG_SCAN_BYTES)?;
    let Some((position, frame)) = find_frame(&window) else {
        return Ok(());
    };

    map.insert("native_mpeg_version", frame.version);
    map.insert("native_layer", frame.layer);
    map.insert_some("native_bitrate_kbps", frame.bitrate_kbps);
    map.insert_some("native_sample_rate", frame.sample_rate);
    map.insert("native_channel_mode", frame.channel_mode);

    let after_frame = &window[position..];
    if let Some(idx) = find_bytes(after_frame, b"Xing") {
        map.insert("native_vbr", "VBR");
        map.insert_some("native_frame_count", xing_frames(after_frame, idx));
    } else if let Some(idx) = find_bytes(after_frame, b"Info") {
        map.insert("native_vbr", "CBR");
        map.insert_some("native_frame_count", xing_frames(after_frame, idx));
    }
    map.insert_some("native_encoder", encoder_label(after_frame));

    if let Some(kbps) = frame.bitrate_kbps
        && kbps > 0
    {
        let audio_bytes = file_size.saturating_sub(audio_offset + position as u64);
        let seconds = audio_bytes as f64 * 8.0 / (f64::from(kbps) * 1000.0);
        map.insert("native_duration_seconds", round2(seconds));
    }
    Ok(())
}

fn read_id3_frames(tag: &[u8], major: u8, map: &mut MetadataMap) {
    // ID3v2.2 usa identificadores de tres letras; solo se informa la versión.
    if major < 3 {
        return;
    }

    let mut offset = 0;
    while offset + 10 <= tag.len() {
        let id = &tag[offset..offset + 4];
        if id.iter().all(|byte| *byte == 0) {
            break;
        }
        let raw_size = &tag[offset + 4..offset + 8];
        let size = if major >= 4 {
            synchsafe(raw_size) as usize
        } else {
            u32::from_be_bytes([raw_size[0], raw_size[1], raw_size[2], raw_size[3]]) as usize
        };
        let start = offset + 10;
        let Some(frame) = tag.get(start..start + size) else {
            break;
        };

        let key = match id {
            b"TIT2" => Some("native_title"),
            b"TPE1" => Some("native_artist"),
            b"TALB" => Some("native_album"),
            b"TDRC" | b"TYER" => Some("native_year"),
            b"TRCK" => Some("native_track"),
            b"TCON" => Some("native_genre"),
            b"TCOM" => Some("native_composer"),
            b"TPUB" => Some("native_publisher"),
            _ => None,
        };
        if let Some(key) = key {
            if let Some(text) = id3_text(frame) {
                map.insert_text(key, text);
            }
        } else if id == b"COMM" {
            if let Some(text) = id3_comment(frame) {
                map.insert_text("native_comment", text);
            }
        } else if id == b"USLT" {
            map.insert("native_has_lyrics", true);
        } else if id == b"APIC" {
            map.insert_some("native_cover", apic_summary(frame));
        }

        offset = start + size;
    }
}

/// Decodifica un campo de texto ID3 según su byte de codificación.
fn decode_id3(encoding: u8, data: &[u8]) -> Option<String> {
    let text = match encoding {
        0 => data.iter().map(|&byte| char::from(byte)).collect::<String>(),
        3 => String::from_utf8_lossy(data).into_owned(),
        1 | 2 => {
            let (body, little_endian) = match data {
                [0xFF, 0xFE, rest @ ..] => (rest, true),
                [0xFE, 0xFF, rest @ ..] => (rest, false),
                _ => (data, false),
            };
            let units: Vec<u16> = body
                .chunks_exact(2)
                .map(|pair| {
                    if little_endian {
                        u16::from_le_bytes([pair[0], pair[1]])
                    } else {
                        u16::from_be_bytes([pair[0], pair[1]])
                    }
                })
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => return None,
    };
    let text = text.trim_matches('\0').trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn id3_text(frame: &[u8]) -> Option<String> {
    let (&encoding, data) = frame.split_first()?;
    decode_id3(encoding, data)
}

/// COMM: codificación, idioma (3 bytes), descripción terminada en nulo y texto.
fn id3_comment(frame: &[u8]) -> Option<String> {
    let (&encoding, rest) = frame.split_first()?;
    let body = rest.get(3..)?;
    let wide = matches!(encoding, 1 | 2);
    let text_start = if wide {
        body.chunks_exact(2)
            .position(|pair| pair == [0, 0])
            .map(|index| index * 2 + 2)
    } else {
        body.iter().position(|&byte| byte == 0).map(|index| index + 1)
    }
    .unwrap_or(0);
    decode_id3(encoding, body.get(text_start..)?)
}

fn apic_summary(frame: &[u8]) -> Option<String> {
    let body = frame.get(1..)?;
    let end = body.iter().position(|&byte| byte == 0)?;
    let mime = String::from_utf8_lossy(&body[..end]);
    Some(format!("{mime} ({} bytes)", frame.len()))
}

struct MpegFrame {
    version: &'static str,
    layer: &'static str,
    bitrate_kbps: Option<u32>,
    sample_rate: Option<u32>,
    channel_mode: &'static str,
}

fn find_frame(window: &[u8]) -> Option<(usize, MpegFrame)> {
    window
        .windows(4)
        .enumerate()
        .find_map(|(position, bytes)| parse_frame_header(bytes).map(|frame| (position, frame)))
}

fn parse_frame_header(bytes: &[u8]) -> Option<MpegFrame> {
    let header = u32::from_be_bytes(bytes.try_into().ok()?);
    if header >> 21 != 0x7FF {
        return None;
    }
    let version_bits = (header >> 19) & 0x3;
    let layer_bits = (header >> 17) & 0x3;
    let bitrate_index = (header >> 12) & 0xF;
    let sample_index = (header >> 10) & 0x3;
    if version_bits == 0b01 || layer_bits == 0 || bitrate_index == 0xF || sample_index == 0x3 {
        return None;
    }

    let (version, rates) = match version_bits {
        0b11 => ("MPEG1", [44_100, 48_000, 32_000]),
        0b10 => ("MPEG2", [22_050, 24_000, 16_000]),
        _ => ("MPEG2.5", [11_025, 12_000, 8_000]),
    };
    let layer = match layer_bits {
        0b01 => "Layer III",
        0b10 => "Layer II",
        _ => "Layer I",
    };
    let channel_mode = match (header >> 6) & 0x3 {
        0 => "Stereo",
        1 => "Joint Stereo",
        2 => "Dual Channel",
        _ => "Mono",
    };

    Some(MpegFrame {
        version,
        layer,
        bitrate_kbps: mpeg_bitrate(version_bits, layer_bits, bitrate_index),
        sample_rate: rates.get(sample_index as usize).copied(),
        channel_mode,
    })
}

fn mpeg_bitrate(version_bits: u32, layer_bits: u32, index: u32) -> Option<u32> {
    const V1_L3: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
    const V1_L2: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384];
    const V1_L1: [u32; 15] = [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448];
    const V2_L1: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256];
    const V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

    if index == 0 {
        return None;
    }
    let table = match (version_bits, layer_bits) {
        (0b11, 0b01) => &V1_L3,
        (0b11, 0b10) => &V1_L2,
        (0b11, _) => &V1_L1,
        (_, 0b11) => &V2_L1,
        _ => &V2_L23,
    };
    table.get(index as usize).copied()
}

fn xing_frames(data: &[u8], idx: usize) -> Option<u32> {
    let flags = u32::from_be_bytes(data.get(idx + 4..idx + 8)?.try_into().ok()?);
    if flags & 0x1 == 0 {
        return None;
    }
    Some(u32::from_be_bytes(data.get(idx + 8..idx + 12)?.try_into().ok()?))
}

fn encoder_label(data: &[u8]) -> Option<String> {
    ["LAME", "Lavf", "Lavc", "iTunes", "FhG"].iter().find_map(|marker| {
        let idx = find_bytes(data, marker.as_bytes())?;
        let label: String = data[idx..data.len().min(idx + 12)]
            .iter()
            .take_while(|byte| byte.is_ascii_graphic() || **byte == b' ')
            .map(|&byte| char::from(byte))
            .collect();
        Some(label.trim().to_string())
    })
}

// === WAV ===

fn read_wav(file: &mut File, map: &mut MetadataMap) -> SourceResult<()> {
    file.seek(SeekFrom::Start(12))?;
    let mut chunks = Vec::new();
    let mut byte_rate = None;
    let mut data_size = None;

    loop {
        let mut header = [0_u8; 8];
        if file.read_exact(&mut header).is_err() {
            break;
        }
        let id = String::from_utf8_lossy(&header[0..4]).into_owned();
        let size = u64::from(u32::from_le_bytes([header[4], header[5], header[6], header[7]]));
        chunks.push(id.trim().to_string());

        let payload = match id.as_str() {
            "fmt " | "LIST" | "bext" => read_up_to(file, size.min(CHUNK_PAYLOAD_LIMIT as u64))?,
            _ => Vec::new(),
        };
        match id.as_str() {
            "fmt " => {
                if payload.len() >= 16 {
                    map.insert_some("native_audio_format", le_u16(&payload, 0).map(wav_format_name));
                    map.insert_some("native_channels", le_u16(&payload, 2));
                    map.insert_some("native_sample_rate", le_u32(&payload, 4));
                    byte_rate = le_u32(&payload, 8);
                    map.insert_some("native_byte_rate", byte_rate);
                    map.insert_some("native_block_align", le_u16(&payload, 12));
                    map.insert_some("native_bits_per_sample", le_u16(&payload, 14));
                }
            }
            "data" => data_size = Some(size),
            "LIST" => read_riff_info(&payload, map),
            "bext" => read_bext(&payload, map),
            _ => {}
        }

        let remaining = size - payload.len() as u64 + (size % 2);
        file.seek(SeekFrom::Current(remaining as i64))?;
    }

    if !chunks.is_empty() {
        map.insert("native_chunks", chunks);
    }
    if let (Some(rate), Some(size)) = (byte_rate, data_size)
        && rate > 0
    {
        map.insert("native_duration_seconds", round2(size as f64 / f64::from(rate)));
    }
    Ok(())
}

fn wav_format_name(code: u16) -> String {
    match code {
        0x0001 => "PCM".to_string(),
        0x0003 => "IEEE float".to_string(),
        0x0006 => "A-law".to_string(),
        0x0007 => "mu-law".to_string(),
        0xFFFE => "Extensible".to_string(),
        other => format!("0x{other:04x}"),
    }
}

/// Subfragmentos `LIST/INFO` (INAM, IART, ICMT…).
fn read_riff_info(payload: &[u8], map: &mut MetadataMap) {
    let Some(body) = payload.strip_prefix(b"INFO") else {
        return;
    };
    let mut offset = 0;
    while offset + 8 <= body.len() {
        let id = String::from_utf8_lossy(&body[offset..offset + 4]).into_owned();
        let Some(size) = le_u32(body, offset + 4).map(|size| size as usize) else {
            break;
        };
        let start = offset + 8;
        let Some(value) = body.get(start..start + size) else {
            break;
        };
        map.insert_text(
            format!("native_info_{}", id.trim().to_ascii_lowercase()),
            fixed_ascii(value, 0, value.len()),
        );
        offset = start + size + (size % 2);
    }
}

/// Broadcast WAV: descripción, originador y fecha de origen.
fn read_bext(payload: &[u8], map: &mut MetadataMap) {
    map.insert_text("native_bext_description", fixed_ascii(payload, 0, 256));
    map.insert_text("native_bext_originator", fixed_ascii(payload, 256, 32));
    map.insert_text("native_bext_originator_reference", fixed_ascii(payload, 288, 32));
    let date = fixed_ascii(payload, 320, 10);
    let time = fixed_ascii(payload, 330, 8);
    map.insert_text("native_bext_origination", format!("{date} {time}"));
    map.insert_some("native_bext_time_reference", le_u64(payload, 338));
}

// === FLAC ===

fn read_flac(file: &mut File, map: &mut MetadataMap, limit: usize) -> SourceResult<()> {
    file.seek(SeekFrom::Start(4))?;
    loop {
        let mut header = [0_u8; 4];
        file.read_exact(&mut header)?;
        let is_last = header[0] & 0x80 != 0;
        let block_type = header[0] & 0x7F;
        let length = u64::from(u32::from_be_bytes([0, header[1], header[2], header[3]]));

        match block_type {
            0 => {
                let payload = read_up_to(file, length)?;
                read_streaminfo(&payload, map);
            }
            4 => {
                let payload = read_up_to(file, length)?;
                read_vorbis_comments(&payload, map, limit);
            }
            6 => {
                map.insert("native_has_picture", true);
                file.seek(SeekFrom::Current(length as i64))?;
            }
            _ => {
                file.seek(SeekFrom::Current(length as i64))?;
            }
        }

        if is_last {
            break;
        }
    }
    Ok(())
}

fn read_streaminfo(payload: &[u8], map: &mut MetadataMap) {
    if payload.len() < 34 {
        return;
    }
    let sample_rate = (u32::from(payload[10]) << 12)
        | (u32::from(payload[11]) << 4)
        | (u32::from(payload[12]) >> 4);
    let channels = ((payload[12] >> 1) & 0x07) + 1;
    let bits_per_sample = ((u16::from(payload[12]) & 0x01) << 4 | (u16::from(payload[13]) >> 4)) + 1;
    let total_samples = (u64::from(payload[13] & 0x0F) << 32)
        | (u64::from(payload[14]) << 24)
        | (u64::from(payload[15]) << 16)
        | (u64::from(payload[16]) << 8)
        | u64::from(payload[17]);

    map.insert("native_sample_rate", sample_rate);
    map.insert("native_channels", channels);
    map.insert("native_bits_per_sample", bits_per_sample);
    map.insert("native_total_samples", total_samples);
    if sample_rate > 0 {
        map.insert(
            "native_duration_seconds",
            round2(total_samples as f64 / f64::from(sample_rate)),
        );
    }
    let md5: String = payload[18..34].iter().map(|byte| format!("{byte:02x}")).collect();
    map.insert("native_audio_md5", md5);
}

/// Bloque de comentarios Vorbis (FLAC y Ogg comparten formato).
fn read_vorbis_comments(payload: &[u8], map: &mut MetadataMap, limit: usize) {
    let mut cursor = payload;
    let Some(vendor_len) = take_le_u32(&mut cursor).map(|len| len as usize) else {
        return;
    };
    let Some(vendor) = cursor.get(..vendor_len) else {
        return;
    };
    map.insert_text("native_vendor", String::from_utf8_lossy(vendor));
    cursor = &cursor[vendor_len..];

    let count = take_le_u32(&mut cursor).unwrap_or(0) as usize;
    let mut seen = 0;
    for _ in 0..count {
        let Some(len) = take_le_u32(&mut cursor).map(|len| len as usize) else {
            break;
        };
        let Some(entry) = cursor.get(..len) else {
            break;
        };
        cursor = &cursor[len..];
        let entry = String::from_utf8_lossy(entry);
        let Some((key, value)) = entry.split_once('=') else {
            continue;
        };
        seen += 1;
        if seen <= limit {
            map.insert_text(format!("native_comment_{}", key.to_ascii_lowercase()), value);
        }
    }
    if let Some(note) = truncation_note(seen, limit, "comments") {
        map.insert("native_comment_note", note);
    }
}

// === OGG ===

struct OggPage<'a> {
    granule: u64,
    serial: u32,
    packet: &'a [u8],
    end: usize,
}

fn ogg_page(data: &[u8], offset: usize) -> Option<OggPage<'_>> {
    if data.get(offset..offset + 4)? != b"OggS" {
        return None;
    }
    let granule = le_u64(data, offset + 6)?;
    let serial = le_u32(data, offset + 14)?;
    let segments = usize::from(*data.get(offset + 26)?);
    let table_start = offset + 27;
    let table = data.get(table_start..table_start + segments)?;
    let body_len: usize = table.iter().map(|&len| usize::from(len)).sum();
    let body_start = table_start + segments;
    let end = body_start + body_len;
    let packet = data.get(body_start..end.min(data.len()))?;
    Some(OggPage {
        granule,
        serial,
        packet,
        end,
    })
}

fn read_ogg(file: &mut File, map: &mut MetadataMap, limit: usize) -> SourceResult<()> {
    let head = read_up_to(file, OGG_WINDOW)?;
    let mut sample_rate = None;
    let mut offset = 0;
    let mut first = true;

    while let Some(page) = ogg_page(&head, offset) {
        if first {
            map.insert("native_stream_serial", page.serial);
            first = false;
        }
        let packet = page.packet;
        if packet.starts_with(b"OpusHead") {
            map.insert("native_codec", "Opus");
            map.insert_some("native_channels", packet.get(9).copied());
            // Opus siempre decodifica a 48 kHz
            sample_rate = Some(48_000);
            map.insert_some("native_input_sample_rate", le_u32(packet, 12));
        } else if packet.starts_with(b"OpusTags") {
            read_vorbis_comments(&packet[8..], map, limit);
        } else if packet.starts_with(b"\x01vorbis") {
            map.insert("native_codec", "Vorbis");
            map.insert_some("native_channels", packet.get(11).copied());
            sample_rate = le_u32(packet, 12);
        } else if packet.starts_with(b"\x03vorbis") {
            read_vorbis_comments(&packet[7..], map, limit);
        }
        offset = page.end;
    }
    map.insert_some("native_sample_rate", sample_rate);

    // La última página lleva la posición final en muestras.
    let size = file.metadata()?.len();
    file.seek(SeekFrom::Start(size.saturating_sub(OGG_WINDOW)))?;
    let tail = read_up_to(file, OGG_WINDOW)?;
    let last_granule = tail
        .windows(4)
        .enumerate()
        .filter(|(_, bytes)| *bytes == b"OggS")
        .filter_map(|(position, _)| le_u64(&tail, position + 6))
        .filter(|granule| *granule != u64::MAX)
        .last();
    if let (Some(granule), Some(rate)) = (last_granule, sample_rate)
        && rate > 0
    {
        map.insert("native_duration_seconds", round2(granule as f64 / f64::from(rate)));
    }
    Ok(())
}
