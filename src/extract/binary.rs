//! Lectores de bajo nivel compartidos por los analizadores de contenedores.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

pub fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn be_u64(data: &[u8], at: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(at..at + 8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

pub fn le_u16(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub fn le_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn le_u64(data: &[u8], at: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(at..at + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// Consume un entero little-endian de 32 bits desde el inicio del segmento.
pub fn take_le_u32(cursor: &mut &[u8]) -> Option<u32> {
    let value = le_u32(cursor, 0)?;
    *cursor = &cursor[4..];
    Some(value)
}

pub fn synchsafe(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0_u32, |value, &byte| (value << 7) | u32::from(byte & 0x7F))
}

pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Campo de texto de ancho fijo rellenado con ceros.
pub fn fixed_ascii(data: &[u8], start: usize, len: usize) -> String {
    let Some(slice) = data.get(start..(start + len).min(data.len())) else {
        return String::new();
    };
    String::from_utf8_lossy(slice)
        .trim_matches('\0')
        .trim()
        .to_string()
}

/// Lee como máximo `limit` bytes desde la posición actual.
pub fn read_up_to<R: Read>(reader: &mut R, limit: u64) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    reader.take(limit).read_to_end(&mut buffer)?;
    Ok(buffer)
}

// === Cajas ISO-BMFF ===

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxHeader {
    pub kind: [u8; 4],
    /// `None` cuando la caja se extiende hasta el final del archivo.
    pub payload_size: Option<u64>,
}

impl BoxHeader {
    pub fn is(&self, kind: &[u8; 4]) -> bool {
        &self.kind == kind
    }
}

/// Cabecera de caja con soporte para tamaño extendido (`size == 1`) y hasta-el-final (`size == 0`).
pub fn read_box_header<R: Read>(reader: &mut R) -> Option<BoxHeader> {
    let mut buffer = [0_u8; 8];
    reader.read_exact(&mut buffer).ok()?;
    let size = u64::from(u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]));
    let mut kind = [0_u8; 4];
    kind.copy_from_slice(&buffer[4..8]);

    let payload_size = match size {
        0 => None,
        1 => {
            let mut large = [0_u8; 8];
            reader.read_exact(&mut large).ok()?;
            Some(u64::from_be_bytes(large).checked_sub(16)?)
        }
        _ => Some(size.checked_sub(8)?),
    };
    Some(BoxHeader { kind, payload_size })
}

/// Lee la carga de una caja hasta `limit` bytes y salta el resto.
pub fn read_box_payload<R: Read + Seek>(
    reader: &mut R,
    header: &BoxHeader,
    limit: u64,
) -> io::Result<Vec<u8>> {
    let size = header.payload_size.unwrap_or(limit);
    let payload = read_up_to(reader, size.min(limit))?;
    if size > payload.len() as u64 && header.payload_size.is_some() {
        let skip = i64::try_from(size - payload.len() as u64).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, "box size out of range")
        })?;
        reader.seek(SeekFrom::Current(skip))?;
    }
    Ok(payload)
}

/// Itera las cajas hijas contenidas en un búfer ya leído.
pub fn child_boxes(data: &[u8]) -> Vec<(BoxHeader, &[u8])> {
    let mut cursor = Cursor::new(data);
    let mut boxes = Vec::new();
    while let Some(header) = read_box_header(&mut cursor) {
        let start = cursor.position() as usize;
        let end = match header.payload_size {
            Some(size) => start
                .saturating_add(usize::try_from(size).unwrap_or(usize::MAX))
                .min(data.len()),
            None => data.len(),
        };
        boxes.push((header, &data[start..end]));
        if end >= data.len() {
            break;
        }
        cursor.set_position(end as u64);
    }
    boxes
}

// === Elementos EBML ===

fn read_vint(cursor: &mut Cursor<&[u8]>, keep_marker: bool) -> Option<(u64, usize)> {
    let mut first = [0_u8; 1];
    cursor.read_exact(&mut first).ok()?;
    let length = first[0].leading_zeros() as usize + 1;
    if length > 8 {
        return None;
    }
    let marker = 0x80_u8 >> (length - 1);
    let lead = if keep_marker { first[0] } else { first[0] & !marker };
    let mut value = u64::from(lead);
    for _ in 1..length {
        let mut byte = [0_u8; 1];
        cursor.read_exact(&mut byte).ok()?;
        value = (value << 8) | u64::from(byte[0]);
    }
    Some((value, length))
}

/// Devuelve `(id, tamaño)`; el tamaño es `None` si es desconocido (todos los bits a uno).
pub fn read_ebml_element(cursor: &mut Cursor<&[u8]>) -> Option<(u32, Option<u64>)> {
    let (id, _) = read_vint(cursor, true)?;
    let (size, length) = read_vint(cursor, false)?;
    let unknown = (1_u64 << (7 * length)) - 1;
    let size = (size != unknown).then_some(size);
    Some((u32::try_from(id).ok()?, size))
}

/// Hijos directos de un elemento maestro EBML.
pub fn ebml_children(data: &[u8]) -> Vec<(u32, &[u8])> {
    let mut cursor = Cursor::new(data);
    let mut children = Vec::new();
    while let Some((id, size)) = read_ebml_element(&mut cursor) {
        let start = cursor.position() as usize;
        let end = match size {
            Some(size) => start
                .saturating_add(usize::try_from(size).unwrap_or(usize::MAX))
                .min(data.len()),
            None => data.len(),
        };
        children.push((id, &data[start..end]));
        if end >= data.len() {
            break;
        }
        cursor.set_position(end as u64);
    }
    children
}

pub fn ebml_uint(data: &[u8]) -> u64 {
    data.iter()
        .take(8)
        .fold(0_u64, |value, &byte| (value << 8) | u64::from(byte))
}

pub fn ebml_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_matches('\0')
        .trim()
        .to_string()
}

pub fn ebml_float(data: &[u8]) -> Option<f64> {
    match data.len() {
        4 => Some(f64::from(f32::from_be_bytes(data.try_into().ok()?))),
        8 => Some(f64::from_be_bytes(data.try_into().ok()?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synchsafe_ignores_high_bits() {
        assert_eq!(synchsafe(&[0x00, 0x00, 0x02, 0x01]), 257);
        assert_eq!(synchsafe(&[0x7F, 0x7F, 0x7F, 0x7F]), 0x0FFF_FFFF);
    }

    #[test]
    fn box_header_supports_large_and_open_sizes() {
        let mut large = Vec::new();
        large.extend_from_slice(&1_u32.to_be_bytes());
        large.extend_from_slice(b"mdat");
        large.extend_from_slice(&(16_u64 + 100).to_be_bytes());
        let header = read_box_header(&mut Cursor::new(large)).expect("header");
        assert!(header.is(b"mdat"));
        assert_eq!(header.payload_size, Some(100));

        let mut open = Vec::new();
        open.extend_from_slice(&0_u32.to_be_bytes());
        open.extend_from_slice(b"mdat");
        let header = read_box_header(&mut Cursor::new(open)).expect("header");
        assert_eq!(header.payload_size, None);
    }

    #[test]
    fn ebml_reads_ids_sizes_and_unknown_length() {
        // DocType (0x4282) de 4 bytes: "webm"
        let data = [0x42, 0x82, 0x84, b'w', b'e', b'b', b'm'];
        let children = ebml_children(&data);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0, 0x4282);
        assert_eq!(ebml_string(children[0].1), "webm");

        let unknown = [0x18, 0x53, 0x80, 0x67, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut cursor = Cursor::new(&unknown[..]);
        assert_eq!(read_ebml_element(&mut cursor), Some((0x1853_8067, None)));
    }

    #[test]
    fn ebml_scalars() {
        assert_eq!(ebml_uint(&[0x0F, 0x42, 0x40]), 1_000_000);
        assert_eq!(ebml_float(&1500.0_f64.to_be_bytes()), Some(1500.0));
        assert_eq!(ebml_float(&[0x00]), None);
    }

    #[test]
    fn box_payload_skip_beyond_i64_is_an_error() {
        let header = BoxHeader {
            kind: *b"junk",
            payload_size: Some(0xFFFF_FFFF_FFFF_FFE8),
        };
        let mut cursor = Cursor::new(vec![0_u8; 24]);
        cursor.set_position(16);

        let result = read_box_payload(&mut cursor, &header, 4096);
        assert_eq!(
            result.map_err(|error| error.kind()),
            Err(io::ErrorKind::InvalidData)
        );
        // Nunca retrocede sobre cajas ya leídas.
        assert!(cursor.position() >= 16);
    }

    #[test]
    fn child_boxes_clip_oversized_and_stop_on_undersized() {
        let mut oversized = 0xFFFF_FFFF_u32.to_be_bytes().to_vec();
        oversized.extend_from_slice(b"trak");
        oversized.extend_from_slice(&[1, 2, 3, 4]);
        let boxes = child_boxes(&oversized);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].1, &[1, 2, 3, 4]);

        let mut undersized = 3_u32.to_be_bytes().to_vec();
        undersized.extend_from_slice(b"free");
        undersized.extend_from_slice(&[0; 16]);
        assert!(child_boxes(&undersized).is_empty());

        let mut large = 1_u32.to_be_bytes().to_vec();
        large.extend_from_slice(b"mdat");
        large.extend_from_slice(&u64::MAX.to_be_bytes());
        large.extend_from_slice(&[9, 9]);
        let boxes = child_boxes(&large);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].1, &[9, 9]);
    }

    #[test]
    fn ebml_children_clip_sizes_and_stop_on_invalid_ids() {
        // DocType que declara unos 2^35 bytes y solo trae cuatro.
        let oversized = [0x42, 0x82, 0x0F, 0xFF, 0xFF, 0xFF, 0xF0, b'w', b'e', b'b', b'm'];
        let children = ebml_children(&oversized);
        assert_eq!(children.len(), 1);
        assert_eq!(ebml_string(children[0].1), "webm");

        // Un byte 0x00 no es un VINT válido.
        assert!(ebml_children(&[0x00, 0x81, 0x01]).is_empty());
        assert!(ebml_children(&[]).is_empty());
    }
}
