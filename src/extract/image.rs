//! Backend de imágenes: cabecera del decodificador, EXIF y fragmentos de texto PNG.

use super::source::{Source, absorb, basic_info, truncation_note};
use crate::config::ExtractOptions;
use crate::error::{SourceError, SourceResult};
use crate::metadata::MetadataMap;
use image::{ImageDecoder, ImageReader};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

pub fn extract(path: &Path, options: &ExtractOptions) -> MetadataMap {
    let mut map = basic_info(path);
    absorb(&mut map, Source::Image, decoder_header(path));
    absorb(&mut map, Source::Exif, exif_fields(path, options.list_limit));
    if has_png_signature(path) {
        absorb(&mut map, Source::Png, png_text(path));
    }
    map
}

/// Formato, dimensiones y tipo de color sin decodificar los píxeles.
fn decoder_header(path: &Path) -> SourceResult {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| SourceError::Unsupported("unrecognized image format".to_string()))?;
    let decoder = reader.into_decoder().map_err(SourceError::parse)?;
    let (width, height) = decoder.dimensions();
    let color = decoder.color_type();

    let mut map = MetadataMap::new();
    map.insert("image_format", format!("{format:?}").to_uppercase());
    map.insert("image_width", width);
    map.insert("image_height", height);
    map.insert("image_size", format!("{width}x{height}"));
    map.insert("image_color_type", format!("{color:?}"));
    map.insert("image_bits_per_pixel", color.bits_per_pixel());
    Ok(map)
}

/// Campos EXIF del IFD primario; los de GPS se agrupan en `gps_info`.
fn exif_fields(path: &Path, limit: usize) -> SourceResult {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) | Err(exif::Error::BlankValue(_)) => {
            return Ok(MetadataMap::new());
        }
        Err(exif::Error::Io(error)) => return Err(error.into()),
        Err(exif::Error::NotSupported(reason)) => {
            return Err(SourceError::Unsupported(reason.to_string()));
        }
        Err(other) => return Err(SourceError::parse(other)),
    };

    let mut map = MetadataMap::new();
    let mut gps = MetadataMap::new();
    let mut total = 0;

    for field in exif.fields().filter(|field| field.ifd_num == exif::In::PRIMARY) {
        let value = field.display_value().with_unit(&exif).to_string();
        if field.tag.context() == exif::Context::Gps {
            gps.insert(field.tag.to_string(), value);
            continue;
        }

        total += 1;
        if total <= limit {
            map.insert(format!("exif_{}", field.tag), value);
        }
    }

    if !gps.is_empty() {
        map.insert("gps_info", gps);
    }
    if let Some(note) = truncation_note(total, limit, "fields") {
        map.insert("exif_note", note);
    }
    Ok(map)
}

fn has_png_signature(path: &Path) -> bool {
    let mut signature = [0_u8; 8];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut signature))
        .map(|_| signature == PNG_SIGNATURE)
        .unwrap_or(false)
}

/// Fragmentos tEXt, zTXt e iTXt, más la densidad declarada.
fn png_text(path: &Path) -> SourceResult {
    let file = File::open(path)?;
    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_ignore_text_chunk(false);
    let reader = decoder.read_info().map_err(SourceError::parse)?;
    let info = reader.info();

    let mut map = MetadataMap::new();
    for chunk in &info.uncompressed_latin1_text {
        map.insert_text(format!("info_{}", chunk.keyword), &chunk.text);
    }
    for chunk in &info.compressed_latin1_text {
        if let Ok(text) = chunk.get_text() {
            map.insert_text(format!("info_{}", chunk.keyword), text);
        }
    }
    for chunk in &info.utf8_text {
        if let Ok(text) = chunk.get_text() {
            map.insert_text(format!("info_{}", chunk.keyword), text);
        }
    }

    if let Some(dims) = info.pixel_dims
        && dims.unit == png::Unit::Meter
    {
        let dpi = |ppu: u32| (f64::from(ppu) * 0.0254).round() as u32;
        map.insert("info_dpi", format!("{}x{}", dpi(dims.xppu), dpi(dims.yppu)));
    }
    if let Some(gamma) = info.source_gamma {
        map.insert("info_gamma", f64::from(gamma.into_value()));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataValue;
    use std::fs;
    use std::io::BufWriter;
    use tempfile::tempdir;

    /// JPEG mínimo con un segmento APP1 que solo declara la orientación.
    fn jpeg_with_orientation() -> Vec<u8> {
        let tiff: [u8; 26] = [
            b'I', b'I', 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, // cabecera
            0x01, 0x00, // una entrada
            0x12, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, // sin IFD siguiente
        ];
        let length = (2 + 6 + tiff.len()) as u16;
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE1];
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend_from_slice(b"Exif\0\0");
        bytes.extend_from_slice(&tiff);
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        bytes
    }

    #[test]
    fn reads_decoder_header_for_png() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("pixel.png");
        image::RgbImage::new(4, 3).save(&path)?;

        let map = extract(&path, &ExtractOptions::default());
        let text = |key: &str| map.get(key).and_then(MetadataValue::as_text);
        assert_eq!(text("image_format"), Some("PNG"));
        assert_eq!(text("image_size"), Some("4x3"));
        assert_eq!(text("image_color_type"), Some("Rgb8"));
        assert_eq!(
            map.get("image_width").and_then(MetadataValue::as_integer),
            Some(4)
        );
        assert!(!map.contains_key("exif_error"));
        Ok(())
    }

    #[test]
    fn png_text_chunks_become_info_keys() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("described.png");
        let writer = BufWriter::new(File::create(&path)?);
        let mut encoder = png::Encoder::new(writer, 2, 2);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.add_text_chunk("Author".to_string(), "Ada".to_string())?;
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&[0_u8; 12])?;
        writer.finish()?;

        let map = extract(&path, &ExtractOptions::default());
        assert_eq!(
            map.get("info_Author").and_then(MetadataValue::as_text),
            Some("Ada")
        );
        Ok(())
    }

    #[test]
    fn exif_fields_are_prefixed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("photo.jpg");
        fs::write(&path, jpeg_with_orientation())?;

        let map = exif_fields(&path, 50)?;
        assert!(map.contains_key("exif_Orientation"));
        assert!(!map.contains_key("gps_info"));
        Ok(())
    }

    #[test]
    fn corrupt_image_reports_error_but_keeps_basics() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.png");
        fs::write(&path, b"\x89PNG\r\n\x1a\ngarbage")?;

        let map = extract(&path, &ExtractOptions::default());
        assert!(map.contains_key("file_size_bytes"));
        assert!(map.contains_key("image_error"));
        assert!(map.contains_key("png_error"));
        Ok(())
    }
}
