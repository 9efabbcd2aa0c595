//! Backend de archivos comprimidos: listado de miembros y cabeceras de formato.

use super::binary::{find_bytes, le_u32, le_u64, read_up_to};
use super::source::{Source, absorb, basic_info, push_bounded_list};
use crate::config::ExtractOptions;
use crate::error::{SourceError, SourceResult};
use crate::formatting::{format_system_time, lossy_text, round2, size_in_mb};
use crate::metadata::MetadataMap;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use sevenz_rust::{Password, SevenZReader};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use xz2::read::XzDecoder;

const ZIP_EXTENSIONS: &[&str] = &["zip", "jar", "war", "apk", "epub", "xpi", "whl", "nupkg"];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const GZIP_MAGIC: &[u8] = b"\x1F\x8B";
const SEVENZ_MAGIC: &[u8] = b"7z\xBC\xAF\x27\x1C";
const USTAR_OFFSET: usize = 257;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TarCompression {
    Plain,
    Gzip,
    Bzip2,
    Xz,
}

impl TarCompression {
    fn label(self) -> Option<&'static str> {
        match self {
            TarCompression::Plain => None,
            TarCompression::Gzip => Some("gzip"),
            TarCompression::Bzip2 => Some("bzip2"),
            TarCompression::Xz => Some("xz"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    Tar(TarCompression),
    /// Tar con una compresión que no se descomprime aquí.
    TarOther(&'static str),
    Gzip,
    SevenZip,
}

pub fn extract(path: &Path, options: &ExtractOptions) -> MetadataMap {
    let mut map = basic_info(path);
    let limit = options.list_limit;

    match archive_kind(path) {
        Some(ArchiveKind::Zip) => absorb(&mut map, Source::Zip, zip_listing(path, limit)),
        Some(ArchiveKind::Tar(TarCompression::Gzip)) => {
            absorb(&mut map, Source::Gzip, gzip_header(path));
            absorb(&mut map, Source::Tar, tar_listing(path, TarCompression::Gzip, limit));
        }
        Some(ArchiveKind::Tar(compression)) => {
            absorb(&mut map, Source::Tar, tar_listing(path, compression, limit))
        }
        Some(ArchiveKind::TarOther(compression)) => absorb(
            &mut map,
            Source::Tar,
            Err(SourceError::Unsupported(format!(
                "{compression} compressed tar archives are not listed"
            ))),
        ),
        Some(ArchiveKind::Gzip) => {
            map.insert("compression_type", "GZIP");
            absorb(&mut map, Source::Gzip, gzip_header(path));
        }
        Some(ArchiveKind::SevenZip) => {
            map.insert("compression_type", "7Z");
            absorb(&mut map, Source::SevenZip, sevenz_header(path));
            absorb(&mut map, Source::SevenZip, sevenz_listing(path, limit));
        }
        None => {
            let extension = super::document::lowercase_extension(path);
            let note = if extension.is_empty() {
                "No specific extractor for archives without an extension".to_string()
            } else {
                format!("No specific extractor for .{extension} archives")
            };
            map.insert("note", note);
        }
    }

    map
}

/// El nombre decide primero; sin extensión conocida se miran los bytes mágicos.
fn archive_kind(path: &Path) -> Option<ArchiveKind> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    for (suffixes, compression) in [
        (&[".tar.gz", ".tgz"][..], TarCompression::Gzip),
        (&[".tar.bz2", ".tbz2", ".tbz"][..], TarCompression::Bzip2),
        (&[".tar.xz", ".txz"][..], TarCompression::Xz),
    ] {
        if suffixes.iter().any(|suffix| name.ends_with(suffix)) {
            return Some(ArchiveKind::Tar(compression));
        }
    }
    if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
        return Some(ArchiveKind::TarOther("zstd"));
    }

    let extension = super::document::lowercase_extension(path);
    match extension.as_str() {
        "tar" => return Some(ArchiveKind::Tar(TarCompression::Plain)),
        "gz" => return Some(ArchiveKind::Gzip),
        "7z" => return Some(ArchiveKind::SevenZip),
        ext if ZIP_EXTENSIONS.contains(&ext) => return Some(ArchiveKind::Zip),
        _ => {}
    }

    let head = File::open(path)
        .and_then(|mut file| read_up_to(&mut file, 512))
        .ok()?;
    if head.starts_with(ZIP_MAGIC) {
        Some(ArchiveKind::Zip)
    } else if head.starts_with(SEVENZ_MAGIC) {
        Some(ArchiveKind::SevenZip)
    } else if head.starts_with(GZIP_MAGIC) {
        Some(ArchiveKind::Gzip)
    } else if head.get(USTAR_OFFSET..USTAR_OFFSET + 5) == Some(&b"ustar"[..]) {
        Some(ArchiveKind::Tar(TarCompression::Plain))
    } else {
        None
    }
}

fn zip_listing(path: &Path, limit: usize) -> SourceResult {
    let archive_size = fs::metadata(path)?.len();
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(SourceError::parse)?;

    let mut names = Vec::with_capacity(archive.len());
    let mut total_uncompressed = 0_u64;
    let mut encrypted = false;
    for index in 0..archive.len() {
        // Sin descifrar: los miembros protegidos también se listan.
        let entry = archive.by_index_raw(index).map_err(SourceError::parse)?;
        total_uncompressed = total_uncompressed.saturating_add(entry.size());
        encrypted |= entry.encrypted();
        names.push(entry.name().to_string());
    }

    let mut map = MetadataMap::new();
    map.insert("num_files", names.len());
    map.insert("compression_type", "ZIP");
    map.insert("total_uncompressed_size_mb", size_in_mb(total_uncompressed));
    if total_uncompressed > 0 {
        let ratio = (1.0 - archive_size as f64 / total_uncompressed as f64) * 100.0;
        map.insert("compression_ratio_percent", round2(ratio));
    }
    map.insert("is_encrypted", encrypted);
    let comment = lossy_text(archive.comment());
    if !comment.is_empty() {
        map.insert("zip_comment", comment);
    }
    push_bounded_list(&mut map, "file_list", names, limit, "files");
    Ok(map)
}

fn tar_listing(path: &Path, compression: TarCompression, limit: usize) -> SourceResult {
    let file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = match compression {
        TarCompression::Plain => Box::new(file),
        TarCompression::Gzip => Box::new(GzDecoder::new(file)),
        TarCompression::Bzip2 => Box::new(BzDecoder::new(file)),
        TarCompression::Xz => Box::new(XzDecoder::new(file)),
    };
    let mut archive = tar::Archive::new(reader);

    let mut names = Vec::new();
    let mut total_uncompressed = 0_u64;
    for entry in archive.entries()? {
        let entry = entry?;
        total_uncompressed = total_uncompressed.saturating_add(entry.header().size()?);
        names.push(entry.path()?.to_string_lossy().into_owned());
    }

    let mut map = MetadataMap::new();
    map.insert("num_files", names.len());
    map.insert("compression_type", "TAR");
    map.insert_some("tar_compression", compression.label());
    map.insert("total_uncompressed_size_mb", size_in_mb(total_uncompressed));
    push_bounded_list(&mut map, "file_list", names, limit, "files");
    Ok(map)
}

fn gzip_os_name(code: u8) -> &'static str {
    match code {
        0 => "FAT filesystem",
        1 => "Amiga",
        2 => "VMS",
        3 => "Unix",
        4 => "VM/CMS",
        5 => "Atari TOS",
        6 => "HPFS filesystem",
        7 => "Macintosh",
        8 => "Z-System",
        9 => "CP/M",
        10 => "TOPS-20",
        11 => "NTFS filesystem",
        12 => "QDOS",
        13 => "Acorn RISCOS",
        _ => "unknown",
    }
}

/// Cabecera gzip: nombre original, fecha, sistema de origen y tamaño declarado.
fn gzip_header(path: &Path) -> SourceResult {
    const FEXTRA: u8 = 0x04;
    const FNAME: u8 = 0x08;
    const FCOMMENT: u8 = 0x10;

    let mut file = File::open(path)?;
    let head = read_up_to(&mut file, 64 * 1024)?;
    if !head.starts_with(GZIP_MAGIC) || head.len() < 10 {
        return Err(SourceError::Parse("not a gzip stream".to_string()));
    }

    let flags = head[3];
    let mut map = MetadataMap::new();
    if let Some(mtime) = le_u32(&head, 4).filter(|&mtime| mtime > 0) {
        let time = UNIX_EPOCH + Duration::from_secs(u64::from(mtime));
        map.insert("gzip_modified", format_system_time(time));
    }
    map.insert("gzip_os", gzip_os_name(head[9]));
    let level = match head[8] {
        2 => Some("maximum"),
        4 => Some("fastest"),
        _ => None,
    };
    map.insert_some("gzip_compression_level", level);

    let mut at = 10_usize;
    if flags & FEXTRA != 0 {
        let extra = head
            .get(at..at + 2)
            .map(|len| usize::from(u16::from_le_bytes([len[0], len[1]])))
            .ok_or_else(|| SourceError::Parse("truncated gzip header".to_string()))?;
        at += 2 + extra;
    }
    if flags & FNAME != 0 {
        let (name, next) = zero_terminated(&head, at)?;
        map.insert("gzip_original_name", name);
        at = next;
    }
    if flags & FCOMMENT != 0 {
        let (comment, _) = zero_terminated(&head, at)?;
        map.insert("gzip_comment", comment);
    }

    // ISIZE: tamaño original módulo 2^32 en los últimos cuatro bytes.
    let size = fs::metadata(path)?.len();
    if size >= 18 {
        file.seek(SeekFrom::End(-4))?;
        let mut trailer = [0_u8; 4];
        file.read_exact(&mut trailer)?;
        map.insert("gzip_uncompressed_size_bytes", u32::from_le_bytes(trailer));
    }

    Ok(map)
}

fn zero_terminated(data: &[u8], start: usize) -> SourceResult<(String, usize)> {
    let rest = data
        .get(start..)
        .ok_or_else(|| SourceError::Parse("truncated gzip header".to_string()))?;
    let end = find_bytes(rest, b"\0")
        .ok_or_else(|| SourceError::Parse("unterminated gzip header field".to_string()))?;
    // Los campos de texto gzip son ISO-8859-1.
    let text: String = rest[..end].iter().map(|&byte| char::from(byte)).collect();
    Ok((text, start + end + 1))
}

/// Cabecera de firma 7z: versión y ubicación del encabezado final.
fn sevenz_header(path: &Path) -> SourceResult {
    let mut file = File::open(path)?;
    let head = read_up_to(&mut file, 32)?;
    if !head.starts_with(SEVENZ_MAGIC) || head.len() < 32 {
        return Err(SourceError::Parse("not a 7z archive".to_string()));
    }

    let mut map = MetadataMap::new();
    map.insert("sevenz_version", format!("{}.{}", head[6], head[7]));
    map.insert_some("sevenz_next_header_offset", le_u64(&head, 12));
    map.insert_some("sevenz_next_header_size", le_u64(&head, 20));
    Ok(map)
}

/// Miembros de un 7z leídos del encabezado final; los datos no se descomprimen.
fn sevenz_listing(path: &Path, limit: usize) -> SourceResult {
    let reader = SevenZReader::open(path, Password::empty()).map_err(SourceError::parse)?;
    let entries = &reader.archive().files;

    let mut names = Vec::with_capacity(entries.len());
    let mut total_uncompressed = 0_u64;
    for entry in entries {
        if !entry.is_directory() {
            total_uncompressed = total_uncompressed.saturating_add(entry.size());
        }
        names.push(entry.name().to_string());
    }

    let mut map = MetadataMap::new();
    map.insert("num_files", names.len());
    map.insert("total_uncompressed_size_mb", size_in_mb(total_uncompressed));
    push_bounded_list(&mut map, "file_list", names, limit, "files");
    Ok(map)
}
