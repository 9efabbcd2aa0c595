//! PDF: páginas, diccionario Info, cifrado y vista previa de la primera página.

use crate::error::{SourceError, SourceResult};
use crate::formatting::preview;
use crate::metadata::MetadataMap;
use lopdf::{Dictionary, Document, Object};
use std::path::Path;

/// Claves del diccionario Info con nombre propio; el resto usa `pdf_<Clave>`.
const INFO_KEYS: &[(&[u8], &str)] = &[
    (b"Title", "pdf_title"),
    (b"Author", "pdf_author"),
    (b"Subject", "pdf_subject"),
    (b"Keywords", "pdf_keywords"),
    (b"Creator", "pdf_creator"),
    (b"Producer", "pdf_producer"),
    (b"CreationDate", "pdf_creation_date"),
    (b"ModDate", "pdf_modification_date"),
];

pub fn extract(path: &Path, preview_chars: usize) -> SourceResult {
    let doc = Document::load(path).map_err(SourceError::parse)?;
    let mut map = MetadataMap::new();

    let pages = doc.get_pages();
    map.insert("num_pages", pages.len());
    map.insert("pdf_version", doc.version.clone());
    map.insert("is_encrypted", doc.trailer.get(b"Encrypt").is_ok());

    if let Ok(info) = doc.trailer.get(b"Info")
        && let Some(dict) = deref_dictionary(&doc, info)
    {
        for (key, value) in dict.iter() {
            let Some(text) = object_to_string(&doc, value) else {
                continue;
            };
            map.insert(info_key(key), text);
        }
    }

    if let Some(&first) = pages.keys().next() {
        match doc.extract_text(&[first]) {
            Ok(text) => {
                map.insert("first_page_preview", preview(text.trim(), preview_chars));
            }
            Err(error) => {
                tracing::debug!(path = %path.display(), %error, "sin texto en la primera página");
            }
        }
    }

    Ok(map)
}

fn info_key(raw: &[u8]) -> String {
    INFO_KEYS
        .iter()
        .find(|(name, _)| *name == raw)
        .map(|(_, key)| (*key).to_string())
        .unwrap_or_else(|| format!("pdf_{}", String::from_utf8_lossy(raw).replace('/', "_")))
}

fn deref_dictionary<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Reference(reference) => doc.get_dictionary(*reference).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn object_to_string(doc: &Document, object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).trim().to_string()),
        Object::Integer(value) => Some(value.to_string()),
        Object::Real(value) => Some(value.to_string()),
        Object::Boolean(value) => Some(value.to_string()),
        Object::Reference(reference) => doc
            .get_object(*reference)
            .ok()
            .and_then(|inner| object_to_string(doc, inner)),
        _ => None,
    }
}

/// Cadenas de texto PDF: UTF-16BE con BOM o bytes tratados como UTF-8 con pérdida.
fn decode_pdf_string(bytes: &[u8]) -> String {
    let text = match bytes.strip_prefix(b"\xFE\xFF") {
        Some(wide) => {
            let units = wide
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
            char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
        None => String::from_utf8_lossy(bytes).into_owned(),
    };
    text.trim_matches(char::from(0)).trim().to_string()
}
