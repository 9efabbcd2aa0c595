//! Backend de documentos: la extensión decide qué fuente se aplica.

use super::source::{Source, absorb, basic_info};
use super::{office, pdf, text};
use crate::config::ExtractOptions;
use crate::metadata::MetadataMap;
use std::path::Path;

const WORD_EXTENSIONS: &[&str] = &["docx", "docm", "dotx", "dotm", "doc"];
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "text", "md", "markdown", "log", "rst", "ini", "cfg", "conf", "json", "xml", "yaml",
    "yml", "html", "htm",
];

pub fn extract(path: &Path, options: &ExtractOptions) -> MetadataMap {
    let mut map = basic_info(path);
    let extension = lowercase_extension(path);

    match extension.as_str() {
        "pdf" => absorb(
            &mut map,
            Source::Pdf,
            pdf::extract(path, options.preview_chars),
        ),
        ext if WORD_EXTENSIONS.contains(&ext) => absorb(
            &mut map,
            Source::Docx,
            office::extract(path, options.preview_chars, options.list_limit),
        ),
        "csv" | "tsv" => {
            absorb(
                &mut map,
                Source::Txt,
                text::extract_text(path, options.preview_chars),
            );
            let hint = (extension == "tsv").then_some(b'\t');
            absorb(
                &mut map,
                Source::Csv,
                text::extract_csv(path, hint, options.list_limit),
            );
        }
        ext if TEXT_EXTENSIONS.contains(&ext) => absorb(
            &mut map,
            Source::Txt,
            text::extract_text(path, options.preview_chars),
        ),
        "" => {
            map.insert("note", "No specific extractor for files without an extension");
        }
        ext => {
            map.insert("note", format!("No specific extractor for .{ext} files"));
        }
    }

    map
}

pub(crate) fn lowercase_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
