//! Detección de tipos MIME y clasificación en categorías de extracción.

mod extension;

pub use extension::mime_from_extension;

use infer::Infer;
use serde::Serialize;
use std::fmt;
use std::path::Path;

pub const UNKNOWN_MIME: &str = "unknown/unknown";
pub const OCTET_STREAM: &str = "application/octet-stream";

const DOCUMENT_TOKENS: [&str; 5] = ["pdf", "word", "document", "text", "officedocument"];
const ARCHIVE_TOKENS: [&str; 6] = ["zip", "rar", "7z", "tar", "gzip", "compress"];

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Image,
    Audio,
    Video,
    Document,
    Archive,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Image,
        Category::Audio,
        Category::Video,
        Category::Document,
        Category::Archive,
        Category::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Image => "image",
            Category::Audio => "audio",
            Category::Video => "video",
            Category::Document => "document",
            Category::Archive => "archive",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Resultado combinado de detección y clasificación de un archivo.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Classification {
    pub mime: String,
    pub category: Category,
}

impl Classification {
    pub fn of(path: &Path) -> Self {
        let mime = detect_type(path);
        let category = categorize(&mime);
        Self { mime, category }
    }
}

/// Detecta el tipo MIME: primero por contenido, luego por extensión.
///
/// Nunca falla; sin información suficiente devuelve `application/octet-stream`, y
/// `unknown/unknown` cuando la ruta no existe.
pub fn detect_type(path: &Path) -> String {
    if !path.exists() {
        return UNKNOWN_MIME.to_string();
    }

    if let Some(mime) = sniff_type(path) {
        return mime;
    }

    if let Some(mime) = mime_from_extension(path) {
        return mime.to_string();
    }

    OCTET_STREAM.to_string()
}

/// Intenta detectar el tipo MIME del archivo a partir de su contenido.
pub fn sniff_type(path: &Path) -> Option<String> {
    let infer = Infer::new();
    match infer.get_from_path(path) {
        Ok(kind) => kind.map(|kind| kind.mime_type().to_string()),
        Err(error) => {
            tracing::debug!(path = %path.display(), %error, "no se pudo inspeccionar el contenido");
            None
        }
    }
}

pub fn categorize(mime: &str) -> Category {
    let mime = mime.to_ascii_lowercase();

    if mime.starts_with("image/") {
        Category::Image
    } else if mime.starts_with("audio/") {
        Category::Audio
    } else if mime.starts_with("video/") {
        Category::Video
    } else if DOCUMENT_TOKENS.iter().any(|token| mime.contains(token)) {
        Category::Document
    } else if ARCHIVE_TOKENS.iter().any(|token| mime.contains(token)) {
        Category::Archive
    } else {
        Category::Other
    }
}

pub fn classify(path: &Path) -> Category {
    Classification::of(path).category
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn prefixes_win_over_tokens() {
        assert_eq!(categorize("image/pdf"), Category::Image);
        assert_eq!(categorize("audio/x-zip"), Category::Audio);
        assert_eq!(categorize("video/text"), Category::Video);
    }

    #[test]
    fn document_tokens_win_over_archive_tokens() {
        assert_eq!(categorize("application/pdf"), Category::Document);
        assert_eq!(
            categorize("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
            Category::Document
        );
        assert_eq!(categorize("text/plain"), Category::Document);
        // contiene "text" y "zip": gana documento por orden
        assert_eq!(categorize("application/x-text-zip"), Category::Document);
    }

    #[test]
    fn archive_tokens_and_fallback() {
        assert_eq!(categorize("application/zip"), Category::Archive);
        assert_eq!(categorize("application/x-7z-compressed"), Category::Archive);
        assert_eq!(categorize("application/gzip"), Category::Archive);
        assert_eq!(categorize("application/x-tar"), Category::Archive);
        assert_eq!(categorize("application/vnd.rar"), Category::Archive);
        assert_eq!(categorize(OCTET_STREAM), Category::Other);
        assert_eq!(categorize(""), Category::Other);
        assert_eq!(categorize(UNKNOWN_MIME), Category::Other);
    }

    #[test]
    fn categorize_ignores_case() {
        assert_eq!(categorize("IMAGE/PNG"), Category::Image);
        assert_eq!(categorize("Application/PDF"), Category::Document);
    }

    #[test]
    fn missing_path_is_unknown() {
        let path = Path::new("/definitely/not/here/sample.bin");
        assert_eq!(detect_type(path), UNKNOWN_MIME);
        assert_eq!(classify(path), Category::Other);
    }

    #[test]
    fn content_beats_extension() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("disguised.txt");
        fs::write(&path, b"%PDF-1.4\n%fake\n")?;
        assert_eq!(detect_type(&path), "application/pdf");
        Ok(())
    }

    #[test]
    fn extension_used_when_sniffing_fails() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let text = dir.path().join("notes.txt");
        fs::write(&text, "hello\nworld")?;
        assert_eq!(detect_type(&text), "text/plain");
        assert_eq!(classify(&text), Category::Document);

        let unknown = dir.path().join("blob.qqq");
        fs::write(&unknown, [0x01_u8, 0x02, 0x03])?;
        assert_eq!(detect_type(&unknown), OCTET_STREAM);
        Ok(())
    }
}
