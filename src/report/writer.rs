//! Persistencia del reporte junto al archivo analizado.

use crate::error::WriteError;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const OUTPUT_SUFFIX: &str = "_metadata";

/// `fotos/viaje.jpg` → `fotos/viaje_metadata.txt`.
pub fn derive_output_path(input: &Path) -> PathBuf {
    derive_output_path_with(input, "txt")
}

pub fn derive_output_path_with(input: &Path, extension: &str) -> PathBuf {
    let mut name: OsString = input
        .file_stem()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("report"));
    name.push(OUTPUT_SUFFIX);
    name.push(".");
    name.push(extension);
    input.with_file_name(name)
}

/// Sustituye el destino completo: escribe en un temporal hermano y lo renombra encima.
pub fn write_report(text: &str, path: &Path) -> Result<(), WriteError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|source| WriteError::CreateDir {
        path: parent.clone(),
        source,
    })?;

    let write_error = |source| WriteError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut temp = NamedTempFile::new_in(&parent).map_err(write_error)?;
    temp.write_all(text.as_bytes()).map_err(write_error)?;
    temp.flush().map_err(write_error)?;

    temp.persist(path).map_err(|error| WriteError::Rename {
        path: path.to_path_buf(),
        source: error.error,
    })?;
    tracing::debug!(path = %path.display(), bytes = text.len(), "reporte escrito");
    Ok(())
}

/// Variante de frontera: registra el fallo y devuelve `false`.
pub fn save(text: &str, path: &Path) -> bool {
    match write_report(text, path) {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "no se pudo guardar el reporte");
            false
        }
    }
}
