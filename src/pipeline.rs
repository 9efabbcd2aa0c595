//! Flujo completo para un archivo: validar, clasificar, extraer, normalizar y escribir.

use crate::classify::{Category, Classification};
use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::report::{self, ReportFormat, export, writer};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Resultado de procesar un archivo con éxito.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub category: Category,
    pub mime: String,
    pub field_count: usize,
    /// Contenido exacto que se escribió.
    pub text: String,
}

/// Comprueba la entrada antes de extraer nada.
pub fn validate_input(input: &Path) -> Result<()> {
    let metadata = match fs::metadata(input) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::InputNotFound(input.to_path_buf()));
        }
        Err(source) => {
            return Err(Error::Input {
                path: input.to_path_buf(),
                source,
            });
        }
    };
    if !metadata.is_file() {
        return Err(Error::NotAFile(input.to_path_buf()));
    }
    Ok(())
}

pub fn process_file(
    input: &Path,
    output: Option<&Path>,
    extractor: &Extractor,
    format: ReportFormat,
) -> Result<Outcome> {
    validate_input(input)?;

    let Classification { mime, category } = Classification::of(input);
    tracing::debug!(path = %input.display(), %mime, %category, "archivo clasificado");

    let map = extractor.extract(input, category);
    let field_count = map.len();
    let text = match format {
        ReportFormat::Text => report::render(&map, input, &mime).to_text(),
        ReportFormat::Json => export::to_json(&map, input, &mime)?,
    };

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| writer::derive_output_path_with(input, format.extension()));
    writer::write_report(&text, &output)?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        fields = field_count,
        "reporte generado"
    );

    Ok(Outcome {
        input: input.to_path_buf(),
        output,
        category,
        mime,
        field_count,
        text,
    })
}

/// Procesa cada archivo del directorio como una unidad independiente.
///
/// Los reportes se escriben junto a cada archivo; los reportes generados en una
/// pasada anterior se omiten para no analizarlos a su vez.
pub fn process_directory(
    dir: &Path,
    recursive: bool,
    extractor: &Extractor,
    format: ReportFormat,
) -> Result<Vec<(PathBuf, Result<Outcome>)>> {
    let metadata = fs::metadata(dir).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => Error::InputNotFound(dir.to_path_buf()),
        _ => Error::Input {
            path: dir.to_path_buf(),
            source,
        },
    })?;
    if !metadata.is_dir() {
        return Err(Error::NotAFile(dir.to_path_buf()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(%error, "entrada omitida");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            let generated = is_generated_report(path);
            if generated {
                tracing::info!(path = %path.display(), "omitido: el nombre coincide con un reporte generado");
            }
            !generated
        })
        .collect();

    Ok(files
        .into_iter()
        .map(|path| {
            let result = process_file(&path, None, extractor, format);
            if let Err(error) = &result {
                tracing::warn!(path = %path.display(), %error, "archivo no procesado");
            }
            (path, result)
        })
        .collect())
}

fn is_generated_report(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().ends_with(writer::OUTPUT_SUFFIX))
        .unwrap_or(false)
}
