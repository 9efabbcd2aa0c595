//! Registro de capacidades: qué herramientas externas existen en este equipo.
//!
//! Se sondea una sola vez al construir el extractor; las pruebas inyectan su propio
//! [`ToolLocator`] para no depender del sistema anfitrión.

use super::source::Source;
use crate::classify::Category;
use std::env;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const FFPROBE: &str = "ffprobe";

pub trait ToolLocator: Send + Sync {
    fn locate(&self, tool: &str) -> Option<PathBuf>;
}

/// Busca en `PATH` y luego en las rutas de instalación habituales.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemLocator;

impl ToolLocator for SystemLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        if let Ok(path) = which::which(tool) {
            return Some(path);
        }

        let executable = format!("{tool}{}", env::consts::EXE_SUFFIX);
        if let Some(found) = well_known_dirs()
            .into_iter()
            .map(|dir| dir.join(&executable))
            .find(|candidate| candidate.is_file())
        {
            return Some(found);
        }

        winget_package(&executable)
    }
}

/// Devuelve siempre la misma respuesta; útil en pruebas y con rutas explícitas.
#[derive(Clone, Debug, Default)]
pub struct FixedLocator(pub Option<PathBuf>);

impl ToolLocator for FixedLocator {
    fn locate(&self, _tool: &str) -> Option<PathBuf> {
        self.0.clone()
    }
}

fn well_known_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = if cfg!(windows) {
        vec![
            PathBuf::from(r"C:\ffmpeg\bin"),
            PathBuf::from(r"C:\Program Files\ffmpeg\bin"),
            PathBuf::from(r"C:\Program Files (x86)\ffmpeg\bin"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/bin"),
            PathBuf::from("/usr/local/bin"),
            PathBuf::from("/opt/homebrew/bin"),
            PathBuf::from("/opt/local/bin"),
        ]
    };

    if let Some(home) = env::var_os("USERPROFILE").or_else(|| env::var_os("HOME")) {
        dirs.push(Path::new(&home).join("scoop").join("shims"));
    }

    dirs
}

fn winget_package(executable: &str) -> Option<PathBuf> {
    let local = env::var_os("LOCALAPPDATA")?;
    let packages = Path::new(&local)
        .join("Microsoft")
        .join("WinGet")
        .join("Packages");
    if !packages.is_dir() {
        return None;
    }

    WalkDir::new(packages)
        .max_depth(5)
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name() == executable)
        .map(|entry| entry.into_path())
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub ffprobe: Option<PathBuf>,
}

/// Disponibilidad de una fuente para una categoría.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStatus {
    pub source: Source,
    pub available: bool,
    pub detail: Option<String>,
}

impl SourceStatus {
    fn builtin(source: Source) -> Self {
        Self {
            source,
            available: true,
            detail: None,
        }
    }
}

impl Capabilities {
    pub fn probe(locator: &dyn ToolLocator) -> Self {
        let ffprobe = locator.locate(FFPROBE);
        match &ffprobe {
            Some(path) => tracing::debug!(path = %path.display(), "ffprobe disponible"),
            None => tracing::debug!("ffprobe no encontrado"),
        }
        Self { ffprobe }
    }

    /// Sondea el sistema salvo que haya una ruta explícita.
    pub fn detect(explicit: Option<&Path>) -> Self {
        match explicit {
            Some(path) => Self::probe(&FixedLocator(Some(path.to_path_buf()))),
            None => Self::probe(&SystemLocator),
        }
    }

    /// Fuentes que consulta cada categoría, en orden de ejecución.
    pub fn sources(&self, category: Category) -> Vec<SourceStatus> {
        let builtin = |sources: &[Source]| {
            sources
                .iter()
                .copied()
                .map(SourceStatus::builtin)
                .collect::<Vec<_>>()
        };

        match category {
            Category::Image => builtin(&[Source::File, Source::Image, Source::Exif, Source::Png]),
            Category::Audio => builtin(&[Source::File, Source::Audio, Source::Native]),
            Category::Video => {
                let mut statuses = builtin(&[Source::File]);
                statuses.push(SourceStatus {
                    source: Source::Ffprobe,
                    available: self.ffprobe.is_some(),
                    detail: self.ffprobe.as_ref().map(|path| path.display().to_string()),
                });
                statuses.push(SourceStatus::builtin(Source::Container));
                statuses
            }
            Category::Document => builtin(&[
                Source::File,
                Source::Pdf,
                Source::Docx,
                Source::Txt,
                Source::Csv,
            ]),
            Category::Archive => builtin(&[
                Source::File,
                Source::Zip,
                Source::Tar,
                Source::Gzip,
                Source::SevenZip,
            ]),
            Category::Other => builtin(&[
                Source::File,
                Source::Stat,
                Source::Hash,
                Source::Header,
                Source::Infer,
            ]),
        }
    }
}
