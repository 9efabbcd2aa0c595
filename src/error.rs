//! Errores visibles para quien invoca la biblioteca.
//!
//! Solo los problemas de entrada y de escritura llegan al llamador; cualquier fallo de
//! una fuente de extracción se absorbe como clave de diagnóstico en el mapa.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("the input file `{0}` does not exist")]
    InputNotFound(PathBuf),

    #[error("`{0}` is not a regular file")]
    NotAFile(PathBuf),

    #[error("could not inspect `{path}`: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("could not serialize the report: {0}")]
    Export(#[from] serde_json::Error),
}

/// Fallos al persistir el reporte.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("could not create directory `{path}`: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not write `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not replace `{path}`: {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Fallo de una única fuente de extracción.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("{0} not found (install FFmpeg for detailed media metadata)")]
    ToolMissing(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    ToolFailed(String),
}

impl SourceError {
    pub fn parse(error: impl std::fmt::Display) -> Self {
        Self::Parse(error.to_string())
    }

    /// Los resultados "no disponible" se reportan como nota, no como error.
    pub fn is_note(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::ToolMissing(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
pub type SourceResult<T = crate::metadata::MetadataMap> = std::result::Result<T, SourceError>;
