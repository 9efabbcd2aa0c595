//! MetaLens: extracción de metadata de cualquier archivo a un reporte de texto.
//!
//! El flujo es `classify` → `extract` → `report::render` → `report::save`; el módulo
//! [`pipeline`] lo compone para un archivo o un directorio completo.

pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod formatting;
pub mod metadata;
pub mod pipeline;
pub mod report;

pub use classify::{Category, Classification, categorize, classify, detect_type};
pub use config::ExtractOptions;
pub use error::{Error, Result, SourceError, WriteError};
pub use extract::{Extractor, extract};
pub use metadata::{MetadataMap, MetadataValue};
pub use pipeline::{Outcome, process_directory, process_file};
pub use report::{Report, ReportFormat, derive_output_path, render, save, write_report};
