//! Formatos de salida del reporte.

use crate::error::Result;
use crate::metadata::MetadataMap;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReportFormat::Text => "TXT",
            ReportFormat::Json => "JSON",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownFormat(pub String);

impl fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown report format `{}` (expected txt, text or json)", self.0)
    }
}

impl std::error::Error for UnknownFormat {}

impl FromStr for ReportFormat {
    type Err = UnknownFormat;

    fn from_str(input: &str) -> std::result::Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "txt" | "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            _ => Err(UnknownFormat(input.to_string())),
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    file: String,
    mime_type: &'a str,
    total_fields: usize,
    metadata: &'a MetadataMap,
}

/// Misma información que el reporte de texto; los bytes se exportan como marcador.
pub fn to_json(map: &MetadataMap, source: &Path, mime: &str) -> Result<String> {
    let report = JsonReport {
        file: source.display().to_string(),
        mime_type: mime,
        total_fields: map.len(),
        metadata: map,
    };
    let mut json = serde_json::to_string_pretty(&report)?;
    json.push('\n');
    Ok(json)
}
