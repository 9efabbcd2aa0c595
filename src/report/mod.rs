//! Normalización de un mapa de metadata a un reporte de texto determinista.
//!
//! Solo la línea `Generated:` depende del reloj; el resto del reporte es función pura
//! del mapa, la ruta y el tipo MIME.

pub mod export;
pub mod writer;

use crate::metadata::{MetadataMap, MetadataValue};
use chrono::{DateTime, Local};
use std::fmt;
use std::path::Path;

pub use export::ReportFormat;
pub use writer::{derive_output_path, save, write_report};

pub const TITLE: &str = "METADATA EXTRACTION REPORT";
pub const EMPTY_MESSAGE: &str = "No metadata found or unable to extract metadata.";
const RULE_WIDTH: usize = 80;
const INDENT_STEP: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    lines: Vec<String>,
    field_count: usize,
}

impl Report {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Claves de primer nivel incluidas en el cuerpo.
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

pub fn render(map: &MetadataMap, source: &Path, mime: &str) -> Report {
    render_at(map, source, mime, Local::now())
}

pub fn render_at(
    map: &MetadataMap,
    source: &Path,
    mime: &str,
    generated: DateTime<Local>,
) -> Report {
    let rule = "=".repeat(RULE_WIDTH);
    let mut lines = vec![
        rule.clone(),
        TITLE.to_string(),
        rule.clone(),
        format!("Generated: {}", generated.format("%Y-%m-%d %H:%M:%S")),
        format!("File: {}", source.display()),
        format!("MIME Type: {mime}"),
        rule.clone(),
        String::new(),
    ];

    if map.is_empty() {
        lines.push(EMPTY_MESSAGE.to_string());
    }

    // BTreeMap: el recorrido ya es lexicográfico por clave cruda.
    for (key, value) in map {
        let label = display_key(key);
        match value {
            MetadataValue::Map(nested) => {
                lines.push(format!("{label}:"));
                push_nested(&mut lines, nested, INDENT_STEP);
            }
            other => lines.push(format!("{label}: {other}")),
        }
    }

    lines.push(String::new());
    lines.push(rule.clone());
    lines.push(format!("Total metadata fields: {}", map.len()));
    lines.push(rule);

    Report {
        lines,
        field_count: map.len(),
    }
}

fn push_nested(lines: &mut Vec<String>, map: &MetadataMap, indent: usize) {
    let pad = " ".repeat(indent);
    for (key, value) in map {
        match value {
            MetadataValue::Map(nested) => {
                lines.push(format!("{pad}{key}:"));
                push_nested(lines, nested, indent + INDENT_STEP);
            }
            other => lines.push(format!("{pad}{key}: {other}")),
        }
    }
}

/// `file_size_mb` → `File Size Mb`.
pub fn display_key(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
