//! Texto plano y CSV: conteos, vista previa, codificación y estructura tabular.

use super::source::push_bounded_list;
use crate::error::{SourceError, SourceResult};
use crate::formatting::preview;
use crate::metadata::MetadataMap;
use std::fs;
use std::path::Path;

/// Líneas usadas para adivinar el delimitador.
const DELIMITER_SAMPLE_LINES: usize = 20;

pub fn extract_text(path: &Path, preview_chars: usize) -> SourceResult {
    let bytes = fs::read(path)?;
    let analysis = analyze(&bytes);

    let mut map = MetadataMap::new();
    map.insert("num_characters", analysis.content.chars().count());
    map.insert("num_lines", analysis.content.matches('\n').count() + 1);
    map.insert("num_words", analysis.content.split_whitespace().count());
    map.insert("preview", preview(&analysis.content, preview_chars));
    map.insert("text_encoding", analysis.encoding);
    map.insert("text_line_endings", analysis.line_endings);
    if analysis.has_nulls {
        map.insert("text_has_null_bytes", true);
    }
    Ok(map)
}

pub fn extract_csv(path: &Path, delimiter_hint: Option<u8>, limit: usize) -> SourceResult {
    let bytes = fs::read(path)?;
    let content = analyze(&bytes).content;

    let delimiter = delimiter_hint.unwrap_or_else(|| {
        let sample: Vec<&str> = content.lines().take(DELIMITER_SAMPLE_LINES).collect();
        detect_delimiter(&sample)
    });

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let first = records.next().transpose().map_err(SourceError::parse)?;
    let second = records.next().transpose().map_err(SourceError::parse)?;
    let has_header = match (&first, &second) {
        (Some(first), Some(second)) => guess_header(first, second),
        _ => false,
    };

    let mut header: Vec<String> = Vec::new();
    let mut stats: Vec<ColumnStat> = Vec::new();
    let mut rows = 0_usize;
    let mut inconsistent = 0_usize;

    if let Some(first) = first {
        if has_header {
            header = first.iter().map(|field| field.trim().to_string()).collect();
        } else {
            observe(&first, &mut stats);
            rows += 1;
        }
    }
    for record in second.into_iter().map(Ok).chain(records) {
        let record = record.map_err(SourceError::parse)?;
        if !stats.is_empty() && record.len() != stats.len() {
            inconsistent += 1;
        }
        observe(&record, &mut stats);
        rows += 1;
    }

    let columns = if header.is_empty() { stats.len() } else { header.len() };

    let mut map = MetadataMap::new();
    map.insert("csv_delimiter", delimiter_name(delimiter));
    map.insert("csv_has_header", has_header);
    map.insert("csv_columns", columns);
    map.insert("csv_rows", rows);
    if inconsistent > 0 {
        map.insert("csv_inconsistent_rows", inconsistent);
    }
    if !header.is_empty() {
        push_bounded_list(&mut map, "csv_header", header.clone(), limit, "columns");
    }

    let mut types = MetadataMap::new();
    for (index, stat) in stats.iter().enumerate().take(limit) {
        let name = header
            .get(index)
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("column_{}", index + 1));
        let kind = match stat.kind {
            Some(kind) => kind.label(),
            None => "empty",
        };
        let value = if stat.nulls > 0 {
            format!("{kind} ({} empty)", stat.nulls)
        } else {
            kind.to_string()
        };
        types.insert(name, value);
    }
    if !types.is_empty() {
        map.insert("csv_column_types", types);
    }

    Ok(map)
}

struct TextAnalysis {
    content: String,
    encoding: String,
    line_endings: String,
    has_nulls: bool,
}

fn analyze(bytes: &[u8]) -> TextAnalysis {
    let (bom, bom_len) = detect_bom(bytes);
    let body = &bytes[bom_len..];

    let content = match bom {
        Some(Bom::Utf16Le) => decode_utf16(body, u16::from_le_bytes),
        Some(Bom::Utf16Be) => decode_utf16(body, u16::from_be_bytes),
        _ => String::from_utf8_lossy(body).into_owned(),
    };

    let encoding = match bom {
        Some(bom) => bom.label().to_string(),
        None if std::str::from_utf8(body).is_ok() => "UTF-8".to_string(),
        None => "unknown (decoded lossily as UTF-8)".to_string(),
    };

    let mut lf = 0_usize;
    let mut crlf = 0_usize;
    let mut cr = 0_usize;
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                crlf += 1;
            }
            '\r' => cr += 1,
            '\n' => lf += 1,
            _ => {}
        }
    }

    TextAnalysis {
        has_nulls: content.contains('\0'),
        content,
        encoding,
        line_endings: format!("LF:{lf}, CRLF:{crlf}, CR:{cr}"),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bom {
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
}

impl Bom {
    fn label(self) -> &'static str {
        match self {
            Bom::Utf8 => "UTF-8 (BOM)",
            Bom::Utf16Le => "UTF-16 LE",
            Bom::Utf16Be => "UTF-16 BE",
            Bom::Utf32Le => "UTF-32 LE",
            Bom::Utf32Be => "UTF-32 BE",
        }
    }
}

// UTF-32 LE comparte prefijo con UTF-16 LE, se comprueba antes.
fn detect_bom(bytes: &[u8]) -> (Option<Bom>, usize) {
    if bytes.starts_with(b"\xEF\xBB\xBF") {
        (Some(Bom::Utf8), 3)
    } else if bytes.starts_with(b"\xFF\xFE\x00\x00") {
        (Some(Bom::Utf32Le), 4)
    } else if bytes.starts_with(b"\x00\x00\xFE\xFF") {
        (Some(Bom::Utf32Be), 4)
    } else if bytes.starts_with(b"\xFF\xFE") {
        (Some(Bom::Utf16Le), 2)
    } else if bytes.starts_with(b"\xFE\xFF") {
        (Some(Bom::Utf16Be), 2)
    } else {
        (None, 0)
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn detect_delimiter(lines: &[&str]) -> u8 {
    let mut best = b',';
    let mut best_score = 0_usize;
    for delimiter in [b',', b';', b'\t', b'|'] {
        let score: usize = lines
            .iter()
            .map(|line| line.bytes().filter(|&byte| byte == delimiter).count())
            .sum();
        if score > best_score {
            best_score = score;
            best = delimiter;
        }
    }
    best
}

fn delimiter_name(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "tab".to_string(),
        other => char::from(other).to_string(),
    }
}

/// Una cabecera tiene menos campos numéricos que la primera fila de datos.
fn guess_header(first: &csv::StringRecord, second: &csv::StringRecord) -> bool {
    let numeric = |record: &csv::StringRecord| record.iter().filter(|v| is_numeric(v)).count();
    numeric(first) < numeric(second)
}

fn is_numeric(value: &str) -> bool {
    value.trim().parse::<f64>().is_ok()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ValueKind {
    Bool,
    Int,
    Float,
    Date,
    Text,
}

impl ValueKind {
    fn label(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "integer",
            ValueKind::Float => "float",
            ValueKind::Date => "date",
            ValueKind::Text => "text",
        }
    }

    fn of(value: &str) -> Self {
        let lower = value.to_lowercase();
        if lower == "true" || lower == "false" {
            ValueKind::Bool
        } else if value.parse::<i64>().is_ok() {
            ValueKind::Int
        } else if value.parse::<f64>().is_ok() {
            ValueKind::Float
        } else if looks_like_date(value) {
            ValueKind::Date
        } else {
            ValueKind::Text
        }
    }

    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (ValueKind::Int, ValueKind::Float) | (ValueKind::Float, ValueKind::Int) => {
                ValueKind::Float
            }
            _ => ValueKind::Text,
        }
    }
}

#[derive(Default)]
struct ColumnStat {
    kind: Option<ValueKind>,
    nulls: usize,
}

fn observe(record: &csv::StringRecord, stats: &mut Vec<ColumnStat>) {
    if stats.len() < record.len() {
        stats.resize_with(record.len(), ColumnStat::default);
    }
    for (stat, value) in stats.iter_mut().zip(record.iter()) {
        let value = value.trim();
        if value.is_empty() {
            stat.nulls += 1;
            continue;
        }
        let kind = ValueKind::of(value);
        stat.kind = Some(stat.kind.map_or(kind, |current| current.merge(kind)));
    }
}

fn looks_like_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && ((bytes[4] == b'-' && bytes[7] == b'-') || bytes[2] == b'/' || bytes[2] == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataValue;
    use tempfile::tempdir;

    #[test]
    fn hello_world_counts() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("hello.txt");
        fs::write(&path, "hello\nworld")?;

        let map = extract_text(&path, 200)?;
        let int = |key: &str| map.get(key).and_then(MetadataValue::as_integer);
        assert_eq!(int("num_characters"), Some(11));
        assert_eq!(int("num_lines"), Some(2));
        assert_eq!(int("num_words"), Some(2));
        assert_eq!(
            map.get("preview").and_then(MetadataValue::as_text),
            Some("hello world")
        );
        assert_eq!(
            map.get("text_encoding").and_then(MetadataValue::as_text),
            Some("UTF-8")
        );
        assert_eq!(
            map.get("text_line_endings").and_then(MetadataValue::as_text),
            Some("LF:1, CRLF:0, CR:0")
        );
        Ok(())
    }

    #[test]
    fn empty_file_has_one_line() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.txt");
        fs::write(&path, "")?;

        let map = extract_text(&path, 200)?;
        assert_eq!(map.get("num_lines").and_then(MetadataValue::as_integer), Some(1));
        assert_eq!(map.get("num_words").and_then(MetadataValue::as_integer), Some(0));
        Ok(())
    }

    #[test]
    fn utf16_with_bom_is_decoded() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("wide.txt");
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "año\r\nfin".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        fs::write(&path, bytes)?;

        let map = extract_text(&path, 200)?;
        assert_eq!(
            map.get("text_encoding").and_then(MetadataValue::as_text),
            Some("UTF-16 LE")
        );
        assert_eq!(map.get("num_words").and_then(MetadataValue::as_integer), Some(2));
        assert_eq!(
            map.get("text_line_endings").and_then(MetadataValue::as_text),
            Some("LF:0, CRLF:1, CR:0")
        );
        Ok(())
    }

    #[test]
    fn csv_with_header_and_types() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("people.csv");
        fs::write(&path, "name;age;joined\nana;31;2021-04-01\nluis;;2020-01-15\n")?;

        let map = extract_csv(&path, None, 50)?;
        assert_eq!(
            map.get("csv_delimiter").and_then(MetadataValue::as_text),
            Some(";")
        );
        assert_eq!(map.get("csv_has_header"), Some(&MetadataValue::Bool(true)));
        assert_eq!(map.get("csv_columns").and_then(MetadataValue::as_integer), Some(3));
        assert_eq!(map.get("csv_rows").and_then(MetadataValue::as_integer), Some(2));

        let types = map
            .get("csv_column_types")
            .and_then(MetadataValue::as_map)
            .ok_or("missing column types")?;
        assert_eq!(
            types.get("age").and_then(MetadataValue::as_text),
            Some("integer (1 empty)")
        );
        assert_eq!(types.get("joined").and_then(MetadataValue::as_text), Some("date"));
        Ok(())
    }

    #[test]
    fn tsv_hint_skips_detection() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("values.tsv");
        fs::write(&path, "1\t2\n3\t4\n5\n")?;

        let map = extract_csv(&path, Some(b'\t'), 50)?;
        assert_eq!(
            map.get("csv_delimiter").and_then(MetadataValue::as_text),
            Some("tab")
        );
        assert_eq!(map.get("csv_has_header"), Some(&MetadataValue::Bool(false)));
        assert_eq!(map.get("csv_rows").and_then(MetadataValue::as_integer), Some(3));
        assert_eq!(
            map.get("csv_inconsistent_rows").and_then(MetadataValue::as_integer),
            Some(1)
        );
        Ok(())
    }
}
