use chrono::{DateTime, Local};
use std::time::SystemTime;

const BYTES_PER_KB: f64 = 1024.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn format_optional_time(time: Option<SystemTime>) -> String {
    match time {
        Some(value) => format_system_time(value),
        None => "N/A".to_string(),
    }
}

pub fn format_system_time(time: SystemTime) -> String {
    let datetime: DateTime<Local> = time.into();
    datetime.format("%Y-%m-%d %H:%M:%S %Z").to_string()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn size_in_kb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_KB)
}

pub fn size_in_mb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_MB)
}

/// Recorta a `limit` caracteres y convierte los saltos de línea en espacios.
pub fn preview(text: &str, limit: usize) -> String {
    text.chars()
        .take(limit)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

/// Decodifica bytes de origen incierto sin fallar nunca.
pub fn lossy_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(char::from(0))
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_to_exact_char_count() {
        let text = "línea\n".repeat(100);
        let result = preview(&text, 200);
        assert_eq!(result.chars().count(), 200);
        assert!(!result.contains('\n'));
    }

    #[test]
    fn preview_keeps_short_text() {
        assert_eq!(preview("hello\nworld", 200), "hello world");
    }

    #[test]
    fn sizes_round_to_two_decimals() {
        assert_eq!(size_in_mb(1_572_864), 1.5);
        assert_eq!(size_in_mb(10), 0.0);
        assert_eq!(size_in_mb(5_000_000), 4.77);
        assert_eq!(size_in_kb(1536), 1.5);
    }
}
