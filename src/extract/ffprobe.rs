//! Invocación de `ffprobe` como subproceso con plazo máximo.

use super::source::truncation_note;
use crate::error::{SourceError, SourceResult};
use crate::metadata::MetadataMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    format_long_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    codec_long_name: Option<String>,
    width: Option<u64>,
    height: Option<u64>,
    r_frame_rate: Option<String>,
    display_aspect_ratio: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u64>,
}

/// Ejecuta `ffprobe` sobre `path` y traduce su salida JSON a claves planas.
pub fn extract(
    binary: Option<&Path>,
    path: &Path,
    timeout: Duration,
    stream_limit: usize,
) -> SourceResult {
    let binary = binary.ok_or_else(|| SourceError::ToolMissing("ffprobe".to_string()))?;
    let stdout = run(binary, path, timeout)?;
    let output: ProbeOutput = serde_json::from_slice(&stdout)
        .map_err(|error| SourceError::Parse(format!("invalid ffprobe output: {error}")))?;
    Ok(flatten(output, stream_limit))
}

fn run(binary: &Path, path: &Path, timeout: Duration) -> SourceResult<Vec<u8>> {
    let mut child = Command::new(binary)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|error| match error.kind() {
            io::ErrorKind::NotFound => SourceError::ToolMissing("ffprobe".to_string()),
            _ => SourceError::ToolFailed(format!("could not start ffprobe: {error}")),
        })?;

    // La salida se drena en paralelo para que un JSON grande no bloquee al hijo.
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| SourceError::ToolFailed("ffprobe stdout unavailable".to_string()))?;
    let reader = thread::spawn(move || {
        let mut buffer = Vec::new();
        stdout.read_to_end(&mut buffer).map(|_| buffer)
    });

    let status = wait_with_deadline(&mut child, timeout)?;
    let stdout = reader
        .join()
        .map_err(|_| SourceError::ToolFailed("ffprobe reader panicked".to_string()))??;

    if !status.success() {
        return Err(SourceError::ToolFailed(format!("ffprobe exited with {status}")));
    }
    Ok(stdout)
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> SourceResult<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            if let Err(error) = child.kill() {
                tracing::warn!(%error, "no se pudo terminar ffprobe");
            }
            let _ = child.wait();
            return Err(SourceError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn flatten(output: ProbeOutput, stream_limit: usize) -> MetadataMap {
    let mut map = MetadataMap::new();

    if let Some(format) = output.format {
        map.insert_some("format_name", format.format_name);
        map.insert_some("format_long_name", format.format_long_name);
        map.insert_some("duration", format.duration);
        map.insert_some("size", format.size);
        map.insert_some("bit_rate", format.bit_rate);
        for (key, value) in format.tags {
            let text = match value {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            };
            map.insert(format!("tag_{key}"), text);
        }
    }

    let total = output.streams.len();
    for (index, stream) in output.streams.into_iter().take(stream_limit).enumerate() {
        let kind = stream.codec_type.as_deref().unwrap_or("unknown");
        let prefix = format!("stream_{index}_{kind}");
        map.insert(
            format!("{prefix}_codec"),
            stream.codec_name.clone().unwrap_or_default(),
        );
        map.insert(
            format!("{prefix}_codec_long"),
            stream.codec_long_name.clone().unwrap_or_default(),
        );

        match kind {
            "video" => {
                map.insert_some(format!("{prefix}_width"), stream.width);
                map.insert_some(format!("{prefix}_height"), stream.height);
                map.insert_some(format!("{prefix}_fps"), stream.r_frame_rate);
                map.insert_some(format!("{prefix}_aspect_ratio"), stream.display_aspect_ratio);
            }
            "audio" => {
                map.insert_some(format!("{prefix}_sample_rate"), stream.sample_rate);
                map.insert_some(format!("{prefix}_channels"), stream.channels);
            }
            _ => {}
        }
    }
    if let Some(note) = truncation_note(total, stream_limit, "streams") {
        map.insert("streams_note", note);
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataValue;

    const SAMPLE: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "codec_long_name": "H.264",
             "width": 1920, "height": 1080, "r_frame_rate": "30/1", "display_aspect_ratio": "16:9"},
            {"codec_type": "audio", "codec_name": "aac", "codec_long_name": "AAC",
             "sample_rate": "48000", "channels": 2}
        ],
        "format": {"format_name": "mov,mp4", "format_long_name": "QuickTime / MOV",
                   "duration": "12.5", "size": "1024", "bit_rate": "655",
                   "tags": {"title": "Clip", "major_brand": "isom"}}
    }"#;

    #[test]
    fn flattens_format_and_streams() {
        let output: ProbeOutput = serde_json::from_str(SAMPLE).expect("json");
        let map = flatten(output, 50);

        let text = |key: &str| map.get(key).and_then(MetadataValue::as_text);
        assert_eq!(text("format_name"), Some("mov,mp4"));
        assert_eq!(text("tag_title"), Some("Clip"));
        assert_eq!(text("stream_0_video_codec"), Some("h264"));
        assert_eq!(text("stream_0_video_fps"), Some("30/1"));
        assert_eq!(
            map.get("stream_0_video_width").and_then(MetadataValue::as_integer),
            Some(1920)
        );
        assert_eq!(text("stream_1_audio_sample_rate"), Some("48000"));
        assert!(!map.contains_key("stream_1_audio_width"));
    }

    #[test]
    fn stream_count_is_bounded() {
        let output = ProbeOutput {
            format: None,
            streams: (0..53)
                .map(|_| ProbeStream {
                    codec_type: Some("data".into()),
                    ..ProbeStream::default()
                })
                .collect(),
        };
        let map = flatten(output, 50);
        assert!(map.contains_key("stream_49_data_codec"));
        assert!(!map.contains_key("stream_50_data_codec"));
        assert_eq!(
            map.get("streams_note").and_then(MetadataValue::as_text),
            Some("... and 3 more streams")
        );
    }

    #[test]
    fn missing_binary_is_a_note() {
        let result = extract(None, Path::new("clip.mp4"), Duration::from_secs(1), 50);
        assert!(matches!(result, Err(ref error) if error.is_note()));
    }

    #[test]
    fn nonexistent_binary_is_a_note() {
        let result = extract(
            Some(Path::new("/nonexistent/bin/ffprobe")),
            Path::new("clip.mp4"),
            Duration::from_secs(1),
            50,
        );
        assert!(matches!(result, Err(SourceError::ToolMissing(_))));
    }

    #[cfg(unix)]
    #[test]
    fn fake_tool_output_and_timeout() -> Result<(), Box<dyn std::error::Error>> {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let video = dir.path().join("clip.mp4");
        fs::write(&video, b"not really a video")?;

        let fake = dir.path().join("fake-ffprobe");
        fs::write(
            &fake,
            format!("#!/bin/sh\ncat <<'EOF'\n{SAMPLE}\nEOF\n"),
        )?;
        fs::set_permissions(&fake, fs::Permissions::from_mode(0o755))?;

        let slow = dir.path().join("slow-ffprobe");
        fs::write(&slow, "#!/bin/sh\nexec sleep 5\n")?;
        fs::set_permissions(&slow, fs::Permissions::from_mode(0o755))?;

        let map = extract(Some(fake.as_path()), &video, Duration::from_secs(10), 50)?;
        assert_eq!(
            map.get("format_long_name").and_then(MetadataValue::as_text),
            Some("QuickTime / MOV")
        );

        let started = Instant::now();
        let result = extract(Some(slow.as_path()), &video, Duration::from_millis(300), 50);
        assert!(matches!(result, Err(SourceError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let broken = dir.path().join("broken-ffprobe");
        fs::write(&broken, "#!/bin/sh\necho 'not json'\nexit 1\n")?;
        fs::set_permissions(&broken, fs::Permissions::from_mode(0o755))?;

        let result = extract(Some(broken.as_path()), dir.path(), Duration::from_secs(5), 50);
        assert!(matches!(result, Err(SourceError::ToolFailed(_))));
        Ok(())
    }
}
