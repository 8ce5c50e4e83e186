//! FFprobe stream information.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::SamplerError;

/// Facts about the primary video stream.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    /// Duration in seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// Run `ffprobe` against `path`.
pub async fn probe_video(ffprobe: &Path, path: &Path) -> Result<VideoInfo, SamplerError> {
    if !path.exists() {
        return Err(SamplerError::SourceLoadFailed(format!(
            "{} does not exist",
            path.display()
        )));
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| SamplerError::CaptureContextUnavailable(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(SamplerError::SourceLoadFailed(format!(
            "ffprobe exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe(&output.stdout)
}

fn parse_probe(json: &[u8]) -> Result<VideoInfo, SamplerError> {
    let probe: FfprobeOutput = serde_json::from_slice(json)
        .map_err(|e| SamplerError::SourceLoadFailed(format!("unreadable ffprobe output: {e}")))?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| SamplerError::SourceLoadFailed("no video stream found".to_string()))?;

    // The video stream's own duration first: the container can run longer
    // when the audio track outlasts the last picture.
    let duration = parse_duration(stream.duration.as_deref())
        .or_else(|| parse_duration(probe.format.as_ref().and_then(|f| f.duration.as_deref())))
        .ok_or_else(|| SamplerError::SourceLoadFailed("video duration unknown".to_string()))?;

    Ok(VideoInfo {
        duration,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        codec: stream.codec_name.clone().unwrap_or_default(),
    })
}

fn parse_duration(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_format_duration() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 640, "height": 360}
            ],
            "format": {"duration": "9.960000"}
        }"#;
        let info = parse_probe(json).unwrap();
        assert!((info.duration - 9.96).abs() < 1e-9);
        assert_eq!((info.width, info.height), (640, 360));
        assert_eq!(info.codec, "h264");
    }

    #[test]
    fn test_parse_probe_stream_duration_fallback() {
        let json = br#"{
            "streams": [{"codec_type": "video", "duration": "4.5"}],
            "format": {}
        }"#;
        assert!((parse_probe(json).unwrap().duration - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_probe_prefers_video_stream_duration() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "duration": "9.466667"},
                {"codec_type": "audio", "codec_name": "aac", "duration": "9.980000"}
            ],
            "format": {"duration": "9.980000"}
        }"#;
        assert!((parse_probe(json).unwrap().duration - 9.466667).abs() < 1e-9);
    }

    #[test]
    fn test_parse_probe_no_video_stream() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        assert!(matches!(parse_probe(json), Err(SamplerError::SourceLoadFailed(_))));
    }

    #[test]
    fn test_parse_probe_unknown_duration() {
        let json = br#"{"streams": [{"codec_type": "video"}], "format": {"duration": "N/A"}}"#;
        assert!(matches!(parse_probe(json), Err(SamplerError::SourceLoadFailed(_))));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let err = probe_video(Path::new("ffprobe"), Path::new("/nonexistent/clip.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, SamplerError::SourceLoadFailed(_)));
    }
}
