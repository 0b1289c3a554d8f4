//! Appending the user's clip to a downloaded short.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::download::DownloadedShort;
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

/// Output audio sample rate.
pub const OUTPUT_SAMPLE_RATE: u32 = 48_000;

/// Encoder settings for composed videos.
#[derive(Debug, Clone)]
pub struct ComposeConfig {
    /// Kill ffmpeg after this many seconds
    pub timeout_secs: u64,
    pub crf: u8,
    pub preset: String,
    pub audio_bitrate: String,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            crf: 20,
            preset: "veryfast".to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }
}

impl ComposeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout_secs: std::env::var("COMPOSE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|s| *s > 0)
                .unwrap_or(defaults.timeout_secs),
            ..defaults
        }
    }
}

/// Result of concatenating a short and the appended clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedVideo {
    pub path: PathBuf,
    /// Probed duration of the output in seconds
    pub duration_secs: f64,
}

/// Concatenates every short with the same appended clip.
#[derive(Debug, Clone)]
pub struct ClipComposer {
    append_clip: PathBuf,
    config: ComposeConfig,
}

impl ClipComposer {
    pub fn new(append_clip: impl Into<PathBuf>, config: ComposeConfig) -> Self {
        Self {
            append_clip: append_clip.into(),
            config,
        }
    }

    /// Write `short` followed by the appended clip to `output`.
    pub async fn compose(
        &self,
        short: &DownloadedShort,
        output: &Path,
    ) -> MediaResult<ComposedVideo> {
        let short_info = probe_video(&short.path).await?;
        let clip_info = probe_video(&self.append_clip).await?;

        let cmd = build_concat_command(
            &short.path,
            &short_info,
            &self.append_clip,
            &clip_info,
            output,
            &self.config,
        )?;

        let total_ms = ((short_info.duration + clip_info.duration) * 1000.0) as i64;
        let row_index = short.row_index;

        FfmpegRunner::new()
            .with_timeout(self.config.timeout_secs)
            .run_with_progress(&cmd, move |progress| {
                debug!(
                    row = row_index,
                    percent = progress.percentage(total_ms),
                    speed = progress.speed,
                    "Compose progress"
                );
            })
            .await?;

        let composed = probe_video(output).await?;
        info!(
            row = row_index,
            output = %output.display(),
            duration_secs = composed.duration,
            "Composed video"
        );

        Ok(ComposedVideo {
            path: output.to_path_buf(),
            duration_secs: composed.duration,
        })
    }
}

/// Round down to an even number; libx264 with yuv420p needs even frame sizes.
fn even(n: u32) -> u32 {
    (n & !1).max(2)
}

/// Video chain: fit inside `w`x`h`, pad to it, square pixels, common rate and pixel format.
fn video_chain(input: usize, w: u32, h: u32, fps: f64, label: &str) -> String {
    format!(
        "[{input}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps:.3},format=yuv420p[{label}]"
    )
}

/// Audio chain: the input's own audio, or generated silence as long as the input.
fn audio_chain(input: usize, info: &VideoInfo, label: &str) -> MediaResult<String> {
    let normalize = format!(
        "aresample={OUTPUT_SAMPLE_RATE},aformat=sample_fmts=fltp:channel_layouts=stereo"
    );
    if info.has_audio {
        return Ok(format!("[{input}:a]{normalize}[{label}]"));
    }
    if info.duration <= 0.0 {
        return Err(MediaError::InvalidVideo(format!(
            "input {input} has no audio and no known duration"
        )));
    }
    Ok(format!(
        "anullsrc=channel_layout=stereo:sample_rate={OUTPUT_SAMPLE_RATE},atrim=duration={:.3},{normalize}[{label}]",
        info.duration
    ))
}

/// Build the ffmpeg invocation that concatenates `short` and `clip`.
///
/// The short decides frame size and rate; the clip is letterboxed into it.
pub fn build_concat_command(
    short: &Path,
    short_info: &VideoInfo,
    clip: &Path,
    clip_info: &VideoInfo,
    output: &Path,
    config: &ComposeConfig,
) -> MediaResult<FfmpegCommand> {
    let (w, h) = (even(short_info.width), even(short_info.height));
    let fps = short_info.fps;

    let filter = [
        video_chain(0, w, h, fps, "v0"),
        audio_chain(0, short_info, "a0")?,
        video_chain(1, w, h, fps, "v1"),
        audio_chain(1, clip_info, "a1")?,
        "[v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]".to_string(),
    ]
    .join(";");

    Ok(FfmpegCommand::new(output)
        .input(short)
        .input(clip)
        .filter_complex(filter)
        .map("[outv]")
        .map("[outa]")
        .video_codec("libx264")
        .preset(config.preset.clone())
        .crf(config.crf)
        .pixel_format("yuv420p")
        .audio_codec("aac")
        .audio_bitrate(config.audio_bitrate.clone())
        .faststart())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(width: u32, height: u32, fps: f64, has_audio: bool) -> VideoInfo {
        VideoInfo {
            duration: 12.5,
            width,
            height,
            fps,
            codec: "h264".to_string(),
            has_audio,
            size: 0,
        }
    }

    fn filter_of(cmd: &FfmpegCommand) -> String {
        let args = cmd.build_args();
        let pos = args.iter().position(|a| a == "-filter_complex").unwrap();
        args[pos + 1].clone()
    }

    #[test]
    fn test_clip_is_fitted_to_short() {
        let cmd = build_concat_command(
            Path::new("short.mp4"),
            &info(1080, 1920, 30.0, true),
            Path::new("clip.mp4"),
            &info(1920, 1080, 25.0, true),
            Path::new("out.mp4"),
            &ComposeConfig::default(),
        )
        .unwrap();

        let filter = filter_of(&cmd);
        assert!(filter.contains("[1:v]scale=1080:1920:force_original_aspect_ratio=decrease"));
        assert!(filter.contains("pad=1080:1920"));
        assert!(filter.contains("fps=30.000"));
        assert!(filter.ends_with("concat=n=2:v=1:a=1[outv][outa]"));

        let args = cmd.build_args();
        assert!(args.windows(2).any(|w| w == ["-movflags", "+faststart"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
    }

    #[test]
    fn test_silent_input_gets_generated_audio() {
        let cmd = build_concat_command(
            Path::new("short.mp4"),
            &info(720, 1280, 30.0, true),
            Path::new("clip.mp4"),
            &info(720, 1280, 30.0, false),
            Path::new("out.mp4"),
            &ComposeConfig::default(),
        )
        .unwrap();

        let filter = filter_of(&cmd);
        assert!(filter.contains("anullsrc=channel_layout=stereo:sample_rate=48000,atrim=duration=12.500"));
        assert!(!filter.contains("[1:a]"));
        assert!(filter.contains("[0:a]aresample=48000"));
    }

    #[test]
    fn test_odd_dimensions_are_evened() {
        let cmd = build_concat_command(
            Path::new("short.mp4"),
            &info(721, 1281, 30.0, true),
            Path::new("clip.mp4"),
            &info(720, 1280, 30.0, true),
            Path::new("out.mp4"),
            &ComposeConfig::default(),
        )
        .unwrap();

        assert!(filter_of(&cmd).contains("scale=720:1280"));
    }

    #[test]
    fn test_silent_input_without_duration_is_rejected() {
        let mut clip = info(720, 1280, 30.0, false);
        clip.duration = 0.0;
        let err = build_concat_command(
            Path::new("short.mp4"),
            &info(720, 1280, 30.0, true),
            Path::new("clip.mp4"),
            &clip,
            Path::new("out.mp4"),
            &ComposeConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MediaError::InvalidVideo(_)));
    }
}
