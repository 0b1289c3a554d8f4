//! yt-dlp and FFmpeg CLI wrappers.
//!
//! This crate provides:
//! - Short downloads through yt-dlp with retry of transient failures
//! - Type-safe FFmpeg command building for multi-input graphs
//! - Progress parsing from `-progress pipe:2`
//! - Timeouts for long-running encodes
//! - Concatenation of a short with an appended clip

pub mod command;
pub mod compose;
pub mod download;
pub mod error;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use compose::{build_concat_command, ClipComposer, ComposeConfig, ComposedVideo};
pub use download::{normalize_short_url, DownloadConfig, DownloadedShort, YtDlpDownloader};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
