//! Pipeline configuration.

use std::path::PathBuf;

use shortsmith_models::schedule::DEFAULT_HORIZON_DAYS;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent of the per-row scratch directories and uploaded clips
    pub work_dir: PathBuf,
    /// How far ahead a publish slot may be, in days
    pub schedule_horizon_days: i64,
    /// Keep the scratch directory of failed rows
    pub keep_failed_artifacts: bool,
    /// Replace Sheets and YouTube with in-process fakes
    pub dev_mode: bool,
    /// Replace yt-dlp and ffmpeg with file copies
    pub dry_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("shortsmith"),
            schedule_horizon_days: DEFAULT_HORIZON_DAYS,
            keep_failed_artifacts: false,
            dev_mode: false,
            dry_run: false,
        }
    }
}

impl PipelineConfig {
    /// Scheduling window; an unrepresentable day count falls back to the default.
    pub fn schedule_horizon(&self) -> chrono::Duration {
        chrono::Duration::try_days(self.schedule_horizon_days)
            .unwrap_or_else(|| chrono::Duration::days(DEFAULT_HORIZON_DAYS))
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            schedule_horizon_days: std::env::var("SCHEDULE_HORIZON_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|days: &i64| *days > 0)
                .unwrap_or(defaults.schedule_horizon_days),
            keep_failed_artifacts: env_flag("KEEP_FAILED_ARTIFACTS"),
            dev_mode: env_flag("DEV_MODE"),
            dry_run: env_flag("DRY_RUN"),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" 1 "));
        assert!(parse_flag("YES"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.schedule_horizon_days, 365);
        assert!(!config.keep_failed_artifacts);
        assert!(config.work_dir.ends_with("shortsmith"));
        assert_eq!(config.schedule_horizon().num_days(), 365);
    }

    #[test]
    fn test_schedule_horizon_out_of_range() {
        let config = PipelineConfig {
            schedule_horizon_days: i64::MAX,
            ..PipelineConfig::default()
        };
        assert_eq!(config.schedule_horizon().num_days(), DEFAULT_HORIZON_DAYS);
    }
}
