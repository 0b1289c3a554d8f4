//! Startup check: external tools, work directory and credentials.

use std::path::Path;

use anyhow::Context;

use shortsmith_media::{check_ffmpeg, check_ffprobe, check_ytdlp};
use shortsmith_pipeline::PipelineConfig;
use shortsmith_sheets::{SheetsClient, SheetsConfig};
use shortsmith_youtube::{YoutubeConfig, YoutubeUploader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = PipelineConfig::from_env();
    println!(
        "shortsmith-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;

    if config.dry_run {
        println!("shortsmith-selfcheck: DRY_RUN set, skipping tool lookup");
    } else {
        for (name, path) in [
            ("ffmpeg", check_ffmpeg()?),
            ("ffprobe", check_ffprobe()?),
            ("yt-dlp", check_ytdlp()?),
        ] {
            println!("shortsmith-selfcheck: {} at {}", name, path.display());
        }
    }

    if config.dev_mode {
        println!("shortsmith-selfcheck: DEV_MODE set, skipping credentials");
    } else {
        let sheets = SheetsConfig::from_env();
        SheetsClient::new(sheets).context("Sheets service account unusable")?;
        println!("shortsmith-selfcheck: Sheets credentials loaded");

        let uploader =
            YoutubeUploader::new(YoutubeConfig::from_env()).context("YouTube client secrets unusable")?;
        uploader
            .verify_credentials()
            .await
            .context("YouTube refresh token rejected")?;
        println!("shortsmith-selfcheck: YouTube refresh token accepted");
    }

    println!("shortsmith-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("cannot create work dir {}", path.display()))?;
    Ok(())
}
