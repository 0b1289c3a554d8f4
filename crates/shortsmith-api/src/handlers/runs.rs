//! Run handlers: start from the form, poll, stop.

use std::path::{Path as FsPath, PathBuf};
use std::str::FromStr;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use shortsmith_models::{MetadataTemplate, PrivacyStatus, RunId, RunReport, ScheduleConfig};
use shortsmith_pipeline::RunRequest;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Form value of a `datetime-local` input.
const LOCAL_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Serialize)]
pub struct CreateRunResponse {
    pub run_id: RunId,
}

#[derive(Debug, Serialize)]
pub struct ListRunsResponse {
    pub runs: Vec<RunReport>,
}

/// Raw form fields, before validation.
#[derive(Debug, Default)]
struct RunForm {
    source: Option<String>,
    worksheet: Option<String>,
    clip_path: Option<PathBuf>,
    title_template: Option<String>,
    description_template: Option<String>,
    template_name: Option<String>,
    starting_number: Option<String>,
    privacy: Option<String>,
    schedule_start: Option<String>,
    interval_hours: Option<String>,
    /// Browser `getTimezoneOffset()`, minutes west of UTC
    timezone_offset: Option<String>,
}

/// Start a run from the multipart form.
pub async fn create_run(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<CreateRunResponse>)> {
    let clips_dir = state.pipeline().config().work_dir.join("clips");
    let mut form = RunForm::default();

    let result = async {
        read_form(multipart, &clips_dir, &mut form).await?;
        let request = build_request(&state, &form).await?;
        state.runs.start(request).await
    }
    .await;

    match result {
        Ok(run_id) => {
            info!(run_id = %run_id, "Run accepted");
            Ok((StatusCode::ACCEPTED, Json(CreateRunResponse { run_id })))
        }
        Err(e) => {
            if let Some(clip) = &form.clip_path {
                if let Err(err) = tokio::fs::remove_file(clip).await {
                    debug!("Failed to remove rejected clip {}: {}", clip.display(), err);
                }
            }
            Err(e)
        }
    }
}

/// Get a run's state and per-row report.
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<RunReport>> {
    let run_id = RunId::from_string(run_id);
    let handle = state
        .runs
        .get(&run_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("run {run_id}")))?;
    Ok(Json(handle.snapshot().await))
}

/// Ask a run to stop before its next row.
pub async fn stop_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<RunReport>> {
    let run_id = RunId::from_string(run_id);
    Ok(Json(state.runs.stop(&run_id).await?))
}

pub async fn list_runs(State(state): State<AppState>) -> Json<ListRunsResponse> {
    Json(ListRunsResponse {
        runs: state.runs.list().await,
    })
}

/// Drain the multipart stream, writing the clip to disk as it arrives.
///
/// `form.clip_path` is set as soon as the file exists so the caller can
/// remove it on any later error.
async fn read_form(
    mut multipart: Multipart,
    clips_dir: &FsPath,
    form: &mut RunForm,
) -> ApiResult<()> {
    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "clip" {
            if form.clip_path.is_some() {
                return Err(ApiError::bad_request("only one clip may be uploaded"));
            }
            let ext = clip_extension(field.file_name());
            tokio::fs::create_dir_all(clips_dir).await?;
            let path = clips_dir.join(format!("{}.{}", Uuid::new_v4(), ext));

            let mut file = tokio::fs::File::create(&path).await?;
            form.clip_path = Some(path);

            let mut written = 0u64;
            while let Some(chunk) = field.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;

            if written == 0 {
                return Err(ApiError::bad_request("clip file is empty"));
            }
            continue;
        }

        let value = field.text().await?;
        let value = Some(value).filter(|v| !v.trim().is_empty());
        match name.as_str() {
            "source" => form.source = value,
            "worksheet" => form.worksheet = value,
            "title_template" => form.title_template = value,
            "description_template" => form.description_template = value,
            "template_name" => form.template_name = value,
            "starting_number" => form.starting_number = value,
            "privacy" => form.privacy = value,
            "schedule_start" => form.schedule_start = value,
            "interval_hours" => form.interval_hours = value,
            "timezone_offset" => form.timezone_offset = value,
            other => debug!("Ignoring form field '{}'", other),
        }
    }
    Ok(())
}

async fn build_request(state: &AppState, form: &RunForm) -> ApiResult<RunRequest> {
    let source = form
        .source
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| ApiError::bad_request("source URL is required"))?;
    let clip_path = form
        .clip_path
        .clone()
        .ok_or_else(|| ApiError::bad_request("clip file is required"))?;

    let template = resolve_template(state, form).await?;

    let starting_number = match form.starting_number.as_deref() {
        Some(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| ApiError::bad_request(format!("invalid starting number '{s}'")))?,
        None => 1,
    };

    let privacy = match form.privacy.as_deref() {
        Some(s) => PrivacyStatus::from_str(s.trim())
            .map_err(|e| ApiError::Validation(e.to_string()))?,
        None => PrivacyStatus::default(),
    };

    let schedule = if privacy.is_scheduled() {
        let start = form
            .schedule_start
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("scheduled privacy needs a schedule start"))?;
        let start = parse_schedule_start(start, form.timezone_offset.as_deref())?;
        let hours = form
            .interval_hours
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("scheduled privacy needs an interval"))?;
        let hours = hours
            .trim()
            .parse::<u32>()
            .map_err(|_| ApiError::bad_request(format!("invalid interval hours '{hours}'")))?;
        let schedule = ScheduleConfig::from_hours(start, hours)
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        schedule
            .check_interval(state.pipeline().config().schedule_horizon())
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        Some(schedule)
    } else {
        None
    };

    let request = RunRequest {
        source: source.to_string(),
        worksheet: form.worksheet.as_deref().map(|w| w.trim().to_string()),
        clip_path,
        template,
        starting_number,
        privacy,
        schedule,
    };
    request.validate()?;
    Ok(request)
}

/// Inline templates win; a saved template fills whichever field is missing.
async fn resolve_template(state: &AppState, form: &RunForm) -> ApiResult<MetadataTemplate> {
    let saved = match form.template_name.as_deref() {
        Some(name) => Some(
            state
                .templates
                .get(name)
                .await
                .ok_or_else(|| ApiError::not_found(format!("template '{name}'")))?,
        ),
        None => None,
    };
    let defaults = MetadataTemplate::default();

    let title = form
        .title_template
        .clone()
        .or_else(|| saved.as_ref().map(|t| t.title.clone()))
        .unwrap_or(defaults.title);
    let description = form
        .description_template
        .clone()
        .or_else(|| saved.as_ref().map(|t| t.description.clone()))
        .unwrap_or(defaults.description);

    Ok(MetadataTemplate::new(title, description))
}

/// Accepts RFC 3339, or a `datetime-local` value read in the browser's offset (UTC if absent).
fn parse_schedule_start(value: &str, tz_offset: Option<&str>) -> ApiResult<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt);
    }

    let naive = NaiveDateTime::parse_from_str(value, LOCAL_DATETIME_FORMAT)
        .map_err(|_| ApiError::bad_request(format!("invalid schedule start '{value}'")))?;

    let minutes_west: i32 = match tz_offset {
        Some(s) => s
            .trim()
            .parse()
            .map_err(|_| ApiError::bad_request(format!("invalid timezone offset '{s}'")))?,
        None => 0,
    };
    let offset = FixedOffset::west_opt(minutes_west * 60)
        .ok_or_else(|| ApiError::bad_request(format!("invalid timezone offset '{minutes_west}'")))?;

    naive
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| ApiError::bad_request(format!("invalid schedule start '{value}'")))
}

/// Keep the uploaded extension when it looks like one; ffmpeg probes by content anyway.
fn clip_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| FsPath::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "mp4".to_string())
}
