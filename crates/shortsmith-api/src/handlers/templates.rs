//! Template library handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::templates::NamedTemplate;

#[derive(Debug, Serialize)]
pub struct ListTemplatesResponse {
    pub templates: Vec<NamedTemplate>,
}

#[derive(Debug, Deserialize)]
pub struct SaveTemplateRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

pub async fn list_templates(State(state): State<AppState>) -> Json<ListTemplatesResponse> {
    Json(ListTemplatesResponse {
        templates: state.templates.list().await,
    })
}

/// Create or replace a named template.
pub async fn save_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<SaveTemplateRequest>,
) -> ApiResult<Json<NamedTemplate>> {
    validate_name(&name)?;
    let template = NamedTemplate {
        name,
        title: body.title,
        description: body.description,
    };
    template.validate()?;
    // Reject unparseable templates now rather than at run start
    template.template().placeholders().map_err(|e| ApiError::Validation(e.to_string()))?;

    state.templates.upsert(template.clone()).await?;
    info!(name = %template.name, "Template saved");
    Ok(Json(template))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    if state.templates.remove(&name).await? {
        info!(name = %name, "Template deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("template '{name}'")))
    }
}

fn validate_name(name: &str) -> ApiResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ' ');
    if valid {
        Ok(())
    } else {
        Err(ApiError::bad_request(
            "template names use letters, digits, spaces, '-' and '_' (max 64)",
        ))
    }
}
