//! API request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rules_hub_catalog::{DeviceFilterCriteria, FilterKey};
use rules_hub_core::{RuleDocument, RuleStatusView};
use rules_hub_sync::{
    sorted_by_name, EditingSession, KnownRule, RuleEdit, SaveOutcome, SyncReport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{ApiError, AppState};

/// A rule with its 1-based position in the file
#[derive(Debug, Serialize, Deserialize)]
pub struct RuleEntry {
    pub idx: usize,
    pub rule: RuleDocument,
}

/// The rules of a file and how they compare with the runtime's index
#[derive(Debug, Serialize, Deserialize)]
pub struct RuleListing {
    pub rules: Vec<RuleEntry>,
    pub report: SyncReport,
}

/// The runtime's rules after a delete, sorted by name
#[derive(Debug, Serialize, Deserialize)]
pub struct RuleRemoval {
    pub remaining: Vec<KnownRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArmingRequest {
    pub armed: bool,
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgementRequest {
    pub acknowledged: bool,
}

#[derive(Debug, Deserialize)]
pub struct OptionsRequest {
    pub key: FilterKey,
    #[serde(default)]
    pub criteria: DeviceFilterCriteria,
}

async fn open_session(state: &AppState, file: &str) -> Result<EditingSession, ApiError> {
    Ok(EditingSession::open(file, state.transport.clone(), state.runtime.as_ref()).await?)
}

/// A failed upload is answered with the export so the client can keep it
fn save_response(outcome: SaveOutcome, success: StatusCode) -> impl IntoResponse {
    let status = if outcome.is_saved() {
        success
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(outcome))
}

// ==================== Rule File Handlers ====================

/// List the rules of a file in file order, with any desync warnings
///
/// Rules the runtime has numbered since the last upload get their ids.
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let mut session = open_session(&state, &file).await?;
    let report = session.check()?;
    let rules: Vec<RuleEntry> = session
        .documents()?
        .into_iter()
        .map(|(idx, rule)| RuleEntry { idx, rule })
        .collect();
    Ok(Json(RuleListing { rules, report }))
}

/// Append a new rule to a file
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
    Json(rule): Json<RuleDocument>,
) -> Result<impl IntoResponse, ApiError> {
    let _guard = state.edit_lock.lock().await;
    let mut session = open_session(&state, &file).await?;
    let outcome = session
        .save(RuleEdit::from_document(None, &rule), state.runtime.as_ref())
        .await?;

    tracing::info!("Created rule '{}' in {}", rule.name, file);
    Ok(save_response(outcome, StatusCode::CREATED))
}

/// Replace the rule at a position
pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path((file, idx)): Path<(String, usize)>,
    Json(rule): Json<RuleDocument>,
) -> Result<impl IntoResponse, ApiError> {
    let _guard = state.edit_lock.lock().await;
    let mut session = open_session(&state, &file).await?;
    let outcome = session
        .save(RuleEdit::from_document(Some(idx), &rule), state.runtime.as_ref())
        .await?;
    Ok(save_response(outcome, StatusCode::OK))
}

pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path((file, idx)): Path<(String, usize)>,
) -> Result<impl IntoResponse, ApiError> {
    let _guard = state.edit_lock.lock().await;
    let mut session = open_session(&state, &file).await?;
    let outcome = session.delete_rule(idx, state.runtime.as_ref()).await?;

    Ok(Json(RuleRemoval {
        remaining: sorted_by_name(session.known()),
        reload_error: outcome.reload_error,
    }))
}

// ==================== Status Handlers ====================

/// Status views of every rule known to the runtime
pub async fn list_statuses(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let statuses = state.runtime.get_rule_statuses(None).await?;
    let views = statuses
        .iter()
        .map(RuleStatusView::project)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(views))
}

/// Commands are forwarded; the next status poll shows their effect
pub async fn set_arming(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    Json(req): Json<ArmingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.runtime.set_arming(id, req.armed).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn set_acknowledgement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    Json(req): Json<AcknowledgementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.runtime.set_acknowledgement(id, req.acknowledged).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn get_timeline(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.runtime.get_timeline().await?))
}

// ==================== Catalog Handlers ====================

/// Options of one dropdown given the other selections
pub async fn catalog_options(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OptionsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let catalog = state.catalog.read().await;
    Ok(Json(catalog.options(req.key, &req.criteria)))
}

pub async fn refresh_catalog(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let generation = state.catalog.write().await.refresh();
    Ok(Json(serde_json::json!({ "generation": generation })))
}

// ==================== Health Check ====================

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "rules-hub"
    }))
}
