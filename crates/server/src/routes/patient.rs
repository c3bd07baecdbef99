//! Patient record HTTP handlers

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use clinai_core::normalize;
use clinai_core::{MessageBody, PatientRecord, RecordField, RecordPatch};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::AppState;
use crate::ai::extractor;
use crate::db::{Page, SortOrder};
use crate::error::AppError;

const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 1000;

/// Query parameters for listing patients
#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub order: Option<SortOrder>,
}

impl ListParams {
    fn page(&self) -> Page {
        Page {
            limit: self
                .limit
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            skip: self.skip.unwrap_or(0),
            order: self.order.unwrap_or_default(),
        }
    }
}

/// One page of patient records with the store-wide total
#[derive(Debug, Serialize)]
pub struct PatientPage {
    patients: Vec<PatientRecord>,
    total: u64,
    limit: usize,
    skip: usize,
}

/// Request body for saving a consultation
#[derive(Debug, Deserialize)]
pub struct SaveRecordRequest {
    #[serde(default, deserialize_with = "normalize::text")]
    idx: String,
    #[serde(default, deserialize_with = "normalize::text")]
    conversation: String,
    #[serde(default, deserialize_with = "normalize::text")]
    notes: String,
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Patient {} not found", id))
}

/// GET /api/patients - List patient records ordered by id
pub async fn list(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let page = params.page();

    let patients = state.store.list(page).await?;
    let total = state.store.count().await?;

    Ok(Json(PatientPage {
        patients,
        total,
        limit: page.limit,
        skip: page.skip,
    }))
}

/// GET /api/patient/{id} - Read a patient record
pub async fn read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    match state.store.get(&id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(not_found(&id)),
    }
}

/// DELETE /api/patient/{id} - Delete a patient record
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if state.store.delete(&id).await? {
        tracing::info!(patient_id = %id, "Patient record deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&id))
    }
}

/// PATCH /patient/{id}/{field} - Replace a single field
pub async fn update_field(
    State(state): State<AppState>,
    Path((id, field)): Path<(String, String)>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let field: RecordField = field.parse()?;
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let patch = RecordPatch::from_body(field, &body)?;

    if !state.store.patch(&id, patch).await? {
        return Err(not_found(&id));
    }

    tracing::info!(patient_id = %id, %field, "Patient field updated");
    Ok(Json(MessageBody::new(format!(
        "Patient {} {} updated successfully",
        id, field
    ))))
}

/// POST /save_record - Extract clinical artifacts and store the record
pub async fn save_record(
    State(state): State<AppState>,
    body: Result<Json<SaveRecordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let patient_id = body.idx.trim();
    if patient_id.is_empty() {
        return Err(AppError::BadRequest("Patient idx is required".to_string()));
    }
    if body.notes.trim().is_empty() && body.conversation.trim().is_empty() {
        return Err(AppError::BadRequest(
            "A note or conversation is required".to_string(),
        ));
    }

    tracing::info!(patient_id, "Extracting clinical record");
    let record =
        extractor::build_record(state.llm.as_ref(), patient_id, &body.notes, &body.conversation)
            .await;
    state.store.upsert(&record).await?;
    tracing::info!(
        patient_id,
        keywords = record.keywords.len(),
        prescriptions = record.prescriptions.len(),
        "Patient record saved"
    );

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /patient/{id}/details - Derive artifacts from the stored texts
///
/// Nothing is persisted.
pub async fn details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = state.store.get(&id).await?.ok_or_else(|| not_found(&id))?;

    if record.note.trim().is_empty() && record.conversation.trim().is_empty() {
        return Err(AppError::Unprocessable(
            "No note or conversation available for patient".to_string(),
        ));
    }

    let artifacts =
        extractor::derive_artifacts(state.llm.as_ref(), &record.note, &record.conversation)
            .await;
    Ok(Json(artifacts))
}
