// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CancelOutcome, Caller, CompleteAppointmentRequest, CreateSlotRequest, RescheduleSlotRequest,
    SchedulingError, SlotQuery, UpdateSlotRequest,
};
use crate::services::engine::SchedulingEngine;

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        let message = err.to_string();
        match err {
            SchedulingError::Unauthorized => AppError::Forbidden(message),
            SchedulingError::NotFound => AppError::NotFound(message),
            SchedulingError::InvalidInput(_) => AppError::BadRequest(message),
            SchedulingError::SlotConflict => AppError::Conflict(message),
            SchedulingError::InvalidState(_) | SchedulingError::InvalidTransition { .. } => {
                AppError::Conflict(message)
            }
            SchedulingError::Store(_) => AppError::Database(message),
        }
    }
}

/// The middleware already resolved the user; this narrows it to the engine's
/// caller pair and rejects identities the engine cannot work with.
fn resolve_caller(user: &User) -> Result<Caller, AppError> {
    Caller::try_from(user).map_err(AppError::Auth)
}

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SlotQueryParams {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_slot(
    State(engine): State<Arc<SchedulingEngine>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = resolve_caller(&user)?;

    let slot = engine.create_slot(&caller, request).await?;

    Ok(Json(json!({
        "success": true,
        "slot": slot,
        "message": "Slot created successfully"
    })))
}

#[axum::debug_handler]
pub async fn list_slots(
    State(engine): State<Arc<SchedulingEngine>>,
    Extension(user): Extension<User>,
    Query(params): Query<SlotQueryParams>,
) -> Result<Json<Value>, AppError> {
    let caller = resolve_caller(&user)?;

    let query = SlotQuery {
        doctor_id: params.doctor_id,
        patient_id: params.patient_id,
        from: params.from,
        to: params.to,
    };

    let slots = engine.list_slots(&caller, query).await?;
    let count = slots.len();

    Ok(Json(json!({
        "slots": slots,
        "count": count
    })))
}

#[axum::debug_handler]
pub async fn get_slot(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(slot_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = resolve_caller(&user)?;

    let slot = engine.get_slot(&caller, slot_id).await?;

    Ok(Json(json!(slot)))
}

#[axum::debug_handler]
pub async fn update_slot(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(slot_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = resolve_caller(&user)?;

    let slot = engine.update_slot(&caller, slot_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "slot": slot,
        "message": "Slot updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn reschedule_slot(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(slot_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = resolve_caller(&user)?;

    let slot = engine.reschedule_slot(&caller, slot_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "slot": slot,
        "message": "Slot rescheduled successfully"
    })))
}

#[axum::debug_handler]
pub async fn confirm_arrival(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(slot_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = resolve_caller(&user)?;

    let slot = engine.confirm_arrival(&caller, slot_id).await?;

    Ok(Json(json!({
        "success": true,
        "slot": slot,
        "message": "Arrival confirmed"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(slot_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<CompleteAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = resolve_caller(&user)?;

    let slot = engine.complete_appointment(&caller, slot_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "slot": slot,
        "message": "Appointment completed"
    })))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(slot_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = resolve_caller(&user)?;

    let slot = engine.mark_no_show(&caller, slot_id).await?;

    Ok(Json(json!({
        "success": true,
        "slot": slot,
        "message": "Slot marked as no-show and released"
    })))
}

#[axum::debug_handler]
pub async fn cancel_slot(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(slot_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = resolve_caller(&user)?;

    let outcome = engine.cancel_slot(&caller, slot_id).await?;

    let message = match &outcome {
        CancelOutcome::Released { .. } => "Slot released back to availability",
        CancelOutcome::Deleted { .. } => "Slot deleted",
    };

    Ok(Json(json!({
        "success": true,
        "result": outcome,
        "message": message
    })))
}
