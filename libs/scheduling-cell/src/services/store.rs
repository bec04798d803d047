// libs/scheduling-cell/src/services/store.rs
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use shared_database::postgrest::{DbError, PostgrestClient};

use crate::models::{Slot, SlotStatus};
use crate::services::conflict::overlaps;

const SLOTS_TABLE: &str = "appointment_slots";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The write would violate the per-doctor no-overlap guarantee.
    #[error("write conflicts with an existing slot")]
    Conflict,

    /// Anything else the backend reports; the engine does not distinguish
    /// causes further.
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if err.is_conflict() {
            StoreError::Conflict
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

impl From<StoreError> for crate::models::SchedulingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => crate::models::SchedulingError::SlotConflict,
            StoreError::Backend(msg) => crate::models::SchedulingError::Store(msg),
        }
    }
}

/// Listing filters; all optional, combined with AND. The `[from, to)` window
/// matches any slot whose interval intersects it under half-open semantics.
#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Partial update. Outer `Option` = "change this field"; inner `Option` on
/// clearable fields = the new value, with `None` writing NULL.
#[derive(Debug, Clone, Default)]
pub struct SlotPatch {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<SlotStatus>,
    pub patient_id: Option<Option<Uuid>>,
    pub title: Option<Option<String>>,
    pub symptoms: Option<Option<String>>,
    pub medical_record_id: Option<Option<Uuid>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SlotPatch {
    fn to_body(&self) -> Value {
        let mut body = Map::new();

        if let Some(start_time) = self.start_time {
            body.insert("start_time".into(), Value::String(start_time.to_rfc3339()));
        }
        if let Some(end_time) = self.end_time {
            body.insert("end_time".into(), Value::String(end_time.to_rfc3339()));
        }
        if let Some(status) = self.status {
            body.insert("status".into(), Value::String(status.to_string()));
        }
        if let Some(patient_id) = &self.patient_id {
            body.insert("patient_id".into(), json_opt(patient_id.map(|id| id.to_string())));
        }
        if let Some(title) = &self.title {
            body.insert("title".into(), json_opt(title.clone()));
        }
        if let Some(symptoms) = &self.symptoms {
            body.insert("symptoms".into(), json_opt(symptoms.clone()));
        }
        if let Some(record_id) = &self.medical_record_id {
            body.insert(
                "medical_record_id".into(),
                json_opt(record_id.map(|id| id.to_string())),
            );
        }
        if let Some(updated_at) = self.updated_at {
            body.insert("updated_at".into(), Value::String(updated_at.to_rfc3339()));
        }

        Value::Object(body)
    }

    fn apply(&self, slot: &mut Slot) {
        if let Some(start_time) = self.start_time {
            slot.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            slot.end_time = end_time;
        }
        if let Some(status) = self.status {
            slot.status = status;
        }
        if let Some(patient_id) = self.patient_id {
            slot.patient_id = patient_id;
        }
        if let Some(title) = &self.title {
            slot.title = title.clone();
        }
        if let Some(symptoms) = &self.symptoms {
            slot.symptoms = symptoms.clone();
        }
        if let Some(record_id) = self.medical_record_id {
            slot.medical_record_id = record_id;
        }
        if let Some(updated_at) = self.updated_at {
            slot.updated_at = updated_at;
        }
    }
}

fn json_opt(value: Option<String>) -> Value {
    match value {
        Some(v) => Value::String(v),
        None => Value::Null,
    }
}

/// Durable slot storage. The backing store is an external transactional
/// collaborator, so the seam is an explicit trait; `create` carries the
/// store-level overlap rejection that backs the no-double-booking invariant.
#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Slot>, StoreError>;

    /// Matching slots ordered ascending by `start_time`.
    async fn list(&self, filter: &SlotFilter) -> Result<Vec<Slot>, StoreError>;

    /// Rejects with `StoreError::Conflict` when a non-free slot for the same
    /// doctor overlaps the new slot's interval.
    async fn create(&self, slot: Slot) -> Result<Slot, StoreError>;

    /// `Ok(None)` when the id is unknown.
    async fn update(&self, id: Uuid, patch: SlotPatch) -> Result<Option<Slot>, StoreError>;

    /// `Ok(false)` when the id is unknown.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

// ==============================================================================
// POSTGREST BACKEND
// ==============================================================================

pub struct PostgrestSlotStore {
    client: Arc<PostgrestClient>,
}

impl PostgrestSlotStore {
    pub fn new(client: Arc<PostgrestClient>) -> Self {
        Self { client }
    }

    fn window_filters(filter: &SlotFilter) -> Vec<String> {
        let mut parts = Vec::new();

        if let Some(doctor_id) = filter.doctor_id {
            parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = filter.patient_id {
            parts.push(format!("patient_id=eq.{}", patient_id));
        }
        // Half-open window intersection: a slot ending exactly at `from`
        // stays outside the window.
        if let Some(from) = filter.from {
            let encoded = urlencoding::encode(&from.to_rfc3339()).into_owned();
            parts.push(format!("end_time=gt.{}", encoded));
        }
        if let Some(to) = filter.to {
            let encoded = urlencoding::encode(&to.to_rfc3339()).into_owned();
            parts.push(format!("start_time=lt.{}", encoded));
        }

        parts
    }
}

#[async_trait]
impl SlotStore for PostgrestSlotStore {
    async fn get(&self, id: Uuid) -> Result<Option<Slot>, StoreError> {
        let rows: Vec<Slot> = self
            .client
            .select(SLOTS_TABLE, &format!("id=eq.{}", id))
            .await?;

        Ok(rows.into_iter().next())
    }

    async fn list(&self, filter: &SlotFilter) -> Result<Vec<Slot>, StoreError> {
        let mut parts = Self::window_filters(filter);
        parts.push("order=start_time.asc".to_string());

        debug!("Listing slots with filter {:?}", filter);
        let rows: Vec<Slot> = self.client.select(SLOTS_TABLE, &parts.join("&")).await?;
        Ok(rows)
    }

    async fn create(&self, slot: Slot) -> Result<Slot, StoreError> {
        let body = serde_json::to_value(&slot)
            .map_err(|e| StoreError::Backend(format!("failed to encode slot: {}", e)))?;

        let rows: Vec<Slot> = self.client.insert(SLOTS_TABLE, body).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("insert returned no representation".to_string()))
    }

    async fn update(&self, id: Uuid, patch: SlotPatch) -> Result<Option<Slot>, StoreError> {
        let rows: Vec<Slot> = self
            .client
            .update(SLOTS_TABLE, &format!("id=eq.{}", id), patch.to_body())
            .await?;

        Ok(rows.into_iter().next())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let rows: Vec<Slot> = self
            .client
            .delete(SLOTS_TABLE, &format!("id=eq.{}", id))
            .await?;

        Ok(!rows.is_empty())
    }
}

// ==============================================================================
// IN-MEMORY BACKEND
// ==============================================================================

/// Reference implementation of the store contract backed by a mutex-guarded
/// map. Carries the same create-time overlap rejection as the relational
/// backend; the engine's tests run against it.
#[derive(Default)]
pub struct InMemorySlotStore {
    inner: Mutex<HashMap<Uuid, Slot>>,
}

impl InMemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotStore for InMemorySlotStore {
    async fn get(&self, id: Uuid) -> Result<Option<Slot>, StoreError> {
        let slots = self.inner.lock().unwrap();
        Ok(slots.get(&id).cloned())
    }

    async fn list(&self, filter: &SlotFilter) -> Result<Vec<Slot>, StoreError> {
        let slots = self.inner.lock().unwrap();

        let mut matching: Vec<Slot> = slots
            .values()
            .filter(|slot| {
                filter.doctor_id.is_none_or(|d| slot.doctor_id == d)
                    && filter.patient_id.is_none_or(|p| slot.patient_id == Some(p))
                    && filter.from.is_none_or(|from| slot.end_time > from)
                    && filter.to.is_none_or(|to| slot.start_time < to)
            })
            .cloned()
            .collect();

        matching.sort_by_key(|slot| slot.start_time);
        Ok(matching)
    }

    async fn create(&self, slot: Slot) -> Result<Slot, StoreError> {
        let mut slots = self.inner.lock().unwrap();

        let collides = slots.values().any(|existing| {
            existing.doctor_id == slot.doctor_id
                && existing.is_busy()
                && overlaps(
                    existing.start_time,
                    existing.end_time,
                    slot.start_time,
                    slot.end_time,
                )
        });
        if collides {
            return Err(StoreError::Conflict);
        }

        slots.insert(slot.id, slot.clone());
        Ok(slot)
    }

    async fn update(&self, id: Uuid, patch: SlotPatch) -> Result<Option<Slot>, StoreError> {
        let mut slots = self.inner.lock().unwrap();

        match slots.get_mut(&id) {
            Some(slot) => {
                patch.apply(slot);
                Ok(Some(slot.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut slots = self.inner.lock().unwrap();
        Ok(slots.remove(&id).is_some())
    }
}
