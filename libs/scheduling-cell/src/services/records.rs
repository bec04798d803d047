// libs/scheduling-cell/src/services/records.rs
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use shared_database::postgrest::PostgrestClient;

use crate::models::MedicalRecord;
use crate::services::store::StoreError;

const RECORDS_TABLE: &str = "medical_records";

/// Storage for the opaque consultation document attached to a completed
/// appointment. One record per slot; the engine tracks the reference on the
/// slot itself.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn attach(&self, slot_id: Uuid, notes: &str) -> Result<MedicalRecord, StoreError>;

    async fn update_notes(&self, record_id: Uuid, notes: &str)
        -> Result<MedicalRecord, StoreError>;
}

pub struct PostgrestDocumentStore {
    client: Arc<PostgrestClient>,
}

impl PostgrestDocumentStore {
    pub fn new(client: Arc<PostgrestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentStore for PostgrestDocumentStore {
    async fn attach(&self, slot_id: Uuid, notes: &str) -> Result<MedicalRecord, StoreError> {
        debug!("Attaching medical record to slot {}", slot_id);

        let now = Utc::now();
        let body = json!({
            "id": Uuid::new_v4(),
            "slot_id": slot_id,
            "notes": notes,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let rows: Vec<MedicalRecord> = self.client.insert(RECORDS_TABLE, body).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("insert returned no representation".to_string()))
    }

    async fn update_notes(
        &self,
        record_id: Uuid,
        notes: &str,
    ) -> Result<MedicalRecord, StoreError> {
        debug!("Updating medical record {}", record_id);

        let body = json!({
            "notes": notes,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let rows: Vec<MedicalRecord> = self
            .client
            .update(RECORDS_TABLE, &format!("id=eq.{}", record_id), body)
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend(format!("medical record {} not found", record_id)))
    }
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    inner: Mutex<HashMap<Uuid, MedicalRecord>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, record_id: Uuid) -> Option<MedicalRecord> {
        self.inner.lock().unwrap().get(&record_id).cloned()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn attach(&self, slot_id: Uuid, notes: &str) -> Result<MedicalRecord, StoreError> {
        let now = Utc::now();
        let record = MedicalRecord {
            id: Uuid::new_v4(),
            slot_id,
            notes: notes.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.inner.lock().unwrap().insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_notes(
        &self,
        record_id: Uuid,
        notes: &str,
    ) -> Result<MedicalRecord, StoreError> {
        let mut records = self.inner.lock().unwrap();

        let record = records
            .get_mut(&record_id)
            .ok_or_else(|| StoreError::Backend(format!("medical record {} not found", record_id)))?;

        record.notes = notes.to_string();
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}
