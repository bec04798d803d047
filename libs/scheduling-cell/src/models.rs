// libs/scheduling-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::auth::{Role, User};

// ==============================================================================
// CORE SLOT MODELS
// ==============================================================================

/// Shortest bookable consultation window, in minutes.
pub const MIN_SLOT_MINUTES: i64 = 30;
/// Longest bookable consultation window, in minutes.
pub const MAX_SLOT_MINUTES: i64 = 180;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub title: Option<String>,
    pub symptoms: Option<String>,
    pub status: SlotStatus,
    pub medical_record_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    /// A slot participates in overlap conflicts only while it is not `Free`.
    pub fn is_busy(&self) -> bool {
        self.status != SlotStatus::Free
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Free,
    Booked,
    Occupied,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Free => write!(f, "free"),
            SlotStatus::Booked => write!(f, "booked"),
            SlotStatus::Occupied => write!(f, "occupied"),
        }
    }
}

/// Medical-record document attached to a completed appointment. The notes
/// text is opaque to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// CALLER IDENTITY
// ==============================================================================

/// Resolved caller identity. The engine never sees credentials; the HTTP
/// boundary hands it this pair and nothing else.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn patient(id: Uuid) -> Self {
        Self { id, role: Role::Patient }
    }

    pub fn doctor(id: Uuid) -> Self {
        Self { id, role: Role::Doctor }
    }

    pub fn admin(id: Uuid) -> Self {
        Self { id, role: Role::Admin }
    }
}

impl TryFrom<&User> for Caller {
    type Error = String;

    fn try_from(user: &User) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&user.id)
            .map_err(|_| format!("caller id is not a valid profile id: {}", user.id))?;
        let role = user
            .role
            .as_deref()
            .ok_or_else(|| "caller has no role".to_string())?
            .parse::<Role>()?;

        Ok(Caller { id, role })
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotRequest {
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub patient_id: Option<Uuid>,
    pub title: Option<String>,
    pub symptoms: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSlotRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub title: Option<String>,
    pub symptoms: Option<String>,
    pub status: Option<SlotStatus>,
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleSlotRequest {
    pub new_start_time: DateTime<Utc>,
    pub new_duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteAppointmentRequest {
    pub doctor_notes: String,
}

/// Listing filters. Patients and doctors are forced onto their own profile
/// id by the engine regardless of what they pass here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotQuery {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// What cancellation did to the slot: released back to availability, or
/// removed outright.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    Released { slot: Slot },
    Deleted { slot_id: Uuid },
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulingError {
    #[error("Not authorized to perform this operation on the slot")]
    Unauthorized,

    #[error("Slot not found")]
    NotFound,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Requested interval conflicts with an existing booking")]
    SlotConflict,

    #[error("Operation not permitted while slot is {0}")]
    InvalidState(SlotStatus),

    #[error("Status change {from} -> {to} is not allowed")]
    InvalidTransition { from: SlotStatus, to: SlotStatus },

    #[error("Store failure: {0}")]
    Store(String),
}
