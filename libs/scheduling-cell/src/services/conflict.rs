// libs/scheduling-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{SchedulingError, Slot};
use crate::services::store::{SlotFilter, SlotStore};

/// Half-open interval intersection: `[start1, end1)` and `[start2, end2)`
/// share at least one instant. A slot ending at T never collides with one
/// starting at T, which is what allows back-to-back scheduling.
pub fn overlaps(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && end1 > start2
}

/// Finds the busy slots on a doctor's timeline that collide with a candidate
/// interval.
pub struct ConflictChecker {
    slots: Arc<dyn SlotStore>,
}

impl ConflictChecker {
    pub fn new(slots: Arc<dyn SlotStore>) -> Self {
        Self { slots }
    }

    /// Non-`Free` slots for `doctor_id` overlapping `[start, end)`, excluding
    /// `exclude` (the slot being moved, when re-checking an update).
    pub async fn busy_overlaps(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Slot>, SchedulingError> {
        debug!(
            "Checking conflicts for doctor {} from {} to {}",
            doctor_id, start, end
        );

        let filter = SlotFilter {
            doctor_id: Some(doctor_id),
            from: Some(start),
            to: Some(end),
            ..Default::default()
        };

        let candidates = self
            .slots
            .list(&filter)
            .await
            .map_err(SchedulingError::from)?;

        let conflicting: Vec<Slot> = candidates
            .into_iter()
            .filter(|slot| {
                slot.is_busy()
                    && Some(slot.id) != exclude
                    && overlaps(slot.start_time, slot.end_time, start, end)
            })
            .collect();

        if !conflicting.is_empty() {
            warn!(
                "Conflict detected for doctor {} - {} colliding slots",
                doctor_id,
                conflicting.len()
            );
        }

        Ok(conflicting)
    }
}
