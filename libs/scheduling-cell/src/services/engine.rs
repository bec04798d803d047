// libs/scheduling-cell/src/services/engine.rs
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::auth::Role;

use crate::models::{
    CancelOutcome, Caller, CompleteAppointmentRequest, CreateSlotRequest, RescheduleSlotRequest,
    SchedulingError, Slot, SlotQuery, SlotStatus, UpdateSlotRequest, MAX_SLOT_MINUTES,
    MIN_SLOT_MINUTES,
};
use crate::services::conflict::ConflictChecker;
use crate::services::permissions::{self, Operation};
use crate::services::records::DocumentStore;
use crate::services::store::{SlotFilter, SlotPatch, SlotStore};

/// Per-doctor serialization of the overlap-check-then-write critical
/// section. Two racing requests against one doctor's timeline queue here;
/// requests for different doctors never contend.
#[derive(Default)]
struct DoctorLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl DoctorLocks {
    fn for_doctor(&self, doctor_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.lock().unwrap();
        locks
            .entry(doctor_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Validates the duration bound and derives the half-open slot window.
fn slot_window(
    start: DateTime<Utc>,
    duration_minutes: i64,
) -> Result<(DateTime<Utc>, DateTime<Utc>), SchedulingError> {
    if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&duration_minutes) {
        return Err(SchedulingError::InvalidInput(format!(
            "duration must be between {} and {} minutes, got {}",
            MIN_SLOT_MINUTES, MAX_SLOT_MINUTES, duration_minutes
        )));
    }

    Ok((start, start + Duration::minutes(duration_minutes)))
}

/// Executes every state-changing operation on appointment slots: permission
/// gate first, then state and input validation, then the overlap check and a
/// single write under the owning doctor's lock.
pub struct SchedulingEngine {
    slots: Arc<dyn SlotStore>,
    records: Arc<dyn DocumentStore>,
    conflicts: ConflictChecker,
    doctor_locks: DoctorLocks,
}

impl SchedulingEngine {
    pub fn new(slots: Arc<dyn SlotStore>, records: Arc<dyn DocumentStore>) -> Self {
        let conflicts = ConflictChecker::new(Arc::clone(&slots));
        Self {
            slots,
            records,
            conflicts,
            doctor_locks: DoctorLocks::default(),
        }
    }

    async fn load(&self, id: Uuid) -> Result<Slot, SchedulingError> {
        debug!("Fetching slot: {}", id);
        self.slots.get(id).await?.ok_or(SchedulingError::NotFound)
    }

    /// Create a bookable window, or book one directly when a patient is
    /// attached. Patients may only create slots for themselves.
    pub async fn create_slot(
        &self,
        caller: &Caller,
        request: CreateSlotRequest,
    ) -> Result<Slot, SchedulingError> {
        let (start, end) = slot_window(request.start_time, request.duration_minutes)?;

        let patient_id = match caller.role {
            Role::Doctor => {
                if request.doctor_id != caller.id {
                    return Err(SchedulingError::Unauthorized);
                }
                request.patient_id
            }
            Role::Admin => request.patient_id,
            Role::Patient => match request.patient_id {
                None => Some(caller.id),
                Some(id) if id == caller.id => Some(id),
                Some(_) => return Err(SchedulingError::Unauthorized),
            },
        };

        let status = if patient_id.is_some() {
            SlotStatus::Booked
        } else {
            SlotStatus::Free
        };

        let now = Utc::now();
        let slot = Slot {
            id: Uuid::new_v4(),
            doctor_id: request.doctor_id,
            patient_id,
            start_time: start,
            end_time: end,
            title: patient_id.is_some().then_some(request.title).flatten(),
            symptoms: patient_id.is_some().then_some(request.symptoms).flatten(),
            status,
            medical_record_id: None,
            created_at: now,
            updated_at: now,
        };

        let lock = self.doctor_locks.for_doctor(request.doctor_id);
        let _guard = lock.lock().await;

        let colliding = self
            .conflicts
            .busy_overlaps(request.doctor_id, start, end, None)
            .await?;
        if !colliding.is_empty() {
            return Err(SchedulingError::SlotConflict);
        }

        let created = self.slots.create(slot).await?;
        info!(
            "Slot {} created for doctor {} ({} - {}, {})",
            created.id, created.doctor_id, created.start_time, created.end_time, created.status
        );
        Ok(created)
    }

    /// General field update including the one status transition it may carry
    /// (booking a free slot). Time changes recompute the end time and re-run
    /// the overlap check.
    pub async fn update_slot(
        &self,
        caller: &Caller,
        id: Uuid,
        request: UpdateSlotRequest,
    ) -> Result<Slot, SchedulingError> {
        let slot = self.load(id).await?;
        permissions::authorize(caller, Operation::Update, &slot)?;
        self.apply_update(caller, slot, request).await
    }

    /// Move a slot to a new window. Sugar over the update path restricted to
    /// the time fields.
    pub async fn reschedule_slot(
        &self,
        caller: &Caller,
        id: Uuid,
        request: RescheduleSlotRequest,
    ) -> Result<Slot, SchedulingError> {
        let slot = self.load(id).await?;
        permissions::authorize(caller, Operation::Reschedule, &slot)?;

        self.apply_update(
            caller,
            slot,
            UpdateSlotRequest {
                start_time: Some(request.new_start_time),
                duration_minutes: request.new_duration_minutes,
                ..Default::default()
            },
        )
        .await
    }

    async fn apply_update(
        &self,
        caller: &Caller,
        slot: Slot,
        request: UpdateSlotRequest,
    ) -> Result<Slot, SchedulingError> {
        // A patient touching a free slot is claiming it; nothing else.
        if caller.role == Role::Patient
            && slot.status == SlotStatus::Free
            && request.status != Some(SlotStatus::Booked)
        {
            return Err(SchedulingError::Unauthorized);
        }

        let new_status = request.status.unwrap_or(slot.status);
        let status_changing = new_status != slot.status;
        if status_changing && !permissions::update_transition_allowed(slot.status, new_status) {
            return Err(SchedulingError::InvalidTransition {
                from: slot.status,
                to: new_status,
            });
        }

        let new_patient = if status_changing {
            match caller.role {
                Role::Patient => match request.patient_id {
                    None => Some(caller.id),
                    Some(id) if id == caller.id => Some(id),
                    Some(_) => return Err(SchedulingError::Unauthorized),
                },
                // Doctors and admins book on a patient's behalf.
                _ => request.patient_id.or(slot.patient_id),
            }
        } else {
            // Attachment changes ride on the booking transition only.
            match request.patient_id {
                Some(id) if Some(id) != slot.patient_id => {
                    return Err(SchedulingError::InvalidInput(
                        "a patient can only be attached by booking a free slot".to_string(),
                    ));
                }
                _ => slot.patient_id,
            }
        };

        if new_status == SlotStatus::Booked && new_patient.is_none() {
            return Err(SchedulingError::InvalidInput(
                "booking requires a patient".to_string(),
            ));
        }

        let time_changing = request.start_time.is_some() || request.duration_minutes.is_some();
        let start = request.start_time.unwrap_or(slot.start_time);
        let duration = request
            .duration_minutes
            .unwrap_or_else(|| slot.duration_minutes());
        let (new_start, new_end) = slot_window(start, duration)?;

        let mut patch = SlotPatch {
            updated_at: Some(Utc::now()),
            ..Default::default()
        };
        if time_changing {
            patch.start_time = Some(new_start);
            patch.end_time = Some(new_end);
        }
        if status_changing {
            patch.status = Some(new_status);
            patch.patient_id = Some(new_patient);
        }
        if let Some(title) = request.title {
            patch.title = Some(Some(title));
        }
        if let Some(symptoms) = request.symptoms {
            patch.symptoms = Some(Some(symptoms));
        }

        let becoming_busy = status_changing && new_status != SlotStatus::Free;

        let lock = self.doctor_locks.for_doctor(slot.doctor_id);
        let _guard = lock.lock().await;

        if time_changing || becoming_busy {
            let colliding = self
                .conflicts
                .busy_overlaps(slot.doctor_id, new_start, new_end, Some(slot.id))
                .await?;
            if !colliding.is_empty() {
                return Err(SchedulingError::SlotConflict);
            }
        }

        let updated = self
            .slots
            .update(slot.id, patch)
            .await?
            .ok_or(SchedulingError::NotFound)?;

        info!("Slot {} updated ({})", updated.id, updated.status);
        Ok(updated)
    }

    /// The patient arrived: `Booked -> Occupied`.
    pub async fn confirm_arrival(
        &self,
        caller: &Caller,
        id: Uuid,
    ) -> Result<Slot, SchedulingError> {
        let slot = self.load(id).await?;
        permissions::authorize(caller, Operation::ConfirmArrival, &slot)?;

        if slot.patient_id.is_none() {
            return Err(SchedulingError::InvalidState(slot.status));
        }

        let patch = SlotPatch {
            status: Some(SlotStatus::Occupied),
            updated_at: Some(Utc::now()),
            ..Default::default()
        };

        let updated = self
            .slots
            .update(slot.id, patch)
            .await?
            .ok_or(SchedulingError::NotFound)?;

        info!("Arrival confirmed for slot {}", updated.id);
        Ok(updated)
    }

    /// Terminal transition to `Occupied` that also attaches the consultation
    /// notes. Re-invocation overwrites the notes and is otherwise a no-op.
    pub async fn complete_appointment(
        &self,
        caller: &Caller,
        id: Uuid,
        request: CompleteAppointmentRequest,
    ) -> Result<Slot, SchedulingError> {
        let slot = self.load(id).await?;
        permissions::authorize(caller, Operation::Complete, &slot)?;

        if slot.patient_id.is_none() {
            return Err(SchedulingError::InvalidState(slot.status));
        }

        let record_id = match slot.medical_record_id {
            Some(record_id) => {
                self.records
                    .update_notes(record_id, &request.doctor_notes)
                    .await?;
                record_id
            }
            None => {
                self.records
                    .attach(slot.id, &request.doctor_notes)
                    .await?
                    .id
            }
        };

        let patch = SlotPatch {
            status: Some(SlotStatus::Occupied),
            medical_record_id: Some(Some(record_id)),
            updated_at: Some(Utc::now()),
            ..Default::default()
        };

        let updated = self
            .slots
            .update(slot.id, patch)
            .await?
            .ok_or(SchedulingError::NotFound)?;

        info!(
            "Appointment {} completed with medical record {}",
            updated.id, record_id
        );
        Ok(updated)
    }

    /// The patient did not attend: `Booked -> Free`, releasing the window.
    pub async fn mark_no_show(&self, caller: &Caller, id: Uuid) -> Result<Slot, SchedulingError> {
        let slot = self.load(id).await?;
        permissions::authorize(caller, Operation::MarkNoShow, &slot)?;

        let released = self.release(slot.id).await?;
        info!("Slot {} marked no-show and released", released.id);
        Ok(released)
    }

    /// Role-dependent cancellation: patients release their booking back to
    /// availability, doctors release bookings or remove their own free
    /// windows, admins remove the slot outright.
    pub async fn cancel_slot(
        &self,
        caller: &Caller,
        id: Uuid,
    ) -> Result<CancelOutcome, SchedulingError> {
        let slot = self.load(id).await?;
        permissions::authorize(caller, Operation::Cancel, &slot)?;

        let delete = match caller.role {
            Role::Patient => false,
            Role::Doctor => slot.status == SlotStatus::Free,
            Role::Admin => true,
        };

        if delete {
            if !self.slots.delete(slot.id).await? {
                return Err(SchedulingError::NotFound);
            }
            info!("Slot {} deleted by {}", slot.id, caller.role);
            Ok(CancelOutcome::Deleted { slot_id: slot.id })
        } else {
            let released = self.release(slot.id).await?;
            info!("Slot {} cancelled and released", released.id);
            Ok(CancelOutcome::Released { slot: released })
        }
    }

    async fn release(&self, id: Uuid) -> Result<Slot, SchedulingError> {
        let patch = SlotPatch {
            status: Some(SlotStatus::Free),
            patient_id: Some(None),
            title: Some(None),
            symptoms: Some(None),
            updated_at: Some(Utc::now()),
            ..Default::default()
        };

        self.slots
            .update(id, patch)
            .await?
            .ok_or(SchedulingError::NotFound)
    }

    /// Listing with forced scope: patients see their own appointments,
    /// doctors their own timeline, admins anything.
    pub async fn list_slots(
        &self,
        caller: &Caller,
        query: SlotQuery,
    ) -> Result<Vec<Slot>, SchedulingError> {
        let filter = match caller.role {
            Role::Patient => SlotFilter {
                doctor_id: query.doctor_id,
                patient_id: Some(caller.id),
                from: query.from,
                to: query.to,
            },
            Role::Doctor => SlotFilter {
                doctor_id: Some(caller.id),
                patient_id: query.patient_id,
                from: query.from,
                to: query.to,
            },
            Role::Admin => SlotFilter {
                doctor_id: query.doctor_id,
                patient_id: query.patient_id,
                from: query.from,
                to: query.to,
            },
        };

        Ok(self.slots.list(&filter).await?)
    }

    /// Single-slot read with the same visibility rule as listing.
    pub async fn get_slot(&self, caller: &Caller, id: Uuid) -> Result<Slot, SchedulingError> {
        let slot = self.load(id).await?;
        permissions::authorize(caller, Operation::View, &slot)?;
        Ok(slot)
    }
}
