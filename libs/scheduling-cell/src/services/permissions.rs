// libs/scheduling-cell/src/services/permissions.rs
//
// Single declarative access table for every engine operation on an existing
// slot, keyed by (role, operation). Each row carries the scope the caller
// must have over the slot and the statuses the operation may start from.
// Wrong scope is Unauthorized; right scope from a wrong status is
// InvalidState.

use shared_models::auth::Role;

use crate::models::{Caller, SchedulingError, Slot, SlotStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    View,
    Update,
    Reschedule,
    ConfirmArrival,
    Complete,
    MarkNoShow,
    Cancel,
}

/// Relationship the caller must have to the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Caller is the attached patient, or is claiming a `Free` slot (the
    /// booking transition attaching themself).
    AttachedOrClaimingPatient,
    /// Caller is the attached patient.
    AttachedPatient,
    /// Caller owns the slot's doctor profile.
    OwningDoctor,
    /// No relationship required.
    Any,
}

const ALL: &[SlotStatus] = &[SlotStatus::Free, SlotStatus::Booked, SlotStatus::Occupied];
const NOT_OCCUPIED: &[SlotStatus] = &[SlotStatus::Free, SlotStatus::Booked];
const BOOKED: &[SlotStatus] = &[SlotStatus::Booked];
const BUSY: &[SlotStatus] = &[SlotStatus::Booked, SlotStatus::Occupied];

const ACCESS_TABLE: &[(Role, Operation, Scope, &[SlotStatus])] = &[
    (Role::Patient, Operation::View, Scope::AttachedPatient, ALL),
    (Role::Doctor, Operation::View, Scope::OwningDoctor, ALL),
    (Role::Admin, Operation::View, Scope::Any, ALL),
    (Role::Patient, Operation::Update, Scope::AttachedOrClaimingPatient, NOT_OCCUPIED),
    (Role::Doctor, Operation::Update, Scope::OwningDoctor, ALL),
    (Role::Admin, Operation::Update, Scope::Any, ALL),
    (Role::Patient, Operation::Reschedule, Scope::AttachedPatient, BOOKED),
    (Role::Doctor, Operation::Reschedule, Scope::OwningDoctor, NOT_OCCUPIED),
    (Role::Admin, Operation::Reschedule, Scope::Any, NOT_OCCUPIED),
    (Role::Doctor, Operation::ConfirmArrival, Scope::OwningDoctor, BOOKED),
    (Role::Admin, Operation::ConfirmArrival, Scope::Any, BOOKED),
    // Completion is the owning doctor's act alone: it writes their notes.
    (Role::Doctor, Operation::Complete, Scope::OwningDoctor, BUSY),
    (Role::Doctor, Operation::MarkNoShow, Scope::OwningDoctor, BOOKED),
    (Role::Admin, Operation::MarkNoShow, Scope::Any, BOOKED),
    (Role::Patient, Operation::Cancel, Scope::AttachedPatient, NOT_OCCUPIED),
    (Role::Doctor, Operation::Cancel, Scope::OwningDoctor, NOT_OCCUPIED),
    (Role::Admin, Operation::Cancel, Scope::Any, ALL),
];

/// Gate consulted once at the top of every engine operation on an existing
/// slot.
pub fn authorize(caller: &Caller, op: Operation, slot: &Slot) -> Result<(), SchedulingError> {
    let row = ACCESS_TABLE
        .iter()
        .find(|(role, operation, _, _)| *role == caller.role && *operation == op);

    let Some((_, _, scope, statuses)) = row else {
        return Err(SchedulingError::Unauthorized);
    };

    let in_scope = match scope {
        Scope::AttachedPatient => slot.patient_id == Some(caller.id),
        Scope::AttachedOrClaimingPatient => {
            slot.patient_id == Some(caller.id) || slot.status == SlotStatus::Free
        }
        Scope::OwningDoctor => slot.doctor_id == caller.id,
        Scope::Any => true,
    };

    if !in_scope {
        return Err(SchedulingError::Unauthorized);
    }

    if !statuses.contains(&slot.status) {
        return Err(SchedulingError::InvalidState(slot.status));
    }

    Ok(())
}

/// Status transitions `update_slot` may request. Everything outside this
/// table is rejected; the dedicated operations (confirm, complete, no-show,
/// cancel) own the remaining lifecycle edges.
pub fn update_transition_allowed(from: SlotStatus, to: SlotStatus) -> bool {
    matches!((from, to), (SlotStatus::Free, SlotStatus::Booked))
}
