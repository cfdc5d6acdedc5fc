use crate::autofill::AllocError;
use crate::model::{PersonId, Shift, ShiftStatus};
use crate::storage::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("invalid period: {0}")]
    InvalidPeriod(String),
    #[error("invalid time range: end must be after start")]
    InvalidTimeRange,
    #[error("invalid shift number: {0}")]
    InvalidShiftNumber(i64),
    #[error("invalid need: {0}")]
    InvalidNeed(String),
    #[error("unknown skill: {0}")]
    UnknownSkill(String),
    #[error("unknown rotation: {0}")]
    UnknownRotation(String),
    #[error("rotation already exists: {0}")]
    RotationExists(String),
    #[error("rotation {0} is archived")]
    RotationArchived(String),
    #[error("shift {number} of rotation {rotation} does not exist")]
    NoShift { rotation: String, number: i64 },
    #[error("shift {number} of rotation {rotation} already exists")]
    ShiftExists { rotation: String, number: i64 },
    #[error("shift {number} is {status}, expected {expected}")]
    WrongStatus {
        number: i64,
        status: ShiftStatus,
        expected: ShiftStatus,
    },
    #[error("rotation size exceeded: {size}")]
    SizeExceeded { size: u32 },
    #[error(transparent)]
    Allocation(#[from] AllocError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlanError {
    /// Erreur de validation (jamais rejouée).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PlanError::InvalidDate(_)
                | PlanError::InvalidPeriod(_)
                | PlanError::InvalidTimeRange
                | PlanError::InvalidShiftNumber(_)
                | PlanError::InvalidNeed(_)
                | PlanError::UnknownSkill(_)
        )
    }

    /// Violation du cycle de vie d'un shift.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            PlanError::ShiftExists { .. }
                | PlanError::WrongStatus { .. }
                | PlanError::SizeExceeded { .. }
                | PlanError::RotationArchived(_)
        )
    }
}

/// Résultat d'une transition ; `changed == false` pour un no-op idempotent.
#[derive(Debug, Clone)]
pub struct Transition {
    pub shift: Shift,
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub shift: Shift,
    pub added: Vec<PersonId>,
    /// Déjà membres : ignorés sans erreur.
    pub skipped: Vec<PersonId>,
}
