//! Préconditions exécutées en séquence avant le corps d'une opération ;
//! la première qui échoue interrompt la chaîne.

use super::PlanError;
use crate::model::{Rotation, Shift, ShiftStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

pub(super) enum Check<'a> {
    Active(&'a Rotation),
    ShiftNumber(i64),
    Status {
        shift: &'a Shift,
        expected: ShiftStatus,
    },
    Capacity {
        rotation: &'a Rotation,
        current: usize,
        adding: usize,
    },
    KnownSkill {
        skill: &'a str,
        known: &'a BTreeSet<String>,
    },
    TimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl Check<'_> {
    fn run(&self) -> Result<(), PlanError> {
        match self {
            Check::Active(rotation) if rotation.archived => {
                Err(PlanError::RotationArchived(rotation.id.to_string()))
            }
            Check::ShiftNumber(n) if *n < 0 => Err(PlanError::InvalidShiftNumber(*n)),
            Check::Status { shift, expected } if shift.status != *expected => Err(PlanError::WrongStatus {
                number: shift.number,
                status: shift.status,
                expected: *expected,
            }),
            Check::Capacity {
                rotation,
                current,
                adding,
            } if rotation.size > 0 && current + adding > rotation.size as usize => {
                Err(PlanError::SizeExceeded { size: rotation.size })
            }
            Check::KnownSkill { skill, known } if !known.contains(*skill) => {
                Err(PlanError::UnknownSkill(skill.to_string()))
            }
            Check::TimeRange { start, end } if end <= start => Err(PlanError::InvalidTimeRange),
            _ => Ok(()),
        }
    }
}

pub(super) fn run(checks: &[Check<'_>]) -> Result<(), PlanError> {
    checks.iter().try_for_each(Check::run)
}
