use crate::model::{PersonId, RotationId, UserMap};
use crate::need::Need;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Cause d'un échec d'allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AllocErrorKind {
    InsufficientForNeeds,
    InsufficientForSize,
    SizeExceeded,
}

impl fmt::Display for AllocErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllocErrorKind::InsufficientForNeeds => "insufficient for needs",
            AllocErrorKind::InsufficientForSize => "insufficient for size",
            AllocErrorKind::SizeExceeded => "size exceeded",
        };
        f.write_str(s)
    }
}

/// Échec d'allocation : résultat attendu, pas un bug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("shift {shift_number}: {kind}{}", describe(.need, .unmet_needs, .unmet_capacity))]
pub struct AllocError {
    pub kind: AllocErrorKind,
    pub need: Option<Need>,
    pub unmet_needs: Vec<Need>,
    pub unmet_capacity: usize,
    pub shift_number: i64,
}

fn describe(need: &Option<Need>, unmet: &[Need], capacity: &usize) -> String {
    let mut out = String::new();
    if let Some(need) = need {
        out.push_str(&format!(", need {need}"));
    }
    if !unmet.is_empty() {
        let list: Vec<String> = unmet.iter().map(Need::to_string).collect();
        out.push_str(&format!(", unmet [{}]", list.join("; ")));
    }
    if *capacity > 0 {
        out.push_str(&format!(", {capacity} seat(s) unfilled"));
    }
    out
}

/// Entrée d'une allocation pour un shift donné.
#[derive(Debug, Clone)]
pub struct FillRequest<'a> {
    pub rotation: &'a RotationId,
    pub size: usize,
    pub needs: &'a [Need],
    pub pool: &'a UserMap,
    pub chosen: &'a UserMap,
    pub shift_number: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Personnes retenues par une allocation, y compris celles déjà choisies.
pub type Selection = Vec<PersonId>;
