use crate::need::Need;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifiant fort pour Person
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersonId(String);

impl PersonId {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifiant fort pour Rotation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RotationId(String);

impl RotationId {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Niveau de compétence ordinal (1 à 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Beginner = 1,
    Intermediate = 2,
    Advanced = 3,
    Expert = 4,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
            Level::Expert => "expert",
        };
        f.write_str(s)
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "beginner" | "b" => Ok(Level::Beginner),
            "2" | "intermediate" | "i" => Ok(Level::Intermediate),
            "3" | "advanced" | "a" => Ok(Level::Advanced),
            "4" | "expert" | "e" => Ok(Level::Expert),
            other => Err(format!("invalid level: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Indisponibilité personnelle, toutes rotations confondues.
    Personal,
    /// Générée à l'entrée dans un shift.
    Shift,
}

/// Événement du calendrier d'une personne (intervalle UTC [start, end)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub kind: EventKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<RotationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift_number: Option<i64>,
}

impl Event {
    pub fn personal(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, String> {
        if end <= start {
            return Err("event end must be after start".to_string());
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            kind: EventKind::Personal,
            start,
            end,
            rotation: None,
            shift_number: None,
        })
    }

    pub fn shift(
        rotation: &RotationId,
        shift_number: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("{}#{}", rotation.as_str(), shift_number),
            kind: EventKind::Shift,
            start,
            end,
            rotation: Some(rotation.clone()),
            shift_number: Some(shift_number),
        }
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }

    /// Vrai si l'événement rend la personne indisponible pour `rotation`.
    pub fn blocks(&self, rotation: &RotationId) -> bool {
        match self.kind {
            EventKind::Personal => true,
            EventKind::Shift => self.rotation.as_ref() == Some(rotation),
        }
    }
}

/// Personne (membre de rotation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    #[serde(default)]
    pub skills: BTreeMap<String, Level>,
    #[serde(default)]
    pub last_served: BTreeMap<RotationId, i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,
}

impl Person {
    pub fn new(id: PersonId) -> Self {
        Self {
            id,
            skills: BTreeMap::new(),
            last_served: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn with_skill<S: Into<String>>(mut self, skill: S, level: Level) -> Self {
        self.skills.insert(skill.into(), level);
        self
    }

    pub fn level(&self, skill: &str) -> Option<Level> {
        self.skills.get(skill).copied()
    }

    /// Dernier shift servi ; -1 si jamais servi.
    pub fn last_served(&self, rotation: &RotationId) -> i64 {
        self.last_served.get(rotation).copied().unwrap_or(-1)
    }

    /// Enregistre `shift_number` comme dernier shift servi, même s'il est
    /// antérieur à la valeur d'entrée d'un nouveau membre.
    pub fn mark_served(&mut self, rotation: &RotationId, shift_number: i64) {
        self.last_served.insert(rotation.clone(), shift_number);
    }

    /// Insère en conservant l'ordre chronologique ; remplace un événement de même id.
    pub fn add_event(&mut self, event: Event) {
        self.events.retain(|e| e.id != event.id);
        let pos = self.events.partition_point(|e| e.start <= event.start);
        self.events.insert(pos, event);
    }

    pub fn is_available(&self, rotation: &RotationId, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        !self
            .events
            .iter()
            .any(|e| e.blocks(rotation) && e.overlaps(start, end))
    }
}

/// Ensemble de personnes détachées, indexé par id (ordre stable).
pub type UserMap = BTreeMap<PersonId, Person>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Weekly,
    Biweekly,
    Monthly,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Period::Weekly => "weekly",
            Period::Biweekly => "biweekly",
            Period::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" | "1w" => Ok(Period::Weekly),
            "biweekly" | "2w" => Ok(Period::Biweekly),
            "monthly" | "1m" => Ok(Period::Monthly),
            other => Err(format!("invalid period: {other}")),
        }
    }
}

/// Stratégie d'allocation de la rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationKind {
    #[default]
    Lottery,
    Queue,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutopilotSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub start_finish: bool,
    #[serde(default)]
    pub fill: bool,
    #[serde(default)]
    pub fill_prior_days: u32,
    #[serde(default)]
    pub notify: bool,
    #[serde(default)]
    pub notify_prior_days: u32,
}

/// Rotation : groupe d'astreinte périodique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rotation {
    pub id: RotationId,
    pub name: String,
    #[serde(default)]
    pub archived: bool,
    pub period: Period,
    pub start: NaiveDate,
    pub size: u32,
    #[serde(default)]
    pub grace: u32,
    #[serde(default)]
    pub kind: RotationKind,
    #[serde(default)]
    pub needs: Vec<Need>,
    #[serde(default)]
    pub autopilot: AutopilotSettings,
    #[serde(default)]
    pub members: BTreeSet<PersonId>,
}

impl Rotation {
    pub fn new<N: Into<String>>(name: N, period: Period, start: NaiveDate, size: u32) -> Self {
        Self {
            id: RotationId::random(),
            name: name.into(),
            archived: false,
            period,
            start,
            size,
            grace: 0,
            kind: RotationKind::default(),
            needs: Vec::new(),
            autopilot: AutopilotSettings::default(),
            members: BTreeSet::new(),
        }
    }

    /// Remplace un besoin de même clé (compétence + niveau) ou l'ajoute.
    pub fn upsert_need(&mut self, need: Need) {
        match self.needs.iter_mut().find(|n| n.key() == need.key()) {
            Some(existing) => *existing = need,
            None => self.needs.push(need),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftStatus {
    Open,
    Started,
    Finished,
}

impl fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShiftStatus::Open => "open",
            ShiftStatus::Started => "started",
            ShiftStatus::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Horodatages d'idempotence du pilote automatique.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutopilotMarks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified_start_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified_finish_at: Option<DateTime<Utc>>,
}

/// Shift : occurrence numérotée d'une rotation (UTC [start, end)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub rotation: RotationId,
    pub number: i64,
    pub status: ShiftStatus,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub members: BTreeSet<PersonId>,
    #[serde(default)]
    pub autopilot: AutopilotMarks,
}

impl Shift {
    pub fn open(rotation: RotationId, number: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            rotation,
            number,
            status: ShiftStatus::Open,
            start,
            end,
            members: BTreeSet::new(),
            autopilot: AutopilotMarks::default(),
        }
    }
}
