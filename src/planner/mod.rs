mod guard;
mod shift;
mod types;

pub use types::{JoinOutcome, PlanError, Transition};

use crate::context::RequestContext;
use crate::identity::Directory;
use crate::model::{Event, EventKind, Level, Person, PersonId, Rotation, RotationId, UserMap};
use crate::need::Need;
use crate::notification::{MessageRenderer, Notifier, TextMessages};
use crate::storage::{EntityStore, Storage};
use chrono::{DateTime, Utc};
use guard::Check;
use tracing::info;

/// Point d'entrée des opérations d'une requête : rotations, personnes, shifts.
pub struct Planner<'s> {
    ctx: RequestContext<'s>,
    notifier: &'s dyn Notifier,
    directory: &'s dyn Directory,
    renderer: &'s dyn MessageRenderer,
}

impl<'s> Planner<'s> {
    pub fn new(store: &'s dyn Storage, notifier: &'s dyn Notifier, directory: &'s dyn Directory) -> Self {
        Self {
            ctx: RequestContext::new(store),
            notifier,
            directory,
            renderer: &TextMessages,
        }
    }

    pub fn with_renderer(mut self, renderer: &'s dyn MessageRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn directory(&self) -> &'s dyn Directory {
        self.directory
    }

    fn store(&self) -> &'s dyn Storage {
        self.ctx.store()
    }

    /// Enregistre une nouvelle rotation ; ses compétences doivent être connues.
    pub fn add_rotation(&mut self, rotation: Rotation) -> Result<Rotation, PlanError> {
        if rotation.name.trim().is_empty() {
            return Err(PlanError::Other(anyhow::anyhow!("rotation name cannot be empty")));
        }
        match self.store().load_rotation(&rotation.id) {
            Ok(_) => return Err(PlanError::RotationExists(rotation.id.to_string())),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        let known = self.ctx.known_skills()?.clone();
        let checks: Vec<Check<'_>> = rotation
            .needs
            .iter()
            .map(|n| Check::KnownSkill {
                skill: &n.skill,
                known: &known,
            })
            .collect();
        guard::run(&checks)?;

        self.store().store_rotation(&rotation)?;
        self.ctx.register_rotation(&rotation)?;
        info!(rotation = %rotation.id, name = %rotation.name, period = %rotation.period, "rotation added");
        Ok(rotation)
    }

    pub fn load_rotation(&self, id: &RotationId) -> Result<Rotation, PlanError> {
        self.store().load_rotation(id).map_err(|e| {
            if e.is_not_found() {
                PlanError::UnknownRotation(id.to_string())
            } else {
                e.into()
            }
        })
    }

    /// Rotations connues, par id.
    pub fn list_rotations(&mut self) -> Result<Vec<(RotationId, String)>, PlanError> {
        let index = self.ctx.known_rotations()?;
        Ok(index.iter().map(|(id, name)| (id.clone(), name.clone())).collect())
    }

    /// Applique `edit` puis persiste ; les rotations archivées sont figées.
    pub fn update_rotation<F>(&mut self, id: &RotationId, edit: F) -> Result<Rotation, PlanError>
    where
        F: FnOnce(&mut Rotation),
    {
        let mut rotation = self.load_rotation(id)?;
        guard::run(&[Check::Active(&rotation)])?;
        edit(&mut rotation);
        self.store().store_rotation(&rotation)?;
        self.ctx.register_rotation(&rotation)?;
        self.ctx.invalidate(id);
        Ok(rotation)
    }

    pub fn archive_rotation(&mut self, id: &RotationId) -> Result<Rotation, PlanError> {
        let mut rotation = self.load_rotation(id)?;
        rotation.archived = true;
        self.store().store_rotation(&rotation)?;
        self.ctx.invalidate(id);
        info!(rotation = %id, "rotation archived");
        Ok(rotation)
    }

    pub fn add_need(&mut self, id: &RotationId, need: Need) -> Result<Rotation, PlanError> {
        let known = self.ctx.known_skills()?.clone();
        guard::run(&[Check::KnownSkill {
            skill: &need.skill,
            known: &known,
        }])?;
        if let Some(max) = need.max {
            if need.min > max {
                return Err(PlanError::InvalidNeed(need.to_string()));
            }
        }
        self.update_rotation(id, |r| r.upsert_need(need))
    }

    pub fn remove_need(&mut self, id: &RotationId, key: &str) -> Result<Rotation, PlanError> {
        self.update_rotation(id, |r| r.needs.retain(|n| n.key() != key))
    }

    /// Ajoute des membres ; un nouveau venu reçoit `from_shift - grace` comme
    /// dernier shift servi.
    pub fn add_members(
        &mut self,
        id: &RotationId,
        people: &[PersonId],
        from_shift: i64,
    ) -> Result<Rotation, PlanError> {
        let mut rotation = self.load_rotation(id)?;
        guard::run(&[Check::Active(&rotation)])?;
        for person_id in people {
            let mut person = self.ctx.load_person(person_id)?;
            if !person.last_served.contains_key(id) {
                person
                    .last_served
                    .insert(id.clone(), from_shift - i64::from(rotation.grace));
            }
            self.ctx.store_person(&person)?;
            rotation.members.insert(person_id.clone());
        }
        self.store().store_rotation(&rotation)?;
        self.ctx.invalidate(id);
        info!(rotation = %id, added = people.len(), "members added");
        Ok(rotation)
    }

    pub fn remove_members(&mut self, id: &RotationId, people: &[PersonId]) -> Result<Rotation, PlanError> {
        let mut rotation = self.load_rotation(id)?;
        for person_id in people {
            if !rotation.members.remove(person_id) {
                continue;
            }
            let mut person = self.ctx.load_person(person_id)?;
            person.last_served.remove(id);
            self.ctx.store_person(&person)?;
        }
        self.store().store_rotation(&rotation)?;
        self.ctx.invalidate(id);
        info!(rotation = %id, removed = people.len(), "members removed");
        Ok(rotation)
    }

    /// Copies détachées des membres de la rotation.
    pub fn members(&mut self, rotation: &Rotation) -> Result<UserMap, PlanError> {
        Ok(self.ctx.members(rotation)?.clone())
    }

    pub fn load_person(&self, id: &PersonId) -> Result<Person, PlanError> {
        Ok(self.ctx.load_person(id)?)
    }

    pub fn set_skill(&mut self, id: &PersonId, skill: &str, level: Level) -> Result<Person, PlanError> {
        let skill = skill.trim();
        if skill.is_empty() {
            return Err(PlanError::UnknownSkill(skill.to_string()));
        }
        let mut person = self.ctx.load_person(id)?;
        person.skills.insert(skill.to_string(), level);
        self.ctx.store_person(&person)?;
        self.ctx.add_known_skill(skill)?;
        Ok(person)
    }

    pub fn remove_skill(&mut self, id: &PersonId, skill: &str) -> Result<Person, PlanError> {
        let mut person = self.ctx.load_person(id)?;
        if person.skills.remove(skill).is_some() {
            self.ctx.store_person(&person)?;
        }
        Ok(person)
    }

    /// Déclare une indisponibilité personnelle `[start, end)`.
    pub fn add_unavailable(
        &mut self,
        id: &PersonId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Event, PlanError> {
        guard::run(&[Check::TimeRange { start, end }])?;
        let event = Event::personal(start, end).map_err(|_| PlanError::InvalidTimeRange)?;
        let mut person = self.ctx.load_person(id)?;
        person.add_event(event.clone());
        self.ctx.store_person(&person)?;
        Ok(event)
    }

    /// Supprime les indisponibilités personnelles qui chevauchent `[start, end)`.
    pub fn clear_unavailable(
        &mut self,
        id: &PersonId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<usize, PlanError> {
        let mut person = self.ctx.load_person(id)?;
        let before = person.events.len();
        person
            .events
            .retain(|e| !(e.kind == EventKind::Personal && e.overlaps(start, end)));
        let removed = before - person.events.len();
        if removed > 0 {
            self.ctx.store_person(&person)?;
        }
        Ok(removed)
    }
}
