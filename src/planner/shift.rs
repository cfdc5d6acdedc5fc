use super::guard::{self, Check};
use super::{JoinOutcome, PlanError, Planner, Transition};
use crate::autofill::{strategy_for, FillRequest};
use crate::model::{Event, PersonId, Rotation, RotationId, Shift, ShiftStatus, UserMap};
use crate::notification::{notify_members, ShiftNotice};
use crate::storage::EntityStore;
use rand::RngCore;
use std::collections::BTreeSet;
use tracing::{debug, info};

impl<'s> Planner<'s> {
    pub fn load_shift(&self, rotation: &RotationId, number: i64) -> Result<Shift, PlanError> {
        self.store().load_shift(rotation, number).map_err(|e| {
            if e.is_not_found() {
                PlanError::NoShift {
                    rotation: rotation.to_string(),
                    number,
                }
            } else {
                e.into()
            }
        })
    }

    /// Shift persisté, ou `None` s'il n'a jamais été ouvert.
    pub fn find_shift(&self, rotation: &RotationId, number: i64) -> Result<Option<Shift>, PlanError> {
        match self.load_shift(rotation, number) {
            Ok(shift) => Ok(Some(shift)),
            Err(PlanError::NoShift { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn open_shift(&mut self, id: &RotationId, number: i64) -> Result<Shift, PlanError> {
        let rotation = self.load_rotation(id)?;
        guard::run(&[Check::Active(&rotation), Check::ShiftNumber(number)])?;
        if self.find_shift(id, number)?.is_some() {
            return Err(PlanError::ShiftExists {
                rotation: id.to_string(),
                number,
            });
        }
        let (start, end) = rotation
            .shift_dates_for_number(number)
            .ok_or(PlanError::InvalidShiftNumber(number))?;
        let shift = Shift::open(id.clone(), number, start, end);
        self.store().store_shift(&shift)?;
        info!(rotation = %id, shift = number, %start, %end, "shift opened");
        Ok(shift)
    }

    /// Ajoute des personnes à un shift ouvert. Les membres existants sont ignorés.
    pub fn join_shift(
        &mut self,
        id: &RotationId,
        number: i64,
        people: &[PersonId],
    ) -> Result<JoinOutcome, PlanError> {
        let rotation = self.load_rotation(id)?;
        let mut shift = self.load_shift(id, number)?;
        let (added, skipped): (Vec<PersonId>, Vec<PersonId>) = people
            .iter()
            .cloned()
            .partition(|p| !shift.members.contains(p));
        let mut seen = BTreeSet::new();
        let added: Vec<PersonId> = added.into_iter().filter(|p| seen.insert(p.clone())).collect();
        guard::run(&[
            Check::Active(&rotation),
            Check::Status {
                shift: &shift,
                expected: ShiftStatus::Open,
            },
            Check::Capacity {
                rotation: &rotation,
                current: shift.members.len(),
                adding: added.len(),
            },
        ])?;

        let event_end = rotation
            .shift_dates_for_number(number + i64::from(rotation.grace))
            .map(|(_, end)| end)
            .unwrap_or(shift.end);
        for person_id in &added {
            let mut person = self.ctx.load_person(person_id)?;
            person.add_event(Event::shift(id, number, shift.start, event_end));
            self.ctx.store_person(&person)?;
            shift.members.insert(person_id.clone());
        }
        self.store().store_shift(&shift)?;
        if !added.is_empty() {
            info!(rotation = %id, shift = number, added = ?added, "joined shift");
        }
        Ok(JoinOutcome { shift, added, skipped })
    }

    /// Retire des personnes d'un shift ouvert et supprime leurs événements.
    pub fn leave_shift(&mut self, id: &RotationId, number: i64, people: &[PersonId]) -> Result<Shift, PlanError> {
        let rotation = self.load_rotation(id)?;
        let mut shift = self.load_shift(id, number)?;
        guard::run(&[
            Check::Active(&rotation),
            Check::Status {
                shift: &shift,
                expected: ShiftStatus::Open,
            },
        ])?;
        for person_id in people {
            if !shift.members.remove(person_id) {
                continue;
            }
            let mut person = self.ctx.load_person(person_id)?;
            person
                .events
                .retain(|e| !(e.rotation.as_ref() == Some(id) && e.shift_number == Some(number)));
            self.ctx.store_person(&person)?;
        }
        self.store().store_shift(&shift)?;
        info!(rotation = %id, shift = number, "left shift");
        Ok(shift)
    }

    /// Complète un shift ouvert avec la stratégie de la rotation.
    pub fn fill_shift(
        &mut self,
        id: &RotationId,
        number: i64,
        rng: &mut dyn RngCore,
    ) -> Result<JoinOutcome, PlanError> {
        let rotation = self.load_rotation(id)?;
        let shift = self.load_shift(id, number)?;
        guard::run(&[
            Check::Active(&rotation),
            Check::Status {
                shift: &shift,
                expected: ShiftStatus::Open,
            },
        ])?;

        let pool = self.members(&rotation)?;
        let chosen = shift
            .members
            .iter()
            .map(|p| self.ctx.load_person(p).map(|person| (p.clone(), person)))
            .collect::<Result<UserMap, _>>()?;
        let request = FillRequest {
            rotation: id,
            size: rotation.size as usize,
            needs: &rotation.needs,
            pool: &pool,
            chosen: &chosen,
            shift_number: number,
            start: shift.start,
            end: shift.end,
        };
        let selection = strategy_for(rotation.kind).fill(&request, rng)?;
        let added: Vec<PersonId> = selection
            .into_iter()
            .filter(|p| !shift.members.contains(p))
            .collect();
        debug!(rotation = %id, shift = number, added = ?added, "autofill selection");

        let outcome = self.join_shift(id, number, &added)?;
        let mut notice = outcome.shift.clone();
        notice.members = outcome.added.iter().cloned().collect();
        self.notify(&rotation, &notice, ShiftNotice::Joined);
        Ok(outcome)
    }

    /// Open -> Started ; no-op si déjà démarré.
    pub fn start_shift(&mut self, id: &RotationId, number: i64) -> Result<Transition, PlanError> {
        let rotation = self.load_rotation(id)?;
        let mut shift = self.load_shift(id, number)?;
        guard::run(&[Check::Active(&rotation)])?;
        if shift.status == ShiftStatus::Started {
            return Ok(Transition { shift, changed: false });
        }
        guard::run(&[Check::Status {
            shift: &shift,
            expected: ShiftStatus::Open,
        }])?;

        for person_id in &shift.members {
            let mut person = self.ctx.load_person(person_id)?;
            person.mark_served(id, number);
            self.ctx.store_person(&person)?;
        }
        shift.status = ShiftStatus::Started;
        self.store().store_shift(&shift)?;
        info!(rotation = %id, shift = number, members = shift.members.len(), "shift started");
        self.notify(&rotation, &shift, ShiftNotice::Started);
        Ok(Transition { shift, changed: true })
    }

    /// Started -> Finished ; no-op si déjà terminé.
    pub fn finish_shift(&mut self, id: &RotationId, number: i64) -> Result<Transition, PlanError> {
        let rotation = self.load_rotation(id)?;
        let mut shift = self.load_shift(id, number)?;
        guard::run(&[Check::Active(&rotation)])?;
        if shift.status == ShiftStatus::Finished {
            return Ok(Transition { shift, changed: false });
        }
        guard::run(&[Check::Status {
            shift: &shift,
            expected: ShiftStatus::Started,
        }])?;

        shift.status = ShiftStatus::Finished;
        self.store().store_shift(&shift)?;
        info!(rotation = %id, shift = number, "shift finished");
        self.notify(&rotation, &shift, ShiftNotice::Finished);
        Ok(Transition { shift, changed: true })
    }

    /// Persiste un shift modifié par un appelant interne (marques du pilote).
    pub(crate) fn save_shift(&self, shift: &Shift) -> Result<(), PlanError> {
        Ok(self.store().store_shift(shift)?)
    }

    pub(crate) fn notify(&self, rotation: &Rotation, shift: &Shift, notice: ShiftNotice) -> usize {
        notify_members(self.notifier, self.directory, self.renderer, rotation, shift, notice)
    }
}
