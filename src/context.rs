//! Contexte d'une requête : caches paresseux, jamais partagés entre requêtes.

use crate::model::{Person, PersonId, Rotation, RotationId, UserMap};
use crate::storage::{EntityStore, RotationIndex, StoreError, Storage};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub struct RequestContext<'s> {
    store: &'s dyn Storage,
    known_skills: Option<BTreeSet<String>>,
    known_rotations: Option<RotationIndex>,
    /// Vue dérivée de `Rotation::members`, recalculée sur invalidation.
    expanded: BTreeMap<RotationId, UserMap>,
}

impl<'s> RequestContext<'s> {
    pub fn new(store: &'s dyn Storage) -> Self {
        Self {
            store,
            known_skills: None,
            known_rotations: None,
            expanded: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &'s dyn Storage {
        self.store
    }

    pub fn known_skills(&mut self) -> Result<&BTreeSet<String>, StoreError> {
        if self.known_skills.is_none() {
            let skills = or_default(self.store.load_known_skills())?;
            self.known_skills = Some(skills);
        }
        Ok(self.known_skills.get_or_insert_with(BTreeSet::new))
    }

    pub fn add_known_skill(&mut self, skill: &str) -> Result<(), StoreError> {
        if self.known_skills()?.contains(skill) {
            return Ok(());
        }
        let skills = self.known_skills.get_or_insert_with(BTreeSet::new);
        skills.insert(skill.to_string());
        self.store.store_known_skills(skills)
    }

    pub fn known_rotations(&mut self) -> Result<&RotationIndex, StoreError> {
        if self.known_rotations.is_none() {
            let index = or_default(self.store.load_known_rotations())?;
            self.known_rotations = Some(index);
        }
        Ok(self.known_rotations.get_or_insert_with(RotationIndex::new))
    }

    pub fn register_rotation(&mut self, rotation: &Rotation) -> Result<(), StoreError> {
        self.known_rotations()?;
        let index = self.known_rotations.get_or_insert_with(RotationIndex::new);
        index.insert(rotation.id.clone(), rotation.name.clone());
        self.store.store_known_rotations(index)
    }

    /// Charge une personne ; absente, elle est créée par défaut (non persistée).
    pub fn load_person(&self, id: &PersonId) -> Result<Person, StoreError> {
        match self.store.load_person(id) {
            Ok(person) => Ok(person),
            Err(e) if e.is_not_found() => Ok(Person::new(id.clone())),
            Err(e) => Err(e),
        }
    }

    /// Persiste et rafraîchit les vues dérivées qui contiennent la personne.
    pub fn store_person(&mut self, person: &Person) -> Result<(), StoreError> {
        self.store.store_person(person)?;
        for users in self.expanded.values_mut() {
            if let Some(cached) = users.get_mut(&person.id) {
                *cached = person.clone();
            }
        }
        Ok(())
    }

    /// Membres matérialisés de la rotation (copies détachées).
    pub fn members(&mut self, rotation: &Rotation) -> Result<&UserMap, StoreError> {
        let stale = self
            .expanded
            .get(&rotation.id)
            .map(|users| !users.keys().eq(rotation.members.iter()))
            .unwrap_or(true);
        if stale {
            debug!(rotation = %rotation.id, members = rotation.members.len(), "expanding members");
            let users = rotation
                .members
                .iter()
                .map(|id| self.load_person(id).map(|p| (id.clone(), p)))
                .collect::<Result<UserMap, _>>()?;
            self.expanded.insert(rotation.id.clone(), users);
        }
        Ok(self.expanded.entry(rotation.id.clone()).or_default())
    }

    pub fn invalidate(&mut self, rotation: &RotationId) {
        self.expanded.remove(rotation);
    }
}

fn or_default<T: Default>(result: Result<T, StoreError>) -> Result<T, StoreError> {
    match result {
        Err(e) if e.is_not_found() => Ok(T::default()),
        other => other,
    }
}
