use crate::model::PersonId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identité affichable d'une personne.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: PersonId,
    pub handle: String,
    pub display_name: String,
    #[serde(default)]
    pub deactivated: bool,
}

impl Identity {
    pub fn new<H: Into<String>, D: Into<String>>(id: PersonId, handle: H, display_name: D) -> Self {
        Self {
            id,
            handle: handle.into(),
            display_name: display_name.into(),
            deactivated: false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("unknown person: {0}")]
    NotFound(String),
}

/// Résolution d'identités ; une identité désactivée est introuvable.
pub trait Directory {
    fn get_person(&self, id: &PersonId) -> Result<Identity, IdentityError>;
    fn get_person_by_handle(&self, handle: &str) -> Result<Identity, IdentityError>;

    /// Nom affiché, ou l'id brut si inconnu.
    fn display_name(&self, id: &PersonId) -> String {
        self.get_person(id)
            .map(|i| i.display_name)
            .unwrap_or_else(|_| id.as_str().to_string())
    }
}

/// Annuaire figé, chargé depuis un fichier ou construit en test.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticDirectory {
    people: Vec<Identity>,
}

impl StaticDirectory {
    pub fn new(people: Vec<Identity>) -> Self {
        Self { people }
    }

    /// Ajoute ou remplace (même id).
    pub fn upsert(&mut self, identity: Identity) {
        match self.people.iter_mut().find(|p| p.id == identity.id) {
            Some(existing) => *existing = identity,
            None => self.people.push(identity),
        }
    }

    pub fn people(&self) -> &[Identity] {
        &self.people
    }
}

impl Directory for StaticDirectory {
    fn get_person(&self, id: &PersonId) -> Result<Identity, IdentityError> {
        self.people
            .iter()
            .find(|p| &p.id == id && !p.deactivated)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(id.as_str().to_string()))
    }

    fn get_person_by_handle(&self, handle: &str) -> Result<Identity, IdentityError> {
        let handle = handle.trim_start_matches('@');
        self.people
            .iter()
            .find(|p| p.handle == handle && !p.deactivated)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(handle.to_string()))
    }
}
