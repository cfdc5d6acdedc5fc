use crate::model::{Person, PersonId, Rotation, RotationId, Shift};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("corrupt record {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("io error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Index des rotations connues : id -> nom.
pub type RotationIndex = BTreeMap<RotationId, String>;

const KNOWN_SKILLS: &str = "index/skills";
const KNOWN_ROTATIONS: &str = "index/rotations";

fn person_key(id: &PersonId) -> String {
    format!("person/{}", id.as_str())
}

fn rotation_key(id: &RotationId) -> String {
    format!("rotation/{}", id.as_str())
}

fn shift_key(rotation: &RotationId, number: i64) -> String {
    format!("shift/{}/{}", rotation.as_str(), number)
}

/// Stockage clé-valeur brut ; l'accès typé passe par [`EntityStore`].
pub trait Storage: Send + Sync {
    /// Lit une valeur brute ; `NotFound` si absente.
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
    /// Écrit de manière atomique.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    /// Supprime ; absent n'est pas une erreur.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Accès typé aux entités, disponible aussi via `&dyn Storage`.
pub trait EntityStore {
    fn load_person(&self, id: &PersonId) -> Result<Person, StoreError>;
    fn store_person(&self, person: &Person) -> Result<(), StoreError>;
    fn delete_person(&self, id: &PersonId) -> Result<(), StoreError>;
    fn load_rotation(&self, id: &RotationId) -> Result<Rotation, StoreError>;
    fn store_rotation(&self, rotation: &Rotation) -> Result<(), StoreError>;
    fn delete_rotation(&self, id: &RotationId) -> Result<(), StoreError>;
    fn load_shift(&self, rotation: &RotationId, number: i64) -> Result<Shift, StoreError>;
    fn store_shift(&self, shift: &Shift) -> Result<(), StoreError>;
    fn delete_shift(&self, rotation: &RotationId, number: i64) -> Result<(), StoreError>;
    fn load_known_skills(&self) -> Result<BTreeSet<String>, StoreError>;
    fn store_known_skills(&self, skills: &BTreeSet<String>) -> Result<(), StoreError>;
    fn load_known_rotations(&self) -> Result<RotationIndex, StoreError>;
    fn store_known_rotations(&self, index: &RotationIndex) -> Result<(), StoreError>;
}

fn decode<T: DeserializeOwned, S: Storage + ?Sized>(storage: &S, key: &str) -> Result<T, StoreError> {
    let data = storage.get(key)?;
    serde_json::from_slice(&data).map_err(|source| StoreError::Corrupt {
        key: key.to_string(),
        source,
    })
}

fn encode<T: Serialize, S: Storage + ?Sized>(storage: &S, key: &str, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Corrupt {
        key: key.to_string(),
        source,
    })?;
    storage.set(key, &json)
}

impl<S: Storage + ?Sized> EntityStore for S {
    fn load_person(&self, id: &PersonId) -> Result<Person, StoreError> {
        decode(self, &person_key(id))
    }
    fn store_person(&self, person: &Person) -> Result<(), StoreError> {
        encode(self, &person_key(&person.id), person)
    }
    fn delete_person(&self, id: &PersonId) -> Result<(), StoreError> {
        self.delete(&person_key(id))
    }
    fn load_rotation(&self, id: &RotationId) -> Result<Rotation, StoreError> {
        decode(self, &rotation_key(id))
    }
    fn store_rotation(&self, rotation: &Rotation) -> Result<(), StoreError> {
        encode(self, &rotation_key(&rotation.id), rotation)
    }
    fn delete_rotation(&self, id: &RotationId) -> Result<(), StoreError> {
        self.delete(&rotation_key(id))
    }
    fn load_shift(&self, rotation: &RotationId, number: i64) -> Result<Shift, StoreError> {
        decode(self, &shift_key(rotation, number))
    }
    fn store_shift(&self, shift: &Shift) -> Result<(), StoreError> {
        encode(self, &shift_key(&shift.rotation, shift.number), shift)
    }
    fn delete_shift(&self, rotation: &RotationId, number: i64) -> Result<(), StoreError> {
        self.delete(&shift_key(rotation, number))
    }
    fn load_known_skills(&self) -> Result<BTreeSet<String>, StoreError> {
        decode(self, KNOWN_SKILLS)
    }
    fn store_known_skills(&self, skills: &BTreeSet<String>) -> Result<(), StoreError> {
        encode(self, KNOWN_SKILLS, skills)
    }
    fn load_known_rotations(&self) -> Result<RotationIndex, StoreError> {
        decode(self, KNOWN_ROTATIONS)
    }
    fn store_known_rotations(&self, index: &RotationIndex) -> Result<(), StoreError> {
        encode(self, KNOWN_ROTATIONS, index)
    }
}

/// Un fichier JSON par clé sous un répertoire (`rotation/x` -> `rotation/x.json`).
pub struct JsonStorage {
    root: PathBuf,
}

impl JsonStorage {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .split('/')
                .all(|part| !part.is_empty() && part != "." && part != ".." && !part.contains('\\'));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl Storage for JsonStorage {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        fs::read(&path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
            _ => StoreError::Io {
                key: key.to_string(),
                source,
            },
        })
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let io = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(io)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(io)?;
        tmp.write_all(value).map_err(io)?;
        tmp.flush().map_err(io)?;
        tmp.as_file().sync_all().map_err(io)?;
        tmp.persist(&path).map_err(|e| io(e.error))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// Stockage en mémoire (tests, outils).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Chaque écriture est une insertion unique : un verrou empoisonné reste cohérent.
    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.entries()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }
}
