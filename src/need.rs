//! Besoins de compétences d'une rotation et tests de qualification.

use crate::model::{Level, Person, UserMap};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exigence : `min` personnes (et au plus `max`) ayant `skill` au niveau `level` ou plus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Need {
    pub skill: String,
    pub level: Level,
    #[serde(default)]
    pub min: u32,
    /// `None` : pas de plafond.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl Need {
    pub fn new<S: Into<String>>(skill: S, level: Level, min: u32, max: Option<u32>) -> Result<Self, String> {
        let skill = skill.into();
        if skill.trim().is_empty() {
            return Err("need skill cannot be empty".to_string());
        }
        if let Some(max) = max {
            if min > max {
                return Err(format!("need {skill}: min {min} exceeds max {max}"));
            }
        }
        Ok(Self { skill, level, min, max })
    }

    /// Construit depuis la convention « -1 = illimité ».
    pub fn from_counts<S: Into<String>>(skill: S, level: Level, min: u32, max: i64) -> Result<Self, String> {
        let max = if max < 0 {
            None
        } else {
            Some(u32::try_from(max).map_err(|_| format!("need max out of range: {max}"))?)
        };
        Self::new(skill, level, min, max)
    }

    /// Clé d'identité : compétence + niveau.
    pub fn key(&self) -> String {
        format!("{}:{}", self.skill, self.level)
    }

    pub fn is_required(&self) -> bool {
        self.min > 0
    }

    pub fn is_constrained(&self) -> bool {
        self.max.is_some()
    }
}

impl fmt::Display for Need {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} min {}", self.skill, self.level, self.min)?;
        if let Some(max) = self.max {
            write!(f, " max {max}")?;
        }
        Ok(())
    }
}

pub fn is_qualified(person: &Person, need: &Need) -> bool {
    person
        .level(&need.skill)
        .map(|level| level >= need.level)
        .unwrap_or(false)
}

pub fn qualified_subset(people: &UserMap, need: &Need) -> UserMap {
    people
        .iter()
        .filter(|(_, p)| is_qualified(p, need))
        .map(|(id, p)| (id.clone(), p.clone()))
        .collect()
}

/// Décrémente chaque minimum du nombre de personnes qualifiées et renvoie
/// les besoins dont le minimum reste positif.
pub fn unmet_needs<'a, I>(needs: &[Need], people: I) -> Vec<Need>
where
    I: IntoIterator<Item = &'a Person> + Clone,
{
    needs
        .iter()
        .filter_map(|need| {
            let have = people.clone().into_iter().filter(|p| is_qualified(p, need)).count();
            let left = (need.min as usize).saturating_sub(have);
            if left == 0 {
                return None;
            }
            Some(Need {
                min: left as u32,
                ..need.clone()
            })
        })
        .collect()
}
