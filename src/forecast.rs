//! Simulations sans effet de bord : `guess` (un tirage) et prévisions
//! Monte-Carlo agrégées sur plusieurs tirages.

use crate::autofill::{strategy_for, AllocError, AllocErrorKind, FillRequest};
use crate::model::{Event, Person, PersonId, Rotation, RotationId, Shift, ShiftStatus, UserMap};
use crate::planner::{PlanError, Planner};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Copie détachée d'une rotation, de ses membres et des shifts persistés.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub rotation: Rotation,
    pub people: UserMap,
    pub shifts: BTreeMap<i64, Shift>,
}

impl Snapshot {
    pub fn new(rotation: Rotation, people: UserMap) -> Self {
        Self {
            rotation,
            people,
            shifts: BTreeMap::new(),
        }
    }

    /// Charge la rotation et les shifts `[from, from + count)` déjà persistés.
    pub fn load(planner: &mut Planner<'_>, id: &RotationId, from: i64, count: usize) -> Result<Self, PlanError> {
        let rotation = planner.load_rotation(id)?;
        let mut people = planner.members(&rotation)?;
        let mut shifts = BTreeMap::new();
        for number in from.max(0)..from.max(0) + count as i64 {
            if let Some(shift) = planner.find_shift(id, number)? {
                for member in &shift.members {
                    if !people.contains_key(member) {
                        people.insert(member.clone(), planner.load_person(member)?);
                    }
                }
                shifts.insert(number, shift);
            }
        }
        Ok(Self {
            rotation,
            people,
            shifts,
        })
    }
}

/// Simule `count` shifts à partir de `from` sur une copie du snapshot.
///
/// Avec `autofill`, chaque shift ouvert est complété (un échec interrompt la
/// simulation) ; sans, seuls les shifts persistés sont renvoyés, `None` ailleurs.
pub fn guess(
    snapshot: &Snapshot,
    from: i64,
    count: usize,
    autofill: bool,
    rng: &mut dyn RngCore,
) -> Result<Vec<Option<Shift>>, AllocError> {
    let rotation = &snapshot.rotation;
    let mut people = snapshot.people.clone();
    let strategy = strategy_for(rotation.kind);
    let mut out = Vec::with_capacity(count);

    for number in from..from + count as i64 {
        let persisted = snapshot.shifts.get(&number).cloned();
        if !autofill {
            out.push(persisted);
            continue;
        }
        let Some(mut shift) = persisted.or_else(|| synthesize(rotation, number)) else {
            out.push(None);
            continue;
        };

        if shift.status == ShiftStatus::Open {
            let pool: UserMap = rotation
                .members
                .iter()
                .filter_map(|id| people.get(id).map(|p| (id.clone(), p.clone())))
                .collect();
            let chosen: UserMap = shift
                .members
                .iter()
                .map(|id| {
                    let person = people.get(id).cloned().unwrap_or_else(|| Person::new(id.clone()));
                    (id.clone(), person)
                })
                .collect();
            let request = FillRequest {
                rotation: &rotation.id,
                size: rotation.size as usize,
                needs: &rotation.needs,
                pool: &pool,
                chosen: &chosen,
                shift_number: number,
                start: shift.start,
                end: shift.end,
            };
            let selection = strategy.fill(&request, rng)?;
            shift.members.extend(selection);
        }

        let event_end = rotation
            .shift_dates_for_number(number + i64::from(rotation.grace))
            .map(|(_, end)| end)
            .unwrap_or(shift.end);
        for id in &shift.members {
            if let Some(person) = people.get_mut(id) {
                person.mark_served(&rotation.id, number);
                person.add_event(Event::shift(&rotation.id, number, shift.start, event_end));
            }
        }
        out.push(Some(shift));
    }

    Ok(out)
}

fn synthesize(rotation: &Rotation, number: i64) -> Option<Shift> {
    let (start, end) = rotation.shift_dates_for_number(number)?;
    Some(Shift::open(rotation.id.clone(), number, start, end))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FailureStats {
    pub count: usize,
    /// Besoins insatisfaits (clé compétence:niveau) -> occurrences.
    pub needs: BTreeMap<String, usize>,
    /// Numéro du shift en échec -> occurrences.
    pub shifts: BTreeMap<i64, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub rotation: RotationId,
    pub from: i64,
    pub count: usize,
    pub sample_size: usize,
    pub successes: usize,
    pub failures: BTreeMap<AllocErrorKind, FailureStats>,
    /// Par personne : fréquence de sélection à chaque décalage, sur les essais réussis.
    pub selections: BTreeMap<PersonId, Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserForecast {
    pub person: PersonId,
    pub from: i64,
    pub sample_size: usize,
    pub successes: usize,
    /// Probabilité d'avoir été sélectionné au moins une fois jusqu'au décalage inclus.
    pub cumulative: Vec<f64>,
}

type Trial = Result<Vec<Option<Shift>>, AllocError>;

/// L'essai `i` utilise la graine `seed + i` : résultat indépendant du parallélisme.
fn run_trials(snapshot: &Snapshot, from: i64, count: usize, sample_size: usize, seed: u64) -> Vec<Trial> {
    (0..sample_size)
        .into_par_iter()
        .map(|i| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
            guess(snapshot, from, count, true, &mut rng)
        })
        .collect()
}

pub fn forecast_rotation(
    snapshot: &Snapshot,
    from: i64,
    count: usize,
    sample_size: usize,
    seed: u64,
) -> Forecast {
    let trials = run_trials(snapshot, from, count, sample_size, seed);
    let mut failures: BTreeMap<AllocErrorKind, FailureStats> = BTreeMap::new();
    let mut tallies: BTreeMap<PersonId, Vec<usize>> = BTreeMap::new();
    let mut successes = 0;

    for trial in &trials {
        match trial {
            Ok(shifts) => {
                successes += 1;
                for (offset, shift) in shifts.iter().enumerate() {
                    let Some(shift) = shift else { continue };
                    for member in &shift.members {
                        tallies.entry(member.clone()).or_insert_with(|| vec![0; count])[offset] += 1;
                    }
                }
            }
            Err(err) => {
                let stats = failures.entry(err.kind).or_default();
                stats.count += 1;
                *stats.shifts.entry(err.shift_number).or_default() += 1;
                for need in &err.unmet_needs {
                    *stats.needs.entry(need.key()).or_default() += 1;
                }
            }
        }
    }

    debug!(rotation = %snapshot.rotation.id, sample_size, successes, "forecast done");
    let selections = tallies
        .into_iter()
        .map(|(id, counts)| {
            let freq = counts
                .into_iter()
                .map(|c| if successes == 0 { 0.0 } else { c as f64 / successes as f64 })
                .collect();
            (id, freq)
        })
        .collect();

    Forecast {
        rotation: snapshot.rotation.id.clone(),
        from,
        count,
        sample_size,
        successes,
        failures,
        selections,
    }
}

pub fn forecast_user(
    snapshot: &Snapshot,
    person: &PersonId,
    from: i64,
    count: usize,
    sample_size: usize,
    seed: u64,
) -> UserForecast {
    let trials = run_trials(snapshot, from, count, sample_size, seed);
    let mut first_served = vec![0usize; count];
    let mut successes = 0;

    for shifts in trials.iter().filter_map(|t| t.as_ref().ok()) {
        successes += 1;
        let first = shifts
            .iter()
            .position(|s| s.as_ref().map(|s| s.members.contains(person)).unwrap_or(false));
        if let Some(offset) = first {
            first_served[offset] += 1;
        }
    }

    let mut running = 0;
    let cumulative = first_served
        .into_iter()
        .map(|n| {
            running += n;
            if successes == 0 {
                0.0
            } else {
                running as f64 / successes as f64
            }
        })
        .collect();

    UserForecast {
        person: person.clone(),
        from,
        sample_size,
        successes,
        cumulative,
    }
}
