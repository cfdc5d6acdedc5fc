use super::types::{AllocError, AllocErrorKind, FillRequest, Selection};
use super::weighted::{person_weight, pick_index, reference_gap};
use crate::model::{Person, PersonId};
use crate::need::{is_qualified, Need};
use rand::Rng;
use std::cmp::Ordering;
use tracing::debug;

/// Mode de tirage dans un sous-ensemble de candidats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Pick {
    /// Loterie pondérée par l'ancienneté du dernier service.
    Weighted,
    /// Toujours le plus ancien (égalités départagées par id).
    Heaviest,
}

struct Required<'a> {
    need: Need,
    min_left: u32,
    pool: Vec<&'a Person>,
}

struct Constrained {
    need: Need,
    max_left: i64,
}

struct Fill<'a, 'r> {
    req: &'r FillRequest<'a>,
    general: Vec<&'a Person>,
    /// Plus grand écart du vivier : les poids lui sont relatifs.
    reference: i64,
    required: Vec<Required<'a>>,
    constrained: Vec<Constrained>,
    selection: Selection,
}

pub(super) fn fill<R: Rng + ?Sized>(
    req: &FillRequest<'_>,
    pick: Pick,
    rng: &mut R,
) -> Result<Selection, AllocError> {
    let mut state = Fill::new(req);

    for person in req.chosen.values() {
        state.accept(person);
    }

    if state.selection.len() < req.size {
        state.check_reachable()?;
    }

    while state.selection.len() < req.size {
        let hot = state.hottest();
        let candidates = match hot {
            Some(idx) => &state.required[idx].pool,
            None => &state.general,
        };
        let reference = state.reference;
        let weight = |p: &&Person| person_weight(p, req.rotation, req.shift_number, reference);
        let picked = match pick {
            Pick::Weighted => pick_index(candidates, weight, rng),
            Pick::Heaviest => heaviest(candidates, weight),
        };

        let Some(person) = picked.map(|idx| candidates[idx]) else {
            return Err(match hot {
                Some(idx) => {
                    let need = state.remaining(idx);
                    state.error(AllocErrorKind::InsufficientForNeeds, Some(need))
                }
                None => state.error(AllocErrorKind::InsufficientForSize, None),
            });
        };

        if let Some(need) = state.violated_by(person) {
            debug!(person = %person.id, need = %need, "candidate discarded, need at capacity");
            state.discard(&person.id);
            continue;
        }

        debug!(person = %person.id, shift = req.shift_number, "candidate accepted");
        state.accept(person);
    }

    if let Some(idx) = state.required.iter().position(|r| r.min_left > 0) {
        let need = state.remaining(idx);
        return Err(state.error(AllocErrorKind::SizeExceeded, Some(need)));
    }

    Ok(state.selection)
}

impl<'a, 'r> Fill<'a, 'r> {
    fn new(req: &'r FillRequest<'a>) -> Self {
        let general: Vec<&'a Person> = req
            .pool
            .values()
            .filter(|p| !req.chosen.contains_key(&p.id))
            .filter(|p| p.is_available(req.rotation, req.start, req.end))
            .collect();
        let reference = reference_gap(general.iter().copied(), req.rotation, req.shift_number);

        let required = req
            .needs
            .iter()
            .filter(|n| n.is_required())
            .map(|need| Required {
                need: need.clone(),
                min_left: need.min,
                pool: general.iter().copied().filter(|p| is_qualified(p, need)).collect(),
            })
            .collect();

        let constrained = req
            .needs
            .iter()
            .filter_map(|need| {
                need.max.map(|max| Constrained {
                    need: need.clone(),
                    max_left: i64::from(max),
                })
            })
            .collect();

        Self {
            req,
            general,
            reference,
            required,
            constrained,
            selection: Vec::new(),
        }
    }

    /// Un besoin dont les candidats qualifiés ne suffisent pas échoue d'emblée.
    fn check_reachable(&self) -> Result<(), AllocError> {
        for (idx, r) in self.required.iter().enumerate() {
            if r.min_left as usize > r.pool.len() {
                let need = self.remaining(idx);
                return Err(self.error(AllocErrorKind::InsufficientForNeeds, Some(need)));
            }
        }
        Ok(())
    }

    /// Besoin requis le plus « chaud » : plafond illimité d'abord, puis
    /// minimum restant rapporté au poids total des candidats.
    fn hottest(&self) -> Option<usize> {
        let req = self.req;
        self.required
            .iter()
            .enumerate()
            .filter(|(_, r)| r.min_left > 0)
            .map(|(idx, r)| {
                let total: f64 = r
                    .pool
                    .iter()
                    .map(|p| person_weight(p, req.rotation, req.shift_number, self.reference))
                    .sum();
                let heat = if total > 0.0 {
                    f64::from(r.min_left) / total
                } else {
                    f64::INFINITY
                };
                (idx, !r.need.is_constrained(), heat)
            })
            .max_by(|a, b| {
                a.1.cmp(&b.1)
                    .then(a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal))
                    .then(b.0.cmp(&a.0))
            })
            .map(|(idx, _, _)| idx)
    }

    fn violated_by(&self, person: &Person) -> Option<&Need> {
        self.constrained
            .iter()
            .find(|c| c.max_left <= 0 && is_qualified(person, &c.need))
            .map(|c| &c.need)
    }

    fn accept(&mut self, person: &'a Person) {
        for r in self.required.iter_mut() {
            if r.min_left > 0 && is_qualified(person, &r.need) {
                r.min_left -= 1;
            }
        }
        for c in self.constrained.iter_mut() {
            if is_qualified(person, &c.need) {
                c.max_left -= 1;
            }
        }
        self.discard(&person.id);
        self.selection.push(person.id.clone());
    }

    fn discard(&mut self, id: &PersonId) {
        self.general.retain(|p| &p.id != id);
        for r in self.required.iter_mut() {
            r.pool.retain(|p| &p.id != id);
        }
    }

    fn remaining(&self, idx: usize) -> Need {
        let r = &self.required[idx];
        Need {
            min: r.min_left,
            ..r.need.clone()
        }
    }

    fn error(&self, kind: AllocErrorKind, need: Option<Need>) -> AllocError {
        AllocError {
            kind,
            need,
            unmet_needs: (0..self.required.len())
                .filter(|idx| self.required[*idx].min_left > 0)
                .map(|idx| self.remaining(idx))
                .collect(),
            unmet_capacity: self.req.size.saturating_sub(self.selection.len()),
            shift_number: self.req.shift_number,
        }
    }
}

fn heaviest<T, F: Fn(&T) -> f64>(pool: &[T], weight: F) -> Option<usize> {
    pool.iter()
        .map(&weight)
        .enumerate()
        .max_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(b.0.cmp(&a.0))
        })
        .map(|(idx, _)| idx)
}
