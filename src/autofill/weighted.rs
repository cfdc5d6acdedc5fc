use crate::model::{Person, RotationId};
use rand::Rng;

/// Poids quasi nul des personnes ayant déjà servi après le shift considéré.
pub const EPSILON_WEIGHT: f64 = 1e-12;

/// Nombre de shifts écoulés depuis le dernier service ; `None` si la personne
/// a déjà servi après `shift_number`.
pub fn served_gap(person: &Person, rotation: &RotationId, shift_number: i64) -> Option<i64> {
    let last = person.last_served(rotation);
    (last <= shift_number).then(|| shift_number - last)
}

/// Plus grand écart d'un ensemble de candidats, référence commune des poids.
pub fn reference_gap<'a, I>(people: I, rotation: &RotationId, shift_number: i64) -> i64
where
    I: IntoIterator<Item = &'a Person>,
{
    people
        .into_iter()
        .filter_map(|p| served_gap(p, rotation, shift_number))
        .max()
        .unwrap_or(0)
}

/// Poids d'équité `2^(shift - dernier shift servi)`, divisé par `2^reference`.
///
/// Seuls les rapports comptent : avec `reference` égal au plus grand écart du
/// tirage, le poids le plus lourd vaut 1 et aucun calcul ne déborde.
pub fn person_weight(person: &Person, rotation: &RotationId, shift_number: i64, reference: i64) -> f64 {
    let scale = -(reference as f64);
    match served_gap(person, rotation, shift_number) {
        Some(gap) => (gap as f64 + scale).exp2(),
        None => EPSILON_WEIGHT * scale.exp2(),
    }
}

/// Tire un élément proportionnellement à `weight` (CDF + recherche dichotomique).
///
/// Si tous les poids sont nuls, le tirage est uniforme.
pub fn pick_weighted<'a, T, F, R>(pool: &'a [T], weight: F, rng: &mut R) -> Option<&'a T>
where
    F: Fn(&T) -> f64,
    R: Rng + ?Sized,
{
    pick_index(pool, weight, rng).map(|idx| &pool[idx])
}

pub(super) fn pick_index<T, F, R>(pool: &[T], weight: F, rng: &mut R) -> Option<usize>
where
    F: Fn(&T) -> f64,
    R: Rng + ?Sized,
{
    if pool.is_empty() {
        return None;
    }

    let mut total = 0.0;
    let cdf: Vec<f64> = pool
        .iter()
        .map(|item| {
            let w = weight(item);
            if w.is_finite() && w > 0.0 {
                total += w;
            }
            total
        })
        .collect();

    if total <= 0.0 || !total.is_finite() {
        return Some(rng.gen_range(0..pool.len()));
    }

    let draw = rng.gen_range(0.0..total);
    let idx = cdf.partition_point(|c| *c <= draw);
    Some(idx.min(pool.len() - 1))
}
