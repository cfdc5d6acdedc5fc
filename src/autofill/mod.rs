mod engine;
mod types;
mod weighted;

pub use types::{AllocError, AllocErrorKind, FillRequest, Selection};
pub use weighted::{person_weight, pick_weighted, reference_gap, served_gap, EPSILON_WEIGHT};

use crate::model::RotationKind;
use rand::RngCore;

/// Stratégie d'allocation d'une rotation.
pub trait AllocationStrategy: Send + Sync {
    /// Complète `request.chosen` jusqu'à `request.size` personnes ; renvoie
    /// la sélection entière, déjà choisis compris, dans l'ordre d'acceptation.
    fn fill(&self, request: &FillRequest<'_>, rng: &mut dyn RngCore) -> Result<Selection, AllocError>;
}

/// Loterie pondérée par l'ancienneté du dernier service.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedLottery;

impl AllocationStrategy for WeightedLottery {
    fn fill(&self, request: &FillRequest<'_>, rng: &mut dyn RngCore) -> Result<Selection, AllocError> {
        engine::fill(request, engine::Pick::Weighted, rng)
    }
}

/// File stricte : toujours la personne qui attend depuis le plus longtemps.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueueOrder;

impl AllocationStrategy for QueueOrder {
    fn fill(&self, request: &FillRequest<'_>, rng: &mut dyn RngCore) -> Result<Selection, AllocError> {
        engine::fill(request, engine::Pick::Heaviest, rng)
    }
}

pub fn strategy_for(kind: RotationKind) -> &'static dyn AllocationStrategy {
    match kind {
        RotationKind::Lottery => &WeightedLottery,
        RotationKind::Queue => &QueueOrder,
    }
}
