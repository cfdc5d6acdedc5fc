#![forbid(unsafe_code)]
//! Tournus — rotations de garde périodiques.
//!
//! - Besoins par compétence, remplissage pondéré par l'ancienneté du dernier service.
//! - Cycle de vie des shifts (ouvert, démarré, terminé), idempotent.
//! - Prévisions Monte-Carlo sur copies détachées.
//! - Pilote automatique piloté par un `now` explicite : la lib ne lit jamais l'horloge.

pub mod autofill;
pub mod autopilot;
pub mod calendar;
pub mod context;
pub mod forecast;
pub mod identity;
#[cfg(feature = "csv")]
pub mod io;
pub mod model;
pub mod need;
pub mod notification;
pub mod planner;
pub mod storage;
pub mod template;

pub use autofill::{
    pick_weighted, strategy_for, AllocError, AllocErrorKind, AllocationStrategy, FillRequest, QueueOrder,
    WeightedLottery,
};
pub use autopilot::{autopilot_all, autopilot_rotation, AutopilotReport, Outcome, Step};
pub use calendar::NO_SHIFT;
pub use forecast::{forecast_rotation, forecast_user, guess, Forecast, Snapshot, UserForecast};
pub use identity::{Directory, Identity, StaticDirectory};
pub use model::{
    AutopilotSettings, Event, EventKind, Level, Period, Person, PersonId, Rotation, RotationId, RotationKind,
    Shift, ShiftStatus, UserMap,
};
pub use need::{is_qualified, qualified_subset, unmet_needs, Need};
pub use notification::{MessageRenderer, Notifier, Outbox, ShiftNotice, TextMessages};
pub use planner::{JoinOutcome, PlanError, Planner, Transition};
pub use storage::{EntityStore, JsonStorage, MemoryStorage, Storage, StoreError};
pub use template::{load_template_from_file, RotationTemplate, TemplateStore};
