//! Pilote automatique : transitions et allocations dues à l'instant `now`.
//!
//! Chaque étape est isolée : son échec est journalisé et rapporté sans
//! empêcher les suivantes. L'idempotence repose sur les horodatages
//! persistés dans chaque shift, pas sur un verrou ; l'appelant sérialise
//! les invocations par rotation.

use crate::model::{AutopilotSettings, RotationId, Shift, ShiftStatus};
use crate::notification::ShiftNotice;
use crate::planner::{PlanError, Planner};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Finish,
    Fill,
    Start,
    NotifyCurrent,
    NotifyNext,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Finish => "finish",
            Step::Fill => "fill",
            Step::Start => "start",
            Step::NotifyCurrent => "notify-current",
            Step::NotifyNext => "notify-next",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done(String),
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: Step,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutopilotReport {
    pub rotation: RotationId,
    pub shift_number: i64,
    pub enabled: bool,
    pub steps: Vec<StepOutcome>,
}

impl AutopilotReport {
    pub fn outcome(&self, step: Step) -> Option<&Outcome> {
        self.steps.iter().find(|s| s.step == step).map(|s| &s.outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.outcome, Outcome::Failed(_)))
    }
}

impl fmt::Display for AutopilotReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.enabled {
            return write!(f, "{}: autopilot disabled", self.rotation);
        }
        write!(f, "{}: current shift {}", self.rotation, self.shift_number)?;
        for s in &self.steps {
            match &s.outcome {
                Outcome::Done(msg) => write!(f, "\n  {}: {msg}", s.step)?,
                Outcome::Skipped(msg) => write!(f, "\n  {}: skipped ({msg})", s.step)?,
                Outcome::Failed(msg) => write!(f, "\n  {}: FAILED {msg}", s.step)?,
            }
        }
        Ok(())
    }
}

type StepResult = Result<Outcome, PlanError>;

pub fn autopilot_rotation(
    planner: &mut Planner<'_>,
    id: &RotationId,
    now: DateTime<Utc>,
    rng: &mut dyn RngCore,
) -> Result<AutopilotReport, PlanError> {
    let rotation = planner.load_rotation(id)?;
    let current = rotation.shift_number_for_time(now);
    let settings = rotation.autopilot.clone();
    let mut report = AutopilotReport {
        rotation: id.clone(),
        shift_number: current,
        enabled: settings.enabled && !rotation.archived,
        steps: Vec::new(),
    };
    if !report.enabled {
        return Ok(report);
    }

    let finish = finish_previous(planner, id, &settings, current);
    record(&mut report, Step::Finish, finish);
    let fill = fill_ahead(planner, id, &settings, current, now, rng);
    record(&mut report, Step::Fill, fill);
    let start = start_current(planner, id, &settings, current);
    record(&mut report, Step::Start, start);
    let ending = notify_current(planner, id, &settings, current, now);
    record(&mut report, Step::NotifyCurrent, ending);
    let upcoming = notify_next(planner, id, &settings, current, now);
    record(&mut report, Step::NotifyNext, upcoming);

    info!(rotation = %id, shift = current, failures = report.has_failures(), "autopilot run");
    Ok(report)
}

/// Exécute le pilote sur toutes les rotations connues non archivées.
pub fn autopilot_all(
    planner: &mut Planner<'_>,
    now: DateTime<Utc>,
    rng: &mut dyn RngCore,
) -> Result<Vec<(RotationId, Result<AutopilotReport, PlanError>)>, PlanError> {
    let rotations = planner.list_rotations()?;
    let mut out = Vec::with_capacity(rotations.len());
    for (id, _) in rotations {
        let result = autopilot_rotation(planner, &id, now, rng);
        if let Err(err) = &result {
            warn!(rotation = %id, error = %err, "autopilot failed");
        }
        out.push((id, result));
    }
    Ok(out)
}

fn record(report: &mut AutopilotReport, step: Step, result: StepResult) {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(rotation = %report.rotation, %step, error = %err, "autopilot step failed");
            Outcome::Failed(err.to_string())
        }
    };
    report.steps.push(StepOutcome { step, outcome });
}

fn finish_previous(planner: &mut Planner<'_>, id: &RotationId, settings: &AutopilotSettings, current: i64) -> StepResult {
    if !settings.start_finish {
        return Ok(Outcome::Skipped("start/finish disabled".into()));
    }
    let previous = current - 1;
    if previous < 0 {
        return Ok(Outcome::Skipped("no previous shift".into()));
    }
    let Some(shift) = planner.find_shift(id, previous)? else {
        return Ok(Outcome::Skipped(format!("shift {previous} was never opened")));
    };
    match shift.status {
        ShiftStatus::Finished => Ok(Outcome::Skipped(format!("shift {previous} already finished"))),
        ShiftStatus::Open => Ok(Outcome::Skipped(format!("shift {previous} was never started"))),
        ShiftStatus::Started => {
            planner.finish_shift(id, previous)?;
            Ok(Outcome::Done(format!("finished shift {previous}")))
        }
    }
}

fn fill_ahead(
    planner: &mut Planner<'_>,
    id: &RotationId,
    settings: &AutopilotSettings,
    current: i64,
    now: DateTime<Utc>,
    rng: &mut dyn RngCore,
) -> StepResult {
    if !settings.fill {
        return Ok(Outcome::Skipped("fill disabled".into()));
    }
    let rotation = planner.load_rotation(id)?;
    let first = current.max(0);
    let last = rotation.shift_number_for_time(now + Duration::days(i64::from(settings.fill_prior_days)));
    if last < first {
        return Ok(Outcome::Skipped("no shift within fill window".into()));
    }

    let mut filled = Vec::new();
    let mut errors = Vec::new();
    for number in first..=last {
        let shift = match planner.find_shift(id, number)? {
            Some(shift) => shift,
            None => planner.open_shift(id, number)?,
        };
        if shift.autopilot.filled_at.is_some() || shift.status != ShiftStatus::Open {
            continue;
        }
        match planner.fill_shift(id, number, rng) {
            Ok(outcome) => {
                let mut shift = outcome.shift;
                shift.autopilot.filled_at = Some(now);
                planner.save_shift(&shift)?;
                filled.push(format!("{number} (+{})", outcome.added.len()));
            }
            Err(err) => errors.push(format!("shift {number}: {err}")),
        }
    }

    if !errors.is_empty() {
        return Err(PlanError::Other(anyhow::anyhow!(errors.join("; "))));
    }
    if filled.is_empty() {
        return Ok(Outcome::Skipped("shifts already filled".into()));
    }
    Ok(Outcome::Done(format!("filled shift(s) {}", filled.join(", "))))
}

fn start_current(planner: &mut Planner<'_>, id: &RotationId, settings: &AutopilotSettings, current: i64) -> StepResult {
    if !settings.start_finish {
        return Ok(Outcome::Skipped("start/finish disabled".into()));
    }
    if current < 0 {
        return Ok(Outcome::Skipped("rotation has not started".into()));
    }
    let Some(shift) = planner.find_shift(id, current)? else {
        return Ok(Outcome::Skipped(format!("shift {current} was never opened")));
    };
    if shift.status != ShiftStatus::Open {
        return Ok(Outcome::Skipped(format!("shift {current} already {}", shift.status)));
    }
    planner.start_shift(id, current)?;
    Ok(Outcome::Done(format!("started shift {current}")))
}

fn notify_current(
    planner: &mut Planner<'_>,
    id: &RotationId,
    settings: &AutopilotSettings,
    current: i64,
    now: DateTime<Utc>,
) -> StepResult {
    if !settings.notify {
        return Ok(Outcome::Skipped("notify disabled".into()));
    }
    if current < 0 {
        return Ok(Outcome::Skipped("rotation has not started".into()));
    }
    let Some(mut shift) = planner.find_shift(id, current)? else {
        return Ok(Outcome::Skipped(format!("shift {current} was never opened")));
    };
    if shift.autopilot.notified_finish_at.is_some() {
        return Ok(Outcome::Skipped(format!("shift {current} members already notified")));
    }
    if now < lead(shift.end, settings) {
        return Ok(Outcome::Skipped(format!("shift {current} ends later")));
    }
    let sent = send(planner, id, &shift, ShiftNotice::Ending)?;
    shift.autopilot.notified_finish_at = Some(now);
    planner.save_shift(&shift)?;
    Ok(Outcome::Done(format!("notified {sent} member(s) of shift {current} ending")))
}

fn notify_next(
    planner: &mut Planner<'_>,
    id: &RotationId,
    settings: &AutopilotSettings,
    current: i64,
    now: DateTime<Utc>,
) -> StepResult {
    if !settings.notify {
        return Ok(Outcome::Skipped("notify disabled".into()));
    }
    let next = if current < 0 { 0 } else { current + 1 };
    let Some(mut shift) = planner.find_shift(id, next)? else {
        return Ok(Outcome::Skipped(format!("shift {next} was never opened")));
    };
    if shift.autopilot.notified_start_at.is_some() {
        return Ok(Outcome::Skipped(format!("shift {next} members already notified")));
    }
    if now < lead(shift.start, settings) {
        return Ok(Outcome::Skipped(format!("shift {next} starts later")));
    }
    let sent = send(planner, id, &shift, ShiftNotice::Upcoming)?;
    shift.autopilot.notified_start_at = Some(now);
    planner.save_shift(&shift)?;
    Ok(Outcome::Done(format!("notified {sent} member(s) of shift {next} starting")))
}

fn lead(at: DateTime<Utc>, settings: &AutopilotSettings) -> DateTime<Utc> {
    at - Duration::days(i64::from(settings.notify_prior_days))
}

fn send(planner: &Planner<'_>, id: &RotationId, shift: &Shift, notice: ShiftNotice) -> Result<usize, PlanError> {
    let rotation = planner.load_rotation(id)?;
    Ok(planner.notify(&rotation, shift, notice))
}
