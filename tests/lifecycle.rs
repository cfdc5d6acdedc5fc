#![forbid(unsafe_code)]
use chrono::{NaiveDate, TimeZone, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tournus::{
    is_qualified, EntityStore, EventKind, Level, MemoryStorage, MessageRenderer, Need, Outbox, Period, PersonId,
    PlanError, Planner, Rotation, RotationId, Shift, ShiftNotice, ShiftStatus, StaticDirectory,
};

fn people(n: usize) -> Vec<PersonId> {
    (1..=n).map(|i| PersonId::new(format!("p{i}"))).collect()
}

/// Rotation hebdomadaire "ops" débutant le lundi 2020-01-06, membres p1..p4.
fn weekly(planner: &mut Planner<'_>, size: u32, grace: u32) -> RotationId {
    for p in people(4) {
        planner.set_skill(&p, "server", Level::Intermediate).unwrap();
    }
    let mut rotation = Rotation::new("ops", Period::Weekly, NaiveDate::from_ymd_opt(2020, 1, 6).unwrap(), size);
    rotation.id = RotationId::new("ops");
    rotation.grace = grace;
    rotation.needs.push(Need::new("server", Level::Beginner, 1, None).unwrap());
    let rotation = planner.add_rotation(rotation).unwrap();
    planner.add_members(&rotation.id, &people(4), 0).unwrap();
    rotation.id
}

#[test]
fn open_shift_once() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = weekly(&mut planner, 2, 0);

    let shift = planner.open_shift(&id, 0).unwrap();
    assert_eq!(shift.status, ShiftStatus::Open);
    assert_eq!(shift.start, Utc.with_ymd_and_hms(2020, 1, 6, 0, 0, 0).unwrap());
    assert_eq!(shift.end, Utc.with_ymd_and_hms(2020, 1, 13, 0, 0, 0).unwrap());

    let err = planner.open_shift(&id, 0).unwrap_err();
    assert!(matches!(err, PlanError::ShiftExists { number: 0, .. }));
    assert!(err.is_lifecycle());

    assert!(matches!(planner.open_shift(&id, -1), Err(PlanError::InvalidShiftNumber(-1))));
}

#[test]
fn join_respects_size_and_skips_members() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = weekly(&mut planner, 2, 0);
    let p = people(4);
    planner.open_shift(&id, 0).unwrap();

    let outcome = planner.join_shift(&id, 0, &p[0..1]).unwrap();
    assert_eq!(outcome.added, vec![p[0].clone()]);

    let outcome = planner.join_shift(&id, 0, &[p[0].clone(), p[1].clone(), p[1].clone()]).unwrap();
    assert_eq!(outcome.added, vec![p[1].clone()]);
    assert_eq!(outcome.skipped, vec![p[0].clone()]);
    assert_eq!(outcome.shift.members.len(), 2);

    let err = planner.join_shift(&id, 0, &p[2..3]).unwrap_err();
    assert!(matches!(err, PlanError::SizeExceeded { size: 2 }));
    assert_eq!(planner.load_shift(&id, 0).unwrap().members.len(), 2);
}

#[test]
fn unlimited_size_accepts_everyone() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = weekly(&mut planner, 0, 0);
    planner.open_shift(&id, 0).unwrap();
    let outcome = planner.join_shift(&id, 0, &people(4)).unwrap();
    assert_eq!(outcome.shift.members.len(), 4);
}

#[test]
fn joining_blocks_the_grace_period() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = weekly(&mut planner, 2, 1);
    let p = people(1);
    planner.open_shift(&id, 0).unwrap();
    planner.join_shift(&id, 0, &p).unwrap();

    let person = planner.load_person(&p[0]).unwrap();
    let event = person
        .events
        .iter()
        .find(|e| e.kind == EventKind::Shift)
        .unwrap();
    assert_eq!(event.shift_number, Some(0));
    assert_eq!(event.end, Utc.with_ymd_and_hms(2020, 1, 20, 0, 0, 0).unwrap());

    planner.leave_shift(&id, 0, &p).unwrap();
    let person = planner.load_person(&p[0]).unwrap();
    assert!(person.events.is_empty());
    assert!(planner.load_shift(&id, 0).unwrap().members.is_empty());
}

#[test]
fn start_and_finish_are_idempotent() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = weekly(&mut planner, 2, 0);
    let p = people(2);
    planner.open_shift(&id, 3).unwrap();
    planner.join_shift(&id, 3, &p).unwrap();

    let err = planner.finish_shift(&id, 3).unwrap_err();
    assert!(matches!(
        err,
        PlanError::WrongStatus {
            status: ShiftStatus::Open,
            expected: ShiftStatus::Started,
            ..
        }
    ));

    assert!(planner.start_shift(&id, 3).unwrap().changed);
    assert!(!planner.start_shift(&id, 3).unwrap().changed);
    for person in &p {
        assert_eq!(planner.load_person(person).unwrap().last_served(&id), 3);
    }
    assert_eq!(outbox.messages().len(), 2);

    let err = planner.join_shift(&id, 3, &people(3)[2..]).unwrap_err();
    assert!(matches!(err, PlanError::WrongStatus { .. }));

    assert!(planner.finish_shift(&id, 3).unwrap().changed);
    assert!(!planner.finish_shift(&id, 3).unwrap().changed);
    assert_eq!(planner.load_shift(&id, 3).unwrap().status, ShiftStatus::Finished);
    assert_eq!(outbox.messages().len(), 4);

    assert!(matches!(planner.start_shift(&id, 3), Err(PlanError::WrongStatus { .. })));
}

#[test]
fn fill_completes_shift_and_notifies() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = weekly(&mut planner, 2, 0);
    planner.open_shift(&id, 0).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let outcome = planner.fill_shift(&id, 0, &mut rng).unwrap();
    assert_eq!(outcome.added.len(), 2);
    assert_eq!(planner.load_shift(&id, 0).unwrap().members.len(), 2);

    let messages = outbox.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].1.contains("you have been added to ops #0"));

    let again = planner.fill_shift(&id, 0, &mut rng).unwrap();
    assert!(again.added.is_empty());
}

#[test]
fn fill_failure_leaves_shift_untouched() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = weekly(&mut planner, 2, 0);
    planner
        .add_need(&id, Need::new("server", Level::Expert, 1, None).unwrap())
        .unwrap();
    planner.open_shift(&id, 0).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let err = planner.fill_shift(&id, 0, &mut rng).unwrap_err();
    assert!(matches!(err, PlanError::Allocation(_)));
    assert!(planner.load_shift(&id, 0).unwrap().members.is_empty());
    assert!(outbox.messages().is_empty());
}

#[test]
fn new_members_start_behind_by_grace() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = weekly(&mut planner, 2, 1);
    let late = PersonId::new("late");
    planner.add_members(&id, &[late.clone()], 5).unwrap();
    assert_eq!(planner.load_person(&late).unwrap().last_served(&id), 4);

    planner.remove_members(&id, &[late.clone()]).unwrap();
    let rotation = planner.load_rotation(&id).unwrap();
    assert!(!rotation.members.contains(&late));
    assert_eq!(planner.load_person(&late).unwrap().last_served(&id), -1);
}

#[test]
fn rotation_needs_known_skills() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);

    let mut rotation = Rotation::new("db", Period::Monthly, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 1);
    rotation.needs.push(Need::new("postgres", Level::Advanced, 1, None).unwrap());
    let err = planner.add_rotation(rotation.clone()).unwrap_err();
    assert!(matches!(&err, PlanError::UnknownSkill(skill) if skill == "postgres"));
    assert!(err.is_validation());

    planner.set_skill(&PersonId::new("dba"), "postgres", Level::Expert).unwrap();
    let created = planner.add_rotation(rotation.clone()).unwrap();
    assert!(matches!(planner.add_rotation(rotation), Err(PlanError::RotationExists(_))));
    assert_eq!(planner.list_rotations().unwrap(), vec![(created.id.clone(), "db".to_string())]);

    let err = planner
        .add_need(&created.id, Need::new("oracle", Level::Beginner, 1, None).unwrap())
        .unwrap_err();
    assert!(matches!(err, PlanError::UnknownSkill(_)));

    let updated = planner.remove_need(&created.id, "postgres:advanced").unwrap();
    assert!(updated.needs.is_empty());
}

#[test]
fn archived_rotation_is_frozen() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = weekly(&mut planner, 2, 0);
    planner.archive_rotation(&id).unwrap();

    assert!(matches!(planner.open_shift(&id, 0), Err(PlanError::RotationArchived(_))));
    assert!(matches!(
        planner.update_rotation(&id, |r| r.size = 5),
        Err(PlanError::RotationArchived(_))
    ));
    assert!(matches!(
        planner.load_rotation(&RotationId::new("nope")),
        Err(PlanError::UnknownRotation(_))
    ));
}

#[test]
fn unavailability_is_stored_and_cleared() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let p = PersonId::new("alice");
    let start = Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2020, 2, 8, 0, 0, 0).unwrap();

    assert!(matches!(
        planner.add_unavailable(&p, end, start),
        Err(PlanError::InvalidTimeRange)
    ));
    planner.add_unavailable(&p, start, end).unwrap();
    let stored = store.load_person(&p).unwrap();
    assert_eq!(stored.events.len(), 1);
    assert!(!stored.is_available(&RotationId::new("any"), start, end));

    let removed = planner
        .clear_unavailable(&p, start, start + chrono::Duration::days(1))
        .unwrap();
    assert_eq!(removed, 1);
    assert!(planner.load_person(&p).unwrap().events.is_empty());
}

#[test]
fn starting_records_this_shift_as_last_served() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = weekly(&mut planner, 0, 0);
    let late = PersonId::new("late");
    planner.add_members(&id, &[late.clone()], 5).unwrap();
    assert_eq!(planner.load_person(&late).unwrap().last_served(&id), 5);

    planner.open_shift(&id, 0).unwrap();
    planner.join_shift(&id, 0, &[late.clone()]).unwrap();
    planner.start_shift(&id, 0).unwrap();
    assert_eq!(store.load_person(&late).unwrap().last_served(&id), 0);
}

struct Terse;

impl MessageRenderer for Terse {
    fn render(&self, name: &str, rotation: &Rotation, shift: &Shift, notice: ShiftNotice) -> String {
        format!("{name}/{}/{}/{notice:?}", rotation.id, shift.number)
    }
}

#[test]
fn custom_renderer_shapes_messages() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir).with_renderer(&Terse);
    let id = weekly(&mut planner, 2, 0);
    let p = people(1);
    planner.open_shift(&id, 0).unwrap();
    planner.join_shift(&id, 0, &p).unwrap();
    planner.start_shift(&id, 0).unwrap();

    let messages: Vec<String> = outbox.drain().into_iter().map(|(_, m)| m).collect();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].ends_with("/ops/0/Joined"), "{}", messages[0]);
    assert!(messages[1].ends_with("/ops/0/Started"), "{}", messages[1]);
}

#[test]
fn removing_a_skill_disqualifies() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let p = PersonId::new("alice");
    let need = Need::new("server", Level::Beginner, 1, None).unwrap();
    planner.set_skill(&p, "server", Level::Advanced).unwrap();
    planner.set_skill(&p, "webapp", Level::Beginner).unwrap();
    assert!(is_qualified(&store.load_person(&p).unwrap(), &need));

    let person = planner.remove_skill(&p, "server").unwrap();
    assert_eq!(person.level("server"), None);
    assert_eq!(person.level("webapp"), Some(Level::Beginner));
    let stored = store.load_person(&p).unwrap();
    assert!(!is_qualified(&stored, &need));

    let again = planner.remove_skill(&p, "server").unwrap();
    assert_eq!(again, stored);
}
