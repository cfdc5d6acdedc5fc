#![forbid(unsafe_code)]
use chrono::{NaiveDate, TimeZone, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tournus::{
    forecast_rotation, forecast_user, guess, unmet_needs, AllocErrorKind, EntityStore, Level, MemoryStorage,
    Need, Outbox, Period, PersonId, Planner, Rotation, RotationId, RotationKind, Snapshot, StaticDirectory,
};

fn ids(prefix: &str, n: usize) -> Vec<PersonId> {
    (1..=n).map(|i| PersonId::new(format!("{prefix}{i}"))).collect()
}

fn create(planner: &mut Planner<'_>, mut rotation: Rotation, id: &str, members: &[PersonId]) -> RotationId {
    rotation.id = RotationId::new(id);
    let rotation = planner.add_rotation(rotation).unwrap();
    planner.add_members(&rotation.id, members, 0).unwrap();
    rotation.id
}

/// Neuf développeurs web : trois font aussi du serveur, trois du mobile.
fn monthly_team(planner: &mut Planner<'_>) -> RotationId {
    let team = ids("p", 9);
    for (i, p) in team.iter().enumerate() {
        planner.set_skill(p, "webapp", Level::Intermediate).unwrap();
        match i {
            0..=2 => planner.set_skill(p, "server", Level::Advanced).unwrap(),
            3..=5 => planner.set_skill(p, "mobile", Level::Beginner).unwrap(),
            _ => continue,
        };
    }
    let mut rotation = Rotation::new("support", Period::Monthly, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 3);
    rotation.needs = vec![
        Need::new("server", Level::Beginner, 1, None).unwrap(),
        Need::new("webapp", Level::Beginner, 2, None).unwrap(),
        Need::new("mobile", Level::Beginner, 1, None).unwrap(),
    ];
    create(planner, rotation, "support", &team)
}

#[test]
fn guess_fills_months_with_every_need() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = monthly_team(&mut planner);

    let snapshot = Snapshot::load(&mut planner, &id, 0, 6).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(2020);
    let shifts = guess(&snapshot, 0, 6, true, &mut rng).unwrap();
    assert_eq!(shifts.len(), 6);

    for (offset, shift) in shifts.iter().enumerate() {
        let shift = shift.as_ref().unwrap();
        assert_eq!(shift.number, offset as i64);
        assert_eq!(shift.members.len(), 3);
        let picked = shift.members.iter().map(|m| &snapshot.people[m]);
        assert!(unmet_needs(&snapshot.rotation.needs, picked).is_empty());
    }
    let second = shifts[1].as_ref().unwrap();
    assert_eq!(second.start, Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap());
    assert_eq!(second.end, Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap());
}

#[test]
fn guess_does_not_touch_storage() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = monthly_team(&mut planner);
    let before = store.load_person(&PersonId::new("p1")).unwrap();

    let snapshot = Snapshot::load(&mut planner, &id, 0, 4).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    guess(&snapshot, 0, 4, true, &mut rng).unwrap();

    assert_eq!(store.load_person(&PersonId::new("p1")).unwrap(), before);
    assert_eq!(snapshot.people[&PersonId::new("p1")], before);
    assert!(planner.find_shift(&id, 0).unwrap().is_none());
    assert!(outbox.messages().is_empty());
}

#[test]
fn guess_keeps_persisted_members() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = monthly_team(&mut planner);
    let chosen = PersonId::new("p7");
    planner.open_shift(&id, 0).unwrap();
    planner.join_shift(&id, 0, &[chosen.clone()]).unwrap();

    let snapshot = Snapshot::load(&mut planner, &id, 0, 1).unwrap();
    for seed in 0..20 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let shifts = guess(&snapshot, 0, 1, true, &mut rng).unwrap();
        let shift = shifts[0].as_ref().unwrap();
        assert!(shift.members.contains(&chosen));
        assert_eq!(shift.members.len(), 3);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let untouched = guess(&snapshot, 0, 2, false, &mut rng).unwrap();
    assert_eq!(untouched[0].as_ref().unwrap().members.len(), 1);
    assert!(untouched[1].is_none());
}

#[test]
fn long_guess_spreads_shifts_evenly() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let team = ids("u", 9);
    for p in &team {
        planner.set_skill(p, "ops", Level::Beginner).unwrap();
    }
    let mut rotation = Rotation::new("ops", Period::Weekly, NaiveDate::from_ymd_opt(2020, 1, 6).unwrap(), 1);
    rotation.needs.push(Need::new("ops", Level::Beginner, 1, None).unwrap());
    let id = create(&mut planner, rotation, "ops", &team);

    let snapshot = Snapshot::load(&mut planner, &id, 0, 1800).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let shifts = guess(&snapshot, 0, 1800, true, &mut rng).unwrap();

    let mut counts: BTreeMap<PersonId, usize> = BTreeMap::new();
    for shift in shifts.iter().flatten() {
        for m in &shift.members {
            *counts.entry(m.clone()).or_default() += 1;
        }
    }
    assert_eq!(counts.len(), 9);
    for (person, n) in counts {
        assert!((180..=220).contains(&n), "{person}: {n}");
    }
}

#[test]
fn forecast_tallies_failures() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let team = ids("d", 4);
    planner.set_skill(&team[0], "db", Level::Expert).unwrap();
    let mut rotation = Rotation::new("dba", Period::Biweekly, NaiveDate::from_ymd_opt(2021, 3, 1).unwrap(), 2);
    rotation.needs.push(Need::new("db", Level::Expert, 2, None).unwrap());
    let id = create(&mut planner, rotation, "dba", &team);

    let snapshot = Snapshot::load(&mut planner, &id, 0, 3).unwrap();
    let forecast = forecast_rotation(&snapshot, 0, 3, 25, 5);
    assert_eq!(forecast.successes, 0);
    assert!(forecast.selections.is_empty());
    let stats = &forecast.failures[&AllocErrorKind::InsufficientForNeeds];
    assert_eq!(stats.count, 25);
    assert_eq!(stats.needs["db:expert"], 25);
    assert_eq!(stats.shifts[&0], 25);
}

#[test]
fn forecast_is_reproducible() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let id = monthly_team(&mut planner);
    let snapshot = Snapshot::load(&mut planner, &id, 0, 4).unwrap();

    let a = forecast_rotation(&snapshot, 0, 4, 40, 123);
    let b = forecast_rotation(&snapshot, 0, 4, 40, 123);
    assert_eq!(a, b);
    assert_eq!(a.successes, 40);
    for freqs in a.selections.values() {
        assert_eq!(freqs.len(), 4);
        assert!(freqs.iter().all(|f| (0.0..=1.0).contains(f)));
    }
    let per_shift: f64 = a.selections.values().map(|f| f[0]).sum();
    assert!((per_shift - 3.0).abs() < 1e-9);
}

#[test]
fn user_forecast_is_cumulative() {
    let store = MemoryStorage::new();
    let outbox = Outbox::new();
    let dir = StaticDirectory::default();
    let mut planner = Planner::new(&store, &outbox, &dir);
    let team = ids("q", 2);
    let mut rotation = Rotation::new("queue", Period::Weekly, NaiveDate::from_ymd_opt(2020, 1, 6).unwrap(), 1);
    rotation.id = RotationId::new("queue");
    rotation.kind = RotationKind::Queue;
    let id = planner.add_rotation(rotation).unwrap().id;
    // jamais servi : -1 pour tous
    planner.add_members(&id, &team, -1).unwrap();

    let snapshot = Snapshot::load(&mut planner, &id, 0, 2).unwrap();
    let first = forecast_user(&snapshot, &team[0], 0, 2, 10, 0);
    let second = forecast_user(&snapshot, &team[1], 0, 2, 10, 0);
    assert_eq!(first.successes, 10);
    assert_eq!(first.cumulative, vec![1.0, 1.0]);
    assert_eq!(second.cumulative, vec![0.0, 1.0]);
}
