#![forbid(unsafe_code)]
use std::fs;
use tempfile::tempdir;
use tournus::template::{NeedSpec, RotationTemplate};
use tournus::{
    load_template_from_file, AutopilotSettings, EntityStore, JsonStorage, Level, Period, Person, PersonId,
    PlanError, RotationKind, Storage, StoreError, TemplateStore,
};

#[test]
fn save_and_load_template_roundtrip() {
    let dir = tempdir().unwrap();
    let store = TemplateStore::new(dir.path().join("templates"));
    let template = sample_template();
    store.save(&template).unwrap();

    let loaded = store.load(&template.id).unwrap();
    assert_eq!(loaded.id, template.id);
    assert_eq!(loaded.needs.len(), 2);

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].template.name, "Support web");
}

#[test]
fn listing_skips_broken_files() {
    let dir = tempdir().unwrap();
    let store = TemplateStore::new(dir.path());
    store.save(&sample_template()).unwrap();
    fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].template.id, "web");
}

#[test]
fn template_becomes_rotation() {
    let rotation = sample_template().to_rotation().unwrap();
    assert_eq!(rotation.id.as_str(), "web");
    assert_eq!(rotation.period, Period::Monthly);
    assert_eq!(rotation.grace, 1);
    assert_eq!(rotation.kind, RotationKind::Queue);
    assert_eq!(rotation.needs[0].max, None);
    assert_eq!(rotation.needs[1].max, Some(1));
    assert_eq!(rotation.needs[1].level, Level::Expert);
}

#[test]
fn minimal_json_uses_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ops.json");
    fs::write(
        &path,
        r#"{"id": "ops", "name": "Ops", "period": "weekly", "start": "2024-01-01", "size": 2}"#,
    )
    .unwrap();

    let template = load_template_from_file(&path).unwrap();
    let rotation = template.to_rotation().unwrap();
    assert_eq!(rotation.grace, 0);
    assert_eq!(rotation.kind, RotationKind::Lottery);
    assert!(rotation.needs.is_empty());
    assert!(!rotation.autopilot.enabled);
}

#[test]
fn invalid_templates_are_rejected() {
    let mut t = sample_template();
    t.period = "daily".into();
    assert!(t.validate().is_err());

    let mut t = sample_template();
    t.start = "2024-02-30".into();
    assert!(t.validate().is_err());

    let mut t = sample_template();
    t.needs.push(t.needs[0].clone());
    let err = t.validate().unwrap_err();
    assert!(err.to_string().contains("duplicate need"));

    let mut t = sample_template();
    t.needs[1].min = 3;
    assert!(t.validate().is_err());

    let mut t = sample_template();
    t.id = "a/b".into();
    assert!(t.validate().is_err());
}

#[test]
fn template_errors_are_typed_validation_errors() {
    let mut t = sample_template();
    t.period = "daily".into();
    let err = t.to_rotation().unwrap_err();
    assert!(matches!(&err, PlanError::InvalidPeriod(p) if p == "daily"));
    assert!(err.is_validation());

    let mut t = sample_template();
    t.start = "2024-13-01".into();
    let err = t.to_rotation().unwrap_err();
    assert!(matches!(&err, PlanError::InvalidDate(d) if d == "2024-13-01"));
    assert!(err.is_validation());

    let mut t = sample_template();
    t.needs[0].level = "guru".into();
    let err = t.to_rotation().unwrap_err();
    assert!(matches!(err, PlanError::InvalidNeed(_)));
    assert!(err.is_validation());

    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(
        &path,
        r#"{"id": "bad", "name": "Bad", "period": "weekly", "start": "2024-02-30", "size": 1}"#,
    )
    .unwrap();
    let err = load_template_from_file(&path).unwrap_err();
    assert!(matches!(err.downcast_ref::<PlanError>(), Some(PlanError::InvalidDate(_))));
}

#[test]
fn json_storage_roundtrip() {
    let dir = tempdir().unwrap();
    let store = JsonStorage::open(dir.path()).unwrap();
    let person = Person::new(PersonId::new("alice")).with_skill("server", Level::Advanced);
    store.store_person(&person).unwrap();

    assert!(dir.path().join("person").join("alice.json").exists());
    assert_eq!(store.load_person(&person.id).unwrap(), person);

    let reopened = JsonStorage::open(dir.path()).unwrap();
    assert_eq!(reopened.load_person(&person.id).unwrap(), person);

    reopened.delete_person(&person.id).unwrap();
    reopened.delete_person(&person.id).unwrap();
    assert!(reopened.load_person(&person.id).unwrap_err().is_not_found());
}

#[test]
fn json_storage_rejects_bad_keys_and_data() {
    let dir = tempdir().unwrap();
    let store = JsonStorage::open(dir.path()).unwrap();
    assert!(matches!(store.get("../escape"), Err(StoreError::InvalidKey(_))));
    assert!(matches!(store.set("a//b", b"{}"), Err(StoreError::InvalidKey(_))));

    store.set("person/bob", b"[1, 2").unwrap();
    assert!(matches!(
        store.load_person(&PersonId::new("bob")),
        Err(StoreError::Corrupt { .. })
    ));
}

fn sample_template() -> RotationTemplate {
    RotationTemplate {
        id: "web".into(),
        name: "Support web".into(),
        period: "monthly".into(),
        start: "2024-01-01".into(),
        size: 3,
        grace: 1,
        kind: RotationKind::Queue,
        needs: vec![
            NeedSpec {
                skill: "webapp".into(),
                level: "intermediate".into(),
                min: 2,
                max: -1,
            },
            NeedSpec {
                skill: "server".into(),
                level: "4".into(),
                min: 0,
                max: 1,
            },
        ],
        autopilot: AutopilotSettings {
            enabled: true,
            fill: true,
            fill_prior_days: 7,
            ..AutopilotSettings::default()
        },
    }
}
