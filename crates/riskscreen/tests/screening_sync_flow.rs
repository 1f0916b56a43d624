//! Integration specifications for the screening capture and synchronization
//! workflow.
//!
//! Scenarios drive the public service facade against an in-memory tracker so
//! schema resolution, scoring, and the create/update protocols are validated
//! end to end without touching private modules.

mod common {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use serde_json::{json, Value};

    use riskscreen::platform::{
        ImportCounts, ImportSummary, MutateSpec, MutationResponse, PlatformTransport, QuerySpec,
        ResourceKind, TransportError, WriteOperation,
    };
    use riskscreen::screening::{RecordPatch, RiskConfig, ScreeningService, TrackerSettings};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// In-memory tracker: serves a canned schema and event, records every
    /// mutation, and hands out sequential references.
    pub(crate) struct InMemoryTracker {
        pub(crate) mutations: Mutex<Vec<MutateSpec>>,
        pub(crate) event: Mutex<Value>,
        pub(crate) update_counts: Mutex<ImportCounts>,
        pub(crate) fail_entity_create: bool,
        pub(crate) conflict_on_event_update: bool,
        pub(crate) sequence: AtomicU64,
    }

    impl Default for InMemoryTracker {
        fn default() -> Self {
            Self {
                mutations: Mutex::new(Vec::new()),
                event: Mutex::new(sample_event(&[])),
                update_counts: Mutex::new(ImportCounts {
                    imported: 0,
                    updated: 1,
                    ignored: 0,
                }),
                fail_entity_create: false,
                conflict_on_event_update: false,
                sequence: AtomicU64::new(1),
            }
        }
    }

    impl InMemoryTracker {
        pub(crate) fn recorded(&self) -> Vec<MutateSpec> {
            self.mutations.lock().expect("mutation mutex poisoned").clone()
        }

        fn next_reference(&self, prefix: &str) -> String {
            let id = self.sequence.fetch_add(1, Ordering::Relaxed);
            format!("{prefix}{id:05}")
        }

        fn reference_response(&self, prefix: &str) -> MutationResponse {
            MutationResponse {
                summaries: vec![ImportSummary {
                    reference: Some(self.next_reference(prefix)),
                    status: "SUCCESS".to_string(),
                    description: None,
                    conflicts: Vec::new(),
                }],
                counts: None,
            }
        }
    }

    impl PlatformTransport for InMemoryTracker {
        fn query(&self, spec: &QuerySpec) -> Result<Value, TransportError> {
            match spec.resource {
                ResourceKind::ProgramStages => Ok(stage_schema()),
                ResourceKind::Programs => Ok(attribute_schema()),
                ResourceKind::Events => Ok(self.event.lock().expect("event mutex poisoned").clone()),
                ResourceKind::TrackedEntities => Ok(sample_entity()),
                ResourceKind::OrganisationUnits => Ok(json!({
                    "organisationUnits": [{"id": "ou1", "displayName": "Chamkar Mon"}]
                })),
                ResourceKind::Enrollments => Ok(json!({})),
            }
        }

        fn mutate(&self, spec: &MutateSpec) -> Result<MutationResponse, TransportError> {
            self.mutations
                .lock()
                .expect("mutation mutex poisoned")
                .push(spec.clone());

            match (spec.resource, spec.operation) {
                (ResourceKind::TrackedEntities, WriteOperation::Create) => {
                    if self.fail_entity_create {
                        return Ok(MutationResponse {
                            summaries: vec![ImportSummary {
                                reference: None,
                                status: "ERROR".to_string(),
                                description: Some("value_not_unique".to_string()),
                                conflicts: Vec::new(),
                            }],
                            counts: None,
                        });
                    }
                    Ok(self.reference_response("tei"))
                }
                (ResourceKind::Enrollments, WriteOperation::Create) => {
                    Ok(self.reference_response("enr"))
                }
                (ResourceKind::Events, WriteOperation::Create) => Ok(self.reference_response("evt")),
                (ResourceKind::Events, WriteOperation::Update) => {
                    if self.conflict_on_event_update {
                        return Err(TransportError::Conflict);
                    }
                    Ok(MutationResponse {
                        summaries: Vec::new(),
                        counts: Some(*self.update_counts.lock().expect("counts mutex poisoned")),
                    })
                }
                (ResourceKind::TrackedEntities, WriteOperation::Update) => Ok(MutationResponse {
                    summaries: Vec::new(),
                    counts: Some(ImportCounts {
                        imported: 0,
                        updated: 1,
                        ignored: 0,
                    }),
                }),
                _ => Err(TransportError::Decode("unexpected mutation".to_string())),
            }
        }
    }

    pub(crate) fn stage_schema() -> Value {
        json!({
            "programStageDataElements": [
                {"dataElement": {"id": "deHivPartner", "displayName": "Sex with HIV positive partner", "valueType": "TEXT"}},
                {"dataElement": {"id": "deCondom", "displayName": "Sex without condom", "valueType": "TEXT"}},
                {"dataElement": {"id": "dePartners", "displayName": "Number of sexual partners", "valueType": "TEXT"}},
                {"dataElement": {"id": "deInject", "displayName": "Injected drugs", "valueType": "TRUE_ONLY"}},
                {"dataElement": {"id": "deScore", "displayName": "Risk score", "valueType": "INTEGER_ZERO_OR_POSITIVE"}},
                {"dataElement": {"id": "deLevel", "displayName": "Risk level", "valueType": "TEXT"}}
            ]
        })
    }

    pub(crate) fn attribute_schema() -> Value {
        json!({
            "programTrackedEntityAttributes": [
                {"trackedEntityAttribute": {"id": "atIdentifier", "displayName": "Unique identifier", "valueType": "TEXT"}},
                {"trackedEntityAttribute": {"id": "atFamily", "displayName": "Family name", "valueType": "TEXT"}},
                {"trackedEntityAttribute": {"id": "atLast", "displayName": "Last name", "valueType": "TEXT"}},
                {"trackedEntityAttribute": {"id": "atSex", "displayName": "Sex", "valueType": "TEXT"}},
                {"trackedEntityAttribute": {"id": "atBirth", "displayName": "Date of birth", "valueType": "DATE"}},
                {"trackedEntityAttribute": {"id": "atProvince", "displayName": "Province", "valueType": "TEXT"}},
                {"trackedEntityAttribute": {"id": "atDistrict", "displayName": "District", "valueType": "TEXT"}}
            ]
        })
    }

    pub(crate) fn sample_event(values: &[(&str, &str)]) -> Value {
        let data_values: Vec<Value> = values
            .iter()
            .map(|(element, value)| json!({"dataElement": element, "value": value}))
            .collect();
        json!({
            "event": "evtExisting1",
            "program": "progHiv",
            "programStage": "stageScreen",
            "orgUnit": "ou1",
            "eventDate": "2026-07-01",
            "trackedEntityInstance": "teiExisting1",
            "enrollment": "enrExisting1",
            "dataValues": data_values,
        })
    }

    fn sample_entity() -> Value {
        json!({
            "trackedEntityInstance": "teiExisting1",
            "attributes": [
                {"attribute": "atFamily", "value": "Dara"},
                {"attribute": "atLast", "value": "Sok"},
                {"attribute": "atSex", "value": "Male"},
                {"attribute": "atBirth", "value": "1995-03-07"},
                {"attribute": "atProvince", "value": "Phnom Penh"},
                {"attribute": "atDistrict", "value": "Chamkar Mon"}
            ]
        })
    }

    pub(crate) fn settings() -> TrackerSettings {
        TrackerSettings {
            program: "progHiv".to_string(),
            program_stage: "stageScreen".to_string(),
            tracked_entity_type: "tetClient".to_string(),
            org_unit: "ou1".to_string(),
            locale: "en".to_string(),
        }
    }

    pub(crate) fn service_over(
        tracker: Arc<InMemoryTracker>,
    ) -> ScreeningService<InMemoryTracker> {
        let service = ScreeningService::new(tracker, settings(), RiskConfig::default());
        service
            .refresh_schema()
            .expect("canned schema resolves");
        service
    }

    pub(crate) fn identity_patch() -> RecordPatch {
        RecordPatch {
            family_name: Some("Dara".to_string()),
            last_name: Some("Sok".to_string()),
            sex: Some("Male".to_string()),
            date_of_birth: chrono::NaiveDate::from_ymd_opt(1995, 3, 7),
            province: Some("Phnom Penh".to_string()),
            district: Some("Chamkar Mon".to_string()),
            org_unit: Some("ou1".to_string()),
            ..RecordPatch::default()
        }
    }

    pub(crate) fn answers(entries: &[(riskscreen::screening::FieldKey, &str)]) -> RecordPatch {
        let mut map = BTreeMap::new();
        for (key, value) in entries {
            map.insert(*key, value.to_string());
        }
        RecordPatch {
            answers: map,
            ..RecordPatch::default()
        }
    }
}

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;

use common::{answers, identity_patch, sample_event, service_over, InMemoryTracker};
use riskscreen::platform::{ImportCounts, ResourceKind, WriteOperation};
use riskscreen::screening::{
    FieldKey, RecordState, RiskLevel, ScreeningRecord, ServiceError, SyncError, SyncStep,
    UpdateOutcome,
};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, 5).expect("valid date")
}

fn body_values<'a>(body: &'a Value, list: &str, id_key: &str) -> Vec<(&'a str, &'a str)> {
    body.get(list)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    Some((
                        entry.get(id_key)?.as_str()?,
                        entry.get("value")?.as_str()?,
                    ))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn create_flow_runs_entity_enrollment_event_in_order() {
    let tracker = Arc::new(InMemoryTracker::default());
    let service = service_over(tracker.clone());

    let mut record = ScreeningRecord::default();
    service.apply_patch(&mut record, identity_patch());
    service.apply_patch(
        &mut record,
        answers(&[
            (FieldKey::SexWithHivPartner, "Yes"),
            (FieldKey::SexWithoutCondom, "Yes"),
            (FieldKey::NumberOfSexualPartners, "6+"),
            (FieldKey::InjectedDrugs, "No"),
        ]),
    );

    let mut state = RecordState::Draft;
    let outcome = service
        .create(&mut record, &mut state, today())
        .expect("create succeeds");

    assert_eq!(state, RecordState::Created);
    assert!(outcome.entity_id.starts_with("tei"));
    assert!(outcome.enrollment_id.starts_with("enr"));
    assert!(outcome.event_id.starts_with("evt"));
    assert_eq!(outcome.identifier.as_deref(), Some("SkDr1070395"));
    assert!(outcome.risk.level >= RiskLevel::High);

    let mutations = tracker.recorded();
    assert_eq!(mutations.len(), 3);
    assert_eq!(mutations[0].resource, ResourceKind::TrackedEntities);
    assert_eq!(mutations[1].resource, ResourceKind::Enrollments);
    assert_eq!(mutations[2].resource, ResourceKind::Events);

    let attributes = body_values(&mutations[0].body, "attributes", "attribute");
    assert!(attributes.contains(&("atFamily", "Dara")));
    assert!(attributes.contains(&("atLast", "Sok")));
    assert!(attributes.contains(&("atIdentifier", "SkDr1070395")));

    let enrollment = &mutations[1].body;
    assert_eq!(
        enrollment.get("trackedEntityInstance").and_then(Value::as_str),
        Some(outcome.entity_id.as_str())
    );

    let event = &mutations[2].body;
    assert_eq!(event.get("status").and_then(Value::as_str), Some("COMPLETED"));
    let data_values = body_values(event, "dataValues", "dataElement");
    assert!(data_values.contains(&("deHivPartner", "Yes")));
    assert!(data_values.contains(&("deScore", "35")));
    assert!(data_values.contains(&("deLevel", "High")));
    // TRUE_ONLY answered "No" is omitted entirely, never sent as "false".
    assert!(!data_values.iter().any(|(element, _)| *element == "deInject"));

    // The form resets to a fresh draft but keeps the org-unit selection.
    assert!(record.identity.family_name.is_none());
    assert!(record.answers.is_empty());
    assert_eq!(record.org_unit.as_deref(), Some("ou1"));
}

#[test]
fn create_fails_fast_when_the_entity_reference_is_missing() {
    let tracker = Arc::new(InMemoryTracker {
        fail_entity_create: true,
        ..InMemoryTracker::default()
    });
    let service = service_over(tracker.clone());

    let mut record = ScreeningRecord::default();
    service.apply_patch(&mut record, identity_patch());

    let mut state = RecordState::Draft;
    let error = service
        .create(&mut record, &mut state, today())
        .expect_err("entity create fails");

    assert_eq!(state, RecordState::CreateFailed);
    match error {
        ServiceError::Sync(SyncError::ExternalWrite { step, description, .. }) => {
            assert_eq!(step, SyncStep::EntityCreate);
            assert!(description.contains("value_not_unique"));
        }
        other => panic!("expected external write failure, got {other}"),
    }

    // Fail fast: enrollment and event steps never ran.
    assert_eq!(tracker.recorded().len(), 1);
    // The record is kept for a retry.
    assert_eq!(record.identity.family_name.as_deref(), Some("Dara"));
}

#[test]
fn validation_failures_abort_before_any_network_call() {
    let tracker = Arc::new(InMemoryTracker::default());
    let service = service_over(tracker.clone());

    let mut record = ScreeningRecord::default();
    let mut state = RecordState::Draft;
    let error = service
        .create(&mut record, &mut state, today())
        .expect_err("empty record is invalid");

    assert!(matches!(
        error,
        ServiceError::Sync(SyncError::Validation(ref issues)) if issues.len() >= 4
    ));
    assert!(tracker.recorded().is_empty());
}

#[test]
fn create_without_resolved_schema_reports_schema_unavailable() {
    let tracker = Arc::new(InMemoryTracker::default());
    let service = riskscreen::screening::ScreeningService::new(
        tracker.clone(),
        common::settings(),
        riskscreen::screening::RiskConfig::default(),
    );

    let mut record = ScreeningRecord::default();
    service.apply_patch(&mut record, identity_patch());

    let mut state = RecordState::Draft;
    let error = service
        .create(&mut record, &mut state, today())
        .expect_err("no schema loaded");
    assert!(matches!(
        error,
        ServiceError::Sync(SyncError::SchemaUnavailable)
    ));
    assert!(tracker.recorded().is_empty());
}

#[test]
fn update_skips_the_write_when_nothing_changed() {
    let tracker = Arc::new(InMemoryTracker::default());
    // Current platform state already matches the record, including the
    // computed score (10, Low) for a single condomless-sex answer.
    *tracker.event.lock().expect("event mutex") = sample_event(&[
        ("deCondom", "Yes"),
        ("deScore", "10"),
        ("deLevel", "Low"),
    ]);
    let service = service_over(tracker.clone());

    let mut record = service.load("evtExisting1").expect("load succeeds");
    service.apply_patch(&mut record, answers(&[(FieldKey::SexWithoutCondom, "Yes")]));

    let mut state = RecordState::Loaded;
    let outcome = service
        .update(&record, &mut state, today())
        .expect("update runs");

    assert_eq!(outcome, UpdateOutcome::NoChanges);
    assert_eq!(state, RecordState::Loaded);
    assert!(tracker.recorded().is_empty(), "no write was issued");
}

#[test]
fn update_submits_only_diffed_values_with_fetched_envelope() {
    let tracker = Arc::new(InMemoryTracker::default());
    *tracker.event.lock().expect("event mutex") = sample_event(&[
        ("deCondom", "Yes"),
        ("deHivPartner", "No"),
        ("deScore", "10"),
        ("deLevel", "Low"),
    ]);
    let service = service_over(tracker.clone());

    let mut record = service.load("evtExisting1").expect("load succeeds");
    service.apply_patch(&mut record, answers(&[(FieldKey::SexWithHivPartner, "Yes")]));

    let mut state = RecordState::Loaded;
    let outcome = service
        .update(&record, &mut state, today())
        .expect("update succeeds");

    assert_eq!(outcome, UpdateOutcome::Updated);
    assert_eq!(state, RecordState::Updated);

    let mutations = tracker.recorded();
    let event_update = mutations
        .iter()
        .find(|spec| spec.resource == ResourceKind::Events)
        .expect("event update submitted");
    assert_eq!(event_update.operation, WriteOperation::Update);

    // Envelope comes from the freshly fetched event, not client state.
    assert_eq!(
        event_update.body.get("program").and_then(Value::as_str),
        Some("progHiv")
    );
    assert_eq!(
        event_update.body.get("eventDate").and_then(Value::as_str),
        Some("2026-07-01")
    );
    assert_eq!(
        event_update.body.get("status").and_then(Value::as_str),
        Some("COMPLETED")
    );

    let data_values = body_values(&event_update.body, "dataValues", "dataElement");
    assert!(data_values.contains(&("deHivPartner", "Yes")));
    assert!(data_values.contains(&("deScore", "20")));
    assert!(data_values.contains(&("deLevel", "Medium")));
    // The unchanged answer stays out of the payload.
    assert!(!data_values.iter().any(|(element, _)| *element == "deCondom"));

    // The best-effort attribute refresh ran as a separate update.
    assert!(mutations
        .iter()
        .any(|spec| spec.resource == ResourceKind::TrackedEntities
            && spec.operation == WriteOperation::Update));
}

#[test]
fn update_with_ignored_values_on_top_of_applied_is_partial() {
    let tracker = Arc::new(InMemoryTracker::default());
    *tracker.event.lock().expect("event mutex") = sample_event(&[("deCondom", "No")]);
    *tracker.update_counts.lock().expect("counts mutex") = ImportCounts {
        imported: 0,
        updated: 2,
        ignored: 1,
    };
    let service = service_over(tracker.clone());

    let mut record = service.load("evtExisting1").expect("load succeeds");
    service.apply_patch(&mut record, answers(&[(FieldKey::SexWithoutCondom, "Yes")]));

    let mut state = RecordState::Loaded;
    let outcome = service
        .update(&record, &mut state, today())
        .expect("update reports partial");
    assert_eq!(outcome, UpdateOutcome::Partial { ignored: 1 });
}

#[test]
fn update_that_applies_nothing_is_a_failure_not_partial() {
    let tracker = Arc::new(InMemoryTracker::default());
    *tracker.event.lock().expect("event mutex") = sample_event(&[("deCondom", "No")]);
    *tracker.update_counts.lock().expect("counts mutex") = ImportCounts {
        imported: 0,
        updated: 0,
        ignored: 3,
    };
    let service = service_over(tracker.clone());

    let mut record = service.load("evtExisting1").expect("load succeeds");
    service.apply_patch(&mut record, answers(&[(FieldKey::SexWithoutCondom, "Yes")]));

    let mut state = RecordState::Loaded;
    let error = service
        .update(&record, &mut state, today())
        .expect_err("nothing applied means failure");

    assert_eq!(state, RecordState::UpdateFailed);
    assert!(matches!(
        error,
        ServiceError::Sync(SyncError::ExternalWrite {
            step: SyncStep::EventUpdate,
            ..
        })
    ));
}

#[test]
fn concurrent_modification_is_reported_distinctly() {
    let tracker = Arc::new(InMemoryTracker {
        conflict_on_event_update: true,
        ..InMemoryTracker::default()
    });
    *tracker.event.lock().expect("event mutex") = sample_event(&[("deCondom", "No")]);
    let service = service_over(tracker.clone());

    let mut record = service.load("evtExisting1").expect("load succeeds");
    service.apply_patch(&mut record, answers(&[(FieldKey::SexWithoutCondom, "Yes")]));

    let mut state = RecordState::Loaded;
    let error = service
        .update(&record, &mut state, today())
        .expect_err("conflict surfaces");

    match error {
        ServiceError::Sync(err @ SyncError::Conflict { step }) => {
            assert_eq!(step, SyncStep::EventUpdate);
            assert!(err.to_string().contains("modified by another user"));
        }
        other => panic!("expected conflict, got {other}"),
    }
}

#[test]
fn load_prepopulates_identity_and_answers_from_the_platform() {
    let tracker = Arc::new(InMemoryTracker::default());
    *tracker.event.lock().expect("event mutex") =
        sample_event(&[("deCondom", "Yes"), ("dePartners", "3")]);
    let service = service_over(tracker);

    let record = service.load("evtExisting1").expect("load succeeds");

    assert_eq!(record.linkage.event_id.as_deref(), Some("evtExisting1"));
    assert_eq!(record.linkage.entity_id.as_deref(), Some("teiExisting1"));
    assert_eq!(record.identity.family_name.as_deref(), Some("Dara"));
    assert_eq!(
        record.identity.date_of_birth,
        NaiveDate::from_ymd_opt(1995, 3, 7)
    );
    assert_eq!(record.answer(FieldKey::SexWithoutCondom), Some("Yes"));
    assert_eq!(record.answer(FieldKey::NumberOfSexualPartners), Some("3"));
}

#[test]
fn a_second_save_is_rejected_while_one_is_in_flight() {
    use riskscreen::platform::{
        MutateSpec, MutationResponse, PlatformTransport, QuerySpec, TransportError,
    };
    use std::sync::mpsc;
    use std::sync::Mutex;

    /// Delegates to the in-memory tracker but parks the first entity-create
    /// call until the test releases it.
    struct BlockingTracker {
        inner: InMemoryTracker,
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl PlatformTransport for BlockingTracker {
        fn query(&self, spec: &QuerySpec) -> Result<serde_json::Value, TransportError> {
            self.inner.query(spec)
        }

        fn mutate(&self, spec: &MutateSpec) -> Result<MutationResponse, TransportError> {
            if spec.resource == ResourceKind::TrackedEntities
                && spec.operation == WriteOperation::Create
            {
                self.started
                    .lock()
                    .expect("sender mutex poisoned")
                    .send(())
                    .expect("test still listening");
                self.release
                    .lock()
                    .expect("receiver mutex poisoned")
                    .recv()
                    .expect("test releases the save");
            }
            self.inner.mutate(spec)
        }
    }

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let tracker = Arc::new(BlockingTracker {
        inner: InMemoryTracker::default(),
        started: Mutex::new(started_tx),
        release: Mutex::new(release_rx),
    });

    let service = Arc::new(riskscreen::screening::ScreeningService::new(
        tracker,
        common::settings(),
        riskscreen::screening::RiskConfig::default(),
    ));
    service.refresh_schema().expect("canned schema resolves");

    let background = service.clone();
    let handle = std::thread::spawn(move || {
        let mut record = ScreeningRecord::default();
        background.apply_patch(&mut record, identity_patch());
        let mut state = RecordState::Draft;
        background.create(&mut record, &mut state, today())
    });

    started_rx.recv().expect("first save reaches the platform");

    let mut record = ScreeningRecord::default();
    service.apply_patch(&mut record, identity_patch());
    let mut state = RecordState::Draft;
    let error = service
        .create(&mut record, &mut state, today())
        .expect_err("second save is rejected");
    assert!(matches!(error, ServiceError::SaveInFlight));

    release_tx.send(()).expect("first save resumes");
    let outcome = handle
        .join()
        .expect("first save thread completes")
        .expect("first save succeeds");
    assert!(outcome.event_id.starts_with("evt"));
}

#[test]
fn in_flight_save_keeps_the_snapshot_it_started_with() {
    use riskscreen::platform::{
        MutateSpec, MutationResponse, PlatformTransport, QuerySpec, TransportError,
    };
    use std::sync::mpsc;
    use std::sync::Mutex;

    /// Serves a swappable stage schema and parks the entity-create call so
    /// the test can refresh the schema mid-save.
    struct SwappableSchemaTracker {
        inner: InMemoryTracker,
        stage: Mutex<serde_json::Value>,
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl PlatformTransport for SwappableSchemaTracker {
        fn query(&self, spec: &QuerySpec) -> Result<serde_json::Value, TransportError> {
            if spec.resource == ResourceKind::ProgramStages {
                return Ok(self.stage.lock().expect("stage mutex poisoned").clone());
            }
            self.inner.query(spec)
        }

        fn mutate(&self, spec: &MutateSpec) -> Result<MutationResponse, TransportError> {
            if spec.resource == ResourceKind::TrackedEntities
                && spec.operation == WriteOperation::Create
            {
                self.started
                    .lock()
                    .expect("sender mutex poisoned")
                    .send(())
                    .expect("test still listening");
                self.release
                    .lock()
                    .expect("receiver mutex poisoned")
                    .recv()
                    .expect("test releases the save");
            }
            self.inner.mutate(spec)
        }
    }

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let tracker = Arc::new(SwappableSchemaTracker {
        inner: InMemoryTracker::default(),
        stage: Mutex::new(common::stage_schema()),
        started: Mutex::new(started_tx),
        release: Mutex::new(release_rx),
    });

    let service = Arc::new(riskscreen::screening::ScreeningService::new(
        tracker.clone(),
        common::settings(),
        riskscreen::screening::RiskConfig::default(),
    ));
    service.refresh_schema().expect("initial schema resolves");

    let background = service.clone();
    let handle = std::thread::spawn(move || {
        let mut record = ScreeningRecord::default();
        background.apply_patch(&mut record, identity_patch());
        background.apply_patch(&mut record, answers(&[(FieldKey::SexWithoutCondom, "Yes")]));
        let mut state = RecordState::Draft;
        background.create(&mut record, &mut state, today())
    });

    started_rx.recv().expect("save reaches the platform");

    // The platform renames its data element ids; a refresh picks them up,
    // but the parked save must finish against the snapshot it captured.
    *tracker.stage.lock().expect("stage mutex poisoned") = serde_json::json!({
        "programStageDataElements": [
            {"dataElement": {"id": "deCondomV2", "displayName": "Sex without condom", "valueType": "TEXT"}},
            {"dataElement": {"id": "deScoreV2", "displayName": "Risk score", "valueType": "INTEGER_ZERO_OR_POSITIVE"}}
        ]
    });
    service.refresh_schema().expect("refresh resolves the new ids");

    release_tx.send(()).expect("save resumes");
    handle
        .join()
        .expect("save thread completes")
        .expect("save succeeds");

    let event_create = tracker
        .inner
        .recorded()
        .into_iter()
        .find(|spec| spec.resource == ResourceKind::Events)
        .expect("event create submitted");
    let data_values = body_values(&event_create.body, "dataValues", "dataElement");
    assert!(data_values.iter().any(|(element, _)| *element == "deCondom"));
    assert!(!data_values.iter().any(|(element, _)| *element == "deCondomV2"));

    // The next save picks up the refreshed mapping.
    let snapshot = service.mappings();
    assert_eq!(
        snapshot
            .data_element(FieldKey::SexWithoutCondom)
            .expect("condom field resolved")
            .external_id,
        "deCondomV2"
    );
}

#[test]
fn identifier_tracks_identity_changes_as_a_live_projection() {
    let tracker = Arc::new(InMemoryTracker::default());
    let service = service_over(tracker);

    let mut record = ScreeningRecord::default();
    service.apply_patch(&mut record, identity_patch());
    assert_eq!(record.identity.identifier.as_deref(), Some("SkDr1070395"));

    service.apply_patch(
        &mut record,
        riskscreen::screening::RecordPatch {
            sex: Some("Female".to_string()),
            ..Default::default()
        },
    );
    assert_eq!(record.identity.identifier.as_deref(), Some("SkDr2070395"));
}
