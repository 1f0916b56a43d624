//! Create and update flows against the tracker platform.
//!
//! Both flows are strictly sequential: each step's payload depends on the
//! reference returned by the previous one, so nothing here is parallelized.
//! A failed step aborts the remaining steps; partially created platform
//! resources are left behind as recoverable orphans.

pub mod diff;
pub mod normalize;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::platform::{
    ImportConflict, MutateSpec, MutationResponse, PlatformTransport, QuerySpec, ResourceKind,
    TransportError,
};
use crate::screening::domain::{FieldKey, ScreeningRecord};
use crate::screening::identifier::generate_identifier;
use crate::screening::risk::{RiskConfig, RiskEngine, RiskProfile};
use crate::screening::schema::{FieldMapping, MappingSnapshot};
use crate::screening::validation::{self, ValidationIssue};

use diff::{compute_diff, DataValue};
use normalize::normalize_value;

/// Static fallback attribute ids used when the program-level mapping does
/// not resolve an identity field. Program mappings override these per key.
const FALLBACK_ATTRIBUTES: &[(FieldKey, &str)] = &[
    (FieldKey::Identifier, "aQ4fHPKzTcd"),
    (FieldKey::FamilyName, "bTmLeqKzVxr"),
    (FieldKey::LastName, "cWonGqYhHud"),
    (FieldKey::Sex, "dVrPqUeFmwk"),
    (FieldKey::DateOfBirth, "eKxSdTuWnyj"),
    (FieldKey::Phone, "fYcNvBoQrup"),
    (FieldKey::Province, "gZsMwAiXtoq"),
    (FieldKey::District, "hUaKeRjYvtw"),
    (FieldKey::Village, "iQbLfSkZxie"),
];

/// Everything a save needs from its surroundings, owned by the caller.
///
/// The mapping snapshot is captured when the save starts; a concurrent
/// schema refresh swaps the service's snapshot without affecting this one.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub program: String,
    pub program_stage: String,
    pub tracked_entity_type: String,
    pub org_unit: String,
    pub mapping: Arc<MappingSnapshot>,
}

/// Steps of the synchronization flows, used for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    EntityCreate,
    EnrollmentCreate,
    EventCreate,
    EventFetch,
    EventUpdate,
    AttributeUpdate,
}

impl SyncStep {
    pub const fn label(self) -> &'static str {
        match self {
            SyncStep::EntityCreate => "client registration",
            SyncStep::EnrollmentCreate => "program enrollment",
            SyncStep::EventCreate => "screening event creation",
            SyncStep::EventFetch => "screening event fetch",
            SyncStep::EventUpdate => "screening event update",
            SyncStep::AttributeUpdate => "client attribute update",
        }
    }
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failures of a save, per the error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("screening cannot be saved: {}", format_issues(.0))]
    Validation(Vec<ValidationIssue>),
    #[error("field mappings are not loaded, refresh the schema and retry")]
    SchemaUnavailable,
    #[error("{step} failed: {description}{}", format_conflicts(.conflicts))]
    ExternalWrite {
        step: SyncStep,
        description: String,
        conflicts: Vec<ImportConflict>,
    },
    #[error("{step} failed: record modified by another user, refresh and retry")]
    Conflict { step: SyncStep },
    #[error("{step} failed: cannot reach the tracker ({message})")]
    Network { step: SyncStep, message: String },
}

impl SyncError {
    fn from_transport(step: SyncStep, err: TransportError) -> Self {
        match err {
            TransportError::Conflict => SyncError::Conflict { step },
            TransportError::Network(message) => SyncError::Network { step, message },
            TransportError::Http { status, message } => SyncError::ExternalWrite {
                step,
                description: format!("server returned {status}: {message}"),
                conflicts: Vec::new(),
            },
            TransportError::Decode(message) => SyncError::ExternalWrite {
                step,
                description: format!("unreadable server response: {message}"),
                conflicts: Vec::new(),
            },
        }
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ValidationIssue::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_conflicts(conflicts: &[ImportConflict]) -> String {
    if conflicts.is_empty() {
        return String::new();
    }
    let rendered: Vec<String> = conflicts
        .iter()
        .map(|conflict| format!("{}: {}", conflict.object, conflict.value))
        .collect();
    format!(" (conflicts: {})", rendered.join(", "))
}

/// Result of a successful create.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub entity_id: String,
    pub enrollment_id: String,
    pub event_id: String,
    pub identifier: Option<String>,
    pub risk: RiskProfile,
}

/// Result of a successful update. `Partial` means the platform ignored some
/// of the submitted values; reconciliation is left to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Updated,
    Partial { ignored: u64 },
    NoChanges,
}

/// Wire pair for entity attributes.
#[derive(Debug, Clone, Serialize)]
struct AttributeValue {
    attribute: String,
    value: String,
}

/// Orchestrates the create and update protocols over an abstract transport.
pub struct SyncEngine<T: PlatformTransport> {
    transport: Arc<T>,
    risk: RiskEngine,
}

impl<T: PlatformTransport> SyncEngine<T> {
    pub fn new(transport: Arc<T>, risk_config: RiskConfig) -> Self {
        Self {
            transport,
            risk: RiskEngine::new(risk_config),
        }
    }

    pub fn risk_engine(&self) -> &RiskEngine {
        &self.risk
    }

    /// Creates entity, enrollment, and event for a draft record.
    ///
    /// The record is mutated in place: the identifier is filled in when
    /// absent and the computed risk fields are attached before the payloads
    /// are built.
    pub fn create(
        &self,
        ctx: &SessionContext,
        record: &mut ScreeningRecord,
        today: NaiveDate,
    ) -> Result<CreateOutcome, SyncError> {
        validation::validate(record, today).map_err(SyncError::Validation)?;
        if ctx.mapping.is_empty() {
            return Err(SyncError::SchemaUnavailable);
        }

        if record.identity.identifier.is_none() {
            record.identity.identifier = self.derive_identifier(record);
        }

        let risk = self.attach_computed_fields(record);

        let attributes = build_attribute_values(&ctx.mapping, record);
        let entity_body = json!({
            "trackedEntityType": ctx.tracked_entity_type,
            "orgUnit": record.org_unit.as_deref().unwrap_or(&ctx.org_unit),
            "attributes": attributes,
        });
        let entity_id = self.submit_for_reference(
            SyncStep::EntityCreate,
            MutateSpec::create(ResourceKind::TrackedEntities, entity_body),
        )?;
        info!(entity = %entity_id, "registered client entity");

        let enrollment_body = json!({
            "trackedEntityInstance": entity_id,
            "program": ctx.program,
            "orgUnit": record.org_unit.as_deref().unwrap_or(&ctx.org_unit),
            "enrollmentDate": today.format("%Y-%m-%d").to_string(),
            "incidentDate": today.format("%Y-%m-%d").to_string(),
        });
        let enrollment_id = self.submit_for_reference(
            SyncStep::EnrollmentCreate,
            MutateSpec::create(ResourceKind::Enrollments, enrollment_body),
        )?;

        let data_values = build_data_values(&ctx.mapping, record);
        let event_body = json!({
            "trackedEntityInstance": entity_id,
            "program": ctx.program,
            "programStage": ctx.program_stage,
            "enrollment": enrollment_id,
            "orgUnit": record.org_unit.as_deref().unwrap_or(&ctx.org_unit),
            "eventDate": today.format("%Y-%m-%d").to_string(),
            "status": "COMPLETED",
            "dataValues": data_values,
        });
        let event_id = self.submit_for_reference(
            SyncStep::EventCreate,
            MutateSpec::create(ResourceKind::Events, event_body),
        )?;
        info!(event = %event_id, score = risk.score, "screening saved");

        record.linkage.entity_id = Some(entity_id.clone());
        record.linkage.enrollment_id = Some(enrollment_id.clone());
        record.linkage.event_id = Some(event_id.clone());

        Ok(CreateOutcome {
            entity_id,
            enrollment_id,
            event_id,
            identifier: record.identity.identifier.clone(),
            risk,
        })
    }

    /// Updates an existing event, writing only values that differ from the
    /// platform's current state.
    pub fn update(
        &self,
        ctx: &SessionContext,
        record: &ScreeningRecord,
        today: NaiveDate,
    ) -> Result<UpdateOutcome, SyncError> {
        validation::validate(record, today).map_err(SyncError::Validation)?;
        if ctx.mapping.is_empty() {
            return Err(SyncError::SchemaUnavailable);
        }
        let event_id = record
            .linkage
            .event_id
            .clone()
            .ok_or_else(|| SyncError::Validation(vec![ValidationIssue::MissingEventReference]))?;

        // Last-write-wins guard: never blind-write against stale state.
        let event = self
            .transport
            .query(&QuerySpec::with_id(ResourceKind::Events, event_id.clone()))
            .map_err(|err| SyncError::from_transport(SyncStep::EventFetch, err))?;

        let mut working = record.clone();
        self.attach_computed_fields(&mut working);

        let current = diff::event_current_values(&event);
        let changed = compute_diff(&ctx.mapping, &working, &current);
        if changed.is_empty() {
            info!(event = %event_id, "no changes to save");
            return Ok(UpdateOutcome::NoChanges);
        }
        debug!(event = %event_id, values = changed.len(), "submitting changed values");

        // Envelope fields come from the freshly fetched event, never from
        // stale client state.
        let body = json!({
            "event": event_id,
            "program": event_field(&event, "program", &ctx.program),
            "programStage": event_field(&event, "programStage", &ctx.program_stage),
            "orgUnit": event_field(&event, "orgUnit", &ctx.org_unit),
            "eventDate": event_field(&event, "eventDate", &today.format("%Y-%m-%d").to_string()),
            "status": "COMPLETED",
            "dataValues": changed,
        });

        let response = self
            .transport
            .mutate(&MutateSpec::update(ResourceKind::Events, event_id.clone(), body))
            .map_err(|err| SyncError::from_transport(SyncStep::EventUpdate, err))?;

        let outcome = interpret_update(&response)?;

        // Non-critical step: attribute refresh is best effort and must not
        // fail the update.
        if let Some(entity_id) = record.linkage.entity_id.clone() {
            let attributes = build_attribute_values(&ctx.mapping, &working);
            let attribute_body = json!({ "attributes": attributes });
            if let Err(err) = self.transport.mutate(&MutateSpec::update(
                ResourceKind::TrackedEntities,
                entity_id,
                attribute_body,
            )) {
                warn!(step = %SyncStep::AttributeUpdate, error = %err, "attribute refresh skipped");
            }
        }

        Ok(outcome)
    }

    /// Loads a record from a persisted event for the edit/view entry path.
    ///
    /// Identity attributes are filled from the entity when it can be
    /// fetched; a failure there degrades to an answers-only record.
    pub fn load(
        &self,
        ctx: &SessionContext,
        event_id: &str,
    ) -> Result<ScreeningRecord, SyncError> {
        let event = self
            .transport
            .query(&QuerySpec::with_id(ResourceKind::Events, event_id))
            .map_err(|err| SyncError::from_transport(SyncStep::EventFetch, err))?;

        let mut record = ScreeningRecord::default();
        record.linkage.event_id = Some(event_id.to_string());
        record.linkage.entity_id = string_field(&event, "trackedEntityInstance");
        record.linkage.enrollment_id = string_field(&event, "enrollment");
        record.org_unit = string_field(&event, "orgUnit");

        let by_element: BTreeMap<&str, FieldKey> = ctx
            .mapping
            .data_elements
            .values()
            .map(|mapping| (mapping.external_id.as_str(), mapping.key))
            .collect();
        for (element, value) in diff::event_current_values(&event) {
            if let Some(key) = by_element.get(element.as_str()) {
                record.set_value(*key, value);
            }
        }

        if let Some(entity_id) = record.linkage.entity_id.clone() {
            match self
                .transport
                .query(&QuerySpec::with_id(ResourceKind::TrackedEntities, entity_id))
            {
                Ok(entity) => apply_entity_attributes(&ctx.mapping, &entity, &mut record),
                Err(err) => warn!(error = %err, "entity fetch skipped, identity left blank"),
            }
        }

        Ok(record)
    }

    /// Computes the risk profile without any side effect.
    pub fn score(&self, record: &ScreeningRecord) -> RiskProfile {
        self.risk.score(record)
    }

    fn derive_identifier(&self, record: &ScreeningRecord) -> Option<String> {
        let identity = &record.identity;
        generate_identifier(
            identity.family_name.as_deref()?,
            identity.last_name.as_deref()?,
            identity.sex.as_deref()?,
            identity.date_of_birth?,
        )
    }

    /// Attaches the computed score and level as regular answers so the
    /// payload builders treat them like any other field.
    fn attach_computed_fields(&self, record: &mut ScreeningRecord) -> RiskProfile {
        let profile = self.risk.score(record);
        record
            .answers
            .insert(FieldKey::RiskScore, profile.score.to_string());
        record
            .answers
            .insert(FieldKey::RiskLevel, profile.level.label().to_string());
        profile
    }

    fn submit_for_reference(
        &self,
        step: SyncStep,
        spec: MutateSpec,
    ) -> Result<String, SyncError> {
        let response = self
            .transport
            .mutate(&spec)
            .map_err(|err| SyncError::from_transport(step, err))?;

        match response.first_reference() {
            Some(reference) => Ok(reference.to_string()),
            None => Err(SyncError::ExternalWrite {
                step,
                description: response.description(),
                conflicts: response.conflicts(),
            }),
        }
    }
}

/// Reads the update/ignored counters. A write that applied nothing is a
/// failure even when the transport reported no error; ignored values on top
/// of applied ones make the outcome partial.
fn interpret_update(response: &MutationResponse) -> Result<UpdateOutcome, SyncError> {
    let counts = response.counts.unwrap_or_default();
    let applied = counts.updated + counts.imported;

    if applied == 0 {
        return Err(SyncError::ExternalWrite {
            step: SyncStep::EventUpdate,
            description: format!(
                "the platform applied none of the submitted values (ignored {})",
                counts.ignored
            ),
            conflicts: response.conflicts(),
        });
    }

    if counts.ignored > 0 {
        Ok(UpdateOutcome::Partial {
            ignored: counts.ignored,
        })
    } else {
        Ok(UpdateOutcome::Updated)
    }
}

/// Merged attribute table: resolved program mappings override the static
/// fallback per key, and the fallback guarantees the name fields are always
/// mappable.
fn merged_attribute_table(
    snapshot: &MappingSnapshot,
) -> BTreeMap<FieldKey, (String, Option<&FieldMapping>)> {
    let mut merged: BTreeMap<FieldKey, (String, Option<&FieldMapping>)> = FALLBACK_ATTRIBUTES
        .iter()
        .map(|(key, id)| (*key, (id.to_string(), None)))
        .collect();

    for mapping in snapshot.attributes.values() {
        merged.insert(mapping.key, (mapping.external_id.clone(), Some(mapping)));
    }

    merged
}

fn build_attribute_values(snapshot: &MappingSnapshot, record: &ScreeningRecord) -> Vec<AttributeValue> {
    merged_attribute_table(snapshot)
        .into_iter()
        .filter_map(|(key, (external_id, mapping))| {
            let raw = record.value_of(key)?;
            let value = match mapping {
                Some(mapping) => normalize_value(mapping, &raw)?,
                None => raw,
            };
            Some(AttributeValue {
                attribute: external_id,
                value,
            })
        })
        .collect()
}

fn build_data_values(snapshot: &MappingSnapshot, record: &ScreeningRecord) -> Vec<DataValue> {
    snapshot
        .data_elements
        .values()
        .filter_map(|mapping| {
            let raw = record.value_of(mapping.key)?;
            let value = normalize_value(mapping, &raw)?;
            Some(DataValue {
                data_element: mapping.external_id.clone(),
                value,
            })
        })
        .collect()
}

fn event_field(event: &Value, key: &str, fallback: &str) -> String {
    string_field(event, key).unwrap_or_else(|| fallback.to_string())
}

fn string_field(event: &Value, key: &str) -> Option<String> {
    event
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn apply_entity_attributes(
    snapshot: &MappingSnapshot,
    entity: &Value,
    record: &mut ScreeningRecord,
) {
    let by_attribute: BTreeMap<String, FieldKey> = merged_attribute_table(snapshot)
        .into_iter()
        .map(|(key, (external_id, _))| (external_id, key))
        .collect();

    let Some(values) = entity.get("attributes").and_then(Value::as_array) else {
        return;
    };
    for entry in values {
        let Some(attribute) = entry.get("attribute").and_then(Value::as_str) else {
            continue;
        };
        let Some(value) = entry.get("value").and_then(Value::as_str) else {
            continue;
        };
        if let Some(key) = by_attribute.get(attribute) {
            record.set_value(*key, value.to_string());
        }
    }
}
