//! Session facade over the synchronization engine.
//!
//! Owns the mapping snapshot, the record lifecycle state transitions, and
//! the re-entrancy guard; the engine itself stays stateless.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tracing::info;

use crate::config::TrackerConfig;
use crate::platform::metadata::{self, OrgUnit};
use crate::platform::{PlatformTransport, TransportError};
use crate::screening::domain::{RecordPatch, RecordState, ScreeningRecord};
use crate::screening::identifier::generate_identifier;
use crate::screening::risk::{RiskConfig, RiskProfile};
use crate::screening::schema::MappingSnapshot;
use crate::screening::sync::{CreateOutcome, SessionContext, SyncEngine, SyncError, UpdateOutcome};

/// Tracker identifiers the service operates against.
#[derive(Debug, Clone, Default)]
pub struct TrackerSettings {
    pub program: String,
    pub program_stage: String,
    pub tracked_entity_type: String,
    pub org_unit: String,
    pub locale: String,
}

impl From<&TrackerConfig> for TrackerSettings {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            program: config.program.clone(),
            program_stage: config.program_stage.clone(),
            tracked_entity_type: config.tracked_entity_type.clone(),
            org_unit: config.org_unit.clone(),
            locale: config.locale.clone(),
        }
    }
}

/// Error raised by the screening service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("a save is already in progress for this record")]
    SaveInFlight,
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("schema refresh failed: {0}")]
    Transport(#[from] TransportError),
}

/// Service composing the transport, the mapping snapshot, and the engine.
pub struct ScreeningService<T: PlatformTransport> {
    engine: SyncEngine<T>,
    transport: Arc<T>,
    settings: TrackerSettings,
    snapshot: Mutex<Arc<MappingSnapshot>>,
    saving: AtomicBool,
}

impl<T: PlatformTransport> ScreeningService<T> {
    pub fn new(transport: Arc<T>, settings: TrackerSettings, risk_config: RiskConfig) -> Self {
        Self {
            engine: SyncEngine::new(transport.clone(), risk_config),
            transport,
            settings,
            snapshot: Mutex::new(Arc::new(MappingSnapshot::default())),
            saving: AtomicBool::new(false),
        }
    }

    /// Re-fetches the external schema and swaps in a fresh snapshot.
    ///
    /// An in-flight save keeps working against the snapshot it captured, so
    /// the swap never interleaves with payload construction.
    pub fn refresh_schema(&self) -> Result<(), ServiceError> {
        let stage_fields = metadata::fetch_stage_fields(&*self.transport, &self.settings.program_stage)?;
        let entity_attributes =
            metadata::fetch_entity_attributes(&*self.transport, &self.settings.program)?;
        let resolved = MappingSnapshot::resolve(&stage_fields, &entity_attributes, &self.settings.locale);
        info!(
            data_elements = resolved.data_elements.len(),
            attributes = resolved.attributes.len(),
            "schema mappings resolved"
        );

        let mut guard = self.snapshot.lock().expect("snapshot mutex poisoned");
        *guard = Arc::new(resolved);
        Ok(())
    }

    /// The current mapping snapshot.
    pub fn mappings(&self) -> Arc<MappingSnapshot> {
        self.snapshot.lock().expect("snapshot mutex poisoned").clone()
    }

    fn context(&self) -> SessionContext {
        SessionContext {
            program: self.settings.program.clone(),
            program_stage: self.settings.program_stage.clone(),
            tracked_entity_type: self.settings.tracked_entity_type.clone(),
            org_unit: self.settings.org_unit.clone(),
            mapping: self.mappings(),
        }
    }

    /// Merges a partial update into the record and keeps the generated
    /// identifier in step with the identity fields. The identifier is a live
    /// projection: any change to its inputs overwrites the previous value.
    pub fn apply_patch(&self, record: &mut ScreeningRecord, patch: RecordPatch) {
        record.merge(patch);

        let identity = &record.identity;
        if let (Some(family), Some(last), Some(sex), Some(dob)) = (
            identity.family_name.as_deref(),
            identity.last_name.as_deref(),
            identity.sex.as_deref(),
            identity.date_of_birth,
        ) {
            if let Some(code) = generate_identifier(family, last, sex, dob) {
                record.identity.identifier = Some(code);
            }
        }
    }

    /// Pure scoring passthrough for previews.
    pub fn score(&self, record: &ScreeningRecord) -> RiskProfile {
        self.engine.score(record)
    }

    /// Runs the create protocol for a draft record.
    ///
    /// On success the record is reset to an empty draft (org unit kept) and
    /// the state lands on `Created`; on failure the state lands on
    /// `CreateFailed` and the record is left intact for a retry.
    pub fn create(
        &self,
        record: &mut ScreeningRecord,
        state: &mut RecordState,
        today: NaiveDate,
    ) -> Result<CreateOutcome, ServiceError> {
        let _guard = self.begin_save()?;
        let ctx = self.context();

        *state = RecordState::Creating;
        match self.engine.create(&ctx, record, today) {
            Ok(outcome) => {
                *state = RecordState::Created;
                record.reset_for_new_entry();
                Ok(outcome)
            }
            Err(err) => {
                *state = RecordState::CreateFailed;
                Err(err.into())
            }
        }
    }

    /// Runs the update protocol for a loaded record.
    pub fn update(
        &self,
        record: &ScreeningRecord,
        state: &mut RecordState,
        today: NaiveDate,
    ) -> Result<UpdateOutcome, ServiceError> {
        let _guard = self.begin_save()?;
        let ctx = self.context();

        *state = RecordState::Updating;
        match self.engine.update(&ctx, record, today) {
            Ok(UpdateOutcome::NoChanges) => {
                *state = RecordState::Loaded;
                Ok(UpdateOutcome::NoChanges)
            }
            Ok(outcome) => {
                *state = RecordState::Updated;
                Ok(outcome)
            }
            Err(err) => {
                *state = RecordState::UpdateFailed;
                Err(err.into())
            }
        }
    }

    /// Loads a persisted screening for the edit/view entry path.
    pub fn load(&self, event_id: &str) -> Result<ScreeningRecord, ServiceError> {
        let ctx = self.context();
        Ok(self.engine.load(&ctx, event_id)?)
    }

    /// Organisation units available to the capture surface.
    pub fn org_units(&self) -> Result<Vec<OrgUnit>, ServiceError> {
        Ok(metadata::fetch_org_units(&*self.transport)?)
    }

    fn begin_save(&self) -> Result<SaveGuard<'_>, ServiceError> {
        if self
            .saving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ServiceError::SaveInFlight);
        }
        Ok(SaveGuard { flag: &self.saving })
    }
}

/// Clears the saving flag when the save completes or fails.
struct SaveGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
