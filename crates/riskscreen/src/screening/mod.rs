//! Screening capture: domain model, schema resolution, scoring, and
//! synchronization with the tracker platform.

pub mod domain;
pub mod identifier;
pub mod risk;
pub mod schema;
pub mod service;
pub mod sync;
pub mod validation;

pub use domain::{
    ClientIdentity, ExternalLinkage, FieldKey, RecordPatch, RecordState, ScreeningRecord, Sex,
};
pub use identifier::generate_identifier;
pub use risk::{RiskConfig, RiskEngine, RiskLevel, RiskProfile};
pub use schema::{FieldMapping, MappingSnapshot, ValueType};
pub use service::{ScreeningService, ServiceError, TrackerSettings};
pub use sync::{CreateOutcome, SessionContext, SyncEngine, SyncError, SyncStep, UpdateOutcome};
pub use validation::{validate, ValidationIssue};
