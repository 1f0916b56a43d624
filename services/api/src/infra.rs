use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use riskscreen::screening::{FieldKey, RecordPatch};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Canned record used by the CLI scoring demo when no file is given.
pub(crate) fn sample_patch() -> RecordPatch {
    let mut answers = BTreeMap::new();
    answers.insert(FieldKey::SexWithHivPartner, "Yes".to_string());
    answers.insert(FieldKey::SexWithoutCondom, "Yes".to_string());
    answers.insert(FieldKey::NumberOfSexualPartners, "6+".to_string());
    answers.insert(FieldKey::HivTestResult, "Unknown".to_string());

    RecordPatch {
        family_name: Some("Dara".to_string()),
        last_name: Some("Sok".to_string()),
        sex: Some("Male".to_string()),
        date_of_birth: NaiveDate::from_ymd_opt(1995, 3, 7),
        province: Some("Phnom Penh".to_string()),
        district: Some("Chamkar Mon".to_string()),
        answers,
        ..RecordPatch::default()
    }
}
