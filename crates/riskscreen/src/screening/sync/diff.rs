//! Diff computation for the update flow.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::normalize::normalize_value;
use crate::screening::domain::ScreeningRecord;
use crate::screening::schema::MappingSnapshot;

/// One `{dataElement, value}` pair on the event wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataValue {
    #[serde(rename = "dataElement")]
    pub data_element: String,
    pub value: String,
}

/// Extracts the authoritative current values from a fetched event, keyed by
/// data element id.
pub fn event_current_values(event: &Value) -> BTreeMap<String, String> {
    event
        .get("dataValues")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|entry| {
                    let data_element = entry.get("dataElement")?.as_str()?;
                    let value = entry.get("value")?.as_str()?;
                    Some((data_element.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Values to send on update: defined, non-empty after normalization, and
/// different from the platform's current value.
pub fn compute_diff(
    snapshot: &MappingSnapshot,
    record: &ScreeningRecord,
    current: &BTreeMap<String, String>,
) -> Vec<DataValue> {
    let mut diff = Vec::new();

    for mapping in snapshot.data_elements.values() {
        let Some(raw) = record.value_of(mapping.key) else {
            continue;
        };
        let Some(normalized) = normalize_value(mapping, &raw) else {
            continue;
        };

        if current.get(&mapping.external_id) == Some(&normalized) {
            continue;
        }

        diff.push(DataValue {
            data_element: mapping.external_id.clone(),
            value: normalized,
        });
    }

    diff
}
