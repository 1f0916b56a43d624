//! Resolution of the dynamic external schema into stable internal mappings.

pub mod rules;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::platform::metadata::FieldDefinition;
use crate::screening::domain::FieldKey;

pub use rules::{match_key, MappingRule, MAPPING_RULES};

/// Value type of an external field, normalized to the handful the
/// synchronization engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Text,
    Number,
    Date,
    Boolean,
    TrueOnly,
    OptionSet,
}

impl ValueType {
    /// Maps the platform's value-type string. Unknown or missing types are
    /// treated as text; an attached option set always wins.
    fn from_definition(definition: &FieldDefinition) -> Self {
        if definition
            .option_set
            .as_ref()
            .is_some_and(|set| !set.options.is_empty())
        {
            return ValueType::OptionSet;
        }

        let raw = match definition.value_type.as_deref() {
            Some(raw) => raw.to_ascii_uppercase(),
            None => return ValueType::Text,
        };

        if raw == "TRUE_ONLY" {
            ValueType::TrueOnly
        } else if raw == "BOOLEAN" {
            ValueType::Boolean
        } else if raw.contains("INTEGER") || raw.contains("NUMBER") {
            ValueType::Number
        } else if raw.contains("DATE") || raw == "AGE" {
            ValueType::Date
        } else {
            ValueType::Text
        }
    }
}

/// One `{code, label}` pair from an external option set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionPair {
    pub code: String,
    pub name: String,
}

/// A resolved external field: stable internal key, external id, value type,
/// and the option codes when the field is enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub key: FieldKey,
    pub external_id: String,
    pub value_type: ValueType,
    pub options: Vec<OptionPair>,
}

impl FieldMapping {
    fn from_definition(key: FieldKey, definition: &FieldDefinition) -> Self {
        let options = definition
            .option_set
            .as_ref()
            .map(|set| {
                set.options
                    .iter()
                    .map(|option| OptionPair {
                        code: option.code.clone(),
                        name: option.name.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            key,
            external_id: definition.id.clone(),
            value_type: ValueType::from_definition(definition),
            options,
        }
    }

    /// Resolves a human label to its backing code, matching the code or the
    /// name case-insensitively. Unknown labels pass through unchanged.
    pub fn resolve_option(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        self.options
            .iter()
            .find(|option| {
                option.code.eq_ignore_ascii_case(trimmed) || option.name.eq_ignore_ascii_case(trimmed)
            })
            .map(|option| option.code.clone())
            .unwrap_or_else(|| trimmed.to_string())
    }
}

/// Immutable result of one schema resolution.
///
/// Attribute and data-element mappings are kept in separate tables because
/// their external id namespaces are disjoint; labels are shared. Rebuilt
/// only by an explicit refresh and shared behind an `Arc`, so an in-flight
/// save always works against the snapshot it started with.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingSnapshot {
    pub attributes: BTreeMap<FieldKey, FieldMapping>,
    pub data_elements: BTreeMap<FieldKey, FieldMapping>,
    pub labels: BTreeMap<FieldKey, String>,
}

impl MappingSnapshot {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.data_elements.is_empty()
    }

    /// Builds the snapshot from the two schema sources.
    ///
    /// Each definition's normalized display name is run through the rule
    /// table; the first definition to claim an internal key keeps it and
    /// later matches for the same key are ignored. Unmatched definitions
    /// are dropped.
    pub fn resolve(
        stage_fields: &[FieldDefinition],
        entity_attributes: &[FieldDefinition],
        locale: &str,
    ) -> Self {
        let mut snapshot = MappingSnapshot::default();

        assign_source(
            &mut snapshot.data_elements,
            &mut snapshot.labels,
            stage_fields,
            locale,
        );
        assign_source(
            &mut snapshot.attributes,
            &mut snapshot.labels,
            entity_attributes,
            locale,
        );

        snapshot
    }

    pub fn data_element(&self, key: FieldKey) -> Option<&FieldMapping> {
        self.data_elements.get(&key)
    }

    pub fn attribute(&self, key: FieldKey) -> Option<&FieldMapping> {
        self.attributes.get(&key)
    }

    pub fn label(&self, key: FieldKey) -> Option<&str> {
        self.labels.get(&key).map(String::as_str)
    }
}

fn assign_source(
    table: &mut BTreeMap<FieldKey, FieldMapping>,
    labels: &mut BTreeMap<FieldKey, String>,
    definitions: &[FieldDefinition],
    locale: &str,
) {
    for definition in definitions {
        let normalized = normalize_display_name(&definition.display_name);
        let Some(key) = rules::match_key(&normalized) else {
            continue;
        };

        // Single-assignment policy: the first definition wins the key.
        if table.contains_key(&key) {
            continue;
        }

        table.insert(key, FieldMapping::from_definition(key, definition));
        labels
            .entry(key)
            .or_insert_with(|| definition.label_for(locale));
    }
}

/// Strips zero-width characters, collapses whitespace, and lowercases so the
/// rule substrings match reliably.
pub(crate) fn normalize_display_name(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::metadata::{OptionDef, OptionSetDef, Translation};

    fn definition(id: &str, name: &str, value_type: Option<&str>) -> FieldDefinition {
        FieldDefinition {
            id: id.to_string(),
            display_name: name.to_string(),
            value_type: value_type.map(str::to_string),
            ..FieldDefinition::default()
        }
    }

    #[test]
    fn resolves_exactly_one_entry_per_matched_definition() {
        let stage = vec![
            definition("de1", "Sex without condom", Some("TEXT")),
            definition("de2", "Favorite color", Some("TEXT")),
        ];
        let snapshot = MappingSnapshot::resolve(&stage, &[], "en");

        assert_eq!(snapshot.data_elements.len(), 1);
        let mapping = snapshot
            .data_element(FieldKey::SexWithoutCondom)
            .expect("condom field resolved");
        assert_eq!(mapping.external_id, "de1");
    }

    #[test]
    fn first_definition_keeps_the_key() {
        let stage = vec![
            definition("de1", "Number of sexual partners", Some("INTEGER_POSITIVE")),
            definition("de2", "How many partners in the last year", Some("TEXT")),
        ];
        let snapshot = MappingSnapshot::resolve(&stage, &[], "en");

        let mapping = snapshot
            .data_element(FieldKey::NumberOfSexualPartners)
            .expect("partner count resolved");
        assert_eq!(mapping.external_id, "de1");
        assert_eq!(mapping.value_type, ValueType::Number);
    }

    #[test]
    fn missing_value_type_defaults_to_text() {
        let stage = vec![definition("de1", "Used recreational drugs", None)];
        let snapshot = MappingSnapshot::resolve(&stage, &[], "en");

        assert_eq!(
            snapshot
                .data_element(FieldKey::UsedDrugs)
                .expect("resolved")
                .value_type,
            ValueType::Text
        );
    }

    #[test]
    fn option_set_forces_the_value_type_and_resolves_codes() {
        let mut def = definition("de1", "HIV test result", Some("TEXT"));
        def.option_set = Some(OptionSetDef {
            options: vec![
                OptionDef {
                    code: "POS".to_string(),
                    name: "Positive".to_string(),
                },
                OptionDef {
                    code: "NEG".to_string(),
                    name: "Negative".to_string(),
                },
            ],
        });
        let snapshot = MappingSnapshot::resolve(&[def], &[], "en");

        let mapping = snapshot
            .data_element(FieldKey::HivTestResult)
            .expect("resolved");
        assert_eq!(mapping.value_type, ValueType::OptionSet);
        assert_eq!(mapping.resolve_option("negative"), "NEG");
        assert_eq!(mapping.resolve_option("neg"), "NEG");
        assert_eq!(mapping.resolve_option("Reactive"), "Reactive");
    }

    #[test]
    fn labels_prefer_locale_translations() {
        let mut def = definition("at1", "Family name", Some("TEXT"));
        def.translations = vec![Translation {
            property: "NAME".to_string(),
            locale: "km".to_string(),
            value: "នាមត្រកូល".to_string(),
        }];
        let snapshot = MappingSnapshot::resolve(&[], &[def], "km");

        assert_eq!(snapshot.label(FieldKey::FamilyName), Some("នាមត្រកូល"));
    }

    #[test]
    fn attribute_and_stage_sources_stay_separate() {
        let stage = vec![definition("de1", "Risk score", Some("NUMBER"))];
        let attrs = vec![definition("at1", "Sex", Some("TEXT"))];
        let snapshot = MappingSnapshot::resolve(&stage, &attrs, "en");

        assert!(snapshot.data_element(FieldKey::RiskScore).is_some());
        assert!(snapshot.attribute(FieldKey::Sex).is_some());
        assert!(snapshot.attribute(FieldKey::RiskScore).is_none());
        assert!(!snapshot.is_empty());
    }
}
