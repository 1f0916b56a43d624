//! Ordered name-matching rules for schema resolution.
//!
//! The external schema is matched by display name, not by id, so the rules
//! live here as data: each entry lists the substrings a normalized name must
//! contain (`all`) and must not contain (`none`). The table is scanned top to
//! bottom and the first matching rule wins, which is why the more specific
//! entries come first.

use crate::screening::domain::FieldKey;

#[derive(Debug, Clone, Copy)]
pub struct MappingRule {
    pub key: FieldKey,
    pub all: &'static [&'static str],
    pub none: &'static [&'static str],
}

pub const MAPPING_RULES: &[MappingRule] = &[
    MappingRule {
        key: FieldKey::GenderIdentity,
        all: &["gender", "identif"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::RiskScore,
        all: &["risk", "score"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::RiskLevel,
        all: &["risk", "level"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::RiskLevel,
        all: &["risk", "category"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::SexWithHivPartner,
        all: &["hiv", "partner"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::HivTestResult,
        all: &["hiv", "result"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::HivTestResult,
        all: &["hiv", "test"],
        none: &["date"],
    },
    MappingRule {
        key: FieldKey::SexWithoutCondom,
        all: &["condom"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::NumberOfSexualPartners,
        all: &["number", "partner"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::NumberOfSexualPartners,
        all: &["many", "partner"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::SexWorker,
        all: &["sex work"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::SexWorker,
        all: &["entertainment"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::InjectedDrugs,
        all: &["inject"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::UsedDrugs,
        all: &["drug"],
        none: &["inject"],
    },
    MappingRule {
        key: FieldKey::AlcoholBeforeSex,
        all: &["alcohol"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::StiSymptoms,
        all: &["sti", "symptom"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::StiSymptoms,
        all: &["sexually transmitted"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::Identifier,
        all: &["identifier"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::Identifier,
        all: &["client", "code"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::FamilyName,
        all: &["family"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::LastName,
        all: &["last", "name"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::LastName,
        all: &["surname"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::DateOfBirth,
        all: &["birth"],
        none: &["sex"],
    },
    MappingRule {
        key: FieldKey::Sex,
        all: &["sex"],
        none: &["birth"],
    },
    MappingRule {
        key: FieldKey::Phone,
        all: &["phone"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::Phone,
        all: &["contact", "number"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::Province,
        all: &["province"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::District,
        all: &["district"],
        none: &[],
    },
    MappingRule {
        key: FieldKey::Village,
        all: &["village"],
        none: &[],
    },
];

/// First rule whose predicates all hold for the normalized name.
pub fn match_key(normalized_name: &str) -> Option<FieldKey> {
    MAPPING_RULES
        .iter()
        .find(|rule| {
            rule.all.iter().all(|needle| normalized_name.contains(needle))
                && rule.none.iter().all(|needle| !normalized_name.contains(needle))
        })
        .map(|rule| rule.key)
}
