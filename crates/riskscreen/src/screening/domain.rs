use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Internal semantic keys for every field the screening collects.
///
/// The wire names of these fields belong to the external schema and are
/// resolved at runtime; this enum is the stable vocabulary the rest of the
/// crate speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldKey {
    #[serde(rename = "identifier")]
    Identifier,
    #[serde(rename = "familyName")]
    FamilyName,
    #[serde(rename = "lastName")]
    LastName,
    #[serde(rename = "sex")]
    Sex,
    #[serde(rename = "genderIdentity")]
    GenderIdentity,
    #[serde(rename = "dateOfBirth")]
    DateOfBirth,
    #[serde(rename = "phone")]
    Phone,
    #[serde(rename = "province")]
    Province,
    #[serde(rename = "district")]
    District,
    #[serde(rename = "village")]
    Village,
    #[serde(rename = "sexWithHIVPartner")]
    SexWithHivPartner,
    #[serde(rename = "sexWithoutCondom")]
    SexWithoutCondom,
    #[serde(rename = "numberOfSexualPartners")]
    NumberOfSexualPartners,
    #[serde(rename = "sexWorker")]
    SexWorker,
    #[serde(rename = "injectedDrugs")]
    InjectedDrugs,
    #[serde(rename = "usedDrugs")]
    UsedDrugs,
    #[serde(rename = "alcoholBeforeSex")]
    AlcoholBeforeSex,
    #[serde(rename = "stiSymptoms")]
    StiSymptoms,
    #[serde(rename = "hivTestResult")]
    HivTestResult,
    #[serde(rename = "riskScore")]
    RiskScore,
    #[serde(rename = "riskLevel")]
    RiskLevel,
}

impl FieldKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            FieldKey::Identifier => "identifier",
            FieldKey::FamilyName => "familyName",
            FieldKey::LastName => "lastName",
            FieldKey::Sex => "sex",
            FieldKey::GenderIdentity => "genderIdentity",
            FieldKey::DateOfBirth => "dateOfBirth",
            FieldKey::Phone => "phone",
            FieldKey::Province => "province",
            FieldKey::District => "district",
            FieldKey::Village => "village",
            FieldKey::SexWithHivPartner => "sexWithHIVPartner",
            FieldKey::SexWithoutCondom => "sexWithoutCondom",
            FieldKey::NumberOfSexualPartners => "numberOfSexualPartners",
            FieldKey::SexWorker => "sexWorker",
            FieldKey::InjectedDrugs => "injectedDrugs",
            FieldKey::UsedDrugs => "usedDrugs",
            FieldKey::AlcoholBeforeSex => "alcoholBeforeSex",
            FieldKey::StiSymptoms => "stiSymptoms",
            FieldKey::HivTestResult => "hivTestResult",
            FieldKey::RiskScore => "riskScore",
            FieldKey::RiskLevel => "riskLevel",
        }
    }

    /// Answer keys whose values are constrained to yes/no.
    pub const YES_NO_KEYS: &'static [FieldKey] = &[
        FieldKey::SexWithHivPartner,
        FieldKey::SexWithoutCondom,
        FieldKey::SexWorker,
        FieldKey::InjectedDrugs,
        FieldKey::UsedDrugs,
        FieldKey::AlcoholBeforeSex,
        FieldKey::StiSymptoms,
    ];
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Biological sex as captured on the identity panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
    Other,
}

impl Sex {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Some(Sex::Male),
            "female" | "f" => Some(Sex::Female),
            "other" => Some(Sex::Other),
            _ => None,
        }
    }

    /// Digit used inside the generated client identifier.
    pub const fn identifier_digit(self) -> &'static str {
        match self {
            Sex::Male => "1",
            Sex::Female => "2",
            Sex::Other => "",
        }
    }
}

/// Identity fields collected once per client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub family_name: Option<String>,
    pub last_name: Option<String>,
    pub sex: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: Option<String>,
    pub province: Option<String>,
    pub district: Option<String>,
    pub village: Option<String>,
    pub identifier: Option<String>,
}

/// References handed back by the platform once a record is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLinkage {
    pub entity_id: Option<String>,
    pub enrollment_id: Option<String>,
    pub event_id: Option<String>,
}

/// The in-memory form state for one screening session.
///
/// Mutated only through [`ScreeningRecord::merge`]; components read values
/// uniformly through [`ScreeningRecord::value_of`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreeningRecord {
    #[serde(default)]
    pub identity: ClientIdentity,
    #[serde(default)]
    pub org_unit: Option<String>,
    #[serde(default)]
    pub answers: BTreeMap<FieldKey, String>,
    #[serde(default)]
    pub linkage: ExternalLinkage,
}

impl ScreeningRecord {
    /// Shallow-merges a partial update; `Some` fields win, answer entries
    /// overwrite by key, everything else is untouched.
    pub fn merge(&mut self, patch: RecordPatch) {
        let RecordPatch {
            family_name,
            last_name,
            sex,
            date_of_birth,
            phone,
            province,
            district,
            village,
            org_unit,
            answers,
        } = patch;

        merge_field(&mut self.identity.family_name, family_name);
        merge_field(&mut self.identity.last_name, last_name);
        merge_field(&mut self.identity.sex, sex);
        if date_of_birth.is_some() {
            self.identity.date_of_birth = date_of_birth;
        }
        merge_field(&mut self.identity.phone, phone);
        merge_field(&mut self.identity.province, province);
        merge_field(&mut self.identity.district, district);
        merge_field(&mut self.identity.village, village);
        merge_field(&mut self.org_unit, org_unit);

        for (key, value) in answers {
            self.answers.insert(key, value);
        }
    }

    /// Projects any field, identity or answer, as the string the wire
    /// format expects.
    pub fn value_of(&self, key: FieldKey) -> Option<String> {
        let identity = &self.identity;
        let value = match key {
            FieldKey::Identifier => identity.identifier.clone(),
            FieldKey::FamilyName => identity.family_name.clone(),
            FieldKey::LastName => identity.last_name.clone(),
            FieldKey::Sex => identity.sex.clone(),
            FieldKey::DateOfBirth => identity
                .date_of_birth
                .map(|date| date.format("%Y-%m-%d").to_string()),
            FieldKey::Phone => identity.phone.clone(),
            FieldKey::Province => identity.province.clone(),
            FieldKey::District => identity.district.clone(),
            FieldKey::Village => identity.village.clone(),
            _ => self.answers.get(&key).cloned(),
        };

        value.filter(|text| !text.trim().is_empty())
    }

    pub fn answer(&self, key: FieldKey) -> Option<&str> {
        self.answers.get(&key).map(String::as_str)
    }

    /// Writes one field by key, routing identity keys to their typed slots
    /// and everything else into the answer map. Used when pre-populating a
    /// record from fetched platform state.
    pub fn set_value(&mut self, key: FieldKey, value: String) {
        match key {
            FieldKey::Identifier => self.identity.identifier = Some(value),
            FieldKey::FamilyName => self.identity.family_name = Some(value),
            FieldKey::LastName => self.identity.last_name = Some(value),
            FieldKey::Sex => self.identity.sex = Some(value),
            FieldKey::DateOfBirth => {
                self.identity.date_of_birth =
                    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok();
            }
            FieldKey::Phone => self.identity.phone = Some(value),
            FieldKey::Province => self.identity.province = Some(value),
            FieldKey::District => self.identity.district = Some(value),
            FieldKey::Village => self.identity.village = Some(value),
            _ => {
                self.answers.insert(key, value);
            }
        }
    }

    /// Clears the record back to an empty draft, preserving the operator's
    /// org-unit selection.
    pub fn reset_for_new_entry(&mut self) {
        let org_unit = self.org_unit.take();
        *self = ScreeningRecord {
            org_unit,
            ..ScreeningRecord::default()
        };
    }
}

fn merge_field(slot: &mut Option<String>, incoming: Option<String>) {
    if let Some(value) = incoming {
        *slot = Some(value);
    }
}

/// Partial update applied through the single merge operation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub org_unit: Option<String>,
    #[serde(default)]
    pub answers: BTreeMap<FieldKey, String>,
}

/// Lifecycle of a record relative to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    Draft,
    Creating,
    Created,
    CreateFailed,
    Loaded,
    Updating,
    Updated,
    UpdateFailed,
}

impl RecordState {
    pub const fn label(self) -> &'static str {
        match self {
            RecordState::Draft => "draft",
            RecordState::Creating => "creating",
            RecordState::Created => "created",
            RecordState::CreateFailed => "create_failed",
            RecordState::Loaded => "loaded",
            RecordState::Updating => "updating",
            RecordState::Updated => "updated",
            RecordState::UpdateFailed => "update_failed",
        }
    }
}
