//! Schema metadata read from the tracker at runtime.
//!
//! Definitions arrive from two independent sources: the program stage lists
//! its data elements, and the program lists its tracked-entity attributes.
//! Both are reduced to [`FieldDefinition`] so the mapping resolver can treat
//! them uniformly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{PlatformTransport, QuerySpec, ResourceKind, TransportError};

/// One collectible field as described by the platform schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub value_type: Option<String>,
    #[serde(default)]
    pub translations: Vec<Translation>,
    #[serde(default)]
    pub option_set: Option<OptionSetDef>,
}

impl FieldDefinition {
    /// The label for a locale: a NAME translation when present, else the
    /// default display name.
    pub fn label_for(&self, locale: &str) -> String {
        self.translations
            .iter()
            .find(|translation| {
                translation.property.eq_ignore_ascii_case("name")
                    && translation.locale.eq_ignore_ascii_case(locale)
            })
            .map(|translation| translation.value.clone())
            .unwrap_or_else(|| self.display_name.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Translation {
    #[serde(default)]
    pub property: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionSetDef {
    #[serde(default)]
    pub options: Vec<OptionDef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionDef {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
}

/// An organisation unit offered for capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgUnit {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

const FIELD_PROJECTION: &str =
    "id,displayName,valueType,translations[property,locale,value],optionSet[options[code,name]]";

/// Fetches the stage-level data element definitions.
pub fn fetch_stage_fields<T: PlatformTransport + ?Sized>(
    transport: &T,
    program_stage: &str,
) -> Result<Vec<FieldDefinition>, TransportError> {
    let spec = QuerySpec::with_id(ResourceKind::ProgramStages, program_stage).param(
        "fields",
        format!("programStageDataElements[dataElement[{FIELD_PROJECTION}]]"),
    );
    let body = transport.query(&spec)?;
    Ok(collect_definitions(
        &body,
        "programStageDataElements",
        "dataElement",
    ))
}

/// Fetches the entity-level attribute definitions for a program.
pub fn fetch_entity_attributes<T: PlatformTransport + ?Sized>(
    transport: &T,
    program: &str,
) -> Result<Vec<FieldDefinition>, TransportError> {
    let spec = QuerySpec::with_id(ResourceKind::Programs, program).param(
        "fields",
        format!("programTrackedEntityAttributes[trackedEntityAttribute[{FIELD_PROJECTION}]]"),
    );
    let body = transport.query(&spec)?;
    Ok(collect_definitions(
        &body,
        "programTrackedEntityAttributes",
        "trackedEntityAttribute",
    ))
}

/// Lists organisation units for the capture surface.
pub fn fetch_org_units<T: PlatformTransport + ?Sized>(
    transport: &T,
) -> Result<Vec<OrgUnit>, TransportError> {
    let spec = QuerySpec::resource(ResourceKind::OrganisationUnits)
        .param("fields", "id,displayName")
        .param("paging", "false");
    let body = transport.query(&spec)?;
    let units = body
        .get("organisationUnits")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default();
    Ok(units)
}

fn collect_definitions(body: &Value, list_key: &str, item_key: &str) -> Vec<FieldDefinition> {
    body.get(list_key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(item_key))
                .filter_map(|definition| serde_json::from_value(definition.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
