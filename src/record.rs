//! Entity record model and pre-expansion validation.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::FeatureCatalog;
use crate::expand::ExpandError;

pub const START_DATE_FIELD: &str = "START_DATE";
pub const END_DATE_FIELD: &str = "END_DATE";

/// One entity-period-of-record: a flat JSON object holding scalar attribute
/// features, index-aligned sequence arrays, and the START_DATE / END_DATE
/// bounds. The catalog decides which fields mean what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRecord {
    pub fields: Map<String, Value>,
}

impl EntityRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A record that passed validation: key extracted, date bounds parsed, the
/// DateTime axis parsed once and checked non-decreasing, and every declared
/// sequence confirmed index-aligned with the axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord<'a> {
    pub entity_key: String,
    pub start_date: NaiveDateTime,
    /// True inclusive end: parsed END_DATE + 1 day - 1 second, because the
    /// raw field carries midnight for an end-of-day bound.
    pub end_date: NaiveDateTime,
    pub axis: Vec<NaiveDateTime>,
    pub record: &'a EntityRecord,
}

impl<'a> ValidatedRecord<'a> {
    pub fn sequence(&self, feature: &str) -> Result<&'a [Value], ExpandError> {
        sequence_values(self.record, feature, &self.entity_key)
    }
}

pub fn validate_record<'a>(
    record: &'a EntityRecord,
    catalog: &FeatureCatalog,
) -> Result<ValidatedRecord<'a>, ExpandError> {
    let entity_key = record
        .field(&catalog.key_attribute)
        .map(value_to_string)
        .ok_or_else(|| ExpandError::MissingFeature {
            entity_key: "<missing key>".to_string(),
            feature: catalog.key_attribute.clone(),
        })?;

    let pattern = catalog.timestamp_pattern.as_str();
    let start_date = parse_scalar_timestamp(record, START_DATE_FIELD, pattern, &entity_key)?;
    let end_date = parse_scalar_timestamp(record, END_DATE_FIELD, pattern, &entity_key)?
        + Duration::days(1)
        - Duration::seconds(1);

    let axis_feature = catalog.datetime_sequence.as_str();
    let raw_axis = sequence_values(record, axis_feature, &entity_key)?;
    let mut axis = Vec::with_capacity(raw_axis.len());
    for value in raw_axis {
        axis.push(parse_timestamp_value(value, axis_feature, pattern, &entity_key)?);
    }

    for (index, pair) in axis.windows(2).enumerate() {
        if pair[1] < pair[0] {
            return Err(ExpandError::NonMonotonicTimestamps {
                entity_key,
                feature: axis_feature.to_string(),
                index: index + 1,
            });
        }
    }

    for feature in catalog
        .categorical_sequences()
        .iter()
        .chain(catalog.numeric_sequences())
    {
        let sequence = sequence_values(record, feature, &entity_key)?;
        if sequence.len() != axis.len() {
            return Err(ExpandError::MisalignedSequence {
                entity_key,
                feature: feature.clone(),
                expected: axis.len(),
                found: sequence.len(),
            });
        }
    }

    Ok(ValidatedRecord {
        entity_key,
        start_date,
        end_date,
        axis,
        record,
    })
}

fn sequence_values<'a>(
    record: &'a EntityRecord,
    feature: &str,
    entity_key: &str,
) -> Result<&'a [Value], ExpandError> {
    let value = record
        .field(feature)
        .ok_or_else(|| ExpandError::MissingFeature {
            entity_key: entity_key.to_string(),
            feature: feature.to_string(),
        })?;
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| ExpandError::NotASequence {
            entity_key: entity_key.to_string(),
            feature: feature.to_string(),
        })
}

fn parse_scalar_timestamp(
    record: &EntityRecord,
    field: &str,
    pattern: &str,
    entity_key: &str,
) -> Result<NaiveDateTime, ExpandError> {
    let value = record
        .field(field)
        .ok_or_else(|| ExpandError::MissingFeature {
            entity_key: entity_key.to_string(),
            feature: field.to_string(),
        })?;
    parse_timestamp_value(value, field, pattern, entity_key)
}

fn parse_timestamp_value(
    value: &Value,
    feature: &str,
    pattern: &str,
    entity_key: &str,
) -> Result<NaiveDateTime, ExpandError> {
    let raw = value.as_str().ok_or_else(|| ExpandError::MalformedTimestamp {
        entity_key: entity_key.to_string(),
        feature: feature.to_string(),
        value: value.to_string(),
    })?;
    NaiveDateTime::parse_from_str(raw, pattern).map_err(|_| ExpandError::MalformedTimestamp {
        entity_key: entity_key.to_string(),
        feature: feature.to_string(),
        value: raw.to_string(),
    })
}

/// Canonical string form of a scalar cell, used for vocabulary values,
/// entity keys, and label comparison.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
