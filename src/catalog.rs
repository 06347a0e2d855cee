//! Feature metadata loading and typed feature grouping.
//!
//! The metadata file declares every attribute and sequence feature with a
//! string type name and an include flag. Type names are resolved once at
//! load time into the closed [`FeatureGroup`] enum; unknown names and
//! missing designated roles (Key, Label, DateTime axis) are rejected here
//! rather than surfacing later as mis-grouped columns.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureGroup {
    Categorical,
    Numeric,
    DateTime,
    Key,
    Label,
}

impl FeatureGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Categorical => "Categorical",
            Self::Numeric => "Numeric",
            Self::DateTime => "DateTime",
            Self::Key => "Key",
            Self::Label => "Label",
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error reading metadata: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown feature group '{group}' for feature {feature}")]
    UnknownFeatureGroup { feature: String, group: String },
    #[error("no aggregation rule for sequence feature {feature} of group {group}")]
    NoAggregationRule {
        feature: String,
        group: &'static str,
    },
    #[error("metadata declares no included {role} feature")]
    MissingDesignated { role: &'static str },
    #[error("metadata declares more than one {role} feature: {first}, {second}")]
    DuplicateDesignated {
        role: &'static str,
        first: String,
        second: String,
    },
    #[error("metadata timestamp pattern is empty")]
    EmptyTimestampPattern,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeatureDecl {
    #[serde(rename = "type")]
    pub group: String,
    pub include: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MappingSection {
    #[serde(rename = "TIMESTAMP_PATTERN")]
    pub timestamp_pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataSection {
    #[serde(rename = "AttributeFeature")]
    pub attribute_features: BTreeMap<String, FeatureDecl>,
    #[serde(rename = "SequenceFeature")]
    pub sequence_features: BTreeMap<String, FeatureDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogMetadata {
    #[serde(rename = "Mapping")]
    pub mapping: MappingSection,
    #[serde(rename = "Data")]
    pub data: DataSection,
}

/// Typed feature tables resolved from the metadata declarations.
///
/// Attribute features are copied verbatim into every output row; the Key and
/// Label attributes are additionally designated for counter bookkeeping.
/// Sequence features are grouped by their aggregation rule, with exactly one
/// DateTime axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureCatalog {
    pub timestamp_pattern: String,
    pub key_attribute: String,
    pub label_attribute: String,
    pub datetime_sequence: String,
    attribute_names: Vec<String>,
    categorical_sequences: Vec<String>,
    numeric_sequences: Vec<String>,
}

impl FeatureCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)?;
        let metadata: CatalogMetadata = serde_json::from_str(&raw)?;
        let catalog = Self::from_metadata(metadata)?;
        info!(
            component = "catalog",
            event = "catalog.loaded",
            path = %path.display(),
            attribute_count = catalog.attribute_names.len(),
            categorical_sequence_count = catalog.categorical_sequences.len(),
            numeric_sequence_count = catalog.numeric_sequences.len()
        );
        Ok(catalog)
    }

    pub fn from_metadata(metadata: CatalogMetadata) -> Result<Self, CatalogError> {
        if metadata.mapping.timestamp_pattern.trim().is_empty() {
            return Err(CatalogError::EmptyTimestampPattern);
        }

        let mut attribute_names = Vec::new();
        let mut key_attribute: Option<String> = None;
        let mut label_attribute: Option<String> = None;

        for (name, decl) in &metadata.data.attribute_features {
            if !decl.include {
                continue;
            }
            let group = parse_feature_group(name, &decl.group)?;
            attribute_names.push(name.clone());
            match group {
                FeatureGroup::Key => {
                    assign_designated("Key", &mut key_attribute, name)?;
                }
                FeatureGroup::Label => {
                    assign_designated("Label", &mut label_attribute, name)?;
                }
                _ => {}
            }
        }

        let mut datetime_sequence: Option<String> = None;
        let mut categorical_sequences = Vec::new();
        let mut numeric_sequences = Vec::new();

        for (name, decl) in &metadata.data.sequence_features {
            if !decl.include {
                continue;
            }
            match parse_feature_group(name, &decl.group)? {
                FeatureGroup::Categorical => categorical_sequences.push(name.clone()),
                FeatureGroup::Numeric => numeric_sequences.push(name.clone()),
                FeatureGroup::DateTime => {
                    assign_designated("DateTime", &mut datetime_sequence, name)?;
                }
                group @ (FeatureGroup::Key | FeatureGroup::Label) => {
                    return Err(CatalogError::NoAggregationRule {
                        feature: name.clone(),
                        group: group.as_str(),
                    });
                }
            }
        }

        Ok(Self {
            timestamp_pattern: metadata.mapping.timestamp_pattern,
            key_attribute: key_attribute
                .ok_or(CatalogError::MissingDesignated { role: "Key" })?,
            label_attribute: label_attribute
                .ok_or(CatalogError::MissingDesignated { role: "Label" })?,
            datetime_sequence: datetime_sequence
                .ok_or(CatalogError::MissingDesignated { role: "DateTime" })?,
            attribute_names,
            categorical_sequences,
            numeric_sequences,
        })
    }

    /// Included attribute feature names in deterministic order.
    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    pub fn categorical_sequences(&self) -> &[String] {
        &self.categorical_sequences
    }

    pub fn numeric_sequences(&self) -> &[String] {
        &self.numeric_sequences
    }

    /// All declared sequence feature names, DateTime axis first.
    pub fn sequence_names(&self) -> Vec<&str> {
        let mut names = Vec::with_capacity(
            1 + self.categorical_sequences.len() + self.numeric_sequences.len(),
        );
        names.push(self.datetime_sequence.as_str());
        names.extend(self.categorical_sequences.iter().map(String::as_str));
        names.extend(self.numeric_sequences.iter().map(String::as_str));
        names
    }
}

pub fn parse_feature_group(feature: &str, input: &str) -> Result<FeatureGroup, CatalogError> {
    match input {
        "Categorical" => Ok(FeatureGroup::Categorical),
        "Numeric" => Ok(FeatureGroup::Numeric),
        "DateTime" => Ok(FeatureGroup::DateTime),
        "Key" => Ok(FeatureGroup::Key),
        "Label" => Ok(FeatureGroup::Label),
        other => Err(CatalogError::UnknownFeatureGroup {
            feature: feature.to_string(),
            group: other.to_string(),
        }),
    }
}

fn assign_designated(
    role: &'static str,
    slot: &mut Option<String>,
    name: &str,
) -> Result<(), CatalogError> {
    match slot {
        Some(first) => Err(CatalogError::DuplicateDesignated {
            role,
            first: first.clone(),
            second: name.to_string(),
        }),
        None => {
            *slot = Some(name.to_string());
            Ok(())
        }
    }
}
