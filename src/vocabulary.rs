//! Categorical value vocabularies built from a reference corpus.
//!
//! Every distinct value observed for a categorical sequence feature gets its
//! own count column in every emitted row, zero-filled when absent from a
//! particular window. The vocabulary therefore fixes the output schema; a
//! build failure is fatal to the whole run.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::record::{value_to_string, EntityRecord};

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("I/O error reading reference corpus: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON at {path}:{line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    #[error("reference corpus record is missing categorical feature {feature}")]
    MissingFeature { feature: String },
    #[error("categorical feature {feature} is not an array in the reference corpus")]
    NotASequence { feature: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CategoricalVocabulary {
    values: BTreeMap<String, BTreeSet<String>>,
}

impl CategoricalVocabulary {
    /// Scan in-memory records once per categorical feature, unioning values.
    pub fn build_from_records(
        records: &[EntityRecord],
        categorical_features: &[String],
    ) -> Result<Self, VocabularyError> {
        let mut values: BTreeMap<String, BTreeSet<String>> = categorical_features
            .iter()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect();

        for record in records {
            for feature in categorical_features {
                let sequence = record
                    .field(feature)
                    .ok_or_else(|| VocabularyError::MissingFeature {
                        feature: feature.clone(),
                    })?
                    .as_array()
                    .ok_or_else(|| VocabularyError::NotASequence {
                        feature: feature.clone(),
                    })?;
                let set = values
                    .get_mut(feature)
                    .expect("vocabulary pre-seeded for every categorical feature");
                for value in sequence {
                    set.insert(value_to_string(value));
                }
            }
        }

        Ok(Self { values })
    }

    /// Scan JSON-lines files as the reference corpus.
    pub fn build_from_jsonl(
        paths: &[PathBuf],
        categorical_features: &[String],
    ) -> Result<Self, VocabularyError> {
        let mut records = Vec::new();
        for path in paths {
            read_reference_records(path, &mut records)?;
        }
        let vocabulary = Self::build_from_records(&records, categorical_features)?;
        info!(
            component = "vocabulary",
            event = "vocabulary.built",
            file_count = paths.len(),
            record_count = records.len(),
            feature_count = vocabulary.values.len(),
            value_count = vocabulary.total_values()
        );
        Ok(vocabulary)
    }

    /// Distinct values for one feature, in deterministic order.
    pub fn values(&self, feature: &str) -> Option<&BTreeSet<String>> {
        self.values.get(feature)
    }

    pub fn total_values(&self) -> usize {
        self.values.values().map(BTreeSet::len).sum()
    }

    /// Build from predefined value lists instead of a corpus scan.
    pub fn from_parts(parts: Vec<(String, Vec<String>)>) -> Self {
        Self {
            values: parts
                .into_iter()
                .map(|(name, vals)| (name, vals.into_iter().collect()))
                .collect(),
        }
    }
}

fn read_reference_records(
    path: &Path,
    out: &mut Vec<EntityRecord>,
) -> Result<(), VocabularyError> {
    let reader = BufReader::new(File::open(path)?);
    for (line_index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: EntityRecord =
            serde_json::from_str(&line).map_err(|source| VocabularyError::Json {
                path: path.to_path_buf(),
                line: line_index + 1,
                source,
            })?;
        out.push(record);
    }
    Ok(())
}
