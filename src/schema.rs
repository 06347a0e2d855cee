//! Output column schema and fingerprinting.
//!
//! Given a catalog, a vocabulary, and an expander config, the emitted column
//! set is fixed: every row of a pass carries exactly these columns. The
//! schema is fingerprinted so downstream training can refuse inputs built
//! under a different catalog or vocabulary.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::aggregate::{
    bf_total_column, bf_value_column, curr_total_column, curr_value_column, numeric_column,
    NUMERIC_STATS,
};
use crate::catalog::FeatureCatalog;
use crate::expand::{
    ExpanderConfig, CURR_CALENDAR_MONTH, MONTHS_TO_END, NTH_MONTH, NUM_PERIODS_BEFORE,
    NUM_PERIODS_POSITIVE,
};
use crate::vocabulary::CategoricalVocabulary;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Attribute feature copied verbatim from the record.
    Attribute,
    /// Cumulative per-entity counter.
    Counter,
    /// Per-period scalar (period index, months to end, calendar month).
    PeriodScalar,
    /// Raw windowed sub-sequence under the feature's own name.
    SequenceSlice,
    /// Categorical count aggregate.
    CountAggregate,
    /// Numeric summary aggregate.
    NumericAggregate,
}

impl ColumnKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Attribute => "attribute",
            Self::Counter => "counter",
            Self::PeriodScalar => "period_scalar",
            Self::SequenceSlice => "sequence_slice",
            Self::CountAggregate => "count_aggregate",
            Self::NumericAggregate => "numeric_aggregate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputColumn {
    pub name: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<OutputColumn>,
}

impl OutputSchema {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },
}

pub fn build_output_schema(
    catalog: &FeatureCatalog,
    vocabulary: &CategoricalVocabulary,
    cfg: &ExpanderConfig,
) -> OutputSchema {
    let mut columns = Vec::new();
    let mut push = |name: String, kind: ColumnKind| {
        columns.push(OutputColumn { name, kind });
    };

    for name in catalog.attribute_names() {
        push(name.clone(), ColumnKind::Attribute);
    }
    push(NUM_PERIODS_BEFORE.to_string(), ColumnKind::Counter);
    push(NUM_PERIODS_POSITIVE.to_string(), ColumnKind::Counter);
    push(NTH_MONTH.to_string(), ColumnKind::PeriodScalar);
    push(MONTHS_TO_END.to_string(), ColumnKind::PeriodScalar);
    push(CURR_CALENDAR_MONTH.to_string(), ColumnKind::PeriodScalar);

    for feature in catalog.categorical_sequences() {
        push(feature.clone(), ColumnKind::SequenceSlice);
        let known_values: Vec<&String> = vocabulary
            .values(feature)
            .map(|set| set.iter().collect())
            .unwrap_or_default();
        for n_days in &cfg.curr_window_last_n_days {
            push(curr_total_column(feature, *n_days), ColumnKind::CountAggregate);
            for value in &known_values {
                push(
                    curr_value_column(feature, value, *n_days),
                    ColumnKind::CountAggregate,
                );
            }
        }
        for n_days in &cfg.bf_window_last_n_days {
            push(bf_total_column(feature, *n_days), ColumnKind::CountAggregate);
            for value in &known_values {
                push(
                    bf_value_column(feature, value, *n_days),
                    ColumnKind::CountAggregate,
                );
            }
        }
    }

    for feature in catalog.numeric_sequences() {
        push(feature.clone(), ColumnKind::SequenceSlice);
        for n_days in &cfg.curr_window_last_n_days {
            for stat in NUMERIC_STATS {
                push(
                    numeric_column(stat, feature, *n_days),
                    ColumnKind::NumericAggregate,
                );
            }
        }
    }

    let fingerprint = schema_fingerprint(cfg, &columns);

    info!(
        component = "schema",
        event = "schema.built",
        version = SCHEMA_VERSION,
        column_count = columns.len(),
        fingerprint = %fingerprint
    );

    OutputSchema {
        version: SCHEMA_VERSION,
        fingerprint,
        columns,
    }
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &OutputSchema,
) -> Result<(), SchemaError> {
    if expected_version != actual.version {
        return Err(SchemaError::VersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }
    if expected_fingerprint != actual.fingerprint {
        return Err(SchemaError::FingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }
    Ok(())
}

fn schema_fingerprint(cfg: &ExpanderConfig, columns: &[OutputColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{SCHEMA_VERSION};"));
    hasher.update(format!("obs_window_days:{};", cfg.obs_window_days));
    hasher.update("curr_last_n:");
    for n_days in &cfg.curr_window_last_n_days {
        hasher.update(format!("{n_days},"));
    }
    hasher.update(";bf_last_n:");
    for n_days in &cfg.bf_window_last_n_days {
        hasher.update(format!("{n_days},"));
    }
    hasher.update(";columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(":");
        hasher.update(column.kind.as_str());
        hasher.update(";");
    }
    hex::encode(hasher.finalize())
}
