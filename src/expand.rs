//! Per-entity period expansion: the roll-forward loop.
//!
//! One entity record expands into one output row per observation period.
//! The first window ends at the last instant of the entity's starting
//! calendar month; each subsequent window ends at the last instant two
//! calendar months after the first of the current boundary's month, clamped
//! to the entity's true end date. Per-entity counters live in an explicit
//! store owned by the caller, so ordering (and any partitioning by key)
//! stays the caller's decision.

use std::collections::HashMap;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::aggregate::{aggregate_categorical, aggregate_numeric};
use crate::align::{align_window, WindowSpec};
use crate::catalog::FeatureCatalog;
use crate::record::{validate_record, value_to_string, EntityRecord};
use crate::vocabulary::CategoricalVocabulary;

pub const DEFAULT_OBS_WINDOW_DAYS: i64 = 45;

pub const NUM_PERIODS_BEFORE: &str = "Num_Periods_Before";
pub const NUM_PERIODS_POSITIVE: &str = "Num_Periods_Positive";
pub const NTH_MONTH: &str = "Nth_Month";
pub const MONTHS_TO_END: &str = "Months_to_end";
pub const CURR_CALENDAR_MONTH: &str = "Curr_Calendar_Month";

const POSITIVE_LABEL: &str = "1";

/// Record-scoped failure: aborts the offending record's expansion, carries
/// the entity key and failing feature, and leaves the corpus pass to the
/// driver's row policy.
#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("entity {entity_key}: malformed timestamp '{value}' in {feature}")]
    MalformedTimestamp {
        entity_key: String,
        feature: String,
        value: String,
    },
    #[error(
        "entity {entity_key}: sequence {feature} has {found} values but the datetime axis has {expected}"
    )]
    MisalignedSequence {
        entity_key: String,
        feature: String,
        expected: usize,
        found: usize,
    },
    #[error("entity {entity_key}: timestamps in {feature} decrease at index {index}")]
    NonMonotonicTimestamps {
        entity_key: String,
        feature: String,
        index: usize,
    },
    #[error("entity {entity_key}: record is missing declared feature {feature}")]
    MissingFeature { entity_key: String, feature: String },
    #[error("entity {entity_key}: declared sequence feature {feature} is not an array")]
    NotASequence { entity_key: String, feature: String },
    #[error("entity {entity_key}: empty window slice computing {column} for {feature}")]
    EmptyWindow {
        entity_key: String,
        feature: String,
        column: String,
    },
    #[error("entity {entity_key}: non-numeric value '{value}' in {feature}")]
    NonNumericValue {
        entity_key: String,
        feature: String,
        value: String,
    },
}

impl ExpandError {
    pub fn entity_key(&self) -> &str {
        match self {
            Self::MalformedTimestamp { entity_key, .. }
            | Self::MisalignedSequence { entity_key, .. }
            | Self::NonMonotonicTimestamps { entity_key, .. }
            | Self::MissingFeature { entity_key, .. }
            | Self::NotASequence { entity_key, .. }
            | Self::EmptyWindow { entity_key, .. }
            | Self::NonNumericValue { entity_key, .. } => entity_key,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid expander config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpanderConfig {
    pub obs_window_days: i64,
    pub curr_window_last_n_days: Vec<i64>,
    pub bf_window_last_n_days: Vec<i64>,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self {
            obs_window_days: DEFAULT_OBS_WINDOW_DAYS,
            curr_window_last_n_days: vec![5, 10, 15, 30, 45],
            bf_window_last_n_days: vec![30, 60, 90, 180, 360],
        }
    }
}

pub fn validate_config(cfg: &ExpanderConfig) -> Result<(), ConfigError> {
    if cfg.obs_window_days <= 0 {
        return Err(ConfigError::Invalid(
            "obs_window_days must be > 0".to_string(),
        ));
    }
    for (name, list) in [
        ("curr_window_last_n_days", &cfg.curr_window_last_n_days),
        ("bf_window_last_n_days", &cfg.bf_window_last_n_days),
    ] {
        let mut seen = std::collections::HashSet::new();
        for n_days in list {
            if *n_days <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} entries must be > 0"
                )));
            }
            if !seen.insert(*n_days) {
                return Err(ConfigError::Invalid(format!(
                    "{name} entries must be unique"
                )));
            }
        }
    }
    Ok(())
}

/// Running per-entity state across emitted periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EntityCounters {
    pub total_periods_before: u64,
    pub total_periods_positive: u64,
}

/// Counter store keyed by entity identifier, owned by the corpus driver and
/// threaded through each expansion call. Lives for one pass; never pruned.
#[derive(Debug, Clone, Default)]
pub struct PeriodCounterStore {
    counters: HashMap<String, EntityCounters>,
}

impl PeriodCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter values as of before the current record; zeros on first sight.
    pub fn snapshot(&self, entity_key: &str) -> EntityCounters {
        self.counters.get(entity_key).copied().unwrap_or_default()
    }

    pub fn record_emission(&mut self, entity_key: &str, periods: u64, label_positive: bool) {
        let entry = self.counters.entry(entity_key.to_string()).or_default();
        entry.total_periods_before += periods;
        if label_positive {
            entry.total_periods_positive += periods;
        }
    }

    pub fn tracked_entities(&self) -> usize {
        self.counters.len()
    }
}

/// One emitted training/inference row: a flat column-to-value mapping whose
/// key set is identical for every row of a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OutputSample {
    pub columns: Map<String, Value>,
}

/// Expand one record into its observation periods.
///
/// Finite and not restartable: the counter store is read before the loop and
/// advanced by the emitted period count afterwards, so replaying a record
/// shifts the counters of every later period for the same key.
pub fn expand_record(
    record: &EntityRecord,
    catalog: &FeatureCatalog,
    vocabulary: &CategoricalVocabulary,
    cfg: &ExpanderConfig,
    counters: &mut PeriodCounterStore,
) -> Result<Vec<OutputSample>, ExpandError> {
    let validated = validate_record(record, catalog)?;
    let end_date = validated.end_date;

    let mut base = Map::new();
    for name in catalog.attribute_names() {
        let value = record
            .field(name)
            .ok_or_else(|| ExpandError::MissingFeature {
                entity_key: validated.entity_key.clone(),
                feature: name.clone(),
            })?;
        base.insert(name.clone(), value.clone());
    }

    let snapshot = counters.snapshot(&validated.entity_key);
    base.insert(
        NUM_PERIODS_BEFORE.to_string(),
        Value::from(snapshot.total_periods_before),
    );
    base.insert(
        NUM_PERIODS_POSITIVE.to_string(),
        Value::from(snapshot.total_periods_positive),
    );

    let mut window_end_date = month_last_instant(month_first(validated.start_date), 1);
    let mut samples = Vec::new();
    let mut nth_month: u64 = 1;

    while window_end_date <= end_date {
        let spec = WindowSpec::for_window_end(
            window_end_date,
            cfg.obs_window_days,
            &cfg.curr_window_last_n_days,
            &cfg.bf_window_last_n_days,
        );
        let indices = align_window(&validated.axis, &spec);

        let mut columns = base.clone();
        columns.insert(NTH_MONTH.to_string(), Value::from(nth_month));
        columns.insert(
            MONTHS_TO_END.to_string(),
            Value::from(months_between(window_end_date, end_date)),
        );
        columns.insert(
            CURR_CALENDAR_MONTH.to_string(),
            Value::from(window_end_date.month()),
        );

        columns.extend(aggregate_categorical(
            &validated,
            catalog.categorical_sequences(),
            vocabulary,
            cfg,
            &indices,
        )?);
        columns.extend(aggregate_numeric(
            &validated,
            catalog.numeric_sequences(),
            cfg,
            &indices,
        )?);

        samples.push(OutputSample { columns });
        nth_month += 1;

        if window_end_date < end_date {
            let next = month_last_instant(month_first(window_end_date), 2);
            window_end_date = next.min(end_date);
        } else {
            break;
        }
    }

    let label_positive = record
        .field(&catalog.label_attribute)
        .map(|value| value_to_string(value) == POSITIVE_LABEL)
        .unwrap_or(false);
    counters.record_emission(&validated.entity_key, samples.len() as u64, label_positive);

    debug!(
        component = "expand",
        event = "expand.record",
        entity_key = %validated.entity_key,
        periods = samples.len(),
        label_positive = label_positive
    );

    Ok(samples)
}

fn month_first(date: NaiveDateTime) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .expect("valid month start date expected")
}

/// Last instant of the month `months_ahead - 1` months after `first`:
/// first + months_ahead months, minus one second.
fn month_last_instant(first: NaiveDate, months_ahead: u32) -> NaiveDateTime {
    let boundary = first
        .checked_add_months(Months::new(months_ahead))
        .expect("valid month boundary expected");
    boundary
        .and_hms_opt(0, 0, 0)
        .expect("valid midnight expected")
        - Duration::seconds(1)
}

fn months_between(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to.year() as i64 - from.year() as i64) * 12 + (to.month() as i64 - from.month() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        validate_config(&ExpanderConfig::default()).expect("default config valid");
    }

    #[test]
    fn rejects_zero_obs_window() {
        let cfg = ExpanderConfig {
            obs_window_days: 0,
            ..ExpanderConfig::default()
        };
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn rejects_duplicate_lookbacks() {
        let cfg = ExpanderConfig {
            curr_window_last_n_days: vec![5, 5],
            ..ExpanderConfig::default()
        };
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn rejects_nonpositive_lookbacks() {
        let cfg = ExpanderConfig {
            bf_window_last_n_days: vec![30, 0],
            ..ExpanderConfig::default()
        };
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn month_boundaries_match_calendar() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 15)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let end_of_january = month_last_instant(month_first(start), 1);
        assert_eq!(
            end_of_january,
            NaiveDate::from_ymd_opt(2020, 1, 31)
                .unwrap()
                .and_hms_opt(23, 59, 59)
                .unwrap()
        );
        let end_of_february = month_last_instant(month_first(start), 2);
        assert_eq!(
            end_of_february,
            NaiveDate::from_ymd_opt(2020, 2, 29)
                .unwrap()
                .and_hms_opt(23, 59, 59)
                .unwrap()
        );
    }

    #[test]
    fn months_between_spans_year_boundaries() {
        let from = NaiveDate::from_ymd_opt(2019, 11, 30)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        let to = NaiveDate::from_ymd_opt(2020, 2, 28)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(months_between(from, to), 3);
    }
}
