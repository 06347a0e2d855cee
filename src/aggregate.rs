//! Window-slice aggregate feature generation.
//!
//! Categorical features emit the raw windowed slice plus per-lookback total
//! and per-vocabulary-value count columns, for the current window and the
//! before window. Numeric features emit the raw windowed slice plus
//! current-window Sum/Mean/Min/Max columns; there are no before-window
//! numeric aggregates.
//!
//! Two quirks of the established output format are load-bearing for
//! downstream training sets and must not change: the before-window
//! per-value counts scan through the window end index (the before-window
//! totals stop at the window start), and the mean divides by the full
//! window slice length rather than the lookback slice length.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::align::{resolve_index, slice_range, IndexSet};
use crate::expand::{ExpandError, ExpanderConfig};
use crate::record::{value_to_string, ValidatedRecord};
use crate::vocabulary::CategoricalVocabulary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericStat {
    Sum,
    Mean,
    Min,
    Max,
}

impl NumericStat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "Sum",
            Self::Mean => "Mean",
            Self::Min => "Min",
            Self::Max => "Max",
        }
    }
}

pub const NUMERIC_STATS: [NumericStat; 4] = [
    NumericStat::Sum,
    NumericStat::Mean,
    NumericStat::Min,
    NumericStat::Max,
];

pub fn curr_total_column(feature: &str, n_days: i64) -> String {
    format!("Agg_Curr_Num_{feature}_last{n_days}days")
}

pub fn curr_value_column(feature: &str, value: &str, n_days: i64) -> String {
    format!(
        "Agg_Curr_Num_{feature}_{}_last{n_days}days",
        sanitize_value(value)
    )
}

pub fn bf_total_column(feature: &str, n_days: i64) -> String {
    format!("Agg_BF_Num_{feature}_last{n_days}days")
}

pub fn bf_value_column(feature: &str, value: &str, n_days: i64) -> String {
    format!(
        "Agg_BF_Num_{feature}_{}_last{n_days}days",
        sanitize_value(value)
    )
}

/// No underscore between `Num` and the feature name; downstream training
/// sets key on `Sum_Curr_NumAMOUNT_last5days`.
pub fn numeric_column(stat: NumericStat, feature: &str, n_days: i64) -> String {
    format!("{}_Curr_Num{feature}_last{n_days}days", stat.as_str())
}

fn sanitize_value(value: &str) -> String {
    value.replace(' ', "_")
}

pub fn aggregate_categorical(
    record: &ValidatedRecord<'_>,
    features: &[String],
    vocabulary: &CategoricalVocabulary,
    cfg: &ExpanderConfig,
    indices: &IndexSet,
) -> Result<Map<String, Value>, ExpandError> {
    let axis_len = record.axis.len();
    let window_start = resolve_index(indices.window_start_index, axis_len);
    let window_end = resolve_index(indices.window_end_index, axis_len);

    let mut out = Map::new();
    for feature in features {
        let sequence = record.sequence(feature)?;
        let window_slice = slice_range(sequence, window_start, window_end);
        out.insert(
            feature.clone(),
            Value::Array(window_slice.to_vec()),
        );

        let known_values: Vec<&String> = vocabulary
            .values(feature)
            .map(|set| set.iter().collect())
            .unwrap_or_default();

        for (n_days, index) in cfg
            .curr_window_last_n_days
            .iter()
            .zip(&indices.curr_last_n_index)
        {
            let lookback = slice_range(sequence, resolve_index(*index, axis_len), window_end);
            out.insert(
                curr_total_column(feature, *n_days),
                Value::from(lookback.len() as u64),
            );
            let counts = count_values(lookback);
            for value in &known_values {
                out.insert(
                    curr_value_column(feature, value, *n_days),
                    Value::from(counts.get(value.as_str()).copied().unwrap_or(0)),
                );
            }
        }

        for (n_days, index) in cfg
            .bf_window_last_n_days
            .iter()
            .zip(&indices.bf_last_n_index)
        {
            let before_start = resolve_index(*index, axis_len);
            let before_total = slice_range(sequence, before_start, window_start);
            out.insert(
                bf_total_column(feature, *n_days),
                Value::from(before_total.len() as u64),
            );
            // Per-value counts intentionally run through the window end.
            let before_values = slice_range(sequence, before_start, window_end);
            let counts = count_values(before_values);
            for value in &known_values {
                out.insert(
                    bf_value_column(feature, value, *n_days),
                    Value::from(counts.get(value.as_str()).copied().unwrap_or(0)),
                );
            }
        }
    }
    Ok(out)
}

pub fn aggregate_numeric(
    record: &ValidatedRecord<'_>,
    features: &[String],
    cfg: &ExpanderConfig,
    indices: &IndexSet,
) -> Result<Map<String, Value>, ExpandError> {
    let axis_len = record.axis.len();
    let window_start = resolve_index(indices.window_start_index, axis_len);
    let window_end = resolve_index(indices.window_end_index, axis_len);

    let mut out = Map::new();
    for feature in features {
        let sequence = record.sequence(feature)?;
        let window_slice = slice_range(sequence, window_start, window_end);
        out.insert(
            feature.clone(),
            Value::Array(window_slice.to_vec()),
        );

        for (n_days, index) in cfg
            .curr_window_last_n_days
            .iter()
            .zip(&indices.curr_last_n_index)
        {
            let lookback = slice_range(sequence, resolve_index(*index, axis_len), window_end);
            let mut parsed = Vec::with_capacity(lookback.len());
            for value in lookback {
                parsed.push(parse_numeric(value, feature, &record.entity_key)?);
            }

            let total: f64 = parsed.iter().sum();
            out.insert(
                numeric_column(NumericStat::Sum, feature, *n_days),
                Value::from(total),
            );

            if window_slice.is_empty() {
                return Err(ExpandError::EmptyWindow {
                    entity_key: record.entity_key.clone(),
                    feature: feature.clone(),
                    column: numeric_column(NumericStat::Mean, feature, *n_days),
                });
            }
            out.insert(
                numeric_column(NumericStat::Mean, feature, *n_days),
                Value::from(total / window_slice.len() as f64),
            );

            if parsed.is_empty() {
                return Err(ExpandError::EmptyWindow {
                    entity_key: record.entity_key.clone(),
                    feature: feature.clone(),
                    column: numeric_column(NumericStat::Min, feature, *n_days),
                });
            }
            let min = parsed.iter().copied().fold(f64::INFINITY, f64::min);
            let max = parsed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            out.insert(
                numeric_column(NumericStat::Min, feature, *n_days),
                Value::from(min),
            );
            out.insert(
                numeric_column(NumericStat::Max, feature, *n_days),
                Value::from(max),
            );
        }
    }
    Ok(out)
}

fn count_values(values: &[Value]) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for value in values {
        *counts.entry(value_to_string(value)).or_insert(0) += 1;
    }
    counts
}

fn parse_numeric(value: &Value, feature: &str, entity_key: &str) -> Result<f64, ExpandError> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ExpandError::NonNumericValue {
        entity_key: entity_key.to_string(),
        feature: feature.to_string(),
        value: value_to_string(value),
    })
}
