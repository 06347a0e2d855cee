//! Rolling-window longitudinal feature expansion.
//!
//! Converts per-entity longitudinal records (scalar attributes plus
//! index-aligned time-stamped sequences) into fixed-schema per-period
//! training rows. Pipeline:
//! - catalog: metadata loading and typed feature grouping
//! - vocabulary: categorical value sets fixing the count column schema
//! - record: entity record validation and timestamp parsing
//! - align: single-scan window boundary alignment
//! - aggregate: categorical count and numeric summary columns
//! - expand: calendar-month roll-forward and per-entity counters
//! - schema: fixed output column set with fingerprint
//! - corpus: corpus pass driver with row policy and writers

mod align;
mod aggregate;
mod catalog;
mod corpus;
mod expand;
mod observability;
mod record;
mod schema;
mod vocabulary;

pub use aggregate::{
    aggregate_categorical, aggregate_numeric, bf_total_column, bf_value_column,
    curr_total_column, curr_value_column, numeric_column, NumericStat, NUMERIC_STATS,
};
pub use align::{align_cutoffs, align_window, resolve_index, slice_range, IndexSet, WindowSpec};
pub use catalog::{
    parse_feature_group, CatalogError, CatalogMetadata, DataSection, FeatureCatalog, FeatureDecl,
    FeatureGroup, MappingSection,
};
pub use corpus::{
    expand_corpus, read_jsonl_records, sort_records, write_samples, CorpusConfig, CorpusError,
    ExpandReport, OutputFormat, RowPolicy,
};
pub use expand::{
    expand_record, validate_config, ConfigError, EntityCounters, ExpandError, ExpanderConfig,
    OutputSample, PeriodCounterStore, CURR_CALENDAR_MONTH, DEFAULT_OBS_WINDOW_DAYS,
    MONTHS_TO_END, NTH_MONTH, NUM_PERIODS_BEFORE, NUM_PERIODS_POSITIVE,
};
pub use observability::{
    init_logging, log_run_start, logging_config_from_env, LogFormat, LoggingConfig,
    LoggingInitError,
};
pub use record::{
    validate_record, value_to_string, EntityRecord, ValidatedRecord, END_DATE_FIELD,
    START_DATE_FIELD,
};
pub use schema::{
    assert_schema_compatible, build_output_schema, ColumnKind, OutputColumn, OutputSchema,
    SchemaError, SCHEMA_VERSION,
};
pub use vocabulary::{CategoricalVocabulary, VocabularyError};
