//! Corpus pass: read records, sort, expand, write rows.
//!
//! Entities must be processed in (entity key, START_DATE) order because the
//! counter store means "periods already emitted for this key in processing
//! order"; the driver sorts before expanding so callers can hand over files
//! in any order.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::FeatureCatalog;
use crate::expand::{expand_record, ExpandError, ExpanderConfig, OutputSample, PeriodCounterStore};
use crate::record::{value_to_string, EntityRecord, START_DATE_FIELD};
use crate::schema::{build_output_schema, OutputSchema};
use crate::vocabulary::CategoricalVocabulary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowPolicy {
    /// Abort the pass on the first record-scoped failure.
    Strict,
    /// Log and skip the offending record, keep the pass running.
    ReportAndSkip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    JsonLines,
    Csv,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorpusConfig {
    pub expander: ExpanderConfig,
    pub row_policy: RowPolicy,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            expander: ExpanderConfig::default(),
            row_policy: RowPolicy::Strict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandReport {
    pub records_in: u64,
    pub records_skipped: u64,
    pub rows_out: u64,
    pub first_error: Option<String>,
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON at {path}:{line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    #[error("JSON serialization error: {0}")]
    JsonWrite(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("record failed: {0}")]
    Record(#[from] ExpandError),
}

/// Read entity records from JSON-lines files, one JSON object per line.
pub fn read_jsonl_records(paths: &[PathBuf]) -> Result<Vec<EntityRecord>, CorpusError> {
    let mut records = Vec::new();
    for path in paths {
        let reader = BufReader::new(File::open(path)?);
        for (line_index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: EntityRecord =
                serde_json::from_str(&line).map_err(|source| CorpusError::Json {
                    path: path.clone(),
                    line: line_index + 1,
                    source,
                })?;
            records.push(record);
        }
    }
    Ok(records)
}

/// Sort by (entity key, START_DATE). The timestamp pattern is
/// year-major, so lexicographic string order is chronological order.
pub fn sort_records(records: &mut [EntityRecord], catalog: &FeatureCatalog) {
    records.sort_by_cached_key(|record| {
        let key = record
            .field(&catalog.key_attribute)
            .map(value_to_string)
            .unwrap_or_default();
        let start = record
            .field(START_DATE_FIELD)
            .map(value_to_string)
            .unwrap_or_default();
        (key, start)
    });
}

/// Run the whole pass in memory: sort, expand each record against a shared
/// counter store, apply the row policy, and report.
pub fn expand_corpus(
    mut records: Vec<EntityRecord>,
    catalog: &FeatureCatalog,
    vocabulary: &CategoricalVocabulary,
    cfg: &CorpusConfig,
) -> Result<(OutputSchema, Vec<OutputSample>, ExpandReport), CorpusError> {
    let schema = build_output_schema(catalog, vocabulary, &cfg.expander);
    sort_records(&mut records, catalog);

    info!(
        component = "corpus",
        event = "corpus.expand.start",
        records_in = records.len(),
        row_policy = ?cfg.row_policy,
        schema_fingerprint = %schema.fingerprint
    );

    let mut counters = PeriodCounterStore::new();
    let mut samples = Vec::new();
    let mut report = ExpandReport {
        records_in: records.len() as u64,
        records_skipped: 0,
        rows_out: 0,
        first_error: None,
    };

    for record in &records {
        match expand_record(record, catalog, vocabulary, &cfg.expander, &mut counters) {
            Ok(mut rows) => samples.append(&mut rows),
            Err(error) => match cfg.row_policy {
                RowPolicy::Strict => return Err(error.into()),
                RowPolicy::ReportAndSkip => {
                    warn!(
                        component = "corpus",
                        event = "corpus.record.skipped",
                        entity_key = error.entity_key(),
                        reason = %error
                    );
                    report.records_skipped += 1;
                    if report.first_error.is_none() {
                        report.first_error = Some(error.to_string());
                    }
                }
            },
        }
    }

    report.rows_out = samples.len() as u64;

    info!(
        component = "corpus",
        event = "corpus.expand.finish",
        records_in = report.records_in,
        records_skipped = report.records_skipped,
        rows_out = report.rows_out,
        entities_tracked = counters.tracked_entities()
    );

    Ok((schema, samples, report))
}

/// Write rows as JSON lines or CSV. The CSV header follows the schema column
/// order; raw slice cells are serialized as JSON array text.
pub fn write_samples(
    path: &Path,
    schema: &OutputSchema,
    samples: &[OutputSample],
    format: OutputFormat,
) -> Result<u64, CorpusError> {
    let written = match format {
        OutputFormat::JsonLines => write_jsonl(path, samples)?,
        OutputFormat::Csv => write_csv(path, schema, samples)?,
    };
    info!(
        component = "corpus",
        event = "corpus.write.finish",
        path = %path.display(),
        format = ?format,
        rows = written
    );
    Ok(written)
}

fn write_jsonl(path: &Path, samples: &[OutputSample]) -> Result<u64, CorpusError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for sample in samples {
        serde_json::to_writer(&mut writer, sample)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(samples.len() as u64)
}

fn write_csv(
    path: &Path,
    schema: &OutputSchema,
    samples: &[OutputSample],
) -> Result<u64, CorpusError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(schema.column_names())?;
    for sample in samples {
        let mut cells = Vec::with_capacity(schema.columns.len());
        for column in &schema.columns {
            cells.push(csv_cell(sample.columns.get(&column.name)));
        }
        writer.write_record(&cells)?;
    }
    writer.flush()?;
    Ok(samples.len() as u64)
}

fn csv_cell(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
