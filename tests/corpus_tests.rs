use std::collections::BTreeSet;
use std::io::Write;

use rollwin::{
    assert_schema_compatible, build_output_schema, expand_corpus, read_jsonl_records,
    write_samples, CatalogMetadata, CategoricalVocabulary, CorpusConfig, CorpusError,
    EntityRecord, ExpandError, ExpanderConfig, FeatureCatalog, OutputFormat, RowPolicy,
    SchemaError, SCHEMA_VERSION,
};
use serde_json::{json, Value};
use tempfile::{NamedTempFile, TempDir};

const PATTERN: &str = "%Y-%m-%d %H:%M:%S";

#[test]
fn every_row_carries_exactly_the_schema_columns() {
    let catalog = catalog();
    let records = vec![march_record(), january_record()];
    let vocabulary = vocabulary(&records);

    let (schema, samples, report) =
        expand_corpus(records, &catalog, &vocabulary, &strict_config())
            .expect("corpus expands");

    assert_eq!(report.records_in, 2);
    assert_eq!(report.records_skipped, 0);
    assert_eq!(report.rows_out, 2);
    assert!(report.first_error.is_none());

    // 3 attributes + 2 counters + 3 period scalars
    // + EVENT_TYPE: raw slice + 2 curr lookbacks * (total + 2 values)
    //   + 1 bf lookback * (total + 2 values)
    // + AMOUNT: raw slice + 2 curr lookbacks * 4 stats
    assert_eq!(schema.columns.len(), 27);

    let schema_names: BTreeSet<&str> = schema.column_names().collect();
    for sample in &samples {
        let row_names: BTreeSet<&str> = sample.columns.keys().map(String::as_str).collect();
        assert_eq!(row_names, schema_names);
    }
}

#[test]
fn records_are_sorted_before_counters_accumulate() {
    let catalog = catalog();
    // March before January on purpose: the driver must sort by
    // (entity key, START_DATE) before expanding.
    let records = vec![march_record(), january_record()];
    let vocabulary = vocabulary(&records);

    let (_, samples, _) = expand_corpus(records, &catalog, &vocabulary, &strict_config())
        .expect("corpus expands");

    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].columns["Curr_Calendar_Month"], json!(1));
    assert_eq!(samples[0].columns["Num_Periods_Before"], json!(0));
    assert_eq!(samples[0].columns["Num_Periods_Positive"], json!(0));
    assert_eq!(samples[1].columns["Curr_Calendar_Month"], json!(3));
    assert_eq!(samples[1].columns["Num_Periods_Before"], json!(1));
    assert_eq!(samples[1].columns["Num_Periods_Positive"], json!(1));
}

#[test]
fn strict_policy_aborts_on_the_first_bad_record() {
    let catalog = catalog();
    let records = vec![january_record(), non_monotonic_record()];
    let vocabulary = vocabulary(&records);

    let err = expand_corpus(records, &catalog, &vocabulary, &strict_config())
        .expect_err("strict policy must abort");
    match err {
        CorpusError::Record(ExpandError::NonMonotonicTimestamps { entity_key, .. }) => {
            assert_eq!(entity_key, "B-9");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn report_and_skip_keeps_the_pass_running() {
    let catalog = catalog();
    let records = vec![january_record(), non_monotonic_record()];
    let vocabulary = vocabulary(&records);
    let cfg = CorpusConfig {
        expander: small_expander(),
        row_policy: RowPolicy::ReportAndSkip,
    };

    let (_, samples, report) =
        expand_corpus(records, &catalog, &vocabulary, &cfg).expect("pass keeps running");

    assert_eq!(samples.len(), 1);
    assert_eq!(report.records_in, 2);
    assert_eq!(report.records_skipped, 1);
    assert_eq!(report.rows_out, 1);
    let first_error = report.first_error.expect("first error recorded");
    assert!(first_error.contains("B-9"), "got: {first_error}");
}

#[test]
fn jsonl_reader_skips_blank_lines_across_files() {
    let mut file_a = NamedTempFile::new().expect("temp input file");
    writeln!(file_a, "{}", record_json(&january_record())).expect("write line");
    writeln!(file_a).expect("write blank line");
    let mut file_b = NamedTempFile::new().expect("temp input file");
    writeln!(file_b, "{}", record_json(&march_record())).expect("write line");

    let records = read_jsonl_records(&[
        file_a.path().to_path_buf(),
        file_b.path().to_path_buf(),
    ])
    .expect("records read");
    assert_eq!(records.len(), 2);
}

#[test]
fn jsonl_reader_reports_the_offending_line() {
    let mut file = NamedTempFile::new().expect("temp input file");
    writeln!(file, "{}", record_json(&january_record())).expect("write line");
    writeln!(file, "{{broken").expect("write line");

    let err = read_jsonl_records(&[file.path().to_path_buf()]).expect_err("must fail");
    match err {
        CorpusError::Json { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn jsonl_output_round_trips_the_emitted_rows() {
    let catalog = catalog();
    let records = vec![january_record(), march_record()];
    let vocabulary = vocabulary(&records);
    let (schema, samples, _) = expand_corpus(records, &catalog, &vocabulary, &strict_config())
        .expect("corpus expands");

    let dir = TempDir::new().expect("temp output dir");
    let path = dir.path().join("rows.jsonl");
    let written = write_samples(&path, &schema, &samples, OutputFormat::JsonLines)
        .expect("rows written");
    assert_eq!(written, 2);

    let raw = std::fs::read_to_string(&path).expect("output readable");
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: Value = serde_json::from_str(lines[0]).expect("row parses");
    assert_eq!(first["ACCOUNT_ID"], json!("A-1"));
    assert_eq!(first["EVENT_TYPE"], json!(["login"]));
}

#[test]
fn csv_output_follows_the_schema_column_order() {
    let catalog = catalog();
    let records = vec![january_record()];
    let vocabulary = vocabulary(&records);
    let (schema, samples, _) = expand_corpus(records, &catalog, &vocabulary, &strict_config())
        .expect("corpus expands");

    let dir = TempDir::new().expect("temp output dir");
    let path = dir.path().join("rows.csv");
    write_samples(&path, &schema, &samples, OutputFormat::Csv).expect("rows written");

    let mut reader = csv::Reader::from_path(&path).expect("output readable");
    let header: Vec<String> = reader
        .headers()
        .expect("header row")
        .iter()
        .map(str::to_string)
        .collect();
    let expected: Vec<String> = schema.column_names().map(str::to_string).collect();
    assert_eq!(header, expected);
    assert_eq!(header[0], "ACCOUNT_ID");

    let row = reader
        .records()
        .next()
        .expect("one data row")
        .expect("row parses");
    let slice_index = header
        .iter()
        .position(|name| name == "EVENT_TYPE")
        .expect("raw slice column present");
    // Raw slice cells are the JSON array text.
    assert_eq!(&row[slice_index], "[\"login\"]");
}

#[test]
fn schema_fingerprint_is_deterministic_and_config_sensitive() {
    let catalog = catalog();
    let records = vec![january_record()];
    let vocabulary = vocabulary(&records);

    let first = build_output_schema(&catalog, &vocabulary, &small_expander());
    let second = build_output_schema(&catalog, &vocabulary, &small_expander());
    assert_eq!(first.fingerprint, second.fingerprint);

    let wider = build_output_schema(
        &catalog,
        &vocabulary,
        &ExpanderConfig {
            obs_window_days: 60,
            ..small_expander()
        },
    );
    assert_ne!(first.fingerprint, wider.fingerprint);
}

#[test]
fn schema_compatibility_check_rejects_both_mismatches() {
    let catalog = catalog();
    let records = vec![january_record()];
    let vocabulary = vocabulary(&records);
    let schema = build_output_schema(&catalog, &vocabulary, &small_expander());

    assert_schema_compatible(SCHEMA_VERSION, &schema.fingerprint, &schema)
        .expect("schema is self-compatible");

    let err = assert_schema_compatible(SCHEMA_VERSION + 1, &schema.fingerprint, &schema)
        .expect_err("version mismatch must fail");
    assert!(matches!(err, SchemaError::VersionMismatch { .. }));

    let err = assert_schema_compatible(SCHEMA_VERSION, "deadbeef", &schema)
        .expect_err("fingerprint mismatch must fail");
    assert!(matches!(err, SchemaError::FingerprintMismatch { .. }));
}

fn catalog() -> FeatureCatalog {
    let metadata: CatalogMetadata = serde_json::from_value(json!({
        "Mapping": {"TIMESTAMP_PATTERN": PATTERN},
        "Data": {
            "AttributeFeature": {
                "ACCOUNT_ID": {"type": "Key", "include": true},
                "RISK_LABEL": {"type": "Label", "include": true},
                "REGION": {"type": "Categorical", "include": true}
            },
            "SequenceFeature": {
                "EVENT_TIME": {"type": "DateTime", "include": true},
                "EVENT_TYPE": {"type": "Categorical", "include": true},
                "AMOUNT": {"type": "Numeric", "include": true}
            }
        }
    }))
    .expect("metadata parses");
    FeatureCatalog::from_metadata(metadata).expect("catalog resolves")
}

fn small_expander() -> ExpanderConfig {
    ExpanderConfig {
        obs_window_days: 45,
        curr_window_last_n_days: vec![5, 15],
        bf_window_last_n_days: vec![30],
    }
}

fn strict_config() -> CorpusConfig {
    CorpusConfig {
        expander: small_expander(),
        row_policy: RowPolicy::Strict,
    }
}

fn january_record() -> EntityRecord {
    serde_json::from_value(json!({
        "ACCOUNT_ID": "A-1",
        "RISK_LABEL": "1",
        "REGION": "north",
        "START_DATE": "2020-01-01 00:00:00",
        "END_DATE": "2020-01-31 00:00:00",
        "EVENT_TIME": ["2020-01-28 00:00:00"],
        "EVENT_TYPE": ["login"],
        "AMOUNT": ["2.0"]
    }))
    .expect("record parses")
}

fn march_record() -> EntityRecord {
    serde_json::from_value(json!({
        "ACCOUNT_ID": "A-1",
        "RISK_LABEL": "1",
        "REGION": "north",
        "START_DATE": "2020-03-01 00:00:00",
        "END_DATE": "2020-03-31 00:00:00",
        "EVENT_TIME": ["2020-03-29 00:00:00"],
        "EVENT_TYPE": ["payment"],
        "AMOUNT": [3]
    }))
    .expect("record parses")
}

fn non_monotonic_record() -> EntityRecord {
    serde_json::from_value(json!({
        "ACCOUNT_ID": "B-9",
        "RISK_LABEL": "0",
        "REGION": "south",
        "START_DATE": "2020-01-01 00:00:00",
        "END_DATE": "2020-01-31 00:00:00",
        "EVENT_TIME": ["2020-01-20 00:00:00", "2020-01-10 00:00:00"],
        "EVENT_TYPE": ["login", "payment"],
        "AMOUNT": ["1", "2"]
    }))
    .expect("record parses")
}

fn vocabulary(records: &[EntityRecord]) -> CategoricalVocabulary {
    CategoricalVocabulary::build_from_records(records, &["EVENT_TYPE".to_string()])
        .expect("vocabulary builds")
}

fn record_json(record: &EntityRecord) -> String {
    serde_json::to_string(record).expect("record serializes")
}
