use std::path::{Path, PathBuf};

use rollwin::{
    expand_corpus, init_logging, log_run_start, logging_config_from_env, read_jsonl_records,
    validate_config, write_samples, CategoricalVocabulary, CorpusConfig, ExpanderConfig,
    FeatureCatalog, OutputFormat, RowPolicy,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;

    let meta_path = required_env("ROLLWIN_META_PATH")?;
    let input_paths: Vec<PathBuf> = required_env("ROLLWIN_INPUT")?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect();
    let output_path = PathBuf::from(required_env("ROLLWIN_OUTPUT")?);
    let output_format = parse_output_format(
        std::env::var("ROLLWIN_OUTPUT_FORMAT").unwrap_or_else(|_| "jsonl".to_string()),
    )?;
    let row_policy = parse_row_policy(
        std::env::var("ROLLWIN_ROW_POLICY").unwrap_or_else(|_| "strict".to_string()),
    )?;

    if input_paths.is_empty() {
        return Err("ROLLWIN_INPUT must list at least one file".into());
    }

    log_run_start(&logging, &meta_path, input_paths.len());

    let catalog = FeatureCatalog::load(Path::new(&meta_path))?;
    let expander = ExpanderConfig::default();
    validate_config(&expander)?;

    let vocabulary =
        CategoricalVocabulary::build_from_jsonl(&input_paths, catalog.categorical_sequences())?;
    let records = read_jsonl_records(&input_paths)?;

    let cfg = CorpusConfig {
        expander,
        row_policy,
    };
    let (schema, samples, report) = expand_corpus(records, &catalog, &vocabulary, &cfg)?;
    let rows = write_samples(&output_path, &schema, &samples, output_format)?;

    println!(
        "Expansion done | records_in={} records_skipped={} rows_out={} output={} fingerprint={}",
        report.records_in,
        report.records_skipped,
        rows,
        output_path.display(),
        schema.fingerprint
    );
    if let Some(first_error) = report.first_error {
        println!("First skipped record: {first_error}");
    }

    Ok(())
}

fn required_env(name: &str) -> Result<String, String> {
    std::env::var(name).map_err(|_| format!("{name} must be set"))
}

fn parse_output_format(raw: String) -> Result<OutputFormat, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "jsonl" | "json" => Ok(OutputFormat::JsonLines),
        "csv" => Ok(OutputFormat::Csv),
        other => Err(format!("unsupported output format: {other}")),
    }
}

fn parse_row_policy(raw: String) -> Result<RowPolicy, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "strict" => Ok(RowPolicy::Strict),
        "skip" | "report-and-skip" => Ok(RowPolicy::ReportAndSkip),
        other => Err(format!("unsupported row policy: {other}")),
    }
}
