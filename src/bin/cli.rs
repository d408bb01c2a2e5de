//! Race Eval CLI - evaluate race outcome predictions from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use race_eval::data::{metrics_to_frame, ObjectLocation, ObjectStore, PredictionLoader};
use race_eval::evaluation::{GroupedMetricsAggregator, PredictionsAssembler, Split};
use race_eval::metrics::{Metric, MetricEvaluator, NumericPolicy, WeightRange};
use race_eval::{EvalConfig, FeatureMatrix, LinearRegressor, MeanRegressor, MetricsTable, Model};

#[derive(Parser)]
#[command(name = "race-eval")]
#[command(author, version, about = "Race prediction evaluation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file (defaults and RACE_EVAL_* variables otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported metrics
    Metrics,

    /// Compute long-format metrics by group (and time bucket)
    Evaluate {
        /// Predictions CSV (local path or gs://bucket/path)
        #[arg(short, long)]
        input: String,

        /// Group column; repeat for several (default: model_set)
        #[arg(short, long = "by")]
        by: Vec<String>,

        /// Comma separated metric names (default: mae,mape,rmse)
        #[arg(short, long)]
        metrics: Option<String>,

        /// Time bucket frequency such as H, 15min, D, W, M (bare flag: configured default)
        #[arg(long, num_args = 0..=1)]
        freq: Option<Option<String>>,

        /// Name of the time bucket column (default: datetime_<freq>)
        #[arg(long)]
        alias: Option<String>,

        /// Write the metrics CSV here instead of printing
        #[arg(short, long)]
        output: Option<String>,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Reject non-finite metric values
        #[arg(long)]
        strict: bool,
    },

    /// Weighted cumulative error of one error series
    Wce {
        /// Comma separated errors, in order
        #[arg(short, long, allow_hyphen_values = true)]
        errors: String,

        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        low: f64,

        #[arg(long, default_value = "1.0", allow_hyphen_values = true)]
        high: f64,
    },

    /// Predict train/test splits and write a predictions table
    Predict {
        #[arg(long)]
        train: String,

        #[arg(long)]
        test: String,

        #[arg(long)]
        validation: Option<String>,

        /// Target column
        #[arg(long)]
        target: String,

        /// Comma separated feature columns
        #[arg(long)]
        features: String,

        /// Linear model JSON or ONNX file (mean baseline when omitted)
        #[arg(long)]
        model: Option<PathBuf>,

        #[arg(short, long)]
        output: String,
    },

    /// Download an object to a local file
    Fetch {
        /// Source location, e.g. gs://bucket/path/file.csv
        source: String,

        /// Local destination path
        dest: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = load_config(cli.config.as_deref())?;
    debug!("Using config: {:?}", config);

    match cli.command {
        Commands::Metrics => list_metrics(),
        Commands::Evaluate {
            input,
            by,
            metrics,
            freq,
            alias,
            output,
            format,
            strict,
        } => run_evaluate(
            &config,
            &input,
            by,
            metrics,
            freq,
            alias.as_deref(),
            output.as_deref(),
            format,
            strict,
        ),
        Commands::Wce { errors, low, high } => run_wce(&errors, low, high),
        Commands::Predict {
            train,
            test,
            validation,
            target,
            features,
            model,
            output,
        } => run_predict(
            &config,
            &train,
            &test,
            validation.as_deref(),
            &target,
            &features,
            model.as_deref(),
            &output,
        ),
        Commands::Fetch { source, dest } => run_fetch(&config, &source, &dest),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        std::env::var("RACE_EVAL_LOG")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EvalConfig> {
    let Some(path) = path else {
        return Ok(EvalConfig::from_env());
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let mut config: EvalConfig = serde_json::from_str(&text)
        .with_context(|| format!("Invalid config {:?}", path))?;
    if config.storage.access_token.is_none() {
        config.storage.access_token = EvalConfig::from_env().storage.access_token;
    }
    Ok(config)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `--freq` absent: no bucketing; bare `--freq`: the configured frequency
fn resolve_frequency(freq: Option<Option<String>>, config: &EvalConfig) -> Option<String> {
    freq.map(|f| f.unwrap_or_else(|| config.frequency.clone()))
}

fn list_metrics() -> Result<()> {
    println!("{}", "Supported metrics:".yellow().bold());
    println!("{}", "-".repeat(40));
    for metric in Metric::ALL {
        let direction = if metric.higher_is_better() {
            "higher is better"
        } else {
            "lower is better"
        };
        println!("  {:<24} {}", metric.as_str(), direction.dimmed());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_evaluate(
    config: &EvalConfig,
    input: &str,
    by: Vec<String>,
    metrics: Option<String>,
    freq: Option<Option<String>>,
    alias: Option<&str>,
    output: Option<&str>,
    format: OutputFormat,
    strict: bool,
) -> Result<()> {
    let rt = runtime()?;
    let store = ObjectStore::new(config.storage.clone()).context("Failed to create storage client")?;

    let df = rt
        .block_on(store.read_csv(input))
        .with_context(|| format!("Failed to load predictions from {}", input))?;
    let loader = PredictionLoader::new(&config.id_column, &config.timestamp_column);
    let table = loader
        .table_from_frame(&df)
        .with_context(|| format!("Invalid predictions table {}", input))?;

    let group_columns = if by.is_empty() {
        config.group_columns.clone()
    } else {
        by
    };
    let metric_names = match metrics {
        Some(list) => split_list(&list),
        None => config.metrics.clone(),
    };
    let metric_refs: Vec<&str> = metric_names.iter().map(String::as_str).collect();

    let policy = if strict {
        NumericPolicy::Strict
    } else {
        config.numeric_policy
    };
    let aggregator = GroupedMetricsAggregator::new(MetricEvaluator::new(policy, config.weight_range));

    let result = match resolve_frequency(freq, config) {
        Some(freq) => aggregator.aggregate_by_datetime(
            &table,
            &freq,
            alias,
            &group_columns,
            Some(&metric_refs),
        ),
        None => aggregator.aggregate(&table, &group_columns, Some(&metric_refs)),
    }
    .context("Failed to compute metrics")?;

    if let Some(output) = output {
        let mut frame = metrics_to_frame(&result)?;
        rt.block_on(store.write_csv(&mut frame, output))
            .with_context(|| format!("Failed to write metrics to {}", output))?;
        println!("{}: {} metric rows to {}", "Saved".green(), result.len(), output);
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_metrics_table(&result),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result.to_json_records())?);
        }
        OutputFormat::Csv => {
            let mut frame = metrics_to_frame(&result)?;
            let bytes = race_eval::data::csv_loader::frame_to_csv_bytes(&mut frame)?;
            print!("{}", String::from_utf8_lossy(&bytes));
        }
    }

    Ok(())
}

fn print_metrics_table(metrics: &MetricsTable) {
    let header: Vec<String> = metrics
        .group_columns
        .iter()
        .map(|c| format!("{:<22}", c))
        .collect();
    println!(
        "{}{:<24} {:>14}",
        header.join(" ").yellow().bold(),
        " variable".yellow().bold(),
        "value".yellow().bold()
    );
    println!("{}", "-".repeat(23 * metrics.group_columns.len() + 40));

    for row in &metrics.rows {
        let group: Vec<String> = row.group.iter().map(|v| format!("{:<22}", v)).collect();
        let value = format!("{:>14.4}", row.value);
        let value = if row.value.is_finite() {
            value.normal()
        } else {
            value.red()
        };
        println!("{} {:<23} {}", group.join(" "), row.metric, value);
    }

    if metrics.is_empty() {
        println!("{}", "No metric rows computed.".red());
    }
}

fn run_wce(errors: &str, low: f64, high: f64) -> Result<()> {
    let errors: Vec<f64> = split_list(errors)
        .iter()
        .map(|e| e.parse::<f64>().with_context(|| format!("Invalid error value: {}", e)))
        .collect::<Result<_>>()?;

    let evaluator = MetricEvaluator::new(NumericPolicy::Propagate, WeightRange::new(low, high));
    let value = evaluator.evaluate_errors(&errors)?;

    println!(
        "{} over {} errors, weights {} to {}: {}",
        "wce".cyan().bold(),
        errors.len(),
        low,
        high,
        format!("{:.6}", value).green()
    );
    Ok(())
}

fn load_model(path: Option<&Path>, train_target: &[f64]) -> Result<Box<dyn Model>> {
    let Some(path) = path else {
        return Ok(Box::new(MeanRegressor::fit(train_target)?));
    };

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(Box::new(LinearRegressor::load(path)?)),
        #[cfg(feature = "onnx")]
        Some("onnx") => Ok(Box::new(race_eval::predictor::OnnxRegressor::new(path)?)),
        #[cfg(not(feature = "onnx"))]
        Some("onnx") => anyhow::bail!("ONNX models require the `onnx` feature"),
        _ => anyhow::bail!("Unknown model format: {:?}", path),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_predict(
    config: &EvalConfig,
    train: &str,
    test: &str,
    validation: Option<&str>,
    target: &str,
    features: &str,
    model_path: Option<&Path>,
    output: &str,
) -> Result<()> {
    let rt = runtime()?;
    let store = ObjectStore::new(config.storage.clone()).context("Failed to create storage client")?;

    let load_split = |location: &str| -> Result<Split> {
        let frame = rt
            .block_on(store.read_csv(location))
            .with_context(|| format!("Failed to load {}", location))?;
        let target_values = FeatureMatrix::from_frame(&frame, &[target])
            .with_context(|| format!("Missing target column {} in {}", target, location))?
            .as_slice()
            .to_vec();
        Ok(Split::new(frame, target_values))
    };

    let train_split = load_split(train)?;
    let test_split = load_split(test)?;
    let validation_split = validation.map(load_split).transpose()?;

    let mut model = load_model(model_path, &train_split.target)?;
    println!("{}: {} model", "Predicting".green(), model.name());

    let assembler = PredictionsAssembler::new(split_list(features))
        .with_metadata_columns(&config.id_column, &config.timestamp_column);
    let table = assembler.make_predictions(
        model.as_mut(),
        &train_split,
        &test_split,
        validation_split.as_ref(),
    )?;

    let loader = PredictionLoader::new(&config.id_column, &config.timestamp_column);
    let mut frame = loader.table_to_frame(&table)?;
    rt.block_on(store.write_csv(&mut frame, output))
        .with_context(|| format!("Failed to write predictions to {}", output))?;

    println!("{}: {} predictions to {}", "Saved".green(), table.len(), output);
    Ok(())
}

fn run_fetch(config: &EvalConfig, source: &str, dest: &Path) -> Result<()> {
    let location = ObjectLocation::parse(source)?;
    let rt = runtime()?;
    let store = ObjectStore::new(config.storage.clone()).context("Failed to create storage client")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("Invalid progress template")?,
    );
    pb.set_message(format!("Downloading {}...", location));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = rt.block_on(store.download_to(&location, dest));
    pb.finish_and_clear();

    match result {
        Ok(size) => {
            println!("{}: {:?} ({} bytes)", "Saved".green(), dest, size);
            Ok(())
        }
        Err(e) => {
            println!("{}: {}", "Failed".red(), e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate_freq(args: &[&str]) -> Option<Option<String>> {
        let mut argv = vec!["race-eval", "evaluate", "--input", "predictions.csv"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Evaluate { freq, .. } => freq,
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_freq_flag_forms() {
        let config = EvalConfig {
            frequency: "D".to_string(),
            ..EvalConfig::default()
        };

        let absent = evaluate_freq(&[]);
        assert_eq!(absent, None);
        assert_eq!(resolve_frequency(absent, &config), None);

        let bare = evaluate_freq(&["--freq"]);
        assert_eq!(bare, Some(None));
        assert_eq!(resolve_frequency(bare, &config).as_deref(), Some("D"));

        let explicit = evaluate_freq(&["--freq", "15min"]);
        assert_eq!(resolve_frequency(explicit, &config).as_deref(), Some("15min"));
    }

    #[test]
    fn test_bare_freq_before_other_flags() {
        let freq = evaluate_freq(&["--freq", "--alias", "hour"]);
        assert_eq!(freq, Some(None));
    }

    #[test]
    fn test_wce_accepts_negative_errors() {
        let cli = Cli::try_parse_from(["race-eval", "wce", "--errors", "-1,2", "--low", "-0.5"]).unwrap();
        match cli.command {
            Commands::Wce { errors, low, high } => {
                assert_eq!(errors, "-1,2");
                assert_eq!(low, -0.5);
                assert_eq!(high, 1.0);
            }
            _ => panic!("expected wce"),
        }
    }
}
