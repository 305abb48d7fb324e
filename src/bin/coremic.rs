//! coremic - Core Microbiome Detection CLI

use clap::{Parser, Subcommand, ValueEnum};
use coremic::config::{CoreMode, RunConfig, ZeroOccurrence};
use coremic::data::CoreReport;
use coremic::error::{CoremicError, Result};
use coremic::pipeline::analyze_files;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI-friendly core mode enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliCoreMode {
    /// Present in enough interest samples
    CoreOnly,
    /// Also present in fewer out-group samples than the threshold
    RelativeToOutGroup,
}

impl From<CliCoreMode> for CoreMode {
    fn from(mode: CliCoreMode) -> Self {
        match mode {
            CliCoreMode::CoreOnly => CoreMode::CoreOnly,
            CliCoreMode::RelativeToOutGroup => CoreMode::RelativeToOutGroup,
        }
    }
}

/// CLI-friendly zero-occurrence rule
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliZeroOccurrence {
    /// 0.1 / N for OTUs never seen in random data
    Legacy,
    /// (occurrences + 1) / (N + 1)
    Laplace,
}

impl From<CliZeroOccurrence> for ZeroOccurrence {
    fn from(rule: CliZeroOccurrence) -> Self {
        match rule {
            CliZeroOccurrence::Legacy => ZeroOccurrence::Legacy,
            CliZeroOccurrence::Laplace => ZeroOccurrence::Laplace,
        }
    }
}

/// Core microbiome detection with significance testing
#[derive(Parser)]
#[command(name = "coremic")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the core OTUs of an interest group
    Run {
        /// Path to the OTU abundance table TSV
        #[arg(short, long)]
        table: PathBuf,

        /// Path to the sample-to-group mapping TSV
        #[arg(short, long)]
        mapping: PathBuf,

        /// Run configuration YAML; flags below override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Mapping column holding the group labels
        #[arg(short, long)]
        factor: Option<String>,

        /// Interest group label (repeatable)
        #[arg(short, long)]
        group: Vec<String>,

        /// Out-group label (repeatable, default: every other group)
        #[arg(long)]
        out_group: Vec<String>,

        /// Minimum interest presence fraction
        #[arg(long)]
        min_presence: Option<f64>,

        /// Maximum out-group presence fraction
        #[arg(long)]
        max_out_presence: Option<f64>,

        /// Abundances above this value count as present
        #[arg(long)]
        min_abundance: Option<f64>,

        /// Maximum corrected p-value reported
        #[arg(long)]
        max_p: Option<f64>,

        /// Correction: none, bonferroni (bf), bonferroni-holm (bf-h),
        /// benjamini-hochberg (b-h)
        #[arg(long)]
        correction: Option<String>,

        /// Permutation trials (0 = exact test)
        #[arg(short = 'n', long)]
        trials: Option<usize>,

        /// Permutation thresholds (comma-separated, e.g., "1.0,0.9,0.8")
        #[arg(long)]
        thresholds: Option<String>,

        #[arg(long, value_enum)]
        core_mode: Option<CliCoreMode>,

        #[arg(long, value_enum)]
        zero_occurrence: Option<CliZeroOccurrence>,

        /// Random seed for permutation trials
        #[arg(long)]
        seed: Option<u64>,

        /// Batches permutation trials are split into
        #[arg(short, long)]
        workers: Option<usize>,

        /// Wall-clock budget per worker invocation, in milliseconds
        #[arg(long)]
        worker_budget_ms: Option<u64>,

        /// Directory for batch checkpoints
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        /// Convert abundances to relative abundances first
        #[arg(long)]
        relative: bool,

        /// Also report with interest and out groups swapped
        #[arg(long)]
        include_out: bool,

        /// Output path for the report TSV (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write reports as JSON instead of TSV
        #[arg(long)]
        json: bool,
    },

    /// Generate an example run configuration
    Example {
        /// Output path for the example YAML
        #[arg(short, long, default_value = "coremic.yaml")]
        output: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            table,
            mapping,
            config,
            factor,
            group,
            out_group,
            min_presence,
            max_out_presence,
            min_abundance,
            max_p,
            correction,
            trials,
            thresholds,
            core_mode,
            zero_occurrence,
            seed,
            workers,
            worker_budget_ms,
            checkpoint_dir,
            relative,
            include_out,
            output,
            json,
        } => build_config(config.as_deref()).and_then(|mut run| {
            if let Some(factor) = factor {
                run.factor = factor;
            }
            if !group.is_empty() {
                run.group = group;
            }
            if !out_group.is_empty() {
                run.out_group = out_group;
            }
            if let Some(v) = min_presence {
                run.min_presence_fraction = v;
            }
            if let Some(v) = max_out_presence {
                run.max_out_presence_fraction = v;
            }
            if let Some(v) = min_abundance {
                run.min_abundance = v;
            }
            if let Some(v) = max_p {
                run.max_p = v;
            }
            if let Some(tag) = correction {
                run.p_value_correction = tag.parse()?;
            }
            if let Some(n) = trials {
                run.trial_count = n;
            }
            if let Some(list) = thresholds {
                run.thresholds = parse_thresholds(&list)?;
            }
            if let Some(mode) = core_mode {
                run.core_mode = mode.into();
            }
            if let Some(rule) = zero_occurrence {
                run.zero_occurrence = rule.into();
            }
            if seed.is_some() {
                run.seed = seed;
            }
            if let Some(w) = workers {
                run.execution.workers = w;
            }
            if worker_budget_ms.is_some() {
                run.execution.worker_budget_ms = worker_budget_ms;
            }
            if checkpoint_dir.is_some() {
                run.execution.checkpoint_dir = checkpoint_dir;
            }
            run.relative_abundance |= relative;
            run.include_out |= include_out;
            cmd_run(&table, &mapping, &run, output.as_deref(), json)
        }),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn build_config(path: Option<&Path>) -> Result<RunConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading run configuration");
            // Validated after flag overrides are applied
            let yaml = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&yaml)?)
        }
        None => Ok(RunConfig::default()),
    }
}

fn parse_thresholds(list: &str) -> Result<Vec<f64>> {
    list.split(',')
        .map(|s| {
            s.trim().parse::<f64>().map_err(|_| {
                CoremicError::InvalidParameter(format!(
                    "invalid threshold '{}'",
                    s.trim()
                ))
            })
        })
        .collect()
}

/// Run an analysis and write its reports
fn cmd_run(
    table: &Path,
    mapping: &Path,
    config: &RunConfig,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let reports = analyze_files(table, mapping, config)?;
    for report in &reports {
        for line in report.to_string().lines() {
            eprintln!("{}", line);
        }
    }

    match output {
        Some(path) => {
            for (i, report) in reports.iter().enumerate() {
                let target = if i == 0 {
                    path.to_path_buf()
                } else {
                    suffixed(path, "out")
                };
                let mut file = std::fs::File::create(&target)?;
                write_report(report, &mut file, json)?;
                info!(path = %target.display(), rows = report.len(), "report written");
            }
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            for report in &reports {
                write_report(report, &mut handle, json)?;
            }
        }
    }
    Ok(())
}

fn write_report<W: Write>(report: &CoreReport, writer: &mut W, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *writer, report)?;
        writeln!(writer)?;
        Ok(())
    } else {
        report.write_tsv(writer)
    }
}

/// `results.tsv` -> `results_out.tsv`
fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}_{}", stem, suffix),
    };
    path.with_file_name(name)
}

fn cmd_example(output_path: &Path) -> Result<()> {
    let config = RunConfig {
        name: "example-core".to_string(),
        out_group: vec!["Treated".to_string()],
        min_presence_fraction: 0.9,
        trial_count: 1000,
        seed: Some(42),
        ..RunConfig::new("Treatment", &["Control"])
    };
    let yaml = config.to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example configuration to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}
