use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rollbook_core::headers::{HeaderIndex, ScoreLayout, detect_score_layout};
use rollbook_core::reader::read_table;
use rollbook_core::{
    CancelFlag, IngestConfig, Ingestor, MemoryStore, Principal, Role, Seed, Target, Upload,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod formatter;

use formatter::{HeaderReport, InspectReport};

#[derive(Parser)]
#[command(name = "rollbook")]
#[command(about = "Bulk CSV/XLSX ingestion of student rolls and exam scores", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a file and show how its headers map
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Upload exam scores (all rows or none)
    Scores {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Exam the scores belong to
        #[arg(long)]
        exam: String,

        #[command(flatten)]
        store: StoreArgs,
    },
    /// Upload a student roll (each valid row is kept)
    Students {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(clap::Args)]
struct StoreArgs {
    /// School the upload is made for
    #[arg(long)]
    tenant: String,

    /// JSON snapshot with exams, students and scores to start from
    #[arg(long, value_name = "SEED")]
    seed: Option<PathBuf>,

    /// Write the resulting snapshot here
    #[arg(long, value_name = "OUT")]
    save: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

fn load_config(path: Option<&Path>) -> Result<IngestConfig> {
    let config = if let Some(config_path) = path {
        IngestConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        // Try to load default config from current directory if it exists
        let default_config_path = PathBuf::from("rollbook.toml");
        if default_config_path.exists() {
            IngestConfig::from_file(&default_config_path).with_context(|| {
                format!(
                    "Failed to load config from {}",
                    default_config_path.display()
                )
            })?
        } else {
            IngestConfig::default()
        }
    };

    config.validate().context("Invalid configuration")?;
    tracing::debug!(
        scores_limit = config.scores.max_upload_bytes,
        students_limit = config.students.max_upload_bytes,
        "configuration loaded"
    );
    Ok(config)
}

fn read_upload(path: &Path) -> Result<Upload> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Upload::new(file_name, bytes))
}

fn open_store(args: &StoreArgs) -> Result<Arc<MemoryStore>> {
    let seed = match &args.seed {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read seed: {}", path.display()))?;
            serde_json::from_str::<Seed>(&content)
                .with_context(|| format!("Invalid seed file: {}", path.display()))?
        }
        None => Seed::default(),
    };
    Ok(Arc::new(MemoryStore::from_seed(seed)))
}

fn save_store(store: &MemoryStore, path: Option<&Path>) -> Result<()> {
    if let Some(path) = path {
        let snapshot = store.snapshot()?;
        fs::write(path, serde_json::to_string_pretty(&snapshot)?)
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
    }
    Ok(())
}

fn inspect(config: &IngestConfig, path: &Path) -> Result<InspectReport> {
    let upload = read_upload(path)?;
    let limit = config
        .max_upload_bytes(Target::Scores)
        .max(config.max_upload_bytes(Target::Students));
    let table = read_table(upload.kind()?, &upload.bytes, limit)
        .with_context(|| format!("Failed to decode file: {}", path.display()))?;

    let score_aliases = config.alias_table(Target::Scores);
    let student_aliases = config.alias_table(Target::Students);
    let headers = table
        .headers
        .iter()
        .enumerate()
        .map(|(column, header)| HeaderReport {
            column,
            header: header.clone(),
            scores_field: score_aliases.resolve(header).map(|f| f.as_str()),
            students_field: student_aliases.resolve(header).map(|f| f.as_str()),
        })
        .collect();

    let index = HeaderIndex::build(&table.headers, &score_aliases);
    let (score_layout, subjects) = match detect_score_layout(&table.headers, &index) {
        Ok(ScoreLayout::RowBased) => ("row-based".to_string(), Vec::new()),
        Ok(ScoreLayout::Wide { subjects }) => (
            "wide".to_string(),
            subjects.into_iter().map(|s| s.label).collect(),
        ),
        Err(e) => (format!("not a score file ({e})"), Vec::new()),
    };

    Ok(InspectReport {
        file: path.display().to_string(),
        rows: table.rows.len(),
        headers,
        score_layout,
        subjects,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let exit_code = match &cli.command {
        Command::Inspect { file } => {
            let report = inspect(&config, file)?;
            match cli.format {
                OutputFormat::Human => formatter::print_inspect(&report),
                OutputFormat::Json => formatter::print_json(&report)?,
            }
            0
        }
        Command::Scores { file, exam, store } => {
            let memory = open_store(store)?;
            let ingestor = Ingestor::with_config(config, memory.clone())?;
            let principal = Principal::new("cli", store.tenant.as_str(), Role::Admin);

            let upload = read_upload(file)?;
            let outcome = ingestor
                .ingest_scores(&principal, exam, &upload)
                .with_context(|| format!("Failed to ingest scores from {}", file.display()))?;
            formatter::print_scores(cli.format, file, &outcome)?;
            save_store(&memory, store.save.as_deref())?;

            // A rejected batch is a failed upload
            if outcome.is_rejected() { 1 } else { 0 }
        }
        Command::Students { file, store } => {
            let memory = open_store(store)?;
            let ingestor = Ingestor::with_config(config, memory.clone())?;
            let principal = Principal::new("cli", store.tenant.as_str(), Role::Admin);

            let upload = read_upload(file)?;
            let outcome = ingestor
                .ingest_students(&principal, &upload, CancelFlag::new())
                .with_context(|| format!("Failed to ingest students from {}", file.display()))?;
            formatter::print_students(cli.format, file, &outcome)?;
            save_store(&memory, store.save.as_deref())?;
            0
        }
    };

    std::process::exit(exit_code);
}
