// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use wikitranslate::app_config::{Config, LogLevel};
use wikitranslate::database::{DatabaseConnection, Repository};
use wikitranslate::errors::AppError;
use wikitranslate::translation::glossary::{GlossaryEntry, SqliteTerminologyStore, TerminologyStore};
use wikitranslate::translation::segment::{DEFAULT_DOMAIN, SegmentFailure, TranslatedSegment};
use wikitranslate::{CancellationSignal, Segment, SegmentOrchestrator, SegmentResult};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

/// wikitranslate - segment translation for low-resource languages
///
/// Translates pre-segmented text through a cascade of providers, pivoting
/// through intermediate languages and restoring glossary terms and tone marks.
#[derive(Parser, Debug)]
#[command(name = "wikitranslate")]
#[command(version)]
#[command(about = "Segment translation orchestration with glossary protection and tonal adaptation")]
#[command(long_about = "wikitranslate translates a JSON list of segments through a cascade of providers.

EXAMPLES:
    wikitranslate translate -i segments.json -o out.json
    wikitranslate translate -i segments.json --no-cache --log-level debug
    wikitranslate glossary add CPU UCP --source-lang en --target-lang yo --domain technical
    wikitranslate glossary list --lang en

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "conf.json")]
    config: PathBuf,

    /// Set logging level
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a JSON array of segments
    Translate(TranslateArgs),

    /// Manage the terminology store
    #[command(subcommand)]
    Glossary(GlossaryCommand),
}

#[derive(Args, Debug)]
struct TranslateArgs {
    /// JSON file holding an array of segments
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write the results; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Bypass both cache tiers
    #[arg(long)]
    no_cache: bool,
}

#[derive(Subcommand, Debug)]
enum GlossaryCommand {
    /// Add or update a term
    Add {
        /// Term as it appears in source text
        source_term: String,
        /// Term to emit in the translation
        target_term: String,
        #[arg(long)]
        source_lang: String,
        #[arg(long)]
        target_lang: String,
        #[arg(long, default_value = DEFAULT_DOMAIN)]
        domain: String,
        #[arg(long, default_value_t = 0)]
        priority: i32,
    },

    /// List terms, optionally for one source language
    List {
        #[arg(long)]
        lang: Option<String>,
    },
}

/// Coloured, timestamped stderr logger
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    /// Install as the global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    fn decoration(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("\x1B[1;31m", "❌ "),
            Level::Warn => ("\x1B[1;33m", "🚧 "),
            Level::Info => ("\x1B[1;32m", " "),
            Level::Debug => ("\x1B[1;36m", "🔍 "),
            Level::Trace => ("\x1B[1;35m", "📋 "),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (colour, emoji) = Self::decoration(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{}{} {} {}\x1B[0m", colour, now, emoji, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// One line of the output file
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum OutputRecord<'a> {
    Translated(&'a TranslatedSegment),
    Failed(&'a SegmentFailure),
}

#[tokio::main]
async fn main() -> Result<()> {
    // The logger accepts everything; the max level is narrowed once the config is read
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();
    if let Some(level) = cli.log_level {
        log::set_max_level(LogLevel::from(level).to_level_filter());
    }

    let mut config = Config::load_or_create(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    config.validate().context("Configuration validation failed")?;
    log::set_max_level(config.log_level.to_level_filter());

    let outcome: Result<(), AppError> = match cli.command {
        Commands::Translate(args) => run_translate(config, args).await,
        Commands::Glossary(command) => run_glossary(&config, command).await,
    };

    outcome.map_err(anyhow::Error::from)
}

fn open_repository(config: &Config) -> Result<Repository> {
    let db = match &config.cache.database_path {
        Some(path) => DatabaseConnection::new(path)?,
        None => DatabaseConnection::new_default()?,
    };
    Ok(Repository::new(db))
}

fn read_segments(path: &Path) -> Result<Vec<Segment>, AppError> {
    let file = File::open(path).map_err(|e| AppError::File(format!("{}: {}", path.display(), e)))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn write_results(results: &[SegmentResult], output: Option<&Path>) -> Result<(), AppError> {
    let records: Vec<OutputRecord> = results
        .iter()
        .map(|r| match r {
            Ok(translated) => OutputRecord::Translated(translated),
            Err(failure) => OutputRecord::Failed(failure),
        })
        .collect();
    let json = serde_json::to_string_pretty(&records)?;

    match output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{}", json),
    }
    Ok(())
}

async fn run_translate(mut config: Config, args: TranslateArgs) -> Result<(), AppError> {
    if args.no_cache {
        config.cache.enabled = false;
    }

    let segments = read_segments(&args.input)?;
    let total = segments.len();
    info!("Translating {} segment(s) from {}", total, args.input.display());

    let repo = open_repository(&config)?;
    let orchestrator = SegmentOrchestrator::from_config_with_repository(&config, repo)?;

    let cancel = CancellationSignal::new();
    let ctrl_c_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining segments");
            ctrl_c_signal.cancel();
        }
    });

    let progress_bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({percent}%) {msg} {eta}")
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress_bar.set_style(style.progress_chars("█▓▒░"));
    progress_bar.set_message("Translating");

    let pb = progress_bar.clone();
    let outcome = orchestrator
        .translate_batch_with_progress(segments, &cancel, move |completed, _total| {
            pb.set_position(completed as u64);
        })
        .await;
    progress_bar.finish_and_clear();

    let results = match outcome {
        Ok(results) => results,
        Err(cancelled) => {
            write_results(&cancelled.partial, args.output.as_deref())?;
            return Err(cancelled.into());
        }
    };
    write_results(&results, args.output.as_deref())?;

    let failed = results.iter().filter(|r| r.is_err()).count();
    let cached = results.iter().filter(|r| r.as_ref().is_ok_and(|t| t.cache_hit)).count();
    info!(
        "Success: {} translated ({} from cache), {} failed",
        total - failed,
        cached,
        failed
    );
    if let Some(path) = &args.output {
        info!("Results written to {}", path.display());
    }
    Ok(())
}

async fn run_glossary(config: &Config, command: GlossaryCommand) -> Result<(), AppError> {
    let store = Arc::new(SqliteTerminologyStore::new(open_repository(config)?));

    match command {
        GlossaryCommand::Add {
            source_term,
            target_term,
            source_lang,
            target_lang,
            domain,
            priority,
        } => {
            let entry = GlossaryEntry::new(&source_term, &target_term, &source_lang, &target_lang)
                .with_domain(&domain)
                .with_priority(priority);
            info!(
                "Adding '{}' → '{}' ({}→{}, {})",
                entry.source_term, entry.target_term, entry.source_lang, entry.target_lang, entry.domain
            );
            store.add_entry(entry).await?;
        }
        GlossaryCommand::List { lang } => {
            let entries = store.list(lang.as_deref()).await?;
            for entry in &entries {
                println!(
                    "{}\t{}\t{}→{}\t{}\t{}",
                    entry.source_term, entry.target_term, entry.source_lang, entry.target_lang, entry.domain, entry.priority
                );
            }
            info!("{} glossary entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
        }
    }
    Ok(())
}
