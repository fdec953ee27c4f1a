//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use enhancer_core::{EnhancementPipeline, ProgressReporter, TaskQueue};
use enhancer_providers::Providers;
use enhancer_shared::{
    AppConfig, EnhancementTask, ModuleId, ModuleRecord, ModuleStore, PipelineConfig, Stage,
    TaskOutcome, TaskStatus, init_config, load_config, validate_api_keys,
};
use enhancer_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Enhancer: AI enrichment of LMS course modules.
#[derive(Parser)]
#[command(
    name = "enhancer",
    version,
    about = "Generate detailed and concise renditions of LMS modules, with encyclopedia links and videos.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path (overrides config).
    #[arg(long, env = "ENHANCER_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Module storage.
    Module {
        #[command(subcommand)]
        action: ModuleAction,
    },

    /// Queue modules for enhancement and run them one at a time.
    Enhance {
        /// Module IDs, processed in the given order.
        ids: Vec<String>,

        /// Also queue every module whose stored enrichment is missing or stale.
        #[arg(long)]
        stale: bool,
    },

    /// Show recent enhancement runs for a module.
    Runs {
        /// Module ID.
        id: String,

        /// Number of runs to show.
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Module subcommands.
#[derive(Subcommand)]
pub(crate) enum ModuleAction {
    /// Import modules from a JSON file (one object or an array).
    Import {
        /// Path to the JSON file.
        file: PathBuf,
    },
    /// List stored modules and their enrichment state.
    List,
    /// Print a module and its enrichment.
    Show {
        /// Module ID.
        id: String,

        /// Print the enrichment as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "enhancer=info",
        1 => "enhancer=debug",
        _ => "enhancer=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Module { action } => match action {
            ModuleAction::Import { file } => cmd_module_import(db, &file).await,
            ModuleAction::List => cmd_module_list(db).await,
            ModuleAction::Show { id, json } => cmd_module_show(db, &id, json).await,
        },
        Command::Enhance { ids, stale } => cmd_enhance(db, ids, stale).await,
        Command::Runs { id, limit } => cmd_runs(db, &id, limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

fn db_path(config: &AppConfig, overridden: Option<PathBuf>) -> Result<PathBuf> {
    match overridden {
        Some(path) => Ok(path),
        None => Ok(config.storage.resolve_db_path()?),
    }
}

async fn open_storage(db: Option<PathBuf>) -> Result<(AppConfig, Storage)> {
    let config = load_config()?;
    let path = db_path(&config, db)?;
    let storage = Storage::open(&path)
        .await
        .wrap_err_with(|| format!("cannot open database at {}", path.display()))?;
    Ok((config, storage))
}

// ---------------------------------------------------------------------------
// Module commands
// ---------------------------------------------------------------------------

async fn cmd_module_import(db: Option<PathBuf>, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("cannot read {}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("{} is not valid JSON", file.display()))?;
    let modules: Vec<ModuleRecord> = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };

    let (_, storage) = open_storage(db).await?;
    for module in &modules {
        storage.upsert_module(module).await?;
    }

    info!(count = modules.len(), file = %file.display(), "modules imported");
    println!("Imported {} module(s).", modules.len());
    Ok(())
}

async fn cmd_module_list(db: Option<PathBuf>) -> Result<()> {
    let (_, storage) = open_storage(db).await?;
    let modules = storage.list_modules().await?;
    if modules.is_empty() {
        println!("No modules stored. Use `enhancer module import <file>`.");
        return Ok(());
    }

    println!("{:<20} {:<12} TITLE", "ID", "ENRICHED");
    for module in modules {
        let state = match (module.enriched_at, module.stale) {
            (None, _) => "no".to_string(),
            (Some(_), true) => "stale".to_string(),
            (Some(at), false) => at.format("%Y-%m-%d").to_string(),
        };
        println!("{:<20} {:<12} {}", module.id, state, module.title);
    }
    Ok(())
}

async fn cmd_module_show(db: Option<PathBuf>, id: &str, json: bool) -> Result<()> {
    let (_, storage) = open_storage(db).await?;
    let id = ModuleId::from(id);
    let module = storage
        .find_module(&id)
        .await?
        .ok_or_else(|| eyre!("module '{id}' not found"))?;
    let enrichment = storage.get_enrichment(&id).await?;

    if json {
        let result = enrichment.as_ref().map(|e| &e.result);
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{} ({})", module.title, module.id);
    if let Some(subject) = &module.subject_name {
        println!("  Subject:    {subject}");
    }
    if let Some(profession) = &module.profession_name {
        println!("  Profession: {profession}");
    }
    match enrichment {
        None => println!("  Not enriched yet."),
        Some(stored) => {
            let current = if stored.is_current(&module.content) {
                ""
            } else {
                " (stale: content changed since)"
            };
            println!("  Enriched:   {}{current}", stored.enriched_at.to_rfc3339());
            println!(
                "  Lengths:    concise {} / detailed {} chars",
                stored.result.concise_content.chars().count(),
                stored.result.detailed_content.chars().count()
            );
            if !stored.result.degraded_stages.is_empty() {
                println!("  Degraded:   {}", join_stages(&stored.result.degraded_stages));
            }
            println!("  Concepts:");
            for concept in &stored.result.key_concepts {
                println!(
                    "    - {} ({} links, {} videos)",
                    concept.concept,
                    concept.wikipedia_links.len(),
                    concept.youtube_videos.len()
                );
            }
        }
    }
    Ok(())
}

async fn cmd_runs(db: Option<PathBuf>, id: &str, limit: u32) -> Result<()> {
    let (_, storage) = open_storage(db).await?;
    let runs = storage.recent_runs(&ModuleId::from(id), limit).await?;
    if runs.is_empty() {
        println!("No runs recorded for '{id}'.");
    }
    for run in runs {
        print_outcome(&run);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Enhancement
// ---------------------------------------------------------------------------

async fn cmd_enhance(db: Option<PathBuf>, ids: Vec<String>, stale: bool) -> Result<()> {
    let (config, storage) = open_storage(db).await?;
    validate_api_keys(&config)?;

    let mut targets: Vec<ModuleId> = ids.into_iter().map(ModuleId::from).collect();
    if stale {
        for module in storage.list_modules().await? {
            if (module.enriched_at.is_none() || module.stale) && !targets.contains(&module.id) {
                targets.push(module.id);
            }
        }
    }
    if targets.is_empty() {
        return Err(eyre!("nothing to enhance: pass module IDs or --stale"));
    }

    let storage = Arc::new(storage);
    let queue = TaskQueue::new(config.queue.history_limit);
    for id in &targets {
        match queue.enqueue_from_store(storage.as_ref(), id).await {
            Ok(position) => info!(module_id = %id, position, "queued"),
            Err(e) => warn!(module_id = %id, error = %e, "skipping module"),
        }
    }
    if queue.status().await.is_idle() {
        return Err(eyre!("no module could be queued"));
    }

    let providers = Providers::from_config(&config)?;
    let pipeline = Arc::new(EnhancementPipeline::new(
        providers.llm,
        providers.search,
        providers.encyclopedia,
        providers.video,
        PipelineConfig::from(&config),
    ));

    let (progress, mut finished) = CliProgress::new(ProgressBar::new_spinner());
    let progress = Arc::new(progress);
    let store: Arc<dyn ModuleStore> = storage.clone();
    let worker = queue.spawn(pipeline, store, progress.clone())?;

    tokio::select! {
        _ = queue.wait_idle() => worker.shutdown().await,
        _ = tokio::signal::ctrl_c() => {
            progress.spinner.set_message("Stopping after the current stage...");
            worker.shutdown().await;
        }
    }
    progress.spinner.finish_and_clear();

    let outcomes = drain_outcomes(&mut finished);
    for outcome in &outcomes {
        if let Err(e) = storage.record_outcome(outcome).await {
            warn!(module_id = %outcome.module_id, error = %e, "failed to record run");
        }
    }

    let leftover = queue.status().await.queued_count;
    let failed = failed_count(&outcomes);
    println!();
    println!(
        "  Finished: {}  Failed: {failed}  Not started: {leftover}",
        outcomes.len()
    );
    println!();

    if failed > 0 {
        return Err(eyre!("{failed} module(s) failed"));
    }
    Ok(())
}

/// Every outcome reported so far, in finishing order.
fn drain_outcomes(finished: &mut mpsc::UnboundedReceiver<TaskOutcome>) -> Vec<TaskOutcome> {
    let mut outcomes = Vec::new();
    while let Ok(outcome) = finished.try_recv() {
        outcomes.push(outcome);
    }
    outcomes
}

fn failed_count(outcomes: &[TaskOutcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| o.status == TaskStatus::Failed)
        .count()
}

fn join_stages(stages: &[Stage]) -> String {
    stages
        .iter()
        .map(Stage::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_outcome(outcome: &TaskOutcome) {
    let mut line = format!(
        "{} {:<20} {}",
        outcome.finished_at.format("%Y-%m-%d %H:%M:%S"),
        outcome.module_id,
        outcome.status
    );
    if !outcome.degraded_stages.is_empty() {
        line.push_str(&format!(" (degraded: {})", join_stages(&outcome.degraded_stages)));
    }
    if let Some(error) = &outcome.error {
        line.push_str(&format!(": {error}"));
    }
    println!("{line}");
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner. Every finished outcome
/// is also forwarded to the receiver returned by [`CliProgress::new`].
struct CliProgress {
    spinner: ProgressBar,
    finished: mpsc::UnboundedSender<TaskOutcome>,
}

impl CliProgress {
    fn new(spinner: ProgressBar) -> (Self, mpsc::UnboundedReceiver<TaskOutcome>) {
        let (finished, rx) = mpsc::unbounded_channel();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        (Self { spinner, finished }, rx)
    }
}

impl ProgressReporter for CliProgress {
    fn task_started(&self, task: &EnhancementTask) {
        self.spinner
            .set_message(format!("{}: {}", task.module_id, task.title));
    }

    fn stage(&self, module_id: &ModuleId, stage: Stage) {
        self.spinner.set_message(format!("{module_id}: {stage}"));
    }

    fn task_finished(&self, outcome: &TaskOutcome) {
        let mark = match outcome.status {
            TaskStatus::Succeeded if outcome.degraded_stages.is_empty() => "✓",
            TaskStatus::Succeeded => "~",
            _ => "✗",
        };
        let detail = outcome.error.as_deref().unwrap_or("");
        self.spinner
            .println(format!("  {mark} {} {detail}", outcome.module_id));
        if self.finished.send(outcome.clone()).is_err() {
            warn!(module_id = %outcome.module_id, "outcome receiver dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use enhancer_shared::TaskId;

    fn outcome(id: &str, status: TaskStatus) -> TaskOutcome {
        TaskOutcome {
            task_id: TaskId::new(),
            module_id: ModuleId::from(id),
            status,
            error: (status == TaskStatus::Failed).then(|| "detailed_content stage failed".into()),
            degraded_stages: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn every_finished_outcome_is_collected() {
        let (progress, mut finished) = CliProgress::new(ProgressBar::hidden());
        let reported: Vec<_> = (0..60)
            .map(|n| {
                let status = if n == 0 {
                    TaskStatus::Failed
                } else {
                    TaskStatus::Succeeded
                };
                outcome(&format!("M{n}"), status)
            })
            .collect();
        for o in &reported {
            progress.task_finished(o);
        }

        let outcomes = drain_outcomes(&mut finished);
        assert_eq!(outcomes, reported);
        assert_eq!(failed_count(&outcomes), 1);
        assert!(drain_outcomes(&mut finished).is_empty());
    }
}
