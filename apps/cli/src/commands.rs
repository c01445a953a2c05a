//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use cultureseg_core::enrichment::{BridgeConfig, BridgeEnricher, Enricher, RulesEnricher, WhatlangDetector};
use cultureseg_core::loader::{collect_inputs, load_known_titles};
use cultureseg_core::pipeline::{BatchOutcome, ProgressReporter, RunContext, run_batch};
use cultureseg_core::report::{SessionLog, quality_report};
use cultureseg_core::{KnownTitles, QualityThresholds, filter_segments, flagged_segments};
use cultureseg_shared::{AppConfig, RunId, Segment, SegmenterError, init_config, load_config};
use cultureseg_storage::Repo;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// cultureseg: segment culture profiles into reviewable records.
#[derive(Parser)]
#[command(
    name = "cultureseg",
    version,
    about = "Split culture-profile documents into titled, classified segments.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Segment documents and write the requested outputs.
    Process(ProcessArgs),

    /// Inspect or export the persisted segment repo.
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments for `cultureseg process`.
#[derive(Args, Debug)]
pub(crate) struct ProcessArgs {
    /// Documents to segment (.txt, .text, .md, .docx, .xlsx, .xls).
    #[arg(required_unless_present = "batch")]
    pub files: Vec<PathBuf>,

    /// Process every supported file in this directory instead.
    #[arg(long)]
    pub batch: Option<PathBuf>,

    /// Known subject names, one per line.
    #[arg(long)]
    pub known_titles: Option<PathBuf>,

    /// Enrich segments with the local rules enricher.
    #[arg(long)]
    pub enrich: bool,

    /// Rules file for `--enrich` (overrides config).
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// External enrichment worker command (overrides config and rules).
    #[arg(long)]
    pub bridge: Option<String>,

    /// Write all segments as CSV.
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Write all segments into one Markdown file.
    #[arg(long)]
    pub md: Option<PathBuf>,

    /// Write one Markdown file per segment into this directory.
    #[arg(long)]
    pub md_dir: Option<PathBuf>,

    /// Write all segments as a JSON array.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Merge segments into this repo database (overrides config).
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Write segments that need review as CSV.
    #[arg(long)]
    pub review: Option<PathBuf>,

    /// Print segments whose title or content contains this text.
    #[arg(long)]
    pub search: Option<String>,

    /// Write the batch quality report as JSON.
    #[arg(long)]
    pub diagnostics: Option<PathBuf>,

    /// Write a JSON session log for this run.
    #[arg(long)]
    pub session_log: Option<PathBuf>,
}

/// Repo subcommands.
#[derive(Subcommand)]
pub(crate) enum RepoAction {
    /// Print a summary of every row.
    Show {
        /// Repo database (defaults to config).
        #[arg(long)]
        repo: Option<PathBuf>,
    },
    /// Export every row as CSV.
    Export {
        /// Repo database (defaults to config).
        #[arg(long)]
        repo: Option<PathBuf>,

        /// Output file; stdout when omitted.
        #[arg(long)]
        csv: Option<PathBuf>,
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
        0 => "cultureseg=info",
        1 => "cultureseg=debug",
        _ => "cultureseg=trace",
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
    match cli.command {
        Command::Process(args) => cmd_process(args).await,
        Command::Repo { action } => match action {
            RepoAction::Show { repo } => cmd_repo_show(repo).await,
            RepoAction::Export { repo, csv } => cmd_repo_export(repo, csv).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

async fn cmd_process(args: ProcessArgs) -> Result<()> {
    let config = load_config()?;

    let inputs = collect_inputs(&args.files, args.batch.as_deref())?;
    if inputs.is_empty() {
        return Err(eyre!("no input documents to process"));
    }

    let known_titles = match args
        .known_titles
        .clone()
        .or_else(|| config.defaults.known_titles_path.as_ref().map(PathBuf::from))
    {
        Some(path) => load_known_titles(&path)?,
        None => KnownTitles::new(),
    };

    let mut ctx = RunContext::new(RunId::now(), known_titles)
        .with_thresholds(QualityThresholds::from(&config.quality))
        .with_language(Arc::new(WhatlangDetector));
    if let Some(enricher) = build_enricher(&args, &config)? {
        ctx = ctx.with_enricher(enricher);
    }

    info!(
        run_id = %ctx.run_id,
        documents = inputs.len(),
        known_titles = ctx.known_titles.len(),
        enricher = ctx.enricher_name().unwrap_or("none"),
        "starting run"
    );

    let mut session = SessionLog::new(ctx.run_id.clone(), &inputs, ctx.enricher_name());

    let reporter = CliProgress::new();
    let outcome = run_batch(
        &inputs,
        Arc::new(ctx),
        config.defaults.concurrency,
        &reporter,
    )
    .await;

    session.record(&outcome);
    for failure in &outcome.failures {
        eprintln!("  failed: {}: {}", failure.path.display(), failure.error);
    }
    if outcome.documents.is_empty() {
        return Err(eyre!("all {} document(s) failed", outcome.failures.len()));
    }

    let elapsed = outcome.elapsed;
    let documents = outcome.documents.len();
    let segments = outcome.into_segments();

    let report = quality_report(&segments);
    if !report.duplicate_titles.is_empty() {
        warn!(titles = ?report.duplicate_titles, "duplicate titles in batch");
    }

    write_outputs(&args, &config, &segments)?;

    if let Some(query) = args.search.as_deref() {
        let hits = filter_segments(&segments, query);
        println!("  Search \"{query}\": {} match(es)", hits.len());
        for seg in hits {
            println!(
                "    {} ({})",
                seg.title,
                seg.source_file.as_deref().unwrap_or("?")
            );
        }
    }

    let repo_path = args
        .repo
        .clone()
        .or_else(|| config.defaults.repo_path.as_ref().map(PathBuf::from));
    if let Some(path) = repo_path {
        let repo = Repo::open(&path).await?;
        let stats = repo.merge(&segments).await?;
        println!(
            "  Repo:      {} (+{} new, {} total)",
            path.display(),
            stats.inserted,
            stats.total
        );
    }

    if let Some(path) = &args.diagnostics {
        let path = resolve_output(&config, path);
        write_report_json(&path, &report)?;
    }

    if let Some(path) = &args.session_log {
        session.set_diagnostics(report.clone());
        session.write_json(&resolve_output(&config, path))?;
    }

    println!();
    println!("  Documents: {documents}");
    println!("  Segments:  {}", segments.len());
    println!("  Flagged:   {}", report.flagged_count);
    println!("  Time:      {:.1}s", elapsed.as_secs_f64());
    println!();
    println!("{report}");

    Ok(())
}

/// Pick the enricher for this run: bridge, then rules, then none.
fn build_enricher(args: &ProcessArgs, config: &AppConfig) -> Result<Option<Arc<dyn Enricher>>> {
    let bridge_command = args
        .bridge
        .clone()
        .or_else(|| config.enrichment.bridge_command.clone());
    if let Some(command) = bridge_command {
        let bridge_args = if args.bridge.is_some() {
            Vec::new()
        } else {
            config.enrichment.bridge_args.clone()
        };
        let bridge = BridgeConfig::new(command, bridge_args).with_timeout(Duration::from_secs(
            config.enrichment.bridge_timeout_secs,
        ));
        let enricher = BridgeEnricher::spawn(&bridge)?;
        return Ok(Some(Arc::new(enricher)));
    }

    if !(args.enrich || config.enrichment.enabled) {
        return Ok(None);
    }

    let rules_path = args
        .rules
        .clone()
        .or_else(|| config.enrichment.rules_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| eyre!("enrichment requested but no rules file given (--rules)"))?;
    let enricher = RulesEnricher::from_path(&rules_path)?;
    if enricher.is_empty() {
        warn!(path = %rules_path.display(), "rules file has no rules");
    }
    Ok(Some(Arc::new(enricher)))
}

/// Bare file names land in the configured output directory.
fn resolve_output(config: &AppConfig, path: &Path) -> PathBuf {
    let is_bare = path
        .parent()
        .is_none_or(|p| p.as_os_str().is_empty());
    if is_bare && !path.is_absolute() {
        Path::new(&config.defaults.output_dir).join(path)
    } else {
        path.to_path_buf()
    }
}

fn write_outputs(args: &ProcessArgs, config: &AppConfig, segments: &[Segment]) -> Result<()> {
    if let Some(path) = &args.csv {
        let path = resolve_output(config, path);
        cultureseg_export::write_csv(&path, segments)?;
        println!("  CSV:       {}", path.display());
    }
    if let Some(path) = &args.md {
        let path = resolve_output(config, path);
        cultureseg_export::write_markdown(&path, segments)?;
        println!("  Markdown:  {}", path.display());
    }
    if let Some(dir) = &args.md_dir {
        let dir = resolve_output(config, dir);
        let written = cultureseg_export::write_markdown_per_segment(&dir, segments)?;
        println!("  Md dir:    {} ({} files)", dir.display(), written.len());
    }
    if let Some(path) = &args.json {
        let path = resolve_output(config, path);
        cultureseg_export::write_json(&path, segments)?;
        println!("  JSON:      {}", path.display());
    }
    if let Some(path) = &args.review {
        let path = resolve_output(config, path);
        let flagged = flagged_segments(segments);
        cultureseg_export::write_csv(&path, flagged.iter().copied())?;
        println!("  Review:    {} ({} flagged)", path.display(), flagged.len());
    }
    Ok(())
}

fn write_report_json(path: &Path, report: &cultureseg_core::report::QualityReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SegmenterError::io(parent, e))?;
    }
    std::fs::write(path, serde_json::to_string_pretty(report)?)
        .map_err(|e| SegmenterError::io(path, e))?;
    println!("  Report:    {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid spinner template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_done(&self, path: &Path, segments: usize, current: usize, total: usize) {
        self.spinner.set_message(format!(
            "Segmented [{current}/{total}] {} ({segments} segments)",
            path.display()
        ));
    }

    fn document_failed(&self, path: &Path, error: &SegmenterError) {
        self.spinner
            .println(format!("  skipped {}: {error}", path.display()));
    }

    fn done(&self, _outcome: &BatchOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Repo
// ---------------------------------------------------------------------------

fn repo_path(flag: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    flag.or_else(|| config.defaults.repo_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| eyre!("no repo given: pass --repo or set defaults.repo_path"))
}

async fn cmd_repo_show(repo: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let path = repo_path(repo, &config)?;
    let repo = Repo::open_readonly(&path).await?;
    let rows = repo.rows().await?;

    println!("  Repo: {} ({} rows)", path.display(), rows.len());
    for seg in &rows {
        println!(
            "    {:<32} {:<8} {:<6} {}",
            seg.title,
            seg.confidence_score.map(|c| c.as_str()).unwrap_or("-"),
            if seg.needs_attention == Some(true) { "review" } else { "" },
            seg.source_file.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn cmd_repo_export(repo: Option<PathBuf>, csv: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let path = repo_path(repo, &config)?;
    let rows = Repo::open_readonly(&path).await?.rows().await?;

    match csv {
        Some(out) => {
            let out = resolve_output(&config, &out);
            cultureseg_export::write_csv(&out, &rows)?;
            info!(rows = rows.len(), path = %out.display(), "repo exported");
            println!("  Exported {} rows to {}", rows.len(), out.display());
        }
        None => print!("{}", cultureseg_export::segments_to_csv(&rows)),
    }
    Ok(())
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
