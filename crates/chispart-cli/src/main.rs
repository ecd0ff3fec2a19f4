mod repl;
mod server;

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chispart_contracts::config::StudioConfig;
use chispart_contracts::events::{EventWriter, SessionStart};
use chispart_contracts::session::SessionSummary;
use chispart_contracts::store::GenerationStore;
use chispart_engine::{
    EventLogObserver, ExportMode, ProviderAdapter, StoreObserver, Studio, StudioError,
    StudioObserver,
};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::repl::Repl;
use crate::server::{provider_catalog, ApiState};

#[derive(Debug, Parser)]
#[command(name = "chispart", version, about = "Chispart image studio")]
struct Cli {
    /// JSON studio config; flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive studio driven by slash commands.
    Studio(StudioArgs),
    /// Queue prompts, run one batch and optionally export the images.
    Run(RunArgs),
    /// Extract image prompts from a block of text.
    Analyze(AnalyzeArgs),
    /// HTTP API for generation, refinement and extraction.
    Serve(ServeArgs),
    /// Print the provider catalog as JSON.
    Providers,
}

#[derive(Debug, Clone, Default, Args)]
struct RouteArgs {
    #[arg(long)]
    image_provider: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    text_provider: Option<String>,
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    style: Option<String>,
    /// Skip the delays between generation calls and downloads.
    #[arg(long)]
    no_pacing: bool,
}

#[derive(Debug, Args)]
struct StudioArgs {
    #[command(flatten)]
    route: RouteArgs,
    #[arg(long, default_value = "chispart-out")]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    route: RouteArgs,
    #[arg(long = "prompt")]
    prompts: Vec<String>,
    /// One prompt per line; blank lines and lines starting with '#' are ignored.
    #[arg(long)]
    prompts_file: Option<PathBuf>,
    #[arg(long, default_value = "chispart-out")]
    out: PathBuf,
    /// zip or files
    #[arg(long)]
    export: Option<ExportMode>,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    #[command(flatten)]
    route: RouteArgs,
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[command(flatten)]
    route: RouteArgs,
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: SocketAddr,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("chispart error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Studio(args) => {
            run_studio(args, config_path)?;
            Ok(0)
        }
        Command::Run(args) => run_batch(args, config_path),
        Command::Analyze(args) => {
            run_analyze(args, config_path)?;
            Ok(0)
        }
        Command::Serve(args) => {
            run_serve(args, config_path)?;
            Ok(0)
        }
        Command::Providers => {
            let adapter = ProviderAdapter::with_default_providers();
            println!("{}", serde_json::to_string_pretty(&provider_catalog(&adapter))?);
            Ok(0)
        }
    }
}

fn load_config(path: Option<&Path>, route: &RouteArgs) -> Result<StudioConfig> {
    let mut config = match path {
        Some(path) => StudioConfig::load(path)?,
        None => StudioConfig::default(),
    };
    if let Some(provider) = &route.image_provider {
        config.image_provider = provider.trim().to_ascii_lowercase();
        // A model named for the old provider would not resolve.
        config.image_model.clear();
    }
    if let Some(model) = &route.image_model {
        config.image_model = model.trim().to_string();
    }
    if let Some(provider) = &route.text_provider {
        config.text_provider = provider.trim().to_ascii_lowercase();
        config.text_model.clear();
    }
    if let Some(model) = &route.text_model {
        config.text_model = model.trim().to_string();
    }
    if let Some(style) = &route.style {
        let catalog = config.style_catalog();
        if catalog.get(style).is_none() {
            bail!(
                "unknown art style '{}' (expected one of: {})",
                style.trim(),
                catalog.values().join(", ")
            );
        }
        config.default_style = style.trim().to_ascii_lowercase();
    }
    if route.no_pacing {
        config = config.without_pacing();
    }
    Ok(config)
}

/// One studio session persisted under `out_dir`: events, generation records
/// and a summary written by `finish`.
struct Session {
    studio: Studio,
    log: Arc<EventLogObserver>,
    out_dir: PathBuf,
}

impl Session {
    fn open(config: &StudioConfig, adapter: Arc<ProviderAdapter>, out_dir: &Path, command: &str) -> Result<Self> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed creating output dir {}", out_dir.display()))?;
        let session_id = format!("chispart-{}", chrono::Local::now().format("%Y%m%d-%H%M%S"));
        let writer = EventWriter::new(out_dir.join("events.jsonl"), session_id);
        let log = Arc::new(EventLogObserver::new(writer));
        let store = Arc::new(StoreObserver::new(GenerationStore::open(
            out_dir.join("generations.jsonl"),
        )?));
        let observers: Vec<Arc<dyn StudioObserver>> = vec![log.clone(), store];
        let studio = Studio::new(config, adapter, observers);

        log.session_started(SessionStart {
            command: command.to_string(),
            out_dir: out_dir.display().to_string(),
            image_provider: config.image_provider.clone(),
            image_model: config.image_model.clone(),
            text_provider: config.text_provider.clone(),
            text_model: config.text_model.clone(),
            style: studio.snapshot().style.value,
        })?;
        info!(session_id = %log.writer().session_id(), "session started in {}", out_dir.display());

        Ok(Self {
            studio,
            log,
            out_dir: out_dir.to_path_buf(),
        })
    }

    fn finish(&self) -> Result<SessionSummary> {
        let counts = self.studio.snapshot().counts;
        let summary = self.log.finish(counts, &self.out_dir.join("summary.json"))?;
        info!(
            completed = summary.jobs_completed,
            failed = summary.jobs_failed,
            "session finished"
        );
        Ok(summary)
    }
}

fn run_studio(args: StudioArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, &args.route)?;
    let adapter = Arc::new(ProviderAdapter::with_default_providers());
    let session = Session::open(&config, adapter, &args.out, "studio")?;
    let mut repl = Repl::new(session.studio.clone(), args.out.join("exports"));
    let outcome = repl.run();
    session.finish()?;
    outcome
}

fn read_prompts(inline: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let mut prompts: Vec<String> = inline
        .iter()
        .map(|prompt| prompt.trim().to_string())
        .filter(|prompt| !prompt.is_empty())
        .collect();
    if let Some(path) = file {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading prompts file {}", path.display()))?;
        prompts.extend(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }
    Ok(prompts)
}

fn run_batch(args: RunArgs, config_path: Option<&Path>) -> Result<i32> {
    let config = load_config(config_path, &args.route)?;
    let prompts = read_prompts(&args.prompts, args.prompts_file.as_deref())?;
    if prompts.is_empty() {
        bail!("no prompts given; pass --prompt or --prompts-file");
    }
    let adapter = Arc::new(ProviderAdapter::with_default_providers());
    let session = Session::open(&config, adapter, &args.out, "run")?;
    let exit_code = run_session_batch(&session.studio, &prompts, args.export, &args.out);
    let summary = session.finish()?;
    println!("summary: {}", args.out.join("summary.json").display());
    let exit_code = exit_code?;
    if summary.jobs_completed == 0 {
        return Ok(1);
    }
    Ok(exit_code)
}

fn run_session_batch(
    studio: &Studio,
    prompts: &[String],
    export: Option<ExportMode>,
    out_dir: &Path,
) -> Result<i32> {
    let queued = studio.queue_prompts(prompts)?;
    if let Some(rejection) = &queued.rejection {
        warn!("{rejection} {} prompts were not queued", queued.not_queued.len());
    }

    let report = studio.run_batch()?;
    for failure in &report.failed {
        println!("#{} failed: {}", failure.job_id, failure.error);
    }
    println!(
        "batch finished: {} completed, {} failed",
        report.completed.len(),
        report.failed.len()
    );

    if let Some(mode) = export {
        match studio.export(mode, &out_dir.join("exports")) {
            Ok(exported) => {
                for path in &exported.written {
                    println!("wrote {}", path.display());
                }
                for skip in &exported.skipped {
                    warn!(job_id = skip.job_id, "export skipped: {}", skip.error);
                }
            }
            Err(StudioError::NothingToExport) => warn!("{}", StudioError::NothingToExport),
            Err(err) => return Err(err.into()),
        }
    }
    Ok(if report.failed.is_empty() { 0 } else { 2 })
}

fn run_analyze(args: AnalyzeArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, &args.route)?;
    let text = match (args.text, args.file) {
        (Some(text), _) => text,
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?,
        (None, None) => bail!("pass --text or --file"),
    };
    let adapter = Arc::new(ProviderAdapter::with_default_providers());
    let studio = Studio::new(&config, adapter, Vec::new());
    let prompts = studio.extract_prompts(&text)?;
    println!("{}", Value::from(prompts));
    Ok(())
}

fn run_serve(args: ServeArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, &args.route)?;
    // Provider HTTP clients are blocking; build them before the runtime exists.
    let state = ApiState {
        adapter: Arc::new(ProviderAdapter::with_default_providers()),
        styles: Arc::new(config.style_catalog()),
        max_extracted_prompts: config.max_extracted_prompts,
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(server::serve(args.addr, state))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use chispart_contracts::store::GenerationStore;
    use chispart_engine::providers::DryrunProvider;
    use chispart_engine::{ExportMode, ProviderAdapter};

    use super::{load_config, read_prompts, run_session_batch, RouteArgs, Session};

    fn dryrun_route() -> RouteArgs {
        RouteArgs {
            image_provider: Some("dryrun".to_string()),
            text_provider: Some("DryRun".to_string()),
            style: Some("pixel_art".to_string()),
            no_pacing: true,
            ..RouteArgs::default()
        }
    }

    #[test]
    fn flags_override_config_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("studio.json");
        fs::write(
            &path,
            r#"{"image_provider":"openai","image_model":"dall-e-3","max_processing_jobs":3}"#,
        )?;

        let config = load_config(Some(&path), &dryrun_route())?;
        assert_eq!(config.image_provider, "dryrun");
        assert_eq!(config.image_model, "");
        assert_eq!(config.text_provider, "dryrun");
        assert_eq!(config.default_style, "pixel_art");
        assert_eq!(config.max_processing_jobs, 3);
        assert_eq!(config.generation_delay_ms, 0);

        let bad_style = RouteArgs {
            style: Some("baroque".to_string()),
            ..RouteArgs::default()
        };
        assert!(load_config(None, &bad_style).is_err());
        Ok(())
    }

    #[test]
    fn prompts_come_from_flags_then_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("prompts.txt");
        fs::write(&path, "# harbor scenes\nfog over the pier\n\n  a red buoy  \n")?;

        let prompts = read_prompts(&[" a gull ".to_string(), "  ".to_string()], Some(&path))?;
        assert_eq!(prompts, vec!["a gull", "fog over the pier", "a red buoy"]);
        Ok(())
    }

    #[test]
    fn session_run_writes_events_store_and_summary() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = load_config(None, &dryrun_route())?;
        let mut adapter = ProviderAdapter::new();
        adapter.register(DryrunProvider);

        let session = Session::open(&config, Arc::new(adapter), temp.path(), "run")?;
        let prompts = vec!["fog over the pier".to_string(), "a red buoy".to_string()];
        let code = run_session_batch(&session.studio, &prompts, Some(ExportMode::Archive), temp.path())?;
        assert_eq!(code, 0);
        let summary = session.finish()?;
        assert_eq!(summary.jobs_completed, 2);
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.exports, 1);

        let events = fs::read_to_string(temp.path().join("events.jsonl"))?;
        let first = events.lines().next().unwrap_or_default();
        assert!(first.contains("\"type\":\"session_started\""));
        assert!(events.lines().last().unwrap_or_default().contains("session_finished"));
        assert!(temp.path().join("summary.json").exists());

        let store = GenerationStore::open(temp.path().join("generations.jsonl"))?;
        let records = store.list();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|record| record.provider == "dryrun"));
        assert_eq!(fs::read_dir(temp.path().join("exports"))?.count(), 1);
        Ok(())
    }
}
