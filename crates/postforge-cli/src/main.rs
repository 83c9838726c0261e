use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use postforge_contracts::content::JobResult;
use postforge_contracts::jobs::JobStatus;
use postforge_contracts::platforms::TypeFilter;
use postforge_engine::{
    DisplayContract, EngineConfig, GenerationBackend, HttpBackend, Notice, NoticeLevel,
    Orchestrator,
};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "postforge-rs",
    version,
    about = "Generate platform posts for system-design topics"
)]
struct Cli {
    /// Overrides `POSTFORGE_API_BASE`.
    #[arg(long, global = true)]
    api_base: Option<String>,
    /// Append lifecycle events as JSONL; overrides `POSTFORGE_EVENTS`.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List topics known to the backend.
    Topics,
    /// Submit one generation job and wait for its results.
    Generate(GenerateArgs),
    /// Fetch the current status of a job.
    Status(StatusArgs),
    /// Show stored results for a topic.
    Results(ResultsArgs),
    /// List platform/format pairs with a dedicated renderer.
    Platforms,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    topic: String,
    /// Target as `platform:format`; repeat for several.
    #[arg(long = "platform", required = true)]
    platforms: Vec<String>,
    #[arg(long)]
    audience: Option<String>,
    #[arg(long)]
    tone: Option<String>,
    #[arg(long)]
    locale: Option<String>,
    #[arg(long)]
    primary_url: Option<String>,
    #[arg(long)]
    no_images: bool,
    #[arg(long)]
    force: bool,
    /// Return right after submitting instead of waiting for results.
    #[arg(long)]
    no_wait: bool,
    /// Give up waiting after this many seconds; 0 waits indefinitely.
    #[arg(long, default_value_t = 0)]
    wait_secs: u64,
}

#[derive(Debug, Parser)]
struct StatusArgs {
    #[arg(long)]
    job: String,
}

#[derive(Debug, Parser)]
struct ResultsArgs {
    #[arg(long)]
    topic: String,
    /// `all` or `platform:format`.
    #[arg(long, default_value = "all")]
    filter: TypeFilter,
    /// Print raw normalized content instead of rendered fields.
    #[arg(long)]
    json: bool,
}

const WAIT_SLICE: Duration = Duration::from_millis(500);
const PREVIEW_MAX_CHARS: usize = 160;

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("postforge-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = std::env::var("POSTFORGE_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let mut config = EngineConfig::from_env();
    if let Some(api_base) = cli.api_base {
        config.api_base = api_base.trim_end_matches('/').to_string();
    }
    if let Some(events) = cli.events {
        config.events_path = Some(events);
    }
    debug!(api_base = %config.api_base, "loaded config");
    let backend: Arc<dyn GenerationBackend> = Arc::new(HttpBackend::new(&config)?);

    match cli.command {
        Command::Topics => run_topics(backend.as_ref()),
        Command::Generate(args) => run_generate(backend, &config, args),
        Command::Status(args) => run_status(backend.as_ref(), args),
        Command::Results(args) => run_results(backend, &config, args),
        Command::Platforms => run_platforms(backend, &config),
    }
}

fn run_topics(backend: &dyn GenerationBackend) -> Result<i32> {
    let topics = backend.list_topics().context("failed to list topics")?;
    if topics.is_empty() {
        println!("no topics");
        return Ok(0);
    }
    for topic in topics {
        let level = topic
            .complexity_level
            .as_deref()
            .or(topic.difficulty.as_deref())
            .unwrap_or("-");
        println!("{:>6}  {:<12} {}", topic.id, level, topic.title);
    }
    Ok(0)
}

fn run_generate(
    backend: Arc<dyn GenerationBackend>,
    config: &EngineConfig,
    args: GenerateArgs,
) -> Result<i32> {
    let mut orchestrator = Orchestrator::new(backend, config);
    let topic = orchestrator.topic(&args.topic)?;

    let mut options = orchestrator.request_options().clone();
    options.audience = args.audience;
    options.tone = args.tone;
    options.locale = args.locale;
    options.primary_url = args.primary_url;
    options.generation.include_images = !args.no_images;
    options.generation.force = args.force;

    let handle = match orchestrator.generate_with(Some(&topic), &args.platforms, &options) {
        Ok(handle) => handle,
        Err(err) => {
            print_notices(orchestrator.drain_notices());
            return Err(err.into());
        }
    };
    println!("submitted job {} for topic {}", handle.job_id, handle.topic_id);
    if args.no_wait {
        orchestrator.shutdown();
        return Ok(0);
    }

    let deadline =
        (args.wait_secs > 0).then(|| Instant::now() + Duration::from_secs(args.wait_secs));
    loop {
        let settled = orchestrator.wait_idle(WAIT_SLICE);
        print_notices(orchestrator.drain_notices());
        if settled {
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            println!("stopped waiting; job {} is still running", handle.job_id);
            orchestrator.shutdown();
            return Ok(2);
        }
    }

    let failed = orchestrator
        .jobs()
        .into_iter()
        .find(|job| job.job_id == handle.job_id);
    if let Some(job) = failed {
        info!(job_id = %job.job_id, status = %job.status, "job left unfinished");
        return Ok(if job.status == JobStatus::Error { 3 } else { 4 });
    }

    print_results(
        &orchestrator,
        &orchestrator
            .store()
            .filter_for_topic(&handle.topic_id, &TypeFilter::All),
        false,
    );
    Ok(0)
}

fn run_status(backend: &dyn GenerationBackend, args: StatusArgs) -> Result<i32> {
    let report = backend.job_status(&args.job)?;
    print!("{} {}", report.job_id, report.status);
    if let Some(progress) = report.progress {
        print!(" ({}/{})", progress.done, progress.total);
    }
    println!();
    for error in &report.errors {
        println!("  error: {error}");
    }
    Ok(0)
}

fn run_results(
    backend: Arc<dyn GenerationBackend>,
    config: &EngineConfig,
    args: ResultsArgs,
) -> Result<i32> {
    let mut orchestrator = Orchestrator::new(backend, config);
    orchestrator.seed_topic(&args.topic)?;

    let counts = orchestrator.store().count_by_type(&args.topic);
    let summary = counts
        .iter()
        .map(|(key, count)| format!("{key}={count}"))
        .collect::<Vec<_>>()
        .join(" ");
    if summary.is_empty() {
        println!("topic {}: no results", args.topic);
    } else {
        println!("topic {}: {summary}", args.topic);
    }

    let results = orchestrator
        .store()
        .filter_for_topic(&args.topic, &args.filter);
    print_results(&orchestrator, &results, args.json);
    Ok(0)
}

fn run_platforms(backend: Arc<dyn GenerationBackend>, config: &EngineConfig) -> Result<i32> {
    let orchestrator = Orchestrator::new(backend, config);
    for spec in orchestrator.registry().pairs() {
        println!("{:<24} {:<22} {}", spec.target, spec.key, spec.label);
    }
    Ok(0)
}

fn print_results(orchestrator: &Orchestrator, results: &[&JobResult], raw: bool) {
    for result in results {
        println!("== {} (job {})", result.type_key(), result.job_id);
        if raw {
            println!(
                "{}",
                serde_json::to_string_pretty(result.content()).unwrap_or_default()
            );
            continue;
        }
        match orchestrator.display(result) {
            DisplayContract::Registered { key, label } => {
                println!("   [{key}] {label}");
                for line in preview_lines(result.content()) {
                    println!("   {line}");
                }
            }
            DisplayContract::Generic { fields } => {
                for field in fields {
                    println!("   {}: {}", field.label, preview(&field.text));
                }
            }
        }
    }
}

fn preview_lines(content: &Value) -> Vec<String> {
    let Some(obj) = content.as_object() else {
        return vec![preview(&content.to_string())];
    };
    obj.iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(text) => text.clone(),
                Value::Null => return None,
                other => other.to_string(),
            };
            Some(format!("{key}: {}", preview(&text)))
        })
        .collect()
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_MAX_CHARS {
        return flat;
    }
    let mut out = flat.chars().take(PREVIEW_MAX_CHARS).collect::<String>();
    out.push_str("...");
    out
}

fn print_notices(notices: Vec<Notice>) {
    for notice in notices {
        let level = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        let message = if notice.repeats > 0 {
            format!("{} (x{})", notice.message, notice.repeats + 1)
        } else {
            notice.message
        };
        match notice.job_id {
            Some(job_id) => eprintln!("[{level}] {job_id}: {message}"),
            None => eprintln!("[{level}] {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use postforge_contracts::platforms::TypeFilter;
    use serde_json::json;

    use super::{preview, preview_lines, Cli, Command, PREVIEW_MAX_CHARS};

    #[test]
    fn generate_collects_repeated_platforms() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "postforge-rs",
            "generate",
            "--topic",
            "42",
            "--platform",
            "instagram:reel",
            "--platform",
            "medium:article",
            "--no-wait",
        ])?;
        match cli.command {
            Command::Generate(args) => {
                assert_eq!(args.topic, "42");
                assert_eq!(args.platforms, vec!["instagram:reel", "medium:article"]);
                assert!(args.no_wait);
                assert_eq!(args.wait_secs, 0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn global_overrides_follow_the_subcommand() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "postforge-rs",
            "platforms",
            "--api-base",
            "https://gen.example.com/api",
            "--events",
            "/tmp/events.jsonl",
        ])?;
        assert_eq!(cli.api_base.as_deref(), Some("https://gen.example.com/api"));
        assert_eq!(
            cli.events.as_deref(),
            Some(std::path::Path::new("/tmp/events.jsonl"))
        );
        assert!(matches!(cli.command, Command::Platforms));
        Ok(())
    }

    #[test]
    fn generate_requires_a_platform() {
        let parsed = Cli::try_parse_from(["postforge-rs", "generate", "--topic", "42"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn results_filter_parses_pairs_and_all() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "postforge-rs",
            "results",
            "--topic",
            "7",
            "--filter",
            "Medium:Article",
        ])?;
        match cli.command {
            Command::Results(args) => {
                assert_eq!(args.filter, TypeFilter::only("medium", "article"));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["postforge-rs", "results", "--topic", "7"])?;
        match cli.command {
            Command::Results(args) => assert_eq!(args.filter, TypeFilter::All),
            other => panic!("unexpected command: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\n  b\tc"), "a b c");
        let long = "x".repeat(PREVIEW_MAX_CHARS + 10);
        assert!(preview(&long).ends_with("..."));
    }

    #[test]
    fn preview_lines_skip_nulls() {
        let mut lines = preview_lines(&json!({"title": "Hi", "body": null, "tags": ["a"]}));
        lines.sort();
        assert_eq!(lines, vec!["tags: [\"a\"]".to_string(), "title: Hi".to_string()]);
    }
}
