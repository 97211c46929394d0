//! ReviewGate - parallel multi-analyzer code review gate
//!
//! Runs independent analyses over a change concurrently, merges their
//! results into one record and decides whether the change can be
//! auto-approved, needs a human reviewer, or must be escalated.
//!
//! Exit codes:
//!   0 - Review completed (any verdict)
//!   1 - Runtime error (bad config, source not found, network, ...)
//!   2 - Verdict other than auto-approve with --strict-exit, or a
//!       failing `demo --self-test` scenario

mod agents;
mod analysis;
mod cli;
mod config;
mod demo;
mod models;
mod orchestrator;
mod report;
mod source;

use agents::{Analyzer, AnalyzerSet, OfflineReviewer, OllamaReviewer};
use analysis::Verdict;
use anyhow::{Context, Result};
use cli::{Args, Command};
use config::{Config, ReportFormat, CONFIG_FILE};
use orchestrator::{Dispatcher, ReviewPipeline, ReviewRun};
use report::{ConsoleReporter, EmailReporter, JsonFileReporter, MarkdownFileReporter};
use source::{FileFilter, WorkItem};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if let Command::InitConfig { force } = args.command {
        return handle_init_config(force);
    }

    init_logging(&args);

    info!("ReviewGate v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args.command);

    match run(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Review failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: write a default .reviewgate.toml.
fn handle_init_config(force: bool) -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() && !force {
        eprintln!(
            "⚠️  {} already exists. Use --force to overwrite it or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize thresholds, timeouts, the AI model and notifications.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG`, when set, takes precedence over the command-line level.
fn init_logging(args: &Args) {
    let builder = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = builder.with_env_filter(EnvFilter::from_default_env()).finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    } else {
        tracing::subscriber::set_global_default(builder.finish())
            .expect("Failed to set tracing subscriber");
    }
}

/// Run the requested command. Returns the process exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;

    if let Command::Demo { self_test: true } = args.command {
        return Ok(handle_self_test().await);
    }

    // Step 1: Resolve the work item
    let item = resolve_work_item(&args, &config).await?;
    println!(
        "📥 {} file(s) to review from {}",
        item.files.len(),
        item.metadata.reference
    );
    let job = item.into_job(config.thresholds.clone());

    // Step 2: Assemble analyzers and reporters
    let offline = config.ai.offline || matches!(args.command, Command::Demo { .. });
    let ai_reviewer: Arc<dyn Analyzer> = if offline {
        println!("🤖 AI review: offline reviewer");
        Arc::new(OfflineReviewer::new())
    } else {
        println!(
            "🤖 AI review: {} at {}",
            config.ai.model, config.ai.ollama_url
        );
        Arc::new(OllamaReviewer::new(config.ai_settings())?)
    };

    let dispatcher = Dispatcher::new(
        AnalyzerSet::builtin(ai_reviewer),
        config.dispatch_settings(!args.quiet),
    );
    let pipeline = build_pipeline(dispatcher, &config);

    // Step 3: Dispatch, aggregate, decide, report
    println!("\n🔬 Running analyses...");
    let run = pipeline.run(job).await;
    print_outcome(&run);

    if config.general.strict_exit && run.decision.verdict() != Verdict::AutoApprove {
        eprintln!(
            "\n⛔ Verdict is {}. Failing (exit code 2).",
            run.decision.verdict().label()
        );
        return Ok(2);
    }

    Ok(0)
}

fn build_pipeline(dispatcher: Dispatcher, config: &Config) -> ReviewPipeline {
    let output = config.output_path();
    let mut pipeline = ReviewPipeline::new(dispatcher).with_reporter(match config.report.format {
        ReportFormat::Markdown => Arc::new(MarkdownFileReporter::new(output)),
        ReportFormat::Json => Arc::new(JsonFileReporter::new(output)),
    });

    if config.report.console {
        pipeline = pipeline.with_reporter(Arc::new(ConsoleReporter));
    }
    if let Some(ref email) = config.email {
        pipeline = pipeline.with_reporter(Arc::new(EmailReporter::new(email.clone())));
    }

    pipeline
}

/// Fetch the files named by the subcommand.
async fn resolve_work_item(args: &Args, config: &Config) -> Result<WorkItem> {
    let filter = FileFilter::from(&config.scanner);

    let item = match &args.command {
        Command::Pr { repo, number } => {
            if config.github.token.is_none() {
                warn!("No GitHub token set; unauthenticated requests are heavily rate limited");
            }
            let client = source::github::GitHubClient::new(
                &config.github.api_url,
                config.github.token.clone(),
                config.github.timeout_seconds,
            )?;
            source::github::fetch_pull_request(&client, repo, *number, &filter)
                .await
                .with_context(|| format!("Failed to fetch pull request #{} of {}", number, repo))?
        }
        Command::Files { paths } => {
            source::local::collect(paths, &filter).context("Failed to collect local files")?
        }
        Command::Branch { repo, base, head } => {
            let range = source::git::BranchRange {
                base: base.clone(),
                head: head.clone(),
            };
            let spec = repo.clone();
            let show_progress = !args.quiet;
            // git2 is blocking.
            tokio::task::spawn_blocking(move || {
                source::git::resolve(&spec, &range, &filter, show_progress)
            })
            .await
            .context("Repository worker failed")?
            .with_context(|| format!("Failed to diff {}...{} in {}", base, head, repo))?
        }
        Command::Demo { .. } => source::demo_work_item(),
        Command::InitConfig { .. } => unreachable!("init-config is handled before logging starts"),
    };

    Ok(item)
}

/// Print the verdict line, failed notifications and timing.
fn print_outcome(run: &ReviewRun) {
    let verdict = run.decision.verdict();
    println!(
        "\n{} Review {} finished: {}",
        verdict.emoji(),
        run.job.id(),
        verdict.label()
    );

    for attempt in run.notifications.iter().filter(|a| !a.delivered) {
        println!(
            "   ⚠️  {} notification failed: {}",
            attempt.channel,
            attempt.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!("   Duration: {:.1}s", run.duration_seconds);
}

/// Run the built-in scenarios and report each one.
async fn handle_self_test() -> i32 {
    println!("🧪 Running decision self-test...\n");

    let results = demo::run_self_test().await;
    let failed = results.iter().filter(|r| !r.passed()).count();

    for result in &results {
        let (verdict, breaches) = &result.actual;
        let breaches: Vec<&str> = breaches.iter().map(|k| k.as_str()).collect();
        if result.passed() {
            println!("   ✅ {} → {} {:?}", result.name, verdict, breaches);
        } else {
            println!(
                "   ❌ {} → {} {:?} (expected {} {:?})",
                result.name, verdict, breaches, result.expected.0, result.expected.1
            );
        }
    }

    if failed == 0 {
        println!("\n✅ All {} scenarios passed.", results.len());
        0
    } else {
        eprintln!("\n⛔ {} of {} scenarios failed.", failed, results.len());
        2
    }
}

/// Load configuration from `--config`, the working directory or defaults.
fn load_config(args: &Args) -> Result<Config> {
    Config::discover(args.config.as_deref(), std::path::Path::new("."))
}
