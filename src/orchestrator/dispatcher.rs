//! Two-wave task dispatcher.
//!
//! Wave one runs every kind that only needs the job's files. Wave two runs
//! the kinds that consume wave-one outcomes. Each kind is one spawned unit
//! with its own timeout and panic boundary; each wave ends at a
//! [`CompletionBarrier`]. Both waves share one global deadline.

use super::barrier::{CompletionBarrier, OutcomeStore, RecordError, Settled};
use crate::agents::{AnalysisError, AnalysisInput, Analyzer, AnalyzerSet, PriorFindings};
use crate::models::{FailureReason, OutcomeKey, ReviewJob, SourceFile, TaskKind, TaskOutcome};
use futures::{FutureExt, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-kind task timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTimeouts {
    pub security: Duration,
    pub quality: Duration,
    pub coverage: Duration,
    pub ai_review: Duration,
    pub documentation: Duration,
}

impl Default for TaskTimeouts {
    fn default() -> Self {
        Self {
            security: Duration::from_secs(30),
            quality: Duration::from_secs(60),
            coverage: Duration::from_secs(60),
            ai_review: Duration::from_secs(180),
            documentation: Duration::from_secs(30),
        }
    }
}

impl TaskTimeouts {
    pub fn for_kind(&self, kind: TaskKind) -> Duration {
        match kind {
            TaskKind::Security => self.security,
            TaskKind::Quality => self.quality,
            TaskKind::Coverage => self.coverage,
            TaskKind::AiReview => self.ai_review,
            TaskKind::Documentation => self.documentation,
        }
    }
}

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Files analyzed concurrently within one kind.
    pub concurrency: usize,
    pub timeouts: TaskTimeouts,
    /// Deadline for both waves together, measured from dispatch.
    pub global_timeout: Duration,
    pub show_progress: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeouts: TaskTimeouts::default(),
            global_timeout: Duration::from_secs(300),
            show_progress: false,
        }
    }
}

/// What the dispatcher ran and how every key settled.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub dispatched: Vec<TaskKind>,
    pub settled: Settled,
}

/// Launches analysis units and collects exactly one outcome per key.
pub struct Dispatcher {
    analyzers: AnalyzerSet,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(analyzers: AnalyzerSet, settings: DispatchSettings) -> Self {
        Self {
            analyzers,
            settings,
        }
    }

    /// Run both waves for a job.
    pub async fn run(&self, job: Arc<ReviewJob>) -> DispatchReport {
        let deadline = Instant::now() + self.settings.global_timeout;
        let progress = self.progress_bar((job.files().len() * TaskKind::ALL.len()) as u64);

        info!(
            "Dispatching {} task kind(s) over {} file(s) for {}",
            TaskKind::ALL.len(),
            job.files().len(),
            job.id()
        );

        let mut settled = self
            .run_wave(&job, &TaskKind::FIRST_WAVE, None, deadline, &progress)
            .await;

        let prior = Arc::new(PriorFindings::new(settled.outcomes.clone()));
        let second = self
            .run_wave(&job, &[TaskKind::AiReview], Some(prior), deadline, &progress)
            .await;
        settled.merge(second);

        progress.finish_and_clear();

        DispatchReport {
            dispatched: TaskKind::ALL.to_vec(),
            settled,
        }
    }

    async fn run_wave(
        &self,
        job: &Arc<ReviewJob>,
        kinds: &[TaskKind],
        prior: Option<Arc<PriorFindings>>,
        deadline: Instant,
        progress: &ProgressBar,
    ) -> Settled {
        let keys = kinds.iter().flat_map(|&kind| {
            job.files()
                .iter()
                .map(move |file| OutcomeKey::new(kind, &file.path))
        });
        let store = OutcomeStore::new(keys);
        let barrier = CompletionBarrier::new(Arc::clone(&store));

        let mut units = JoinSet::new();
        for &kind in kinds {
            let Some(analyzer) = self.analyzers.get(kind) else {
                warn!("No analyzer registered for {}", kind);
                settle_pending(
                    &store,
                    kind,
                    FailureReason::Error,
                    "no analyzer registered",
                    progress,
                );
                continue;
            };

            debug!("Spawning {} unit", kind);
            units.spawn(run_unit(UnitContext {
                kind,
                analyzer,
                job: Arc::clone(job),
                prior: prior.clone(),
                store: Arc::clone(&store),
                timeout: self.settings.timeouts.for_kind(kind),
                concurrency: self.settings.concurrency.max(1),
                progress: progress.clone(),
            }));
        }

        let settled = barrier.wait(deadline).await;
        units.abort_all();

        if !settled.forced.is_empty() {
            warn!(
                "{} task(s) still running at the global deadline were marked as timed out",
                settled.forced.len()
            );
            progress.inc(settled.forced.len() as u64);
        }

        settled
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} analyses")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }
}

/// Everything one spawned unit owns.
struct UnitContext {
    kind: TaskKind,
    analyzer: Arc<dyn Analyzer>,
    job: Arc<ReviewJob>,
    prior: Option<Arc<PriorFindings>>,
    store: Arc<OutcomeStore>,
    timeout: Duration,
    concurrency: usize,
    progress: ProgressBar,
}

async fn run_unit(ctx: UnitContext) {
    let work = analyze_files(&ctx);
    match tokio::time::timeout(ctx.timeout, AssertUnwindSafe(work).catch_unwind()).await {
        Ok(Ok(())) => debug!("{} unit finished", ctx.kind),
        Ok(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            warn!("{} unit panicked: {}", ctx.kind, message);
            settle_pending(
                &ctx.store,
                ctx.kind,
                FailureReason::Panic,
                &message,
                &ctx.progress,
            );
        }
        Err(_) => {
            warn!(
                "{} unit exceeded its {}s timeout",
                ctx.kind,
                ctx.timeout.as_secs_f64()
            );
            let detail = format!(
                "{} did not finish within {:.0}s",
                ctx.kind,
                ctx.timeout.as_secs_f64()
            );
            settle_pending(
                &ctx.store,
                ctx.kind,
                FailureReason::Timeout,
                &detail,
                &ctx.progress,
            );
        }
    }
}

async fn analyze_files(ctx: &UnitContext) {
    let kind = ctx.kind;
    let prior = if kind.needs_prior_results() {
        ctx.prior.clone()
    } else {
        None
    };

    let mut results = std::pin::pin!(futures::stream::iter(0..ctx.job.files().len())
        .map(|index| {
            let analyzer = Arc::clone(&ctx.analyzer);
            let job = Arc::clone(&ctx.job);
            let prior = prior.clone();
            async move {
                let file = &job.files()[index];
                let outcome = analyze_one(kind, analyzer.as_ref(), file, prior.as_deref()).await;
                (index, outcome)
            }
        })
        .buffer_unordered(ctx.concurrency));

    while let Some((index, outcome)) = results.next().await {
        let key = OutcomeKey::new(kind, &ctx.job.files()[index].path);
        record(&ctx.store, key, outcome, &ctx.progress);
    }
}

/// Run one analyzer call and classify the result.
async fn analyze_one(
    kind: TaskKind,
    analyzer: &dyn Analyzer,
    file: &SourceFile,
    prior: Option<&PriorFindings>,
) -> TaskOutcome {
    let input = AnalysisInput { file, prior };
    match AssertUnwindSafe(analyzer.analyze(&input))
        .catch_unwind()
        .await
    {
        Ok(Ok(payload)) if payload.kind() != kind => TaskOutcome::failure(
            FailureReason::Malformed,
            format!("{} analyzer returned a {} payload", kind, payload.kind()),
        ),
        Ok(Ok(payload)) => match payload.validate() {
            Ok(()) => TaskOutcome::Success(payload),
            Err(detail) => TaskOutcome::failure(FailureReason::Malformed, detail),
        },
        Ok(Err(err)) => {
            debug!("{} failed for {}: {}", kind, file.path, err);
            TaskOutcome::failure(failure_reason(&err), err.to_string())
        }
        Err(panic) => TaskOutcome::failure(FailureReason::Panic, panic_message(panic.as_ref())),
    }
}

fn failure_reason(err: &AnalysisError) -> FailureReason {
    match err {
        AnalysisError::Malformed(_) => FailureReason::Malformed,
        AnalysisError::Panicked(_) => FailureReason::Panic,
        AnalysisError::Unavailable(_) | AnalysisError::Failed(_) => FailureReason::Error,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "analyzer panicked".to_string()
    }
}

fn record(store: &OutcomeStore, key: OutcomeKey, outcome: TaskOutcome, progress: &ProgressBar) {
    match store.record(key, outcome) {
        Ok(()) => progress.inc(1),
        Err(e @ RecordError::Unexpected(_)) => warn!("{}", e),
        Err(e) => debug!("{}", e),
    }
}

/// Record `reason` for every key of `kind` that has no outcome yet.
fn settle_pending(
    store: &OutcomeStore,
    kind: TaskKind,
    reason: FailureReason,
    detail: &str,
    progress: &ProgressBar,
) {
    for key in store.pending_for(kind) {
        record(store, key, TaskOutcome::failure(reason, detail), progress);
    }
}
