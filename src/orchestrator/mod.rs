//! Orchestration of one review run.
//!
//! [`ReviewPipeline`] strings the stages together: dispatch both waves,
//! aggregate the settled outcomes, decide, then hand the result to every
//! reporter.

pub mod barrier;
pub mod dispatcher;

pub use dispatcher::{DispatchReport, DispatchSettings, Dispatcher, TaskTimeouts};

use crate::analysis::{aggregate, decide, Decision, ReviewRecord};
use crate::models::ReviewJob;
use crate::report::{deliver_all, NotificationAttempt, Reporter};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct ReviewRun {
    pub job: Arc<ReviewJob>,
    pub record: Arc<ReviewRecord>,
    pub decision: Decision,
    pub notifications: Vec<NotificationAttempt>,
    pub duration_seconds: f64,
}

/// Dispatcher plus the reporters a run is delivered to.
pub struct ReviewPipeline {
    dispatcher: Dispatcher,
    reporters: Vec<Arc<dyn Reporter>>,
}

impl ReviewPipeline {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            reporters: Vec::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// Run a job to completion. Never fails once the job exists: task
    /// faults become failed outcomes and reporter faults become failed
    /// notification attempts.
    pub async fn run(&self, job: ReviewJob) -> ReviewRun {
        let start = Instant::now();
        let job = Arc::new(job);

        let report = self.dispatcher.run(Arc::clone(&job)).await;
        let record = Arc::new(aggregate(&job, report));
        let decision = decide(&record, job.thresholds());

        info!(
            "Review {} decided: {} ({} breach(es), {} failed task(s))",
            job.id(),
            decision.verdict(),
            decision.breaches().len(),
            record.failures().len()
        );

        let notifications = deliver_all(&self.reporters, &job, &record, &decision).await;

        ReviewRun {
            job,
            record,
            decision,
            notifications,
            duration_seconds: start.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{canned, AnalyzerSet, Script, ScriptedAnalyzer};
    use crate::analysis::Verdict;
    use crate::models::{JobMetadata, SourceFile, TaskKind, ThresholdConfig};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Reporter for Recording {
        fn channel(&self) -> &str {
            "recording"
        }

        async fn deliver(
            &self,
            job: &ReviewJob,
            _: &ReviewRecord,
            decision: &Decision,
        ) -> anyhow::Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", job.id(), decision.verdict()));
            Ok(())
        }
    }

    fn analyzers(values: [(TaskKind, f64); 5]) -> AnalyzerSet {
        values.into_iter().fold(AnalyzerSet::default(), |set, (kind, value)| {
            set.with(Arc::new(ScriptedAnalyzer::new(
                kind,
                Script::Respond(canned(kind, value)),
            )))
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_delivers_decision_to_reporters() {
        let set = analyzers([
            (TaskKind::Security, 8.5),
            (TaskKind::Quality, 6.5),
            (TaskKind::Coverage, 85.0),
            (TaskKind::AiReview, 0.85),
            (TaskKind::Documentation, 75.0),
        ]);
        let recording = Arc::new(Recording::default());
        let pipeline = ReviewPipeline::new(Dispatcher::new(set, DispatchSettings::default()))
            .with_reporter(recording.clone());

        let job = ReviewJob::new(
            JobMetadata::default(),
            vec![SourceFile::new("app.py", "x = 1\n")],
            ThresholdConfig::default(),
        );
        let run = pipeline.run(job).await;

        assert_eq!(run.decision.verdict(), Verdict::HumanReview);
        assert_eq!(run.decision.breached_dimensions(), vec![TaskKind::Quality]);
        assert_eq!(run.record.outcomes().len(), 5);
        assert_eq!(run.notifications.len(), 1);
        assert!(run.notifications[0].delivered);

        let seen = recording.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), [format!("{}:human_review", run.job.id())]);
    }
}
