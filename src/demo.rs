//! Built-in decision scenarios for `demo --self-test`.
//!
//! Each scenario runs the real dispatcher, aggregator and decision engine
//! over scripted analyzers and compares the verdict and breach list with
//! the expected ones.

use crate::agents::{canned, canned_security, AnalyzerSet, Script, ScriptedAnalyzer};
use crate::analysis::{aggregate, decide, Verdict};
use crate::models::{JobMetadata, ReviewJob, SourceFile, TaskKind, ThresholdConfig};
use crate::orchestrator::{DispatchSettings, Dispatcher, TaskTimeouts};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One scripted run and what it must decide.
struct Scenario {
    name: &'static str,
    scripts: [Script; 5],
    verdict: Verdict,
    breaches: Vec<TaskKind>,
}

/// Result of one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub name: &'static str,
    pub expected: (Verdict, Vec<TaskKind>),
    pub actual: (Verdict, Vec<TaskKind>),
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.expected == self.actual
    }
}

fn respond(kind: TaskKind, value: f64) -> Script {
    Script::Respond(canned(kind, value))
}

/// Scripts in `TaskKind::ALL` order with the given headline values.
fn passing_with(overrides: &[(TaskKind, Script)]) -> [Script; 5] {
    TaskKind::ALL.map(|kind| {
        overrides
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, script)| script.clone())
            .unwrap_or_else(|| match kind {
                TaskKind::Security => respond(kind, 8.5),
                TaskKind::Quality => respond(kind, 7.8),
                TaskKind::Coverage => respond(kind, 85.0),
                TaskKind::AiReview => respond(kind, 0.85),
                TaskKind::Documentation => respond(kind, 75.0),
            })
    })
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "all gates pass",
            scripts: passing_with(&[]),
            verdict: Verdict::AutoApprove,
            breaches: vec![],
        },
        Scenario {
            name: "one HIGH finding overrides a passing score",
            scripts: passing_with(&[(
                TaskKind::Security,
                Script::Respond(canned_security(8.5, 1)),
            )]),
            verdict: Verdict::CriticalEscalation,
            breaches: vec![TaskKind::Security],
        },
        Scenario {
            name: "low quality needs a human",
            scripts: passing_with(&[(TaskKind::Quality, respond(TaskKind::Quality, 6.5))]),
            verdict: Verdict::HumanReview,
            breaches: vec![TaskKind::Quality],
        },
        Scenario {
            name: "coverage timeout fails closed",
            scripts: passing_with(&[(TaskKind::Coverage, Script::Hang)]),
            verdict: Verdict::HumanReview,
            breaches: vec![TaskKind::Coverage],
        },
        Scenario {
            name: "security pre-empts every other breach",
            scripts: passing_with(&[
                (TaskKind::Security, respond(TaskKind::Security, 3.0)),
                (TaskKind::Quality, respond(TaskKind::Quality, 2.0)),
                (TaskKind::Coverage, respond(TaskKind::Coverage, 10.0)),
            ]),
            verdict: Verdict::CriticalEscalation,
            breaches: vec![TaskKind::Security],
        },
        Scenario {
            name: "panicking analyzer is isolated",
            scripts: passing_with(&[(
                TaskKind::Documentation,
                Script::Panic("documentation checker crashed".to_string()),
            )]),
            verdict: Verdict::HumanReview,
            breaches: vec![TaskKind::Documentation],
        },
        Scenario {
            name: "score equal to threshold passes",
            scripts: passing_with(&[
                (TaskKind::Quality, respond(TaskKind::Quality, 7.0)),
                (TaskKind::Coverage, respond(TaskKind::Coverage, 80.0)),
            ]),
            verdict: Verdict::AutoApprove,
            breaches: vec![],
        },
    ]
}

/// Short timeouts so the timeout scenario settles quickly.
fn settings() -> DispatchSettings {
    let second = Duration::from_secs(1);
    DispatchSettings {
        concurrency: 2,
        timeouts: TaskTimeouts {
            security: second,
            quality: second,
            coverage: second,
            ai_review: second,
            documentation: second,
        },
        global_timeout: Duration::from_secs(5),
        show_progress: false,
    }
}

fn job() -> ReviewJob {
    ReviewJob::new(
        JobMetadata {
            reference: "self-test".to_string(),
            ..JobMetadata::default()
        },
        vec![
            SourceFile::new("service.py", "def handle(request):\n    return request\n"),
            SourceFile::new("models.py", "class Order:\n    pass\n"),
        ],
        ThresholdConfig::default(),
    )
}

/// Run every scenario in order.
pub async fn run_self_test() -> Vec<ScenarioResult> {
    let mut results = Vec::new();

    for scenario in scenarios() {
        let analyzers = TaskKind::ALL
            .into_iter()
            .zip(scenario.scripts)
            .fold(AnalyzerSet::default(), |set, (kind, script)| {
                set.with(Arc::new(ScriptedAnalyzer::new(kind, script)))
            });

        let job = Arc::new(job());
        let report = Dispatcher::new(analyzers, settings())
            .run(Arc::clone(&job))
            .await;
        let record = aggregate(&job, report);
        let decision = decide(&record, job.thresholds());
        debug!("Scenario '{}' decided {}", scenario.name, decision.verdict());

        results.push(ScenarioResult {
            name: scenario.name,
            expected: (scenario.verdict, scenario.breaches),
            actual: (decision.verdict(), decision.breached_dimensions()),
        });
    }

    results
}
