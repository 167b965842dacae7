use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};

use crate::executor::{Executor, SessionProvider};
use crate::model::{
    CaseSource, CaseStatus, ExecutionResult, RunCounters, RunReport, TestCase,
};
use crate::planner::{GenerationCapability, Planner};
use crate::ranker;

/// Run configuration, read once per run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Upper bound on generated candidate cases.
    pub max_cases: usize,
    /// Maximum number of ranked cases actually executed; `None` executes
    /// all of them.
    pub execution_budget: Option<usize>,
    /// Size of the execution worker pool.
    pub concurrency: usize,
    /// Run-level deadline for the execution phase.
    pub run_timeout: Duration,
    /// On deadline expiry, clamp in-flight executions to the remaining time
    /// instead of letting them finish.
    pub force_terminate: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_cases: 10,
            execution_budget: None,
            concurrency: 3,
            run_timeout: Duration::from_secs(300),
            force_terminate: false,
        }
    }
}

/// The only fatal failure of a run. Everything else degrades into the
/// report instead.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("execution capability unavailable: {0:#}")]
    ExecutionUnavailable(anyhow::Error),
}

/// Drives the pipeline: plan once, rank once, execute the selected cases
/// with bounded concurrency, assemble the report.
pub struct Orchestrator<G> {
    planner: Planner<G>,
    provider: Arc<dyn SessionProvider>,
    config: RunConfig,
}

impl<G: GenerationCapability> Orchestrator<G> {
    #[must_use]
    pub fn new(planner: Planner<G>, provider: Arc<dyn SessionProvider>, config: RunConfig) -> Self {
        Self {
            planner,
            provider,
            config,
        }
    }

    /// Run the full pipeline for one game description.
    ///
    /// Always yields a report unless the execution capability cannot be
    /// initialized at all; degraded modes (generation fallback, per-case
    /// errors, deadline expiry) are flagged on the report instead.
    pub async fn run(&self, description: &str) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        let run_id = format!("run-{}", started_at.format("%Y%m%dT%H%M%S"));
        log::info!("{run_id}: planning up to {} cases", self.config.max_cases);

        let candidates = self
            .planner
            .generate(description, self.config.max_cases)
            .await;
        let generated = candidates.len();

        log::info!("{run_id}: ranking {generated} candidates");
        let mut cases = ranker::rank(candidates);
        for case in &mut cases {
            case.advance(CaseStatus::Ranked);
        }

        let budget = self.config.execution_budget.unwrap_or(cases.len());
        let selected: Vec<TestCase> = cases.iter().take(budget).cloned().collect();
        log::info!(
            "{run_id}: executing top {} of {} ranked cases",
            selected.len(),
            cases.len()
        );

        self.provider
            .probe()
            .await
            .map_err(RunError::ExecutionUnavailable)?;

        let (mut by_id, degraded_by_schedule) = self.execute_phase(&run_id, selected).await;

        let mut counters = RunCounters {
            generated,
            ranked: cases.len(),
            ..RunCounters::default()
        };
        let mut results = Vec::new();
        for case in &mut cases {
            let Some(result) = by_id.remove(&case.id) else {
                // Not executed (outside budget or deadline): stays ranked.
                continue;
            };
            case.advance(CaseStatus::Executing);
            case.advance(result.outcome.as_status());
            counters.executed += 1;
            match result.outcome {
                crate::model::CaseOutcome::Passed => counters.passed += 1,
                crate::model::CaseOutcome::Failed => counters.failed += 1,
                crate::model::CaseOutcome::Error => counters.errored += 1,
            }
            results.push(result);
        }

        let generation_fallback_used = cases
            .iter()
            .any(|case| case.source == CaseSource::FallbackTemplate);
        let execution_degraded = degraded_by_schedule || counters.errored > 0;

        log::info!(
            "{run_id}: {} passed, {} failed, {} errored of {} executed",
            counters.passed,
            counters.failed,
            counters.errored,
            counters.executed
        );

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            cases,
            results,
            counters,
            generation_fallback_used,
            execution_degraded,
        })
    }

    /// Fan the selected cases out over the worker pool.
    ///
    /// Returns the results keyed by case id plus a flag set when the
    /// deadline cut scheduling short or a worker was lost. No task starts
    /// after the deadline; in-flight tasks finish unless `force_terminate`.
    async fn execute_phase(
        &self,
        run_id: &str,
        selected: Vec<TestCase>,
    ) -> (HashMap<String, ExecutionResult>, bool) {
        let deadline = Instant::now() + self.config.run_timeout;
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut workers: JoinSet<(String, Option<ExecutionResult>)> = JoinSet::new();

        for case in selected {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let force_terminate = self.config.force_terminate;
            workers.spawn(async move {
                // timeout_at polls the acquire first, so an already-expired
                // deadline needs its own check.
                if Instant::now() >= deadline {
                    return (case.id, None);
                }
                let permit = match time::timeout_at(deadline, semaphore.acquire_owned()).await {
                    Ok(Ok(permit)) => permit,
                    // Deadline passed while queued, or pool shut down.
                    Ok(Err(_)) | Err(_) => return (case.id, None),
                };
                let _permit = permit;

                let mut case = case;
                case.advance(CaseStatus::Executing);
                let executor = Executor::new(provider.as_ref());
                if force_terminate {
                    match time::timeout_at(deadline, executor.execute(&case)).await {
                        Ok(result) => (case.id, Some(result)),
                        Err(_) => (case.id, None),
                    }
                } else {
                    let result = executor.execute(&case).await;
                    (case.id, Some(result))
                }
            });
        }

        let mut by_id: HashMap<String, ExecutionResult> = HashMap::new();
        let mut degraded = false;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((case_id, Some(result))) => {
                    // Append-only: a duplicate insertion would be a pipeline
                    // bug; the first result wins.
                    if by_id.contains_key(&case_id) {
                        log::error!("{run_id}: duplicate result for {case_id} discarded");
                    } else {
                        by_id.insert(case_id, result);
                    }
                }
                Ok((case_id, None)) => {
                    log::warn!("{run_id}: deadline expired before {case_id} completed");
                    degraded = true;
                }
                Err(e) => {
                    log::error!("{run_id}: execution worker lost: {e}");
                    degraded = true;
                }
            }
        }
        (by_id, degraded)
    }
}
