use anyhow::Result;
use std::time::Instant;

use crate::model::{CaseOutcome, ExecutionResult, StepOutcome, StepStatus, TestCase, TestStep};

/// One exclusive browser session. `perform` returns the observed outcome of
/// the step as text; expectations are substring matches against it.
#[async_trait::async_trait]
pub trait TestSession: Send {
    async fn perform(&mut self, step: &TestStep) -> Result<String>;

    /// Best-effort capture of a visual artifact; returns a reference to it.
    async fn capture_artifact(&mut self, label: &str) -> Option<String>;

    async fn close(&mut self) -> Result<()>;
}

/// Scoped session acquisition. Each execution owns its session exclusively.
#[async_trait::async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self, case_id: &str) -> Result<Box<dyn TestSession>>;

    /// Cheap availability check used once per run to tell "the capability is
    /// entirely broken" apart from per-case faults.
    async fn probe(&self) -> Result<()> {
        let mut session = self.acquire("probe").await?;
        session.close().await
    }
}

/// Runs a single test case against a session and produces exactly one
/// [`ExecutionResult`].
///
/// Every exit path releases the session, and partial step outcomes survive
/// early termination. Infrastructure faults become an `error` result rather
/// than propagating, so one broken session never aborts the run.
pub struct Executor<'a, P: ?Sized> {
    provider: &'a P,
}

impl<'a, P: SessionProvider + ?Sized> Executor<'a, P> {
    #[must_use]
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    pub async fn execute(&self, case: &TestCase) -> ExecutionResult {
        let start = Instant::now();

        let mut session = match self.provider.acquire(&case.id).await {
            Ok(session) => session,
            Err(e) => {
                log::warn!("could not acquire session for {}: {e:#}", case.id);
                return ExecutionResult {
                    case_id: case.id.clone(),
                    outcome: CaseOutcome::Error,
                    steps: (0..case.steps.len()).map(StepOutcome::skipped).collect(),
                    duration: start.elapsed(),
                    error: Some(format!("session acquisition failed: {e:#}")),
                };
            }
        };

        let (outcome, steps, error) = self.run_steps(case, session.as_mut()).await;

        if let Err(e) = session.close().await {
            log::warn!("session release for {} reported: {e:#}", case.id);
        }

        ExecutionResult {
            case_id: case.id.clone(),
            outcome,
            steps,
            duration: start.elapsed(),
            error,
        }
    }

    async fn run_steps(
        &self,
        case: &TestCase,
        session: &mut dyn TestSession,
    ) -> (CaseOutcome, Vec<StepOutcome>, Option<String>) {
        let mut steps = Vec::with_capacity(case.steps.len());
        let mut mismatched = false;

        for (index, step) in case.steps.iter().enumerate() {
            match session.perform(step).await {
                Ok(observed) => {
                    let matched = step.expected.is_empty() || observed.contains(&step.expected);
                    if matched {
                        steps.push(StepOutcome {
                            index,
                            status: StepStatus::Passed,
                            observed: Some(observed),
                            artifact: None,
                        });
                        continue;
                    }

                    mismatched = true;
                    let artifact = session
                        .capture_artifact(&format!("step-{index}-mismatch"))
                        .await;
                    steps.push(StepOutcome {
                        index,
                        status: StepStatus::Mismatch,
                        observed: Some(observed),
                        artifact,
                    });

                    if step.fatal {
                        skip_rest(&mut steps, index + 1, case.steps.len());
                        return (CaseOutcome::Failed, steps, None);
                    }
                }
                Err(e) => {
                    let artifact = session.capture_artifact(&format!("step-{index}-fault")).await;
                    steps.push(StepOutcome {
                        index,
                        status: StepStatus::Faulted,
                        observed: None,
                        artifact,
                    });
                    skip_rest(&mut steps, index + 1, case.steps.len());
                    return (
                        CaseOutcome::Error,
                        steps,
                        Some(format!("step {index} faulted: {e:#}")),
                    );
                }
            }
        }

        let outcome = if mismatched {
            CaseOutcome::Failed
        } else {
            CaseOutcome::Passed
        };
        (outcome, steps, None)
    }
}

fn skip_rest(steps: &mut Vec<StepOutcome>, from: usize, total: usize) {
    for index in from..total {
        steps.push(StepOutcome::skipped(index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CaseKind, CaseSource, StepAction};
    use anyhow::{anyhow, bail};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Scripted session: each entry is what `perform` yields for that step.
    struct ScriptedSession {
        script: Vec<Result<String>>,
        cursor: usize,
        closed: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl TestSession for ScriptedSession {
        async fn perform(&mut self, _step: &TestStep) -> Result<String> {
            let entry = if self.cursor < self.script.len() {
                std::mem::replace(&mut self.script[self.cursor], Ok(String::new()))
            } else {
                Ok(String::new())
            };
            self.cursor += 1;
            entry
        }

        async fn capture_artifact(&mut self, label: &str) -> Option<String> {
            Some(format!("artifacts/{label}.png"))
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ScriptedProvider {
        script: Vec<(bool, String)>, // (is_error, payload)
        closed: Arc<AtomicBool>,
        acquires: AtomicUsize,
        fail_acquire: bool,
    }

    impl ScriptedProvider {
        fn new(script: Vec<(bool, String)>) -> Self {
            Self {
                script,
                closed: Arc::new(AtomicBool::new(false)),
                acquires: AtomicUsize::new(0),
                fail_acquire: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl SessionProvider for ScriptedProvider {
        async fn acquire(&self, _case_id: &str) -> Result<Box<dyn TestSession>> {
            self.acquires.fetch_add(1, Ordering::SeqCst);
            if self.fail_acquire {
                bail!("driver endpoint refused the connection");
            }
            let script = self
                .script
                .iter()
                .map(|(is_err, payload)| {
                    if *is_err {
                        Err(anyhow!(payload.clone()))
                    } else {
                        Ok(payload.clone())
                    }
                })
                .collect();
            Ok(Box::new(ScriptedSession {
                script,
                cursor: 0,
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    fn ok(payload: &str) -> (bool, String) {
        (false, payload.to_string())
    }

    fn fault(payload: &str) -> (bool, String) {
        (true, payload.to_string())
    }

    fn case(steps: Vec<TestStep>) -> TestCase {
        TestCase::new("case-001", "case", CaseKind::ValidMove, steps, CaseSource::Generated)
    }

    fn expect_step(expected: &str, fatal: bool) -> TestStep {
        TestStep {
            action: StepAction::ReadState,
            target: String::new(),
            expected: expected.to_string(),
            fatal,
        }
    }

    #[test]
    fn all_matching_steps_pass() {
        let provider = ScriptedProvider::new(vec![ok("board ready"), ok("score 10")]);
        let case = case(vec![expect_step("board", false), expect_step("score", false)]);
        let result = tokio_test::block_on(Executor::new(&provider).execute(&case));
        assert_eq!(result.outcome, CaseOutcome::Passed);
        assert_eq!(result.steps.len(), 2);
        assert!(result.steps.iter().all(|s| s.status == StepStatus::Passed));
        assert!(result.error.is_none());
        assert!(provider.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn fatal_mismatch_stops_early_and_skips_the_rest() {
        let provider = ScriptedProvider::new(vec![ok("board"), ok("move accepted"), ok("unused")]);
        let case = case(vec![
            expect_step("board", false),
            expect_step("invalid move rejected", true),
            expect_step("score", false),
        ]);
        let result = tokio_test::block_on(Executor::new(&provider).execute(&case));
        assert_eq!(result.outcome, CaseOutcome::Failed);
        assert_eq!(result.steps.len(), 3);
        assert_eq!(result.steps[0].status, StepStatus::Passed);
        assert_eq!(result.steps[1].status, StepStatus::Mismatch);
        assert!(result.steps[1].artifact.is_some());
        assert_eq!(result.steps[2].status, StepStatus::Skipped);
        assert!(provider.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn non_fatal_mismatch_continues_but_fails_the_case() {
        let provider = ScriptedProvider::new(vec![ok("nothing here"), ok("score 3")]);
        let case = case(vec![expect_step("selected", false), expect_step("score", false)]);
        let result = tokio_test::block_on(Executor::new(&provider).execute(&case));
        assert_eq!(result.outcome, CaseOutcome::Failed);
        assert_eq!(result.steps[0].status, StepStatus::Mismatch);
        assert_eq!(result.steps[1].status, StepStatus::Passed);
    }

    #[test]
    fn session_fault_yields_error_with_partial_steps() {
        let provider =
            ScriptedProvider::new(vec![ok("board"), fault("navigation timeout"), ok("unused")]);
        let case = case(vec![
            expect_step("board", false),
            expect_step("", false),
            expect_step("", false),
        ]);
        let result = tokio_test::block_on(Executor::new(&provider).execute(&case));
        assert_eq!(result.outcome, CaseOutcome::Error);
        assert_eq!(result.steps[0].status, StepStatus::Passed);
        assert_eq!(result.steps[1].status, StepStatus::Faulted);
        assert_eq!(result.steps[2].status, StepStatus::Skipped);
        let detail = result.error.expect("error detail");
        assert!(detail.contains("navigation timeout"));
        assert!(provider.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn acquire_failure_becomes_an_error_result() {
        let mut provider = ScriptedProvider::new(vec![]);
        provider.fail_acquire = true;
        let case = case(vec![expect_step("", false), expect_step("", false)]);
        let result = tokio_test::block_on(Executor::new(&provider).execute(&case));
        assert_eq!(result.outcome, CaseOutcome::Error);
        assert_eq!(result.steps.len(), 2);
        assert!(result.steps.iter().all(|s| s.status == StepStatus::Skipped));
        assert!(
            result
                .error
                .expect("detail")
                .contains("session acquisition failed")
        );
    }

    #[test]
    fn step_outcome_count_never_exceeds_step_count() {
        let provider = ScriptedProvider::new(vec![ok("a"), ok("b")]);
        let case = case(vec![expect_step("", false), expect_step("", false)]);
        let result = tokio_test::block_on(Executor::new(&provider).execute(&case));
        assert_eq!(result.steps.len(), case.steps.len());
    }

    #[test]
    fn default_probe_acquires_and_releases_once() {
        let provider = ScriptedProvider::new(vec![]);
        tokio_test::block_on(provider.probe()).expect("probe succeeds");
        assert_eq!(provider.acquires.load(Ordering::SeqCst), 1);
        assert!(provider.closed.load(Ordering::SeqCst));
    }
}
