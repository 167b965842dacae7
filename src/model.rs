use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a test case came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseSource {
    Generated,
    FallbackTemplate,
}

/// Coverage category of a test case. Error and edge paths rank higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseKind {
    ValidMove,
    InvalidMove,
    EdgeCondition,
    WinLose,
}

/// Lifecycle of a test case through the pipeline.
///
/// `planned → ranked → executing → {passed|failed|error}`. Transitions never
/// skip a state and never regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Planned,
    Ranked,
    Executing,
    Passed,
    Failed,
    Error,
}

impl CaseStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Error)
    }

    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Planned, Self::Ranked) | (Self::Ranked, Self::Executing) => true,
            (Self::Executing, n) => n.is_terminal(),
            _ => false,
        }
    }
}

/// One UI action the executor can perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "action")]
pub enum StepAction {
    /// Load a page; the step target is a URL, resolved against the base URL
    /// when relative.
    Navigate,
    /// Click the element matching the step target (CSS selector).
    Click,
    /// Type text into the element matching the step target.
    TypeText { text: String },
    /// Send a key to the element matching the step target.
    PressKey { key: String },
    /// Pause without touching the page.
    Wait { millis: u64 },
    /// Observe the current page state without acting on it.
    ReadState,
}

impl StepAction {
    /// Whether the action touches a concrete UI element. Used by the ranker
    /// to count interaction diversity.
    #[must_use]
    pub fn is_interaction(&self) -> bool {
        matches!(
            self,
            Self::Click | Self::TypeText { .. } | Self::PressKey { .. }
        )
    }
}

/// One step of a test case: act on `target`, then check that the observed
/// outcome contains `expected` (empty string means no expectation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStep {
    #[serde(flatten)]
    pub action: StepAction,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub expected: String,
    /// A mismatch on a fatal step stops the case early.
    #[serde(default)]
    pub fatal: bool,
}

/// The shared entity flowing through every pipeline stage.
///
/// The step sequence is immutable after creation; `priority` is set once by
/// the ranker and `status` only moves forward (see [`CaseStatus`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub title: String,
    pub kind: CaseKind,
    pub steps: Vec<TestStep>,
    pub priority: Option<f64>,
    pub source: CaseSource,
    pub status: CaseStatus,
}

impl TestCase {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        kind: CaseKind,
        steps: Vec<TestStep>,
        source: CaseSource,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            steps,
            priority: None,
            source,
            status: CaseStatus::Planned,
        }
    }

    /// Advance the lifecycle state. Illegal transitions are a pipeline bug;
    /// they are logged and ignored rather than corrupting the state machine.
    pub fn advance(&mut self, next: CaseStatus) {
        if self.status.can_advance_to(next) {
            self.status = next;
        } else {
            log::error!(
                "ignoring illegal case transition {:?} -> {:?} for {}",
                self.status,
                next,
                self.id
            );
        }
    }
}

/// Outcome of executing one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseOutcome {
    Passed,
    /// The game misbehaved: an expected outcome did not hold. A finding,
    /// not a system error.
    Failed,
    /// Infrastructure fault while driving the session.
    Error,
}

impl CaseOutcome {
    #[must_use]
    pub fn as_status(self) -> CaseStatus {
        match self {
            Self::Passed => CaseStatus::Passed,
            Self::Failed => CaseStatus::Failed,
            Self::Error => CaseStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    /// Observed outcome contradicted the expectation.
    Mismatch,
    /// Not executed because the case stopped early.
    Skipped,
    /// The session faulted while performing this step.
    Faulted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub index: usize,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<String>,
    /// Reference (path) to a captured visual artifact, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl StepOutcome {
    #[must_use]
    pub fn skipped(index: usize) -> Self {
        Self {
            index,
            status: StepStatus::Skipped,
            observed: None,
            artifact: None,
        }
    }
}

/// Immutable record of one test-case execution. Created exactly once per
/// executed case, matched back to the case by `case_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub case_id: String,
    pub outcome: CaseOutcome,
    pub steps: Vec<StepOutcome>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub generated: usize,
    pub ranked: usize,
    pub executed: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

/// The final, immutable document of a run. Cases appear in rank order with
/// their final status; results appear in rank order for executed cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cases: Vec<TestCase>,
    pub results: Vec<ExecutionResult>,
    pub counters: RunCounters,
    pub generation_fallback_used: bool,
    pub execution_degraded: bool,
}

pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(action: StepAction) -> TestStep {
        TestStep {
            action,
            target: String::new(),
            expected: String::new(),
            fatal: false,
        }
    }

    #[test]
    fn status_advances_in_order_only() {
        assert!(CaseStatus::Planned.can_advance_to(CaseStatus::Ranked));
        assert!(CaseStatus::Ranked.can_advance_to(CaseStatus::Executing));
        assert!(CaseStatus::Executing.can_advance_to(CaseStatus::Passed));
        assert!(CaseStatus::Executing.can_advance_to(CaseStatus::Failed));
        assert!(CaseStatus::Executing.can_advance_to(CaseStatus::Error));
    }

    #[test]
    fn status_never_skips_or_regresses() {
        assert!(!CaseStatus::Planned.can_advance_to(CaseStatus::Executing));
        assert!(!CaseStatus::Planned.can_advance_to(CaseStatus::Passed));
        assert!(!CaseStatus::Ranked.can_advance_to(CaseStatus::Planned));
        assert!(!CaseStatus::Ranked.can_advance_to(CaseStatus::Failed));
        assert!(!CaseStatus::Passed.can_advance_to(CaseStatus::Executing));
        assert!(!CaseStatus::Failed.can_advance_to(CaseStatus::Passed));
    }

    #[test]
    fn terminal_states_are_terminal() {
        for status in [CaseStatus::Passed, CaseStatus::Failed, CaseStatus::Error] {
            assert!(status.is_terminal());
            for next in [
                CaseStatus::Planned,
                CaseStatus::Ranked,
                CaseStatus::Executing,
                CaseStatus::Passed,
            ] {
                assert!(!status.can_advance_to(next));
            }
        }
        assert!(!CaseStatus::Planned.is_terminal());
        assert!(!CaseStatus::Executing.is_terminal());
    }

    #[test]
    fn outcome_maps_to_matching_status() {
        assert_eq!(CaseOutcome::Passed.as_status(), CaseStatus::Passed);
        assert_eq!(CaseOutcome::Failed.as_status(), CaseStatus::Failed);
        assert_eq!(CaseOutcome::Error.as_status(), CaseStatus::Error);
    }

    #[test]
    fn interaction_actions_are_flagged() {
        assert!(step(StepAction::Click).action.is_interaction());
        assert!(
            step(StepAction::TypeText {
                text: "7".to_string()
            })
            .action
            .is_interaction()
        );
        assert!(!step(StepAction::Navigate).action.is_interaction());
        assert!(!step(StepAction::Wait { millis: 100 }).action.is_interaction());
        assert!(!step(StepAction::ReadState).action.is_interaction());
    }

    #[test]
    fn new_case_starts_planned_and_unranked() {
        let case = TestCase::new(
            "case-001",
            "Happy path",
            CaseKind::ValidMove,
            vec![step(StepAction::Navigate)],
            CaseSource::Generated,
        );
        assert_eq!(case.status, CaseStatus::Planned);
        assert!(case.priority.is_none());
    }

    #[test]
    fn duration_round_trips_as_millis() {
        let result = ExecutionResult {
            case_id: "case-001".to_string(),
            outcome: CaseOutcome::Passed,
            steps: vec![StepOutcome::skipped(0)],
            duration: Duration::from_millis(1234),
            error: None,
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["duration"], 1234);
        let back: ExecutionResult = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.duration, Duration::from_millis(1234));
    }

    #[test]
    fn status_names_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(CaseStatus::Ranked).expect("serialize"),
            serde_json::json!("ranked")
        );
        assert_eq!(
            serde_json::to_value(CaseSource::FallbackTemplate).expect("serialize"),
            serde_json::json!("fallback-template")
        );
    }
}
