use serde::{Deserialize, Serialize};

use crate::model::{CaseKind, CaseSource, StepAction, TestCase, TestStep};

/// Failure modes of the external generation capability.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Quota exceeded, timeout, or transport failure. Recovered via
    /// fallback templates, never surfaced as a run failure.
    #[error("generation capability unavailable: {0}")]
    Unavailable(String),
    /// The capability answered but the response could not be parsed.
    #[error("malformed generation response: {0}")]
    Malformed(String),
}

/// A scenario as proposed by the generation capability, before it becomes a
/// [`TestCase`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDraft {
    pub title: String,
    pub kind: CaseKind,
    pub steps: Vec<TestStep>,
}

/// Opaque test-scenario generation capability (an LLM endpoint in
/// production, a stub in tests).
#[async_trait::async_trait]
pub trait GenerationCapability: Send + Sync {
    async fn generate(
        &self,
        description: &str,
        max_cases: usize,
    ) -> Result<Vec<ScenarioDraft>, GenerationError>;
}

#[async_trait::async_trait]
impl GenerationCapability for Box<dyn GenerationCapability> {
    async fn generate(
        &self,
        description: &str,
        max_cases: usize,
    ) -> Result<Vec<ScenarioDraft>, GenerationError> {
        (**self).generate(description, max_cases).await
    }
}

/// Turns a game description into a bounded, non-empty list of candidate
/// test cases.
///
/// The planner never returns an empty list: when the generation capability
/// is unavailable or returns unusable output, the pre-authored template set
/// takes over and the cases are tagged `fallback-template`.
pub struct Planner<G> {
    capability: G,
    templates: Vec<ScenarioDraft>,
}

impl<G: GenerationCapability> Planner<G> {
    #[must_use]
    pub fn new(capability: G) -> Self {
        Self {
            capability,
            templates: default_templates(),
        }
    }

    /// Replace the built-in fallback template set.
    #[must_use]
    pub fn with_templates(mut self, templates: Vec<ScenarioDraft>) -> Self {
        if templates.is_empty() {
            log::warn!("ignoring empty fallback template set");
        } else {
            self.templates = templates;
        }
        self
    }

    /// Generate at most `max_cases` candidates for `description`.
    pub async fn generate(&self, description: &str, max_cases: usize) -> Vec<TestCase> {
        let max_cases = max_cases.max(1);
        let drafts = match self.capability.generate(description, max_cases).await {
            Ok(drafts) => drafts,
            Err(err) => {
                log::warn!("generation failed, using fallback templates: {err}");
                return fallback_cases(&self.templates, max_cases);
            }
        };

        let cases = materialize(drafts, max_cases);
        if cases.is_empty() {
            log::warn!("generation returned no usable scenarios, using fallback templates");
            return fallback_cases(&self.templates, max_cases);
        }
        log::info!("planner generated {} candidate cases", cases.len());
        cases
    }
}

/// Validate drafts and turn them into planned cases with stable ids.
fn materialize(drafts: Vec<ScenarioDraft>, max_cases: usize) -> Vec<TestCase> {
    drafts
        .into_iter()
        .filter(|draft| {
            if draft.steps.is_empty() {
                log::warn!("dropping generated scenario with no steps: {}", draft.title);
                false
            } else {
                true
            }
        })
        .take(max_cases)
        .enumerate()
        .map(|(i, draft)| {
            TestCase::new(
                format!("case-{:03}", i + 1),
                draft.title,
                draft.kind,
                draft.steps,
                CaseSource::Generated,
            )
        })
        .collect()
}

/// Build fallback cases from the template set, cycling and renumbering to
/// fill `max_cases`.
fn fallback_cases(templates: &[ScenarioDraft], max_cases: usize) -> Vec<TestCase> {
    (0..max_cases)
        .map(|i| {
            let template = &templates[i % templates.len()];
            let title = if i < templates.len() {
                template.title.clone()
            } else {
                format!("{} #{}", template.title, i / templates.len() + 1)
            };
            TestCase::new(
                format!("template-{:03}", i + 1),
                title,
                template.kind,
                template.steps.clone(),
                CaseSource::FallbackTemplate,
            )
        })
        .collect()
}

fn nav_step() -> TestStep {
    TestStep {
        action: StepAction::Navigate,
        target: "/".to_string(),
        expected: String::new(),
        fatal: true,
    }
}

/// The built-in template set. Covers the four coverage categories the
/// planner asks the generation capability for: a valid-move path, an
/// invalid-move rejection, an edge-of-board condition, and a win condition.
#[must_use]
pub fn default_templates() -> Vec<ScenarioDraft> {
    vec![
        ScenarioDraft {
            title: "Board loads and accepts a valid move".to_string(),
            kind: CaseKind::ValidMove,
            steps: vec![
                nav_step(),
                TestStep {
                    action: StepAction::Click,
                    target: ".board .cell[data-index='0']".to_string(),
                    expected: "selected".to_string(),
                    fatal: false,
                },
                TestStep {
                    action: StepAction::Click,
                    target: ".board .cell[data-index='1']".to_string(),
                    expected: String::new(),
                    fatal: false,
                },
                TestStep {
                    action: StepAction::ReadState,
                    target: String::new(),
                    expected: "score".to_string(),
                    fatal: false,
                },
            ],
        },
        ScenarioDraft {
            title: "Invalid move is rejected".to_string(),
            kind: CaseKind::InvalidMove,
            steps: vec![
                nav_step(),
                TestStep {
                    action: StepAction::Click,
                    target: ".board .cell[data-index='0']".to_string(),
                    expected: String::new(),
                    fatal: false,
                },
                TestStep {
                    action: StepAction::Click,
                    target: ".board .cell[data-index='0']".to_string(),
                    expected: "invalid".to_string(),
                    fatal: true,
                },
            ],
        },
        ScenarioDraft {
            title: "Last board cell stays in bounds".to_string(),
            kind: CaseKind::EdgeCondition,
            steps: vec![
                nav_step(),
                TestStep {
                    action: StepAction::Click,
                    target: ".board .cell:last-child".to_string(),
                    expected: String::new(),
                    fatal: false,
                },
                TestStep {
                    action: StepAction::ReadState,
                    target: String::new(),
                    expected: "board".to_string(),
                    fatal: false,
                },
            ],
        },
        ScenarioDraft {
            title: "Clearing the board ends the game".to_string(),
            kind: CaseKind::WinLose,
            steps: vec![
                nav_step(),
                TestStep {
                    action: StepAction::Click,
                    target: "button[data-action='autosolve'], button.hint".to_string(),
                    expected: String::new(),
                    fatal: false,
                },
                TestStep {
                    action: StepAction::Wait { millis: 500 },
                    target: String::new(),
                    expected: String::new(),
                    fatal: false,
                },
                TestStep {
                    action: StepAction::ReadState,
                    target: String::new(),
                    expected: String::new(),
                    fatal: false,
                },
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CaseStatus;

    struct StubGeneration {
        response: fn() -> Result<Vec<ScenarioDraft>, GenerationError>,
    }

    #[async_trait::async_trait]
    impl GenerationCapability for StubGeneration {
        async fn generate(
            &self,
            _description: &str,
            _max_cases: usize,
        ) -> Result<Vec<ScenarioDraft>, GenerationError> {
            (self.response)()
        }
    }

    fn draft(title: &str, kind: CaseKind, steps: usize) -> ScenarioDraft {
        ScenarioDraft {
            title: title.to_string(),
            kind,
            steps: (0..steps)
                .map(|_| TestStep {
                    action: StepAction::Click,
                    target: ".cell".to_string(),
                    expected: String::new(),
                    fatal: false,
                })
                .collect(),
        }
    }

    fn planner(response: fn() -> Result<Vec<ScenarioDraft>, GenerationError>) -> Planner<StubGeneration> {
        Planner::new(StubGeneration { response })
    }

    #[test]
    fn generated_cases_are_tagged_and_bounded() {
        let planner = planner(|| {
            Ok(vec![
                draft("a", CaseKind::ValidMove, 2),
                draft("b", CaseKind::InvalidMove, 3),
                draft("c", CaseKind::WinLose, 1),
            ])
        });
        let cases = tokio_test::block_on(planner.generate("3x3 puzzle", 2));
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].id, "case-001");
        assert_eq!(cases[1].id, "case-002");
        assert!(cases.iter().all(|c| c.source == CaseSource::Generated));
        assert!(cases.iter().all(|c| c.status == CaseStatus::Planned));
    }

    #[test]
    fn unavailable_capability_falls_back_to_templates() {
        let planner = planner(|| Err(GenerationError::Unavailable("quota".to_string())));
        let cases = tokio_test::block_on(planner.generate("3x3 puzzle", 6));
        assert_eq!(cases.len(), 6);
        assert!(
            cases
                .iter()
                .all(|c| c.source == CaseSource::FallbackTemplate)
        );
        assert!(cases.iter().all(|c| !c.steps.is_empty()));
    }

    #[test]
    fn malformed_response_falls_back_to_templates() {
        let planner = planner(|| Err(GenerationError::Malformed("not json".to_string())));
        let cases = tokio_test::block_on(planner.generate("3x3 puzzle", 3));
        assert_eq!(cases.len(), 3);
        assert!(
            cases
                .iter()
                .all(|c| c.source == CaseSource::FallbackTemplate)
        );
    }

    #[test]
    fn empty_and_stepless_drafts_fall_back() {
        let planner = planner(|| Ok(vec![draft("empty", CaseKind::ValidMove, 0)]));
        let cases = tokio_test::block_on(planner.generate("3x3 puzzle", 4));
        assert!(!cases.is_empty());
        assert!(
            cases
                .iter()
                .all(|c| c.source == CaseSource::FallbackTemplate)
        );
    }

    #[test]
    fn stepless_drafts_are_dropped_but_rest_survive() {
        let planner = planner(|| {
            Ok(vec![
                draft("empty", CaseKind::ValidMove, 0),
                draft("real", CaseKind::EdgeCondition, 2),
            ])
        });
        let cases = tokio_test::block_on(planner.generate("3x3 puzzle", 5));
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].title, "real");
        assert_eq!(cases[0].source, CaseSource::Generated);
    }

    #[test]
    fn zero_max_cases_is_clamped_to_one() {
        let planner = planner(|| Ok(vec![draft("a", CaseKind::ValidMove, 1)]));
        let cases = tokio_test::block_on(planner.generate("3x3 puzzle", 0));
        assert_eq!(cases.len(), 1);
    }

    #[test]
    fn fallback_cycles_templates_with_numbered_titles() {
        let templates = vec![
            draft("one", CaseKind::ValidMove, 1),
            draft("two", CaseKind::InvalidMove, 1),
        ];
        let cases = fallback_cases(&templates, 5);
        assert_eq!(cases.len(), 5);
        assert_eq!(cases[0].title, "one");
        assert_eq!(cases[1].title, "two");
        assert_eq!(cases[2].title, "one #2");
        assert_eq!(cases[4].title, "one #3");
        assert_eq!(cases[4].id, "template-005");
    }

    #[test]
    fn default_templates_cover_all_kinds() {
        let templates = default_templates();
        for kind in [
            CaseKind::ValidMove,
            CaseKind::InvalidMove,
            CaseKind::EdgeCondition,
            CaseKind::WinLose,
        ] {
            assert!(
                templates.iter().any(|t| t.kind == kind),
                "missing template for {kind:?}"
            );
        }
        assert!(templates.iter().all(|t| !t.steps.is_empty()));
    }

    #[test]
    fn with_templates_rejects_empty_set() {
        let planner = planner(|| Err(GenerationError::Unavailable("down".to_string())))
            .with_templates(Vec::new());
        let cases = tokio_test::block_on(planner.generate("3x3 puzzle", 2));
        assert_eq!(cases.len(), 2);
    }
}
