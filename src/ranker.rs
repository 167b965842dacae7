use std::collections::HashSet;

use crate::model::{CaseKind, StepAction, TestCase};

/// Weight of the coverage category. Error and edge paths outrank win/lose
/// checks, which outrank plain happy paths.
fn coverage_weight(kind: CaseKind) -> f64 {
    match kind {
        CaseKind::InvalidMove | CaseKind::EdgeCondition => 40.0,
        CaseKind::WinLose => 30.0,
        CaseKind::ValidMove => 10.0,
    }
}

/// Priority score of a single case.
///
/// Deterministic and explainable: coverage weight by kind, plus 5 per
/// distinct `(action, target)` UI interaction, plus 2 per step capped at 10
/// steps so raw length cannot drown out coverage.
#[must_use]
pub fn score_case(case: &TestCase) -> f64 {
    let interactions: HashSet<(&'static str, &str)> = case
        .steps
        .iter()
        .filter(|step| step.action.is_interaction())
        .map(|step| {
            let label = match &step.action {
                StepAction::Click => "click",
                StepAction::TypeText { .. } => "type-text",
                StepAction::PressKey { .. } => "press-key",
                StepAction::Navigate | StepAction::Wait { .. } | StepAction::ReadState => "other",
            };
            (label, step.target.as_str())
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let diversity = interactions.len() as f64 * 5.0;
    #[allow(clippy::cast_precision_loss)]
    let complexity = case.steps.len().min(10) as f64 * 2.0;

    coverage_weight(case.kind) + diversity + complexity
}

/// Assign priority scores and order the candidates by descending priority.
///
/// Pure apart from populating `priority`. The candidate set is preserved
/// exactly; ties keep generation order (stable sort), so repeated calls on
/// the same input produce the same order and scores.
pub fn rank(mut candidates: Vec<TestCase>) -> Vec<TestCase> {
    for case in &mut candidates {
        case.priority = Some(score_case(case));
    }
    candidates.sort_by(|a, b| {
        let (sa, sb) = (a.priority.unwrap_or(0.0), b.priority.unwrap_or(0.0));
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}
