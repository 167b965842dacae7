use anyhow::Result;
use colored::Colorize;
use std::io::Write;

use crate::model::{CaseOutcome, CaseStatus, ExecutionResult, RunReport, StepStatus};

pub fn render_json(out: &mut dyn Write, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    writeln!(out, "{json}")?;
    Ok(())
}

pub fn render_console(out: &mut dyn Write, report: &RunReport) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Test Run Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "===================".cyan())?;
    writeln!(out, "Run: {}", report.run_id)?;
    writeln!(
        out,
        "Cases: {} generated, {} ranked, {} executed",
        report.counters.generated, report.counters.ranked, report.counters.executed
    )?;
    writeln!(out, "Passed: {}", report.counters.passed.to_string().green())?;
    writeln!(out, "Failed: {}", report.counters.failed.to_string().red())?;
    writeln!(
        out,
        "Errored: {}",
        report.counters.errored.to_string().yellow()
    )?;
    if report.generation_fallback_used {
        writeln!(
            out,
            "{}",
            "⚠️  Generation unavailable - fallback templates used".yellow()
        )?;
    }
    if report.execution_degraded {
        writeln!(
            out,
            "{}",
            "⚠️  Execution degraded - see per-case errors".yellow()
        )?;
    }
    writeln!(out)?;

    for case in &report.cases {
        let status = match case.status {
            CaseStatus::Passed => "✅ PASS ".green(),
            CaseStatus::Failed => "❌ FAIL ".red(),
            CaseStatus::Error => "💥 ERROR".yellow(),
            _ => "⏭  SKIP ".normal(),
        };
        let priority = case
            .priority
            .map_or_else(|| "-".to_string(), |p| format!("{p:.0}"));
        writeln!(
            out,
            "{status} [{priority:>3}] {} ({:?})",
            case.title.bold(),
            case.kind
        )?;

        if let Some(result) = report.results.iter().find(|r| r.case_id == case.id) {
            render_result_lines(out, result)?;
        }
    }

    render_performance_footer(out, &report.results)?;
    Ok(())
}

fn render_result_lines(out: &mut dyn Write, result: &ExecutionResult) -> Result<()> {
    writeln!(out, "   Duration: {:?}", result.duration)?;
    if let Some(error) = &result.error {
        writeln!(out, "   Error: {}", error.red())?;
    }
    for step in &result.steps {
        if step.status == StepStatus::Passed {
            continue;
        }
        let marker = match step.status {
            StepStatus::Mismatch => "≠".red(),
            StepStatus::Faulted => "!".yellow(),
            _ => "·".normal(),
        };
        let observed = step.observed.as_deref().unwrap_or("-");
        writeln!(
            out,
            "   {marker} step {}: {:?} observed: {}",
            step.index,
            step.status,
            summary_of(observed)
        )?;
        if let Some(artifact) = &step.artifact {
            writeln!(out, "     artifact: {artifact}")?;
        }
    }
    Ok(())
}

fn render_performance_footer(out: &mut dyn Write, results: &[ExecutionResult]) -> Result<()> {
    let (Some(fastest), Some(slowest)) = (
        results.iter().min_by_key(|r| r.duration),
        results.iter().max_by_key(|r| r.duration),
    ) else {
        return Ok(());
    };
    writeln!(out)?;
    writeln!(out, "{}", "⚡ Performance".bright_yellow().bold())?;
    writeln!(out, "{}", "=============".yellow())?;
    writeln!(
        out,
        "Fastest: {} ({:?})",
        fastest.case_id.green(),
        fastest.duration
    )?;
    writeln!(
        out,
        "Slowest: {} ({:?})",
        slowest.case_id.yellow(),
        slowest.duration
    )?;
    Ok(())
}

pub fn render_markdown(out: &mut dyn Write, report: &RunReport) -> Result<()> {
    writeln!(out, "# Playtest Run {}\n", report.run_id)?;
    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Started**: {}", report.started_at.to_rfc3339())?;
    writeln!(out, "- **Finished**: {}", report.finished_at.to_rfc3339())?;
    writeln!(out, "- **Generated**: {}", report.counters.generated)?;
    writeln!(out, "- **Ranked**: {}", report.counters.ranked)?;
    writeln!(out, "- **Executed**: {}", report.counters.executed)?;
    writeln!(out, "- **Passed**: {}", report.counters.passed)?;
    writeln!(out, "- **Failed**: {}", report.counters.failed)?;
    writeln!(out, "- **Errored**: {}", report.counters.errored)?;
    writeln!(
        out,
        "- **Generation fallback used**: {}",
        report.generation_fallback_used
    )?;
    writeln!(
        out,
        "- **Execution degraded**: {}\n",
        report.execution_degraded
    )?;

    writeln!(out, "## Cases\n")?;
    for case in &report.cases {
        let badge = match case.status {
            CaseStatus::Passed => "✅",
            CaseStatus::Failed => "❌",
            CaseStatus::Error => "💥",
            _ => "⏭",
        };
        writeln!(out, "### {badge} {} ({})\n", case.title, case.id)?;
        writeln!(out, "- **Kind**: {:?}", case.kind)?;
        writeln!(out, "- **Source**: {:?}", case.source)?;
        writeln!(out, "- **Status**: {:?}", case.status)?;
        if let Some(priority) = case.priority {
            writeln!(out, "- **Priority**: {priority:.1}")?;
        }
        if let Some(result) = report.results.iter().find(|r| r.case_id == case.id) {
            writeln!(out, "- **Outcome**: {:?}", result.outcome)?;
            writeln!(out, "- **Duration**: {:?}", result.duration)?;
            if let Some(error) = &result.error {
                writeln!(out, "- **Error**: {error}")?;
            }
            writeln!(out, "- **Steps**:")?;
            for step in &result.steps {
                let observed = step
                    .observed
                    .as_deref()
                    .map(summary_of)
                    .unwrap_or_default();
                writeln!(out, "  - step {}: {:?} {}", step.index, step.status, observed)?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

/// First line of an observation, shortened for human-facing output.
fn summary_of(observed: &str) -> String {
    let first_line = observed.lines().next().unwrap_or_default();
    let mut summary: String = first_line.chars().take(80).collect();
    if summary.len() < first_line.len() {
        summary.push('…');
    }
    summary
}

/// True when the run found defects or hit infrastructure errors; drives the
/// process exit code.
#[must_use]
pub fn has_findings(report: &RunReport) -> bool {
    report
        .results
        .iter()
        .any(|r| matches!(r.outcome, CaseOutcome::Failed | CaseOutcome::Error))
}
