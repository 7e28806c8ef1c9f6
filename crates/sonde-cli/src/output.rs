//! Output formatting and reporting

use colored::*;
use serde::Serialize;
use sonde_core::{SequenceOutcome, SequenceResult, StepStatus};

use crate::OutputFormat;

/// Totals across every sequence of a run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub sequences: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub aborted: bool,
}

impl RunSummary {
    pub fn from_results(results: &[SequenceResult]) -> Self {
        let mut summary = Self {
            sequences: results.len(),
            ..Default::default()
        };
        for result in results {
            match result.outcome {
                SequenceOutcome::Pass => summary.passed += 1,
                SequenceOutcome::Fail => summary.failed += 1,
                SequenceOutcome::Skip => summary.skipped += 1,
            }
            summary.aborted |= result.aborted;
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    server: &'a str,
    summary: &'a RunSummary,
    results: &'a [SequenceResult],
}

/// Output formatter for different formats
pub struct OutputFormatter {
    format: OutputFormat,
    use_colors: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, use_colors: bool) -> Self {
        Self { format, use_colors }
    }

    /// Print the results of a run to stdout
    pub fn print_results(
        &self,
        server: &str,
        results: &[SequenceResult],
        summary: &RunSummary,
    ) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Human => {
                print!("{}", self.render_human(server, results, summary));
                Ok(())
            }
            OutputFormat::Json => {
                let report = JsonReport {
                    server,
                    summary,
                    results,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(())
            }
        }
    }

    fn render_human(&self, server: &str, results: &[SequenceResult], summary: &RunSummary) -> String {
        let mut out = String::new();
        out.push_str(&format!("{} {server}\n\n", self.bold("Server:")));

        for result in results {
            out.push_str(&format!(
                "{} {} {}\n",
                self.outcome_badge(result.outcome),
                self.bold(&result.resource_type),
                self.dim(&format!("({})", result.profile))
            ));

            for step in &result.steps {
                out.push_str(&format!(
                    "  {} {:<28} {} {}\n",
                    self.status_badge(step.result.status),
                    step.id,
                    step.name,
                    self.dim(&format!("{}ms", step.duration_ms))
                ));
                if !step.result.message.is_empty() {
                    out.push_str(&format!("      {}\n", step.result.message));
                }
            }

            for warning in &result.warnings {
                out.push_str(&format!("  {} {warning}\n", self.warning("warning:")));
            }
            if result.aborted {
                out.push_str(&format!("  {}\n", self.warning("aborted before completion")));
            }
            out.push('\n');
        }

        let line = format!(
            "{} sequence(s): {} passed, {} failed, {} skipped",
            summary.sequences, summary.passed, summary.failed, summary.skipped
        );
        if summary.has_failures() {
            out.push_str(&format!("{}\n", self.error(&line)));
        } else {
            out.push_str(&format!("{}\n", self.success(&line)));
        }
        out
    }

    fn status_badge(&self, status: StepStatus) -> String {
        let label = format!("{:<7}", status.as_str().to_uppercase());
        if !self.use_colors {
            return label;
        }
        match status {
            StepStatus::Pass => label.green().to_string(),
            StepStatus::Fail => label.red().bold().to_string(),
            StepStatus::Skip => label.dimmed().to_string(),
            StepStatus::Warning => label.yellow().to_string(),
            StepStatus::Error => label.magenta().bold().to_string(),
        }
    }

    fn outcome_badge(&self, outcome: SequenceOutcome) -> String {
        let label = match outcome {
            SequenceOutcome::Pass => "PASS",
            SequenceOutcome::Fail => "FAIL",
            SequenceOutcome::Skip => "SKIP",
        };
        if !self.use_colors {
            return label.to_string();
        }
        match outcome {
            SequenceOutcome::Pass => label.green().bold().to_string(),
            SequenceOutcome::Fail => label.red().bold().to_string(),
            SequenceOutcome::Skip => label.dimmed().bold().to_string(),
        }
    }

    fn bold(&self, text: &str) -> String {
        if self.use_colors {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.use_colors {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }

    fn warning(&self, text: &str) -> String {
        if self.use_colors {
            text.yellow().to_string()
        } else {
            text.to_string()
        }
    }

    fn error(&self, text: &str) -> String {
        if self.use_colors {
            text.red().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn success(&self, text: &str) -> String {
        if self.use_colors {
            text.green().to_string()
        } else {
            text.to_string()
        }
    }
}
