//! Shared types for the processing cycle.

use std::fmt;

use serde::Serialize;

use crate::config::MarkReadPolicy;

// ── Per-message outcome ─────────────────────────────────────────────

/// What happened to one message during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOutcome {
    /// Gated in and the form actor reached the page.
    Participated,
    /// Gated in but the form actor returned false.
    ParticipationFailed,
    /// Gated out; no side effect.
    Skipped,
    /// Classification or action failed for this message.
    Failed,
}

impl MessageOutcome {
    /// Short label for logging.
    pub fn label(self) -> &'static str {
        match self {
            Self::Participated => "participated",
            Self::ParticipationFailed => "participation_failed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Passed the gate, regardless of how the action went.
    pub fn is_acted(self) -> bool {
        matches!(self, Self::Participated | Self::ParticipationFailed)
    }

    pub fn should_mark_read(self, policy: MarkReadPolicy) -> bool {
        match policy {
            MarkReadPolicy::Never => false,
            MarkReadPolicy::Processed => self != Self::Failed,
            MarkReadPolicy::Acted => self == Self::Participated,
        }
    }
}

/// Outcome of a single message, in fetch order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageReport {
    pub id: String,
    pub subject: String,
    pub outcome: MessageOutcome,
    /// Classifier confidence, when classification completed.
    pub confidence: Option<f64>,
}

// ── Cycle outcome ───────────────────────────────────────────────────

/// Summary of one cycle. Logged, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub fetched: usize,
    /// Messages that passed the gate.
    pub acted: usize,
    /// Subset of `acted` where the action succeeded.
    pub participated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub marked_read: usize,
    pub reports: Vec<MessageReport>,
}

impl CycleOutcome {
    pub fn record(&mut self, report: MessageReport) {
        match report.outcome {
            MessageOutcome::Participated => {
                self.acted += 1;
                self.participated += 1;
            }
            MessageOutcome::ParticipationFailed => self.acted += 1,
            MessageOutcome::Skipped => self.skipped += 1,
            MessageOutcome::Failed => self.failed += 1,
        }
        self.reports.push(report);
    }

    /// Plain-text body for the cycle report email.
    pub fn report_text(&self) -> String {
        let mut text = format!("{self}\n\n");
        for report in self.reports.iter().filter(|r| r.outcome.is_acted()) {
            let confidence = report
                .confidence
                .map(|c| format!("{c:.3}"))
                .unwrap_or_else(|| "-".to_string());
            text.push_str(&format!(
                "[{}] {} (confidence {confidence})\n",
                report.outcome.label(),
                report.subject
            ));
        }
        text
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} acted={} participated={} skipped={} failed={} marked_read={}",
            self.fetched, self.acted, self.participated, self.skipped, self.failed, self.marked_read
        )
    }
}
