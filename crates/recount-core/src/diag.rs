//! Structured edit log and diagnostics sink.
//!
//! Every rule application in the engine appends an [`EditRecord`] with a
//! source location, the rule name, and a free-form message. The sink is
//! passed explicitly in the pass context instead of living in an ambient
//! static, so tests can capture it and the CLI can serialize it per file.
//!
//! Records also flow to `tracing` at the matching level, so `RUST_LOG`
//! filtering works the usual way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::span::Span;

// ============================================================================
// Record Types
// ============================================================================

/// Severity of a diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagLevel {
    /// Detailed per-rule diagnostics, emitted only in verbose mode.
    Debug,
    /// Normal edit announcements.
    Info,
    /// Recoverable conditions (unresolved bindings, skipped edits).
    Warn,
}

/// One structured diagnostic: an applied edit or a recoverable condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRecord {
    /// Severity.
    pub level: DiagLevel,
    /// Name of the rule or pass that produced the record.
    pub rule: String,
    /// Source location the record refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Span>,
    /// Human-readable description.
    pub message: String,
    /// Timestamp (UTC).
    pub at: DateTime<Utc>,
}

// ============================================================================
// DiagnosticsSink
// ============================================================================

/// Collector for edit records, scoped to one file's pipeline run.
#[derive(Debug, Default)]
pub struct DiagnosticsSink {
    records: Vec<EditRecord>,
    verbose: bool,
}

impl DiagnosticsSink {
    /// Create a sink. When `verbose` is false, `Debug` records are dropped.
    pub fn new(verbose: bool) -> Self {
        DiagnosticsSink {
            records: Vec::new(),
            verbose,
        }
    }

    /// Whether verbose (per-rule debug) logging is enabled.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Append a record and mirror it to tracing.
    pub fn push(
        &mut self,
        level: DiagLevel,
        rule: impl Into<String>,
        location: Option<Span>,
        message: impl Into<String>,
    ) {
        let rule = rule.into();
        let message = message.into();
        let rendered_location = location
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        match level {
            DiagLevel::Debug => {
                debug!(rule = %rule, location = %rendered_location, "{}", message);
                if !self.verbose {
                    return;
                }
            }
            DiagLevel::Info => info!(rule = %rule, location = %rendered_location, "{}", message),
            DiagLevel::Warn => warn!(rule = %rule, location = %rendered_location, "{}", message),
        }
        self.records.push(EditRecord {
            level,
            rule,
            location,
            message,
            at: Utc::now(),
        });
    }

    /// Record an applied edit.
    pub fn edit(&mut self, rule: &str, location: Span, message: impl Into<String>) {
        self.push(DiagLevel::Info, rule, Some(location), message);
    }

    /// Record a recoverable condition.
    pub fn skip(&mut self, rule: &str, location: Option<Span>, message: impl Into<String>) {
        self.push(DiagLevel::Warn, rule, location, message);
    }

    /// Record verbose per-rule detail.
    pub fn detail(&mut self, rule: &str, location: Option<Span>, message: impl Into<String>) {
        self.push(DiagLevel::Debug, rule, location, message);
    }

    /// All collected records, in emission order.
    pub fn records(&self) -> &[EditRecord] {
        &self.records
    }

    /// Number of records at the given level.
    pub fn count(&self, level: DiagLevel) -> usize {
        self.records.iter().filter(|r| r.level == level).count()
    }

    /// Drain the collected records, leaving the sink empty.
    pub fn take_records(&mut self) -> Vec<EditRecord> {
        std::mem::take(&mut self.records)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    fn here() -> Span {
        Span::from_coords("t.src", 2, 1, 2, 10)
    }

    #[test]
    fn edit_records_carry_rule_and_location() {
        let mut sink = DiagnosticsSink::new(false);
        sink.edit("retain-on-pass", here(), "wrapped argument");
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rule, "retain-on-pass");
        assert_eq!(records[0].level, DiagLevel::Info);
        assert_eq!(records[0].location.as_ref().unwrap().start.line, 2);
    }

    #[test]
    fn debug_records_dropped_unless_verbose() {
        let mut sink = DiagnosticsSink::new(false);
        sink.detail("liveness", None, "scanning block");
        assert!(sink.records().is_empty());

        let mut verbose = DiagnosticsSink::new(true);
        verbose.detail("liveness", None, "scanning block");
        assert_eq!(verbose.count(DiagLevel::Debug), 1);
    }

    #[test]
    fn warn_records_always_kept() {
        let mut sink = DiagnosticsSink::new(false);
        sink.skip("binding-index", None, "unresolved reference 'x'");
        assert_eq!(sink.count(DiagLevel::Warn), 1);
    }

    #[test]
    fn take_records_empties_sink() {
        let mut sink = DiagnosticsSink::new(false);
        sink.edit("field-exchange", here(), "guarded release of prior value");
        let drained = sink.take_records();
        assert_eq!(drained.len(), 1);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn records_serialize_to_json() {
        let mut sink = DiagnosticsSink::new(false);
        sink.edit("auto-release", here(), "released unconsumed result");
        let json = serde_json::to_string(&sink.records()[0]).unwrap();
        assert!(json.contains("\"rule\":\"auto-release\""));
        assert!(json.contains("\"level\":\"info\""));
    }
}
