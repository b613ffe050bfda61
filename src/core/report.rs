use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::ProcessingState;
use super::value::BtValue;

/// Severity of a finding. Ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// The document cannot become compliant without human input.
    Fatal,
    /// A business rule is broken; blocks serialization.
    Error,
    /// Informational; never blocks serialization.
    Warning,
}

impl Severity {
    /// Whether an unresolved finding of this severity blocks serialization.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Fatal | Self::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
        })
    }
}

/// An unresolved rule breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// EN 16931 rule id (e.g. "BR-CO-15") or an internal id such as
    /// "MAP-COERCE".
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    /// Store path of the offending element (e.g. "BG-25[2]/BT-131"); empty
    /// for findings about the whole invoice.
    pub path: String,
}

impl Violation {
    pub fn new(
        rule_id: impl Into<String>,
        severity: Severity,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn fatal(rule_id: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(rule_id, Severity::Fatal, path, message)
    }

    pub fn error(rule_id: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(rule_id, Severity::Error, path, message)
    }

    pub fn warning(rule_id: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(rule_id, Severity::Warning, path, message)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}] {}", self.severity, self.rule_id, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.rule_id, self.path, self.message
            )
        }
    }
}

/// Why a correction was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    /// The value was absent and has been derived.
    Derived,
    /// A present value broke a rule and was deterministically fixed.
    RuleBreach,
    /// A value with low extraction confidence was overruled.
    LowConfidence,
    /// A present value was rewritten into canonical form; its meaning is
    /// unchanged.
    Normalized,
}

impl CorrectionKind {
    pub fn severity(&self) -> Severity {
        match self {
            Self::RuleBreach => Severity::Error,
            Self::Derived | Self::LowConfidence | Self::Normalized => Severity::Warning,
        }
    }
}

/// An applied fix. Never modified once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub rule_id: String,
    pub bt: String,
    pub path: String,
    pub value_before: Option<BtValue>,
    pub value_after: BtValue,
    pub rationale: String,
    pub severity: Severity,
    pub kind: CorrectionKind,
}

impl fmt::Display for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value_before {
            Some(before) => write!(
                f,
                "[{}] {}: {} -> {} ({})",
                self.rule_id, self.path, before, self.value_after, self.rationale
            ),
            None => write!(
                f,
                "[{}] {}: set to {} ({})",
                self.rule_id, self.path, self.value_after, self.rationale
            ),
        }
    }
}

/// Audit trail of one processed document: every applied correction, the
/// violations still unresolved, and where processing ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionsReport {
    /// Invoice number (BT-1) if one was mapped; used for log correlation.
    pub document_id: Option<String>,
    pub state: ProcessingState,
    pub corrections: Vec<Correction>,
    pub violations: Vec<Violation>,
    /// Engine passes run until the fixpoint (or the bound).
    pub passes: usize,
}

impl Default for CorrectionsReport {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrectionsReport {
    pub fn new() -> Self {
        Self {
            document_id: None,
            state: ProcessingState::Mapped,
            corrections: Vec::new(),
            violations: Vec::new(),
            passes: 0,
        }
    }

    /// Add violations, skipping any already reported for the same rule and
    /// path.
    pub fn add_violations(&mut self, violations: impl IntoIterator<Item = Violation>) {
        let mut seen: BTreeSet<(String, String)> = self
            .violations
            .iter()
            .map(|v| (v.rule_id.clone(), v.path.clone()))
            .collect();
        for violation in violations {
            if seen.insert((violation.rule_id.clone(), violation.path.clone())) {
                self.violations.push(violation);
            }
        }
    }

    /// Violations that block serialization.
    pub fn blocking(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.severity.is_blocking())
    }

    pub fn has_blocking(&self) -> bool {
        self.blocking().next().is_some()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }

    /// Corrections applied to one term path.
    pub fn corrections_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Correction> + 'a {
        self.corrections.iter().filter(move |c| c.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_findings_are_reported_once() {
        let mut report = CorrectionsReport::new();
        report.add_violations([Violation::error("BR-CL-04", "BT-5", "EURO is not a currency")]);
        report.add_violations([
            Violation::error("BR-CL-04", "BT-5", "EURO is not an ISO 4217 code"),
            Violation::fatal("BR-02", "BT-1", "missing"),
        ]);
        assert_eq!(report.violations.len(), 2);
        assert_eq!(report.count(Severity::Error), 1);
        assert_eq!(report.count(Severity::Fatal), 1);
    }

    #[test]
    fn warnings_do_not_block() {
        let mut report = CorrectionsReport::new();
        report.add_violations([Violation::warning("W-1", "", "note")]);
        assert!(!report.has_blocking());
        report.add_violations([Violation::error("BR-27", "BG-25[1]/BT-146", "negative")]);
        assert!(report.has_blocking());
    }

    #[test]
    fn violation_display() {
        let v = Violation::fatal("BR-CO-15", "BG-22/BT-112", "total mismatch");
        assert_eq!(v.to_string(), "FATAL [BR-CO-15] BG-22/BT-112: total mismatch");
        let v = Violation::fatal("ENGINE-CONVERGENCE", "", "no fixpoint");
        assert_eq!(v.to_string(), "FATAL [ENGINE-CONVERGENCE] no fixpoint");
    }

    #[test]
    fn severity_orders_fatal_first() {
        assert!(Severity::Fatal < Severity::Error);
        assert!(Severity::Error < Severity::Warning);
    }
}
