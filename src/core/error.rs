use thiserror::Error;

use super::report::Violation;

/// Errors raised by the library itself.
///
/// Problems found *in a document* are never reported through this type —
/// they are accumulated as [`Violation`]s in the corrections report. A
/// `BelegError` means the caller or the configuration did something invalid.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BelegError {
    /// Reference data (registry, mapping table, codelists, settings) is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The rule dependency graph contains a cycle. Aborts every document
    /// that would use this rule set.
    #[error("rule set contains a dependency cycle between: {}", rules.join(", "))]
    RuleCycle {
        /// Ids of the rules that could not be ordered.
        rules: Vec<String>,
    },

    /// A store mutation would break a registry invariant (unknown BT,
    /// wrong group, wrong value type).
    #[error("store error: {0}")]
    Store(String),

    /// Raw extraction input could not be interpreted at all.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// XML generation or parsing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// JSON parsing or rendering error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Serialization was requested while blocking violations remain.
    #[error("serialization refused: {} blocking violation(s), first: {}", violations.len(), first_message(violations))]
    SerializationRefused {
        /// The FATAL and ERROR violations that block output.
        violations: Vec<Violation>,
    },

    /// A processing run tried to skip or reverse a state.
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// State the run was in.
        from: String,
        /// State that was requested.
        to: String,
    },
}

fn first_message(violations: &[Violation]) -> String {
    violations
        .first()
        .map(ToString::to_string)
        .unwrap_or_else(|| "none".to_string())
}
