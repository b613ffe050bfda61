//! The validation/correction engine.
//!
//! Runs a [`RuleSet`] over one document until a pass makes no change. Each
//! pass evaluates the rules in dependency order: correcting rules apply
//! their fixes immediately so that later rules see them, validating rules
//! report breaches. Only the violations of the last pass survive; earlier
//! passes judged a document that has since changed.
//!
//! A remedy the store rejects becomes a FATAL violation of the proposing
//! rule; the engine itself never fails.

use crate::core::config::ProcessingConfig;
use crate::core::error::BelegError;
use crate::core::report::{Correction, CorrectionKind, Severity, Violation};
use crate::core::rules::{Breach, Remedy, RuleContext, RuleKind, RuleSet, ValidationRule};
use crate::core::store::{InvoiceDocument, Provenance};
use crate::core::value::BtValue;

/// Rule id reported when the fixpoint is not reached within the bound.
pub const CONVERGENCE_RULE: &str = "ENGINE-CONVERGENCE";

/// Result of running the engine over one document.
#[derive(Debug, Clone, Default)]
pub struct EngineRun {
    /// Every correction applied, in application order.
    pub corrections: Vec<Correction>,
    /// Violations found by the final pass.
    pub violations: Vec<Violation>,
    pub passes: usize,
    pub converged: bool,
}

/// Engine bound to one processing configuration.
pub struct Engine<'a> {
    rules: &'a RuleSet,
    ctx: RuleContext<'a>,
    max_iterations: usize,
}

impl<'a> Engine<'a> {
    pub fn new(config: &'a ProcessingConfig) -> Self {
        Self {
            rules: config.rules(),
            ctx: config.rule_context(),
            max_iterations: config.settings().max_iterations,
        }
    }

    /// Correct and validate `doc` in place.
    pub fn run(&self, doc: &mut InvoiceDocument) -> EngineRun {
        let mut run = EngineRun::default();

        while run.passes < self.max_iterations {
            run.passes += 1;
            let mut violations = Vec::new();
            let mut mutated = false;

            for rule in self.rules.rules() {
                match rule.kind {
                    RuleKind::Correcting(correct) => {
                        for remedy in correct(doc, &self.ctx) {
                            match remedy {
                                Remedy::Refuse(breach) => violations.push(to_violation(rule, breach)),
                                remedy => {
                                    let target = remedy.target();
                                    match self.apply(doc, rule, remedy, &mut run.corrections) {
                                        Ok(changed) => mutated |= changed,
                                        Err(err) => {
                                            tracing::warn!(rule = rule.id, error = %err, "remedy rejected by the store");
                                            violations.push(Violation::fatal(rule.id, target, err.to_string()));
                                        }
                                    }
                                }
                            }
                        }
                    }
                    RuleKind::Validating(validate) => {
                        violations.extend(
                            validate(doc, &self.ctx)
                                .into_iter()
                                .map(|breach| to_violation(rule, breach)),
                        );
                    }
                }
            }

            run.violations = violations;
            if !mutated {
                run.converged = true;
                break;
            }
        }

        if !run.converged {
            tracing::warn!(passes = run.passes, "engine did not reach a fixpoint");
            run.violations.push(Violation::fatal(
                CONVERGENCE_RULE,
                "",
                format!(
                    "corrections still changed the document after {} passes",
                    run.passes
                ),
            ));
        }
        tracing::debug!(
            passes = run.passes,
            corrections = run.corrections.len(),
            violations = run.violations.len(),
            "engine finished"
        );
        run
    }

    /// Apply one remedy. Returns whether the document changed.
    fn apply(
        &self,
        doc: &mut InvoiceDocument,
        rule: &ValidationRule,
        remedy: Remedy,
        corrections: &mut Vec<Correction>,
    ) -> Result<bool, BelegError> {
        let registry = self.ctx.registry;
        match remedy {
            Remedy::Set {
                group,
                bt,
                value,
                rationale,
            } => {
                let group = match group {
                    Some(group) => group,
                    None => {
                        let owner = registry
                            .term(bt)
                            .map(|spec| spec.group.clone())
                            .ok_or_else(|| BelegError::Store(format!("{bt} is not in the registry")))?;
                        doc.ensure_singular(registry, &owner)?
                    }
                };
                if doc.value(group, bt) == Some(&value) {
                    return Ok(false);
                }
                let previous = doc.rewrite(registry, group, bt, value.clone(), rule.id)?;
                let kind = match &previous {
                    None => CorrectionKind::Derived,
                    Some(term) if self.ctx.is_low_confidence(term.confidence) => {
                        CorrectionKind::LowConfidence
                    }
                    Some(_) => CorrectionKind::RuleBreach,
                };
                record(
                    corrections,
                    rule,
                    bt,
                    doc.term_path(group, bt),
                    previous.map(|t| t.value),
                    value,
                    rationale,
                    kind,
                );
                Ok(true)
            }
            Remedy::Normalize {
                group,
                bt,
                value,
                rationale,
            } => {
                if doc.value(group, bt) == Some(&value) {
                    return Ok(false);
                }
                let previous = doc.rewrite(registry, group, bt, value.clone(), rule.id)?;
                let kind = if previous.is_some() {
                    CorrectionKind::Normalized
                } else {
                    CorrectionKind::Derived
                };
                record(
                    corrections,
                    rule,
                    bt,
                    doc.term_path(group, bt),
                    previous.map(|t| t.value),
                    value,
                    rationale,
                    kind,
                );
                Ok(true)
            }
            Remedy::AddGroup {
                parent,
                group,
                terms,
                rationale,
            } => {
                let id = doc.push_group(registry, parent, group)?;
                for (bt, value) in terms {
                    doc.insert(
                        registry,
                        id,
                        bt,
                        value.clone(),
                        Provenance {
                            written_by: Some(rule.id.to_string()),
                            ..Provenance::default()
                        },
                    )?;
                    record(
                        corrections,
                        rule,
                        bt,
                        doc.term_path(id, bt),
                        None,
                        value,
                        rationale.clone(),
                        CorrectionKind::Derived,
                    );
                }
                Ok(true)
            }
            Remedy::Refuse(_) => Ok(false),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn record(
    corrections: &mut Vec<Correction>,
    rule: &ValidationRule,
    bt: &str,
    path: String,
    value_before: Option<BtValue>,
    value_after: BtValue,
    rationale: String,
    kind: CorrectionKind,
) {
    let severity = kind.severity();
    match severity {
        Severity::Warning => tracing::debug!(rule = rule.id, %path, ?kind, "correction"),
        _ => tracing::info!(rule = rule.id, %path, ?kind, "correction"),
    }
    corrections.push(Correction {
        rule_id: rule.id.to_string(),
        bt: bt.to_string(),
        path,
        value_before,
        value_after,
        rationale,
        severity,
        kind,
    });
}

fn to_violation(rule: &ValidationRule, breach: Breach) -> Violation {
    Violation::new(
        breach.rule_id.unwrap_or_else(|| rule.id.to_string()),
        breach.severity.unwrap_or(rule.severity),
        breach.path,
        breach.message,
    )
}
