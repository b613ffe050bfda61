//! Validation and correction rules.
//!
//! A rule declares the business terms it reads and writes. [`RuleSet::new`]
//! orders rules so that every writer of a term runs before its readers and
//! refuses rule sets whose dependencies form a cycle.

mod calc;
mod checks;
mod derive;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};

use super::codelists::Codelists;
use super::config::Settings;
use super::error::BelegError;
use super::registry::BtRegistry;
use super::report::Severity;
use super::store::{GroupId, InvoiceDocument};
use super::value::BtValue;

/// Read-only context handed to every rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub registry: &'a BtRegistry,
    pub codelists: &'a Codelists,
    pub settings: &'a Settings,
}

impl RuleContext<'_> {
    /// Minor unit digits of the invoice currency (BT-5); 2 when unknown.
    pub fn minor_unit(&self, doc: &InvoiceDocument) -> u32 {
        doc.text(GroupId::ROOT, "BT-5")
            .map(|c| self.codelists.minor_unit(c))
            .unwrap_or(2)
    }

    /// Round an amount half-even to the invoice currency's minor unit.
    pub fn round_amount(&self, doc: &InvoiceDocument, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.minor_unit(doc), RoundingStrategy::MidpointNearestEven)
    }

    /// Whether an extraction confidence counts as low.
    pub fn is_low_confidence(&self, confidence: Option<f64>) -> bool {
        confidence.is_some_and(|c| c < self.settings.low_confidence_threshold)
    }
}

/// A fix proposed by a correcting rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Remedy {
    /// Set `bt` to `value`. `group: None` addresses the singular group that
    /// owns `bt`, which is created if absent.
    Set {
        group: Option<GroupId>,
        bt: &'static str,
        value: BtValue,
        rationale: String,
    },
    /// Append a new group instance carrying `terms`.
    AddGroup {
        parent: GroupId,
        group: &'static str,
        terms: Vec<(&'static str, BtValue)>,
        rationale: String,
    },
    /// Rewrite a present value into canonical form without changing what
    /// it means.
    Normalize {
        group: GroupId,
        bt: &'static str,
        value: BtValue,
        rationale: String,
    },
    /// The rule found a breach it must not fix.
    Refuse(Breach),
}

impl Remedy {
    /// The business term or group a remedy addresses.
    pub fn target(&self) -> &'static str {
        match self {
            Self::Set { bt, .. } | Self::Normalize { bt, .. } => *bt,
            Self::AddGroup { group, .. } => *group,
            Self::Refuse(_) => "",
        }
    }
}

/// A rule breach as reported by a rule. Rule id and severity default to
/// those of the reporting rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Breach {
    pub rule_id: Option<String>,
    pub severity: Option<Severity>,
    pub path: String,
    pub message: String,
}

impl Breach {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule_id: None,
            severity: None,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Report under a different rule id than the reporting rule's.
    pub fn rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

pub type CorrectFn = fn(&InvoiceDocument, &RuleContext<'_>) -> Vec<Remedy>;
pub type ValidateFn = fn(&InvoiceDocument, &RuleContext<'_>) -> Vec<Breach>;

/// What a rule does when evaluated.
#[derive(Clone, Copy)]
pub enum RuleKind {
    /// Proposes fixes; may also refuse.
    Correcting(CorrectFn),
    /// Only reports breaches.
    Validating(ValidateFn),
}

impl fmt::Debug for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Correcting(_) => "Correcting",
            Self::Validating(_) => "Validating",
        })
    }
}

/// One business rule.
#[derive(Debug, Clone)]
pub struct ValidationRule {
    pub id: &'static str,
    pub description: &'static str,
    /// Default severity of breaches reported by this rule.
    pub severity: Severity,
    /// Business terms the rule inspects.
    pub reads: &'static [&'static str],
    /// Business terms the rule may set.
    pub writes: &'static [&'static str],
    pub kind: RuleKind,
}

impl ValidationRule {
    pub fn is_correcting(&self) -> bool {
        matches!(self.kind, RuleKind::Correcting(_))
    }
}

/// Rules in dependency order.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<ValidationRule>,
}

impl RuleSet {
    /// Order `rules` topologically. An edge runs from B to A whenever A
    /// reads a term B writes; among rules that are ready at the same time,
    /// declaration order wins.
    pub fn new(rules: Vec<ValidationRule>) -> Result<Self, BelegError> {
        let mut ids = BTreeSet::new();
        for rule in &rules {
            if !ids.insert(rule.id) {
                return Err(BelegError::Config(format!("duplicate rule id {}", rule.id)));
            }
        }

        let order = toposort(&rules)?;
        let mut slots: Vec<Option<ValidationRule>> = rules.into_iter().map(Some).collect();
        let rules = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect::<Vec<_>>();

        tracing::debug!(
            rules = rules.len(),
            order = %rules.iter().map(|r| r.id).collect::<Vec<_>>().join(","),
            "rule set ordered"
        );
        Ok(Self { rules })
    }

    /// The built-in EN 16931 Basic rule set.
    pub fn en16931_basic() -> Self {
        Self::new(builtin_rules()).unwrap_or_else(|e| unreachable!("built-in rule set: {e}"))
    }

    /// A copy without the rules named in `disabled`. Unknown ids are an
    /// error so that typos in a configuration do not go unnoticed.
    pub fn without(&self, disabled: &[String]) -> Result<Self, BelegError> {
        for id in disabled {
            if !self.rules.iter().any(|r| r.id == id.as_str()) {
                return Err(BelegError::Config(format!("cannot disable unknown rule {id}")));
            }
        }
        Ok(Self {
            rules: self
                .rules
                .iter()
                .filter(|r| !disabled.iter().any(|d| d.as_str() == r.id))
                .cloned()
                .collect(),
        })
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&ValidationRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::en16931_basic()
    }
}

/// Kahn's algorithm over rule indices. Returns the indices in evaluation
/// order, or the ids of the rules left on a cycle.
fn toposort(rules: &[ValidationRule]) -> Result<Vec<usize>, BelegError> {
    let mut writers: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, rule) in rules.iter().enumerate() {
        for bt in rule.writes {
            writers.entry(*bt).or_default().push(i);
        }
    }

    let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); rules.len()];
    let mut indegree = vec![0usize; rules.len()];
    for (reader, rule) in rules.iter().enumerate() {
        for bt in rule.reads {
            for &writer in writers.get(bt).map(Vec::as_slice).unwrap_or(&[]) {
                if writer != reader && edges[writer].insert(reader) {
                    indegree[reader] += 1;
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..rules.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(rules.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &target in &edges[node] {
            indegree[target] = indegree[target].saturating_sub(1);
            if indegree[target] == 0 {
                ready.insert(target);
            }
        }
    }

    if order.len() == rules.len() {
        Ok(order)
    } else {
        let rules = indegree
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(i, _)| rules[i].id.to_string())
            .collect();
        Err(BelegError::RuleCycle { rules })
    }
}

/// A sum or product left the range of [`Decimal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OutOfRange;

/// FATAL refusal for arithmetic that left the representable range.
pub(crate) fn out_of_range(path: impl Into<String>, what: &str) -> Remedy {
    Remedy::Refuse(
        Breach::new(path, format!("{what}: amount out of range")).severity(Severity::Fatal),
    )
}

/// `a + b + ...`, `None` on overflow.
pub(crate) fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

/// Sum of `bt` over every instance of `group`; `Ok(None)` when no instance
/// carries the term.
pub(crate) fn sum_over(
    doc: &InvoiceDocument,
    group: &str,
    bt: &str,
) -> Result<Option<Decimal>, OutOfRange> {
    doc.instances(group)
        .filter_map(|g| doc.decimal(g, bt))
        .try_fold(None, |acc: Option<Decimal>, v| {
            acc.unwrap_or(Decimal::ZERO)
                .checked_add(v)
                .map(Some)
                .ok_or(OutOfRange)
        })
}

/// Compare a computed amount with the stored one and propose what to do.
///
/// Absent values are derived and values within the configured tolerance
/// are corrected, whatever their extraction confidence. Anything else is
/// refused.
pub(crate) fn reconcile(
    doc: &InvoiceDocument,
    ctx: &RuleContext<'_>,
    group: Option<GroupId>,
    bt: &'static str,
    computed: Decimal,
    rationale: impl Into<String>,
) -> Option<Remedy> {
    let rationale: String = rationale.into();
    let term = match group {
        Some(g) => doc.get(g, bt),
        None => doc.singular_term(ctx.registry, bt),
    };
    let set = |rationale: String| Remedy::Set {
        group,
        bt,
        value: BtValue::Decimal(computed),
        rationale,
    };
    let Some(term) = term else {
        return Some(set(rationale));
    };
    let stored = term.value.as_decimal()?;
    if stored == computed {
        return None;
    }
    let within_tolerance = stored
        .checked_sub(computed)
        .is_some_and(|diff| diff.abs() <= ctx.settings.tolerance);
    if within_tolerance {
        return Some(set(rationale));
    }
    let path = doc.term_path(term.group, bt);
    Some(Remedy::Refuse(Breach::new(
        path,
        format!("{bt} is {stored}, expected {computed} ({rationale})"),
    )))
}

fn builtin_rules() -> Vec<ValidationRule> {
    let mut rules = Vec::new();
    rules.extend(derive::rules());
    rules.extend(calc::rules());
    rules.extend(checks::rules());
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Breach> {
        Vec::new()
    }

    fn rule(
        id: &'static str,
        reads: &'static [&'static str],
        writes: &'static [&'static str],
    ) -> ValidationRule {
        ValidationRule {
            id,
            description: "test rule",
            severity: Severity::Error,
            reads,
            writes,
            kind: RuleKind::Validating(noop),
        }
    }

    #[test]
    fn writers_run_before_readers() {
        let set = RuleSet::new(vec![
            rule("C", &["BT-109"], &["BT-112"]),
            rule("A", &[], &["BT-106"]),
            rule("B", &["BT-106"], &["BT-109"]),
        ])
        .unwrap();
        let order: Vec<_> = set.rules().iter().map(|r| r.id).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let set = RuleSet::new(vec![
            rule("Z", &[], &[]),
            rule("Y", &[], &[]),
            rule("X", &[], &[]),
        ])
        .unwrap();
        let order: Vec<_> = set.rules().iter().map(|r| r.id).collect();
        assert_eq!(order, vec!["Z", "Y", "X"]);
    }

    #[test]
    fn self_edges_are_ignored() {
        assert!(RuleSet::new(vec![rule("A", &["BT-116"], &["BT-116"])]).is_ok());
    }

    #[test]
    fn cycle_is_rejected() {
        let err = RuleSet::new(vec![
            rule("A", &["BT-110"], &["BT-112"]),
            rule("B", &["BT-112"], &["BT-110"]),
            rule("C", &[], &[]),
        ])
        .unwrap_err();
        match err {
            BelegError::RuleCycle { rules } => assert_eq!(rules, vec!["A", "B"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        assert!(matches!(
            RuleSet::new(vec![rule("A", &[], &[]), rule("A", &[], &[])]),
            Err(BelegError::Config(_))
        ));
    }

    #[test]
    fn builtin_rule_set_is_acyclic() {
        let set = RuleSet::en16931_basic();
        assert!(!set.is_empty());
        let position = |id: &str| set.rules().iter().position(|r| r.id == id).unwrap();
        assert!(position("BR-LINE-NET") < position("BR-CO-10"));
        assert!(position("BR-CO-10") < position("BR-CO-13"));
        assert!(position("BR-CO-17") < position("BR-CO-14"));
        assert!(position("BR-CO-14") < position("BR-CO-15"));
        assert!(position("BR-CO-15") < position("BR-CO-16"));
    }

    #[test]
    fn builtin_rules_form_a_valid_set() {
        let rules = builtin_rules();
        let count = rules.len();
        let set = RuleSet::new(rules).unwrap();
        assert_eq!(set.len(), count);
    }

    #[test]
    fn sums_report_overflow() {
        assert_eq!(checked_sum([Decimal::ONE, Decimal::TWO]), Some(Decimal::from(3)));
        assert_eq!(checked_sum([Decimal::MAX, Decimal::ONE]), None);
    }

    #[test]
    fn disabling_unknown_rule_fails() {
        let set = RuleSet::en16931_basic();
        assert!(set.without(&["BR-NOPE".to_string()]).is_err());
        let trimmed = set.without(&["BR-27".to_string()]).unwrap();
        assert!(trimmed.get("BR-27").is_none());
        assert_eq!(trimmed.len(), set.len() - 1);
    }
}
