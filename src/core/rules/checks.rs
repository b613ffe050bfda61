//! Validating rules. They report breaches and never touch the store.

use rust_decimal::Decimal;

use crate::core::codelists::Codelist;
use crate::core::registry::{BtSpec, GroupSpec};
use crate::core::report::Severity;
use crate::core::store::{GroupId, InvoiceDocument};
use crate::core::value::DataType;

use super::{Breach, RuleContext, RuleKind, ValidationRule};

pub(super) fn rules() -> Vec<ValidationRule> {
    vec![
        ValidationRule {
            id: "CARDINALITY",
            description: "Mandatory business terms and groups are present",
            severity: Severity::Fatal,
            reads: &[
                "BT-1", "BT-2", "BT-3", "BT-5", "BT-24", "BT-27", "BT-40", "BT-44", "BT-55",
                "BT-81", "BT-84", "BT-92", "BT-95", "BT-99", "BT-102", "BT-106", "BT-109",
                "BT-112", "BT-115", "BT-116", "BT-117", "BT-118", "BT-126", "BT-129", "BT-130",
                "BT-131", "BT-146", "BT-151", "BT-153",
            ],
            writes: &[],
            kind: RuleKind::Validating(mandatory_elements),
        },
        ValidationRule {
            id: "BR-CL",
            description: "Coded values are members of their codelist",
            severity: Severity::Error,
            reads: &[
                "BT-3", "BT-5", "BT-40", "BT-55", "BT-81", "BT-95", "BT-98", "BT-102", "BT-105",
                "BT-118", "BT-130", "BT-151",
            ],
            writes: &[],
            kind: RuleKind::Validating(codelist_membership),
        },
        ValidationRule {
            id: "BR-DEC",
            description: "Amounts carry no more decimals than the currency's minor unit",
            severity: Severity::Error,
            reads: &[
                "BT-92", "BT-93", "BT-99", "BT-100", "BT-106", "BT-107", "BT-108", "BT-109",
                "BT-110", "BT-112", "BT-113", "BT-114", "BT-115", "BT-116", "BT-117", "BT-131",
                "BT-136", "BT-141", "BT-5",
            ],
            writes: &[],
            kind: RuleKind::Validating(amount_decimals),
        },
        ValidationRule {
            id: "BR-27",
            description: "The Item net price shall NOT be negative",
            severity: Severity::Error,
            reads: &["BT-146"],
            writes: &[],
            kind: RuleKind::Validating(price_not_negative),
        },
        ValidationRule {
            id: "BR-CO-09",
            description: "VAT identifiers shall have a prefix in accordance with ISO code ISO 3166-1 alpha-2",
            severity: Severity::Error,
            reads: &["BT-31", "BT-48"],
            writes: &[],
            kind: RuleKind::Validating(vat_identifier_prefix),
        },
        ValidationRule {
            id: "BR-S-02",
            description: "An Invoice with a Standard rated item shall contain the Seller VAT identifier or tax registration identifier",
            severity: Severity::Error,
            reads: &["BT-151", "BT-95", "BT-102", "BT-118", "BT-31", "BT-32"],
            writes: &[],
            kind: RuleKind::Validating(seller_tax_id_for_standard_rate),
        },
        ValidationRule {
            id: "BR-Z-02",
            description: "An Invoice with a Zero rated item shall contain the Seller VAT identifier or tax registration identifier",
            severity: Severity::Error,
            reads: &["BT-151", "BT-95", "BT-102", "BT-118", "BT-31", "BT-32"],
            writes: &[],
            kind: RuleKind::Validating(seller_tax_id_for_zero_rate),
        },
        ValidationRule {
            id: "BR-S-05",
            description: "A Standard rated Invoice line shall have a VAT rate greater than zero",
            severity: Severity::Error,
            reads: &["BT-151", "BT-152"],
            writes: &[],
            kind: RuleKind::Validating(standard_rate_positive),
        },
        ValidationRule {
            id: "BR-Z-05",
            description: "A Zero rated Invoice line shall have a VAT rate of 0",
            severity: Severity::Error,
            reads: &["BT-151", "BT-152"],
            writes: &[],
            kind: RuleKind::Validating(zero_rate_is_zero),
        },
        ValidationRule {
            id: "BR-E-10",
            description: "An Exempt VAT breakdown shall have an exemption reason code or text",
            severity: Severity::Error,
            reads: &["BT-118", "BT-120", "BT-121"],
            writes: &[],
            kind: RuleKind::Validating(exemption_reason),
        },
        ValidationRule {
            id: "BR-CO-25",
            description: "If the Amount due for payment is positive, either the Payment due date or the Payment terms shall be present",
            severity: Severity::Error,
            reads: &["BT-115", "BT-9", "BT-20"],
            writes: &[],
            kind: RuleKind::Validating(due_date_or_terms),
        },
        ValidationRule {
            id: "BR-33",
            description: "Each Document level allowance shall have a reason or reason code",
            severity: Severity::Error,
            reads: &["BT-97", "BT-98"],
            writes: &[],
            kind: RuleKind::Validating(allowance_reason),
        },
        ValidationRule {
            id: "BR-38",
            description: "Each Document level charge shall have a reason or reason code",
            severity: Severity::Error,
            reads: &["BT-104", "BT-105"],
            writes: &[],
            kind: RuleKind::Validating(charge_reason),
        },
    ]
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}/{segment}")
    }
}

fn missing_term(spec: &BtSpec, path: String) -> Breach {
    let breach = Breach::new(path, format!("{} ({}) is missing", spec.code, spec.name));
    match &spec.mandatory_rule {
        Some(rule) => breach.rule(rule.clone()),
        None => breach,
    }
}

fn mandatory_elements(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Breach> {
    let mut breaches = Vec::new();
    check_group(doc, ctx, GroupId::ROOT, &mut breaches);
    breaches
}

fn check_group(doc: &InvoiceDocument, ctx: &RuleContext<'_>, group: GroupId, out: &mut Vec<Breach>) {
    let Some(node) = doc.group(group) else {
        return;
    };
    let code = node.code();
    let path = doc.group_path(group);

    for term in ctx.registry.terms_in(code) {
        if term.cardinality.is_mandatory() && doc.get(group, &term.code).is_none() {
            out.push(missing_term(term, join(&path, &term.code)));
        }
    }
    for child in ctx.registry.child_groups(code) {
        let mut present = false;
        for instance in doc.children_of(group, &child.code) {
            present = true;
            check_group(doc, ctx, instance, out);
        }
        if !present && child.cardinality.is_mandatory() {
            missing_group(ctx, child, join(&path, &child.code), out);
        }
    }
}

/// A missing mandatory group is reported under its own rule when it has
/// one, otherwise through its mandatory members.
fn missing_group(ctx: &RuleContext<'_>, spec: &GroupSpec, path: String, out: &mut Vec<Breach>) {
    if let Some(rule) = &spec.mandatory_rule {
        out.push(
            Breach::new(path, format!("{} ({}) is missing", spec.code, spec.name)).rule(rule.clone()),
        );
        return;
    }
    for term in ctx.registry.terms_in(&spec.code) {
        if term.cardinality.is_mandatory() {
            out.push(missing_term(term, join(&path, &term.code)));
        }
    }
    for child in ctx.registry.child_groups(&spec.code) {
        if child.cardinality.is_mandatory() {
            missing_group(ctx, child, join(&path, &child.code), out);
        }
    }
}

fn codelist_membership(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Breach> {
    doc.terms()
        .filter_map(|term| {
            let list = ctx.registry.term(&term.code)?.codelist?;
            let code = term.value.as_str()?;
            if ctx.codelists.contains(list, code) {
                return None;
            }
            Some(
                Breach::new(
                    doc.term_path(term.group, &term.code),
                    format!("'{code}' is not a valid {} code", list.name()),
                )
                .rule(list.rule_id()),
            )
        })
        .collect()
}

fn amount_decimals(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Breach> {
    let minor_unit = ctx.minor_unit(doc);
    doc.terms()
        .filter(|term| {
            ctx.registry
                .term(&term.code)
                .is_some_and(|spec| spec.data_type == DataType::Amount)
        })
        .filter_map(|term| {
            let amount = term.value.as_decimal()?;
            (amount.normalize().scale() > minor_unit).then(|| {
                Breach::new(
                    doc.term_path(term.group, &term.code),
                    format!("{amount} has more than {minor_unit} decimals"),
                )
            })
        })
        .collect()
}

fn price_not_negative(doc: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Breach> {
    doc.instances("BG-25")
        .filter_map(|line| {
            let price = doc.decimal(line, "BT-146")?;
            (price < Decimal::ZERO).then(|| {
                Breach::new(
                    doc.term_path(line, "BT-146"),
                    format!("item net price {price} is negative"),
                )
            })
        })
        .collect()
}

fn vat_identifier_prefix(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Breach> {
    let mut breaches = Vec::new();
    for bt in ["BT-31", "BT-48"] {
        let Some(term) = doc.singular_term(ctx.registry, bt) else {
            continue;
        };
        let Some(id) = term.value.as_str() else {
            continue;
        };
        let prefix = id.get(..2).unwrap_or_default();
        // Greece uses EL, Northern Ireland XI.
        let known = matches!(prefix, "EL" | "XI") || ctx.codelists.contains(Codelist::Country, prefix);
        if !known {
            breaches.push(Breach::new(
                doc.term_path(term.group, bt),
                format!("VAT identifier '{id}' lacks an ISO 3166-1 country prefix"),
            ));
        }
    }
    breaches
}

/// Whether any line, allowance, charge or breakdown uses `category`.
fn uses_category(doc: &InvoiceDocument, category: &str) -> bool {
    [
        ("BG-25", "BT-151"),
        ("BG-20", "BT-95"),
        ("BG-21", "BT-102"),
        ("BG-23", "BT-118"),
    ]
    .into_iter()
    .any(|(group, bt)| doc.instances(group).any(|g| doc.text(g, bt) == Some(category)))
}

fn seller_tax_id_for(doc: &InvoiceDocument, ctx: &RuleContext<'_>, category: &str) -> Vec<Breach> {
    if !uses_category(doc, category) {
        return Vec::new();
    }
    let has_id = ["BT-31", "BT-32"]
        .into_iter()
        .any(|bt| doc.singular_value(ctx.registry, bt).is_some());
    if has_id {
        return Vec::new();
    }
    vec![Breach::new(
        "BG-4/BT-31",
        format!("category {category} requires the seller VAT identifier or tax registration identifier"),
    )]
}

fn seller_tax_id_for_standard_rate(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Breach> {
    seller_tax_id_for(doc, ctx, "S")
}

fn seller_tax_id_for_zero_rate(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Breach> {
    seller_tax_id_for(doc, ctx, "Z")
}

fn standard_rate_positive(doc: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Breach> {
    doc.instances("BG-25")
        .filter(|line| doc.text(*line, "BT-151") == Some("S"))
        .filter(|line| !doc.decimal(*line, "BT-152").is_some_and(|r| r > Decimal::ZERO))
        .map(|line| {
            Breach::new(
                doc.term_path(line, "BT-152"),
                "standard rated line needs a VAT rate greater than zero",
            )
        })
        .collect()
}

fn zero_rate_is_zero(doc: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Breach> {
    doc.instances("BG-25")
        .filter(|line| doc.text(*line, "BT-151") == Some("Z"))
        .filter_map(|line| {
            let rate = doc.decimal(line, "BT-152")?;
            (!rate.is_zero()).then(|| {
                Breach::new(
                    doc.term_path(line, "BT-152"),
                    format!("zero rated line has VAT rate {rate}"),
                )
            })
        })
        .collect()
}

fn exemption_reason(doc: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Breach> {
    doc.instances("BG-23")
        .filter(|entry| doc.text(*entry, "BT-118") == Some("E"))
        .filter(|entry| doc.value(*entry, "BT-120").is_none() && doc.value(*entry, "BT-121").is_none())
        .map(|entry| {
            Breach::new(
                join(&doc.group_path(entry), "BT-120"),
                "exempt VAT breakdown without exemption reason",
            )
        })
        .collect()
}

fn due_date_or_terms(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Breach> {
    let due = doc
        .singular_value(ctx.registry, "BT-115")
        .and_then(|v| v.as_decimal());
    let positive = due.is_some_and(|d| d > Decimal::ZERO);
    if !positive
        || doc.value(GroupId::ROOT, "BT-9").is_some()
        || doc.value(GroupId::ROOT, "BT-20").is_some()
    {
        return Vec::new();
    }
    vec![Breach::new(
        "BT-9",
        "amount due is positive but neither due date nor payment terms are given",
    )]
}

fn reason_present(doc: &InvoiceDocument, group: &str, text: &str, code: &str) -> Vec<Breach> {
    doc.instances(group)
        .filter(|g| doc.value(*g, text).is_none() && doc.value(*g, code).is_none())
        .map(|g| {
            Breach::new(
                doc.group_path(g),
                format!("{group} needs {text} or {code}"),
            )
        })
        .collect()
}

fn allowance_reason(doc: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Breach> {
    reason_present(doc, "BG-20", "BT-97", "BT-98")
}

fn charge_reason(doc: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Breach> {
    reason_present(doc, "BG-21", "BT-104", "BT-105")
}
