//! Arithmetic rules: line net amounts, document totals and the VAT
//! breakdown.
//!
//! Derivation only runs from lines towards totals. A total is never used to
//! back-fill the amounts it is computed from, which keeps the dependency
//! graph acyclic.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::core::report::Severity;
use crate::core::store::{GroupId, InvoiceDocument};
use crate::core::value::BtValue;

use super::{
    Breach, OutOfRange, Remedy, RuleContext, RuleKind, ValidationRule, checked_sum, out_of_range,
    reconcile, sum_over,
};

pub(super) fn rules() -> Vec<ValidationRule> {
    vec![
        ValidationRule {
            id: "BR-LINE-NET",
            description: "Invoice line net amount = quantity × net price / base quantity − line allowances + line charges",
            severity: Severity::Fatal,
            reads: &["BT-129", "BT-146", "BT-149", "BT-136", "BT-141", "BT-5"],
            writes: &["BT-131"],
            kind: RuleKind::Correcting(line_net_amounts),
        },
        ValidationRule {
            id: "BR-CO-10",
            description: "Sum of Invoice line net amount = Σ Invoice line net amount",
            severity: Severity::Fatal,
            reads: &["BT-131", "BT-5"],
            writes: &["BT-106"],
            kind: RuleKind::Correcting(sum_of_lines),
        },
        ValidationRule {
            id: "BR-CO-11",
            description: "Sum of allowances on document level = Σ Document level allowance amount",
            severity: Severity::Fatal,
            reads: &["BT-92", "BT-5"],
            writes: &["BT-107"],
            kind: RuleKind::Correcting(sum_of_allowances),
        },
        ValidationRule {
            id: "BR-CO-12",
            description: "Sum of charges on document level = Σ Document level charge amount",
            severity: Severity::Fatal,
            reads: &["BT-99", "BT-5"],
            writes: &["BT-108"],
            kind: RuleKind::Correcting(sum_of_charges),
        },
        ValidationRule {
            id: "BR-CO-13",
            description: "Invoice total amount without VAT = Σ line net − allowances + charges",
            severity: Severity::Fatal,
            reads: &["BT-106", "BT-107", "BT-108"],
            writes: &["BT-109"],
            kind: RuleKind::Correcting(total_without_vat),
        },
        ValidationRule {
            id: "BR-CO-17",
            description: "VAT breakdown per category and rate; tax amount = taxable amount × rate / 100",
            severity: Severity::Fatal,
            reads: &[
                "BT-131", "BT-151", "BT-152", "BT-92", "BT-95", "BT-96", "BT-99", "BT-102",
                "BT-103", "BT-116", "BT-117", "BT-118", "BT-119", "BT-5",
            ],
            writes: &["BT-116", "BT-117", "BT-118", "BT-119"],
            kind: RuleKind::Correcting(vat_breakdown),
        },
        ValidationRule {
            id: "BR-CO-14",
            description: "Invoice total VAT amount = Σ VAT category tax amount",
            severity: Severity::Fatal,
            reads: &["BT-117"],
            writes: &["BT-110"],
            kind: RuleKind::Correcting(total_vat),
        },
        ValidationRule {
            id: "BR-CO-15",
            description: "Invoice total amount with VAT = total without VAT + total VAT",
            severity: Severity::Fatal,
            reads: &["BT-109", "BT-110"],
            writes: &["BT-112"],
            kind: RuleKind::Correcting(total_with_vat),
        },
        ValidationRule {
            id: "BR-CO-16",
            description: "Amount due for payment = total with VAT − paid amount + rounding amount",
            severity: Severity::Fatal,
            reads: &["BT-112", "BT-113", "BT-114"],
            writes: &["BT-115"],
            kind: RuleKind::Correcting(amount_due),
        },
    ]
}

/// `amount × rate / 100`, `None` on overflow.
fn percent_of(amount: Decimal, rate: Decimal) -> Option<Decimal> {
    amount.checked_mul(rate)?.checked_div(Decimal::ONE_HUNDRED)
}

fn line_net_amounts(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    let mut remedies = Vec::new();
    for line in doc.instances("BG-25") {
        let (Some(quantity), Some(price)) = (doc.decimal(line, "BT-129"), doc.decimal(line, "BT-146"))
        else {
            continue;
        };
        let base = doc.decimal(line, "BT-149").unwrap_or(Decimal::ONE);
        if base.is_zero() {
            remedies.push(Remedy::Refuse(
                Breach::new(doc.term_path(line, "BT-149"), "item price base quantity is zero")
                    .severity(Severity::Error),
            ));
            continue;
        }
        let allowance = doc.decimal(line, "BT-136").unwrap_or_default();
        let charge = doc.decimal(line, "BT-141").unwrap_or_default();
        let Some(net) = quantity
            .checked_mul(price)
            .and_then(|v| v.checked_div(base))
            .and_then(|v| v.checked_sub(allowance))
            .and_then(|v| v.checked_add(charge))
        else {
            remedies.push(out_of_range(doc.term_path(line, "BT-131"), "line net amount"));
            continue;
        };
        let net = ctx.round_amount(doc, net);
        if doc.decimal(line, "BT-131") == Some(net) {
            continue;
        }
        remedies.push(Remedy::Set {
            group: Some(line),
            bt: "BT-131",
            value: BtValue::Decimal(net),
            rationale: format!("{quantity} × {price} / {base} − {allowance} + {charge}"),
        });
    }
    remedies
}

fn sum_of_lines(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    let sum = match sum_over(doc, "BG-25", "BT-131") {
        Ok(Some(sum)) => sum,
        Ok(None) => return Vec::new(),
        Err(OutOfRange) => return vec![out_of_range("BG-22/BT-106", "sum of line net amounts")],
    };
    let sum = ctx.round_amount(doc, sum);
    reconcile(doc, ctx, None, "BT-106", sum, "sum of line net amounts")
        .into_iter()
        .collect()
}

fn sum_of_allowances(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    document_level_sum(doc, ctx, "BG-20", "BT-92", "BT-107", "sum of document level allowances")
}

fn sum_of_charges(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    document_level_sum(doc, ctx, "BG-21", "BT-99", "BT-108", "sum of document level charges")
}

/// BT-107/BT-108 are only derived when the invoice has allowances or
/// charges; a stated total without any is checked against zero.
fn document_level_sum(
    doc: &InvoiceDocument,
    ctx: &RuleContext<'_>,
    group: &str,
    amount: &str,
    total: &'static str,
    rationale: &str,
) -> Vec<Remedy> {
    let Ok(sum) = sum_over(doc, group, amount) else {
        return vec![out_of_range(format!("BG-22/{total}"), rationale)];
    };
    if sum.is_none() && doc.singular_value(ctx.registry, total).is_none() {
        return Vec::new();
    }
    let sum = ctx.round_amount(doc, sum.unwrap_or_default());
    reconcile(doc, ctx, None, total, sum, rationale)
        .into_iter()
        .collect()
}

fn total_without_vat(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    let total = |bt| {
        doc.singular_value(ctx.registry, bt)
            .and_then(BtValue::as_decimal)
    };
    let Some(lines) = total("BT-106") else {
        return Vec::new();
    };
    let allowances = total("BT-107").unwrap_or_default();
    let charges = total("BT-108").unwrap_or_default();
    let Some(computed) = lines
        .checked_sub(allowances)
        .and_then(|v| v.checked_add(charges))
    else {
        return vec![out_of_range("BG-22/BT-109", "invoice total without VAT")];
    };
    reconcile(
        doc,
        ctx,
        None,
        "BT-109",
        computed,
        format!("{lines} − {allowances} + {charges}"),
    )
    .into_iter()
    .collect()
}

type VatKey = (String, Decimal);

/// Taxable amounts per (category, rate) computed from lines, allowances and
/// charges. Rates compare numerically, so `19` and `19.00` share a key.
fn taxable_amounts(doc: &InvoiceDocument) -> Result<BTreeMap<VatKey, Decimal>, OutOfRange> {
    let mut taxable: BTreeMap<VatKey, Decimal> = BTreeMap::new();
    for (group, category, rate, amount, sign) in [
        ("BG-25", "BT-151", "BT-152", "BT-131", Decimal::ONE),
        ("BG-20", "BT-95", "BT-96", "BT-92", Decimal::NEGATIVE_ONE),
        ("BG-21", "BT-102", "BT-103", "BT-99", Decimal::ONE),
    ] {
        for instance in doc.instances(group) {
            let (Some(category), Some(amount)) =
                (doc.text(instance, category), doc.decimal(instance, amount))
            else {
                continue;
            };
            let rate = doc.decimal(instance, rate).unwrap_or_default().normalize();
            let entry = taxable.entry((category.to_string(), rate)).or_default();
            *entry = checked_sum([*entry, sign * amount]).ok_or(OutOfRange)?;
        }
    }
    Ok(taxable)
}

fn vat_breakdown(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    let Ok(computed) = taxable_amounts(doc) else {
        return vec![out_of_range("BG-23", "VAT category taxable amount")];
    };
    let mut remedies = Vec::new();

    let mut existing: BTreeMap<VatKey, GroupId> = BTreeMap::new();
    for entry in doc.instances("BG-23") {
        let Some(category) = doc.text(entry, "BT-118") else {
            continue;
        };
        let rate = doc.decimal(entry, "BT-119").unwrap_or_default().normalize();
        let key = (category.to_string(), rate);
        if existing.contains_key(&key) {
            remedies.push(Remedy::Refuse(
                Breach::new(
                    doc.group_path(entry),
                    format!("duplicate VAT breakdown for category {} at {}%", key.0, key.1),
                )
                .severity(Severity::Error),
            ));
        } else if !computed.contains_key(&key) {
            remedies.push(Remedy::Refuse(
                Breach::new(
                    doc.group_path(entry),
                    format!(
                        "VAT breakdown for category {} at {}% has no matching lines, allowances or charges",
                        key.0, key.1
                    ),
                )
                .severity(Severity::Error),
            ));
            existing.insert(key, entry);
        } else {
            existing.insert(key, entry);
        }
    }

    for ((category, rate), sum) in &computed {
        let taxable = ctx.round_amount(doc, *sum);
        let Some(tax) = percent_of(taxable, *rate).map(|t| ctx.round_amount(doc, t)) else {
            remedies.push(out_of_range(
                "BG-23",
                &format!("VAT category tax amount of {category} at {rate}%"),
            ));
            continue;
        };
        match existing.get(&(category.clone(), *rate)) {
            Some(&entry) => {
                remedies.extend(reconcile(
                    doc,
                    ctx,
                    Some(entry),
                    "BT-116",
                    taxable,
                    format!("taxable amount of category {category} at {rate}%"),
                ));
                remedies.extend(reconcile(
                    doc,
                    ctx,
                    Some(entry),
                    "BT-117",
                    tax,
                    format!("{taxable} × {rate}%"),
                ));
            }
            None => remedies.push(Remedy::AddGroup {
                parent: GroupId::ROOT,
                group: "BG-23",
                terms: vec![
                    ("BT-118", BtValue::Code(category.clone())),
                    ("BT-119", BtValue::Decimal(*rate)),
                    ("BT-116", BtValue::Decimal(taxable)),
                    ("BT-117", BtValue::Decimal(tax)),
                ],
                rationale: format!("VAT breakdown for category {category} at {rate}%"),
            }),
        }
    }
    remedies
}

fn total_vat(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    let sum = match sum_over(doc, "BG-23", "BT-117") {
        Ok(Some(sum)) => sum,
        Ok(None) => return Vec::new(),
        Err(OutOfRange) => return vec![out_of_range("BG-22/BT-110", "invoice total VAT amount")],
    };
    let sum = ctx.round_amount(doc, sum);
    reconcile(doc, ctx, None, "BT-110", sum, "sum of VAT category tax amounts")
        .into_iter()
        .collect()
}

fn total_with_vat(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    let total = |bt| {
        doc.singular_value(ctx.registry, bt)
            .and_then(BtValue::as_decimal)
    };
    let Some(net) = total("BT-109") else {
        return Vec::new();
    };
    let vat = total("BT-110").unwrap_or_default();
    let Some(computed) = net.checked_add(vat) else {
        return vec![out_of_range("BG-22/BT-112", "invoice total with VAT")];
    };
    reconcile(doc, ctx, None, "BT-112", computed, format!("{net} + {vat}"))
        .into_iter()
        .collect()
}

fn amount_due(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    let total = |bt| {
        doc.singular_value(ctx.registry, bt)
            .and_then(BtValue::as_decimal)
    };
    let Some(gross) = total("BT-112") else {
        return Vec::new();
    };
    let paid = total("BT-113").unwrap_or_default();
    let rounding = total("BT-114").unwrap_or_default();
    let Some(computed) = gross
        .checked_sub(paid)
        .and_then(|v| v.checked_add(rounding))
    else {
        return vec![out_of_range("BG-22/BT-115", "amount due for payment")];
    };
    reconcile(
        doc,
        ctx,
        None,
        "BT-115",
        computed,
        format!("{gross} − {paid} + {rounding}"),
    )
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn percent_of_rounds_later() {
        assert_eq!(percent_of(dec!(100.00), dec!(19)), Some(dec!(19.00)));
        assert_eq!(percent_of(dec!(10.05), dec!(7)), Some(dec!(0.7035)));
        assert_eq!(percent_of(Decimal::MAX, dec!(19)), None);
    }
}
