//! Line amounts printed gross on invoices whose totals are net.
//!
//! Runs on freshly mapped values only: the check compares stated line
//! amounts with the stated net total, and the engine rewrites both.

use rust_decimal::Decimal;

use crate::core::config::ProcessingConfig;
use crate::core::report::{Correction, CorrectionKind};
use crate::core::rules::{RuleContext, checked_sum};
use crate::core::store::{GroupId, InvoiceDocument};
use crate::core::value::BtValue;

/// Rule id of corrections that turn gross line values into net ones.
pub const GROSS_LINES_RULE: &str = "LINE-GROSS-PRICES";

/// Decimal places kept for converted unit prices.
const PRICE_SCALE: u32 = 4;

struct GrossLine {
    line: GroupId,
    rate: Decimal,
    amount: Decimal,
    net_amount: Decimal,
}

/// Convert lines to net when their stated amounts only add up to the
/// stated net total (BT-109) after removing each line's VAT.
///
/// Invoices with allowances or charges are left alone; their totals do not
/// tell gross lines apart from net ones.
pub(super) fn net_from_gross(doc: &mut InvoiceDocument, config: &ProcessingConfig) -> Vec<Correction> {
    let ctx = config.rule_context();
    let Some(lines) = gross_lines(doc, &ctx) else {
        return Vec::new();
    };

    let mut corrections = Vec::new();
    for gross in lines.iter().filter(|l| l.rate > Decimal::ZERO) {
        let factor = Decimal::ONE_HUNDRED + gross.rate;
        let price = doc.decimal(gross.line, "BT-146");
        let net_price = price
            .and_then(|p| p.checked_mul(Decimal::ONE_HUNDRED))
            .and_then(|p| p.checked_div(factor))
            .map(|p| p.round_dp(PRICE_SCALE));
        // Keep the line net amount consistent with the converted price.
        let net_amount = match (net_price, doc.decimal(gross.line, "BT-129")) {
            (Some(price), Some(quantity)) => {
                let base = doc.decimal(gross.line, "BT-149").unwrap_or(Decimal::ONE);
                if base.is_zero() {
                    continue;
                }
                match quantity.checked_mul(price).and_then(|v| v.checked_div(base)) {
                    Some(amount) => ctx.round_amount(doc, amount),
                    None => continue,
                }
            }
            _ => gross.net_amount,
        };

        let rationale = format!("gross {} / (1 + {}%)", gross.amount, gross.rate);
        if let (Some(before), Some(after)) = (price, net_price) {
            corrections.extend(rewrite(doc, config, gross.line, "BT-146", before, after, &rationale));
        }
        corrections.extend(rewrite(
            doc,
            config,
            gross.line,
            "BT-131",
            gross.amount,
            net_amount,
            &rationale,
        ));
    }

    if !corrections.is_empty() {
        tracing::debug!(lines = lines.len(), "line amounts read as gross");
    }
    corrections
}

/// Lines with stated amounts, if the invoice reads as gross-per-line.
fn gross_lines(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Option<Vec<GrossLine>> {
    if doc.instances("BG-20").next().is_some() || doc.instances("BG-21").next().is_some() {
        return None;
    }
    let net_total = doc
        .singular_value(ctx.registry, "BT-109")
        .and_then(BtValue::as_decimal)?;

    let mut lines = Vec::new();
    for line in doc.instances("BG-25") {
        if doc.value(line, "BT-136").is_some() || doc.value(line, "BT-141").is_some() {
            return None;
        }
        let amount = doc.decimal(line, "BT-131")?;
        let rate = doc.decimal(line, "BT-152").unwrap_or_default();
        let net_amount = amount
            .checked_mul(Decimal::ONE_HUNDRED)?
            .checked_div(Decimal::ONE_HUNDRED.checked_add(rate)?)?;
        lines.push(GrossLine {
            line,
            rate,
            amount,
            net_amount: ctx.round_amount(doc, net_amount),
        });
    }
    if lines.is_empty() {
        return None;
    }

    // Stated amounts must exceed the net total by more than 0.1 %.
    let stated = checked_sum(lines.iter().map(|l| l.amount))?;
    let threshold = net_total.checked_mul(Decimal::new(1001, 3))?;
    if stated <= threshold {
        return None;
    }
    let converted = checked_sum(lines.iter().map(|l| l.net_amount))?;
    let slack = ctx.settings.tolerance.checked_mul(Decimal::from(lines.len()))?;
    (converted.checked_sub(net_total)?.abs() <= slack).then_some(lines)
}

fn rewrite(
    doc: &mut InvoiceDocument,
    config: &ProcessingConfig,
    line: GroupId,
    bt: &str,
    before: Decimal,
    after: Decimal,
    rationale: &str,
) -> Option<Correction> {
    if before == after {
        return None;
    }
    let kind = CorrectionKind::Normalized;
    doc.rewrite(config.registry(), line, bt, BtValue::Decimal(after), GROSS_LINES_RULE)
        .inspect_err(|err| tracing::warn!(%bt, error = %err, "gross line value kept"))
        .ok()?;
    Some(Correction {
        rule_id: GROSS_LINES_RULE.to_string(),
        bt: bt.to_string(),
        path: doc.term_path(line, bt),
        value_before: Some(BtValue::Decimal(before)),
        value_after: BtValue::Decimal(after),
        rationale: rationale.to_string(),
        severity: kind.severity(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mapping::{FieldMapper, RawExtraction, RawRecord};
    use rust_decimal_macros::dec;

    fn extraction(net_total: &str) -> RawExtraction {
        RawExtraction::new()
            .with("CurrencyCode", "EUR")
            .with("SubTotal", net_total)
            .line(
                RawRecord::new()
                    .with("Quantity", "2")
                    .with("UnitPrice", "11,90")
                    .with("Amount", "23,80")
                    .with("TaxRate", "19"),
            )
            .line(
                RawRecord::new()
                    .with("Quantity", "1")
                    .with("UnitPrice", "10,70")
                    .with("Amount", "10,70")
                    .with("TaxRate", "7"),
            )
    }

    #[test]
    fn gross_lines_become_net() {
        let config = ProcessingConfig::en16931_basic();
        let mapped = FieldMapper::new(&config).map(&extraction("30,00"));
        let doc = &mapped.document;
        let lines: Vec<_> = doc.instances("BG-25").collect();

        assert_eq!(doc.decimal(lines[0], "BT-146"), Some(dec!(10.0000)));
        assert_eq!(doc.decimal(lines[0], "BT-131"), Some(dec!(20.00)));
        assert_eq!(doc.decimal(lines[1], "BT-131"), Some(dec!(10.00)));
        assert_eq!(mapped.corrections.len(), 4);
        assert!(mapped
            .corrections
            .iter()
            .all(|c| c.kind == CorrectionKind::Normalized && c.rule_id == GROSS_LINES_RULE));
    }

    #[test]
    fn net_lines_are_left_alone() {
        let config = ProcessingConfig::en16931_basic();
        let mapped = FieldMapper::new(&config).map(&extraction("34,50"));
        assert!(mapped.corrections.is_empty());
    }

    #[test]
    fn unrelated_totals_are_left_alone() {
        let config = ProcessingConfig::en16931_basic();
        let mapped = FieldMapper::new(&config).map(&extraction("25,00"));
        assert!(mapped.corrections.is_empty());
    }
}
