//! End-to-end processing: extraction in, report and UBL out.

#![cfg(feature = "ubl")]

use beleg::core::*;
use beleg::pipeline::{self, ProcessingOutcome};

/// Three units at 10.00, zero rated, with the given stated total and
/// currency.
fn scenario(total: &str, currency: &str) -> RawExtraction {
    RawExtraction::new()
        .with("InvoiceId", "R-2024-17")
        .with("InvoiceDate", "2024-05-02")
        .with("DueDate", "2024-06-01")
        .with("CurrencyCode", currency)
        .with("InvoiceTotal", total)
        .with("VendorName", "Druckerei Nord GmbH")
        .with("VendorTaxId", "DE987654321")
        .with("VendorAddress.countryRegion", "DE")
        .with("CustomerName", "Verein e.V.")
        .with("CustomerAddress.countryRegion", "DE")
        .line(
            RawRecord::new()
                .with("Description", "Flyer")
                .with("Quantity", "3")
                .with("UnitPrice", "10.00")
                .with("TaxRate", "0"),
        )
}

fn process(raw: &RawExtraction) -> ProcessingOutcome {
    pipeline::process(&ProcessingConfig::en16931_basic(), raw).unwrap()
}

#[test]
fn total_mismatch_beyond_tolerance_rejects() {
    let outcome = process(&scenario("29.00", "EUR"));
    let report = &outcome.report;

    assert_eq!(report.state, ProcessingState::Rejected);
    assert!(outcome.xml.is_none());
    assert_eq!(report.violations.len(), 1, "{:?}", report.violations);
    let violation = &report.violations[0];
    assert_eq!(violation.rule_id, "BR-CO-15");
    assert_eq!(violation.severity, Severity::Fatal);
    assert_eq!(violation.path, "BG-22/BT-112");
    assert!(violation.message.contains("29.00"), "{}", violation.message);
    assert!(violation.message.contains("30.00"), "{}", violation.message);
}

#[test]
fn invalid_currency_rejects_once() {
    let outcome = process(&scenario("30.00", "EURO"));
    let report = &outcome.report;

    assert_eq!(report.state, ProcessingState::Rejected);
    assert!(outcome.xml.is_none());
    assert_eq!(report.violations.len(), 1, "{:?}", report.violations);
    assert_eq!(report.violations[0].rule_id, "BR-CL-04");
    assert_eq!(report.violations[0].severity, Severity::Error);
    assert_eq!(report.violations[0].path, "BT-5");
}

#[test]
fn corrected_currency_serializes_cleanly() {
    let outcome = process(&scenario("30.00", "EUR"));
    let report = &outcome.report;

    assert_eq!(report.state, ProcessingState::Serialized);
    assert!(report.violations.is_empty(), "{:?}", report.violations);
    let xml = outcome.xml.unwrap();
    assert!(xml.contains("<cbc:TaxInclusiveAmount currencyID=\"EUR\">30.00</cbc:TaxInclusiveAmount>"));
    assert!(xml.contains("<cbc:ID>Z</cbc:ID>"));
}

#[test]
fn every_correction_is_reported() {
    let outcome = process(&scenario("30.00", "EUR"));
    let report = &outcome.report;

    // Derived line id, unit, category and the totals.
    for path in ["BG-25[1]/BT-126", "BG-25[1]/BT-130", "BG-25[1]/BT-151", "BG-22/BT-115"] {
        let correction = report
            .corrections_for(path)
            .next()
            .unwrap_or_else(|| panic!("no correction at {path}"));
        assert_eq!(correction.kind, CorrectionKind::Derived);
        assert_eq!(correction.severity, Severity::Warning);
    }
    assert!(report.passes >= 2);
    assert_eq!(report.document_id.as_deref(), Some("R-2024-17"));
}

#[test]
fn missing_mandatory_terms_reject() {
    let mut raw = scenario("30.00", "EUR");
    raw.fields.0.remove("InvoiceId");
    raw.fields.0.remove("VendorName");
    let outcome = process(&raw);

    assert_eq!(outcome.state(), ProcessingState::Rejected);
    assert!(outcome.report.document_id.is_none());
    let rules: Vec<&str> = outcome
        .report
        .violations
        .iter()
        .map(|v| v.rule_id.as_str())
        .collect();
    assert!(rules.contains(&"BR-02"));
    assert!(rules.contains(&"BR-06"));
}

#[test]
fn unparseable_field_rejects_with_source_path() {
    let raw = scenario("30.00", "EUR").with("InvoiceDate", "irgendwann");
    let outcome = process(&raw);

    assert_eq!(outcome.state(), ProcessingState::Rejected);
    let coerce = outcome
        .report
        .violations
        .iter()
        .find(|v| v.rule_id == "MAP-COERCE")
        .unwrap();
    assert_eq!(coerce.path, "fields.InvoiceDate");
    // The missing issue date is reported too.
    assert!(outcome.report.violations.iter().any(|v| v.rule_id == "BR-03"));
}

#[test]
fn total_within_tolerance_is_corrected_and_serialized() {
    let outcome = process(&scenario("30.01", "EUR"));
    assert!(outcome.is_serialized());
    let fix = outcome.report.corrections_for("BG-22/BT-112").next().unwrap();
    assert_eq!(fix.kind, CorrectionKind::RuleBreach);
    assert_eq!(fix.severity, Severity::Error);
}

#[test]
fn cyclic_rule_configuration_fails_before_processing() {
    fn nothing(_: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Breach> {
        Vec::new()
    }
    let mut rules = RuleSet::en16931_basic().rules().to_vec();
    rules.push(ValidationRule {
        id: "X-NET-FROM-DUE",
        description: "net amount from amount due",
        severity: Severity::Error,
        reads: &["BT-115"],
        writes: &["BT-109"],
        kind: RuleKind::Validating(nothing),
    });
    assert!(matches!(
        ProcessingConfig::builder().rules(rules).build(),
        Err(BelegError::RuleCycle { .. })
    ));
}

#[test]
fn gross_line_prices_are_converted_and_serialized() {
    let mut raw = scenario("23,80", "EUR").with("SubTotal", "20,00");
    raw.lines = vec![
        RawRecord::new()
            .with("Description", "Toner")
            .with("Quantity", "2")
            .with("UnitPrice", "11,90")
            .with("Amount", "23,80")
            .with("TaxRate", "19"),
    ];
    let outcome = process(&raw);

    assert!(outcome.is_serialized(), "{:?}", outcome.report.violations);
    let price = outcome.report.corrections_for("BG-25[1]/BT-146").next().unwrap();
    assert_eq!(price.rule_id, "LINE-GROSS-PRICES");
    assert_eq!(price.kind, CorrectionKind::Normalized);
    let xml = outcome.xml.unwrap();
    assert!(xml.contains(r#"<cbc:LineExtensionAmount currencyID="EUR">20.00</cbc:LineExtensionAmount>"#));
}

#[test]
fn overflowing_amounts_reject_without_panicking() {
    let mut raw = scenario("30.00", "EUR");
    let huge = RawRecord::new()
        .with("Description", "Flyer")
        .with("Quantity", "1000000000000000")
        .with("UnitPrice", "50000000000000")
        .with("TaxRate", "0");
    raw.lines = vec![huge.clone(), huge];
    let outcome = process(&raw);

    assert_eq!(outcome.state(), ProcessingState::Rejected);
    assert!(outcome.xml.is_none());
    assert!(outcome
        .report
        .violations
        .iter()
        .any(|v| v.severity == Severity::Fatal && v.message.contains("amount out of range")));
}

fn bump_paid(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    let paid = doc
        .singular_value(ctx.registry, "BT-113")
        .and_then(BtValue::as_decimal)
        .unwrap_or_default();
    vec![Remedy::Set {
        group: None,
        bt: "BT-113",
        value: BtValue::Decimal(paid + rust_decimal::Decimal::ONE),
        rationale: "paid once more".into(),
    }]
}

#[test]
fn non_converging_rules_reject() {
    let mut rules = RuleSet::en16931_basic().rules().to_vec();
    rules.push(ValidationRule {
        id: "X-BUMP-PAID",
        description: "paid amount grows on every pass",
        severity: Severity::Error,
        reads: &[],
        writes: &["BT-113"],
        kind: RuleKind::Correcting(bump_paid),
    });
    let config = ProcessingConfig::builder().rules(rules).build().unwrap();
    let outcome = pipeline::process(&config, &scenario("30.00", "EUR")).unwrap();

    assert_eq!(outcome.state(), ProcessingState::Rejected);
    assert_eq!(outcome.report.passes, Settings::default().max_iterations);
    let violation = outcome
        .report
        .violations
        .iter()
        .find(|v| v.rule_id == CONVERGENCE_RULE)
        .unwrap();
    assert_eq!(violation.severity, Severity::Fatal);
}

fn issue_date_as_text(_: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Remedy> {
    vec![Remedy::Set {
        group: None,
        bt: "BT-2",
        value: BtValue::Text("gestern".into()),
        rationale: "issue date as written".into(),
    }]
}

#[test]
fn store_failure_rejects_with_a_report() {
    let mut rules = RuleSet::en16931_basic().rules().to_vec();
    rules.push(ValidationRule {
        id: "X-ISSUE-DATE",
        description: "issue date as text",
        severity: Severity::Error,
        reads: &[],
        writes: &["BT-2"],
        kind: RuleKind::Correcting(issue_date_as_text),
    });
    let config = ProcessingConfig::builder().rules(rules).build().unwrap();
    let outcome = pipeline::process(&config, &scenario("30.00", "EUR")).unwrap();

    assert_eq!(outcome.state(), ProcessingState::Rejected);
    let violation = outcome
        .report
        .violations
        .iter()
        .find(|v| v.rule_id == "X-ISSUE-DATE")
        .unwrap();
    assert_eq!(violation.severity, Severity::Fatal);
    assert_eq!(violation.path, "BT-2");
    assert!(violation.message.contains("BT-2"), "{}", violation.message);
}

#[cfg(feature = "batch")]
mod batch {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn batch() -> Vec<RawExtraction> {
        vec![
            scenario("30.00", "EUR"),
            scenario("29.00", "EUR"),
            scenario("30.00", "EURO"),
            scenario("30.00", "EUR").with("InvoiceId", "R-2024-18"),
        ]
    }

    #[test]
    fn results_keep_input_order() {
        let config = ProcessingConfig::en16931_basic();
        let results = pipeline::process_batch(&config, &batch());
        let states: Vec<ProcessingState> = results
            .iter()
            .map(|r| r.as_ref().unwrap().state())
            .collect();
        assert_eq!(
            states,
            [
                ProcessingState::Serialized,
                ProcessingState::Rejected,
                ProcessingState::Rejected,
                ProcessingState::Serialized,
            ]
        );
        assert_eq!(
            results[3].as_ref().unwrap().report.document_id.as_deref(),
            Some("R-2024-18")
        );
    }

    #[test]
    fn batch_matches_sequential_processing() {
        let config = ProcessingConfig::en16931_basic();
        let input = batch();
        let parallel = pipeline::process_batch(&config, &input);
        for (raw, result) in input.iter().zip(parallel) {
            let sequential = pipeline::process(&config, raw).unwrap();
            let result = result.unwrap();
            assert_eq!(result.report, sequential.report);
            assert_eq!(result.xml, sequential.xml);
        }
    }

    #[test]
    fn cancelled_batch_starts_nothing() {
        let config = ProcessingConfig::en16931_basic();
        let cancel = AtomicBool::new(true);
        let results = pipeline::process_batch_cancellable(&config, &batch(), &cancel);
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(Option::is_none));
    }

    #[test]
    fn uncancelled_batch_runs_everything() {
        let config = ProcessingConfig::en16931_basic();
        let cancel = AtomicBool::new(false);
        let results = pipeline::process_batch_cancellable(&config, &batch(), &cancel);
        assert!(results.iter().all(|r| matches!(r, Some(Ok(_)))));
    }
}
