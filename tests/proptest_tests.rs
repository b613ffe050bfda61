//! Property-based tests for mapping, correction and serialization.
//!
//! Run with: `cargo test --features all --test proptest_tests`

use beleg::core::mapping::parse_decimal;
use beleg::core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn header() -> RawExtraction {
    RawExtraction::new()
        .with("InvoiceId", "RE-2024-PROP")
        .with("InvoiceDate", "2024-06-15")
        .with("DueDate", "2024-07-15")
        .with("CurrencyCode", "EUR")
        .with("VendorName", "ACME GmbH")
        .with("VendorTaxId", "DE123456789")
        .with("VendorAddress.postalCode", "10115")
        .with("CustomerName", "Kunde AG")
        .with("CustomerAddress.postalCode", "80331")
}

fn amount(doc: &InvoiceDocument, bt: &str) -> Decimal {
    doc.singular_value(&BtRegistry::en16931_basic(), bt)
        .and_then(BtValue::as_decimal)
        .unwrap_or_default()
}

fn sum(doc: &InvoiceDocument, group: &str, bt: &str) -> Decimal {
    doc.instances(group).filter_map(|g| doc.decimal(g, bt)).sum()
}

/// German formatting: `.` thousands, `,` decimals.
fn german(value: Decimal) -> String {
    let plain = format!("{:.2}", value.abs());
    let (int, frac) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));
    let mut grouped = String::new();
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    let sign = if value.is_sign_negative() { "-" } else { "" };
    format!("{sign}{grouped},{frac}")
}

// ── Proptest Strategies ─────────────────────────────────────────────────────

/// 0.01 to 99999.99
fn arb_price() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_quantity() -> impl Strategy<Value = Decimal> {
    (1u32..=100u32).prop_map(Decimal::from)
}

fn arb_rate() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("0"), Just("7"), Just("19")]
}

fn arb_line() -> impl Strategy<Value = RawRecord> {
    (arb_quantity(), arb_price(), arb_rate()).prop_map(|(quantity, price, rate)| {
        RawRecord::new()
            .with("Description", "Position")
            .with("Quantity", quantity)
            .with("UnitPrice", german(price))
            .with("TaxRate", rate)
    })
}

fn arb_extraction() -> impl Strategy<Value = RawExtraction> {
    (
        prop::collection::vec(arb_line(), 1..=6),
        prop::option::of(arb_price()),
    )
        .prop_map(|(mut lines, stated_amount)| {
            let mut raw = header();
            if let Some(amount) = stated_amount {
                // Mostly wrong: the line net amount is always recomputed.
                lines[0].insert("Amount", RawField::new(german(amount)));
            }
            raw.lines = lines;
            raw
        })
}

fn corrected(raw: &RawExtraction) -> (InvoiceDocument, EngineRun) {
    let config = ProcessingConfig::en16931_basic();
    let mut doc = FieldMapper::new(&config).map(raw).document;
    let run = Engine::new(&config).run(&mut doc);
    (doc, run)
}

// ── Property Tests ──────────────────────────────────────────────────────────

proptest! {
    /// German-formatted amounts parse back to the same value.
    #[test]
    fn german_amounts_parse(cents in -10_000_000_000i64..10_000_000_000i64) {
        let value = Decimal::new(cents, 2);
        prop_assert_eq!(parse_decimal(&german(value)), Some(value));
    }

    /// After the engine, the document totals add up.
    #[test]
    fn corrected_totals_add_up(raw in arb_extraction()) {
        let (doc, run) = corrected(&raw);
        prop_assert!(run.converged);
        prop_assert!(run.violations.is_empty(), "{:?}", run.violations);

        prop_assert_eq!(amount(&doc, "BT-106"), sum(&doc, "BG-25", "BT-131"));
        prop_assert_eq!(amount(&doc, "BT-110"), sum(&doc, "BG-23", "BT-117"));
        prop_assert_eq!(amount(&doc, "BT-109"), sum(&doc, "BG-23", "BT-116"));
        prop_assert_eq!(amount(&doc, "BT-112"), amount(&doc, "BT-109") + amount(&doc, "BT-110"));
        prop_assert_eq!(amount(&doc, "BT-115"), amount(&doc, "BT-112"));
    }

    /// A second engine run changes nothing.
    #[test]
    fn engine_is_idempotent(raw in arb_extraction()) {
        let config = ProcessingConfig::en16931_basic();
        let (mut doc, _) = corrected(&raw);
        let before = doc.snapshot();

        let run = Engine::new(&config).run(&mut doc);
        prop_assert!(run.corrections.is_empty(), "{:?}", run.corrections);
        prop_assert_eq!(doc.snapshot(), before);
    }

    /// Every correction is classified consistently.
    #[test]
    fn correction_severity_follows_kind(raw in arb_extraction()) {
        let (_, run) = corrected(&raw);
        for correction in &run.corrections {
            prop_assert_eq!(correction.severity, correction.kind.severity());
            if correction.kind == CorrectionKind::Derived {
                prop_assert!(correction.value_before.is_none());
            } else {
                prop_assert!(correction.value_before.is_some());
            }
        }
    }

    /// Writing and reading back UBL keeps every business term.
    #[cfg(feature = "ubl")]
    #[test]
    fn ubl_roundtrip_preserves_terms(raw in arb_extraction()) {
        let registry = BtRegistry::en16931_basic();
        let (doc, run) = corrected(&raw);
        let xml = beleg::ubl::to_ubl_xml(&doc, &run.violations, &registry).unwrap();
        let read = beleg::ubl::from_ubl_xml(&xml, &registry).unwrap();
        prop_assert_eq!(read.snapshot(), doc.snapshot());
    }
}

// ── Edge Cases ──────────────────────────────────────────────────────────────

#[test]
fn german_formatting_helper() {
    assert_eq!(german(Decimal::new(123456789, 2)), "1.234.567,89");
    assert_eq!(german(Decimal::new(-5, 2)), "-0,05");
    assert_eq!(german(Decimal::new(100000, 2)), "1.000,00");
}

#[test]
fn unicode_names_survive_mapping() {
    let raw = header()
        .with("VendorName", "Müller & Söhne Straßenbau GmbH")
        .with("CustomerName", "株式会社テスト");
    let (doc, _) = corrected(&raw);
    let registry = BtRegistry::en16931_basic();
    assert_eq!(
        doc.singular_value(&registry, "BT-27").map(ToString::to_string).as_deref(),
        Some("Müller & Söhne Straßenbau GmbH")
    );
    assert_eq!(
        doc.singular_value(&registry, "BT-44").map(ToString::to_string).as_deref(),
        Some("株式会社テスト")
    );
}

#[test]
fn many_lines_converge() {
    let mut raw = header();
    for i in 1..=200 {
        raw = raw.line(
            RawRecord::new()
                .with("Description", format!("Position {i}"))
                .with("Quantity", "1")
                .with("UnitPrice", "0,99")
                .with("TaxRate", if i % 2 == 0 { "19" } else { "7" }),
        );
    }
    let (doc, run) = corrected(&raw);
    assert!(run.converged);
    assert_eq!(doc.instances("BG-25").count(), 200);
    assert_eq!(amount(&doc, "BT-106"), Decimal::new(19800, 2));
}
