//! EN 16931 Basic UBL writer and reader.

#![cfg(feature = "ubl")]

use beleg::core::*;
use beleg::ubl::{from_ubl_xml, to_ubl_xml, ubl_ns};
use rust_decimal_macros::dec;

fn corrected(raw: &RawExtraction) -> (InvoiceDocument, Vec<Violation>) {
    let config = ProcessingConfig::en16931_basic();
    let mapped = FieldMapper::new(&config).map(raw);
    let mut doc = mapped.document;
    let run = Engine::new(&config).run(&mut doc);
    let mut violations = mapped.violations;
    violations.extend(run.violations);
    (doc, violations)
}

fn full_invoice() -> RawExtraction {
    RawExtraction::new()
        .with("InvoiceId", "RE-2024-0815")
        .with("InvoiceDate", "15.06.2024")
        .with("DueDate", "15.07.2024")
        .with("CurrencyCode", "EUR")
        .with("CustomerReference", "04011000-12345-03")
        .with("PurchaseOrder", "PO-77")
        .with("Note", "Vielen Dank für Ihren Auftrag & Ihr Vertrauen")
        .with("ServiceStartDate", "01.06.2024")
        .with("ServiceEndDate", "30.06.2024")
        .with("PaymentTerm", "30 Tage netto")
        .with("VendorName", "ACME GmbH")
        .with("VendorTaxId", "DE123456789")
        .with("VendorTaxNumber", "201/113/40209")
        .with("VendorEmail", "rechnung@acme.de")
        .with("VendorAddress.streetAddress", "Hauptstraße 1")
        .with("VendorAddress.city", "Berlin")
        .with("VendorAddress.postalCode", "10115")
        .with("VendorAddress.countryRegion", "DE")
        .with("CustomerName", "Kunde AG")
        .with("CustomerTaxId", "ATU12345678")
        .with("CustomerAddress.city", "Wien")
        .with("CustomerAddress.postalCode", "1010")
        .with("CustomerAddress.countryRegion", "AT")
        .with("PaymentReference", "RE-2024-0815")
        .with("PaymentDetails.IBAN", "DE89370400440532013000")
        .with("PaymentDetails.AccountName", "ACME GmbH")
        .line(
            RawRecord::new()
                .with("ProductCode", "B-100")
                .with("Description", "Beratung")
                .with("Quantity", "10")
                .with("Unit", "HUR")
                .with("UnitPrice", "150,00")
                .with("TaxRate", "19"),
        )
        .line(
            RawRecord::new()
                .with("Description", "Fachbuch")
                .with("Quantity", "2")
                .with("UnitPrice", "24,90")
                .with("Discount", "4,80")
                .with("TaxRate", "7"),
        )
        .allowance(
            RawRecord::new()
                .with("Amount", "50,00")
                .with("TaxRate", "19")
                .with("Reason", "Treuerabatt"),
        )
        .charge(
            RawRecord::new()
                .with("Amount", "5,90")
                .with("TaxRate", "19")
                .with("Reason", "Versand"),
        )
}

fn position(xml: &str, needle: &str) -> usize {
    xml.find(needle)
        .unwrap_or_else(|| panic!("{needle} not in\n{xml}"))
}

#[test]
fn writes_a_complete_invoice() {
    let (doc, violations) = corrected(&full_invoice());
    assert!(
        violations.iter().all(|v| !v.severity.is_blocking()),
        "{violations:?}"
    );
    let xml = to_ubl_xml(&doc, &violations, &BtRegistry::en16931_basic()).unwrap();

    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(xml.contains(ubl_ns::INVOICE));
    assert!(xml.contains(ubl_ns::CAC));
    assert!(xml.contains(ubl_ns::CBC));
    assert!(xml.contains("<cbc:CustomizationID>urn:cen.eu:en16931:2017</cbc:CustomizationID>"));
    assert!(xml.contains("<cbc:IssueDate>2024-06-15</cbc:IssueDate>"));
    assert!(xml.contains("<cbc:InvoiceTypeCode>380</cbc:InvoiceTypeCode>"));
    assert!(xml.contains("Auftrag &amp; Ihr"));
    assert!(xml.contains("<cbc:EndpointID schemeID=\"EM\">rechnung@acme.de</cbc:EndpointID>"));
    assert!(xml.contains("<cbc:InvoicedQuantity unitCode=\"HUR\">10.00</cbc:InvoicedQuantity>"));
    assert!(xml.contains("<cbc:LineExtensionAmount currencyID=\"EUR\">1500.00</cbc:LineExtensionAmount>"));
    assert!(xml.contains("<cbc:PaymentMeansCode>58</cbc:PaymentMeansCode>"));
    assert!(xml.contains("<cbc:ID>DE89370400440532013000</cbc:ID>"));
    assert!(xml.contains("<cbc:ID>FC</cbc:ID>"));
}

#[test]
fn elements_follow_the_ubl_sequence() {
    let (doc, violations) = corrected(&full_invoice());
    let xml = to_ubl_xml(&doc, &violations, &BtRegistry::en16931_basic()).unwrap();

    let order = [
        "<cbc:CustomizationID>",
        "<cbc:ID>RE-2024-0815",
        "<cbc:IssueDate>",
        "<cbc:DueDate>",
        "<cbc:InvoiceTypeCode>",
        "<cbc:Note>",
        "<cbc:DocumentCurrencyCode>",
        "<cbc:BuyerReference>",
        "<cac:InvoicePeriod>",
        "<cac:OrderReference>",
        "<cac:AccountingSupplierParty>",
        "<cac:AccountingCustomerParty>",
        "<cac:PaymentMeans>",
        "<cac:PaymentTerms>",
        "<cbc:ChargeIndicator>false",
        "<cbc:ChargeIndicator>true",
        "<cac:TaxTotal>",
        "<cac:LegalMonetaryTotal>",
        "<cac:InvoiceLine>",
    ];
    let positions: Vec<usize> = order.iter().map(|e| position(&xml, e)).collect();
    assert!(
        positions.windows(2).all(|w| w[0] < w[1]),
        "out of order: {order:?} at {positions:?}"
    );

    let totals = [
        "<cbc:LineExtensionAmount currencyID=\"EUR\">1545.00",
        "<cbc:TaxExclusiveAmount",
        "<cbc:TaxInclusiveAmount",
        "<cbc:AllowanceTotalAmount",
        "<cbc:ChargeTotalAmount",
        "<cbc:PayableAmount",
    ];
    let positions: Vec<usize> = totals.iter().map(|e| position(&xml, e)).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn totals_match_the_corrected_store() {
    let (doc, violations) = corrected(&full_invoice());
    let xml = to_ubl_xml(&doc, &violations, &BtRegistry::en16931_basic()).unwrap();

    // Lines 1500.00 + 45.00 (2 × 24.90 − 4.80), allowance 50.00, charge 5.90.
    assert!(xml.contains("<cbc:TaxExclusiveAmount currencyID=\"EUR\">1500.90</cbc:TaxExclusiveAmount>"));
    // 19 %: 1455.90 → 276.62; 7 %: 45.00 → 3.15
    assert!(xml.contains("<cbc:TaxAmount currencyID=\"EUR\">279.77</cbc:TaxAmount>"));
    assert!(xml.contains("<cbc:TaxableAmount currencyID=\"EUR\">1455.90</cbc:TaxableAmount>"));
    assert!(xml.contains("<cbc:PayableAmount currencyID=\"EUR\">1780.67</cbc:PayableAmount>"));
}

#[test]
fn blocking_violations_refuse_serialization() {
    let (doc, _) = corrected(&full_invoice());
    let violations = vec![
        Violation::warning("BR-X", "", "harmless"),
        Violation::fatal("BR-CO-15", "BG-22/BT-112", "total mismatch"),
    ];
    match to_ubl_xml(&doc, &violations, &BtRegistry::en16931_basic()) {
        Err(BelegError::SerializationRefused { violations }) => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].rule_id, "BR-CO-15");
        }
        other => panic!("expected refusal, got {other:?}"),
    }
}

#[test]
fn warnings_do_not_block() {
    let (doc, _) = corrected(&full_invoice());
    let violations = vec![Violation::warning("BR-X", "", "harmless")];
    assert!(to_ubl_xml(&doc, &violations, &BtRegistry::en16931_basic()).is_ok());
}

#[test]
fn reading_back_gives_the_same_business_content() {
    let registry = BtRegistry::en16931_basic();
    let (doc, violations) = corrected(&full_invoice());
    let xml = to_ubl_xml(&doc, &violations, &registry).unwrap();

    let read = from_ubl_xml(&xml, &registry).unwrap();
    assert_eq!(read.snapshot(), doc.snapshot());

    let again = to_ubl_xml(&read, &[], &registry).unwrap();
    assert_eq!(again, xml);
}

#[test]
fn read_terms_carry_xml_source_paths() {
    let registry = BtRegistry::en16931_basic();
    let (doc, violations) = corrected(&full_invoice());
    let xml = to_ubl_xml(&doc, &violations, &registry).unwrap();
    let read = from_ubl_xml(&xml, &registry).unwrap();

    let term = read.singular_term(&registry, "BT-115").unwrap();
    assert_eq!(term.value, BtValue::Decimal(dec!(1780.67)));
    assert_eq!(
        term.source_path.as_deref(),
        Some("/Invoice/LegalMonetaryTotal/PayableAmount")
    );
}

#[test]
fn read_document_passes_the_engine_unchanged() {
    let config = ProcessingConfig::en16931_basic();
    let (doc, violations) = corrected(&full_invoice());
    let xml = to_ubl_xml(&doc, &violations, config.registry()).unwrap();

    let mut read = from_ubl_xml(&xml, config.registry()).unwrap();
    let run = Engine::new(&config).run(&mut read);
    assert!(run.corrections.is_empty(), "{:?}", run.corrections);
}

#[test]
fn credit_notes_are_not_read() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<CreditNote xmlns="urn:oasis:names:specification:ubl:schema:xsd:CreditNote-2">
  <cbc:ID xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2">CN-1</cbc:ID>
</CreditNote>"#;
    assert!(matches!(
        from_ubl_xml(xml, &BtRegistry::en16931_basic()),
        Err(BelegError::Xml(_))
    ));
}

#[test]
fn malformed_xml_is_an_error() {
    let xml = "<Invoice><cbc:ID>1</Invoice>";
    assert!(from_ubl_xml(xml, &BtRegistry::en16931_basic()).is_err());
}

#[test]
fn missing_currency_cannot_be_written() {
    let doc = InvoiceDocument::new();
    assert!(matches!(
        to_ubl_xml(&doc, &[], &BtRegistry::en16931_basic()),
        Err(BelegError::Xml(_))
    ));
}
