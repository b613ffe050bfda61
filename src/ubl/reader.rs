use std::str::FromStr;

use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rust_decimal::Decimal;

use crate::core::{BelegError, BtRegistry, BtValue, DataType, GroupId, InvoiceDocument, Provenance};

/// Where a bound element's value lands.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Root,
    /// The unique instance of a singular group.
    Singular(&'static str),
    /// The invoice line being read.
    Line,
    /// The VAT breakdown entry being read.
    Subtotal,
    /// The credit transfer account being read.
    Account,
}

/// Element paths (local names, from the document element down) and the
/// term each one carries. Paths needing context (tax schemes, allowance or
/// charge indicator, unit attributes) are resolved in [`UblReader`].
const BINDINGS: &[(&str, Slot, &str)] = &[
    ("Invoice/CustomizationID", Slot::Root, "BT-24"),
    ("Invoice/ID", Slot::Root, "BT-1"),
    ("Invoice/IssueDate", Slot::Root, "BT-2"),
    ("Invoice/DueDate", Slot::Root, "BT-9"),
    ("Invoice/InvoiceTypeCode", Slot::Root, "BT-3"),
    ("Invoice/Note", Slot::Root, "BT-22"),
    ("Invoice/DocumentCurrencyCode", Slot::Root, "BT-5"),
    ("Invoice/BuyerReference", Slot::Root, "BT-10"),
    ("Invoice/InvoicePeriod/StartDate", Slot::Root, "BT-73"),
    ("Invoice/InvoicePeriod/EndDate", Slot::Root, "BT-74"),
    ("Invoice/OrderReference/ID", Slot::Root, "BT-13"),
    ("Invoice/Delivery/ActualDeliveryDate", Slot::Root, "BT-72"),
    ("Invoice/PaymentTerms/Note", Slot::Root, "BT-20"),
    // Seller
    ("Invoice/AccountingSupplierParty/Party/EndpointID", Slot::Singular("BG-4"), "BT-34"),
    ("Invoice/AccountingSupplierParty/Party/PartyLegalEntity/RegistrationName", Slot::Singular("BG-4"), "BT-27"),
    ("Invoice/AccountingSupplierParty/Party/PartyLegalEntity/CompanyID", Slot::Singular("BG-4"), "BT-30"),
    ("Invoice/AccountingSupplierParty/Party/PostalAddress/StreetName", Slot::Singular("BG-5"), "BT-35"),
    ("Invoice/AccountingSupplierParty/Party/PostalAddress/AdditionalStreetName", Slot::Singular("BG-5"), "BT-36"),
    ("Invoice/AccountingSupplierParty/Party/PostalAddress/CityName", Slot::Singular("BG-5"), "BT-37"),
    ("Invoice/AccountingSupplierParty/Party/PostalAddress/PostalZone", Slot::Singular("BG-5"), "BT-38"),
    ("Invoice/AccountingSupplierParty/Party/PostalAddress/CountrySubentity", Slot::Singular("BG-5"), "BT-39"),
    ("Invoice/AccountingSupplierParty/Party/PostalAddress/Country/IdentificationCode", Slot::Singular("BG-5"), "BT-40"),
    // Buyer
    ("Invoice/AccountingCustomerParty/Party/EndpointID", Slot::Singular("BG-7"), "BT-49"),
    ("Invoice/AccountingCustomerParty/Party/PartyLegalEntity/RegistrationName", Slot::Singular("BG-7"), "BT-44"),
    ("Invoice/AccountingCustomerParty/Party/PostalAddress/StreetName", Slot::Singular("BG-8"), "BT-50"),
    ("Invoice/AccountingCustomerParty/Party/PostalAddress/AdditionalStreetName", Slot::Singular("BG-8"), "BT-51"),
    ("Invoice/AccountingCustomerParty/Party/PostalAddress/CityName", Slot::Singular("BG-8"), "BT-52"),
    ("Invoice/AccountingCustomerParty/Party/PostalAddress/PostalZone", Slot::Singular("BG-8"), "BT-53"),
    ("Invoice/AccountingCustomerParty/Party/PostalAddress/CountrySubentity", Slot::Singular("BG-8"), "BT-54"),
    ("Invoice/AccountingCustomerParty/Party/PostalAddress/Country/IdentificationCode", Slot::Singular("BG-8"), "BT-55"),
    // Payment
    ("Invoice/PaymentMeans/PaymentMeansCode", Slot::Singular("BG-16"), "BT-81"),
    ("Invoice/PaymentMeans/PaymentID", Slot::Singular("BG-16"), "BT-83"),
    ("Invoice/PaymentMeans/PayeeFinancialAccount/ID", Slot::Account, "BT-84"),
    ("Invoice/PaymentMeans/PayeeFinancialAccount/Name", Slot::Account, "BT-85"),
    // Totals
    ("Invoice/TaxTotal/TaxAmount", Slot::Singular("BG-22"), "BT-110"),
    ("Invoice/LegalMonetaryTotal/LineExtensionAmount", Slot::Singular("BG-22"), "BT-106"),
    ("Invoice/LegalMonetaryTotal/TaxExclusiveAmount", Slot::Singular("BG-22"), "BT-109"),
    ("Invoice/LegalMonetaryTotal/TaxInclusiveAmount", Slot::Singular("BG-22"), "BT-112"),
    ("Invoice/LegalMonetaryTotal/AllowanceTotalAmount", Slot::Singular("BG-22"), "BT-107"),
    ("Invoice/LegalMonetaryTotal/ChargeTotalAmount", Slot::Singular("BG-22"), "BT-108"),
    ("Invoice/LegalMonetaryTotal/PrepaidAmount", Slot::Singular("BG-22"), "BT-113"),
    ("Invoice/LegalMonetaryTotal/PayableRoundingAmount", Slot::Singular("BG-22"), "BT-114"),
    ("Invoice/LegalMonetaryTotal/PayableAmount", Slot::Singular("BG-22"), "BT-115"),
    // VAT breakdown
    ("Invoice/TaxTotal/TaxSubtotal/TaxableAmount", Slot::Subtotal, "BT-116"),
    ("Invoice/TaxTotal/TaxSubtotal/TaxAmount", Slot::Subtotal, "BT-117"),
    ("Invoice/TaxTotal/TaxSubtotal/TaxCategory/ID", Slot::Subtotal, "BT-118"),
    ("Invoice/TaxTotal/TaxSubtotal/TaxCategory/Percent", Slot::Subtotal, "BT-119"),
    ("Invoice/TaxTotal/TaxSubtotal/TaxCategory/TaxExemptionReason", Slot::Subtotal, "BT-120"),
    ("Invoice/TaxTotal/TaxSubtotal/TaxCategory/TaxExemptionReasonCode", Slot::Subtotal, "BT-121"),
    // Lines
    ("Invoice/InvoiceLine/ID", Slot::Line, "BT-126"),
    ("Invoice/InvoiceLine/Note", Slot::Line, "BT-127"),
    ("Invoice/InvoiceLine/InvoicedQuantity", Slot::Line, "BT-129"),
    ("Invoice/InvoiceLine/LineExtensionAmount", Slot::Line, "BT-131"),
    ("Invoice/InvoiceLine/Item/Description", Slot::Line, "BT-154"),
    ("Invoice/InvoiceLine/Item/Name", Slot::Line, "BT-153"),
    ("Invoice/InvoiceLine/Item/SellersItemIdentification/ID", Slot::Line, "BT-155"),
    ("Invoice/InvoiceLine/Item/ClassifiedTaxCategory/ID", Slot::Line, "BT-151"),
    ("Invoice/InvoiceLine/Item/ClassifiedTaxCategory/Percent", Slot::Line, "BT-152"),
    ("Invoice/InvoiceLine/Price/PriceAmount", Slot::Line, "BT-146"),
    ("Invoice/InvoiceLine/Price/BaseQuantity", Slot::Line, "BT-149"),
];

/// Document level allowance/charge children and their (allowance, charge)
/// terms.
const ALLOWANCE_CHARGE_FIELDS: &[(&str, &str, &str)] = &[
    ("AllowanceChargeReasonCode", "BT-98", "BT-105"),
    ("AllowanceChargeReason", "BT-97", "BT-104"),
    ("MultiplierFactorNumeric", "BT-94", "BT-101"),
    ("Amount", "BT-92", "BT-99"),
    ("BaseAmount", "BT-93", "BT-100"),
    ("TaxCategory/ID", "BT-95", "BT-102"),
    ("TaxCategory/Percent", "BT-96", "BT-103"),
];

/// Parse a UBL Invoice back into a BT store.
///
/// Only the elements the Basic profile binds are read; anything else is
/// skipped.
pub fn from_ubl_xml(xml: &str, registry: &BtRegistry) -> Result<InvoiceDocument, BelegError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut state = UblReader::new(registry);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => state.start(e)?,
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| BelegError::Xml(format!("parse error: {err}")))?;
                if !text.is_empty() {
                    state.text(&text)?;
                }
            }
            Ok(Event::End(_)) => state.end()?,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(BelegError::Xml(format!(
                    "parse error at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }

    if !state.saw_invoice {
        return Err(BelegError::Xml("document element is not a UBL Invoice".into()));
    }
    Ok(state.doc)
}

/// An allowance or charge whose kind is only known once its
/// `ChargeIndicator` has been read.
#[derive(Debug, Default)]
struct PendingAllowanceCharge {
    is_charge: bool,
    fields: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct PendingTaxScheme {
    company_id: Option<String>,
    scheme: Option<String>,
}

struct UblReader<'r> {
    registry: &'r BtRegistry,
    doc: InvoiceDocument,
    path: Vec<String>,
    saw_invoice: bool,
    line: Option<GroupId>,
    subtotal: Option<GroupId>,
    account: Option<GroupId>,
    allowance_charge: Option<PendingAllowanceCharge>,
    tax_scheme: Option<PendingTaxScheme>,
}

impl<'r> UblReader<'r> {
    fn new(registry: &'r BtRegistry) -> Self {
        Self {
            registry,
            doc: InvoiceDocument::new(),
            path: Vec::new(),
            saw_invoice: false,
            line: None,
            subtotal: None,
            account: None,
            allowance_charge: None,
            tax_scheme: None,
        }
    }

    fn joined(&self) -> String {
        self.path.join("/")
    }

    fn start(&mut self, e: &BytesStart<'_>) -> Result<(), BelegError> {
        let name = local_name(e.local_name().as_ref())?;
        if self.path.is_empty() {
            if name != "Invoice" {
                return Err(BelegError::Xml(format!(
                    "document element is <{name}>, expected <Invoice>"
                )));
            }
            self.saw_invoice = true;
        }
        let parent = self.joined();
        let root = self.doc.root();

        match (parent.as_str(), name.as_str()) {
            ("Invoice", "InvoiceLine") => {
                self.line = Some(self.doc.push_group(self.registry, root, "BG-25")?);
            }
            ("Invoice/TaxTotal", "TaxSubtotal") => {
                self.subtotal = Some(self.doc.push_group(self.registry, root, "BG-23")?);
            }
            ("Invoice/PaymentMeans", "PayeeFinancialAccount") => {
                let means = self.doc.ensure_singular(self.registry, "BG-16")?;
                self.account = Some(self.doc.push_group(self.registry, means, "BG-17")?);
            }
            ("Invoice", "AllowanceCharge") | ("Invoice/InvoiceLine", "AllowanceCharge") => {
                self.allowance_charge = Some(PendingAllowanceCharge::default());
            }
            (_, "PartyTaxScheme") => {
                self.tax_scheme = Some(PendingTaxScheme::default());
            }
            ("Invoice/InvoiceLine", "InvoicedQuantity") => {
                for attr in e.attributes().flatten() {
                    if attr.key.local_name().as_ref() == b"unitCode" {
                        let unit = attr
                            .unescape_value()
                            .map_err(|err| BelegError::Xml(format!("bad unitCode: {err}")))?;
                        if let Some(line) = self.line {
                            self.put(line, "BT-130", &unit)?;
                        }
                    }
                }
            }
            _ => {}
        }

        self.path.push(name);
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), BelegError> {
        let path = self.joined();

        if let Some(pending) = self.allowance_charge.as_mut() {
            let relative = path
                .strip_prefix("Invoice/InvoiceLine/AllowanceCharge/")
                .or_else(|| path.strip_prefix("Invoice/AllowanceCharge/"));
            if let Some(relative) = relative {
                if relative == "ChargeIndicator" {
                    pending.is_charge = text.eq_ignore_ascii_case("true");
                } else {
                    pending.fields.push((relative.to_string(), text.to_string()));
                }
                return Ok(());
            }
        }

        if let Some(pending) = self.tax_scheme.as_mut() {
            if path.ends_with("/PartyTaxScheme/CompanyID") {
                pending.company_id = Some(text.to_string());
                return Ok(());
            }
            if path.ends_with("/PartyTaxScheme/TaxScheme/ID") {
                pending.scheme = Some(text.to_string());
                return Ok(());
            }
        }

        let Some(&(_, slot, bt)) = BINDINGS.iter().find(|(p, _, _)| *p == path) else {
            return Ok(());
        };
        let group = match slot {
            Slot::Root => Some(self.doc.root()),
            Slot::Singular(code) => Some(self.doc.ensure_singular(self.registry, code)?),
            Slot::Line => self.line,
            Slot::Subtotal => self.subtotal,
            Slot::Account => self.account,
        };
        match group {
            Some(group) => self.put(group, bt, text),
            None => Ok(()),
        }
    }

    fn end(&mut self) -> Result<(), BelegError> {
        let parent_is_line = self.path.len() == 3 && self.path[1] == "InvoiceLine";
        let ended = self.path.pop().unwrap_or_default();
        match ended.as_str() {
            "InvoiceLine" => self.line = None,
            "TaxSubtotal" => self.subtotal = None,
            "PayeeFinancialAccount" => self.account = None,
            "AllowanceCharge" => {
                if let Some(pending) = self.allowance_charge.take() {
                    if parent_is_line {
                        self.finish_line_allowance_charge(pending)?;
                    } else if self.path.len() == 1 {
                        self.finish_allowance_charge(pending)?;
                    }
                }
            }
            "PartyTaxScheme" => {
                if let Some(pending) = self.tax_scheme.take() {
                    self.finish_tax_scheme(pending)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish_allowance_charge(&mut self, pending: PendingAllowanceCharge) -> Result<(), BelegError> {
        let root = self.doc.root();
        let code = if pending.is_charge { "BG-21" } else { "BG-20" };
        let group = self.doc.push_group(self.registry, root, code)?;
        for (relative, text) in &pending.fields {
            let bt = ALLOWANCE_CHARGE_FIELDS
                .iter()
                .find(|(field, _, _)| field == relative)
                .map(|(_, allowance, charge)| if pending.is_charge { *charge } else { *allowance });
            if let Some(bt) = bt {
                self.put(group, bt, text)?;
            }
        }
        Ok(())
    }

    fn finish_line_allowance_charge(
        &mut self,
        pending: PendingAllowanceCharge,
    ) -> Result<(), BelegError> {
        let Some(line) = self.line else {
            return Ok(());
        };
        let bt = if pending.is_charge { "BT-141" } else { "BT-136" };
        if let Some((_, amount)) = pending.fields.iter().find(|(field, _)| field == "Amount") {
            self.put(line, bt, amount)?;
        }
        Ok(())
    }

    fn finish_tax_scheme(&mut self, pending: PendingTaxScheme) -> Result<(), BelegError> {
        let Some(company_id) = pending.company_id else {
            return Ok(());
        };
        let is_vat = pending.scheme.as_deref().is_none_or(|s| s == "VAT");
        let party = self.path.get(1).map(String::as_str);
        let (group, bt) = match (party, is_vat) {
            (Some("AccountingSupplierParty"), true) => ("BG-4", "BT-31"),
            (Some("AccountingSupplierParty"), false) => ("BG-4", "BT-32"),
            (Some("AccountingCustomerParty"), true) => ("BG-7", "BT-48"),
            _ => return Ok(()),
        };
        let group = self.doc.ensure_singular(self.registry, group)?;
        self.put(group, bt, &company_id)
    }

    /// Parse `text` as the registry type of `bt` and store it.
    fn put(&mut self, group: GroupId, bt: &str, text: &str) -> Result<(), BelegError> {
        let spec = self
            .registry
            .term(bt)
            .ok_or_else(|| BelegError::Xml(format!("{bt} is not in the registry")))?;
        let value = match spec.data_type {
            DataType::Text | DataType::Identifier => BtValue::Text(text.to_string()),
            DataType::Code => BtValue::Code(text.to_string()),
            DataType::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(BtValue::Date)
                .map_err(|e| BelegError::Xml(format!("{bt}: invalid date {text:?}: {e}")))?,
            DataType::Amount | DataType::UnitPrice | DataType::Quantity | DataType::Percentage => {
                Decimal::from_str(text)
                    .map(BtValue::Decimal)
                    .map_err(|e| BelegError::Xml(format!("{bt}: invalid number {text:?}: {e}")))?
            }
        };
        let provenance = Provenance {
            source_path: Some(format!("/{}", self.joined())),
            ..Provenance::default()
        };
        self.doc
            .insert(self.registry, group, bt, value, provenance)?;
        Ok(())
    }
}

fn local_name(bytes: &[u8]) -> Result<String, BelegError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| BelegError::Xml(format!("element name is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_other_document_types() {
        let registry = BtRegistry::en16931_basic();
        let xml = r#"<?xml version="1.0"?><CreditNote><ID>1</ID></CreditNote>"#;
        assert!(matches!(from_ubl_xml(xml, &registry), Err(BelegError::Xml(_))));
    }

    #[test]
    fn reads_allowance_after_indicator() {
        let registry = BtRegistry::en16931_basic();
        let xml = r#"<Invoice>
            <AllowanceCharge>
              <ChargeIndicator>true</ChargeIndicator>
              <AllowanceChargeReason>Freight</AllowanceChargeReason>
              <Amount currencyID="EUR">5.00</Amount>
              <TaxCategory><ID>S</ID><Percent>19</Percent></TaxCategory>
            </AllowanceCharge>
        </Invoice>"#;
        let doc = from_ubl_xml(xml, &registry).unwrap();
        let charge = doc.instances("BG-21").next().unwrap();
        assert_eq!(doc.text(charge, "BT-104"), Some("Freight"));
        assert_eq!(doc.text(charge, "BT-102"), Some("S"));
        assert_eq!(doc.instances("BG-20").count(), 0);
    }

    #[test]
    fn tax_number_goes_to_bt_32() {
        let registry = BtRegistry::en16931_basic();
        let xml = r#"<Invoice><AccountingSupplierParty><Party>
            <PartyTaxScheme><CompanyID>201/113/40209</CompanyID><TaxScheme><ID>FC</ID></TaxScheme></PartyTaxScheme>
        </Party></AccountingSupplierParty></Invoice>"#;
        let doc = from_ubl_xml(xml, &registry).unwrap();
        assert_eq!(
            doc.singular_value(&registry, "BT-32"),
            Some(&BtValue::Text("201/113/40209".into()))
        );
        assert!(doc.singular_value(&registry, "BT-31").is_none());
    }
}
