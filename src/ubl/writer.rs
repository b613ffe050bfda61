use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use rust_decimal::Decimal;

use super::ubl_ns;
use crate::core::{BelegError, BtRegistry, GroupId, InvoiceDocument, Violation};

/// Serialize a corrected document as an EN 16931 Basic UBL 2.1 Invoice.
///
/// Refuses with [`BelegError::SerializationRefused`] while `violations`
/// holds anything FATAL or ERROR. Warnings do not block.
pub fn to_ubl_xml(
    doc: &InvoiceDocument,
    violations: &[Violation],
    registry: &BtRegistry,
) -> Result<String, BelegError> {
    let blocking: Vec<Violation> = violations
        .iter()
        .filter(|v| v.severity.is_blocking())
        .cloned()
        .collect();
    if !blocking.is_empty() {
        return Err(BelegError::SerializationRefused {
            violations: blocking,
        });
    }

    let currency = doc
        .singular_value(registry, "BT-5")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BelegError::Xml("invoice currency code (BT-5) is missing".into()))?;

    let mut ubl = UblWriter {
        xml: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        doc,
        currency,
    };
    ubl.emit(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    ubl.invoice(registry)?;
    String::from_utf8(ubl.xml.into_inner().into_inner())
        .map_err(|e| BelegError::Xml(format!("UTF-8 error: {e}")))
}

/// Amounts and quantities carry at least two fraction digits and no
/// trailing zeros beyond that.
fn format_decimal(d: Decimal) -> String {
    let s = d.normalize().to_string();
    match s.find('.') {
        Some(dot) if s.len() - dot - 1 < 2 => format!("{s}{}", "0".repeat(2 - (s.len() - dot - 1))),
        Some(_) => s,
        None => format!("{s}.00"),
    }
}

struct UblWriter<'a> {
    xml: Writer<Cursor<Vec<u8>>>,
    doc: &'a InvoiceDocument,
    /// BT-5, stamped on every amount.
    currency: &'a str,
}

impl<'a> UblWriter<'a> {
    fn emit(&mut self, event: Event<'_>) -> Result<(), BelegError> {
        self.xml
            .write_event(event)
            .map_err(|e| BelegError::Xml(format!("write error: {e}")))
    }

    fn open(&mut self, name: &str) -> Result<(), BelegError> {
        self.open_with(name, &[])
    }

    fn open_with(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), BelegError> {
        let mut start = BytesStart::new(name);
        for &attr in attrs {
            start.push_attribute(attr);
        }
        self.emit(Event::Start(start))
    }

    fn close(&mut self, name: &str) -> Result<(), BelegError> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    fn leaf(&mut self, name: &str, text: &str) -> Result<(), BelegError> {
        self.leaf_with(name, text, &[])
    }

    fn leaf_with(&mut self, name: &str, text: &str, attrs: &[(&str, &str)]) -> Result<(), BelegError> {
        self.open_with(name, attrs)?;
        self.emit(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    fn has(&self, group: Option<GroupId>, bt: &str) -> bool {
        group.is_some_and(|g| self.doc.get(g, bt).is_some())
    }

    fn decimal(&self, group: Option<GroupId>, bt: &str) -> Option<Decimal> {
        group.and_then(|g| self.doc.decimal(g, bt))
    }

    fn text(&mut self, element: &str, group: Option<GroupId>, bt: &str) -> Result<(), BelegError> {
        let doc = self.doc;
        if let Some(value) = group.and_then(|g| doc.value(g, bt)) {
            self.leaf(element, &value.to_string())?;
        }
        Ok(())
    }

    fn amount(&mut self, element: &str, group: Option<GroupId>, bt: &str) -> Result<(), BelegError> {
        if let Some(amount) = self.decimal(group, bt) {
            let currency = self.currency;
            self.leaf_with(element, &format_decimal(amount), &[("currencyID", currency)])?;
        }
        Ok(())
    }

    fn percent(&mut self, element: &str, group: Option<GroupId>, bt: &str) -> Result<(), BelegError> {
        if let Some(rate) = self.decimal(group, bt) {
            self.leaf(element, &format_decimal(rate))?;
        }
        Ok(())
    }

    /// Quantity with the line's unit of measure (BT-130) when known.
    fn quantity(&mut self, element: &str, value: Decimal, unit: Option<&str>) -> Result<(), BelegError> {
        match unit {
            Some(unit) => self.leaf_with(element, &format_decimal(value), &[("unitCode", unit)]),
            None => self.leaf(element, &format_decimal(value)),
        }
    }

    fn tax_scheme(&mut self, scheme: &str) -> Result<(), BelegError> {
        self.open("cac:TaxScheme")?;
        self.leaf("cbc:ID", scheme)?;
        self.close("cac:TaxScheme")?;
        Ok(())
    }

    fn invoice(&mut self, registry: &BtRegistry) -> Result<(), BelegError> {
        let doc = self.doc;
        let root = Some(doc.root());

        self.open_with(
            "ubl:Invoice",
            &[
                ("xmlns:ubl", ubl_ns::INVOICE),
                ("xmlns:cac", ubl_ns::CAC),
                ("xmlns:cbc", ubl_ns::CBC),
            ],
        )?;

        // BT-24: Specification identifier
        self.text("cbc:CustomizationID", root, "BT-24")?;
        // BT-1: Invoice number
        self.text("cbc:ID", root, "BT-1")?;
        // BT-2: Issue date
        self.text("cbc:IssueDate", root, "BT-2")?;
        // BT-9: Due date
        self.text("cbc:DueDate", root, "BT-9")?;
        // BT-3: Invoice type code
        self.text("cbc:InvoiceTypeCode", root, "BT-3")?;
        // BT-22: Note
        self.text("cbc:Note", root, "BT-22")?;
        // BT-5: Currency
        self.text("cbc:DocumentCurrencyCode", root, "BT-5")?;
        // BT-10: Buyer reference
        self.text("cbc:BuyerReference", root, "BT-10")?;

        // BT-73/74: Invoicing period
        if self.has(root, "BT-73") || self.has(root, "BT-74") {
            self.open("cac:InvoicePeriod")?;
            self.text("cbc:StartDate", root, "BT-73")?;
            self.text("cbc:EndDate", root, "BT-74")?;
            self.close("cac:InvoicePeriod")?;
        }

        // BT-13: Purchase order reference
        if self.has(root, "BT-13") {
            self.open("cac:OrderReference")?;
            self.text("cbc:ID", root, "BT-13")?;
            self.close("cac:OrderReference")?;
        }

        self.seller(registry)?;
        self.buyer(registry)?;

        // BT-72: Actual delivery date
        if self.has(root, "BT-72") {
            self.open("cac:Delivery")?;
            self.text("cbc:ActualDeliveryDate", root, "BT-72")?;
            self.close("cac:Delivery")?;
        }

        self.payment(registry)?;

        // BT-20: Payment terms
        if self.has(root, "BT-20") {
            self.open("cac:PaymentTerms")?;
            self.text("cbc:Note", root, "BT-20")?;
            self.close("cac:PaymentTerms")?;
        }

        // BG-20/21: Document level allowances, then charges
        for group in doc.children_of(doc.root(), "BG-20") {
            self.allowance_charge(group, false)?;
        }
        for group in doc.children_of(doc.root(), "BG-21") {
            self.allowance_charge(group, true)?;
        }

        self.tax_total(registry)?;
        self.monetary_total(registry)?;

        for line in doc.children_of(doc.root(), "BG-25") {
            self.line(line)?;
        }

        self.close("ubl:Invoice")?;
        Ok(())
    }

    fn seller(&mut self, registry: &BtRegistry) -> Result<(), BelegError> {
        let party = self.doc.find_singular(registry, "BG-4");
        let address = self.doc.find_singular(registry, "BG-5");

        self.open("cac:AccountingSupplierParty")?;
        self.open("cac:Party")?;
        // BT-34: Electronic address
        self.endpoint(party, "BT-34")?;
        // BG-5: Postal address
        self.address(address, ["BT-35", "BT-36", "BT-37", "BT-38", "BT-39", "BT-40"])?;
        // BT-31: VAT identifier
        self.party_tax_scheme(party, "BT-31", "VAT")?;
        // BT-32: Tax registration identifier
        self.party_tax_scheme(party, "BT-32", "FC")?;
        // BT-27/30: Legal entity
        self.open("cac:PartyLegalEntity")?;
        self.text("cbc:RegistrationName", party, "BT-27")?;
        self.text("cbc:CompanyID", party, "BT-30")?;
        self.close("cac:PartyLegalEntity")?;
        self.close("cac:Party")?;
        self.close("cac:AccountingSupplierParty")?;
        Ok(())
    }

    fn buyer(&mut self, registry: &BtRegistry) -> Result<(), BelegError> {
        let party = self.doc.find_singular(registry, "BG-7");
        let address = self.doc.find_singular(registry, "BG-8");

        self.open("cac:AccountingCustomerParty")?;
        self.open("cac:Party")?;
        // BT-49: Electronic address
        self.endpoint(party, "BT-49")?;
        // BG-8: Postal address
        self.address(address, ["BT-50", "BT-51", "BT-52", "BT-53", "BT-54", "BT-55"])?;
        // BT-48: VAT identifier
        self.party_tax_scheme(party, "BT-48", "VAT")?;
        // BT-44: Legal entity
        self.open("cac:PartyLegalEntity")?;
        self.text("cbc:RegistrationName", party, "BT-44")?;
        self.close("cac:PartyLegalEntity")?;
        self.close("cac:Party")?;
        self.close("cac:AccountingCustomerParty")?;
        Ok(())
    }

    fn endpoint(&mut self, party: Option<GroupId>, bt: &str) -> Result<(), BelegError> {
        let doc = self.doc;
        let Some(address) = party.and_then(|g| doc.text(g, bt)) else {
            return Ok(());
        };
        if address.contains('@') {
            self.leaf_with("cbc:EndpointID", address, &[("schemeID", "EM")])?;
        } else {
            self.leaf("cbc:EndpointID", address)?;
        }
        Ok(())
    }

    /// Street, additional street, city, post code, subdivision, country.
    fn address(&mut self, group: Option<GroupId>, bts: [&str; 6]) -> Result<(), BelegError> {
        let [street, additional, city, post_code, subdivision, country] = bts;
        self.open("cac:PostalAddress")?;
        self.text("cbc:StreetName", group, street)?;
        self.text("cbc:AdditionalStreetName", group, additional)?;
        self.text("cbc:CityName", group, city)?;
        self.text("cbc:PostalZone", group, post_code)?;
        self.text("cbc:CountrySubentity", group, subdivision)?;
        if self.has(group, country) {
            self.open("cac:Country")?;
            self.text("cbc:IdentificationCode", group, country)?;
            self.close("cac:Country")?;
        }
        self.close("cac:PostalAddress")?;
        Ok(())
    }

    fn party_tax_scheme(
        &mut self,
        party: Option<GroupId>,
        bt: &str,
        scheme: &str,
    ) -> Result<(), BelegError> {
        if !self.has(party, bt) {
            return Ok(());
        }
        self.open("cac:PartyTaxScheme")?;
        self.text("cbc:CompanyID", party, bt)?;
        self.tax_scheme(scheme)?;
        self.close("cac:PartyTaxScheme")?;
        Ok(())
    }

    /// One `PaymentMeans` per credit transfer account; BT-81/83 repeat.
    fn payment(&mut self, registry: &BtRegistry) -> Result<(), BelegError> {
        let Some(instructions) = self.doc.find_singular(registry, "BG-16") else {
            return Ok(());
        };
        let accounts: Vec<GroupId> = self.doc.children_of(instructions, "BG-17").collect();
        let means = Some(instructions);

        let write_means = |ubl: &mut Self, account: Option<GroupId>| -> Result<(), BelegError> {
            ubl.open("cac:PaymentMeans")?;
            // BT-81: Payment means code
            ubl.text("cbc:PaymentMeansCode", means, "BT-81")?;
            // BT-83: Remittance information
            ubl.text("cbc:PaymentID", means, "BT-83")?;
            // BG-17: Credit transfer
            if account.is_some() {
                ubl.open("cac:PayeeFinancialAccount")?;
                ubl.text("cbc:ID", account, "BT-84")?;
                ubl.text("cbc:Name", account, "BT-85")?;
                ubl.close("cac:PayeeFinancialAccount")?;
            }
            ubl.close("cac:PaymentMeans")?;
            Ok(())
        };

        if accounts.is_empty() {
            write_means(self, None)?;
        }
        for account in accounts {
            write_means(self, Some(account))?;
        }
        Ok(())
    }

    fn allowance_charge(&mut self, group: GroupId, is_charge: bool) -> Result<(), BelegError> {
        let g = Some(group);
        // Allowance BTs 92..98, charge BTs 99..105, same layout.
        let [amount, base, percentage, category, rate, reason, reason_code] = if is_charge {
            ["BT-99", "BT-100", "BT-101", "BT-102", "BT-103", "BT-104", "BT-105"]
        } else {
            ["BT-92", "BT-93", "BT-94", "BT-95", "BT-96", "BT-97", "BT-98"]
        };

        self.open("cac:AllowanceCharge")?;
        self.leaf("cbc:ChargeIndicator", if is_charge { "true" } else { "false" })?;
        self.text("cbc:AllowanceChargeReasonCode", g, reason_code)?;
        self.text("cbc:AllowanceChargeReason", g, reason)?;
        self.percent("cbc:MultiplierFactorNumeric", g, percentage)?;
        self.amount("cbc:Amount", g, amount)?;
        self.amount("cbc:BaseAmount", g, base)?;
        self.open("cac:TaxCategory")?;
        self.text("cbc:ID", g, category)?;
        self.percent("cbc:Percent", g, rate)?;
        self.tax_scheme("VAT")?;
        self.close("cac:TaxCategory")?;
        self.close("cac:AllowanceCharge")?;
        Ok(())
    }

    fn tax_total(&mut self, registry: &BtRegistry) -> Result<(), BelegError> {
        let doc = self.doc;
        let totals = doc.find_singular(registry, "BG-22");

        self.open("cac:TaxTotal")?;
        // BT-110: Total VAT amount
        self.amount("cbc:TaxAmount", totals, "BT-110")?;
        // BG-23: VAT breakdown
        for subtotal in doc.children_of(doc.root(), "BG-23") {
            let g = Some(subtotal);
            self.open("cac:TaxSubtotal")?;
            self.amount("cbc:TaxableAmount", g, "BT-116")?;
            self.amount("cbc:TaxAmount", g, "BT-117")?;
            self.open("cac:TaxCategory")?;
            self.text("cbc:ID", g, "BT-118")?;
            self.percent("cbc:Percent", g, "BT-119")?;
            self.text("cbc:TaxExemptionReasonCode", g, "BT-121")?;
            self.text("cbc:TaxExemptionReason", g, "BT-120")?;
            self.tax_scheme("VAT")?;
            self.close("cac:TaxCategory")?;
            self.close("cac:TaxSubtotal")?;
        }
        self.close("cac:TaxTotal")?;
        Ok(())
    }

    fn monetary_total(&mut self, registry: &BtRegistry) -> Result<(), BelegError> {
        let totals = self.doc.find_singular(registry, "BG-22");
        self.open("cac:LegalMonetaryTotal")?;
        self.amount("cbc:LineExtensionAmount", totals, "BT-106")?;
        self.amount("cbc:TaxExclusiveAmount", totals, "BT-109")?;
        self.amount("cbc:TaxInclusiveAmount", totals, "BT-112")?;
        self.amount("cbc:AllowanceTotalAmount", totals, "BT-107")?;
        self.amount("cbc:ChargeTotalAmount", totals, "BT-108")?;
        self.amount("cbc:PrepaidAmount", totals, "BT-113")?;
        self.amount("cbc:PayableRoundingAmount", totals, "BT-114")?;
        self.amount("cbc:PayableAmount", totals, "BT-115")?;
        self.close("cac:LegalMonetaryTotal")?;
        Ok(())
    }

    fn line(&mut self, line: GroupId) -> Result<(), BelegError> {
        let g = Some(line);
        let doc = self.doc;
        let unit = doc.text(line, "BT-130");

        self.open("cac:InvoiceLine")?;
        // BT-126: Line ID
        self.text("cbc:ID", g, "BT-126")?;
        // BT-127: Line note
        self.text("cbc:Note", g, "BT-127")?;
        // BT-129/130: Quantity with unit
        if let Some(quantity) = self.decimal(g, "BT-129") {
            self.quantity("cbc:InvoicedQuantity", quantity, unit)?;
        }
        // BT-131: Line net amount
        self.amount("cbc:LineExtensionAmount", g, "BT-131")?;

        // BT-136/141: Line allowance and charge
        for (bt, is_charge) in [("BT-136", false), ("BT-141", true)] {
            if self.has(g, bt) {
                self.open("cac:AllowanceCharge")?;
                self.leaf("cbc:ChargeIndicator", if is_charge { "true" } else { "false" })?;
                self.amount("cbc:Amount", g, bt)?;
                self.close("cac:AllowanceCharge")?;
            }
        }

        self.open("cac:Item")?;
        self.text("cbc:Description", g, "BT-154")?;
        self.text("cbc:Name", g, "BT-153")?;
        // BT-155: Seller's item identifier
        if self.has(g, "BT-155") {
            self.open("cac:SellersItemIdentification")?;
            self.text("cbc:ID", g, "BT-155")?;
            self.close("cac:SellersItemIdentification")?;
        }
        // BT-151/152: Line VAT category
        self.open("cac:ClassifiedTaxCategory")?;
        self.text("cbc:ID", g, "BT-151")?;
        self.percent("cbc:Percent", g, "BT-152")?;
        self.tax_scheme("VAT")?;
        self.close("cac:ClassifiedTaxCategory")?;
        self.close("cac:Item")?;

        // BT-146/149: Price details
        self.open("cac:Price")?;
        self.amount("cbc:PriceAmount", g, "BT-146")?;
        if let Some(base) = self.decimal(g, "BT-149") {
            self.quantity("cbc:BaseQuantity", base, unit)?;
        }
        self.close("cac:Price")?;

        self.close("cac:InvoiceLine")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decimals_keep_two_places() {
        assert_eq!(format_decimal(dec!(30)), "30.00");
        assert_eq!(format_decimal(dec!(12.5)), "12.50");
        assert_eq!(format_decimal(dec!(10.0000)), "10.00");
        assert_eq!(format_decimal(dec!(0.125)), "0.125");
        assert_eq!(format_decimal(dec!(-3.10)), "-3.10");
        assert_eq!(format_decimal(dec!(0)), "0.00");
    }
}
