//! The field mapper: raw extraction output → BT store.
//!
//! A declarative [`MappingTable`] names which raw field feeds which business
//! term and how its text is coerced. Problems with single fields become
//! violations; mapping always carries on with the remaining fields.

mod coerce;
mod gross;
mod raw;

use serde::{Deserialize, Serialize};

pub use coerce::{
    clean_identifier, clean_text, compact_identifier, parse_date, parse_decimal, parse_percent,
};
pub use gross::GROSS_LINES_RULE;
pub use raw::{RawExtraction, RawField, RawRecord, RawValue};

use super::config::ProcessingConfig;
use super::error::BelegError;
use super::registry::BtRegistry;
use super::report::{Correction, Violation};
use super::store::{GroupId, InvoiceDocument, Provenance};
use super::value::{BtValue, DataType};

/// Rule id of violations for values that could not be coerced.
pub const COERCION_RULE: &str = "MAP-COERCE";

/// Rule id of violations for coerced values the store refused.
pub const STORE_RULE: &str = "MAP-STORE";

/// Which part of a [`RawExtraction`] a mapping reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Header,
    Line,
    Allowance,
    Charge,
}

impl Scope {
    /// Business group a record of this scope becomes; `None` for the header,
    /// whose terms go to whichever group owns them.
    pub fn group(&self) -> Option<&'static str> {
        match self {
            Self::Header => None,
            Self::Line => Some("BG-25"),
            Self::Allowance => Some("BG-20"),
            Self::Charge => Some("BG-21"),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Header => "fields",
            Self::Line => "lines",
            Self::Allowance => "allowances",
            Self::Charge => "charges",
        }
    }
}

/// How raw text becomes a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coercion {
    /// Trimmed text.
    Text,
    /// Trimmed identifier, repeated tokens collapsed.
    Identifier,
    /// Identifier without whitespace, upper-cased (VAT ids, IBANs).
    CompactIdentifier,
    /// Locale-tolerant decimal.
    Decimal,
    /// Decimal with an optional `%`.
    Percent,
    Date,
    /// Normalized against the term's codelist.
    Code,
}

impl Coercion {
    /// The natural coercion for a registry data type.
    pub fn for_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Text => Self::Text,
            DataType::Identifier => Self::Identifier,
            DataType::Amount | DataType::UnitPrice | DataType::Quantity => Self::Decimal,
            DataType::Percentage => Self::Percent,
            DataType::Date => Self::Date,
            DataType::Code => Self::Code,
        }
    }

    /// Whether values produced by this coercion fit `data_type`.
    pub fn fits(&self, data_type: DataType) -> bool {
        match self {
            Self::Text => data_type == DataType::Text,
            Self::Identifier | Self::CompactIdentifier => {
                matches!(data_type, DataType::Identifier | DataType::Text)
            }
            Self::Decimal | Self::Percent => data_type.is_numeric(),
            Self::Date => data_type == DataType::Date,
            Self::Code => data_type == DataType::Code,
        }
    }
}

/// One row of the mapping table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub scope: Scope,
    /// Raw field name as delivered by the extraction service.
    pub field: String,
    pub bt: String,
    pub coercion: Coercion,
}

impl FieldMapping {
    pub fn new(scope: Scope, field: impl Into<String>, bt: impl Into<String>, coercion: Coercion) -> Self {
        Self {
            scope,
            field: field.into(),
            bt: bt.into(),
            coercion,
        }
    }
}

/// Declarative raw field → BT table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingTable {
    entries: Vec<FieldMapping>,
}

impl MappingTable {
    pub fn new(entries: Vec<FieldMapping>) -> Self {
        Self { entries }
    }

    /// Field names of the Azure Document Intelligence prebuilt invoice
    /// model. Address and payment sub-fields are flattened with a dot.
    pub fn azure_invoice() -> Self {
        let entries = AZURE_INVOICE
            .iter()
            .map(|(scope, field, bt, coercion)| FieldMapping::new(*scope, *field, *bt, *coercion))
            .collect();
        Self { entries }
    }

    /// Add or replace the mapping for `(scope, field)`.
    pub fn with(mut self, mapping: FieldMapping) -> Self {
        self.entries
            .retain(|e| !(e.scope == mapping.scope && e.field == mapping.field));
        self.entries.push(mapping);
        self
    }

    pub fn entries(&self) -> &[FieldMapping] {
        &self.entries
    }

    pub fn lookup(&self, scope: Scope, field: &str) -> Option<&FieldMapping> {
        self.entries
            .iter()
            .find(|e| e.scope == scope && e.field == field)
    }

    /// Check every row against the registry: the BT exists, its type fits
    /// the coercion and its group fits the scope.
    pub fn check(&self, registry: &BtRegistry) -> Result<(), BelegError> {
        for entry in &self.entries {
            let spec = registry.term(&entry.bt).ok_or_else(|| {
                BelegError::Config(format!(
                    "mapping for field '{}' refers to unknown {}",
                    entry.field, entry.bt
                ))
            })?;
            if !entry.coercion.fits(spec.data_type) {
                return Err(BelegError::Config(format!(
                    "coercion {:?} cannot produce {} ({:?})",
                    entry.coercion, entry.bt, spec.data_type
                )));
            }
            if !scope_fits(entry.scope, &spec.group) {
                return Err(BelegError::Config(format!(
                    "{} belongs to {} and cannot be mapped from {:?} fields",
                    entry.bt, spec.group, entry.scope
                )));
            }
        }
        Ok(())
    }
}

fn scope_fits(scope: Scope, group: &str) -> bool {
    match scope.group() {
        Some(expected) => expected == group,
        None => ![Scope::Line, Scope::Allowance, Scope::Charge]
            .iter()
            .any(|s| s.group() == Some(group)),
    }
}

/// A registry BT code embedded in a raw field name, e.g. `"BT-1 Invoice
/// number"` → `"BT-1"`.
fn embedded_bt_code(field: &str) -> Option<String> {
    let upper = field.to_uppercase();
    let start = upper.find("BT-")?;
    let digits: String = upper[start + 3..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    (!digits.is_empty()).then(|| format!("BT-{digits}"))
}

/// Result of mapping one extraction.
#[derive(Debug, Clone)]
pub struct MappedDocument {
    pub document: InvoiceDocument,
    /// Coercion failures and codelist misses found while mapping.
    pub violations: Vec<Violation>,
    /// Gross line values converted to net.
    pub corrections: Vec<Correction>,
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::azure_invoice()
    }
}

/// Maps raw extraction output into a fresh [`InvoiceDocument`].
pub struct FieldMapper<'a> {
    config: &'a ProcessingConfig,
}

impl<'a> FieldMapper<'a> {
    pub fn new(config: &'a ProcessingConfig) -> Self {
        Self { config }
    }

    pub fn map(&self, raw: &RawExtraction) -> MappedDocument {
        let mut mapped = MappedDocument {
            document: InvoiceDocument::new(),
            violations: Vec::new(),
            corrections: Vec::new(),
        };

        self.map_record(&mut mapped, Scope::Header, None, &raw.fields);
        for (scope, records) in [
            (Scope::Line, &raw.lines),
            (Scope::Allowance, &raw.allowances),
            (Scope::Charge, &raw.charges),
        ] {
            for (index, record) in records.iter().enumerate() {
                if record.is_empty() {
                    continue;
                }
                self.map_record(&mut mapped, scope, Some(index), record);
            }
        }

        mapped.corrections = gross::net_from_gross(&mut mapped.document, self.config);

        tracing::debug!(
            terms = mapped.document.terms().count(),
            violations = mapped.violations.len(),
            corrections = mapped.corrections.len(),
            "extraction mapped"
        );
        mapped
    }

    fn map_record(
        &self,
        mapped: &mut MappedDocument,
        scope: Scope,
        index: Option<usize>,
        record: &RawRecord,
    ) {
        let registry = self.config.registry();
        let mut record_group = None;

        for (field, raw) in record.iter() {
            let source_path = match index {
                Some(i) => format!("{}[{i}].{field}", scope.label()),
                None => format!("{}.{field}", scope.label()),
            };
            let Some((bt, coercion)) = self.resolve(scope, field) else {
                tracing::trace!(%source_path, "unmapped field ignored");
                continue;
            };
            let Some(spec) = registry.term(&bt) else {
                continue;
            };

            let mut codelist_miss = None;
            let value = match self.coerce(&bt, coercion, &raw.value) {
                Coerced::Value(value) => value,
                Coerced::Empty => continue,
                Coerced::Failed(reason) => {
                    mapped.violations.push(Violation::fatal(
                        COERCION_RULE,
                        source_path,
                        format!("{bt}: {reason}"),
                    ));
                    continue;
                }
                Coerced::NotInCodelist { value, rule_id, list } => {
                    codelist_miss = Some((rule_id, format!("'{value}' is not a valid {list} code")));
                    BtValue::Code(value)
                }
            };

            let doc = &mut mapped.document;
            let placed = place(doc, registry, scope, &spec.group, &mut record_group).and_then(|group| {
                if let Some(existing) = doc.get(group, &bt) {
                    if existing.confidence.unwrap_or(1.0) >= raw.confidence.unwrap_or(1.0) {
                        tracing::trace!(%source_path, %bt, "field shadowed by earlier mapping");
                        return Ok(None);
                    }
                }
                doc.insert(
                    registry,
                    group,
                    &bt,
                    value,
                    Provenance {
                        source_path: Some(source_path.clone()),
                        confidence: raw.confidence,
                        written_by: None,
                    },
                )?;
                Ok(Some(group))
            });
            match placed {
                Ok(Some(group)) => {
                    if let Some((rule_id, message)) = codelist_miss {
                        let path = doc.term_path(group, &bt);
                        mapped.violations.push(Violation::error(rule_id, path, message));
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%source_path, %bt, error = %err, "field could not be stored");
                    mapped
                        .violations
                        .push(Violation::fatal(STORE_RULE, source_path, format!("{bt}: {err}")));
                }
            }
        }
    }

    /// Mapping row for a field, or the BT code embedded in its name.
    fn resolve(&self, scope: Scope, field: &str) -> Option<(String, Coercion)> {
        if let Some(entry) = self.config.mapping().lookup(scope, field) {
            return Some((entry.bt.clone(), entry.coercion));
        }
        let bt = embedded_bt_code(field)?;
        let spec = self.config.registry().term(&bt)?;
        scope_fits(scope, &spec.group).then(|| (bt, Coercion::for_type(spec.data_type)))
    }

    fn coerce(&self, bt: &str, coercion: Coercion, raw: &RawValue) -> Coerced {
        let text = match raw {
            RawValue::Text(text) => text.clone(),
            RawValue::Number(number) => match coercion {
                Coercion::Decimal | Coercion::Percent => {
                    return match coerce::within_range(*number) {
                        Some(number) => Coerced::Value(BtValue::Decimal(number)),
                        None => Coerced::Failed(format!("{number} is out of range")),
                    };
                }
                _ => number.to_string(),
            },
        };
        if text.trim().is_empty() {
            return Coerced::Empty;
        }

        let failed = |what: &str| Coerced::Failed(format!("'{}' is not a valid {what}", text.trim()));
        match coercion {
            Coercion::Text => clean_text(&text).map_or(Coerced::Empty, |t| Coerced::Value(BtValue::Text(t))),
            Coercion::Identifier => clean_identifier(&text)
                .map_or(Coerced::Empty, |t| Coerced::Value(BtValue::Text(t))),
            Coercion::CompactIdentifier => compact_identifier(&text)
                .map_or(Coerced::Empty, |t| Coerced::Value(BtValue::Text(t))),
            Coercion::Decimal => parse_decimal(&text)
                .map_or_else(|| failed("number"), |d| Coerced::Value(BtValue::Decimal(d))),
            Coercion::Percent => parse_percent(&text)
                .map_or_else(|| failed("percentage"), |d| Coerced::Value(BtValue::Decimal(d))),
            Coercion::Date => parse_date(&text)
                .map_or_else(|| failed("date"), |d| Coerced::Value(BtValue::Date(d))),
            Coercion::Code => {
                let Some(list) = self.config.registry().term(bt).and_then(|s| s.codelist) else {
                    return failed("code");
                };
                match self.config.codelists().normalize(list, &text) {
                    Ok(code) => Coerced::Value(BtValue::Code(code)),
                    Err(value) => Coerced::NotInCodelist {
                        value,
                        rule_id: list.rule_id(),
                        list: list.name(),
                    },
                }
            }
        }
    }
}

/// Group a mapped value goes to: the record's own group for lines,
/// allowances and charges, created on first use; the owning group otherwise.
fn place(
    doc: &mut InvoiceDocument,
    registry: &BtRegistry,
    scope: Scope,
    owner: &str,
    record_group: &mut Option<GroupId>,
) -> Result<GroupId, BelegError> {
    match (scope.group(), *record_group) {
        (Some(_), Some(group)) => Ok(group),
        (Some(code), None) => {
            let group = doc.push_group(registry, GroupId::ROOT, code)?;
            *record_group = Some(group);
            Ok(group)
        }
        (None, _) => doc.ensure_first(registry, owner),
    }
}

enum Coerced {
    Value(BtValue),
    Empty,
    Failed(String),
    NotInCodelist {
        value: String,
        rule_id: &'static str,
        list: &'static str,
    },
}

type MappingRow = (Scope, &'static str, &'static str, Coercion);

static AZURE_INVOICE: &[MappingRow] = &[
    (Scope::Header, "InvoiceId", "BT-1", Coercion::Identifier),
    (Scope::Header, "InvoiceDate", "BT-2", Coercion::Date),
    (Scope::Header, "InvoiceType", "BT-3", Coercion::Code),
    (Scope::Header, "CurrencyCode", "BT-5", Coercion::Code),
    (Scope::Header, "DueDate", "BT-9", Coercion::Date),
    (Scope::Header, "CustomerReference", "BT-10", Coercion::Identifier),
    (Scope::Header, "PurchaseOrder", "BT-13", Coercion::Identifier),
    (Scope::Header, "PaymentTerm", "BT-20", Coercion::Text),
    (Scope::Header, "Note", "BT-22", Coercion::Text),
    (Scope::Header, "ServiceDate", "BT-72", Coercion::Date),
    (Scope::Header, "ServiceStartDate", "BT-73", Coercion::Date),
    (Scope::Header, "ServiceEndDate", "BT-74", Coercion::Date),
    (Scope::Header, "VendorName", "BT-27", Coercion::Text),
    (Scope::Header, "VendorRegistrationId", "BT-30", Coercion::Identifier),
    (Scope::Header, "VendorTaxId", "BT-31", Coercion::CompactIdentifier),
    (Scope::Header, "VendorTaxNumber", "BT-32", Coercion::Identifier),
    (Scope::Header, "VendorEmail", "BT-34", Coercion::Identifier),
    (Scope::Header, "VendorAddress.streetAddress", "BT-35", Coercion::Text),
    (Scope::Header, "VendorAddress.city", "BT-37", Coercion::Text),
    (Scope::Header, "VendorAddress.postalCode", "BT-38", Coercion::Identifier),
    (Scope::Header, "VendorAddress.state", "BT-39", Coercion::Text),
    (Scope::Header, "VendorAddress.countryRegion", "BT-40", Coercion::Code),
    (Scope::Header, "CustomerName", "BT-44", Coercion::Text),
    (Scope::Header, "CustomerTaxId", "BT-48", Coercion::CompactIdentifier),
    (Scope::Header, "CustomerEmail", "BT-49", Coercion::Identifier),
    (Scope::Header, "CustomerAddress.streetAddress", "BT-50", Coercion::Text),
    (Scope::Header, "CustomerAddress.city", "BT-52", Coercion::Text),
    (Scope::Header, "CustomerAddress.postalCode", "BT-53", Coercion::Identifier),
    (Scope::Header, "CustomerAddress.state", "BT-54", Coercion::Text),
    (Scope::Header, "CustomerAddress.countryRegion", "BT-55", Coercion::Code),
    (Scope::Header, "PaymentMeans", "BT-81", Coercion::Code),
    (Scope::Header, "PaymentReference", "BT-83", Coercion::Identifier),
    (Scope::Header, "PaymentDetails.IBAN", "BT-84", Coercion::CompactIdentifier),
    (Scope::Header, "PaymentDetails.AccountName", "BT-85", Coercion::Text),
    (Scope::Header, "SubTotal", "BT-109", Coercion::Decimal),
    (Scope::Header, "TotalTax", "BT-110", Coercion::Decimal),
    (Scope::Header, "InvoiceTotal", "BT-112", Coercion::Decimal),
    (Scope::Header, "PaidAmount", "BT-113", Coercion::Decimal),
    (Scope::Header, "RoundingAmount", "BT-114", Coercion::Decimal),
    (Scope::Header, "AmountDue", "BT-115", Coercion::Decimal),
    (Scope::Line, "ItemId", "BT-126", Coercion::Identifier),
    (Scope::Line, "Note", "BT-127", Coercion::Text),
    (Scope::Line, "Quantity", "BT-129", Coercion::Decimal),
    (Scope::Line, "Unit", "BT-130", Coercion::Code),
    (Scope::Line, "Amount", "BT-131", Coercion::Decimal),
    (Scope::Line, "Discount", "BT-136", Coercion::Decimal),
    (Scope::Line, "UnitPrice", "BT-146", Coercion::Decimal),
    (Scope::Line, "BaseQuantity", "BT-149", Coercion::Decimal),
    (Scope::Line, "TaxCategory", "BT-151", Coercion::Code),
    (Scope::Line, "TaxRate", "BT-152", Coercion::Percent),
    (Scope::Line, "Description", "BT-153", Coercion::Text),
    (Scope::Line, "LongDescription", "BT-154", Coercion::Text),
    (Scope::Line, "ProductCode", "BT-155", Coercion::Identifier),
    (Scope::Allowance, "Amount", "BT-92", Coercion::Decimal),
    (Scope::Allowance, "BaseAmount", "BT-93", Coercion::Decimal),
    (Scope::Allowance, "Percentage", "BT-94", Coercion::Percent),
    (Scope::Allowance, "TaxCategory", "BT-95", Coercion::Code),
    (Scope::Allowance, "TaxRate", "BT-96", Coercion::Percent),
    (Scope::Allowance, "Reason", "BT-97", Coercion::Text),
    (Scope::Allowance, "ReasonCode", "BT-98", Coercion::Code),
    (Scope::Charge, "Amount", "BT-99", Coercion::Decimal),
    (Scope::Charge, "BaseAmount", "BT-100", Coercion::Decimal),
    (Scope::Charge, "Percentage", "BT-101", Coercion::Percent),
    (Scope::Charge, "TaxCategory", "BT-102", Coercion::Code),
    (Scope::Charge, "TaxRate", "BT-103", Coercion::Percent),
    (Scope::Charge, "Reason", "BT-104", Coercion::Text),
    (Scope::Charge, "ReasonCode", "BT-105", Coercion::Code),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_matches_registry() {
        MappingTable::azure_invoice()
            .check(&BtRegistry::en16931_basic())
            .unwrap();
    }

    #[test]
    fn embedded_codes() {
        assert_eq!(embedded_bt_code("BT-1 Invoice number"), Some("BT-1".into()));
        assert_eq!(embedded_bt_code("total (bt-112)"), Some("BT-112".into()));
        assert_eq!(embedded_bt_code("BT-"), None);
        assert_eq!(embedded_bt_code("InvoiceTotal"), None);
    }

    #[test]
    fn scope_must_fit_group() {
        assert!(scope_fits(Scope::Line, "BG-25"));
        assert!(!scope_fits(Scope::Line, "BG-22"));
        assert!(scope_fits(Scope::Header, "BG-5"));
        assert!(!scope_fits(Scope::Header, "BG-25"));
    }

    #[test]
    fn mismatched_coercion_is_rejected() {
        let table = MappingTable::new(vec![FieldMapping::new(
            Scope::Header,
            "Total",
            "BT-112",
            Coercion::Date,
        )]);
        assert!(table.check(&BtRegistry::en16931_basic()).is_err());
    }

    #[test]
    fn with_replaces_existing_row() {
        let table = MappingTable::azure_invoice().with(FieldMapping::new(
            Scope::Header,
            "InvoiceId",
            "BT-13",
            Coercion::Identifier,
        ));
        assert_eq!(table.lookup(Scope::Header, "InvoiceId").unwrap().bt, "BT-13");
    }
}
