//! The BT registry: reference catalog of every business term and business
//! group the crate understands, with cardinality, data type, parent group,
//! codelist and the EN 16931 rule that makes the element mandatory.
//!
//! [`BtRegistry::en16931_basic`] carries the Basic-profile subset that the
//! UBL serializer binds. Line-level allowance/charge amounts (BG-27/BG-28)
//! and price details (BG-29), line VAT information (BG-30) and item
//! information (BG-31) are flattened into BG-25, since each occurs at most
//! once per line in the Basic profile.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::codelists::Codelist;
use super::error::BelegError;
use super::value::DataType;

/// Code of the root group (the invoice itself).
pub const ROOT_GROUP: &str = "BG-0";

/// Occurrence constraint of a term within its group, or of a group within
/// its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "0..1")]
    Optional,
    #[serde(rename = "1")]
    Mandatory,
    #[serde(rename = "0..n")]
    Many,
    #[serde(rename = "1..n")]
    AtLeastOne,
}

impl Cardinality {
    pub fn min(&self) -> usize {
        match self {
            Self::Optional | Self::Many => 0,
            Self::Mandatory | Self::AtLeastOne => 1,
        }
    }

    /// `None` means unbounded.
    pub fn max(&self) -> Option<usize> {
        match self {
            Self::Optional | Self::Mandatory => Some(1),
            Self::Many | Self::AtLeastOne => None,
        }
    }

    pub fn is_mandatory(&self) -> bool {
        self.min() > 0
    }

    pub fn is_repeatable(&self) -> bool {
        self.max().is_none()
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Optional => "0..1",
            Self::Mandatory => "1",
            Self::Many => "0..n",
            Self::AtLeastOne => "1..n",
        })
    }
}

/// Registry entry for a business term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BtSpec {
    pub code: String,
    pub name: String,
    pub cardinality: Cardinality,
    pub data_type: DataType,
    /// Code of the owning business group.
    pub group: String,
    #[serde(default)]
    pub codelist: Option<Codelist>,
    /// EN 16931 rule reported when a mandatory term is absent.
    #[serde(default)]
    pub mandatory_rule: Option<String>,
}

/// Registry entry for a business group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub code: String,
    pub name: String,
    pub cardinality: Cardinality,
    /// `None` only for the root group.
    #[serde(default)]
    pub parent: Option<String>,
    /// EN 16931 rule reported when a mandatory group is absent. Groups
    /// without one report their mandatory members instead.
    #[serde(default)]
    pub mandatory_rule: Option<String>,
}

/// Read-only catalog of business terms and groups.
#[derive(Debug, Clone)]
pub struct BtRegistry {
    terms: BTreeMap<String, BtSpec>,
    groups: BTreeMap<String, GroupSpec>,
}

impl BtRegistry {
    /// Build a registry, checking that every parent and owning group exists.
    pub fn new(terms: Vec<BtSpec>, groups: Vec<GroupSpec>) -> Result<Self, BelegError> {
        let groups: BTreeMap<String, GroupSpec> =
            groups.into_iter().map(|g| (g.code.clone(), g)).collect();

        if !groups.contains_key(ROOT_GROUP) {
            return Err(BelegError::Config(format!(
                "registry has no root group {ROOT_GROUP}"
            )));
        }
        for group in groups.values() {
            match &group.parent {
                None if group.code != ROOT_GROUP => {
                    return Err(BelegError::Config(format!(
                        "group {} has no parent",
                        group.code
                    )));
                }
                Some(parent) if !groups.contains_key(parent) => {
                    return Err(BelegError::Config(format!(
                        "group {} refers to unknown parent {parent}",
                        group.code
                    )));
                }
                _ => {}
            }
        }

        let mut by_code = BTreeMap::new();
        for term in terms {
            if !groups.contains_key(&term.group) {
                return Err(BelegError::Config(format!(
                    "{} refers to unknown group {}",
                    term.code, term.group
                )));
            }
            if term.cardinality.is_repeatable() {
                return Err(BelegError::Config(format!(
                    "{} is repeatable; model repetition with a group",
                    term.code
                )));
            }
            if term.codelist.is_some() != (term.data_type == DataType::Code) {
                return Err(BelegError::Config(format!(
                    "{} must declare a codelist exactly when its type is code",
                    term.code
                )));
            }
            if by_code.insert(term.code.clone(), term).is_some() {
                return Err(BelegError::Config("duplicate business term code".into()));
            }
        }

        Ok(Self {
            terms: by_code,
            groups,
        })
    }

    /// The EN 16931 Basic-profile subset bound by the UBL serializer.
    pub fn en16931_basic() -> Self {
        let (terms, groups) = basic_tables();
        Self::new(terms, groups).unwrap_or_else(|e| unreachable!("built-in registry: {e}"))
    }

    pub fn term(&self, code: &str) -> Option<&BtSpec> {
        self.terms.get(code)
    }

    pub fn group(&self, code: &str) -> Option<&GroupSpec> {
        self.groups.get(code)
    }

    pub fn terms(&self) -> impl Iterator<Item = &BtSpec> {
        self.terms.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupSpec> {
        self.groups.values()
    }

    /// Terms owned directly by `group`, in code order.
    pub fn terms_in<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a BtSpec> + 'a {
        self.terms.values().filter(move |t| t.group == group)
    }

    /// Groups whose parent is `group`.
    pub fn child_groups<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a GroupSpec> + 'a {
        self.groups
            .values()
            .filter(move |g| g.parent.as_deref() == Some(group))
    }

    /// Group codes from the root down to `group`, inclusive.
    pub fn group_chain(&self, group: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.groups.get(group);
        while let Some(spec) = current {
            chain.push(spec.code.clone());
            current = spec.parent.as_deref().and_then(|p| self.groups.get(p));
        }
        chain.reverse();
        chain
    }

    /// Whether `group` and all its ancestors occur at most once, so that
    /// a single instance can be created on demand.
    pub fn is_singular_path(&self, group: &str) -> bool {
        self.group_chain(group).iter().all(|g| {
            self.groups
                .get(g)
                .is_some_and(|spec| !spec.cardinality.is_repeatable())
        })
    }
}

impl Default for BtRegistry {
    fn default() -> Self {
        Self::en16931_basic()
    }
}

use Cardinality::{AtLeastOne, Mandatory, Many, Optional};
use DataType::{Amount, Code, Date, Identifier, Percentage, Quantity, Text, UnitPrice};

type GroupRow = (
    &'static str,
    &'static str,
    Cardinality,
    Option<&'static str>,
    Option<&'static str>,
);

type TermRow = (
    &'static str,
    &'static str,
    Cardinality,
    DataType,
    &'static str,
    Option<Codelist>,
    Option<&'static str>,
);

static BASIC_GROUPS: &[GroupRow] = &[
    ("BG-0", "Invoice", Mandatory, None, None),
    ("BG-4", "Seller", Mandatory, Some("BG-0"), None),
    ("BG-5", "Seller postal address", Mandatory, Some("BG-4"), Some("BR-08")),
    ("BG-7", "Buyer", Mandatory, Some("BG-0"), None),
    ("BG-8", "Buyer postal address", Mandatory, Some("BG-7"), Some("BR-10")),
    ("BG-16", "Payment instructions", Optional, Some("BG-0"), None),
    ("BG-17", "Credit transfer", Many, Some("BG-16"), None),
    ("BG-20", "Document level allowances", Many, Some("BG-0"), None),
    ("BG-21", "Document level charges", Many, Some("BG-0"), None),
    ("BG-22", "Document totals", Mandatory, Some("BG-0"), None),
    ("BG-23", "VAT breakdown", AtLeastOne, Some("BG-0"), Some("BR-CO-18")),
    ("BG-25", "Invoice line", AtLeastOne, Some("BG-0"), Some("BR-16")),
];

static BASIC_TERMS: &[TermRow] = &[
    // BG-0
    ("BT-1", "Invoice number", Mandatory, Identifier, "BG-0", None, Some("BR-02")),
    ("BT-2", "Invoice issue date", Mandatory, Date, "BG-0", None, Some("BR-03")),
    ("BT-3", "Invoice type code", Mandatory, Code, "BG-0", Some(Codelist::InvoiceType), Some("BR-04")),
    ("BT-5", "Invoice currency code", Mandatory, Code, "BG-0", Some(Codelist::Currency), Some("BR-05")),
    ("BT-9", "Payment due date", Optional, Date, "BG-0", None, None),
    ("BT-10", "Buyer reference", Optional, Text, "BG-0", None, None),
    ("BT-13", "Purchase order reference", Optional, Identifier, "BG-0", None, None),
    ("BT-20", "Payment terms", Optional, Text, "BG-0", None, None),
    ("BT-22", "Invoice note", Optional, Text, "BG-0", None, None),
    ("BT-24", "Specification identifier", Mandatory, Identifier, "BG-0", None, Some("BR-01")),
    ("BT-72", "Actual delivery date", Optional, Date, "BG-0", None, None),
    ("BT-73", "Invoicing period start date", Optional, Date, "BG-0", None, None),
    ("BT-74", "Invoicing period end date", Optional, Date, "BG-0", None, None),
    // BG-4 / BG-5
    ("BT-27", "Seller name", Mandatory, Text, "BG-4", None, Some("BR-06")),
    ("BT-30", "Seller legal registration identifier", Optional, Identifier, "BG-4", None, None),
    ("BT-31", "Seller VAT identifier", Optional, Identifier, "BG-4", None, None),
    ("BT-32", "Seller tax registration identifier", Optional, Identifier, "BG-4", None, None),
    ("BT-34", "Seller electronic address", Optional, Identifier, "BG-4", None, None),
    ("BT-35", "Seller address line 1", Optional, Text, "BG-5", None, None),
    ("BT-36", "Seller address line 2", Optional, Text, "BG-5", None, None),
    ("BT-37", "Seller city", Optional, Text, "BG-5", None, None),
    ("BT-38", "Seller post code", Optional, Text, "BG-5", None, None),
    ("BT-39", "Seller country subdivision", Optional, Text, "BG-5", None, None),
    ("BT-40", "Seller country code", Mandatory, Code, "BG-5", Some(Codelist::Country), Some("BR-09")),
    // BG-7 / BG-8
    ("BT-44", "Buyer name", Mandatory, Text, "BG-7", None, Some("BR-07")),
    ("BT-48", "Buyer VAT identifier", Optional, Identifier, "BG-7", None, None),
    ("BT-49", "Buyer electronic address", Optional, Identifier, "BG-7", None, None),
    ("BT-50", "Buyer address line 1", Optional, Text, "BG-8", None, None),
    ("BT-51", "Buyer address line 2", Optional, Text, "BG-8", None, None),
    ("BT-52", "Buyer city", Optional, Text, "BG-8", None, None),
    ("BT-53", "Buyer post code", Optional, Text, "BG-8", None, None),
    ("BT-54", "Buyer country subdivision", Optional, Text, "BG-8", None, None),
    ("BT-55", "Buyer country code", Mandatory, Code, "BG-8", Some(Codelist::Country), Some("BR-11")),
    // BG-16 / BG-17
    ("BT-81", "Payment means type code", Mandatory, Code, "BG-16", Some(Codelist::PaymentMeans), Some("BR-49")),
    ("BT-83", "Remittance information", Optional, Text, "BG-16", None, None),
    ("BT-84", "Payment account identifier", Mandatory, Identifier, "BG-17", None, Some("BR-50")),
    ("BT-85", "Payment account name", Optional, Text, "BG-17", None, None),
    // BG-20
    ("BT-92", "Document level allowance amount", Mandatory, Amount, "BG-20", None, Some("BR-31")),
    ("BT-93", "Document level allowance base amount", Optional, Amount, "BG-20", None, None),
    ("BT-94", "Document level allowance percentage", Optional, Percentage, "BG-20", None, None),
    ("BT-95", "Document level allowance VAT category code", Mandatory, Code, "BG-20", Some(Codelist::VatCategory), Some("BR-32")),
    ("BT-96", "Document level allowance VAT rate", Optional, Percentage, "BG-20", None, None),
    ("BT-97", "Document level allowance reason", Optional, Text, "BG-20", None, None),
    ("BT-98", "Document level allowance reason code", Optional, Code, "BG-20", Some(Codelist::AllowanceReason), None),
    // BG-21
    ("BT-99", "Document level charge amount", Mandatory, Amount, "BG-21", None, Some("BR-36")),
    ("BT-100", "Document level charge base amount", Optional, Amount, "BG-21", None, None),
    ("BT-101", "Document level charge percentage", Optional, Percentage, "BG-21", None, None),
    ("BT-102", "Document level charge VAT category code", Mandatory, Code, "BG-21", Some(Codelist::VatCategory), Some("BR-37")),
    ("BT-103", "Document level charge VAT rate", Optional, Percentage, "BG-21", None, None),
    ("BT-104", "Document level charge reason", Optional, Text, "BG-21", None, None),
    ("BT-105", "Document level charge reason code", Optional, Code, "BG-21", Some(Codelist::ChargeReason), None),
    // BG-22
    ("BT-106", "Sum of Invoice line net amount", Mandatory, Amount, "BG-22", None, Some("BR-12")),
    ("BT-107", "Sum of allowances on document level", Optional, Amount, "BG-22", None, None),
    ("BT-108", "Sum of charges on document level", Optional, Amount, "BG-22", None, None),
    ("BT-109", "Invoice total amount without VAT", Mandatory, Amount, "BG-22", None, Some("BR-13")),
    ("BT-110", "Invoice total VAT amount", Optional, Amount, "BG-22", None, None),
    ("BT-112", "Invoice total amount with VAT", Mandatory, Amount, "BG-22", None, Some("BR-14")),
    ("BT-113", "Paid amount", Optional, Amount, "BG-22", None, None),
    ("BT-114", "Rounding amount", Optional, Amount, "BG-22", None, None),
    ("BT-115", "Amount due for payment", Mandatory, Amount, "BG-22", None, Some("BR-15")),
    // BG-23
    ("BT-116", "VAT category taxable amount", Mandatory, Amount, "BG-23", None, Some("BR-45")),
    ("BT-117", "VAT category tax amount", Mandatory, Amount, "BG-23", None, Some("BR-46")),
    ("BT-118", "VAT category code", Mandatory, Code, "BG-23", Some(Codelist::VatCategory), Some("BR-47")),
    ("BT-119", "VAT category rate", Optional, Percentage, "BG-23", None, None),
    ("BT-120", "VAT exemption reason text", Optional, Text, "BG-23", None, None),
    ("BT-121", "VAT exemption reason code", Optional, Identifier, "BG-23", None, None),
    // BG-25 (with BG-27..BG-31 flattened)
    ("BT-126", "Invoice line identifier", Mandatory, Identifier, "BG-25", None, Some("BR-21")),
    ("BT-127", "Invoice line note", Optional, Text, "BG-25", None, None),
    ("BT-129", "Invoiced quantity", Mandatory, Quantity, "BG-25", None, Some("BR-22")),
    ("BT-130", "Invoiced quantity unit of measure code", Mandatory, Code, "BG-25", Some(Codelist::Unit), Some("BR-23")),
    ("BT-131", "Invoice line net amount", Mandatory, Amount, "BG-25", None, Some("BR-24")),
    ("BT-136", "Invoice line allowance amount", Optional, Amount, "BG-25", None, None),
    ("BT-141", "Invoice line charge amount", Optional, Amount, "BG-25", None, None),
    ("BT-146", "Item net price", Mandatory, UnitPrice, "BG-25", None, Some("BR-26")),
    ("BT-149", "Item price base quantity", Optional, Quantity, "BG-25", None, None),
    ("BT-151", "Invoiced item VAT category code", Mandatory, Code, "BG-25", Some(Codelist::VatCategory), Some("BR-CO-04")),
    ("BT-152", "Invoiced item VAT rate", Optional, Percentage, "BG-25", None, None),
    ("BT-153", "Item name", Mandatory, Text, "BG-25", None, Some("BR-25")),
    ("BT-154", "Item description", Optional, Text, "BG-25", None, None),
    ("BT-155", "Item Seller's identifier", Optional, Identifier, "BG-25", None, None),
];

fn basic_tables() -> (Vec<BtSpec>, Vec<GroupSpec>) {
    let groups = BASIC_GROUPS
        .iter()
        .map(|(code, name, cardinality, parent, rule)| GroupSpec {
            code: (*code).into(),
            name: (*name).into(),
            cardinality: *cardinality,
            parent: parent.map(Into::into),
            mandatory_rule: rule.map(Into::into),
        })
        .collect();
    let terms = BASIC_TERMS
        .iter()
        .map(|(code, name, cardinality, data_type, group, codelist, rule)| BtSpec {
            code: (*code).into(),
            name: (*name).into(),
            cardinality: *cardinality,
            data_type: *data_type,
            group: (*group).into(),
            codelist: *codelist,
            mandatory_rule: rule.map(Into::into),
        })
        .collect();
    (terms, groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_is_consistent() {
        let registry = BtRegistry::en16931_basic();
        assert_eq!(registry.term("BT-5").unwrap().codelist, Some(Codelist::Currency));
        assert_eq!(registry.term("BT-131").unwrap().group, "BG-25");
        assert!(registry.term("BT-999").is_none());
    }

    #[test]
    fn builtin_tables_validate() {
        let (terms, groups) = basic_tables();
        let (term_count, group_count) = (terms.len(), groups.len());
        let registry = BtRegistry::new(terms, groups).unwrap();
        assert_eq!(registry.terms().count(), term_count);
        assert_eq!(registry.groups().count(), group_count);
    }

    #[test]
    fn group_chain_walks_to_root() {
        let registry = BtRegistry::en16931_basic();
        assert_eq!(registry.group_chain("BG-5"), vec!["BG-0", "BG-4", "BG-5"]);
        assert!(registry.is_singular_path("BG-5"));
        assert!(registry.is_singular_path("BG-22"));
        assert!(!registry.is_singular_path("BG-25"));
        assert!(!registry.is_singular_path("BG-17"));
    }

    #[test]
    fn unknown_group_is_rejected() {
        let groups = vec![GroupSpec {
            code: ROOT_GROUP.into(),
            name: "Invoice".into(),
            cardinality: Cardinality::Mandatory,
            parent: None,
            mandatory_rule: None,
        }];
        let terms = vec![BtSpec {
            code: "BT-1".into(),
            name: "Invoice number".into(),
            cardinality: Cardinality::Mandatory,
            data_type: DataType::Identifier,
            group: "BG-99".into(),
            codelist: None,
            mandatory_rule: None,
        }];
        assert!(matches!(
            BtRegistry::new(terms, groups),
            Err(BelegError::Config(_))
        ));
    }

    #[test]
    fn codelist_terms_are_codes() {
        let registry = BtRegistry::en16931_basic();
        for term in registry.terms() {
            assert_eq!(
                term.codelist.is_some(),
                term.data_type == DataType::Code,
                "{}",
                term.code
            );
        }
    }
}
