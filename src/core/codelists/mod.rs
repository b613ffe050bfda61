//! Codelists referenced by the BT registry.
//!
//! Each [`Codelist`] knows the EN 16931 rule that enforces membership.
//! [`Codelists`] adds normalization of OCR spellings and lets a
//! configuration extend a list with extra codes.

mod countries;
mod currencies;
mod reason_codes;
mod subdivisions;
mod units;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub use currencies::minor_unit;
pub use subdivisions::german_subdivision;

/// UNTDID 1001 invoice type codes permitted by EN 16931.
static INVOICE_TYPE_CODES: &[&str] = &[
    "326", "380", "381", "383", "384", "386", "389", "751", "875", "876", "877",
];

/// UNTDID 5305 VAT category codes used by EN 16931.
static VAT_CATEGORY_CODES: &[&str] = &["AE", "E", "G", "K", "L", "M", "O", "S", "Z"];

/// UNTDID 4461 payment means codes.
static PAYMENT_MEANS_CODES: &[&str] = &[
    "1", "10", "20", "30", "31", "42", "48", "49", "57", "58", "59", "68", "97", "ZZZ",
];

static PAYMENT_MEANS_ALIASES: &[(&str, &str)] = &[
    ("BAR", "10"),
    ("CASH", "10"),
    ("ÜBERWEISUNG", "58"),
    ("UEBERWEISUNG", "58"),
    ("SEPA", "58"),
    ("LASTSCHRIFT", "59"),
    ("KREDITKARTE", "48"),
    ("CREDIT CARD", "48"),
];

/// A codelist referenced by a business term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codelist {
    /// ISO 4217.
    Currency,
    /// UNTDID 1001.
    InvoiceType,
    /// UNTDID 5305.
    VatCategory,
    /// UN/ECE Rec 20/21.
    Unit,
    /// ISO 3166-1 alpha-2.
    Country,
    /// UNTDID 4461.
    PaymentMeans,
    /// UNTDID 5189.
    AllowanceReason,
    /// UNTDID 7161.
    ChargeReason,
}

impl Codelist {
    /// EN 16931 rule enforcing membership in this list.
    pub fn rule_id(&self) -> &'static str {
        match self {
            Self::InvoiceType => "BR-CL-01",
            Self::Currency => "BR-CL-04",
            Self::Country => "BR-CL-14",
            Self::PaymentMeans => "BR-CL-16",
            Self::VatCategory => "BR-CL-17",
            Self::AllowanceReason => "BR-CL-19",
            Self::ChargeReason => "BR-CL-20",
            Self::Unit => "BR-CL-23",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Currency => "ISO 4217 currency",
            Self::InvoiceType => "UNTDID 1001 invoice type",
            Self::VatCategory => "UNTDID 5305 VAT category",
            Self::Unit => "UN/ECE Rec 20 unit",
            Self::Country => "ISO 3166-1 country",
            Self::PaymentMeans => "UNTDID 4461 payment means",
            Self::AllowanceReason => "UNTDID 5189 allowance reason",
            Self::ChargeReason => "UNTDID 7161 charge reason",
        }
    }

    fn builtin_contains(&self, code: &str) -> bool {
        match self {
            Self::Currency => currencies::minor_unit(code).is_some(),
            Self::InvoiceType => INVOICE_TYPE_CODES.contains(&code),
            Self::VatCategory => VAT_CATEGORY_CODES.contains(&code),
            Self::Unit => units::UNIT_CODES.binary_search(&code).is_ok(),
            Self::Country => countries::COUNTRY_CODES.binary_search(&code).is_ok(),
            Self::PaymentMeans => PAYMENT_MEANS_CODES.contains(&code),
            Self::AllowanceReason => reason_codes::ALLOWANCE_REASON_CODES
                .binary_search(&code)
                .is_ok(),
            Self::ChargeReason => reason_codes::CHARGE_REASON_CODES.binary_search(&code).is_ok(),
        }
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Currency => currencies::CURRENCY_ALIASES,
            Self::Unit => units::UNIT_ALIASES,
            Self::Country => countries::COUNTRY_ALIASES,
            Self::PaymentMeans => PAYMENT_MEANS_ALIASES,
            _ => &[],
        }
    }
}

/// The codelists of one processing configuration: the built-in lists plus
/// any codes the configuration adds.
#[derive(Debug, Clone, Default)]
pub struct Codelists {
    extra: BTreeMap<Codelist, BTreeSet<String>>,
}

impl Codelists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept additional codes for `list` (e.g. a unit code missing from the
    /// built-in Rec 20 subset).
    pub fn with_codes<I, S>(mut self, list: Codelist, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra
            .entry(list)
            .or_default()
            .extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn contains(&self, list: Codelist, code: &str) -> bool {
        list.builtin_contains(code) || self.extra.get(&list).is_some_and(|s| s.contains(code))
    }

    /// Normalize an extracted spelling onto a code of `list`.
    ///
    /// Returns `Err` with the trimmed input when no member matches; the
    /// caller keeps that verbatim for the audit trail.
    pub fn normalize(&self, list: Codelist, raw: &str) -> Result<String, String> {
        let trimmed = collapse_repeated_tokens(raw.trim());
        let key = trimmed.to_uppercase();
        let stripped = key.trim_end_matches('.');

        for candidate in [key.as_str(), stripped] {
            if self.contains(list, candidate) {
                return Ok(candidate.to_string());
            }
            if let Some((_, code)) = list.aliases().iter().find(|(alias, _)| *alias == candidate) {
                return Ok((*code).to_string());
            }
        }
        Err(trimmed)
    }

    /// Minor unit digits of a currency; unknown currencies round to cents.
    pub fn minor_unit(&self, currency: &str) -> u32 {
        currencies::minor_unit(currency).unwrap_or(2)
    }
}

/// `"EUR EUR"` → `"EUR"`. Only collapses when every token is identical.
pub(crate) fn collapse_repeated_tokens(text: &str) -> String {
    let mut tokens = text.split_whitespace();
    match tokens.next() {
        Some(first) if text.split_whitespace().count() > 1 && tokens.all(|t| t == first) => {
            first.to_string()
        }
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_normalization() {
        let lists = Codelists::new();
        assert_eq!(lists.normalize(Codelist::Currency, " eur "), Ok("EUR".into()));
        assert_eq!(lists.normalize(Codelist::Currency, "€"), Ok("EUR".into()));
        assert_eq!(lists.normalize(Codelist::Currency, "EUR EUR"), Ok("EUR".into()));
        assert_eq!(
            lists.normalize(Codelist::Currency, "EURO"),
            Err("EURO".into())
        );
    }

    #[test]
    fn unit_aliases() {
        let lists = Codelists::new();
        assert_eq!(lists.normalize(Codelist::Unit, "Stk"), Ok("C62".into()));
        assert_eq!(lists.normalize(Codelist::Unit, "Std."), Ok("HUR".into()));
        assert_eq!(lists.normalize(Codelist::Unit, "St."), Ok("C62".into()));
        assert_eq!(lists.normalize(Codelist::Unit, "kg"), Ok("KGM".into()));
        assert!(lists.normalize(Codelist::Unit, "Kiste").is_err());
    }

    #[test]
    fn extra_codes_are_accepted() {
        let lists = Codelists::new().with_codes(Codelist::Unit, ["XZZ"]);
        assert!(lists.contains(Codelist::Unit, "XZZ"));
        assert!(!Codelists::new().contains(Codelist::Unit, "XZZ"));
    }

    #[test]
    fn country_names() {
        let lists = Codelists::new();
        assert_eq!(
            lists.normalize(Codelist::Country, "Deutschland"),
            Ok("DE".into())
        );
        assert_eq!(lists.normalize(Codelist::Country, "de"), Ok("DE".into()));
    }

    #[test]
    fn collapse_only_identical_tokens() {
        assert_eq!(collapse_repeated_tokens("EUR EUR"), "EUR");
        assert_eq!(collapse_repeated_tokens("EUR USD"), "EUR USD");
        assert_eq!(collapse_repeated_tokens("EUR"), "EUR");
        assert_eq!(collapse_repeated_tokens(""), "");
    }

    #[test]
    fn minor_unit_fallback() {
        let lists = Codelists::new();
        assert_eq!(lists.minor_unit("JPY"), 0);
        assert_eq!(lists.minor_unit("EURO"), 2);
    }
}
