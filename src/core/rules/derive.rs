//! Rules that fill in absent values from defaults or from other terms, and
//! bring free-text values into canonical form.

use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;

use crate::core::codelists::german_subdivision;
use crate::core::mapping::{parse_date, parse_decimal};
use crate::core::report::Severity;
use crate::core::store::{GroupId, InvoiceDocument};
use crate::core::value::BtValue;

use super::{Remedy, RuleContext, RuleKind, ValidationRule};

/// Specification identifier of EN 16931 core invoices.
pub(crate) const EN16931_SPECIFICATION_ID: &str = "urn:cen.eu:en16931:2017";

/// UNTDID 1001 code for a commercial invoice.
const COMMERCIAL_INVOICE: &str = "380";

/// UNTDID 4461 SEPA credit transfer.
const SEPA_CREDIT_TRANSFER: &str = "58";

/// UN/ECE Rec 20 "one".
const DEFAULT_UNIT: &str = "C62";

/// Marker of a structured cash discount line in payment terms.
const SKONTO_MARKER: &str = "#SKONTO#";

static DATE_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2}\.\d{1,2}\.\d{4}|\d{4}-\d{2}-\d{2})\b").expect("date pattern")
});

static DAYS_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,3})\s*(?:tage|days)").expect("days pattern"));

/// "2 % Skonto bei Zahlung innerhalb von 10 Tagen"
static SKONTO_PERCENT_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*%\s*skonto\b[^;\n]*?\b(\d{1,3})\s*tage").expect("skonto pattern")
});

/// "innerhalb von 10 Tagen 2 % Skonto"
static SKONTO_DAYS_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*tage\w*[^;\n]*?(\d+(?:[.,]\d+)?)\s*%\s*skonto").expect("skonto pattern")
});

pub(super) fn rules() -> Vec<ValidationRule> {
    vec![
        ValidationRule {
            id: "BR-01",
            description: "An Invoice shall have a Specification identifier",
            severity: Severity::Fatal,
            reads: &[],
            writes: &["BT-24"],
            kind: RuleKind::Correcting(specification_identifier),
        },
        ValidationRule {
            id: "BR-04",
            description: "An Invoice shall have an Invoice type code",
            severity: Severity::Fatal,
            reads: &[],
            writes: &["BT-3"],
            kind: RuleKind::Correcting(invoice_type),
        },
        ValidationRule {
            id: "BR-21",
            description: "Each Invoice line shall have an Invoice line identifier",
            severity: Severity::Fatal,
            reads: &[],
            writes: &["BT-126"],
            kind: RuleKind::Correcting(line_identifiers),
        },
        ValidationRule {
            id: "BR-23",
            description: "An Invoice line shall have an Invoiced quantity unit of measure code",
            severity: Severity::Fatal,
            reads: &[],
            writes: &["BT-130"],
            kind: RuleKind::Correcting(default_unit),
        },
        ValidationRule {
            id: "BR-CO-04",
            description: "Each Invoice line shall be categorized with an Invoiced item VAT category code",
            severity: Severity::Fatal,
            reads: &["BT-152", "BT-96", "BT-103"],
            writes: &["BT-151", "BT-95", "BT-102"],
            kind: RuleKind::Correcting(category_from_rate),
        },
        ValidationRule {
            id: "BR-49",
            description: "A Payment instruction shall specify the Payment means type code",
            severity: Severity::Fatal,
            reads: &["BT-84"],
            writes: &["BT-81"],
            kind: RuleKind::Correcting(payment_means),
        },
        ValidationRule {
            id: "BR-09",
            description: "The Seller postal address shall contain a Seller country code",
            severity: Severity::Fatal,
            reads: &["BT-38"],
            writes: &["BT-40"],
            kind: RuleKind::Correcting(seller_country),
        },
        ValidationRule {
            id: "BR-11",
            description: "The Buyer postal address shall contain a Buyer country code",
            severity: Severity::Fatal,
            reads: &["BT-53"],
            writes: &["BT-55"],
            kind: RuleKind::Correcting(buyer_country),
        },
        ValidationRule {
            id: "SUBDIVISION-FROM-POST-CODE",
            description: "German seller and buyer addresses carry the state of their post code",
            severity: Severity::Warning,
            reads: &["BT-38", "BT-40", "BT-53", "BT-55"],
            writes: &["BT-39", "BT-54"],
            kind: RuleKind::Correcting(subdivisions),
        },
        ValidationRule {
            id: "ELECTRONIC-ADDRESS",
            description: "E-mail addresses used as electronic address are in canonical form",
            severity: Severity::Warning,
            reads: &["BT-34", "BT-49"],
            writes: &["BT-34", "BT-49"],
            kind: RuleKind::Correcting(electronic_addresses),
        },
        ValidationRule {
            id: "SKONTO-TERMS",
            description: "Cash discounts in payment terms are stated as #SKONTO#TAGE=n#PROZENT=p#",
            severity: Severity::Warning,
            reads: &["BT-20"],
            writes: &["BT-20"],
            kind: RuleKind::Correcting(skonto_terms),
        },
        ValidationRule {
            id: "DUE-DATE-FROM-TERMS",
            description: "Payment due date from the latest date or the net days in the payment terms",
            severity: Severity::Warning,
            reads: &["BT-2", "BT-20"],
            writes: &["BT-9"],
            kind: RuleKind::Correcting(due_date_from_terms),
        },
    ]
}

fn specification_identifier(doc: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Remedy> {
    if doc.value(GroupId::ROOT, "BT-24").is_some() {
        return Vec::new();
    }
    vec![Remedy::Set {
        group: Some(GroupId::ROOT),
        bt: "BT-24",
        value: BtValue::Text(EN16931_SPECIFICATION_ID.into()),
        rationale: "EN 16931 core specification identifier".into(),
    }]
}

fn invoice_type(doc: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Remedy> {
    if doc.value(GroupId::ROOT, "BT-3").is_some() {
        return Vec::new();
    }
    vec![Remedy::Set {
        group: Some(GroupId::ROOT),
        bt: "BT-3",
        value: BtValue::Code(COMMERCIAL_INVOICE.into()),
        rationale: "defaulted to commercial invoice".into(),
    }]
}

fn line_identifiers(doc: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Remedy> {
    doc.instances("BG-25")
        .enumerate()
        .filter(|(_, line)| doc.value(*line, "BT-126").is_none())
        .map(|(position, line)| Remedy::Set {
            group: Some(line),
            bt: "BT-126",
            value: BtValue::Text((position + 1).to_string()),
            rationale: "numbered by line position".into(),
        })
        .collect()
}

fn default_unit(doc: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Remedy> {
    doc.instances("BG-25")
        .filter(|line| doc.value(*line, "BT-130").is_none())
        .map(|line| Remedy::Set {
            group: Some(line),
            bt: "BT-130",
            value: BtValue::Code(DEFAULT_UNIT.into()),
            rationale: "no unit extracted, assumed piece".into(),
        })
        .collect()
}

fn category_from_rate(doc: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Remedy> {
    let mut remedies = Vec::new();
    for (group, category, rate) in [
        ("BG-25", "BT-151", "BT-152"),
        ("BG-20", "BT-95", "BT-96"),
        ("BG-21", "BT-102", "BT-103"),
    ] {
        for instance in doc.instances(group) {
            if doc.value(instance, category).is_some() {
                continue;
            }
            let Some(rate) = doc.decimal(instance, rate) else {
                continue;
            };
            let code = if rate > Decimal::ZERO { "S" } else { "Z" };
            remedies.push(Remedy::Set {
                group: Some(instance),
                bt: category,
                value: BtValue::Code(code.into()),
                rationale: format!("VAT rate {rate}% implies category {code}"),
            });
        }
    }
    remedies
}

/// An account identifier without a payment means code is a SEPA credit
/// transfer.
fn payment_means(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    let Some(instructions) = doc.find_singular(ctx.registry, "BG-16") else {
        return Vec::new();
    };
    if doc.value(instructions, "BT-81").is_some()
        || doc.children_of(instructions, "BG-17").next().is_none()
    {
        return Vec::new();
    }
    vec![Remedy::Set {
        group: Some(instructions),
        bt: "BT-81",
        value: BtValue::Code(SEPA_CREDIT_TRANSFER.into()),
        rationale: "payment account given, assumed SEPA credit transfer".into(),
    }]
}

fn seller_country(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    country_from_post_code(doc, ctx, "BG-5", "BT-38", "BT-40")
}

fn buyer_country(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    country_from_post_code(doc, ctx, "BG-8", "BT-53", "BT-55")
}

fn country_from_post_code(
    doc: &InvoiceDocument,
    ctx: &RuleContext<'_>,
    group: &str,
    post_code: &str,
    country: &'static str,
) -> Vec<Remedy> {
    let Some(address) = doc.find_singular(ctx.registry, group) else {
        return Vec::new();
    };
    if doc.value(address, country).is_some() {
        return Vec::new();
    }
    match doc.text(address, post_code) {
        Some(code) if is_german_post_code(code) => vec![Remedy::Set {
            group: Some(address),
            bt: country,
            value: BtValue::Code("DE".into()),
            rationale: format!("post code {code} is German"),
        }],
        _ => Vec::new(),
    }
}

fn subdivisions(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    [("BG-5", "BT-38", "BT-39", "BT-40"), ("BG-8", "BT-53", "BT-54", "BT-55")]
        .into_iter()
        .filter_map(|(group, post_code, subdivision, country)| {
            let address = doc.find_singular(ctx.registry, group)?;
            if doc.value(address, subdivision).is_some() || doc.text(address, country) != Some("DE") {
                return None;
            }
            let code = doc.text(address, post_code)?;
            let state = german_subdivision(code)?;
            Some(Remedy::Set {
                group: Some(address),
                bt: subdivision,
                value: BtValue::Text(state.into()),
                rationale: format!("post code {code} lies in {state}"),
            })
        })
        .collect()
}

fn electronic_addresses(doc: &InvoiceDocument, ctx: &RuleContext<'_>) -> Vec<Remedy> {
    [("BG-4", "BT-34"), ("BG-7", "BT-49")]
        .into_iter()
        .filter_map(|(group, bt)| {
            let party = doc.find_singular(ctx.registry, group)?;
            let address = doc.text(party, bt)?;
            let canonical = canonical_email(address)?;
            (canonical != address).then(|| Remedy::Normalize {
                group: party,
                bt,
                value: BtValue::Text(canonical),
                rationale: "e-mail address in canonical form".into(),
            })
        })
        .collect()
}

/// `mailto:` and whitespace removed, trailing punctuation dropped, domain
/// lower-cased. `None` for anything that is not an e-mail address.
fn canonical_email(text: &str) -> Option<String> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let compact = match compact.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("mailto:") => &compact[7..],
        _ => compact.as_str(),
    };
    let compact = compact.trim_end_matches(['.', ',', ';']);
    let (local, domain) = compact.split_once('@')?;
    if local.is_empty() || !domain.contains('.') || domain.contains('@') {
        return None;
    }
    Some(format!("{local}@{}", domain.to_lowercase()))
}

fn skonto_terms(doc: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Remedy> {
    let Some(terms) = doc.text(GroupId::ROOT, "BT-20") else {
        return Vec::new();
    };
    let Some((days, percent)) = skonto(terms) else {
        return Vec::new();
    };
    vec![Remedy::Normalize {
        group: GroupId::ROOT,
        bt: "BT-20",
        value: BtValue::Text(format!(
            "{}\n{SKONTO_MARKER}TAGE={days}#PROZENT={percent:.2}#",
            terms.trim_end()
        )),
        rationale: format!("{percent}% cash discount within {days} days"),
    }]
}

/// Days and percentage of a cash discount stated in free text. Terms that
/// already carry a structured line are left alone.
fn skonto(terms: &str) -> Option<(u32, Decimal)> {
    if terms.contains(SKONTO_MARKER) {
        return None;
    }
    let (days, percent) = match SKONTO_PERCENT_FIRST.captures(terms) {
        Some(caps) => (caps.get(2)?, caps.get(1)?),
        None => {
            let caps = SKONTO_DAYS_FIRST.captures(terms)?;
            (caps.get(1)?, caps.get(2)?)
        }
    };
    let days = days.as_str().parse().ok()?;
    let percent = parse_decimal(percent.as_str())?;
    (percent > Decimal::ZERO && percent < Decimal::ONE_HUNDRED).then_some((days, percent))
}

fn due_date_from_terms(doc: &InvoiceDocument, _: &RuleContext<'_>) -> Vec<Remedy> {
    if doc.value(GroupId::ROOT, "BT-9").is_some() {
        return Vec::new();
    }
    let (Some(terms), Some(issued)) = (
        doc.text(GroupId::ROOT, "BT-20"),
        doc.value(GroupId::ROOT, "BT-2").and_then(BtValue::as_date),
    ) else {
        return Vec::new();
    };
    let Some((due, rationale)) = due_date(terms, issued) else {
        return Vec::new();
    };
    vec![Remedy::Set {
        group: Some(GroupId::ROOT),
        bt: "BT-9",
        value: BtValue::Date(due),
        rationale,
    }]
}

/// The latest date named in the payment terms, or else the issue date plus
/// the longest period in days. Dates before the issue date are ignored.
fn due_date(terms: &str, issued: NaiveDate) -> Option<(NaiveDate, String)> {
    let latest = DATE_IN_TEXT
        .find_iter(terms)
        .filter_map(|m| parse_date(m.as_str()))
        .filter(|date| *date >= issued)
        .max();
    if let Some(date) = latest {
        return Some((date, "latest date in the payment terms".into()));
    }

    let days = match terms.trim().parse::<u32>() {
        Ok(days) => days,
        Err(_) => DAYS_IN_TEXT
            .captures_iter(terms)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
            .max()?,
    };
    let due = issued.checked_add_days(Days::new(u64::from(days)))?;
    Some((due, format!("issue date + {days} days")))
}

/// `12345` or `D-12345`.
fn is_german_post_code(code: &str) -> bool {
    let digits = code.trim().strip_prefix("D-").unwrap_or(code.trim());
    digits.len() == 5 && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn due_date_from_net_days() {
        let issued = date(2024, 3, 1);
        assert_eq!(due_date("Zahlbar innerhalb 30 Tagen netto", issued).unwrap().0, date(2024, 3, 31));
        assert_eq!(due_date("14", issued).unwrap().0, date(2024, 3, 15));
        assert_eq!(
            due_date("2 % Skonto bei Zahlung binnen 10 Tagen, 30 Tage netto", issued).unwrap().0,
            date(2024, 3, 31)
        );
        assert!(due_date("sofort fällig", issued).is_none());
    }

    #[test]
    fn due_date_from_named_dates() {
        let issued = date(2024, 3, 1);
        let (due, rationale) =
            due_date("Skonto bis 10.03.2024, netto bis 31.03.2024", issued).unwrap();
        assert_eq!(due, date(2024, 3, 31));
        assert_eq!(rationale, "latest date in the payment terms");
        // A date before the issue date is no due date.
        assert_eq!(due_date("Lieferung 15.02.2024, 10 Tage", issued).unwrap().0, date(2024, 3, 11));
    }

    #[test]
    fn skonto_in_either_order() {
        assert_eq!(
            skonto("2 % Skonto bei Zahlung innerhalb von 10 Tagen"),
            Some((10, dec!(2)))
        );
        assert_eq!(skonto("innerhalb 14 Tagen 2,5% Skonto"), Some((14, dec!(2.5))));
        assert_eq!(skonto("30 Tage netto"), None);
        assert_eq!(skonto("3% Skonto\n#SKONTO#TAGE=7#PROZENT=3.00#"), None);
    }

    #[test]
    fn email_canonical_form() {
        assert_eq!(
            canonical_email("mailto: Rechnung@Muster-GmbH.DE."),
            Some("Rechnung@muster-gmbh.de".into())
        );
        assert_eq!(canonical_email("info@example.com"), Some("info@example.com".into()));
        assert_eq!(canonical_email("0204:991-12345-67"), None);
        assert_eq!(canonical_email("a@b"), None);
    }

    #[test]
    fn german_post_codes() {
        assert!(is_german_post_code("10115"));
        assert!(is_german_post_code("D-80331"));
        assert!(!is_german_post_code("1010"));
        assert!(!is_german_post_code("SW1A 1AA"));
        assert!(!is_german_post_code("A-1010"));
    }
}
