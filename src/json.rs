//! JSON adapters: extraction input, configuration overrides, report output.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::{
    BelegError, Codelist, Codelists, CorrectionsReport, FieldMapping, MappingTable,
    ProcessingConfig, RawExtraction, RawField, RawRecord, RawValue, Settings,
};

fn json_err(e: serde_json::Error) -> BelegError {
    BelegError::Json(e.to_string())
}

/// Parse an extraction in this crate's own layout
/// (`{"fields": {...}, "lines": [...], "allowances": [...], "charges": [...]}`).
pub fn extraction_from_str(json: &str) -> Result<RawExtraction, BelegError> {
    serde_json::from_str(json).map_err(json_err)
}

/// Parse the `analyzeResult` layout of a prebuilt invoice model.
///
/// Header fields come from `analyzeResult.documents[0].fields`. Address
/// fields are flattened (`VendorAddress.city`), `Items` become lines and the
/// first `PaymentDetails` entry is flattened (`PaymentDetails.IBAN`).
pub fn extraction_from_azure(json: &str) -> Result<RawExtraction, BelegError> {
    let root: Value = serde_json::from_str(json).map_err(json_err)?;
    let fields = root
        .pointer("/analyzeResult/documents/0/fields")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            BelegError::Mapping("no analyzeResult.documents[0].fields in input".into())
        })?;

    let mut extraction = RawExtraction::new();
    for (key, field) in fields {
        match key.as_str() {
            "Items" => {
                for item in array_of(field) {
                    if let Some(object) = item.get("valueObject").and_then(Value::as_object) {
                        extraction.lines.push(record_of(object));
                    }
                }
            }
            "PaymentDetails" => {
                let first = array_of(field)
                    .first()
                    .and_then(|entry| entry.get("valueObject"))
                    .and_then(Value::as_object);
                if let Some(object) = first {
                    for (name, sub) in object {
                        if let Some(raw) = raw_field(sub) {
                            extraction.fields.insert(format!("{key}.{name}"), raw);
                        }
                    }
                }
            }
            _ => {
                if let Some(address) = field.get("valueAddress").and_then(Value::as_object) {
                    let confidence = field.get("confidence").and_then(Value::as_f64);
                    for (part, value) in address {
                        if let Some(text) = scalar_text(value) {
                            extraction.fields.insert(
                                format!("{key}.{part}"),
                                RawField {
                                    value: RawValue::Text(text),
                                    confidence,
                                },
                            );
                        }
                    }
                } else if let Some(raw) = raw_field(field) {
                    extraction.fields.insert(key.clone(), raw);
                }
            }
        }
    }

    tracing::debug!(
        fields = extraction.fields.len(),
        lines = extraction.lines.len(),
        "azure extraction parsed"
    );
    Ok(extraction)
}

fn array_of(field: &Value) -> &[Value] {
    field
        .get("valueArray")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn record_of(object: &Map<String, Value>) -> RawRecord {
    let mut record = RawRecord::new();
    for (name, field) in object {
        if let Some(raw) = raw_field(field) {
            record.insert(name.clone(), raw);
        }
    }
    record
}

/// Typed value first, then the recognized text.
fn raw_field(field: &Value) -> Option<RawField> {
    let confidence = field.get("confidence").and_then(Value::as_f64);
    let value = if let Some(s) = field.get("valueString").and_then(Value::as_str) {
        RawValue::Text(s.to_string())
    } else if let Some(s) = field.get("valueDate").and_then(Value::as_str) {
        RawValue::Text(s.to_string())
    } else if let Some(n) = field.get("valueNumber").and_then(number) {
        RawValue::Number(n)
    } else if let Some(n) = field.pointer("/valueCurrency/amount").and_then(number) {
        RawValue::Number(n)
    } else if let Some(s) = field.get("valueCountryRegion").and_then(Value::as_str) {
        RawValue::Text(s.to_string())
    } else if let Some(s) = field.get("content").and_then(Value::as_str) {
        RawValue::Text(s.to_string())
    } else {
        return None;
    };
    Some(RawField { value, confidence })
}

fn number(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Overrides accepted by [`config_from_str`]. Everything is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigOverrides {
    settings: Option<Settings>,
    mappings: Vec<FieldMapping>,
    disabled_rules: Vec<String>,
    extra_codes: BTreeMap<Codelist, Vec<String>>,
}

/// Build a configuration from the EN 16931 Basic defaults plus JSON
/// overrides:
///
/// ```json
/// {
///   "settings": { "tolerance": "0.02", "max_iterations": 5 },
///   "mappings": [{ "scope": "header", "field": "Kundennummer", "bt": "BT-10", "coercion": "identifier" }],
///   "disabled_rules": ["BR-CO-25"],
///   "extra_codes": { "unit": ["XPP"] }
/// }
/// ```
pub fn config_from_str(json: &str) -> Result<ProcessingConfig, BelegError> {
    let overrides: ConfigOverrides = serde_json::from_str(json).map_err(json_err)?;

    let mapping = overrides
        .mappings
        .into_iter()
        .fold(MappingTable::azure_invoice(), MappingTable::with);
    let codelists = overrides
        .extra_codes
        .into_iter()
        .fold(Codelists::new(), |lists, (list, codes)| lists.with_codes(list, codes));

    let mut builder = ProcessingConfig::builder()
        .mapping(mapping)
        .codelists(codelists)
        .disable_rules(overrides.disabled_rules);
    if let Some(settings) = overrides.settings {
        builder = builder.settings(settings);
    }
    builder.build()
}

/// Render a report as pretty-printed JSON.
pub fn report_to_string(report: &CorrectionsReport) -> Result<String, BelegError> {
    serde_json::to_string_pretty(report).map_err(json_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn number_keeps_decimal_digits() {
        assert_eq!(number(&serde_json::json!(12.5)), Some(dec!(12.5)));
        assert_eq!(number(&serde_json::json!(3)), Some(dec!(3)));
        assert_eq!(number(&serde_json::json!("3")), None);
    }

    #[test]
    fn content_is_the_fallback() {
        let field = serde_json::json!({ "content": "R-77", "confidence": 0.5 });
        let raw = raw_field(&field).unwrap();
        assert_eq!(raw.value, RawValue::Text("R-77".into()));
        assert_eq!(raw.confidence, Some(0.5));
    }

    #[test]
    fn unknown_override_keys_are_rejected() {
        assert!(matches!(
            config_from_str(r#"{ "tolerence": "0.1" }"#),
            Err(BelegError::Json(_))
        ));
    }
}
