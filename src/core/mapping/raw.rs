use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A value as delivered by the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Text(String),
    Number(Decimal),
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Decimal> for RawValue {
    fn from(d: Decimal) -> Self {
        Self::Number(d)
    }
}

/// One extracted field with its confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawField {
    pub value: RawValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl RawField {
    pub fn new(value: impl Into<RawValue>) -> Self {
        Self {
            value: value.into(),
            confidence: None,
        }
    }

    pub fn scored(value: impl Into<RawValue>, confidence: f64) -> Self {
        Self {
            value: value.into(),
            confidence: Some(confidence),
        }
    }
}

/// Named fields of one record (the header, a line, an allowance or a
/// charge).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub BTreeMap<String, RawField>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field without a confidence score.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.0.insert(name.into(), RawField::new(value));
        self
    }

    /// Add a field with a confidence score.
    pub fn scored(
        mut self,
        name: impl Into<String>,
        value: impl Into<RawValue>,
        confidence: f64,
    ) -> Self {
        self.0.insert(name.into(), RawField::scored(value, confidence));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, field: RawField) {
        self.0.insert(name.into(), field);
    }

    pub fn get(&self, name: &str) -> Option<&RawField> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RawField)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Output of the document-understanding service for one invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawExtraction {
    #[serde(default)]
    pub fields: RawRecord,
    #[serde(default)]
    pub lines: Vec<RawRecord>,
    #[serde(default)]
    pub allowances: Vec<RawRecord>,
    #[serde(default)]
    pub charges: Vec<RawRecord>,
}

impl RawExtraction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header field without a confidence score.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.fields.insert(name, RawField::new(value));
        self
    }

    /// Add a header field with a confidence score.
    pub fn scored(
        mut self,
        name: impl Into<String>,
        value: impl Into<RawValue>,
        confidence: f64,
    ) -> Self {
        self.fields.insert(name, RawField::scored(value, confidence));
        self
    }

    pub fn line(mut self, line: RawRecord) -> Self {
        self.lines.push(line);
        self
    }

    pub fn allowance(mut self, allowance: RawRecord) -> Self {
        self.allowances.push(allowance);
        self
    }

    pub fn charge(mut self, charge: RawRecord) -> Self {
        self.charges.push(charge);
        self
    }
}
