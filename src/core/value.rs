use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Declared data type of a business term (EN 16931 "semantic data types",
/// collapsed to what the store needs to distinguish).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Free text.
    Text,
    /// Identifier (invoice number, VAT id, IBAN, ...). Stored as text.
    Identifier,
    /// Monetary amount in document currency.
    Amount,
    /// Unit price amount (may carry more decimals than an amount).
    UnitPrice,
    /// Quantity.
    Quantity,
    /// Percentage (VAT rate, allowance percentage).
    Percentage,
    /// Calendar date.
    Date,
    /// Member of a codelist.
    Code,
}

impl DataType {
    /// Whether values of this type are stored as [`BtValue::Decimal`].
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Amount | Self::UnitPrice | Self::Quantity | Self::Percentage
        )
    }

    /// Check that `value` is a legal representation of this type.
    pub fn accepts(&self, value: &BtValue) -> bool {
        match value {
            BtValue::Text(_) => matches!(self, Self::Text | Self::Identifier),
            BtValue::Decimal(_) => self.is_numeric(),
            BtValue::Date(_) => *self == Self::Date,
            BtValue::Code(_) => *self == Self::Code,
        }
    }
}

/// A typed business-term value.
///
/// Decimal equality is numeric (`30.00 == 30`), which keeps corrections
/// idempotent regardless of scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BtValue {
    Text(String),
    Decimal(Decimal),
    Date(NaiveDate),
    Code(String),
}

impl BtValue {
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Borrow the textual content of a `Text` or `Code` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Code(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for BtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) | Self::Code(s) => f.write_str(s),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<Decimal> for BtValue {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<NaiveDate> for BtValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}
