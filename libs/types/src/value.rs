//! Typed field values and attribute sets
//!
//! Every value has exactly one canonical string form. Surrogate keys and
//! hashdiffs are computed over canonical forms only, so `1.50` and `1.5`,
//! or `" Gold "` and `"Gold"`, hash identically.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::time::{canonical_timestamp, Timestamp};

/// A single typed field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Text(String),
    Int(i64),
    Decimal(Decimal),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(Timestamp),
}

impl FieldValue {
    /// Canonical string representation. Nulls become the empty string.
    pub fn canonical(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Text(s) => s.trim().to_string(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Decimal(d) => d.normalize().to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Timestamp(ts) => canonical_timestamp(ts),
        }
    }

    /// True for nulls and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Decimal(d) => Some(*d),
            FieldValue::Int(i) => Some(Decimal::from(*i)),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        FieldValue::Text(value.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Decimal(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<Timestamp> for FieldValue {
    fn from(value: Timestamp) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

// ── Attribute sets ──────────────────────────────────────────────────

/// Ordered list of named descriptive attributes.
///
/// Order is significant: the hashdiff is computed over values in declared
/// order, so every producer of a given entity must declare the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet(Vec<(String, FieldValue)>);

impl AttributeSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builder-style append.
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.0.push((name.to_string(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn decimal(&self, name: &str) -> Option<Decimal> {
        self.get(name).and_then(FieldValue::as_decimal)
    }

    pub fn timestamp(&self, name: &str) -> Option<Timestamp> {
        self.get(name).and_then(FieldValue::as_timestamp)
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        self.get(name).and_then(FieldValue::as_date)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.0.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    #[test]
    fn test_canonical_null_is_empty() {
        assert_eq!(FieldValue::Null.canonical(), "");
        assert_eq!(FieldValue::from(None::<String>), FieldValue::Null);
    }

    #[test]
    fn test_canonical_text_trims() {
        assert_eq!(FieldValue::from("  AAPL ").canonical(), "AAPL");
        assert!(FieldValue::from("   ").is_blank());
    }

    #[test]
    fn test_canonical_decimal_normalizes() {
        let a = FieldValue::from(Decimal::from_str("1.50").unwrap());
        let b = FieldValue::from(Decimal::from_str("1.5").unwrap());
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), "1.5");
    }

    #[test]
    fn test_canonical_dates_and_timestamps() {
        let d = NaiveDate::from_ymd_opt(2023, 7, 4).unwrap();
        assert_eq!(FieldValue::from(d).canonical(), "2023-07-04");
        let ts = Utc.with_ymd_and_hms(2023, 7, 4, 9, 30, 0).unwrap();
        assert_eq!(FieldValue::from(ts).canonical(), "2023-07-04T09:30:00.000000Z");
    }

    #[test]
    fn test_attribute_set_lookup_preserves_order() {
        let attrs = AttributeSet::new()
            .with("tier", "Gold")
            .with("country", "DE")
            .with("age", 42i64);
        let names: Vec<&str> = attrs.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["tier", "country", "age"]);
        assert_eq!(attrs.text("tier"), Some("Gold"));
        assert_eq!(attrs.decimal("age"), Some(Decimal::from(42)));
        assert!(attrs.get("missing").is_none());
    }

    #[test]
    fn test_field_value_serde_roundtrip() {
        let attrs = AttributeSet::new()
            .with("price", Decimal::from_str("101.25").unwrap())
            .with("note", None::<String>);
        let json = serde_json::to_string(&attrs).unwrap();
        let back: AttributeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
    }
}
