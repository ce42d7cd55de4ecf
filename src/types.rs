//! Common record and filter types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A single field value on an imported record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Parse the value as a float, the way a user-typed filter value is read
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) if n.is_finite() => Some(*n),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            // Whole numbers print without a trailing ".0" so "12345" matches 12345
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => write!(f, "{}", s),
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

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Opaque field -> value mapping owned by the data layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<FieldValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Get a field, treating explicit nulls as absent
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The two read-only collections the engine searches over
#[derive(Debug, Clone, Default)]
pub struct RecordCollections {
    pub balance: Arc<Vec<Record>>,
    pub positions: Arc<Vec<Record>>,
}

impl RecordCollections {
    pub fn new(balance: Vec<Record>, positions: Vec<Record>) -> Self {
        Self {
            balance: Arc::new(balance),
            positions: Arc::new(positions),
        }
    }

    pub fn len(&self) -> usize {
        self.balance.len() + self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balance.is_empty() && self.positions.is_empty()
    }
}

/// Account balance row from the balance import file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub as_of_business_date: String,
    pub account_number: String,
    pub account_name: String,
    pub net_market_value: f64,
    pub portfolio_value: f64,
    pub market_value_short: f64,
    pub total_cash: f64,
    pub equity_percentage: f64,
    pub margin_buying_power: f64,
}

/// Position row from the positions import file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPosition {
    pub as_of_business_date: String,
    pub account_number: String,
    pub account_name: String,
    pub symbol: String,
    pub security_type: String,
    pub security_description: String,
    pub number_of_shares: f64,
    pub long_short: String,
    pub price: f64,
    pub market_value: f64,
}

impl From<&AccountBalance> for Record {
    fn from(b: &AccountBalance) -> Self {
        Record::new()
            .with("asOfBusinessDate", b.as_of_business_date.as_str())
            .with("accountNumber", b.account_number.as_str())
            .with("accountName", b.account_name.as_str())
            .with("netMarketValue", b.net_market_value)
            .with("portfolioValue", b.portfolio_value)
            .with("marketValueShort", b.market_value_short)
            .with("totalCash", b.total_cash)
            .with("equityPercentage", b.equity_percentage)
            .with("marginBuyingPower", b.margin_buying_power)
    }
}

impl From<&AccountPosition> for Record {
    fn from(p: &AccountPosition) -> Self {
        Record::new()
            .with("asOfBusinessDate", p.as_of_business_date.as_str())
            .with("accountNumber", p.account_number.as_str())
            .with("accountName", p.account_name.as_str())
            .with("symbol", p.symbol.as_str())
            .with("securityType", p.security_type.as_str())
            .with("securityDescription", p.security_description.as_str())
            .with("numberOfShares", p.number_of_shares)
            .with("longShort", p.long_short.as_str())
            .with("price", p.price)
            .with("marketValue", p.market_value)
    }
}

/// Filter operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    In,
}

/// Declared type of the filtered field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Number,
    Date,
    Boolean,
}

/// Condition value: a scalar, a {min, max} range, or a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    // List first: a two-element numeric array would otherwise parse as a range
    List(Vec<FieldValue>),
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Scalar(FieldValue),
}

impl From<FieldValue> for FilterValue {
    fn from(value: FieldValue) -> Self {
        FilterValue::Scalar(value)
    }
}

/// A single typed predicate over one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    pub field: String,
    pub operator: Operator,
    pub value: FilterValue,
    pub data_type: DataType,
}

impl FilterCondition {
    pub fn new(
        field: &str,
        operator: Operator,
        value: impl Into<FilterValue>,
        data_type: DataType,
    ) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: value.into(),
            data_type,
        }
    }

    /// Numeric scalar condition, e.g. `portfolioValue > 100000`
    pub fn number(field: &str, operator: Operator, value: f64) -> Self {
        Self::new(field, operator, FieldValue::Number(value), DataType::Number)
    }

    /// String scalar condition, e.g. `accountName contains "ira"`
    pub fn text(field: &str, operator: Operator, value: &str) -> Self {
        Self::new(field, operator, FieldValue::from(value), DataType::String)
    }

    /// Inclusive range condition; a missing bound is unbounded
    pub fn between(field: &str, min: Option<f64>, max: Option<f64>) -> Self {
        Self::new(field, Operator::Between, FilterValue::Range { min, max }, DataType::Number)
    }

    /// Membership condition
    pub fn one_of(field: &str, values: Vec<FieldValue>, data_type: DataType) -> Self {
        Self::new(field, Operator::In, FilterValue::List(values), data_type)
    }
}

/// A named, reusable set of filter conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedFilterSet {
    pub id: String,
    pub name: String,
    pub conditions: Vec<FilterCondition>,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub use_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_get_treats_null_as_missing() {
        let record = Record::new()
            .with("accountNumber", "12345")
            .with("accountName", FieldValue::Null);

        assert!(record.get("accountNumber").is_some());
        assert!(record.get("accountName").is_none());
        assert!(record.get("symbol").is_none());
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Number(150000.0).to_string(), "150000");
        assert_eq!(FieldValue::Number(1.5).to_string(), "1.5");
        assert_eq!(FieldValue::Bool(true).to_string(), "true");
        assert_eq!(FieldValue::from("AAPL").to_string(), "AAPL");
    }

    #[test]
    fn test_field_value_as_f64() {
        assert_eq!(FieldValue::from(" 42.5 ").as_f64(), Some(42.5));
        assert_eq!(FieldValue::from("abc").as_f64(), None);
        assert_eq!(FieldValue::Bool(true).as_f64(), None);
    }

    #[test]
    fn test_filter_condition_deserialize() {
        let json = r#"{"field":"portfolioValue","operator":"between","value":{"min":10,"max":20},"dataType":"number"}"#;
        let condition: FilterCondition = serde_json::from_str(json).unwrap();
        assert_eq!(condition.operator, Operator::Between);
        assert_eq!(condition.value, FilterValue::Range { min: Some(10.0), max: Some(20.0) });

        let json = r#"{"field":"symbol","operator":"in","value":["AAPL","MSFT"],"dataType":"string"}"#;
        let condition: FilterCondition = serde_json::from_str(json).unwrap();
        assert!(matches!(condition.value, FilterValue::List(ref v) if v.len() == 2));

        let json = r#"{"field":"symbol","operator":"startsWith","value":"AA","dataType":"string"}"#;
        let condition: FilterCondition = serde_json::from_str(json).unwrap();
        assert_eq!(condition.value, FilterValue::Scalar(FieldValue::from("AA")));
    }

    #[test]
    fn test_position_into_record() {
        let position = AccountPosition {
            as_of_business_date: "2024-01-31".to_string(),
            account_number: "12345".to_string(),
            account_name: "Smith IRA".to_string(),
            symbol: "AAPL".to_string(),
            security_type: "Equity".to_string(),
            security_description: "Apple Inc".to_string(),
            number_of_shares: 10.0,
            long_short: "L".to_string(),
            price: 190.0,
            market_value: 1900.0,
        };

        let record = Record::from(&position);
        assert_eq!(record.get("symbol"), Some(&FieldValue::from("AAPL")));
        assert_eq!(record.get("marketValue"), Some(&FieldValue::Number(1900.0)));
    }
}
