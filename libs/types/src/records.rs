//! Raw source record schemas
//!
//! These mirror what the ingestion connectors append to their streams. Every
//! field is optional on the wire: a record missing its natural key must
//! reach the vault so it can be quarantined with a reason, rather than being
//! lost as a deserialization failure.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::EntityKind;
use crate::time::Timestamp;

/// Customer profile record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerRecord {
    pub customer_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub age_group: Option<String>,
    pub country: Option<String>,
    pub registration_date: Option<NaiveDate>,
    pub customer_tier: Option<String>,
    pub risk_tolerance: Option<String>,
    pub customer_type: Option<String>,
    pub company_id: Option<String>,
    pub load_timestamp: Option<Timestamp>,
    pub record_source: Option<String>,
}

/// Corporate customer record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyRecord {
    pub company_id: Option<String>,
    pub company_name: Option<String>,
    pub company_type: Option<String>,
    pub company_email: Option<String>,
    pub country: Option<String>,
    pub year_founded: Option<i64>,
    pub tax_number: Option<String>,
    pub office_primary_location: Option<String>,
    pub registration_date: Option<NaiveDate>,
    pub load_timestamp: Option<Timestamp>,
    pub record_source: Option<String>,
}

/// Buy/sell transaction record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionRecord {
    pub transaction_id: Option<String>,
    pub customer_id: Option<String>,
    /// STOCK or CRYPTO.
    pub asset_type: Option<String>,
    pub asset_symbol: Option<String>,
    /// BUY or SELL.
    pub transaction_type: Option<String>,
    pub quantity: Option<Decimal>,
    pub price_per_unit: Option<Decimal>,
    pub transaction_amount: Option<Decimal>,
    pub fee_amount: Option<Decimal>,
    pub transaction_timestamp: Option<Timestamp>,
    pub load_timestamp: Option<Timestamp>,
    pub record_source: Option<String>,
}

/// Observed market price for an asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetPriceRecord {
    pub symbol: Option<String>,
    pub asset_type: Option<String>,
    pub base_currency: Option<String>,
    pub quote_currency: Option<String>,
    pub price: Option<Decimal>,
    pub volume: Option<Decimal>,
    /// Upstream price provider.
    #[serde(alias = "source")]
    pub price_source: Option<String>,
    pub observed_at: Option<Timestamp>,
    pub load_timestamp: Option<Timestamp>,
    pub record_source: Option<String>,
}

/// News article mentioning a crypto asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsRecord {
    pub url: Option<String>,
    pub cryptocurrency: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "date")]
    pub published_at: Option<Timestamp>,
    pub image: Option<String>,
    pub load_timestamp: Option<Timestamp>,
    pub record_source: Option<String>,
}

/// Any raw record, tagged with the entity whose stream it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum SourceRecord {
    Customer(CustomerRecord),
    Company(CompanyRecord),
    Asset(AssetPriceRecord),
    Transaction(TransactionRecord),
    News(NewsRecord),
}

impl SourceRecord {
    pub fn entity(&self) -> EntityKind {
        match self {
            SourceRecord::Customer(_) => EntityKind::Customer,
            SourceRecord::Company(_) => EntityKind::Company,
            SourceRecord::Asset(_) => EntityKind::Asset,
            SourceRecord::Transaction(_) => EntityKind::Transaction,
            SourceRecord::News(_) => EntityKind::News,
        }
    }

    pub fn load_timestamp(&self) -> Option<Timestamp> {
        match self {
            SourceRecord::Customer(r) => r.load_timestamp,
            SourceRecord::Company(r) => r.load_timestamp,
            SourceRecord::Asset(r) => r.load_timestamp,
            SourceRecord::Transaction(r) => r.load_timestamp,
            SourceRecord::News(r) => r.load_timestamp,
        }
    }

    pub fn record_source(&self) -> Option<&str> {
        match self {
            SourceRecord::Customer(r) => r.record_source.as_deref(),
            SourceRecord::Company(r) => r.record_source.as_deref(),
            SourceRecord::Asset(r) => r.record_source.as_deref(),
            SourceRecord::Transaction(r) => r.record_source.as_deref(),
            SourceRecord::News(r) => r.record_source.as_deref(),
        }
    }
}
