//! Concrete marts
//!
//! Customer, asset, transaction, price and news tables over a [`Vault`].
//! Dimensions are recomputed on every call. Fact builders take the caller's
//! table and only append to it.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use raw_vault::keys::compose_key;
use raw_vault::model::company_key;
use raw_vault::store::ObservationRow;
use raw_vault::Vault;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vault_types::ids::{EntityKind, HashKey, LinkKind};
use vault_types::time::Timestamp;
use vault_types::value::{AttributeSet, FieldValue};

use crate::dimension::{self, DimensionRow};
use crate::fact::{assemble_into, link_index, Assembly, AssemblyReport, FactTable};

pub const FCT_TRANSACTIONS: &str = "fct_transactions";
pub const FCT_ASSET_PRICES: &str = "fct_asset_prices";
pub const FCT_NEWS_EVENTS: &str = "fct_news_events";

fn text(attributes: &AttributeSet, name: &str) -> Option<String> {
    attributes.text(name).map(str::to_string)
}

/// Natural-key parts of a hub row, empty if the hub has no such key.
fn business_key(vault: &Vault, entity: EntityKind, key: &HashKey) -> Vec<String> {
    vault
        .hub(entity)
        .and_then(|hub| hub.get(key))
        .map(|row| row.business_key.clone())
        .unwrap_or_default()
}

fn part(parts: &[String], idx: usize) -> String {
    parts.get(idx).cloned().unwrap_or_default()
}

// ── Customer dimension ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDim {
    pub customer_key: HashKey,
    pub customer_id: String,
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
    /// Current name of the company the customer belongs to.
    pub company_name: Option<String>,
    pub effective_from: Timestamp,
    pub effective_to: Timestamp,
    pub is_current: bool,
}

fn company_name(vault: &Vault, company_id: &Option<String>) -> Option<String> {
    let key = company_key(company_id).ok()?;
    let state = vault.satellite(EntityKind::Company)?.latest(&key.hub_key)?;
    text(&state.attributes, "company_name")
}

fn customer_dim(vault: &Vault, row: &DimensionRow) -> CustomerDim {
    let attrs = &row.attributes;
    let company_id = text(attrs, "company_id");
    CustomerDim {
        customer_key: row.parent_key.clone(),
        customer_id: part(&business_key(vault, EntityKind::Customer, &row.parent_key), 0),
        first_name: text(attrs, "first_name"),
        last_name: text(attrs, "last_name"),
        email: text(attrs, "email"),
        gender: text(attrs, "gender"),
        age_group: text(attrs, "age_group"),
        country: text(attrs, "country"),
        registration_date: attrs.date("registration_date"),
        customer_tier: text(attrs, "customer_tier"),
        risk_tolerance: text(attrs, "risk_tolerance"),
        customer_type: text(attrs, "customer_type"),
        company_name: company_name(vault, &company_id),
        company_id,
        effective_from: row.effective_from,
        effective_to: row.effective_to,
        is_current: row.is_current(),
    }
}

/// One row per customer: the state in force now.
pub fn dim_customer(vault: &Vault) -> Vec<CustomerDim> {
    vault
        .satellite(EntityKind::Customer)
        .map(|sat| dimension::current(sat).iter().map(|r| customer_dim(vault, r)).collect())
        .unwrap_or_default()
}

/// Every validity interval of every customer.
pub fn dim_customer_history(vault: &Vault) -> Vec<CustomerDim> {
    vault
        .satellite(EntityKind::Customer)
        .map(|sat| dimension::history(sat).iter().map(|r| customer_dim(vault, r)).collect())
        .unwrap_or_default()
}

// ── Asset dimension ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDim {
    pub asset_key: HashKey,
    pub symbol: String,
    pub asset_type: String,
    pub base_currency: Option<String>,
    pub quote_currency: Option<String>,
    pub last_price: Option<Decimal>,
    pub last_volume: Option<Decimal>,
    pub price_source: Option<String>,
    /// Observation time of the latest price state.
    pub observed_at: Timestamp,
}

pub fn dim_asset(vault: &Vault) -> Vec<AssetDim> {
    let Some(sat) = vault.satellite(EntityKind::Asset) else {
        return Vec::new();
    };
    dimension::current(sat)
        .into_iter()
        .map(|row| {
            let parts = business_key(vault, EntityKind::Asset, &row.parent_key);
            let attrs = &row.attributes;
            AssetDim {
                symbol: part(&parts, 0),
                asset_type: part(&parts, 1),
                base_currency: text(attrs, "base_currency"),
                quote_currency: text(attrs, "quote_currency"),
                last_price: attrs.decimal("price"),
                last_volume: attrs.decimal("volume"),
                price_source: text(attrs, "price_source"),
                observed_at: row.effective_from,
                asset_key: row.parent_key,
            }
        })
        .collect()
}

// ── Transaction facts ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFact {
    pub transaction_key: HashKey,
    pub transaction_id: String,
    pub customer_key: HashKey,
    pub asset_key: HashKey,
    pub transaction_type: Option<String>,
    pub quantity: Option<Decimal>,
    pub price_per_unit: Option<Decimal>,
    pub transaction_amount: Option<Decimal>,
    pub fee_amount: Option<Decimal>,
    pub transaction_timestamp: Timestamp,
    /// Customer attributes as of `transaction_timestamp`.
    pub customer_tier: Option<String>,
    pub risk_tolerance: Option<String>,
    pub data_date: NaiveDate,
    pub record_source: String,
}

/// Append every resolvable transaction not yet in `table`.
///
/// A transaction whose customer or asset link is still deferred stays
/// pending. Customer attributes are taken from the interval containing the
/// transaction time, not from the current state.
pub fn fct_transactions(vault: &Vault, table: &mut FactTable<TransactionFact>) -> AssemblyReport {
    let (Some(hub), Some(sat)) = (vault.hub(EntityKind::Transaction), vault.satellite(EntityKind::Transaction)) else {
        return AssemblyReport::default();
    };
    let customers = link_index(&vault.links, LinkKind::TransactionCustomer);
    let assets = link_index(&vault.links, LinkKind::TransactionAsset);
    let customer_sat = vault.satellite(EntityKind::Customer);

    let keys: Vec<HashKey> = hub.rows().map(|row| row.hub_key.clone()).collect();
    assemble_into(table, keys, |key| {
        let Some(state) = sat.history(key).first() else {
            return Assembly::Pending("no transaction state".to_string());
        };
        let Some(customer_key) = customers.resolve(key) else {
            return Assembly::Pending("customer link unresolved".to_string());
        };
        let Some(asset_key) = assets.resolve(key) else {
            return Assembly::Pending("asset link unresolved".to_string());
        };

        let attrs = &state.attributes;
        let event_at = attrs.timestamp("transaction_timestamp").unwrap_or(state.effective_at);
        let customer = customer_sat.and_then(|s| dimension::state_at(s, customer_key, event_at));
        let customer_attr = |name: &str| customer.as_ref().and_then(|c| text(&c.attributes, name));

        Assembly::Ready(TransactionFact {
            transaction_key: key.clone(),
            transaction_id: part(&business_key(vault, EntityKind::Transaction, key), 0),
            customer_key: customer_key.clone(),
            asset_key: asset_key.clone(),
            transaction_type: text(attrs, "transaction_type"),
            quantity: attrs.decimal("quantity"),
            price_per_unit: attrs.decimal("price_per_unit"),
            transaction_amount: attrs.decimal("transaction_amount"),
            fee_amount: attrs.decimal("fee_amount"),
            transaction_timestamp: event_at,
            customer_tier: customer_attr("customer_tier"),
            risk_tolerance: customer_attr("risk_tolerance"),
            data_date: event_at.date_naive(),
            record_source: state.record_source.clone(),
        })
    })
}

// ── Asset price facts ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFact {
    pub price_key: HashKey,
    pub asset_key: HashKey,
    pub symbol: String,
    pub asset_type: String,
    pub price: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub base_currency: Option<String>,
    pub quote_currency: Option<String>,
    pub price_source: Option<String>,
    pub observed_at: Timestamp,
    pub price_date: NaiveDate,
}

/// Event key of one price observation.
pub fn price_key(asset_key: &HashKey, observed_at: Timestamp) -> HashKey {
    compose_key(&[
        FieldValue::Text(asset_key.as_str().to_string()),
        FieldValue::Timestamp(observed_at),
    ])
}

/// One fact per price observation, repeats of an unchanged price included.
/// Attributes come from the satellite state the observation carried; if that
/// state lost a same-time tie-break, from the interval containing
/// `observed_at`.
pub fn fct_asset_prices(vault: &Vault, table: &mut FactTable<PriceFact>) -> AssemblyReport {
    let Some(sat) = vault.satellite(EntityKind::Asset) else {
        return AssemblyReport::default();
    };
    let events: BTreeMap<HashKey, &ObservationRow> = vault
        .observations
        .rows()
        .map(|obs| (price_key(&obs.parent_key, obs.observed_at), obs))
        .collect();

    let keys: Vec<HashKey> = events.keys().cloned().collect();
    assemble_into(table, keys, |key| {
        let Some(obs) = events.get(key) else {
            return Assembly::Pending("unknown price event".to_string());
        };
        let recorded = sat
            .history(&obs.parent_key)
            .iter()
            .find(|row| row.hashdiff == obs.hashdiff)
            .map(|row| row.attributes.clone());
        let attrs = match recorded {
            Some(attrs) => attrs,
            None => match dimension::state_at(sat, &obs.parent_key, obs.observed_at) {
                Some(state) => state.attributes,
                None => return Assembly::Pending(format!("no price state for {}", obs.parent_key.short())),
            },
        };
        let parts = business_key(vault, EntityKind::Asset, &obs.parent_key);
        Assembly::Ready(PriceFact {
            price_key: key.clone(),
            asset_key: obs.parent_key.clone(),
            symbol: part(&parts, 0),
            asset_type: part(&parts, 1),
            price: attrs.decimal("price"),
            volume: attrs.decimal("volume"),
            base_currency: text(&attrs, "base_currency"),
            quote_currency: text(&attrs, "quote_currency"),
            price_source: text(&attrs, "price_source"),
            observed_at: obs.observed_at,
            price_date: obs.observed_at.date_naive(),
        })
    })
}

// ── News facts ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsFact {
    pub news_key: HashKey,
    pub url: String,
    pub asset_key: HashKey,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<Timestamp>,
    pub image: Option<String>,
    /// Ingestion source of the article.
    pub record_source: String,
    pub load_timestamp: Timestamp,
}

pub fn fct_news_events(vault: &Vault, table: &mut FactTable<NewsFact>) -> AssemblyReport {
    let (Some(hub), Some(sat)) = (vault.hub(EntityKind::News), vault.satellite(EntityKind::News)) else {
        return AssemblyReport::default();
    };
    let assets = link_index(&vault.links, LinkKind::NewsAsset);

    let keys: Vec<HashKey> = hub.rows().map(|row| row.hub_key.clone()).collect();
    assemble_into(table, keys, |key| {
        let Some(state) = sat.history(key).first() else {
            return Assembly::Pending("no article state".to_string());
        };
        let Some(asset_key) = assets.resolve(key) else {
            return Assembly::Pending("asset link unresolved".to_string());
        };
        let attrs = &state.attributes;
        Assembly::Ready(NewsFact {
            news_key: key.clone(),
            url: part(&business_key(vault, EntityKind::News, key), 0),
            asset_key: asset_key.clone(),
            title: text(attrs, "title"),
            description: text(attrs, "description"),
            published_at: attrs.timestamp("published_at"),
            image: text(attrs, "image"),
            record_source: state.record_source.clone(),
            load_timestamp: state.load_timestamp,
        })
    })
}
