//! Staging model
//!
//! Maps raw source records onto the vault's shape: a validated business key,
//! the descriptive attributes in declared order, a hashdiff, an effective
//! time and the relationship candidates the record carries.
//!
//! Asset keys are normalized (symbol upper-case, type lower-case) so that a
//! transaction's `("aapl", "STOCK")`, a price feed's `("AAPL", "stock")` and a
//! news mention resolve to the same hub row.

use serde::{Deserialize, Serialize};
use vault_types::errors::VaultError;
use vault_types::ids::{EntityKind, HashDiff, HashKey, LinkKind};
use vault_types::records::{
    AssetPriceRecord, CompanyRecord, CustomerRecord, NewsRecord, SourceRecord, TransactionRecord,
};
use vault_types::time::Timestamp;
use vault_types::value::{AttributeSet, FieldValue};

use crate::dedup::{Candidate, StateCandidate};
use crate::keys::{compose_business_key, compose_hashdiff, compose_link_key, BusinessKey};

/// Asset type assumed for news mentions, which only name a crypto symbol.
pub const NEWS_ASSET_TYPE: &str = "crypto";

/// One participant of a relationship candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub entity: EntityKind,
    pub hub_key: HashKey,
    pub business_key: Vec<String>,
}

/// A relationship as carried by a source record, not yet resolved against
/// the hubs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub kind: LinkKind,
    pub link_key: HashKey,
    pub participants: Vec<Participant>,
    pub load_timestamp: Timestamp,
    pub record_source: String,
}

impl LinkCandidate {
    fn new(
        kind: LinkKind,
        participants: Vec<Participant>,
        load_timestamp: Timestamp,
        record_source: &str,
    ) -> Self {
        let hub_keys: Vec<HashKey> = participants.iter().map(|p| p.hub_key.clone()).collect();
        Self {
            kind,
            link_key: compose_link_key(&hub_keys),
            participants,
            load_timestamp,
            record_source: record_source.to_string(),
        }
    }

    pub fn hub_keys(&self) -> Vec<HashKey> {
        self.participants.iter().map(|p| p.hub_key.clone()).collect()
    }
}

impl Candidate for LinkCandidate {
    fn load_timestamp(&self) -> Timestamp {
        self.load_timestamp
    }

    fn record_source(&self) -> &str {
        &self.record_source
    }
}

/// A source record in vault shape.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRecord {
    pub entity: EntityKind,
    pub key: BusinessKey,
    pub attributes: AttributeSet,
    pub hashdiff: HashDiff,
    pub effective_at: Timestamp,
    pub load_timestamp: Timestamp,
    pub record_source: String,
    pub links: Vec<LinkCandidate>,
}

impl StagedRecord {
    pub fn hub_key(&self) -> &HashKey {
        &self.key.hub_key
    }
}

impl Candidate for StagedRecord {
    fn load_timestamp(&self) -> Timestamp {
        self.load_timestamp
    }

    fn record_source(&self) -> &str {
        &self.record_source
    }
}

impl StateCandidate for StagedRecord {
    fn parent_key(&self) -> &HashKey {
        &self.key.hub_key
    }

    fn hashdiff(&self) -> &HashDiff {
        &self.hashdiff
    }

    fn effective_at(&self) -> Timestamp {
        self.effective_at
    }
}

// ── Key helpers ─────────────────────────────────────────────────────

fn text(value: &Option<String>) -> FieldValue {
    FieldValue::from(value.clone())
}

pub fn customer_key(customer_id: &Option<String>) -> Result<BusinessKey, VaultError> {
    compose_business_key(EntityKind::Customer, &[("customer_id", text(customer_id))])
}

pub fn company_key(company_id: &Option<String>) -> Result<BusinessKey, VaultError> {
    compose_business_key(EntityKind::Company, &[("company_id", text(company_id))])
}

pub fn asset_key(symbol: &Option<String>, asset_type: &Option<String>) -> Result<BusinessKey, VaultError> {
    let symbol = symbol.as_ref().map(|s| s.trim().to_uppercase());
    let asset_type = asset_type.as_ref().map(|s| s.trim().to_lowercase());
    compose_business_key(
        EntityKind::Asset,
        &[("symbol", FieldValue::from(symbol)), ("asset_type", FieldValue::from(asset_type))],
    )
}

pub fn transaction_key(transaction_id: &Option<String>) -> Result<BusinessKey, VaultError> {
    compose_business_key(EntityKind::Transaction, &[("transaction_id", text(transaction_id))])
}

pub fn news_key(url: &Option<String>) -> Result<BusinessKey, VaultError> {
    compose_business_key(EntityKind::News, &[("url", text(url))])
}

fn participant(entity: EntityKind, key: BusinessKey) -> Participant {
    Participant {
        entity,
        hub_key: key.hub_key,
        business_key: key.parts,
    }
}

struct Meta {
    load_timestamp: Timestamp,
    record_source: String,
}

fn required_meta(
    entity: EntityKind,
    load_timestamp: Option<Timestamp>,
    record_source: &Option<String>,
) -> Result<Meta, VaultError> {
    let load_timestamp = load_timestamp.ok_or_else(|| VaultError::MalformedRecord {
        entity,
        reason: "missing metadata field `load_timestamp`".to_string(),
    })?;
    let record_source = record_source
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| VaultError::MalformedRecord {
            entity,
            reason: "missing metadata field `record_source`".to_string(),
        })?;
    Ok(Meta {
        load_timestamp,
        record_source: record_source.to_string(),
    })
}

// ── Staging ─────────────────────────────────────────────────────────

/// Map a raw record to vault shape.
///
/// Fails with [`VaultError::MalformedRecord`] when a natural-key or metadata
/// field is missing. Optional relationships with a blank key are simply not
/// emitted.
pub fn stage(record: &SourceRecord) -> Result<StagedRecord, VaultError> {
    match record {
        SourceRecord::Customer(r) => stage_customer(r),
        SourceRecord::Company(r) => stage_company(r),
        SourceRecord::Asset(r) => stage_asset(r),
        SourceRecord::Transaction(r) => stage_transaction(r),
        SourceRecord::News(r) => stage_news(r),
    }
}

fn finish(
    entity: EntityKind,
    key: BusinessKey,
    attributes: AttributeSet,
    effective_at: Timestamp,
    meta: Meta,
    links: Vec<LinkCandidate>,
) -> StagedRecord {
    StagedRecord {
        entity,
        key,
        hashdiff: compose_hashdiff(&attributes),
        attributes,
        effective_at,
        load_timestamp: meta.load_timestamp,
        record_source: meta.record_source,
        links,
    }
}

fn stage_customer(r: &CustomerRecord) -> Result<StagedRecord, VaultError> {
    let entity = EntityKind::Customer;
    let key = customer_key(&r.customer_id)?;
    let meta = required_meta(entity, r.load_timestamp, &r.record_source)?;

    let attributes = AttributeSet::new()
        .with("first_name", text(&r.first_name))
        .with("last_name", text(&r.last_name))
        .with("email", text(&r.email))
        .with("gender", text(&r.gender))
        .with("age_group", text(&r.age_group))
        .with("country", text(&r.country))
        .with("registration_date", r.registration_date)
        .with("customer_tier", text(&r.customer_tier))
        .with("risk_tolerance", text(&r.risk_tolerance))
        .with("customer_type", text(&r.customer_type))
        .with("company_id", text(&r.company_id));

    let mut links = Vec::new();
    if let Ok(company) = company_key(&r.company_id) {
        links.push(LinkCandidate::new(
            LinkKind::CustomerCompany,
            vec![participant(entity, key.clone()), participant(EntityKind::Company, company)],
            meta.load_timestamp,
            &meta.record_source,
        ));
    }

    Ok(finish(entity, key, attributes, meta.load_timestamp, meta, links))
}

fn stage_company(r: &CompanyRecord) -> Result<StagedRecord, VaultError> {
    let entity = EntityKind::Company;
    let key = company_key(&r.company_id)?;
    let meta = required_meta(entity, r.load_timestamp, &r.record_source)?;

    let attributes = AttributeSet::new()
        .with("company_name", text(&r.company_name))
        .with("company_type", text(&r.company_type))
        .with("company_email", text(&r.company_email))
        .with("country", text(&r.country))
        .with("year_founded", r.year_founded)
        .with("tax_number", text(&r.tax_number))
        .with("office_primary_location", text(&r.office_primary_location))
        .with("registration_date", r.registration_date);

    Ok(finish(entity, key, attributes, meta.load_timestamp, meta, Vec::new()))
}

fn stage_asset(r: &AssetPriceRecord) -> Result<StagedRecord, VaultError> {
    let entity = EntityKind::Asset;
    let key = asset_key(&r.symbol, &r.asset_type)?;
    let meta = required_meta(entity, r.load_timestamp, &r.record_source)?;
    let observed_at = r.observed_at.ok_or_else(|| VaultError::MalformedRecord {
        entity,
        reason: "missing field `observed_at`".to_string(),
    })?;

    let attributes = AttributeSet::new()
        .with("base_currency", text(&r.base_currency))
        .with("quote_currency", text(&r.quote_currency))
        .with("price", r.price)
        .with("volume", r.volume)
        .with("price_source", text(&r.price_source));

    Ok(finish(entity, key, attributes, observed_at, meta, Vec::new()))
}

fn stage_transaction(r: &TransactionRecord) -> Result<StagedRecord, VaultError> {
    let entity = EntityKind::Transaction;
    let key = transaction_key(&r.transaction_id)?;
    let meta = required_meta(entity, r.load_timestamp, &r.record_source)?;

    let attributes = AttributeSet::new()
        .with("transaction_type", r.transaction_type.as_ref().map(|t| t.trim().to_uppercase()))
        .with("quantity", r.quantity)
        .with("price_per_unit", r.price_per_unit)
        .with("transaction_amount", r.transaction_amount)
        .with("fee_amount", r.fee_amount)
        .with("transaction_timestamp", r.transaction_timestamp);

    let mut links = Vec::new();
    if let Ok(customer) = customer_key(&r.customer_id) {
        links.push(LinkCandidate::new(
            LinkKind::TransactionCustomer,
            vec![participant(entity, key.clone()), participant(EntityKind::Customer, customer)],
            meta.load_timestamp,
            &meta.record_source,
        ));
    }
    if let Ok(asset) = asset_key(&r.asset_symbol, &r.asset_type) {
        links.push(LinkCandidate::new(
            LinkKind::TransactionAsset,
            vec![participant(entity, key.clone()), participant(EntityKind::Asset, asset)],
            meta.load_timestamp,
            &meta.record_source,
        ));
    }

    Ok(finish(entity, key, attributes, meta.load_timestamp, meta, links))
}

fn stage_news(r: &NewsRecord) -> Result<StagedRecord, VaultError> {
    let entity = EntityKind::News;
    let key = news_key(&r.url)?;
    let meta = required_meta(entity, r.load_timestamp, &r.record_source)?;

    let attributes = AttributeSet::new()
        .with("title", text(&r.title))
        .with("description", text(&r.description))
        .with("published_at", r.published_at)
        .with("image", text(&r.image))
        .with("cryptocurrency", text(&r.cryptocurrency));

    let mut links = Vec::new();
    let crypto = Some(NEWS_ASSET_TYPE.to_string());
    if let Ok(asset) = asset_key(&r.cryptocurrency, &crypto) {
        links.push(LinkCandidate::new(
            LinkKind::NewsAsset,
            vec![participant(entity, key.clone()), participant(EntityKind::Asset, asset)],
            meta.load_timestamp,
            &meta.record_source,
        ));
    }

    Ok(finish(entity, key, attributes, meta.load_timestamp, meta, links))
}
