//! Identifier types for vault entities
//!
//! Hub, link and satellite rows are addressed by hex-encoded SHA-256 digests.
//! `HashKey` and `HashDiff` share a representation but are distinct types so a
//! content hash can never be used where a surrogate key is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Errors raised when parsing identifiers from text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdParseError {
    #[error("Invalid digest length: expected 64, got {0}")]
    InvalidLength(usize),

    #[error("Digest must be lowercase hex: {0}")]
    InvalidHex(String),

    #[error("Unknown entity kind: {0}")]
    UnknownEntity(String),

    #[error("Unknown link kind: {0}")]
    UnknownLink(String),
}

fn validate_digest(value: &str) -> Result<(), IdParseError> {
    if value.len() != DIGEST_HEX_LEN {
        return Err(IdParseError::InvalidLength(value.len()));
    }
    if !value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        return Err(IdParseError::InvalidHex(value.to_string()));
    }
    Ok(())
}

/// Surrogate key of a hub or link row.
///
/// A pure function of the natural key; see `raw_vault::keys`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HashKey(String);

impl HashKey {
    /// Build from raw digest bytes.
    pub fn from_digest(digest: &[u8]) -> Self {
        debug_assert_eq!(digest.len() * 2, DIGEST_HEX_LEN);
        Self(hex::encode(digest))
    }

    /// Parse a hex digest, validating length and alphabet.
    pub fn parse(value: &str) -> Result<Self, IdParseError> {
        validate_digest(value)?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl TryFrom<String> for HashKey {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_digest(&value)?;
        Ok(Self(value))
    }
}

impl From<HashKey> for String {
    fn from(key: HashKey) -> Self {
        key.0
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content hash over a satellite's descriptive attributes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HashDiff(String);

impl HashDiff {
    pub fn from_digest(digest: &[u8]) -> Self {
        debug_assert_eq!(digest.len() * 2, DIGEST_HEX_LEN);
        Self(hex::encode(digest))
    }

    pub fn parse(value: &str) -> Result<Self, IdParseError> {
        validate_digest(value)?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HashDiff {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_digest(&value)?;
        Ok(Self(value))
    }
}

impl From<HashDiff> for String {
    fn from(diff: HashDiff) -> Self {
        diff.0
    }
}

impl fmt::Display for HashDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a pipeline run
///
/// Uses UUID v7 so runs sort chronologically in reports and quarantine logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new RunId with current timestamp
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Entity kinds ────────────────────────────────────────────────────

/// Business entity types with a hub of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    Company,
    Asset,
    Transaction,
    News,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Customer,
        EntityKind::Company,
        EntityKind::Asset,
        EntityKind::Transaction,
        EntityKind::News,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customer",
            EntityKind::Company => "company",
            EntityKind::Asset => "asset",
            EntityKind::Transaction => "transaction",
            EntityKind::News => "news",
        }
    }

    /// Name of the hub target, used for watermarks and logs.
    pub fn hub_target(&self) -> String {
        format!("hub_{}", self.as_str())
    }

    /// Name of the satellite target hanging off this entity's hub.
    pub fn satellite_target(&self) -> String {
        format!("sat_{}", self.as_str())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| IdParseError::UnknownEntity(s.to_string()))
    }
}

/// Relationship types between hubs.
///
/// The first participant is always the driving entity: the entity whose
/// source records carry the relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    CustomerCompany,
    TransactionCustomer,
    TransactionAsset,
    NewsAsset,
}

impl LinkKind {
    pub const ALL: [LinkKind; 4] = [
        LinkKind::CustomerCompany,
        LinkKind::TransactionCustomer,
        LinkKind::TransactionAsset,
        LinkKind::NewsAsset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::CustomerCompany => "customer_company",
            LinkKind::TransactionCustomer => "transaction_customer",
            LinkKind::TransactionAsset => "transaction_asset",
            LinkKind::NewsAsset => "news_asset",
        }
    }

    /// Ordered participating hubs.
    pub fn participants(&self) -> &'static [EntityKind] {
        match self {
            LinkKind::CustomerCompany => &[EntityKind::Customer, EntityKind::Company],
            LinkKind::TransactionCustomer => &[EntityKind::Transaction, EntityKind::Customer],
            LinkKind::TransactionAsset => &[EntityKind::Transaction, EntityKind::Asset],
            LinkKind::NewsAsset => &[EntityKind::News, EntityKind::Asset],
        }
    }

    pub fn driving_entity(&self) -> EntityKind {
        self.participants()[0]
    }

    pub fn target(&self) -> String {
        format!("link_{}", self.as_str())
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkKind {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LinkKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| IdParseError::UnknownLink(s.to_string()))
    }
}
