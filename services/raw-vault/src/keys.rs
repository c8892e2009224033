//! Key Composer
//!
//! Deterministic surrogate keys and hashdiffs. One function serves every
//! entity type: the caller supplies the ordered field list, the composer
//! canonicalizes each value, joins with a delimiter that never occurs in
//! canonical text, and hashes with SHA-256.
//!
//! Identical inputs yield identical digests in any process, run or host.

use sha2::{Digest, Sha256};
use vault_types::errors::VaultError;
use vault_types::ids::{EntityKind, HashDiff, HashKey};
use vault_types::value::{AttributeSet, FieldValue};

/// ASCII unit separator.
pub const KEY_DELIMITER: char = '\u{1f}';

/// Join the canonical forms of `parts` with [`KEY_DELIMITER`].
pub fn canonical_key_string<'a>(parts: impl IntoIterator<Item = &'a FieldValue>) -> String {
    let mut out = String::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            out.push(KEY_DELIMITER);
        }
        out.push_str(&part.canonical());
    }
    out
}

fn digest(canonical: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.finalize().to_vec()
}

/// Surrogate key over an ordered tuple. Nulls hash as empty strings.
pub fn compose_key(parts: &[FieldValue]) -> HashKey {
    HashKey::from_digest(&digest(&canonical_key_string(parts)))
}

/// A validated natural key with its surrogate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessKey {
    pub hub_key: HashKey,
    /// Canonical string form of each key part, in declared order.
    pub parts: Vec<String>,
}

impl BusinessKey {
    /// Human-readable form for logs and collision reports.
    pub fn display(&self) -> String {
        self.parts.join("|")
    }
}

/// Surrogate key for a hub. Every named part is required: a null or blank
/// part is a malformed record, never an empty-string key.
pub fn compose_business_key(
    entity: EntityKind,
    parts: &[(&str, FieldValue)],
) -> Result<BusinessKey, VaultError> {
    if let Some((name, _)) = parts.iter().find(|(_, value)| value.is_blank()) {
        return Err(VaultError::MalformedRecord {
            entity,
            reason: format!("missing natural-key field `{}`", name),
        });
    }
    let values: Vec<FieldValue> = parts.iter().map(|(_, v)| v.clone()).collect();
    Ok(BusinessKey {
        hub_key: compose_key(&values),
        parts: values.iter().map(FieldValue::canonical).collect(),
    })
}

/// Surrogate key for a link over its participating hub keys, in order.
pub fn compose_link_key(hub_keys: &[HashKey]) -> HashKey {
    let parts: Vec<FieldValue> = hub_keys
        .iter()
        .map(|k| FieldValue::Text(k.as_str().to_string()))
        .collect();
    compose_key(&parts)
}

/// Content hash over descriptive attribute values in declared order.
pub fn compose_hashdiff(attributes: &AttributeSet) -> HashDiff {
    HashDiff::from_digest(&digest(&canonical_key_string(attributes.values())))
}
