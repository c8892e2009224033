//! Error types for the raw vault
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

use crate::ids::{EntityKind, HashKey, LinkKind};

/// Top-level vault error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VaultError {
    /// Upstream stream unreachable. Retryable by rerunning the same window.
    #[error("Source unavailable for {entity}: {reason}")]
    SourceUnavailable { entity: EntityKind, reason: String },

    /// Missing natural-key or metadata field. The record is quarantined.
    #[error("Malformed {entity} record: {reason}")]
    MalformedRecord { entity: EntityKind, reason: String },

    /// A referenced hub row does not exist yet. The link is deferred.
    #[error("Unresolved relationship {link}: no {missing} hub row for key {key}")]
    UnresolvedRelationship {
        link: LinkKind,
        missing: EntityKind,
        key: String,
    },

    /// Two distinct natural keys produced the same surrogate key.
    #[error("Duplicate key collision in {target}: {key} maps to both {existing} and {incoming}")]
    DuplicateKeyCollision {
        target: String,
        key: HashKey,
        existing: String,
        incoming: String,
    },
}

impl VaultError {
    /// Rerunning the same window may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::SourceUnavailable { .. })
    }

    /// The run must halt and alert.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VaultError::DuplicateKeyCollision { .. })
    }

    /// Stable numeric code for reports and alerting.
    pub fn code(&self) -> u16 {
        match self {
            VaultError::SourceUnavailable { .. } => 1001,
            VaultError::MalformedRecord { .. } => 1002,
            VaultError::UnresolvedRelationship { .. } => 1003,
            VaultError::DuplicateKeyCollision { .. } => 1004,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_record_display() {
        let err = VaultError::MalformedRecord {
            entity: EntityKind::Customer,
            reason: "missing natural-key field `customer_id`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed customer record: missing natural-key field `customer_id`"
        );
        assert_eq!(err.code(), 1002);
    }

    #[test]
    fn test_error_classification() {
        let unavailable = VaultError::SourceUnavailable {
            entity: EntityKind::Asset,
            reason: "timeout".to_string(),
        };
        assert!(unavailable.is_retryable());
        assert!(!unavailable.is_fatal());

        let collision = VaultError::DuplicateKeyCollision {
            target: "hub_asset".to_string(),
            key: HashKey::from_digest(&[7; 32]),
            existing: "AAPL|stock".to_string(),
            incoming: "MSFT|stock".to_string(),
        };
        assert!(collision.is_fatal());
        assert!(!collision.is_retryable());
        assert!(collision.to_string().contains("hub_asset"));
    }
}
