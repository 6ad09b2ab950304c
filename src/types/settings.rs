use serde::{Deserialize, Serialize};

use super::specifics::TYPED_URL_TAG;

/// Top-level settings for typed URL association.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSettings {
    pub association: AssociationSettings,
    pub encryption: EncryptionSettings,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            association: AssociationSettings::default(),
            encryption: EncryptionSettings::default(),
        }
    }
}

/// Tuning for one association pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssociationSettings {
    /// Tag of the permanent node typed URL nodes live under.
    pub typed_url_tag: String,
    /// Upper bound on visits read from history for a single URL.
    pub max_visits_to_fetch: usize,
    /// Visits older than this many days are not kept in the sync store.
    pub visit_expiry_days: u32,
}

impl Default for AssociationSettings {
    fn default() -> Self {
        Self {
            typed_url_tag: TYPED_URL_TAG.to_string(),
            max_visits_to_fetch: 1000,
            visit_expiry_days: 90,
        }
    }
}

/// Encryption state of the typed URL data type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncryptionSettings {
    /// When set, association requires the cryptographer to hold a key.
    pub encrypt_typed_urls: bool,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            encrypt_typed_urls: false,
        }
    }
}
