use std::fmt;

// === HistoryError ===

/// Errors raised by the local history store.
#[derive(Debug)]
pub enum HistoryError {
    /// URL row with the given ID or URL was not found.
    NotFound(String),
    /// Database operation failed.
    DatabaseError(String),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::NotFound(id) => write!(f, "History entry not found: {}", id),
            HistoryError::DatabaseError(msg) => write!(f, "History database error: {}", msg),
        }
    }
}

impl std::error::Error for HistoryError {}

// === SyncStoreError ===

/// Errors raised by the sync node store.
#[derive(Debug)]
pub enum SyncStoreError {
    /// The permanent node for the given tag does not exist.
    MissingRoot(String),
    /// Sync node with the given ID was not found.
    NotFound(String),
    /// A node or association conflicts with an existing one.
    Conflict(String),
    /// Database operation failed.
    DatabaseError(String),
}

impl fmt::Display for SyncStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStoreError::MissingRoot(tag) => write!(f, "Permanent node missing: {}", tag),
            SyncStoreError::NotFound(id) => write!(f, "Sync node not found: {}", id),
            SyncStoreError::Conflict(msg) => write!(f, "Sync node conflict: {}", msg),
            SyncStoreError::DatabaseError(msg) => write!(f, "Sync database error: {}", msg),
        }
    }
}

impl std::error::Error for SyncStoreError {}

// === SyncError ===

/// Kind of failure an association pass can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
    CryptoNotReady,
    StoreReadError,
    StoreWriteError,
    MalformedRemoteRecord,
}

/// Errors produced while associating typed URLs.
///
/// Only `CryptoNotReady` and `StoreWrite` end a pass; the others are counted
/// against the URL they occurred for.
#[derive(Debug)]
pub enum SyncError {
    /// The cryptographer cannot decrypt typed URL data yet.
    CryptoNotReady,
    /// Reading from either store failed.
    StoreRead(String),
    /// Writing a batch to either store failed.
    StoreWrite(String),
    /// A remote record could not be decoded.
    MalformedRemoteRecord(String),
}

impl SyncError {
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            SyncError::CryptoNotReady => SyncErrorKind::CryptoNotReady,
            SyncError::StoreRead(_) => SyncErrorKind::StoreReadError,
            SyncError::StoreWrite(_) => SyncErrorKind::StoreWriteError,
            SyncError::MalformedRemoteRecord(_) => SyncErrorKind::MalformedRemoteRecord,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::CryptoNotReady => {
                write!(f, "Cryptographer not ready for typed URLs")
            }
            SyncError::StoreRead(msg) => write!(f, "Store read error: {}", msg),
            SyncError::StoreWrite(msg) => write!(f, "Store write error: {}", msg),
            SyncError::MalformedRemoteRecord(msg) => {
                write!(f, "Malformed typed URL record: {}", msg)
            }
        }
    }
}

impl std::error::Error for SyncError {}

// === CryptoError ===

/// Errors related to the sync cryptographer.
#[derive(Debug)]
pub enum CryptoError {
    /// Failed to derive encryption key from a passphrase.
    KeyDerivation(String),
    /// Failed to generate random bytes.
    RandomGeneration(String),
    /// The provided salt or key material is invalid.
    InvalidKey(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::KeyDerivation(msg) => write!(f, "Key derivation failed: {}", msg),
            CryptoError::RandomGeneration(msg) => {
                write!(f, "Random generation failed: {}", msg)
            }
            CryptoError::InvalidKey(msg) => write!(f, "Invalid key: {}", msg),
        }
    }
}

impl std::error::Error for CryptoError {}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    IoError(String),
    /// Failed to serialize or deserialize settings.
    SerializationError(String),
    /// The provided settings key is invalid.
    InvalidKey(String),
    /// The provided settings value is invalid.
    InvalidValue(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::IoError(msg) => write!(f, "Settings I/O error: {}", msg),
            SettingsError::SerializationError(msg) => {
                write!(f, "Settings serialization error: {}", msg)
            }
            SettingsError::InvalidKey(key) => write!(f, "Invalid settings key: {}", key),
            SettingsError::InvalidValue(msg) => {
                write!(f, "Invalid settings value: {}", msg)
            }
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<HistoryError> for SyncError {
    fn from(err: HistoryError) -> Self {
        SyncError::StoreRead(err.to_string())
    }
}

impl From<SyncStoreError> for SyncError {
    fn from(err: SyncStoreError) -> Self {
        SyncError::StoreRead(err.to_string())
    }
}
