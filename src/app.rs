//! App Core for the typed URL sync service.
//!
//! Owns both databases, the stores on top of them, and the associator that
//! reconciles them.

use std::path::Path;
use std::sync::Arc;

use crate::database::connection::Database;
use crate::managers::history_manager::{HistoryBackend, HistoryManager};
use crate::managers::sync_node_store::{SyncNodeStore, SyncStore};
use crate::services::crypto_service::{CryptoReadiness, SyncCryptographer};
use crate::services::error_handler::{DataTypeErrorHandler, RecordingErrorHandler};
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use crate::services::typed_url_associator::{AbortHandle, TypedUrlAssociator};

/// History database file name inside the data directory.
pub const HISTORY_DB_FILE: &str = "History.db";
/// Sync database file name inside the data directory.
pub const SYNC_DB_FILE: &str = "Sync.db";
/// Settings file name inside the data directory.
pub const SETTINGS_FILE: &str = "sync_settings.json";

/// Central struct holding the stores, collaborators and the associator.
pub struct App {
    pub history: Arc<HistoryManager>,
    pub sync_store: Arc<SyncNodeStore>,
    pub crypto: Arc<SyncCryptographer>,
    pub error_handler: Arc<RecordingErrorHandler>,
    pub settings_engine: SettingsEngine,
    /// Shared with every associator this app builds. Usable without holding the app.
    pub abort: AbortHandle,
    pub associator: TypedUrlAssociator,
}

impl App {
    /// Opens (or creates) both databases and the settings file under `data_dir`.
    pub fn new(data_dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(data_dir)?;
        let history_db = Arc::new(Database::open(data_dir.join(HISTORY_DB_FILE))?);
        let sync_db = Arc::new(Database::open(data_dir.join(SYNC_DB_FILE))?);

        let mut settings_engine =
            SettingsEngine::new(data_dir.join(SETTINGS_FILE).to_string_lossy().to_string());
        settings_engine
            .load()
            .map_err(|e| format!("Settings load failed: {}", e))?;

        Ok(Self::assemble(history_db, sync_db, settings_engine))
    }

    /// Builds an app over in-memory databases; settings live at `settings_path`.
    pub fn open_in_memory(settings_path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let history_db = Arc::new(Database::open_in_memory()?);
        let sync_db = Arc::new(Database::open_in_memory()?);
        let mut settings_engine = SettingsEngine::new(settings_path);
        settings_engine
            .load()
            .map_err(|e| format!("Settings load failed: {}", e))?;
        Ok(Self::assemble(history_db, sync_db, settings_engine))
    }

    fn assemble(history_db: Arc<Database>, sync_db: Arc<Database>, settings_engine: SettingsEngine) -> Self {
        let settings = settings_engine.get_settings().clone();
        let history = Arc::new(HistoryManager::new(history_db));
        let sync_store = Arc::new(SyncNodeStore::new(sync_db));
        let crypto = Arc::new(SyncCryptographer::new(settings.encryption.encrypt_typed_urls));
        let error_handler = Arc::new(RecordingErrorHandler::new());
        let abort = AbortHandle::new();

        let associator = TypedUrlAssociator::new(
            history.clone() as Arc<dyn HistoryBackend>,
            sync_store.clone() as Arc<dyn SyncStore>,
            crypto.clone() as Arc<dyn CryptoReadiness>,
            error_handler.clone() as Arc<dyn DataTypeErrorHandler>,
            settings.association,
        )
        .with_abort_handle(abort.clone());

        Self {
            history,
            sync_store,
            crypto,
            error_handler,
            settings_engine,
            abort,
            associator,
        }
    }

    /// Applies the current settings to the cryptographer and a fresh associator.
    ///
    /// Associations are reloaded from the sync store on the next pass; error
    /// statistics start over. A pending abort request carries over.
    pub fn apply_settings(&mut self) {
        let settings = self.settings_engine.get_settings().clone();
        self.crypto
            .set_encrypt_typed_urls(settings.encryption.encrypt_typed_urls);
        self.associator = TypedUrlAssociator::new(
            self.history.clone() as Arc<dyn HistoryBackend>,
            self.sync_store.clone() as Arc<dyn SyncStore>,
            self.crypto.clone() as Arc<dyn CryptoReadiness>,
            self.error_handler.clone() as Arc<dyn DataTypeErrorHandler>,
            settings.association,
        )
        .with_abort_handle(self.abort.clone());
    }
}
