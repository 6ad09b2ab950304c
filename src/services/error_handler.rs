//! Receivers for pass-level association failures.

use std::sync::Mutex;

use crate::types::errors::{SyncError, SyncErrorKind};

/// Told about failures that end an association pass.
pub trait DataTypeErrorHandler {
    fn on_unrecoverable_error(&self, error: &SyncError);
}

/// Logs every failure and keeps the most recent one for callers to query.
#[derive(Default)]
pub struct RecordingErrorHandler {
    last: Mutex<Option<(SyncErrorKind, String)>>,
}

impl RecordingErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_error(&self) -> Option<(SyncErrorKind, String)> {
        self.last.lock().ok().and_then(|last| last.clone())
    }

    pub fn clear(&self) {
        if let Ok(mut last) = self.last.lock() {
            *last = None;
        }
    }
}

impl DataTypeErrorHandler for RecordingErrorHandler {
    fn on_unrecoverable_error(&self, error: &SyncError) {
        log::error!("typed url association failed: {}", error);
        if let Ok(mut last) = self.last.lock() {
            *last = Some((error.kind(), error.to_string()));
        }
    }
}
