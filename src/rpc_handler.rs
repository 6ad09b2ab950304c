//! RPC method handler for the typed URL sync JSON-RPC protocol.
//!
//! Extracted from `rpc_server.rs` so it can be unit-tested independently.
//! `handle_method` dispatches a method call to the associator, the stores or
//! the settings engine held by [`App`]. `sync.abort` only touches the shared
//! abort handle, so it gets through while a pass holds the app.

use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};

use crate::app::App;
use crate::managers::history_manager::{HistoryBackend, HistoryManager};
use crate::services::settings_engine::SettingsEngineTrait;
use crate::services::typed_url_associator::{AbortHandle, AssociatorInterface};
use crate::types::history::{PageTransition, VisitSource};

/// Encode bytes to base64 string.
pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decode base64 string to bytes.
pub fn base64_decode(input: &str) -> Result<Vec<u8>, String> {
    BASE64.decode(input).map_err(|e| format!("base64 decode error: {}", e))
}

fn now_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn history_entry(history: &HistoryManager, url: &str) -> Result<Value, String> {
    let row = history
        .get_url(url)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("url not found: {}", url))?;
    let visits = history
        .get_visits_for_url(row.id)
        .map_err(|e| e.to_string())?;
    Ok(json!({"url": row, "visits": visits}))
}

/// Requests an abort of the current or next pass without touching the app.
pub fn request_abort(abort: &AbortHandle) -> Value {
    abort.request_abort();
    json!({"ok": true})
}

/// State shared by every RPC call: the app behind a lock and its abort handle outside it.
///
/// The app stays on the thread that built it; the abort handle can be cloned
/// to any thread.
pub struct RpcContext {
    pub app: Mutex<App>,
    pub abort: AbortHandle,
}

impl RpcContext {
    pub fn new(app: App) -> Self {
        let abort = app.abort.clone();
        Self {
            app: Mutex::new(app),
            abort,
        }
    }
}

/// Dispatch a JSON-RPC method call to the appropriate handler.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub fn handle_method(ctx: &RpcContext, method: &str, params: &Value) -> Result<Value, String> {
    let app = &ctx.app;
    match method {
        "ping" => Ok(json!({"pong": true})),

        // ─── Association ───
        "sync.associate" => {
            let mut a = app.lock().map_err(|e| e.to_string())?;
            let report = a
                .associator
                .associate_models()
                .map_err(|e| format!("{:?}: {}", e.kind(), e))?;
            serde_json::to_value(report).map_err(|e| e.to_string())
        }
        "sync.abort" => Ok(request_abort(&ctx.abort)),
        "sync.disassociate" => {
            let mut a = app.lock().map_err(|e| e.to_string())?;
            a.associator.disassociate_models().map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "sync.delete_all" => {
            let mut a = app.lock().map_err(|e| e.to_string())?;
            let deleted = a.associator.delete_all_nodes().map_err(|e| e.to_string())?;
            Ok(json!({"deleted": deleted}))
        }
        "sync.has_user_nodes" => {
            let a = app.lock().map_err(|e| e.to_string())?;
            let has_nodes = a
                .associator
                .sync_model_has_user_created_nodes()
                .map_err(|e| e.to_string())?;
            Ok(json!({"has_nodes": has_nodes}))
        }
        "sync.phase" => {
            let a = app.lock().map_err(|e| e.to_string())?;
            Ok(json!({"phase": a.associator.phase()}))
        }
        "sync.error_percentage" => {
            let a = app.lock().map_err(|e| e.to_string())?;
            let stats = a.associator.error_stats();
            Ok(json!({
                "error_percentage": a.associator.error_percentage(),
                "accesses": stats.accesses,
                "errors": stats.errors,
            }))
        }
        "sync.clear_error_stats" => {
            let mut a = app.lock().map_err(|e| e.to_string())?;
            a.associator.clear_error_stats();
            a.error_handler.clear();
            Ok(json!({"ok": true}))
        }
        "sync.last_error" => {
            let a = app.lock().map_err(|e| e.to_string())?;
            match a.error_handler.last_error() {
                Some((kind, message)) => Ok(json!({"kind": format!("{:?}", kind), "message": message})),
                None => Ok(Value::Null),
            }
        }
        "sync.set_passphrase" => {
            let passphrase = params
                .get("passphrase")
                .and_then(|v| v.as_str())
                .ok_or("missing passphrase")?;
            let a = app.lock().map_err(|e| e.to_string())?;
            let salt = match params.get("salt").and_then(|v| v.as_str()) {
                Some(encoded) => base64_decode(encoded)?,
                None => a.crypto.generate_salt().map_err(|e| e.to_string())?,
            };
            a.crypto
                .set_passphrase(passphrase, &salt)
                .map_err(|e| e.to_string())?;
            Ok(json!({"salt": base64_encode(&salt)}))
        }

        // ─── History ───
        "history.add_visit" => {
            let url = params.get("url").and_then(|v| v.as_str()).ok_or("missing url")?;
            let title = params.get("title").and_then(|v| v.as_str()).unwrap_or("");
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("invalid url: must start with http:// or https://".to_string());
            }
            let visit_time = params
                .get("visit_time")
                .and_then(|v| v.as_i64())
                .unwrap_or_else(now_seconds);
            let transition = match params.get("transition") {
                Some(v) => serde_json::from_value::<PageTransition>(v.clone())
                    .map_err(|e| format!("invalid transition: {}", e))?,
                None => PageTransition::Typed,
            };
            let a = app.lock().map_err(|e| e.to_string())?;
            let id = a
                .history
                .add_page_visit(url, title, visit_time, transition, VisitSource::Browsed)
                .map_err(|e| e.to_string())?;
            Ok(json!({"id": id}))
        }
        "history.get" => {
            let url = params.get("url").and_then(|v| v.as_str()).ok_or("missing url")?;
            let a = app.lock().map_err(|e| e.to_string())?;
            history_entry(&a.history, url)
        }

        // ─── Settings ───
        "settings.get" => {
            let a = app.lock().map_err(|e| e.to_string())?;
            serde_json::to_value(a.settings_engine.get_settings()).map_err(|e| e.to_string())
        }
        "settings.set" => {
            let key = params.get("key").and_then(|v| v.as_str()).ok_or("missing key")?;
            let value = params.get("value").cloned().ok_or("missing value")?;
            let mut a = app.lock().map_err(|e| e.to_string())?;
            a.settings_engine.set_value(key, value).map_err(|e| e.to_string())?;
            a.apply_settings();
            Ok(json!({"ok": true}))
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}
