//! Typed URL sync RPC server: JSON-RPC over stdin/stdout.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! Request:  {"id":1, "method":"sync.associate", "params":{}}
//! Response: {"id":1, "result":{...}} or {"id":1, "error":"..."}
//!
//! The app lives on a worker thread that runs requests in order. `sync.abort`
//! is answered by the reader right away, so it reaches a pass the worker is
//! still running.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use serde_json::{json, Value};

use typed_url_sync::app::App;
use typed_url_sync::rpc_handler::{handle_method, request_abort, RpcContext};
use typed_url_sync::services::typed_url_associator::AbortHandle;

struct Request {
    id: Value,
    method: String,
    params: Value,
}

fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TYPED_URL_SYNC_DATA_DIR") {
        return PathBuf::from(dir);
    }
    match std::env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".")),
        Err(_) => PathBuf::from("."),
    }
}

fn respond(value: &Value) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", value)?;
    out.flush()
}

/// Opens the app on this thread, hands its abort handle out, then serves `requests`.
fn run_worker(
    dir: PathBuf,
    ready: mpsc::Sender<Result<AbortHandle, String>>,
    requests: mpsc::Receiver<Request>,
) -> Result<(), String> {
    let app = match App::new(&dir) {
        Ok(app) => app,
        Err(e) => {
            let msg = format!("failed to open {}: {}", dir.display(), e);
            let _ = ready.send(Err(msg.clone()));
            return Err(msg);
        }
    };
    let ctx = RpcContext::new(app);
    if ready.send(Ok(ctx.abort.clone())).is_err() {
        return Ok(());
    }

    for req in requests {
        log::debug!("rpc {}", req.method);
        let response = match handle_method(&ctx, &req.method, &req.params) {
            Ok(val) => json!({"id": req.id, "result": val}),
            Err(err) => json!({"id": req.id, "error": err}),
        };
        respond(&response).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let dir = data_dir();
    log::info!("opening typed url sync data in {}", dir.display());

    let (ready_tx, ready_rx) = mpsc::channel();
    let (tx, rx) = mpsc::channel::<Request>();
    let worker = thread::spawn(move || run_worker(dir, ready_tx, rx));
    let abort = ready_rx.recv()??;

    respond(&json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")}))?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::warn!("stdin closed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                respond(&json!({"id": null, "error": format!("parse error: {}", e)}))?;
                continue;
            }
        };

        let req = Request {
            id: value.get("id").cloned().unwrap_or(Value::Null),
            method: value
                .get("method")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            params: value.get("params").cloned().unwrap_or(json!({})),
        };

        if req.method == "sync.abort" {
            respond(&json!({"id": req.id, "result": request_abort(&abort)}))?;
            continue;
        }
        if tx.send(req).is_err() {
            log::error!("rpc worker stopped, closing");
            break;
        }
    }

    drop(tx);
    match worker.join() {
        Ok(result) => result?,
        Err(_) => return Err("rpc worker panicked".into()),
    }
    Ok(())
}
