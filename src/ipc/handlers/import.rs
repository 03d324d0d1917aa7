use crate::import_json::{self, DEFAULT_BATCH_SIZE};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{opt_u64, require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use std::path::PathBuf;

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, &req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let path = match required_str(&req.params, &req.id, "path") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };
    let batch_size = opt_u64(&req.params, "batchSize").unwrap_or(DEFAULT_BATCH_SIZE as u64) as usize;

    let mut doc_store = SqliteStore::new(conn);
    match import_json::import_file(&mut doc_store, &path, batch_size) {
        Ok(report) => match serde_json::to_value(&report) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => err(&req.id, "import_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.import" => Some(handle_import(state, req)),
        _ => None,
    }
}
