use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{opt_bool, require_db};
use crate::ipc::types::{AppState, Request};
use crate::normalize::{self, RunOptions};
use crate::store::SqliteStore;

fn handle_run(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, &req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let opts = RunOptions {
        dry_run: opt_bool(&req.params, "dryRun").unwrap_or(false),
    };

    let mut doc_store = SqliteStore::new(conn);
    match normalize::run(&mut doc_store, &opts) {
        Ok(report) => match serde_json::to_value(&report) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        // Only a fetch failure lands here; per-document failures are inside
        // the report.
        Err(e) => err(&req.id, "normalize_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "normalize.run" => Some(handle_run(state, req)),
        _ => None,
    }
}
