//! Small param/state accessors shared by the handlers.

use crate::ipc::error::err;
use crate::ipc::types::AppState;
use rusqlite::Connection;

/// Every method except `health` and `workspace.select` needs an open
/// workspace first.
pub fn require_db<'a>(state: &'a AppState, id: &str) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(id, "no_workspace", "no workspace selected", None))
}

pub fn required_str(
    params: &serde_json::Value,
    id: &str,
    key: &str,
) -> Result<String, serde_json::Value> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| err(id, "bad_params", format!("missing params.{}", key), None))
}

pub fn opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn opt_u64(params: &serde_json::Value, key: &str) -> Option<u64> {
    params.get(key).and_then(|v| v.as_u64())
}

pub fn opt_bool(params: &serde_json::Value, key: &str) -> Option<bool> {
    params.get(key).and_then(|v| v.as_bool())
}
