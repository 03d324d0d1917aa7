use crate::history::{self, merge_by_id};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{opt_str, require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, SqliteStore};
use chrono::Datelike;
use serde_json::{json, Value};
use uuid::Uuid;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, &req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(&req.params, &req.id, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match store::fetch_doc(conn, &id) {
        Ok(Some(stored)) => {
            let historico = stored
                .doc
                .get("historico")
                .cloned()
                .unwrap_or_else(|| json!([]));
            ok(&req.id, json!({ "historico": historico }))
        }
        Ok(None) => err(&req.id, "student_not_found", "Aluno não encontrado", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_append(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, &req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(&req.params, &req.id, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(raw_entry) = req.params.get("entry").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing params.entry", None);
    };

    let mut entry = raw_entry.clone();
    // A stable id is what makes re-appending detectable; assign one when the
    // caller did not.
    if history::entry_id(&Value::Object(entry.clone())).is_none() {
        entry.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
    }

    let mut stored = match store::fetch_doc(conn, &id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "student_not_found", "Aluno não encontrado", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let existing = stored
        .doc
        .get("historico")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let (merged, appended, skipped) = merge_by_id(&existing, vec![Value::Object(entry.clone())]);

    if appended > 0 {
        stored
            .doc
            .insert("historico".to_string(), Value::Array(merged));
        if let Err(e) = store::replace_doc(conn, &id, &stored.doc) {
            return err(&req.id, "db_write_failed", e.to_string(), None);
        }
    }

    ok(
        &req.id,
        json!({ "entry": entry, "appended": appended, "skipped": skipped }),
    )
}

fn handle_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, &req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(&req.params, &req.id, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let entry_id = match required_str(&req.params, &req.id, "entryId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut stored = match store::fetch_doc(conn, &id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "student_not_found", "Aluno não encontrado", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let existing = stored
        .doc
        .get("historico")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let before = existing.len();
    let kept: Vec<Value> = existing
        .into_iter()
        .filter(|e| history::entry_id(e) != Some(entry_id.as_str()))
        .collect();
    let removed = before - kept.len();

    if removed > 0 {
        stored.doc.insert("historico".to_string(), Value::Array(kept));
        if let Err(e) = store::replace_doc(conn, &id, &stored.doc) {
            return err(&req.id, "db_write_failed", e.to_string(), None);
        }
    }

    ok(&req.id, json!({ "removed": removed }))
}

fn handle_backfill(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, &req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let ano_letivo = opt_str(&req.params, "anoLetivo")
        .unwrap_or_else(|| chrono::Utc::now().year().to_string());

    let mut doc_store = SqliteStore::new(conn);
    match history::backfill_all(&mut doc_store, &ano_letivo) {
        Ok(report) => match serde_json::to_value(&report) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => err(&req.id, "backfill_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "history.list" => Some(handle_list(state, req)),
        "history.append" => Some(handle_append(state, req)),
        "history.remove" => Some(handle_remove(state, req)),
        "history.backfill" => Some(handle_backfill(state, req)),
        _ => None,
    }
}
