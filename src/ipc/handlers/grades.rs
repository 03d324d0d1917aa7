use crate::history::merge_by_id;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::schema::{situacao_for_media, NotaEntry};
use crate::store;
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
            let notas = stored.doc.get("notas").cloned().unwrap_or_else(|| json!([]));
            ok(&req.id, json!({ "notas": notas }))
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
    let Some(raw_entry) = req.params.get("entry") else {
        return err(&req.id, "bad_params", "missing params.entry", None);
    };
    let mut entry: NotaEntry = match serde_json::from_value(raw_entry.clone()) {
        Ok(e) => e,
        Err(e) => return err(&req.id, "bad_params", format!("bad entry: {}", e), None),
    };
    if entry.disciplina.trim().is_empty() {
        return err(&req.id, "bad_params", "missing entry.disciplina", None);
    }

    // Derive the final average and status unless the caller supplied them.
    if entry.media_final.is_none() {
        entry.media_final = entry.computed_media();
    }
    if entry.situacao.is_none() {
        entry.situacao = entry.media_final.map(|m| situacao_for_media(m).to_string());
    }
    if entry.id.trim().is_empty() {
        entry.id = Uuid::new_v4().to_string();
    }

    let mut stored = match store::fetch_doc(conn, &id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "student_not_found", "Aluno não encontrado", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let entry_json = match serde_json::to_value(&entry) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "internal", e.to_string(), None),
    };
    let existing = stored
        .doc
        .get("notas")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let (merged, appended, skipped) = merge_by_id(&existing, vec![entry_json.clone()]);

    if appended > 0 {
        stored.doc.insert("notas".to_string(), Value::Array(merged));
        if let Err(e) = store::replace_doc(conn, &id, &stored.doc) {
            return err(&req.id, "db_write_failed", e.to_string(), None);
        }
    }

    ok(
        &req.id,
        json!({ "entry": entry_json, "appended": appended, "skipped": skipped }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.list" => Some(handle_list(state, req)),
        "grades.append" => Some(handle_append(state, req)),
        _ => None,
    }
}
