use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{opt_str, opt_u64, require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::normalize::value::{self, Normalized};
use crate::schema::{self, FieldKind, FIELD_SPECS, STATUS_MATRICULADO};
use crate::store;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

fn field_str<'a>(doc: &'a Map<String, Value>, key: &str) -> &'a str {
    doc.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// The flat view the front-end lists and edits; array fields are served by
/// the grades/history methods.
fn student_view(id: &str, doc: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    out.insert("id".to_string(), json!(id));
    for spec in FIELD_SPECS {
        out.insert(
            spec.canonical.to_string(),
            json!(field_str(doc, spec.canonical)),
        );
    }
    Value::Object(out)
}

/// Search the way the office staff actually types: a full CPF, a chunk of a
/// SUS card number, a grade number, a single class letter, or part of a name
/// or locality.
fn matches_query(doc: &Map<String, Value>, term: &str) -> bool {
    let t = term.trim();
    if t.is_empty() {
        return true;
    }

    if t.chars().all(|c| c.is_ascii_digit()) {
        if t.len() == 11 && field_str(doc, "cpf") == t {
            return true;
        }
        if t.len() > 5 && field_str(doc, "cartaoSUS").contains(t) {
            return true;
        }
        if field_str(doc, "serieAno").trim() == t {
            return true;
        }
    }

    if t.len() == 1 && t.chars().all(|c| c.is_ascii_alphabetic()) {
        if field_str(doc, "turma").eq_ignore_ascii_case(t) {
            return true;
        }
    }

    let needle = t.to_lowercase();
    field_str(doc, "nome").to_lowercase().contains(&needle)
        || field_str(doc, "localidade").to_lowercase().contains(&needle)
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, &req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let page = opt_u64(&req.params, "page").unwrap_or(1).max(1);
    let limit = opt_u64(&req.params, "limit").unwrap_or(50).max(1);
    let q = opt_str(&req.params, "q").unwrap_or_default();

    let all = match store::fetch_all(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut hits: Vec<_> = all
        .iter()
        .filter(|s| matches_query(&s.doc, &q))
        .collect();
    hits.sort_by_key(|s| field_str(&s.doc, "nome").to_lowercase());

    let total = hits.len() as u64;
    let total_pages = total.div_ceil(limit);
    let start = ((page - 1) * limit) as usize;
    let data: Vec<Value> = hits
        .iter()
        .skip(start)
        .take(limit as usize)
        .map(|s| student_view(&s.id, &s.doc))
        .collect();

    ok(
        &req.id,
        json!({
            "data": data,
            "total": total,
            "page": page,
            "limit": limit,
            "totalPages": total_pages
        }),
    )
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, &req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(&req.params, &req.id, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match store::fetch_doc(conn, &id) {
        Ok(Some(stored)) => ok(&req.id, student_view(&stored.id, &stored.doc)),
        Ok(None) => err(&req.id, "student_not_found", "Aluno não encontrado", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

enum FieldInput {
    Set(Value),
    Clear,
    Invalid(String),
}

/// Normalize one incoming field value the same way the batch engine would,
/// except that the interactive surface rejects a date it cannot parse
/// instead of silently dropping it.
fn normalize_input(kind: FieldKind, key: &str, v: &Value) -> FieldInput {
    let is_blank = matches!(v, Value::Null) || v.as_str().is_some_and(|s| s.trim().is_empty());
    if is_blank {
        return FieldInput::Clear;
    }
    match value::normalize(kind, v) {
        Normalized::Ready(v) => FieldInput::Set(v),
        Normalized::OverlongDigits(digits) => FieldInput::Set(Value::String(digits)),
        Normalized::Absent => FieldInput::Invalid(format!("invalid value for {}", key)),
    }
}

fn cpf_taken(conn: &Connection, cpf: &str, exclude_id: Option<&str>) -> anyhow::Result<bool> {
    let all = store::fetch_all(conn)?;
    Ok(all
        .iter()
        .filter(|s| Some(s.id.as_str()) != exclude_id)
        .any(|s| field_str(&s.doc, "cpf") == cpf))
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, &req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(fields) = req.params.get("fields").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing params.fields", None);
    };

    // Only canonical scalar keys cross this boundary; legacy spellings are
    // the normalization engine's business, not the form's.
    for key in fields.keys() {
        if !FIELD_SPECS.iter().any(|s| s.canonical == key) {
            return err(
                &req.id,
                "bad_params",
                format!("unknown field: {}", key),
                None,
            );
        }
    }

    let nome = fields.get("nome").and_then(|v| v.as_str()).unwrap_or("");
    if nome.trim().is_empty() {
        return err(&req.id, "bad_params", "Nome é obrigatório", None);
    }

    let mut doc = Map::new();
    for spec in FIELD_SPECS {
        let Some(v) = fields.get(spec.canonical) else { continue };
        match normalize_input(spec.kind, spec.canonical, v) {
            FieldInput::Set(v) => {
                doc.insert(spec.canonical.to_string(), v);
            }
            FieldInput::Clear => {}
            FieldInput::Invalid(msg) => return err(&req.id, "bad_params", msg, None),
        }
    }
    if !doc.contains_key("status") {
        doc.insert("status".to_string(), json!(STATUS_MATRICULADO));
    }
    doc.insert("notas".to_string(), json!([]));
    doc.insert("historico".to_string(), json!([]));

    if let Some(cpf) = doc.get("cpf").and_then(|v| v.as_str()) {
        match cpf_taken(conn, cpf, None) {
            Ok(true) => return err(&req.id, "cpf_conflict", "CPF já cadastrado", None),
            Ok(false) => {}
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    match store::insert_doc(conn, &doc) {
        Ok(id) => ok(&req.id, student_view(&id, &doc)),
        Err(e) => err(&req.id, "db_write_failed", e.to_string(), None),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, &req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(&req.params, &req.id, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(fields) = req.params.get("fields").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing params.fields", None);
    };

    let mut stored = match store::fetch_doc(conn, &id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "student_not_found", "Aluno não encontrado", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    for (key, v) in fields {
        let Some(spec) = schema::spec_for(key) else {
            return err(&req.id, "bad_params", format!("unknown field: {}", key), None);
        };
        match normalize_input(spec.kind, spec.canonical, v) {
            FieldInput::Set(v) => {
                stored.doc.insert(spec.canonical.to_string(), v);
            }
            FieldInput::Clear => {
                stored.doc.insert(spec.canonical.to_string(), json!(""));
            }
            FieldInput::Invalid(msg) => return err(&req.id, "bad_params", msg, None),
        }
    }

    if field_str(&stored.doc, "nome").trim().is_empty() {
        return err(&req.id, "bad_params", "Nome é obrigatório", None);
    }
    let cpf = field_str(&stored.doc, "cpf").to_string();
    if !cpf.is_empty() {
        match cpf_taken(conn, &cpf, Some(&id)) {
            Ok(true) => return err(&req.id, "cpf_conflict", "CPF já cadastrado", None),
            Ok(false) => {}
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    match store::replace_doc(conn, &id, &stored.doc) {
        Ok(true) => ok(&req.id, student_view(&id, &stored.doc)),
        Ok(false) => err(&req.id, "student_not_found", "Aluno não encontrado", None),
        Err(e) => err(&req.id, "db_write_failed", e.to_string(), None),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, &req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(&req.params, &req.id, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let stored = match store::fetch_doc(conn, &id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "student_not_found", "Aluno não encontrado", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match store::delete_doc(conn, &id) {
        Ok(true) => ok(
            &req.id,
            json!({
                "message": "Aluno excluído com sucesso",
                "deleted": student_view(&id, &stored.doc)
            }),
        ),
        Ok(false) => err(&req.id, "student_not_found", "Aluno não encontrado", None),
        Err(e) => err(&req.id, "db_write_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_list(state, req)),
        "students.get" => Some(handle_get(state, req)),
        "students.create" => Some(handle_create(state, req)),
        "students.update" => Some(handle_update(state, req)),
        "students.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
