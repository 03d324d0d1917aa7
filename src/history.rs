//! Academic-history maintenance: merging array entries by stable id and the
//! one-off backfill that turns per-subject grade rows into yearly history
//! entries (the boletim -> histórico migration).

use crate::normalize::DocError;
use crate::schema::{HistoricoEntry, NotaEntry, SCHOOL_NAME};
use crate::store::{DocUpdate, DocumentStore};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

pub const BACKFILL_NOTE: &str = "Migrado automaticamente do boletim";
pub const SERIE_FALLBACK: &str = "Não informada";

/// Stable identifier of an array entry. Rows imported from the old store
/// carry `_id`; rows created here carry `id`.
pub fn entry_id(v: &Value) -> Option<&str> {
    v.get("id")
        .or_else(|| v.get("_id"))
        .and_then(|x| x.as_str())
        .filter(|s| !s.is_empty())
}

/// Append-only merge keyed by entry id. Re-appending an existing id is
/// skipped, which is what makes repeated appends and backfills idempotent.
/// Returns (merged, appended, skipped).
pub fn merge_by_id(existing: &[Value], incoming: Vec<Value>) -> (Vec<Value>, usize, usize) {
    let mut merged: Vec<Value> = existing.to_vec();
    let mut seen: Vec<String> = existing
        .iter()
        .filter_map(|v| entry_id(v).map(str::to_string))
        .collect();
    let mut appended = 0usize;
    let mut skipped = 0usize;
    for entry in incoming {
        match entry_id(&entry) {
            Some(id) if seen.iter().any(|s| s == id) => skipped += 1,
            Some(id) => {
                seen.push(id.to_string());
                merged.push(entry);
                appended += 1;
            }
            None => {
                merged.push(entry);
                appended += 1;
            }
        }
    }
    (merged, appended, skipped)
}

fn str_field<'a>(doc: &'a Map<String, Value>, key: &str) -> &'a str {
    doc.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn array_field<'a>(doc: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    doc.get(key).and_then(|v| v.as_array()).map(|v| v.as_slice()).unwrap_or(&[])
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Build the history entries a document's grade rows imply: one entry per
/// grade/year, with the year's overall average and overall status. Returns
/// `None` when there is nothing to backfill (no grades, or a history already
/// present — existing history is never rebuilt or overwritten).
pub fn backfill_plan(doc: &Map<String, Value>, ano_letivo: &str) -> Option<DocUpdate> {
    let notas_raw = array_field(doc, "notas");
    if notas_raw.is_empty() || !array_field(doc, "historico").is_empty() {
        return None;
    }

    let notas: Vec<NotaEntry> = notas_raw
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect();
    if notas.is_empty() {
        return None;
    }

    // Group by grade/year, first-seen order preserved.
    let doc_serie = str_field(doc, "serieAno");
    let mut groups: Vec<(String, Vec<NotaEntry>)> = Vec::new();
    for nota in notas {
        let serie = if !nota.serie.trim().is_empty() {
            nota.serie.clone()
        } else if !doc_serie.trim().is_empty() {
            doc_serie.to_string()
        } else {
            SERIE_FALLBACK.to_string()
        };
        match groups.iter_mut().find(|(s, _)| *s == serie) {
            Some((_, rows)) => rows.push(nota),
            None => groups.push((serie, vec![nota])),
        }
    }

    let mut entries: Vec<Value> = Vec::with_capacity(groups.len());
    for (serie, rows) in groups {
        let soma: f64 = rows.iter().map(|n| n.media_final.unwrap_or(0.0)).sum();
        let media_geral = round1(soma / rows.len() as f64);
        let aprovados = rows
            .iter()
            .filter(|n| n.situacao.as_deref() == Some("Aprovado"))
            .count();
        let situacao_geral = if aprovados == rows.len() {
            "Aprovado"
        } else {
            "Em Recuperação"
        };

        let entry = HistoricoEntry {
            id: Uuid::new_v4().to_string(),
            ano_letivo: ano_letivo.to_string(),
            serie,
            turma: str_field(doc, "turma").to_string(),
            turno: str_field(doc, "turno").to_string(),
            escola: SCHOOL_NAME.to_string(),
            disciplinas: rows,
            media_geral: Some(media_geral),
            situacao_geral: Some(situacao_geral.to_string()),
            frequencia: String::new(),
            observacoes: BACKFILL_NOTE.to_string(),
        };
        match serde_json::to_value(entry) {
            Ok(v) => entries.push(v),
            Err(_) => continue,
        }
    }

    let mut update = DocUpdate::default();
    update.set.insert("historico".to_string(), Value::Array(entries));
    Some(update)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub scanned: u64,
    pub backfilled: u64,
    pub skipped: u64,
    pub errored: u64,
    pub errors: Vec<DocError>,
}

/// Backfill every student that has grades but no history yet. Same
/// at-least-effort contract as the normalization run: one bad document is
/// logged and skipped, the batch continues.
pub fn backfill_all(store: &mut dyn DocumentStore, ano_letivo: &str) -> anyhow::Result<BackfillReport> {
    let docs = store.fetch_all()?;
    let mut report = BackfillReport {
        scanned: 0,
        backfilled: 0,
        skipped: 0,
        errored: 0,
        errors: Vec::new(),
    };
    for stored in docs {
        report.scanned += 1;
        let Some(update) = backfill_plan(&stored.doc, ano_letivo) else {
            report.skipped += 1;
            continue;
        };
        match store.apply(&stored.id, &update) {
            Ok(()) => report.backfilled += 1,
            Err(e) => {
                tracing::warn!(id = %stored.id, error = %e, "history backfill failed, continuing");
                report.errored += 1;
                report.errors.push(DocError {
                    id: stored.id,
                    message: format!("{e:#}"),
                });
            }
        }
    }
    tracing::info!(
        scanned = report.scanned,
        backfilled = report.backfilled,
        "history backfill complete"
    );
    Ok(report)
}
