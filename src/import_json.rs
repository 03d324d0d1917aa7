//! Bulk JSON import: maps raw export rows (spreadsheet key spellings and
//! all) into canonical documents and inserts them in fixed-size batches.
//! Import only ever adds records; it never clears the collection.

use crate::normalize::resolve::{self, Resolution};
use crate::normalize::value::{self, Normalized};
use crate::schema::{FieldKind, FIELD_SPECS, STATUS_MATRICULADO};
use crate::store::DocumentStore;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub total: u64,
    pub mapped: u64,
    pub inserted: u64,
    pub batches: u64,
    pub batch_errors: u64,
    pub dates_unparseable: u64,
    pub overlong_ids: u64,
}

/// Build a canonical document from one raw export row. Fields the row does
/// not provide are simply absent; a later normalization run can still pick
/// them up if the row used a key spelling we have not seen yet.
pub fn map_raw(raw: &Map<String, Value>) -> (Map<String, Value>, u64, u64) {
    let mut doc = Map::new();
    let mut dates_unparseable = 0u64;
    let mut overlong = 0u64;

    for spec in FIELD_SPECS {
        let source = match resolve::resolve(raw, spec) {
            Resolution::AlreadyCanonical => raw.get(spec.canonical),
            Resolution::FromAlias { value, .. } => Some(value),
            Resolution::Unresolved => None,
        };
        let Some(source) = source else { continue };
        match value::normalize(spec.kind, source) {
            Normalized::Ready(v) => {
                doc.insert(spec.canonical.to_string(), v);
            }
            Normalized::OverlongDigits(digits) => {
                doc.insert(spec.canonical.to_string(), Value::String(digits));
                overlong += 1;
            }
            Normalized::Absent => {
                if spec.kind == FieldKind::Date {
                    dates_unparseable += 1;
                }
            }
        }
    }

    if !doc.contains_key("status") {
        doc.insert(
            "status".to_string(),
            Value::String(STATUS_MATRICULADO.to_string()),
        );
    }
    doc.insert("notas".to_string(), Value::Array(Vec::new()));
    doc.insert("historico".to_string(), Value::Array(Vec::new()));

    (doc, dates_unparseable, overlong)
}

pub fn import_file(
    store: &mut dyn DocumentStore,
    path: &Path,
    batch_size: usize,
) -> anyhow::Result<ImportReport> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    let Value::Array(rows) = parsed else {
        anyhow::bail!("import file must contain a JSON array of objects");
    };

    let batch_size = if batch_size == 0 { DEFAULT_BATCH_SIZE } else { batch_size };
    let mut report = ImportReport {
        total: rows.len() as u64,
        mapped: 0,
        inserted: 0,
        batches: 0,
        batch_errors: 0,
        dates_unparseable: 0,
        overlong_ids: 0,
    };

    let mut docs: Vec<Map<String, Value>> = Vec::with_capacity(rows.len());
    for row in &rows {
        let Some(obj) = row.as_object() else { continue };
        let (doc, bad_dates, overlong) = map_raw(obj);
        report.dates_unparseable += bad_dates;
        report.overlong_ids += overlong;
        docs.push(doc);
        report.mapped += 1;
    }

    for chunk in docs.chunks(batch_size) {
        report.batches += 1;
        match store.insert_batch(chunk) {
            Ok(n) => report.inserted += n as u64,
            Err(e) => {
                tracing::warn!(batch = report.batches, error = %e, "import batch failed, continuing");
                report.batch_errors += 1;
            }
        }
    }

    tracing::info!(
        total = report.total,
        inserted = report.inserted,
        batch_errors = report.batch_errors,
        "json import complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_aliases_and_normalizes_on_the_way_in() {
        let raw = json!({
            "Nome do Aluno": " Ana Silva ",
            "CPF": "123.456.789-01",
            "Cartão do SUS": "700 5056 8817",
            "Data de Nasc.": "05/03/2011",
            "Série/Ano": "8",
            "Turma": "A"
        });
        let (doc, bad_dates, overlong) = map_raw(raw.as_object().expect("object"));
        assert_eq!(doc.get("nome"), Some(&json!("Ana Silva")));
        assert_eq!(doc.get("cpf"), Some(&json!("12345678901")));
        assert_eq!(doc.get("cartaoSUS"), Some(&json!("70050568817")));
        assert_eq!(doc.get("dataNascimento"), Some(&json!("2011-03-05")));
        assert_eq!(doc.get("status"), Some(&json!("Matriculado")));
        assert_eq!(doc.get("notas"), Some(&json!([])));
        assert_eq!(bad_dates, 0);
        assert_eq!(overlong, 0);
        // Legacy keys never enter a freshly imported document.
        assert!(!doc.contains_key("Nome do Aluno"));
    }

    #[test]
    fn bad_date_yields_absent_and_is_counted() {
        let raw = json!({ "Nome do Aluno": "Ana", "Data de Nasc.": "??" });
        let (doc, bad_dates, _) = map_raw(raw.as_object().expect("object"));
        assert!(!doc.contains_key("dataNascimento"));
        assert_eq!(bad_dates, 1);
    }

    #[test]
    fn explicit_status_is_not_overridden() {
        let raw = json!({ "Nome do Aluno": "Ana", "Status": "Transferido" });
        let (doc, _, _) = map_raw(raw.as_object().expect("object"));
        assert_eq!(doc.get("status"), Some(&json!("Transferido")));
    }
}
