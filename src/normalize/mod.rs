//! Schema normalization engine: migrates legacy alias keys into the
//! canonical student fields, one partial update per document, and tallies a
//! run report. Runs sequentially; the store is the only shared resource.

mod conflict;
mod report;
pub mod resolve;
pub mod value;

pub use conflict::{plan_document, DocPlan};
pub use report::{DocError, ReviewItem, ReviewReason, RunReport};

use crate::schema::{FieldKind, CPF_LEN, FIELD_SPECS};
use crate::store::{self, DocumentStore};
use anyhow::Context;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    /// Plan and report without writing anything back.
    pub dry_run: bool,
}

/// One full pass over the student collection. A fetch failure is fatal
/// (nothing processed); a per-document write failure is logged, counted, and
/// skipped over. Re-running on an already-canonical collection is a no-op.
pub fn run(store: &mut dyn DocumentStore, opts: &RunOptions) -> anyhow::Result<RunReport> {
    let docs = store
        .fetch_all()
        .context("fetch student documents from store")?;

    let mut report = RunReport::new(opts.dry_run);
    let mut cpf_owners: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for stored in docs {
        report.scanned += 1;
        let plan = plan_document(&stored.doc);

        let mut post = stored.doc.clone();
        store::apply_to_doc(&mut post, &plan.update);

        let mut committed = true;
        if plan.update.is_empty() {
            report.skipped += 1;
        } else if opts.dry_run {
            report.updated += 1;
        } else {
            match store.apply(&stored.id, &plan.update) {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    tracing::warn!(id = %stored.id, error = %e, "student update failed, continuing");
                    report.errored += 1;
                    report.errors.push(DocError {
                        id: stored.id.clone(),
                        message: format!("{e:#}"),
                    });
                    committed = false;
                }
            }
        }

        report.fields_skipped += u64::from(plan.fields_skipped);
        report.dates_unparseable += u64::from(plan.dates_unparseable);
        if committed {
            report.fields_migrated += u64::from(plan.fields_migrated);
            report.aliases_removed += u64::from(plan.aliases_removed);
            report.junk_removed += u64::from(plan.junk_removed);
        }

        // Completeness and review accounting run over the state the store
        // actually holds after this document: the projection when the write
        // landed (or would land, in a dry run), the original otherwise.
        // Flagging off this state, not the plan, keeps an over-length id in
        // every run's report until someone fixes it, including runs where the
        // document itself needed no update.
        let effective = if committed { &post } else { &stored.doc };
        for spec in FIELD_SPECS {
            if !resolve::is_empty(effective.get(spec.canonical)) {
                *report.populated.entry(spec.canonical.to_string()).or_insert(0) += 1;
            }
            if spec.kind == FieldKind::Digits11 {
                if let Some(Value::String(digits)) = effective.get(spec.canonical) {
                    if digits.len() > CPF_LEN {
                        report.needs_review.push(ReviewItem {
                            id: stored.id.clone(),
                            field: spec.canonical.to_string(),
                            reason: ReviewReason::OverlongId,
                            value: digits.clone(),
                        });
                    }
                }
            }
        }
        if let Some(Value::String(cpf)) = effective.get("cpf") {
            if !cpf.trim().is_empty() {
                cpf_owners
                    .entry(cpf.clone())
                    .or_default()
                    .push(stored.id.clone());
            }
        }
    }

    // Colliding normalized ids are a data-quality problem for a human; the
    // engine flags every holder and resolves nothing.
    for (cpf, ids) in cpf_owners {
        if ids.len() > 1 {
            for id in ids {
                report.needs_review.push(ReviewItem {
                    id,
                    field: "cpf".to_string(),
                    reason: ReviewReason::DuplicateId,
                    value: cpf.clone(),
                });
            }
        }
    }

    tracing::info!(
        scanned = report.scanned,
        updated = report.updated,
        skipped = report.skipped,
        errored = report.errored,
        dry_run = report.dry_run,
        "normalization run complete"
    );
    Ok(report)
}
