//! Conflict/Duplicate Resolver: turns resolver + normalizer outcomes into a
//! single partial-update plan per document, deciding which canonical fields
//! to write and which legacy keys are safe to drop.

use crate::normalize::resolve::{self, Resolution};
use crate::normalize::value::{self, Normalized};
use crate::schema::{FieldKind, FIELD_SPECS, JUNK_KEYS};
use crate::store::DocUpdate;
use serde_json::{Map, Value};

#[derive(Debug, Default)]
pub struct DocPlan {
    pub update: DocUpdate,
    pub fields_migrated: u32,
    pub fields_skipped: u32,
    pub aliases_removed: u32,
    pub junk_removed: u32,
    pub dates_unparseable: u32,
}

pub fn plan_document(doc: &Map<String, Value>) -> DocPlan {
    let mut plan = DocPlan::default();

    for spec in FIELD_SPECS {
        // True once the canonical field holds data after this run, whether it
        // already did or a migration is planned. Aliases are only dropped
        // behind a populated canonical field; while it stays empty an alias
        // may be the sole copy of the data.
        let mut canonical_filled = false;

        match resolve::resolve(doc, spec) {
            Resolution::AlreadyCanonical => {
                plan.fields_skipped += 1;
                canonical_filled = true;
            }
            Resolution::FromAlias { value, .. } => {
                match value::normalize(spec.kind, value) {
                    Normalized::Ready(v) => {
                        plan.update.set.insert(spec.canonical.to_string(), v);
                        plan.fields_migrated += 1;
                        canonical_filled = true;
                    }
                    // Over-length digits are stored as-is, never truncated;
                    // the run driver flags them for review off the resulting
                    // document state.
                    Normalized::OverlongDigits(digits) => {
                        plan.update
                            .set
                            .insert(spec.canonical.to_string(), Value::String(digits));
                        plan.fields_migrated += 1;
                        canonical_filled = true;
                    }
                    Normalized::Absent => {
                        if spec.kind == FieldKind::Date {
                            plan.dates_unparseable += 1;
                        }
                    }
                }
            }
            Resolution::Unresolved => {}
        }

        if canonical_filled {
            for alias in spec.aliases {
                if !resolve::is_empty(doc.get(*alias)) {
                    plan.update.unset.push((*alias).to_string());
                    plan.aliases_removed += 1;
                }
            }
        }
    }

    for key in JUNK_KEYS {
        if doc.contains_key(*key) {
            plan.update.unset.push((*key).to_string());
            plan.junk_removed += 1;
        }
    }

    plan
}
