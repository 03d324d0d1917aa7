use serde::Serialize;
use std::collections::BTreeMap;

/// End-of-run summary. The batch always finishes with one of these (or a
/// fatal fetch error before anything was processed), so an operator is never
/// left guessing how many documents succeeded.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub dry_run: bool,
    pub scanned: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errored: u64,
    pub fields_migrated: u64,
    pub fields_skipped: u64,
    pub aliases_removed: u64,
    pub junk_removed: u64,
    pub dates_unparseable: u64,
    /// Documents with a non-empty value per canonical attribute after the
    /// run. Used to verify migration completeness.
    pub populated: BTreeMap<String, u64>,
    pub needs_review: Vec<ReviewItem>,
    pub errors: Vec<DocError>,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        RunReport {
            dry_run,
            scanned: 0,
            updated: 0,
            skipped: 0,
            errored: 0,
            fields_migrated: 0,
            fields_skipped: 0,
            aliases_removed: 0,
            junk_removed: 0,
            dates_unparseable: 0,
            populated: BTreeMap::new(),
            needs_review: Vec::new(),
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub id: String,
    pub field: String,
    pub reason: ReviewReason,
    pub value: String,
}

/// Conditions the engine has no safe automatic fix for.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    /// Identification number longer than the fixed length after stripping.
    OverlongId,
    /// Two or more documents normalize to the same identification number.
    DuplicateId,
}

#[derive(Debug, Serialize)]
pub struct DocError {
    pub id: String,
    pub message: String,
}
