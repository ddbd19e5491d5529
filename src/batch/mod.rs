//! Bounded batch mutation with per-item accounting
//!
//! Each call is capped at [`MAX_BATCH_SIZE`] items and records an
//! outcome per item. Create validates the whole set before touching the
//! store; update and delete apply items independently and report only
//! the subset that succeeded (partial-success semantics). Items run
//! sequentially within one call.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{DbError, Result};
use crate::store::{CollectionId, Document, DocumentId, DocumentRecord, DocumentStore};

pub const MAX_BATCH_SIZE: usize = 100;

/// What happened to one item of a batch call
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Created(DocumentRecord),
    Updated(DocumentRecord),
    Deleted(DocumentId),
    /// Entry was malformed (missing id or data, or empty payload)
    SkippedInvalid,
    /// Referenced id does not exist under the target collection
    SkippedMissing,
}

/// Per-item outcomes of one batch call. Responses surface only the
/// successful subset; the skip reasons stay inspectable here.
#[derive(Debug, Default)]
pub struct BatchReport {
    outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn outcomes(&self) -> &[ItemOutcome] {
        &self.outcomes
    }

    /// Records created or updated by this call, in item order
    pub fn records(&self) -> Vec<&DocumentRecord> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                ItemOutcome::Created(record) | ItemOutcome::Updated(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Ids actually removed by this call, in item order
    pub fn deleted_ids(&self) -> Vec<DocumentId> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                ItemOutcome::Deleted(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| {
                matches!(
                    outcome,
                    ItemOutcome::Created(_) | ItemOutcome::Updated(_) | ItemOutcome::Deleted(_)
                )
            })
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    fn push(&mut self, outcome: ItemOutcome) {
        self.outcomes.push(outcome);
    }
}

/// One entry of a batch update; both fields must be present for the
/// entry to be applied
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateEntry {
    #[serde(default)]
    pub id: Option<DocumentId>,
    #[serde(default)]
    pub data: Option<Document>,
}

/// Insert 1-100 payloads.
///
/// Size and shape are validated before any insert, so a rejected call
/// leaves the store untouched. A storage failure mid-way aborts the
/// call without rolling back items already applied.
pub fn batch_create<S>(
    store: &S,
    collection: CollectionId,
    payloads: Vec<Value>,
) -> Result<BatchReport>
where
    S: DocumentStore + ?Sized,
{
    if payloads.is_empty() {
        return Err(DbError::validation(
            "Request body must contain an array of records",
        ));
    }
    if payloads.len() > MAX_BATCH_SIZE {
        return Err(DbError::validation("Maximum 100 records per batch"));
    }

    let mut documents = Vec::with_capacity(payloads.len());
    for payload in payloads {
        match payload {
            Value::Object(data) if !data.is_empty() => documents.push(data),
            _ => {
                return Err(DbError::validation(
                    "Each record must be a non-empty object",
                ))
            }
        }
    }

    let mut report = BatchReport::default();
    for data in documents {
        let record = store.insert(collection, data)?;
        report.push(ItemOutcome::Created(record));
    }
    Ok(report)
}

/// Update up to 100 records independently.
///
/// Entries missing id or data (or carrying an empty payload) are
/// silently skipped; entries referencing unknown ids are omitted from
/// the result. Neither skip fails the call.
pub fn batch_update<S>(
    store: &S,
    collection: CollectionId,
    entries: Vec<UpdateEntry>,
) -> Result<BatchReport>
where
    S: DocumentStore + ?Sized,
{
    if entries.is_empty() {
        return Err(DbError::validation(
            "Request body must contain an array of updates with id and data",
        ));
    }
    if entries.len() > MAX_BATCH_SIZE {
        return Err(DbError::validation("Maximum 100 records per batch"));
    }

    let mut report = BatchReport::default();
    for entry in entries {
        let (id, data) = match (entry.id, entry.data) {
            (Some(id), Some(data)) if !data.is_empty() => (id, data),
            _ => {
                report.push(ItemOutcome::SkippedInvalid);
                continue;
            }
        };
        match store.update(collection, id, data)? {
            Some(record) => report.push(ItemOutcome::Updated(record)),
            None => report.push(ItemOutcome::SkippedMissing),
        }
    }
    Ok(report)
}

/// Delete whichever of `ids` exist under the collection; missing ids
/// are silently ignored.
pub fn batch_delete<S>(
    store: &S,
    collection: CollectionId,
    ids: Vec<DocumentId>,
) -> Result<BatchReport>
where
    S: DocumentStore + ?Sized,
{
    if ids.is_empty() {
        return Err(DbError::validation(
            "Request body must contain an array of record IDs",
        ));
    }
    if ids.len() > MAX_BATCH_SIZE {
        return Err(DbError::validation("Maximum 100 records per batch"));
    }

    let removed = store.delete_many(collection, &ids)?;
    let mut report = BatchReport::default();
    for id in ids {
        if removed.contains(&id) {
            report.push(ItemOutcome::Deleted(id));
        } else {
            report.push(ItemOutcome::SkippedMissing);
        }
    }
    Ok(report)
}
