//! Document storage: catalog records and the store adapter trait

pub mod sled_store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::query::Filter;

pub use sled_store::SledStore;

pub type ProjectId = Uuid;
pub type CollectionId = Uuid;
pub type DocumentId = Uuid;

/// A document payload: arbitrary JSON object, no enforced schema
pub type Document = serde_json::Map<String, Value>;

/// Tenant boundary. The API key resolves to exactly one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,

    pub name: String,

    /// Opaque secret token, 64 hex chars, unique across projects
    pub api_key: String,

    /// Owning account reference; account management lives outside this crate
    pub owner: String,

    pub created_at: DateTime<Utc>,
}

/// Named bucket of documents scoped to one project.
/// (project_id, name) is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub id: CollectionId,

    pub project_id: ProjectId,

    /// Constrained to `[A-Za-z0-9_]+`
    pub name: String,

    pub created_at: DateTime<Utc>,
}

/// A stored document with server-assigned bookkeeping.
/// Two documents in the same collection may have disjoint field sets
/// or conflicting types for the same field name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,

    pub collection_id: CollectionId,

    pub data: Document,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Externally visible view: payload merged with bookkeeping fields.
    /// A payload key `id` shadows the record id; `created_at` always
    /// reflects the record, shadowing any payload field of that name.
    pub fn merged(&self) -> Value {
        let mut obj = serde_json::Map::with_capacity(self.data.len() + 2);
        obj.insert("id".to_string(), Value::String(self.id.to_string()));
        for (key, value) in &self.data {
            obj.insert(key.clone(), value.clone());
        }
        obj.insert(
            "created_at".to_string(),
            Value::String(self.created_at.to_rfc3339()),
        );
        Value::Object(obj)
    }
}

/// Safe identifier grammar shared by collection names and filter fields
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Generate an opaque 64-char hex API key from fresh UUID entropy
pub fn generate_api_key() -> String {
    let mut seed = [0u8; 32];
    seed[..16].copy_from_slice(Uuid::new_v4().as_bytes());
    seed[16..].copy_from_slice(Uuid::new_v4().as_bytes());
    blake3::hash(&seed).to_hex().to_string()
}

/// Capability over the underlying document store.
///
/// Implementations address documents by collection id and evaluate
/// filter predicates field-by-field against the stored payloads. The
/// fixed read ordering is newest-first by creation time with ties
/// broken by insertion sequence.
pub trait DocumentStore {
    /// Insert a payload; the store assigns id and timestamps
    fn insert(&self, collection: CollectionId, data: Document) -> Result<DocumentRecord>;

    /// Filtered page of documents, newest-first
    fn select_many(
        &self,
        collection: CollectionId,
        filters: &[Filter],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DocumentRecord>>;

    /// Cardinality of the full match set for the same filters,
    /// independent of pagination
    fn count(&self, collection: CollectionId, filters: &[Filter]) -> Result<usize>;

    fn select_one(
        &self,
        collection: CollectionId,
        id: DocumentId,
    ) -> Result<Option<DocumentRecord>>;

    /// Replace the payload of an existing document; `None` on miss
    fn update(
        &self,
        collection: CollectionId,
        id: DocumentId,
        data: Document,
    ) -> Result<Option<DocumentRecord>>;

    /// Remove a document; `false` on miss
    fn delete(&self, collection: CollectionId, id: DocumentId) -> Result<bool>;

    /// Remove whichever of `ids` exist, returning the ids actually removed
    fn delete_many(
        &self,
        collection: CollectionId,
        ids: &[DocumentId],
    ) -> Result<Vec<DocumentId>>;

    /// First `limit` documents in natural (insertion) order
    fn sample(&self, collection: CollectionId, limit: usize) -> Result<Vec<DocumentRecord>>;

    /// First and last creation timestamps over the whole collection
    fn created_bounds(
        &self,
        collection: CollectionId,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>>;
}
