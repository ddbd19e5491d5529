//! Sled-backed document store
//!
//! Tree layout:
//! - `projects`:      project id (16B)                  -> ProjectRecord (JSON)
//! - `api_keys`:      api key bytes                     -> project id (16B)
//! - `collections`:   project id (16B) ++ name bytes    -> CollectionRecord (JSON)
//! - `documents`:     collection id (16B) ++ seq (8B BE) -> DocumentRecord (JSON)
//! - `document_ids`:  document id (16B)                 -> documents key (24B)
//!
//! The sequence component comes from sled's monotonic id generator, so
//! forward prefix scans enumerate a collection in insertion order and
//! reverse scans yield newest-first with stable ties.

use std::path::Path;

use chrono::{DateTime, Utc};
use sled::Tree;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::query::{matches_all, Filter};

use super::{
    generate_api_key, is_identifier, CollectionId, CollectionRecord, Document, DocumentId,
    DocumentRecord, DocumentStore, ProjectId, ProjectRecord,
};

const DOC_KEY_LEN: usize = 24;

fn doc_key(collection: CollectionId, seq: u64) -> [u8; DOC_KEY_LEN] {
    let mut key = [0u8; DOC_KEY_LEN];
    key[..16].copy_from_slice(collection.as_bytes());
    key[16..].copy_from_slice(&seq.to_be_bytes());
    key
}

fn decode_document(bytes: &[u8]) -> Result<DocumentRecord> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Persistent store over sled trees with cascading catalog deletes
pub struct SledStore {
    db: sled::Db,
    projects: Tree,
    api_keys: Tree,
    collections: Tree,
    documents: Tree,
    document_ids: Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)?;

        let store = Self {
            projects: db.open_tree("projects")?,
            api_keys: db.open_tree("api_keys")?,
            collections: db.open_tree("collections")?,
            documents: db.open_tree("documents")?,
            document_ids: db.open_tree("document_ids")?,
            db,
        };

        tracing::info!("Opened document store at {:?}", path);
        Ok(store)
    }

    /// Flush all trees to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub fn create_project(&self, name: &str, owner: &str) -> Result<ProjectRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DbError::validation("Project name is required"));
        }

        let record = ProjectRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            api_key: generate_api_key(),
            owner: owner.to_string(),
            created_at: Utc::now(),
        };

        self.projects
            .insert(record.id.as_bytes(), serde_json::to_vec(&record)?)?;
        self.api_keys
            .insert(record.api_key.as_bytes(), record.id.as_bytes().to_vec())?;

        tracing::info!("Created project {} ({})", record.name, record.id);
        Ok(record)
    }

    pub fn get_project(&self, id: ProjectId) -> Result<Option<ProjectRecord>> {
        match self.projects.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Projects for one owner, newest-first
    pub fn list_projects(&self, owner: &str) -> Result<Vec<ProjectRecord>> {
        let mut projects = Vec::new();
        for item in self.projects.iter() {
            let (_, bytes) = item?;
            let record: ProjectRecord = serde_json::from_slice(&bytes)?;
            if record.owner == owner {
                projects.push(record);
            }
        }
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    /// The identity seam: a secret token resolves to its owning project,
    /// or `None` for an unknown key (unauthenticated).
    pub fn resolve_api_key(&self, key: &str) -> Result<Option<ProjectRecord>> {
        let id_bytes = match self.api_keys.get(key.as_bytes())? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let id = Uuid::from_slice(&id_bytes)
            .map_err(|_| DbError::validation("Corrupt API key index entry"))?;
        self.get_project(id)
    }

    /// Delete a project and cascade to all owned collections and records
    pub fn delete_project(&self, id: ProjectId) -> Result<bool> {
        let record = match self.get_project(id)? {
            Some(record) => record,
            None => return Ok(false),
        };

        for collection in self.list_collections(id)? {
            self.purge_documents(collection.id)?;
        }

        let mut keys = Vec::new();
        for item in self.collections.scan_prefix(id.as_bytes()) {
            let (key, _) = item?;
            keys.push(key);
        }
        for key in keys {
            self.collections.remove(key)?;
        }

        self.api_keys.remove(record.api_key.as_bytes())?;
        self.projects.remove(id.as_bytes())?;

        tracing::info!("Deleted project {} ({})", record.name, id);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    fn collection_key(project: ProjectId, name: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(16 + name.len());
        key.extend_from_slice(project.as_bytes());
        key.extend_from_slice(name.as_bytes());
        key
    }

    pub fn create_collection(&self, project: ProjectId, name: &str) -> Result<CollectionRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DbError::validation("Collection name is required"));
        }
        if !is_identifier(name) {
            return Err(DbError::validation(
                "Collection name must be alphanumeric (a-z, 0-9, _)",
            ));
        }
        if self.get_project(project)?.is_none() {
            return Err(DbError::NotFound("Project not found"));
        }

        let key = Self::collection_key(project, name);
        if self.collections.contains_key(&key)? {
            return Err(DbError::Conflict("Collection already exists"));
        }

        let record = CollectionRecord {
            id: Uuid::new_v4(),
            project_id: project,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.collections.insert(key, serde_json::to_vec(&record)?)?;

        tracing::info!("Created collection {}/{}", project, record.name);
        Ok(record)
    }

    pub fn get_collection(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<CollectionRecord>> {
        let key = Self::collection_key(project, name);
        match self.collections.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Collections of a project, newest-first
    pub fn list_collections(&self, project: ProjectId) -> Result<Vec<CollectionRecord>> {
        let mut collections = Vec::new();
        for item in self.collections.scan_prefix(project.as_bytes()) {
            let (_, bytes) = item?;
            collections.push(serde_json::from_slice(&bytes)?);
        }
        collections.sort_by(|a: &CollectionRecord, b: &CollectionRecord| {
            b.created_at.cmp(&a.created_at)
        });
        Ok(collections)
    }

    /// Delete a collection and cascade to its records
    pub fn delete_collection(&self, project: ProjectId, name: &str) -> Result<bool> {
        let record = match self.get_collection(project, name)? {
            Some(record) => record,
            None => return Ok(false),
        };

        self.purge_documents(record.id)?;
        self.collections
            .remove(Self::collection_key(project, name))?;

        tracing::info!("Deleted collection {}/{}", project, name);
        Ok(true)
    }

    fn purge_documents(&self, collection: CollectionId) -> Result<()> {
        let mut keys = Vec::new();
        for item in self.documents.scan_prefix(collection.as_bytes()) {
            let (key, bytes) = item?;
            let record = decode_document(&bytes)?;
            keys.push((key, record.id));
        }
        for (key, id) in keys {
            self.documents.remove(key)?;
            self.document_ids.remove(id.as_bytes())?;
        }
        Ok(())
    }

    /// Documents key for an id, scoped to the given collection
    fn key_for(&self, collection: CollectionId, id: DocumentId) -> Result<Option<sled::IVec>> {
        let key = match self.document_ids.get(id.as_bytes())? {
            Some(key) => key,
            None => return Ok(None),
        };
        if key.len() != DOC_KEY_LEN || &key[..16] != collection.as_bytes() {
            // id exists but under another collection: out of scope
            return Ok(None);
        }
        Ok(Some(key))
    }
}

impl DocumentStore for SledStore {
    fn insert(&self, collection: CollectionId, data: Document) -> Result<DocumentRecord> {
        let seq = self.db.generate_id()?;
        let now = Utc::now();
        let record = DocumentRecord {
            id: Uuid::new_v4(),
            collection_id: collection,
            data,
            created_at: now,
            updated_at: now,
        };

        let key = doc_key(collection, seq);
        self.documents.insert(&key, serde_json::to_vec(&record)?)?;
        self.document_ids
            .insert(record.id.as_bytes(), key.to_vec())?;
        Ok(record)
    }

    fn select_many(
        &self,
        collection: CollectionId,
        filters: &[Filter],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DocumentRecord>> {
        // Reverse key order is newest-first: the sequence component is
        // monotonic and timestamps are assigned at insert.
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for item in self.documents.scan_prefix(collection.as_bytes()).rev() {
            let (_, bytes) = item?;
            let record = decode_document(&bytes)?;
            if !matches_all(filters, &record.data) {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            records.push(record);
            if records.len() >= limit {
                break;
            }
        }
        Ok(records)
    }

    fn count(&self, collection: CollectionId, filters: &[Filter]) -> Result<usize> {
        let mut total = 0usize;
        for item in self.documents.scan_prefix(collection.as_bytes()) {
            let (_, bytes) = item?;
            let record = decode_document(&bytes)?;
            if matches_all(filters, &record.data) {
                total += 1;
            }
        }
        Ok(total)
    }

    fn select_one(
        &self,
        collection: CollectionId,
        id: DocumentId,
    ) -> Result<Option<DocumentRecord>> {
        let key = match self.key_for(collection, id)? {
            Some(key) => key,
            None => return Ok(None),
        };
        match self.documents.get(key)? {
            Some(bytes) => Ok(Some(decode_document(&bytes)?)),
            None => Ok(None),
        }
    }

    fn update(
        &self,
        collection: CollectionId,
        id: DocumentId,
        data: Document,
    ) -> Result<Option<DocumentRecord>> {
        let key = match self.key_for(collection, id)? {
            Some(key) => key,
            None => return Ok(None),
        };
        let mut record = match self.documents.get(&key)? {
            Some(bytes) => decode_document(&bytes)?,
            None => return Ok(None),
        };

        record.data = data;
        record.updated_at = Utc::now();
        self.documents.insert(key, serde_json::to_vec(&record)?)?;
        Ok(Some(record))
    }

    fn delete(&self, collection: CollectionId, id: DocumentId) -> Result<bool> {
        let key = match self.key_for(collection, id)? {
            Some(key) => key,
            None => return Ok(false),
        };
        self.documents.remove(key)?;
        self.document_ids.remove(id.as_bytes())?;
        Ok(true)
    }

    fn delete_many(
        &self,
        collection: CollectionId,
        ids: &[DocumentId],
    ) -> Result<Vec<DocumentId>> {
        let mut removed = Vec::new();
        for &id in ids {
            if self.delete(collection, id)? {
                removed.push(id);
            }
        }
        Ok(removed)
    }

    fn sample(&self, collection: CollectionId, limit: usize) -> Result<Vec<DocumentRecord>> {
        let mut records = Vec::new();
        for item in self.documents.scan_prefix(collection.as_bytes()).take(limit) {
            let (_, bytes) = item?;
            records.push(decode_document(&bytes)?);
        }
        Ok(records)
    }

    fn created_bounds(
        &self,
        collection: CollectionId,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let mut iter = self.documents.scan_prefix(collection.as_bytes());
        let first = match iter.next() {
            Some(item) => {
                let (_, bytes) = item?;
                decode_document(&bytes)?.created_at
            }
            None => return Ok(None),
        };
        let last = match iter.next_back() {
            Some(item) => {
                let (_, bytes) = item?;
                decode_document(&bytes)?.created_at
            }
            // single document: first and last coincide
            None => first,
        };
        Ok(Some((first, last)))
    }
}
