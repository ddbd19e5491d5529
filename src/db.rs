//! High-level operation surface over the document store
//!
//! `Db` scopes every operation to a project, resolves collection names,
//! and owns payload validation. The store handle is constructed
//! explicitly and passed in; nothing here holds cross-request state.

use std::path::Path;

use serde_json::Value;

use crate::batch::{self, BatchReport, UpdateEntry};
use crate::error::{DbError, Result};
use crate::query::{self, compile_filters, RecordPage};
use crate::schema::{self, SchemaReport};
use crate::store::{
    CollectionRecord, Document, DocumentId, DocumentStore, ProjectId, ProjectRecord, SledStore,
};

pub struct Db {
    store: SledStore,
}

impl Db {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            store: SledStore::open(path)?,
        })
    }

    pub fn store(&self) -> &SledStore {
        &self.store
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub fn create_project(&self, name: &str, owner: &str) -> Result<ProjectRecord> {
        self.store.create_project(name, owner)
    }

    pub fn list_projects(&self, owner: &str) -> Result<Vec<ProjectRecord>> {
        self.store.list_projects(owner)
    }

    pub fn get_project(&self, id: ProjectId) -> Result<ProjectRecord> {
        self.store
            .get_project(id)?
            .ok_or(DbError::NotFound("Project not found"))
    }

    /// Delete a project and everything it owns
    pub fn delete_project(&self, id: ProjectId) -> Result<()> {
        if !self.store.delete_project(id)? {
            return Err(DbError::NotFound("Project not found"));
        }
        Ok(())
    }

    /// Resolve a secret token to its project; `None` means
    /// unauthenticated. Callers trust the returned project id.
    pub fn resolve_api_key(&self, key: &str) -> Result<Option<ProjectRecord>> {
        self.store.resolve_api_key(key)
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    pub fn create_collection(&self, project: ProjectId, name: &str) -> Result<CollectionRecord> {
        self.store.create_collection(project, name)
    }

    pub fn list_collections(&self, project: ProjectId) -> Result<Vec<CollectionRecord>> {
        self.store.list_collections(project)
    }

    pub fn delete_collection(&self, project: ProjectId, name: &str) -> Result<()> {
        if !self.store.delete_collection(project, name)? {
            return Err(DbError::NotFound("Collection not found"));
        }
        Ok(())
    }

    fn collection(&self, project: ProjectId, name: &str) -> Result<CollectionRecord> {
        self.store
            .get_collection(project, name)?
            .ok_or(DbError::NotFound("Collection not found"))
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    pub fn create_record(
        &self,
        project: ProjectId,
        collection: &str,
        data: Document,
    ) -> Result<Value> {
        if data.is_empty() {
            return Err(DbError::validation("Request body cannot be empty"));
        }
        let coll = self.collection(project, collection)?;
        let record = self.store.insert(coll.id, data)?;
        Ok(record.merged())
    }

    pub fn get_record(
        &self,
        project: ProjectId,
        collection: &str,
        id: DocumentId,
    ) -> Result<Value> {
        let coll = self.collection(project, collection)?;
        let record = self
            .store
            .select_one(coll.id, id)?
            .ok_or(DbError::NotFound("Record not found"))?;
        Ok(record.merged())
    }

    /// Filtered, paginated listing. `params` is the full query-parameter
    /// set; `limit` and `page` are extracted here and everything else
    /// compiles to filter predicates.
    pub fn list_records(
        &self,
        project: ProjectId,
        collection: &str,
        params: &[(String, String)],
    ) -> Result<RecordPage> {
        let coll = self.collection(project, collection)?;

        let filters =
            compile_filters(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
        let page = query::parse_page_param(lookup(params, "page"));
        let limit = query::parse_limit_param(lookup(params, "limit"));

        query::list(&self.store, coll.id, &filters, page, limit)
    }

    pub fn update_record(
        &self,
        project: ProjectId,
        collection: &str,
        id: DocumentId,
        data: Document,
    ) -> Result<Value> {
        if data.is_empty() {
            return Err(DbError::validation("Request body cannot be empty"));
        }
        let coll = self.collection(project, collection)?;
        let record = self
            .store
            .update(coll.id, id, data)?
            .ok_or(DbError::NotFound("Record not found"))?;
        Ok(record.merged())
    }

    pub fn delete_record(
        &self,
        project: ProjectId,
        collection: &str,
        id: DocumentId,
    ) -> Result<()> {
        let coll = self.collection(project, collection)?;
        if !self.store.delete(coll.id, id)? {
            return Err(DbError::NotFound("Record not found"));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Batch
    // ------------------------------------------------------------------

    pub fn batch_create(
        &self,
        project: ProjectId,
        collection: &str,
        payloads: Vec<Value>,
    ) -> Result<BatchReport> {
        let coll = self.collection(project, collection)?;
        batch::batch_create(&self.store, coll.id, payloads)
    }

    pub fn batch_update(
        &self,
        project: ProjectId,
        collection: &str,
        entries: Vec<UpdateEntry>,
    ) -> Result<BatchReport> {
        let coll = self.collection(project, collection)?;
        batch::batch_update(&self.store, coll.id, entries)
    }

    pub fn batch_delete(
        &self,
        project: ProjectId,
        collection: &str,
        ids: Vec<DocumentId>,
    ) -> Result<BatchReport> {
        let coll = self.collection(project, collection)?;
        batch::batch_delete(&self.store, coll.id, ids)
    }

    // ------------------------------------------------------------------
    // Schema
    // ------------------------------------------------------------------

    pub fn infer_schema(&self, project: ProjectId, collection: &str) -> Result<SchemaReport> {
        let coll = self.collection(project, collection)?;
        schema::infer(&self.store, &coll)
    }
}

fn lookup<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
