//! SimpleData - schema-less JSON document store
//!
//! # Architecture
//!
//! - **Catalog**: projects (tenants) own named collections; a secret
//!   API key resolves to exactly one project
//! - **Documents**: arbitrary JSON objects stored in sled trees under
//!   ordered binary keys, no schema enforced
//! - **Query**: URL-style parameters compiled into typed filter
//!   predicates, executed with pagination and consistent counts
//! - **Batch**: bounded multi-record mutation with per-item accounting
//! - **Schema**: on-demand inference from a head sample of documents
//!
//! # Usage example
//!
//! ```no_run
//! use simpledata::Db;
//! use serde_json::json;
//!
//! # fn main() -> simpledata::Result<()> {
//! let db = Db::open("./data")?;
//!
//! let project = db.create_project("demo", "acct_1")?;
//! db.create_collection(project.id, "users")?;
//!
//! let record = db.create_record(
//!     project.id,
//!     "users",
//!     json!({ "name": "Ada", "age": 36 })
//!         .as_object()
//!         .cloned()
//!         .unwrap(),
//! )?;
//! println!("created {}", record["id"]);
//!
//! // age > 30, newest first, page 1
//! let page = db.list_records(
//!     project.id,
//!     "users",
//!     &[("age_gt".into(), "30".into())],
//! )?;
//! println!("{} of {} match", page.records.len(), page.pagination.total);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod db;
pub mod error;
pub mod query;
pub mod schema;
pub mod store;

pub use db::Db;
pub use error::{DbError, Result};
pub use query::{compile_filters, Filter, FilterOp, Pagination, RecordPage};
pub use store::{
    CollectionRecord, Document, DocumentRecord, DocumentStore, ProjectRecord, SledStore,
};
