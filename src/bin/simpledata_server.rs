//! SimpleData Server - Unix socket server for the document store
//!
//! Provides a MessagePack-based protocol for project, collection and
//! record operations. Multiple clients can connect and share the same
//! store.
//!
//! Usage:
//!   simpledata-server /path/to/data [--socket /tmp/simpledata.sock]
//!
//! Protocol:
//!   Request:  [4-byte length BE] [MessagePack payload]
//!   Response: [4-byte length BE] [MessagePack payload]

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use simpledata::batch::UpdateEntry;
use simpledata::query::Pagination;
use simpledata::store::Document;
use simpledata::{Db, DbError};

// ============================================================================
// Wire Protocol Types
// ============================================================================

/// Request from client. Identifiers travel as strings and are parsed
/// server-side.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Request {
    // Projects
    CreateProject {
        name: String,
        #[serde(default)]
        owner: String,
    },
    ListProjects {
        #[serde(default)]
        owner: String,
    },
    GetProject {
        #[serde(rename = "projectId")]
        project_id: String,
    },
    DeleteProject {
        #[serde(rename = "projectId")]
        project_id: String,
    },
    /// Resolve an API key to its project
    Auth {
        #[serde(rename = "apiKey")]
        api_key: String,
    },

    // Collections
    CreateCollection {
        #[serde(rename = "projectId")]
        project_id: String,
        name: String,
    },
    ListCollections {
        #[serde(rename = "projectId")]
        project_id: String,
    },
    DeleteCollection {
        #[serde(rename = "projectId")]
        project_id: String,
        name: String,
    },

    // Records
    CreateRecord {
        #[serde(rename = "projectId")]
        project_id: String,
        collection: String,
        data: Document,
    },
    GetRecord {
        #[serde(rename = "projectId")]
        project_id: String,
        collection: String,
        id: String,
    },
    ListRecords {
        #[serde(rename = "projectId")]
        project_id: String,
        collection: String,
        /// Filter and pagination parameters, as a query string would carry them
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
    UpdateRecord {
        #[serde(rename = "projectId")]
        project_id: String,
        collection: String,
        id: String,
        data: Document,
    },
    DeleteRecord {
        #[serde(rename = "projectId")]
        project_id: String,
        collection: String,
        id: String,
    },

    // Batch operations
    BatchCreate {
        #[serde(rename = "projectId")]
        project_id: String,
        collection: String,
        records: Vec<Value>,
    },
    BatchUpdate {
        #[serde(rename = "projectId")]
        project_id: String,
        collection: String,
        updates: Vec<WireUpdate>,
    },
    BatchDelete {
        #[serde(rename = "projectId")]
        project_id: String,
        collection: String,
        ids: Vec<String>,
    },

    // Schema inference
    InferSchema {
        #[serde(rename = "projectId")]
        project_id: String,
        collection: String,
    },

    // Control
    Ping,
    Shutdown,
}

/// One batch-update entry on the wire
#[derive(Debug, Deserialize)]
pub struct WireUpdate {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data: Option<Document>,
}

/// Response to client
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Error {
        success: bool,
        error: String,
    },
    Message {
        success: bool,
        message: String,
    },
    Data {
        success: bool,
        data: Value,
    },
    List {
        success: bool,
        data: Vec<Value>,
        pagination: Pagination,
    },
    Batch {
        success: bool,
        message: String,
        data: Vec<Value>,
        count: usize,
    },
    Deleted {
        success: bool,
        message: String,
        count: usize,
        #[serde(rename = "deletedIds")]
        deleted_ids: Vec<String>,
    },
    Pong {
        pong: bool,
        version: String,
    },
}

impl Response {
    fn message(text: impl Into<String>) -> Self {
        Response::Message {
            success: true,
            message: text.into(),
        }
    }

    fn data(value: Value) -> Self {
        Response::Data {
            success: true,
            data: value,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Response::Error {
            success: false,
            error: text.into(),
        }
    }

    /// Map a DbError to the envelope. Classified errors carry their own
    /// message; internal failures are logged and surfaced opaquely.
    fn failure(err: DbError, opaque: &str) -> Self {
        if err.is_internal() {
            tracing::error!("{}: {}", opaque, err);
            Response::error(opaque)
        } else {
            Response::error(err.to_string())
        }
    }
}

/// JSON form of any serializable value; the JSON layer renders ids and
/// timestamps as strings before they hit MessagePack
fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Parse a wire identifier or bail out of the handler with an error
/// response
macro_rules! try_id {
    ($value:expr, $what:expr) => {
        match Uuid::parse_str(&$value) {
            Ok(id) => id,
            Err(_) => return Response::error(concat!("Invalid ", $what)),
        }
    };
}

// ============================================================================
// Request Handler
// ============================================================================

fn handle_request(db: &Db, request: Request) -> Response {
    match request {
        // Projects
        Request::CreateProject { name, owner } => match db.create_project(&name, &owner) {
            Ok(project) => Response::data(to_json(&project)),
            Err(e) => Response::failure(e, "Failed to create project"),
        },
        Request::ListProjects { owner } => match db.list_projects(&owner) {
            Ok(projects) => Response::data(to_json(&projects)),
            Err(e) => Response::failure(e, "Failed to fetch projects"),
        },
        Request::GetProject { project_id } => {
            let project_id = try_id!(project_id, "project ID");
            match db.get_project(project_id) {
                Ok(project) => Response::data(to_json(&project)),
                Err(e) => Response::failure(e, "Failed to fetch project"),
            }
        }
        Request::DeleteProject { project_id } => {
            let project_id = try_id!(project_id, "project ID");
            match db.delete_project(project_id) {
                Ok(()) => Response::message("Project deleted successfully"),
                Err(e) => Response::failure(e, "Failed to delete project"),
            }
        }
        Request::Auth { api_key } => match db.resolve_api_key(&api_key) {
            Ok(Some(project)) => Response::data(to_json(&project)),
            Ok(None) => Response::error("Invalid API key"),
            Err(e) => Response::failure(e, "Authentication failed"),
        },

        // Collections
        Request::CreateCollection { project_id, name } => {
            let project_id = try_id!(project_id, "project ID");
            match db.create_collection(project_id, &name) {
                Ok(collection) => Response::data(to_json(&collection)),
                Err(e) => Response::failure(e, "Failed to create collection"),
            }
        }
        Request::ListCollections { project_id } => {
            let project_id = try_id!(project_id, "project ID");
            match db.list_collections(project_id) {
                Ok(collections) => Response::data(to_json(&collections)),
                Err(e) => Response::failure(e, "Failed to fetch collections"),
            }
        }
        Request::DeleteCollection { project_id, name } => {
            let project_id = try_id!(project_id, "project ID");
            match db.delete_collection(project_id, &name) {
                Ok(()) => Response::message("Collection deleted successfully"),
                Err(e) => Response::failure(e, "Failed to delete collection"),
            }
        }

        // Records
        Request::CreateRecord {
            project_id,
            collection,
            data,
        } => {
            let project_id = try_id!(project_id, "project ID");
            match db.create_record(project_id, &collection, data) {
                Ok(record) => Response::data(record),
                Err(e) => Response::failure(e, "Failed to create record"),
            }
        }
        Request::GetRecord {
            project_id,
            collection,
            id,
        } => {
            let project_id = try_id!(project_id, "project ID");
            let id = try_id!(id, "record ID");
            match db.get_record(project_id, &collection, id) {
                Ok(record) => Response::data(record),
                Err(e) => Response::failure(e, "Failed to fetch record"),
            }
        }
        Request::ListRecords {
            project_id,
            collection,
            params,
        } => {
            let project_id = try_id!(project_id, "project ID");
            let params: Vec<(String, String)> = params.into_iter().collect();
            match db.list_records(project_id, &collection, &params) {
                Ok(page) => Response::List {
                    success: true,
                    data: page.records,
                    pagination: page.pagination,
                },
                Err(e) => Response::failure(e, "Failed to fetch records"),
            }
        }
        Request::UpdateRecord {
            project_id,
            collection,
            id,
            data,
        } => {
            let project_id = try_id!(project_id, "project ID");
            let id = try_id!(id, "record ID");
            match db.update_record(project_id, &collection, id, data) {
                Ok(record) => Response::data(record),
                Err(e) => Response::failure(e, "Failed to update record"),
            }
        }
        Request::DeleteRecord {
            project_id,
            collection,
            id,
        } => {
            let project_id = try_id!(project_id, "project ID");
            let id = try_id!(id, "record ID");
            match db.delete_record(project_id, &collection, id) {
                Ok(()) => Response::message("Record deleted successfully"),
                Err(e) => Response::failure(e, "Failed to delete record"),
            }
        }

        // Batch operations
        Request::BatchCreate {
            project_id,
            collection,
            records,
        } => {
            let project_id = try_id!(project_id, "project ID");
            match db.batch_create(project_id, &collection, records) {
                Ok(report) => {
                    let data: Vec<Value> = report.records().iter().map(to_json).collect();
                    Response::Batch {
                        success: true,
                        message: format!("{} records created successfully", data.len()),
                        count: data.len(),
                        data,
                    }
                }
                Err(e) => Response::failure(e, "Failed to create records"),
            }
        }
        Request::BatchUpdate {
            project_id,
            collection,
            updates,
        } => {
            let project_id = try_id!(project_id, "project ID");
            // an unparseable id makes the entry invalid, not the call
            let entries: Vec<UpdateEntry> = updates
                .into_iter()
                .map(|u| UpdateEntry {
                    id: u.id.as_deref().and_then(|s| Uuid::parse_str(s).ok()),
                    data: u.data,
                })
                .collect();
            match db.batch_update(project_id, &collection, entries) {
                Ok(report) => {
                    let data: Vec<Value> = report.records().iter().map(to_json).collect();
                    Response::Batch {
                        success: true,
                        message: format!("{} records updated successfully", data.len()),
                        count: data.len(),
                        data,
                    }
                }
                Err(e) => Response::failure(e, "Failed to update records"),
            }
        }
        Request::BatchDelete {
            project_id,
            collection,
            ids,
        } => {
            let project_id = try_id!(project_id, "project ID");
            // malformed ids cannot exist in the store; drop them like
            // any other non-existent id
            let parsed: Vec<Uuid> = ids
                .iter()
                .filter_map(|s| Uuid::parse_str(s).ok())
                .collect();
            if parsed.is_empty() && !ids.is_empty() {
                return Response::Deleted {
                    success: true,
                    message: "0 records deleted successfully".to_string(),
                    count: 0,
                    deleted_ids: Vec::new(),
                };
            }
            match db.batch_delete(project_id, &collection, parsed) {
                Ok(report) => {
                    let deleted_ids: Vec<String> = report
                        .deleted_ids()
                        .iter()
                        .map(Uuid::to_string)
                        .collect();
                    Response::Deleted {
                        success: true,
                        message: format!("{} records deleted successfully", deleted_ids.len()),
                        count: deleted_ids.len(),
                        deleted_ids,
                    }
                }
                Err(e) => Response::failure(e, "Failed to delete records"),
            }
        }

        // Schema inference
        Request::InferSchema {
            project_id,
            collection,
        } => {
            let project_id = try_id!(project_id, "project ID");
            match db.infer_schema(project_id, &collection) {
                Ok(report) => Response::data(to_json(&report)),
                Err(e) => Response::failure(e, "Failed to infer schema"),
            }
        }

        // Control
        Request::Ping => Response::Pong {
            pong: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        // Shutdown is handled specially in the client loop
        Request::Shutdown => Response::message("Shutting down"),
    }
}

// ============================================================================
// Client Connection Handler
// ============================================================================

fn read_message(stream: &mut UnixStream) -> std::io::Result<Option<Vec<u8>>> {
    // Read 4-byte length prefix (big-endian)
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > 16 * 1024 * 1024 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Message too large: {} bytes", len),
        ));
    }

    // Read payload
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;

    Ok(Some(buf))
}

fn write_message(stream: &mut UnixStream, data: &[u8]) -> std::io::Result<()> {
    // Write 4-byte length prefix (big-endian)
    let len = data.len() as u32;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(data)?;
    stream.flush()?;
    Ok(())
}

fn handle_client(mut stream: UnixStream, db: Arc<Db>, client_id: usize) {
    eprintln!("[simpledata-server] Client {} connected", client_id);

    loop {
        // Read request
        let msg = match read_message(&mut stream) {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                eprintln!("[simpledata-server] Client {} disconnected", client_id);
                break;
            }
            Err(e) => {
                eprintln!(
                    "[simpledata-server] Client {} read error: {}",
                    client_id, e
                );
                break;
            }
        };

        // Deserialize request
        let request: Request = match rmp_serde::from_slice(&msg) {
            Ok(req) => req,
            Err(e) => {
                let response = Response::error(format!("Invalid request: {}", e));
                if let Ok(resp_bytes) = rmp_serde::to_vec_named(&response) {
                    let _ = write_message(&mut stream, &resp_bytes);
                }
                continue;
            }
        };

        // Check for shutdown
        let is_shutdown = matches!(request, Request::Shutdown);

        // Handle request
        let response = handle_request(&db, request);

        // Serialize and send response (to_vec_named keeps field names)
        let resp_bytes = match rmp_serde::to_vec_named(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("[simpledata-server] Serialize error: {}", e);
                continue;
            }
        };

        if let Err(e) = write_message(&mut stream, &resp_bytes) {
            eprintln!(
                "[simpledata-server] Client {} write error: {}",
                client_id, e
            );
            break;
        }

        if is_shutdown {
            eprintln!(
                "[simpledata-server] Shutdown requested by client {}",
                client_id
            );
            if let Err(e) = db.flush() {
                eprintln!("[simpledata-server] Flush failed: {}", e);
            }
            std::process::exit(0);
        }
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: simpledata-server <data-path> [--socket <socket-path>]");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  <data-path>    Path to the document store directory");
        eprintln!("  --socket       Unix socket path (default: /tmp/simpledata.sock)");
        std::process::exit(1);
    }

    let data_path = PathBuf::from(&args[1]);
    let socket_path = args
        .iter()
        .position(|a| a == "--socket")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("/tmp/simpledata.sock")
        .to_string();

    // Remove stale socket file
    let _ = std::fs::remove_file(&socket_path);

    eprintln!("[simpledata-server] Opening store: {:?}", data_path);
    let db = Arc::new(Db::open(&data_path)?);

    let listener = UnixListener::bind(&socket_path)?;
    eprintln!("[simpledata-server] Listening on {}", socket_path);

    // Set up signal handler for graceful shutdown
    let db_for_signal = Arc::clone(&db);
    let socket_path_for_signal = socket_path.clone();
    let mut signals = signal_hook::iterator::Signals::new([
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGTERM,
    ])?;

    thread::spawn(move || {
        for sig in signals.forever() {
            eprintln!("[simpledata-server] Received signal {}, flushing...", sig);

            match db_for_signal.flush() {
                Ok(()) => eprintln!("[simpledata-server] Flush complete"),
                Err(e) => eprintln!("[simpledata-server] Flush failed: {}", e),
            }

            let _ = std::fs::remove_file(&socket_path_for_signal);
            eprintln!("[simpledata-server] Exiting");
            std::process::exit(0);
        }
    });

    // Accept connections
    let mut client_id = 0;
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                client_id += 1;
                let db_clone = Arc::clone(&db);
                thread::spawn(move || {
                    handle_client(stream, db_clone, client_id);
                });
            }
            Err(e) => {
                eprintln!("[simpledata-server] Accept error: {}", e);
            }
        }
    }

    Ok(())
}
