// Request-level operations shared by the HTTP server and the CLI
//
// Resolves a `command` against a database or collection, enforces the
// allowed methods, decodes the body and shapes the response envelope.

use crate::document::Document;
use crate::error::{BaseDbError, Result};
use crate::pipeline::{filter_params, FindOptions};
use crate::query::{equality_query, parse_query, Query};
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;

/// Commands accepted at `/api/database/{db}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseCommand {
    Create,
    Delete,
    Rename,
    List,
}

impl FromStr for DatabaseCommand {
    type Err = BaseDbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(DatabaseCommand::Create),
            "delete" => Ok(DatabaseCommand::Delete),
            "rename" => Ok(DatabaseCommand::Rename),
            "list" => Ok(DatabaseCommand::List),
            other => Err(BaseDbError::BadRequest(format!(
                "unknown database command '{other}'"
            ))),
        }
    }
}

/// Commands accepted at `/api/database/{db}/{collection}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionCommand {
    Create,
    Delete,
    Rename,
    InsertOne,
    InsertMany,
    UpdateOne,
    UpdateMany,
    FindOne,
    FindMany,
    Find,
    Read,
}

impl FromStr for CollectionCommand {
    type Err = BaseDbError;

    fn from_str(s: &str) -> Result<Self> {
        let command = match s {
            "create" => CollectionCommand::Create,
            "delete" => CollectionCommand::Delete,
            "rename" => CollectionCommand::Rename,
            "insertOne" => CollectionCommand::InsertOne,
            "insertMany" => CollectionCommand::InsertMany,
            "updateOne" => CollectionCommand::UpdateOne,
            "updateMany" => CollectionCommand::UpdateMany,
            "findOne" => CollectionCommand::FindOne,
            "findMany" => CollectionCommand::FindMany,
            "find" => CollectionCommand::Find,
            "read" => CollectionCommand::Read,
            other => {
                return Err(BaseDbError::BadRequest(format!(
                    "unknown collection command '{other}'"
                )))
            }
        };
        Ok(command)
    }
}

impl CollectionCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionCommand::Create => "create",
            CollectionCommand::Delete => "delete",
            CollectionCommand::Rename => "rename",
            CollectionCommand::InsertOne => "insertOne",
            CollectionCommand::InsertMany => "insertMany",
            CollectionCommand::UpdateOne => "updateOne",
            CollectionCommand::UpdateMany => "updateMany",
            CollectionCommand::FindOne => "findOne",
            CollectionCommand::FindMany => "findMany",
            CollectionCommand::Find => "find",
            CollectionCommand::Read => "read",
        }
    }

    /// Inserts require POST, updates PUT or POST; everything else accepts any method.
    pub fn check_method(&self, method: &str) -> Result<()> {
        let allowed: &[&str] = match self {
            CollectionCommand::InsertOne | CollectionCommand::InsertMany => &["POST"],
            CollectionCommand::UpdateOne | CollectionCommand::UpdateMany => &["PUT", "POST"],
            _ => return Ok(()),
        };
        if allowed.iter().any(|m| m.eq_ignore_ascii_case(method)) {
            return Ok(());
        }
        Err(BaseDbError::MethodNotAllowed {
            method: method.to_string(),
            expected: allowed.join(" or "),
        })
    }
}

/// The transport-independent parts of a request.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub method: &'a str,
    pub params: &'a HashMap<String, String>,
    pub body: &'a [u8],
}

impl<'a> Request<'a> {
    pub fn new(method: &'a str, params: &'a HashMap<String, String>, body: &'a [u8]) -> Self {
        Request {
            method,
            params,
            body,
        }
    }

    pub fn param(&self, name: &str) -> Option<&'a str> {
        self.params.get(name).map(String::as_str)
    }

    fn is_post(&self) -> bool {
        self.method.eq_ignore_ascii_case("POST")
    }

    fn required_param(&self, name: &str) -> Result<&'a str> {
        self.param(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| BaseDbError::BadRequest(format!("missing parameter '{name}'")))
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(self.body)
            .map_err(|e| BaseDbError::BadRequest(format!("invalid JSON body: {e}")))
    }
}

/// Successful outcome of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Message(String),
    Databases(Vec<String>),
    Collections {
        database: String,
        collections: Vec<String>,
    },
    /// A single document returned without an envelope
    Document(Document),
    Inserted(Document),
    InsertedMany(Vec<Document>),
    Updated(Document),
    UpdatedMany(Vec<Document>),
    Documents(Vec<Document>),
    /// Stored collection bytes, passed through untouched
    Raw(Vec<u8>),
}

/// What a transport should send back.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Raw(Vec<u8>),
}

impl Response {
    pub fn into_body(self) -> ResponseBody {
        let value = match self {
            Response::Raw(bytes) => return ResponseBody::Raw(bytes),
            Response::Document(doc) => doc.into_value(),
            Response::Message(message) => json!({ "status": "success", "message": message }),
            Response::Databases(databases) => {
                json!({ "status": "success", "databases": databases })
            }
            Response::Collections {
                database,
                collections,
            } => json!({
                "status": "success",
                "database": database,
                "collections": collections,
            }),
            Response::Inserted(doc) => json!({
                "status": "success",
                "message": "Document inserted",
                "data": doc,
            }),
            Response::InsertedMany(docs) => json!({
                "status": "success",
                "message": format!("Inserted {} documents", docs.len()),
                "inserted_count": docs.len(),
                "documents": docs,
            }),
            Response::Updated(doc) => json!({
                "status": "success",
                "message": "Document updated",
                "data": doc,
            }),
            Response::UpdatedMany(docs) => json!({
                "status": "success",
                "message": format!("Updated {} documents", docs.len()),
                "updated_count": docs.len(),
                "documents": docs,
            }),
            Response::Documents(docs) => json!({
                "status": "success",
                "count": docs.len(),
                "documents": docs,
            }),
        };
        ResponseBody::Json(value)
    }
}

/// Error envelope for any failed operation. Internal failures are reported
/// generically; their details belong in the log.
pub fn error_body(err: &BaseDbError) -> Value {
    let message = if err.is_client_error() {
        err.to_string()
    } else {
        "Internal server error".to_string()
    };
    json!({ "status": "error", "error": message })
}

pub fn list_databases(store: &Store) -> Result<Response> {
    Ok(Response::Databases(store.list_databases()?))
}

pub fn execute_database(
    store: &Store,
    database: &str,
    command: &str,
    req: &Request<'_>,
) -> Result<Response> {
    let response = match command.parse::<DatabaseCommand>()? {
        DatabaseCommand::Create => {
            store.create_database(database)?;
            Response::Message(format!("Database '{database}' created"))
        }
        DatabaseCommand::Delete => {
            store.delete_database(database)?;
            Response::Message(format!("Database '{database}' deleted"))
        }
        DatabaseCommand::Rename => {
            let new_name = req.required_param("newName")?;
            store.rename_database(database, new_name)?;
            Response::Message(format!("Database '{database}' renamed to '{new_name}'"))
        }
        DatabaseCommand::List => Response::Collections {
            database: database.to_string(),
            collections: store.list_collections(database)?,
        },
    };
    Ok(response)
}

pub fn execute_collection(
    store: &Store,
    database: &str,
    collection: &str,
    command: &str,
    req: &Request<'_>,
) -> Result<Response> {
    let command = command.parse::<CollectionCommand>()?;
    let coll = store.collection(database, collection)?;

    if command != CollectionCommand::Create {
        coll.ensure_exists()?;
    }
    command.check_method(req.method)?;
    log::debug!("{} on {database}/{collection}", command.as_str());

    let response = match command {
        CollectionCommand::Create => {
            coll.create()?;
            Response::Message(format!(
                "Collection '{collection}' created in database '{database}'"
            ))
        }
        CollectionCommand::Delete => {
            coll.delete()?;
            Response::Message(format!(
                "Collection '{collection}' deleted from database '{database}'"
            ))
        }
        CollectionCommand::Rename => {
            let new_name = req.required_param("newName")?;
            coll.rename(new_name)?;
            Response::Message(format!(
                "Collection '{collection}' renamed to '{new_name}'"
            ))
        }
        CollectionCommand::InsertOne => {
            let doc: Document = req.decode()?;
            Response::Inserted(coll.insert_one(doc)?)
        }
        CollectionCommand::InsertMany => {
            let docs: Vec<Document> = req.decode()?;
            Response::InsertedMany(coll.insert_many(docs)?)
        }
        CollectionCommand::UpdateOne => {
            let id = req.required_param("id")?;
            let replacement: Document = req.decode()?;
            Response::Updated(coll.update_one(id, replacement)?)
        }
        CollectionCommand::UpdateMany => {
            let (query, patch) = decode_update_many(&req.decode()?)?;
            Response::UpdatedMany(coll.update_many(&query, &patch)?)
        }
        CollectionCommand::FindOne => {
            let query = equality_query(filter_params(req.params));
            Response::Document(coll.find_one(&query)?)
        }
        CollectionCommand::FindMany => {
            let query = equality_query(filter_params(req.params));
            Response::Documents(coll.find(&query, &FindOptions::from_params(req.params))?)
        }
        CollectionCommand::Find => {
            let query = if req.is_post() && !req.body.iter().all(u8::is_ascii_whitespace) {
                let body: Value = req.decode()?;
                parse_query(&body)?
            } else {
                equality_query(filter_params(req.params))
            };
            Response::Documents(coll.find(&query, &FindOptions::from_params(req.params))?)
        }
        CollectionCommand::Read => Response::Raw(coll.read_raw()?),
    };
    Ok(response)
}

/// Split an `updateMany` body into its validated query and its patch.
fn decode_update_many(body: &Value) -> Result<(Query, Document)> {
    let query = match body.get("query") {
        Some(q @ Value::Object(_)) => parse_query(q)?,
        Some(Value::Null) | None => {
            return Err(BaseDbError::BadRequest(
                "missing field 'query'".to_string(),
            ))
        }
        Some(_) => {
            return Err(BaseDbError::BadRequest(
                "field 'query' must be an object".to_string(),
            ))
        }
    };
    let patch = match body.get("update") {
        Some(Value::Null) | None => Document::new(),
        Some(update) => Document::from_value(update.clone())?,
    };
    Ok((query, patch))
}
