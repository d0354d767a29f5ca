use basedb::operation::{self, Request, Response, ResponseBody};
use basedb::{Config, Store};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process;

/// BaseDB CLI: work with a local BaseDB data directory from the command line
#[derive(Parser)]
#[command(name = "basedb", version, about)]
struct Cli {
    /// Path to the data directory (default: BASEDB_DATA_DIR, the config file, or ./data)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List databases
    Databases,

    /// List the collections in a database
    Collections { database: String },

    /// Create a database
    CreateDb { database: String },

    /// Delete a database and all of its collections
    DropDb { database: String },

    /// Rename a database
    RenameDb { database: String, new_name: String },

    /// Create an empty collection
    Create {
        database: String,
        collection: String,
    },

    /// Delete a collection
    Drop {
        database: String,
        collection: String,
    },

    /// Rename a collection
    Rename {
        database: String,
        collection: String,
        new_name: String,
    },

    /// Insert a document
    Insert {
        database: String,
        collection: String,
        #[command(flatten)]
        body: DocumentArgs,
    },

    /// Insert a JSON array of documents
    InsertMany {
        database: String,
        collection: String,
        /// JSON array of documents
        #[arg(long)]
        data: String,
    },

    /// Replace a document by ID
    Update {
        database: String,
        collection: String,
        /// Document ID
        id: String,
        #[command(flatten)]
        body: DocumentArgs,
    },

    /// Merge fields into every document matching a query
    UpdateMany {
        database: String,
        collection: String,
        /// Query as a JSON object (e.g. --query '{"age":{"$gte":18}}')
        #[arg(long)]
        query: String,
        #[command(flatten)]
        body: DocumentArgs,
    },

    /// Get the first document whose fields equal the filters
    FindOne {
        database: String,
        collection: String,
        /// Equality filters (e.g. --filter role=admin)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
    },

    /// List documents whose fields equal the filters
    FindMany {
        database: String,
        collection: String,
        /// Equality filters (e.g. --filter role=admin)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
        #[command(flatten)]
        page: PageArgs,
    },

    /// Run an operator query
    Find {
        database: String,
        collection: String,
        /// Query as a JSON object (e.g. --query '{"age":{"$gte":18}}')
        #[arg(long)]
        query: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },

    /// Print the stored collection file
    Read {
        database: String,
        collection: String,
    },
}

#[derive(Args)]
struct DocumentArgs {
    /// Field values (e.g. --field name="Alice Chen")
    #[arg(long = "field", value_parser = parse_key_value)]
    fields: Vec<(String, String)>,
    /// Whole document as a JSON object; --field values are applied on top
    #[arg(long)]
    data: Option<String>,
}

#[derive(Args)]
struct PageArgs {
    /// Field to sort by
    #[arg(long)]
    sort: Option<String>,
    /// Sort order (asc or desc)
    #[arg(long)]
    order: Option<String>,
    #[arg(long)]
    skip: Option<String>,
    #[arg(long)]
    limit: Option<String>,
}

impl PageArgs {
    fn into_params(self, params: &mut HashMap<String, String>) {
        let pairs = [
            ("sort", self.sort),
            ("order", self.order),
            ("skip", self.skip),
            ("limit", self.limit),
        ];
        for (key, value) in pairs {
            if let Some(value) = value {
                params.insert(key.to_string(), value);
            }
        }
    }
}

/// A collection call assembled from CLI arguments.
struct Invocation {
    command: &'static str,
    method: &'static str,
    params: HashMap<String, String>,
    body: Vec<u8>,
}

impl Invocation {
    fn new(command: &'static str) -> Self {
        Invocation {
            command,
            method: "GET",
            params: HashMap::new(),
            body: Vec::new(),
        }
    }

    fn post(mut self, body: Vec<u8>) -> Self {
        self.method = "POST";
        self.body = body;
        self
    }

    fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    fn filters(mut self, filters: Vec<(String, String)>) -> Self {
        self.params.extend(filters);
        self
    }

    fn execute(&self, store: &Store, database: &str, collection: &str) -> basedb::Result<Response> {
        let request = Request::new(self.method, &self.params, &self.body);
        operation::execute_collection(store, database, collection, self.command, &request)
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| {
        format!("Invalid key=value pair: no '=' found in '{s}'")
    })?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let store = Store::open(&config)?;
    let empty = HashMap::new();

    let response = match cli.command {
        Command::Databases => operation::list_databases(&store)?,

        Command::Collections { database } => {
            let req = Request::new("GET", &empty, &[]);
            operation::execute_database(&store, &database, "list", &req)?
        }

        Command::CreateDb { database } => {
            let req = Request::new("GET", &empty, &[]);
            operation::execute_database(&store, &database, "create", &req)?
        }

        Command::DropDb { database } => {
            let req = Request::new("GET", &empty, &[]);
            operation::execute_database(&store, &database, "delete", &req)?
        }

        Command::RenameDb { database, new_name } => {
            let params = HashMap::from([("newName".to_string(), new_name)]);
            let req = Request::new("GET", &params, &[]);
            operation::execute_database(&store, &database, "rename", &req)?
        }

        Command::Create {
            database,
            collection,
        } => Invocation::new("create").execute(&store, &database, &collection)?,

        Command::Drop {
            database,
            collection,
        } => Invocation::new("delete").execute(&store, &database, &collection)?,

        Command::Rename {
            database,
            collection,
            new_name,
        } => Invocation::new("rename")
            .param("newName", new_name)
            .execute(&store, &database, &collection)?,

        Command::Insert {
            database,
            collection,
            body,
        } => Invocation::new("insertOne")
            .post(document_body(&body)?)
            .execute(&store, &database, &collection)?,

        Command::InsertMany {
            database,
            collection,
            data,
        } => Invocation::new("insertMany")
            .post(data.into_bytes())
            .execute(&store, &database, &collection)?,

        Command::Update {
            database,
            collection,
            id,
            body,
        } => Invocation::new("updateOne")
            .param("id", id)
            .post(document_body(&body)?)
            .execute(&store, &database, &collection)?,

        Command::UpdateMany {
            database,
            collection,
            query,
            body,
        } => {
            let query: serde_json::Value = serde_json::from_str(&query)
                .map_err(|e| format!("Invalid --query JSON: {e}"))?;
            let update = document_value(&body)?;
            let payload = serde_json::json!({ "query": query, "update": update });
            Invocation::new("updateMany")
                .post(serde_json::to_vec(&payload)?)
                .execute(&store, &database, &collection)?
        }

        Command::FindOne {
            database,
            collection,
            filters,
        } => Invocation::new("findOne")
            .filters(filters)
            .execute(&store, &database, &collection)?,

        Command::FindMany {
            database,
            collection,
            filters,
            page,
        } => {
            let mut inv = Invocation::new("findMany").filters(filters);
            page.into_params(&mut inv.params);
            inv.execute(&store, &database, &collection)?
        }

        Command::Find {
            database,
            collection,
            query,
            page,
        } => {
            let mut inv = Invocation::new("find")
                .post(query.map(String::into_bytes).unwrap_or_default());
            page.into_params(&mut inv.params);
            inv.execute(&store, &database, &collection)?
        }

        Command::Read {
            database,
            collection,
        } => Invocation::new("read").execute(&store, &database, &collection)?,
    };

    match response.into_body() {
        ResponseBody::Json(value) => print_output(&value, &cli.format)?,
        ResponseBody::Raw(bytes) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            writeln!(stdout)?;
        }
    }

    Ok(())
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
        }
    }
    Ok(())
}

fn document_body(args: &DocumentArgs) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    Ok(serde_json::to_vec(&document_value(args)?)?)
}

/// Merge `--data` and `--field` arguments into one JSON object.
fn document_value(args: &DocumentArgs) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let mut map = match &args.data {
        Some(raw) => match serde_json::from_str(raw)? {
            serde_json::Value::Object(map) => map,
            _ => return Err("--data must be a JSON object".into()),
        },
        None => serde_json::Map::new(),
    };
    for (key, val) in &args.fields {
        // Try to parse as JSON value (for numbers, booleans, arrays, objects)
        let json_val = serde_json::from_str(val).unwrap_or(serde_json::Value::String(val.clone()));
        map.insert(key.clone(), json_val);
    }
    Ok(serde_json::Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("name=Alice=Chen").unwrap(),
            ("name".to_string(), "Alice=Chen".to_string())
        );
        assert!(parse_key_value("name").is_err());
    }

    #[test]
    fn test_document_value_merges_fields_over_data() {
        let args = DocumentArgs {
            fields: vec![
                ("age".to_string(), "31".to_string()),
                ("city".to_string(), "Kraków".to_string()),
            ],
            data: Some(r#"{"name":"Alice","age":30}"#.to_string()),
        };
        assert_eq!(
            document_value(&args).unwrap(),
            json!({ "name": "Alice", "age": 31, "city": "Kraków" })
        );
    }

    #[test]
    fn test_document_value_rejects_non_object_data() {
        let args = DocumentArgs {
            fields: vec![],
            data: Some("[1,2]".to_string()),
        };
        assert!(document_value(&args).is_err());
    }

    #[test]
    fn test_page_args_into_params() {
        let page = PageArgs {
            sort: Some("age".to_string()),
            order: Some("desc".to_string()),
            skip: None,
            limit: Some("5".to_string()),
        };
        let mut params = HashMap::new();
        page.into_params(&mut params);
        assert_eq!(params.len(), 3);
        assert_eq!(params["order"], "desc");
    }

    #[test]
    fn test_invocation_round_trips_through_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Store::open_dir(tmp.path()).unwrap();
        Invocation::new("create").execute(&store, "shop", "users").unwrap();
        Invocation::new("insertOne")
            .post(br#"{"role":"admin"}"#.to_vec())
            .execute(&store, "shop", "users")
            .unwrap();

        let found = Invocation::new("findOne")
            .filters(vec![("role".to_string(), "admin".to_string())])
            .execute(&store, "shop", "users")
            .unwrap();
        match found.into_body() {
            ResponseBody::Json(doc) => assert_eq!(doc["role"], json!("admin")),
            ResponseBody::Raw(_) => panic!("expected a document"),
        }
    }
}
