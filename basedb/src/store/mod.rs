mod lock;

pub use lock::{LockRegistry, NamedLock};

use crate::config::Config;
use crate::document::{now_timestamp, Document};
use crate::error::{BaseDbError, Result};
use crate::mutation;
use crate::pipeline::{self, FindOptions};
use crate::query::Query;
use std::io::Write;
use std::path::{Path, PathBuf};

const COLLECTION_EXT: &str = "json";

/// The main entry point for BaseDB.
/// Owns the data directory (one subdirectory per database, one JSON file per
/// collection) and the per-key locks that serialize writers.
pub struct Store {
    root: PathBuf,
    locks: LockRegistry,
}

impl Store {
    /// Open a store, creating the data directory if it does not exist yet.
    pub fn open(config: &Config) -> Result<Self> {
        let root = config.data_dir.clone();
        if !root.exists() {
            log::info!("Creating data directory {}", root.display());
            std::fs::create_dir_all(&root)?;
        }
        Ok(Store {
            root,
            locks: LockRegistry::new(),
        })
    }

    /// Open a store at `path` with otherwise default configuration.
    pub fn open_dir(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(&Config::with_data_dir(path))
    }

    // ── Databases ──────────────────────────────────────────────────

    /// Names of all databases, sorted.
    pub fn list_databases(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                match entry.file_name().into_string() {
                    Ok(name) => names.push(name),
                    Err(raw) => log::warn!("Skipping non-UTF-8 database directory {raw:?}"),
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn database_exists(&self, database: &str) -> bool {
        self.database_path(database).is_dir()
    }

    /// Create a database. Creating one that already exists is a no-op.
    pub fn create_database(&self, database: &str) -> Result<()> {
        validate_name("database", database)?;
        std::fs::create_dir_all(self.database_path(database))?;
        log::info!("Created database '{database}'");
        Ok(())
    }

    /// Delete a database and every collection in it.
    pub fn delete_database(&self, database: &str) -> Result<()> {
        validate_name("database", database)?;
        let lock = self.locks.get(database);
        let _guard = lock.write();

        if !self.database_exists(database) {
            return Err(BaseDbError::DatabaseNotFound(database.to_string()));
        }
        std::fs::remove_dir_all(self.database_path(database))?;
        log::info!("Deleted database '{database}'");
        Ok(())
    }

    pub fn rename_database(&self, database: &str, new_name: &str) -> Result<()> {
        validate_name("database", database)?;
        require_new_name(new_name)?;
        validate_name("database", new_name)?;

        let locks = self.locks.get_ordered(&[database, new_name]);
        let _guards: Vec<_> = locks.iter().map(|l| l.write()).collect();

        if !self.database_exists(database) {
            return Err(BaseDbError::DatabaseNotFound(database.to_string()));
        }
        if self.database_path(new_name).exists() {
            return Err(BaseDbError::Conflict(format!("database '{new_name}'")));
        }
        std::fs::rename(self.database_path(database), self.database_path(new_name))?;
        log::info!("Renamed database '{database}' to '{new_name}'");
        Ok(())
    }

    /// Names of the collections in a database, sorted.
    pub fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        validate_name("database", database)?;
        let lock = self.locks.get(database);
        let _guard = lock.read();

        let dir = self.database_path(database);
        if !dir.is_dir() {
            return Err(BaseDbError::DatabaseNotFound(database.to_string()));
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(COLLECTION_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Get a collection handle. The collection does not have to exist yet.
    pub fn collection(&self, database: &str, name: &str) -> Result<Collection<'_>> {
        validate_name("database", database)?;
        validate_name("collection", name)?;
        Ok(Collection {
            store: self,
            database: database.to_string(),
            name: name.to_string(),
        })
    }

    // ── Snapshots ──────────────────────────────────────────────────
    //
    // `load` and `save` take no locks. Collection handles wrap them in the
    // per-collection lock; calling them directly gives no protection against
    // concurrent writers.

    /// Read the full snapshot of a collection.
    pub fn load(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        let path = self.ensure_collection(database, collection)?;
        let bytes = std::fs::read(&path)?;
        log::debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
        decode_snapshot(&bytes)
    }

    /// Replace the full snapshot of a collection. The new content is written
    /// to a temporary file next to the target and renamed over it.
    pub fn save(&self, database: &str, collection: &str, docs: &[Document]) -> Result<()> {
        let path = self.ensure_collection(database, collection)?;
        write_snapshot(&path, docs)
    }

    fn database_path(&self, database: &str) -> PathBuf {
        self.root.join(database)
    }

    fn collection_path(&self, database: &str, collection: &str) -> PathBuf {
        self.root
            .join(database)
            .join(format!("{collection}.{COLLECTION_EXT}"))
    }

    /// Path of an existing collection file, or the matching not-found error.
    fn ensure_collection(&self, database: &str, collection: &str) -> Result<PathBuf> {
        if !self.database_exists(database) {
            return Err(BaseDbError::DatabaseNotFound(database.to_string()));
        }
        let path = self.collection_path(database, collection);
        if !path.is_file() {
            return Err(BaseDbError::CollectionNotFound {
                database: database.to_string(),
                collection: collection.to_string(),
            });
        }
        Ok(path)
    }

    fn collection_key(database: &str, collection: &str) -> String {
        format!("{database}/{collection}")
    }
}

/// A handle to a collection within a store.
/// Every operation runs load → compute → persist under the collection's
/// lock: shared for reads, exclusive for writes.
pub struct Collection<'a> {
    store: &'a Store,
    database: String,
    name: String,
}

impl<'a> Collection<'a> {
    pub fn exists(&self) -> bool {
        self.store
            .collection_path(&self.database, &self.name)
            .is_file()
    }

    /// Fail with the appropriate not-found error unless both the database and
    /// the collection exist.
    pub fn ensure_exists(&self) -> Result<()> {
        self.store
            .ensure_collection(&self.database, &self.name)
            .map(|_| ())
    }

    /// Create the collection as an empty array, creating its database if needed.
    pub fn create(&self) -> Result<()> {
        let db_lock = self.store.locks.get(&self.database);
        let _db = db_lock.read();
        let lock = self.lock();
        let _guard = lock.write();

        std::fs::create_dir_all(self.store.database_path(&self.database))?;
        let path = self.store.collection_path(&self.database, &self.name);
        if path.exists() {
            return Err(BaseDbError::Conflict(format!(
                "collection '{}' in database '{}'",
                self.name, self.database
            )));
        }
        write_snapshot(&path, &[])?;
        log::info!("Created collection '{}/{}'", self.database, self.name);
        Ok(())
    }

    pub fn delete(&self) -> Result<()> {
        let db_lock = self.store.locks.get(&self.database);
        let _db = db_lock.read();
        let lock = self.lock();
        let _guard = lock.write();

        let path = self.store.ensure_collection(&self.database, &self.name)?;
        std::fs::remove_file(path)?;
        log::info!("Deleted collection '{}/{}'", self.database, self.name);
        Ok(())
    }

    pub fn rename(&self, new_name: &str) -> Result<()> {
        require_new_name(new_name)?;
        validate_name("collection", new_name)?;

        let db_lock = self.store.locks.get(&self.database);
        let _db = db_lock.read();
        let old_key = Store::collection_key(&self.database, &self.name);
        let new_key = Store::collection_key(&self.database, new_name);
        let locks = self.store.locks.get_ordered(&[&old_key, &new_key]);
        let _guards: Vec<_> = locks.iter().map(|l| l.write()).collect();

        let path = self.store.ensure_collection(&self.database, &self.name)?;
        let target = self.store.collection_path(&self.database, new_name);
        if target.exists() {
            return Err(BaseDbError::Conflict(format!(
                "collection '{new_name}' in database '{}'",
                self.database
            )));
        }
        std::fs::rename(path, target)?;
        log::info!(
            "Renamed collection '{}/{}' to '{new_name}'",
            self.database,
            self.name
        );
        Ok(())
    }

    /// The stored file exactly as persisted.
    pub fn read_raw(&self) -> Result<Vec<u8>> {
        let db_lock = self.store.locks.get(&self.database);
        let _db = db_lock.read();
        let lock = self.lock();
        let _guard = lock.read();

        let path = self.store.ensure_collection(&self.database, &self.name)?;
        Ok(std::fs::read(path)?)
    }

    /// All documents in storage order.
    pub fn all(&self) -> Result<Vec<Document>> {
        self.read(Ok)
    }

    /// Stamp and append one document. Returns the stored document.
    pub fn insert_one(&self, doc: Document) -> Result<Document> {
        let mut inserted = self.insert_many(vec![doc])?;
        inserted
            .pop()
            .ok_or_else(|| BaseDbError::BadRequest("nothing to insert".to_string()))
    }

    /// Stamp and append documents in a single persist.
    pub fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Document>> {
        let now = now_timestamp();
        self.write(|snapshot| mutation::insert_documents(snapshot, docs, &now))
    }

    /// Replace the document with the given `id`, keeping its identity.
    pub fn update_one(&self, id: &str, replacement: Document) -> Result<Document> {
        let now = now_timestamp();
        self.write(|snapshot| {
            if snapshot.is_empty() {
                return Err(BaseDbError::NotFound(format!(
                    "collection '{}' is empty",
                    self.name
                )));
            }
            mutation::replace_by_id(snapshot, id, replacement, &now)
        })
    }

    /// Merge `patch` into every document matching `query`.
    pub fn update_many(&self, query: &Query, patch: &Document) -> Result<Vec<Document>> {
        let now = now_timestamp();
        self.write(|snapshot| {
            if snapshot.is_empty() {
                return Err(BaseDbError::NotFound(format!(
                    "collection '{}' is empty",
                    self.name
                )));
            }
            mutation::merge_matching(snapshot, query, patch, &now)
        })
    }

    /// First matching document in storage order.
    pub fn find_one(&self, query: &Query) -> Result<Document> {
        self.read(|snapshot| {
            if snapshot.is_empty() {
                return Err(BaseDbError::NotFound(format!(
                    "collection '{}' is empty",
                    self.name
                )));
            }
            snapshot
                .into_iter()
                .find(|d| query.matches(d))
                .ok_or_else(|| BaseDbError::NotFound("no document matches the query".to_string()))
        })
    }

    /// Filter, sort and paginate.
    pub fn find(&self, query: &Query, options: &FindOptions) -> Result<Vec<Document>> {
        self.read(|snapshot| Ok(pipeline::run(snapshot, query, options)))
    }

    fn lock(&self) -> NamedLock {
        self.store
            .locks
            .get(&Store::collection_key(&self.database, &self.name))
    }

    fn read<R>(&self, f: impl FnOnce(Vec<Document>) -> Result<R>) -> Result<R> {
        let db_lock = self.store.locks.get(&self.database);
        let _db = db_lock.read();
        let lock = self.lock();
        let _guard = lock.read();

        let snapshot = self.store.load(&self.database, &self.name)?;
        f(snapshot)
    }

    /// Load, apply `f`, and persist only if `f` succeeds, all under the
    /// collection's write lock.
    fn write<R>(&self, f: impl FnOnce(&mut Vec<Document>) -> Result<R>) -> Result<R> {
        let db_lock = self.store.locks.get(&self.database);
        let _db = db_lock.read();
        let lock = self.lock();
        let _guard = lock.write();

        let mut snapshot = self.store.load(&self.database, &self.name)?;
        let result = f(&mut snapshot)?;
        self.store.save(&self.database, &self.name, &snapshot)?;
        Ok(result)
    }
}

fn decode_snapshot(bytes: &[u8]) -> Result<Vec<Document>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let docs: Option<Vec<Document>> = serde_json::from_slice(bytes)?;
    Ok(docs.unwrap_or_default())
}

fn write_snapshot(path: &Path, docs: &[Document]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, docs)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    log::debug!("Saved {} ({} documents)", path.display(), docs.len());
    Ok(())
}

fn require_new_name(new_name: &str) -> Result<()> {
    if new_name.is_empty() {
        return Err(BaseDbError::BadRequest(
            "missing parameter 'newName'".to_string(),
        ));
    }
    Ok(())
}

/// Names become path components, so they must be a single plain segment.
fn validate_name(kind: &str, name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(BaseDbError::BadRequest(format!(
            "invalid {kind} name '{name}'"
        )));
    }
    Ok(())
}
