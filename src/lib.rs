// ============================================================================
// docrel Library
// ============================================================================

pub mod core;
pub mod engine;
pub mod query;
pub mod result;
pub mod schema;
pub mod sql;
pub mod storage;

// Re-export main types for convenience
pub use self::core::{DbError, ErrorKind, GeoPoint, Record, Result, Value};
pub use self::core::{CREATED_FIELD, ID_FIELD, ROWID_FIELD, UPDATED_FIELD};
pub use engine::{QueryLogEntry, RelationalEngine};
pub use query::{Command, Criteria, SortDirection};
pub use result::QueryResult;
pub use schema::{Field, FieldSize, FieldType, Index, IndexKind, Table};
pub use sql::{SqlDriver, SqliteDriver};
pub use storage::{ConnectionConfig, Storage, StorageBackend};

// ============================================================================
// High-level API
// ============================================================================

/// Document store backed by SQLite
pub type DocumentStore = Storage<RelationalEngine<SqliteDriver>>;

/// Open a SQLite-backed document store
///
/// The connection opens lazily on first use.
///
/// # Examples
///
/// ```
/// use docrel::{ConnectionConfig, Criteria, IndexKind, Record, Table};
///
/// # fn main() -> docrel::Result<()> {
/// let mut store = docrel::open(ConnectionConfig::in_memory());
///
/// let mut users = Table::new("users")?;
/// users.add_index("by_name", &[("name", IndexKind::Ascending)])?;
/// store.set_table(&users)?;
///
/// let saved = store.set(&users, Record::new().with("name", "alice"))?;
/// assert!(saved.id().is_some());
///
/// let found = store.get(&users, &Criteria::new().equals("name", "alice"))?;
/// assert_eq!(found.row_count(), 1);
/// # Ok(())
/// # }
/// ```
pub fn open(config: ConnectionConfig) -> DocumentStore {
    Storage::new(RelationalEngine::new(), config)
}
