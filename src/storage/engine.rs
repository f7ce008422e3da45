use super::config::ConnectionConfig;
use crate::core::{DbError, Record, Result};
use crate::query::Criteria;
use crate::result::QueryResult;
use crate::schema::{Index, Table};

/// Storage backend trait - allows pluggable document stores
///
/// Implementations receive criteria that are already normalized against the
/// table and records that already carry timestamps and defaults; the
/// [`Storage`](super::Storage) wrapper takes care of both.
pub trait StorageBackend {
    /// Open the underlying connection
    fn connect(&mut self, config: &ConnectionConfig) -> Result<bool>;

    /// Whether a connection is open
    fn is_connected(&self) -> bool;

    /// Fetch the records matching `criteria`
    fn get(&mut self, table: &Table, criteria: &Criteria) -> Result<QueryResult>;

    /// Count the records matching `criteria`, ignoring its bounds
    fn get_count(&mut self, table: &Table, criteria: &Criteria) -> Result<u64>;

    /// Store a record that has no identifier yet
    fn insert(&mut self, table: &Table, record: Record) -> Result<Record>;

    /// Replace the record carrying this identifier
    fn update(&mut self, table: &Table, record: Record) -> Result<Record>;

    /// Delete the records matching `criteria`, returning how many went
    fn kill(&mut self, table: &Table, criteria: &Criteria) -> Result<u64>;

    /// Create the table and its declared indexes
    fn set_table(&mut self, table: &Table) -> Result<bool>;

    /// Drop the table and every index it owns
    fn kill_table(&mut self, table: &Table) -> Result<bool>;

    /// Check if the table exists
    fn has_table(&mut self, table: &Table) -> Result<bool>;

    /// Create one index for an existing table
    fn set_index(&mut self, table: &Table, index: &Index) -> Result<bool>;

    /// Drop one index
    fn kill_index(&mut self, table: &Table, index: &Index) -> Result<bool>;

    /// Physical indexes currently present for the table
    fn get_indexes(&mut self, table: &Table) -> Result<Vec<String>>;

    /// Try to fix the condition behind a recoverable `error`.
    ///
    /// Returns `true` when the failed operation should be retried.
    fn resolve(&mut self, table: &Table, error: &DbError) -> Result<bool>;
}
