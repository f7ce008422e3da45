//! Relational index-emulation engine.
//!
//! Each document table stores one serialized record per row. Every declared
//! index gets its own index table mirroring the indexed fields plus the
//! identifier; queries run against the index table to obtain an ordered
//! identifier list, then fetch the documents by identifier.

pub mod compiler;
mod ddl;
mod delete;
pub mod naming;
pub mod query_log;
mod reader;
pub mod selector;
mod writer;

use std::time::Instant;

use log::{debug, warn};
use tracing::info_span;

pub use compiler::{CompilerRegistry, ConditionCompiler};
pub use query_log::QueryLogEntry;
pub use selector::{Source, select_source};

use crate::core::{DbError, Record, Result};
use crate::query::Criteria;
use crate::result::QueryResult;
use crate::schema::{Index, Table};
use crate::sql::{SqlDriver, SqlRows, SqlValue};
use crate::storage::{ConnectionConfig, DEFAULT_BATCH_SIZE, StorageBackend};

pub struct RelationalEngine<D: SqlDriver> {
    conn: Option<D>,
    compilers: CompilerRegistry,
    diagnostics: bool,
    batch_size: usize,
    query_log: Vec<QueryLogEntry>,
}

impl<D: SqlDriver> RelationalEngine<D> {
    /// Engine that opens its connection on `connect`.
    pub fn new() -> Self {
        Self {
            conn: None,
            compilers: CompilerRegistry::with_default_compilers(),
            diagnostics: false,
            batch_size: DEFAULT_BATCH_SIZE,
            query_log: Vec::new(),
        }
    }

    /// Engine over an already open connection.
    pub fn with_driver(driver: D) -> Self {
        Self {
            conn: Some(driver),
            ..Self::new()
        }
    }

    pub fn with_compilers(mut self, compilers: CompilerRegistry) -> Self {
        self.compilers = compilers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    pub fn driver(&self) -> Option<&D> {
        self.conn.as_ref()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Statements executed so far. Empty unless diagnostics are enabled.
    pub fn query_log(&self) -> &[QueryLogEntry] {
        &self.query_log
    }

    pub fn clear_query_log(&mut self) {
        self.query_log.clear();
    }

    // ------------------------------------------------------------------
    // Driver access
    // ------------------------------------------------------------------

    fn conn(&mut self) -> Result<&mut D> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::Connection("Engine is not connected".into()))
    }

    pub(crate) fn dialect(&self) -> Result<D::Dialect> {
        self.conn
            .as_ref()
            .map(|conn| conn.dialect())
            .ok_or_else(|| DbError::Connection("Engine is not connected".into()))
    }

    pub(crate) fn compilers(&self) -> &CompilerRegistry {
        &self.compilers
    }

    pub(crate) fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        let start = Instant::now();
        let result = self.conn()?.execute(sql, params);
        self.record(sql, params, start);
        result
    }

    pub(crate) fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<SqlRows> {
        let start = Instant::now();
        let result = self.conn()?.fetch_all(sql, params);
        self.record(sql, params, start);
        result
    }

    pub(crate) fn fetch_column(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlValue>> {
        let start = Instant::now();
        let result = self.conn()?.fetch_column(sql, params);
        self.record(sql, params, start);
        result
    }

    fn record(&mut self, sql: &str, params: &[SqlValue], start: Instant) {
        let elapsed = start.elapsed();
        debug!("{} ({:?})", sql, elapsed);
        if self.diagnostics {
            self.query_log.push(QueryLogEntry {
                sql: sql.to_string(),
                params: params.to_vec(),
                elapsed,
            });
        }
    }

    /// Run `f` inside a transaction, rolling back on any error.
    ///
    /// Joins the enclosing transaction when one is already open.
    pub(crate) fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.conn()?.in_transaction() {
            return f(self);
        }

        self.conn()?.begin()?;
        match f(self) {
            Ok(value) => {
                self.conn()?.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.conn()?.rollback() {
                    warn!("Rollback failed after '{}': {}", err, rollback_err);
                }
                Err(err)
            }
        }
    }
}

impl<D: SqlDriver> Default for RelationalEngine<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: SqlDriver> StorageBackend for RelationalEngine<D> {
    fn connect(&mut self, config: &ConnectionConfig) -> Result<bool> {
        self.diagnostics = config.diagnostics;
        self.batch_size = config.batch_size()?;
        if self.conn.is_none() {
            self.conn = Some(D::open(config)?);
        }
        Ok(true)
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn get(&mut self, table: &Table, criteria: &Criteria) -> Result<QueryResult> {
        let span = info_span!("engine.get", table = %table.name());
        let _enter = span.enter();
        self.read(table, criteria)
    }

    fn get_count(&mut self, table: &Table, criteria: &Criteria) -> Result<u64> {
        let span = info_span!("engine.count", table = %table.name());
        let _enter = span.enter();
        self.count(table, criteria)
    }

    fn insert(&mut self, table: &Table, record: Record) -> Result<Record> {
        let span = info_span!("engine.insert", table = %table.name());
        let _enter = span.enter();
        self.insert_document(table, record)
    }

    fn update(&mut self, table: &Table, record: Record) -> Result<Record> {
        let span = info_span!("engine.update", table = %table.name());
        let _enter = span.enter();
        self.update_document(table, record)
    }

    fn kill(&mut self, table: &Table, criteria: &Criteria) -> Result<u64> {
        let span = info_span!("engine.kill", table = %table.name());
        let _enter = span.enter();
        self.delete(table, criteria)
    }

    fn set_table(&mut self, table: &Table) -> Result<bool> {
        self.create_table(table)
    }

    fn kill_table(&mut self, table: &Table) -> Result<bool> {
        self.drop_table(table)
    }

    fn has_table(&mut self, table: &Table) -> Result<bool> {
        self.table_exists(table.name())
    }

    fn set_index(&mut self, table: &Table, index: &Index) -> Result<bool> {
        self.create_index(table, index)
    }

    fn kill_index(&mut self, table: &Table, index: &Index) -> Result<bool> {
        self.drop_index(table, index)
    }

    fn get_indexes(&mut self, table: &Table) -> Result<Vec<String>> {
        self.physical_indexes(table.name())
    }

    fn resolve(&mut self, table: &Table, error: &DbError) -> Result<bool> {
        match error {
            DbError::TableNotFound(missing) => {
                warn!(
                    "Table '{}' missing while working on '{}', creating it",
                    missing,
                    table.name()
                );
                self.create_table(table)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqliteDriver;

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let mut engine = RelationalEngine::with_driver(SqliteDriver::open_in_memory().unwrap());
        engine.execute("CREATE TABLE t (v INTEGER)", &[]).unwrap();

        let result: Result<()> = engine.transaction(|engine| {
            engine.execute("INSERT INTO t VALUES (1)", &[])?;
            Err(DbError::Backend("boom".into()))
        });
        assert!(result.is_err());

        let rows = engine.fetch_all("SELECT v FROM t", &[]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_query_log_only_with_diagnostics() {
        let mut engine = RelationalEngine::with_driver(SqliteDriver::open_in_memory().unwrap());
        engine.fetch_all("SELECT 1", &[]).unwrap();
        assert!(engine.query_log().is_empty());

        let mut engine = engine.with_diagnostics(true);
        engine.fetch_all("SELECT ?", &[SqlValue::Integer(7)]).unwrap();
        assert_eq!(engine.query_log().len(), 1);
        assert_eq!(engine.query_log()[0].params, vec![SqlValue::Integer(7)]);

        engine.clear_query_log();
        assert!(engine.query_log().is_empty());
    }

    #[test]
    fn test_not_connected() {
        let mut engine: RelationalEngine<SqliteDriver> = RelationalEngine::new();
        assert!(!engine.is_connected());
        assert!(matches!(
            engine.execute("SELECT 1", &[]),
            Err(DbError::Connection(_))
        ));
    }
}
