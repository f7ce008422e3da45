use super::{Dialect, SqlRows, SqlValue};
use crate::core::Result;
use crate::storage::ConnectionConfig;

/// Prepare/bind/execute over one connection.
///
/// Drivers classify their native errors into [`DbError`](crate::DbError):
/// a missing table must surface as `TableNotFound` and a uniqueness
/// violation as `Duplicate`; everything else is `Backend`.
pub trait SqlDriver {
    type Dialect: Dialect + Copy + 'static;

    fn open(config: &ConnectionConfig) -> Result<Self>
    where
        Self: Sized;

    fn dialect(&self) -> Self::Dialect;

    /// Run a statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize>;

    /// Run a query and fetch every row.
    fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<SqlRows>;

    /// Run a query and fetch its first column.
    fn fetch_column(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlValue>> {
        let rows = self.fetch_all(sql, params)?;
        Ok(rows
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    /// Row number assigned by the most recent insert.
    fn last_insert_id(&mut self) -> Result<i64>;
}
