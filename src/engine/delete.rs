use log::info;

use super::RelationalEngine;
use super::compiler::placeholders;
use super::selector::select_source;
use crate::core::{ID_FIELD, Result};
use crate::query::Criteria;
use crate::schema::Table;
use crate::sql::{Dialect, SqlDriver, SqlValue};

impl<D: SqlDriver> RelationalEngine<D> {
    /// Delete matching documents one batch at a time.
    ///
    /// Each batch selects identifiers through the same path a read would
    /// use, then removes their index rows and document rows in one
    /// transaction. A failure leaves earlier batches committed.
    pub(crate) fn delete(&mut self, table: &Table, criteria: &Criteria) -> Result<u64> {
        let source = select_source(table, criteria)?;
        let bounds = criteria.get_bounds();
        let dialect = self.dialect()?;

        let mut remaining = bounds.limit;
        let mut deleted = 0u64;
        let mut batches = 0usize;

        loop {
            let page = match remaining {
                Some(0) => break,
                Some(left) => left.min(self.batch_size as u64),
                None => self.batch_size as u64,
            };

            // Deleted rows leave the window, so the offset never advances
            let ids = self.matching_ids(table, source, criteria, Some(page), bounds.offset)?;
            if ids.is_empty() {
                break;
            }

            let sql = format!(
                "DELETE FROM {} WHERE {} IN ({})",
                dialect.quote(table.name()),
                dialect.quote(ID_FIELD),
                placeholders(ids.len())
            );
            let params: Vec<SqlValue> = ids.iter().cloned().map(SqlValue::Text).collect();

            let removed = self.transaction(|engine| {
                engine.delete_index_rows(table, &ids)?;
                engine.execute(&sql, &params)
            })?;
            deleted += removed as u64;
            batches += 1;

            if let Some(left) = remaining.as_mut() {
                *left = left.saturating_sub(ids.len() as u64);
            }
            if (ids.len() as u64) < page {
                break;
            }
        }

        if deleted > 0 {
            info!(
                "Deleted {} document(s) from '{}' in {} batch(es)",
                deleted,
                table.name(),
                batches
            );
        }
        Ok(deleted)
    }
}
