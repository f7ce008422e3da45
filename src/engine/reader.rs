use std::collections::HashMap;

use log::warn;

use super::RelationalEngine;
use super::compiler::{CompileContext, placeholders};
use super::naming::index_table_name;
use super::selector::{Source, select_source};
use super::writer::decode_body;
use crate::core::{DbError, ID_FIELD, ROWID_FIELD, Record, Result};
use crate::query::{Criteria, SortDirection};
use crate::result::QueryResult;
use crate::schema::{Index, IndexKind, Table};
use crate::sql::{BODY_COLUMN, Dialect, SqlDriver, SqlValue};

/// Decode a `(_rowid, _id, body)` document-table row.
pub(crate) fn decode_document(row: &[SqlValue]) -> Result<Record> {
    let [rowid, id, body] = row else {
        return Err(DbError::Backend(format!(
            "Document row has {} columns, expected 3",
            row.len()
        )));
    };
    let malformed = |what: &str| DbError::Backend(format!("Document row has a malformed {}", what));

    let mut record = Record::from(decode_body(body.as_blob().ok_or_else(|| malformed("body"))?)?);
    record.set(ID_FIELD, id.as_str().ok_or_else(|| malformed("identifier"))?);
    record.set(ROWID_FIELD, rowid.as_i64().ok_or_else(|| malformed("row number"))?);
    Ok(record)
}

fn document_select(dialect: &dyn Dialect, table: &str) -> String {
    format!(
        "SELECT {}, {}, {} FROM {}",
        dialect.quote(ROWID_FIELD),
        dialect.quote(ID_FIELD),
        dialect.quote(BODY_COLUMN),
        dialect.quote(table)
    )
}

/// ORDER BY over the document table: requested sort, then row number.
fn document_order(dialect: &dyn Dialect, criteria: &Criteria) -> String {
    let mut terms: Vec<String> = criteria
        .sort_order()
        .iter()
        .map(|(field, direction)| format!("{} {}", dialect.quote(field), direction.sql()))
        .collect();
    if !criteria.sort_fields().contains(&ROWID_FIELD) {
        terms.push(format!("{} ASC", dialect.quote(ROWID_FIELD)));
    }
    format!(" ORDER BY {}", terms.join(", "))
}

/// ORDER BY over an index table grouped by identifier.
///
/// A document with several rows (one per array element) sorts by its
/// smallest value ascending and its largest value descending. Without a
/// requested sort, the index's own field directions apply. The identifier
/// always breaks ties.
fn index_order(dialect: &dyn Dialect, index: &Index, criteria: &Criteria) -> String {
    let aggregate = |field: &str, direction: SortDirection| match direction {
        SortDirection::Ascending => format!("MIN({}) ASC", dialect.quote(field)),
        SortDirection::Descending => format!("MAX({}) DESC", dialect.quote(field)),
    };

    let mut terms = Vec::new();
    if criteria.has_sort() {
        for (field, direction) in criteria.sort_order() {
            if field == ID_FIELD {
                terms.push(format!("{} {}", dialect.quote(ID_FIELD), direction.sql()));
            } else {
                terms.push(aggregate(field, *direction));
            }
        }
    } else {
        for (field, kind) in index.fields() {
            match kind {
                IndexKind::Ascending => terms.push(aggregate(field, SortDirection::Ascending)),
                IndexKind::Descending => terms.push(aggregate(field, SortDirection::Descending)),
                IndexKind::Spatial => {}
            }
        }
    }
    if !criteria.sort_fields().contains(&ID_FIELD) {
        terms.push(format!("{} ASC", dialect.quote(ID_FIELD)));
    }
    format!(" ORDER BY {}", terms.join(", "))
}

impl<D: SqlDriver> RelationalEngine<D> {
    pub(crate) fn read(&mut self, table: &Table, criteria: &Criteria) -> Result<QueryResult> {
        let source = select_source(table, criteria)?;
        let bounds = criteria.get_bounds();

        // Rows fetched before self-healing; `has_more` counts these
        let (fetched, mut records) = match source {
            Source::Document => {
                let dialect = self.dialect()?;
                let mut ctx = CompileContext::new(&dialect);
                let clause = self.compilers().compile_where(table, None, criteria, &mut ctx)?;
                let sql = format!(
                    "{}{}{}{}",
                    document_select(&dialect, table.name()),
                    clause,
                    document_order(&dialect, criteria),
                    dialect.limit_clause(bounds.paginated_limit, bounds.offset)
                );
                let rows = self.fetch_all(&sql, &ctx.params)?;
                let records = rows
                    .rows
                    .iter()
                    .map(|row| decode_document(row))
                    .collect::<Result<Vec<_>>>()?;
                (rows.row_count(), records)
            }
            Source::Index(index) => {
                let ids = self.index_ids(table, index, criteria, bounds.paginated_limit, bounds.offset)?;
                (ids.len(), self.load_documents(table, &ids)?)
            }
        };

        let has_more = bounds
            .limit
            .is_some_and(|limit| fetched as u64 > limit);
        if let Some(limit) = bounds.limit {
            records.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(QueryResult::new(records, has_more))
    }

    pub(crate) fn count(&mut self, table: &Table, criteria: &Criteria) -> Result<u64> {
        let source = select_source(table, criteria)?;
        let dialect = self.dialect()?;
        let mut ctx = CompileContext::new(&dialect);

        let sql = match source {
            Source::Document => {
                let clause = self.compilers().compile_where(table, None, criteria, &mut ctx)?;
                format!("SELECT COUNT(*) FROM {}{}", dialect.quote(table.name()), clause)
            }
            Source::Index(index) => {
                let clause = self
                    .compilers()
                    .compile_where(table, Some(index), criteria, &mut ctx)?;
                format!(
                    "SELECT COUNT(DISTINCT {}) FROM {}{}",
                    dialect.quote(ID_FIELD),
                    dialect.quote(&index_table_name(table.name(), index)),
                    clause
                )
            }
        };

        let counted = self.fetch_column(&sql, &ctx.params)?;
        let count = counted.first().and_then(SqlValue::as_i64).unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    /// Identifiers matching `criteria` on whichever table serves it, in
    /// result order.
    pub(crate) fn matching_ids(
        &mut self,
        table: &Table,
        source: Source<'_>,
        criteria: &Criteria,
        limit: Option<u64>,
        offset: u64,
    ) -> Result<Vec<String>> {
        match source {
            Source::Index(index) => self.index_ids(table, index, criteria, limit, offset),
            Source::Document => {
                let dialect = self.dialect()?;
                let mut ctx = CompileContext::new(&dialect);
                let clause = self.compilers().compile_where(table, None, criteria, &mut ctx)?;
                let sql = format!(
                    "SELECT {} FROM {}{}{}{}",
                    dialect.quote(ID_FIELD),
                    dialect.quote(table.name()),
                    clause,
                    document_order(&dialect, criteria),
                    dialect.limit_clause(limit, offset)
                );
                let ids = self.fetch_column(&sql, &ctx.params)?;
                Ok(text_values(ids))
            }
        }
    }

    fn index_ids(
        &mut self,
        table: &Table,
        index: &Index,
        criteria: &Criteria,
        limit: Option<u64>,
        offset: u64,
    ) -> Result<Vec<String>> {
        let dialect = self.dialect()?;
        let mut ctx = CompileContext::new(&dialect);
        let clause = self
            .compilers()
            .compile_where(table, Some(index), criteria, &mut ctx)?;
        let sql = format!(
            "SELECT {id} FROM {table}{clause} GROUP BY {id}{order}{limit}",
            id = dialect.quote(ID_FIELD),
            table = dialect.quote(&index_table_name(table.name(), index)),
            order = index_order(&dialect, index, criteria),
            limit = dialect.limit_clause(limit, offset),
        );
        let ids = self.fetch_column(&sql, &ctx.params)?;
        Ok(text_values(ids))
    }

    /// Fetch documents by identifier, preserving the order of `ids`.
    ///
    /// Identifiers with no document are orphaned index rows: they are
    /// removed from every index table and left out of the result.
    fn load_documents(&mut self, table: &Table, ids: &[String]) -> Result<Vec<Record>> {
        let dialect = self.dialect()?;
        let mut found: HashMap<String, Record> = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(self.batch_size) {
            let sql = format!(
                "{} WHERE {} IN ({})",
                document_select(&dialect, table.name()),
                dialect.quote(ID_FIELD),
                placeholders(chunk.len())
            );
            let params: Vec<SqlValue> = chunk.iter().cloned().map(SqlValue::Text).collect();
            for row in self.fetch_all(&sql, &params)?.rows {
                let record = decode_document(&row)?;
                if let Some(id) = record.id() {
                    found.insert(id.to_string(), record);
                }
            }
        }

        let orphans: Vec<String> = ids
            .iter()
            .filter(|id| !found.contains_key(*id))
            .cloned()
            .collect();
        if !orphans.is_empty() {
            warn!(
                "Removing {} orphaned index entr{} from '{}'",
                orphans.len(),
                if orphans.len() == 1 { "y" } else { "ies" },
                table.name()
            );
            self.transaction(|engine| engine.delete_index_rows(table, &orphans))?;
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }
}

fn text_values(values: Vec<SqlValue>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| match value {
            SqlValue::Text(text) => Some(text),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqliteDialect;

    #[test]
    fn test_index_default_order_follows_index() {
        let index = Index::new(
            "by_name_age",
            [("name", IndexKind::Ascending), ("age", IndexKind::Descending)],
        )
        .unwrap();
        let order = index_order(&SqliteDialect, &index, &Criteria::new());
        assert_eq!(
            order,
            " ORDER BY MIN(\"name\") ASC, MAX(\"age\") DESC, \"_id\" ASC"
        );
    }

    #[test]
    fn test_index_requested_order() {
        let index = Index::new("by_age", [("age", IndexKind::Ascending)]).unwrap();
        let criteria = Criteria::new()
            .sort("age", SortDirection::Descending)
            .sort("_id", SortDirection::Descending);
        let order = index_order(&SqliteDialect, &index, &criteria);
        assert_eq!(order, " ORDER BY MAX(\"age\") DESC, \"_id\" DESC");
    }

    #[test]
    fn test_document_order() {
        let order = document_order(&SqliteDialect, &Criteria::new());
        assert_eq!(order, " ORDER BY \"_rowid\" ASC");

        let criteria = Criteria::new().sort("_rowid", SortDirection::Descending);
        assert_eq!(document_order(&SqliteDialect, &criteria), " ORDER BY \"_rowid\" DESC");
    }

    #[test]
    fn test_decode_rejects_malformed_rows() {
        assert!(decode_document(&[SqlValue::Integer(1)]).is_err());
        let row = [SqlValue::Integer(1), SqlValue::Null, SqlValue::Blob(vec![0x80])];
        assert!(matches!(decode_document(&row), Err(DbError::Backend(_))));
    }
}
