use std::collections::BTreeMap;

use log::debug;
use uuid::Uuid;

use super::RelationalEngine;
use super::compiler::{bind_value, placeholders};
use super::naming::{distinct_index_tables, index_table_name};
use crate::core::{
    CREATED_FIELD, DbError, GeoPoint, ID_FIELD, ROWID_FIELD, Record, Result, Value,
};
use crate::schema::{Index, IndexKind, Table};
use crate::sql::{BODY_COLUMN, Dialect, SqlDriver, SqlRow, SqlValue};

/// Serialized body: every field except the identifier and row number.
pub(crate) fn encode_body(record: &Record) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(&record.body())?)
}

pub(crate) fn decode_body(bytes: &[u8]) -> Result<BTreeMap<String, Value>> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Index rows `record` contributes to `index`, identifier last.
///
/// A list value yields one row per element, nested lists flattened; an
/// empty list or a missing field yields a single NULL. Only one field per
/// index may hold a list. A missing spatial value means the record is not
/// indexed at all, signalled by `None`.
pub(crate) fn index_rows(
    dialect: &dyn Dialect,
    table: &Table,
    index: &Index,
    record: &Record,
) -> Result<Option<Vec<SqlRow>>> {
    let id = record
        .id()
        .ok_or_else(|| DbError::InvalidArgument("Cannot index a record without an identifier".into()))?;

    let mut array_field: Option<&str> = None;
    let mut columns: Vec<Vec<SqlValue>> = Vec::with_capacity(index.fields().len());

    for (name, kind) in index.fields() {
        let spatial = *kind == IndexKind::Spatial || table.get_field(name).is_spatial();
        let value = record.get(name);

        if spatial {
            match value {
                None | Some(Value::Null) => return Ok(None),
                Some(point) => {
                    columns.push(vec![dialect.spatial_value(GeoPoint::parse(point)?)]);
                }
            }
            continue;
        }

        match value {
            Some(Value::List(items)) => {
                if let Some(previous) = array_field {
                    return Err(DbError::ParallelArray(previous.to_string(), name.clone()));
                }
                array_field = Some(name.as_str());

                let mut flat = Vec::new();
                flatten(items, &mut flat);
                let mut bound = Vec::with_capacity(flat.len().max(1));
                for item in flat {
                    let item = bind_value(dialect, item, false)?;
                    if !bound.contains(&item) {
                        bound.push(item);
                    }
                }
                if bound.is_empty() {
                    bound.push(SqlValue::Null);
                }
                columns.push(bound);
            }
            Some(scalar) => columns.push(vec![bind_value(dialect, scalar, false)?]),
            None => columns.push(vec![SqlValue::Null]),
        }
    }

    let mut rows = Vec::new();
    expand(&columns, &mut Vec::with_capacity(columns.len() + 1), id, &mut rows);
    Ok(Some(rows))
}

fn flatten<'a>(items: &'a [Value], out: &mut Vec<&'a Value>) {
    for item in items {
        match item {
            Value::List(nested) => flatten(nested, out),
            scalar => out.push(scalar),
        }
    }
}

/// One row per combination of column values.
fn expand(columns: &[Vec<SqlValue>], current: &mut SqlRow, id: &str, rows: &mut Vec<SqlRow>) {
    let Some((first, rest)) = columns.split_first() else {
        let mut row = current.clone();
        row.push(SqlValue::Text(id.to_string()));
        rows.push(row);
        return;
    };
    for value in first {
        current.push(value.clone());
        expand(rest, current, id, rows);
        current.pop();
    }
}

impl<D: SqlDriver> RelationalEngine<D> {
    /// Store a new document, generating its identifier when absent.
    pub(crate) fn insert_document(&mut self, table: &Table, mut record: Record) -> Result<Record> {
        if record.id().is_none() {
            record.set(ID_FIELD, Uuid::new_v4().simple().to_string());
        }
        record.remove(ROWID_FIELD);

        let dialect = self.dialect()?;
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES (?, ?)",
            dialect.quote(table.name()),
            dialect.quote(ID_FIELD),
            dialect.quote(BODY_COLUMN)
        );
        let body = encode_body(&record)?;
        let id = record.id().map(str::to_string).unwrap_or_default();

        let rowid = self.transaction(|engine| {
            engine.execute(&sql, &[SqlValue::Text(id.clone()), SqlValue::Blob(body)])?;
            let rowid = engine.conn()?.last_insert_id()?;
            engine.insert_all_index_rows(table, &record)?;
            Ok(rowid)
        })?;

        debug!("Inserted '{}' into '{}' as row {}", id, table.name(), rowid);
        record.set(ROWID_FIELD, rowid);
        Ok(record)
    }

    /// Replace the document carrying the record's identifier, or insert it
    /// under that identifier when none exists.
    pub(crate) fn update_document(&mut self, table: &Table, mut record: Record) -> Result<Record> {
        let id = record
            .id()
            .map(str::to_string)
            .ok_or_else(|| DbError::InvalidArgument("Update needs an identifier".into()))?;

        let dialect = self.dialect()?;
        let select = format!(
            "SELECT {}, {} FROM {} WHERE {} = ?",
            dialect.quote(ROWID_FIELD),
            dialect.quote(BODY_COLUMN),
            dialect.quote(table.name()),
            dialect.quote(ID_FIELD)
        );
        let existing = self.fetch_all(&select, &[SqlValue::Text(id.clone())])?;
        let Some(row) = existing.rows.first() else {
            return self.insert_document(table, record);
        };

        let rowid = row.first().and_then(SqlValue::as_i64).unwrap_or_default();
        if !record.contains(CREATED_FIELD) {
            let stored = match row.get(1).and_then(SqlValue::as_blob) {
                Some(bytes) => decode_body(bytes)?,
                None => BTreeMap::new(),
            };
            if let Some(created) = stored.get(CREATED_FIELD) {
                record.set(CREATED_FIELD, created.clone());
            }
        }
        record.remove(ROWID_FIELD);

        let update = format!(
            "UPDATE {} SET {} = ? WHERE {} = ?",
            dialect.quote(table.name()),
            dialect.quote(BODY_COLUMN),
            dialect.quote(ID_FIELD)
        );
        let body = encode_body(&record)?;

        self.transaction(|engine| {
            engine.execute(&update, &[SqlValue::Blob(body), SqlValue::Text(id.clone())])?;
            engine.delete_index_rows(table, std::slice::from_ref(&id))?;
            engine.insert_all_index_rows(table, &record)
        })?;

        debug!("Updated '{}' in '{}'", id, table.name());
        record.set(ROWID_FIELD, rowid);
        Ok(record)
    }

    /// One set of rows per physical index table, however many declared
    /// indexes share it.
    fn insert_all_index_rows(&mut self, table: &Table, record: &Record) -> Result<()> {
        for (_, index) in distinct_index_tables(table) {
            self.insert_index_rows(table, index, record)?;
        }
        Ok(())
    }

    pub(crate) fn insert_index_rows(&mut self, table: &Table, index: &Index, record: &Record) -> Result<()> {
        let dialect = self.dialect()?;
        let Some(rows) = index_rows(&dialect, table, index, record)? else {
            return Ok(());
        };

        let mut columns: Vec<String> = index
            .field_names()
            .iter()
            .map(|name| dialect.quote(name))
            .collect();
        columns.push(dialect.quote(ID_FIELD));

        let verb = if table.is_unique_index(index) {
            "INSERT"
        } else {
            dialect.insert_ignore()
        };
        let sql = format!(
            "{} INTO {} ({}) VALUES ({})",
            verb,
            dialect.quote(&index_table_name(table.name(), index)),
            columns.join(", "),
            placeholders(columns.len())
        );

        for row in rows {
            self.execute(&sql, &row).map_err(|err| match err {
                DbError::Duplicate(_) => DbError::Duplicate(format!(
                    "'{}' already holds these values for index '{}'",
                    table.name(),
                    index.name()
                )),
                other => other,
            })?;
        }
        Ok(())
    }

    /// Remove every index row of the given documents, across all declared
    /// indexes.
    pub(crate) fn delete_index_rows(&mut self, table: &Table, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let dialect = self.dialect()?;
        let params: Vec<SqlValue> = ids.iter().cloned().map(SqlValue::Text).collect();

        for (name, _) in distinct_index_tables(table) {
            let sql = format!(
                "DELETE FROM {} WHERE {} IN ({})",
                dialect.quote(&name),
                dialect.quote(ID_FIELD),
                placeholders(ids.len())
            );
            self.execute(&sql, &params)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use crate::sql::SqliteDialect;

    fn table() -> Table {
        let mut table = Table::new("places").unwrap();
        table.add_field("loc", FieldType::Point, None).unwrap();
        table
    }

    fn rows_for(index: &Index, record: &Record) -> Result<Option<Vec<SqlRow>>> {
        index_rows(&SqliteDialect, &table(), index, record)
    }

    #[test]
    fn test_scalar_row() {
        let index = Index::new("by_name", [("name", IndexKind::Ascending)]).unwrap();
        let record = Record::new().with(ID_FIELD, "abc").with("name", "bob");
        let rows = rows_for(&index, &record).unwrap().unwrap();
        assert_eq!(
            rows,
            vec![vec![SqlValue::Text("bob".into()), SqlValue::Text("abc".into())]]
        );
    }

    #[test]
    fn test_array_expands_per_element() {
        let index = Index::new(
            "by_tag",
            [("kind", IndexKind::Ascending), ("tags", IndexKind::Ascending)],
        )
        .unwrap();
        let record = Record::new()
            .with(ID_FIELD, "abc")
            .with("kind", 1i64)
            .with(
                "tags",
                Value::List(vec![
                    Value::from("a"),
                    Value::List(vec![Value::from("b"), Value::from("c")]),
                    Value::from("a"),
                ]),
            );
        let rows = rows_for(&index, &record).unwrap().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row[0] == SqlValue::Integer(1)));
        assert_eq!(rows[2][1], SqlValue::Text("c".into()));
    }

    #[test]
    fn test_parallel_arrays_rejected() {
        let index = Index::new("ab", [("a", IndexKind::Ascending), ("b", IndexKind::Ascending)]).unwrap();
        let record = Record::new()
            .with(ID_FIELD, "abc")
            .with("a", vec![1i64, 2])
            .with("b", vec![3i64]);
        assert!(matches!(
            rows_for(&index, &record),
            Err(DbError::ParallelArray(ref a, ref b)) if a == "a" && b == "b"
        ));
    }

    #[test]
    fn test_missing_values() {
        let index = Index::new("by_name", [("name", IndexKind::Ascending)]).unwrap();
        let record = Record::new().with(ID_FIELD, "abc");
        let rows = rows_for(&index, &record).unwrap().unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Null, SqlValue::Text("abc".into())]]);

        let empty = Record::new().with(ID_FIELD, "abc").with("name", Value::List(vec![]));
        assert_eq!(rows_for(&index, &empty).unwrap().unwrap()[0][0], SqlValue::Null);
    }

    #[test]
    fn test_missing_point_skips_index() {
        let index = Index::new("geo", [("loc", IndexKind::Spatial)]).unwrap();
        let record = Record::new().with(ID_FIELD, "abc");
        assert_eq!(rows_for(&index, &record).unwrap(), None);

        let located = record.with("loc", vec![1.0, 2.0]);
        let rows = rows_for(&index, &located).unwrap().unwrap();
        assert_eq!(rows[0][0], SqlValue::Text("POINT(1 2)".into()));
    }

    #[test]
    fn test_body_round_trip_excludes_identity() {
        let record = Record::new()
            .with(ID_FIELD, "abc")
            .with(ROWID_FIELD, 4i64)
            .with("name", "bob");
        let body = decode_body(&encode_body(&record).unwrap()).unwrap();
        assert_eq!(body.len(), 1);
        assert_eq!(body.get("name"), Some(&Value::from("bob")));
    }
}
