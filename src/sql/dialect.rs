use super::SqlValue;
use crate::core::{BoundingBox, GeoPoint};
use crate::schema::Field;

/// One backend's SQL flavour: identifier quoting, native column types,
/// DDL shapes and the spatial predicate.
pub trait Dialect {
    fn name(&self) -> &'static str;

    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Native column type for an indexed field. Empty means untyped.
    fn column_type(&self, field: &Field) -> String;

    /// Column type of the document identifier.
    fn id_column_type(&self) -> String;

    /// DDL for a document table: row number, identifier, serialized body.
    fn document_table_sql(&self, table: &str) -> String;

    /// DDL for an index table holding `columns` plus the identifier.
    ///
    /// The primary key spans every indexed column and the identifier;
    /// `unique` adds a uniqueness constraint over the indexed columns alone.
    fn index_table_sql(&self, table: &str, columns: &[(String, String)], unique: bool) -> String {
        let id = self.quote(crate::core::ID_FIELD);
        let mut defs: Vec<String> = columns
            .iter()
            .map(|(name, ty)| {
                if ty.is_empty() {
                    self.quote(name)
                } else {
                    format!("{} {}", self.quote(name), ty)
                }
            })
            .collect();
        defs.push(format!("{} {} NOT NULL", id, self.id_column_type()));

        let mut key: Vec<String> = columns.iter().map(|(name, _)| self.quote(name)).collect();
        if unique {
            defs.push(format!("UNIQUE ({})", key.join(", ")));
        }
        key.push(id);
        defs.push(format!("PRIMARY KEY ({})", key.join(", ")));

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote(table),
            defs.join(", ")
        )
    }

    /// Secondary index on an index table's identifier column, used by
    /// per-document deletes.
    fn id_lookup_sql(&self, table: &str) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            self.quote(&format!("{}_by_id", table)),
            self.quote(table),
            self.quote(crate::core::ID_FIELD)
        )
    }

    /// Query returning the name of every table, one per row.
    fn list_tables_sql(&self) -> &'static str;

    /// Insert keyword that silently skips rows violating a key.
    fn insert_ignore(&self) -> &'static str;

    fn limit_clause(&self, limit: Option<u64>, offset: u64) -> String;

    /// How a point is stored in an index column.
    fn spatial_value(&self, point: GeoPoint) -> SqlValue;

    /// Predicate true when the point in `column` lies inside `bbox`.
    /// Pushes its bind parameters onto `params` in placeholder order.
    fn spatial_predicate(&self, column: &str, bbox: &BoundingBox, params: &mut Vec<SqlValue>) -> String;
}
