use log::info;

use super::RelationalEngine;
use super::naming::{distinct_index_tables, index_table_name, index_table_pattern, sharing_indexes};
use super::reader::decode_document;
use crate::core::{DbError, ID_FIELD, ROWID_FIELD, Record, Result};
use crate::schema::{Field, FieldType, Index, IndexKind, Table};
use crate::sql::{BODY_COLUMN, Dialect, SqlDriver, SqlValue};

/// `(column, native type)` for each field an index covers.
pub(crate) fn index_columns(
    dialect: &dyn Dialect,
    table: &Table,
    index: &Index,
) -> Result<Vec<(String, String)>> {
    index
        .fields()
        .iter()
        .map(|(name, kind)| -> Result<(String, String)> {
            let ty = match kind {
                IndexKind::Spatial => dialect.column_type(&Field::new(name, FieldType::Point)?),
                _ => dialect.column_type(&table.get_field(name)),
            };
            Ok((name.clone(), ty))
        })
        .collect()
}

impl<D: SqlDriver> RelationalEngine<D> {
    pub(crate) fn list_tables(&mut self) -> Result<Vec<String>> {
        let dialect = self.dialect()?;
        let names = self.fetch_column(dialect.list_tables_sql(), &[])?;
        Ok(names
            .into_iter()
            .filter_map(|name| match name {
                SqlValue::Text(name) => Some(name),
                _ => None,
            })
            .collect())
    }

    pub(crate) fn table_exists(&mut self, name: &str) -> Result<bool> {
        Ok(self.list_tables()?.iter().any(|existing| existing == name))
    }

    /// Index tables present for `table`, whether declared or not.
    pub(crate) fn physical_indexes(&mut self, table: &str) -> Result<Vec<String>> {
        let pattern = index_table_pattern(table)?;
        Ok(self
            .list_tables()?
            .into_iter()
            .filter(|name| pattern.is_match(name))
            .collect())
    }

    /// Create the document table and every declared index table.
    ///
    /// Index tables missing from an existing document table are built
    /// through `create_index`, so they start out filled.
    pub(crate) fn create_table(&mut self, table: &Table) -> Result<bool> {
        let dialect = self.dialect()?;
        self.execute(&dialect.document_table_sql(table.name()), &[])?;
        for (_, index) in distinct_index_tables(table) {
            self.create_index(table, index)?;
        }
        info!(
            "Table '{}' ready with {} index table(s)",
            table.name(),
            table.get_indexes().len()
        );
        Ok(true)
    }

    fn create_index_table(&mut self, table: &Table, index: &Index) -> Result<()> {
        let dialect = self.dialect()?;
        let name = index_table_name(table.name(), index);
        let columns = index_columns(&dialect, table, index)?;
        let unique = table.is_unique_index(index);

        self.execute(&dialect.index_table_sql(&name, &columns, unique), &[])?;
        self.execute(&dialect.id_lookup_sql(&name), &[])?;
        Ok(())
    }

    /// Create one index table, filling it from the documents already stored.
    pub(crate) fn create_index(&mut self, table: &Table, index: &Index) -> Result<bool> {
        if !self.table_exists(table.name())? {
            return Err(DbError::TableNotFound(table.name().to_string()));
        }

        let name = index_table_name(table.name(), index);
        if self.table_exists(&name)? {
            return Ok(true);
        }

        self.create_index_table(table, index)?;
        match self.backfill(table, index) {
            Ok(count) => {
                info!("Index '{}' built over {} document(s)", index.name(), count);
                Ok(true)
            }
            Err(err) => {
                let dialect = self.dialect()?;
                self.execute(&format!("DROP TABLE IF EXISTS {}", dialect.quote(&name)), &[])?;
                Err(err)
            }
        }
    }

    /// Walk the document table by row number, one batch per transaction.
    fn backfill(&mut self, table: &Table, index: &Index) -> Result<u64> {
        let dialect = self.dialect()?;
        let sql = format!(
            "SELECT {rowid}, {id}, {body} FROM {table} WHERE {rowid} > ? ORDER BY {rowid} LIMIT {batch}",
            rowid = dialect.quote(ROWID_FIELD),
            id = dialect.quote(ID_FIELD),
            body = dialect.quote(BODY_COLUMN),
            table = dialect.quote(table.name()),
            batch = self.batch_size,
        );

        let mut last_rowid = 0;
        let mut total = 0;
        loop {
            let rows = self.fetch_all(&sql, &[SqlValue::Integer(last_rowid)])?;
            let records = rows
                .rows
                .iter()
                .map(|row| decode_document(row))
                .collect::<Result<Vec<Record>>>()?;
            let Some(last) = records.last().and_then(Record::row_id) else {
                break;
            };
            last_rowid = last;

            self.transaction(|engine| {
                for record in &records {
                    engine.insert_index_rows(table, index, record)?;
                }
                Ok(())
            })?;
            total += records.len() as u64;

            if records.len() < self.batch_size {
                break;
            }
        }
        Ok(total)
    }

    /// Drop the document table and every index table it owns.
    pub(crate) fn drop_table(&mut self, table: &Table) -> Result<bool> {
        let dialect = self.dialect()?;
        let existed = self.table_exists(table.name())?;
        let indexes = self.physical_indexes(table.name())?;

        self.transaction(|engine| {
            for name in &indexes {
                engine.execute(&format!("DROP TABLE IF EXISTS {}", dialect.quote(name)), &[])?;
            }
            engine.execute(
                &format!("DROP TABLE IF EXISTS {}", dialect.quote(table.name())),
                &[],
            )?;
            Ok(())
        })?;

        if existed {
            info!(
                "Dropped table '{}' and {} index table(s)",
                table.name(),
                indexes.len()
            );
        }
        Ok(existed)
    }

    /// Drop the table behind `index`, unless another declared index still
    /// reads from it.
    pub(crate) fn drop_index(&mut self, table: &Table, index: &Index) -> Result<bool> {
        let dialect = self.dialect()?;
        let name = index_table_name(table.name(), index);
        let existed = self.table_exists(&name)?;

        let sharing = sharing_indexes(table, index);
        if !sharing.is_empty() {
            info!(
                "Keeping '{}' for index '{}' on '{}'",
                name,
                sharing[0].name(),
                table.name()
            );
            return Ok(existed);
        }

        self.execute(&format!("DROP TABLE IF EXISTS {}", dialect.quote(&name)), &[])?;
        Ok(existed)
    }
}
