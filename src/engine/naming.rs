//! Deterministic physical names for index tables.

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::core::{DbError, Result};
use crate::schema::{Index, Table};

/// Hex digits of the field-list hash kept in an index table name.
pub const HASH_LENGTH: usize = 12;

/// `{table}_{hash}` where the hash covers the index's field names in order.
pub fn index_table_name(table: &str, index: &Index) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.field_names().join(",").as_bytes());
    let digest = hasher.finalize();

    let hash: String = digest
        .iter()
        .take(HASH_LENGTH / 2)
        .map(|byte| format!("{:02x}", byte))
        .collect();
    format!("{}_{}", table, hash)
}

/// Each physical index table of `table` once, with the first declared
/// index stored in it. Indexes over the same field list share a table.
pub fn distinct_index_tables(table: &Table) -> Vec<(String, &Index)> {
    let mut tables: Vec<(String, &Index)> = Vec::new();
    for index in table.get_indexes() {
        let name = index_table_name(table.name(), index);
        if !tables.iter().any(|(existing, _)| *existing == name) {
            tables.push((name, index));
        }
    }
    tables
}

/// Declared indexes other than `index` that read from its table.
pub fn sharing_indexes<'a>(table: &'a Table, index: &Index) -> Vec<&'a Index> {
    let name = index_table_name(table.name(), index);
    table
        .get_indexes()
        .iter()
        .filter(|other| other.name() != index.name())
        .filter(|other| index_table_name(table.name(), other) == name)
        .collect()
}

/// Pattern matching every index table name `table` can own.
pub fn index_table_pattern(table: &str) -> Result<Regex> {
    Regex::new(&format!(
        "^{}_[0-9a-f]{{{}}}$",
        regex::escape(table),
        HASH_LENGTH
    ))
    .map_err(|e| DbError::Backend(e.to_string()))
}
