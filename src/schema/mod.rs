//! Schema model: document collections, their typed fields and indexes.

pub mod field;
pub mod index;
pub mod table;

pub use field::{Field, FieldSize, FieldType};
pub use index::{Index, IndexKind};
pub use table::{ID_LENGTH, Table, is_reserved};

/// Lowercase a field, index or table name and drop any namespace prefix
/// (`App.Models.User.Email` becomes `email`).
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    let local = trimmed
        .rsplit(['.', '\\'])
        .next()
        .unwrap_or(trimmed);
    local.to_lowercase()
}
