use std::borrow::Cow;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::core::{CREATED_FIELD, DbError, ID_FIELD, ROWID_FIELD, Result, UPDATED_FIELD};

use super::{Field, FieldSize, FieldType, Index, IndexKind, normalize_name};

/// Length of generated document identifiers.
pub const ID_LENGTH: u32 = 32;

/// A document collection: its name, typed fields and declared indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    fields: BTreeMap<String, Field>,
    indexes: Vec<Index>,
}

impl Table {
    pub fn new(name: &str) -> Result<Self> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(DbError::InvalidArgument("Table name cannot be empty".into()));
        }
        Ok(Self {
            name,
            fields: BTreeMap::new(),
            indexes: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a field. Re-declaring a name replaces the earlier definition.
    pub fn add_field(
        &mut self,
        name: &str,
        field_type: FieldType,
        size: Option<FieldSize>,
    ) -> Result<&mut Field> {
        let mut field = Field::new(name, field_type)?;
        if is_reserved(field.name()) {
            return Err(DbError::InvalidArgument(format!(
                "Field '{}' is reserved",
                field.name()
            )));
        }
        field.set_size(size);

        match self.fields.entry(field.name().to_string()) {
            Entry::Occupied(mut slot) => {
                slot.insert(field);
                Ok(slot.into_mut())
            }
            Entry::Vacant(slot) => Ok(slot.insert(field)),
        }
    }

    /// Declare an index over `fields`, an ordered list of field/kind pairs.
    pub fn add_index(&mut self, name: &str, fields: &[(&str, IndexKind)]) -> Result<&Index> {
        let index = Index::new(name, fields.iter().copied())?;
        self.insert_index(index)
    }

    pub fn insert_index(&mut self, index: Index) -> Result<&Index> {
        if self.has_index(index.name()) {
            return Err(DbError::InvalidIndex(format!(
                "Index '{}' is already declared on '{}'",
                index.name(),
                self.name
            )));
        }
        // Indexes over the same field list share one physical table
        if let Some(sibling) = self.indexes.iter().find(|existing| {
            existing.field_names() == index.field_names()
                && existing.is_unique_option() != index.is_unique_option()
        }) {
            return Err(DbError::InvalidIndex(format!(
                "Index '{}' and index '{}' cover the same fields but disagree on uniqueness",
                index.name(),
                sibling.name()
            )));
        }
        self.indexes.push(index);
        Ok(&self.indexes[self.indexes.len() - 1])
    }

    /// Field definition for `name`, falling back to the reserved fields and
    /// finally to an untyped field so lookups never fail.
    pub fn get_field(&self, name: &str) -> Cow<'_, Field> {
        let name = normalize_name(name);
        if let Some(field) = self.fields.get(&name) {
            return Cow::Borrowed(field);
        }

        let reserved = match name.as_str() {
            ID_FIELD => Field::new(ID_FIELD, FieldType::String)
                .map(|f| f.with_size(FieldSize::Range(1, ID_LENGTH * 2))),
            ROWID_FIELD | CREATED_FIELD | UPDATED_FIELD => Field::new(&name, FieldType::Integer),
            _ => return Cow::Owned(Field::untyped(&name)),
        };
        Cow::Owned(reserved.unwrap_or_else(|_| Field::untyped(&name)))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(&normalize_name(name))
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    /// Declared indexes, in declaration order.
    pub fn get_indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn get_index(&self, name: &str) -> Option<&Index> {
        let name = normalize_name(name);
        self.indexes.iter().find(|index| index.name() == name)
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.get_index(name).is_some()
    }

    /// An index is unique when its options say so or every field it covers
    /// is declared unique.
    pub fn is_unique_index(&self, index: &Index) -> bool {
        index.is_unique_option()
            || index
                .field_names()
                .iter()
                .all(|name| self.fields.get(*name).is_some_and(Field::is_unique))
    }
}

pub fn is_reserved(name: &str) -> bool {
    matches!(name, ID_FIELD | ROWID_FIELD | CREATED_FIELD | UPDATED_FIELD)
}
