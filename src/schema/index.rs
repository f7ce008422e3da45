use std::collections::BTreeMap;

use crate::core::{DbError, ID_FIELD, ROWID_FIELD, Result, Value};

use super::normalize_name;

/// How one field participates in an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Ascending,
    Descending,
    Spatial,
}

impl IndexKind {
    /// Parse the document-database style direction token: `1`, `-1`,
    /// `"asc"`, `"desc"`, or a spatial marker such as `"2d"`.
    pub fn from_token(token: &Value) -> Result<Self> {
        match token {
            Value::Integer(1) => Ok(Self::Ascending),
            Value::Integer(-1) => Ok(Self::Descending),
            Value::Text(text) => match text.to_ascii_lowercase().as_str() {
                "asc" | "ascending" | "1" => Ok(Self::Ascending),
                "desc" | "descending" | "-1" => Ok(Self::Descending),
                "2d" | "2dsphere" | "spatial" | "point" => Ok(Self::Spatial),
                _ => Err(DbError::InvalidIndex(format!("Unknown index token '{}'", text))),
            },
            other => Err(DbError::InvalidIndex(format!("Unknown index token {}", other))),
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
            Self::Spatial => "2d",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    name: String,
    fields: Vec<(String, IndexKind)>,
    options: BTreeMap<String, Value>,
}

impl Index {
    pub fn new<I, S>(name: &str, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, IndexKind)>,
        S: AsRef<str>,
    {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(DbError::InvalidArgument("Index name cannot be empty".into()));
        }

        let mut normalized: Vec<(String, IndexKind)> = Vec::new();
        for (field, kind) in fields {
            let field = normalize_name(field.as_ref());
            if field == ID_FIELD || field == ROWID_FIELD {
                return Err(DbError::InvalidIndex(format!(
                    "Index '{}' cannot include reserved field '{}'",
                    name, field
                )));
            }
            if field.is_empty() {
                return Err(DbError::InvalidIndex(format!("Index '{}' has an empty field name", name)));
            }
            if normalized.iter().any(|(existing, _)| *existing == field) {
                return Err(DbError::InvalidIndex(format!(
                    "Index '{}' lists field '{}' twice",
                    name, field
                )));
            }
            normalized.push((field, kind));
        }

        if normalized.is_empty() {
            return Err(DbError::InvalidIndex(format!("Index '{}' has no fields", name)));
        }

        Ok(Self {
            name,
            fields: normalized,
            options: BTreeMap::new(),
        })
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order. Order defines left-to-right matchability.
    pub fn fields(&self) -> &[(String, IndexKind)] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn kind_of(&self, field: &str) -> Option<IndexKind> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, kind)| *kind)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.kind_of(field).is_some()
    }

    pub fn is_spatial(&self) -> bool {
        self.fields.iter().any(|(_, kind)| *kind == IndexKind::Spatial)
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn is_unique_option(&self) -> bool {
        match self.options.get("unique") {
            Some(Value::Boolean(b)) => *b,
            Some(Value::Integer(i)) => *i != 0,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_tokens() {
        assert_eq!(IndexKind::from_token(&Value::Integer(-1)).unwrap(), IndexKind::Descending);
        assert_eq!(IndexKind::from_token(&Value::from("2dsphere")).unwrap(), IndexKind::Spatial);
        assert!(IndexKind::from_token(&Value::from("sideways")).is_err());
    }

    #[test]
    fn test_index_rejects_identifier() {
        let err = Index::new("by_id", [("_id", IndexKind::Ascending)]).unwrap_err();
        assert!(matches!(err, DbError::InvalidIndex(_)));
    }

    #[test]
    fn test_index_normalizes_and_keeps_order() {
        let index = Index::new(
            "ByNameAge",
            [("Name", IndexKind::Ascending), ("age", IndexKind::Descending)],
        )
        .unwrap();
        assert_eq!(index.name(), "bynameage");
        assert_eq!(index.field_names(), vec!["name", "age"]);
        assert_eq!(index.kind_of("age"), Some(IndexKind::Descending));
        assert!(!index.is_spatial());
    }

    #[test]
    fn test_index_rejects_duplicates_and_empty() {
        assert!(Index::new("dup", [("a", IndexKind::Ascending), ("A", IndexKind::Ascending)]).is_err());
        assert!(Index::new("none", Vec::<(&str, IndexKind)>::new()).is_err());
    }

    #[test]
    fn test_unique_option() {
        let index = Index::new("email", [("email", IndexKind::Ascending)])
            .unwrap()
            .with_option("unique", true);
        assert!(index.is_unique_option());
    }
}
