//! Index selection: which physical table answers a criteria.

use crate::core::{DbError, ID_FIELD, ROWID_FIELD, Result};
use crate::query::Criteria;
use crate::schema::{Index, Table};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Source<'a> {
    /// Served straight off the document table.
    Document,
    /// Served through the index table of this index.
    Index(&'a Index),
}

/// Pick the table that serves `criteria`.
///
/// The fields filtered on (or, with no filter, sorted on) must equal the
/// leading fields of a declared index, in any order. Among matching indexes
/// the first, in declaration order, whose fields also cover every sort field
/// wins. Queries touching only the identifier and row number go to the
/// document table.
pub fn select_source<'a>(table: &'a Table, criteria: &Criteria) -> Result<Source<'a>> {
    if criteria.only_reserved_fields() {
        return Ok(Source::Document);
    }

    let filtered: Vec<&str> = criteria
        .where_fields()
        .into_iter()
        .filter(|name| *name != ID_FIELD)
        .collect();
    let wanted: Vec<&str> = if filtered.is_empty() {
        criteria
            .sort_fields()
            .into_iter()
            .filter(|name| *name != ID_FIELD)
            .collect()
    } else {
        filtered
    };

    if wanted.contains(&ROWID_FIELD) {
        return Err(DbError::NoMatchingIndex(format!(
            "{} (row number cannot be combined with indexed fields)",
            wanted.join(", ")
        )));
    }

    let candidates: Vec<&Index> = table
        .get_indexes()
        .iter()
        .filter(|index| is_prefix_match(index, &wanted))
        .collect();

    let Some(first) = candidates.first() else {
        return Err(DbError::NoMatchingIndex(wanted.join(", ")));
    };

    let sort_fields = criteria.sort_fields();
    if let Some(covering) = candidates
        .iter()
        .find(|index| uncovered_sort(index, &sort_fields).is_none())
    {
        return Ok(Source::Index(*covering));
    }

    match uncovered_sort(first, &sort_fields) {
        Some(field) => Err(DbError::UnsupportedSort(field.to_string())),
        None => Ok(Source::Index(*first)),
    }
}

fn is_prefix_match(index: &Index, wanted: &[&str]) -> bool {
    let names = index.field_names();
    names.len() >= wanted.len()
        && names[..wanted.len()]
            .iter()
            .all(|name| wanted.contains(name))
}

fn uncovered_sort<'s>(index: &Index, sort_fields: &[&'s str]) -> Option<&'s str> {
    sort_fields
        .iter()
        .copied()
        .find(|field| *field != ID_FIELD && !index.has_field(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortDirection;
    use crate::schema::IndexKind;

    fn users() -> Table {
        let mut table = Table::new("users").unwrap();
        table
            .add_index("by_name", &[("name", IndexKind::Ascending)])
            .unwrap();
        table
            .add_index(
                "by_name_age",
                &[("name", IndexKind::Ascending), ("age", IndexKind::Descending)],
            )
            .unwrap();
        table
            .add_index(
                "by_city_age",
                &[("city", IndexKind::Ascending), ("age", IndexKind::Ascending)],
            )
            .unwrap();
        table
    }

    fn chosen(criteria: Criteria) -> Result<String> {
        let table = users();
        select_source(&table, &criteria).map(|source| match source {
            Source::Document => "document".to_string(),
            Source::Index(index) => index.name().to_string(),
        })
    }

    #[test]
    fn test_reserved_only_uses_document_table() {
        assert_eq!(chosen(Criteria::new()).unwrap(), "document");
        assert_eq!(chosen(Criteria::new().equals("_id", "x")).unwrap(), "document");
        assert_eq!(
            chosen(Criteria::new().sort("_rowid", SortDirection::Descending)).unwrap(),
            "document"
        );
    }

    #[test]
    fn test_first_prefix_match_wins() {
        assert_eq!(chosen(Criteria::new().equals("name", "a")).unwrap(), "by_name");
        assert_eq!(
            chosen(Criteria::new().equals("age", 3i64).equals("name", "a")).unwrap(),
            "by_name_age"
        );
    }

    #[test]
    fn test_sort_prefers_covering_index() {
        let criteria = Criteria::new()
            .equals("name", "a")
            .sort("age", SortDirection::Ascending);
        assert_eq!(chosen(criteria).unwrap(), "by_name_age");
    }

    #[test]
    fn test_sort_only_query_uses_sort_fields() {
        let criteria = Criteria::new().sort("city", SortDirection::Ascending);
        assert_eq!(chosen(criteria).unwrap(), "by_city_age");
    }

    #[test]
    fn test_non_prefix_is_rejected() {
        assert!(matches!(
            chosen(Criteria::new().equals("age", 3i64)),
            Err(DbError::NoMatchingIndex(_))
        ));
    }

    #[test]
    fn test_uncovered_sort_is_rejected() {
        let criteria = Criteria::new()
            .equals("city", "x")
            .sort("name", SortDirection::Ascending);
        assert!(matches!(chosen(criteria), Err(DbError::UnsupportedSort(ref f)) if f == "name"));

        let criteria = Criteria::new()
            .equals("city", "x")
            .sort("_rowid", SortDirection::Ascending);
        assert!(matches!(chosen(criteria), Err(DbError::UnsupportedSort(_))));
    }
}
