use crate::core::Record;

/// Records returned by a query, plus whether the backend saw rows beyond
/// the requested page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    records: Vec<Record>,
    has_more: bool,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(records: Vec<Record>, has_more: bool) -> Self {
        Self { records, has_more }
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when more rows exist past the last one returned.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Identifiers in result order.
    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().filter_map(Record::id).collect()
    }
}

impl IntoIterator for QueryResult {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
