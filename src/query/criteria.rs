use std::collections::BTreeMap;

use crate::core::{DbError, GeoPoint, ID_FIELD, ROWID_FIELD, Result, Value};
use crate::schema::{Table, normalize_name};

use super::command::{Command, is_command};

/// What a single field must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Implicit equality.
    Literal(Value),
    /// One or more operators, AND-ed together.
    Commands(Vec<(Command, Value)>),
}

impl Predicate {
    /// Operator view of the predicate; a literal reads as a single `$eq`.
    pub fn commands(&self) -> Vec<(Command, &Value)> {
        match self {
            Self::Literal(value) => vec![(Command::Eq, value)],
            Self::Commands(commands) => commands.iter().map(|(c, v)| (*c, v)).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Integer(1) => Ok(Self::Ascending),
            Value::Integer(-1) => Ok(Self::Descending),
            Value::Text(s) if s.eq_ignore_ascii_case("asc") => Ok(Self::Ascending),
            Value::Text(s) if s.eq_ignore_ascii_case("desc") => Ok(Self::Descending),
            other => Err(DbError::InvalidArgument(format!("Invalid sort direction {}", other))),
        }
    }
}

/// Largest limit or offset a SQL backend accepts (a signed 64-bit integer).
pub const MAX_BOUND: u64 = i64::MAX as u64;

/// Resolved pagination: `paginated_limit` is `limit + 1` so a caller can
/// fetch one extra row and learn whether more results exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub limit: Option<u64>,
    pub offset: u64,
    pub paginated_limit: Option<u64>,
}

/// Location of one literal inside a criteria, used by the normalization
/// pass to rewrite values in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValuePath {
    pub condition: usize,
    pub command: Option<usize>,
    pub element: Option<usize>,
}

/// Backend-independent query: field predicates, sort order and bounds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    conditions: Vec<(String, Predicate)>,
    sort: Vec<(String, SortDirection)>,
    limit: Option<u64>,
    offset: Option<u64>,
    page: Option<u64>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a criteria from a document-style filter map.
    ///
    /// Each entry is either `field => literal` or `field => {"$op": value, ...}`.
    /// A map value without command keys is an equality match on the map.
    pub fn from_map(filter: &BTreeMap<String, Value>) -> Result<Self> {
        let mut criteria = Self::new();
        for (field, value) in filter {
            if is_command(field) {
                return Err(DbError::InvalidArgument(format!(
                    "Top-level command '{}' is not supported",
                    field
                )));
            }

            match value {
                Value::Map(map) if map.keys().any(|k| is_command(k)) => {
                    if !map.keys().all(|k| is_command(k)) {
                        return Err(DbError::InvalidArgument(format!(
                            "Field '{}' mixes commands and literal keys",
                            field
                        )));
                    }
                    for (token, operand) in map {
                        criteria = criteria.apply_token(field, token, operand.clone())?;
                    }
                }
                literal => criteria = criteria.equals(field, literal.clone()),
            }
        }
        Ok(criteria)
    }

    fn apply_token(self, field: &str, token: &str, operand: Value) -> Result<Self> {
        if token.eq_ignore_ascii_case("$between") {
            return match operand {
                Value::List(mut pair) if pair.len() == 2 => {
                    let high = pair.pop().unwrap_or(Value::Null);
                    let low = pair.pop().unwrap_or(Value::Null);
                    Ok(self.between(field, low, high))
                }
                _ => Err(DbError::InvalidArgument(format!(
                    "$between on '{}' needs a [low, high] pair",
                    field
                ))),
            };
        }

        let command = Command::from_token(token)?;
        match (command, &operand) {
            (Command::In | Command::NotIn, Value::List(_)) => {}
            (Command::In | Command::NotIn, _) => {
                return Err(DbError::InvalidArgument(format!(
                    "{} on '{}' needs a list",
                    command, field
                )));
            }
            (Command::Near, Value::List(pair)) if pair.len() == 2 => {}
            (Command::Near, _) => {
                return Err(DbError::InvalidArgument(format!(
                    "$near on '{}' needs a [point, radius] pair",
                    field
                )));
            }
            _ => {}
        }
        Ok(self.with_command(field, command, operand))
    }

    // ------------------------------------------------------------------
    // Predicate builders
    // ------------------------------------------------------------------

    pub fn equals(self, field: &str, value: impl Into<Value>) -> Self {
        let field = normalize_name(field);
        if self.position(&field).is_some() {
            return self.with_command(&field, Command::Eq, value.into());
        }
        let mut criteria = self;
        criteria.conditions.push((field, Predicate::Literal(value.into())));
        criteria
    }

    pub fn not_equals(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_command(field, Command::Ne, value.into())
    }

    pub fn greater_than(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_command(field, Command::Gt, value.into())
    }

    pub fn greater_than_or_equal(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_command(field, Command::Gte, value.into())
    }

    pub fn less_than(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_command(field, Command::Lt, value.into())
    }

    pub fn less_than_or_equal(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_command(field, Command::Lte, value.into())
    }

    pub fn is_in(self, field: &str, values: Vec<Value>) -> Self {
        self.with_command(field, Command::In, Value::List(values))
    }

    pub fn not_in(self, field: &str, values: Vec<Value>) -> Self {
        self.with_command(field, Command::NotIn, Value::List(values))
    }

    /// Inclusive range, stored as `$gte` plus `$lte`.
    pub fn between(self, field: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.with_command(field, Command::Gte, low.into())
            .with_command(field, Command::Lte, high.into())
    }

    /// Documents whose point lies near `point`, `radius` in kilometres.
    pub fn near(self, field: &str, point: impl Into<Value>, radius: f64) -> Self {
        self.with_command(
            field,
            Command::Near,
            Value::List(vec![point.into(), Value::Float(radius)]),
        )
    }

    /// Add `command` to `field`, merging with whatever the field already has.
    /// A repeated command replaces its earlier operand.
    pub fn with_command(mut self, field: &str, command: Command, value: Value) -> Self {
        let field = normalize_name(field);
        match self.position(&field) {
            None => self
                .conditions
                .push((field, Predicate::Commands(vec![(command, value)]))),
            Some(pos) => {
                let slot = &mut self.conditions[pos].1;
                if let Predicate::Literal(literal) = slot {
                    let literal = std::mem::replace(literal, Value::Null);
                    *slot = Predicate::Commands(vec![(Command::Eq, literal)]);
                }
                if let Predicate::Commands(commands) = slot {
                    match commands.iter_mut().find(|(existing, _)| *existing == command) {
                        Some(entry) => entry.1 = value,
                        None => commands.push((command, value)),
                    }
                }
            }
        }
        self
    }

    pub fn sort(mut self, field: &str, direction: SortDirection) -> Self {
        let field = normalize_name(field);
        match self.sort.iter_mut().find(|(existing, _)| *existing == field) {
            Some(entry) => entry.1 = direction,
            None => self.sort.push((field, direction)),
        }
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Explicit offset. Clears any page.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self.page = None;
        self
    }

    /// One-based page number. Clears any explicit offset.
    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page.max(1));
        self.offset = None;
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn conditions(&self) -> &[(String, Predicate)] {
        &self.conditions
    }

    pub fn predicate(&self, field: &str) -> Option<&Predicate> {
        self.position(&normalize_name(field))
            .map(|pos| &self.conditions[pos].1)
    }

    pub fn sort_order(&self) -> &[(String, SortDirection)] {
        &self.sort
    }

    pub fn where_fields(&self) -> Vec<&str> {
        self.conditions.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn sort_fields(&self) -> Vec<&str> {
        self.sort.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn has_where(&self) -> bool {
        !self.conditions.is_empty()
    }

    pub fn has_sort(&self) -> bool {
        !self.sort.is_empty()
    }

    pub fn has_page(&self) -> bool {
        self.page.is_some()
    }

    pub fn has_offset(&self) -> bool {
        self.offset.is_some()
    }

    pub fn get_limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn get_page(&self) -> Option<u64> {
        self.page
    }

    /// Whether every referenced field is the identifier or the row number.
    pub fn only_reserved_fields(&self) -> bool {
        self.where_fields()
            .into_iter()
            .chain(self.sort_fields())
            .all(|name| name == ID_FIELD || name == ROWID_FIELD)
    }

    /// Resolved limit and offset, both capped at `MAX_BOUND`.
    pub fn get_bounds(&self) -> Bounds {
        let limit = self.limit.map(|limit| limit.min(MAX_BOUND));
        let offset = match (self.page, limit) {
            (Some(page), Some(limit)) => page.saturating_sub(1).saturating_mul(limit),
            (Some(_), None) => 0,
            (None, _) => self.offset.unwrap_or(0),
        };
        Bounds {
            limit,
            offset: offset.min(MAX_BOUND),
            paginated_limit: limit.map(|limit| limit.saturating_add(1).min(MAX_BOUND)),
        }
    }

    // ------------------------------------------------------------------
    // Normalization
    // ------------------------------------------------------------------

    /// Every literal position in the criteria, in one walk.
    pub fn value_paths(&self) -> Vec<ValuePath> {
        let mut paths = Vec::new();
        for (condition, (_, predicate)) in self.conditions.iter().enumerate() {
            match predicate {
                Predicate::Literal(_) => paths.push(ValuePath {
                    condition,
                    command: None,
                    element: None,
                }),
                Predicate::Commands(commands) => {
                    for (command_pos, (command, value)) in commands.iter().enumerate() {
                        match (command, value) {
                            (Command::In | Command::NotIn, Value::List(items)) => {
                                paths.extend((0..items.len()).map(|element| ValuePath {
                                    condition,
                                    command: Some(command_pos),
                                    element: Some(element),
                                }));
                            }
                            (Command::Near, _) => paths.push(ValuePath {
                                condition,
                                command: Some(command_pos),
                                element: Some(0),
                            }),
                            _ => paths.push(ValuePath {
                                condition,
                                command: Some(command_pos),
                                element: None,
                            }),
                        }
                    }
                }
            }
        }
        paths
    }

    pub fn value_at_mut(&mut self, path: ValuePath) -> Option<&mut Value> {
        let predicate = &mut self.conditions.get_mut(path.condition)?.1;
        let value = match (predicate, path.command) {
            (Predicate::Literal(value), None) => value,
            (Predicate::Commands(commands), Some(pos)) => &mut commands.get_mut(pos)?.1,
            _ => return None,
        };
        match path.element {
            None => Some(value),
            Some(element) => match value {
                Value::List(items) => items.get_mut(element),
                _ => None,
            },
        }
    }

    /// Coerce every literal to the declared type of its field.
    pub fn normalize(&mut self, table: &Table) -> Result<()> {
        for path in self.value_paths() {
            let field_name = self.conditions[path.condition].0.clone();
            let field = table.get_field(&field_name);
            let is_near = matches!(
                &self.conditions[path.condition].1,
                Predicate::Commands(commands)
                    if path.command.is_some_and(|pos| commands[pos].0 == Command::Near)
            );

            let Some(slot) = self.value_at_mut(path) else {
                continue;
            };
            let value = std::mem::replace(slot, Value::Null);
            *slot = if is_near {
                GeoPoint::parse(&value)?.to_value()
            } else {
                field.normalize_query(value)?
            };
        }
        self.check_near_radius()
    }

    fn check_near_radius(&mut self) -> Result<()> {
        for (field, predicate) in &mut self.conditions {
            let Predicate::Commands(commands) = predicate else {
                continue;
            };
            for (command, value) in commands.iter_mut() {
                if *command != Command::Near {
                    continue;
                }
                let Value::List(pair) = value else {
                    return Err(DbError::InvalidArgument(format!("Malformed $near on '{}'", field)));
                };
                let radius = pair.get(1).and_then(Value::as_f64).ok_or_else(|| {
                    DbError::InvalidArgument(format!("$near on '{}' needs a numeric radius", field))
                })?;
                if radius < 0.0 {
                    return Err(DbError::InvalidArgument(format!(
                        "$near radius on '{}' cannot be negative",
                        field
                    )));
                }
                pair[1] = Value::Float(radius);
            }
        }
        Ok(())
    }

    fn position(&self, field: &str) -> Option<usize> {
        self.conditions.iter().position(|(name, _)| name == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    #[test]
    fn test_bounds_from_page() {
        let criteria = Criteria::new().limit(10).page(3);
        let bounds = criteria.get_bounds();
        assert_eq!(bounds.offset, 20);
        assert_eq!(bounds.limit, Some(10));
        assert_eq!(bounds.paginated_limit, Some(11));
    }

    #[test]
    fn test_huge_bounds_saturate() {
        let bounds = Criteria::new().limit(10).page(u64::MAX).get_bounds();
        assert_eq!(bounds.offset, MAX_BOUND);

        let bounds = Criteria::new().limit(u64::MAX).get_bounds();
        assert_eq!(bounds.limit, Some(MAX_BOUND));
        assert_eq!(bounds.paginated_limit, Some(MAX_BOUND));
        assert_eq!(bounds.offset, 0);

        let bounds = Criteria::new().offset(u64::MAX).get_bounds();
        assert_eq!(bounds.offset, MAX_BOUND);
    }

    #[test]
    fn test_offset_and_page_are_exclusive() {
        let criteria = Criteria::new().limit(10).page(2).offset(5);
        assert!(!criteria.has_page());
        assert!(criteria.has_offset());
        assert_eq!(criteria.get_bounds().offset, 5);

        let criteria = criteria.page(4);
        assert!(criteria.has_page());
        assert!(!criteria.has_offset());
        assert_eq!(criteria.get_bounds().offset, 30);
    }

    #[test]
    fn test_no_limit_means_no_paginated_limit() {
        let bounds = Criteria::new().offset(3).get_bounds();
        assert_eq!(bounds.limit, None);
        assert_eq!(bounds.paginated_limit, None);
        assert_eq!(bounds.offset, 3);
    }

    #[test]
    fn test_predicates_accumulate_per_field() {
        let criteria = Criteria::new()
            .equals("Age", 5i64)
            .less_than("age", 9i64)
            .greater_than("score", 1i64);

        assert_eq!(criteria.where_fields(), vec!["age", "score"]);
        assert_eq!(
            criteria.predicate("age"),
            Some(&Predicate::Commands(vec![
                (Command::Eq, Value::Integer(5)),
                (Command::Lt, Value::Integer(9)),
            ]))
        );
    }

    #[test]
    fn test_between_expands_to_range() {
        let criteria = Criteria::new().between("age", 18i64, 30i64);
        let commands = criteria.predicate("age").unwrap().commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].0, Command::Gte);
        assert_eq!(commands[1].0, Command::Lte);
    }

    #[test]
    fn test_from_map() {
        let mut range = BTreeMap::new();
        range.insert("$gt".to_string(), Value::Integer(3));
        range.insert("$in".to_string(), Value::from(vec![4i64, 5]));

        let mut filter = BTreeMap::new();
        filter.insert("age".to_string(), Value::Map(range));
        filter.insert("name".to_string(), Value::from("bob"));

        let criteria = Criteria::from_map(&filter).unwrap();
        assert_eq!(criteria.predicate("name"), Some(&Predicate::Literal(Value::from("bob"))));
        assert_eq!(criteria.predicate("age").unwrap().commands().len(), 2);
    }

    #[test]
    fn test_from_map_rejects_bad_shapes() {
        let mut filter = BTreeMap::new();
        filter.insert("$or".to_string(), Value::Null);
        assert!(Criteria::from_map(&filter).is_err());

        let mut mixed = BTreeMap::new();
        mixed.insert("$gt".to_string(), Value::Integer(1));
        mixed.insert("plain".to_string(), Value::Integer(1));
        let mut filter = BTreeMap::new();
        filter.insert("age".to_string(), Value::Map(mixed));
        assert!(Criteria::from_map(&filter).is_err());

        let mut bad_in = BTreeMap::new();
        bad_in.insert("$in".to_string(), Value::Integer(1));
        let mut filter = BTreeMap::new();
        filter.insert("age".to_string(), Value::Map(bad_in));
        assert!(Criteria::from_map(&filter).is_err());
    }

    #[test]
    fn test_normalize_rewrites_in_place() {
        let mut table = Table::new("users").unwrap();
        table.add_field("age", FieldType::Integer, None).unwrap();
        table.add_field("active", FieldType::Boolean, None).unwrap();

        let mut criteria = Criteria::new()
            .equals("active", true)
            .is_in("age", vec![Value::from("1"), Value::from("2")])
            .greater_than("age", "0");
        criteria.normalize(&table).unwrap();

        assert_eq!(criteria.predicate("active"), Some(&Predicate::Literal(Value::Integer(1))));
        assert_eq!(
            criteria.predicate("age"),
            Some(&Predicate::Commands(vec![
                (Command::In, Value::from(vec![1i64, 2])),
                (Command::Gt, Value::Integer(0)),
            ]))
        );
    }

    #[test]
    fn test_normalize_near() {
        let table = Table::new("places").unwrap();
        let mut criteria = Criteria::new().near("location", "10,20", 5.0);
        criteria.normalize(&table).unwrap();

        let commands = criteria.predicate("location").unwrap().commands();
        assert_eq!(
            commands[0].1,
            &Value::List(vec![Value::from(vec![10.0, 20.0]), Value::Float(5.0)])
        );
    }

    #[test]
    fn test_normalize_reports_type_errors() {
        let mut table = Table::new("users").unwrap();
        table.add_field("age", FieldType::Integer, None).unwrap();
        let mut criteria = Criteria::new().equals("age", "old");
        assert!(criteria.normalize(&table).is_err());
    }

    #[test]
    fn test_only_reserved_fields() {
        assert!(Criteria::new().only_reserved_fields());
        assert!(Criteria::new().equals("_id", "x").sort("_rowid", SortDirection::Descending).only_reserved_fields());
        assert!(!Criteria::new().equals("_id", "x").equals("name", "y").only_reserved_fields());
    }
}
