pub mod plugins;

use log::debug;

use crate::core::{DbError, GeoPoint, Result, Value};
use crate::query::{Command, Criteria};
use crate::schema::{Index, IndexKind, Table};
use crate::sql::{Dialect, SqlValue};

/// Turns one `field <command> operand` condition into a SQL fragment.
pub trait ConditionCompiler {
    /// Name of the compiler
    fn name(&self) -> &'static str;

    /// Can this compiler handle the command?
    fn can_compile(&self, command: Command) -> bool;

    /// Compile the condition, pushing bind parameters onto the context
    fn compile(
        &self,
        column: &ColumnRef<'_>,
        command: Command,
        operand: &Value,
        ctx: &mut CompileContext<'_>,
    ) -> Result<String>;
}

/// Column a condition applies to.
pub struct ColumnRef<'a> {
    pub name: &'a str,
    /// Whether the column holds points in the dialect's spatial form.
    pub spatial: bool,
}

/// Dialect plus the bind parameters accumulated so far.
pub struct CompileContext<'a> {
    pub dialect: &'a dyn Dialect,
    pub params: Vec<SqlValue>,
}

impl<'a> CompileContext<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    /// Bind `value` and return its placeholder.
    pub fn bind(&mut self, value: &Value, spatial: bool) -> Result<&'static str> {
        let bound = bind_value(self.dialect, value, spatial)?;
        self.params.push(bound);
        Ok("?")
    }

    pub fn quote(&self, ident: &str) -> String {
        self.dialect.quote(ident)
    }
}

/// Registry of condition compilers
pub struct CompilerRegistry {
    compilers: Vec<Box<dyn ConditionCompiler>>,
}

impl CompilerRegistry {
    pub fn new() -> Self {
        Self {
            compilers: Vec::new(),
        }
    }

    pub fn register(&mut self, compiler: Box<dyn ConditionCompiler>) {
        debug!("Registered condition compiler: {}", compiler.name());
        self.compilers.push(compiler);
    }

    pub fn with_default_compilers() -> Self {
        use plugins::*;

        let mut registry = Self::new();
        registry.register(Box::new(comparison::ComparisonCompiler));
        registry.register(Box::new(in_list::InListCompiler));
        registry.register(Box::new(near::NearCompiler));
        registry
    }

    fn find(&self, command: Command) -> Option<&dyn ConditionCompiler> {
        self.compilers
            .iter()
            .find(|compiler| compiler.can_compile(command))
            .map(|boxed| &**boxed)
    }

    /// Compile the criteria's predicates into a ` WHERE ...` clause, or an
    /// empty string when there are none.
    ///
    /// Fields are AND-joined; several operators on one field are
    /// parenthesized and AND-joined.
    pub fn compile_where(
        &self,
        table: &Table,
        index: Option<&Index>,
        criteria: &Criteria,
        ctx: &mut CompileContext<'_>,
    ) -> Result<String> {
        let mut clauses = Vec::with_capacity(criteria.conditions().len());

        for (field, predicate) in criteria.conditions() {
            let spatial = index.and_then(|i| i.kind_of(field)) == Some(IndexKind::Spatial)
                || table.get_field(field).is_spatial();
            let column = ColumnRef {
                name: field,
                spatial,
            };

            let commands = predicate.commands();
            let mut parts = Vec::with_capacity(commands.len());
            for (command, operand) in commands {
                let compiler = self.find(command).ok_or_else(|| {
                    DbError::InvalidArgument(format!("No compiler for {} on '{}'", command, field))
                })?;
                parts.push(compiler.compile(&column, command, operand, ctx)?);
            }

            match parts.len() {
                0 => {}
                1 => clauses.append(&mut parts),
                _ => clauses.push(format!("({})", parts.join(" AND "))),
            }
        }

        if clauses.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(" WHERE {}", clauses.join(" AND ")))
        }
    }
}

impl Default for CompilerRegistry {
    fn default() -> Self {
        Self::with_default_compilers()
    }
}

/// Convert a document value into a bind parameter.
///
/// Booleans are stored as 0/1, maps as JSON text, and points (when the
/// column is spatial) in the dialect's spatial form. Lists never reach a
/// column directly: index rows are expanded per element first.
pub fn bind_value(dialect: &dyn Dialect, value: &Value, spatial: bool) -> Result<SqlValue> {
    if spatial && !value.is_null() {
        return Ok(dialect.spatial_value(GeoPoint::parse(value)?));
    }

    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Map(_) => SqlValue::Text(value.to_json().to_string()),
        Value::List(_) => {
            return Err(DbError::TypeMismatch(format!(
                "Cannot bind list {} to a scalar column",
                value
            )));
        }
    })
}

/// `?, ?, ?` for `n` parameters.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use crate::sql::SqliteDialect;

    fn users() -> Table {
        let mut table = Table::new("users").unwrap();
        table.add_field("age", FieldType::Integer, None).unwrap();
        table.add_field("home", FieldType::Point, None).unwrap();
        table
    }

    fn compile(criteria: &Criteria) -> (String, Vec<SqlValue>) {
        let dialect = SqliteDialect;
        let registry = CompilerRegistry::with_default_compilers();
        let mut ctx = CompileContext::new(&dialect);
        let clause = registry
            .compile_where(&users(), None, criteria, &mut ctx)
            .unwrap();
        (clause, ctx.params)
    }

    #[test]
    fn test_literal_and_range() {
        let criteria = Criteria::new()
            .equals("name", "bob")
            .greater_than("age", 18i64)
            .less_than_or_equal("age", 30i64);
        let (clause, params) = compile(&criteria);

        assert_eq!(clause, " WHERE \"name\" = ? AND (\"age\" > ? AND \"age\" <= ?)");
        assert_eq!(
            params,
            vec![
                SqlValue::Text("bob".into()),
                SqlValue::Integer(18),
                SqlValue::Integer(30)
            ]
        );
    }

    #[test]
    fn test_null_equality() {
        let criteria = Criteria::new().equals("a", Value::Null).not_equals("b", Value::Null);
        let (clause, params) = compile(&criteria);
        assert_eq!(clause, " WHERE \"a\" IS NULL AND \"b\" IS NOT NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_membership() {
        let criteria = Criteria::new()
            .is_in("age", vec![Value::Integer(1), Value::Integer(2)])
            .not_in("name", vec![Value::from("x")]);
        let (clause, params) = compile(&criteria);
        assert_eq!(clause, " WHERE \"age\" IN (?, ?) AND \"name\" NOT IN (?)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_empty_membership() {
        let criteria = Criteria::new().is_in("age", vec![]).not_in("name", vec![]);
        let (clause, _) = compile(&criteria);
        assert_eq!(clause, " WHERE 1 = 0 AND 1 = 1");
    }

    #[test]
    fn test_near_compiles_to_box() {
        let criteria = Criteria::new().near("home", vec![0.0, 0.0], 111.045);
        let (clause, params) = compile(&criteria);
        assert_eq!(clause, " WHERE docrel_point_in_box(\"home\", ?, ?, ?, ?)");
        assert_eq!(params[0], SqlValue::Real(-1.0));
        assert_eq!(params[2], SqlValue::Real(1.0));
    }

    #[test]
    fn test_spatial_equality_binds_point_text() {
        let criteria = Criteria::new().equals("home", vec![1.5, 2.0]);
        let (_, params) = compile(&criteria);
        assert_eq!(params, vec![SqlValue::Text("POINT(1.5 2)".into())]);
    }

    #[test]
    fn test_no_conditions() {
        let (clause, params) = compile(&Criteria::new());
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_bind_value() {
        let dialect = SqliteDialect;
        assert_eq!(bind_value(&dialect, &Value::Boolean(true), false).unwrap(), SqlValue::Integer(1));
        assert!(matches!(
            bind_value(&dialect, &Value::from(vec![1i64]), false),
            Err(DbError::TypeMismatch(_))
        ));
        let mut map = std::collections::BTreeMap::new();
        map.insert("k".to_string(), Value::Integer(1));
        assert_eq!(
            bind_value(&dialect, &Value::Map(map), false).unwrap(),
            SqlValue::Text("{\"k\":1}".into())
        );
    }
}
