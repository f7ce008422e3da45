use super::super::{ColumnRef, CompileContext, ConditionCompiler};
use crate::core::{DbError, Result, Value};
use crate::query::Command;

pub struct ComparisonCompiler;

impl ConditionCompiler for ComparisonCompiler {
    fn name(&self) -> &'static str {
        "COMPARISON"
    }

    fn can_compile(&self, command: Command) -> bool {
        command.sql_operator().is_some()
    }

    fn compile(
        &self,
        column: &ColumnRef<'_>,
        command: Command,
        operand: &Value,
        ctx: &mut CompileContext<'_>,
    ) -> Result<String> {
        let op = command.sql_operator().ok_or_else(|| {
            DbError::InvalidArgument(format!("{} is not a comparison", command))
        })?;
        let quoted = ctx.quote(column.name);

        // NULL never compares equal in SQL
        match (command, operand) {
            (Command::Eq, Value::Null) => return Ok(format!("{} IS NULL", quoted)),
            (Command::Ne, Value::Null) => return Ok(format!("{} IS NOT NULL", quoted)),
            (_, Value::List(_)) if !column.spatial => {
                return Err(DbError::TypeMismatch(format!(
                    "{} on '{}' cannot take a list; use $in",
                    command, column.name
                )));
            }
            _ => {}
        }

        let placeholder = ctx.bind(operand, column.spatial)?;
        Ok(format!("{} {} {}", quoted, op, placeholder))
    }
}
