use super::super::{ColumnRef, CompileContext, ConditionCompiler, placeholders};
use crate::core::{DbError, Result, Value};
use crate::query::Command;

pub struct InListCompiler;

impl ConditionCompiler for InListCompiler {
    fn name(&self) -> &'static str {
        "IN_LIST"
    }

    fn can_compile(&self, command: Command) -> bool {
        matches!(command, Command::In | Command::NotIn)
    }

    fn compile(
        &self,
        column: &ColumnRef<'_>,
        command: Command,
        operand: &Value,
        ctx: &mut CompileContext<'_>,
    ) -> Result<String> {
        let Value::List(items) = operand else {
            return Err(DbError::InvalidArgument(format!(
                "{} on '{}' needs a list",
                command, column.name
            )));
        };
        let negated = command == Command::NotIn;

        if items.is_empty() {
            return Ok(if negated { "1 = 1" } else { "1 = 0" }.to_string());
        }

        for item in items {
            ctx.bind(item, column.spatial)?;
        }

        Ok(format!(
            "{} {}IN ({})",
            ctx.quote(column.name),
            if negated { "NOT " } else { "" },
            placeholders(items.len())
        ))
    }
}
