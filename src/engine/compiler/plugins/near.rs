use super::super::{ColumnRef, CompileContext, ConditionCompiler};
use crate::core::{DbError, GeoPoint, Result, Value};
use crate::query::Command;

/// Proximity as a bounding box around the reference point.
pub struct NearCompiler;

impl ConditionCompiler for NearCompiler {
    fn name(&self) -> &'static str {
        "NEAR"
    }

    fn can_compile(&self, command: Command) -> bool {
        command == Command::Near
    }

    fn compile(
        &self,
        column: &ColumnRef<'_>,
        _command: Command,
        operand: &Value,
        ctx: &mut CompileContext<'_>,
    ) -> Result<String> {
        let malformed =
            || DbError::InvalidArgument(format!("$near on '{}' needs [point, radius]", column.name));

        let [point, radius] = operand.as_list().ok_or_else(malformed)? else {
            return Err(malformed());
        };
        let point = GeoPoint::parse(point)?;
        let radius = radius.as_f64().ok_or_else(malformed)?;

        let bbox = point.bounding_box(radius);
        Ok(ctx
            .dialect
            .spatial_predicate(column.name, &bbox, &mut ctx.params))
    }
}
