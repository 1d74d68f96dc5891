use chrono::Utc;
use serde_json::Value;

use crate::callback::context::OperationContext;
use crate::callback::keys::DELETE_OPTION;
use crate::error::OrmError;

/// Soft delete when the entity has `deleted_at` and the search is scoped, hard delete otherwise.
pub fn delete(ctx: &mut OperationContext) -> Result<(), OrmError> {
    if ctx.has_error() {
        return Ok(());
    }
    let schema = ctx.schema.clone();
    let extra = ctx.option_suffix(DELETE_OPTION);

    let soft_delete = if ctx.search.unscoped { None } else { schema.soft_delete_column() };
    let now = Utc::now();
    ctx.sql = match soft_delete {
        Some(column) => {
            let placeholder = ctx.add_to_vars(Value::String(now.to_rfc3339()));
            let conditions = ctx.combined_condition_sql()?;
            format!("UPDATE {} SET {} = {}{}{}", ctx.quoted_table(), ctx.quote(column), placeholder, conditions, extra)
        }
        None => {
            let conditions = ctx.combined_condition_sql()?;
            format!("DELETE FROM {}{}{}", ctx.quoted_table(), conditions, extra)
        }
    };

    let result = ctx.exec(&ctx.sql, &ctx.params)?;
    ctx.rows_affected = result.rows_affected;
    // Records are stamped only after the UPDATE succeeded
    if let Some(column) = soft_delete {
        for record in ctx.target.records_mut() {
            record.set_timestamp(column, now);
        }
    }
    Ok(())
}
