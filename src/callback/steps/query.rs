use serde_json::Value;

use crate::callback::context::{OperationContext, Target};
use crate::callback::keys::{ORDER_BY_PRIMARY_KEY, QUERY_OPTION};
use crate::database::record::Record;
use crate::error::OrmError;
use crate::filter::Filter;

/// Render the search as a SELECT into `ctx.sql` / `ctx.params`.
pub(crate) fn prepare_query_sql(ctx: &mut OperationContext) -> Result<(), OrmError> {
    let search = &ctx.search;
    let mut filter = Filter::new(ctx.schema.table.clone())?;

    if !search.select.is_empty() {
        filter.select(search.select.clone())?;
    }
    for join in &search.joins {
        filter.join(join.clone());
    }
    for condition in &search.conditions {
        filter.condition(condition.clone());
    }
    if !search.unscoped {
        filter.soft_delete(ctx.schema.soft_delete_column().map(|c| ctx.schema.qualified(c)));
    }
    for order in &search.order {
        filter.order(order.clone())?;
    }
    if let Some(limit) = search.limit {
        filter.limit(limit, search.offset)?;
    }

    let select = filter.to_sql(ctx.dialect())?;
    ctx.sql = format!("{}{}", select.query, ctx.option_suffix(QUERY_OPTION));
    ctx.params = select.params;
    Ok(())
}

/// SELECT into the target: one record or a collection.
pub fn query(ctx: &mut OperationContext) -> Result<(), OrmError> {
    if ctx.has_error() {
        return Ok(());
    }
    if matches!(ctx.target, Target::None) {
        return Err(OrmError::UnsupportedDestination);
    }

    if let Some(direction) = ctx.get(ORDER_BY_PRIMARY_KEY).and_then(Value::as_str).map(str::to_string) {
        for pk in ctx.schema.primary_key_columns() {
            let order = Value::String(format!("{} {}", ctx.schema.qualified(&pk), direction));
            ctx.search.order.push(order);
        }
    }

    prepare_query_sql(ctx)?;
    let rows = ctx.query_rows(&ctx.sql, &ctx.params)?;
    ctx.rows_affected = rows.len() as u64;

    match &mut ctx.target {
        Target::Single(record) => {
            let row = rows.into_iter().next().ok_or(OrmError::RecordNotFound)?;
            *record = Record::from_row(row);
        }
        Target::Many(records) => {
            *records = rows.into_iter().map(Record::from_row).collect();
        }
        Target::None => {}
    }
    Ok(())
}

/// Raw rows for callers that scan columns themselves.
pub fn row_query(ctx: &mut OperationContext) -> Result<(), OrmError> {
    if ctx.has_error() {
        return Ok(());
    }
    prepare_query_sql(ctx)?;
    let rows = ctx.query_rows(&ctx.sql, &ctx.params)?;
    ctx.rows_affected = rows.len() as u64;
    ctx.rows = rows;
    Ok(())
}
