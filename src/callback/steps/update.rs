use serde_json::{Map, Value};

use crate::callback::context::OperationContext;
use crate::callback::keys::{UPDATE_ATTRS, UPDATE_INTERFACE, UPDATE_OPTION};
use crate::error::OrmError;

/// Narrow the attributes given to an update down to those that change anything.
/// Nothing changed means nothing left to do.
pub fn assign_updating_attributes(ctx: &mut OperationContext) -> Result<(), OrmError> {
    let Some(Value::Object(attrs)) = ctx.get(UPDATE_INTERFACE).cloned() else {
        return Ok(());
    };
    let schema = ctx.schema.clone();

    let mut changed = Map::new();
    for (column, value) in attrs {
        if !schema.has_field(&column) {
            tracing::debug!("Ignoring unknown column '{}' while updating {}", column, schema.name);
            continue;
        }
        match ctx.target.single_mut() {
            Some(record) => {
                if record.get(&column) != Some(&value) {
                    record.set(column.clone(), value.clone());
                    changed.insert(column, value);
                }
            }
            None => {
                changed.insert(column, value);
            }
        }
    }

    if changed.is_empty() {
        tracing::debug!("No changes to update for {}", schema.name);
        ctx.skip_left();
    } else {
        ctx.set(UPDATE_ATTRS, Value::Object(changed));
    }
    Ok(())
}

/// UPDATE with the changed attributes, or every changeable non-key column of the record.
pub fn update(ctx: &mut OperationContext) -> Result<(), OrmError> {
    if ctx.has_error() {
        return Ok(());
    }

    let assignments: Vec<(String, Value)> = match ctx.get(UPDATE_ATTRS) {
        Some(Value::Object(attrs)) => attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => match ctx.target.single() {
            Some(record) => ctx
                .schema
                .fields
                .iter()
                .filter(|f| f.is_changeable() && !f.is_primary_key())
                .map(|f| (f.name.clone(), record.get(&f.name).cloned().unwrap_or(Value::Null)))
                .collect(),
            None => vec![],
        },
    };
    if assignments.is_empty() {
        return Ok(());
    }

    let mut sets = Vec::with_capacity(assignments.len());
    for (column, value) in assignments {
        let placeholder = ctx.add_to_vars(value);
        sets.push(format!("{} = {}", ctx.quote(&column), placeholder));
    }
    let conditions = ctx.combined_condition_sql()?;
    ctx.sql = format!(
        "UPDATE {} SET {}{}{}",
        ctx.quoted_table(),
        sets.join(", "),
        conditions,
        ctx.option_suffix(UPDATE_OPTION)
    );

    let result = ctx.exec(&ctx.sql, &ctx.params)?;
    ctx.rows_affected = result.rows_affected;
    if let Some(record) = ctx.target.single_mut() {
        record.mark_persisted();
    }
    Ok(())
}
