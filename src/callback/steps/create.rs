use serde_json::Value;
use uuid::Uuid;

use crate::callback::context::OperationContext;
use crate::callback::keys::{BLANK_COLUMNS_WITH_DEFAULT_VALUE, INSERT_OPTION};
use crate::error::OrmError;
use crate::filter::{Condition, Filter};
use crate::schema::PrimaryKeyStrategy;

/// INSERT the target record.
///
/// Blank columns that have a database default are left out of the statement and
/// remembered so `force_reload_after_create` can read back what the database chose.
pub fn create(ctx: &mut OperationContext) -> Result<(), OrmError> {
    if ctx.has_error() {
        return Ok(());
    }
    let schema = ctx.schema.clone();
    let record = ctx.target.single_mut().ok_or(OrmError::UnsupportedDestination)?;

    if schema.primary_key_strategy == PrimaryKeyStrategy::Uuid {
        for field in schema.primary_fields() {
            if record.is_blank(&field.name) {
                record.set(field.name.clone(), Uuid::new_v4().to_string());
            }
        }
    }

    let mut columns = vec![];
    let mut values = vec![];
    let mut blank_with_default = vec![];
    for field in schema.fields.iter().filter(|f| f.is_changeable()) {
        let blank = record.is_blank(&field.name);
        if blank && field.has_default_value() {
            blank_with_default.push(Value::String(field.name.clone()));
        } else if !field.is_primary_key() || !blank {
            columns.push(field.name.clone());
            values.push(record.get(&field.name).cloned().unwrap_or(Value::Null));
        }
    }

    if !blank_with_default.is_empty() {
        ctx.set(BLANK_COLUMNS_WITH_DEFAULT_VALUE, Value::Array(blank_with_default));
    }

    let placeholders: Vec<String> = values.into_iter().map(|v| ctx.add_to_vars(v)).collect();
    let quoted: Vec<String> = columns.iter().map(|c| ctx.quote(c)).collect();

    let primary = schema.primary_fields().first().map(|f| f.name.clone());
    let returning = primary
        .as_deref()
        .and_then(|pk| ctx.dialect().returning_suffix(&schema.table, &ctx.quote(pk)))
        .map(|suffix| format!(" {}", suffix))
        .unwrap_or_default();
    let extra = ctx.option_suffix(INSERT_OPTION);

    ctx.sql = if quoted.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES{}{}", ctx.quoted_table(), extra, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}){}{}",
            ctx.quoted_table(),
            quoted.join(", "),
            placeholders.join(", "),
            extra,
            returning
        )
    };

    let sql = ctx.sql.clone();
    let params = ctx.params.clone();
    match primary {
        Some(pk) if !returning.is_empty() => {
            let rows = ctx.query_rows(&sql, &params)?;
            ctx.rows_affected = rows.len() as u64;
            let generated = rows.first().and_then(|row| row.get(&pk)).cloned();
            if let (Some(value), Some(record)) = (generated, ctx.target.single_mut()) {
                record.set(pk, value);
            }
        }
        pk => {
            let result = ctx.exec(&sql, &params)?;
            ctx.rows_affected = result.rows_affected;
            if let (Some(pk), Some(id), Some(record)) = (pk, result.last_insert_id, ctx.target.single_mut()) {
                record.set_if_blank(pk, id);
            }
        }
    }

    if let Some(record) = ctx.target.single_mut() {
        record.mark_persisted();
    }
    Ok(())
}

/// Read back columns the database filled from defaults during insert.
pub fn force_reload_after_create(ctx: &mut OperationContext) -> Result<(), OrmError> {
    if ctx.has_error() {
        return Ok(());
    }
    let Some(Value::Array(columns)) = ctx.get(BLANK_COLUMNS_WITH_DEFAULT_VALUE).cloned() else {
        return Ok(());
    };
    let columns: Vec<String> = columns.iter().filter_map(|c| c.as_str().map(str::to_string)).collect();
    let Some(record) = ctx.target.single() else {
        return Ok(());
    };

    let mut filter = Filter::new(ctx.schema.table.clone())?;
    filter.select(columns)?;
    for pk in ctx.schema.primary_key_columns() {
        match record.get(&pk) {
            Some(value) if !record.is_blank(&pk) => {
                filter.condition(Condition::eq(pk, value.clone()));
            }
            _ => {
                tracing::warn!("Cannot reload {} after create: primary key '{}' is blank", ctx.schema.name, pk);
                return Ok(());
            }
        }
    }

    let select = filter.to_sql(ctx.dialect())?;
    let rows = ctx.query_rows(&select.query, &select.params)?;
    if let (Some(row), Some(record)) = (rows.first(), ctx.target.single_mut()) {
        record.absorb(row);
    }
    Ok(())
}
