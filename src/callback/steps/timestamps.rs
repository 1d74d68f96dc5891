use chrono::Utc;
use serde_json::Value;

use crate::callback::context::OperationContext;
use crate::callback::keys::{UPDATE_ATTRS, UPDATE_COLUMN};
use crate::error::OrmError;
use crate::schema::{CREATED_AT, UPDATED_AT};

/// Fill blank `created_at` / `updated_at` before insert.
pub fn update_time_stamp_for_create(ctx: &mut OperationContext) -> Result<(), OrmError> {
    if ctx.has_error() {
        return Ok(());
    }
    let now = Utc::now();
    let schema = ctx.schema.clone();
    for record in ctx.target.records_mut() {
        for column in [CREATED_AT, UPDATED_AT] {
            if schema.has_field(column) && record.is_blank(column) {
                record.set_timestamp(column, now);
            }
        }
    }
    Ok(())
}

/// Touch `updated_at`, also in the pending update attributes.
pub fn update_time_stamp_for_update(ctx: &mut OperationContext) -> Result<(), OrmError> {
    if ctx.has_error() || ctx.has(UPDATE_COLUMN) || !ctx.schema.has_field(UPDATED_AT) {
        return Ok(());
    }
    let now = Utc::now();
    for record in ctx.target.records_mut() {
        record.set_timestamp(UPDATED_AT, now);
    }
    if let Some(Value::Object(mut attrs)) = ctx.get(UPDATE_ATTRS).cloned() {
        attrs.insert(UPDATED_AT.to_string(), Value::String(now.to_rfc3339()));
        ctx.set(UPDATE_ATTRS, Value::Object(attrs));
    }
    Ok(())
}
