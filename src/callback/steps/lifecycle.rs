// Hook steps: each runs only while the operation is error-free
use crate::callback::context::OperationContext;
use crate::callback::hooks::ModelHooks;
use crate::callback::keys::UPDATE_COLUMN;
use crate::database::record::Record;
use crate::error::OrmError;

fn call_hook<F>(ctx: &mut OperationContext, hook: F) -> Result<(), OrmError>
where
    F: Fn(&dyn ModelHooks, &mut Record) -> Result<(), OrmError>,
{
    if ctx.has_error() {
        return Ok(());
    }
    let Some(hooks) = ctx.schema.model_hooks().cloned() else {
        return Ok(());
    };
    for record in ctx.target.records_mut() {
        hook(hooks.as_ref(), record)?;
    }
    Ok(())
}

fn missing_where_guard(ctx: &OperationContext, operation: &'static str) -> Result<(), OrmError> {
    if ctx.config().callbacks.block_global_update && !ctx.has_conditions() {
        return Err(OrmError::MissingWhereClause { operation });
    }
    Ok(())
}

pub fn before_create(ctx: &mut OperationContext) -> Result<(), OrmError> {
    call_hook(ctx, |hooks, record| hooks.before_save(record))?;
    call_hook(ctx, |hooks, record| hooks.before_create(record))
}

pub fn after_create(ctx: &mut OperationContext) -> Result<(), OrmError> {
    call_hook(ctx, |hooks, record| hooks.after_create(record))?;
    call_hook(ctx, |hooks, record| hooks.after_save(record))
}

pub fn before_update(ctx: &mut OperationContext) -> Result<(), OrmError> {
    missing_where_guard(ctx, "updating")?;
    if ctx.has(UPDATE_COLUMN) {
        return Ok(());
    }
    call_hook(ctx, |hooks, record| hooks.before_save(record))?;
    call_hook(ctx, |hooks, record| hooks.before_update(record))
}

pub fn after_update(ctx: &mut OperationContext) -> Result<(), OrmError> {
    if ctx.has(UPDATE_COLUMN) {
        return Ok(());
    }
    call_hook(ctx, |hooks, record| hooks.after_update(record))?;
    call_hook(ctx, |hooks, record| hooks.after_save(record))
}

pub fn before_delete(ctx: &mut OperationContext) -> Result<(), OrmError> {
    missing_where_guard(ctx, "deleting")?;
    call_hook(ctx, |hooks, record| hooks.before_delete(record))
}

pub fn after_delete(ctx: &mut OperationContext) -> Result<(), OrmError> {
    call_hook(ctx, |hooks, record| hooks.after_delete(record))
}

pub fn after_query(ctx: &mut OperationContext) -> Result<(), OrmError> {
    call_hook(ctx, |hooks, record| hooks.after_find(record))
}
