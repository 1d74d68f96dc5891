use crate::callback::context::OperationContext;
use crate::error::OrmError;

/// Opens the operation's transaction unless an outer operation already holds one.
pub fn begin_transaction(ctx: &mut OperationContext) -> Result<(), OrmError> {
    ctx.begin_transaction()
}

pub fn commit_or_rollback_transaction(ctx: &mut OperationContext) -> Result<(), OrmError> {
    ctx.commit_or_rollback()
}
