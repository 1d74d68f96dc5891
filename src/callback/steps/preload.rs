use crate::callback::context::OperationContext;
use crate::callback::keys::AUTO_PRELOAD;
use crate::error::OrmError;
use crate::preload::{PreloadResolver, PreloadSpec};

/// Batch-load requested associations onto the records just queried.
pub fn preload(ctx: &mut OperationContext) -> Result<(), OrmError> {
    if ctx.has_error() {
        return Ok(());
    }

    if ctx.flag(AUTO_PRELOAD, ctx.config().preload.auto_preload) {
        let schema = ctx.schema.clone();
        for relation in schema.relations.iter().filter(|r| r.options.preload) {
            if !ctx.search.preload.iter().any(|spec| spec.path == relation.name) {
                ctx.search.preload.push(PreloadSpec::new(relation.name.clone()));
            }
        }
    }
    if ctx.search.preload.is_empty() || ctx.target.records().is_empty() {
        return Ok(());
    }

    let resolver = PreloadResolver::from_context(ctx);
    let specs = ctx.search.preload.clone();
    let schema = ctx.schema.clone();
    resolver.preload(&schema, ctx.target.records_mut(), &specs)
}
