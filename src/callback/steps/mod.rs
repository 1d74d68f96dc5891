// Default persistence steps and their registration
pub mod associations;
pub mod create;
pub mod delete;
pub mod lifecycle;
pub mod preload;
pub mod query;
pub mod timestamps;
pub mod transaction;
pub mod update;

use super::registry::Callbacks;

/// Populate every chain with the standard steps.
pub fn register_defaults(callbacks: &mut Callbacks) {
    callbacks
        .create()
        .register("orm:begin_transaction", transaction::begin_transaction)
        .register("orm:before_create", lifecycle::before_create)
        .register("orm:save_before_associations", associations::save_before_associations)
        .register("orm:update_time_stamp", timestamps::update_time_stamp_for_create)
        .register("orm:create", create::create)
        .register("orm:force_reload_after_create", create::force_reload_after_create)
        .register("orm:save_after_associations", associations::save_after_associations)
        .register("orm:after_create", lifecycle::after_create)
        .always()
        .register("orm:commit_or_rollback_transaction", transaction::commit_or_rollback_transaction);

    callbacks
        .update()
        .register("orm:assign_updating_attributes", update::assign_updating_attributes)
        .register("orm:begin_transaction", transaction::begin_transaction)
        .register("orm:before_update", lifecycle::before_update)
        .register("orm:save_before_associations", associations::save_before_associations)
        .register("orm:update_time_stamp", timestamps::update_time_stamp_for_update)
        .register("orm:update", update::update)
        .register("orm:save_after_associations", associations::save_after_associations)
        .register("orm:after_update", lifecycle::after_update)
        .always()
        .register("orm:commit_or_rollback_transaction", transaction::commit_or_rollback_transaction);

    callbacks
        .delete()
        .register("orm:begin_transaction", transaction::begin_transaction)
        .register("orm:before_delete", lifecycle::before_delete)
        .register("orm:delete", delete::delete)
        .register("orm:after_delete", lifecycle::after_delete)
        .always()
        .register("orm:commit_or_rollback_transaction", transaction::commit_or_rollback_transaction);

    callbacks
        .query()
        .register("orm:query", query::query)
        .register("orm:preload", preload::preload)
        .register("orm:after_query", lifecycle::after_query);

    callbacks.row_query().register("orm:row_query", query::row_query);
}
