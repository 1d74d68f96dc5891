use crate::database::record::Record;
use crate::error::OrmError;

/// Lifecycle hooks an entity may implement.
///
/// Every method defaults to a no-op, so an implementation only overrides what it
/// needs. Entities without hooks skip the hook steps entirely. Returning an
/// error records it on the operation and rolls the transaction back.
pub trait ModelHooks: Send + Sync {
    fn before_save(&self, _record: &mut Record) -> Result<(), OrmError> {
        Ok(())
    }

    fn before_create(&self, _record: &mut Record) -> Result<(), OrmError> {
        Ok(())
    }

    fn after_create(&self, _record: &mut Record) -> Result<(), OrmError> {
        Ok(())
    }

    fn after_save(&self, _record: &mut Record) -> Result<(), OrmError> {
        Ok(())
    }

    fn before_update(&self, _record: &mut Record) -> Result<(), OrmError> {
        Ok(())
    }

    fn after_update(&self, _record: &mut Record) -> Result<(), OrmError> {
        Ok(())
    }

    fn before_delete(&self, _record: &mut Record) -> Result<(), OrmError> {
        Ok(())
    }

    fn after_delete(&self, _record: &mut Record) -> Result<(), OrmError> {
        Ok(())
    }

    fn after_find(&self, _record: &mut Record) -> Result<(), OrmError> {
        Ok(())
    }
}
