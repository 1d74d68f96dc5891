// Scratch keys shared between steps and set by callers

/// Columns left blank on insert because the database supplies a default
pub const BLANK_COLUMNS_WITH_DEFAULT_VALUE: &str = "orm:blank_columns_with_default_value";
/// Attribute map given to an update call
pub const UPDATE_INTERFACE: &str = "orm:update_interface";
/// Attributes that actually changed and will be written
pub const UPDATE_ATTRS: &str = "orm:update_attrs";
/// Present when updating raw columns: no hooks, no timestamp
pub const UPDATE_COLUMN: &str = "orm:update_column";
pub const INSERT_OPTION: &str = "orm:insert_option";
pub const UPDATE_OPTION: &str = "orm:update_option";
pub const DELETE_OPTION: &str = "orm:delete_option";
pub const QUERY_OPTION: &str = "orm:query_option";
/// `ASC` or `DESC`; orders a query by primary key
pub const ORDER_BY_PRIMARY_KEY: &str = "orm:order_by_primary_key";
/// `false` disables association saves for one call
pub const SAVE_ASSOCIATIONS: &str = "orm:save_associations";
/// Preload every relation marked for preloading
pub const AUTO_PRELOAD: &str = "orm:auto_preload";
