pub mod callback;
pub mod cli;
pub mod config;
pub mod database;
pub mod db;
pub mod dialect;
pub mod error;
pub mod filter;
pub mod preload;
pub mod schema;
pub mod testing;

pub use callback::{Callbacks, ChainKind, ModelHooks, OperationContext};
pub use database::{CancelToken, QueryExecutor, Record, Related};
pub use db::{Database, DatabaseBuilder, Query, Session};
pub use error::{is_record_not_found, OrmError, OrmResult};
pub use preload::{PreloadCondition, PreloadResolver, PreloadSpec};
pub use schema::{EntitySchema, Field, JoinTable, Relation, RelationKind};
