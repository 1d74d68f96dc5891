pub mod executor;
pub mod postgres;
pub mod record;

pub use executor::{CancelToken, DatabaseError, ExecResult, QueryExecutor, Row, Transaction};
pub use postgres::PgExecutor;
pub use record::{Record, RecordError, Related};
