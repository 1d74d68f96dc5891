pub mod types;
pub mod filter;
pub mod filter_where;
pub mod filter_order;
pub mod error;

pub use types::*;
pub use filter::{quote_column, Filter};
pub use filter_where::FilterWhere;
pub use error::FilterError;
