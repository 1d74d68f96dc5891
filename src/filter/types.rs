use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,

    #[serde(rename = "$like")] Like,
    #[serde(rename = "$ilike")] ILike,

    #[serde(rename = "$in")] In,
    #[serde(rename = "$nin")] NIn,

    #[serde(rename = "$between")] Between,

    #[serde(rename = "$null")] Null,

    // Pre-rendered SQL (logical groups)
    Text,
}

/// One entry of a WHERE clause; all entries are ANDed together.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `{ "name": "x", "age": { "$gt": 3 } }` style filter
    Json(Value),
    /// SQL fragment with `?` placeholders; array parameters expand to a placeholder list
    Raw { sql: String, params: Vec<Value> },
    /// `(c1, c2) IN ((v1, v2), ...)`; a single column renders as `c1 IN (v1, ...)`
    In { columns: Vec<String>, tuples: Vec<Vec<Value>> },
}

impl Condition {
    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Condition::Raw { sql: sql.into(), params }
    }

    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Condition::In { columns: vec![column.into()], tuples: vec![vec![value]] }
    }
}

#[derive(Debug, Clone)]
pub struct FilterWhereInfo {
    pub column: String,
    pub operator: FilterOp,
    pub data: Value,
}

#[derive(Debug, Clone, Default)]
pub struct FilterWhereOptions {
    /// Qualified soft-delete column; rows with a non-null value are excluded
    pub soft_delete_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub column: String,
    pub sort: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Value>,
}
