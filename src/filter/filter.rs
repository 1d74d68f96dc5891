use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{Condition, FilterOrderInfo, FilterWhereOptions, SqlResult};
use crate::dialect::Dialect;

/// Quote a possibly table-qualified column (`posts.user_id`, `tags.*`).
pub fn quote_column(dialect: &dyn Dialect, column: &str) -> String {
    column
        .split('.')
        .map(|part| if part == "*" { part.to_string() } else { dialect.quote(part) })
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Debug, Clone)]
pub struct Filter {
    table_name: String,
    select_columns: Vec<String>,
    joins: Vec<String>,
    conditions: Vec<Condition>,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<i64>,
    offset: Option<i64>,
    options: FilterWhereOptions,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        Self::validate_table_name(&table_name)?;
        Ok(Self {
            table_name,
            select_columns: vec![],
            joins: vec![],
            conditions: vec![],
            order_data: vec![],
            limit: None,
            offset: None,
            options: FilterWhereOptions::default(),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn select(&mut self, columns: Vec<String>) -> Result<&mut Self, FilterError> {
        Self::validate_select_columns(&columns)?;
        self.select_columns = columns;
        Ok(self)
    }

    pub fn condition(&mut self, condition: Condition) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    /// Append a pre-rendered JOIN clause, e.g. `INNER JOIN "links" ON ...`.
    pub fn join(&mut self, clause: impl Into<String>) -> &mut Self {
        self.joins.push(clause.into());
        self
    }

    pub fn order(&mut self, order_spec: Value) -> Result<&mut Self, FilterError> {
        let order_info = FilterOrder::validate_and_parse(&order_spec)?;
        self.order_data.extend(order_info);
        Ok(self)
    }

    pub fn soft_delete(&mut self, column: Option<String>) -> &mut Self {
        self.options.soft_delete_column = column;
        self
    }

    pub fn limit(&mut self, limit: i64, offset: Option<i64>) -> Result<&mut Self, FilterError> {
        if limit < 0 { return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string())); }
        if let Some(off) = offset { if off < 0 { return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string())); } }
        self.limit = Some(limit);
        self.offset = offset;
        Ok(self)
    }

    pub fn to_sql(&self, dialect: &dyn Dialect) -> Result<SqlResult, FilterError> {
        let select_clause = self.build_select_clause(dialect);
        let mut where_result = self.to_where_sql(0, dialect)?;
        if let Some(cap) = dialect.limit_where(self.limit, self.offset) {
            where_result.query = if where_result.query.is_empty() { cap } else { format!("{} AND {}", where_result.query, cap) };
        }
        let order_clause = FilterOrder::generate(&self.order_data, dialect)?;
        let limit_clause = dialect.limit_and_offset(self.limit, self.offset);

        let query = [
            format!("SELECT {}", select_clause),
            format!("FROM {}", dialect.quote(&self.table_name)),
            self.joins.join(" "),
            if where_result.query.is_empty() { String::new() } else { format!("WHERE {}", where_result.query) },
            order_clause,
            limit_clause,
        ].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");

        Ok(SqlResult { query, params: where_result.params })
    }

    /// WHERE body only; placeholders continue after `start_index` bound parameters.
    pub fn to_where_sql(&self, start_index: usize, dialect: &dyn Dialect) -> Result<SqlResult, FilterError> {
        let (query, params) = FilterWhere::generate(&self.conditions, start_index, &self.options, dialect)?;
        Ok(SqlResult { query, params })
    }

    fn validate_table_name(name: &str) -> Result<(), FilterError> {
        if !Self::is_identifier(name) {
            return Err(FilterError::InvalidTableName(format!("Invalid table name format: {}", name)));
        }
        Ok(())
    }

    fn validate_select_columns(columns: &[String]) -> Result<(), FilterError> {
        for column in columns {
            if column == "*" { continue; }
            if column.is_empty() { return Err(FilterError::InvalidColumn("Column name cannot be empty".to_string())); }
            let (expr, alias) = Self::split_alias(column);
            if let Some(alias) = alias {
                if !Self::is_identifier(alias) {
                    return Err(FilterError::InvalidColumn(format!("Invalid column alias: {}", column)));
                }
            }
            let mut parts = expr.split('.').peekable();
            while let Some(part) = parts.next() {
                let is_last = parts.peek().is_none();
                if is_last && part == "*" { continue; }
                if !Self::is_identifier(part) {
                    return Err(FilterError::InvalidColumn(format!("Invalid column name format: {}", column)));
                }
            }
        }
        Ok(())
    }

    /// `posts.id AS post_id` -> (`posts.id`, Some(`post_id`))
    fn split_alias(column: &str) -> (&str, Option<&str>) {
        match column.split_once(" AS ") {
            Some((expr, alias)) => (expr.trim(), Some(alias.trim())),
            None => (column, None),
        }
    }

    fn is_identifier(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) if first.is_alphabetic() || first == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
            _ => false,
        }
    }

    fn build_select_clause(&self, dialect: &dyn Dialect) -> String {
        if self.select_columns.is_empty() || self.select_columns.iter().any(|c| c == "*") {
            "*".to_string()
        } else {
            self.select_columns
                .iter()
                .map(|c| match Self::split_alias(c) {
                    (expr, Some(alias)) => format!("{} AS {}", quote_column(dialect, expr), dialect.quote(alias)),
                    (expr, None) => quote_column(dialect, expr),
                })
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}
