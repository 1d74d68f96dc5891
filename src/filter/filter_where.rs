use serde_json::Value;

use super::error::FilterError;
use super::filter::quote_column;
use super::types::{Condition, FilterOp, FilterWhereInfo, FilterWhereOptions};
use crate::dialect::Dialect;

/// Renders a list of [`Condition`]s into one parameterized WHERE body.
///
/// Placeholders are numbered from `starting_param_index + 1` so the fragment
/// can follow parameters already bound by the surrounding statement.
pub struct FilterWhere<'d> {
    dialect: &'d dyn Dialect,
    param_values: Vec<Value>,
    param_index: usize,
}

impl<'d> FilterWhere<'d> {
    pub fn new(dialect: &'d dyn Dialect, starting_param_index: usize) -> Self {
        Self {
            dialect,
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    /// Returns an empty string when there is nothing to filter on.
    pub fn generate(
        conditions: &[Condition],
        starting_param_index: usize,
        options: &FilterWhereOptions,
        dialect: &'d dyn Dialect,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(dialect, starting_param_index);
        let mut sql_conditions = vec![];

        if let Some(column) = &options.soft_delete_column {
            sql_conditions.push(format!("{} IS NULL", quote_column(dialect, column)));
        }

        for condition in conditions {
            match condition {
                Condition::Json(where_data) => {
                    if let Some(sql) = filter_where.json_clause(where_data)? {
                        sql_conditions.push(sql);
                    }
                }
                Condition::Raw { sql, params } => {
                    sql_conditions.push(filter_where.raw_clause(sql, params)?);
                }
                Condition::In { columns, tuples } => {
                    sql_conditions.push(filter_where.in_clause(columns, tuples)?);
                }
            }
        }

        Ok((sql_conditions.join(" AND "), filter_where.param_values))
    }

    fn json_clause(&mut self, where_data: &Value) -> Result<Option<String>, FilterError> {
        match where_data {
            Value::Null => Ok(None),
            Value::Object(obj) => {
                let mut parts = vec![];
                for (key, value) in obj {
                    if key.starts_with('$') {
                        parts.push(self.logical_clause(key, value)?);
                    } else {
                        for info in Self::parse_field_condition(key, value)? {
                            parts.push(self.build_sql_condition(&info)?);
                        }
                    }
                }
                if parts.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(parts.join(" AND ")))
                }
            }
            // Raw SQL predicate without parameters
            Value::String(s) => Ok(Some(format!("({})", s))),
            _ => Err(FilterError::InvalidWhereClause("Unsupported WHERE format".to_string())),
        }
    }

    fn logical_clause(&mut self, op: &str, value: &Value) -> Result<String, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                let mut sql_parts = Vec::new();
                for v in arr {
                    if let Some(sql) = self.json_clause(v)? {
                        sql_parts.push(format!("({})", sql));
                    }
                }
                if sql_parts.is_empty() {
                    return Ok("1=1".to_string());
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                Ok(format!("({})", sql_parts.join(joiner)))
            }
            "$not" => {
                let sql = self.json_clause(value)?.unwrap_or_else(|| "1=1".to_string());
                Ok(format!("NOT ({})", sql))
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(field: &str, value: &Value) -> Result<Vec<FilterWhereInfo>, FilterError> {
        let mut infos = vec![];
        match value {
            Value::Object(obj) if obj.keys().all(|k| k.starts_with('$')) && !obj.is_empty() => {
                for (op_key, op_val) in obj {
                    let operator = Self::map_operator(op_key)?;
                    infos.push(FilterWhereInfo { column: field.to_string(), operator, data: op_val.clone() });
                }
            }
            // Implicit equality: { field: value }
            _ => infos.push(FilterWhereInfo { column: field.to_string(), operator: FilterOp::Eq, data: value.clone() }),
        }
        Ok(infos)
    }

    fn map_operator(op_key: &str) -> Result<FilterOp, FilterError> {
        Ok(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$ilike" => FilterOp::ILike,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$between" => FilterOp::Between,
            "$null" => FilterOp::Null,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        let quoted_column = quote_column(self.dialect, &condition.column);
        let data = condition.data.clone();
        match condition.operator {
            FilterOp::Eq => {
                if data.is_null() { Ok(format!("{} IS NULL", quoted_column)) }
                else { Ok(format!("{} = {}", quoted_column, self.param(data))) }
            }
            FilterOp::Ne => {
                if data.is_null() { Ok(format!("{} IS NOT NULL", quoted_column)) }
                else { Ok(format!("{} <> {}", quoted_column, self.param(data))) }
            }
            FilterOp::Gt => Ok(format!("{} > {}", quoted_column, self.param(data))),
            FilterOp::Gte => Ok(format!("{} >= {}", quoted_column, self.param(data))),
            FilterOp::Lt => Ok(format!("{} < {}", quoted_column, self.param(data))),
            FilterOp::Lte => Ok(format!("{} <= {}", quoted_column, self.param(data))),
            FilterOp::Like => Ok(format!("{} LIKE {}", quoted_column, self.param(data))),
            FilterOp::ILike => Ok(format!("{} ILIKE {}", quoted_column, self.param(data))),
            FilterOp::In | FilterOp::NIn => {
                let keyword = if condition.operator == FilterOp::In { "IN" } else { "NOT IN" };
                match data {
                    Value::Array(values) => {
                        if values.is_empty() {
                            return Ok(if keyword == "IN" { "1=0" } else { "1=1" }.to_string());
                        }
                        let params: Vec<String> = values.into_iter().map(|v| self.param(v)).collect();
                        Ok(format!("{} {} ({})", quoted_column, keyword, params.join(", ")))
                    }
                    other => Ok(format!("{} {} ({})", quoted_column, keyword, self.param(other))),
                }
            }
            FilterOp::Between => {
                if let Value::Array(values) = data {
                    if values.len() != 2 {
                        return Err(FilterError::InvalidOperatorData("$between requires exactly 2 values".to_string()));
                    }
                    let mut values = values.into_iter();
                    let low = values.next().unwrap_or(Value::Null);
                    let high = values.next().unwrap_or(Value::Null);
                    Ok(format!("{} BETWEEN {} AND {}", quoted_column, self.param(low), self.param(high)))
                } else {
                    Err(FilterError::InvalidOperatorData("$between requires array with 2 values".to_string()))
                }
            }
            FilterOp::Null => match data {
                Value::Bool(false) => Ok(format!("{} IS NOT NULL", quoted_column)),
                _ => Ok(format!("{} IS NULL", quoted_column)),
            },
            FilterOp::Text => Ok(condition.column.clone()),
        }
    }

    fn raw_clause(&mut self, sql: &str, params: &[Value]) -> Result<String, FilterError> {
        let placeholders = sql.matches('?').count();
        if placeholders != params.len() {
            return Err(FilterError::PlaceholderMismatch { placeholders, params: params.len() });
        }

        let mut rendered = String::with_capacity(sql.len() + params.len() * 2);
        let mut params = params.iter();
        for ch in sql.chars() {
            if ch != '?' {
                rendered.push(ch);
                continue;
            }
            match params.next() {
                Some(Value::Array(values)) if values.is_empty() => rendered.push_str("NULL"),
                Some(Value::Array(values)) => {
                    let expanded: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
                    rendered.push_str(&expanded.join(", "));
                }
                Some(value) => {
                    let placeholder = self.param(value.clone());
                    rendered.push_str(&placeholder);
                }
                None => {}
            }
        }
        Ok(format!("({})", rendered))
    }

    fn in_clause(&mut self, columns: &[String], tuples: &[Vec<Value>]) -> Result<String, FilterError> {
        if columns.is_empty() {
            return Err(FilterError::InvalidColumn("IN condition requires at least one column".to_string()));
        }
        if tuples.is_empty() {
            return Ok("1=0".to_string());
        }

        let quoted: Vec<String> = columns.iter().map(|c| quote_column(self.dialect, c)).collect();
        if columns.len() == 1 && tuples.len() == 1 && tuples[0].len() == 1 {
            let placeholder = self.param(tuples[0][0].clone());
            return Ok(format!("{} = {}", quoted[0], placeholder));
        }

        let mut rendered_tuples = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            if tuple.len() != columns.len() {
                return Err(FilterError::InvalidTuple { expected: columns.len(), actual: tuple.len() });
            }
            let params: Vec<String> = tuple.iter().map(|v| self.param(v.clone())).collect();
            if columns.len() == 1 {
                rendered_tuples.push(params.join(", "));
            } else {
                rendered_tuples.push(format!("({})", params.join(", ")));
            }
        }

        if columns.len() == 1 {
            Ok(format!("{} IN ({})", quoted[0], rendered_tuples.join(", ")))
        } else {
            Ok(format!("({}) IN ({})", quoted.join(", "), rendered_tuples.join(", ")))
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        self.dialect.bind_var(self.param_index)
    }
}
