use serde_json::Value;

use crate::database::record::Record;

/// Stable string form of a (possibly composite) key.
///
/// Owner keys and related keys are compared through this one function so that
/// `1`, `1.0` and `"1"` read back from different drivers land in the same bucket.
pub fn canonical_key(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(canonical_part).collect();
    serde_json::to_string(&parts).unwrap_or_default()
}

fn canonical_part(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (None, Some(u), _) => u.to_string(),
            (None, None, Some(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => (f as i64).to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Values of `columns` on `record`; `None` when any of them is null or missing.
pub fn key_values(record: &Record, columns: &[String]) -> Option<Vec<Value>> {
    columns
        .iter()
        .map(|column| match record.get(column) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.clone()),
        })
        .collect()
}

/// Canonical key of `columns` on `record`.
pub fn record_key(record: &Record, columns: &[String]) -> Option<String> {
    key_values(record, columns).map(|values| canonical_key(&values))
}
