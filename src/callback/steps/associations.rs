use serde_json::Value;

use crate::callback::context::OperationContext;
use crate::callback::keys::SAVE_ASSOCIATIONS;
use crate::db::Session;
use crate::dialect::Dialect;
use crate::error::OrmError;
use crate::schema::{JoinTable, Relation, RelationKind};

fn saving_enabled(ctx: &OperationContext) -> bool {
    !ctx.has_error() && ctx.flag(SAVE_ASSOCIATIONS, true)
}

fn saved_relations(ctx: &OperationContext, kinds: &[RelationKind]) -> Vec<Relation> {
    ctx.schema
        .relations
        .iter()
        .filter(|r| r.options.save_associations && kinds.contains(&r.kind))
        .cloned()
        .collect()
}

/// Save belongs-to targets first so their keys can be copied onto the owner.
pub fn save_before_associations(ctx: &mut OperationContext) -> Result<(), OrmError> {
    if !saving_enabled(ctx) {
        return Ok(());
    }
    let relations = saved_relations(ctx, &[RelationKind::BelongsTo]);
    if relations.is_empty() {
        return Ok(());
    }
    let db = ctx.db().clone();
    let session = Session::of(ctx);

    for relation in &relations {
        for record in ctx.target.records_mut() {
            let Some(mut related) = record.take_relation(&relation.name) else {
                continue;
            };
            let mut result = Ok(());
            if let Some(target) = related.records_mut().into_iter().next() {
                result = db.save_with(&relation.related, target, &session);
                if result.is_ok() {
                    for (fk, key) in relation.foreign_keys.iter().zip(&relation.association_foreign_keys) {
                        record.set(fk.clone(), target.get(key).cloned().unwrap_or(Value::Null));
                    }
                }
            }
            record.set_relation(relation.name.clone(), related);
            result?;
        }
    }
    Ok(())
}

/// Save has-one, has-many and many-to-many targets once the owner has its key.
pub fn save_after_associations(ctx: &mut OperationContext) -> Result<(), OrmError> {
    if !saving_enabled(ctx) {
        return Ok(());
    }
    let relations = saved_relations(ctx, &[RelationKind::HasOne, RelationKind::HasMany, RelationKind::ManyToMany]);
    if relations.is_empty() {
        return Ok(());
    }
    let db = ctx.db().clone();
    let session = Session::of(ctx);
    let mut links: Vec<(JoinTable, Vec<(String, Value)>)> = vec![];

    for relation in &relations {
        for record in ctx.target.records_mut() {
            let Some(mut related) = record.take_relation(&relation.name) else {
                continue;
            };
            let mut result = Ok(());
            for child in related.records_mut() {
                if relation.join_table.is_none() {
                    for (fk, key) in relation.foreign_keys.iter().zip(&relation.association_foreign_keys) {
                        child.set(fk.clone(), record.get(key).cloned().unwrap_or(Value::Null));
                    }
                    if let Some((column, value)) = relation.polymorphic_filter() {
                        child.set(column, value);
                    }
                }
                result = db.save_with(&relation.related, child, &session);
                if result.is_err() {
                    break;
                }
                if let Some(join_table) = &relation.join_table {
                    links.push((join_table.clone(), join_table.link_values(record, child)));
                }
            }
            record.set_relation(relation.name.clone(), related);
            result?;
        }
    }

    for (join_table, values) in links {
        let (sql, params) = link_statement(ctx.dialect(), &join_table, &values);
        ctx.exec(&sql, &params)?;
    }
    Ok(())
}

/// Insert a join-table row unless the same link already exists.
fn link_statement(dialect: &dyn Dialect, join_table: &JoinTable, values: &[(String, Value)]) -> (String, Vec<Value>) {
    let table = dialect.quote(&join_table.table);
    let columns: Vec<String> = values.iter().map(|(c, _)| dialect.quote(c)).collect();
    let selects: Vec<String> = (1..=values.len()).map(|i| dialect.bind_var(i)).collect();
    let matches: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = {}", c, dialect.bind_var(values.len() + i + 1)))
        .collect();

    let sql = format!(
        "INSERT INTO {} ({}) SELECT {} WHERE NOT EXISTS (SELECT 1 FROM {} WHERE {})",
        table,
        columns.join(", "),
        selects.join(", "),
        table,
        matches.join(" AND ")
    );
    let params = values.iter().chain(values.iter()).map(|(_, v)| v.clone()).collect();
    (sql, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Postgres;
    use serde_json::json;

    #[test]
    fn link_statement_skips_existing_rows() {
        let join_table = JoinTable::new("post_tags").source_key("post_id", "id").destination_key("tag_id", "id");
        let values = vec![("post_id".to_string(), json!(1)), ("tag_id".to_string(), json!(7))];
        let (sql, params) = link_statement(&Postgres, &join_table, &values);
        assert_eq!(
            sql,
            "INSERT INTO \"post_tags\" (\"post_id\", \"tag_id\") SELECT $1, $2 \
             WHERE NOT EXISTS (SELECT 1 FROM \"post_tags\" WHERE \"post_id\" = $3 AND \"tag_id\" = $4)"
        );
        assert_eq!(params, vec![json!(1), json!(7), json!(1), json!(7)]);
    }
}
