use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::key::{canonical_key, key_values, record_key};
use super::{PreloadCondition, PreloadSpec};
use crate::callback::context::{OperationContext, SharedTx};
use crate::database::executor::CancelToken;
use crate::database::record::{Record, Related};
use crate::db::{Database, Query};
use crate::error::OrmError;
use crate::filter::Condition;
use crate::schema::{EntitySchema, Relation, RelationKind};

/// Prefix of the aliased join-table columns selected by many-to-many loads
const JOIN_SOURCE_ALIAS: &str = "__source_";

/// How a parent held its children while a nested segment is loaded.
enum Slot {
    Absent,
    One,
    Many(usize),
}

/// Loads associations for a batch of records with one query per relation and level.
///
/// Queries run on the caller's transaction and honour its cancel token.
pub struct PreloadResolver {
    db: Database,
    cancel: CancelToken,
    tx: Option<SharedTx>,
}

impl PreloadResolver {
    pub fn new(db: Database) -> Self {
        Self { db, cancel: CancelToken::new(), tx: None }
    }

    pub fn from_context(ctx: &OperationContext) -> Self {
        Self { db: ctx.db().clone(), cancel: ctx.cancel.clone(), tx: ctx.transaction() }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attach every spec's relations to `records`.
    ///
    /// A failing spec does not stop its siblings; the first error is returned
    /// once all specs have been tried.
    pub fn preload(&self, schema: &Arc<EntitySchema>, records: &mut [Record], specs: &[PreloadSpec]) -> Result<(), OrmError> {
        let max_depth = self.db.config().preload.max_depth;
        let mut preloaded: HashSet<String> = HashSet::new();
        let mut first_error = None;

        for spec in specs {
            let result = spec
                .segments(max_depth)
                .and_then(|segments| self.preload_path(schema, records, &segments, 0, &spec.conditions, &mut preloaded));
            if let Err(err) = result {
                tracing::warn!("Preload '{}' on {} failed: {}", spec.path, schema.name, err);
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn preload_path(
        &self,
        schema: &Arc<EntitySchema>,
        records: &mut [Record],
        segments: &[&str],
        depth: usize,
        conditions: &[PreloadCondition],
        preloaded: &mut HashSet<String>,
    ) -> Result<(), OrmError> {
        let segment = segments[depth];
        let relation = schema.get_relation(segment).ok_or_else(|| OrmError::UnknownRelation {
            entity: schema.name.clone(),
            relation: segment.to_string(),
        })?;
        let related = self.db.schema(&relation.related)?;

        let prefix = segments[..=depth].join(".");
        if !preloaded.contains(&prefix) {
            let level_conditions: &[PreloadCondition] = if depth + 1 == segments.len() { conditions } else { &[] };
            self.load(relation, &related, records, level_conditions)?;
            preloaded.insert(prefix);
        }

        if depth + 1 == segments.len() {
            return Ok(());
        }

        // Pull the children out so the next level is loaded in one batch
        let mut slots = Vec::with_capacity(records.len());
        let mut children = Vec::new();
        for record in records.iter_mut() {
            match record.take_relation(segment) {
                Some(Related::One(child)) => {
                    slots.push(Slot::One);
                    children.push(*child);
                }
                Some(Related::Many(list)) => {
                    slots.push(Slot::Many(list.len()));
                    children.extend(list);
                }
                None => slots.push(Slot::Absent),
            }
        }

        let result = if children.is_empty() {
            Ok(())
        } else {
            self.preload_path(&related, &mut children, segments, depth + 1, conditions, preloaded)
        };

        let mut children = children.into_iter();
        for (record, slot) in records.iter_mut().zip(slots) {
            match slot {
                Slot::One => {
                    if let Some(child) = children.next() {
                        record.set_relation(segment, Related::One(Box::new(child)));
                    }
                }
                Slot::Many(count) => {
                    record.set_relation(segment, Related::Many(children.by_ref().take(count).collect()));
                }
                Slot::Absent => {}
            }
        }
        result
    }

    fn load(
        &self,
        relation: &Relation,
        related: &Arc<EntitySchema>,
        records: &mut [Record],
        conditions: &[PreloadCondition],
    ) -> Result<(), OrmError> {
        tracing::debug!("Preloading {} ({}) for {} records", relation.name, relation.kind, records.len());
        match relation.kind {
            RelationKind::HasOne | RelationKind::HasMany | RelationKind::BelongsTo => {
                self.load_direct(relation, related, records, conditions)
            }
            RelationKind::ManyToMany => self.load_many_to_many(relation, related, records, conditions),
        }
    }

    /// Distinct owner key tuples, in first-seen order.
    fn owner_keys(records: &[Record], columns: &[String]) -> Vec<Vec<Value>> {
        let mut seen = HashSet::new();
        records
            .iter()
            .filter_map(|record| key_values(record, columns))
            .filter(|values| seen.insert(canonical_key(values)))
            .collect()
    }

    fn related_query(&self, related: &EntitySchema, conditions: &[PreloadCondition]) -> Query {
        let query = self
            .db
            .query(&related.name)
            .auto_preload(false)
            .with_cancel(self.cancel.clone())
            .in_transaction(self.tx.clone());
        conditions.iter().fold(query, |query, condition| condition.apply(query))
    }

    fn load_direct(
        &self,
        relation: &Relation,
        related: &Arc<EntitySchema>,
        records: &mut [Record],
        conditions: &[PreloadCondition],
    ) -> Result<(), OrmError> {
        let owner_columns = relation.owner_key_columns();
        let related_columns = relation.related_key_columns();
        let keys = Self::owner_keys(records, owner_columns);

        let mut matches: HashMap<String, Vec<Record>> = HashMap::new();
        if !keys.is_empty() {
            let mut query = self.related_query(related, conditions).condition(Condition::In {
                columns: related_columns.iter().map(|c| related.qualified(c)).collect(),
                tuples: keys,
            });
            if let Some((column, value)) = relation.polymorphic_filter() {
                query = query.condition(Condition::eq(related.qualified(column), Value::String(value.to_string())));
            }
            for found in query.find()? {
                if let Some(key) = record_key(&found, related_columns) {
                    matches.entry(key).or_default().push(found);
                }
            }
        }

        for record in records.iter_mut() {
            let found = record_key(record, owner_columns).and_then(|key| matches.get(&key));
            match relation.kind {
                RelationKind::HasMany => {
                    record.set_relation(relation.name.clone(), Related::Many(found.cloned().unwrap_or_default()));
                }
                _ => {
                    if let Some(first) = found.and_then(|list| list.first()) {
                        record.set_relation(relation.name.clone(), Related::One(Box::new(first.clone())));
                    }
                }
            }
        }
        Ok(())
    }

    fn load_many_to_many(
        &self,
        relation: &Relation,
        related: &Arc<EntitySchema>,
        records: &mut [Record],
        conditions: &[PreloadCondition],
    ) -> Result<(), OrmError> {
        let join_table = relation
            .join_table
            .as_ref()
            .ok_or_else(|| OrmError::UnsupportedRelation(format!("{} has no join table", relation.name)))?;
        let owner_columns = relation.owner_key_columns();
        let keys = Self::owner_keys(records, owner_columns);

        let mut matches: HashMap<String, Vec<Record>> = HashMap::new();
        if !keys.is_empty() {
            let aliases: Vec<String> =
                join_table.source_keys.iter().map(|k| format!("{}{}", JOIN_SOURCE_ALIAS, k.column)).collect();
            let mut select = vec![format!("{}.*", related.table)];
            select.extend(
                join_table.source_columns().iter().zip(&aliases).map(|(column, alias)| format!("{} AS {}", column, alias)),
            );

            let rows = self
                .related_query(related, conditions)
                .select(select)
                .join(join_table.join_clause(self.db.dialect(), &related.table))
                .condition(Condition::In { columns: join_table.source_columns(), tuples: keys })
                .rows()?;

            for mut row in rows {
                let source: Vec<Value> =
                    aliases.iter().map(|alias| row.remove(alias).unwrap_or(Value::Null)).collect();
                matches.entry(canonical_key(&source)).or_default().push(Record::from_row(row));
            }
        }

        for record in records.iter_mut() {
            if !record.relation_is_empty(&relation.name) {
                continue;
            }
            let found = record_key(record, owner_columns).and_then(|key| matches.get(&key)).cloned();
            record.set_relation(relation.name.clone(), Related::Many(found.unwrap_or_default()));
        }
        Ok(())
    }
}
