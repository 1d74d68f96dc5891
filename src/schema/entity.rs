use std::fmt;
use std::sync::Arc;

use super::field::Field;
use super::relation::Relation;
use crate::callback::hooks::ModelHooks;

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";

/// How a blank primary key is filled on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimaryKeyStrategy {
    /// Generated client-side as a v4 UUID
    Uuid,
    /// Generated by the database and read back
    #[default]
    AutoIncrement,
    /// Supplied by the caller
    Manual,
}

/// Cached description of one entity: table, columns, relations and hooks.
#[derive(Clone)]
pub struct EntitySchema {
    pub name: String,
    pub table: String,
    pub fields: Vec<Field>,
    pub relations: Vec<Relation>,
    pub primary_key_strategy: PrimaryKeyStrategy,
    hooks: Option<Arc<dyn ModelHooks>>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields: vec![],
            relations: vec![],
            primary_key_strategy: PrimaryKeyStrategy::default(),
            hooks: None,
        }
    }

    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    #[must_use]
    pub fn primary_key_strategy(mut self, strategy: PrimaryKeyStrategy) -> Self {
        self.primary_key_strategy = strategy;
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn ModelHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn model_hooks(&self) -> Option<&Arc<dyn ModelHooks>> {
        self.hooks.as_ref()
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }

    pub fn get_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn primary_fields(&self) -> Vec<&Field> {
        self.fields.iter().filter(|f| f.is_primary_key()).collect()
    }

    pub fn primary_key_columns(&self) -> Vec<String> {
        self.primary_fields().into_iter().map(|f| f.name.clone()).collect()
    }

    /// Soft-delete column, when the entity carries one.
    pub fn soft_delete_column(&self) -> Option<&str> {
        self.has_field(DELETED_AT).then_some(DELETED_AT)
    }

    pub fn qualified(&self, column: &str) -> String {
        format!("{}.{}", self.table, column)
    }
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .field("primary_key_strategy", &self.primary_key_strategy)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}
