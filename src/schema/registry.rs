use std::collections::HashMap;
use std::sync::Arc;

use super::entity::EntitySchema;
use crate::error::OrmError;

/// Entity schemas keyed by entity name, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: HashMap<String, Arc<EntitySchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entity after checking its relations are well formed.
    pub fn register(&mut self, schema: EntitySchema) -> Result<Arc<EntitySchema>, OrmError> {
        for relation in &schema.relations {
            relation
                .validate()
                .map_err(|message| OrmError::validation(format!("{}: {}", schema.name, message)))?;
        }
        let schema = Arc::new(schema);
        tracing::debug!("Registered entity {} ({} relations)", schema.name, schema.relations.len());
        self.entities.insert(schema.name.clone(), schema.clone());
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Result<Arc<EntitySchema>, OrmError> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownEntity(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Relation};

    #[test]
    fn unknown_entity_is_a_configuration_error() {
        let registry = SchemaRegistry::new();
        let err = registry.get("ghost").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn register_rejects_unpaired_keys() {
        let mut registry = SchemaRegistry::new();
        let schema = EntitySchema::new("user", "users").field(Field::primary_key("id")).relation(
            Relation::has_many("Posts", "post", "user_id", "id").keys(vec!["user_id".into()], vec![]),
        );
        assert!(matches!(registry.register(schema), Err(OrmError::Validation(_))));
        assert!(!registry.contains("user"));
    }
}
