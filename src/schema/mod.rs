pub mod entity;
pub mod field;
pub mod registry;
pub mod relation;

pub use entity::{EntitySchema, PrimaryKeyStrategy, CREATED_AT, DELETED_AT, UPDATED_AT};
pub use field::{Field, FieldOptions};
pub use registry::SchemaRegistry;
pub use relation::{JoinKey, JoinTable, Relation, RelationKind, RelationOptions};
