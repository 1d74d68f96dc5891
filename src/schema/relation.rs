use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::record::Record;
use crate::dialect::Dialect;
use crate::filter::quote_column;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Related row holds the foreign key; at most one match
    HasOne,
    /// Related rows hold the foreign key
    HasMany,
    /// Owner row holds the foreign key
    BelongsTo,
    /// Rows are linked through a join table
    ManyToMany,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::HasOne => "has_one",
            RelationKind::HasMany => "has_many",
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::ManyToMany => "many_to_many",
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::ManyToMany)
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One join-table column and the entity column it mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKey {
    pub column: String,
    pub owner_column: String,
}

impl JoinKey {
    pub fn new(column: impl Into<String>, owner_column: impl Into<String>) -> Self {
        Self { column: column.into(), owner_column: owner_column.into() }
    }
}

/// Association table of a many-to-many relation.
///
/// `source_keys` point at the owning entity, `destination_keys` at the related one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTable {
    pub table: String,
    pub source_keys: Vec<JoinKey>,
    pub destination_keys: Vec<JoinKey>,
}

impl JoinTable {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into(), source_keys: vec![], destination_keys: vec![] }
    }

    #[must_use]
    pub fn source_key(mut self, column: impl Into<String>, owner_column: impl Into<String>) -> Self {
        self.source_keys.push(JoinKey::new(column, owner_column));
        self
    }

    #[must_use]
    pub fn destination_key(mut self, column: impl Into<String>, owner_column: impl Into<String>) -> Self {
        self.destination_keys.push(JoinKey::new(column, owner_column));
        self
    }

    /// Join-table source columns qualified with the table name.
    pub fn source_columns(&self) -> Vec<String> {
        self.source_keys.iter().map(|k| format!("{}.{}", self.table, k.column)).collect()
    }

    /// `INNER JOIN <join table> ON <join table>.<dest col> = <destination table>.<col> AND ...`
    pub fn join_clause(&self, dialect: &dyn Dialect, destination_table: &str) -> String {
        let on = self
            .destination_keys
            .iter()
            .map(|k| {
                format!(
                    "{} = {}",
                    quote_column(dialect, &format!("{}.{}", self.table, k.column)),
                    quote_column(dialect, &format!("{}.{}", destination_table, k.owner_column)),
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        format!("INNER JOIN {} ON {}", dialect.quote(&self.table), on)
    }

    /// Column/value pairs of the link row between `source` and `destination`.
    pub fn link_values(&self, source: &Record, destination: &Record) -> Vec<(String, Value)> {
        let source_pairs = self
            .source_keys
            .iter()
            .map(|k| (k.column.clone(), source.get(&k.owner_column).cloned().unwrap_or(Value::Null)));
        let destination_pairs = self
            .destination_keys
            .iter()
            .map(|k| (k.column.clone(), destination.get(&k.owner_column).cloned().unwrap_or(Value::Null)));
        source_pairs.chain(destination_pairs).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationOptions {
    /// Load automatically when auto preload is enabled
    pub preload: bool,
    /// Persist related records together with the owner
    pub save_associations: bool,
}

impl Default for RelationOptions {
    fn default() -> Self {
        Self { preload: false, save_associations: true }
    }
}

/// How one entity reaches another.
///
/// `foreign_keys[i]` pairs with `association_foreign_keys[i]`:
///
/// | kind | `foreign_keys` live on | `association_foreign_keys` live on |
/// |---|---|---|
/// | has_one / has_many | related | owner |
/// | belongs_to | owner | related |
/// | many_to_many | owner (via join source keys) | related (via join destination keys) |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    pub related: String,
    pub foreign_keys: Vec<String>,
    pub association_foreign_keys: Vec<String>,
    /// Discriminator column on the related table
    pub polymorphic_type: Option<String>,
    /// Value stored in the discriminator column for this owner
    pub polymorphic_value: Option<String>,
    pub join_table: Option<JoinTable>,
    pub options: RelationOptions,
}

impl Relation {
    fn new(name: impl Into<String>, kind: RelationKind, related: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            related: related.into(),
            foreign_keys: vec![],
            association_foreign_keys: vec![],
            polymorphic_type: None,
            polymorphic_value: None,
            join_table: None,
            options: RelationOptions::default(),
        }
    }

    /// `foreign_key` on the related table references `owner_key` on the owner.
    pub fn has_one(
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
        owner_key: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::HasOne, related).keys(vec![foreign_key.into()], vec![owner_key.into()])
    }

    pub fn has_many(
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
        owner_key: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::HasMany, related).keys(vec![foreign_key.into()], vec![owner_key.into()])
    }

    /// `foreign_key` on the owner references `related_key` on the related table.
    pub fn belongs_to(
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
        related_key: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::BelongsTo, related).keys(vec![foreign_key.into()], vec![related_key.into()])
    }

    pub fn many_to_many(name: impl Into<String>, related: impl Into<String>, join_table: JoinTable) -> Self {
        let foreign_keys = join_table.source_keys.iter().map(|k| k.owner_column.clone()).collect();
        let association_foreign_keys = join_table.destination_keys.iter().map(|k| k.owner_column.clone()).collect();
        let mut relation = Self::new(name, RelationKind::ManyToMany, related).keys(foreign_keys, association_foreign_keys);
        relation.join_table = Some(join_table);
        relation
    }

    /// Replace the key columns, e.g. for composite keys.
    #[must_use]
    pub fn keys(mut self, foreign_keys: Vec<String>, association_foreign_keys: Vec<String>) -> Self {
        self.foreign_keys = foreign_keys;
        self.association_foreign_keys = association_foreign_keys;
        self
    }

    #[must_use]
    pub fn polymorphic(mut self, type_column: impl Into<String>, value: impl Into<String>) -> Self {
        self.polymorphic_type = Some(type_column.into());
        self.polymorphic_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn preload(mut self, value: bool) -> Self {
        self.options.preload = value;
        self
    }

    #[must_use]
    pub fn save_associations(mut self, value: bool) -> Self {
        self.options.save_associations = value;
        self
    }

    /// Columns on the owner whose values select related rows.
    pub fn owner_key_columns(&self) -> &[String] {
        match self.kind {
            RelationKind::HasOne | RelationKind::HasMany => &self.association_foreign_keys,
            RelationKind::BelongsTo | RelationKind::ManyToMany => &self.foreign_keys,
        }
    }

    /// Columns on the related table matched against the owner key.
    pub fn related_key_columns(&self) -> &[String] {
        match self.kind {
            RelationKind::HasOne | RelationKind::HasMany => &self.foreign_keys,
            RelationKind::BelongsTo | RelationKind::ManyToMany => &self.association_foreign_keys,
        }
    }

    pub fn polymorphic_filter(&self) -> Option<(&str, &str)> {
        match (&self.polymorphic_type, &self.polymorphic_value) {
            (Some(column), Some(value)) => Some((column.as_str(), value.as_str())),
            _ => None,
        }
    }

    /// Structural problems that make the relation unusable.
    pub fn validate(&self) -> Result<(), String> {
        if self.foreign_keys.is_empty() {
            return Err(format!("relation {} has no foreign keys", self.name));
        }
        if self.foreign_keys.len() != self.association_foreign_keys.len() {
            return Err(format!(
                "relation {} pairs {} foreign keys with {} association keys",
                self.name,
                self.foreign_keys.len(),
                self.association_foreign_keys.len()
            ));
        }
        match (&self.kind, &self.join_table) {
            (RelationKind::ManyToMany, None) => Err(format!("relation {} needs a join table", self.name)),
            (RelationKind::ManyToMany, Some(jt)) if jt.source_keys.is_empty() || jt.destination_keys.is_empty() => {
                Err(format!("join table {} needs source and destination keys", jt.table))
            }
            _ => Ok(()),
        }
    }
}
