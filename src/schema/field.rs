use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column options recognised by the persistence steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldOptions {
    pub primary_key: bool,
    pub not_null: bool,
    pub unique: bool,
    pub size: Option<u32>,
    /// Database-side default. A blank value for such a column is left out of INSERT
    /// and read back afterwards.
    pub default: Option<Value>,
    pub auto_increment: bool,
    /// Present on the record but never written to the table
    pub ignored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub options: FieldOptions,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), options: FieldOptions::default() }
    }

    /// Shorthand for a primary key column.
    pub fn primary_key(name: impl Into<String>) -> Self {
        Self::new(name).with_primary_key()
    }

    #[must_use]
    pub fn with_primary_key(mut self) -> Self {
        self.options.primary_key = true;
        self
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.options.not_null = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.options.unique = true;
        self
    }

    #[must_use]
    pub fn size(mut self, size: u32) -> Self {
        self.options.size = Some(size);
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.options.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.options.auto_increment = true;
        self
    }

    #[must_use]
    pub fn ignored(mut self) -> Self {
        self.options.ignored = true;
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.options.primary_key
    }

    /// Database fills the column when it is left out of an insert.
    /// An auto-increment primary key is read back through the insert itself.
    pub fn has_default_value(&self) -> bool {
        self.options.default.is_some() || (self.options.auto_increment && !self.options.primary_key)
    }

    pub fn is_changeable(&self) -> bool {
        !self.options.ignored
    }
}
