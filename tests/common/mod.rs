#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use ormchain::config::OrmConfig;
use ormchain::dialect::{Oracle, Sqlite};
use ormchain::schema::{EntitySchema, Field, JoinTable, Relation};
use ormchain::testing::MockExecutor;
use ormchain::{Database, ModelHooks, OrmError, Record};

/// Hook implementation that records every call, optionally failing one hook.
#[derive(Default)]
pub struct HookLog {
    pub calls: Mutex<Vec<String>>,
    pub fail_on: Option<&'static str>,
}

impl HookLog {
    pub fn failing(hook: &'static str) -> Self {
        Self { calls: Mutex::new(vec![]), fail_on: Some(hook) }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn log(&self, hook: &'static str) -> Result<(), OrmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(hook.to_string());
        }
        if self.fail_on == Some(hook) {
            return Err(OrmError::hook(hook, "rejected"));
        }
        Ok(())
    }
}

impl ModelHooks for HookLog {
    fn before_save(&self, _record: &mut Record) -> Result<(), OrmError> {
        self.log("before_save")
    }

    fn before_create(&self, _record: &mut Record) -> Result<(), OrmError> {
        self.log("before_create")
    }

    fn after_create(&self, _record: &mut Record) -> Result<(), OrmError> {
        self.log("after_create")
    }

    fn after_save(&self, _record: &mut Record) -> Result<(), OrmError> {
        self.log("after_save")
    }

    fn before_update(&self, _record: &mut Record) -> Result<(), OrmError> {
        self.log("before_update")
    }

    fn after_update(&self, _record: &mut Record) -> Result<(), OrmError> {
        self.log("after_update")
    }

    fn before_delete(&self, _record: &mut Record) -> Result<(), OrmError> {
        self.log("before_delete")
    }

    fn after_delete(&self, _record: &mut Record) -> Result<(), OrmError> {
        self.log("after_delete")
    }

    fn after_find(&self, record: &mut Record) -> Result<(), OrmError> {
        record.set("found", true);
        self.log("after_find")
    }
}

pub fn users() -> EntitySchema {
    EntitySchema::new("users", "users")
        .field(Field::primary_key("id").auto_increment())
        .field(Field::new("name"))
        .field(Field::new("age").default_value(18))
        .field(Field::new("company_id"))
        .field(Field::new("created_at"))
        .field(Field::new("updated_at"))
        .field(Field::new("deleted_at"))
        .relation(Relation::has_many("Posts", "posts", "user_id", "id"))
        .relation(Relation::has_one("Profile", "profiles", "user_id", "id").preload(true))
        .relation(Relation::belongs_to("Company", "companies", "company_id", "id"))
}

pub fn posts() -> EntitySchema {
    EntitySchema::new("posts", "posts")
        .field(Field::primary_key("id").auto_increment())
        .field(Field::new("user_id"))
        .field(Field::new("title"))
        .relation(Relation::belongs_to("Author", "users", "user_id", "id"))
        .relation(Relation::has_many("Comments", "comments", "post_id", "id"))
        .relation(Relation::has_many("Attachments", "attachments", "owner_id", "id").polymorphic("owner_type", "posts"))
        .relation(Relation::many_to_many(
            "Tags",
            "tags",
            JoinTable::new("post_tags").source_key("post_id", "id").destination_key("tag_id", "id"),
        ))
}

pub fn comments() -> EntitySchema {
    EntitySchema::new("comments", "comments")
        .field(Field::primary_key("id").auto_increment())
        .field(Field::new("post_id"))
        .field(Field::new("body"))
        .field(Field::new("approved"))
}

pub fn attachments() -> EntitySchema {
    EntitySchema::new("attachments", "attachments")
        .field(Field::primary_key("id").auto_increment())
        .field(Field::new("owner_id"))
        .field(Field::new("owner_type"))
}

pub fn tags() -> EntitySchema {
    EntitySchema::new("tags", "tags").field(Field::primary_key("id").auto_increment()).field(Field::new("name"))
}

pub fn profiles() -> EntitySchema {
    EntitySchema::new("profiles", "profiles")
        .field(Field::primary_key("id").auto_increment())
        .field(Field::new("user_id"))
        .field(Field::new("bio"))
}

pub fn companies() -> EntitySchema {
    EntitySchema::new("companies", "companies").field(Field::primary_key("id").auto_increment()).field(Field::new("name"))
}

/// Stores share offers by region: several owners can hold the same key.
pub fn stores() -> EntitySchema {
    EntitySchema::new("stores", "stores")
        .field(Field::primary_key("id"))
        .field(Field::new("region"))
        .relation(Relation::has_many("Offers", "offers", "region", "region"))
}

pub fn offers() -> EntitySchema {
    EntitySchema::new("offers", "offers").field(Field::primary_key("id")).field(Field::new("region"))
}

/// Shipments own lines through the composite (warehouse_id, region) key.
pub fn shipments() -> EntitySchema {
    let key = || vec!["warehouse_id".to_string(), "region".to_string()];
    EntitySchema::new("shipments", "shipments")
        .field(Field::primary_key("id"))
        .field(Field::new("warehouse_id"))
        .field(Field::new("region"))
        .relation(Relation::has_many("Lines", "shipment_lines", "warehouse_id", "warehouse_id").keys(key(), key()))
}

pub fn shipment_lines() -> EntitySchema {
    EntitySchema::new("shipment_lines", "shipment_lines")
        .field(Field::primary_key("id"))
        .field(Field::new("warehouse_id"))
        .field(Field::new("region"))
        .field(Field::new("sku"))
}

pub fn dev_config() -> OrmConfig {
    let mut config = OrmConfig::development();
    config.database.enable_slow_query_warning = false;
    config
}

/// Database over `mock` with every test entity; `users` carries `hooks` when given.
pub fn database_with(mock: &MockExecutor, config: OrmConfig, hooks: Option<Arc<HookLog>>) -> Result<Database> {
    let users = match hooks {
        Some(hooks) => users().hooks(hooks),
        None => users(),
    };
    let db = Database::builder(Arc::new(mock.clone()))
        .config(config)
        .entity(users)?
        .entity(posts())?
        .entity(comments())?
        .entity(attachments())?
        .entity(tags())?
        .entity(profiles())?
        .entity(companies())?
        .entity(stores())?
        .entity(offers())?
        .entity(shipments())?
        .entity(shipment_lines())?
        .build()?;
    Ok(db)
}

pub fn database(mock: &MockExecutor) -> Result<Database> {
    database_with(mock, dev_config(), None)
}

pub fn sqlite_database(mock: &MockExecutor) -> Result<Database> {
    let db = Database::builder(Arc::new(mock.clone()))
        .dialect(Sqlite)
        .config(dev_config())
        .entity(users())?
        .entity(posts())?
        .entity(comments())?
        .entity(attachments())?
        .entity(tags())?
        .entity(profiles())?
        .entity(companies())?
        .build()?;
    Ok(db)
}

pub fn oracle_database(mock: &MockExecutor) -> Result<Database> {
    let db = Database::builder(Arc::new(mock.clone()))
        .dialect(Oracle)
        .config(dev_config())
        .entity(users())?
        .entity(posts())?
        .entity(comments())?
        .entity(attachments())?
        .entity(tags())?
        .entity(profiles())?
        .entity(companies())?
        .build()?;
    Ok(db)
}

pub fn record(value: serde_json::Value) -> Record {
    Record::from_json(value).unwrap_or_default()
}

/// A record as if loaded from the database
pub fn loaded(value: serde_json::Value) -> Record {
    Record::from_row(value.as_object().cloned().unwrap_or_default())
}
