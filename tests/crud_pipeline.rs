mod common;

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Map, Value};

use common::HookLog;
use ormchain::testing::{MockExecutor, TxCounts};
use ormchain::{CancelToken, OrmError, OrmResult, Related, Session};

fn attrs(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

// ========================================
// Create
// ========================================

#[test]
fn create_inserts_in_transaction_and_reloads_defaults() -> Result<()> {
    let mock = MockExecutor::new();
    mock.on_query("SELECT \"age\"", vec![json!({"age": 18})]);
    let db = common::database(&mock)?;

    let mut user = common::record(json!({"name": "ann"}));
    db.create("users", &mut user)?;

    let statements = mock.statements();
    assert_eq!(statements.len(), 2, "unexpected statements: {:?}", mock.sql_log());
    assert!(statements[0].sql.starts_with("INSERT INTO \"users\" (\"name\""), "got {}", statements[0].sql);
    assert!(statements[0].sql.ends_with("RETURNING \"id\""), "got {}", statements[0].sql);
    assert!(!statements[0].sql.contains("\"age\""));
    assert_eq!(statements[1].sql, "SELECT \"age\" FROM \"users\" WHERE \"id\" = $1");
    assert_eq!(statements[1].params, vec![json!(1)]);
    assert!(statements.iter().all(|s| s.in_transaction));

    assert_eq!(user.get("id"), Some(&json!(1)));
    assert_eq!(user.get("age"), Some(&json!(18)));
    assert!(user.timestamp("created_at").is_some());
    assert!(user.timestamp("updated_at").is_some());
    assert!(!user.is_new_record());
    assert_eq!(mock.transactions(), TxCounts { begun: 1, committed: 1, rolled_back: 0 });
    Ok(())
}

#[test]
fn create_runs_hooks_in_order() -> Result<()> {
    let mock = MockExecutor::new();
    let hooks = Arc::new(HookLog::default());
    let db = common::database_with(&mock, common::dev_config(), Some(hooks.clone()))?;

    let mut user = common::record(json!({"name": "ann", "age": 30}));
    db.create("users", &mut user)?;

    assert_eq!(hooks.calls(), vec!["before_save", "before_create", "after_create", "after_save"]);
    Ok(())
}

#[test]
fn failing_hook_rolls_back_without_insert() -> Result<()> {
    let mock = MockExecutor::new();
    let hooks = Arc::new(HookLog::failing("before_create"));
    let db = common::database_with(&mock, common::dev_config(), Some(hooks.clone()))?;

    let mut user = common::record(json!({"name": "ann"}));
    let err = db.create("users", &mut user).unwrap_err();

    assert!(matches!(err, OrmError::Hook { hook: "before_create", .. }));
    assert_eq!(mock.count_prefix("INSERT"), 0);
    assert_eq!(mock.transactions(), TxCounts { begun: 1, committed: 0, rolled_back: 1 });
    assert_eq!(hooks.calls(), vec!["before_save", "before_create"]);
    assert_eq!(user.get("name"), Some(&json!("ann")));
    Ok(())
}

#[test]
fn sqlite_takes_id_from_last_insert() -> Result<()> {
    let mock = MockExecutor::new();
    mock.on_query("SELECT \"age\"", vec![json!({"age": 18})]);
    let db = common::sqlite_database(&mock)?;

    let mut user = common::record(json!({"name": "ann"}));
    db.create("users", &mut user)?;

    let log = mock.sql_log();
    assert!(log[0].starts_with("INSERT INTO \"users\""));
    assert!(!log[0].contains("RETURNING"));
    assert!(log[0].contains("?"));
    assert_eq!(log[1], "SELECT \"age\" FROM \"users\" WHERE \"id\" = ?");
    assert_eq!(user.get("id"), Some(&json!(1)));
    Ok(())
}

// ========================================
// Associations
// ========================================

#[test]
fn belongs_to_is_saved_first_and_keyed_onto_owner() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let mut post = common::record(json!({"title": "hello"}));
    post.set_relation("Author", Related::One(Box::new(common::record(json!({"name": "ann"})))));
    db.create("posts", &mut post)?;

    let statements = mock.statements();
    assert!(statements[0].sql.starts_with("INSERT INTO \"users\""), "got {:?}", mock.sql_log());
    let insert_post = statements
        .iter()
        .find(|s| s.sql.starts_with("INSERT INTO \"posts\""))
        .map(|s| (s.sql.clone(), s.params.clone()));
    assert_eq!(
        insert_post,
        Some((
            "INSERT INTO \"posts\" (\"user_id\", \"title\") VALUES ($1, $2) RETURNING \"id\"".to_string(),
            vec![json!(1), json!("hello")]
        ))
    );
    assert_eq!(post.get("user_id"), Some(&json!(1)));
    assert_eq!(post.get("id"), Some(&json!(2)));
    assert!(matches!(post.relation("Author"), Some(Related::One(author)) if author.get("id") == Some(&json!(1))));
    assert_eq!(mock.transactions(), TxCounts { begun: 1, committed: 1, rolled_back: 0 });
    Ok(())
}

#[test]
fn has_many_children_receive_owner_key() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let mut user = common::record(json!({"name": "ann", "age": 30}));
    user.set_relation(
        "Posts",
        Related::Many(vec![common::record(json!({"title": "a"})), common::record(json!({"title": "b"}))]),
    );
    db.create("users", &mut user)?;

    assert_eq!(mock.count_prefix("INSERT INTO \"posts\""), 2);
    let Some(Related::Many(posts)) = user.relation("Posts") else {
        panic!("posts were not restored onto the owner");
    };
    assert!(posts.iter().all(|p| p.get("user_id") == Some(&json!(1))));
    assert_eq!(posts[0].get("id"), Some(&json!(2)));
    assert_eq!(posts[1].get("id"), Some(&json!(3)));
    assert!(mock.statements().iter().all(|s| s.in_transaction));
    assert_eq!(mock.transactions().begun, 1);
    Ok(())
}

#[test]
fn many_to_many_writes_link_rows() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let mut post = common::record(json!({"title": "hello"}));
    post.set_relation("Tags", Related::Many(vec![common::record(json!({"name": "rust"}))]));
    db.create("posts", &mut post)?;

    let link = mock
        .statements()
        .into_iter()
        .find(|s| s.sql.starts_with("INSERT INTO \"post_tags\""))
        .ok_or_else(|| anyhow::anyhow!("no link statement in {:?}", mock.sql_log()))?;
    assert_eq!(
        link.sql,
        "INSERT INTO \"post_tags\" (\"post_id\", \"tag_id\") SELECT $1, $2 WHERE NOT EXISTS \
         (SELECT 1 FROM \"post_tags\" WHERE \"post_id\" = $3 AND \"tag_id\" = $4)"
    );
    assert_eq!(link.params, vec![json!(1), json!(2), json!(1), json!(2)]);
    Ok(())
}

// ========================================
// Update
// ========================================

#[test]
fn update_writes_changed_attributes_and_timestamp() -> Result<()> {
    let mock = MockExecutor::new();
    let hooks = Arc::new(HookLog::default());
    let db = common::database_with(&mock, common::dev_config(), Some(hooks.clone()))?;

    let mut user = common::loaded(json!({"id": 5, "name": "old"}));
    let affected = db.update("users", &mut user, attrs(json!({"name": "new", "bogus": 1})))?;

    assert_eq!(affected, 1);
    let statements = mock.statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0].sql,
        "UPDATE \"users\" SET \"name\" = $1, \"updated_at\" = $2 WHERE \"users\".\"deleted_at\" IS NULL AND \"users\".\"id\" = $3"
    );
    assert_eq!(statements[0].params[0], json!("new"));
    assert_eq!(statements[0].params[2], json!(5));
    assert_eq!(user.get("name"), Some(&json!("new")));
    assert!(user.timestamp("updated_at").is_some());
    assert_eq!(hooks.calls(), vec!["before_save", "before_update", "after_update", "after_save"]);
    Ok(())
}

#[test]
fn unchanged_update_is_skipped_entirely() -> Result<()> {
    let mock = MockExecutor::new();
    let hooks = Arc::new(HookLog::default());
    let db = common::database_with(&mock, common::dev_config(), Some(hooks.clone()))?;

    let mut user = common::loaded(json!({"id": 5, "name": "same"}));
    let affected = db.update("users", &mut user, attrs(json!({"name": "same"})))?;

    assert_eq!(affected, 0);
    assert!(mock.statements().is_empty());
    assert_eq!(mock.transactions(), TxCounts::default());
    assert!(hooks.calls().is_empty());
    Ok(())
}

#[test]
fn update_columns_skips_hooks_and_timestamp() -> Result<()> {
    let mock = MockExecutor::new();
    let hooks = Arc::new(HookLog::default());
    let db = common::database_with(&mock, common::dev_config(), Some(hooks.clone()))?;

    let mut user = common::loaded(json!({"id": 5, "name": "old"}));
    db.update_columns("users", &mut user, attrs(json!({"name": "new"})))?;

    assert_eq!(
        mock.sql_log(),
        vec!["UPDATE \"users\" SET \"name\" = $1 WHERE \"users\".\"deleted_at\" IS NULL AND \"users\".\"id\" = $2"]
    );
    assert!(hooks.calls().is_empty());
    assert!(user.get("updated_at").is_none());
    Ok(())
}

#[test]
fn failed_before_update_leaves_timestamp_untouched() -> Result<()> {
    let mock = MockExecutor::new();
    let hooks = Arc::new(HookLog::failing("before_update"));
    let db = common::database_with(&mock, common::dev_config(), Some(hooks.clone()))?;

    let stamp = json!("2020-01-01T00:00:00+00:00");
    let mut user = common::loaded(json!({"id": 5, "name": "old", "updated_at": stamp.clone()}));
    let err = db.update("users", &mut user, attrs(json!({"name": "new"}))).unwrap_err();

    assert!(matches!(err, OrmError::Hook { hook: "before_update", .. }));
    assert!(mock.statements().is_empty());
    assert_eq!(user.get("updated_at"), Some(&stamp));
    assert_eq!(mock.transactions(), TxCounts { begun: 1, committed: 0, rolled_back: 1 });
    Ok(())
}

#[test]
fn save_of_loaded_record_writes_every_column() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let mut user = common::loaded(json!({"id": 5, "name": "ann"}));
    db.save("users", &mut user)?;

    let log = mock.sql_log();
    assert_eq!(log.len(), 1);
    assert!(log[0].starts_with("UPDATE \"users\" SET \"name\" = $1, \"age\" = $2"), "got {}", log[0]);
    assert!(log[0].ends_with("WHERE \"users\".\"deleted_at\" IS NULL AND \"users\".\"id\" = $7"), "got {}", log[0]);
    Ok(())
}

#[test]
fn global_update_is_blocked_when_configured() -> Result<()> {
    let mock = MockExecutor::new();
    let mut config = common::dev_config();
    config.callbacks.block_global_update = true;
    let db = common::database_with(&mock, config, None)?;

    let err = db.query("users").update(attrs(json!({"name": "everyone"}))).unwrap_err();

    assert!(matches!(err, OrmError::MissingWhereClause { operation: "updating" }));
    assert!(mock.statements().is_empty());
    assert_eq!(mock.transactions(), TxCounts { begun: 1, committed: 0, rolled_back: 1 });
    Ok(())
}

// ========================================
// Delete
// ========================================

#[test]
fn delete_is_soft_when_entity_has_deleted_at() -> Result<()> {
    let mock = MockExecutor::new();
    let hooks = Arc::new(HookLog::default());
    let db = common::database_with(&mock, common::dev_config(), Some(hooks.clone()))?;

    let mut user = common::loaded(json!({"id": 5}));
    let affected = db.delete("users", &mut user)?;

    assert_eq!(affected, 1);
    let statements = mock.statements();
    assert_eq!(
        statements[0].sql,
        "UPDATE \"users\" SET \"deleted_at\" = $1 WHERE \"users\".\"deleted_at\" IS NULL AND \"users\".\"id\" = $2"
    );
    assert_eq!(statements[0].params[1], json!(5));
    assert!(user.timestamp("deleted_at").is_some());
    assert_eq!(hooks.calls(), vec!["before_delete", "after_delete"]);
    Ok(())
}

#[test]
fn failed_soft_delete_leaves_record_live() -> Result<()> {
    let mock = MockExecutor::new();
    mock.fail_on("UPDATE \"users\"", "connection reset");
    let db = common::database(&mock)?;

    let mut user = common::loaded(json!({"id": 5}));
    let err = db.delete("users", &mut user).unwrap_err();

    assert!(matches!(err, OrmError::Database(_)), "unexpected error: {}", err);
    assert_eq!(mock.count_prefix("UPDATE"), 1);
    assert!(user.get("deleted_at").is_none());
    assert_eq!(mock.transactions(), TxCounts { begun: 1, committed: 0, rolled_back: 1 });
    Ok(())
}

#[test]
fn unscoped_delete_removes_rows() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let affected = db.query("users").unscoped().where_json(json!({"name": "gone"})).delete()?;

    assert_eq!(affected, 1);
    let statements = mock.statements();
    assert_eq!(statements[0].sql, "DELETE FROM \"users\" WHERE \"name\" = $1");
    assert_eq!(statements[0].params, vec![json!("gone")]);
    Ok(())
}

#[test]
fn hard_delete_without_soft_delete_column() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let mut post = common::loaded(json!({"id": 10}));
    db.delete("posts", &mut post)?;

    assert_eq!(mock.sql_log(), vec!["DELETE FROM \"posts\" WHERE \"posts\".\"id\" = $1"]);
    Ok(())
}

#[test]
fn global_delete_is_blocked_when_configured() -> Result<()> {
    let mock = MockExecutor::new();
    let mut config = common::dev_config();
    config.callbacks.block_global_update = true;
    let db = common::database_with(&mock, config, None)?;

    let err = db.query("users").delete().unwrap_err();

    assert!(matches!(err, OrmError::MissingWhereClause { operation: "deleting" }));
    assert!(mock.statements().is_empty());
    assert_eq!(mock.transactions(), TxCounts { begun: 1, committed: 0, rolled_back: 1 });
    Ok(())
}

// ========================================
// Query
// ========================================

#[test]
fn first_orders_by_key_and_reports_not_found() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let err = db.query("users").where_json(json!({"name": "zed"})).first().unwrap_err();

    assert!(ormchain::is_record_not_found(&err));
    assert_eq!(
        mock.sql_log(),
        vec![
            "SELECT * FROM \"users\" WHERE \"users\".\"deleted_at\" IS NULL AND \"name\" = $1 ORDER BY \"users\".\"id\" ASC LIMIT 1"
        ]
    );
    Ok(())
}

#[test]
fn oracle_first_caps_rows_with_rownum() -> Result<()> {
    let mock = MockExecutor::new();
    mock.on_query("FROM \"users\"", vec![json!({"id": 3, "name": "zed"})]);
    let db = common::oracle_database(&mock)?;

    let user = db.query("users").where_json(json!({"name": "zed"})).first()?;

    assert_eq!(user.get("id"), Some(&json!(3)));
    assert_eq!(
        mock.sql_log(),
        vec![
            "SELECT * FROM \"users\" WHERE \"users\".\"deleted_at\" IS NULL AND \"name\" = :1 AND ROWNUM <= 1 ORDER BY \"users\".\"id\" ASC"
        ]
    );
    Ok(())
}

#[test]
fn find_with_no_rows_is_empty_not_an_error() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let users = db.query("users").find()?;
    assert!(users.is_empty());
    Ok(())
}

#[test]
fn after_find_runs_for_every_loaded_record() -> Result<()> {
    let mock = MockExecutor::new();
    mock.with_table("users", vec![json!({"id": 1}), json!({"id": 2})]);
    let hooks = Arc::new(HookLog::default());
    let db = common::database_with(&mock, common::dev_config(), Some(hooks.clone()))?;

    let users = db.query("users").find()?;

    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u.get("found") == Some(&json!(true))));
    assert_eq!(hooks.calls(), vec!["after_find", "after_find"]);
    Ok(())
}

#[test]
fn rows_returns_raw_columns() -> Result<()> {
    let mock = MockExecutor::new();
    mock.with_table("users", vec![json!({"id": 1, "name": "ann"})]);
    let db = common::database(&mock)?;

    let rows = db.query("users").select(["id", "name"]).limit(10).offset(20).rows()?;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&json!("ann")));
    assert_eq!(
        mock.sql_log(),
        vec!["SELECT \"id\", \"name\" FROM \"users\" WHERE \"users\".\"deleted_at\" IS NULL LIMIT 10 OFFSET 20"]
    );
    Ok(())
}

// ========================================
// Sessions
// ========================================

#[test]
fn explicit_transaction_rolls_back_on_error() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let result: OrmResult<()> = db.transaction(|session| {
        let mut user = common::record(json!({"name": "ann", "age": 30}));
        db.create_with("users", &mut user, session)?;
        Err(OrmError::validation("abort"))
    });

    assert!(matches!(result, Err(OrmError::Validation(_))));
    assert_eq!(mock.count_prefix("INSERT"), 1);
    assert!(mock.statements().iter().all(|s| s.in_transaction));
    assert_eq!(mock.transactions(), TxCounts { begun: 1, committed: 0, rolled_back: 1 });
    Ok(())
}

#[test]
fn explicit_transaction_commits_once() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let ids = db.transaction(|session| {
        let mut first = common::record(json!({"name": "ann", "age": 30}));
        let mut second = common::record(json!({"name": "bob", "age": 40}));
        db.create_with("users", &mut first, session)?;
        db.create_with("users", &mut second, session)?;
        Ok((first.get("id").cloned(), second.get("id").cloned()))
    })?;

    assert_eq!(ids, (Some(json!(1)), Some(json!(2))));
    assert_eq!(mock.transactions(), TxCounts { begun: 1, committed: 1, rolled_back: 0 });
    Ok(())
}

#[test]
fn cancelled_session_stops_create() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let cancel = CancelToken::new();
    cancel.cancel();
    let mut user = common::record(json!({"name": "ann"}));
    let err = db.create_with("users", &mut user, &Session::new().with_cancel(cancel)).unwrap_err();

    assert!(matches!(err, OrmError::Cancelled));
    assert!(mock.statements().is_empty());
    assert_eq!(mock.transactions().committed, 0);
    Ok(())
}
