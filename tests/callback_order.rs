mod common;

use anyhow::Result;
use serde_json::{json, Value};

use ormchain::callback::{CallbackChain, Callbacks, ChainKind, OperationContext, Target};
use ormchain::testing::MockExecutor;
use ormchain::OrmError;

fn noop(_: &mut OperationContext) -> Result<(), OrmError> {
    Ok(())
}

fn order(chain: &CallbackChain) -> Vec<String> {
    chain.resolved_names().unwrap_or_default()
}

/// Step that appends `mark` to the `trace` scratch array
fn trace(mark: &'static str) -> impl Fn(&mut OperationContext) -> Result<(), OrmError> + Send + Sync + 'static {
    move |ctx| {
        let mut marks = ctx.get("trace").and_then(Value::as_array).cloned().unwrap_or_default();
        marks.push(json!(mark));
        ctx.set("trace", Value::Array(marks));
        Ok(())
    }
}

fn traced(ctx: &OperationContext) -> Vec<String> {
    ctx.get("trace")
        .and_then(Value::as_array)
        .map(|marks| marks.iter().filter_map(|m| m.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[test]
fn plain_registration_keeps_order() {
    let mut chain = CallbackChain::new("create");
    chain
        .register("before_create1", noop)
        .register("before_create2", noop)
        .register("create", noop)
        .register("after_create1", noop)
        .register("after_create2", noop);

    assert_eq!(order(&chain), vec!["before_create1", "before_create2", "create", "after_create1", "after_create2"]);
}

#[test]
fn before_places_entry_ahead_of_earlier_anchor() {
    let mut chain = CallbackChain::new("create");
    chain.register("before_create1", noop).register("create", noop).register("after_create1", noop);
    chain.before("after_create1").register("after_create2", noop);

    assert_eq!(order(&chain), vec!["before_create1", "create", "after_create2", "after_create1"]);
}

#[test]
fn constraints_resolve_across_forward_references() {
    let mut chain = CallbackChain::new("update");
    chain.register("create", noop);
    chain.before("create").register("before_create1", noop);
    chain.after("after_create2").register("after_create1", noop);
    chain.before("before_create1").register("before_create2", noop);
    chain.register("after_create2", noop);

    assert_eq!(order(&chain), vec!["before_create2", "before_create1", "create", "after_create2", "after_create1"]);
}

#[test]
fn combined_before_and_after_on_one_entry() {
    let mut chain = CallbackChain::new("create");
    chain.before("after_create1").after("before_create1").register("create", noop);
    chain.register("before_create1", noop);
    chain.register("after_create1", noop);
    assert_eq!(order(&chain), vec!["before_create1", "create", "after_create1"]);

    let mut chain = CallbackChain::new("create");
    chain.before("after_create1").after("before_create1").register("create", noop);
    chain.before("create").register("before_create1", noop);
    chain.after("before_create1").register("before_create2", noop);
    chain.register("after_create1", noop);
    chain.after("after_create1").register("after_create2", noop);
    assert_eq!(order(&chain), vec!["before_create1", "before_create2", "create", "after_create1", "after_create2"]);
}

#[test]
fn every_constraint_holds_in_interleaved_chain() {
    let mut chain = CallbackChain::new("query");
    chain.register("load", noop);
    chain.after("load").before("finish").register("decorate", noop);
    chain.before("load").register("authorize", noop);
    chain.register("finish", noop);
    chain.after("authorize").before("load").register("audit", noop);
    chain.after("decorate").register("cache", noop);

    let resolved = order(&chain);
    assert_eq!(resolved.len(), 6);
    let position = |name: &str| resolved.iter().position(|n| n == name).unwrap_or(usize::MAX);
    let constraints = [
        ("load", "decorate"),
        ("decorate", "finish"),
        ("authorize", "load"),
        ("authorize", "audit"),
        ("audit", "load"),
        ("decorate", "cache"),
    ];
    for (first, second) in constraints {
        assert!(position(first) < position(second), "{} should run before {}: {:?}", first, second, resolved);
    }
}

#[test]
fn replace_keeps_position_and_remove_drops_constraints() {
    let mut chain = CallbackChain::new("create");
    chain.before("after_create1").after("before_create1").register("create", noop);
    chain.register("before_create1", noop);
    chain.register("after_create1", noop);

    chain.replace("create", noop);
    assert_eq!(order(&chain), vec!["before_create1", "create", "after_create1"]);
    let entry = chain.entry("create").map(|e| (e.before.clone(), e.after.clone()));
    assert_eq!(entry, Some((vec!["after_create1".to_string()], vec!["before_create1".to_string()])));

    chain.remove("create");
    assert_eq!(order(&chain), vec!["before_create1", "after_create1"]);
    chain.remove("missing");
    assert_eq!(chain.len(), 2);
}

#[test]
fn removing_an_anchor_leaves_no_dangling_constraint() {
    let mut chain = CallbackChain::new("delete");
    chain.register("a", noop).register("b", noop);
    chain.before("b").after("a").register("c", noop);
    chain.remove("b");

    assert_eq!(order(&chain), vec!["a", "c"]);
    assert!(chain.entry("c").map(|e| e.before.is_empty()).unwrap_or(false));
}

#[test]
fn cyclic_constraints_fail_resolution() {
    let mut chain = CallbackChain::new("create");
    chain.register("x", noop);
    chain.before("b").register("a", noop);
    chain.before("a").register("b", noop);

    let err = chain.resolve().map(|steps| steps.len()).unwrap_err();
    assert!(err.is_configuration());
    assert!(matches!(err, OrmError::CallbackCycle { .. }));

    let mut callbacks = Callbacks::empty();
    callbacks.query().before("b").register("a", noop);
    callbacks.query().before("a").register("b", noop);
    assert!(callbacks.validate().is_err());
}

#[test]
fn replaced_step_runs_in_original_slot() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let mut callbacks = Callbacks::empty();
    callbacks.create().register("first", trace("first")).register("middle", trace("middle")).register("last", trace("last"));
    callbacks.create().replace("middle", trace("replaced"));
    callbacks.create().replace("unknown", trace("never"));

    let mut ctx = OperationContext::new(ChainKind::Create, db.clone(), db.schema("users")?, Target::None);
    callbacks.execute(ChainKind::Create, &mut ctx)?;
    assert_eq!(traced(&ctx), vec!["first", "replaced", "last"]);
    Ok(())
}

#[test]
fn skip_left_only_runs_always_steps() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let mut callbacks = Callbacks::empty();
    callbacks
        .update()
        .register("first", trace("first"))
        .register("stop", |ctx: &mut OperationContext| {
            ctx.skip_left();
            Ok(())
        })
        .register("skipped", trace("skipped"))
        .always()
        .register("cleanup", trace("cleanup"));

    let mut ctx = OperationContext::new(ChainKind::Update, db.clone(), db.schema("users")?, Target::None);
    callbacks.execute(ChainKind::Update, &mut ctx)?;
    assert_eq!(traced(&ctx), vec!["first", "cleanup"]);
    assert!(!ctx.has_error());
    Ok(())
}

#[test]
fn first_error_wins_and_chain_keeps_running() -> Result<()> {
    let mock = MockExecutor::new();
    let db = common::database(&mock)?;

    let mut callbacks = Callbacks::empty();
    callbacks
        .delete()
        .register("fails", |_: &mut OperationContext| Err(OrmError::validation("first")))
        .register("fails_again", |_: &mut OperationContext| Err(OrmError::validation("second")))
        .register("still_runs", trace("still_runs"));

    let mut ctx = OperationContext::new(ChainKind::Delete, db.clone(), db.schema("users")?, Target::None);
    callbacks.execute(ChainKind::Delete, &mut ctx)?;
    assert_eq!(traced(&ctx), vec!["still_runs"]);
    assert!(matches!(ctx.error(), Some(OrmError::Validation(message)) if message == "first"));
    Ok(())
}
