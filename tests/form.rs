mod common;

use common::{t, Counter};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storelens::form::{ArrayOp, Check};
use storelens::{FieldMeta, Form, FormError, SortBy, Tree};

fn touched() -> FieldMeta {
    FieldMeta {
        touched: true,
        ..FieldMeta::default()
    }
}

#[test]
fn move_and_swap_carry_metadata_with_values() {
    let form = Form::new(t(json!({"tags": ["a", "b", "c"]})));
    form.field("tags[0]").set_meta(touched());
    let tags = form.array("tags");

    tags.move_item(0, 2).unwrap();
    assert_eq!(form.value("tags"), t(json!(["b", "c", "a"])));
    assert!(form.field_meta("tags[2]").touched);
    assert!(!form.field_meta("tags[0]").touched);

    tags.swap(2, 0).unwrap();
    assert_eq!(form.value("tags"), t(json!(["a", "c", "b"])));
    assert!(form.field_meta("tags[0]").touched);
    assert!(!form.field_meta("tags[2]").touched);
}

#[test]
fn move_forward_and_backward() {
    let form = Form::new(t(json!({"list": ["a", "b", "c", "d"]})));
    form.field("list[1]").set_meta(touched());
    form.array("list").move_item(1, 3).unwrap();
    assert_eq!(form.value("list"), t(json!(["a", "c", "d", "b"])));
    assert!(form.field_meta("list[3]").touched);

    let form = Form::new(t(json!({"list": ["a", "b", "c", "d"]})));
    form.field("list[3]").set_meta(touched());
    form.array("list").move_item(3, 1).unwrap();
    assert_eq!(form.value("list"), t(json!(["a", "d", "b", "c"])));
    assert!(form.field_meta("list[1]").touched);
}

#[test]
fn swap_past_the_end_fails() {
    let form = Form::new(t(json!({"list": ["a", "b", "c"]})));
    let err = form.array("list").swap(0, 5).unwrap_err();
    assert!(matches!(err, FormError::Index { index: 5, len: 3 }));
    assert_eq!(form.value("list"), t(json!(["a", "b", "c"])));
}

#[test]
fn out_of_range_indices_change_nothing() {
    let form = Form::new(t(json!({"tags": ["a", "b"]})));
    form.field("tags[1]").set_meta(touched());
    let before = form.snapshot();
    let tags = form.array("tags");

    assert!(matches!(tags.move_item(0, 2), Err(FormError::Index { index: 2, len: 2 })));
    assert!(matches!(tags.swap(5, 0), Err(FormError::Index { index: 5, len: 2 })));
    assert!(matches!(tags.remove_at(2), Err(FormError::Index { .. })));
    assert!(matches!(tags.insert(3, "x"), Err(FormError::Index { index: 3, len: 2 })));

    assert_eq!(form.snapshot(), before);
}

#[test]
fn insert_at_len_appends() {
    let form = Form::new(t(json!({"tags": ["a"]})));
    form.array("tags").insert(1, "b").unwrap();
    assert_eq!(form.value("tags"), t(json!(["a", "b"])));
}

#[test]
fn array_edits_keep_items_aligned() {
    let form = Form::new(t(json!({"tags": ["x"]})));
    let tags = form.array("tags");
    tags.append("y");
    tags.prepend("w");
    tags.append("x");
    assert_eq!(tags.remove(&Tree::from("x")), 2);
    assert_eq!(tags.values(), vec![Tree::from("w"), Tree::from("y")]);
    assert_eq!(tags.shift(), Some(Tree::from("w")));
    assert_eq!(tags.pop(), Some(Tree::from("y")));
    assert_eq!(tags.pop(), None);
    assert!(tags.is_empty());

    let items = form
        .meta()
        .get("fields")
        .and_then(|fields| fields.get("tags"))
        .and_then(|node| node.get("items"))
        .and_then(Tree::as_list)
        .map(<[Tree]>::len);
    assert_eq!(items, Some(0));
    assert!(form.field_meta("tags").dirty);
}

#[test]
fn scalar_value_is_treated_as_a_single_item() {
    let form = Form::new(t(json!({"emails": "a@b.c"})));
    let emails = form.array("emails");
    assert_eq!(emails.len(), 1);
    emails.append("d@e.f");
    assert_eq!(form.value("emails"), t(json!(["a@b.c", "d@e.f"])));
}

#[test]
fn sort_is_stable_and_moves_metadata() {
    let form = Form::new(t(json!({"people": [
        {"name": "b", "age": 30},
        {"name": "a", "age": 40},
        {"name": "c", "age": 30},
    ]})));
    form.field("people[1]").set_meta(touched());
    let people = form.array("people");

    people.sort(&"age:desc".parse::<SortBy>().unwrap());
    let names: Vec<Tree> = people
        .values()
        .iter()
        .map(|p| p.get("name").cloned().unwrap_or_default())
        .collect();
    assert_eq!(names, vec![Tree::from("a"), Tree::from("b"), Tree::from("c")]);
    assert!(form.field_meta("people[0]").touched);

    people.sort(&SortBy::compare(|a: &Tree, b: &Tree| {
        let name = |v: &Tree| v.get("name").and_then(Tree::as_str).map(str::to_string);
        name(b).cmp(&name(a))
    }));
    assert_eq!(
        people.values()[0].get("name"),
        Some(&Tree::from("c"))
    );
    assert!(form.field_meta("people[2]").touched);
}

#[test]
fn apply_dispatches_by_name() {
    let form = Form::new(t(json!({"tags": ["a", "b", "c"]})));
    let tags = form.array("tags");

    tags.apply("move", &[Tree::from(0), Tree::from(2)]).unwrap();
    assert_eq!(form.value("tags"), t(json!(["b", "c", "a"])));
    assert_eq!(tags.apply("removeAt", &[Tree::from(0)]).unwrap(), Tree::from("b"));
    assert_eq!(tags.apply("remove", &[Tree::from("a")]).unwrap(), Tree::from(1));

    assert!(matches!(
        tags.apply("splice", &[]),
        Err(FormError::UnsupportedOperation(name)) if name == "splice"
    ));
    assert!(matches!(
        tags.apply("swap", &[Tree::from(0), Tree::from(-1)]),
        Err(FormError::InvalidArgument { op: ArrayOp::Swap, position: 1 })
    ));
    assert!(matches!(
        tags.apply("sort", &[Tree::from("name:sideways")]),
        Err(FormError::InvalidSort(_))
    ));
    assert_eq!(form.value("tags"), t(json!(["c"])));
}

#[test]
fn error_and_warning_aggregate_across_fields() {
    let form = Form::builder()
        .initial(t(json!({"name": "al", "email": ""})))
        .validator(|cx| {
            cx.error("email", "required");
            cx.warning("name", "too short");
        })
        .build();

    let report = form.validate().report().unwrap();
    assert!(!report.valid);
    assert_eq!(report.error, Some(Tree::from("required")));
    assert_eq!(report.warning, Some(Tree::from("too short")));
}

#[test]
fn form_error_follows_field_declaration_order() {
    let form = Form::builder()
        .initial(t(json!({"name": "", "email": ""})))
        .validator(|cx| {
            cx.error("email", "email required");
            cx.warning("email", "email looks odd");
            cx.error("name", "name required");
        })
        .build();

    let report = form.validate().report().unwrap();
    assert!(!report.valid);
    assert_eq!(report.error, Some(Tree::from("name required")));
    assert_eq!(report.warning, Some(Tree::from("email looks odd")));

    let meta = form.form_meta();
    assert!(!meta.valid);
    assert_eq!(meta.error, report.error);
    assert_eq!(form.field_meta("email").error, Some(Tree::from("email required")));
}

#[test]
fn first_failing_check_per_field_wins() {
    let form = Form::builder()
        .initial(t(json!({"password": "abc"})))
        .validator(|cx| {
            cx.error("password", Check::pass());
            cx.error("password", "too short");
            cx.error("password", "needs a digit");
        })
        .build();
    form.validate();
    assert_eq!(form.field_meta("password").error, Some(Tree::from("too short")));
}

#[test]
fn warnings_do_not_invalidate() {
    let form = Form::builder()
        .initial(t(json!({"nick": "x"})))
        .validator(|cx| cx.warning("nick", "short"))
        .build();
    let report = form.validate().report().unwrap();
    assert!(report.valid);
    assert_eq!(report.warning, Some(Tree::from("short")));
}

#[test]
fn async_check_outside_a_runtime_is_recorded_as_an_error() {
    let form = Form::builder()
        .initial(t(json!({"user": ""})))
        .validator(|cx| cx.error("user", Check::later(async { Tree::Null })))
        .build();
    let report = form.validate().report().unwrap();
    assert!(!report.valid);
    assert!(form.field_meta("user").error.is_some());
}

#[tokio::test]
async fn async_checks_converge_into_one_report() {
    let changes = Counter::default();
    let c = changes.clone();
    let form = Form::builder()
        .initial(t(json!({"user": "ada", "email": "a@b.c"})))
        .validate_on_submit(true)
        .validator(|cx| {
            cx.error(
                "user",
                Check::later(async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Tree::from("taken")
                }),
            );
            cx.error(
                "email",
                Check::later(async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Tree::Null
                }),
            );
        })
        .on_change(move |_| c.hit())
        .build();

    let validation = form.validate();
    assert!(validation.report().is_none());
    assert!(form.form_meta().validating);
    assert!(form.field_meta("user").validating);
    assert!(form.field_meta("email").validating);

    let report = validation.await;
    assert_eq!(report.run, 1);
    assert!(!report.valid);
    assert_eq!(report.error, Some(Tree::from("taken")));

    assert!(!form.form_meta().validating);
    assert!(!form.field_meta("user").validating);
    assert!(!form.field_meta("email").validating);
    assert_eq!(form.field_meta("email").error, None);
    assert_eq!(changes.get(), 1);
}

#[tokio::test]
async fn superseded_run_resolves_with_the_newer_report() {
    let runs = Arc::new(AtomicU64::new(0));
    let r = Arc::clone(&runs);
    let form = Form::builder()
        .initial(t(json!({"user": "ada"})))
        .validate_on_submit(true)
        .validator(move |cx| {
            let stale = r.fetch_add(1, Ordering::SeqCst) == 0;
            cx.error(
                "user",
                Check::later(async move {
                    let delay = if stale { 40 } else { 5 };
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    if stale {
                        Tree::from("stale")
                    } else {
                        Tree::Null
                    }
                }),
            );
        })
        .build();

    let first = form.validate();
    let second = form.validate();
    assert_eq!((first.run(), second.run()), (1, 2));

    let report = first.await;
    assert_eq!(report.run, 2);
    assert!(report.valid);
    assert_eq!(second.await, report);

    // Let the stale check finish; its result must be discarded.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(form.field_meta("user").error, None);
    assert!(form.form_meta().valid);
}

#[tokio::test]
async fn reset_supersedes_pending_validation() {
    let form = Form::builder()
        .initial(t(json!({"user": ""})))
        .validate_on_submit(true)
        .validator(|cx| {
            cx.error(
                "user",
                Check::later(async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Tree::from("required")
                }),
            );
        })
        .build();

    let validation = form.validate();
    form.set_value("user", "ada");
    form.reset();

    let report = validation.await;
    assert!(report.valid);
    assert_eq!(report.run, 2);
    assert_eq!(form.value("user"), Tree::from(""));
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(form.field_meta("user"), FieldMeta::default());
}

#[tokio::test]
async fn submit_rejects_until_async_checks_pass() {
    let form = Form::builder()
        .initial(t(json!({"code": "1"})))
        .validator(|cx| {
            let code = cx.value("code");
            cx.error(
                "code",
                Check::later(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    if code == Tree::from("42") {
                        Tree::Null
                    } else {
                        Tree::from("wrong code")
                    }
                }),
            );
        })
        .build();

    assert!(matches!(
        form.submit().await,
        Err(FormError::Invalid(reason)) if reason == Tree::from("wrong code")
    ));

    form.set_value("code", "42");
    assert_eq!(form.submit().await.unwrap(), t(json!({"code": "42"})));
}
