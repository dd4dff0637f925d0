mod common;

use common::{eventually, t, temp_storage, Counter};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use storelens::store::{CombinedReducer, Reducer};
use storelens::{
    lens, ActionOptions, AutoSaveOptions, Intent, MemoryStorage, Storage, Store, StoreError, Tree,
};

#[test]
fn merge_is_shallow_and_keeps_identity_when_nothing_changes() {
    let store = Store::new(t(json!({"user": {"name": "ada"}, "theme": "dark"})));
    store.merge(t(json!({"theme": "light"})));
    assert_eq!(
        store.get_state(),
        t(json!({"user": {"name": "ada"}, "theme": "light"}))
    );

    let before = store.get_state();
    let version = store.version();
    store.merge(t(json!({"theme": "light"})));
    assert!(Tree::same(&before, &store.get_state()));
    assert_eq!(store.version(), version);
}

#[test]
fn untouched_branches_are_shared_after_a_write() {
    let store = Store::new(t(json!({"a": {"x": 1}, "b": {"y": [1, 2]}})));
    let before = store.get_state();
    store.dispatch(Intent::write("edit", "a.x", Tree::from(2)));
    let after = store.get_state();

    assert!(Tree::same(before.get("b").unwrap(), after.get("b").unwrap()));
    assert!(!Tree::same(before.get("a").unwrap(), after.get("a").unwrap()));
    assert_eq!(lens::get(&after, "a.x"), Some(&Tree::from(2)));
}

#[test]
fn subscribers_stop_after_the_subscription_drops() {
    let store = Store::new(Tree::map());
    let hits = Counter::default();
    let h = hits.clone();
    let subscription = store.subscribe(move |_| h.hit());

    store.merge(t(json!({"a": 1})));
    assert_eq!(hits.get(), 1);

    subscription.unsubscribe();
    store.merge(t(json!({"a": 2})));
    assert_eq!(hits.get(), 1);
}

#[test]
fn custom_intents_reach_the_combined_reducer() {
    let todos = |state: &Tree, intent: &Intent| -> Tree {
        if intent.kind != "todos/add" {
            return state.clone();
        }
        let mut items = state.as_list().map(<[Tree]>::to_vec).unwrap_or_default();
        items.push(intent.payload.clone());
        Tree::from_list(items)
    };
    let store = Store::builder()
        .initial(t(json!({"todos": [], "filter": "all"})))
        .reducer(CombinedReducer::new().with("todos", todos))
        .build()
        .unwrap();
    let filter_before = store.get_state();

    store.dispatch(Intent::new("todos/add", "write tests"));
    store.dispatch(Intent::new("unrelated", Tree::Null));

    assert_eq!(
        store.get_state(),
        t(json!({"todos": ["write tests"], "filter": "all"}))
    );
    assert!(Tree::same(
        filter_before.get("filter").unwrap(),
        store.get_state().get("filter").unwrap()
    ));
}

#[test]
fn set_reducer_replaces_the_custom_reducer() {
    struct Reset;
    impl Reducer for Reset {
        fn reduce(&self, state: &Tree, intent: &Intent) -> Tree {
            match intent.kind.as_str() {
                "reset" => Tree::map(),
                _ => state.clone(),
            }
        }
    }

    let store = Store::new(t(json!({"a": 1})));
    store.dispatch(Intent::new("reset", Tree::Null));
    assert_eq!(store.get_state(), t(json!({"a": 1})));

    store.set_reducer(Reset);
    store.dispatch(Intent::new("reset", Tree::Null));
    assert_eq!(store.get_state(), Tree::map());
}

#[test]
fn restore_reads_the_persisted_blob() {
    let storage = Arc::new(MemoryStorage::with_entry("appState", r#"{"count": 7}"#));
    let store = Store::builder()
        .storage(storage)
        .restore("appState", t(json!({"count": 0})))
        .build()
        .unwrap();
    assert_eq!(store.get_state(), t(json!({"count": 7})));
}

#[test]
fn restore_falls_back_to_default() {
    let store = Store::builder()
        .storage(Arc::new(MemoryStorage::with_entry("appState", "null")))
        .restore("appState", t(json!({"count": 0})))
        .build()
        .unwrap();
    assert_eq!(store.get_state(), t(json!({"count": 0})));

    let store = Store::builder()
        .restore("missing", t(json!({"count": 1})))
        .build()
        .unwrap();
    assert_eq!(store.get_state(), t(json!({"count": 1})));
}

#[test]
fn restore_rejects_corrupt_blobs() {
    let err = Store::builder()
        .storage(Arc::new(MemoryStorage::with_entry("appState", "{not json")))
        .restore("appState", Tree::map())
        .build()
        .unwrap_err();
    assert!(matches!(err, StoreError::Parse { key, .. } if key == "appState"));
}

#[test]
fn save_now_requires_autosave() {
    let store = Store::new(Tree::map());
    assert!(matches!(store.save_now(), Err(StoreError::AutoSaveDisabled)));
}

#[test]
fn file_storage_round_trips_through_restore() {
    let (_dir, storage) = temp_storage();
    {
        let store = Store::builder()
            .storage(storage.clone())
            .restore("session", Tree::map())
            .build()
            .unwrap();
        store.setter("user.name", ActionOptions::default());
        store.invoke("user.name", &[Tree::from("ada")]).unwrap();
        store.save_now().unwrap();
    }

    let text = storage.get("session").unwrap().unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&text).unwrap(),
        json!({"user": {"name": "ada"}})
    );

    let restored = Store::builder()
        .storage(storage)
        .restore("session", Tree::map())
        .build()
        .unwrap();
    assert_eq!(restored.get_state(), t(json!({"user": {"name": "ada"}})));
}

#[test]
fn file_storage_rejects_path_like_keys() {
    let (_dir, storage) = temp_storage();
    assert!(storage.set("../escape", "{}").is_err());
    assert!(storage.get("").is_err());
}

#[tokio::test]
async fn autosave_writes_the_last_state_after_the_debounce() {
    let (_dir, storage) = temp_storage();
    let store = Store::builder()
        .storage(storage.clone())
        .autosave(AutoSaveOptions::key("draft").with_debounce(Duration::from_millis(20)))
        .build()
        .unwrap();

    for n in 0..5 {
        store.merge(t(json!({ "n": n })));
    }

    eventually(|| {
        storage
            .get("draft")
            .ok()
            .flatten()
            .is_some_and(|text| text.contains("4"))
    })
    .await;
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&storage.get("draft").unwrap().unwrap())
            .unwrap(),
        json!({"n": 4})
    );
    assert!(store.last_autosave_error().is_none());
}

#[test]
fn dropping_the_store_flushes_a_pending_save() {
    let (_dir, storage) = temp_storage();
    {
        let store = Store::builder()
            .storage(storage.clone())
            .autosave(AutoSaveOptions::key("draft").with_debounce(Duration::from_secs(60)))
            .build()
            .unwrap();
        store.merge(t(json!({"saved": true})));
    }
    let text = storage.get("draft").unwrap().unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&text).unwrap(),
        json!({"saved": true})
    );
}
