mod common;

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use kyrostore::{MutationOptions, Operation, Store};

use common::store;

/// Records what a subscriber can observe at the moment it is notified.
fn observe(store: &Arc<Store>) -> Arc<Mutex<Vec<Vec<String>>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let reader = Arc::downgrade(store);
    store.subscribe(move || {
        if let Some(store) = reader.upgrade() {
            let ids = store
                .get_all("user")
                .unwrap()
                .iter()
                .filter_map(|view| view["id"].as_str().map(str::to_string))
                .collect();
            sink.lock().unwrap().push(ids);
        }
    });
    seen
}

fn queue_four(store: &Store) -> kyrostore::Batch<'_> {
    let mut batch = store.batch();
    batch
        .set("user", vec![json!({ "id": "user_a", "name": "A" }), json!({ "id": "user_b" })])
        .add("user", json!({ "id": "user_c", "posts": ["post_a"] }))
        .update("user", "user_a", json!({ "name": "Updated" }))
        .delete("user", "user_b");
    batch
}

#[test]
fn default_commit_notifies_once_after_everything_lands() {
    let store = Arc::new(store());
    let seen = observe(&store);

    queue_four(&store).commit(None).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![vec!["user_a".to_string(), "user_c".to_string()]]);
    assert_eq!(store.peek("user", "user_a").unwrap().unwrap()["name"], "Updated");
    assert_eq!(store.peek("post", "post_a").unwrap().unwrap()["author"], "user_c");
}

#[test]
fn default_commit_emits_only_the_last_event() {
    let store = store();
    let stream = store.watch();

    queue_four(&store).commit(None).unwrap();

    let event = stream.try_recv().unwrap().unwrap();
    assert_eq!(event.operation, Operation::Delete);
    assert_eq!(event.ids, vec!["user_b".to_string()]);
    assert!(stream.try_recv().unwrap().is_none());
}

#[test]
fn explicit_background_commit_is_silent() {
    let store = Arc::new(store());
    let seen = observe(&store);

    queue_four(&store).commit(Some(MutationOptions::background())).unwrap();

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(store.len("user").unwrap(), 2);
}

#[test]
fn explicit_foreground_commit_notifies_per_operation() {
    let store = Arc::new(store());
    let seen = observe(&store);

    queue_four(&store).commit(Some(MutationOptions::foreground())).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0], vec!["user_a".to_string(), "user_b".to_string()]);
}

#[test]
fn operations_replay_in_queue_order() {
    let store = store();
    let mut batch = store.batch();
    batch
        .add("post", json!({ "id": "p1", "message": "first" }))
        .update("post", "p1", json!({ "message": "second" }))
        .delete("post", "p1")
        .add("post", json!({ "id": "p1", "message": "third" }));

    batch.commit(None).unwrap();

    assert_eq!(
        store.peek("post", "p1").unwrap().map(Value::Object),
        Some(json!({ "id": "p1", "message": "third", "author": null }))
    );
}
