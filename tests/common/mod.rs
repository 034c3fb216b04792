#![allow(dead_code)]

use serde_json::{json, Value};

use kyrostore::{Model, Schema, Store};

pub fn schema() -> Schema {
    Schema::new()
        .with_model("country", Model::new().attribute("name"))
        .with_model(
            "group",
            Model::new()
                .attribute("name")
                .has_many("members", "user", Some("groups")),
        )
        .with_model(
            "post",
            Model::new()
                .attribute("message")
                .belongs_to("author", "user", Some("posts")),
        )
        .with_model(
            "username",
            Model::new().belongs_to("user", "user", Some("username")),
        )
        .with_model(
            "user",
            Model::new()
                .attribute("name")
                .has_many("blockedUsers", "user", None)
                .belongs_to("country", "country", None)
                .has_many("groups", "group", Some("members"))
                .has_many("posts", "post", Some("author"))
                .belongs_to("username", "username", Some("user"))
                .normalize_with(|mut record| {
                    if record.get("country").and_then(Value::as_str) == Some("m0naco") {
                        record.insert("country".to_string(), json!("monaco"));
                    }
                    record
                }),
        )
}

pub fn store() -> Store {
    Store::new(schema()).unwrap()
}

/// Populates the store record by record, relationships as bare ids.
pub fn seed(store: &Store) {
    store
        .set(
            "user",
            &[
                json!({
                    "id": "user_a",
                    "name": "User A",
                    "blockedUsers": ["user_b"],
                    "country": "monaco",
                    "groups": ["group_a"],
                    "posts": ["post_a"],
                    "username": "username_a"
                }),
                json!({
                    "id": "user_b",
                    "name": "User B",
                    "blockedUsers": [],
                    "country": null,
                    "groups": [],
                    "posts": [],
                    "username": null
                }),
            ],
        )
        .unwrap();
    store.set("country", &[json!({ "id": "monaco", "name": "Monaco" })]).unwrap();
    store
        .set("group", &[json!({ "id": "group_a", "name": "Group A", "members": ["user_a"] })])
        .unwrap();
    store
        .set("post", &[json!({ "id": "post_a", "message": "Post A", "author": "user_a" })])
        .unwrap();
    store.set("username", &[json!({ "id": "username_a", "user": "user_a" })]).unwrap();
}

/// `user_a` as a fetch collaborator would return it, related records embedded.
pub fn user_a_embedded() -> Value {
    json!({
        "id": "user_a",
        "name": "User A",
        "blockedUsers": [user_b_view()],
        "country": { "id": "monaco", "name": "Monaco" },
        "groups": [{ "id": "group_a", "name": "Group A" }],
        "posts": [{ "id": "post_a", "message": "Post A" }],
        "username": { "id": "username_a", "user": "user_a" }
    })
}

pub fn user_b_view() -> Value {
    json!({
        "id": "user_b",
        "name": "User B",
        "blockedUsers": [],
        "country": null,
        "groups": [],
        "posts": [],
        "username": null
    })
}

/// `user_a` two levels down, where its own relations are expanded one last
/// time and theirs degrade to stubs.
fn user_a_nested() -> Value {
    json!({
        "id": "user_a",
        "name": "User A",
        "blockedUsers": [user_b_view()],
        "country": { "id": "monaco", "name": "Monaco" },
        "groups": [{ "id": "group_a", "name": "Group A", "members": [{ "id": "user_a" }] }],
        "posts": [{ "id": "post_a", "message": "Post A", "author": { "id": "user_a" } }],
        "username": { "id": "username_a", "user": { "id": "user_a" } }
    })
}

pub fn user_a_view() -> Value {
    json!({
        "id": "user_a",
        "name": "User A",
        "blockedUsers": [user_b_view()],
        "country": { "id": "monaco", "name": "Monaco" },
        "groups": [{ "id": "group_a", "name": "Group A", "members": [user_a_nested()] }],
        "posts": [{ "id": "post_a", "message": "Post A", "author": user_a_nested() }],
        "username": { "id": "username_a", "user": user_a_nested() }
    })
}
