#![allow(dead_code)]

use bson::{Bson, doc};
use docmodel::{memory::InMemoryStore, prelude::*};

pub fn post_schema() -> Schema {
    Schema::builder()
        .field("title", SchemaType::String)
        .field("votes", SchemaType::Number)
        .field("date", SchemaType::Date)
        .array("tags", SchemaType::String)
        .nested("meta", |meta| meta.field("published", SchemaType::Boolean))
        .documents("comments", |comment| {
            comment
                .field("author", SchemaType::String)
                .field("stars", SchemaType::Number)
        })
        .scope("popular", Scope::conditions(doc! { "votes": { "$gte": 10 } }))
        .scope("top", Scope::block(|query| query.desc(&["votes"]).limit(2)))
        .scope(
            "tagged",
            Scope::fixed(1, |query, args| query.where_path("tags").eq(args[0].clone())),
        )
        .scope(
            "any_of",
            Scope::variadic(|query, args| query.where_path("title").in_values(args.to_vec())),
        )
        .build()
        .expect("post schema compiles")
}

/// An open connection over a fresh in-memory store with a `posts` model.
pub async fn blog() -> (InMemoryStore, Connection, Model) {
    let store = InMemoryStore::new();
    let connection = Connection::new(store.clone(), ConnectionOptions::default());
    let posts = connection.model("posts", post_schema());
    connection.open().await.expect("in-memory store opens");

    (store, connection, posts)
}

/// Saves one post per `(title, votes)` pair.
pub async fn seed(posts: &Model, rows: &[(&str, i32)]) {
    for (title, votes) in rows {
        posts
            .create(doc! { "title": *title, "votes": *votes })
            .expect("seed post casts")
            .save()
            .await
            .expect("seed post saves");
    }
}

pub fn titles(instances: &[Instance]) -> Vec<String> {
    instances
        .iter()
        .filter_map(|post| match post.get("title") {
            Some(Bson::String(title)) => Some(title),
            _ => None,
        })
        .collect()
}
