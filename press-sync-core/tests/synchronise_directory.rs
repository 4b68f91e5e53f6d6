use std::fs;
use std::sync::{Arc, Mutex};

use press_sync_core::contract::MockTransport;
use press_sync_core::posts::UpsertAction;
use press_sync_core::synchronise::synchronise_directory;
use press_sync_core::{WordPressApi, WpError};
use serde_json::{json, Value};
use tempfile::tempdir;

const HELLO: &str = "---
title: Hello
categories: News
tags: [Rust, rust, Async]
preprocess: leading_spaces
date: 2021-03-04
---
  indented line
";

#[tokio::test]
async fn directory_of_markdown_becomes_posts() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("hello-world.md"), HELLO).unwrap();
    fs::write(dir.path().join("Second.MD"), "Plain *body*.\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let mut transport = MockTransport::new();
    transport
        .expect_get()
        .withf(|endpoint, _| endpoint == "wp/v2/categories")
        .times(1)
        .returning(|_, _| Ok(json!([{"id": 1, "name": "news"}])));
    transport
        .expect_get()
        .withf(|endpoint, _| endpoint == "wp/v2/tags")
        .times(1)
        .returning(|_, _| Ok(json!([{"id": 2, "name": "Rust"}])));
    transport
        .expect_get()
        .withf(|endpoint, _| endpoint == "wp/v2/posts")
        .times(10)
        .returning(|_, _| Ok(json!([])));

    let bodies: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&bodies);
    transport
        .expect_post_json()
        .returning(move |endpoint, body| match endpoint {
            "wp/v2/tags" => {
                assert_eq!(body["name"], "Async");
                Ok(json!({"id": 3, "name": "Async"}))
            }
            "wp/v2/posts" => {
                let mut saved = body.clone();
                let mut posts = seen.lock().unwrap();
                posts.push(body.clone());
                saved["id"] = json!(100 + posts.len());
                Ok(saved)
            }
            other => panic!("unexpected POST to {other}"),
        });

    let api = WordPressApi::new(transport);
    let report = synchronise_directory(dir.path(), &api).await.unwrap();

    let slugs: Vec<&str> = report.posts.iter().map(|p| p.slug.as_str()).collect();
    assert_eq!(slugs, vec!["Second", "hello-world"]);
    assert_eq!(report.created(), 2);
    assert_eq!(report.updated(), 0);
    assert_eq!(report.posts[1].id, Some(102));
    assert!(report.posts.iter().all(|p| p.action == UpsertAction::Created));

    let bodies = bodies.lock().unwrap();
    let second = &bodies[0];
    assert_eq!(second["status"], "publish");
    assert!(second["content"].as_str().unwrap().contains("<em>body</em>"));
    assert!(second.get("categories").is_none());

    let hello = &bodies[1];
    assert_eq!(hello["slug"], "hello-world");
    assert_eq!(hello["title"], "Hello");
    assert_eq!(hello["date"], "2021-03-04T00:00:00");
    assert_eq!(hello["modified"], "2021-03-04T00:00:00");
    assert_eq!(hello["categories"], json!([1]));
    assert_eq!(hello["tags"], json!([2, 3]));
    assert!(hello.get("preprocess").is_none());
    assert!(hello["content"]
        .as_str()
        .unwrap()
        .contains("\u{a0}\u{a0}indented line"));
}

#[tokio::test]
async fn explicit_slug_and_status_win() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("draft.md"),
        "---\nslug: custom\nstatus: draft\nmodified: 2022-01-01T10:00:00\ndate: 2021-12-31T09:00:00\n---\nText\n",
    )
    .unwrap();

    let mut transport = MockTransport::new();
    transport
        .expect_get()
        .times(1)
        .returning(|_, _| Ok(json!([{"id": 5, "slug": "custom"}])));
    transport
        .expect_post_json()
        .withf(|endpoint, body| {
            endpoint == "wp/v2/posts/5"
                && body["slug"] == "custom"
                && body["status"] == "draft"
                && body["date"] == "2021-12-31T09:00:00"
                && body["modified"] == "2022-01-01T10:00:00"
        })
        .times(1)
        .returning(|_, body| Ok(body.clone()));

    let api = WordPressApi::new(transport);
    let report = synchronise_directory(dir.path(), &api).await.unwrap();
    assert_eq!(report.updated(), 1);
    assert_eq!(report.posts[0].slug, "custom");
}

#[tokio::test]
async fn unknown_preprocessor_aborts_before_upsert() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("a.md"),
        "---\ndate: 2021-01-01\npreprocess: leading_spaces, smartypants\n---\nbody\n",
    )
    .unwrap();

    let mut transport = MockTransport::new();
    transport.expect_get().times(0);
    transport.expect_post_json().times(0);

    let api = WordPressApi::new(transport);
    match synchronise_directory(dir.path(), &api).await {
        Err(WpError::UnknownPreprocessor(name)) => assert_eq!(name, "smartypants"),
        other => panic!("expected UnknownPreprocessor, got {other:?}"),
    }
}

#[tokio::test]
async fn first_failure_stops_the_run() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.md"), "---\ndate: not a date\n---\n").unwrap();
    fs::write(dir.path().join("b.md"), "---\ndate: 2021-01-01\n---\n").unwrap();

    let mut transport = MockTransport::new();
    transport.expect_get().times(0);
    transport.expect_post_json().times(0);

    let api = WordPressApi::new(transport);
    assert!(matches!(
        synchronise_directory(dir.path(), &api).await,
        Err(WpError::Format(_))
    ));
}

#[tokio::test]
async fn empty_directory_reports_nothing() {
    let dir = tempdir().unwrap();
    let transport = MockTransport::new();
    let api = WordPressApi::new(transport);
    let report = synchronise_directory(dir.path(), &api).await.unwrap();
    assert!(report.posts.is_empty());
}
