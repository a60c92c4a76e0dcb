//! GitHub client tests against a mock HTTP server.

use ciboss_remote::{GithubClient, GithubConfig, RemoteError, RepoRef};
use httpmock::prelude::*;
use serde_json::json;

fn client(server: &MockServer) -> GithubClient {
    GithubClient::new(GithubConfig::new("test-token").with_api_base(&server.base_url()))
        .expect("github client")
}

fn repo() -> RepoRef {
    RepoRef::parse("acme/widgets").expect("repo")
}

#[tokio::test]
async fn test_pull_request_head_sha() {
    let server = MockServer::start();
    let pr = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widgets/pulls/42")
            .header("authorization", "Bearer test-token")
            .header("x-github-api-version", "2022-11-28");
        then.status(200).json_body(json!({
            "number": 42,
            "title": "Add gizmo",
            "head": { "sha": "abc123def456" }
        }));
    });

    let pull = client(&server).pull_request(&repo(), 42).await.expect("pull");
    pr.assert();
    assert_eq!(pull.head.sha, "abc123def456");
    assert_eq!(pull.title, "Add gizmo");
}

#[tokio::test]
async fn test_pull_request_files_paginates() {
    let server = MockServer::start();
    let first_page: Vec<_> = (0..100)
        .map(|i| json!({ "filename": format!("src/file_{i}.rs") }))
        .collect();
    let page_one = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widgets/pulls/7/files")
            .query_param("page", "1");
        then.status(200).json_body(json!(first_page));
    });
    let page_two = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widgets/pulls/7/files")
            .query_param("page", "2");
        then.status(200)
            .json_body(json!([{ "filename": "README.md" }]));
    });

    let files = client(&server)
        .pull_request_files(&repo(), 7)
        .await
        .expect("files");
    page_one.assert();
    page_two.assert();
    assert_eq!(files.len(), 101);
    assert_eq!(files.last().map(String::as_str), Some("README.md"));
}

#[tokio::test]
async fn test_commit_details() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/repos/acme/widgets/commits/abc123");
        then.status(200).json_body(json!({
            "sha": "abc123",
            "commit": { "message": "Update readme" },
            "files": [{ "filename": "README.md" }]
        }));
    });

    let commit = client(&server).commit(&repo(), "abc123").await.expect("commit");
    assert_eq!(commit.commit.message, "Update readme");
    assert_eq!(commit.files[0].filename, "README.md");
}

#[tokio::test]
async fn test_comment_posts_body() {
    let server = MockServer::start();
    let comment = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/acme/widgets/issues/42/comments")
            .body_includes("CI Boss Report");
        then.status(201).json_body(json!({
            "id": 901,
            "html_url": "https://example.test/comment/901"
        }));
    });

    let created = client(&server)
        .create_issue_comment(&repo(), 42, "## CI Boss Report")
        .await
        .expect("comment");
    comment.assert();
    assert_eq!(created.id, 901);
}

#[tokio::test]
async fn test_commit_comment_posts_body() {
    let server = MockServer::start();
    let comment = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/acme/widgets/commits/abc123/comments")
            .body_includes("Tests Passed");
        then.status(201).json_body(json!({ "id": 77, "html_url": null }));
    });

    client(&server)
        .create_commit_comment(&repo(), "abc123", "Tests Passed")
        .await
        .expect("comment");
    comment.assert();
}

#[tokio::test]
async fn test_error_status_is_single_attempt() {
    let server = MockServer::start();
    let failing = server.mock(|when, then| {
        when.method(GET).path("/repos/acme/widgets/pulls/9");
        then.status(502).body("bad gateway");
    });

    let err = client(&server)
        .pull_request(&repo(), 9)
        .await
        .expect_err("should fail");
    failing.assert_hits(1);
    assert!(matches!(err, RemoteError::Status { status: 502, .. }));
}
