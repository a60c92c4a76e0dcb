//! Full runs with the real GitHub and Linear clients against mock servers.

use std::collections::HashMap;
use std::sync::Arc;

use ciboss_core::fakes::ScriptedTestExecutor;
use ciboss_core::{CiBossConfig, OrchestratorBuilder, RunInput, RunState, TestStatus};
use httpmock::prelude::*;
use serde_json::json;

fn config(github: &MockServer, linear: &MockServer) -> CiBossConfig {
    let vars: HashMap<&str, String> = HashMap::from([
        ("GITHUB_TOKEN", "gh-token".to_string()),
        ("GITHUB_API_URL", github.base_url()),
        ("LINEAR_API_KEY", "lin-key".to_string()),
        ("LINEAR_TEAM_ID", "team-1".to_string()),
        ("LINEAR_LABEL_ID_BUG", "label-bug".to_string()),
        ("LINEAR_API_URL", linear.url("/graphql")),
    ]);
    CiBossConfig::from_lookup(|key| vars.get(key).cloned()).expect("config")
}

#[tokio::test]
async fn test_failed_pr_run_creates_issue_and_comments() {
    let github = MockServer::start();
    let linear = MockServer::start();

    let pr = github.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widgets/pulls/42")
            .header("authorization", "Bearer gh-token");
        then.status(200).json_body(json!({
            "number": 42,
            "title": "Checkout flow",
            "head": { "sha": "0123456789abcdef" }
        }));
    });
    github.mock(|when, then| {
        when.method(GET).path("/repos/acme/widgets/pulls/42/files");
        then.status(200)
            .json_body(json!([{ "filename": "web/checkout.ts" }]));
    });
    github.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widgets/commits/0123456789abcdef");
        then.status(200).json_body(json!({
            "sha": "0123456789abcdef",
            "commit": { "message": "Rework checkout" },
            "files": []
        }));
    });
    let comment = github.mock(|when, then| {
        when.method(POST)
            .path("/repos/acme/widgets/issues/42/comments")
            .body_includes("Tests Failed")
            .body_includes("https://linear.app/acme/issue/ENG-9");
        then.status(201).json_body(json!({
            "id": 1,
            "html_url": "https://github.com/acme/widgets/pull/42#c1"
        }));
    });

    let create = linear.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .header("authorization", "lin-key")
            .body_includes("issueCreate")
            .body_includes("[CI] Playwright failure on acme/widgets@0123456")
            .body_includes("\"labelIds\":[\"label-bug\"]")
            .body_includes("\"priority\":2");
        then.status(200).json_body(json!({
            "data": { "issueCreate": {
                "success": true,
                "issue": {
                    "id": "lin-1",
                    "identifier": "ENG-9",
                    "url": "https://linear.app/acme/issue/ENG-9"
                }
            }}
        }));
    });

    let orchestrator = OrchestratorBuilder::from_config(&config(&github, &linear))
        .expect("builder")
        .executor(Arc::new(ScriptedTestExecutor::always(1, "1 failing")))
        .build();
    let state = RunState::from_input(RunInput::for_pull_request("acme/widgets", 42)).unwrap();

    let report = orchestrator.run(state).await;
    let state = report.state;

    pr.assert();
    create.assert();
    comment.assert();
    assert_eq!(state.commit_sha(), Some("0123456789abcdef"));
    assert_eq!(state.changed_files(), ["web/checkout.ts".to_string()]);
    assert_eq!(state.commit_message.as_deref(), Some("Rework checkout"));
    assert_eq!(state.test_status(), TestStatus::Failed);
    assert_eq!(state.tracked_issue_id(), Some("lin-1"));
    assert!(state.comment_posted);
    assert!(!state.is_degraded());
}

#[tokio::test]
async fn test_linear_outage_still_posts_comment() {
    let github = MockServer::start();
    let linear = MockServer::start();

    github.mock(|when, then| {
        when.method(GET).path("/repos/acme/widgets/commits/abc123");
        then.status(200).json_body(json!({
            "sha": "abc123",
            "commit": { "message": "Bump deps" },
            "files": [{ "filename": "package.json" }]
        }));
    });
    let comment = github.mock(|when, then| {
        when.method(POST)
            .path("/repos/acme/widgets/commits/abc123/comments");
        then.status(201).json_body(json!({ "id": 5, "html_url": null }));
    });
    let create = linear.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(500).body("upstream unavailable");
    });

    let orchestrator = OrchestratorBuilder::from_config(&config(&github, &linear))
        .expect("builder")
        .executor(Arc::new(ScriptedTestExecutor::always(1, "2 failing")))
        .build();
    let state = RunState::from_input(RunInput::for_commit("acme/widgets", "abc123")).unwrap();

    let report = orchestrator.run(state).await;

    create.assert();
    comment.assert();
    assert_eq!(report.state.changed_files(), ["package.json".to_string()]);
    assert!(report.state.tracked_issue().is_none());
    assert!(report.state.comment_posted);
}
