//! Integration tests driving real child-process upstreams.
//!
//! Fake servers are `sh` one-liners that print canned JSON-RPC responses
//! up front and then hold their pipes open. Request ids are a per-session
//! counter starting at 1, so the canned ids line up: 1 = initialize,
//! 2 = the first request after the handshake, and so on.

use std::collections::HashMap;

use serde_json::json;
use switchboard::{Registry, RouterError, SearchEntry, SearchOptions, ServerParams};

const INIT_RESPONSE: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"fake-upstream","version":"0.0.1"}}}"#;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn stdio_params(script: &str) -> ServerParams {
    ServerParams {
        command: Some("sh".into()),
        args: vec!["-c".into(), script.into()],
        ..Default::default()
    }
}

/// A fake upstream that answers the handshake and then the given responses.
fn canned_server(responses: &[&str]) -> ServerParams {
    let mut lines = vec![INIT_RESPONSE.to_string()];
    lines.extend(responses.iter().map(|r| r.to_string()));
    let quoted: Vec<String> = lines.iter().map(|l| format!("'{l}'")).collect();
    stdio_params(&format!(
        "printf '%s\\n' {}; cat >/dev/null",
        quoted.join(" ")
    ))
}

/// A fake upstream that completes the handshake, then closes its stdout so
/// every later request fails.
fn failing_after_handshake() -> ServerParams {
    stdio_params(&format!(
        "printf '%s\\n' '{INIT_RESPONSE}'; exec 1>&-; cat >/dev/null"
    ))
}

fn list_response(id: u64, tools: &str) -> String {
    format!(r#"{{"jsonrpc":"2.0","id":{id},"result":{{"tools":{tools}}}}}"#)
}

const FILE_TOOLS: &str = r#"[{"name":"ReadFile","description":"Read a file from disk","inputSchema":{"type":"object","required":["path"]}},{"name":"write_file","description":"Write contents to disk","inputSchema":{"type":"object"}}]"#;

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_list_and_disconnect() {
    init_logging();
    let registry = Registry::new();
    let params = canned_server(&[&list_response(2, FILE_TOOLS)]);

    registry.connect("alpha", &params).await.unwrap();
    assert_eq!(registry.list().await, vec!["alpha"]);

    let tools = registry.list_tools("alpha").await.unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0].name, "ReadFile");
    assert_eq!(tools[0].input_schema["required"][0], "path");

    registry.disconnect("alpha").await.unwrap();
    assert!(registry.list().await.is_empty());

    let err = registry.list_tools("alpha").await.unwrap_err();
    assert!(matches!(err, RouterError::NotConnected { .. }));
}

#[tokio::test]
async fn test_duplicate_connect_is_rejected() {
    init_logging();
    let registry = Registry::new();
    let params = canned_server(&[&list_response(2, FILE_TOOLS)]);

    registry.connect("dup", &params).await.unwrap();

    let err = registry
        .connect("dup", &canned_server(&[]))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::AlreadyConnected { .. }));

    // The existing session is untouched and still serves requests.
    assert_eq!(registry.list().await, vec!["dup"]);
    let tools = registry.list_tools("dup").await.unwrap();
    assert_eq!(tools.len(), 2);

    registry.disconnect_all().await;
}

#[tokio::test]
async fn test_disconnect_all_closes_everything() {
    init_logging();
    let registry = Registry::new();

    registry
        .connect("alpha", &canned_server(&[]))
        .await
        .unwrap();
    registry
        .connect("beta", &canned_server(&[]))
        .await
        .unwrap();
    assert_eq!(registry.list().await, vec!["alpha", "beta"]);

    let failures = registry.disconnect_all().await;
    assert!(failures.is_empty());
    assert!(registry.list().await.is_empty());
}

// ─── Tool Invocation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_call_tool_returns_raw_result() {
    init_logging();
    let registry = Registry::new();
    let result = r#"{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"4"}]}}"#;
    let params = canned_server(&[result]);

    registry.connect("calc", &params).await.unwrap();

    let value = registry
        .call_tool("calc", "add", json!({"a": 2, "b": 2}))
        .await
        .unwrap();
    assert_eq!(value, json!({"content": [{"type": "text", "text": "4"}]}));

    registry.disconnect_all().await;
}

#[tokio::test]
async fn test_call_tool_surfaces_rpc_error() {
    init_logging();
    let registry = Registry::new();
    let error = r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32602,"message":"unknown tool"}}"#;
    let params = canned_server(&[error]);

    registry.connect("calc", &params).await.unwrap();

    let err = registry
        .call_tool("calc", "bogus", json!({}))
        .await
        .unwrap_err();
    match err {
        RouterError::Rpc { code, message, .. } => {
            assert_eq!(code, -32602);
            assert_eq!(message, "unknown tool");
        }
        other => panic!("expected Rpc error, got {other:?}"),
    }

    registry.disconnect_all().await;
}

// ─── Exact Lookup ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_tool_includes_schema_and_is_exact() {
    init_logging();
    let registry = Registry::new();
    let params = canned_server(&[
        &list_response(2, FILE_TOOLS),
        &list_response(3, FILE_TOOLS),
    ]);

    registry.connect("alpha", &params).await.unwrap();

    let tool = registry.get_tool("alpha", "ReadFile").await.unwrap();
    assert_eq!(tool.description, "Read a file from disk");
    assert_eq!(tool.input_schema["type"], "object");

    // Exact match is case-sensitive: "readfile" is a miss.
    let err = registry.get_tool("alpha", "readfile").await.unwrap_err();
    assert!(matches!(err, RouterError::ToolNotFound { .. }));

    registry.disconnect_all().await;
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_search_is_case_insensitive_and_projects() {
    init_logging();
    let registry = Registry::new();
    let params = canned_server(&[
        &list_response(2, FILE_TOOLS),
        &list_response(3, FILE_TOOLS),
    ]);

    registry.connect("alpha", &params).await.unwrap();

    // "file" matches "ReadFile" (case folded) and "write_file".
    let hits = registry
        .find_tools_in_server("alpha", "file", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    let serialized = serde_json::to_string(&hits).unwrap();
    assert!(!serialized.contains("inputSchema"));

    // Case-sensitive narrows to the lowercase name.
    let hits = registry
        .find_tools_in_server(
            "alpha",
            "file",
            &SearchOptions {
                case_sensitive: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "write_file");

    registry.disconnect_all().await;
}

#[tokio::test]
async fn test_cross_server_search_isolates_failures() {
    init_logging();
    let registry = Registry::new();

    // a: has a matching tool; b: dies after the handshake; c: no matches.
    registry
        .connect("a", &canned_server(&[&list_response(2, FILE_TOOLS)]))
        .await
        .unwrap();
    registry
        .connect("b", &failing_after_handshake())
        .await
        .unwrap();
    registry
        .connect(
            "c",
            &canned_server(&[&list_response(
                2,
                r#"[{"name":"unrelated","description":"","inputSchema":{}}]"#,
            )]),
        )
        .await
        .unwrap();

    let results = registry
        .find_tools("read", &SearchOptions::default())
        .await
        .unwrap();

    // a reports hits, b reports an in-band failure, c is omitted.
    let keys: Vec<&str> = results.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["a", "b"]);

    assert!(matches!(results["a"][0], SearchEntry::Hit(ref hit) if hit.name == "ReadFile"));
    assert_eq!(results["b"].len(), 1);
    assert!(matches!(results["b"][0], SearchEntry::Failure { .. }));

    registry.disconnect_all().await;
}

#[tokio::test]
async fn test_invalid_pattern_fails_before_contacting_servers() {
    init_logging();
    let registry = Registry::new();

    // The fake has no canned response beyond the handshake: if the search
    // contacted it, the request would never complete.
    registry
        .connect("alpha", &canned_server(&[]))
        .await
        .unwrap();

    let err = registry
        .find_tools("(", &SearchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::InvalidPattern { .. }));

    let err = registry
        .find_tools_in_server("alpha", "(", &SearchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::InvalidPattern { .. }));

    registry.disconnect_all().await;
}

// ─── Environment Merge ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_entry_env_overrides_inherited_values() {
    init_logging();
    // The fake reports its own environment back through a tool description,
    // so the merged child environment is observable end to end.
    let payload = r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"probe","description":"%s","inputSchema":{"type":"object"}}]}}"#;
    let script = format!(
        "printf '%s\\n' '{INIT_RESPONSE}'; printf '{payload}\\n' \"$SWITCHBOARD_PROBE_DESC\"; cat >/dev/null"
    );

    std::env::set_var("SWITCHBOARD_PROBE_DESC", "inherited");

    let mut params = stdio_params(&script);
    params.env = HashMap::from([(
        "SWITCHBOARD_PROBE_DESC".to_string(),
        "override".to_string(),
    )]);

    let registry = Registry::new();
    registry.connect("probe", &params).await.unwrap();

    let tool = registry.get_tool("probe", "probe").await.unwrap();
    assert_eq!(tool.description, "override");

    registry.disconnect_all().await;
}
