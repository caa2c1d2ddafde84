// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::transport::fake::FakeTransport;

async fn manager_with(
    servers: Vec<(&str, FakeTransport)>,
) -> Result<(McpManager, Vec<FakeTransport>), McpError> {
    let mut catalog: IndexMap<String, Arc<dyn ToolTransport>> = IndexMap::new();
    let mut fakes = Vec::new();
    for (name, fake) in servers {
        catalog.insert(name.to_string(), Arc::new(fake.clone()));
        fakes.push(fake);
    }
    McpManager::with_transports(catalog, DEFAULT_CALL_TIMEOUT).await.map(|m| (m, fakes))
}

#[tokio::test]
async fn startup_initializes_and_discovers_tools() {
    let k8s = FakeTransport::new("kubernetes", &["k8s_get_pods", "k8s_restart_pod"]);
    let (manager, fakes) = manager_with(vec![("kubernetes", k8s)]).await.unwrap();

    assert!(manager.has_tool("k8s_get_pods"));
    assert!(manager.has_tool("k8s_restart_pod"));
    assert!(!manager.has_tool("k8s_drain_node"));

    let methods: Vec<String> = fakes[0].calls().iter().map(|c| c.method.clone()).collect();
    assert_eq!(methods, vec!["initialize", "notifications/initialized", "tools/list"]);
}

#[tokio::test]
async fn registry_maps_tools_to_owning_server() {
    let k8s = FakeTransport::new("kubernetes", &["k8s_get_pods"]);
    let prom = FakeTransport::new("prometheus", &["prom_query"]);
    let (manager, _) =
        manager_with(vec![("kubernetes", k8s), ("prometheus", prom)]).await.unwrap();

    let mut tools = manager.tools();
    tools.sort();
    assert_eq!(
        tools,
        vec![
            ("k8s_get_pods".to_string(), "kubernetes".to_string()),
            ("prom_query".to_string(), "prometheus".to_string()),
        ]
    );
}

#[tokio::test]
async fn duplicate_tool_across_servers_is_a_startup_error() {
    let a = FakeTransport::new("a", &["k8s_get_pods"]);
    let b = FakeTransport::new("b", &["k8s_get_pods"]);
    let err = manager_with(vec![("a", a), ("b", b)]).await.unwrap_err();
    match err {
        McpError::DuplicateTool { tool, first, second } => {
            assert_eq!(tool, "k8s_get_pods");
            assert_eq!(first, "a");
            assert_eq!(second, "b");
        }
        other => panic!("expected DuplicateTool, got {other}"),
    }
}

#[tokio::test]
async fn call_tool_routes_to_owning_server() {
    let k8s = FakeTransport::new("kubernetes", &["k8s_restart_pod"]);
    k8s.set_result("k8s_restart_pod", "pod restarted");
    let (manager, fakes) = manager_with(vec![("kubernetes", k8s)]).await.unwrap();

    let result = manager
        .call_tool("k8s_restart_pod", serde_json::json!({"pod_name": "nginx-abc", "namespace": "prod"}))
        .await
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(result.text(), "pod restarted");

    let calls = fakes[0].tool_calls("k8s_restart_pod");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["pod_name"], "nginx-abc");
    assert_eq!(calls[0]["namespace"], "prod");
}

#[tokio::test]
async fn unknown_tool_is_an_error() {
    let (manager, _) = manager_with(vec![("k", FakeTransport::new("k", &[]))]).await.unwrap();
    let err = manager.call_tool("nonexistent", serde_json::Value::Null).await.unwrap_err();
    assert!(matches!(err, McpError::UnknownTool(_)));
}

#[tokio::test]
async fn rpc_error_resolves_as_tool_error_result() {
    let k8s = FakeTransport::new("kubernetes", &["k8s_restart_pod"]);
    k8s.set_error("k8s_restart_pod", -32000, "forbidden");
    let (manager, _) = manager_with(vec![("kubernetes", k8s)]).await.unwrap();

    let result = manager.call_tool("k8s_restart_pod", serde_json::json!({})).await.unwrap();
    assert_eq!(result, ToolResult::Error { code: -32000, message: "forbidden".into() });
}

#[tokio::test]
async fn reinitialize_is_tolerated() {
    let k8s = FakeTransport::new("kubernetes", &["k8s_get_pods"]);
    let transport: Arc<dyn ToolTransport> = Arc::new(k8s.clone());
    let mut catalog: IndexMap<String, Arc<dyn ToolTransport>> = IndexMap::new();
    catalog.insert("kubernetes".to_string(), Arc::clone(&transport));
    let _first = McpManager::with_transports(catalog.clone(), DEFAULT_CALL_TIMEOUT).await.unwrap();
    let second = McpManager::with_transports(catalog, DEFAULT_CALL_TIMEOUT).await.unwrap();
    assert!(second.has_tool("k8s_get_pods"));
    let inits =
        k8s.calls().iter().filter(|c| c.method == "initialize").count();
    assert_eq!(inits, 2);
}

#[tokio::test]
async fn shutdown_stops_every_server() {
    let a = FakeTransport::new("a", &["t1"]);
    let b = FakeTransport::new("b", &["t2"]);
    let (manager, fakes) = manager_with(vec![("a", a), ("b", b)]).await.unwrap();
    manager.shutdown().await;
    assert_eq!(fakes[0].shutdown_count(), 1);
    assert_eq!(fakes[1].shutdown_count(), 1);
}
