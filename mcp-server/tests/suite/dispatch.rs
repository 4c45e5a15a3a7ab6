//! Protocol-level dispatch behavior.

use pretty_assertions::assert_eq;
use serde_json::json;

use super::processor;
use super::request;

#[test]
fn test_initialize_reports_server_info() {
    let mut processor = processor();
    let reply = request(&mut processor, 1, "initialize", json!({}));
    assert_eq!(reply["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(reply["result"]["serverInfo"]["name"], "kioku-mcp-server");
    assert!(reply["result"]["capabilities"]["tools"].is_object());
}

#[test]
fn test_tools_list_advertises_all_tools() {
    let mut processor = processor();
    let reply = request(&mut processor, 1, "tools/list", json!({}));
    let tools = reply["result"]["tools"].as_array().expect("tools array");
    assert_eq!(tools.len(), 8);
    assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
}

#[test]
fn test_ping() {
    let mut processor = processor();
    let reply = request(&mut processor, 1, "ping", json!({}));
    assert!(reply["result"].is_object());
}

#[test]
fn test_unknown_method_is_method_not_found() {
    let mut processor = processor();
    let reply = request(&mut processor, 1, "resources/list", json!({}));
    assert_eq!(reply["error"]["code"], -32601);
}

#[test]
fn test_notifications_get_no_reply() {
    let mut processor = processor();
    let line = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }).to_string();
    assert!(processor.process_line(&line).is_none());
}

#[test]
fn test_unparseable_line_is_parse_error() {
    let mut processor = processor();
    let message = processor.process_line("this is not json").expect("reply");
    let reply = serde_json::to_value(&message).expect("serialize");
    assert_eq!(reply["error"]["code"], -32700);
}

#[test]
fn test_unknown_tool_is_invalid_params() {
    let mut processor = processor();
    let reply = request(
        &mut processor,
        1,
        "tools/call",
        json!({ "name": "memory_drop_everything", "arguments": {} }),
    );
    assert_eq!(reply["error"]["code"], -32602);
}

#[test]
fn test_missing_tool_arguments_is_invalid_params() {
    let mut processor = processor();
    let reply = request(
        &mut processor,
        1,
        "tools/call",
        json!({ "name": "memory_save_draft", "arguments": { "title": "only a title" } }),
    );
    assert_eq!(reply["error"]["code"], -32602);

    let reply = request(
        &mut processor,
        2,
        "tools/call",
        json!({ "name": "memory_finalize", "arguments": { "draft_id": "three" } }),
    );
    assert_eq!(reply["error"]["code"], -32602);
}
