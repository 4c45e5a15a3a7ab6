use kioku_core::RuleConfig;
use kioku_core::VersionStore;
use kioku_mcp_server::message_processor::MessageProcessor;
use kioku_mcp_server::session::SessionContext;
use serde_json::Value;
use serde_json::json;

mod dispatch;
mod tools;

pub const TEST_CONVERSATION_ID: &str = "conv-test";

pub fn processor() -> MessageProcessor {
    processor_with_config(RuleConfig::default())
}

pub fn processor_with_config(config: RuleConfig) -> MessageProcessor {
    let store = VersionStore::in_memory(config).expect("open store");
    MessageProcessor::new(
        store,
        SessionContext::with_conversation_id(TEST_CONVERSATION_ID),
    )
}

/// Send one request and return the raw JSON-RPC reply.
pub fn request(
    processor: &mut MessageProcessor,
    id: i64,
    method: &str,
    params: Value,
) -> Value {
    let line = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
    .to_string();
    let message = processor.process_line(&line).expect("expected a reply");
    serde_json::to_value(&message).expect("serialize reply")
}

/// Call a tool and return the decoded structured payload.
pub fn call_tool(
    processor: &mut MessageProcessor,
    id: i64,
    name: &str,
    arguments: Value,
) -> Value {
    let reply = request(
        processor,
        id,
        "tools/call",
        json!({ "name": name, "arguments": arguments }),
    );
    let text = reply["result"]["content"][0]["text"]
        .as_str()
        .unwrap_or_else(|| panic!("no text content in reply: {reply}"));
    serde_json::from_str(text).expect("payload is JSON")
}
