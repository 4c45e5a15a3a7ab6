//! Tool definitions and dispatch.
//!
//! Argument problems are protocol-level (invalid params); everything the
//! store itself rejects comes back as a structured `{"status":"error"}`
//! payload so the caller sees a category code instead of internals.

use std::str::FromStr;

use kioku_core::ItemType;
use kioku_core::KeyLayer;
use kioku_core::MemoryError;
use kioku_core::MemoryItem;
use kioku_core::VersionStore;
use kioku_core::convlog;
use kioku_core::extract_suggestions;
use serde_json::Value;
use serde_json::json;
use tracing::info;

use crate::protocol::Tool;
use crate::session::SessionContext;

/// Character cap for content shown in list results.
const LIST_CONTENT_CHARS: usize = 200;

const DEFAULT_LIST_LIMIT: usize = 10;

/// Protocol-level argument failure, surfaced as a JSON-RPC error.
#[derive(Debug)]
pub enum ToolError {
    UnknownTool(String),
    InvalidParams(String),
}

pub fn definitions() -> Vec<Tool> {
    let type_enum = json!(["decision", "config", "procedure", "design_note"]);
    vec![
        Tool {
            name: "memory_save_draft",
            description: "Save a knowledge draft; key, layer, and confidence are assigned automatically",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Short title, ~100 chars" },
                    "content": { "type": "string", "description": "Body text, ~500 chars" },
                    "type": { "type": "string", "enum": type_enum.clone() },
                },
                "required": ["title", "content", "type"],
            }),
        },
        Tool {
            name: "memory_finalize",
            description: "Promote a draft to the canonical record for its key",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "draft_id": { "type": "integer" },
                },
                "required": ["draft_id"],
            }),
        },
        Tool {
            name: "memory_supersede",
            description: "Replace a canonical record with a new version, keeping history",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "old_id": { "type": "integer" },
                    "new_title": { "type": "string" },
                    "new_content": { "type": "string" },
                },
                "required": ["old_id", "new_title", "new_content"],
            }),
        },
        Tool {
            name: "memory_search",
            description: "Search canonical knowledge by substring",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "type_filter": { "type": "string", "enum": type_enum },
                    "limit": { "type": "integer", "default": DEFAULT_LIST_LIMIT },
                },
                "required": ["query"],
            }),
        },
        Tool {
            name: "memory_get_recent_context",
            description: "Recently updated canonical knowledge, optionally per layer",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "layer": {
                        "type": "string",
                        "enum": ["constitution", "operation", "all"],
                        "default": "operation",
                    },
                    "limit": { "type": "integer", "default": DEFAULT_LIST_LIMIT },
                },
            }),
        },
        Tool {
            name: "memory_list_suggestions",
            description: "Mine the current conversation log for save candidates",
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        Tool {
            name: "memory_list_drafts",
            description: "All pending drafts, newest first",
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        Tool {
            name: "memory_open_source",
            description: "Show a memory with the conversation turns it was derived from",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "memory_id": { "type": "integer" },
                },
                "required": ["memory_id"],
            }),
        },
    ]
}

/// Run one tool call. `Ok((payload, is_error))` is always a well-formed MCP
/// result; `Err` means the arguments never reached the store.
pub fn call(
    store: &mut VersionStore,
    session: &SessionContext,
    name: &str,
    arguments: &Value,
) -> Result<(Value, bool), ToolError> {
    let outcome = match name {
        "memory_save_draft" => save_draft(store, session, arguments),
        "memory_finalize" => finalize(store, arguments),
        "memory_supersede" => supersede(store, session, arguments),
        "memory_search" => search(store, arguments),
        "memory_get_recent_context" => recent_context(store, arguments),
        "memory_list_suggestions" => Ok(list_suggestions(store, session)),
        "memory_list_drafts" => list_drafts(store),
        "memory_open_source" => open_source(store, arguments),
        other => return Err(ToolError::UnknownTool(other.to_string())),
    }?;

    Ok(match outcome {
        Ok(payload) => (payload, false),
        Err(e) => {
            info!(tool = name, code = e.category().as_str(), error = %e, "tool call failed");
            (
                json!({
                    "status": "error",
                    "code": e.category().as_str(),
                    "message": e.to_string(),
                }),
                true,
            )
        }
    })
}

type ToolOutcome = Result<Result<Value, MemoryError>, ToolError>;

fn save_draft(store: &mut VersionStore, session: &SessionContext, args: &Value) -> ToolOutcome {
    let title = required_str(args, "title")?;
    let content = required_str(args, "content")?;
    let item_type = optional_item_type(args, "type")?;

    Ok(store
        .insert_draft(&title, &content, item_type, Some(session.conversation_id()))
        .and_then(|id| {
            let item = store.get_item(id)?.ok_or_else(|| MemoryError::not_found(id))?;
            Ok(json!({
                "status": "success",
                "draft_id": id,
                "key": item.key,
                "key_layer": item.key_layer.as_str(),
                "type": item.item_type.as_str(),
                "confidence": item.confidence.as_str(),
            }))
        }))
}

fn finalize(store: &mut VersionStore, args: &Value) -> ToolOutcome {
    let draft_id = required_i64(args, "draft_id")?;
    Ok(store.finalize(draft_id).map(|item| {
        json!({
            "status": "success",
            "id": item.id,
            "key": item.key,
            "key_layer": item.key_layer.as_str(),
        })
    }))
}

fn supersede(store: &mut VersionStore, session: &SessionContext, args: &Value) -> ToolOutcome {
    let old_id = required_i64(args, "old_id")?;
    let new_title = required_str(args, "new_title")?;
    let new_content = required_str(args, "new_content")?;

    Ok(store
        .supersede(old_id, &new_title, &new_content, session.conversation_id())
        .map(|new_id| {
            json!({
                "status": "success",
                "old_id": old_id,
                "new_id": new_id,
            })
        }))
}

fn search(store: &mut VersionStore, args: &Value) -> ToolOutcome {
    let query = required_str(args, "query")?;
    let item_type = optional_item_type(args, "type_filter")?;
    let limit = optional_limit(args)?;

    Ok(store.search(&query, item_type, limit).map(item_list_payload))
}

fn recent_context(store: &mut VersionStore, args: &Value) -> ToolOutcome {
    let layer = match args.get("layer") {
        None | Some(Value::Null) => Some(KeyLayer::Operation),
        Some(Value::String(s)) if s == "all" => None,
        Some(Value::String(s)) => Some(
            KeyLayer::from_str(s)
                .map_err(|_| ToolError::InvalidParams(format!("unknown layer: {s}")))?,
        ),
        Some(other) => {
            return Err(ToolError::InvalidParams(format!(
                "layer must be a string, got {other}"
            )));
        }
    };
    let limit = optional_limit(args)?;

    Ok(store.recent_context(layer, limit).map(item_list_payload))
}

fn list_suggestions(store: &VersionStore, session: &SessionContext) -> Result<Value, MemoryError> {
    let log_dir = store.config().resolved_log_dir();
    let log = convlog::load(&log_dir, session.conversation_id())?;
    let suggestions = extract_suggestions(store.config(), &log);
    Ok(json!({
        "status": "success",
        "count": suggestions.len(),
        "suggestions": suggestions,
    }))
}

fn list_drafts(store: &mut VersionStore) -> ToolOutcome {
    Ok(store.list_drafts().map(item_list_payload))
}

fn open_source(store: &mut VersionStore, args: &Value) -> ToolOutcome {
    let memory_id = required_i64(args, "memory_id")?;
    Ok((|| {
        let item = store
            .get_item(memory_id)?
            .ok_or_else(|| MemoryError::not_found(memory_id))?;
        let sources = store.sources_for(memory_id)?;
        Ok(json!({
            "status": "success",
            "item": item_payload(&item, false),
            "sources": sources
                .iter()
                .map(|s| json!({
                    "conversation_id": s.conversation_id,
                    "turn_number": s.turn_number,
                    "role": s.role.as_str(),
                    "content": s.content,
                    "timestamp": s.timestamp.to_rfc3339(),
                }))
                .collect::<Vec<_>>(),
        }))
    })())
}

fn item_list_payload(items: Vec<MemoryItem>) -> Value {
    json!({
        "status": "success",
        "count": items.len(),
        "items": items.iter().map(|i| item_payload(i, true)).collect::<Vec<_>>(),
    })
}

fn item_payload(item: &MemoryItem, truncate: bool) -> Value {
    let content = if truncate {
        truncate_for_list(&item.content)
    } else {
        item.content.clone()
    };
    json!({
        "id": item.id,
        "key": item.key,
        "key_layer": item.key_layer.as_str(),
        "title": item.title,
        "content": content,
        "type": item.item_type.as_str(),
        "status": item.status.as_str(),
        "is_canonical": item.is_canonical,
        "supersedes": item.supersedes,
        "confidence": item.confidence.as_str(),
        "conversation_id": item.conversation_id,
        "created_at": item.created_at.to_rfc3339(),
        "updated_at": item.updated_at.to_rfc3339(),
    })
}

/// Character-wise cap with a trailing ellipsis marker.
fn truncate_for_list(content: &str) -> String {
    if content.chars().count() <= LIST_CONTENT_CHARS {
        return content.to_string();
    }
    let mut truncated: String = content.chars().take(LIST_CONTENT_CHARS).collect();
    truncated.push_str("...");
    truncated
}

fn required_str(args: &Value, key: &str) -> Result<String, ToolError> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ToolError::InvalidParams(format!(
            "{key} must be a string, got {other}"
        ))),
        None => Err(ToolError::InvalidParams(format!("missing argument: {key}"))),
    }
}

fn required_i64(args: &Value, key: &str) -> Result<i64, ToolError> {
    args.get(key)
        .ok_or_else(|| ToolError::InvalidParams(format!("missing argument: {key}")))?
        .as_i64()
        .ok_or_else(|| ToolError::InvalidParams(format!("{key} must be an integer")))
}

fn optional_item_type(args: &Value, key: &str) -> Result<Option<ItemType>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => ItemType::from_str(s)
            .map(Some)
            .map_err(|_| ToolError::InvalidParams(format!("unknown type: {s}"))),
        Some(other) => Err(ToolError::InvalidParams(format!(
            "{key} must be a string, got {other}"
        ))),
    }
}

fn optional_limit(args: &Value) -> Result<usize, ToolError> {
    match args.get("limit") {
        None | Some(Value::Null) => Ok(DEFAULT_LIST_LIMIT),
        Some(v) => {
            let limit = v
                .as_u64()
                .ok_or_else(|| ToolError::InvalidParams("limit must be a positive integer".to_string()))?;
            Ok(limit as usize)
        }
    }
}
