//! End-to-end tool behavior through the message processor.

use chrono::Utc;
use kioku_core::ConversationTurn;
use kioku_core::Role;
use kioku_core::RuleConfig;
use kioku_core::convlog;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::TEST_CONVERSATION_ID;
use super::call_tool;
use super::processor;
use super::processor_with_config;

#[test]
fn test_save_finalize_search_round_trip() {
    let mut processor = processor();

    let saved = call_tool(
        &mut processor,
        1,
        "memory_save_draft",
        json!({
            "title": "ポート設定",
            "content": "本番のポートは22222に統一します",
        }),
    );
    assert_eq!(saved["status"], "success");
    assert_eq!(saved["key"], "port_and_protocol_policy");
    assert_eq!(saved["key_layer"], "operation");
    assert_eq!(saved["confidence"], "HIGH");
    let draft_id = saved["draft_id"].as_i64().expect("draft id");

    // Drafts are invisible to search.
    let empty = call_tool(
        &mut processor,
        2,
        "memory_search",
        json!({ "query": "22222" }),
    );
    assert_eq!(empty["count"], 0);

    let finalized = call_tool(
        &mut processor,
        3,
        "memory_finalize",
        json!({ "draft_id": draft_id }),
    );
    assert_eq!(finalized["status"], "success");

    let found = call_tool(
        &mut processor,
        4,
        "memory_search",
        json!({ "query": "22222" }),
    );
    assert_eq!(found["count"], 1);
    assert_eq!(found["items"][0]["id"], draft_id);
    assert_eq!(found["items"][0]["status"], "final");
    assert_eq!(found["items"][0]["conversation_id"], TEST_CONVERSATION_ID);
}

#[test]
fn test_search_honors_type_filter_argument() {
    let mut processor = processor();
    let saved = call_tool(
        &mut processor,
        1,
        "memory_save_draft",
        json!({
            "title": "ポート設定",
            "content": "本番のポートは22222に統一します",
            "type": "config",
        }),
    );
    let id = saved["draft_id"].as_i64().expect("draft id");
    call_tool(&mut processor, 2, "memory_finalize", json!({ "draft_id": id }));

    let hit = call_tool(
        &mut processor,
        3,
        "memory_search",
        json!({ "query": "22222", "type_filter": "config" }),
    );
    assert_eq!(hit["count"], 1);
    assert_eq!(hit["items"][0]["type"], "config");

    let miss = call_tool(
        &mut processor,
        4,
        "memory_search",
        json!({ "query": "22222", "type_filter": "procedure" }),
    );
    assert_eq!(miss["count"], 0);
}

#[test]
fn test_finalize_twice_reports_invalid_state() {
    let mut processor = processor();
    let saved = call_tool(
        &mut processor,
        1,
        "memory_save_draft",
        json!({ "title": "ポート設定", "content": "22222を使用する" }),
    );
    let draft_id = saved["draft_id"].as_i64().expect("draft id");

    call_tool(&mut processor, 2, "memory_finalize", json!({ "draft_id": draft_id }));
    let err = call_tool(&mut processor, 3, "memory_finalize", json!({ "draft_id": draft_id }));
    assert_eq!(err["status"], "error");
    assert_eq!(err["code"], "INVALID_STATE");
}

#[test]
fn test_finalize_missing_id_reports_not_found() {
    let mut processor = processor();
    let err = call_tool(&mut processor, 1, "memory_finalize", json!({ "draft_id": 9999 }));
    assert_eq!(err["status"], "error");
    assert_eq!(err["code"], "NOT_FOUND");
}

#[test]
fn test_supersede_links_versions() {
    let mut processor = processor();
    let saved = call_tool(
        &mut processor,
        1,
        "memory_save_draft",
        json!({ "title": "ポート設定", "content": "11111を使用する" }),
    );
    let old_id = saved["draft_id"].as_i64().expect("draft id");
    call_tool(&mut processor, 2, "memory_finalize", json!({ "draft_id": old_id }));

    let superseded = call_tool(
        &mut processor,
        3,
        "memory_supersede",
        json!({
            "old_id": old_id,
            "new_title": "ポート設定",
            "new_content": "22222に統一します",
        }),
    );
    assert_eq!(superseded["status"], "success");
    assert_eq!(superseded["old_id"], old_id);
    let new_id = superseded["new_id"].as_i64().expect("new id");

    // open_source shows the full content, provenance note included.
    let opened = call_tool(
        &mut processor,
        4,
        "memory_open_source",
        json!({ "memory_id": new_id }),
    );
    assert_eq!(opened["status"], "success");
    assert_eq!(opened["item"]["supersedes"], old_id);
    let content = opened["item"]["content"].as_str().expect("content");
    assert!(content.contains("（更新履歴）"));
    assert!(content.contains(&format!("会話ID={TEST_CONVERSATION_ID}")));
}

#[test]
fn test_open_source_missing_id_reports_not_found() {
    let mut processor = processor();
    let err = call_tool(&mut processor, 1, "memory_open_source", json!({ "memory_id": 404 }));
    assert_eq!(err["status"], "error");
    assert_eq!(err["code"], "NOT_FOUND");
}

#[test]
fn test_recent_context_defaults_to_operation_layer() {
    let mut processor = processor();
    for (title, content) in [
        ("タイムアウト設定", "30秒とする"),
        ("アーキテクチャ方針", "モノリスを維持する"),
    ] {
        let saved = call_tool(
            &mut processor,
            1,
            "memory_save_draft",
            json!({ "title": title, "content": content }),
        );
        let id = saved["draft_id"].as_i64().expect("draft id");
        call_tool(&mut processor, 2, "memory_finalize", json!({ "draft_id": id }));
    }

    let default_layer = call_tool(&mut processor, 3, "memory_get_recent_context", json!({}));
    assert_eq!(default_layer["count"], 1);
    assert_eq!(default_layer["items"][0]["key_layer"], "operation");

    let all = call_tool(
        &mut processor,
        4,
        "memory_get_recent_context",
        json!({ "layer": "all" }),
    );
    assert_eq!(all["count"], 2);
}

#[test]
fn test_list_results_truncate_long_content() {
    let mut processor = processor();
    let long_content = format!("ポートは22222に統一します。{}", "あ".repeat(300));
    let saved = call_tool(
        &mut processor,
        1,
        "memory_save_draft",
        json!({ "title": "ポート設定", "content": long_content }),
    );
    let id = saved["draft_id"].as_i64().expect("draft id");
    call_tool(&mut processor, 2, "memory_finalize", json!({ "draft_id": id }));

    let found = call_tool(&mut processor, 3, "memory_search", json!({ "query": "ポート" }));
    let shown = found["items"][0]["content"].as_str().expect("content");
    assert!(shown.ends_with("..."));
    assert_eq!(shown.chars().count(), 203);

    // The stored record keeps the full text.
    let opened = call_tool(&mut processor, 4, "memory_open_source", json!({ "memory_id": id }));
    let full = opened["item"]["content"].as_str().expect("content");
    assert!(full.chars().count() > 300);
}

#[test]
fn test_list_drafts_shows_pending_only() {
    let mut processor = processor();
    let saved = call_tool(
        &mut processor,
        1,
        "memory_save_draft",
        json!({ "title": "下書きメモ", "content": "まだ確定していない内容" }),
    );
    let id = saved["draft_id"].as_i64().expect("draft id");

    let drafts = call_tool(&mut processor, 2, "memory_list_drafts", json!({}));
    assert_eq!(drafts["count"], 1);
    assert_eq!(drafts["items"][0]["id"], id);
    assert_eq!(drafts["items"][0]["status"], "draft");

    call_tool(&mut processor, 3, "memory_finalize", json!({ "draft_id": id }));
    let drafts = call_tool(&mut processor, 4, "memory_list_drafts", json!({}));
    assert_eq!(drafts["count"], 0);
}

#[test]
fn test_list_suggestions_reads_session_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = RuleConfig::default();
    config.log_dir = dir.path().to_string_lossy().into_owned();

    for (n, role, content) in [
        (0, Role::User, "ポートはどうしますか？"),
        (1, Role::Assistant, "本番環境のポートは22222に統一します。"),
    ] {
        convlog::append_turn(
            dir.path(),
            &ConversationTurn {
                conversation_id: TEST_CONVERSATION_ID.to_string(),
                turn_number: n,
                role,
                content: content.to_string(),
                timestamp: Utc::now(),
            },
        )
        .expect("append turn");
    }

    let mut processor = processor_with_config(config);
    let reply = call_tool(&mut processor, 1, "memory_list_suggestions", json!({}));
    assert_eq!(reply["status"], "success");
    assert_eq!(reply["count"], 1);
    assert_eq!(reply["suggestions"][0]["confidence"], "HIGH");
    assert_eq!(
        reply["suggestions"][0]["title"],
        "本番環境のポートは22222に統一します"
    );
}

#[test]
fn test_list_suggestions_without_log_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = RuleConfig::default();
    config.log_dir = dir.path().to_string_lossy().into_owned();

    let mut processor = processor_with_config(config);
    let reply = call_tool(&mut processor, 1, "memory_list_suggestions", json!({}));
    assert_eq!(reply["status"], "success");
    assert_eq!(reply["count"], 0);
}
