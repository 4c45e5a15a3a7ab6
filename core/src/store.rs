//! Versioned knowledge store and its state machine.
//!
//! One `VersionStore` owns one SQLite connection. Every multi-step write
//! (lock, read, compare, write) runs inside a BEGIN IMMEDIATE transaction so
//! the write-intent lock is held before any state check; a failure anywhere
//! rolls the whole transaction back via drop. Lock-timeout expiry surfaces as
//! `LockContention` and is never retried here.

use std::path::Path;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::classify::judge_confidence;
use crate::classify::judge_type;
use crate::config::RuleConfig;
use crate::errors::MemoryError;
use crate::errors::Result;
use crate::index::KeyMatch;
use crate::index::SimilarityIndex;
use crate::keys::KeyClassifier;
use crate::keys::MISC_KEY;
use crate::keys::MISC_LAYER;
use crate::keys::has_enough_tokens;
use crate::types::Confidence;
use crate::types::ItemStatus;
use crate::types::ItemType;
use crate::types::KeyLayer;
use crate::types::MemoryItem;
use crate::types::MemorySource;
use crate::types::Role;

const SCHEMA_SQL: &str = include_str!("../SCHEMA.sql");

/// Candidates requested from the similarity tier of key assignment.
const SIMILARITY_CANDIDATES: usize = 3;

const ITEM_COLUMNS: &str = "id, key, key_layer, title, content, type, status, \
     is_canonical, supersedes, confidence, conversation_id, created_at, updated_at";

/// Storage engine for versioned knowledge records.
pub struct VersionStore {
    conn: Connection,
    config: RuleConfig,
}

impl VersionStore {
    /// Open (creating if needed) the store at the configured database path.
    pub fn open(config: RuleConfig) -> Result<Self> {
        let path = config.resolved_db_path();
        Self::open_at(config, &path)
    }

    /// Open the store at an explicit path, creating parent directories.
    pub fn open_at(config: RuleConfig, path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::storage_with_source(
                    format!("create database directory {}", parent.display()),
                    e,
                )
            })?;
        }
        let conn =
            Connection::open(path).map_err(|e| MemoryError::from_sql("open database", e))?;
        info!(path = %path.display(), "opening knowledge store");
        Self::init(conn, config)
    }

    /// In-memory store, for tests and throwaway sessions.
    pub fn in_memory(config: RuleConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MemoryError::from_sql("open in-memory database", e))?;
        Self::init(conn, config)
    }

    fn init(conn: Connection, config: RuleConfig) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(u64::from(config.busy_timeout_ms)))
            .map_err(|e| MemoryError::from_sql("set busy_timeout", e))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| MemoryError::from_sql("enable foreign_keys", e))?;
        // journal_mode reports the resulting mode as a result row.
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
            .map_err(|e| MemoryError::from_sql("set journal_mode", e))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| MemoryError::from_sql("apply schema", e))?;
        Ok(Self { conn, config })
    }

    /// The rule tables this store classifies with.
    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Read-only connection handle, for similarity queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Assign a (key, layer) to new text.
    ///
    /// Tier 1 is the keyword map; tier 2 ranks existing canonical knowledge
    /// by title similarity, gated on the title carrying at least two
    /// alphanumeric tokens; tier 3 is the misc bucket. A failing similarity
    /// query degrades to tier 3 with a warning rather than failing the save.
    pub fn suggest_key(&self, title: &str, content: &str) -> (String, KeyLayer) {
        let classifier = KeyClassifier::new(&self.config.keys);
        if let Some((key, layer)) = classifier.match_by_map(title, content) {
            debug!(key, %layer, "key assigned by keyword map");
            return (key, layer);
        }

        if has_enough_tokens(title) {
            match self.similar_keys(title, SIMILARITY_CANDIDATES) {
                Ok(hits) => {
                    if let Some(hit) = hits.first() {
                        debug!(key = hit.key, layer = %hit.layer, score = hit.score,
                            "key assigned by similarity");
                        return (hit.key.clone(), hit.layer);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "similarity tier failed; falling through to misc bucket");
                }
            }
        }

        debug!("key assigned to misc bucket");
        (MISC_KEY.to_string(), MISC_LAYER)
    }

    /// Rank existing canonical knowledge by similarity to `text`.
    pub fn similar_keys(&self, text: &str, limit: usize) -> Result<Vec<KeyMatch>> {
        SimilarityIndex::query(&self.conn, text, limit)
    }

    /// Persist a new draft. Key and layer come from [`Self::suggest_key`];
    /// type falls back to the text classifier when the caller leaves it out;
    /// confidence is always recomputed. No canonical side effects.
    pub fn insert_draft(
        &mut self,
        title: &str,
        content: &str,
        item_type: Option<ItemType>,
        conversation_id: Option<&str>,
    ) -> Result<i64> {
        let (key, layer) = self.suggest_key(title, content);
        let item_type =
            item_type.unwrap_or_else(|| judge_type(&self.config.type_keywords, title, content));
        let confidence = judge_confidence(&self.config.confidence, title, content, item_type);
        let now = Utc::now().to_rfc3339();

        let id = with_immediate_tx(&mut self.conn, "insert draft", |tx| {
            tx.execute(
                "INSERT INTO memory_items \
                     (key, key_layer, title, content, type, status, is_canonical, \
                      supersedes, confidence, conversation_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 'draft', FALSE, NULL, ?6, ?7, ?8, ?8)",
                params![
                    key,
                    layer.as_str(),
                    title,
                    content,
                    item_type.as_str(),
                    confidence.as_str(),
                    conversation_id,
                    now
                ],
            )
            .map_err(|e| MemoryError::from_sql("insert draft", e))?;
            Ok(tx.last_insert_rowid())
        })?;

        SimilarityIndex::on_insert(&self.conn, id, title, content)?;
        info!(id, key, layer = %layer, ty = %item_type, conf = %confidence, "draft saved");
        Ok(id)
    }

    /// Promote a draft to the canonical final record for its (key, layer),
    /// demoting any current canonical in the same transaction.
    ///
    /// The write-intent lock is taken before the row is even read, so no
    /// two finalize calls can both observe "no existing canonical".
    pub fn finalize(&mut self, draft_id: i64) -> Result<MemoryItem> {
        let now = Utc::now().to_rfc3339();

        let (item, demoted) = with_immediate_tx(&mut self.conn, "finalize", |tx| {
            let item = fetch_item(tx, draft_id)?.ok_or_else(|| MemoryError::not_found(draft_id))?;
            if item.status != ItemStatus::Draft {
                return Err(MemoryError::invalid_state(format!(
                    "id={draft_id} has status {}; only drafts can be finalized",
                    item.status
                )));
            }

            let demoted = fetch_canonical(tx, &item.key, item.key_layer)?;
            if let Some(prior) = &demoted {
                tx.execute(
                    "UPDATE memory_items \
                     SET status = 'obsolete', is_canonical = FALSE, updated_at = ?2 \
                     WHERE id = ?1",
                    params![prior.id, now],
                )
                .map_err(|e| MemoryError::from_sql("demote prior canonical", e))?;
            }
            tx.execute(
                "UPDATE memory_items \
                 SET status = 'final', is_canonical = TRUE, updated_at = ?2 \
                 WHERE id = ?1",
                params![draft_id, now],
            )
            .map_err(|e| MemoryError::from_sql("promote draft", e))?;

            Ok((item, demoted))
        })?;

        // No index hook: finalize changes status and canonical flags only,
        // and the mirror tracks title/content alone.
        info!(
            id = draft_id,
            key = item.key,
            demoted = demoted.as_ref().map(|d| d.id),
            "draft finalized"
        );
        self.get_item(draft_id)?
            .ok_or_else(|| MemoryError::not_found(draft_id))
    }

    /// Replace the canonical record `old_id` with a new version under the
    /// same key, linking the new row to its predecessor and appending a
    /// provenance note to the caller's content. Returns the new id.
    pub fn supersede(
        &mut self,
        old_id: i64,
        new_title: &str,
        new_content: &str,
        conversation_id: &str,
    ) -> Result<i64> {
        let now_dt = Utc::now();
        let now = now_dt.to_rfc3339();
        let date = now_dt.format("%Y-%m-%d").to_string();
        let config = &self.config;

        let (new_id, content) = with_immediate_tx(&mut self.conn, "supersede", |tx| {
            let old = fetch_item(tx, old_id)?.ok_or_else(|| MemoryError::not_found(old_id))?;
            if !(old.is_canonical && old.status == ItemStatus::Final) {
                return Err(MemoryError::invalid_state(format!(
                    "id={old_id} is not the canonical final record (status={}, canonical={})",
                    old.status, old.is_canonical
                )));
            }

            // Confidence is judged on the caller's text, before the note.
            let confidence =
                judge_confidence(&config.confidence, new_title, new_content, old.item_type);
            let prior_conversation = old.conversation_id.as_deref().unwrap_or("不明");
            let content = format!(
                "{new_content}\n\n---\n（更新履歴）\n{date}: 元会話ID={prior_conversation} を会話ID={conversation_id} で更新"
            );

            tx.execute(
                "UPDATE memory_items \
                 SET status = 'obsolete', is_canonical = FALSE, updated_at = ?2 \
                 WHERE id = ?1",
                params![old_id, now],
            )
            .map_err(|e| MemoryError::from_sql("demote superseded record", e))?;

            tx.execute(
                "INSERT INTO memory_items \
                     (key, key_layer, title, content, type, status, is_canonical, \
                      supersedes, confidence, conversation_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 'final', TRUE, ?6, ?7, ?8, ?9, ?9)",
                params![
                    old.key,
                    old.key_layer.as_str(),
                    new_title,
                    content,
                    old.item_type.as_str(),
                    old_id,
                    confidence.as_str(),
                    conversation_id,
                    now
                ],
            )
            .map_err(|e| MemoryError::from_sql("insert superseding record", e))?;

            Ok((tx.last_insert_rowid(), content))
        })?;

        // Demoting the old row leaves its indexed text untouched; only the
        // new row needs mirroring.
        SimilarityIndex::on_insert(&self.conn, new_id, new_title, &content)?;
        info!(old_id, new_id, "record superseded");
        Ok(new_id)
    }

    /// Substring search over canonical-final records, newest-updated first.
    pub fn search(
        &self,
        query: &str,
        type_filter: Option<ItemType>,
        limit: usize,
    ) -> Result<Vec<MemoryItem>> {
        let limit = limit as i64;
        match type_filter {
            Some(ty) => self.query_items(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM memory_items \
                     WHERE is_canonical = TRUE AND status = 'final' \
                       AND (title LIKE '%' || ?1 || '%' OR content LIKE '%' || ?1 || '%') \
                       AND type = ?2 \
                     ORDER BY updated_at DESC LIMIT ?3"
                ),
                params![query, ty.as_str(), limit],
            ),
            None => self.query_items(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM memory_items \
                     WHERE is_canonical = TRUE AND status = 'final' \
                       AND (title LIKE '%' || ?1 || '%' OR content LIKE '%' || ?1 || '%') \
                     ORDER BY updated_at DESC LIMIT ?2"
                ),
                params![query, limit],
            ),
        }
    }

    /// Canonical-final records, newest-updated first, optionally restricted
    /// to one layer.
    pub fn recent_context(
        &self,
        layer: Option<KeyLayer>,
        limit: usize,
    ) -> Result<Vec<MemoryItem>> {
        let limit = limit as i64;
        match layer {
            Some(layer) => self.query_items(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM memory_items \
                     WHERE is_canonical = TRUE AND status = 'final' AND key_layer = ?1 \
                     ORDER BY updated_at DESC LIMIT ?2"
                ),
                params![layer.as_str(), limit],
            ),
            None => self.query_items(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM memory_items \
                     WHERE is_canonical = TRUE AND status = 'final' \
                     ORDER BY updated_at DESC LIMIT ?1"
                ),
                params![limit],
            ),
        }
    }

    /// All pending drafts, newest-created first.
    pub fn list_drafts(&self) -> Result<Vec<MemoryItem>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM memory_items \
                 WHERE status = 'draft' ORDER BY created_at DESC"
            ),
            params![],
        )
    }

    /// Fetch one record by id.
    pub fn get_item(&self, id: i64) -> Result<Option<MemoryItem>> {
        fetch_item(&self.conn, id)
    }

    /// The canonical-final record for a (key, layer), if any.
    pub fn canonical(&self, key: &str, layer: KeyLayer) -> Result<Option<MemoryItem>> {
        fetch_canonical(&self.conn, key, layer)
    }

    /// Attribute a conversation turn to a memory. The referenced memory must
    /// exist; a dangling id surfaces as a constraint violation.
    pub fn add_source(
        &mut self,
        memory_id: i64,
        conversation_id: &str,
        turn_number: i64,
        role: Role,
        content: &str,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        with_immediate_tx(&mut self.conn, "add source", |tx| {
            tx.execute(
                "INSERT INTO memory_sources \
                     (memory_id, conversation_id, turn_number, role, content, timestamp) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![memory_id, conversation_id, turn_number, role.as_str(), content, now],
            )
            .map_err(|e| MemoryError::from_sql("insert source", e))?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// Attribution rows for a memory, ordered by turn number.
    pub fn sources_for(&self, memory_id: i64) -> Result<Vec<MemorySource>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT memory_id, conversation_id, turn_number, role, content, timestamp \
                 FROM memory_sources WHERE memory_id = ?1 ORDER BY turn_number ASC",
            )
            .map_err(|e| MemoryError::from_sql("prepare sources query", e))?;
        let rows = stmt
            .query_map(params![memory_id], row_to_source)
            .map_err(|e| MemoryError::from_sql("query sources", e))?;

        let mut sources = Vec::new();
        for row in rows {
            sources.push(row.map_err(|e| MemoryError::from_sql("read source row", e))?);
        }
        Ok(sources)
    }

    fn query_items(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<MemoryItem>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| MemoryError::from_sql("prepare item query", e))?;
        let rows = stmt
            .query_map(args, row_to_item)
            .map_err(|e| MemoryError::from_sql("query items", e))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(|e| MemoryError::from_sql("read item row", e))?);
        }
        Ok(items)
    }
}

/// Run `op` inside a BEGIN IMMEDIATE transaction. On error the transaction
/// rolls back via drop, which never raises.
fn with_immediate_tx<T>(
    conn: &mut Connection,
    context: &str,
    op: impl FnOnce(&Transaction<'_>) -> Result<T>,
) -> Result<T> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| MemoryError::from_sql(context, e))?;
    let value = op(&tx)?;
    tx.commit().map_err(|e| MemoryError::from_sql(context, e))?;
    Ok(value)
}

fn fetch_item(conn: &Connection, id: i64) -> Result<Option<MemoryItem>> {
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM memory_items WHERE id = ?1"),
        params![id],
        row_to_item,
    )
    .optional()
    .map_err(|e| MemoryError::from_sql("fetch item", e))
}

fn fetch_canonical(conn: &Connection, key: &str, layer: KeyLayer) -> Result<Option<MemoryItem>> {
    conn.query_row(
        &format!(
            "SELECT {ITEM_COLUMNS} FROM memory_items \
             WHERE key = ?1 AND key_layer = ?2 \
               AND is_canonical = TRUE AND status = 'final'"
        ),
        params![key, layer.as_str()],
        row_to_item,
    )
    .optional()
    .map_err(|e| MemoryError::from_sql("fetch canonical", e))
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<MemoryItem> {
    let layer: String = row.get(2)?;
    let ty: String = row.get(5)?;
    let status: String = row.get(6)?;
    let confidence: String = row.get(9)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;
    Ok(MemoryItem {
        id: row.get(0)?,
        key: row.get(1)?,
        key_layer: KeyLayer::parse(&layer).ok_or_else(|| invalid_enum(2, &layer))?,
        title: row.get(3)?,
        content: row.get(4)?,
        item_type: ItemType::parse(&ty).ok_or_else(|| invalid_enum(5, &ty))?,
        status: ItemStatus::parse(&status).ok_or_else(|| invalid_enum(6, &status))?,
        is_canonical: row.get(7)?,
        supersedes: row.get(8)?,
        confidence: Confidence::parse(&confidence).ok_or_else(|| invalid_enum(9, &confidence))?,
        conversation_id: row.get(10)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_source(row: &Row<'_>) -> rusqlite::Result<MemorySource> {
    let role: String = row.get(3)?;
    let timestamp: String = row.get(5)?;
    Ok(MemorySource {
        memory_id: row.get(0)?,
        conversation_id: row.get(1)?,
        turn_number: row.get(2)?,
        role: Role::parse(&role).ok_or_else(|| invalid_enum(3, &role))?,
        content: row.get(4)?,
        timestamp: parse_timestamp(&timestamp),
    })
}

fn invalid_enum(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unexpected stored value: {value}").into(),
    )
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;
    use pretty_assertions::assert_eq;

    fn store() -> VersionStore {
        VersionStore::in_memory(RuleConfig::default()).expect("open store")
    }

    fn canonical_count(store: &VersionStore, key: &str, layer: KeyLayer) -> i64 {
        store
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM memory_items \
                 WHERE key = ?1 AND key_layer = ?2 \
                   AND is_canonical = TRUE AND status = 'final'",
                params![key, layer.as_str()],
                |row| row.get(0),
            )
            .expect("count")
    }

    #[test]
    fn test_insert_draft_classifies_and_persists() {
        let mut store = store();
        let id = store
            .insert_draft(
                "タイムアウト設定",
                "接続タイムアウトは30秒に統一します",
                None,
                Some("conv-1"),
            )
            .expect("insert");

        let item = store.get_item(id).expect("get").expect("exists");
        assert_eq!(item.key, "timeout_and_retry_policy");
        assert_eq!(item.key_layer, KeyLayer::Operation);
        assert_eq!(item.status, ItemStatus::Draft);
        assert!(!item.is_canonical);
        assert_eq!(item.conversation_id.as_deref(), Some("conv-1"));
    }

    #[test]
    fn test_unmatched_text_lands_in_misc_bucket() {
        let mut store = store();
        let id = store
            .insert_draft("xyzzy", "plugh", None, None)
            .expect("insert");
        let item = store.get_item(id).expect("get").expect("exists");
        assert_eq!(item.key, "misc_operation");
        assert_eq!(item.key_layer, KeyLayer::Operation);

        // Key assignment is total: even empty text gets the misc bucket.
        let (key, layer) = store.suggest_key("", "");
        assert_eq!(key, "misc_operation");
        assert_eq!(layer, KeyLayer::Operation);
    }

    #[test]
    fn test_similarity_tier_reuses_existing_key() {
        let mut store = store();
        // Canonical record whose key comes from the map tier but whose title
        // carries tokens the map knows nothing about.
        let id = store
            .insert_draft("zorbit gizmo タイムアウト", "タイムアウトは30秒", None, None)
            .expect("insert");
        store.finalize(id).expect("finalize");

        // "zorbit gizmo plan" misses the map entirely; the similarity tier
        // lands it on the existing key instead of the misc bucket.
        let (key, layer) = store.suggest_key("zorbit gizmo plan", "");
        assert_eq!(key, "timeout_and_retry_policy");
        assert_eq!(layer, KeyLayer::Operation);
    }

    #[test]
    fn test_finalize_promotes_and_demotes() {
        let mut store = store();
        let first = store
            .insert_draft("タイムアウト設定", "30秒", None, None)
            .expect("insert");
        let promoted = store.finalize(first).expect("finalize");
        assert_eq!(promoted.status, ItemStatus::Final);
        assert!(promoted.is_canonical);

        let second = store
            .insert_draft("タイムアウト設定", "60秒に変更", None, None)
            .expect("insert");
        store.finalize(second).expect("finalize second");

        let old = store.get_item(first).expect("get").expect("exists");
        assert_eq!(old.status, ItemStatus::Obsolete);
        assert!(!old.is_canonical);
        assert_eq!(
            canonical_count(&store, "timeout_and_retry_policy", KeyLayer::Operation),
            1
        );
        let canonical = store
            .canonical("timeout_and_retry_policy", KeyLayer::Operation)
            .expect("canonical")
            .expect("exists");
        assert_eq!(canonical.id, second);
    }

    #[test]
    fn test_finalize_missing_id_is_not_found() {
        let mut store = store();
        let err = store.finalize(9999).expect_err("should fail");
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_finalize_twice_is_invalid_state() {
        let mut store = store();
        let id = store
            .insert_draft("タイムアウト設定", "30秒", None, None)
            .expect("insert");
        store.finalize(id).expect("finalize");

        let err = store.finalize(id).expect_err("should fail");
        assert_eq!(err.category(), ErrorCategory::InvalidState);
        // The canonical row is unaffected.
        let item = store.get_item(id).expect("get").expect("exists");
        assert!(item.is_canonical);
    }

    #[test]
    fn test_supersede_links_and_appends_provenance() {
        let mut store = store();
        let old_id = store
            .insert_draft(
                "ポート設定",
                "ポートは11111を使用する",
                None,
                Some("conv-old"),
            )
            .expect("insert");
        store.finalize(old_id).expect("finalize");

        let new_id = store
            .supersede(old_id, "ポート設定", "ポートは22222に統一します", "conv-new")
            .expect("supersede");

        let old = store.get_item(old_id).expect("get").expect("exists");
        assert_eq!(old.status, ItemStatus::Obsolete);
        assert!(!old.is_canonical);

        let new = store.get_item(new_id).expect("get").expect("exists");
        assert_eq!(new.status, ItemStatus::Final);
        assert!(new.is_canonical);
        assert_eq!(new.supersedes, Some(old_id));
        assert_eq!(new.key, old.key);
        assert_eq!(new.key_layer, old.key_layer);
        assert!(new.content.starts_with("ポートは22222に統一します"));
        assert!(new.content.contains("（更新履歴）"));
        assert!(new.content.contains("元会話ID=conv-old"));
        assert!(new.content.contains("会話ID=conv-new"));
        assert_eq!(canonical_count(&store, &new.key, new.key_layer), 1);
    }

    #[test]
    fn test_supersede_without_prior_conversation_notes_unknown() {
        let mut store = store();
        let old_id = store
            .insert_draft("ポート設定", "ポートは11111を使用する", None, None)
            .expect("insert");
        store.finalize(old_id).expect("finalize");

        let new_id = store
            .supersede(old_id, "ポート設定", "22222に変更", "conv-new")
            .expect("supersede");
        let new = store.get_item(new_id).expect("get").expect("exists");
        assert!(new.content.contains("元会話ID=不明"));
    }

    #[test]
    fn test_supersede_twice_is_invalid_state() {
        let mut store = store();
        let old_id = store
            .insert_draft("ポート設定", "ポートは11111を使用する", None, None)
            .expect("insert");
        store.finalize(old_id).expect("finalize");
        store
            .supersede(old_id, "ポート設定", "22222", "conv")
            .expect("supersede");

        let err = store
            .supersede(old_id, "ポート設定", "33333", "conv")
            .expect_err("should fail");
        assert_eq!(err.category(), ErrorCategory::InvalidState);
    }

    #[test]
    fn test_supersede_draft_is_invalid_state() {
        let mut store = store();
        let id = store
            .insert_draft("ポート設定", "ポートは11111を使用する", None, None)
            .expect("insert");
        let err = store
            .supersede(id, "ポート設定", "22222", "conv")
            .expect_err("should fail");
        assert_eq!(err.category(), ErrorCategory::InvalidState);
    }

    #[test]
    fn test_search_scopes_to_canonical_final() {
        let mut store = store();
        let id = store
            .insert_draft("デプロイ手順", "デプロイの手順は以下の通り", None, None)
            .expect("insert");
        store.finalize(id).expect("finalize");
        store
            .insert_draft("デプロイ手順メモ", "デプロイの下書き", None, None)
            .expect("draft stays invisible");

        let hits = store.search("デプロイ", None, 10).expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
    }

    #[test]
    fn test_search_type_filter() {
        let mut store = store();
        let id = store
            .insert_draft(
                "デプロイ手順",
                "デプロイの手順は以下の通り",
                Some(ItemType::Procedure),
                None,
            )
            .expect("insert");
        store.finalize(id).expect("finalize");

        assert_eq!(
            store
                .search("デプロイ", Some(ItemType::Procedure), 10)
                .expect("search")
                .len(),
            1
        );
        assert!(
            store
                .search("デプロイ", Some(ItemType::Config), 10)
                .expect("search")
                .is_empty()
        );
    }

    #[test]
    fn test_recent_context_layer_filter() {
        let mut store = store();
        let op = store
            .insert_draft("タイムアウト設定", "30秒", None, None)
            .expect("insert");
        store.finalize(op).expect("finalize");
        let cons = store
            .insert_draft("アーキテクチャ方針", "モノリスを維持する", None, None)
            .expect("insert");
        store.finalize(cons).expect("finalize");

        let operation = store
            .recent_context(Some(KeyLayer::Operation), 10)
            .expect("recent");
        assert!(operation.iter().all(|i| i.key_layer == KeyLayer::Operation));

        let all = store.recent_context(None, 10).expect("recent");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_list_drafts_newest_first() {
        let mut store = store();
        store
            .insert_draft("下書き1", "内容1", None, None)
            .expect("insert");
        store
            .insert_draft("下書き2", "内容2", None, None)
            .expect("insert");

        let drafts = store.list_drafts().expect("list");
        assert_eq!(drafts.len(), 2);
        assert!(drafts.iter().all(|d| d.status == ItemStatus::Draft));
        assert!(drafts[0].id >= drafts[1].id);
    }

    #[test]
    fn test_sources_round_trip_ordered_by_turn() {
        let mut store = store();
        let id = store
            .insert_draft("タイムアウト設定", "30秒", None, None)
            .expect("insert");
        store
            .add_source(id, "conv-1", 2, Role::Assistant, "30秒に統一します")
            .expect("source");
        store
            .add_source(id, "conv-1", 1, Role::User, "タイムアウトは？")
            .expect("source");

        let sources = store.sources_for(id).expect("sources");
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].turn_number, 1);
        assert_eq!(sources[0].role, Role::User);
        assert_eq!(sources[1].turn_number, 2);
    }

    #[test]
    fn test_add_source_for_missing_memory_is_constraint() {
        let mut store = store();
        let err = store
            .add_source(424242, "conv", 1, Role::User, "x")
            .expect_err("should fail");
        assert_eq!(err.category(), ErrorCategory::ConstraintViolation);
    }
}
