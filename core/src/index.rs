//! Full-text similarity index over canonical knowledge.
//!
//! The FTS5 table is an external-content mirror of `memory_items` and is
//! kept in sync by explicit hooks, invoked by the store after each write
//! transaction commits. A crash between commit and hook leaves the mirror
//! stale; [`SimilarityIndex::rebuild`] restores it from the base table.

use rusqlite::Connection;
use rusqlite::params;
use tracing::debug;

use crate::errors::MemoryError;
use crate::errors::Result;
use crate::keys::alphanumeric_tokens;
use crate::types::KeyLayer;

/// Maximum number of query tokens fed into the FTS match expression.
const MAX_QUERY_TOKENS: usize = 3;

/// A (key, layer) candidate produced by a similarity query, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyMatch {
    pub key: String,
    pub layer: KeyLayer,
    /// Aggregated bm25 score; lower is better.
    pub score: f64,
}

/// Stateless facade over the `memory_items_fts` mirror.
pub struct SimilarityIndex;

impl SimilarityIndex {
    /// Mirror a freshly inserted row.
    pub fn on_insert(conn: &Connection, id: i64, title: &str, content: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO memory_items_fts (rowid, title, content) VALUES (?1, ?2, ?3)",
            params![id, title, content],
        )
        .map_err(|e| MemoryError::from_sql("index insert", e))?;
        Ok(())
    }

    /// Remove a row from the mirror. External-content FTS5 deletes need the
    /// old column values, so callers must pass the pre-delete title/content.
    pub fn on_delete(conn: &Connection, id: i64, title: &str, content: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO memory_items_fts (memory_items_fts, rowid, title, content)
             VALUES ('delete', ?1, ?2, ?3)",
            params![id, title, content],
        )
        .map_err(|e| MemoryError::from_sql("index delete", e))?;
        Ok(())
    }

    /// Re-mirror an updated row as delete-then-reinsert, which keeps the
    /// external-content mirror consistent even when only some columns moved.
    pub fn on_update(
        conn: &Connection,
        id: i64,
        old_title: &str,
        old_content: &str,
        new_title: &str,
        new_content: &str,
    ) -> Result<()> {
        Self::on_delete(conn, id, old_title, old_content)?;
        Self::on_insert(conn, id, new_title, new_content)
    }

    /// Discard the mirror and repopulate it from `memory_items`.
    pub fn rebuild(conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO memory_items_fts (memory_items_fts) VALUES ('rebuild')",
            [],
        )
        .map_err(|e| MemoryError::from_sql("index rebuild", e))?;
        debug!("similarity index rebuilt from base table");
        Ok(())
    }

    /// Rank (key, layer) pairs of canonical-final items by similarity to
    /// `text`.
    ///
    /// The match expression is a prefix disjunction over the first
    /// [`MAX_QUERY_TOKENS`] alphanumeric tokens of `text`; rows of the same
    /// key collapse to their best bm25 score. Text with no tokens yields no
    /// candidates without touching the index.
    pub fn query(conn: &Connection, text: &str, limit: usize) -> Result<Vec<KeyMatch>> {
        let tokens = alphanumeric_tokens(text);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let match_expr = tokens
            .iter()
            .take(MAX_QUERY_TOKENS)
            .map(|t| format!("{t}*"))
            .collect::<Vec<_>>()
            .join(" OR ");

        // bm25() is only valid inside a full-text query, so the score is
        // computed in an FTS subquery and aggregated outside. The subquery
        // must be MATERIALIZED: a plain subquery gets flattened into the
        // outer join, evaluating bm25() outside full-text context.
        let mut stmt = conn
            .prepare(
                "WITH f(rowid, score) AS MATERIALIZED
                     (SELECT rowid, bm25(memory_items_fts)
                      FROM memory_items_fts
                      WHERE memory_items_fts MATCH ?1)
                 SELECT m.key, m.key_layer, MIN(f.score) AS score
                 FROM f
                 JOIN memory_items m ON m.id = f.rowid
                 WHERE m.is_canonical = TRUE
                   AND m.status = 'final'
                 GROUP BY m.key, m.key_layer
                 ORDER BY score ASC
                 LIMIT ?2",
            )
            .map_err(|e| MemoryError::index_query(format!("prepare similarity query: {e}")))?;

        let rows = stmt
            .query_map(params![match_expr, limit as i64], |row| {
                let layer: String = row.get(1)?;
                Ok((row.get::<_, String>(0)?, layer, row.get::<_, f64>(2)?))
            })
            .map_err(|e| MemoryError::index_query(format!("similarity query failed: {e}")))?;

        let mut matches = Vec::new();
        for row in rows {
            let (key, layer, score) =
                row.map_err(|e| MemoryError::index_query(format!("similarity row: {e}")))?;
            let layer = KeyLayer::parse(&layer)
                .ok_or_else(|| MemoryError::index_query(format!("unknown key layer: {layer}")))?;
            matches.push(KeyMatch { key, layer, score });
        }
        debug!(match_expr, hits = matches.len(), "similarity query");
        Ok(matches)
    }
}
