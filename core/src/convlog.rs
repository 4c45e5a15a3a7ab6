//! JSONL conversation logs, one file per conversation.
//!
//! The log is the extractor's input and the attribution source for saved
//! memories. Append-only; a missing or partially damaged log degrades to
//! fewer turns, never to a failed tool call.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tracing::warn;

use crate::errors::MemoryError;
use crate::errors::Result;
use crate::types::ConversationTurn;

/// Path of the log file for one conversation.
pub fn log_path(log_dir: &Path, conversation_id: &str) -> PathBuf {
    log_dir.join(format!("{conversation_id}.jsonl"))
}

/// Append one turn to its conversation's log, creating the file and parent
/// directories on first use.
pub fn append_turn(log_dir: &Path, turn: &ConversationTurn) -> Result<()> {
    std::fs::create_dir_all(log_dir).map_err(|e| {
        MemoryError::storage_with_source(
            format!("create log directory {}", log_dir.display()),
            e,
        )
    })?;

    let path = log_path(log_dir, &turn.conversation_id);
    let line = serde_json::to_string(turn)
        .map_err(|e| MemoryError::storage_with_source("serialize conversation turn", e))?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| {
            MemoryError::storage_with_source(format!("open log {}", path.display()), e)
        })?;
    writeln!(file, "{line}")
        .map_err(|e| MemoryError::storage_with_source(format!("append to {}", path.display()), e))
}

/// Load a conversation's turns in file order.
///
/// A missing log means "no conversation yet" and yields an empty vec; blank
/// and malformed lines are skipped with a warning.
pub fn load(log_dir: &Path, conversation_id: &str) -> Result<Vec<ConversationTurn>> {
    let path = log_path(log_dir, conversation_id);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "no conversation log yet");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(MemoryError::storage_with_source(
                format!("read log {}", path.display()),
                e,
            ));
        }
    };

    let mut turns = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ConversationTurn>(line) {
            Ok(turn) => turns.push(turn),
            Err(e) => {
                warn!(path = %path.display(), lineno = lineno + 1, error = %e,
                    "skipping malformed log line");
            }
        }
    }
    Ok(turns)
}
