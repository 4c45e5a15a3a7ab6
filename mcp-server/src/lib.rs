//! MCP server exposing the kioku knowledge store over stdio.
//!
//! Speaks newline-delimited JSON-RPC 2.0: one request per stdin line, one
//! response per stdout line. All diagnostics go to stderr so stdout stays a
//! clean protocol channel.

use anyhow::Context;
use kioku_core::RuleConfig;
use kioku_core::VersionStore;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tracing::info;

pub mod message_processor;
pub mod protocol;
pub mod session;
pub mod tools;

use message_processor::MessageProcessor;
use session::SessionContext;

pub async fn run_main() -> anyhow::Result<()> {
    let config = RuleConfig::load().context("load configuration")?;
    let store = VersionStore::open(config).context("open knowledge store")?;
    let session = SessionContext::new();
    info!(conversation_id = session.conversation_id(), "session started");

    let mut processor = MessageProcessor::new(store, session);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(message) = processor.process_line(&line) {
            let mut out =
                serde_json::to_string(&message).context("serialize response")?;
            out.push('\n');
            stdout
                .write_all(out.as_bytes())
                .await
                .context("write stdout")?;
            stdout.flush().await.context("flush stdout")?;
        }
    }

    info!("stdin closed; shutting down");
    Ok(())
}
