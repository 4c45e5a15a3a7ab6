//! Persistent knowledge store for conversational agents.
//!
//! Records are versioned, never destructively edited: a draft is promoted to
//! the single canonical final record of its (key, layer), and later versions
//! supersede it while keeping the full history chain. Key assignment,
//! type/confidence classification, and suggestion extraction are rule-table
//! driven and injectable through [`config::RuleConfig`].

pub mod classify;
pub mod config;
pub mod convlog;
pub mod errors;
pub mod extract;
pub mod index;
pub mod keys;
pub mod store;
pub mod types;

pub use config::RuleConfig;
pub use errors::ErrorCategory;
pub use errors::MemoryError;
pub use errors::Result;
pub use extract::extract_suggestions;
pub use index::KeyMatch;
pub use index::SimilarityIndex;
pub use store::VersionStore;
pub use types::Confidence;
pub use types::ConversationTurn;
pub use types::ItemStatus;
pub use types::ItemType;
pub use types::KeyLayer;
pub use types::MemoryItem;
pub use types::MemorySource;
pub use types::Role;
pub use types::Suggestion;
