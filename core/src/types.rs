//! Typed records for the knowledge store.
//!
//! Rows are converted into these types once, at the storage boundary; the
//! rest of the crate never touches dynamic row access.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical layer a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyLayer {
    /// High-level architecture decisions
    Constitution,
    /// Operational/runtime detail
    Operation,
}

impl KeyLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constitution => "constitution",
            Self::Operation => "operation",
        }
    }

    /// Parse from the stored string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "constitution" => Some(Self::Constitution),
            "operation" => Some(Self::Operation),
            _ => None,
        }
    }
}

impl fmt::Display for KeyLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for KeyLayer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(&s.to_lowercase()).ok_or_else(|| format!("unknown key layer: {s}"))
    }
}

/// Semantic type of a knowledge item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// A decision taken (subsumes the others when ambiguous)
    Decision,
    /// A configuration fact
    Config,
    /// A procedure or runbook step
    Procedure,
    /// A design note, principle, or philosophy
    DesignNote,
}

impl ItemType {
    /// All types in fixed priority order (highest first).
    ///
    /// This order is also the tie-break for type classification.
    pub const PRIORITY_ORDER: [ItemType; 4] = [
        Self::Decision,
        Self::Config,
        Self::Procedure,
        Self::DesignNote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Config => "config",
            Self::Procedure => "procedure",
            Self::DesignNote => "design_note",
        }
    }

    /// Parse from the stored string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "decision" => Some(Self::Decision),
            "config" => Some(Self::Config),
            "procedure" => Some(Self::Procedure),
            "design_note" => Some(Self::DesignNote),
            _ => None,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(&s.to_lowercase()).ok_or_else(|| format!("unknown item type: {s}"))
    }
}

/// Lifecycle status of a record
///
/// Transitions only flow draft → final → obsolete; obsolete is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Unconfirmed candidate, not yet authoritative
    Draft,
    /// Confirmed; the canonical one per (key, layer) is authoritative
    Final,
    /// Superseded or demoted history row; never revived
    Obsolete,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Final => "final",
            Self::Obsolete => "obsolete",
        }
    }

    /// Parse from the stored string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "final" => Some(Self::Final),
            "obsolete" => Some(Self::Obsolete),
            _ => None,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Confidence level assigned by the text classifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Med,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Med => "MED",
            Self::Low => "LOW",
        }
    }

    /// Parse from the stored string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HIGH" => Some(Self::High),
            "MED" => Some(Self::Med),
            "LOW" => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Speaker role in a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse from the stored string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A versioned knowledge record
#[derive(Debug, Clone, Serialize)]
pub struct MemoryItem {
    pub id: i64,
    pub key: String,
    pub key_layer: KeyLayer,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub status: ItemStatus,
    pub is_canonical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<i64>,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Attribution record: the conversation turn(s) a memory was derived from.
///
/// Owned exclusively by its `MemoryItem` (cascades on delete).
#[derive(Debug, Clone, Serialize)]
pub struct MemorySource {
    pub memory_id: i64,
    pub conversation_id: String,
    pub turn_number: i64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A single turn of a conversation log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub conversation_id: String,
    pub turn_number: i64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A save candidate mined from a conversation log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub confidence: Confidence,
}
