//! ULID-based identifier generation with prefixes.
//!
//! Identifiers in nbintel follow the pattern: `prefix_ulid`
//! For example: `msg_01HQXYZ...` for chat messages.

use ulid::Ulid;

/// Known identifier prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    Session,
    Message,
    ToolCall,
    Callback,
}

impl IdPrefix {
    /// Get the string prefix for this identifier type.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::Session => "ses",
            IdPrefix::Message => "msg",
            IdPrefix::ToolCall => "call",
            IdPrefix::Callback => "cb",
        }
    }

    /// Parse a prefix from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ses" => Some(IdPrefix::Session),
            "msg" => Some(IdPrefix::Message),
            "call" => Some(IdPrefix::ToolCall),
            "cb" => Some(IdPrefix::Callback),
            _ => None,
        }
    }
}

/// Identifier generation and parsing utilities.
pub struct Identifier;

impl Identifier {
    /// Generate a new identifier with the given prefix.
    pub fn new(prefix: IdPrefix) -> String {
        let ulid = Ulid::new();
        format!("{}_{}", prefix.as_str(), ulid.to_string().to_lowercase())
    }

    /// Generate a session identifier.
    pub fn session() -> String {
        Self::new(IdPrefix::Session)
    }

    /// Generate a message identifier.
    pub fn message() -> String {
        Self::new(IdPrefix::Message)
    }

    /// Generate a tool-call identifier, used when the model omitted one.
    pub fn tool_call() -> String {
        Self::new(IdPrefix::ToolCall)
    }

    /// Generate a callback correlation identifier.
    pub fn callback() -> String {
        Self::new(IdPrefix::Callback)
    }

    /// Parse an identifier into its prefix and ULID parts.
    pub fn parse(id: &str) -> Option<(IdPrefix, Ulid)> {
        let parts: Vec<&str> = id.splitn(2, '_').collect();
        if parts.len() != 2 {
            return None;
        }
        let prefix = IdPrefix::parse(parts[0])?;
        let ulid = Ulid::from_string(&parts[1].to_uppercase()).ok()?;
        Some((prefix, ulid))
    }
}
