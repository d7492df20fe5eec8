//! Conversation keys
//!
//! A key is the composite `{namespace}:{host}:{port}:{kind}:{id}`. The
//! conversation id is the last segment and may itself contain `:`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_NAMESPACE: &str = "chatlist";

/// Reserved suffix for the persisted metadata index
const INDEX_SUFFIX: &str = "__index__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Public,
    Private,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatKind::Public => "public",
            ChatKind::Private => "private",
        }
    }
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(ChatKind::Public),
            "private" => Ok(ChatKind::Private),
            other => Err(format!("unknown chat kind '{}'", other)),
        }
    }
}

/// Identifies one stored message log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    namespace: String,
    host: String,
    port: u16,
    kind: ChatKind,
    chat_id: String,
}

impl ConversationKey {
    pub fn new(
        namespace: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        kind: ChatKind,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            host: host.into(),
            port,
            kind,
            chat_id: chat_id.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn kind(&self) -> ChatKind {
        self.kind
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Store key for this conversation
    pub fn storage_key(&self) -> String {
        self.to_string()
    }

    /// Parse a store key back into its parts, `None` if it isn't one of ours.
    /// The namespace is taken to be everything before the first `:`; use
    /// [`ConversationKey::parse_in`] when the namespace is known.
    pub fn parse(raw: &str) -> Option<Self> {
        let (namespace, rest) = raw.split_once(':')?;
        Self::parse_rest(namespace, rest)
    }

    /// Parse a store key that must belong to `namespace`. Both the namespace
    /// and the host may contain `:`.
    pub fn parse_in(namespace: &str, raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix(namespace)?.strip_prefix(':')?;
        Self::parse_rest(namespace, rest)
    }

    /// `rest` is `{host}:{port}:{kind}:{id}`. The host ends at the first
    /// `:` followed by a valid port and kind segment.
    fn parse_rest(namespace: &str, rest: &str) -> Option<Self> {
        if namespace.is_empty() {
            return None;
        }
        rest.match_indices(':').find_map(|(at, _)| {
            let host = &rest[..at];
            let mut tail = rest[at + 1..].splitn(3, ':');
            let port = tail.next()?.parse().ok()?;
            let kind = tail.next()?.parse().ok()?;
            let chat_id = tail.next()?;
            if host.is_empty() || chat_id.is_empty() {
                return None;
            }
            Some(Self::new(namespace, host, port, kind, chat_id))
        })
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.namespace, self.host, self.port, self.kind, self.chat_id
        )
    }
}

/// Store key holding the serialized metadata index for `namespace`
pub fn index_key(namespace: &str) -> String {
    format!("{}:{}", namespace, INDEX_SUFFIX)
}
