use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::CONVERSATION_ID_SEPARATOR;
use crate::error::IdError;

// Stable account identifier issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap an identifier. The conversation separator is
    /// reserved so that two different pairs can never produce the same
    /// conversation id.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        if s.contains(CONVERSATION_ID_SEPARATOR) {
            return Err(IdError::ReservedSeparator(CONVERSATION_ID_SEPARATOR));
        }
        Ok(Self(s.to_string()))
    }

    /// Fresh random identifier (hyphen-free UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines. Ids are free-form text, so
    /// the cut falls on a character boundary.
    pub fn short(&self) -> &str {
        self.0
            .char_indices()
            .nth(8)
            .map_or(self.as_str(), |(end, _)| &self.0[..end])
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::str::FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Identifier of the single conversation between two users.
///
/// It is a pure function of the participant set: the two user ids are
/// ordered lexicographically and joined with [`CONVERSATION_ID_SEPARATOR`],
/// so `between(a, b) == between(b, a)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId(String);

impl ConversationId {
    pub fn between(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{lo}{CONVERSATION_ID_SEPARATOR}{hi}"))
    }

    /// Parse a stored id, checking that it is in canonical form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let (a, b) = s
            .split_once(CONVERSATION_ID_SEPARATOR)
            .ok_or_else(|| IdError::MalformedConversation(s.to_string()))?;
        let a = UserId::parse(a).map_err(|_| IdError::MalformedConversation(s.to_string()))?;
        let b = UserId::parse(b).map_err(|_| IdError::MalformedConversation(s.to_string()))?;
        let canonical = Self::between(&a, &b);
        if canonical.0 != s {
            return Err(IdError::MalformedConversation(s.to_string()));
        }
        Ok(canonical)
    }

    /// The two participants, in canonical (sorted) order.
    pub fn participants(&self) -> (UserId, UserId) {
        match self.0.split_once(CONVERSATION_ID_SEPARATOR) {
            Some((a, b)) => (UserId(a.to_string()), UserId(b.to_string())),
            None => (UserId(self.0.clone()), UserId(String::new())),
        }
    }

    pub fn involves(&self, user: &UserId) -> bool {
        let (a, b) = self.participants();
        &a == user || &b == user
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ConversationId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, IdError> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
