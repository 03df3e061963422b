use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two fixed sides of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyKind {
    Requester,
    Server,
}

impl PartyKind {
    /// The side opposite to `self`. All "who is the other party" decisions go through here.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Requester => Self::Server,
            Self::Server => Self::Requester,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requester => "REQUESTER",
            Self::Server => "SERVER",
        }
    }
}

impl fmt::Display for PartyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REQUESTER" => Ok(Self::Requester),
            "SERVER" => Ok(Self::Server),
            other => Err(format!("unknown party kind: {other}")),
        }
    }
}

/// Who authored a message. `System` messages belong to neither side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderKind {
    Requester,
    Server,
    System,
}

impl SenderKind {
    /// The side this sender belongs to, if any.
    #[must_use]
    pub const fn side(self) -> Option<PartyKind> {
        match self {
            Self::Requester => Some(PartyKind::Requester),
            Self::Server => Some(PartyKind::Server),
            Self::System => None,
        }
    }

    /// Whether a message from this sender counts as unread for `side`.
    #[must_use]
    pub fn counts_for(self, side: PartyKind) -> bool {
        self.side() != Some(side)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requester => "REQUESTER",
            Self::Server => "SERVER",
            Self::System => "SYSTEM",
        }
    }
}

impl From<PartyKind> for SenderKind {
    fn from(kind: PartyKind) -> Self {
        match kind {
            PartyKind::Requester => Self::Requester,
            PartyKind::Server => Self::Server,
        }
    }
}

impl FromStr for SenderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUESTER" => Ok(Self::Requester),
            "SERVER" => Ok(Self::Server),
            "SYSTEM" => Ok(Self::System),
            other => Err(format!("unknown sender kind: {other}")),
        }
    }
}

/// A pre-authenticated caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Party {
    pub id: i64,
    pub kind: PartyKind,
}

impl Party {
    #[must_use]
    pub const fn new(id: i64, kind: PartyKind) -> Self {
        Self { id, kind }
    }

    #[must_use]
    pub const fn requester(id: i64) -> Self {
        Self::new(id, PartyKind::Requester)
    }

    #[must_use]
    pub const fn server(id: i64) -> Self {
        Self::new(id, PartyKind::Server)
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
