use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one authenticated client instance.
///
/// A process may hold several independent clients for the same user, so the
/// lifecycle registry keys managers by this caller-chosen id rather than by user.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Short random id for clients that have no natural name.
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(10))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}
