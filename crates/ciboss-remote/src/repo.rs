//! Repository references.

use crate::error::RemoteError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A repository in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parse `owner/name`. Both parts must be non-empty and `name` may not
    /// contain a further slash.
    pub fn parse(raw: &str) -> Result<Self, RemoteError> {
        let trimmed = raw.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| RemoteError::InvalidRepository(raw.to_string()))?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(RemoteError::InvalidRepository(raw.to_string()));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoRef {
    type Err = RemoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RepoRef {
    type Error = RemoteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RepoRef> for String {
    fn from(value: RepoRef) -> Self {
        value.full_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_owner_and_name() {
        let repo = RepoRef::parse("acme/widgets").unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widgets");
        assert_eq!(repo.to_string(), "acme/widgets");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["widgets", "/widgets", "acme/", "acme/widgets/extra", ""] {
            assert!(RepoRef::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_serde_as_string() {
        let repo: RepoRef = serde_json::from_str("\"acme/widgets\"").unwrap();
        assert_eq!(repo.full_name(), "acme/widgets");
        assert_eq!(serde_json::to_string(&repo).unwrap(), "\"acme/widgets\"");
        assert!(serde_json::from_str::<RepoRef>("\"nope\"").is_err());
    }
}
