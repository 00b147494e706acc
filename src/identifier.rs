//! Dual name-or-ID resource addressing.
//!
//! Several resource kinds (projects, users, teams, roles, runs) are
//! addressable both by UUID and by unique name. Callers hand the store a
//! single discriminated identifier; the store resolves it to a canonical ID
//! once at its boundary instead of threading string/UUID ambiguity through
//! every signature.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A resource identifier: either a canonical UUID or a unique name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NameOrId {
    Id(Uuid),
    Name(String),
}

impl NameOrId {
    pub fn as_id(&self) -> Option<Uuid> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Name(name) => Some(name),
        }
    }
}

impl From<Uuid> for NameOrId {
    fn from(id: Uuid) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for NameOrId {
    fn from(value: &str) -> Self {
        value.parse::<Uuid>().map_or_else(|_| Self::Name(value.to_string()), Self::Id)
    }
}

impl From<String> for NameOrId {
    fn from(value: String) -> Self {
        value.parse::<Uuid>().map_or(Self::Name(value), Self::Id)
    }
}

impl fmt::Display for NameOrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_strings_parse_as_ids() {
        let id = Uuid::new_v4();
        assert_eq!(NameOrId::from(id.to_string()), NameOrId::Id(id));
    }

    #[test]
    fn other_strings_parse_as_names() {
        assert_eq!(
            NameOrId::from("training-pipeline"),
            NameOrId::Name("training-pipeline".to_string())
        );
    }
}
