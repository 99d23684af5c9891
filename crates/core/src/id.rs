//! Unique identifiers for Questline entities.
//!
//! Identifiers are assigned by the remote quest API and treated as opaque
//! strings on the client.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an identifier issued by the server.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Mint a fresh identifier (used by in-process gateways).
            pub fn generate() -> Self {
                Self(Ulid::new().to_string())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Unique identifier for a Goal
    GoalId
);

string_id!(
    /// Unique identifier for a Milestone
    MilestoneId
);

string_id!(
    /// Unique identifier for a Task
    TaskId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = GoalId::new("g-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"g-1\"");

        let back: GoalId = serde_json::from_str("\"g-1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(TaskId::generate(), TaskId::generate());
    }
}
