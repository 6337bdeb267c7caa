//! Strongly-typed identifiers for SDP entities
//!
//! All IDs are UUID-based but wrapped in newtype structs for type safety.
//! `Display` adds a short prefix; `FromStr` accepts the prefixed or the bare
//! UUID form so operators can paste either.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when an identifier string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} identifier: {value}")]
pub struct IdParseError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, ":")).unwrap_or(s);
                Uuid::parse_str(raw).map(Self).map_err(|_| IdParseError {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a deployment attempt
    DeploymentId,
    "deploy",
    "deployment"
);

uuid_id!(
    /// Unique identifier for a pre-deploy snapshot
    SnapshotId,
    "snap",
    "snapshot"
);

uuid_id!(
    /// Unique identifier for a scheduled deployment
    ScheduleId,
    "sched",
    "schedule"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_prefix() {
        let id = DeploymentId::generate();
        assert!(id.to_string().starts_with("deploy:"));
        assert!(SnapshotId::generate().to_string().starts_with("snap:"));
        assert!(ScheduleId::generate().to_string().starts_with("sched:"));
    }

    #[test]
    fn parse_accepts_prefixed_and_bare() {
        let id = ScheduleId::generate();
        let prefixed: ScheduleId = id.to_string().parse().unwrap();
        let bare: ScheduleId = id.as_uuid().to_string().parse().unwrap();
        assert_eq!(prefixed, id);
        assert_eq!(bare, id);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "sched:not-a-uuid".parse::<ScheduleId>().unwrap_err();
        assert_eq!(err.kind, "schedule");
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let id = SnapshotId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }
}
