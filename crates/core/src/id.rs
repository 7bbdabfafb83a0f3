//! Identifiers shared across the marketplace.
//!
//! All ids are UUIDv7 so that ids generated on one node sort by creation time.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// A marketplace instance. Every record and every token belongs to exactly one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

/// A signed-in person: customer, agent, store owner or admin.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

/// Identifier of an event stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

macro_rules! uuid_id {
    ($t:ident) => {
        impl $t {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s)
                    .map(Self)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {e}", stringify!($t))))
            }
        }
    };
}

uuid_id!(TenantId);
uuid_id!(UserId);
uuid_id!(AggregateId);

impl AggregateId {
    /// Stream of a per-user aggregate such as an agent profile or wallet.
    ///
    /// Name-based (v5) under the user's id, so each aggregate type gets its
    /// own stream and none of them collide with the user's own stream.
    pub fn for_user(aggregate_type: &str, user_id: UserId) -> Self {
        Self(Uuid::new_v5(&user_id.0, aggregate_type.as_bytes()))
    }
}

/// The user aggregate itself lives on the user's id.
impl From<UserId> for AggregateId {
    fn from(value: UserId) -> Self {
        Self(value.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_garbage_with_type_name() {
        let err = "not-a-uuid".parse::<TenantId>().unwrap_err();
        match err {
            DomainError::InvalidId(msg) => assert!(msg.starts_with("TenantId")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn display_round_trips_through_from_str() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn user_stream_id_shares_uuid() {
        let user = UserId::new();
        let agg = AggregateId::from(user);
        assert_eq!(agg.as_uuid(), user.as_uuid());
    }

    #[test]
    fn per_user_streams_are_distinct_per_aggregate_type() {
        let user = UserId::new();
        let profile = AggregateId::for_user("agents.profile", user);
        let wallet = AggregateId::for_user("agents.wallet", user);

        assert_ne!(profile, wallet);
        assert_ne!(profile, AggregateId::from(user));
        assert_ne!(wallet, AggregateId::from(user));
        assert_eq!(profile, AggregateId::for_user("agents.profile", user));
    }
}
