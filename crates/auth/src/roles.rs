use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Marketplace role carried in tokens and on user records.
///
/// Stored as an opaque string so tokens with roles this build does not know
/// about still decode; [`crate::policy`] simply grants them nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const STORE: Role = Role(Cow::Borrowed("store"));
    pub const AGENT: Role = Role(Cow::Borrowed("agent"));
    pub const CUSTOMER: Role = Role(Cow::Borrowed("customer"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// One of the four roles the marketplace understands.
    pub fn is_known(&self) -> bool {
        matches!(self.as_str(), "admin" | "store" | "agent" | "customer")
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
