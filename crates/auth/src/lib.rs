//! `quickdrop-auth`: who is calling and what they may do.
//!
//! Tokens are minted elsewhere; this crate verifies them, turns claims into a
//! [`Principal`], and answers permission checks. It has no HTTP or storage
//! dependencies.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use policy::{default_role_permissions, permissions_for_roles, principal_from_claims};
pub use principal::{Principal, TenantMembership};
pub use roles::Role;
pub use user::{User, UserCommand, UserEvent, UserStatus};
