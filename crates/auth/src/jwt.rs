//! Bearer token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

/// Verifies a raw bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// Shared-secret HS256 verifier.
///
/// Signature checking is delegated to `jsonwebtoken`; the time window is
/// checked with [`validate_claims`] against the caller's clock so the result
/// is deterministic in tests.
pub struct Hs256JwtValidator {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign claims with the same secret. Used by operator tooling and tests.
    pub fn sign(&self, claims: &JwtClaims) -> Result<String, TokenValidationError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))
    }
}

impl core::fmt::Debug for Hs256JwtValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256JwtValidator").finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    TokenValidationError::BadSignature
                }
                _ => TokenValidationError::Malformed(e.to_string()),
            })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use quickdrop_core::{TenantId, UserId};

    fn claims_at(now: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: UserId::new(),
            tenant_id: TenantId::new(),
            roles: vec![Role::AGENT],
            iat: now.timestamp(),
            exp: now.timestamp() + 600,
        }
    }

    #[test]
    fn signed_token_validates() {
        let v = Hs256JwtValidator::new("secret");
        let now = Utc::now();
        let claims = claims_at(now);
        let token = v.sign(&claims).unwrap();

        assert_eq!(v.validate(&token, now).unwrap(), claims);
    }

    #[test]
    fn other_secret_is_rejected() {
        let now = Utc::now();
        let token = Hs256JwtValidator::new("a").sign(&claims_at(now)).unwrap();

        let err = Hs256JwtValidator::new("b").validate(&token, now).unwrap_err();
        assert_eq!(err, TokenValidationError::BadSignature);
    }

    #[test]
    fn expiry_uses_caller_clock() {
        let v = Hs256JwtValidator::new("secret");
        let now = Utc::now();
        let token = v.sign(&claims_at(now)).unwrap();

        let later = now + chrono::Duration::minutes(11);
        assert_eq!(v.validate(&token, later).unwrap_err(), TokenValidationError::Expired);
    }

    #[test]
    fn garbage_is_malformed() {
        let v = Hs256JwtValidator::new("secret");
        assert!(matches!(
            v.validate("not.a.jwt", Utc::now()),
            Err(TokenValidationError::Malformed(_))
        ));
    }
}
