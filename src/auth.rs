//! Bearer-credential identity.
//!
//! Tokens are issued elsewhere; this service only verifies them. The
//! [`Actor`] extractor turns an `Authorization: Bearer <jwt>` header into
//! the caller's user id and role.

use std::fmt;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::domain::UserId;
use crate::error::CommerceError;

/// Platform role carried in the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Buyer.
    Fan,
    /// Seller of merchandise and tickets.
    Artist,
    /// Platform administrator.
    Admin,
}

/// Authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// Caller's user id.
    pub user_id: UserId,
    /// Caller's role.
    pub role: Role,
}

impl Actor {
    /// Whether the caller is a platform administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether the caller may act for the owner of a catalog entity.
    #[must_use]
    pub fn acts_for(&self, seller_id: UserId) -> bool {
        self.is_admin() || self.user_id == seller_id
    }

    /// Fails with [`CommerceError::Forbidden`] unless the caller is an admin.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Forbidden`] for non-admin callers.
    pub fn require_admin(&self) -> Result<(), CommerceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(CommerceError::Forbidden("administrator role required".into()))
        }
    }
}

/// Verifies a bearer credential and returns the identity it carries.
pub trait IdentityVerifier: Send + Sync + fmt::Debug {
    /// Verifies `token`.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Unauthorized`] for any invalid or expired token.
    fn verify(&self, token: &str) -> Result<Actor, CommerceError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    role: Role,
    exp: i64,
}

/// HS256 JWT verifier over a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

impl JwtVerifier {
    /// Creates a verifier for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation,
        }
    }

    /// Signs a credential for `actor` valid for `ttl_secs`. Used by local
    /// tooling and tests; production tokens come from the identity provider.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Internal`] if encoding fails.
    pub fn sign(&self, actor: Actor, ttl_secs: i64) -> Result<String, CommerceError> {
        let claims = Claims {
            sub: *actor.user_id.as_uuid(),
            role: actor.role,
            exp: Utc::now().timestamp().saturating_add(ttl_secs),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| CommerceError::Internal(format!("token encoding failed: {e}")))
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Actor, CommerceError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "bearer token rejected");
                CommerceError::Unauthorized
            })?;
        Ok(Actor {
            user_id: data.claims.sub.into(),
            role: data.claims.role,
        })
    }
}

fn bearer(parts: &Parts) -> Option<&str> {
    let token = parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .trim()
        .strip_prefix("Bearer ")?
        .trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for Actor {
    type Rejection = CommerceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or(CommerceError::Unauthorized)?;
        state.identity.verify(token)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(h) = header {
            builder = builder.header(AUTHORIZATION, h);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn signed_token_round_trips() {
        let verifier = JwtVerifier::new(b"secret");
        let actor = Actor {
            user_id: UserId::new(),
            role: Role::Artist,
        };
        let token = verifier.sign(actor, 60).unwrap();
        assert_eq!(verifier.verify(&token).unwrap(), actor);
    }

    #[test]
    fn foreign_key_is_rejected() {
        let actor = Actor {
            user_id: UserId::new(),
            role: Role::Admin,
        };
        let token = JwtVerifier::new(b"other").sign(actor, 60).unwrap();
        let Err(err) = JwtVerifier::new(b"secret").verify(&token) else {
            panic!("token signed with another key must fail");
        };
        assert!(matches!(err, CommerceError::Unauthorized));
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = JwtVerifier::new(b"secret");
        let actor = Actor {
            user_id: UserId::new(),
            role: Role::Fan,
        };
        let token = verifier.sign(actor, -3_600).unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn bearer_scheme_is_required() {
        assert_eq!(bearer(&parts(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer(&parts(Some("Basic abc"))), None);
        assert_eq!(bearer(&parts(Some("Bearer   "))), None);
        assert_eq!(bearer(&parts(None)), None);
    }

    #[test]
    fn sellers_act_only_for_themselves() {
        let seller = UserId::new();
        let artist = Actor {
            user_id: seller,
            role: Role::Artist,
        };
        let other = Actor {
            user_id: UserId::new(),
            role: Role::Artist,
        };
        let admin = Actor {
            user_id: UserId::new(),
            role: Role::Admin,
        };
        assert!(artist.acts_for(seller));
        assert!(!other.acts_for(seller));
        assert!(admin.acts_for(seller));
        assert!(other.require_admin().is_err());
    }
}
