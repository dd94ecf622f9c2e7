use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::models::auth::{OrgSession, SessionClaims};

/// Extension type to carry the session-token secret through request extensions.
#[derive(Clone)]
pub struct SessionSecret(pub String);

impl<S> FromRequestParts<S> for OrgSession
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or((StatusCode::UNAUTHORIZED, "Invalid Authorization header format"))?;

        let secret = parts
            .extensions
            .get::<SessionSecret>()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Session secret not configured"))?;

        let claims = decode_session_token(token, &secret.0)
            .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid or expired token"))?;

        if !claims.approved {
            return Err((StatusCode::FORBIDDEN, "Organization membership not approved"));
        }

        let organization_id = claims
            .org_id
            .filter(|id| !id.is_empty())
            .ok_or((StatusCode::FORBIDDEN, "No organization ID found in session"))?;

        Ok(OrgSession {
            user_id: claims.sub,
            organization_id,
            email: claims.email,
            name: claims.name,
        })
    }
}

pub fn decode_session_token(token: &str, secret: &str) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    decode::<SessionClaims>(token, &key, &validation).map(|data| data.claims)
}
