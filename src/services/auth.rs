use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

/// Verified identity of the caller, taken from the access token subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: u64,
    /// "access" or "refresh"; only access tokens authorize API calls.
    #[serde(rename = "type", default)]
    token_type: String,
}

/// HS256 bearer-token verifier gating mutating endpoints.
///
/// Token issuance lives in a separate auth service; this side only checks
/// the signature, expiry, and that the token is an access token.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Resolve the caller identity from the request's Authorization header.
    pub fn current_caller(&self, headers: &HeaderMap) -> Result<Caller, AuthError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingCredentials)?
            .to_str()
            .map_err(|_| AuthError::MissingCredentials)?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MissingCredentials)?;

        let data =
            decode::<Claims>(token, &self.key, &self.validation).map_err(AuthError::Jwt)?;

        if data.claims.token_type != "access" {
            return Err(AuthError::NotAnAccessToken);
        }

        Ok(Caller {
            user_id: data.claims.sub,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing or malformed Authorization header")]
    MissingCredentials,

    #[error("token is not an access token")]
    NotAnAccessToken,

    #[error("invalid token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}
