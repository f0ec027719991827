use std::time::Duration;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{config::UserAccount, AppState, CodiumServerError};
use crate::model::{LoginResponse, UserId};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// user id
    pub sub: String,
    pub exp: usize,
}

/// Issues and checks bearer tokens for the configured accounts.
pub struct Authenticator {
    secret: Vec<u8>,
    ttl: Duration,
    users: Vec<UserAccount>,
}

impl Authenticator {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration, users: Vec<UserAccount>) -> Self {
        Self {
            secret: secret.into(),
            ttl,
            users,
        }
    }

    pub fn hash_password(password: &str) -> String {
        hex::encode(Sha256::digest(password.as_bytes()))
    }

    pub fn login(&self, username: &str, password: &str) -> Result<LoginResponse, CodiumServerError> {
        let hashed = Self::hash_password(password);
        let user = self
            .users
            .iter()
            .find(|u| u.username == username && u.password_sha256.eq_ignore_ascii_case(&hashed))
            .ok_or(CodiumServerError::InvalidCredentials)?;
        Ok(LoginResponse {
            token: self.issue(&user.id)?,
            user_id: user.id.clone(),
        })
    }

    pub fn issue(&self, user_id: &str) -> Result<String, CodiumServerError> {
        let claims = Claims {
            sub: user_id.to_owned(),
            exp: (Utc::now().timestamp() as u64 + self.ttl.as_secs()) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| CodiumServerError::TokenValidation(e.to_string()))
    }

    /// Resolves a token to a known user id.
    pub fn verify(&self, token: &str) -> Result<UserId, CodiumServerError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )
        .map_err(|e| CodiumServerError::TokenValidation(e.to_string()))?;
        if !self.users.iter().any(|u| u.id == data.claims.sub) {
            return Err(CodiumServerError::TokenValidation(format!(
                "unknown user {}",
                data.claims.sub
            )));
        }
        Ok(data.claims.sub)
    }
}

/// The user bound to the request's `Authorization: Bearer` token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = CodiumServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(CodiumServerError::MissingCredentials)?;
        Ok(AuthUser(state.auth.verify(token.trim())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> Authenticator {
        Authenticator::new(
            "secret",
            Duration::from_secs(60),
            vec![UserAccount {
                id: "u1".to_owned(),
                username: "alice".to_owned(),
                password_sha256: Authenticator::hash_password("wonderland"),
            }],
        )
    }

    #[test]
    fn login_issues_a_verifiable_token() {
        let auth = authenticator();
        let response = auth.login("alice", "wonderland").unwrap();
        assert_eq!(response.user_id, "u1");
        assert_eq!(auth.verify(&response.token).unwrap(), "u1");
    }

    #[test]
    fn bad_password_and_foreign_tokens_are_rejected() {
        let auth = authenticator();
        assert!(matches!(
            auth.login("alice", "guess"),
            Err(CodiumServerError::InvalidCredentials)
        ));
        let other = Authenticator::new("other", Duration::from_secs(60), Vec::new());
        let token = other.issue("u1").unwrap();
        assert!(auth.verify(&token).is_err());
        let ghost = auth.issue("ghost").unwrap();
        assert!(auth.verify(&ghost).is_err());
    }
}
