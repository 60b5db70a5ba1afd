use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::error::{AppError, AppResult};
use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub typ: TokenKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl KeyPair {
    fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }
}

/// Issues and verifies HS256 access and refresh tokens. The two kinds use
/// separate secrets, so neither can stand in for the other.
#[derive(Clone)]
pub struct TokenService {
    access: KeyPair,
    refresh: KeyPair,
}

impl TokenService {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            access: KeyPair::new(&cfg.access_secret, cfg.access_ttl_secs),
            refresh: KeyPair::new(&cfg.refresh_secret, cfg.refresh_ttl_secs),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Issues a token that expires `ttl_secs` from now. Negative values produce expired tokens.
    pub fn issue_with_ttl(
        &self,
        user_id: &str,
        email: &str,
        role: Role,
        kind: TokenKind,
        ttl_secs: i64,
    ) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role,
            iat: now,
            exp: now + ttl_secs,
            typ: kind,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.keys(kind).encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to sign {:?} token: {}", kind, e)))
    }

    pub fn issue(&self, user_id: &str, email: &str, role: Role, kind: TokenKind) -> AppResult<String> {
        self.issue_with_ttl(user_id, email, role, kind, self.keys(kind).ttl_secs)
    }

    pub fn issue_pair(&self, user_id: &str, email: &str, role: Role) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(user_id, email, role, TokenKind::Access)?,
            refresh_token: self.issue(user_id, email, role, TokenKind::Refresh)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> AppResult<Claims> {
        self.verify(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> AppResult<Claims> {
        self.verify(token, TokenKind::Refresh)
    }

    fn verify(&self, token: &str, kind: TokenKind) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation)?;
        if data.claims.typ != kind {
            return Err(AppError::Unauthorized("Invalid token. Please log in again".to_string()));
        }
        Ok(data.claims)
    }
}
