//! JWT access and refresh token issuing
//!
//! Access and refresh tokens are HS256 JWTs signed with independent secrets and
//! carrying independent lifetimes. A token signed for one class never verifies
//! as the other. The issuer is built once from `TokenConfig` and never mutated.

use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sitecon_core::TokenConfig;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// JWT ID - unique per token, so two tokens issued in the same second differ
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token")]
    Invalid,

    #[error("Token has expired")]
    Expired,

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),

    #[error("Token lifetime of {0:?} overflows the expiry timestamp")]
    LifetimeOverflow(Duration),
}

/// Which signing context a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "access" => Ok(TokenKind::Access),
            "refresh" => Ok(TokenKind::Refresh),
            other => Err(format!("unknown token kind: {other}")),
        }
    }
}

/// Secret and lifetime for one token class
#[derive(Clone)]
pub struct TokenSettings {
    pub secret: Vec<u8>,
    pub ttl: Duration,
}

impl TokenSettings {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }
}

#[derive(Clone)]
struct SigningContext {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SigningContext {
    fn new(settings: &TokenSettings) -> Self {
        Self {
            encoding: EncodingKey::from_secret(&settings.secret),
            decoding: DecodingKey::from_secret(&settings.secret),
            ttl: settings.ttl,
        }
    }
}

/// Mints and verifies access/refresh tokens
#[derive(Clone)]
pub struct TokenIssuer {
    issuer: String,
    access: SigningContext,
    refresh: SigningContext,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access.ttl)
            .field("refresh_ttl", &self.refresh.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(issuer: impl Into<String>, access: TokenSettings, refresh: TokenSettings) -> Self {
        Self {
            issuer: issuer.into(),
            access: SigningContext::new(&access),
            refresh: SigningContext::new(&refresh),
        }
    }

    /// Build from validated configuration
    pub fn from_config(config: &TokenConfig) -> Self {
        Self::new(
            config.issuer.clone(),
            TokenSettings::new(config.access_secret.as_bytes(), config.access_ttl()),
            TokenSettings::new(config.refresh_secret.as_bytes(), config.refresh_ttl()),
        )
    }

    fn context(&self, kind: TokenKind) -> &SigningContext {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        self.context(kind).ttl
    }

    /// Generate a signed access token for `user_id`
    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue_at(TokenKind::Access, user_id, SystemTime::now())
    }

    /// Generate a signed refresh token for `user_id`
    ///
    /// The caller is responsible for recording the token in the refresh-token
    /// store so it can later be revoked.
    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue_at(TokenKind::Refresh, user_id, SystemTime::now())
    }

    /// Generate a token as if issued at `issued_at`
    ///
    /// The token expires at `issued_at` plus the class lifetime.
    pub fn issue_at(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        issued_at: SystemTime,
    ) -> Result<String, TokenError> {
        let context = self.context(kind);
        let iat = issued_at.duration_since(UNIX_EPOCH)?.as_secs();
        let exp = iat
            .checked_add(context.ttl.as_secs())
            .ok_or(TokenError::LifetimeOverflow(context.ttl))?;

        let claims = Claims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat,
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &context.encoding)?;
        Ok(token)
    }

    /// Validate a token against the `kind` signing context and extract its claims
    ///
    /// Signature, issuer and expiry are all checked, with no leeway. A token whose
    /// signature is valid but whose `exp` has passed fails with
    /// `TokenError::Expired`; any other failure is `TokenError::Invalid`.
    pub fn decode_claims(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.context(kind).decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        Ok(token_data.claims)
    }

    /// Validate a token and return the user ID it is bound to
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Uuid, TokenError> {
        let claims = self.decode_claims(token, kind)?;
        Uuid::parse_str(&claims.sub).map_err(|_| TokenError::Invalid)
    }
}
