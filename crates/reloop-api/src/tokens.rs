use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use reloop_db::Database;
use reloop_types::api::{Claims, TokenPair};
use reloop_types::models::TokenType;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("user not found")]
    UserNotFound,
    /// Correctly signed but past its `exp`.
    #[error("token has expired")]
    Expired,
    /// Badly signed, malformed, or the wrong kind of token.
    #[error("token is invalid")]
    Invalid,
    #[error("token is blacklisted")]
    Blacklisted,
    #[error("token error: {0}")]
    Other(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::ImmatureSignature
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => TokenError::Invalid,
            _ => TokenError::Other(e.to_string()),
        }
    }
}

/// Issues and checks HS256 access/refresh tokens. Blacklist state lives in
/// the database, so the operations that consult it take a `&Database`.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Fresh access/refresh pair for an existing user. `host` is the request's
    /// `Host` header, used for the refresh token's domain claim.
    pub fn issue(&self, db: &Database, user_id: i64, host: &str) -> Result<TokenPair, TokenError> {
        if db.get_user(user_id)?.is_none() {
            return Err(TokenError::UserNotFound);
        }

        let now = Utc::now();
        let refresh = self.claims(TokenType::Refresh, user_id, now, Some(host));
        let access = self.claims(TokenType::Access, user_id, now, None);
        Ok(TokenPair { access: self.sign(&access)?, refresh: self.sign(&refresh)? })
    }

    pub fn validate(&self, access_token: &str) -> Result<Claims, TokenError> {
        self.decode(access_token, TokenType::Access)
    }

    /// New access token for the refresh token's subject. The refresh token is
    /// handed back unchanged. Returns the pair and the new access claims.
    pub fn refresh(&self, db: &Database, refresh_token: &str) -> Result<(TokenPair, Claims), TokenError> {
        if self.is_blacklisted(db, refresh_token)? {
            return Err(TokenError::Blacklisted);
        }
        let refresh = self.decode(refresh_token, TokenType::Refresh)?;
        let access = self.claims(TokenType::Access, refresh.user_id, Utc::now(), None);
        let pair = TokenPair { access: self.sign(&access)?, refresh: refresh_token.to_string() };
        Ok((pair, access))
    }

    /// Trade a refresh token for a brand-new pair, blacklisting the old one.
    pub fn rotate(&self, db: &Database, refresh_token: &str, host: &str) -> Result<TokenPair, TokenError> {
        if self.is_blacklisted(db, refresh_token)? {
            return Err(TokenError::Blacklisted);
        }
        let old = self.decode(refresh_token, TokenType::Refresh)?;
        let pair = self.issue(db, old.user_id, host)?;
        self.blacklist(db, &old)?;
        Ok(pair)
    }

    /// Blacklist a refresh token. Revoking twice is harmless.
    pub fn revoke(&self, db: &Database, refresh_token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode(refresh_token, TokenType::Refresh)?;
        self.blacklist(db, &claims)?;
        Ok(claims)
    }

    /// Checks the token's `jti` against the blacklist. The signature is
    /// verified but expiry is not, so an expired blacklisted token still
    /// reports as blacklisted. Unreadable tokens are not blacklisted.
    pub fn is_blacklisted(&self, db: &Database, token: &str) -> Result<bool, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(db.is_token_blacklisted(&data.claims.jti)?),
            Err(_) => Ok(false),
        }
    }

    fn blacklist(&self, db: &Database, claims: &Claims) -> Result<(), TokenError> {
        let expires_at = DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);
        db.blacklist_token(&claims.jti, claims.user_id, expires_at, Utc::now())?;
        Ok(())
    }

    fn claims(&self, kind: TokenType, user_id: i64, now: DateTime<Utc>, host: Option<&str>) -> Claims {
        let ttl = match kind {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        Claims {
            token_type: kind,
            user_id,
            jti: Uuid::new_v4().simple().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            domain: host.map(cookie_domain),
            subdomain: host.map(|_| "*".to_string()),
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }

    fn decode(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        if claims.token_type != expected {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }
}

/// `.example.com` for `api.example.com:8000`. Hosts with fewer than two
/// labels get an empty domain.
pub fn cookie_domain(host: &str) -> String {
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        format!(".{}", labels[labels.len() - 2..].join("."))
    } else {
        String::new()
    }
}
