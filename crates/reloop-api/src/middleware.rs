use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::{debug, warn};

use reloop_db::Database;
use reloop_db::models::UserRow;
use reloop_types::api::Claims;

use crate::error::ApiError;
use crate::state::{AppState, blocking};
use crate::tokens::{TokenError, TokenService};

pub const ACCESS_COOKIE: &str = "access";
pub const REFRESH_COOKIE: &str = "refresh";

/// The authenticated caller, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRow);

/// The caller if one could be identified, inserted by [`optional_auth`].
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<UserRow>);

/// Why a presented token pair could not be turned into an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    InvalidRefresh,
    TokenError,
}

/// Outcome of looking at the credentials on a request.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    NoToken,
    ValidAccess(Claims),
    /// The access token failed but the refresh cookie minted a new one; these
    /// are the new access token's claims. Nothing is written back to the
    /// client on this path.
    ExpiredAccessWithRefresh(Claims),
    ExpiredAccessNoRefresh,
    BlacklistedRefresh,
    Rejected(Rejection),
}

impl AuthState {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            AuthState::ValidAccess(c) | AuthState::ExpiredAccessWithRefresh(c) => Some(c.user_id),
            _ => None,
        }
    }

    /// Client-facing 401 message for states that carry no identity.
    pub fn rejection_message(&self) -> &'static str {
        match self {
            AuthState::NoToken => "No access token found.",
            AuthState::ExpiredAccessNoRefresh => "Invalid access token and no refresh token provided.",
            AuthState::BlacklistedRefresh => "Refresh token is blacklisted.",
            AuthState::Rejected(Rejection::InvalidRefresh) => "Refresh token is invalid.",
            AuthState::Rejected(Rejection::TokenError) => "Token error.",
            AuthState::ValidAccess(_) | AuthState::ExpiredAccessWithRefresh(_) => "",
        }
    }
}

/// Walk the access/refresh pair through validation, falling back to the
/// refresh token when the access token is invalid or expired.
pub fn resolve(
    tokens: &TokenService,
    db: &Database,
    access: Option<&str>,
    refresh: Option<&str>,
) -> anyhow::Result<AuthState> {
    let Some(access) = access else {
        return Ok(AuthState::NoToken);
    };

    match tokens.validate(access) {
        Ok(claims) => Ok(AuthState::ValidAccess(claims)),
        Err(TokenError::Invalid | TokenError::Expired) => {
            let Some(refresh) = refresh else {
                return Ok(AuthState::ExpiredAccessNoRefresh);
            };
            match tokens.refresh(db, refresh) {
                Ok((_, claims)) => Ok(AuthState::ExpiredAccessWithRefresh(claims)),
                Err(TokenError::Blacklisted) => Ok(AuthState::BlacklistedRefresh),
                Err(TokenError::Storage(e)) => Err(e),
                Err(e) => {
                    debug!("Refresh token rejected: {}", e);
                    Ok(AuthState::Rejected(Rejection::InvalidRefresh))
                }
            }
        }
        Err(TokenError::Storage(e)) => Err(e),
        Err(e) => {
            debug!("Access token rejected: {}", e);
            Ok(AuthState::Rejected(Rejection::TokenError))
        }
    }
}

/// Access token from the `access` cookie, else from `Authorization: Bearer`.
pub fn access_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    jar.get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .typed_get::<Authorization<Bearer>>()
                .map(|auth| auth.token().to_string())
        })
}

fn refresh_token(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

async fn identify(state: &AppState, jar: &CookieJar, headers: &HeaderMap) -> Result<(AuthState, Option<UserRow>), ApiError> {
    let access = access_token(jar, headers);
    let refresh = refresh_token(jar);

    blocking(state, move |s| {
        let auth = resolve(&s.tokens, &s.db, access.as_deref(), refresh.as_deref())?;
        let user = match auth.user_id() {
            Some(id) => s.db.get_user(id)?,
            None => None,
        };
        Ok((auth, user))
    })
    .await
}

/// Reject the request with 401 unless it carries a usable token for an
/// existing user.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (auth, user) = identify(&state, &jar, req.headers()).await?;

    if auth.user_id().is_none() {
        return Err(ApiError::unauthenticated(auth.rejection_message()));
    }
    let user = user.ok_or_else(|| ApiError::unauthenticated("User not found!"))?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Attach the caller when identifiable; never rejects.
pub async fn optional_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (auth, user) = identify(&state, &jar, req.headers()).await?;

    if user.is_none() && auth.user_id().is_some() {
        warn!("Authenticated token but no matching user found.");
    }

    req.extensions_mut().insert(MaybeUser(user));
    Ok(next.run(req).await)
}
