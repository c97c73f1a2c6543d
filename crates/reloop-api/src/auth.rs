use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::headers::{HeaderMapExt, Host};
use chrono::Utc;
use tracing::{info, warn};

use reloop_db::models::NewUser;
use reloop_types::api::{LoginRequest, RefreshRequest, RegisterRequest, TokenPair, TokenValidity};

use crate::error::{ApiError, FieldErrors};
use crate::extract::{OptionalPayload, Payload};
use crate::middleware::{ACCESS_COOKIE, CurrentUser, MaybeUser, REFRESH_COOKIE};
use crate::render;
use crate::response::{messages, notice, reply};
use crate::state::{AppState, blocking};
use crate::tokens::TokenError;
use crate::users::{validate_email, validate_name};

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(stored: &str, password: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!("Unreadable password hash: {}", e);
            false
        }
    }
}

fn request_host(headers: &HeaderMap) -> String {
    headers.typed_get::<Host>().map(|h| h.to_string()).unwrap_or_default()
}

fn auth_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .path("/")
        .build()
}

fn with_token_cookies(jar: CookieJar, pair: &TokenPair) -> CookieJar {
    jar.add(auth_cookie(ACCESS_COOKIE, pair.access.clone()))
        .add(auth_cookie(REFRESH_COOKIE, pair.refresh.clone()))
}

pub async fn register(
    State(state): State<AppState>,
    Payload(req): Payload<RegisterRequest>,
) -> Result<Response, ApiError> {
    let mut errors = FieldErrors::default();
    let email = errors.require_text("email", req.email);
    let password = errors.require_text("password", req.password);
    let name = errors.require_text("name", req.name);
    if let Some(email) = &email {
        validate_email(&mut errors, email);
    }
    if let Some(name) = &name {
        validate_name(&mut errors, name);
    }
    errors.into_result(messages::INVALID_DATA)?;

    let (Some(email), Some(password), Some(name)) = (email, password, name) else {
        return Err(ApiError::bad_request(messages::INVALID_DATA));
    };

    let created = blocking(&state, move |s| {
        if s.db.email_in_use(&email, None)? {
            let mut errors = FieldErrors::default();
            errors.add("email", "user with this email already exists.");
            errors.into_result(messages::INVALID_DATA)?;
        }

        let new_user = NewUser {
            name,
            email,
            password: Some(hash_password(&password)?),
            is_active: req.is_active.unwrap_or(true),
            profile_picture: None,
            phone_number: req.phone_number,
            address: req.address,
            postal_code: req.postal_code,
            state: req.state,
            country: req.country,
        };
        let row = s.db.create_user(&new_user, Utc::now())?;
        info!("Registered user {}", row.id);
        Ok(render::user(&s.media, &row))
    })
    .await?;

    Ok(reply(StatusCode::CREATED, messages::SUCCESS, created))
}

/// Serves both `/auth/login` and `/token`.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Payload(req): Payload<LoginRequest>,
) -> Result<(CookieJar, Response), ApiError> {
    let host = request_host(&headers);

    let pair = blocking(&state, move |s| {
        let user = match req.email.as_deref() {
            Some(email) => s.db.get_user_by_email(email)?,
            None => None,
        };
        let user = user.ok_or_else(|| ApiError::bad_request("User not found!"))?;

        let password_ok = match (&user.password, &req.password) {
            (Some(stored), Some(given)) => verify_password(stored, given),
            _ => false,
        };
        if !password_ok {
            return Err(ApiError::bad_request("Incorrect password!"));
        }

        s.tokens.issue(&s.db, user.id, &host).map_err(token_failure)
    })
    .await?;

    let jar = with_token_cookies(jar, &pair);
    Ok((jar, reply(StatusCode::OK, messages::SUCCESS, pair)))
}

/// Rotate a refresh token taken from the body or the `refresh` cookie.
pub async fn token_refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    OptionalPayload(req): OptionalPayload<RefreshRequest>,
) -> Result<(CookieJar, Response), ApiError> {
    let presented = req
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .ok_or_else(|| ApiError::bad_request("Refresh token is required"))?;
    let host = request_host(&headers);

    let pair = blocking(&state, move |s| {
        s.tokens.rotate(&s.db, &presented, &host).map_err(|e| match e {
            TokenError::Blacklisted => ApiError::unauthenticated("Refresh token is blacklisted."),
            // A purged blacklist entry only ever belongs to an expired token.
            TokenError::Expired => ApiError::unauthenticated("Refresh token has expired."),
            TokenError::Invalid | TokenError::Other(_) => ApiError::bad_request("Invalid token"),
            other => token_failure(other),
        })
    })
    .await?;

    let jar = with_token_cookies(jar, &pair);
    Ok((jar, reply(StatusCode::OK, messages::SUCCESS, pair)))
}

/// Blacklist the refresh cookie (best effort) and clear both cookies.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    if let Some(refresh) = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()) {
        let revoked = blocking(&state, move |s| {
            s.tokens.revoke(&s.db, &refresh).map_err(token_failure)
        })
        .await;
        match revoked {
            Ok(claims) => info!("Token for user {} has been invalidated.", claims.user_id),
            Err(e) => warn!("Failed to invalidate token: {}", e),
        }
    }

    let jar = jar
        .remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"));
    (jar, notice(StatusCode::OK, "Logged out successfully"))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    reply(StatusCode::OK, messages::SUCCESS, render::user(&state.media, &user))
}

pub async fn verify_token(Extension(MaybeUser(user)): Extension<MaybeUser>) -> Response {
    match user {
        Some(_) => reply(StatusCode::OK, "Token is valid", TokenValidity { valid: true }),
        None => reply(StatusCode::UNAUTHORIZED, "Token is invalid", TokenValidity { valid: false }),
    }
}

fn token_failure(e: TokenError) -> ApiError {
    match e {
        TokenError::UserNotFound => ApiError::unauthenticated("User not found!"),
        TokenError::Blacklisted => ApiError::unauthenticated("Refresh token is blacklisted."),
        TokenError::Expired => ApiError::unauthenticated("Refresh token has expired."),
        TokenError::Invalid => ApiError::unauthenticated("Refresh token is invalid."),
        TokenError::Other(msg) => ApiError::unauthenticated(format!("Token error: {}", msg)),
        TokenError::Storage(e) => ApiError::Internal(e),
    }
}
