use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::Response,
};
use chrono::{Duration, Utc};
use tracing::info;

use reloop_db::models::NewUser;
use reloop_types::api::{ActiveStatus, CheckActiveRequest, CreateUserRequest, Deleted, LastActive, UpdateUserRequest};

use crate::error::{ApiError, FieldErrors};
use crate::extract::{OptionalPayload, PathParam, Payload};
use crate::media::MediaError;
use crate::middleware::CurrentUser;
use crate::render;
use crate::response::{messages, reply};
use crate::state::{AppState, blocking};

const PROFILE_PICTURES: &str = "profile_pictures";

/// A user pinged within this window counts as online.
const ACTIVE_WINDOW_SECS: i64 = 30;

const NAME_MAX: usize = 100;
const EMAIL_MAX: usize = 100;

pub fn validate_email(errors: &mut FieldErrors, email: &str) {
    if email.chars().count() > EMAIL_MAX {
        errors.add("email", format!("Ensure this field has no more than {EMAIL_MAX} characters."));
        return;
    }
    let valid = match email.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        errors.add("email", "Enter a valid email address.");
    }
}

pub fn validate_name(errors: &mut FieldErrors, name: &str) {
    if name.chars().count() > NAME_MAX {
        errors.add("name", format!("Ensure this field has no more than {NAME_MAX} characters."));
    }
}

/// Store an uploaded picture, turning a bad image into a field error.
async fn store_picture(state: &AppState, encoded: &str) -> Result<String, ApiError> {
    state
        .media
        .save_image(PROFILE_PICTURES, encoded)
        .await
        .map_err(|e| match e {
            MediaError::NotAnImage => {
                let mut errors = FieldErrors::default();
                errors.add("profile_picture", e.to_string());
                ApiError::Validation { message: messages::INVALID_DATA.into(), errors }
            }
            MediaError::Io(io) => ApiError::Internal(io.into()),
        })
}

pub async fn list_users(State(state): State<AppState>) -> Result<Response, ApiError> {
    let users = blocking(&state, |s| {
        Ok(s.db.list_users()?.iter().map(|u| render::user(&s.media, u)).collect::<Vec<_>>())
    })
    .await?;
    Ok(reply(StatusCode::OK, messages::SUCCESS, users))
}

pub async fn get_user(State(state): State<AppState>, PathParam(id): PathParam<i64>) -> Result<Response, ApiError> {
    let user = blocking(&state, move |s| {
        let row = s.db.get_user(id)?.ok_or_else(|| ApiError::not_found(messages::NOT_FOUND))?;
        Ok(render::user(&s.media, &row))
    })
    .await?;
    Ok(reply(StatusCode::OK, messages::SUCCESS, user))
}

/// Administrative create: the new user has no password and cannot log in
/// until one is set through registration.
pub async fn create_user(
    State(state): State<AppState>,
    Payload(req): Payload<CreateUserRequest>,
) -> Result<Response, ApiError> {
    let mut errors = FieldErrors::default();
    let name = errors.require_text("name", req.name);
    let email = errors.require_text("email", req.email);
    if let Some(name) = &name {
        validate_name(&mut errors, name);
    }
    if let Some(email) = &email {
        validate_email(&mut errors, email);
    }
    errors.into_result(messages::INVALID_DATA)?;
    let (Some(name), Some(email)) = (name, email) else {
        return Err(ApiError::bad_request(messages::INVALID_DATA));
    };

    let picture = match req.profile_picture.as_deref().filter(|p| !p.is_empty()) {
        Some(encoded) => Some(store_picture(&state, encoded).await?),
        None => None,
    };

    let new_user = NewUser {
        name,
        email,
        password: None,
        is_active: req.is_active.unwrap_or(true),
        profile_picture: picture,
        phone_number: req.phone_number,
        address: req.address,
        postal_code: req.postal_code,
        state: req.state,
        country: req.country,
    };

    let created = blocking(&state, move |s| {
        if s.db.email_in_use(&new_user.email, None)? {
            let mut errors = FieldErrors::default();
            errors.add("email", "user with this email already exists.");
            errors.into_result(messages::INVALID_DATA)?;
        }
        let row = s.db.create_user(&new_user, Utc::now())?;
        info!("Created user {}", row.id);
        Ok(render::user(&s.media, &row))
    })
    .await?;

    Ok(reply(StatusCode::CREATED, messages::CREATED, created))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    PathParam(id): PathParam<i64>,
    Payload(req): Payload<UpdateUserRequest>,
) -> Result<Response, ApiError> {
    if !state.policy.user_mutation.permits(id, caller.id) {
        return Err(ApiError::Forbidden("You do not have permission to perform this action.".into()));
    }

    let mut errors = FieldErrors::default();
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            errors.add("name", "This field may not be blank.");
        } else {
            validate_name(&mut errors, name);
        }
    }
    if let Some(email) = &req.email {
        validate_email(&mut errors, email);
    }
    errors.into_result(messages::INVALID_DATA)?;

    let picture = match req.profile_picture {
        Some(Some(encoded)) if !encoded.is_empty() => Some(Some(store_picture(&state, &encoded).await?)),
        Some(_) => Some(None),
        None => None,
    };

    let updated = blocking(&state, move |s| {
        let mut row = s.db.get_user(id)?.ok_or_else(|| ApiError::not_found(messages::NOT_FOUND))?;

        if let Some(email) = req.email {
            if s.db.email_in_use(&email, Some(id))? {
                let mut errors = FieldErrors::default();
                errors.add("email", "user with this email already exists.");
                errors.into_result(messages::INVALID_DATA)?;
            }
            row.email = email;
        }
        if let Some(name) = req.name {
            row.name = name;
        }
        if let Some(v) = req.address {
            row.address = v;
        }
        if let Some(v) = req.postal_code {
            row.postal_code = v;
        }
        if let Some(v) = req.state {
            row.state = v;
        }
        if let Some(v) = req.phone_number {
            row.phone_number = v;
        }
        if let Some(v) = req.country {
            row.country = v;
        }
        if let Some(v) = req.is_active {
            row.is_active = v;
        }
        if let Some(v) = picture {
            row.profile_picture = v;
        }

        s.db.update_user(&row)?;
        Ok(render::user(&s.media, &row))
    })
    .await?;

    Ok(reply(StatusCode::OK, messages::SUCCESS, updated))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    PathParam(id): PathParam<i64>,
) -> Result<Response, ApiError> {
    if !state.policy.user_mutation.permits(id, caller.id) {
        return Err(ApiError::Forbidden("You do not have permission to perform this action.".into()));
    }

    blocking(&state, move |s| {
        if !s.db.delete_user(id)? {
            return Err(ApiError::not_found(messages::NOT_FOUND));
        }
        info!("User {} deleted by {}", id, caller.id);
        Ok(())
    })
    .await?;

    Ok(reply(StatusCode::OK, messages::SUCCESS, Deleted { id }))
}

pub async fn check_user_active(
    State(state): State<AppState>,
    OptionalPayload(req): OptionalPayload<CheckActiveRequest>,
) -> Result<Response, ApiError> {
    let user_id = req.user_id.ok_or_else(|| ApiError::bad_request("User ID is required"))?;

    let status = blocking(&state, move |s| {
        let user = s.db.get_user(user_id)?.ok_or_else(|| ApiError::not_found("User not found"))?;
        let cutoff = Utc::now() - Duration::seconds(ACTIVE_WINDOW_SECS);
        Ok(ActiveStatus { is_active: user.last_active.is_some_and(|t| t >= cutoff) })
    })
    .await?;

    Ok(reply(StatusCode::OK, "User status retrieved successfully", status))
}

pub async fn update_active(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
) -> Result<Response, ApiError> {
    let user = blocking(&state, move |s| {
        s.db
            .mark_user_active(caller.id, Utc::now())?
            .ok_or_else(|| ApiError::not_found("User not found"))
    })
    .await?;

    Ok(reply(
        StatusCode::OK,
        "User last active time updated successfully",
        LastActive { id: user.id, is_active_user: user.is_active_user, last_active: user.last_active },
    ))
}
