//! Conversations between two users and the messages inside them.

use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, info};

use reloop_db::models::NewMessage;
use reloop_types::api::{
    CreateConversationRequest, Deleted, LatestMessagesRequest, MessageListQuery, MessagePage, SendMessageRequest,
};

use crate::error::{ApiError, FieldErrors};
use crate::extract::{OptionalPayload, Params, PathParam, Payload};
use crate::middleware::CurrentUser;
use crate::pagination::{DEFAULT_PAGE, DEFAULT_PER_PAGE, MAX_PER_PAGE, paginate};
use crate::render;
use crate::response::{messages, reply};
use crate::state::{AppState, blocking};

fn missing_pk(errors: &mut FieldErrors, field: &str, id: i64) {
    errors.add(field, format!("Invalid pk \"{id}\" - object does not exist."));
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
) -> Result<Response, ApiError> {
    let conversations = blocking(&state, move |s| {
        let rows = s.db.list_conversations_for(caller.id)?;
        Ok(render::conversations(&s.db, &s.media, rows, caller.id)?)
    })
    .await?;
    Ok(reply(StatusCode::OK, messages::SUCCESS, conversations))
}

/// Open a conversation with `receiver_id`, or return the existing one for
/// the pair in either order.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    OptionalPayload(req): OptionalPayload<CreateConversationRequest>,
) -> Result<Response, ApiError> {
    let receiver = req
        .receiver_id
        .ok_or_else(|| ApiError::bad_request("Please provide a user ID"))?;
    if receiver == caller.id {
        return Err(ApiError::bad_request("You cannot create a conversation with yourself"));
    }

    let (conversation, created) = blocking(&state, move |s| {
        if s.db.get_user(receiver)?.is_none() {
            return Err(ApiError::not_found(messages::NOT_FOUND));
        }
        let (row, created) = s.db.open_conversation(caller.id, receiver, Utc::now())?;
        if created {
            info!("Conversation {} opened between {} and {}", row.id, caller.id, receiver);
        }
        let summary = s
            .db
            .get_conversation_summary(row.id, caller.id)?
            .ok_or_else(|| ApiError::not_found(messages::NOT_FOUND))?;
        let mut rendered = render::conversations(&s.db, &s.media, vec![summary], caller.id)?;
        let conversation = rendered.pop().ok_or_else(|| ApiError::not_found(messages::NOT_FOUND))?;
        Ok((conversation, created))
    })
    .await?;

    if created {
        Ok(reply(StatusCode::CREATED, messages::CREATED, conversation))
    } else {
        Ok(reply(StatusCode::OK, "Conversation already exists", conversation))
    }
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    PathParam(id): PathParam<i64>,
) -> Result<Response, ApiError> {
    let conversation = blocking(&state, move |s| {
        let summary = s
            .db
            .get_conversation_summary(id, caller.id)?
            .ok_or_else(|| ApiError::not_found(messages::NOT_FOUND))?;
        let mut rendered = render::conversations(&s.db, &s.media, vec![summary], caller.id)?;
        rendered.pop().ok_or_else(|| ApiError::not_found(messages::NOT_FOUND))
    })
    .await?;
    Ok(reply(StatusCode::OK, messages::SUCCESS, conversation))
}

/// Soft delete; only a participant may hide the conversation.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    PathParam(id): PathParam<i64>,
) -> Result<Response, ApiError> {
    blocking(&state, move |s| {
        let conversation = s
            .db
            .get_conversation(id)?
            .ok_or_else(|| ApiError::not_found(messages::NOT_FOUND))?;
        if !conversation.involves(caller.id) {
            return Err(ApiError::Forbidden("You do not have permission to perform this action.".into()));
        }
        s.db.soft_delete_conversation(id, Utc::now())?;
        info!("Conversation {} deleted by {}", id, caller.id);
        Ok(())
    })
    .await?;

    Ok(reply(StatusCode::OK, messages::SUCCESS, Deleted { id }))
}

/// Everyone the caller has a live conversation with.
pub async fn conversation_users(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
) -> Result<Response, ApiError> {
    let users = blocking(&state, move |s| {
        let ids = s.db.conversation_partner_ids(caller.id)?;
        Ok(s.db.get_users_by_ids(&ids)?.iter().map(|u| render::user(&s.media, u)).collect::<Vec<_>>())
    })
    .await?;
    Ok(reply(StatusCode::OK, messages::SUCCESS, users))
}

/// Messages addressed to the caller that were still unread, marked read by
/// this call. The payload shows them as they were before marking.
pub async fn latest_messages(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    OptionalPayload(req): OptionalPayload<LatestMessagesRequest>,
) -> Result<Response, ApiError> {
    let conversation_id = req
        .conversation_id
        .ok_or_else(|| ApiError::bad_request("Conversation ID is required."))?;

    let unread = blocking(&state, move |s| {
        if s.db.get_conversation(conversation_id)?.is_none() {
            return Err(ApiError::not_found(messages::NOT_FOUND));
        }
        let rows = s.db.take_unread(conversation_id, caller.id, Utc::now())?;
        debug!("User {} picked up {} unread messages in {}", caller.id, rows.len(), conversation_id);
        Ok(render::messages(&s.db, &s.media, rows)?)
    })
    .await?;

    Ok(reply(StatusCode::OK, messages::SUCCESS, unread))
}

/// One page of a conversation, newest first. Marks everything addressed to
/// the caller in the conversation as read.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Params(query): Params<MessageListQuery>,
) -> Result<Response, ApiError> {
    let conversation_id = query
        .conversation_id
        .ok_or_else(|| ApiError::bad_request("Conversation ID is required"))?;

    let page = query.page.unwrap_or(DEFAULT_PAGE);
    let per_page = query.record_per_page.unwrap_or(DEFAULT_PER_PAGE);
    let mut errors = FieldErrors::default();
    if page < 1 {
        errors.add("page", "Ensure this value is greater than or equal to 1.");
    }
    if !(1..=MAX_PER_PAGE).contains(&per_page) {
        errors.add(
            "record_per_page",
            format!("Ensure this value is between 1 and {MAX_PER_PAGE}."),
        );
    }
    errors.into_result(messages::INVALID_PARAMETERS)?;

    let result = blocking(&state, move |s| {
        if s.db.get_conversation(conversation_id)?.is_none() {
            return Err(ApiError::not_found(messages::NOT_FOUND));
        }
        let total = s.db.count_messages(conversation_id)?;
        let pagination = paginate(page, per_page, total);
        let rows = s.db.list_messages(conversation_id, per_page, pagination.record_from)?;
        let marked_read = s.db.mark_read(conversation_id, caller.id, Utc::now())?;
        Ok(MessagePage {
            pagination,
            messages: render::messages(&s.db, &s.media, rows)?,
            marked_read,
        })
    })
    .await?;

    Ok(reply(StatusCode::OK, messages::SUCCESS, result))
}

/// Post a message. The stored sender is always the caller.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Payload(req): Payload<SendMessageRequest>,
) -> Result<Response, ApiError> {
    let mut errors = FieldErrors::default();
    let conversation_id = errors.require("conversation_id", req.conversation_id);
    let sender_id = errors.require("sender_id", req.sender_id);
    let recipient_id = errors.require("recipient_id", req.recipient_id);
    let content = errors.require_text("content", req.content);
    errors.into_result(messages::INVALID_PARAMETERS)?;

    let (Some(conversation_id), Some(sender_id), Some(recipient_id), Some(content)) =
        (conversation_id, sender_id, recipient_id, content)
    else {
        return Err(ApiError::bad_request(messages::INVALID_PARAMETERS));
    };
    if sender_id != caller.id {
        debug!("Message sender {} replaced by caller {}", sender_id, caller.id);
    }

    let message = blocking(&state, move |s| {
        let mut errors = FieldErrors::default();
        if s.db.get_conversation(conversation_id)?.is_none() {
            missing_pk(&mut errors, "conversation_id", conversation_id);
        }
        if s.db.get_user(sender_id)?.is_none() {
            missing_pk(&mut errors, "sender_id", sender_id);
        }
        if s.db.get_user(recipient_id)?.is_none() {
            missing_pk(&mut errors, "recipient_id", recipient_id);
        }
        errors.into_result(messages::INVALID_PARAMETERS)?;

        let new_message = NewMessage {
            conversation_id,
            sender_id: caller.id,
            recipient_id,
            content,
        };
        let row = s.db.post_message(&new_message, Utc::now())?;
        let mut rendered = render::messages(&s.db, &s.media, vec![row])?;
        rendered.pop().ok_or_else(|| ApiError::not_found(messages::NOT_FOUND))
    })
    .await?;

    Ok(reply(StatusCode::CREATED, messages::CREATED, message))
}
