use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{Category, OrderStatus, ProductStatus, TokenType, Unit};

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`)
/// in partial updates.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// -- Envelope --

/// Every response body is `{"message": ..., "data"?: ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deleted {
    pub id: i64,
}

// -- JWT Claims --

/// Claims carried by both token kinds. Refresh tokens additionally pin the
/// cookie domain they were issued for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub token_type: TokenType,
    pub user_id: i64,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
}

// -- Auth --

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub phone_number: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenValidity {
    pub valid: bool,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub phone_number: Option<String>,
    pub country: Option<String>,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub phone_number: Option<String>,
    pub country: Option<String>,
    pub is_active: Option<bool>,
    /// Base64 image or `data:` URL.
    pub profile_picture: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub postal_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub state: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub phone_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub country: Option<Option<String>>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub profile_picture: Option<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckActiveRequest {
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveStatus {
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LastActive {
    pub id: i64,
    pub is_active_user: bool,
    pub last_active: Option<DateTime<Utc>>,
}

// -- Products --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductResponse {
    pub id: i64,
    pub title: String,
    pub image: Option<String>,
    pub description: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub location: Option<String>,
    pub category: Category,
    pub quantity: i64,
    pub unit: Unit,
    pub price: f64,
    pub product_status: ProductStatus,
    pub created_by: UserResponse,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Enum fields arrive as plain strings so an unknown value becomes a field
/// error rather than a body rejection.
#[derive(Debug, Default, Deserialize)]
pub struct CreateProductRequest {
    pub title: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub quantity: Option<i64>,
    pub unit: Option<String>,
    pub price: Option<f64>,
    pub product_status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub image: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub lat: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub lng: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<String>>,
    pub category: Option<String>,
    pub quantity: Option<i64>,
    pub unit: Option<String>,
    pub price: Option<f64>,
    pub product_status: Option<String>,
}

/// Public listing filters. Coordinates stay textual so a malformed value can
/// be reported as such.
#[derive(Debug, Default, Deserialize)]
pub struct ProductSearchQuery {
    pub query: Option<String>,
    pub category: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub radius: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RewriteRequest {
    pub title: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RewriteResponse {
    pub original_desc: String,
    pub improved_desc: String,
}

// -- Orders --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: i64,
    pub user: UserResponse,
    pub seller: UserResponse,
    pub product: ProductResponse,
    pub quantity: i64,
    pub total_amount: f64,
    pub tax: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateOrderRequest {
    pub product_id: Option<i64>,
    pub quantity: Option<i64>,
    pub total_amount: Option<f64>,
    pub tax: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateOrderRequest {
    pub product_id: Option<i64>,
    pub quantity: Option<i64>,
    pub total_amount: Option<f64>,
    pub tax: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

// -- Conversations --

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(alias = "reciever_id")]
    pub receiver_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub id: i64,
    pub user1_id: Option<i64>,
    pub user2_id: Option<i64>,
    pub latest_message_content: String,
    pub latest_conversation: Option<DateTime<Utc>>,
    /// The counterpart of the caller, when the caller takes part.
    pub conversation_user: Option<UserResponse>,
    pub unread_messages_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LatestMessagesRequest {
    pub conversation_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageListQuery {
    pub conversation_id: Option<i64>,
    pub page: Option<i64>,
    pub record_per_page: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub record_from: i64,
    pub record_to: i64,
    pub total_records: i64,
    pub total_pages: i64,
    pub record_per_page: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagePage {
    pub pagination: Pagination,
    pub messages: Vec<MessageResponse>,
    /// Messages addressed to the caller that this request flipped to read.
    pub marked_read: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: Option<i64>,
    pub sender_id: Option<i64>,
    pub recipient_id: Option<i64>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: i64,
    pub conversation_id: Option<i64>,
    pub sender: Option<UserResponse>,
    pub recipient: Option<UserResponse>,
    pub content: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullable_fields_distinguish_null_from_absent() {
        let req: UpdateProductRequest =
            serde_json::from_str(r#"{"description": null, "title": "Crates"}"#).unwrap();
        assert_eq!(req.description, Some(None));
        assert_eq!(req.location, None);
        assert_eq!(req.title.as_deref(), Some("Crates"));
    }

    #[test]
    fn conversation_request_accepts_legacy_spelling() {
        let req: CreateConversationRequest = serde_json::from_str(r#"{"reciever_id": 7}"#).unwrap();
        assert_eq!(req.receiver_id, Some(7));
    }

    #[test]
    fn envelope_omits_missing_data() {
        let env: Envelope<()> = Envelope { message: "ok".into(), data: None };
        assert_eq!(serde_json::to_string(&env).unwrap(), r#"{"message":"ok"}"#);
    }
}
