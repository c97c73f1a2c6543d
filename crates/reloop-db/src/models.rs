//! Database row types. These map directly to SQLite rows.
//! Distinct from reloop-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};
use reloop_types::models::{Category, OrderStatus, ProductStatus, Unit};

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string; users created through `/users` have none.
    pub password: Option<String>,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub profile_picture: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub is_active_user: bool,
    pub last_active: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: Option<String>,
    pub is_active: bool,
    pub profile_picture: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
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
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
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
    pub created_by: i64,
}

/// Public listing filters that can be pushed into SQL. Distance filtering
/// happens in the API layer.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub title_contains: Option<String>,
    pub category: Option<Category>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub id: i64,
    pub user_id: i64,
    /// Owner of the product when the order was placed; never re-derived.
    pub seller_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub total_amount: f64,
    pub tax: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub total_amount: f64,
    pub tax: f64,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRow {
    pub id: i64,
    pub user1_id: Option<i64>,
    pub user2_id: Option<i64>,
    pub latest_conversation: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRow {
    pub fn involves(&self, user_id: i64) -> bool {
        self.user1_id == Some(user_id) || self.user2_id == Some(user_id)
    }

    /// The participant that is not `user_id`.
    pub fn counterpart_of(&self, user_id: i64) -> Option<i64> {
        if self.user1_id == Some(user_id) {
            self.user2_id
        } else if self.user2_id == Some(user_id) {
            self.user1_id
        } else {
            None
        }
    }
}

/// A conversation annotated for one viewer.
#[derive(Debug, Clone)]
pub struct ConversationSummaryRow {
    pub conversation: ConversationRow,
    pub latest_message: Option<String>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: Option<i64>,
    pub sender_id: Option<i64>,
    pub recipient_id: Option<i64>,
    pub content: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub content: String,
}
