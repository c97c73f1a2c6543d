//! Row-to-wire conversions. Nested profiles are batch-loaded so a list of N
//! rows costs a constant number of queries.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use tracing::warn;

use reloop_db::Database;
use reloop_db::models::{ConversationSummaryRow, MessageRow, OrderRow, ProductRow, UserRow};
use reloop_types::api::{
    ConversationResponse, MessageResponse, OrderResponse, ProductResponse, UserResponse,
};

use crate::media::MediaStore;

pub fn user(media: &MediaStore, row: &UserRow) -> UserResponse {
    UserResponse {
        id: row.id,
        name: row.name.clone(),
        email: row.email.clone(),
        address: row.address.clone(),
        postal_code: row.postal_code.clone(),
        state: row.state.clone(),
        phone_number: row.phone_number.clone(),
        country: row.country.clone(),
        is_active: row.is_active,
        date_joined: row.date_joined,
        profile_picture: row.profile_picture.as_deref().map(|p| media.url(p)),
    }
}

/// Public profiles keyed by id, for the given ids.
fn profiles(db: &Database, media: &MediaStore, ids: impl IntoIterator<Item = i64>) -> Result<HashMap<i64, UserResponse>> {
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    Ok(db
        .get_users_by_ids(&ids)?
        .iter()
        .map(|u| (u.id, user(media, u)))
        .collect())
}

fn product_with_owner(media: &MediaStore, row: ProductRow, owner: UserResponse) -> ProductResponse {
    ProductResponse {
        id: row.id,
        title: row.title,
        image: row.image.as_deref().map(|p| media.url(p)),
        description: row.description,
        lat: row.lat,
        lng: row.lng,
        location: row.location,
        category: row.category,
        quantity: row.quantity,
        unit: row.unit,
        price: row.price,
        product_status: row.product_status,
        created_by: owner,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub fn products(db: &Database, media: &MediaStore, rows: Vec<ProductRow>) -> Result<Vec<ProductResponse>> {
    let owners = profiles(db, media, rows.iter().map(|p| p.created_by))?;
    Ok(rows
        .into_iter()
        .filter_map(|row| match owners.get(&row.created_by) {
            Some(owner) => Some(product_with_owner(media, row, owner.clone())),
            None => {
                warn!("Product {} references missing owner {}", row.id, row.created_by);
                None
            }
        })
        .collect())
}

pub fn product(db: &Database, media: &MediaStore, row: ProductRow) -> Result<ProductResponse> {
    let id = row.id;
    products(db, media, vec![row])?
        .pop()
        .ok_or_else(|| anyhow!("owner of product {} not found", id))
}

pub fn orders(db: &Database, media: &MediaStore, rows: Vec<OrderRow>) -> Result<Vec<OrderResponse>> {
    let mut product_ids: Vec<i64> = rows.iter().map(|o| o.product_id).collect();
    product_ids.sort_unstable();
    product_ids.dedup();
    let product_rows = db.get_products_by_ids(&product_ids)?;

    let people = profiles(
        db,
        media,
        rows.iter()
            .flat_map(|o| [o.user_id, o.seller_id])
            .chain(product_rows.iter().map(|p| p.created_by)),
    )?;

    let products: HashMap<i64, ProductResponse> = product_rows
        .into_iter()
        .filter_map(|p| {
            let owner = people.get(&p.created_by)?.clone();
            Some((p.id, product_with_owner(media, p, owner)))
        })
        .collect();

    Ok(rows
        .into_iter()
        .filter_map(|o| {
            let (Some(buyer), Some(seller), Some(product)) =
                (people.get(&o.user_id), people.get(&o.seller_id), products.get(&o.product_id))
            else {
                warn!("Order {} has dangling references", o.id);
                return None;
            };
            Some(OrderResponse {
                id: o.id,
                user: buyer.clone(),
                seller: seller.clone(),
                product: product.clone(),
                quantity: o.quantity,
                total_amount: o.total_amount,
                tax: o.tax,
                status: o.status,
                created_at: o.created_at,
                updated_at: o.updated_at,
            })
        })
        .collect())
}

pub fn order(db: &Database, media: &MediaStore, row: OrderRow) -> Result<OrderResponse> {
    let id = row.id;
    orders(db, media, vec![row])?
        .pop()
        .ok_or_else(|| anyhow!("order {} has dangling references", id))
}

/// Conversations as seen by `viewer`: `conversation_user` is the other side.
pub fn conversations(
    db: &Database,
    media: &MediaStore,
    rows: Vec<ConversationSummaryRow>,
    viewer: i64,
) -> Result<Vec<ConversationResponse>> {
    let people = profiles(db, media, rows.iter().filter_map(|r| r.conversation.counterpart_of(viewer)))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let c = row.conversation;
            ConversationResponse {
                id: c.id,
                user1_id: c.user1_id,
                user2_id: c.user2_id,
                latest_message_content: row.latest_message.unwrap_or_default(),
                latest_conversation: c.latest_conversation,
                conversation_user: c.counterpart_of(viewer).and_then(|id| people.get(&id).cloned()),
                unread_messages_count: row.unread_count,
                created_at: c.created_at,
                updated_at: c.updated_at,
            }
        })
        .collect())
}

pub fn messages(db: &Database, media: &MediaStore, rows: Vec<MessageRow>) -> Result<Vec<MessageResponse>> {
    let people = profiles(db, media, rows.iter().flat_map(|m| [m.sender_id, m.recipient_id]).flatten())?;

    Ok(rows
        .into_iter()
        .map(|m| MessageResponse {
            id: m.id,
            conversation_id: m.conversation_id,
            sender: m.sender_id.and_then(|id| people.get(&id).cloned()),
            recipient: m.recipient_id.and_then(|id| people.get(&id).cloned()),
            content: m.content,
            read_at: m.read_at,
            is_read: m.is_read,
            created_at: m.created_at,
        })
        .collect())
}
