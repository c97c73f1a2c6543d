//! Fixtures shared by the handler tests.

use std::sync::Arc;

use axum::{body::to_bytes, http::StatusCode, response::Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use reloop_db::Database;
use reloop_db::models::{NewProduct, NewUser, ProductRow, UserRow};
use reloop_types::models::{Category, ProductStatus, Unit};

use crate::auth::hash_password;
use crate::media::MediaStore;
use crate::policy::AuthorizationPolicy;
use crate::rewrite::DescriptionRewriter;
use crate::state::{AppState, AppStateInner};
use crate::tokens::TokenService;

pub fn db() -> Database {
    Database::open_in_memory().unwrap()
}

pub fn user(db: &Database, email: &str, password: &str) -> UserRow {
    let new_user = NewUser {
        name: email.split('@').next().unwrap_or(email).to_string(),
        email: email.to_string(),
        password: Some(hash_password(password).unwrap()),
        is_active: true,
        ..Default::default()
    };
    db.create_user(&new_user, Utc::now()).unwrap()
}

pub fn product(db: &Database, owner: i64, title: &str) -> ProductRow {
    let new_product = NewProduct {
        title: title.to_string(),
        image: None,
        description: None,
        lat: None,
        lng: None,
        location: None,
        category: Category::Paper,
        quantity: 5,
        unit: Unit::Kilogram,
        price: 10.0,
        product_status: ProductStatus::Listed,
        created_by: owner,
    };
    db.insert_product(&new_product, Utc::now()).unwrap()
}

pub fn png_base64() -> String {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&[0u8; 16]);
    B64.encode(bytes)
}

pub async fn state_with(policy: AuthorizationPolicy) -> AppState {
    let media_root = std::env::temp_dir().join(format!("reloop-test-media-{}", Uuid::new_v4()));
    Arc::new(AppStateInner {
        db: db(),
        tokens: TokenService::new("test-secret", Duration::seconds(300), Duration::days(1)),
        policy,
        media: MediaStore::new(media_root).await.unwrap(),
        rewriter: DescriptionRewriter::new("http://127.0.0.1:9/v1", None, "test-model"),
    })
}

pub async fn state() -> AppState {
    state_with(AuthorizationPolicy::default()).await
}

/// Status and parsed JSON body of a handler response.
pub async fn json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}
