use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use tracing::info;

use reloop_db::models::NewOrder;
use reloop_types::api::{CreateOrderRequest, Deleted, OrderListQuery, UpdateOrderRequest};
use reloop_types::models::OrderStatus;

use crate::error::{ApiError, FieldErrors};
use crate::extract::{Params, PathParam, Payload};
use crate::middleware::CurrentUser;
use crate::render;
use crate::response::{messages, reply};
use crate::state::{AppState, blocking};

const SUCCESS: &str = "Success";

fn not_found() -> ApiError {
    ApiError::not_found("Order not found.")
}

fn unknown_product(id: i64) -> ApiError {
    let mut errors = FieldErrors::default();
    errors.add("product_id", format!("Invalid pk \"{id}\" - object does not exist."));
    ApiError::Validation { message: messages::VALIDATION_FAILED.into(), errors }
}

/// Which side of the caller's orders to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderSide {
    Purchase,
    Sales,
}

impl OrderSide {
    fn parse(kind: Option<&str>) -> Result<Self, ApiError> {
        match kind.unwrap_or("purchase") {
            "purchase" => Ok(OrderSide::Purchase),
            "sales" => Ok(OrderSide::Sales),
            _ => Err(ApiError::bad_request("Invalid type parameter. Use 'purchase' or 'sales'.")),
        }
    }
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Params(query): Params<OrderListQuery>,
) -> Result<Response, ApiError> {
    let side = OrderSide::parse(query.kind.as_deref())?;

    let orders = blocking(&state, move |s| {
        let rows = match side {
            OrderSide::Purchase => s.db.list_orders_for_buyer(caller.id)?,
            OrderSide::Sales => s.db.list_orders_for_seller(caller.id)?,
        };
        Ok(render::orders(&s.db, &s.media, rows)?)
    })
    .await?;

    Ok(reply(StatusCode::OK, SUCCESS, orders))
}

/// Single order, visible to its buyer only.
pub async fn get_order(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    PathParam(id): PathParam<i64>,
) -> Result<Response, ApiError> {
    let order = blocking(&state, move |s| {
        let row = s.db.get_order_for_buyer(id, caller.id)?.ok_or_else(not_found)?;
        Ok(render::order(&s.db, &s.media, row)?)
    })
    .await?;
    Ok(reply(StatusCode::OK, SUCCESS, order))
}

pub async fn create_order(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Payload(req): Payload<CreateOrderRequest>,
) -> Result<Response, ApiError> {
    let mut errors = FieldErrors::default();
    let product_id = errors.require("product_id", req.product_id);
    let qty = errors.require("quantity", req.quantity).map(|q| errors.quantity(q));
    let total = errors
        .require("total_amount", req.total_amount)
        .map(|t| errors.money("total_amount", t));
    let tax = errors.money("tax", req.tax.unwrap_or(0.0));
    let status = errors
        .choice::<OrderStatus>("status", req.status.as_deref())
        .unwrap_or_default();
    errors.into_result(messages::VALIDATION_FAILED)?;

    let (Some(product_id), Some(qty), Some(total)) = (product_id, qty, total) else {
        return Err(ApiError::bad_request(messages::VALIDATION_FAILED));
    };

    let new_order = NewOrder {
        user_id: caller.id,
        product_id,
        quantity: qty,
        total_amount: total,
        tax,
        status,
    };

    let created = blocking(&state, move |s| {
        let row = s
            .db
            .create_order(&new_order, Utc::now())?
            .ok_or_else(|| unknown_product(new_order.product_id))?;
        info!("Order {} placed by {} with seller {}", row.id, row.user_id, row.seller_id);
        Ok(render::order(&s.db, &s.media, row)?)
    })
    .await?;

    Ok(reply(StatusCode::CREATED, "Order created successfully.", created))
}

pub async fn update_order(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    PathParam(id): PathParam<i64>,
    Payload(req): Payload<UpdateOrderRequest>,
) -> Result<Response, ApiError> {
    let mut errors = FieldErrors::default();
    let qty = req.quantity.map(|q| errors.quantity(q));
    let total = req.total_amount.map(|t| errors.money("total_amount", t));
    let tax = req.tax.map(|t| errors.money("tax", t));
    let status = errors.choice::<OrderStatus>("status", req.status.as_deref());

    let updated = blocking(&state, move |s| {
        let mut row = s
            .db
            .get_order(id)?
            .filter(|o| s.policy.order_update.permits(o, caller.id))
            .ok_or_else(not_found)?;

        if let Some(product_id) = req.product_id {
            if s.db.get_product(product_id)?.is_none() {
                errors.add("product_id", format!("Invalid pk \"{product_id}\" - object does not exist."));
            }
            row.product_id = product_id;
        }
        errors.into_result(messages::VALIDATION_FAILED)?;

        if let Some(q) = qty {
            row.quantity = q;
        }
        if let Some(t) = total {
            row.total_amount = t;
        }
        if let Some(t) = tax {
            row.tax = t;
        }
        if let Some(st) = status {
            row.status = st;
        }

        let saved = s.db.update_order(&row, Utc::now())?;
        Ok(render::order(&s.db, &s.media, saved)?)
    })
    .await?;

    Ok(reply(StatusCode::OK, "Order updated successfully.", updated))
}

pub async fn delete_order(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    PathParam(id): PathParam<i64>,
) -> Result<Response, ApiError> {
    blocking(&state, move |s| {
        let order = s
            .db
            .get_order(id)?
            .filter(|o| s.policy.order_delete.permits(o, caller.id))
            .ok_or_else(not_found)?;
        s.db.delete_order(order.id)?;
        info!("Order {} deleted by {}", id, caller.id);
        Ok(())
    })
    .await?;

    Ok(reply(StatusCode::OK, "Order deleted successfully.", Deleted { id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AuthorizationPolicy, OrderParty};
    use crate::testutil::{self, json};
    use reloop_db::models::UserRow;

    struct Market {
        state: AppState,
        seller: UserRow,
        buyer: UserRow,
        product_id: i64,
    }

    async fn market(policy: AuthorizationPolicy) -> Market {
        let state = testutil::state_with(policy).await;
        let seller = testutil::user(&state.db, "a@x.com", "pw1");
        let buyer = testutil::user(&state.db, "b@x.com", "pw2");
        let product_id = testutil::product(&state.db, seller.id, "Box").id;
        Market { state, seller, buyer, product_id }
    }

    fn as_user(user: &UserRow) -> Extension<CurrentUser> {
        Extension(CurrentUser(user.clone()))
    }

    async fn place(m: &Market) -> i64 {
        let req = CreateOrderRequest {
            product_id: Some(m.product_id),
            quantity: Some(1),
            total_amount: Some(5.0),
            tax: Some(0.0),
            ..Default::default()
        };
        let (status, body) =
            json(create_order(State(m.state.clone()), as_user(&m.buyer), Payload(req)).await.unwrap()).await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn create_derives_seller_and_defaults_status() {
        let m = market(AuthorizationPolicy::default()).await;
        let id = place(&m).await;

        let (_, body) = json(get_order(State(m.state.clone()), as_user(&m.buyer), PathParam(id)).await.unwrap()).await;
        assert_eq!(body["data"]["seller"]["id"], m.seller.id);
        assert_eq!(body["data"]["user"]["id"], m.buyer.id);
        assert_eq!(body["data"]["status"], "pending");
        assert_eq!(body["data"]["product"]["title"], "Box");

        // The seller cannot fetch it through the buyer-only detail route.
        let err = get_order(State(m.state.clone()), as_user(&m.seller), PathParam(id)).await.unwrap_err();
        assert_eq!(err.to_string(), "Order not found.");
    }

    #[tokio::test]
    async fn create_validation() {
        let m = market(AuthorizationPolicy::default()).await;
        let err = create_order(State(m.state.clone()), as_user(&m.buyer), Payload(CreateOrderRequest::default()))
            .await
            .unwrap_err();
        let ApiError::Validation { errors, .. } = err else { panic!("expected validation error") };
        assert!(errors.get("product_id").is_some());
        assert!(errors.get("quantity").is_some());
        assert!(errors.get("total_amount").is_some());

        let req = CreateOrderRequest {
            product_id: Some(999),
            quantity: Some(1),
            total_amount: Some(5.0),
            ..Default::default()
        };
        let err = create_order(State(m.state.clone()), as_user(&m.buyer), Payload(req)).await.unwrap_err();
        let ApiError::Validation { errors, .. } = err else { panic!("expected validation error") };
        assert!(errors.get("product_id").is_some());
    }

    #[tokio::test]
    async fn list_by_side() {
        let m = market(AuthorizationPolicy::default()).await;
        place(&m).await;

        let q = |kind: Option<&str>| Params(OrderListQuery { kind: kind.map(Into::into) });
        let (_, body) = json(list_orders(State(m.state.clone()), as_user(&m.buyer), q(None)).await.unwrap()).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        let (_, body) = json(list_orders(State(m.state.clone()), as_user(&m.buyer), q(Some("sales"))).await.unwrap()).await;
        assert!(body["data"].as_array().unwrap().is_empty());
        let (_, body) = json(list_orders(State(m.state.clone()), as_user(&m.seller), q(Some("sales"))).await.unwrap()).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let err = list_orders(State(m.state.clone()), as_user(&m.buyer), q(Some("refunds"))).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid type parameter. Use 'purchase' or 'sales'.");
    }

    #[tokio::test]
    async fn default_policy_is_seller_updates_buyer_deletes() {
        let m = market(AuthorizationPolicy::default()).await;
        let id = place(&m).await;
        let delivered = || Payload(UpdateOrderRequest { status: Some("delivered".into()), ..Default::default() });

        let err = update_order(State(m.state.clone()), as_user(&m.buyer), PathParam(id), delivered()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let (_, body) = json(update_order(State(m.state.clone()), as_user(&m.seller), PathParam(id), delivered()).await.unwrap()).await;
        assert_eq!(body["data"]["status"], "delivered");

        let err = delete_order(State(m.state.clone()), as_user(&m.seller), PathParam(id)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let (_, body) = json(delete_order(State(m.state.clone()), as_user(&m.buyer), PathParam(id)).await.unwrap()).await;
        assert_eq!(body["data"]["id"], id);
    }

    #[tokio::test]
    async fn configurable_policy() {
        let policy = AuthorizationPolicy {
            order_update: OrderParty::Either,
            order_delete: OrderParty::Seller,
            ..Default::default()
        };
        let m = market(policy).await;
        let id = place(&m).await;

        let req = Payload(UpdateOrderRequest { quantity: Some(3), ..Default::default() });
        update_order(State(m.state.clone()), as_user(&m.buyer), PathParam(id), req).await.unwrap();
        let err = delete_order(State(m.state.clone()), as_user(&m.buyer), PathParam(id)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        delete_order(State(m.state.clone()), as_user(&m.seller), PathParam(id)).await.unwrap();
    }

    #[tokio::test]
    async fn update_keeps_seller_and_checks_product() {
        let m = market(AuthorizationPolicy::default()).await;
        let id = place(&m).await;
        let other_product = testutil::product(&m.state.db, m.buyer.id, "Cans");

        let req = Payload(UpdateOrderRequest { product_id: Some(other_product.id), ..Default::default() });
        update_order(State(m.state.clone()), as_user(&m.seller), PathParam(id), req).await.unwrap();
        let row = m.state.db.get_order(id).unwrap().unwrap();
        assert_eq!(row.product_id, other_product.id);
        assert_eq!(row.seller_id, m.seller.id);

        let req = Payload(UpdateOrderRequest { product_id: Some(999), ..Default::default() });
        let err = update_order(State(m.state.clone()), as_user(&m.seller), PathParam(id), req).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
