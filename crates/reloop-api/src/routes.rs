use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::middleware::{optional_auth, require_auth};
use crate::state::AppState;
use crate::{auth, conversations, orders, products, users};

/// The full API surface. Static media and transport layers are added by the
/// binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/token", post(auth::login))
        .route("/token/refresh", post(auth::token_refresh))
        .route("/products/public", get(products::public_list))
        .route("/products/public/{id}", get(products::public_get));

    let optional_routes = Router::new()
        .route("/verify_token", post(auth::verify_token))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_auth));

    let protected_routes = Router::new()
        .route("/auth/user", get(auth::me))
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/{id}",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route("/users/check-user-active", post(users::check_user_active))
        .route("/users/update-active", post(users::update_active))
        .route("/products", get(products::list_products).post(products::create_product))
        .route(
            "/products/{id}",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route("/products/chat-gpt-re-write-dec", post(products::rewrite_description))
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route(
            "/orders/{id}",
            get(orders::get_order).put(orders::update_order).delete(orders::delete_order),
        )
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/conversations/{id}",
            get(conversations::get_conversation).delete(conversations::delete_conversation),
        )
        .route("/conversations/latest_messages", post(conversations::latest_messages))
        .route(
            "/conversations/messages",
            get(conversations::list_messages).post(conversations::send_message),
        )
        .route("/conversations/users", get(conversations::conversation_users))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(optional_routes)
        .merge(protected_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn status_of(app: Router, method: &str, uri: &str) -> StatusCode {
        let req = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let app = router(testutil::state().await);
        for (method, uri) in [
            ("GET", "/users"),
            ("GET", "/auth/user"),
            ("GET", "/products"),
            ("GET", "/orders"),
            ("GET", "/conversations"),
            ("GET", "/conversations/users"),
        ] {
            assert_eq!(status_of(app.clone(), method, uri).await, StatusCode::UNAUTHORIZED, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn public_and_optional_routes_do_not() {
        let app = router(testutil::state().await);
        assert_eq!(status_of(app.clone(), "GET", "/products/public").await, StatusCode::OK);
        assert_eq!(status_of(app.clone(), "GET", "/products/public/1").await, StatusCode::NOT_FOUND);
        // Reaches the handler, which reports the missing identity itself.
        assert_eq!(status_of(app.clone(), "POST", "/verify_token").await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(app, "POST", "/auth/logout").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_path_id_is_enveloped() {
        let app = router(testutil::state().await);
        let req = Request::builder().uri("/products/public/abc").body(Body::empty()).unwrap();
        let (status, body) = testutil::json(app.oneshot(req).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = body["message"].as_str().unwrap();
        assert!(message.starts_with("Invalid parameters provided"), "{message}");
        assert!(message.contains("abc"));
    }
}
