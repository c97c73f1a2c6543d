use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use tracing::{info, warn};

use reloop_db::models::{NewProduct, ProductFilter, ProductRow};
use reloop_types::api::{CreateProductRequest, Deleted, ProductSearchQuery, RewriteRequest, UpdateProductRequest};
use reloop_types::models::{Category, ProductStatus, Unit};

use crate::error::{ApiError, FieldErrors};
use crate::extract::{Params, PathParam, Payload};
use crate::geo::distance_km;
use crate::media::MediaError;
use crate::middleware::CurrentUser;
use crate::render;
use crate::response::{messages, reply};
use crate::state::{AppState, blocking};

const PRODUCT_IMAGES: &str = "product_images";
const DEFAULT_RADIUS_KM: f64 = 50.0;
const TEXT_MAX: usize = 255;

/// Listing messages use a plain "Success".
const SUCCESS: &str = "Success";

fn not_found() -> ApiError {
    ApiError::not_found("Product not found.")
}

fn text_len(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.chars().count() > TEXT_MAX {
        errors.add(field, format!("Ensure this field has no more than {TEXT_MAX} characters."));
    }
}

async fn store_image(state: &AppState, encoded: &str) -> Result<String, ApiError> {
    state
        .media
        .save_image(PRODUCT_IMAGES, encoded)
        .await
        .map_err(|e| match e {
            MediaError::NotAnImage => {
                let mut errors = FieldErrors::default();
                errors.add("image", e.to_string());
                ApiError::Validation { message: messages::VALIDATION_FAILED.into(), errors }
            }
            MediaError::Io(io) => ApiError::Internal(io.into()),
        })
}

pub async fn list_products(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
) -> Result<Response, ApiError> {
    let products = blocking(&state, move |s| {
        let rows = s.db.list_products_by_owner(caller.id)?;
        Ok(render::products(&s.db, &s.media, rows)?)
    })
    .await?;
    Ok(reply(StatusCode::OK, SUCCESS, products))
}

pub async fn get_product(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    PathParam(id): PathParam<i64>,
) -> Result<Response, ApiError> {
    let product = blocking(&state, move |s| {
        let row = s.db.get_owned_product(id, caller.id)?.ok_or_else(not_found)?;
        Ok(render::product(&s.db, &s.media, row)?)
    })
    .await?;
    Ok(reply(StatusCode::OK, SUCCESS, product))
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Payload(req): Payload<CreateProductRequest>,
) -> Result<Response, ApiError> {
    let mut errors = FieldErrors::default();

    let title = errors.require_text("title", req.title);
    if let Some(title) = &title {
        text_len(&mut errors, "title", title);
    }
    let category = match req.category.as_deref() {
        Some(c) => errors.choice::<Category>("category", Some(c)),
        None => errors.require::<Category>("category", None),
    };
    let unit = match req.unit.as_deref() {
        Some(u) => errors.choice::<Unit>("unit", Some(u)),
        None => errors.require::<Unit>("unit", None),
    };
    let qty = errors.require("quantity", req.quantity).map(|q| errors.quantity(q));
    let amount = errors.require("price", req.price).map(|p| errors.money("price", p));
    let status = errors
        .choice::<ProductStatus>("product_status", req.product_status.as_deref())
        .unwrap_or_default();
    let lat = req.lat.map(|v| errors.coordinate("lat", v));
    let lng = req.lng.map(|v| errors.coordinate("lng", v));
    if let Some(location) = &req.location {
        text_len(&mut errors, "location", location);
    }
    errors.into_result(messages::VALIDATION_FAILED)?;

    let (Some(title), Some(category), Some(unit), Some(qty), Some(amount)) = (title, category, unit, qty, amount)
    else {
        return Err(ApiError::bad_request(messages::VALIDATION_FAILED));
    };

    let image = match req.image.as_deref().filter(|i| !i.is_empty()) {
        Some(encoded) => Some(store_image(&state, encoded).await?),
        None => None,
    };

    let new_product = NewProduct {
        title,
        image,
        description: req.description,
        lat,
        lng,
        location: req.location,
        category,
        quantity: qty,
        unit,
        price: amount,
        product_status: status,
        created_by: caller.id,
    };

    let created = blocking(&state, move |s| {
        let row = s.db.insert_product(&new_product, Utc::now())?;
        info!("User {} listed product {}", row.created_by, row.id);
        Ok(render::product(&s.db, &s.media, row)?)
    })
    .await?;

    Ok(reply(StatusCode::CREATED, "Product created successfully.", created))
}

/// Apply a partial update to `row`, collecting every field error.
fn apply_update(row: &mut ProductRow, req: UpdateProductRequest, errors: &mut FieldErrors) {
    if let Some(title) = req.title {
        if title.trim().is_empty() {
            errors.add("title", "This field may not be blank.");
        } else {
            text_len(errors, "title", &title);
            row.title = title;
        }
    }
    if let Some(description) = req.description {
        row.description = description;
    }
    if let Some(lat) = req.lat {
        row.lat = lat.map(|v| errors.coordinate("lat", v));
    }
    if let Some(lng) = req.lng {
        row.lng = lng.map(|v| errors.coordinate("lng", v));
    }
    if let Some(location) = req.location {
        if let Some(l) = &location {
            text_len(errors, "location", l);
        }
        row.location = location;
    }
    if let Some(category) = errors.choice::<Category>("category", req.category.as_deref()) {
        row.category = category;
    }
    if let Some(unit) = errors.choice::<Unit>("unit", req.unit.as_deref()) {
        row.unit = unit;
    }
    if let Some(status) = errors.choice::<ProductStatus>("product_status", req.product_status.as_deref()) {
        row.product_status = status;
    }
    if let Some(q) = req.quantity {
        row.quantity = errors.quantity(q);
    }
    if let Some(p) = req.price {
        row.price = errors.money("price", p);
    }
}

pub async fn update_product(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    PathParam(id): PathParam<i64>,
    Payload(mut req): Payload<UpdateProductRequest>,
) -> Result<Response, ApiError> {
    let existing = blocking(&state, move |s| s.db.get_owned_product(id, caller.id)?.ok_or_else(not_found)).await?;

    let image = req.image.take();
    let mut row = existing;
    let mut errors = FieldErrors::default();
    apply_update(&mut row, req, &mut errors);
    errors.into_result(messages::VALIDATION_FAILED)?;

    // `null` clears the image; a string replaces it.
    match image {
        Some(Some(encoded)) if !encoded.is_empty() => row.image = Some(store_image(&state, &encoded).await?),
        Some(_) => row.image = None,
        None => {}
    }

    let updated = blocking(&state, move |s| {
        let saved = s.db.update_product(&row, Utc::now())?;
        Ok(render::product(&s.db, &s.media, saved)?)
    })
    .await?;

    Ok(reply(StatusCode::OK, "Product updated successfully.", updated))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    PathParam(id): PathParam<i64>,
) -> Result<Response, ApiError> {
    blocking(&state, move |s| {
        if !s.db.delete_owned_product(id, caller.id)? {
            return Err(not_found());
        }
        info!("User {} deleted product {}", caller.id, id);
        Ok(())
    })
    .await?;

    Ok(reply(StatusCode::OK, "Product deleted successfully.", Deleted { id }))
}

/// A radius search around a point.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Around {
    lat: f64,
    lng: f64,
    radius_km: f64,
}

/// `None` unless both coordinates are supplied; `Err` when any supplied
/// number fails to parse.
fn parse_around(query: &ProductSearchQuery) -> Result<Option<Around>, ApiError> {
    let invalid = || ApiError::bad_request("Invalid latitude or longitude format.");
    let parse = |v: &str| v.trim().parse::<f64>().ok().filter(|f| f.is_finite());

    let radius_km = match query.radius.as_deref().filter(|r| !r.is_empty()) {
        Some(r) => parse(r).ok_or_else(invalid)?,
        None => DEFAULT_RADIUS_KM,
    };

    match (
        query.lat.as_deref().filter(|v| !v.is_empty()),
        query.lng.as_deref().filter(|v| !v.is_empty()),
    ) {
        (Some(lat), Some(lng)) => Ok(Some(Around {
            lat: parse(lat).ok_or_else(invalid)?,
            lng: parse(lng).ok_or_else(invalid)?,
            radius_km,
        })),
        _ => Ok(None),
    }
}

fn within(around: &Around, product: &ProductRow) -> bool {
    match (product.lat, product.lng) {
        (Some(lat), Some(lng)) => distance_km(around.lat, around.lng, lat, lng) <= around.radius_km,
        _ => false,
    }
}

/// Unauthenticated catalogue with optional title, category and radius filters.
pub async fn public_list(
    State(state): State<AppState>,
    Params(query): Params<ProductSearchQuery>,
) -> Result<Response, ApiError> {
    let around = parse_around(&query)?;

    let category = match query.category.as_deref().filter(|c| !c.is_empty()) {
        Some(c) => match c.parse::<Category>() {
            Ok(category) => Some(category),
            // Nothing can match an unknown category.
            Err(_) => return Ok(reply(StatusCode::OK, SUCCESS, Vec::<()>::new())),
        },
        None => None,
    };
    let filter = ProductFilter {
        title_contains: query.query.filter(|q| !q.is_empty()),
        category,
    };

    let products = blocking(&state, move |s| {
        let mut rows = s.db.search_products(&filter)?;
        if let Some(around) = &around {
            rows.retain(|p| within(around, p));
        }
        Ok(render::products(&s.db, &s.media, rows)?)
    })
    .await?;

    Ok(reply(StatusCode::OK, SUCCESS, products))
}

pub async fn public_get(State(state): State<AppState>, PathParam(id): PathParam<i64>) -> Result<Response, ApiError> {
    let product = blocking(&state, move |s| {
        let row = s.db.get_product(id)?.ok_or_else(not_found)?;
        Ok(render::product(&s.db, &s.media, row)?)
    })
    .await?;
    Ok(reply(StatusCode::OK, SUCCESS, product))
}

/// Ask the text-generation service to describe a waste listing.
pub async fn rewrite_description(
    State(state): State<AppState>,
    Payload(req): Payload<RewriteRequest>,
) -> Result<Response, ApiError> {
    let title = req.title.as_deref().map(str::trim).unwrap_or_default();
    let category = req.category.as_deref().map(str::trim).unwrap_or_default();
    if title.is_empty() || category.is_empty() {
        return Err(ApiError::bad_request("Both title and category are required."));
    }

    let rewritten = state.rewriter.rewrite(title, category).await.map_err(|e| {
        warn!("Description rewrite failed for {:?}", title);
        ApiError::Upstream(e.to_string())
    })?;

    Ok(reply(StatusCode::OK, "Description rewritten successfully.", rewritten))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::REQUIRED;
    use crate::testutil::{self, json};

    fn create_req() -> CreateProductRequest {
        CreateProductRequest {
            title: Some("Box".into()),
            category: Some("paper".into()),
            quantity: Some(1),
            unit: Some("kilogram".into()),
            price: Some(5.0),
            lat: Some(40.0),
            lng: Some(-73.0),
            ..Default::default()
        }
    }

    fn search(lat: Option<&str>, lng: Option<&str>, radius: Option<&str>) -> ProductSearchQuery {
        ProductSearchQuery {
            lat: lat.map(Into::into),
            lng: lng.map(Into::into),
            radius: radius.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn radius_needs_both_coordinates() {
        assert_eq!(parse_around(&search(Some("40"), None, Some("10"))).unwrap(), None);
        let around = parse_around(&search(Some("40"), Some("-73"), None)).unwrap().unwrap();
        assert_eq!(around.radius_km, DEFAULT_RADIUS_KM);
        assert!(parse_around(&search(Some("north"), Some("-73"), None)).is_err());
        assert!(parse_around(&search(Some("40"), Some("-73"), Some("far"))).is_err());
    }

    #[test]
    fn products_without_coordinates_fall_outside_any_radius() {
        let db = testutil::db();
        let owner = testutil::user(&db, "a@x.com", "pw");
        let product = testutil::product(&db, owner.id, "Box");
        let around = Around { lat: 0.0, lng: 0.0, radius_km: 1e6 };
        assert!(!within(&around, &product));
    }

    #[tokio::test]
    async fn create_validates_and_defaults() {
        let state = testutil::state().await;
        let me = Extension(CurrentUser(testutil::user(&state.db, "a@x.com", "pw1")));

        let bad = CreateProductRequest {
            category: Some("plastic".into()),
            quantity: Some(-1),
            ..Default::default()
        };
        let err = create_product(State(state.clone()), me.clone(), Payload(bad)).await.unwrap_err();
        let ApiError::Validation { message, errors } = err else { panic!("expected validation error") };
        assert_eq!(message, "Validation failed.");
        assert_eq!(errors.get("title").unwrap()[0], REQUIRED);
        assert_eq!(errors.get("category").unwrap()[0], "\"plastic\" is not a valid choice.");
        assert!(errors.get("quantity").is_some());
        assert!(errors.get("unit").is_some());
        assert!(errors.get("price").is_some());

        let (status, body) = json(create_product(State(state.clone()), me, Payload(create_req())).await.unwrap()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Product created successfully.");
        assert_eq!(body["data"]["product_status"], "inactive");
        assert_eq!(body["data"]["created_by"]["email"], "a@x.com");
        assert_eq!(body["data"]["lat"], 40.0);
    }

    #[tokio::test]
    async fn owner_scoping() {
        let state = testutil::state().await;
        let owner = testutil::user(&state.db, "a@x.com", "pw1");
        let other = Extension(CurrentUser(testutil::user(&state.db, "b@x.com", "pw2")));
        let product = testutil::product(&state.db, owner.id, "Box");

        let err = get_product(State(state.clone()), other.clone(), PathParam(product.id)).await.unwrap_err();
        assert_eq!(err.to_string(), "Product not found.");
        let err = update_product(State(state.clone()), other.clone(), PathParam(product.id), Payload(UpdateProductRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err = delete_product(State(state.clone()), other.clone(), PathParam(product.id)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let (_, body) = json(list_products(State(state.clone()), other).await.unwrap()).await;
        assert!(body["data"].as_array().unwrap().is_empty());

        let me = Extension(CurrentUser(owner));
        let (_, body) = json(delete_product(State(state.clone()), me, PathParam(product.id)).await.unwrap()).await;
        assert_eq!(body["data"]["id"], product.id);
        assert!(state.db.get_product(product.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_update() {
        let state = testutil::state().await;
        let owner = testutil::user(&state.db, "a@x.com", "pw1");
        let product = testutil::product(&state.db, owner.id, "Box");
        let me = Extension(CurrentUser(owner));

        let req: UpdateProductRequest =
            serde_json::from_str(r#"{"price": 7.499, "product_status": "listed", "lat": 51.5, "lng": -0.12}"#).unwrap();
        let (status, body) = json(update_product(State(state.clone()), me.clone(), PathParam(product.id), Payload(req)).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["price"], 7.5);
        assert_eq!(body["data"]["title"], "Box");
        assert_eq!(body["data"]["lng"], -0.12);

        let req: UpdateProductRequest = serde_json::from_str(r#"{"lat": null, "unit": "gallon"}"#).unwrap();
        let err = update_product(State(state.clone()), me, PathParam(product.id), Payload(req)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.db.get_product(product.id).unwrap().unwrap().lat, Some(51.5));
    }

    #[tokio::test]
    async fn public_radius_search() {
        let state = testutil::state().await;
        let owner = Extension(CurrentUser(testutil::user(&state.db, "a@x.com", "pw1")));
        create_product(State(state.clone()), owner.clone(), Payload(create_req())).await.unwrap();
        let far = CreateProductRequest { title: Some("Cans".into()), lat: Some(51.5), lng: Some(-0.12), ..create_req() };
        create_product(State(state.clone()), owner, Payload(far)).await.unwrap();

        let near = search(Some("40.0"), Some("-73.0"), Some("0"));
        let (_, body) = json(public_list(State(state.clone()), Params(near)).await.unwrap()).await;
        let titles: Vec<_> = body["data"].as_array().unwrap().iter().map(|p| p["title"].clone()).collect();
        assert_eq!(titles, vec!["Box"]);

        let (_, body) = json(public_list(State(state.clone()), Params(ProductSearchQuery::default())).await.unwrap()).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"][0]["title"], "Cans");

        let by_title = ProductSearchQuery { query: Some("bo".into()), ..Default::default() };
        let (_, body) = json(public_list(State(state.clone()), Params(by_title)).await.unwrap()).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let unknown = ProductSearchQuery { category: Some("plastic".into()), ..Default::default() };
        let (_, body) = json(public_list(State(state.clone()), Params(unknown)).await.unwrap()).await;
        assert!(body["data"].as_array().unwrap().is_empty());

        let err = public_list(State(state), Params(search(Some("x"), Some("y"), None))).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid latitude or longitude format.");
    }

    #[tokio::test]
    async fn rewrite_requires_fields_and_reports_upstream_failure() {
        let state = testutil::state().await;
        let req = RewriteRequest { title: Some("  ".into()), category: Some("paper".into()) };
        let err = rewrite_description(State(state.clone()), Payload(req)).await.unwrap_err();
        assert_eq!(err.to_string(), "Both title and category are required.");

        // The test rewriter has no API key configured.
        let req = RewriteRequest { title: Some("Old tyres".into()), category: Some("metal".into()) };
        let err = rewrite_description(State(state), Payload(req)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
