use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, post},
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartDto, CartItemQuery, UpdateCartItemRequest},
    error::AppResult,
    middleware::{auth::MaybeAuthUser, cart_session::CartSession},
    response::ApiResponse,
    services::cart_service::{self, CartOwner},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_to_cart).patch(update_cart_item))
        .route("/items/{product_id}", delete(remove_from_cart))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    params(
        ("x-session-cart-id" = Option<String>, Header, description = "Guest cart id")
    ),
    responses(
        (status = 200, description = "Current cart with totals", body = ApiResponse<CartDto>)
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    CartSession(session): CartSession,
) -> AppResult<Json<ApiResponse<CartDto>>> {
    let owner = CartOwner::new(user.as_ref(), session);
    let resp = cart_service::get_cart(&state, owner).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart/items",
    request_body = AddToCartRequest,
    params(
        ("x-session-cart-id" = Option<String>, Header, description = "Guest cart id")
    ),
    responses(
        (status = 200, description = "Item added", body = ApiResponse<CartDto>),
        (status = 400, description = "Invalid product, size or quantity")
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    CartSession(session): CartSession,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<CartDto>>> {
    let owner = CartOwner::new(user.as_ref(), session);
    let resp = cart_service::add_item(&state, owner, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/cart/items",
    request_body = UpdateCartItemRequest,
    params(
        ("x-session-cart-id" = Option<String>, Header, description = "Guest cart id")
    ),
    responses(
        (status = 200, description = "Quantity updated", body = ApiResponse<CartDto>),
        (status = 404, description = "Line not in cart")
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    CartSession(session): CartSession,
    Json(payload): Json<UpdateCartItemRequest>,
) -> AppResult<Json<ApiResponse<CartDto>>> {
    let owner = CartOwner::new(user.as_ref(), session);
    let resp = cart_service::update_item(&state, owner, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items/{product_id}",
    params(
        ("product_id" = Uuid, Path, description = "Product ID"),
        CartItemQuery,
        ("x-session-cart-id" = Option<String>, Header, description = "Guest cart id")
    ),
    responses(
        (status = 200, description = "Item removed", body = ApiResponse<CartDto>),
        (status = 404, description = "Line not in cart")
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    CartSession(session): CartSession,
    Path(product_id): Path<Uuid>,
    Query(query): Query<CartItemQuery>,
) -> AppResult<Json<ApiResponse<CartDto>>> {
    let owner = CartOwner::new(user.as_ref(), session);
    let resp = cart_service::remove_item(&state, owner, product_id, query.size_id).await?;
    Ok(Json(resp))
}
