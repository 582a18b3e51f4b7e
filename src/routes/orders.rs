use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
    routing::post,
};
use uuid::Uuid;

use crate::{
    dto::orders::{OrderList, OrderWithLines, PlaceOrderRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::OrderRangeQuery,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/{id}", get(get_order).delete(delete_order))
}

#[utoipa::path(
    post,
    path = "/orders",
    params(("loginUserId" = Uuid, Query, description = "Acting user")),
    request_body = PlaceOrderRequest,
    responses(
        (status = 200, description = "Order placed", body = ApiResponse<OrderWithLines>),
        (status = 403, description = "Acting user is not the buyer"),
        (status = 404, description = "Buyer or product not found"),
    ),
    tag = "Orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PlaceOrderRequest>,
) -> AppResult<Json<ApiResponse<OrderWithLines>>> {
    Ok(Json(
        order_service::place_order(&state, &user, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/orders",
    params(
        ("loginUserId" = Uuid, Query, description = "Owner whose orders are listed"),
        ("startDate" = String, Query, description = "Inclusive lower bound, YYYY-MM-DD"),
        ("endDate" = String, Query, description = "Inclusive upper bound, YYYY-MM-DD"),
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("size" = Option<i64>, Query, description = "Page size, default 20")
    ),
    responses(
        (status = 200, description = "Orders in range", body = ApiResponse<OrderList>)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderRangeQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    Ok(Json(
        order_service::list_orders_in_range(&state, &user, query).await?,
    ))
}

#[utoipa::path(get, path = "/orders/{id}", tag = "Orders")]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithLines>>> {
    Ok(Json(order_service::get_order(&state, id).await?))
}

#[utoipa::path(
    delete,
    path = "/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order ID"),
        ("loginUserId" = Uuid, Query, description = "Acting user")
    ),
    responses(
        (status = 200, description = "Order deleted"),
        (status = 403, description = "Acting user does not own the order"),
        (status = 409, description = "Payment awaiting settlement"),
    ),
    tag = "Orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(
        order_service::delete_order(&state, &user, id).await?,
    ))
}
