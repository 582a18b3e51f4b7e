use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::payments::{CompletePaymentRequest, PaymentList, PreparePaymentRequest},
    error::AppResult,
    models::Payment,
    response::ApiResponse,
    routes::params::PaymentListQuery,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/prepare", post(prepare_payment))
        .route("/complete", post(complete_payment))
        .route("/", get(list_payments))
        .route("/{id}", get(get_payment))
}

#[utoipa::path(
    post,
    path = "/payments/prepare",
    request_body = PreparePaymentRequest,
    responses(
        (status = 200, description = "Payment prepared", body = ApiResponse<Payment>),
        (status = 404, description = "No order for merchant_uid"),
        (status = 409, description = "Already prepared"),
    ),
    tag = "Payments"
)]
pub async fn prepare_payment(
    State(state): State<AppState>,
    Json(payload): Json<PreparePaymentRequest>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    Ok(Json(
        payment_service::prepare_payment(&state, payload).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/payments/complete",
    request_body = CompletePaymentRequest,
    responses(
        (status = 200, description = "Settled (or already settled)", body = ApiResponse<Payment>),
        (status = 404, description = "Unknown merchant_uid"),
        (status = 409, description = "Gateway amount mismatch"),
    ),
    tag = "Payments"
)]
pub async fn complete_payment(
    State(state): State<AppState>,
    Json(payload): Json<CompletePaymentRequest>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    Ok(Json(
        payment_service::complete_payment(&state, payload).await?,
    ))
}

#[utoipa::path(get, path = "/payments/{id}", tag = "Payments")]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    Ok(Json(payment_service::get_payment(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/payments",
    params(
        ("username" = String, Query, description = "Payer display name"),
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("size" = Option<i64>, Query, description = "Page size, default 20")
    ),
    responses(
        (status = 200, description = "Payments by payer", body = ApiResponse<PaymentList>)
    ),
    tag = "Payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentListQuery>,
) -> AppResult<Json<ApiResponse<PaymentList>>> {
    Ok(Json(
        payment_service::list_payments_by_payer(&state, query).await?,
    ))
}
