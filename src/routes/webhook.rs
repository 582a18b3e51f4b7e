use axum::{Json, extract::State};

use crate::{
    dto::payments::WebhookRequest,
    error::AppResult,
    models::Payment,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

/// Gateway-initiated settlement notification. Delivery is at-least-once;
/// replays of an already-terminal payment answer 200 with the existing
/// record so the gateway stops retrying.
#[utoipa::path(
    post,
    path = "/",
    request_body = WebhookRequest,
    responses(
        (status = 200, description = "Settled, or replay of a settled payment", body = ApiResponse<Payment>),
        (status = 404, description = "Unknown merchant_uid"),
    ),
    tag = "Payments"
)]
pub async fn gateway_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookRequest>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    Ok(Json(
        payment_service::handle_webhook(&state, payload).await?,
    ))
}
