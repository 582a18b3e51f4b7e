use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::gateway::GatewayStatus;
use crate::models::Payment;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PreparePaymentRequest {
    pub merchant_uid: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompletePaymentRequest {
    pub imp_uid: String,
    pub merchant_uid: String,
}

/// Gateway-initiated webhook body. `status` arrives as the gateway's own
/// vocabulary and is rejected with 400 when unrecognized.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookRequest {
    pub imp_uid: String,
    pub merchant_uid: String,
    pub status: GatewayStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentList {
    pub content: Vec<Payment>,
}
