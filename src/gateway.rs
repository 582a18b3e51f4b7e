use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::entity::payments::PaymentStatus;
use crate::error::{AppError, AppResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Settlement outcome as the gateway reports it on callbacks and lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Paid,
    Failed,
    Cancelled,
}

impl GatewayStatus {
    pub fn from_wire(status: &str) -> Option<Self> {
        match status {
            "paid" => Some(GatewayStatus::Paid),
            "failed" => Some(GatewayStatus::Failed),
            "cancelled" => Some(GatewayStatus::Cancelled),
            _ => None,
        }
    }

    /// The terminal payment state this report drives.
    pub fn terminal_status(self) -> PaymentStatus {
        match self {
            GatewayStatus::Paid => PaymentStatus::Succeeded,
            GatewayStatus::Failed => PaymentStatus::Failed,
            GatewayStatus::Cancelled => PaymentStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayTransaction {
    pub imp_uid: String,
    pub merchant_uid: String,
    pub status: GatewayStatus,
    pub amount: i64,
    pub receipt_url: Option<String>,
    pub pg_provider: Option<String>,
    pub buyer_name: Option<String>,
}

/// Outbound gateway surface. Object-safe so the application state can hold
/// an `Arc<dyn PaymentGateway>` and tests can substitute a scripted one.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register the expected amount for a merchant_uid ahead of checkout.
    async fn register_prepare(&self, merchant_uid: &str, amount: i64) -> AppResult<()>;

    /// Fetch the authoritative transaction record for verification.
    async fn fetch_transaction(&self, imp_uid: &str) -> AppResult<GatewayTransaction>;
}

/// REST client for the payment gateway. Timeouts are bounded: a hung
/// gateway must not hold a request worker past the read timeout, and the
/// webhook reconciles anything left `Prepared` by a timed-out call.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        })
    }

    async fn access_token(&self) -> AppResult<String> {
        let envelope: Envelope<TokenResponse> = self
            .client
            .post(format!("{}/users/getToken", self.base_url))
            .json(&serde_json::json!({
                "imp_key": self.api_key,
                "imp_secret": self.api_secret,
            }))
            .send()
            .await
            .map_err(map_transport)?
            .json()
            .await
            .map_err(map_transport)?;
        Ok(envelope.into_response()?.access_token)
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn register_prepare(&self, merchant_uid: &str, amount: i64) -> AppResult<()> {
        let token = self.access_token().await?;
        let envelope: Envelope<serde_json::Value> = self
            .client
            .post(format!("{}/payments/prepare", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "merchant_uid": merchant_uid,
                "amount": amount,
            }))
            .send()
            .await
            .map_err(map_transport)?
            .json()
            .await
            .map_err(map_transport)?;
        envelope.into_response()?;
        Ok(())
    }

    async fn fetch_transaction(&self, imp_uid: &str) -> AppResult<GatewayTransaction> {
        let token = self.access_token().await?;
        let envelope: Envelope<TransactionResponse> = self
            .client
            .get(format!("{}/payments/{imp_uid}", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_transport)?
            .json()
            .await
            .map_err(map_transport)?;
        let tx = envelope.into_response()?;

        let status = GatewayStatus::from_wire(&tx.status).ok_or_else(|| {
            AppError::BadRequest(format!("unrecognized gateway status {}", tx.status))
        })?;

        Ok(GatewayTransaction {
            imp_uid: tx.imp_uid,
            merchant_uid: tx.merchant_uid,
            status,
            amount: tx.amount,
            receipt_url: tx.receipt_url,
            pg_provider: tx.pg_provider,
            buyer_name: tx.buyer_name,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i32,
    message: Option<String>,
    response: Option<T>,
}

impl<T> Envelope<T> {
    fn into_response(self) -> AppResult<T> {
        if self.code != 0 {
            return Err(AppError::BadRequest(format!(
                "gateway rejected request: {}",
                self.message.unwrap_or_default()
            )));
        }
        self.response
            .ok_or_else(|| AppError::BadRequest("gateway returned no payload".into()))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    imp_uid: String,
    merchant_uid: String,
    status: String,
    amount: i64,
    receipt_url: Option<String>,
    pg_provider: Option<String>,
    buyer_name: Option<String>,
}

fn map_transport(err: reqwest::Error) -> AppError {
    if err.is_timeout() || err.is_connect() {
        AppError::Unavailable("payment gateway".into())
    } else {
        AppError::Internal(anyhow::Error::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_statuses_map_to_terminal_states() {
        assert_eq!(
            GatewayStatus::from_wire("paid").map(GatewayStatus::terminal_status),
            Some(PaymentStatus::Succeeded)
        );
        assert_eq!(
            GatewayStatus::from_wire("failed").map(GatewayStatus::terminal_status),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(
            GatewayStatus::from_wire("cancelled").map(GatewayStatus::terminal_status),
            Some(PaymentStatus::Cancelled)
        );
    }

    #[test]
    fn unknown_wire_status_is_rejected() {
        assert_eq!(GatewayStatus::from_wire("ready"), None);
    }

    #[test]
    fn non_zero_envelope_code_is_an_error() {
        let envelope: Envelope<TokenResponse> = Envelope {
            code: 1,
            message: Some("invalid key".into()),
            response: None,
        };
        assert!(matches!(
            envelope.into_response(),
            Err(AppError::BadRequest(_))
        ));
    }
}
