use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::{AccessMode, is_unique_violation, read_with_retries},
    dto::payments::{CompletePaymentRequest, PaymentList, PreparePaymentRequest, WebhookRequest},
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        payments::{
            ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments,
            Model as PaymentModel, PaymentStatus,
        },
    },
    error::{AppError, AppResult},
    gateway::GatewayStatus,
    models::Payment,
    response::{ApiResponse, Meta},
    routes::params::PaymentListQuery,
    state::AppState,
};

/// Gateway-reported metadata applied together with a settlement transition.
#[derive(Debug, Clone)]
pub struct SettlementUpdate {
    pub imp_uid: String,
    pub receipt_url: Option<String>,
    pub pg_provider: Option<String>,
    pub buyer_name: Option<String>,
}

pub async fn prepare_payment(
    state: &AppState,
    payload: PreparePaymentRequest,
) -> AppResult<ApiResponse<Payment>> {
    if payload.amount < 0 {
        return Err(AppError::BadRequest("amount must not be negative".into()));
    }

    // The insert that follows targets the primary, so the checks read it too.
    let order = Orders::find()
        .filter(OrderCol::MerchantUid.eq(payload.merchant_uid.clone()))
        .one(state.db.conn(AccessMode::ReadWrite))
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    if is_duplicate_merchant_uid(state, &payload.merchant_uid).await? {
        return Err(AppError::Conflict(
            "payment already prepared for this merchant_uid".into(),
        ));
    }

    if payload.amount != order.order_price {
        return Err(AppError::BadRequest(
            "amount does not match the order price".into(),
        ));
    }

    let inserted = PaymentActive {
        id: Set(Uuid::new_v4()),
        merchant_uid: Set(payload.merchant_uid.clone()),
        imp_uid: Set(None),
        status: Set(PaymentStatus::Prepared),
        amount: Set(payload.amount),
        paid_at: Set(None),
        failed_at: Set(None),
        cancelled_at: Set(None),
        receipt_url: Set(None),
        pg_provider: Set(None),
        buyer_name: Set(None),
        success: Set(false),
        created_at: NotSet,
    }
    .insert(state.db.conn(AccessMode::ReadWrite))
    .await;

    let payment = match inserted {
        Ok(p) => p,
        // The unique constraint closes the gap between the probe above and
        // this insert when two prepares race.
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::Conflict(
                "payment already prepared for this merchant_uid".into(),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    // Registering after the insert means a gateway timeout can leave this
    // row `Prepared`; the webhook settles it when the gateway catches up.
    state
        .gateway
        .register_prepare(&payload.merchant_uid, payload.amount)
        .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(order.user_id),
        "payment_prepare",
        Some("payments"),
        Some(serde_json::json!({
            "merchant_uid": payload.merchant_uid,
            "amount": payload.amount,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Payment prepared",
        payment_from_entity(payment),
        Some(Meta::empty()),
    ))
}

/// Idempotent settlement entry point. Returns the payment and whether the
/// call was a replay of an already-terminal record.
///
/// The transition is one conditional `UPDATE ... WHERE status = 'prepared'`:
/// of two callbacks racing for the same row exactly one can win it, and the
/// loser observes the committed terminal state on the re-read.
pub async fn process_callback(
    state: &AppState,
    merchant_uid: &str,
    reported: GatewayStatus,
    update: SettlementUpdate,
) -> AppResult<(Payment, bool)> {
    let target = reported.terminal_status();
    let now = Utc::now();

    let mut stmt = Payments::update_many()
        .col_expr(PaymentCol::Status, Expr::value(target))
        .col_expr(PaymentCol::ImpUid, Expr::value(Some(update.imp_uid.clone())))
        .col_expr(PaymentCol::ReceiptUrl, Expr::value(update.receipt_url.clone()))
        .col_expr(PaymentCol::PgProvider, Expr::value(update.pg_provider.clone()))
        .col_expr(PaymentCol::BuyerName, Expr::value(update.buyer_name.clone()))
        .col_expr(
            PaymentCol::Success,
            Expr::value(target == PaymentStatus::Succeeded),
        );
    stmt = match reported {
        GatewayStatus::Paid => stmt.col_expr(PaymentCol::PaidAt, Expr::value(now)),
        GatewayStatus::Failed => stmt.col_expr(PaymentCol::FailedAt, Expr::value(now)),
        GatewayStatus::Cancelled => stmt.col_expr(PaymentCol::CancelledAt, Expr::value(now)),
    };

    let result = stmt
        .filter(PaymentCol::MerchantUid.eq(merchant_uid))
        .filter(PaymentCol::Status.eq(PaymentStatus::Prepared))
        .exec(state.db.conn(AccessMode::ReadWrite))
        .await?;

    // Re-read on the primary: this operation just wrote, or lost the race to
    // a writer whose commit we must observe. The replica may lag both.
    let payment = Payments::find()
        .filter(PaymentCol::MerchantUid.eq(merchant_uid))
        .one(state.db.conn(AccessMode::ReadWrite))
        .await?;
    let payment = match payment {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    if result.rows_affected == 0 {
        if payment.status.is_terminal() {
            // Replayed or reordered delivery: nothing changed, report success.
            return Ok((payment_from_entity(payment), true));
        }
        return Err(AppError::Internal(anyhow::anyhow!(
            "payment {merchant_uid} not transitioned and not terminal"
        )));
    }

    tracing::info!(
        merchant_uid = %merchant_uid,
        status = ?payment.status,
        "payment settled"
    );

    if let Err(err) = log_audit(
        &state.pool,
        None,
        "payment_settle",
        Some("payments"),
        Some(serde_json::json!({
            "merchant_uid": merchant_uid,
            "imp_uid": update.imp_uid,
            "status": payment.status,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok((payment_from_entity(payment), false))
}

/// Client-triggered settlement: verify the transaction with the gateway
/// before trusting the reported outcome.
pub async fn complete_payment(
    state: &AppState,
    payload: CompletePaymentRequest,
) -> AppResult<ApiResponse<Payment>> {
    let tx = state.gateway.fetch_transaction(&payload.imp_uid).await?;
    if tx.merchant_uid != payload.merchant_uid {
        return Err(AppError::BadRequest(
            "gateway transaction does not belong to this merchant_uid".into(),
        ));
    }

    let existing = Payments::find()
        .filter(PaymentCol::MerchantUid.eq(payload.merchant_uid.clone()))
        .one(state.db.conn(AccessMode::ReadWrite))
        .await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let update = SettlementUpdate {
        imp_uid: tx.imp_uid.clone(),
        receipt_url: tx.receipt_url.clone(),
        pg_provider: tx.pg_provider.clone(),
        buyer_name: tx.buyer_name.clone(),
    };

    // An amount differing from what was prepared means the checkout was
    // tampered with; the payment is failed rather than left open.
    if existing.status == PaymentStatus::Prepared && tx.amount != existing.amount {
        process_callback(state, &payload.merchant_uid, GatewayStatus::Failed, update).await?;
        return Err(AppError::Conflict(
            "gateway amount does not match the prepared amount".into(),
        ));
    }

    let (payment, replayed) =
        process_callback(state, &payload.merchant_uid, tx.status, update).await?;

    let message = if replayed { "Already settled" } else { "Payment settled" };
    Ok(ApiResponse::success(message, payment, Some(Meta::empty())))
}

/// Webhook entry point. Duplicate deliveries settle into a 200 replay
/// response; the gateway must never see an error for retransmitting.
pub async fn handle_webhook(
    state: &AppState,
    payload: WebhookRequest,
) -> AppResult<ApiResponse<Payment>> {
    let update = SettlementUpdate {
        imp_uid: payload.imp_uid,
        receipt_url: None,
        pg_provider: None,
        buyer_name: None,
    };

    let (payment, replayed) =
        process_callback(state, &payload.merchant_uid, payload.status, update).await?;

    let message = if replayed { "Already settled" } else { "Payment settled" };
    Ok(ApiResponse::success(message, payment, Some(Meta::empty())))
}

pub async fn get_payment(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Payment>> {
    let payment = read_with_retries(|| {
        Payments::find_by_id(id).one(state.db.conn(AccessMode::ReadOnly))
    })
    .await?;
    let payment = match payment {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    Ok(ApiResponse::success(
        "OK",
        payment_from_entity(payment),
        Some(Meta::empty()),
    ))
}

pub async fn list_payments_by_payer(
    state: &AppState,
    query: PaymentListQuery,
) -> AppResult<ApiResponse<PaymentList>> {
    let (page, size, offset) = query.pagination.normalize();

    let finder = Payments::find()
        .filter(PaymentCol::BuyerName.eq(query.username.clone()))
        .order_by_desc(PaymentCol::CreatedAt);

    let total = read_with_retries(|| finder.clone().count(state.db.conn(AccessMode::ReadOnly)))
        .await? as i64;

    let payments = read_with_retries(|| {
        finder
            .clone()
            .limit(size as u64)
            .offset(offset as u64)
            .all(state.db.conn(AccessMode::ReadOnly))
    })
    .await?
    .into_iter()
    .map(payment_from_entity)
    .collect();

    let meta = Meta::new(page, size, total);
    Ok(ApiResponse::success(
        "Payments",
        PaymentList { content: payments },
        Some(meta),
    ))
}

/// Defensive probe ahead of prepare; the unique constraint remains the
/// authority when two prepares race past it.
pub async fn is_duplicate_merchant_uid(state: &AppState, reference: &str) -> AppResult<bool> {
    let count = Payments::find()
        .filter(PaymentCol::MerchantUid.eq(reference))
        .count(state.db.conn(AccessMode::ReadWrite))
        .await?;
    Ok(count > 0)
}

fn payment_from_entity(model: PaymentModel) -> Payment {
    Payment {
        id: model.id,
        merchant_uid: model.merchant_uid,
        imp_uid: model.imp_uid,
        status: model.status,
        amount: model.amount,
        paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
        failed_at: model.failed_at.map(|dt| dt.with_timezone(&Utc)),
        cancelled_at: model.cancelled_at.map(|dt| dt.with_timezone(&Utc)),
        receipt_url: model.receipt_url,
        pg_provider: model.pg_provider,
        buyer_name: model.buyer_name,
        success: model.success,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
