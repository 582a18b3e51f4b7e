use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    authz::ensure_owner,
    db::{AccessMode, is_unique_violation, read_with_retries},
    dto::orders::{OrderList, OrderWithLines, PlaceOrderRequest},
    entity::{
        order_lines::{
            ActiveModel as OrderLineActive, Column as OrderLineCol, Entity as OrderLines,
            Model as OrderLineModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        payments::{Column as PaymentCol, Entity as Payments},
        products::Entity as Products,
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderLine},
    pricing::{self, PricedLine},
    response::{ApiResponse, Meta},
    routes::params::OrderRangeQuery,
    state::AppState,
};

const REFERENCE_ATTEMPTS: u32 = 3;

/// A line request resolved against the catalog, unit price snapshotted.
struct ResolvedLine {
    product_id: Uuid,
    quantity: i32,
    unit_price: i64,
}

pub async fn place_order(
    state: &AppState,
    acting: &AuthUser,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<OrderWithLines>> {
    ensure_owner(payload.buyer_id, acting.user_id)?;

    if payload.products.is_empty() {
        return Err(AppError::BadRequest("order has no lines".into()));
    }

    let buyer = read_with_retries(|| {
        Users::find_by_id(payload.buyer_id).one(state.db.conn(AccessMode::ReadOnly))
    })
    .await?;
    if buyer.is_none() {
        return Err(AppError::NotFound);
    }

    // Resolve every product before writing anything; a single missing id
    // aborts the whole order.
    let mut resolved: Vec<ResolvedLine> = Vec::with_capacity(payload.products.len());
    for line in &payload.products {
        if line.quantity <= 0 {
            return Err(AppError::BadRequest(
                "quantity must be greater than 0".to_string(),
            ));
        }
        let product = read_with_retries(|| {
            Products::find_by_id(line.product_id).one(state.db.conn(AccessMode::ReadOnly))
        })
        .await?;
        let product = match product {
            Some(p) => p,
            None => return Err(AppError::NotFound),
        };
        resolved.push(ResolvedLine {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: product.price,
        });
    }

    let priced: Vec<PricedLine> = resolved
        .iter()
        .map(|line| PricedLine {
            unit_price: line.unit_price,
            quantity: line.quantity,
        })
        .collect();
    let order_price = pricing::compute_total(&priced)?;

    // The reference generator makes an in-process collision impossible, but
    // the unique constraint is the authority; another process may have won
    // the same reference, so regenerate and retry a bounded number of times.
    for _ in 0..REFERENCE_ATTEMPTS {
        let merchant_uid = state.references.generate(acting.user_id);
        match insert_order(state, &payload, &resolved, order_price, &merchant_uid).await {
            Ok(data) => {
                if let Err(err) = log_audit(
                    &state.pool,
                    Some(acting.user_id),
                    "order_place",
                    Some("orders"),
                    Some(serde_json::json!({
                        "order_id": data.order.id,
                        "merchant_uid": data.order.merchant_uid,
                    })),
                )
                .await
                {
                    tracing::warn!(error = %err, "audit log failed");
                }

                return Ok(ApiResponse::success("Order placed", data, Some(Meta::empty())));
            }
            Err(AppError::OrmError(err)) if is_unique_violation(&err) => {
                tracing::debug!(merchant_uid = %merchant_uid, "merchant reference taken, regenerating");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(AppError::Conflict(
        "could not allocate a unique merchant reference".into(),
    ))
}

/// Order, lines and reference land in one transaction on the primary; a
/// failure at any point leaves nothing behind.
async fn insert_order(
    state: &AppState,
    payload: &PlaceOrderRequest,
    resolved: &[ResolvedLine],
    order_price: i64,
    merchant_uid: &str,
) -> AppResult<OrderWithLines> {
    let txn = state.db.conn(AccessMode::ReadWrite).begin().await?;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(payload.buyer_id),
        request_message: Set(payload.request_message.clone()),
        order_price: Set(order_price),
        merchant_uid: Set(merchant_uid.to_string()),
        ordered_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut lines: Vec<OrderLine> = Vec::with_capacity(resolved.len());
    for line in resolved {
        let priced = PricedLine {
            unit_price: line.unit_price,
            quantity: line.quantity,
        };
        let inserted = OrderLineActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            line_price: Set(priced.line_price()?),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        lines.push(line_from_entity(inserted));
    }

    txn.commit().await?;

    Ok(OrderWithLines {
        order: order_from_entity(order),
        lines,
    })
}

pub async fn get_order(state: &AppState, id: Uuid) -> AppResult<ApiResponse<OrderWithLines>> {
    let order = read_with_retries(|| {
        Orders::find_by_id(id).one(state.db.conn(AccessMode::ReadOnly))
    })
    .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let lines = read_with_retries(|| {
        OrderLines::find()
            .filter(OrderLineCol::OrderId.eq(order.id))
            .all(state.db.conn(AccessMode::ReadOnly))
    })
    .await?
    .into_iter()
    .map(line_from_entity)
    .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithLines {
            order: order_from_entity(order),
            lines,
        },
        Some(Meta::empty()),
    ))
}

pub async fn delete_order(
    state: &AppState,
    acting: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let order = read_with_retries(|| {
        Orders::find_by_id(id).one(state.db.conn(AccessMode::ReadOnly))
    })
    .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    ensure_owner(order.user_id, acting.user_id)?;

    let txn = state.db.conn(AccessMode::ReadWrite).begin().await?;

    // A payment still in flight pins the order; deleting it would orphan the
    // settlement when the webhook lands.
    let payment = Payments::find()
        .filter(PaymentCol::MerchantUid.eq(order.merchant_uid.clone()))
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    if let Some(payment) = payment {
        if !payment.status.is_terminal() {
            return Err(AppError::Conflict(
                "order has a payment awaiting settlement".into(),
            ));
        }
    }

    let result = Orders::delete_by_id(id).exec(&txn).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(acting.user_id),
        "order_delete",
        Some("orders"),
        Some(serde_json::json!({ "order_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_orders_in_range(
    state: &AppState,
    acting: &AuthUser,
    query: OrderRangeQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let range = query.date_range()?;
    let (page, size, offset) = query.pagination.normalize();

    let condition = Condition::all()
        .add(OrderCol::UserId.eq(acting.user_id))
        .add(OrderCol::OrderedAt.gte(range.start))
        .add(OrderCol::OrderedAt.lte(range.end));

    let finder = Orders::find()
        .filter(condition)
        .order_by_desc(OrderCol::OrderedAt);

    let total = read_with_retries(|| finder.clone().count(state.db.conn(AccessMode::ReadOnly)))
        .await? as i64;

    let orders = read_with_retries(|| {
        finder
            .clone()
            .limit(size as u64)
            .offset(offset as u64)
            .all(state.db.conn(AccessMode::ReadOnly))
    })
    .await?
    .into_iter()
    .map(order_from_entity)
    .collect();

    let meta = Meta::new(page, size, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { content: orders },
        Some(meta),
    ))
}

fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        request_message: model.request_message,
        order_price: model.order_price,
        merchant_uid: model.merchant_uid,
        ordered_at: model.ordered_at.with_timezone(&Utc),
    }
}

fn line_from_entity(model: OrderLineModel) -> OrderLine {
    OrderLine {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        unit_price: model.unit_price,
        line_price: model.line_price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
