use std::sync::Arc;

use async_trait::async_trait;
use axum_marketplace_api::{
    db::{AccessMode, DbRouter, create_orm_conn, create_pool},
    dto::orders::{OrderLineRequest, PlaceOrderRequest},
    entity::orders::ActiveModel as OrderActive,
    entity::products::ActiveModel as ProductActive,
    entity::users::ActiveModel as UserActive,
    error::{AppError, AppResult},
    gateway::{GatewayTransaction, PaymentGateway},
    middleware::auth::AuthUser,
    reference::MerchantReferenceGenerator,
    routes::params::{OrderRangeQuery, Pagination},
    services::{order_service, payment_service},
    state::AppState,
};
use chrono::{TimeZone, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

struct StubGateway;

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn register_prepare(&self, _merchant_uid: &str, _amount: i64) -> AppResult<()> {
        Ok(())
    }

    async fn fetch_transaction(&self, _imp_uid: &str) -> AppResult<GatewayTransaction> {
        Err(AppError::NotFound)
    }
}

// Integration flow: place an order, verify pricing and atomicity, exercise
// ownership on delete, and list by date range.
#[tokio::test]
async fn place_delete_and_range_listing_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let buyer_id = create_user(&state, "buyer@example.com").await?;
    let stranger_id = create_user(&state, "stranger@example.com").await?;
    let widget = create_product(&state, "Widget", 5000).await?;
    let gadget = create_product(&state, "Gadget", 3000).await?;

    let buyer = AuthUser { user_id: buyer_id };
    let stranger = AuthUser { user_id: stranger_id };

    // Place: 2 x 5000 + 1 x 3000 = 13000, two lines, a fresh reference.
    let placed = order_service::place_order(
        &state,
        &buyer,
        PlaceOrderRequest {
            buyer_id,
            request_message: Some("leave at the door".into()),
            products: vec![
                OrderLineRequest { product_id: widget, quantity: 2 },
                OrderLineRequest { product_id: gadget, quantity: 1 },
            ],
        },
    )
    .await?;
    let placed = placed.data.unwrap();
    assert_eq!(placed.order.order_price, 13000);
    assert_eq!(placed.lines.len(), 2);
    assert!(placed.order.merchant_uid.starts_with("merch_"));
    let line_prices: Vec<i64> = placed.lines.iter().map(|l| l.line_price).collect();
    assert!(line_prices.contains(&10000));
    assert!(line_prices.contains(&3000));

    // A second order mints a different reference even back-to-back.
    let second = order_service::place_order(
        &state,
        &buyer,
        PlaceOrderRequest {
            buyer_id,
            request_message: None,
            products: vec![OrderLineRequest { product_id: gadget, quantity: 1 }],
        },
    )
    .await?;
    let second = second.data.unwrap();
    assert_ne!(second.order.merchant_uid, placed.order.merchant_uid);

    // Acting for someone else is forbidden before anything is read.
    let forbidden = order_service::place_order(
        &state,
        &stranger,
        PlaceOrderRequest {
            buyer_id,
            request_message: None,
            products: vec![OrderLineRequest { product_id: widget, quantity: 1 }],
        },
    )
    .await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));

    // A missing product aborts the whole order; nothing is persisted.
    let before = count_orders(&state, buyer_id).await?;
    let missing = order_service::place_order(
        &state,
        &buyer,
        PlaceOrderRequest {
            buyer_id,
            request_message: None,
            products: vec![
                OrderLineRequest { product_id: widget, quantity: 1 },
                OrderLineRequest { product_id: Uuid::new_v4(), quantity: 1 },
            ],
        },
    )
    .await;
    assert!(matches!(missing, Err(AppError::NotFound)));
    assert_eq!(count_orders(&state, buyer_id).await?, before);

    // Lookup round-trips; unknown ids are 404.
    let fetched = order_service::get_order(&state, placed.order.id).await?;
    assert_eq!(fetched.data.unwrap().order.id, placed.order.id);
    let unknown = order_service::get_order(&state, Uuid::new_v4()).await;
    assert!(matches!(unknown, Err(AppError::NotFound)));

    // Delete by a non-owner is rejected and changes nothing.
    let denied = order_service::delete_order(&state, &stranger, placed.order.id).await;
    assert!(matches!(denied, Err(AppError::Forbidden)));
    assert!(order_service::get_order(&state, placed.order.id).await.is_ok());

    // A payment still awaiting settlement pins the order.
    payment_service::prepare_payment(
        &state,
        axum_marketplace_api::dto::payments::PreparePaymentRequest {
            merchant_uid: placed.order.merchant_uid.clone(),
            amount: placed.order.order_price,
        },
    )
    .await?;
    let pinned = order_service::delete_order(&state, &buyer, placed.order.id).await;
    assert!(matches!(pinned, Err(AppError::Conflict(_))));

    // The unencumbered order deletes cleanly.
    order_service::delete_order(&state, &buyer, second.order.id).await?;
    let gone = order_service::get_order(&state, second.order.id).await;
    assert!(matches!(gone, Err(AppError::NotFound)));

    // Date-range listing is inclusive on both day boundaries.
    let in_range_early = Utc.with_ymd_and_hms(2023, 9, 1, 0, 0, 0).unwrap();
    let in_range_late = Utc.with_ymd_and_hms(2023, 9, 30, 23, 59, 59).unwrap();
    let before_range = Utc.with_ymd_and_hms(2023, 8, 31, 23, 59, 59).unwrap();
    let after_range = Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap();
    for (suffix, at) in [
        ("sept_first", in_range_early),
        ("sept_last", in_range_late),
        ("aug", before_range),
        ("oct", after_range),
    ] {
        OrderActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(buyer_id),
            request_message: Set(None),
            order_price: Set(1000),
            merchant_uid: Set(format!("merch_range_{suffix}")),
            ordered_at: Set(at.into()),
        }
        .insert(state.db.conn(AccessMode::ReadWrite))
        .await?;
    }

    let listed = order_service::list_orders_in_range(
        &state,
        &buyer,
        OrderRangeQuery {
            pagination: Pagination { page: Some(1), size: Some(10) },
            start_date: "2023-09-01".into(),
            end_date: "2023-09-30".into(),
        },
    )
    .await?;
    let meta = listed.meta.clone().unwrap();
    let listed = listed.data.unwrap();
    assert_eq!(meta.total_elements, Some(2));
    assert_eq!(listed.content.len(), 2);
    assert!(
        listed
            .content
            .iter()
            .all(|order| order.merchant_uid.starts_with("merch_range_sept"))
    );

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Clean tables between runs
    sqlx::query(
        "TRUNCATE TABLE order_lines, orders, payments, audit_logs, products, users RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await?;

    let conn = create_orm_conn(database_url).await?;
    Ok(AppState {
        pool,
        db: DbRouter::new(conn.clone(), conn),
        gateway: Arc::new(StubGateway),
        references: Arc::new(MerchantReferenceGenerator::new()),
    })
}

async fn create_user(state: &AppState, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        name: Set(email.split('@').next().unwrap_or(email).to_string()),
        created_at: NotSet,
    }
    .insert(state.db.conn(AccessMode::ReadWrite))
    .await?;

    Ok(user.id)
}

async fn create_product(state: &AppState, name: &str, price: i64) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(None),
        price: Set(price),
        created_at: NotSet,
    }
    .insert(state.db.conn(AccessMode::ReadWrite))
    .await?;

    Ok(product.id)
}

async fn count_orders(state: &AppState, user_id: Uuid) -> anyhow::Result<u64> {
    use axum_marketplace_api::entity::orders::{Column as OrderCol, Entity as Orders};
    use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

    let count = Orders::find()
        .filter(OrderCol::UserId.eq(user_id))
        .count(state.db.conn(AccessMode::ReadWrite))
        .await?;
    Ok(count)
}
