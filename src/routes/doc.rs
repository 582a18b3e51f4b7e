use utoipa::OpenApi;
use utoipa::openapi::OpenApi as OpenApiSpec;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        orders::{OrderLineRequest, OrderList, OrderWithLines, PlaceOrderRequest},
        payments::{CompletePaymentRequest, PaymentList, PreparePaymentRequest, WebhookRequest},
    },
    gateway::GatewayStatus,
    models::{Order, OrderLine, Payment, PaymentStatus, Product, User},
    response::{ApiResponse, Meta},
    routes::{health, orders, params, payments, webhook},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        orders::place_order,
        orders::list_orders,
        orders::get_order,
        orders::delete_order,
        payments::prepare_payment,
        payments::complete_payment,
        payments::get_payment,
        payments::list_payments,
        webhook::gateway_webhook
    ),
    components(
        schemas(
            User,
            Product,
            Order,
            OrderLine,
            Payment,
            PaymentStatus,
            GatewayStatus,
            PlaceOrderRequest,
            OrderLineRequest,
            OrderList,
            OrderWithLines,
            PreparePaymentRequest,
            CompletePaymentRequest,
            WebhookRequest,
            PaymentList,
            params::Pagination,
            params::OrderRangeQuery,
            params::PaymentListQuery,
            Meta,
            ApiResponse<OrderWithLines>,
            ApiResponse<OrderList>,
            ApiResponse<Payment>,
            ApiResponse<PaymentList>
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Orders", description = "Order placement and lookup"),
        (name = "Payments", description = "Payment preparation and settlement"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
