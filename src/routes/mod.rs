use axum::Router;
use axum::routing::post;

use crate::state::AppState;

pub mod doc;
pub mod health;
pub mod orders;
pub mod params;
pub mod payments;
pub mod webhook;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        // The gateway posts settlement notifications to the root path.
        .route("/", post(webhook::gateway_webhook))
        .nest("/orders", orders::router())
        .nest("/payments", payments::router())
}
