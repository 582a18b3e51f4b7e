use std::sync::Arc;

use crate::db::{DbPool, DbRouter};
use crate::gateway::PaymentGateway;
use crate::reference::MerchantReferenceGenerator;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub db: DbRouter,
    pub gateway: Arc<dyn PaymentGateway>,
    pub references: Arc<MerchantReferenceGenerator>,
}
