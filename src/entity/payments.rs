use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Settlement state machine. `Prepared` is the only non-terminal state;
/// exactly one transition out of it is ever recorded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "prepared")]
    Prepared,
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            PaymentStatus::Prepared => false,
            PaymentStatus::Succeeded | PaymentStatus::Failed | PaymentStatus::Cancelled => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    /// One payment per order; also the idempotency key for every gateway
    /// interaction.
    #[sea_orm(unique)]
    pub merchant_uid: String,
    /// Gateway transaction id; absent until settlement reports one.
    pub imp_uid: Option<String>,
    pub status: PaymentStatus,
    pub amount: i64,
    pub paid_at: Option<DateTimeWithTimeZone>,
    pub failed_at: Option<DateTimeWithTimeZone>,
    pub cancelled_at: Option<DateTimeWithTimeZone>,
    pub receipt_url: Option<String>,
    pub pg_provider: Option<String>,
    pub buyer_name: Option<String>,
    pub success: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_prepared_is_non_terminal() {
        assert!(!PaymentStatus::Prepared.is_terminal());
        assert!(PaymentStatus::Succeeded.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
    }
}
