use axum::extract::{FromRequestParts, Query};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;

/// The authenticated principal. Identity resolution itself lives outside
/// this service; upstream hands us the acting user id as the `loginUserId`
/// query parameter.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
struct PrincipalQuery {
    #[serde(rename = "loginUserId")]
    login_user_id: Uuid,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<PrincipalQuery>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::BadRequest("Missing or invalid loginUserId".into()))?;

        Ok(AuthUser {
            user_id: query.login_user_id,
        })
    }
}
