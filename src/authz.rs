use uuid::Uuid;

use crate::error::AppError;

/// Ownership check applied before every user-scoped mutation. Pure; the
/// acting principal must be the owner of the resource it touches.
pub fn ensure_owner(resource_owner: Uuid, acting_user: Uuid) -> Result<(), AppError> {
    if resource_owner != acting_user {
        return Err(AppError::Forbidden);
    }
    Ok(())
}
