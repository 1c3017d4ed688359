pub mod labels;
pub mod recipes;
pub mod users;

use super::{error::ApiError, repository::UnitOfWork, schema::User};
use crate::jwt::SessionData;

/// Loads the caller's row. Tokens of deleted or deactivated users are
/// rejected the same way as forged ones.
pub async fn authorize(tx: &mut dyn UnitOfWork, session: &SessionData) -> Result<User, ApiError> {
    match tx.get_user_by_id(session.user_id).await? {
        Some(user) if user.is_active => Ok(user),
        _ => Err(ApiError::AuthenticationFailed("User inactive or deleted.")),
    }
}
