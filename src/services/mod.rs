pub mod auth_service;
pub mod timezone_service;
pub mod user_service;

pub use auth_service::AuthService;
pub use timezone_service::TimezoneService;
pub use user_service::UserService;

use crate::auth::TokenAuth;
use crate::database::models::User;
use crate::database::{DbError, SessionScope};
use crate::error::ApiError;
use crate::http::Request;
use crate::scope::Context;

/// Resolve the authenticated user behind a request: decode the principal
/// id from the credential, then load the row through the request's
/// session. `None` means the request is anonymous or the principal no
/// longer exists; callers turn that into a 401.
pub async fn current_user(
    auth: &TokenAuth,
    sessions: &SessionScope,
    ctx: &Context,
    request: &Request,
) -> Result<Option<User>, ApiError> {
    let Some(user_id) = auth.principal(request) else {
        return Ok(None);
    };

    let session = sessions.session(ctx).await?;
    let mut conn = session.conn().await;
    let user = sqlx::query_as::<_, User>(
        "SELECT id, login, name, password FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(&mut **conn)
    .await
    .map_err(DbError::from)?;

    Ok(user)
}
