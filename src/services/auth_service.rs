// Login endpoint: exchanges valid credentials for a signed token. Wrong
// login and wrong password are deliberately indistinguishable.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::auth::{PasswordManager, TokenAuth};
use crate::database::models::User;
use crate::database::{DbError, SessionScope};
use crate::dto::UserDto;
use crate::error::ApiError;
use crate::http::router::{Reply, RouteArgs, RouteHandler};
use crate::http::Request;
use crate::scope::Context;

pub struct AuthService {
    dto: Arc<UserDto>,
    passwords: Arc<PasswordManager>,
    auth: Arc<TokenAuth>,
    sessions: Arc<SessionScope>,
}

impl AuthService {
    pub fn new(
        dto: Arc<UserDto>,
        passwords: Arc<PasswordManager>,
        auth: Arc<TokenAuth>,
        sessions: Arc<SessionScope>,
    ) -> Self {
        Self {
            dto,
            passwords,
            auth,
            sessions,
        }
    }
}

#[async_trait]
impl RouteHandler for AuthService {
    async fn call(
        &self,
        _args: &RouteArgs,
        request: &Request,
        ctx: &Context,
    ) -> Result<Reply, ApiError> {
        let attempt = self.dto.parse_login(request.body()).map_err(ApiError::validation)?;

        let session = self.sessions.session(ctx).await?;
        let mut conn = session.conn().await;
        let user: Option<User> =
            sqlx::query_as("SELECT id, login, name, password FROM users WHERE login = ?")
                .bind(&attempt.login)
                .fetch_optional(&mut **conn)
                .await
                .map_err(DbError::from)?;
        drop(conn);

        match user {
            Some(user) if self.passwords.verify(&attempt.password, &user.password) => {
                let token = self.auth.issue(&user)?;
                info!(login = %user.login, "login succeeded");
                Ok(Reply::Json(json!({ "token": token })))
            }
            _ => {
                debug!(login = %attempt.login, "login rejected");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
