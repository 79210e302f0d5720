// Self-service account management. The path id on /users/{id} routes is
// deliberately ignored: every operation acts on the authenticated
// principal, and registration is the one anonymous mutation in the system.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::auth::TokenAuth;
use crate::database::models::User;
use crate::database::{DbError, SessionScope};
use crate::dto::UserDto;
use crate::error::ApiError;
use crate::http::router::{CrudOp, Reply, ResourceService, RouteArgs};
use crate::http::Request;
use crate::scope::Context;
use crate::services::current_user;

pub struct UserService {
    dto: Arc<UserDto>,
    auth: Arc<TokenAuth>,
    sessions: Arc<SessionScope>,
}

impl UserService {
    pub fn new(dto: Arc<UserDto>, auth: Arc<TokenAuth>, sessions: Arc<SessionScope>) -> Self {
        Self { dto, auth, sessions }
    }

    async fn authenticated(&self, ctx: &Context, request: &Request) -> Result<User, ApiError> {
        current_user(&self.auth, &self.sessions, ctx, request)
            .await?
            .ok_or(ApiError::Unauthorized)
    }
}

#[async_trait]
impl ResourceService for UserService {
    fn operations(&self) -> &'static [CrudOp] {
        &[CrudOp::Get, CrudOp::Create, CrudOp::Update, CrudOp::Delete]
    }

    async fn get(
        &self,
        _args: &RouteArgs,
        request: &Request,
        ctx: &Context,
    ) -> Result<Reply, ApiError> {
        let user = self.authenticated(ctx, request).await?;
        Ok(Reply::Json(self.dto.to_msg(&user)))
    }

    async fn create(
        &self,
        _args: &RouteArgs,
        request: &Request,
        ctx: &Context,
    ) -> Result<Reply, ApiError> {
        let new_user = self.dto.parse(request.body()).map_err(ApiError::validation)?;

        let created = self
            .sessions
            .with_transaction(ctx, |session| async move {
                let mut conn = session.conn().await;
                let result =
                    sqlx::query("INSERT INTO users (login, name, password) VALUES (?, ?, ?)")
                        .bind(&new_user.login)
                        .bind(&new_user.name)
                        .bind(&new_user.password)
                        .execute(&mut **conn)
                        .await
                        .map_err(DbError::from);

                match result {
                    Ok(done) => Ok(User {
                        id: done.last_insert_rowid(),
                        login: new_user.login,
                        name: new_user.name,
                        password: new_user.password,
                    }),
                    Err(e) if e.is_unique_violation() => {
                        Err(ApiError::violation("login", "is already taken"))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        info!(login = %created.login, "user registered");
        Ok(Reply::Json(self.dto.to_msg(&created)))
    }

    async fn update(
        &self,
        _args: &RouteArgs,
        request: &Request,
        ctx: &Context,
    ) -> Result<Reply, ApiError> {
        let user = self.authenticated(ctx, request).await?;
        let fields = self.dto.parse(request.body()).map_err(ApiError::validation)?;

        let updated = self
            .sessions
            .with_transaction(ctx, |session| async move {
                let mut conn = session.conn().await;
                let result =
                    sqlx::query("UPDATE users SET login = ?, name = ?, password = ? WHERE id = ?")
                        .bind(&fields.login)
                        .bind(&fields.name)
                        .bind(&fields.password)
                        .bind(user.id)
                        .execute(&mut **conn)
                        .await
                        .map_err(DbError::from);

                match result {
                    Ok(_) => Ok(User {
                        id: user.id,
                        login: fields.login,
                        name: fields.name,
                        password: fields.password,
                    }),
                    Err(e) if e.is_unique_violation() => {
                        Err(ApiError::violation("login", "is already taken"))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        Ok(Reply::Json(self.dto.to_msg(&updated)))
    }

    async fn delete(
        &self,
        _args: &RouteArgs,
        request: &Request,
        ctx: &Context,
    ) -> Result<Reply, ApiError> {
        let user = self.authenticated(ctx, request).await?;

        self.sessions
            .with_transaction(ctx, |session| async move {
                let mut conn = session.conn().await;
                sqlx::query("DELETE FROM users WHERE id = ?")
                    .bind(user.id)
                    .execute(&mut **conn)
                    .await
                    .map_err(DbError::from)?;
                info!(login = %user.login, "user deleted");
                Ok(())
            })
            .await?;

        Ok(Reply::Empty)
    }
}
