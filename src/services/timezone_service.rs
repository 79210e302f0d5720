// Timezone records, always scoped to the authenticated principal. A
// record belonging to someone else is indistinguishable from one that
// does not exist.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::TokenAuth;
use crate::database::models::{Timezone, User};
use crate::database::{DbError, SessionScope};
use crate::dto::{ref_id, TimezoneDto};
use crate::error::ApiError;
use crate::http::router::{CrudOp, Reply, ResourceService, RouteArgs};
use crate::http::Request;
use crate::scope::Context;
use crate::services::current_user;

const SELECT: &str = "SELECT id, user_id, gmt_delta_seconds, city FROM timezones";

pub struct TimezoneService {
    dto: Arc<TimezoneDto>,
    auth: Arc<TokenAuth>,
    sessions: Arc<SessionScope>,
}

impl TimezoneService {
    pub fn new(dto: Arc<TimezoneDto>, auth: Arc<TokenAuth>, sessions: Arc<SessionScope>) -> Self {
        Self { dto, auth, sessions }
    }

    async fn authenticated(&self, ctx: &Context, request: &Request) -> Result<User, ApiError> {
        current_user(&self.auth, &self.sessions, ctx, request)
            .await?
            .ok_or(ApiError::Unauthorized)
    }
}

#[async_trait]
impl ResourceService for TimezoneService {
    fn operations(&self) -> &'static [CrudOp] {
        &CrudOp::ALL
    }

    async fn list(
        &self,
        _args: &RouteArgs,
        request: &Request,
        ctx: &Context,
    ) -> Result<Reply, ApiError> {
        let user = self.authenticated(ctx, request).await?;

        let session = self.sessions.session(ctx).await?;
        let mut conn = session.conn().await;
        let rows: Vec<Timezone> = match request.query("q") {
            Some(q) if !q.is_empty() => {
                sqlx::query_as(&format!(
                    "{SELECT} WHERE user_id = ? AND instr(city, ?) > 0 ORDER BY id"
                ))
                .bind(user.id)
                .bind(q)
                .fetch_all(&mut **conn)
                .await
            }
            _ => {
                sqlx::query_as(&format!("{SELECT} WHERE user_id = ? ORDER BY id"))
                    .bind(user.id)
                    .fetch_all(&mut **conn)
                    .await
            }
        }
        .map_err(DbError::from)?;

        let listed = rows.iter().map(|t| self.dto.to_msg(t)).collect();
        Ok(Reply::Json(Value::Array(listed)))
    }

    async fn get(
        &self,
        args: &RouteArgs,
        request: &Request,
        ctx: &Context,
    ) -> Result<Reply, ApiError> {
        let user = self.authenticated(ctx, request).await?;
        let id = ref_id(args).map_err(ApiError::validation)?;

        let session = self.sessions.session(ctx).await?;
        let mut conn = session.conn().await;
        let timezone: Option<Timezone> =
            sqlx::query_as(&format!("{SELECT} WHERE id = ? AND user_id = ?"))
                .bind(id)
                .bind(user.id)
                .fetch_optional(&mut **conn)
                .await
                .map_err(DbError::from)?;

        match timezone {
            Some(timezone) => Ok(Reply::Json(self.dto.to_msg(&timezone))),
            None => Err(ApiError::NotFound),
        }
    }

    async fn create(
        &self,
        _args: &RouteArgs,
        request: &Request,
        ctx: &Context,
    ) -> Result<Reply, ApiError> {
        let user = self.authenticated(ctx, request).await?;
        let fields = self.dto.parse(request.body()).map_err(ApiError::validation)?;

        let created = self
            .sessions
            .with_transaction(ctx, |session| async move {
                let mut conn = session.conn().await;
                let done = sqlx::query(
                    "INSERT INTO timezones (user_id, gmt_delta_seconds, city) VALUES (?, ?, ?)",
                )
                .bind(user.id)
                .bind(fields.gmt_delta_seconds)
                .bind(&fields.city)
                .execute(&mut **conn)
                .await
                .map_err(DbError::from)?;

                Ok(Timezone {
                    id: done.last_insert_rowid(),
                    user_id: user.id,
                    gmt_delta_seconds: fields.gmt_delta_seconds,
                    city: fields.city,
                })
            })
            .await?;

        Ok(Reply::Json(self.dto.to_msg(&created)))
    }

    async fn update(
        &self,
        args: &RouteArgs,
        request: &Request,
        ctx: &Context,
    ) -> Result<Reply, ApiError> {
        let user = self.authenticated(ctx, request).await?;
        let id = ref_id(args).map_err(ApiError::validation)?;

        let updated = self
            .sessions
            .with_transaction(ctx, |session| async move {
                let mut conn = session.conn().await;
                let existing: Option<Timezone> =
                    sqlx::query_as(&format!("{SELECT} WHERE id = ? AND user_id = ?"))
                        .bind(id)
                        .bind(user.id)
                        .fetch_optional(&mut **conn)
                        .await
                        .map_err(DbError::from)?;
                let Some(mut timezone) = existing else {
                    return Err(ApiError::NotFound);
                };

                let fields = self.dto.parse(request.body()).map_err(ApiError::validation)?;
                sqlx::query("UPDATE timezones SET gmt_delta_seconds = ?, city = ? WHERE id = ?")
                    .bind(fields.gmt_delta_seconds)
                    .bind(&fields.city)
                    .bind(timezone.id)
                    .execute(&mut **conn)
                    .await
                    .map_err(DbError::from)?;

                timezone.gmt_delta_seconds = fields.gmt_delta_seconds;
                timezone.city = fields.city;
                Ok(timezone)
            })
            .await?;

        Ok(Reply::Json(self.dto.to_msg(&updated)))
    }

    async fn delete(
        &self,
        args: &RouteArgs,
        request: &Request,
        ctx: &Context,
    ) -> Result<Reply, ApiError> {
        let user = self.authenticated(ctx, request).await?;
        let id = ref_id(args).map_err(ApiError::validation)?;

        let deleted = self
            .sessions
            .with_transaction(ctx, |session| async move {
                let mut conn = session.conn().await;
                let done = sqlx::query("DELETE FROM timezones WHERE id = ? AND user_id = ?")
                    .bind(id)
                    .bind(user.id)
                    .execute(&mut **conn)
                    .await
                    .map_err(DbError::from)?;
                Ok(done.rows_affected())
            })
            .await?;

        if deleted == 0 {
            return Err(ApiError::NotFound);
        }
        Ok(Reply::Empty)
    }
}
