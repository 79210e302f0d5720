use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    /// Salted digest, never the cleartext.
    pub password: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Timezone {
    pub id: i64,
    pub user_id: i64,
    pub gmt_delta_seconds: i64,
    pub city: String,
}
