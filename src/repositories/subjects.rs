use sqlx::PgPool;
use uuid::Uuid;

pub(crate) async fn exists(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM subjects WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await
}
