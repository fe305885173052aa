use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, Executor, PgPool};

/// Campus tables the purge walks, with real foreign keys. `login_history`
/// is left out on purpose: production schemas drift, and the purge has to
/// cope with a listed table that is not there.
const CAMPUS_SCHEMA: &str = r#"
CREATE TABLE users (id BIGINT PRIMARY KEY);
CREATE TABLE students (id BIGINT PRIMARY KEY, user_id BIGINT NOT NULL REFERENCES users (id));
CREATE TABLE enrollments (
    id BIGINT PRIMARY KEY,
    user_id BIGINT REFERENCES users (id),
    student_id BIGINT REFERENCES students (id)
);
CREATE TABLE enrollment_courses (id BIGINT PRIMARY KEY, enrollment_id BIGINT NOT NULL REFERENCES enrollments (id));
CREATE TABLE enrollment_fees (id BIGINT PRIMARY KEY, enrollment_id BIGINT NOT NULL REFERENCES enrollments (id));
CREATE TABLE certificates (id BIGINT PRIMARY KEY, enrollment_id BIGINT NOT NULL REFERENCES enrollments (id));
CREATE TABLE payments (id BIGINT PRIMARY KEY, student_id BIGINT NOT NULL REFERENCES students (id));
CREATE TABLE attendance_records (id BIGINT PRIMARY KEY, student_id BIGINT NOT NULL REFERENCES students (id));
CREATE TABLE grades (id BIGINT PRIMARY KEY, student_id BIGINT NOT NULL REFERENCES students (id));
CREATE TABLE student_documents (id BIGINT PRIMARY KEY, student_id BIGINT NOT NULL REFERENCES students (id));
CREATE TABLE guardians (id BIGINT PRIMARY KEY, student_id BIGINT NOT NULL REFERENCES students (id));
CREATE TABLE sessions (id BIGINT PRIMARY KEY, user_id BIGINT NOT NULL REFERENCES users (id));
CREATE TABLE password_resets (id BIGINT PRIMARY KEY, user_id BIGINT NOT NULL REFERENCES users (id));
CREATE TABLE notifications (id BIGINT PRIMARY KEY, user_id BIGINT NOT NULL REFERENCES users (id));
CREATE TABLE user_roles (id BIGINT PRIMARY KEY, user_id BIGINT NOT NULL REFERENCES users (id));
CREATE TABLE audit_logs (id BIGINT PRIMARY KEY, user_id BIGINT NOT NULL REFERENCES users (id));
"#;

/// A throwaway schema on the `DATABASE_URL` server. Every connection in
/// `pool` has its search_path pointed at it.
pub struct ScratchDb {
    pub pool: PgPool,
    admin: PgPool,
    schema: String,
}

/// `None` when `DATABASE_URL` is unset, so the suite passes without Postgres
pub async fn scratch_db() -> Result<Option<ScratchDb>> {
    let _ = dotenvy::dotenv();
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping Postgres test");
            return Ok(None);
        }
    };

    let schema = format!("purge_test_{}", uuid::Uuid::new_v4().simple());

    let admin = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .context("failed to connect to DATABASE_URL")?;
    admin.execute(format!("CREATE SCHEMA {}", schema).as_str()).await?;

    let search_path = format!("SET search_path TO {}", schema);
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .after_connect(move |conn, _meta| {
            let sql = search_path.clone();
            Box::pin(async move {
                conn.execute(sql.as_str()).await?;
                Ok(())
            })
        })
        .connect(&url)
        .await?;

    pool.execute(CAMPUS_SCHEMA).await.context("failed to create campus tables")?;

    Ok(Some(ScratchDb { pool, admin, schema }))
}

impl ScratchDb {
    pub async fn exec(&self, sql: &str) -> Result<()> {
        self.pool.execute(sql).await?;
        Ok(())
    }

    pub async fn count(&self, table: &str, column: &str, value: i64) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {} = $1", table, column);
        let count: i64 = sqlx::query_scalar(&sql).bind(value).fetch_one(&self.pool).await?;
        Ok(count)
    }

    pub async fn ids(&self, table: &str) -> Result<Vec<i64>> {
        let sql = format!("SELECT id FROM {} ORDER BY id", table);
        let ids: Vec<i64> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(ids)
    }

    pub async fn cleanup(self) -> Result<()> {
        self.pool.close().await;
        self.admin
            .execute(format!("DROP SCHEMA {} CASCADE", self.schema).as_str())
            .await?;
        Ok(())
    }
}
