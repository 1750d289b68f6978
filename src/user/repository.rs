//! Handle database requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::ports::UserRepository;
use crate::user::{Profile, TwoFactorEmail, User};
use crate::verification::{PendingCode, PendingCodes, Purpose};

/// Row of the `users` table.
#[derive(sqlx::FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    password: String,
    email_verified: bool,
    email_verify_otp: Option<i32>,
    email_verify_otp_expires_at: Option<DateTime<Utc>>,
    password_reset_otp: Option<i32>,
    password_reset_otp_expires_at: Option<DateTime<Utc>>,
    password_reset_2fa_otp: Option<i32>,
    password_reset_2fa_otp_expires_at: Option<DateTime<Utc>>,
    two_factor_email_otp: Option<i32>,
    two_factor_email_otp_expires_at: Option<DateTime<Utc>>,
    enable_two_factor_email: bool,
    two_factor_email: Option<String>,
    is_two_factor_email_verified: bool,
    force_two_factor_disable: bool,
    created_at: DateTime<Utc>,
}

fn pending(
    code: Option<i32>,
    expires_at: Option<DateTime<Utc>>,
) -> Option<PendingCode> {
    code.zip(expires_at).map(|(code, expires_at)| PendingCode {
        code: code as u32,
        expires_at,
    })
}

fn split(pending: Option<PendingCode>) -> (Option<i32>, Option<DateTime<Utc>>) {
    match pending {
        Some(pending) => (Some(pending.code as i32), Some(pending.expires_at)),
        None => (None, None),
    }
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            email: record.email,
            password: record.password,
            email_verified: record.email_verified,
            codes: PendingCodes {
                email_verify: pending(
                    record.email_verify_otp,
                    record.email_verify_otp_expires_at,
                ),
                password_reset: pending(
                    record.password_reset_otp,
                    record.password_reset_otp_expires_at,
                ),
                password_reset_2fa: pending(
                    record.password_reset_2fa_otp,
                    record.password_reset_2fa_otp_expires_at,
                ),
                two_factor_email: pending(
                    record.two_factor_email_otp,
                    record.two_factor_email_otp_expires_at,
                ),
            },
            two_factor: TwoFactorEmail {
                enabled: record.enable_two_factor_email,
                email: record.two_factor_email,
                verified: record.is_two_factor_email_verified,
                force_disabled: record.force_two_factor_disable,
            },
            created_at: record.created_at,
        }
    }
}

enum Field {
    Id,
    Email,
    TwoFactorEmail,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Field::Id => write!(f, "id"),
            Field::Email => write!(f, "email"),
            Field::TwoFactorEmail => write!(f, "two_factor_email"),
        }
    }
}

fn get_by_field_query(field: Field) -> String {
    format!(
        r#"SELECT
                id, name, email, password, email_verified,
                email_verify_otp, email_verify_otp_expires_at,
                password_reset_otp, password_reset_otp_expires_at,
                password_reset_2fa_otp, password_reset_2fa_otp_expires_at,
                two_factor_email_otp, two_factor_email_otp_expires_at,
                enable_two_factor_email, two_factor_email,
                is_two_factor_email_verified, force_two_factor_disable,
                created_at
            FROM users
            WHERE {field} = $1"#
    )
}

const UPDATE_QUERY: &str = r#"UPDATE users SET
        name = $2,
        password = $3,
        email_verified = $4,
        email_verify_otp = $5,
        email_verify_otp_expires_at = $6,
        password_reset_otp = $7,
        password_reset_otp_expires_at = $8,
        password_reset_2fa_otp = $9,
        password_reset_2fa_otp_expires_at = $10,
        two_factor_email_otp = $11,
        two_factor_email_otp_expires_at = $12,
        enable_two_factor_email = $13,
        two_factor_email = $14,
        is_two_factor_email_verified = $15,
        force_two_factor_disable = $16
    WHERE id = $1"#;

/// Column holding the pending code of `purpose`.
fn code_column(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::EmailVerify => "email_verify_otp",
        Purpose::PasswordReset => "password_reset_otp",
        Purpose::PasswordReset2FA => "password_reset_2fa_otp",
        Purpose::TwoFactorEmailVerify => "two_factor_email_otp",
    }
}

/// [`UserRepository`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool<Postgres>,
}

impl PgUserRepository {
    /// Create a new [`PgUserRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Write every mutable column, when `expected` is set only if the stored
    /// code still matches. Returns the number of updated rows.
    async fn save(
        &self,
        user: &User,
        expected: Option<(Purpose, u32)>,
    ) -> Result<u64> {
        let (email_otp, email_expires) = split(user.codes.email_verify);
        let (reset_otp, reset_expires) = split(user.codes.password_reset);
        let (reset_2fa_otp, reset_2fa_expires) =
            split(user.codes.password_reset_2fa);
        let (two_factor_otp, two_factor_expires) =
            split(user.codes.two_factor_email);

        let sql = match expected {
            Some((purpose, _)) => {
                format!("{UPDATE_QUERY} AND {} = $17", code_column(purpose))
            },
            None => UPDATE_QUERY.to_owned(),
        };

        let mut query = sqlx::query(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.password)
            .bind(user.email_verified)
            .bind(email_otp)
            .bind(email_expires)
            .bind(reset_otp)
            .bind(reset_expires)
            .bind(reset_2fa_otp)
            .bind(reset_2fa_expires)
            .bind(two_factor_otp)
            .bind(two_factor_expires)
            .bind(user.two_factor.enabled)
            .bind(&user.two_factor.email)
            .bind(user.two_factor.verified)
            .bind(user.two_factor.force_disabled);
        if let Some((_, code)) = expected {
            query = query.bind(code as i32);
        }

        Ok(query.execute(&self.pool).await?.rows_affected())
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let record =
            sqlx::query_as::<_, UserRecord>(&get_by_field_query(Field::Id))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let record =
            sqlx::query_as::<_, UserRecord>(&get_by_field_query(Field::Email))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record.map(User::from))
    }

    async fn find_by_two_factor_email(
        &self,
        email: &str,
    ) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&get_by_field_query(
            Field::TwoFactorEmail,
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(User::from))
    }

    async fn create(&self, user: &User) -> Result<()> {
        let (otp, expires_at) = split(user.codes.email_verify);

        sqlx::query(
            r#"INSERT INTO users
                (id, name, email, password, email_verified,
                 email_verify_otp, email_verify_otp_expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(user.email_verified)
        .bind(otp)
        .bind(expires_at)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, user: &User) -> Result<()> {
        if self.save(user, None).await? == 0 {
            return Err(sqlx::Error::RowNotFound.into());
        }

        Ok(())
    }

    async fn redeem(
        &self,
        user: &User,
        purpose: Purpose,
        code: u32,
    ) -> Result<()> {
        if self.save(user, Some((purpose, code))).await? == 0 {
            return Err(ServerError::InvalidCode);
        }

        Ok(())
    }

    async fn profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>> {
        let profiles = sqlx::query_as::<_, Profile>(
            "SELECT id, name FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(profiles)
    }
}
