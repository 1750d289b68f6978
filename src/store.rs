//! Store header: the public storefront settings of an account.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::Result;
use crate::ports::StoreRepository;

/// Store header as saved on database. One per account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub header_button_title: String,
    pub header_button_url: String,
    pub name: String,
    pub tagline: Option<String>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
    pub phone: String,
    pub contact_email: String,
    pub business_type: String,
    pub registration_number: Option<String>,
    pub tax_id: Option<String>,
    pub return_policy: Option<String>,
    pub shipping_policy: Option<String>,
    pub privacy_policy: Option<String>,
    pub cover_image: Option<String>,
    pub photos: Vec<String>,
    pub store_logo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// [`StoreRepository`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStoreRepository {
    pool: Pool<Postgres>,
}

impl PgStoreRepository {
    /// Create a new [`PgStoreRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreRepository for PgStoreRepository {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Header>> {
        let header =
            sqlx::query_as::<_, Header>("SELECT * FROM headers WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(header)
    }

    async fn create(&self, header: &Header) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO headers (
                id, user_id, title, header_button_title, header_button_url,
                name, tagline, address, city, state, country, postal_code,
                phone, contact_email, business_type, registration_number,
                tax_id, return_policy, shipping_policy, privacy_policy,
                cover_image, photos, store_logo, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25
            )"#,
        )
        .bind(header.id)
        .bind(header.user_id)
        .bind(&header.title)
        .bind(&header.header_button_title)
        .bind(&header.header_button_url)
        .bind(&header.name)
        .bind(&header.tagline)
        .bind(&header.address)
        .bind(&header.city)
        .bind(&header.state)
        .bind(&header.country)
        .bind(&header.postal_code)
        .bind(&header.phone)
        .bind(&header.contact_email)
        .bind(&header.business_type)
        .bind(&header.registration_number)
        .bind(&header.tax_id)
        .bind(&header.return_policy)
        .bind(&header.shipping_policy)
        .bind(&header.privacy_policy)
        .bind(&header.cover_image)
        .bind(&header.photos)
        .bind(&header.store_logo)
        .bind(header.created_at)
        .bind(header.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, header: &Header) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE headers SET
                title = $2, header_button_title = $3, header_button_url = $4,
                name = $5, tagline = $6, address = $7, city = $8, state = $9,
                country = $10, postal_code = $11, phone = $12,
                contact_email = $13, business_type = $14,
                registration_number = $15, tax_id = $16, return_policy = $17,
                shipping_policy = $18, privacy_policy = $19,
                cover_image = $20, photos = $21, store_logo = $22,
                updated_at = $23
            WHERE id = $1"#,
        )
        .bind(header.id)
        .bind(&header.title)
        .bind(&header.header_button_title)
        .bind(&header.header_button_url)
        .bind(&header.name)
        .bind(&header.tagline)
        .bind(&header.address)
        .bind(&header.city)
        .bind(&header.state)
        .bind(&header.country)
        .bind(&header.postal_code)
        .bind(&header.phone)
        .bind(&header.contact_email)
        .bind(&header.business_type)
        .bind(&header.registration_number)
        .bind(&header.tax_id)
        .bind(&header.return_policy)
        .bind(&header.shipping_policy)
        .bind(&header.privacy_policy)
        .bind(&header.cover_image)
        .bind(&header.photos)
        .bind(&header.store_logo)
        .bind(header.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound.into());
        }

        Ok(())
    }
}
