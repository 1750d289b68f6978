//! Store header of the authenticated account.

use std::sync::LazyLock;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Extension, Json, Router, middleware};
use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::{Envelope, Form, Valid, ensure_verified, image};
use crate::store::Header;
use crate::user::User;

const DEFAULT_TITLE: &str = "Mihu";
const LOGO_FIELD: &str = "storeLogo";
const UNVERIFIED: &str = "Please verify your account to manage your store.";
const NO_HEADER: ServerError =
    ServerError::NotFound("No store header found, please create one first.");

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{10,15}$").expect("phone pattern must compile")
});

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/store-info", post(upsert).get(get_header))
        .route("/store-logo", post(store_logo))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth,
        ))
}

fn default_title() -> String {
    DEFAULT_TITLE.into()
}

fn validate_phone(phone: &str) -> std::result::Result<(), ValidationError> {
    if PHONE.is_match(phone) {
        Ok(())
    } else {
        Err(ValidationError::new("phone"))
    }
}

fn validate_photos(
    photos: &[String],
) -> std::result::Result<(), ValidationError> {
    if photos
        .iter()
        .all(|photo| url::Url::parse(photo).is_ok())
    {
        Ok(())
    } else {
        Err(ValidationError::new("photos"))
    }
}

#[derive(Debug, Validate, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreBody {
    #[serde(default = "default_title")]
    #[validate(length(min = 1, max = 100, message = "Title must be 1 to 100 characters long."))]
    pub title: String,
    #[validate(length(min = 1, max = 50, message = "Button title must be 1 to 50 characters long."))]
    pub header_button_title: String,
    #[validate(url(message = "Button URL must be a valid URL."))]
    pub header_button_url: String,
    #[validate(length(min = 1, max = 100, message = "Store name must be 1 to 100 characters long."))]
    pub name: String,
    #[validate(length(max = 200, message = "Tagline must be at most 200 characters long."))]
    pub tagline: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Address is required."))]
    pub address: String,
    #[validate(length(min = 1, max = 100, message = "City is required."))]
    pub city: String,
    #[validate(length(min = 1, max = 100, message = "State is required."))]
    pub state: String,
    #[validate(length(min = 1, max = 100, message = "Country is required."))]
    pub country: String,
    #[validate(length(min = 3, max = 12, message = "Postal code must be 3 to 12 characters long."))]
    pub postal_code: String,
    #[validate(custom(
        function = "validate_phone",
        message = "Phone number must contain 10 to 15 digits."
    ))]
    pub phone: String,
    #[validate(email(message = "Contact email must be formated."))]
    pub contact_email: String,
    #[validate(length(min = 1, max = 100, message = "Business type is required."))]
    pub business_type: String,
    #[validate(length(max = 50))]
    pub registration_number: Option<String>,
    #[validate(length(max = 50))]
    pub tax_id: Option<String>,
    #[validate(length(max = 5000))]
    pub return_policy: Option<String>,
    #[validate(length(max = 5000))]
    pub shipping_policy: Option<String>,
    #[validate(length(max = 5000))]
    pub privacy_policy: Option<String>,
    #[validate(url(message = "Cover image must be a valid URL."))]
    pub cover_image: Option<String>,
    #[serde(default)]
    #[validate(custom(
        function = "validate_photos",
        message = "Every photo must be a valid URL."
    ))]
    pub photos: Vec<String>,
}

impl StoreBody {
    /// Build the saved header. Identity, creation date and logo are kept
    /// from `previous`.
    fn into_header(
        self,
        user_id: Uuid,
        previous: Option<&Header>,
        now: DateTime<Utc>,
    ) -> Header {
        Header {
            id: previous.map_or_else(Uuid::new_v4, |header| header.id),
            user_id,
            title: self.title,
            header_button_title: self.header_button_title,
            header_button_url: self.header_button_url,
            name: self.name,
            tagline: self.tagline,
            address: self.address,
            city: self.city,
            state: self.state,
            country: self.country,
            postal_code: self.postal_code,
            phone: self.phone,
            contact_email: self.contact_email,
            business_type: self.business_type,
            registration_number: self.registration_number,
            tax_id: self.tax_id,
            return_policy: self.return_policy,
            shipping_policy: self.shipping_policy,
            privacy_policy: self.privacy_policy,
            cover_image: self.cover_image,
            photos: self.photos,
            store_logo: previous.and_then(|header| header.store_logo.clone()),
            created_at: previous.map_or(now, |header| header.created_at),
            updated_at: previous.map(|_| now),
        }
    }
}

/// Create or replace the store header.
async fn upsert(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(body): Valid<StoreBody>,
) -> Result<(StatusCode, Json<Envelope<Header>>)> {
    ensure_verified(&user, UNVERIFIED)?;

    let now = state.clock.now();
    let previous = state.stores.find_by_user(user.id).await?;
    let header = body.into_header(user.id, previous.as_ref(), now);

    if previous.is_some() {
        state.stores.update(&header).await?;
        Ok((
            StatusCode::OK,
            Envelope::with("Store header updated.", header),
        ))
    } else {
        state.stores.create(&header).await?;
        Ok((
            StatusCode::CREATED,
            Envelope::with("Store header created.", header),
        ))
    }
}

async fn get_header(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Envelope<Header>>> {
    ensure_verified(&user, UNVERIFIED)?;

    let header = state
        .stores
        .find_by_user(user.id)
        .await?
        .ok_or(NO_HEADER)?;

    Ok(Envelope::with("Store header fetched.", header))
}

/// Upload the store logo and record it on the existing header.
async fn store_logo(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    multipart: Multipart,
) -> Result<Json<Envelope<Header>>> {
    ensure_verified(&user, UNVERIFIED)?;

    let mut header = state
        .stores
        .find_by_user(user.id)
        .await?
        .ok_or(NO_HEADER)?;

    let form = Form::read(multipart, LOGO_FIELD).await?;
    let logo = image(form.file, LOGO_FIELD)?;

    header.store_logo = Some(state.media.upload(logo).await?);
    header.updated_at = Some(state.clock.now());
    state.stores.update(&header).await?;

    Ok(Envelope::with("Store logo updated.", header))
}
