use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::entity::{material, materialized_user};
use crate::error::AppError;
use crate::models::multipart::UploadForm;
use crate::models::shared::{MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS, missing_fields, validate_text};
use crate::services::upload::{RecordChanges, RecordDraft};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Usd,
    Eur,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
        }
    }
}

impl FromStr for Currency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            _ => Err(AppError::Validation(
                "currency must be EUR or USD".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Book,
    Article,
    Presentation,
    Exercises,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Article => "article",
            Self::Presentation => "presentation",
            Self::Exercises => "exercises",
        }
    }
}

impl FromStr for MaterialKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "book" => Ok(Self::Book),
            "article" => Ok(Self::Article),
            "presentation" => Ok(Self::Presentation),
            "exercises" => Ok(Self::Exercises),
            _ => Err(AppError::Validation(
                "type must be one of: book, article, presentation, exercises".into(),
            )),
        }
    }
}

/// A material as returned to clients.
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaterialResponse {
    pub id: Uuid,
    #[schema(example = "Rust ownership cheatsheet")]
    pub title: String,
    pub description: String,
    #[schema(example = 9.99)]
    pub price: f64,
    #[schema(example = "EUR")]
    pub currency: String,
    /// One of: book, article, presentation, exercises.
    #[serde(rename = "type")]
    #[schema(example = "article")]
    pub kind: String,
    pub author: String,
    /// Signed URL when it could be produced, the stored key otherwise.
    pub file: String,
    /// Only present on detail responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchasers: Option<Vec<String>>,
    /// Only present on detail responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courses: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<material::Model> for MaterialResponse {
    fn from(model: material::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            price: model.price,
            currency: model.currency,
            kind: model.kind,
            author: model.author,
            file: model.file,
            purchasers: None,
            courses: None,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Material detail, including the review when it is cached.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MaterialDetailResponse {
    #[serde(flatten)]
    pub material: MaterialResponse,
    /// Review from the reviews service; `null` until it has been fetched.
    #[schema(value_type = Option<Object>)]
    pub review: Option<Value>,
}

/// A purchaser together with the locally known profile, if any.
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaserResponse {
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_picture: Option<String>,
}

impl PurchaserResponse {
    pub fn new(username: String, profile: Option<&materialized_user::Model>) -> Self {
        match profile {
            Some(p) => Self {
                username,
                email: Some(p.email.clone()),
                first_name: p.first_name.clone(),
                last_name: p.last_name.clone(),
                profile_picture: p.profile_picture.clone(),
            },
            None => Self {
                username,
                email: None,
                first_name: None,
                last_name: None,
                profile_picture: None,
            },
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct PurchaserListResponse {
    pub purchasers: Vec<PurchaserResponse>,
}

/// Metadata of a material about to be created.
#[derive(Debug)]
pub struct MaterialDraft {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub currency: Currency,
    pub kind: MaterialKind,
}

const REQUIRED_FIELDS_HINT: &str = "currency (EUR or USD), type (book, article, presentation or exercises)";

impl MaterialDraft {
    /// Collect the draft from a multipart form; the `file` part must be present too.
    pub fn from_form(form: &UploadForm) -> Result<Self, AppError> {
        let price = form.parsed::<f64>("price")?;
        let mut missing = Vec::new();
        for name in ["title", "description"] {
            if form.text(name).is_none() {
                missing.push(name);
            }
        }
        if price.is_none() {
            missing.push("price");
        }
        for name in ["currency", "type"] {
            if form.text(name).is_none() {
                missing.push(name);
            }
        }
        if form.file.is_none() {
            missing.push("file");
        }

        match (
            form.text("title"),
            form.text("description"),
            price,
            form.text("currency"),
            form.text("type"),
        ) {
            (Some(title), Some(description), Some(price), Some(currency), Some(kind))
                if missing.is_empty() =>
            {
                Ok(Self {
                    title: title.to_string(),
                    description: description.to_string(),
                    price,
                    currency: currency.parse()?,
                    kind: kind.parse()?,
                })
            }
            _ => Err(AppError::Validation(format!(
                "{}; {REQUIRED_FIELDS_HINT}",
                missing_fields(&missing)
            ))),
        }
    }
}

fn validate_price(price: f64) -> Result<(), String> {
    if !price.is_finite() || price < 0.0 {
        return Err("price must be a non-negative number".into());
    }
    Ok(())
}

impl RecordDraft for MaterialDraft {
    fn validate(&self) -> Result<(), String> {
        validate_text("title", &self.title, MAX_TITLE_CHARS)?;
        validate_text("description", &self.description, MAX_DESCRIPTION_CHARS)?;
        validate_price(self.price)
    }
}

/// Partial update of a material.
#[derive(Debug, Default)]
pub struct MaterialChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<Currency>,
    pub kind: Option<MaterialKind>,
}

impl MaterialChanges {
    pub fn from_form(form: &UploadForm) -> Result<Self, AppError> {
        Ok(Self {
            title: form.text("title").map(str::to_string),
            description: form.text("description").map(str::to_string),
            price: form.parsed::<f64>("price")?,
            currency: form.text("currency").map(str::parse).transpose()?,
            kind: form.text("type").map(str::parse).transpose()?,
        })
    }
}

impl RecordChanges for MaterialChanges {
    fn validate(&self) -> Result<(), String> {
        if let Some(title) = &self.title {
            validate_text("title", title, MAX_TITLE_CHARS)?;
        }
        if let Some(description) = &self.description {
            validate_text("description", description, MAX_DESCRIPTION_CHARS)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.currency.is_none()
            && self.kind.is_none()
    }
}
