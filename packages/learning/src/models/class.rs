use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::entity::class;
use crate::error::AppError;
use crate::models::multipart::UploadForm;
use crate::models::shared::{MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS, missing_fields, validate_text};
use crate::services::upload::{RecordChanges, RecordDraft};

/// A class as returned to clients. `file` is a signed URL when it could be produced.
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassResponse {
    pub id: Uuid,
    #[schema(example = "Variables and types")]
    pub title: String,
    pub description: String,
    #[schema(example = 1)]
    pub order: i32,
    pub file: String,
    pub course_id: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClassResponse {
    pub fn with_file(model: class::Model, file: String) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            order: model.order,
            file,
            course_id: model.course_id,
            creator: model.creator,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<class::Model> for ClassResponse {
    fn from(model: class::Model) -> Self {
        let file = model.file.clone();
        Self::with_file(model, file)
    }
}

/// Metadata of a class about to be created.
#[derive(Debug)]
pub struct ClassDraft {
    pub title: String,
    pub description: String,
    pub order: i32,
    pub course_id: String,
}

impl ClassDraft {
    /// Collect the draft from a multipart form; the `file` part must be present too.
    pub fn from_form(form: &UploadForm, course_id: &str) -> Result<Self, AppError> {
        let order = form.parsed::<i32>("order")?;
        let mut missing = Vec::new();
        if form.text("title").is_none() {
            missing.push("title");
        }
        if form.text("description").is_none() {
            missing.push("description");
        }
        if order.is_none() {
            missing.push("order");
        }
        if form.file.is_none() {
            missing.push("file");
        }

        match (form.text("title"), form.text("description"), order) {
            (Some(title), Some(description), Some(order)) if missing.is_empty() => Ok(Self {
                title: title.to_string(),
                description: description.to_string(),
                order,
                course_id: course_id.to_string(),
            }),
            _ => Err(AppError::Validation(missing_fields(&missing))),
        }
    }
}

fn validate_order(order: i32) -> Result<(), String> {
    if order < 1 {
        return Err("order must be >= 1".into());
    }
    Ok(())
}

impl RecordDraft for ClassDraft {
    fn validate(&self) -> Result<(), String> {
        validate_text("title", &self.title, MAX_TITLE_CHARS)?;
        validate_text("description", &self.description, MAX_DESCRIPTION_CHARS)?;
        validate_order(self.order)
    }
}

/// Partial update of a class.
#[derive(Debug, Default)]
pub struct ClassChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub order: Option<i32>,
}

impl ClassChanges {
    pub fn from_form(form: &UploadForm) -> Result<Self, AppError> {
        Ok(Self {
            title: form.text("title").map(str::to_string),
            description: form.text("description").map(str::to_string),
            order: form.parsed::<i32>("order")?,
        })
    }
}

impl RecordChanges for ClassChanges {
    fn validate(&self) -> Result<(), String> {
        if let Some(title) = &self.title {
            validate_text("title", title, MAX_TITLE_CHARS)?;
        }
        if let Some(description) = &self.description {
            validate_text("description", description, MAX_DESCRIPTION_CHARS)?;
        }
        if let Some(order) = self.order {
            validate_order(order)?;
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.order.is_none()
    }
}
