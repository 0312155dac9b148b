use std::collections::HashMap;
use std::path::PathBuf;

use axum::extract::Multipart;
use axum::extract::multipart::Field;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::quota::MB;
use crate::services::upload::IncomingFile;

const FILE_FIELD: &str = "file";

/// Upload spooled to a temporary file. The file is removed on drop.
pub struct SpooledFile {
    path: PathBuf,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
}

impl SpooledFile {
    /// Reopen the spooled bytes for streaming.
    pub async fn into_incoming(self) -> Result<IncomingFile, AppError> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to reopen temp file: {e}")))?;
        Ok(IncomingFile {
            original_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            size: self.size,
            reader: Box::new(file),
        })
    }
}

impl Drop for SpooledFile {
    fn drop(&mut self) {
        // Best effort; an open reader keeps the data readable on unix.
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Text fields plus the optional `file` part of a multipart form.
#[derive(Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub file: Option<SpooledFile>,
}

impl UploadForm {
    /// Trimmed, non-empty value of a text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Parse a field if present, failing with a validation error when it is malformed.
    pub fn parsed<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>, AppError> {
        self.text(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| AppError::Validation(format!("{name} must be a number")))
            })
            .transpose()
    }
}

/// Read every part of `multipart`, spooling the `file` part to disk.
///
/// Files larger than `max_file_size` are rejected while streaming.
pub async fn read_upload_form(
    multipart: &mut Multipart,
    max_file_size: u64,
) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == FILE_FIELD {
            form.file = Some(spool_field(field, max_file_size).await?);
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read {name}: {e}")))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

async fn spool_field(mut field: Field<'_>, max_size: u64) -> Result<SpooledFile, AppError> {
    let file_name = field.file_name().unwrap_or("file").to_string();
    let content_type = field
        .content_type()
        .map(str::to_string)
        .unwrap_or_else(|| {
            mime_guess::from_path(&file_name)
                .first_or_octet_stream()
                .to_string()
        });

    let mut spooled = SpooledFile {
        path: std::env::temp_dir().join(format!("learning-upload-{}", Uuid::new_v4())),
        file_name,
        content_type,
        size: 0,
    };

    let mut temp_file = tokio::fs::File::create(&spooled.path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create temp file: {e}")))?;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("Upload read error: {e}")))?
    {
        spooled.size += chunk.len() as u64;
        if spooled.size > max_size {
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds the maximum upload size ({} MB)",
                max_size / MB
            )));
        }
        temp_file
            .write_all(&chunk)
            .await
            .map_err(|e| AppError::Internal(format!("Temp file write failed: {e}")))?;
    }

    temp_file
        .flush()
        .await
        .map_err(|e| AppError::Internal(format!("Temp file flush failed: {e}")))?;

    Ok(spooled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_ignores_blank_values() {
        let mut form = UploadForm::default();
        form.fields.insert("title".into(), "  Intro ".into());
        form.fields.insert("description".into(), "   ".into());
        assert_eq!(form.text("title"), Some("Intro"));
        assert_eq!(form.text("description"), None);
        assert_eq!(form.text("order"), None);
    }

    #[test]
    fn parsed_reports_malformed_numbers() {
        let mut form = UploadForm::default();
        form.fields.insert("order".into(), "3".into());
        form.fields.insert("price".into(), "cheap".into());
        assert_eq!(form.parsed::<i32>("order").unwrap(), Some(3));
        assert!(form.parsed::<f64>("price").is_err());
        assert_eq!(form.parsed::<i32>("missing").unwrap(), None);
    }
}
