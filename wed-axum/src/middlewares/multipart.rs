//! Multipart upload forms.
//!
//! Files are buffered in memory and handed over untouched: size and format
//! checks belong to the upload pipeline so that one bad file fails alone.
//! Only the whole request is capped, by [`FormLimit`].

use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;
use multer::{Constraints, Multipart, SizeLimit};
use wed_core::WedError;

use crate::WedAxumError;

/// Default cap on a whole multipart request.
pub const DEFAULT_FORM_LIMIT: u64 = 200 * 1024 * 1024;

/// Overrides [`DEFAULT_FORM_LIMIT`] when present in the request extensions
/// (e.g. through `axum::Extension(FormLimit(..))`).
#[derive(Clone, Copy, Debug)]
pub struct FormLimit(pub u64);

#[derive(Debug, Clone)]
pub struct FormFile {
    /// Form field name
    pub field: String,
    /// Client-side file name
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub files: Vec<FormFile>,
    pub fields: Vec<(String, String)>,
}

impl UploadForm {
    /// First text value of `name`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Every text value of `name`, in submission order.
    pub fn texts<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn files_named<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FormFile> + 'a {
        self.files.iter().filter(move |f| f.field == field)
    }
}

impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = WedAxumError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !content_type.starts_with("multipart/form-data") {
            return Err(WedError::unsupported_media_type("Expected a multipart/form-data upload.").into());
        }

        let boundary = multer::parse_boundary(content_type)
            .map_err(|e| WedError::bad_request(format!("Failed to parse multipart data: {e}")))?;
        let limit = req
            .extensions()
            .get::<FormLimit>()
            .map(|l| l.0)
            .unwrap_or(DEFAULT_FORM_LIMIT);

        let stream = req.into_body().into_data_stream();
        let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(limit));
        let mut multipart = Multipart::with_constraints(stream, boundary, constraints);

        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or("unknown").to_string();

            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field.content_type().map(|ct| ct.to_string());
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    tracing::debug!(field = %name, file = %filename, size = bytes.len(), "form file received");
                    form.files.push(FormFile {
                        field: name,
                        filename,
                        content_type,
                        bytes,
                    });
                }
                None => {
                    let value = field.text().await.map_err(multipart_error)?;
                    form.fields.push((name, value));
                }
            }
        }

        Ok(form)
    }
}

fn multipart_error(err: multer::Error) -> WedAxumError {
    match err {
        multer::Error::StreamSizeExceeded { limit } => {
            WedError::payload_too_large(format!("Upload exceeds the {} MB request limit.", limit / (1024 * 1024)))
                .into()
        }
        other => WedError::bad_request(format!("Failed to parse multipart data: {other}")).into(),
    }
}
