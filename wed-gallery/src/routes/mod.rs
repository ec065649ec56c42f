//! HTTP surface: public guest routes under `/api`, admin routes under
//! `/api/admin`.

pub mod admin;
pub mod public;

use wed_axum::middlewares::UploadForm;
use wed_imaging::SourceFile;

/// Every file of the form, paired with the `lastModified` values sent
/// alongside them (same order).
pub(crate) fn source_files(form: &UploadForm) -> Vec<SourceFile> {
    let mut stamps = form.texts("lastModified").map(|v| v.trim().parse::<i64>().ok());

    form.files
        .iter()
        .map(|f| {
            let file = SourceFile::new(f.filename.clone(), f.bytes.clone());
            match stamps.next().flatten() {
                Some(millis) => file.with_last_modified(millis),
                None => file,
            }
        })
        .collect()
}

pub(crate) fn category_field(form: &UploadForm) -> String {
    form.text("categoryId").unwrap_or_default().to_string()
}
