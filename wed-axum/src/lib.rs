//! wed-axum: Axum adapter for wedshare.
//!
//! Router assembly, Feathers-style error responses, the admin session gate,
//! the CSRF guard and the multipart upload form extractor.

pub mod app;
pub mod middlewares;
mod error;
pub use error::{json_rejection, WedAxumError};

pub use app::{axum, AxumApp};
