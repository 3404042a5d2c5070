//! HTTP request handlers.
//!
//! - [`upload`]: image intake and hand-off to the configured image host
//! - [`images`]: token decoding and the transparent image proxy
//!
//! Handlers return [`crate::errors::Error`], which converts to a JSON error response.

pub mod images;
pub mod upload;
