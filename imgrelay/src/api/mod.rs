//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for the relay endpoints
//! - **[`models`]**: Request/response payloads
//!
//! # API Structure
//!
//! - **Upload** (`POST /upload`): accept an image and return a relay link
//! - **Images** (`ANY /images/{token}`): stream the hosted image back through the relay
//!
//! Both are documented with `utoipa`; the rendered docs live at `/docs`.

pub mod handlers;
pub mod models;
