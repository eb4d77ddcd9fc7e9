//! HTTP surface of the relay.
//!
//! - `POST /api/assistant`: [`handlers::assistant::send_message`]
//! - `GET /` and everything unmatched: the embedded chat page, see [`handlers::static_assets`]
//!
//! The route is documented with `utoipa`; the document is served at `/api/openapi.json`.

pub mod handlers;
