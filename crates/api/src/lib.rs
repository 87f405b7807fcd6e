//! HTTP boundary of the addressing engine.
//!
//! Endpoints:
//! - GET  /health
//! - POST /api/addressing/resolve: preview resolution without queueing
//! - POST /api/notifications: resolve and queue on the selected transports

pub mod routes;
pub mod state;
