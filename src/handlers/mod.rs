//! HTTP request handlers
//!
//! - `api` - Health check endpoint
//! - `calls` - Dispatch, inspect, transfer and hang up calls
//! - `webhooks` - LiveKit webhook receiver

pub mod api;
pub mod calls;
pub mod webhooks;
