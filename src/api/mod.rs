//! API layer
//!
//! HTTP handlers for:
//! - Issue form pages and their JSON state
//! - GitHub OAuth token endpoints
//! - Metrics (Prometheus)

mod forms;
pub mod metrics;
mod oauth_proxy;
mod views;

pub use forms::{forms_router, invalid_url, status_for};
pub use metrics::{metrics_router, track_requests};
pub use oauth_proxy::oauth_proxy_router;
