//! GitHub sign-in for form pages
//!
//! Handles:
//! - GitHub OAuth web flow for browsers
//! - Encrypted session cookies
//! - Authentication extractors and middleware

mod middleware;
mod oauth;
pub mod session;

pub use middleware::{CurrentUser, MaybeUser, require_auth};
pub use oauth::{LoginCallback, auth_router, complete_login};
pub(crate) use oauth::MISSING_CREDENTIALS;
pub use session::{Session, create_session_token, verify_session_token};

pub const SESSION_COOKIE: &str = "session";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
