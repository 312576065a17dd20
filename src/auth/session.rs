//! Session management
//!
//! Sessions carry the user's GitHub access token, so the cookie value is
//! sealed with AES-256-GCM rather than only signed. No server-side
//! session storage is needed.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::AppError;
use crate::github::GitHubUser;

const AES_GCM_NONCE_BYTES: usize = 12;
const KEY_CONTEXT: &[u8] = b"projectforms-session-v1";

type HmacSha256 = Hmac<Sha256>;

/// User session data
///
/// Stored in an encrypted cookie. Contains the GitHub profile and the
/// token used for every GitHub call made on the user's behalf.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    /// GitHub login
    pub github_login: String,
    /// GitHub user ID
    pub github_id: u64,
    pub avatar_url: String,
    pub name: Option<String>,
    pub access_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("github_login", &self.github_login)
            .field("github_id", &self.github_id)
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Session {
    pub fn new(user: GitHubUser, access_token: String, max_age_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            github_login: user.login,
            github_id: user.id,
            avatar_url: user.avatar_url,
            name: user.name,
            access_token,
            created_at: now,
            expires_at: now + Duration::seconds(max_age_seconds),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Name to greet the user with
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.github_login)
    }
}

/// 32-byte cipher key for a configured secret
fn derive_key(secret: &str) -> Result<[u8; 32], AppError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(KEY_CONTEXT);

    let mut key = [0_u8; 32];
    key.copy_from_slice(&mac.finalize().into_bytes());
    Ok(key)
}

/// Create an encrypted session token
///
/// Token format: base64url(nonce || aes_256_gcm(json(session)))
pub fn create_session_token(session: &Session, secret: &str) -> Result<String, AppError> {
    let payload = serde_json::to_vec(session).map_err(|e| AppError::Internal(e.into()))?;

    let cipher = Aes256Gcm::new_from_slice(&derive_key(secret)?)
        .map_err(|e| AppError::Encryption(e.to_string()))?;

    let mut nonce = [0_u8; AES_GCM_NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), payload.as_slice())
        .map_err(|_| AppError::Encryption("session encryption failed".to_string()))?;

    let mut token = Vec::with_capacity(AES_GCM_NONCE_BYTES + ciphertext.len());
    token.extend_from_slice(&nonce);
    token.extend_from_slice(&ciphertext);

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(token))
}

/// Decrypt and validate a session token
///
/// # Errors
/// `Unauthorized` for malformed, tampered or expired tokens
pub fn verify_session_token(token: &str, secret: &str) -> Result<Session, AppError> {
    let data = general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| AppError::Unauthorized)?;
    if data.len() <= AES_GCM_NONCE_BYTES {
        return Err(AppError::Unauthorized);
    }

    let cipher = Aes256Gcm::new_from_slice(&derive_key(secret)?)
        .map_err(|e| AppError::Encryption(e.to_string()))?;

    let (nonce, ciphertext) = data.split_at(AES_GCM_NONCE_BYTES);
    let payload = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| AppError::Unauthorized)?;

    let session: Session = serde_json::from_slice(&payload).map_err(|_| AppError::Unauthorized)?;

    if session.is_expired() {
        return Err(AppError::Unauthorized);
    }

    Ok(session)
}
