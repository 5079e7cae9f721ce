use std::io;
use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// HS256 key length in bytes.
const SECRET_LEN: usize = 32;

/// Claims carried by a gateway access token.
/// Issuance lives with the identity service; the gateway only verifies.
/// `issue_access_token` is kept for tests and ops tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Account email, informational only
    #[serde(default)]
    pub email: Option<String>,
    /// Role granted at issuance
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Load the verification key from `data_dir/jwt_secret`, generating a fresh
/// 256-bit random key when the file is missing or the wrong size. The key is
/// raw bytes, never human-readable.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, io::Error> {
    let path = Path::new(data_dir).join("jwt_secret");

    match std::fs::read(&path) {
        Ok(bytes) if bytes.len() == SECRET_LEN => {
            tracing::info!("Loaded JWT verification key from {}", path.display());
            return Ok(bytes);
        }
        Ok(bytes) => {
            tracing::warn!(
                "JWT key at {} holds {} bytes, expected {}; regenerating",
                path.display(),
                bytes.len(),
                SECRET_LEN
            );
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    let fresh: [u8; SECRET_LEN] = rand::rng().random();
    std::fs::write(&path, fresh)?;
    tracing::info!("Generated JWT verification key at {}", path.display());
    Ok(fresh.to_vec())
}

/// Issue an access token with the given lifetime.
pub fn issue_access_token(
    secret: &[u8],
    user_id: &str,
    role: Role,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let issued = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        email: None,
        role,
        iat: issued,
        exp: issued + ttl_secs,
    };
    // Header::default() is HS256
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

/// Validate an access token and return its claims.
pub fn validate_access_token(
    secret: &[u8],
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|decoded| decoded.claims)
}
