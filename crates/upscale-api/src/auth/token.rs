//! HS256 identity tokens
//!
//! Tokens are issued after a successful login with the external identity
//! provider and trusted afterwards on signature and expiry alone.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use upscale_common::UserProfile;

type HmacSha256 = Hmac<Sha256>;

/// Lifetime of an issued token
pub const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("unsupported token algorithm")]
    UnsupportedAlgorithm,

    #[error("invalid token signature")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("invalid signing key")]
    InvalidKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    pub provider: String,
    pub iat: i64,
    pub exp: i64,
}

impl From<Claims> for UserProfile {
    fn from(claims: Claims) -> Self {
        UserProfile {
            id: claims.id,
            email: claims.email,
            name: claims.name,
            photo: claims.photo,
            provider: claims.provider,
        }
    }
}

/// Issues and verifies identity tokens with one shared secret
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl: Duration::days(TOKEN_TTL_DAYS),
        }
    }

    /// Sign a token for a freshly logged-in user. The login callback hands
    /// the result to [`session_cookie`](super::session_cookie).
    pub fn issue(&self, profile: &UserProfile) -> Result<String, TokenError> {
        self.issue_at(profile, Utc::now())
    }

    pub fn issue_at(&self, profile: &UserProfile, now: DateTime<Utc>) -> Result<String, TokenError> {
        let header = Header {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            id: profile.id.clone(),
            email: profile.email.clone(),
            name: profile.name.clone(),
            photo: profile.photo.clone(),
            provider: profile.provider.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        let header = serde_json::to_vec(&header).map_err(|_| TokenError::Malformed)?;
        let claims = serde_json::to_vec(&claims).map_err(|_| TokenError::Malformed)?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        );
        let signature = self.mac(signing_input.as_bytes())?.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    pub fn verify(&self, token: &str) -> Result<UserProfile, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<UserProfile, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header: Header = decode_segment(header_b64)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;

        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        self.mac(signing_input.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = decode_segment(claims_b64)?;
        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims.into())
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::InvalidKey)?;
        mac.update(data);
        Ok(mac)
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}
