//! Identity resolution
//!
//! Turns the `token` cookie or a bearer header into an
//! [`Identity`](upscale_common::Identity). Verification is purely
//! cryptographic; the identity provider is never contacted per request.

pub mod extract;
pub mod token;

pub use extract::{clear_session_cookie, session_cookie, OptionalIdentity, RequiredIdentity};
pub use token::{Claims, TokenError, TokenSigner};
