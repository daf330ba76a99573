//! Signed bearer tokens.
//!
//! Tokens are HS256 JWTs naming the user and the role they held when the token was issued.

use assist_db::status::Role;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    /// Username.
    pub sub: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("JWT secret must be at least 32 bytes")]
    SecretTooShort,
    #[error("system time error: {0}")]
    Clock(#[from] std::time::SystemTimeError),
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("failed to sign token: {0}")]
    Sign(jsonwebtoken::errors::Error),
}

pub struct Tokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry: Duration,
}

impl std::fmt::Debug for Tokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokens")
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl Tokens {
    pub fn new(secret: &str, expiry: Duration) -> Result<Self, Error> {
        if secret.len() < 32 {
            return Err(Error::SecretTooShort);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry,
        })
    }

    pub fn issue(&self, username: &str, role: Role) -> Result<String, Error> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let claims = Claims {
            sub: username.to_owned(),
            role,
            iat: now,
            exp: now + self.expiry.as_secs(),
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(Error::Sign)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, Error> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => Error::Expired,
                _ => Error::Invalid,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn issued_token_verifies() {
        let tokens = Tokens::new(SECRET, Duration::from_secs(3600)).unwrap();
        let token = tokens.issue("verifier1", Role::Verifier).unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "verifier1");
        assert_eq!(claims.role, Role::Verifier);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn token_signed_with_another_secret_is_invalid() {
        let tokens = Tokens::new(SECRET, Duration::from_secs(3600)).unwrap();
        let other = Tokens::new("fedcba9876543210fedcba9876543210", Duration::from_secs(3600))
            .unwrap();
        let token = other.issue("admin", Role::Admin).unwrap();
        assert!(matches!(tokens.verify(&token), Err(Error::Invalid)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = Tokens::new(SECRET, Duration::ZERO).unwrap();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = Claims {
            sub: "admin".into(),
            role: Role::Admin,
            iat: now - 600,
            exp: now - 300,
        };
        let token = encode(&Header::default(), &claims, &tokens.encoding).unwrap();
        assert!(matches!(tokens.verify(&token), Err(Error::Expired)));
    }

    #[test]
    fn short_secret_is_refused() {
        assert!(matches!(
            Tokens::new("short", Duration::from_secs(60)),
            Err(Error::SecretTooShort)
        ));
    }
}
