use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::models::{Administrator, Claims};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("token signing error: {0}")]
    Signing(jsonwebtoken::errors::Error),
    #[error("password hash error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    hash(password, cost)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password, hash)
}

/// Signing material and token policy, built once from the config.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &[u8], algorithm: Algorithm, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            algorithm,
            ttl,
        }
    }

    /// Token asserting `admin`'s identity and role until now + ttl.
    pub fn create_jwt(&self, admin: &Administrator) -> Result<String, AuthError> {
        let expiration = (Utc::now() + self.ttl).timestamp().max(0) as usize;

        let claims = Claims {
            id: admin.id,
            nom: admin.name.clone(),
            role: admin.role(),
            exp: expiration,
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding).map_err(AuthError::Signing)
    }

    /// Checks signature and expiry and returns the embedded claims.
    pub fn validate_jwt(&self, token: &str) -> Result<Claims, AuthError> {
        let token_data = decode::<Claims>(token, &self.decoding, &Validation::new(self.algorithm))?;
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use jsonwebtoken::errors::ErrorKind;

    fn admin(is_super_admin: bool) -> Administrator {
        Administrator {
            id: 7,
            email: "chef@fablab.org".to_string(),
            name: "Chef".to_string(),
            hashed_password: String::new(),
            is_super_admin,
            created_at: Utc::now(),
        }
    }

    fn keys(ttl: Duration) -> TokenKeys {
        TokenKeys::new(b"test-secret", Algorithm::HS256, ttl)
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hashed = hash_password("s3cret", 4).unwrap();
        assert_ne!(hashed, "s3cret");
        assert!(verify_password("s3cret", &hashed).unwrap());
        assert!(!verify_password("wrong", &hashed).unwrap());
    }

    #[test]
    fn test_token_carries_identity_and_role() {
        let keys = keys(Duration::minutes(30));

        let claims = keys.validate_jwt(&keys.create_jwt(&admin(true)).unwrap()).unwrap();
        assert_eq!(claims.id, 7);
        assert_eq!(claims.nom, "Chef");
        assert_eq!(claims.role, Role::SuperAdmin);
        assert!(claims.exp > Utc::now().timestamp() as usize);

        let claims = keys.validate_jwt(&keys.create_jwt(&admin(false)).unwrap()).unwrap();
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn test_role_serializes_like_legacy_tokens() {
        assert_eq!(serde_json::to_string(&Role::SuperAdmin).unwrap(), "\"super admin\"");
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = keys(Duration::minutes(-5));
        let token = keys.create_jwt(&admin(false)).unwrap();

        match keys.validate_jwt(&token) {
            Err(AuthError::Token(e)) => assert!(matches!(e.kind(), ErrorKind::ExpiredSignature)),
            other => panic!("expected expired token error, got {other:?}"),
        }
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let other = TokenKeys::new(b"other-secret", Algorithm::HS256, Duration::minutes(30));
        let token = other.create_jwt(&admin(true)).unwrap();

        assert!(keys(Duration::minutes(30)).validate_jwt(&token).is_err());
        assert!(keys(Duration::minutes(30)).validate_jwt("not.a.token").is_err());
    }
}
