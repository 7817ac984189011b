use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tally_core::{Role, User};
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("failed to sign token")]
    Signing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub company_id: i64,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

/// Issues and checks bearer tokens of the form `<hex claims>.<hex hmac>`.
#[derive(Clone)]
pub struct TokenSigner {
    key: Arc<[u8]>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            key: Arc::from(secret),
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            company_id: user.company_id,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4(),
        };
        let payload = serde_json::to_vec(&claims).map_err(|_| TokenError::Signing)?;
        let encoded = hex::encode(payload);
        let signature = hex::encode(self.sign(encoded.as_bytes())?);

        Ok(format!("{encoded}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let (encoded, signature) = token.trim().split_once('.').ok_or(TokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;

        let expected = self.sign(encoded.as_bytes())?;
        if !bool::from(expected.as_slice().ct_eq(signature.as_slice())) {
            return Err(TokenError::BadSignature);
        }

        let payload = hex::decode(encoded).map_err(|_| TokenError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;
        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| TokenError::Signing)?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"0123456789abcdef0123456789abcdef", Duration::hours(24))
    }

    fn user() -> User {
        User {
            id: 42,
            email: "finance@alnoor.ae".to_string(),
            first_name: "Layla".to_string(),
            last_name: "Karim".to_string(),
            role: Role::Accountant,
            company_id: 3,
            is_active: true,
            last_login: None,
        }
    }

    #[test]
    fn issued_token_verifies_with_same_key() {
        let signer = signer();
        let token = signer.issue(&user()).unwrap();

        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.id, 42);
        assert_eq!(claims.company_id, 3);
        assert_eq!(claims.role, Role::Accountant);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn tampered_claims_fail_signature_check() {
        let signer = signer();
        let token = signer.issue(&user()).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let mut forged = user();
        forged.role = Role::Admin;
        let forged_token = signer.issue(&forged).unwrap();
        let (forged_claims, _) = forged_token.split_once('.').unwrap();

        let spliced = format!("{forged_claims}.{signature}");
        assert_eq!(signer.verify(&spliced), Err(TokenError::BadSignature));

        let other = TokenSigner::new(b"another-secret-another-secret-xx", Duration::hours(24));
        assert_eq!(other.verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn expired_and_garbage_tokens_are_rejected() {
        let signer = signer();
        let issued_at = Utc::now() - Duration::hours(25);
        let token = signer.issue_at(&user(), issued_at).unwrap();
        assert_eq!(signer.verify(&token), Err(TokenError::Expired));

        assert_eq!(signer.verify("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(signer.verify("abc.zz"), Err(TokenError::Malformed));
    }
}
