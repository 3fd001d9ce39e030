use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use crate::errors::{IdentityError, IdentityResult};

/// Claims carried by the hosted service's access tokens.
///
/// Only the fields the client reads are modelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Read the claims of an access token without verifying it.
///
/// The signing secret lives server-side; the client only needs the expiry and
/// subject to decide whether a stored session is worth presenting.
pub fn peek_claims(token: &str) -> IdentityResult<AccessClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| IdentityError::Decode(format!("Unreadable access token: {}", e)))?;

    Ok(data.claims)
}

/// Expiry (unix seconds) of an access token, if it can be read.
pub fn expires_at(token: &str) -> Option<i64> {
    peek_claims(token).ok().map(|c| c.exp)
}

#[cfg(test)]
pub(crate) fn encode_test_token(sub: &str, exp: i64) -> String {
    let claims = AccessClaims {
        sub: sub.to_string(),
        exp,
        email: None,
        role: Some("authenticated".to_string()),
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(b"test-signing-secret"),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn reads_expiry_without_the_secret() {
        let exp = Utc::now().timestamp() + 3600;
        let token = encode_test_token("7d1c6c57-5d0e-4c43-9d4e-0a5f6f0b9a11", exp);
        let claims = peek_claims(&token).unwrap();
        assert_eq!(claims.exp, exp);
        assert_eq!(claims.sub, "7d1c6c57-5d0e-4c43-9d4e-0a5f6f0b9a11");
    }

    #[test]
    fn expired_tokens_are_still_readable() {
        let exp = Utc::now().timestamp() - 60;
        let token = encode_test_token("someone", exp);
        assert_eq!(expires_at(&token), Some(exp));
    }

    #[test]
    fn opaque_tokens_have_no_expiry() {
        assert_eq!(expires_at("not-a-jwt"), None);
        assert!(matches!(peek_claims("a.b.c"), Err(IdentityError::Decode(_))));
    }
}
