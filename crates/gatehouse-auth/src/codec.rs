//! Audience-scoped signed token codec
//!
//! Claims are an open JSON object. `aud` is always stamped; `exp` only when a
//! lifetime is given, so tokens issued without one never expire. Validation
//! uses zero leeway.

use std::str::FromStr;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

/// Audiences of the token classes issued by this crate
pub mod audience {
    pub const ACCESS: &str = "auth:access";
    pub const REFRESH: &str = "auth:refresh";
    pub const RESET_PASSWORD: &str = "auth:reset";
    pub const VERIFY: &str = "auth:verify";
    pub const OAUTH_STATE: &str = "auth:oauth-state";
}

/// Decoded claim set
pub type Claims = Map<String, Value>;

#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// HMAC codec (HS256)
    pub fn hs256(secret: &str) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Build a codec for `algorithm`. For asymmetric algorithms `secret` is
    /// the PEM private key and `public_key` the PEM public key.
    pub fn new(secret: &str, algorithm: &str, public_key: Option<&str>) -> AuthResult<Self> {
        let algorithm = Algorithm::from_str(algorithm)
            .map_err(|_| AuthError::Config(format!("Unsupported JWT algorithm: {}", algorithm)))?;
        let bad_key = |e: jsonwebtoken::errors::Error| AuthError::Config(format!("Invalid key: {}", e));

        let (encoding_key, decoding_key) = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => (
                EncodingKey::from_secret(secret.as_bytes()),
                DecodingKey::from_secret(secret.as_bytes()),
            ),
            asymmetric => {
                let public = public_key.ok_or_else(|| {
                    AuthError::Config(format!("{:?} requires a public key", asymmetric))
                })?;
                match asymmetric {
                    Algorithm::ES256 | Algorithm::ES384 => (
                        EncodingKey::from_ec_pem(secret.as_bytes()).map_err(bad_key)?,
                        DecodingKey::from_ec_pem(public.as_bytes()).map_err(bad_key)?,
                    ),
                    Algorithm::EdDSA => (
                        EncodingKey::from_ed_pem(secret.as_bytes()).map_err(bad_key)?,
                        DecodingKey::from_ed_pem(public.as_bytes()).map_err(bad_key)?,
                    ),
                    // RS* and PS*
                    _ => (
                        EncodingKey::from_rsa_pem(secret.as_bytes()).map_err(bad_key)?,
                        DecodingKey::from_rsa_pem(public.as_bytes()).map_err(bad_key)?,
                    ),
                }
            }
        };

        Ok(Self {
            algorithm,
            encoding_key,
            decoding_key,
        })
    }

    /// Sign `claims` for `audience`, expiring `ttl_seconds` from now if given.
    /// A negative ttl yields an already-expired token.
    pub fn issue(&self, mut claims: Claims, ttl_seconds: Option<i64>, audience: &str) -> AuthResult<String> {
        claims.insert("aud".into(), Value::String(audience.to_string()));
        match ttl_seconds {
            Some(ttl) => {
                claims.insert("exp".into(), Value::from(Utc::now().timestamp() + ttl));
            }
            None => {
                claims.remove("exp");
            }
        }

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to encode token: {}", e)))
    }

    /// Check signature, audience and (if present) expiry
    pub fn verify(&self, token: &str, audience: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["aud"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

/// Build a claim set from `(key, value)` pairs
pub fn claims<I, K>(pairs: I) -> Claims
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// `sub` claim parsed as a user id
pub fn subject(claims: &Claims) -> Option<Uuid> {
    claims
        .get("sub")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

pub fn string_claim<'a>(claims: &'a Claims, name: &str) -> Option<&'a str> {
    claims.get(name).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test-secret-key-for-jwt-tokens-min-32-bytes!";

    fn sub_claims(id: Uuid) -> Claims {
        claims([("sub", json!(id.to_string()))])
    }

    #[test]
    fn test_issue_verify_round_trip() {
        let codec = TokenCodec::hs256(SECRET);
        let id = Uuid::new_v4();

        let token = codec.issue(sub_claims(id), Some(60), audience::ACCESS).unwrap();
        let decoded = codec.verify(&token, audience::ACCESS).unwrap();

        assert_eq!(subject(&decoded), Some(id));
        assert_eq!(decoded["aud"], json!(audience::ACCESS));
        assert!(decoded["exp"].as_i64().unwrap() > Utc::now().timestamp());
    }

    #[test]
    fn test_audience_isolation() {
        let codec = TokenCodec::hs256(SECRET);
        let token = codec
            .issue(sub_claims(Uuid::new_v4()), Some(60), audience::RESET_PASSWORD)
            .unwrap();

        assert!(matches!(
            codec.verify(&token, audience::VERIFY),
            Err(AuthError::InvalidToken)
        ));
        assert!(codec.verify(&token, audience::RESET_PASSWORD).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let codec = TokenCodec::hs256(SECRET);
        let token = codec
            .issue(sub_claims(Uuid::new_v4()), Some(-1), audience::ACCESS)
            .unwrap();
        assert!(matches!(
            codec.verify(&token, audience::ACCESS),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_token_without_ttl_has_no_expiry() {
        let codec = TokenCodec::hs256(SECRET);
        let mut input = sub_claims(Uuid::new_v4());
        input.insert("exp".into(), json!(1));

        let token = codec.issue(input, None, audience::ACCESS).unwrap();
        let decoded = codec.verify(&token, audience::ACCESS).unwrap();
        assert!(decoded.get("exp").is_none());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenCodec::hs256(SECRET)
            .issue(sub_claims(Uuid::new_v4()), Some(60), audience::ACCESS)
            .unwrap();
        let other = TokenCodec::hs256("another-secret-key-that-is-32-bytes-long");
        assert!(other.verify(&token, audience::ACCESS).is_err());
    }

    #[test]
    fn test_malformed_token_rejected() {
        let codec = TokenCodec::hs256(SECRET);
        assert!(codec.verify("not.a.token", audience::ACCESS).is_err());
        assert!(codec.verify("", audience::ACCESS).is_err());
    }

    #[test]
    fn test_algorithm_selection() {
        let codec = TokenCodec::new(SECRET, "HS512", None).unwrap();
        let token = codec
            .issue(sub_claims(Uuid::new_v4()), Some(60), audience::ACCESS)
            .unwrap();
        assert!(codec.verify(&token, audience::ACCESS).is_ok());
        // HS256 codec with the same secret refuses an HS512 token
        assert!(TokenCodec::hs256(SECRET).verify(&token, audience::ACCESS).is_err());

        assert!(matches!(
            TokenCodec::new(SECRET, "RS256", None),
            Err(AuthError::Config(_))
        ));
        assert!(matches!(
            TokenCodec::new(SECRET, "XX999", None),
            Err(AuthError::Config(_))
        ));
    }
}
