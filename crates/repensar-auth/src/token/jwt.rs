//! JWT encoding and decoding.
//!
//! Tokens are compact JWS signed with an HMAC shared secret. The claim
//! set is fixed: subject, optional email, issued-at, expiry, a random
//! `jti`, the token `type` (access or refresh), and for refresh tokens
//! the rotation family.
//!
//! Decoding enforces signature and expiry with zero leeway, so
//! `now >= exp` is already rejected here. Callers layer revocation
//! checks on top; this module is deliberately unaware of storage.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::config::SigningConfig;
use crate::error::AuthError;
use crate::types::TokenKind;

/// Supported HMAC signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256.
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    HS512,
}

impl SigningAlgorithm {
    /// Parses an algorithm name from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` for unsupported names.
    pub fn from_name(name: &str) -> Result<Self, AuthError> {
        match name {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            other => Err(AuthError::configuration(format!(
                "unsupported signing algorithm: {other}"
            ))),
        }
    }

    fn to_jwt(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS384 => Algorithm::HS384,
            Self::HS512 => Algorithm::HS512,
        }
    }
}

/// Claim set carried by every issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id as a string.
    pub sub: String,

    /// Email of the subject, if known at issue time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Expiry as a unix timestamp (seconds).
    pub exp: i64,

    /// Issued-at as a unix timestamp (seconds).
    pub iat: i64,

    /// Unique token id. 256 bits of CSPRNG output.
    pub jti: String,

    /// Token type discriminator, checked on every verification.
    #[serde(rename = "type")]
    pub kind: TokenKind,

    /// Rotation family; present on refresh tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

/// Generates a fresh token id: 32 random bytes, base64url without padding.
#[must_use]
pub fn generate_jti() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generates a fresh rotation family id: 16 random bytes, base64url.
#[must_use]
pub fn generate_family() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Stateless JWT signer/verifier.
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    /// Creates a signer/verifier from the signing configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the algorithm name is
    /// unsupported.
    pub fn new(config: &SigningConfig) -> Result<Self, AuthError> {
        let algorithm = SigningAlgorithm::from_name(&config.algorithm)?.to_jwt();
        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            algorithm,
        })
    }

    /// Signs a claim set into a compact JWT.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if serialization or signing fails.
    pub fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| AuthError::internal(format!("token signing failed: {e}")))
    }

    /// Verifies signature and expiry, returning the claims.
    ///
    /// Expiry is checked with zero leeway. The caller is responsible for
    /// the `type` claim and revocation checks.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for any malformed, tampered,
    /// or expired token. The underlying reason is traced at debug level
    /// but never surfaced.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        match jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => {
                tracing::debug!(error = %e, "token decode rejected");
                Err(AuthError::InvalidToken)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn service() -> JwtService {
        JwtService::new(&SigningConfig {
            secret: "test-secret-that-is-long-enough-0123456789".to_string(),
            algorithm: "HS256".to_string(),
        })
        .unwrap()
    }

    fn claims(kind: TokenKind, exp_offset_secs: i64) -> Claims {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Claims {
            sub: "5f3c0c5e-0000-4000-8000-000000000001".to_string(),
            email: Some("volunteer@example.org".to_string()),
            exp: now + exp_offset_secs,
            iat: now,
            jti: generate_jti(),
            kind,
            family: match kind {
                TokenKind::Access => None,
                TokenKind::Refresh => Some(generate_family()),
            },
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let svc = service();
        let claims = claims(TokenKind::Refresh, 3600);
        let token = svc.encode(&claims).unwrap();

        let decoded = svc.decode(&token).unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.jti, claims.jti);
        assert_eq!(decoded.kind, TokenKind::Refresh);
        assert_eq!(decoded.family, claims.family);
    }

    #[test]
    fn test_expired_token_rejected() {
        let svc = service();
        let token = svc.encode(&claims(TokenKind::Access, -61)).unwrap();
        let err = svc.decode(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = service().encode(&claims(TokenKind::Access, 3600)).unwrap();

        let other = JwtService::new(&SigningConfig {
            secret: "a-completely-different-secret-0123456789".to_string(),
            algorithm: "HS256".to_string(),
        })
        .unwrap();
        assert!(matches!(
            other.decode(&token).unwrap_err(),
            AuthError::InvalidToken
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let svc = service();
        let token = svc.encode(&claims(TokenKind::Access, 3600)).unwrap();

        // Flip a character in the payload segment.
        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        let mut payload: Vec<u8> = parts[1].clone().into_bytes();
        payload[5] = if payload[5] == b'A' { b'B' } else { b'A' };
        parts[1] = String::from_utf8(payload).unwrap();
        let tampered = parts.join(".");

        assert!(svc.decode(&tampered).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let svc = service();
        assert!(svc.decode("not-a-jwt").is_err());
        assert!(svc.decode("").is_err());
        assert!(svc.decode("a.b.c").is_err());
    }

    #[test]
    fn test_type_claim_serialized_as_type() {
        let svc = service();
        let token = svc.encode(&claims(TokenKind::Access, 3600)).unwrap();
        let payload_b64 = token.split('.').nth(1).unwrap();
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json["type"], "access");
    }

    #[test]
    fn test_jti_uniqueness_and_shape() {
        let a = generate_jti();
        let b = generate_jti();
        assert_ne!(a, b);
        // 32 bytes -> 43 base64url chars, no padding.
        assert_eq!(a.len(), 43);
        assert!(!a.contains('='));
    }

    #[test]
    fn test_family_shape() {
        let fam = generate_family();
        // 16 bytes -> 22 base64url chars.
        assert_eq!(fam.len(), 22);
    }

    #[test]
    fn test_unsupported_algorithm() {
        let result = JwtService::new(&SigningConfig {
            secret: "test-secret-that-is-long-enough-0123456789".to_string(),
            algorithm: "RS256".to_string(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_all_hmac_algorithms_roundtrip() {
        for alg in ["HS256", "HS384", "HS512"] {
            let svc = JwtService::new(&SigningConfig {
                secret: "test-secret-that-is-long-enough-0123456789".to_string(),
                algorithm: alg.to_string(),
            })
            .unwrap();
            let token = svc.encode(&claims(TokenKind::Access, 60)).unwrap();
            assert!(svc.decode(&token).is_ok(), "{alg} roundtrip failed");
        }
    }
}
