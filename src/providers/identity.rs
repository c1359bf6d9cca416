//! Session token verification
//!
//! The auth provider hands the browser a compact JWS (HS256) in the
//! `__session` cookie or an `Authorization: Bearer` header. Verification is
//! local: signature, algorithm, time window and, when configured, issuer.

use crate::config::AuthConfig;
use crate::models::UpsertUserInput;
use chrono::Utc;
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// External user id at the identity provider
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Expiry, unix seconds
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl SessionClaims {
    /// The profile fields mirrored into the local users table
    pub fn into_user_input(self) -> UpsertUserInput {
        UpsertUserInput {
            external_id: self.sub,
            email: self.email,
            name: self.name,
            image_url: self.image_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Session verification is not configured")]
    NotConfigured,

    #[error("Malformed session token")]
    Malformed,

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Session token has expired")]
    Expired,

    #[error("Session token is not yet valid")]
    NotYetValid,

    #[error("Unexpected token issuer")]
    WrongIssuer,
}

/// Verifies session tokens presented by the browser
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<SessionClaims, TokenError>;
}

#[derive(Debug, Deserialize)]
struct TokenHeader {
    alg: String,
}

/// HS256 verifier keyed with the provider's shared secret
#[derive(Clone)]
pub struct SessionTokenVerifier {
    secret: Vec<u8>,
    issuer: Option<String>,
    leeway: i64,
}

impl std::fmt::Debug for SessionTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokenVerifier")
            .field("issuer", &self.issuer)
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

impl SessionTokenVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            secret: config.session_secret.as_bytes().to_vec(),
            issuer: config.issuer.clone(),
            leeway: i64::try_from(config.leeway_seconds).unwrap_or(i64::MAX),
        }
    }

    /// Verify `token` as of `now` (unix seconds).
    pub fn verify_at(&self, token: &str, now: i64) -> Result<SessionClaims, TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::NotConfigured);
        }

        let Some((signing_input, signature)) = token.rsplit_once('.') else {
            return Err(TokenError::Malformed);
        };
        let Some((header, payload)) = signing_input.split_once('.') else {
            return Err(TokenError::Malformed);
        };
        if payload.contains('.') {
            return Err(TokenError::Malformed);
        }

        let header: TokenHeader = decode_segment(header)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let signature = BASE64URL_NOPAD
            .decode(signature.as_bytes())
            .map_err(|_| TokenError::Malformed)?;
        self.mac()?
            .chain_update(signing_input.as_bytes())
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: SessionClaims = decode_segment(payload)?;

        if claims.exp.saturating_add(self.leeway) <= now {
            return Err(TokenError::Expired);
        }
        if let Some(nbf) = claims.nbf {
            if nbf.saturating_sub(self.leeway) > now {
                return Err(TokenError::NotYetValid);
            }
        }
        if let Some(expected) = &self.issuer {
            if claims.iss.as_deref() != Some(expected.as_str()) {
                return Err(TokenError::WrongIssuer);
            }
        }

        Ok(claims)
    }

    /// Sign `claims` with the shared secret. Used by local tooling and tests
    /// to mint tokens the verifier accepts.
    pub fn issue(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        let header = serde_json::json!({ "alg": ALGORITHM, "typ": "JWT" });
        let header = serde_json::to_vec(&header).map_err(|_| TokenError::Malformed)?;
        let payload = serde_json::to_vec(claims).map_err(|_| TokenError::Malformed)?;

        let signing_input = format!(
            "{}.{}",
            BASE64URL_NOPAD.encode(&header),
            BASE64URL_NOPAD.encode(&payload)
        );
        let signature = self
            .mac()?
            .chain_update(signing_input.as_bytes())
            .finalize()
            .into_bytes();

        Ok(format!("{}.{}", signing_input, BASE64URL_NOPAD.encode(&signature)))
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::NotConfigured)
    }
}

impl IdentityVerifier for SessionTokenVerifier {
    fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = BASE64URL_NOPAD
        .decode(segment.as_bytes())
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn verifier(issuer: Option<&str>) -> SessionTokenVerifier {
        SessionTokenVerifier::new(&AuthConfig {
            session_secret: "sk_test_session".to_string(),
            issuer: issuer.map(str::to_string),
            leeway_seconds: 5,
        })
    }

    fn claims() -> SessionClaims {
        SessionClaims {
            sub: "user_2abc".to_string(),
            email: "ada@example.com".to_string(),
            name: Some("Ada".to_string()),
            image_url: None,
            exp: NOW + 60,
            nbf: Some(NOW - 1),
            iss: Some("https://clerk.example.com".to_string()),
        }
    }

    #[test]
    fn test_issue_then_verify() {
        let v = verifier(Some("https://clerk.example.com"));
        let token = v.issue(&claims()).unwrap();

        assert_eq!(v.verify_at(&token, NOW).unwrap(), claims());
    }

    #[test]
    fn test_expired_and_not_yet_valid() {
        let v = verifier(None);
        let token = v.issue(&claims()).unwrap();

        assert_eq!(v.verify_at(&token, NOW + 65), Err(TokenError::Expired));
        // inside leeway
        assert!(v.verify_at(&token, NOW + 64).is_ok());

        let mut early = claims();
        early.nbf = Some(NOW + 100);
        let token = v.issue(&early).unwrap();
        assert_eq!(v.verify_at(&token, NOW), Err(TokenError::NotYetValid));
    }

    #[test]
    fn test_huge_leeway_and_extreme_claims() {
        let v = SessionTokenVerifier::new(&AuthConfig {
            session_secret: "sk_test_session".to_string(),
            issuer: None,
            leeway_seconds: u64::MAX,
        });
        let mut extreme = claims();
        extreme.exp = i64::MAX;
        extreme.nbf = Some(i64::MIN);
        let token = v.issue(&extreme).unwrap();
        assert!(v.verify_at(&token, NOW).is_ok());

        let strict = SessionTokenVerifier::new(&AuthConfig {
            session_secret: "sk_test_session".to_string(),
            issuer: None,
            leeway_seconds: 0,
        });
        extreme.exp = i64::MIN;
        let token = strict.issue(&extreme).unwrap();
        assert_eq!(strict.verify_at(&token, NOW), Err(TokenError::Expired));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = verifier(None).issue(&claims()).unwrap();
        let other = SessionTokenVerifier::new(&AuthConfig {
            session_secret: "another".to_string(),
            ..AuthConfig::default()
        });

        assert_eq!(other.verify_at(&token, NOW), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let v = verifier(None);
        let token = v.issue(&claims()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let mut forged = claims();
        forged.sub = "user_admin".to_string();
        let forged_payload = BASE64URL_NOPAD.encode(&serde_json::to_vec(&forged).unwrap());
        let forged_token = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert_eq!(v.verify_at(&forged_token, NOW), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_issuer_mismatch() {
        let token = verifier(None).issue(&claims()).unwrap();
        let strict = verifier(Some("https://other.example.com"));

        assert_eq!(strict.verify_at(&token, NOW), Err(TokenError::WrongIssuer));
    }

    #[test]
    fn test_alg_none_is_rejected() {
        let header = BASE64URL_NOPAD.encode(br#"{"alg":"none"}"#);
        let payload = BASE64URL_NOPAD.encode(&serde_json::to_vec(&claims()).unwrap());
        let token = format!("{}.{}.", header, payload);

        assert_eq!(
            verifier(None).verify_at(&token, NOW),
            Err(TokenError::UnsupportedAlgorithm("none".to_string()))
        );
    }

    #[test]
    fn test_malformed_and_unconfigured() {
        let v = verifier(None);
        assert_eq!(v.verify_at("abc", NOW), Err(TokenError::Malformed));
        assert_eq!(v.verify_at("a.b.c.d", NOW), Err(TokenError::Malformed));

        let unconfigured = SessionTokenVerifier::new(&AuthConfig::default());
        let token = v.issue(&claims()).unwrap();
        assert_eq!(unconfigured.verify_at(&token, NOW), Err(TokenError::NotConfigured));
    }

    #[test]
    fn test_into_user_input() {
        let input = claims().into_user_input();
        assert_eq!(input.external_id, "user_2abc");
        assert_eq!(input.email, "ada@example.com");
        assert_eq!(input.name.as_deref(), Some("Ada"));
    }
}
