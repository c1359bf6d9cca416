//! Webhook signature verification
//!
//! Both providers sign webhook deliveries the same way: a header of the form
//! `t=<unix seconds>,v1=<hex signature>` where the signature is
//! HMAC-SHA256 over `"<t>.<raw body>"` keyed with the endpoint secret.
//! Several `v1` entries may be present during secret rotation.

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed delivery, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("No webhook secret configured")]
    MissingSecret,

    #[error("Missing signature header")]
    MissingHeader,

    #[error("Malformed signature header")]
    Malformed,

    #[error("Signature timestamp outside tolerance")]
    Expired,

    #[error("No signature matches the payload")]
    Mismatch,
}

/// Verify `header` against `body` at time `now` (unix seconds).
pub fn verify(
    secret: &str,
    header: Option<&str>,
    body: &[u8],
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    let header = header.ok_or(SignatureError::MissingHeader)?;

    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if timestamp.abs_diff(now) > u64::try_from(tolerance_secs).unwrap_or(0) {
        return Err(SignatureError::Expired);
    }

    for candidate in signatures {
        let Ok(expected) = HEXLOWER_PERMISSIVE.decode(candidate.as_bytes()) else {
            continue;
        };
        // verify_slice compares in constant time
        if keyed_mac(secret, timestamp, body).verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}

/// Produce a header value for `body`, as the provider would.
pub fn sign(secret: &str, body: &[u8], timestamp: i64) -> String {
    let digest = keyed_mac(secret, timestamp, body).finalize().into_bytes();
    format!("t={},v1={}", timestamp, HEXLOWER.encode(&digest))
}

fn keyed_mac(secret: &str, timestamp: i64, body: &[u8]) -> HmacSha256 {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts any key length"),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_valid_signature() {
        let body = br#"{"type":"video.asset.ready"}"#;
        let header = sign(SECRET, body, NOW);

        assert_eq!(verify(SECRET, Some(&header), body, NOW + 10, DEFAULT_TOLERANCE_SECS), Ok(()));
    }

    #[test]
    fn test_wrong_secret_or_body() {
        let body = b"payload";
        let header = sign(SECRET, body, NOW);

        assert_eq!(
            verify("other", Some(&header), body, NOW, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify(SECRET, Some(&header), b"payload!", NOW, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_expired_timestamp() {
        let body = b"payload";
        let header = sign(SECRET, body, NOW);

        assert_eq!(
            verify(SECRET, Some(&header), body, NOW + 301, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_extreme_timestamps_are_expired() {
        for header in ["t=-9223372036854775808,v1=00", "t=9223372036854775807,v1=00"] {
            assert_eq!(
                verify(SECRET, Some(header), b"x", NOW, DEFAULT_TOLERANCE_SECS),
                Err(SignatureError::Expired)
            );
        }
        assert_eq!(
            verify(SECRET, Some("t=0,v1=00"), b"x", i64::MIN, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        assert_eq!(
            verify(SECRET, None, b"x", NOW, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::MissingHeader)
        );
        assert_eq!(
            verify(SECRET, Some("v1=abcd"), b"x", NOW, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify(SECRET, Some("t=123"), b"x", NOW, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify("", Some("t=1,v1=00"), b"x", NOW, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::MissingSecret)
        );
    }

    #[test]
    fn test_any_of_several_signatures_matches() {
        let body = b"payload";
        let good = sign(SECRET, body, NOW);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1=deadbeef,v0=ignored,v1={}", NOW, good_sig);

        assert_eq!(verify(SECRET, Some(&header), body, NOW, DEFAULT_TOLERANCE_SECS), Ok(()));
    }

    proptest! {
        #[test]
        fn signed_bodies_always_verify(body in proptest::collection::vec(any::<u8>(), 0..256), skew in -300i64..=300) {
            let header = sign(SECRET, &body, NOW);
            prop_assert_eq!(verify(SECRET, Some(&header), &body, NOW + skew, DEFAULT_TOLERANCE_SECS), Ok(()));
        }

        #[test]
        fn any_timestamp_outside_tolerance_is_expired(t in any::<i64>()) {
            prop_assume!(t.abs_diff(NOW) > DEFAULT_TOLERANCE_SECS as u64);
            let header = format!("t={},v1=00", t);
            prop_assert_eq!(
                verify(SECRET, Some(&header), b"x", NOW, DEFAULT_TOLERANCE_SECS),
                Err(SignatureError::Expired)
            );
        }

        #[test]
        fn flipped_byte_never_verifies(body in proptest::collection::vec(any::<u8>(), 1..128), idx in any::<prop::sample::Index>()) {
            let header = sign(SECRET, &body, NOW);
            let mut tampered = body.clone();
            let i = idx.index(tampered.len());
            tampered[i] ^= 0x01;
            prop_assert_eq!(
                verify(SECRET, Some(&header), &tampered, NOW, DEFAULT_TOLERANCE_SECS),
                Err(SignatureError::Mismatch)
            );
        }
    }
}
