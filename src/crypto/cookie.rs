//! Signed and encrypted session cookie values.
//!
//! Wire format: `v1.<body>.<tag>`, both parts URL-safe base64 without padding.
//!
//! * `body` = `0x01 || issued_at (i64, big endian) || nonce (12) || AES-256-GCM(claim)`
//! * `tag`  = `HMAC-SHA256(auth_key, cookie_name || '|' || body)`
//!
//! The claim is encrypted under the generation's encryption key with the
//! cookie name as associated data, then the whole body is signed with the same
//! generation's authentication key.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::crypto::aes::{self, NONCE_SIZE, SecureKey};
use crate::crypto::keyring::{KeyGeneration, KeyRing};
use crate::error::{AppError, Result};
use crate::models::session::SessionClaim;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "v1.";
const BODY_VERSION: u8 = 1;
const ISSUED_AT_SIZE: usize = 8;
const TAG_SIZE: usize = 32;
const GCM_TAG_SIZE: usize = 16;
const HEADER_SIZE: usize = 1 + ISSUED_AT_SIZE + NONCE_SIZE;

/// Why a cookie value could not be turned back into a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Not produced by this codec: wrong prefix, bad encoding or bad lengths.
    #[error("cookie is not in the expected format")]
    Malformed,
    /// In our format, but no key generation authenticates it.
    #[error("cookie failed authentication")]
    Forged,
    /// Authentic, but issued longer ago than the cookie lifetime.
    #[error("cookie is too old")]
    Expired,
}

/// A decoded cookie value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// The claim carried by the cookie.
    pub claim: SessionClaim,
    /// Signed under the previous generation; the next rotation will reject it.
    pub stale: bool,
}

/// Turns session claims into cookie values and back.
#[derive(Clone)]
pub struct CookieCodec {
    keys: KeyRing,
    cookie_name: String,
    max_age: Duration,
}

impl CookieCodec {
    /// Creates a codec bound to one cookie name.
    ///
    /// # Arguments
    ///
    /// * `keys` - The shared key ring.
    /// * `cookie_name` - Bound into every tag so values cannot move between cookies.
    /// * `max_age` - Cookies issued longer ago than this decode as expired.
    pub fn new(keys: KeyRing, cookie_name: impl Into<String>, max_age: Duration) -> Self {
        Self {
            keys,
            cookie_name: cookie_name.into(),
            max_age,
        }
    }

    /// The key ring this codec reads from.
    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    /// The cookie name this codec signs for.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Encodes a claim under the current key generation.
    pub fn encode(&self, claim: &SessionClaim) -> Result<String> {
        let snapshot = self.keys.snapshot();
        let generation = snapshot.current();

        let payload = bincode::encode_to_vec(claim, bincode::config::standard())
            .map_err(|e| AppError::Internal(format!("Bincode encode failed: {}", e)))?;
        let (ciphertext, nonce) =
            aes::encrypt(&generation.enc_key, &payload, self.cookie_name.as_bytes())?;

        let mut body = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        body.push(BODY_VERSION);
        body.extend_from_slice(&Utc::now().timestamp().to_be_bytes());
        body.extend_from_slice(&nonce);
        body.extend_from_slice(&ciphertext);

        let tag = self.sign(&generation.auth_key, &body)?;

        Ok(format!(
            "{}{}.{}",
            PREFIX,
            URL_SAFE_NO_PAD.encode(&body),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Decodes a cookie value, trying the current generation and then the
    /// previous one.
    pub fn decode(&self, value: &str) -> std::result::Result<SessionClaim, DecodeError> {
        self.decode_value(value).map(|decoded| decoded.claim)
    }

    /// Like [`CookieCodec::decode`], but also reports whether the value was
    /// only authenticated by the previous generation.
    pub fn decode_value(&self, value: &str) -> std::result::Result<Decoded, DecodeError> {
        let rest = value.strip_prefix(PREFIX).ok_or(DecodeError::Malformed)?;
        let (body_b64, tag_b64) = rest.split_once('.').ok_or(DecodeError::Malformed)?;
        let body = URL_SAFE_NO_PAD
            .decode(body_b64)
            .map_err(|_| DecodeError::Malformed)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| DecodeError::Malformed)?;

        if tag.len() != TAG_SIZE || body.len() < HEADER_SIZE + GCM_TAG_SIZE {
            return Err(DecodeError::Malformed);
        }
        if body.first() != Some(&BODY_VERSION) {
            return Err(DecodeError::Malformed);
        }

        let snapshot = self.keys.snapshot();
        let (position, generation) = snapshot
            .generations()
            .into_iter()
            .enumerate()
            .find(|(_, generation)| self.tag_matches(&generation.auth_key, &body, &tag))
            .ok_or(DecodeError::Forged)?;

        Ok(Decoded {
            claim: self.open(generation, &body)?,
            stale: position > 0,
        })
    }

    fn open(
        &self,
        generation: &KeyGeneration,
        body: &[u8],
    ) -> std::result::Result<SessionClaim, DecodeError> {
        let (header, ciphertext) = body.split_at(HEADER_SIZE);
        let (issued_at, nonce) = header[1..].split_at(ISSUED_AT_SIZE);

        let issued_at: [u8; ISSUED_AT_SIZE] =
            issued_at.try_into().map_err(|_| DecodeError::Malformed)?;
        let issued_at = i64::from_be_bytes(issued_at);
        if Utc::now().timestamp().saturating_sub(issued_at) > self.max_age.num_seconds() {
            tracing::debug!("Session cookie older than its maximum age");
            return Err(DecodeError::Expired);
        }

        let nonce: [u8; NONCE_SIZE] = nonce.try_into().map_err(|_| DecodeError::Malformed)?;
        let payload = aes::decrypt(
            &generation.enc_key,
            ciphertext,
            &nonce,
            self.cookie_name.as_bytes(),
        )
        .map_err(|e| {
            tracing::debug!(
                "Authenticated session cookie failed to decrypt under generation {}: {}",
                generation.id,
                e
            );
            DecodeError::Forged
        })?;

        let (claim, _): (SessionClaim, usize) =
            bincode::decode_from_slice(&payload, bincode::config::standard())
                .map_err(|_| DecodeError::Malformed)?;

        tracing::debug!("Session cookie verified under generation {}", generation.id);
        Ok(claim)
    }

    fn mac(&self, key: &SecureKey, body: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
            .map_err(|e| AppError::Encryption(format!("HMAC key error: {}", e)))?;
        mac.update(self.cookie_name.as_bytes());
        mac.update(b"|");
        mac.update(body);
        Ok(mac)
    }

    fn sign(&self, key: &SecureKey, body: &[u8]) -> Result<Vec<u8>> {
        Ok(self.mac(key, body)?.finalize().into_bytes().to_vec())
    }

    fn tag_matches(&self, key: &SecureKey, body: &[u8], tag: &[u8]) -> bool {
        match self.sign(key, body) {
            Ok(expected) => expected.ct_eq(tag).into(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn claim() -> SessionClaim {
        SessionClaim {
            principal_id: Uuid::new_v4(),
            token: crate::crypto::token::generate_auth_token(),
        }
    }

    fn codec() -> CookieCodec {
        CookieCodec::new(KeyRing::new(), "session", Duration::days(30))
    }

    /// Rewrites one base64 character in the body so the value stays well formed.
    fn flip_body_char(value: &str) -> String {
        let mut chars: Vec<char> = value.chars().collect();
        let index = PREFIX.len() + 10;
        chars[index] = if chars[index] == 'A' { 'B' } else { 'A' };
        chars.into_iter().collect()
    }

    #[test]
    fn decode_returns_the_encoded_claim() {
        let codec = codec();
        let claim = claim();
        let value = codec.encode(&claim).unwrap();
        assert!(value.starts_with("v1."));
        assert_eq!(codec.decode(&value), Ok(claim));
    }

    #[test]
    fn encoded_values_hide_the_token() {
        let codec = codec();
        let claim = claim();
        let value = codec.encode(&claim).unwrap();
        assert!(!value.contains(&claim.token));
    }

    #[test]
    fn survives_one_rotation_but_not_two() {
        let codec = codec();
        let claim = claim();
        let value = codec.encode(&claim).unwrap();

        codec.keys().rotate();
        assert_eq!(codec.decode(&value), Ok(claim.clone()));

        codec.keys().rotate();
        assert_eq!(codec.decode(&value), Err(DecodeError::Forged));
    }

    #[test]
    fn previous_generation_values_are_reported_stale() {
        let codec = codec();
        let claim = claim();
        let value = codec.encode(&claim).unwrap();
        assert!(!codec.decode_value(&value).unwrap().stale);

        codec.keys().rotate();
        let decoded = codec.decode_value(&value).unwrap();
        assert!(decoded.stale);
        assert_eq!(decoded.claim, claim);

        let reissued = codec.encode(&decoded.claim).unwrap();
        codec.keys().rotate();
        assert_eq!(codec.decode(&reissued), Ok(claim));
    }

    #[test]
    fn decode_stays_consistent_while_keys_rotate() {
        let codec = codec();
        let claim = claim();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..200 {
                    codec.keys().rotate();
                }
            });
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let value = codec.encode(&claim).unwrap();
                        match codec.decode(&value) {
                            Ok(decoded) => assert_eq!(decoded, claim),
                            Err(e) => assert_eq!(e, DecodeError::Forged),
                        }
                    }
                });
            }
        });
    }

    #[test]
    fn flipped_byte_is_forged() {
        let codec = codec();
        let value = codec.encode(&claim()).unwrap();
        assert_eq!(codec.decode(&flip_body_char(&value)), Err(DecodeError::Forged));
    }

    #[test]
    fn tampered_tag_is_forged() {
        let codec = codec();
        let value = codec.encode(&claim()).unwrap();
        let (body, _) = value.rsplit_once('.').unwrap();
        let forged = format!("{}.{}", body, URL_SAFE_NO_PAD.encode([0u8; TAG_SIZE]));
        assert_eq!(codec.decode(&forged), Err(DecodeError::Forged));
    }

    #[test]
    fn other_codec_keys_are_forged() {
        let value = codec().encode(&claim()).unwrap();
        assert_eq!(codec().decode(&value), Err(DecodeError::Forged));
    }

    #[test]
    fn cookie_name_is_bound_into_the_tag() {
        let keys = KeyRing::new();
        let a = CookieCodec::new(keys.clone(), "session", Duration::days(1));
        let b = CookieCodec::new(keys, "other", Duration::days(1));
        let value = a.encode(&claim()).unwrap();
        assert_eq!(b.decode(&value), Err(DecodeError::Forged));
    }

    #[test]
    fn foreign_values_are_malformed() {
        let codec = codec();
        for value in [
            "",
            "abc",
            "v1.",
            "v1.nodot",
            "v1.!!!.???",
            "v2.AAAA.AAAA",
            "v1.AAAA.AAAA",
            "d9f2c6b0-3d5a-4a3c-9a43-1d2b3c4d5e6f",
        ] {
            assert_eq!(codec.decode(value), Err(DecodeError::Malformed), "{value:?}");
        }
    }

    #[test]
    fn old_cookies_expire_before_any_lookup() {
        let codec = CookieCodec::new(KeyRing::new(), "session", Duration::seconds(-1));
        let value = codec.encode(&claim()).unwrap();
        assert_eq!(codec.decode(&value), Err(DecodeError::Expired));
    }
}
