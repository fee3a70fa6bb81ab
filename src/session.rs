//! The encrypted Rails session cookie envelope.

use std::sync::Arc;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes256Gcm;
use base64::{engine::general_purpose::STANDARD, Engine};
use percent_encoding::percent_decode_str;
use tracing::{debug, trace};

use crate::decode::decode;
use crate::error::{Error, Result};
use crate::key_generator::KeyGenerator;
use crate::value::Value;
use crate::verifier::SignedJson;

/// The salt Rails feeds its key generator for authenticated encrypted
/// cookies.
pub const SESSION_KEY_SALT: &str = "authenticated encrypted cookie";

const SESSION_KEY_BITS: u32 = 256;
const SESSION_KDF_ITERATIONS: u32 = 1000;

/// AES-256-GCM nonce length. Rails writes 12-byte IVs.
const GCM_IV_LEN: usize = 12;
/// AES-256-GCM authentication tag length.
const GCM_TAG_LEN: usize = 16;

/// An encrypted session cookie plus the key material to open it.
///
/// The cookie is URL-percent-encoded text carrying three base64 segments
/// joined by `--`: ciphertext, IV, and GCM tag. Decryption yields a signed
/// JSON wrapper whose `_rails.message` is a base64 Marshal 4.8 payload; the
/// decoded payload is the session hash.
pub struct Session {
    cookie_value: String,
    key_gen: Arc<KeyGenerator>,
}

impl Session {
    /// Build a session from a raw cookie value, deriving keys from
    /// `secret_key_base` with Rails' default iteration count and a cache.
    pub fn from_cookie_value(cookie_value: impl Into<String>, secret_key_base: &str) -> Session {
        Session::with_key_generator(
            cookie_value,
            Arc::new(KeyGenerator::new(
                secret_key_base,
                SESSION_KDF_ITERATIONS,
                true,
            )),
        )
    }

    /// Build a session that shares an existing key generator. Handling many
    /// requests against one `secret_key_base` wants one generator, so the
    /// derived session key is computed once.
    pub fn with_key_generator(
        cookie_value: impl Into<String>,
        key_gen: Arc<KeyGenerator>,
    ) -> Session {
        Session {
            cookie_value: cookie_value.into(),
            key_gen,
        }
    }

    /// Decrypt and decode the session hash.
    ///
    /// Entries come back in the order the cookie stored them, keys not
    /// deduplicated; [`Value::map_get`] on a rebuilt [`Value::Map`] or a
    /// scan over the pairs gives the keyed view.
    pub fn decrypt(&self) -> Result<Vec<(Value, Value)>> {
        let cookie = percent_decode_str(&self.cookie_value)
            .decode_utf8()
            .map_err(|e| {
                Error::InvalidEnvelope(format!("cookie is not valid UTF-8 once decoded: {}", e))
            })?;

        let segments: Vec<&str> = cookie.split("--").collect();
        if segments.len() != 3 {
            return Err(Error::InvalidEnvelope(format!(
                "expected 3 cookie segments, got {}",
                segments.len()
            )));
        }
        let ciphertext = decode_segment(segments[0], "ciphertext")?;
        let iv = decode_segment(segments[1], "iv")?;
        let tag = decode_segment(segments[2], "auth tag")?;

        if iv.len() != GCM_IV_LEN {
            return Err(Error::InvalidEnvelope(format!(
                "invalid IV length: {} (expected {})",
                iv.len(),
                GCM_IV_LEN
            )));
        }
        if tag.len() != GCM_TAG_LEN {
            return Err(Error::InvalidEnvelope(format!(
                "invalid auth tag length: {} (expected {})",
                tag.len(),
                GCM_TAG_LEN
            )));
        }
        trace!(
            ciphertext_len = ciphertext.len(),
            "session cookie segments parsed"
        );

        let key = self.key_gen.generate_key(SESSION_KEY_SALT, SESSION_KEY_BITS);
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&key));
        let nonce = GenericArray::from_slice(&iv);

        // The AEAD API wants the tag appended to the ciphertext. AAD is
        // empty for Rails cookies.
        let mut combined = ciphertext;
        combined.extend_from_slice(&tag);
        let plaintext = cipher
            .decrypt(nonce, combined.as_ref())
            .map_err(|_| Error::AuthFailure)?;
        debug!(plaintext_len = plaintext.len(), "session cookie authenticated");

        let envelope: SignedJson = serde_json::from_slice(&plaintext)
            .map_err(|e| Error::InvalidEnvelope(format!("bad session envelope JSON: {}", e)))?;
        let payload = STANDARD
            .decode(envelope.rails.message.as_bytes())
            .map_err(|e| {
                Error::InvalidEnvelope(format!("invalid base64 in session message: {}", e))
            })?;

        match decode(&payload)? {
            Value::Map(entries) => Ok(entries),
            other => Err(Error::UnexpectedPayload {
                actual: other.type_name(),
            }),
        }
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(segment)
        .map_err(|e| Error::InvalidEnvelope(format!("invalid base64 in {}: {}", name, e)))
}
