//! Signed messages, compatible with Rails' message verifier configured for
//! SHA256 digests and JSON serialization.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::trace;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// The signed-JSON wrapper both token kinds carry:
/// `{"_rails":{"message":<base64>,"exp":null,"pur":<purpose>}}`.
///
/// Field order matters for generation: serialization follows declaration
/// order, which keeps generated tokens byte-identical to the source
/// framework's. Extra keys on the wire are ignored.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SignedJson {
    #[serde(rename = "_rails")]
    pub(crate) rails: Metadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Metadata {
    pub(crate) message: String,
    /// Null or a timestamp; carried along but never validated here.
    #[serde(default)]
    pub(crate) exp: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) pur: Option<String>,
}

/// Generates and verifies `<base64-json>--<hex-hmac>` tokens.
pub struct MessageVerifier {
    secret: Vec<u8>,
}

impl MessageVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> MessageVerifier {
        MessageVerifier {
            secret: secret.into(),
        }
    }

    /// Sign `message` for the given purpose. The output verifies with
    /// [`MessageVerifier::verify`] under the same secret and purpose.
    pub fn generate(&self, message: &str, purpose: &str) -> String {
        let envelope = SignedJson {
            rails: Metadata {
                message: STANDARD.encode(message.as_bytes()),
                exp: None,
                pur: Some(purpose.to_owned()),
            },
        };
        let json = serde_json::to_string(&envelope)
            .expect("an envelope of plain strings always serializes");
        let data = STANDARD.encode(json.as_bytes());
        let digest = self.generate_digest(data.as_bytes());
        format!("{}--{}", data, digest)
    }

    /// Verify a signed message against the expected purpose.
    ///
    /// Returns `Ok(None)` on digest mismatch or purpose mismatch with no
    /// further detail: which check failed is itself a side channel. A token
    /// that does not even have the `<data>--<digest>` shape, or whose
    /// authenticated payload is not the expected JSON envelope, is a
    /// structural fault and reported as an error instead.
    pub fn verify(&self, signed_message: &str, purpose: &str) -> Result<Option<String>> {
        let parts: Vec<&str> = signed_message.split("--").collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(Error::InvalidEnvelope(
                "signed message must be <data>--<digest>".to_string(),
            ));
        }
        let (data, digest) = (parts[0], parts[1]);

        let expected = self.generate_digest(data.as_bytes());
        // Timing-safe comparison over the full digest; subtle's slice
        // comparison never short-circuits and rejects length mismatches.
        if !bool::from(expected.as_bytes().ct_eq(digest.as_bytes())) {
            trace!("signed message digest mismatch");
            return Ok(None);
        }

        let json = STANDARD
            .decode(data)
            .map_err(|e| Error::InvalidEnvelope(format!("invalid base64 in signed data: {}", e)))?;
        let envelope: SignedJson = serde_json::from_slice(&json)
            .map_err(|e| Error::InvalidEnvelope(format!("bad signed-message JSON: {}", e)))?;

        if envelope.rails.pur.as_deref() != Some(purpose) {
            trace!("signed message purpose mismatch");
            return Ok(None);
        }

        let message = STANDARD.decode(envelope.rails.message.as_bytes()).map_err(|e| {
            Error::InvalidEnvelope(format!("invalid base64 in signed message: {}", e))
        })?;
        let message = String::from_utf8(message)
            .map_err(|e| Error::EncodingError(format!("signed message is not valid UTF-8: {}", e)))?;
        Ok(Some(message))
    }

    fn generate_digest(&self, data: &[u8]) -> String {
        // HMAC-SHA256 accepts keys of any length per RFC 2104, so this
        // cannot fail for any secret.
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts any key size per RFC 2104");
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for MessageVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageVerifier")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
