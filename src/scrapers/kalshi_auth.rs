//! RSA-PSS request signing for the venue's authenticated endpoints.
//!
//! The signature is computed over method + path + timestamp (+ body when
//! present) with SHA-256, PSS salt length equal to the digest length, and
//! rendered as standard base64 alongside the key id and the millisecond
//! timestamp.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pss::BlindedSigningKey;
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;

use super::IngestError;

/// Header values for one signed request.
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    pub access_key: String,
    pub signature: String,
    pub timestamp: String,
}

impl AuthHeaders {
    pub fn as_tuples(&self) -> [(&'static str, &str); 3] {
        [
            ("KALSHI-ACCESS-KEY", &self.access_key),
            ("KALSHI-ACCESS-SIGNATURE", &self.signature),
            ("KALSHI-ACCESS-TIMESTAMP", &self.timestamp),
        ]
    }
}

/// Holds the API key id and the PKCS#1 private key.
pub struct RequestSigner {
    api_key_id: String,
    signing_key: BlindedSigningKey<Sha256>,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("api_key_id", &self.api_key_id)
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}

impl RequestSigner {
    /// Parses a PEM-encoded PKCS#1 private key. An unparseable key is a
    /// configuration error and fails startup.
    pub fn new(api_key_id: impl Into<String>, private_key_pem: &str) -> Result<Self, IngestError> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(private_key_pem)
            .map_err(|e| IngestError::Config(format!("failed to parse private key: {e}")))?;

        Ok(Self {
            api_key_id: api_key_id.into(),
            signing_key: BlindedSigningKey::new(private_key),
        })
    }

    /// Signs a request with the current wall clock.
    pub fn sign(&self, method: &str, path: &str, body: Option<&[u8]>) -> AuthHeaders {
        self.sign_with_timestamp(method, path, body, Utc::now().timestamp_millis())
    }

    fn sign_with_timestamp(
        &self,
        method: &str,
        path: &str,
        body: Option<&[u8]>,
        timestamp_ms: i64,
    ) -> AuthHeaders {
        let timestamp = timestamp_ms.to_string();
        let message = build_message(method, path, &timestamp, body);

        let signature = self
            .signing_key
            .sign_with_rng(&mut rand::thread_rng(), &message);

        AuthHeaders {
            access_key: self.api_key_id.clone(),
            signature: BASE64.encode(signature.to_bytes()),
            timestamp,
        }
    }
}

fn build_message(method: &str, path: &str, timestamp: &str, body: Option<&[u8]>) -> Vec<u8> {
    let mut message = Vec::with_capacity(method.len() + path.len() + timestamp.len());
    message.extend_from_slice(method.as_bytes());
    message.extend_from_slice(path.as_bytes());
    message.extend_from_slice(timestamp.as_bytes());
    if let Some(body) = body {
        message.extend_from_slice(body);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pem_is_a_config_error() {
        let result = RequestSigner::new("key-id", "not a pem");
        assert!(matches!(result, Err(IngestError::Config(_))));
    }

    #[test]
    fn message_is_method_path_timestamp_body() {
        let msg = build_message(
            "GET",
            "/markets/KXTEST/orderbook",
            "1706817600000",
            None,
        );
        assert_eq!(msg, b"GET/markets/KXTEST/orderbook1706817600000");

        let with_body = build_message("POST", "/p", "1", Some(b"{}"));
        assert_eq!(with_body, b"POST/p1{}");
    }

    #[test]
    fn header_names_match_the_venue() {
        let headers = AuthHeaders {
            access_key: "k".to_string(),
            signature: "s".to_string(),
            timestamp: "1".to_string(),
        };
        let tuples = headers.as_tuples();
        assert_eq!(tuples[0].0, "KALSHI-ACCESS-KEY");
        assert_eq!(tuples[1].0, "KALSHI-ACCESS-SIGNATURE");
        assert_eq!(tuples[2].0, "KALSHI-ACCESS-TIMESTAMP");
    }
}
