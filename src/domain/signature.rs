//! Gateway callback authentication.
//!
//! The gateway signs `order_id|payment_id` with HMAC-SHA256 under the shared
//! secret and sends the lowercase hex digest. Verification recomputes the MAC
//! and compares digests in constant time.

use super::payment::{OrderId, PaymentId, VerificationInput};
use crate::error::{FeeError, Result};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Byte length of an HMAC-SHA256 digest.
const DIGEST_LEN: usize = 32;

/// Canonical message signed by the gateway.
fn canonical_message(order_id: &str, payment_id: &str) -> String {
    format!("{}|{}", order_id, payment_id)
}

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: SecretString) -> Result<Self> {
        if secret.expose_secret().is_empty() {
            return Err(FeeError::Config(
                "Signing secret must not be empty".to_string(),
            ));
        }
        Ok(Self { secret })
    }

    fn mac(&self, order_id: &str, payment_id: &str) -> HmacSha256 {
        // HMAC accepts keys of any length, so this cannot fail.
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"));
        mac.update(canonical_message(order_id, payment_id).as_bytes());
        mac
    }

    /// Lowercase hex signature for `order_id|payment_id`.
    pub fn sign(&self, order_id: &OrderId, payment_id: &PaymentId) -> String {
        hex::encode(
            self.mac(order_id.as_str(), payment_id.as_str())
                .finalize()
                .into_bytes(),
        )
    }

    /// Checks a callback signature.
    ///
    /// Returns `Ok(false)` on mismatch. Only structurally invalid input (empty
    /// fields, non-hex or wrong-length signature) is an error.
    pub fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> Result<bool> {
        let input = VerificationInput::parse(order_id, payment_id, signature)?;
        self.verify_input(&input)
    }

    pub fn verify_input(&self, input: &VerificationInput) -> Result<bool> {
        let provided = hex::decode(&input.signature).map_err(|e| {
            FeeError::MalformedCallback(format!("Signature is not valid hex: {}", e))
        })?;
        if provided.len() != DIGEST_LEN {
            return Err(FeeError::MalformedCallback(format!(
                "Signature must be {} bytes, got {}",
                DIGEST_LEN,
                provided.len()
            )));
        }

        let expected = self
            .mac(input.order_id.as_str(), input.payment_id.as_str())
            .finalize()
            .into_bytes();

        Ok(expected.as_slice().ct_eq(&provided).into())
    }
}
