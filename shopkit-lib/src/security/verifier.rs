use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha1::Sha1;

use super::VerificationMode;
use crate::billing::Purchase;
use crate::{Result, ShopkitError};

/// RSA public key used to check receipt signatures.
///
/// Parse it once with [`PublicKey::from_base64`] and share it; it never
/// changes for the lifetime of a process.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    key: RsaPublicKey,
}

impl PublicKey {
    /// Decode a base64 X.509 SubjectPublicKeyInfo RSA key.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let der = BASE64.decode(encoded.trim()).map_err(|e| {
            tracing::error!("public key base64 decoding failed: {}", e);
            ShopkitError::MalformedPublicKey(format!("base64 decoding failed: {}", e))
        })?;

        let key = RsaPublicKey::from_public_key_der(&der).map_err(|e| {
            tracing::error!("invalid public key specification: {}", e);
            ShopkitError::MalformedPublicKey(format!("invalid key specification: {}", e))
        })?;

        Ok(Self { key })
    }

    /// Verify `signature` (base64) over `signed_data`.
    ///
    /// Returns `false` on empty input, bad base64, or a signature mismatch.
    pub fn verify(&self, signed_data: &str, signature: &str) -> bool {
        if signed_data.is_empty() {
            tracing::error!("signed data is empty, stopping verification");
            return false;
        }
        if signature.trim().is_empty() {
            tracing::warn!("empty signature, stopping verification");
            return false;
        }

        let sig_bytes = match BASE64.decode(signature.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("signature base64 decoding failed: {}", e);
                return false;
            }
        };

        let sig = match Signature::try_from(sig_bytes.as_slice()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!("malformed signature: {}", e);
                return false;
            }
        };

        let verifying_key = VerifyingKey::<Sha1>::new(self.key.clone());
        match verifying_key.verify(signed_data.as_bytes(), &sig) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("signature does not match data");
                false
            }
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use rsa::traits::PublicKeyParts;
        f.debug_struct("PublicKey")
            .field("bits", &(self.key.size() * 8))
            .finish()
    }
}

/// Verify `signature` over `signed_data` with an already parsed key.
pub fn verify(public_key: &PublicKey, signed_data: &str, signature: &str) -> bool {
    public_key.verify(signed_data, signature)
}

/// Verify a receipt against a base64-encoded public key.
///
/// Decodes the key on every call; prefer [`ReceiptVerifier`] when verifying
/// more than one receipt.
pub fn verify_purchase(base64_public_key: &str, signed_data: &str, signature: &str) -> bool {
    if signature.trim().is_empty() {
        tracing::warn!("empty signature, stopping verification");
        return false;
    }
    match PublicKey::from_base64(base64_public_key) {
        Ok(key) => key.verify(signed_data, signature),
        Err(_) => false,
    }
}

/// Verifier bound to one public key and a verification mode.
#[derive(Clone, Debug)]
pub struct ReceiptVerifier {
    key: PublicKey,
    mode: VerificationMode,
}

impl ReceiptVerifier {
    /// Create a verifier that enforces signatures.
    pub fn new(key: PublicKey) -> Self {
        Self {
            key,
            mode: VerificationMode::Enforce,
        }
    }

    /// Parse the key and create an enforcing verifier.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        PublicKey::from_base64(encoded).map(Self::new)
    }

    /// Set the verification mode.
    pub fn with_mode(mut self, mode: VerificationMode) -> Self {
        self.mode = mode;
        self
    }

    /// The active mode.
    pub fn mode(&self) -> VerificationMode {
        self.mode
    }

    /// The verification key.
    pub fn public_key(&self) -> &PublicKey {
        &self.key
    }

    /// Verify a raw receipt.
    pub fn verify(&self, signed_data: &str, signature: &str) -> bool {
        if self.mode.is_bypass() {
            tracing::debug!("test mode: receipt accepted without verification");
            return true;
        }
        self.key.verify(signed_data, signature)
    }

    /// Verify the signed receipt carried by a purchase.
    pub fn verify_purchase(&self, purchase: &Purchase) -> bool {
        let verified = self.verify(&purchase.signed_data, &purchase.signature);
        if !verified {
            tracing::warn!(
                product_id = %purchase.record.product_id,
                "purchase receipt failed verification"
            );
        }
        verified
    }
}
