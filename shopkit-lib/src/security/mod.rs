//! Receipt signature verification.
//!
//! Platform receipts are signed with the developer account's RSA key using
//! PKCS#1 v1.5 over SHA-1. The public key is distributed as base64 of an
//! X.509 SubjectPublicKeyInfo structure.
//!
//! Verification fails closed: an empty signature, a malformed key, bad
//! base64, or any error from the RSA implementation is reported as `false`
//! together with a logged reason. Nothing here panics or returns an error
//! past the `verify*` boundary.
//!
//! # Test mode
//!
//! With the `test-mode` cargo feature, [`VerificationMode::Bypass`] accepts
//! every receipt. The variant does not exist in builds without the feature.

mod verifier;

pub use verifier::{verify, verify_purchase, PublicKey, ReceiptVerifier};

/// How receipts are checked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VerificationMode {
    /// Verify every signature.
    #[default]
    Enforce,
    /// Accept every receipt without checking. Test builds only.
    #[cfg(feature = "test-mode")]
    Bypass,
}

impl VerificationMode {
    /// Mode for a store configured with `test_mode`.
    ///
    /// Without the `test-mode` feature this always returns `Enforce`.
    pub fn for_test_mode(test_mode: bool) -> Self {
        if test_mode {
            Self::test_mode()
        } else {
            Self::Enforce
        }
    }

    #[cfg(feature = "test-mode")]
    fn test_mode() -> Self {
        Self::Bypass
    }

    #[cfg(not(feature = "test-mode"))]
    fn test_mode() -> Self {
        tracing::warn!(
            "test mode requested but shopkit-lib was built without `test-mode`; receipts are still verified"
        );
        Self::Enforce
    }

    /// Whether signatures are skipped.
    pub fn is_bypass(&self) -> bool {
        match self {
            Self::Enforce => false,
            #[cfg(feature = "test-mode")]
            Self::Bypass => true,
        }
    }
}
