//! RSA signer for test receipts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha1::Sha1;

use crate::billing::{Purchase, PurchaseRecord};

// Small keys keep key generation fast in debug builds.
const TEST_KEY_BITS: usize = 1024;

static SHARED: OnceLock<TestSigner> = OnceLock::new();
static OTHER: OnceLock<TestSigner> = OnceLock::new();
static ORDER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Signs receipts the way the platform does: PKCS#1 v1.5 over SHA-1,
/// base64 encoded.
pub struct TestSigner {
    signing_key: SigningKey<Sha1>,
    public_key_base64: String,
}

impl TestSigner {
    /// Generate a fresh key pair.
    ///
    /// Key generation is slow; prefer [`TestSigner::shared`].
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let private_key = match RsaPrivateKey::new(&mut rng, TEST_KEY_BITS) {
            Ok(key) => key,
            Err(e) => panic!("test key generation failed: {}", e),
        };
        let der = match private_key.to_public_key().to_public_key_der() {
            Ok(der) => der,
            Err(e) => panic!("test public key encoding failed: {}", e),
        };
        Self {
            public_key_base64: BASE64.encode(der.as_bytes()),
            signing_key: SigningKey::<Sha1>::new(private_key),
        }
    }

    /// Process-wide signer, generated on first use.
    pub fn shared() -> &'static TestSigner {
        SHARED.get_or_init(Self::generate)
    }

    /// A second process-wide signer with a different key.
    pub fn other() -> &'static TestSigner {
        OTHER.get_or_init(Self::generate)
    }

    /// Base64 X.509 public key, as handed to `initialize`.
    pub fn public_key_base64(&self) -> &str {
        &self.public_key_base64
    }

    /// Base64 signature over `data`.
    pub fn sign(&self, data: &str) -> String {
        let signature = self.signing_key.sign(data.as_bytes());
        BASE64.encode(signature.to_bytes())
    }

    /// Wrap a record into a signed purchase.
    ///
    /// The signed data is the record serialized as JSON.
    pub fn signed_purchase(&self, record: PurchaseRecord) -> Purchase {
        let signed_data = serde_json::to_string(&record).unwrap_or_default();
        let signature = self.sign(&signed_data);
        Purchase {
            record,
            order_id: Some(format!(
                "GPA.test-{}",
                ORDER_COUNTER.fetch_add(1, Ordering::Relaxed)
            )),
            signed_data,
            signature,
        }
    }
}

impl std::fmt::Debug for TestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSigner")
            .field("public_key_base64", &self.public_key_base64)
            .finish()
    }
}
