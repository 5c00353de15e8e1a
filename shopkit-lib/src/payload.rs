//! Developer payload verification.
//!
//! A developer payload is an opaque string the app hands to the purchase
//! flow and gets back on the receipt. Apps that correlate purchases with
//! their own server plug a [`PayloadVerifier`] into the controller. The
//! default accepts every payload.

use crate::billing::PurchaseRecord;

/// Decides whether the payload on a purchase is authentic.
pub trait PayloadVerifier: Send + Sync {
    /// Return `true` to accept the purchase.
    fn verify_payload(&self, record: &PurchaseRecord) -> bool;
}

/// Accepts every payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAnyPayload;

impl PayloadVerifier for AcceptAnyPayload {
    fn verify_payload(&self, _record: &PurchaseRecord) -> bool {
        true
    }
}

impl<F> PayloadVerifier for F
where
    F: Fn(&PurchaseRecord) -> bool + Send + Sync,
{
    fn verify_payload(&self, record: &PurchaseRecord) -> bool {
        self(record)
    }
}
